//! A single resident entity and its lifecycle.

use restsync_schema::{
    FieldDescriptor, ForeignKeyMetadata, ItemValidator, ObjectSchema, ValidationContext,
    ValidationError,
};
use restsync_types::{
    ids_match, strip_iid, ChangeType, DetailLevel, IdSet, Iid, Item, Owner, IID_FIELD,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Monotonic counter stamping the moment a container first becomes dirty.
///
/// Owned by the store so that saves replay changes in the order the user
/// made them.
#[derive(Debug, Clone)]
pub struct ChangeSequencer {
    next: u64,
}

impl ChangeSequencer {
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    /// Hands out the next sequence number.
    pub fn next(&mut self) -> u64 {
        let seq = self.next;
        self.next += 1;
        seq
    }
}

impl Default for ChangeSequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// One entity plus its position in the resource tree and its local state.
#[derive(Debug, Clone)]
pub struct EntityContainer {
    iid: Iid,
    collection_path: String,
    parent_ids: Vec<IdSet>,
    item: Item,
    item_schema: Arc<ObjectSchema>,
    detail_level: DetailLevel,
    change_type: ChangeType,
    /// Zero while clean.
    change_sequence: u64,
    owners: BTreeSet<Owner>,
    original_item: Option<Item>,
    errors: Vec<ValidationError>,
}

impl EntityContainer {
    /// Wraps a fetched item. Keeps an IID already present in the item,
    /// otherwise assigns a fresh one.
    pub fn new(
        collection_path: impl Into<String>,
        parent_ids: Vec<IdSet>,
        item_schema: Arc<ObjectSchema>,
        mut item: Item,
        detail_level: DetailLevel,
        owner: Owner,
    ) -> Self {
        let iid = restsync_types::item_iid(&item).unwrap_or_default();
        item.insert(IID_FIELD.to_string(), iid.to_value());
        Self {
            iid,
            collection_path: collection_path.into(),
            parent_ids,
            item,
            item_schema,
            detail_level,
            change_type: ChangeType::None,
            change_sequence: 0,
            owners: BTreeSet::from([owner]),
            original_item: None,
            errors: Vec::new(),
        }
    }

    /// A brand-new, unsaved entity: empty but for its IID, in `add` state.
    pub fn added(
        collection_path: impl Into<String>,
        parent_ids: Vec<IdSet>,
        item_schema: Arc<ObjectSchema>,
        sequencer: &mut ChangeSequencer,
    ) -> Self {
        let mut container = Self::new(
            collection_path,
            parent_ids,
            item_schema,
            Item::new(),
            DetailLevel::Detail,
            Owner::Detail,
        );
        container.mark_dirty(ChangeType::Add, sequencer);
        container
    }

    // ── Accessors ────────────────────────────────────────────────

    #[must_use]
    pub fn iid(&self) -> Iid {
        self.iid
    }

    #[must_use]
    pub fn collection_path(&self) -> &str {
        &self.collection_path
    }

    #[must_use]
    pub fn parent_ids(&self) -> &[IdSet] {
        &self.parent_ids
    }

    /// The item, IID field included.
    #[must_use]
    pub fn item(&self) -> &Item {
        &self.item
    }

    #[must_use]
    pub fn item_schema(&self) -> &ObjectSchema {
        &self.item_schema
    }

    #[must_use]
    pub fn detail_level(&self) -> DetailLevel {
        self.detail_level
    }

    #[must_use]
    pub fn change_type(&self) -> ChangeType {
        self.change_type
    }

    #[must_use]
    pub fn change_sequence(&self) -> u64 {
        self.change_sequence
    }

    #[must_use]
    pub fn owners(&self) -> &BTreeSet<Owner> {
        &self.owners
    }

    /// Snapshot taken when the container first became dirty.
    #[must_use]
    pub fn original_item(&self) -> Option<&Item> {
        self.original_item.as_ref()
    }

    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.change_type.is_dirty()
    }

    #[must_use]
    pub fn is_new_item(&self) -> bool {
        self.change_type == ChangeType::Add
    }

    #[must_use]
    pub fn is_orphan(&self) -> bool {
        self.owners.is_empty()
    }

    #[must_use]
    pub fn has_owner(&self, owner: Owner) -> bool {
        self.owners.contains(&owner)
    }

    #[must_use]
    pub fn get_item_field_value(&self, field_name: &str) -> Option<&Value> {
        self.item.get(field_name)
    }

    // ── Identity ─────────────────────────────────────────────────

    /// Primary-key values plus IID.
    #[must_use]
    pub fn ids(&self) -> IdSet {
        IdSet::from_item(&self.item, &self.item_schema.primary_key_field_names())
    }

    /// The wire form of the item: a copy without the IID.
    #[must_use]
    pub fn clean_item(&self) -> Item {
        strip_iid(&self.item)
    }

    /// The wire form of the ancestor ids.
    #[must_use]
    pub fn clean_parent_ids(&self) -> Vec<IdSet> {
        self.parent_ids.iter().map(IdSet::without_iid).collect()
    }

    /// Identity predicate: same path, positionally matching ancestors, and
    /// optionally the same detail level and matching own ids.
    #[must_use]
    pub fn matches(
        &self,
        collection_path: &str,
        parent_ids: &[IdSet],
        ids: Option<&IdSet>,
        detail_level: Option<DetailLevel>,
    ) -> bool {
        if self.collection_path != collection_path {
            return false;
        }
        if self.parent_ids.len() != parent_ids.len()
            || !self
                .parent_ids
                .iter()
                .zip(parent_ids)
                .all(|(a, b)| ids_match(a, b))
        {
            return false;
        }
        if detail_level.is_some_and(|level| level != self.detail_level) {
            return false;
        }
        ids.is_none_or(|ids| ids_match(&self.ids(), ids))
    }

    /// Stable key for list rendering.
    #[must_use]
    pub fn key(&self) -> String {
        self.iid.to_string()
    }

    // ── Owners ───────────────────────────────────────────────────

    pub fn register_owner(&mut self, owner: Owner) {
        self.owners.insert(owner);
    }

    pub fn deregister_owner(&mut self, owner: Owner) {
        self.owners.remove(&owner);
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Applies a lifecycle transition.
    ///
    /// The first transition out of `none` takes a sequence number and, for
    /// anything but an add, snapshots the item for revert. Editing an added
    /// container keeps it `add`; deleting one returns it to `none`.
    pub fn mark_dirty(&mut self, change_type: ChangeType, sequencer: &mut ChangeSequencer) {
        if change_type.is_dirty() && !self.is_dirty() {
            self.change_sequence = sequencer.next();
            if change_type != ChangeType::Add {
                self.original_item = Some(self.item.clone());
            }
        }
        match (self.change_type, change_type) {
            (ChangeType::Add, ChangeType::Edit) => {}
            (ChangeType::Add, ChangeType::Delete) => {
                self.change_type = ChangeType::None;
                self.change_sequence = 0;
            }
            _ => self.change_type = change_type,
        }
    }

    /// Sets a field, moving the container to `edit` (or keeping `add`).
    ///
    /// `null`, and `""` unless the schema lists it as a valid value, unset
    /// the field. The store re-runs validation afterwards.
    pub fn set_field_value(
        &mut self,
        field_name: &str,
        value: Value,
        sequencer: &mut ChangeSequencer,
    ) {
        self.mark_dirty(ChangeType::Edit, sequencer);
        let allows_empty = self
            .field_schema(field_name)
            .is_some_and(|f| f.allows(&Value::String(String::new())));
        match value {
            Value::Null => {
                self.item.remove(field_name);
            }
            Value::String(ref s) if s.is_empty() && !allows_empty => {
                self.item.remove(field_name);
            }
            value => {
                self.item.insert(field_name.to_string(), value);
            }
        }
    }

    /// Marks the container for deletion.
    pub fn delete(&mut self, sequencer: &mut ChangeSequencer) {
        self.mark_dirty(ChangeType::Delete, sequencer);
    }

    /// Re-runs validation on the clean item, replacing the error list.
    pub fn validate(&mut self, validator: &dyn ItemValidator, context: &ValidationContext<'_>) {
        let clean = self.clean_item();
        self.errors = validator.validate(&self.item_schema, &clean, context);
    }

    /// Replaces all fields with `item`'s, keeping the IID.
    pub fn replace_item(&mut self, mut item: Item) {
        item.insert(IID_FIELD.to_string(), self.iid.to_value());
        self.item = item;
    }

    /// Takes a full-detail fetch in place of summary fields.
    pub fn upgrade_summary_to_detail(&mut self, item: Item) {
        self.detail_level = DetailLevel::Detail;
        self.replace_item(item);
    }

    /// Adds fields the container does not hold yet, leaving local values
    /// untouched. Used when detail arrives for a container being edited.
    pub fn fill_missing_fields(&mut self, item: &Item) {
        self.detail_level = DetailLevel::Detail;
        for (name, value) in item {
            if name != IID_FIELD && !self.item.contains_key(name) {
                self.item.insert(name.clone(), value.clone());
            }
        }
    }

    /// Declares the resident fields complete without a fetch.
    pub fn mark_detail(&mut self) {
        self.detail_level = DetailLevel::Detail;
    }

    pub fn replace_parent_ids(&mut self, parent_ids: Vec<IdSet>) {
        self.parent_ids = parent_ids;
    }

    /// Restores the pre-change snapshot and returns to `none`.
    pub fn revert(&mut self) {
        if let Some(original) = self.original_item.take() {
            self.replace_item(original);
        }
        self.change_type = ChangeType::None;
        self.change_sequence = 0;
        self.errors.clear();
    }

    /// Clears dirty state after a successful save.
    ///
    /// A freshly created entity gains the `CollectionSearch` owner so it stays
    /// in the list view it was created from.
    pub fn finalize(&mut self) {
        if self.change_type == ChangeType::Add {
            self.register_owner(Owner::CollectionSearch);
        }
        self.original_item = None;
        self.change_type = ChangeType::None;
        self.change_sequence = 0;
        self.errors.clear();
    }

    // ── Schema-derived helpers ───────────────────────────────────

    /// Messages of the errors recorded against one field.
    #[must_use]
    pub fn get_validation_errors(&self, field_name: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.field_name == field_name)
            .map(|e| e.message.as_str())
            .collect()
    }

    #[must_use]
    pub fn field_schema(&self, field_name: &str) -> Option<&FieldDescriptor> {
        self.item_schema.field_descriptor(field_name)
    }

    #[must_use]
    pub fn display_name_field_names(&self) -> Vec<&str> {
        self.item_schema.display_name_field_names()
    }

    /// Display-name field values joined with `" - "`, `???` for blanks.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.display_name_field_names()
            .into_iter()
            .map(|name| match self.item.get(name) {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::Null) | None => "???".to_string(),
                Some(Value::String(_)) => "???".to_string(),
                Some(other) => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" - ")
    }

    /// FK metadata for a field of this item.
    #[must_use]
    pub fn foreign_key_metadata(&self, field_name: &str) -> Option<ForeignKeyMetadata> {
        ForeignKeyMetadata::for_field(&self.item_schema, &self.item, field_name)
    }

    /// Ancestor ids scoping a cascading FK lookup; `None` while the parent
    /// field is unset.
    #[must_use]
    pub fn fk_field_parent_ids(&self, field_name: &str) -> Option<Vec<IdSet>> {
        self.foreign_key_metadata(field_name)
            .and_then(|meta| meta.parent_ids)
    }

    /// Fields whose FK is scoped by `field_name`.
    #[must_use]
    pub fn child_fk_field_names(&self, field_name: &str) -> Vec<&str> {
        self.item_schema
            .leaf_fields()
            .filter(|(name, desc)| {
                *name != field_name && desc.foreign_key_parent_field_name() == Some(field_name)
            })
            .map(|(name, _)| name)
            .collect()
    }
}
