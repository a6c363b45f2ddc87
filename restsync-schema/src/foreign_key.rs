use crate::node::{FieldDescriptor, ObjectSchema};
use restsync_types::{is_defined, IdSet, Item};

/// Where a foreign-key field points, derived from its `fk` rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyMetadata {
    /// Target collection, e.g. `makes`.
    pub collection_path: String,
    /// Item path of the target collection, e.g. `makes.[]`.
    pub item_path: String,
    /// Ancestor ids scoping the lookup. `None` when a cascading FK's parent
    /// field is not set yet, in which case no lookup is possible.
    pub parent_ids: Option<Vec<IdSet>>,
    /// Field in the target collection holding the referenced value.
    pub target_field_name: String,
}

impl ForeignKeyMetadata {
    pub fn new(
        collection_path: impl Into<String>,
        parent_ids: Option<Vec<IdSet>>,
        target_field_name: impl Into<String>,
    ) -> Self {
        let collection_path = collection_path.into();
        Self {
            item_path: crate::path::item_path(&collection_path),
            collection_path,
            parent_ids,
            target_field_name: target_field_name.into(),
        }
    }

    /// The id set naming the target entity for a given FK value.
    #[must_use]
    pub fn lookup_ids(&self, value: &serde_json::Value) -> IdSet {
        IdSet::new().with(self.target_field_name.clone(), value.clone())
    }
}

impl ForeignKeyMetadata {
    /// Derives FK metadata for `field_name` of `item`.
    ///
    /// Returns `None` when the field is not a foreign key. A cascading FK
    /// (one scoped by a sibling field) takes its parent id set from the
    /// sibling's current value; only a single parent level is supported.
    #[must_use]
    pub fn for_field(item_schema: &ObjectSchema, item: &Item, field_name: &str) -> Option<Self> {
        let field = item_schema.field_descriptor(field_name)?;
        let collection_path = field.foreign_key_collection_path()?;
        let target_field_name = field.foreign_key_target_field()?;
        let parent_ids = fk_parent_ids(item_schema, item, field);
        Some(Self::new(collection_path, parent_ids, target_field_name))
    }
}

fn fk_parent_ids(item_schema: &ObjectSchema, item: &Item, field: &FieldDescriptor) -> Option<Vec<IdSet>> {
    let Some(parent_field_name) = field.foreign_key_parent_field_name() else {
        return Some(Vec::new());
    };
    let parent_value = item.get(parent_field_name).filter(|v| is_defined(v))?;
    let parent_target = item_schema
        .field_descriptor(parent_field_name)
        .and_then(FieldDescriptor::foreign_key_target_field)?;
    Some(vec![IdSet::new().with(parent_target, parent_value.clone())])
}
