use crate::container::{ChangeSequencer, EntityContainer};
use crate::error::{StoreError, StoreResult};
use crate::event::StoreEvent;
use crate::tree;
use restsync_schema::{
    path, resolve_item_schema, BasicValidator, ItemValidator, ObjectSchema, SchemaNode,
    ValidationContext,
};
use restsync_types::{ChangeType, DetailLevel, IdSet, Iid, Item, Owner};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 256;

/// Owns every resident container and enforces the identity and eviction
/// rules over them.
pub struct EntityStore {
    schema: Arc<SchemaNode>,
    containers: Vec<EntityContainer>,
    /// Item schemas by collection path.
    item_schemas: HashMap<String, Arc<ObjectSchema>>,
    sequencer: ChangeSequencer,
    validator: Arc<dyn ItemValidator>,
    events: broadcast::Sender<StoreEvent>,
}

impl fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("containers", &self.containers.len())
            .field("sequencer", &self.sequencer)
            .finish_non_exhaustive()
    }
}

impl EntityStore {
    /// Creates an empty store validating with [`BasicValidator`].
    #[must_use]
    pub fn new(schema: SchemaNode) -> Self {
        Self::with_validator(schema, Arc::new(BasicValidator))
    }

    /// Creates an empty store with a custom validator.
    #[must_use]
    pub fn with_validator(schema: SchemaNode, validator: Arc<dyn ItemValidator>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            schema: Arc::new(schema),
            containers: Vec::new(),
            item_schemas: HashMap::new(),
            sequencer: ChangeSequencer::new(),
            validator,
            events,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &SchemaNode {
        &self.schema
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// The element schema of a collection, resolved once and cached.
    pub fn item_schema(&mut self, collection_path: &str) -> StoreResult<Arc<ObjectSchema>> {
        if let Some(schema) = self.item_schemas.get(collection_path) {
            return Ok(Arc::clone(schema));
        }
        let schema = Arc::new(resolve_item_schema(&self.schema, collection_path)?.clone());
        self.item_schemas
            .insert(collection_path.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Rejects ancestor ids that do not line up with the `[]` segments of
    /// `collection_path`.
    fn check_scope(collection_path: &str, parent_ids: &[IdSet]) -> StoreResult<()> {
        let depth = path::segments(collection_path)
            .filter(|segment| *segment == path::ARRAY_MARKER)
            .count();
        if depth != parent_ids.len() {
            return Err(StoreError::UnexpectedPath {
                path: collection_path.to_string(),
            });
        }
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────

    /// All containers in store order.
    #[must_use]
    pub fn containers(&self) -> &[EntityContainer] {
        &self.containers
    }

    #[must_use]
    pub fn container(&self, iid: Iid) -> Option<&EntityContainer> {
        self.containers.iter().find(|c| c.iid() == iid)
    }

    fn container_mut(&mut self, iid: Iid) -> StoreResult<&mut EntityContainer> {
        self.containers
            .iter_mut()
            .find(|c| c.iid() == iid)
            .ok_or(StoreError::ContainerNotFound(iid))
    }

    fn position(&self, iid: Iid) -> StoreResult<usize> {
        self.containers
            .iter()
            .position(|c| c.iid() == iid)
            .ok_or(StoreError::ContainerNotFound(iid))
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.containers.iter().any(EntityContainer::is_dirty)
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.containers.iter().any(|c| !c.errors().is_empty())
    }

    /// Containers at a path and ancestor scope.
    ///
    /// With an owner, only containers carrying it are returned. For
    /// `CollectionSearch`, unsaved containers at the scope are prepended so
    /// new rows show up in list views at once. Search owners never see
    /// containers pending deletion.
    #[must_use]
    pub fn get_containers(
        &self,
        collection_path: &str,
        parent_ids: &[IdSet],
        owner: Option<Owner>,
    ) -> Vec<&EntityContainer> {
        let in_scope = self
            .containers
            .iter()
            .filter(|c| c.matches(collection_path, parent_ids, None, None));
        let Some(owner) = owner else {
            return in_scope.collect();
        };

        let owned: Vec<&EntityContainer> = in_scope.clone().filter(|c| c.has_owner(owner)).collect();
        let mut result: Vec<&EntityContainer> = if owner == Owner::CollectionSearch {
            in_scope
                .filter(|c| c.is_new_item() && !c.has_owner(owner))
                .chain(owned)
                .collect()
        } else {
            owned
        };
        if owner.is_search() {
            result.retain(|c| c.change_type() != ChangeType::Delete);
        }
        result
    }

    /// Single-result identity lookup.
    #[must_use]
    pub fn find_container(
        &self,
        collection_path: &str,
        parent_ids: &[IdSet],
        ids: &IdSet,
        detail_level: Option<DetailLevel>,
    ) -> Option<&EntityContainer> {
        self.containers
            .iter()
            .find(|c| c.matches(collection_path, parent_ids, Some(ids), detail_level))
    }

    /// Containers that need saving, in the order they became dirty.
    #[must_use]
    pub fn get_dirty_containers(&self) -> Vec<&EntityContainer> {
        let mut dirty: Vec<&EntityContainer> =
            self.containers.iter().filter(|c| c.is_dirty()).collect();
        dirty.sort_by_key(|c| c.change_sequence());
        dirty
    }

    /// Rebuilds the whole dataset as one nested tree, IIDs stripped.
    pub fn to_object(&self) -> StoreResult<Value> {
        let mut data = Value::Object(Map::new());
        for container in &self.containers {
            tree::poke_item(
                &mut data,
                &self.schema,
                container.collection_path(),
                container.parent_ids(),
                container.item(),
                &container.ids(),
            )?;
        }
        tree::strip_iids(&mut data);
        Ok(data)
    }

    // ── Owners ───────────────────────────────────────────────────

    /// Tags the container with matching identity, returning its IID.
    pub fn register_item_owner(
        &mut self,
        collection_path: &str,
        parent_ids: &[IdSet],
        ids: &IdSet,
        owner: Owner,
    ) -> Option<Iid> {
        let container = self
            .containers
            .iter_mut()
            .find(|c| c.matches(collection_path, parent_ids, Some(ids), None))?;
        container.register_owner(owner);
        Some(container.iid())
    }

    pub fn register_owner(&mut self, iid: Iid, owner: Owner) -> StoreResult<()> {
        self.container_mut(iid)?.register_owner(owner);
        Ok(())
    }

    pub fn deregister_owner(&mut self, iid: Iid, owner: Owner) -> StoreResult<()> {
        self.container_mut(iid)?.deregister_owner(owner);
        Ok(())
    }

    // ── Loading ──────────────────────────────────────────────────

    /// Creates an unsaved container at the front of the store.
    pub fn add_container(
        &mut self,
        collection_path: &str,
        parent_ids: Vec<IdSet>,
    ) -> StoreResult<Iid> {
        Self::check_scope(collection_path, &parent_ids)?;
        let item_schema = self.item_schema(collection_path)?;
        let container =
            EntityContainer::added(collection_path, parent_ids, item_schema, &mut self.sequencer);
        let iid = container.iid();
        self.containers.insert(0, container);
        debug!("Added container {} at {}", iid, collection_path);
        self.emit(StoreEvent::Added(iid));
        Ok(iid)
    }

    /// Merges a page of fetched items into the store.
    ///
    /// A search load first takes its owner tag away from resident
    /// containers in scope that the new page no longer holds, evicting those
    /// left ownerless unless they are dirty. Each item then either merges
    /// into the container with matching identity or becomes a new one.
    /// Returns the IIDs of the loaded items in input order.
    pub fn load(
        &mut self,
        collection_path: &str,
        parent_ids: &[IdSet],
        items: Vec<Item>,
        detail_level: DetailLevel,
        owner: Owner,
    ) -> StoreResult<Vec<Iid>> {
        Self::check_scope(collection_path, parent_ids)?;
        let item_schema = self.item_schema(collection_path)?;
        let pk_names = item_schema.primary_key_field_names();
        let incoming: Vec<IdSet> = items
            .iter()
            .map(|item| IdSet::from_item(item, &pk_names))
            .collect();

        if owner.is_search() {
            self.purge(collection_path, parent_ids, &incoming, owner);
        }

        let mut iids = Vec::with_capacity(items.len());
        for (item, ids) in items.into_iter().zip(incoming) {
            let existing = self
                .containers
                .iter_mut()
                .find(|c| c.matches(collection_path, parent_ids, Some(&ids), None));
            let iid = match existing {
                Some(container) => {
                    container.register_owner(owner);
                    if detail_level == DetailLevel::Detail {
                        apply_detail(container, item);
                    }
                    let iid = container.iid();
                    self.emit(StoreEvent::Changed(iid));
                    iid
                }
                None => {
                    let container = EntityContainer::new(
                        collection_path,
                        parent_ids.to_vec(),
                        Arc::clone(&item_schema),
                        item,
                        detail_level,
                        owner,
                    );
                    let iid = container.iid();
                    self.containers.push(container);
                    self.emit(StoreEvent::Added(iid));
                    iid
                }
            };
            iids.push(iid);
        }

        debug!(
            "Loaded {} item(s) at {} ({:?}, {:?})",
            iids.len(),
            collection_path,
            detail_level,
            owner
        );
        self.emit(StoreEvent::Loaded {
            collection_path: collection_path.to_string(),
        });
        Ok(iids)
    }

    fn purge(&mut self, collection_path: &str, parent_ids: &[IdSet], incoming: &[IdSet], owner: Owner) {
        for container in &mut self.containers {
            if container.matches(collection_path, parent_ids, None, None)
                && !incoming.iter().any(|ids| container.ids().matches(ids))
            {
                container.deregister_owner(owner);
            }
        }

        let (evicted, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.containers)
            .into_iter()
            .partition(|c| {
                c.matches(collection_path, parent_ids, None, None) && c.is_orphan() && !c.is_dirty()
            });
        self.containers = kept;
        for container in evicted {
            debug!("Evicted container {} from {}", container.iid(), collection_path);
            self.emit(StoreEvent::Removed(container.iid()));
        }
    }

    /// Applies a full-detail fetch to a resident container.
    ///
    /// A dirty container only takes the fields it does not hold yet.
    pub fn upgrade_to_detail(&mut self, iid: Iid, item: Item) -> StoreResult<()> {
        apply_detail(self.container_mut(iid)?, item);
        self.emit(StoreEvent::Changed(iid));
        Ok(())
    }

    /// Marks a container complete without a fetch.
    pub fn mark_detail(&mut self, iid: Iid) -> StoreResult<()> {
        self.container_mut(iid)?.mark_detail();
        self.emit(StoreEvent::Changed(iid));
        Ok(())
    }

    // ── Mutation ─────────────────────────────────────────────────

    /// Sets one field and revalidates the container.
    ///
    /// If the store tree cannot be rebuilt for validation the edit is
    /// rolled back before the error is returned.
    pub fn set_item_field_value(&mut self, iid: Iid, field_name: &str, value: Value) -> StoreResult<()> {
        let index = self.position(iid)?;
        let previous = self.containers[index].clone();
        let Self {
            containers,
            sequencer,
            ..
        } = &mut *self;
        containers[index].set_field_value(field_name, value, sequencer);
        if let Err(e) = self.validate(iid) {
            self.containers[index] = previous;
            return Err(e);
        }
        self.emit(StoreEvent::Changed(iid));
        Ok(())
    }

    /// Marks a container for deletion and returns its new change type.
    ///
    /// An unsaved container has nothing to delete on the server and leaves
    /// the store at once; `ChangeType::None` is returned for it.
    pub fn delete_container(&mut self, iid: Iid) -> StoreResult<ChangeType> {
        let index = self.position(iid)?;
        if self.containers[index].is_new_item() {
            self.containers.remove(index);
            debug!("Dropped unsaved container {}", iid);
            self.emit(StoreEvent::Removed(iid));
            return Ok(ChangeType::None);
        }
        let Self {
            containers,
            sequencer,
            ..
        } = &mut *self;
        containers[index].delete(sequencer);
        self.emit(StoreEvent::Changed(iid));
        Ok(ChangeType::Delete)
    }

    /// Revalidates one container against the current tree.
    pub fn validate(&mut self, iid: Iid) -> StoreResult<()> {
        let data = self.to_object()?;
        let schema = Arc::clone(&self.schema);
        let validator = Arc::clone(&self.validator);
        let context = ValidationContext {
            schema: schema.as_ref(),
            data: &data,
        };
        self.container_mut(iid)?.validate(validator.as_ref(), &context);
        Ok(())
    }

    /// Revalidates every dirty container not pending deletion. Returns how
    /// many of them have errors.
    pub fn validate_dirty(&mut self) -> StoreResult<usize> {
        let data = self.to_object()?;
        let schema = Arc::clone(&self.schema);
        let validator = Arc::clone(&self.validator);
        let context = ValidationContext {
            schema: schema.as_ref(),
            data: &data,
        };
        let mut failing = 0;
        for container in self
            .containers
            .iter_mut()
            .filter(|c| c.is_dirty() && c.change_type() != ChangeType::Delete)
        {
            container.validate(validator.as_ref(), &context);
            if !container.errors().is_empty() {
                failing += 1;
            }
        }
        Ok(failing)
    }

    // ── Save support ─────────────────────────────────────────────

    /// Replaces ancestor id sets naming another container by IID with that
    /// container's current ids.
    ///
    /// A child created under an unsaved parent only knows the parent by
    /// IID; once the parent is saved its real key is picked up here.
    pub fn fix_parent_ids(&mut self, iid: Iid) -> StoreResult<()> {
        let index = self.position(iid)?;
        let fixed: Vec<IdSet> = self.containers[index]
            .parent_ids()
            .iter()
            .map(|parent| {
                parent
                    .iid()
                    .and_then(|parent_iid| self.container(parent_iid))
                    .map_or_else(|| parent.clone(), EntityContainer::ids)
            })
            .collect();
        self.containers[index].replace_parent_ids(fixed);
        Ok(())
    }

    /// Settles a container after its change reached the server.
    ///
    /// A deleted container leaves the store. Otherwise `created`, when
    /// given, replaces the item fields (the IID is kept) before the dirty
    /// state is cleared.
    pub fn finalize_container(&mut self, iid: Iid, created: Option<Item>) -> StoreResult<()> {
        let index = self.position(iid)?;
        if self.containers[index].change_type() == ChangeType::Delete {
            self.containers.remove(index);
            debug!("Finalized delete of {}", iid);
            self.emit(StoreEvent::Removed(iid));
            return Ok(());
        }
        let container = &mut self.containers[index];
        if let Some(item) = created {
            container.replace_item(item);
        }
        container.finalize();
        debug!("Finalized {}", iid);
        self.emit(StoreEvent::Changed(iid));
        Ok(())
    }

    /// Discards unsaved containers and reverts all others.
    pub fn cancel(&mut self) {
        let (added, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.containers)
            .into_iter()
            .partition(EntityContainer::is_new_item);
        self.containers = kept;
        let mut reverted = 0;
        for container in &mut self.containers {
            if container.is_dirty() {
                reverted += 1;
            }
            container.revert();
        }
        info!(
            "Cancelled changes: dropped {} new, reverted {}",
            added.len(),
            reverted
        );
        for container in added {
            self.emit(StoreEvent::Removed(container.iid()));
        }
        self.emit(StoreEvent::Cancelled);
    }
}

fn apply_detail(container: &mut EntityContainer, item: Item) {
    if container.is_dirty() {
        container.fill_missing_fields(&item);
    } else {
        container.upgrade_summary_to_detail(item);
    }
}
