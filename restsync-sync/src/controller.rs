//! The sync controller: loads pages and details into the store and replays
//! local changes to the API.

use crate::api::ApiAccess;
use crate::config::{ControllerConfig, SavePolicy};
use crate::error::{SyncError, SyncResult};
use crate::reporter::{ErrorReporter, TracingErrorReporter};
use futures::future::join_all;
use restsync_schema::{path, ForeignKeyMetadata, ObjectSchema, SchemaNode};
use restsync_store::{EntityContainer, EntityStore, StoreEvent};
use restsync_types::{is_defined, ChangeType, DetailLevel, IdSet, Iid, Item, Owner};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// What a save pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl SaveReport {
    /// Number of containers written.
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// A list view: the recorded page count and the containers to show.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// `None` until a page of the collection has been loaded.
    pub total_pages: Option<u32>,
    pub containers: Vec<EntityContainer>,
}

/// Wire snapshot of one dirty container, taken just before it is sent.
struct DirtyItem {
    collection_path: String,
    change_type: ChangeType,
    item: Item,
    parent_ids: Vec<IdSet>,
    has_generated_field: bool,
}

impl DirtyItem {
    fn from_container(container: &EntityContainer) -> Self {
        Self {
            collection_path: container.collection_path().to_string(),
            change_type: container.change_type(),
            item: container.clean_item(),
            parent_ids: container.clean_parent_ids(),
            has_generated_field: container.item_schema().has_generated_field(),
        }
    }

    fn item_path(&self) -> String {
        path::item_path(&self.collection_path)
    }
}

/// A foreign-key target that has to be made resident.
struct FkLookup {
    meta: ForeignKeyMetadata,
    parent_ids: Vec<IdSet>,
    ids: IdSet,
}

/// Coordinates the store with the API.
///
/// The store sits behind a lock that is never held across a network call.
/// Loads report remote failures to the [`ErrorReporter`] and carry on;
/// saves report and then return them.
pub struct SyncController {
    store: Arc<RwLock<EntityStore>>,
    api: Arc<dyn ApiAccess>,
    reporter: Arc<dyn ErrorReporter>,
    config: ControllerConfig,
    /// Total pages of the last listing, by collection path.
    search_result_pages: Arc<RwLock<HashMap<String, u32>>>,
}

impl SyncController {
    /// Creates a controller with an empty store and the default config.
    pub fn new(schema: SchemaNode, api: Arc<dyn ApiAccess>) -> Self {
        Self::with_store(EntityStore::new(schema), api, ControllerConfig::default())
    }

    /// Creates a controller over an existing store.
    pub fn with_store(store: EntityStore, api: Arc<dyn ApiAccess>, config: ControllerConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            api,
            reporter: Arc::new(TracingErrorReporter),
            config,
            search_result_pages: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Replaces the error reporter.
    pub fn set_reporter(&mut self, reporter: Arc<dyn ErrorReporter>) {
        self.reporter = reporter;
    }

    /// Shared handle to the store.
    pub fn store(&self) -> Arc<RwLock<EntityStore>> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Subscribes to the store's change notifications.
    pub async fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.read().await.subscribe()
    }

    pub async fn is_dirty(&self) -> bool {
        self.store.read().await.is_dirty()
    }

    pub async fn has_errors(&self) -> bool {
        self.store.read().await.has_errors()
    }

    /// A snapshot of one container.
    pub async fn container(&self, iid: Iid) -> Option<EntityContainer> {
        self.store.read().await.container(iid).cloned()
    }

    // ── Local edits ──────────────────────────────────────────────

    /// Starts a new, unsaved item.
    pub async fn add_container(&self, collection_path: &str, parent_ids: Vec<IdSet>) -> SyncResult<Iid> {
        Ok(self
            .store
            .write()
            .await
            .add_container(collection_path, parent_ids)?)
    }

    pub async fn set_item_field_value(&self, iid: Iid, field_name: &str, value: Value) -> SyncResult<()> {
        self.store
            .write()
            .await
            .set_item_field_value(iid, field_name, value)?;
        Ok(())
    }

    /// Marks an item for deletion. See [`EntityStore::delete_container`].
    pub async fn delete_container(&self, iid: Iid) -> SyncResult<ChangeType> {
        Ok(self.store.write().await.delete_container(iid)?)
    }

    /// Discards every local change.
    pub async fn cancel(&self) {
        self.store.write().await.cancel();
    }

    // ── Save ─────────────────────────────────────────────────────

    /// Saves with the configured policy.
    pub async fn save(&self) -> SyncResult<SaveReport> {
        self.save_with_policy(self.config.save_policy).await
    }

    /// Replays every dirty container to the API in the order the changes
    /// were made.
    ///
    /// The first failure stops the pass: containers already saved stay
    /// finalized, the rest stay dirty, and the error is reported and
    /// returned.
    pub async fn save_with_policy(&self, policy: SavePolicy) -> SyncResult<SaveReport> {
        if policy == SavePolicy::RequireValid {
            let failing = self.store.write().await.validate_dirty()?;
            if failing > 0 {
                warn!("Save refused: {} container(s) have validation errors", failing);
                return Err(SyncError::ValidationBlocked { count: failing });
            }
        }

        let dirty: Vec<Iid> = self
            .store
            .read()
            .await
            .get_dirty_containers()
            .iter()
            .map(|c| c.iid())
            .collect();
        info!("Saving {} dirty container(s)", dirty.len());

        let mut report = SaveReport::default();
        for iid in dirty {
            if let Err(e) = self.save_container(iid, &mut report).await {
                self.reporter.report("save", &e);
                return Err(e);
            }
        }
        info!(
            "Saved: {} created, {} updated, {} deleted",
            report.created, report.updated, report.deleted
        );
        Ok(report)
    }

    async fn save_container(&self, iid: Iid, report: &mut SaveReport) -> SyncResult<()> {
        let dirty = {
            let mut store = self.store.write().await;
            store.fix_parent_ids(iid)?;
            let container = store.container(iid).ok_or(SyncError::ContainerNotFound(iid))?;
            DirtyItem::from_container(container)
        };

        debug!(
            "Saving {} ({}) at {}",
            iid, dirty.change_type, dirty.collection_path
        );
        let created = match dirty.change_type {
            ChangeType::Delete => {
                self.api
                    .delete_item(&dirty.item_path(), &dirty.parent_ids, &dirty.item)
                    .await?;
                None
            }
            ChangeType::Add => self
                .api
                .create_item(&dirty.collection_path, &dirty.parent_ids, &dirty.item)
                .await?
                .filter(|_| dirty.has_generated_field),
            ChangeType::Edit => {
                self.api
                    .update_item(&dirty.item_path(), &dirty.parent_ids, &dirty.item)
                    .await?;
                None
            }
            ChangeType::None => return Err(SyncError::UnsupportedChangeType(dirty.change_type)),
        };

        self.store.write().await.finalize_container(iid, created)?;
        match dirty.change_type {
            ChangeType::Add => report.created += 1,
            ChangeType::Edit => report.updated += 1,
            ChangeType::Delete => report.deleted += 1,
            ChangeType::None => {}
        }
        Ok(())
    }

    // ── Loading ──────────────────────────────────────────────────

    /// Loads one page of a collection into the store for a list view.
    ///
    /// Nothing is fetched under an unsaved ancestor: such a collection is
    /// recorded as a single empty page.
    pub async fn load_search_result(
        &self,
        collection_path: &str,
        parent_ids: &[IdSet],
        page: u32,
        filter: Option<&str>,
    ) -> SyncResult<()> {
        if self.has_unsaved_ancestor(parent_ids).await {
            debug!("Skipping load of {} under an unsaved parent", collection_path);
            self.search_result_pages
                .write()
                .await
                .insert(collection_path.to_string(), 1);
            return Ok(());
        }

        let result = match self
            .api
            .fetch_collection_summary(collection_path, &clean(parent_ids), page, filter)
            .await
        {
            Ok(result) => result,
            Err(e) => return self.swallow_remote("load search result", e),
        };

        self.store.write().await.load(
            collection_path,
            parent_ids,
            result.items,
            DetailLevel::Summary,
            Owner::CollectionSearch,
        )?;
        self.search_result_pages
            .write()
            .await
            .insert(collection_path.to_string(), result.total_pages);
        Ok(())
    }

    /// The current list view of a collection.
    pub async fn get_search_result(&self, collection_path: &str, parent_ids: &[IdSet]) -> SearchResult {
        let total_pages = self
            .search_result_pages
            .read()
            .await
            .get(collection_path)
            .copied();
        let containers = self
            .store
            .read()
            .await
            .get_containers(collection_path, parent_ids, Some(Owner::CollectionSearch))
            .into_iter()
            .cloned()
            .collect();
        SearchResult {
            total_pages,
            containers,
        }
    }

    /// Brings a resident container to detail fidelity.
    ///
    /// Also makes the targets of its set foreign keys resident so their
    /// display names are at hand. A container already at detail level is
    /// left alone.
    pub async fn load_detail(&self, iid: Iid) -> SyncResult<()> {
        let (collection_path, parent_ids, ids) = {
            let store = self.store.read().await;
            let container = store.container(iid).ok_or(SyncError::ContainerNotFound(iid))?;
            if container.detail_level() == DetailLevel::Detail {
                return Ok(());
            }
            (
                container.collection_path().to_string(),
                container.parent_ids().to_vec(),
                container.ids(),
            )
        };

        if self
            .api
            .collection_summary_includes_full_entities(&collection_path)
        {
            debug!("Listing of {} holds full entities; marking {} as detail", collection_path, iid);
            let mut store = self.store.write().await;
            store.register_owner(iid, Owner::Detail)?;
            store.mark_detail(iid)?;
            return Ok(());
        }

        let data = match self
            .api
            .fetch_item_detail(
                &path::item_path(&collection_path),
                &clean(&parent_ids),
                &ids.without_iid(),
            )
            .await
        {
            Ok(data) => data,
            Err(e) => return self.swallow_remote("load detail", e),
        };

        let item_schema = self.store.write().await.item_schema(&collection_path)?;
        self.load_fk_targets(&item_schema, &data).await?;

        let mut store = self.store.write().await;
        store.register_owner(iid, Owner::Detail)?;
        store.upgrade_to_detail(iid, data)?;
        Ok(())
    }

    /// Like [`load_detail`](Self::load_detail), addressed by ids. An item
    /// that is not resident yet is fetched and loaded. Returns its IID, or
    /// `None` if the fetch failed.
    pub async fn load_detail_by_ids(
        &self,
        collection_path: &str,
        parent_ids: &[IdSet],
        ids: &IdSet,
    ) -> SyncResult<Option<Iid>> {
        let existing = self
            .store
            .read()
            .await
            .find_container(collection_path, parent_ids, ids, None)
            .map(EntityContainer::iid);
        if let Some(iid) = existing {
            self.load_detail(iid).await?;
            return Ok(Some(iid));
        }

        let item_schema = self.store.write().await.item_schema(collection_path)?;
        let data = match self
            .api
            .fetch_item_detail(
                &path::item_path(collection_path),
                &clean(parent_ids),
                &ids.without_iid(),
            )
            .await
        {
            Ok(data) => data,
            Err(e) => {
                self.swallow_remote("load detail", e)?;
                return Ok(None);
            }
        };

        self.load_fk_targets(&item_schema, &data).await?;

        let iids = self.store.write().await.load(
            collection_path,
            parent_ids,
            vec![data],
            DetailLevel::Detail,
            Owner::Detail,
        )?;
        Ok(iids.first().copied())
    }

    /// Makes every set FK of `data` resident at summary level with the
    /// `LookupInUse` owner, fetching the ones not cached yet concurrently.
    /// A failed lookup is reported and skipped.
    async fn load_fk_targets(&self, item_schema: &ObjectSchema, data: &Item) -> SyncResult<()> {
        let lookups: Vec<FkLookup> = item_schema
            .foreign_key_field_names()
            .into_iter()
            .filter_map(|field_name| {
                let value = data.get(field_name).filter(|v| is_defined(v))?;
                let meta = ForeignKeyMetadata::for_field(item_schema, data, field_name)?;
                let parent_ids = meta.parent_ids.clone()?;
                let ids = meta.lookup_ids(value);
                Some(FkLookup {
                    meta,
                    parent_ids,
                    ids,
                })
            })
            .collect();

        let missing: Vec<FkLookup> = {
            let mut store = self.store.write().await;
            lookups
                .into_iter()
                .filter(|l| {
                    store
                        .register_item_owner(
                            &l.meta.collection_path,
                            &l.parent_ids,
                            &l.ids,
                            Owner::LookupInUse,
                        )
                        .is_none()
                })
                .collect()
        };
        if missing.is_empty() {
            return Ok(());
        }

        debug!("Fetching {} lookup summary(ies)", missing.len());
        let results = join_all(missing.iter().map(|l| {
            self.api
                .fetch_item_summary(&l.meta.item_path, &l.parent_ids, &l.ids)
        }))
        .await;

        let mut store = self.store.write().await;
        for (lookup, result) in missing.iter().zip(results) {
            match result {
                Ok(summary) => {
                    store.load(
                        &lookup.meta.collection_path,
                        &lookup.parent_ids,
                        vec![summary],
                        DetailLevel::Summary,
                        Owner::LookupInUse,
                    )?;
                }
                Err(e) if e.is_remote() => self.reporter.report("load lookup summary", &e),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    // ── Foreign-key lookups ──────────────────────────────────────

    /// Loads the first page of candidates for an FK field of a container.
    ///
    /// Does nothing while a cascading FK's parent field is unset.
    pub async fn load_fk_lookup_data(&self, iid: Iid, field_name: &str, filter: Option<&str>) -> SyncResult<()> {
        let meta = self.fk_metadata(iid, field_name).await?;
        let Some(parent_ids) = meta.parent_ids else {
            return Ok(());
        };

        let result = match self
            .api
            .fetch_collection_summary(&meta.collection_path, &parent_ids, 1, filter)
            .await
        {
            Ok(result) => result,
            Err(e) => return self.swallow_remote("load lookup data", e),
        };

        self.store.write().await.load(
            &meta.collection_path,
            &parent_ids,
            result.items,
            DetailLevel::Summary,
            Owner::LookupSearch,
        )?;
        Ok(())
    }

    /// The container an FK field currently points at, if resident.
    pub async fn get_lookup_item_container(&self, iid: Iid, field_name: &str) -> SyncResult<Option<EntityContainer>> {
        let store = self.store.read().await;
        let container = store.container(iid).ok_or(SyncError::ContainerNotFound(iid))?;
        let meta = fk_metadata_of(container, field_name)?;
        let (Some(parent_ids), Some(value)) = (
            meta.parent_ids.as_ref(),
            container
                .get_item_field_value(field_name)
                .filter(|v| is_defined(v)),
        ) else {
            return Ok(None);
        };
        Ok(store
            .find_container(&meta.collection_path, parent_ids, &meta.lookup_ids(value), None)
            .cloned())
    }

    /// Points an FK field at `lookup` (or clears it with `None`).
    ///
    /// The chosen target is kept resident, and fields whose FK is scoped by
    /// this one are cleared.
    pub async fn set_lookup_item_container(&self, iid: Iid, field_name: &str, lookup: Option<Iid>) -> SyncResult<()> {
        let mut store = self.store.write().await;
        let container = store.container(iid).ok_or(SyncError::ContainerNotFound(iid))?;
        let meta = fk_metadata_of(container, field_name)?;
        let children: Vec<String> = container
            .child_fk_field_names(field_name)
            .into_iter()
            .map(str::to_string)
            .collect();

        let value = match lookup {
            None => Value::Null,
            Some(fk_iid) => {
                let target = store
                    .container(fk_iid)
                    .ok_or(SyncError::ContainerNotFound(fk_iid))?;
                let key = target
                    .get_item_field_value(&meta.target_field_name)
                    .cloned()
                    .unwrap_or(Value::Null);
                store.register_owner(fk_iid, Owner::LookupInUse)?;
                key
            }
        };
        store.set_item_field_value(iid, field_name, value)?;
        for child in children {
            store.set_item_field_value(iid, &child, Value::Null)?;
        }
        Ok(())
    }

    /// The loaded candidates for an FK field; `None` while a cascading FK's
    /// parent field is unset.
    pub async fn get_lookup_data(&self, iid: Iid, field_name: &str) -> SyncResult<Option<Vec<EntityContainer>>> {
        let store = self.store.read().await;
        let container = store.container(iid).ok_or(SyncError::ContainerNotFound(iid))?;
        let meta = fk_metadata_of(container, field_name)?;
        let Some(parent_ids) = meta.parent_ids else {
            return Ok(None);
        };
        Ok(Some(
            store
                .get_containers(&meta.collection_path, &parent_ids, Some(Owner::LookupSearch))
                .into_iter()
                .cloned()
                .collect(),
        ))
    }

    // ── Helpers ──────────────────────────────────────────────────

    async fn fk_metadata(&self, iid: Iid, field_name: &str) -> SyncResult<ForeignKeyMetadata> {
        let store = self.store.read().await;
        let container = store.container(iid).ok_or(SyncError::ContainerNotFound(iid))?;
        fk_metadata_of(container, field_name)
    }

    async fn has_unsaved_ancestor(&self, parent_ids: &[IdSet]) -> bool {
        let store = self.store.read().await;
        parent_ids.iter().any(|ids| {
            ids.iid()
                .and_then(|iid| store.container(iid))
                .is_some_and(EntityContainer::is_new_item)
        })
    }

    /// Reports a remote failure and turns it into success; anything else is
    /// returned.
    fn swallow_remote(&self, operation: &str, error: SyncError) -> SyncResult<()> {
        if error.is_remote() {
            self.reporter.report(operation, &error);
            Ok(())
        } else {
            Err(error)
        }
    }
}

fn fk_metadata_of(container: &EntityContainer, field_name: &str) -> SyncResult<ForeignKeyMetadata> {
    container
        .foreign_key_metadata(field_name)
        .ok_or_else(|| SyncError::NotAForeignKey {
            field_name: field_name.to_string(),
        })
}

/// Ancestor ids as sent over the wire.
fn clean(parent_ids: &[IdSet]) -> Vec<IdSet> {
    parent_ids.iter().map(IdSet::without_iid).collect()
}
