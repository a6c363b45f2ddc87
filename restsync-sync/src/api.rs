//! The API access boundary.
//!
//! [`ApiAccess`] is everything the controller needs from a backend. The
//! HTTP implementation is [`RestApi`](crate::RestApi); [`mock::MockApi`]
//! stands in for it in tests.

use crate::error::SyncResult;
use async_trait::async_trait;
use restsync_types::{IdSet, Item};
use serde::{Deserialize, Serialize};

/// One page of a collection listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult {
    pub items: Vec<Item>,
    pub total_pages: u32,
}

impl PagedResult {
    /// A single empty page.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_pages: 1,
        }
    }
}

impl Default for PagedResult {
    fn default() -> Self {
        Self::empty()
    }
}

/// Remote operations on the resource tree.
///
/// Paths are schema paths; ancestor id sets arrive without IIDs.
#[async_trait]
pub trait ApiAccess: Send + Sync {
    /// Fetches one page (1-based) of a collection's summaries.
    async fn fetch_collection_summary(
        &self,
        collection_path: &str,
        parent_ids: &[IdSet],
        page: u32,
        filter: Option<&str>,
    ) -> SyncResult<PagedResult>;

    /// Fetches the full representation of one item.
    async fn fetch_item_detail(
        &self,
        item_path: &str,
        parent_ids: &[IdSet],
        ids: &IdSet,
    ) -> SyncResult<Item>;

    /// Fetches the summary representation of one item.
    async fn fetch_item_summary(
        &self,
        item_path: &str,
        parent_ids: &[IdSet],
        ids: &IdSet,
    ) -> SyncResult<Item> {
        self.fetch_item_detail(item_path, parent_ids, ids).await
    }

    /// Creates an item. The response, if any, echoes server-assigned fields.
    async fn create_item(
        &self,
        collection_path: &str,
        parent_ids: &[IdSet],
        item: &Item,
    ) -> SyncResult<Option<Item>>;

    async fn update_item(&self, item_path: &str, parent_ids: &[IdSet], item: &Item)
    -> SyncResult<()>;

    async fn delete_item(&self, item_path: &str, parent_ids: &[IdSet], item: &Item)
    -> SyncResult<()>;

    /// Whether collection listings already hold every field.
    fn collection_summary_includes_full_entities(&self, _collection_path: &str) -> bool {
        false
    }
}

/// An in-memory API for testing.
pub mod mock {
    use super::*;
    use crate::error::SyncError;
    use restsync_types::ids_match;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    /// Which operation a call or scripted failure refers to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum ApiOp {
        FetchCollectionSummary,
        FetchItemDetail,
        FetchItemSummary,
        Create,
        Update,
        Delete,
    }

    /// A recorded call.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ApiCall {
        pub op: ApiOp,
        /// Collection path for listings and creates, item path otherwise.
        pub path: String,
        pub parent_ids: Vec<IdSet>,
        /// Lookup ids for item fetches.
        pub ids: Option<IdSet>,
        /// Payload for creates, updates and deletes.
        pub item: Option<Item>,
        pub page: Option<u32>,
        pub filter: Option<String>,
    }

    impl ApiCall {
        fn new(op: ApiOp, path: &str, parent_ids: &[IdSet]) -> Self {
            Self {
                op,
                path: path.to_string(),
                parent_ids: parent_ids.to_vec(),
                ids: None,
                item: None,
                page: None,
                filter: None,
            }
        }
    }

    /// Records every call and answers from scripted data.
    ///
    /// Collections are served by collection path regardless of ancestors;
    /// items are looked up by item path and matching ids. Unscripted item
    /// fetches fail with a 404.
    #[derive(Debug, Default)]
    pub struct MockApi {
        calls: Mutex<Vec<ApiCall>>,
        collections: Mutex<HashMap<String, PagedResult>>,
        items: Mutex<Vec<(String, IdSet, Item)>>,
        create_responses: Mutex<VecDeque<Option<Item>>>,
        failures: Mutex<Vec<(ApiOp, String)>>,
        full_entities: bool,
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl MockApi {
        /// Creates an empty mock API.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes collection listings report full entities.
        pub fn with_full_entities(mut self) -> Self {
            self.full_entities = true;
            self
        }

        /// Serves `items` as a single page for `collection_path`.
        pub fn set_collection(&self, collection_path: impl Into<String>, items: Vec<Item>) {
            lock(&self.collections).insert(
                collection_path.into(),
                PagedResult {
                    items,
                    total_pages: 1,
                },
            );
        }

        /// Serves a specific paged result for `collection_path`.
        pub fn set_page(&self, collection_path: impl Into<String>, result: PagedResult) {
            lock(&self.collections).insert(collection_path.into(), result);
        }

        /// Serves `item` for fetches of `item_path` with matching ids.
        pub fn set_item(&self, item_path: impl Into<String>, ids: IdSet, item: Item) {
            lock(&self.items).push((item_path.into(), ids, item));
        }

        /// Queues the response of the next create.
        pub fn push_create_response(&self, response: Option<Item>) {
            lock(&self.create_responses).push_back(response);
        }

        /// Makes every `op` on `path` fail with a 500.
        pub fn fail(&self, op: ApiOp, path: impl Into<String>) {
            lock(&self.failures).push((op, path.into()));
        }

        /// All calls so far, in order.
        pub fn calls(&self) -> Vec<ApiCall> {
            lock(&self.calls).clone()
        }

        /// Calls of one kind, in order.
        pub fn calls_of(&self, op: ApiOp) -> Vec<ApiCall> {
            lock(&self.calls)
                .iter()
                .filter(|c| c.op == op)
                .cloned()
                .collect()
        }

        fn record(&self, call: ApiCall) -> SyncResult<()> {
            let failing = lock(&self.failures)
                .iter()
                .any(|(op, path)| *op == call.op && *path == call.path);
            let error = failing.then(|| SyncError::Server {
                status: 500,
                body: format!("scripted failure for {:?} {}", call.op, call.path),
            });
            lock(&self.calls).push(call);
            error.map_or(Ok(()), Err)
        }

        fn find_item(&self, item_path: &str, ids: &IdSet) -> SyncResult<Item> {
            lock(&self.items)
                .iter()
                .find(|(path, candidate, _)| path == item_path && ids_match(candidate, ids))
                .map(|(_, _, item)| item.clone())
                .ok_or_else(|| SyncError::Server {
                    status: 404,
                    body: format!("no item at {item_path}"),
                })
        }
    }

    #[async_trait]
    impl ApiAccess for MockApi {
        async fn fetch_collection_summary(
            &self,
            collection_path: &str,
            parent_ids: &[IdSet],
            page: u32,
            filter: Option<&str>,
        ) -> SyncResult<PagedResult> {
            let mut call = ApiCall::new(ApiOp::FetchCollectionSummary, collection_path, parent_ids);
            call.page = Some(page);
            call.filter = filter.map(str::to_string);
            self.record(call)?;
            Ok(lock(&self.collections)
                .get(collection_path)
                .cloned()
                .unwrap_or_default())
        }

        async fn fetch_item_detail(
            &self,
            item_path: &str,
            parent_ids: &[IdSet],
            ids: &IdSet,
        ) -> SyncResult<Item> {
            let mut call = ApiCall::new(ApiOp::FetchItemDetail, item_path, parent_ids);
            call.ids = Some(ids.clone());
            self.record(call)?;
            self.find_item(item_path, ids)
        }

        async fn fetch_item_summary(
            &self,
            item_path: &str,
            parent_ids: &[IdSet],
            ids: &IdSet,
        ) -> SyncResult<Item> {
            let mut call = ApiCall::new(ApiOp::FetchItemSummary, item_path, parent_ids);
            call.ids = Some(ids.clone());
            self.record(call)?;
            self.find_item(item_path, ids)
        }

        async fn create_item(
            &self,
            collection_path: &str,
            parent_ids: &[IdSet],
            item: &Item,
        ) -> SyncResult<Option<Item>> {
            let mut call = ApiCall::new(ApiOp::Create, collection_path, parent_ids);
            call.item = Some(item.clone());
            self.record(call)?;
            Ok(lock(&self.create_responses).pop_front().flatten())
        }

        async fn update_item(
            &self,
            item_path: &str,
            parent_ids: &[IdSet],
            item: &Item,
        ) -> SyncResult<()> {
            let mut call = ApiCall::new(ApiOp::Update, item_path, parent_ids);
            call.item = Some(item.clone());
            self.record(call)
        }

        async fn delete_item(
            &self,
            item_path: &str,
            parent_ids: &[IdSet],
            item: &Item,
        ) -> SyncResult<()> {
            let mut call = ApiCall::new(ApiOp::Delete, item_path, parent_ids);
            call.item = Some(item.clone());
            self.record(call)
        }

        fn collection_summary_includes_full_entities(&self, _collection_path: &str) -> bool {
            self.full_entities
        }
    }
}
