//! HTTP implementation of [`ApiAccess`].
//!
//! Collections live at `GET <collection url>`, items at
//! `GET|PUT|DELETE <item url>`, and creates go to `POST <collection url>`.
//! All requests share one concurrency limit.

use crate::api::{ApiAccess, PagedResult};
use crate::config::{ApiConfig, FilterMode, PagingMode};
use crate::error::{SyncError, SyncResult};
use crate::url::build_url;
use async_trait::async_trait;
use reqwest::{Client, Method};
use restsync_schema::{path, resolve_item_schema, SchemaNode};
use restsync_types::{IdSet, Item};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// REST client for a schema-described API.
pub struct RestApi {
    config: ApiConfig,
    schema: Arc<SchemaNode>,
    client: Client,
    /// Bounds the number of requests in flight.
    limiter: Arc<Semaphore>,
    /// `<url><METHOD>` of every request currently in flight.
    in_flight: Arc<Mutex<Vec<String>>>,
}

impl RestApi {
    /// Creates a client for the API described by `schema`.
    pub fn new(config: ApiConfig, schema: Arc<SchemaNode>) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            limiter: Arc::new(Semaphore::new(config.concurrent_fetches_limit.max(1))),
            config,
            schema,
            client,
            in_flight: Arc::new(Mutex::new(Vec::new())),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Keys of the requests currently in flight.
    pub fn in_flight(&self) -> Vec<String> {
        lock(&self.in_flight).clone()
    }

    fn url(&self, schema_path: &str, target_ids: Option<&IdSet>, parent_ids: &[IdSet]) -> SyncResult<String> {
        build_url(
            &self.schema,
            &self.config.base_url,
            schema_path,
            target_ids,
            parent_ids,
        )
        .ok_or_else(|| SyncError::UnresolvableUrl {
            path: schema_path.to_string(),
        })
    }

    /// Primary-key ids of an item living at `item_path`.
    fn item_ids(&self, item_path: &str, item: &Item) -> SyncResult<IdSet> {
        let item_schema = resolve_item_schema(&self.schema, path::collection_path(item_path))?;
        Ok(IdSet::from_item(item, &item_schema.primary_key_field_names()))
    }

    fn query_params(&self, page: u32, filter: Option<&str>) -> Vec<String> {
        let mut params = Vec::new();
        if self.config.paging_mode == PagingMode::ServerSide {
            params.push(format!("page={page}"));
            params.push(format!("pageSize={}", self.config.page_size));
        }
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            if self.config.filter_mode == FilterMode::ServerSide {
                params.push(format!("filter={}", urlencoding::encode(filter)));
            }
        }
        params
    }

    /// Sends one request under the concurrency limit. An empty body yields
    /// `None`.
    async fn send(&self, method: Method, url: String, body: Option<&Item>) -> SyncResult<Option<Value>> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| SyncError::Network(format!("request limiter closed: {e}")))?;

        let _tracked = InFlight::track(&self.in_flight, format!("{url}{method}"));
        self.execute(method, &url, body).await
    }

    async fn execute(&self, method: Method, url: &str, body: Option<&Item>) -> SyncResult<Option<Value>> {
        debug!("{} {}", method, url);
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| SyncError::Network(format!("failed to read response from {url}: {e}")))?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Turns a raw collection response into one page, filtering and paging
    /// locally where the config says so.
    fn page_results(
        &self,
        raw: Option<Value>,
        collection_path: &str,
        page: u32,
        filter: Option<&str>,
    ) -> SyncResult<PagedResult> {
        let Some(raw) = raw.filter(|v| !v.is_null()) else {
            return Ok(PagedResult::empty());
        };
        let filter = filter.filter(|f| !f.is_empty());
        let filter_locally = filter.is_some() && self.config.filter_mode == FilterMode::ClientSide;
        if filter_locally && self.config.paging_mode == PagingMode::ServerSide {
            return Err(SyncError::UnsupportedQueryMode);
        }

        let (raw_items, server_pages) = match self.config.paging_mode {
            PagingMode::ClientSide => (raw, None),
            PagingMode::ServerSide => {
                let total = raw
                    .get("totalPages")
                    .and_then(Value::as_u64)
                    .map_or(1, |n| u32::try_from(n).unwrap_or(u32::MAX));
                (raw.get("items").cloned().unwrap_or(Value::Array(Vec::new())), Some(total))
            }
        };
        let mut items = into_items(raw_items)?;

        if let Some(total_pages) = server_pages {
            return Ok(PagedResult { items, total_pages });
        }

        let display_field = self.display_field(collection_path)?;
        if let Some(filter) = filter.filter(|_| filter_locally) {
            let needle = filter.to_uppercase();
            items.retain(|item| display_text(item, &display_field).to_uppercase().contains(&needle));
        }

        items.sort_by(|a, b| compare_display(a, b, &display_field));
        let size = self.config.page_size.max(1);
        let total_pages = items.len().div_ceil(size).max(1);
        let start = (page.max(1) as usize - 1) * size;
        let items = items.into_iter().skip(start).take(size).collect();
        Ok(PagedResult {
            items,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        })
    }

    fn display_field(&self, collection_path: &str) -> SyncResult<String> {
        resolve_item_schema(&self.schema, collection_path)?
            .display_name_field_names()
            .first()
            .map(|name| (*name).to_string())
            .ok_or_else(|| SyncError::NoDisplayField {
                collection_path: collection_path.to_string(),
            })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps a request key listed while the request is pending, including
/// when the request future is dropped early.
struct InFlight<'a> {
    keys: &'a Mutex<Vec<String>>,
    key: String,
}

impl<'a> InFlight<'a> {
    fn track(keys: &'a Mutex<Vec<String>>, key: String) -> Self {
        lock(keys).push(key.clone());
        Self { keys, key }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut keys = lock(self.keys);
        if let Some(pos) = keys.iter().position(|k| *k == self.key) {
            keys.remove(pos);
        }
    }
}

fn into_items(raw: Value) -> SyncResult<Vec<Item>> {
    let Value::Array(entries) = raw else {
        return Err(SyncError::Protocol("expected an array of items".to_string()));
    };
    entries
        .into_iter()
        .map(|entry| match entry {
            Value::Object(item) => Ok(item),
            other => Err(SyncError::Protocol(format!("expected an item object, got {other}"))),
        })
        .collect()
}

fn into_item(raw: Option<Value>, url: &str) -> SyncResult<Item> {
    match raw {
        Some(Value::Object(item)) => Ok(item),
        Some(other) => Err(SyncError::Protocol(format!("expected an item object from {url}, got {other}"))),
        None => Err(SyncError::Protocol(format!("empty response from {url}"))),
    }
}

fn display_text(item: &Item, field: &str) -> String {
    match item.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Case-insensitive order, ties broken by the raw text.
fn compare_display(a: &Item, b: &Item, field: &str) -> Ordering {
    let (a, b) = (display_text(a, field), display_text(b, field));
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(&b))
}

#[async_trait]
impl ApiAccess for RestApi {
    async fn fetch_collection_summary(
        &self,
        collection_path: &str,
        parent_ids: &[IdSet],
        page: u32,
        filter: Option<&str>,
    ) -> SyncResult<PagedResult> {
        let base = self.url(collection_path, None, parent_ids)?;
        let params = self.query_params(page, filter);
        let url = if params.is_empty() {
            base
        } else {
            format!("{base}?{}", params.join("&"))
        };
        let raw = self.send(Method::GET, url, None).await?;
        self.page_results(raw, collection_path, page, filter)
    }

    async fn fetch_item_detail(
        &self,
        item_path: &str,
        parent_ids: &[IdSet],
        ids: &IdSet,
    ) -> SyncResult<Item> {
        let url = self.url(item_path, Some(ids), parent_ids)?;
        let raw = self.send(Method::GET, url.clone(), None).await?;
        into_item(raw, &url)
    }

    async fn create_item(
        &self,
        collection_path: &str,
        parent_ids: &[IdSet],
        item: &Item,
    ) -> SyncResult<Option<Item>> {
        let url = self.url(collection_path, None, parent_ids)?;
        let raw = self.send(Method::POST, url.clone(), Some(item)).await?;
        match raw {
            None | Some(Value::Null) => Ok(None),
            raw => into_item(raw, &url).map(Some),
        }
    }

    async fn update_item(&self, item_path: &str, parent_ids: &[IdSet], item: &Item) -> SyncResult<()> {
        let ids = self.item_ids(item_path, item)?;
        let url = self.url(item_path, Some(&ids), parent_ids)?;
        self.send(Method::PUT, url, Some(item)).await?;
        Ok(())
    }

    async fn delete_item(&self, item_path: &str, parent_ids: &[IdSet], item: &Item) -> SyncResult<()> {
        let ids = self.item_ids(item_path, item)?;
        let url = self.url(item_path, Some(&ids), parent_ids)?;
        self.send(Method::DELETE, url, None).await?;
        Ok(())
    }

    fn collection_summary_includes_full_entities(&self, _collection_path: &str) -> bool {
        self.config.collection_summaries_include_full_entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restsync_schema::FieldDescriptor;
    use serde_json::json;

    fn api(config: ApiConfig) -> RestApi {
        let schema = SchemaNode::object([(
            "makes",
            SchemaNode::array(SchemaNode::object([
                ("makeId", FieldDescriptor::string().pk().into()),
                ("name", FieldDescriptor::string().into()),
            ])),
        )]);
        RestApi::new(config, Arc::new(schema)).unwrap()
    }

    fn names(result: &PagedResult) -> Vec<&str> {
        result
            .items
            .iter()
            .map(|i| i["name"].as_str().unwrap())
            .collect()
    }

    fn raw_makes(count: usize) -> Value {
        Value::Array(
            (0..count)
                .rev()
                .map(|i| json!({ "makeId": i.to_string(), "name": format!("make {i:02}") }))
                .collect(),
        )
    }

    #[test]
    fn client_side_paging_sorts_and_slices() {
        let api = api(ApiConfig::default());
        let page = api.page_results(Some(raw_makes(25)), "makes", 3, None).unwrap();
        assert_eq!(page.total_pages, 3);
        assert_eq!(names(&page), vec!["make 20", "make 21", "make 22", "make 23", "make 24"]);
    }

    #[test]
    fn client_side_paging_ignores_case() {
        let api = api(ApiConfig::default());
        let raw = json!([
            { "makeId": "1", "name": "Zed" },
            { "makeId": "2", "name": "austin" },
            { "makeId": "3", "name": "Bmw" }
        ]);
        let page = api.page_results(Some(raw), "makes", 1, None).unwrap();
        assert_eq!(names(&page), vec!["austin", "Bmw", "Zed"]);
    }

    #[test]
    fn empty_collection_is_one_page() {
        let api = api(ApiConfig::default());
        let page = api.page_results(Some(json!([])), "makes", 1, None).unwrap();
        assert_eq!(page, PagedResult::empty());
        assert_eq!(api.page_results(None, "makes", 1, None).unwrap(), PagedResult::empty());
    }

    #[test]
    fn client_side_filter_is_case_insensitive() {
        let api = api(ApiConfig::default());
        let raw = json!([{ "makeId": "1", "name": "Ford" }, { "makeId": "2", "name": "Austin" }]);
        let page = api.page_results(Some(raw), "makes", 1, Some("fo")).unwrap();
        assert_eq!(names(&page), vec!["Ford"]);
    }

    #[test]
    fn server_side_paging_passes_through() {
        let api = api(ApiConfig {
            paging_mode: PagingMode::ServerSide,
            filter_mode: FilterMode::ServerSide,
            ..ApiConfig::default()
        });
        let raw = json!({ "items": [{ "makeId": "9", "name": "Zed" }], "totalPages": 4 });
        let page = api.page_results(Some(raw), "makes", 2, Some("z")).unwrap();
        assert_eq!(page.total_pages, 4);
        assert_eq!(names(&page), vec!["Zed"]);
    }

    #[test]
    fn client_filter_on_server_pages_is_rejected() {
        let api = api(ApiConfig {
            paging_mode: PagingMode::ServerSide,
            ..ApiConfig::default()
        });
        let err = api
            .page_results(Some(json!({ "items": [] })), "makes", 1, Some("x"))
            .unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedQueryMode));
    }

    #[test]
    fn query_params_follow_modes() {
        let client = api(ApiConfig::default());
        assert!(client.query_params(2, Some("a b")).is_empty());
        let server = api(ApiConfig {
            paging_mode: PagingMode::ServerSide,
            filter_mode: FilterMode::ServerSide,
            page_size: 20,
            ..ApiConfig::default()
        });
        assert_eq!(
            server.query_params(2, Some("a b")),
            vec!["page=2", "pageSize=20", "filter=a%20b"]
        );
    }
}
