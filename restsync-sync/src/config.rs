//! Configuration for API access and the controller.

use serde::{Deserialize, Serialize};

/// Where collection results are paged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagingMode {
    /// The server returns the whole collection as an array; pages are cut
    /// locally after sorting by display name.
    #[default]
    ClientSide,
    /// The server takes `page`/`pageSize` and returns `{ items, totalPages }`.
    ServerSide,
}

/// Where collection results are filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Substring match on the first display-name field.
    #[default]
    ClientSide,
    /// The server takes a `filter` parameter.
    ServerSide,
}

/// Configuration for [`RestApi`](crate::RestApi).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every resource path is appended to.
    pub base_url: String,
    /// Maximum number of requests in flight at once.
    pub concurrent_fetches_limit: usize,
    /// Page size for paged collection fetches.
    pub page_size: usize,
    pub paging_mode: PagingMode,
    pub filter_mode: FilterMode,
    /// Collection listings already carry every field, so opening an item
    /// needs no detail fetch.
    pub collection_summaries_include_full_entities: bool,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            concurrent_fetches_limit: 100,
            page_size: 10,
            paging_mode: PagingMode::default(),
            filter_mode: FilterMode::default(),
            collection_summaries_include_full_entities: false,
            timeout_secs: 60,
        }
    }
}

/// Whether a save may go ahead while containers have validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavePolicy {
    /// Refuse to save while any dirty container fails validation.
    #[default]
    RequireValid,
    /// Save regardless of validation errors.
    Force,
}

/// Configuration for [`SyncController`](crate::SyncController).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub save_policy: SavePolicy,
}
