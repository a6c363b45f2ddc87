//! REST access and save/load orchestration for restsync.
//!
//! # Architecture
//!
//! - **Url**: maps schema paths and ids onto REST URLs ([`build_url`])
//! - **Api**: the [`ApiAccess`] boundary and its HTTP implementation [`RestApi`]
//! - **Controller**: [`SyncController`] loads pages and details into an
//!   [`EntityStore`](restsync_store::EntityStore) and replays dirty
//!   containers to the API
//!
//! ## Save Process
//!
//! 1. **Validate**: every dirty container is validated (unless forced)
//! 2. **Order**: containers are replayed in the order they became dirty
//! 3. **Fix ancestors**: ids of just-created parents are copied into children
//! 4. **Dispatch**: `add` POSTs, `edit` PUTs, `delete` DELETEs
//! 5. **Finalize**: server-generated fields are patched in and the container
//!    becomes clean
//!
//! # Example
//!
//! ```no_run
//! use restsync_schema::{FieldDescriptor, SchemaNode};
//! use restsync_sync::{ApiConfig, RestApi, SyncController};
//! use std::sync::Arc;
//!
//! # async fn run() -> restsync_sync::SyncResult<()> {
//! let schema = SchemaNode::object([(
//!     "makes",
//!     SchemaNode::array(SchemaNode::object([
//!         ("makeId", FieldDescriptor::string().pk().generated().into()),
//!         ("name", FieldDescriptor::string().into()),
//!     ])),
//! )]);
//! let api = RestApi::new(ApiConfig::default(), Arc::new(schema.clone()))?;
//! let controller = SyncController::new(schema, Arc::new(api));
//!
//! controller.load_search_result("makes", &[], 1, None).await?;
//! let result = controller.get_search_result("makes", &[]).await;
//! println!("{} makes", result.containers.len());
//! # Ok(())
//! # }
//! ```

pub mod api;
mod config;
mod controller;
mod error;
mod reporter;
mod rest;
mod url;

pub use api::{ApiAccess, PagedResult};
pub use config::{ApiConfig, ControllerConfig, FilterMode, PagingMode, SavePolicy};
pub use controller::{SaveReport, SearchResult, SyncController};
pub use error::{SyncError, SyncResult};
pub use reporter::{ErrorReporter, TracingErrorReporter};
pub use rest::RestApi;
pub use url::build_url;
