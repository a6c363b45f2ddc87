//! Client-side entity cache for restsync.
//!
//! The store maps a path-addressed tree of remote resources onto a flat list
//! of mutable [`EntityContainer`]s. Each container tracks its own lifecycle
//! (`none`/`add`/`edit`/`delete`), the order in which it became dirty, its
//! validation errors and the views that keep it resident.
//!
//! # Invariants
//!
//! - No two containers at the same path and ancestor ids have matching ids.
//! - Loading a page never evicts a dirty container, nor one another view
//!   still owns.
//! - The IID never leaves the client: clean items, clean parent ids and
//!   [`EntityStore::to_object`] all strip it.
//!
//! All mutation goes through [`EntityStore`] methods. Observers can follow
//! changes through [`EntityStore::subscribe`].

mod container;
mod error;
mod event;
mod store;
mod tree;

pub use container::{ChangeSequencer, EntityContainer};
pub use error::{StoreError, StoreResult};
pub use event::StoreEvent;
pub use store::EntityStore;
