//! Core type definitions for restsync.
//!
//! This crate defines the identity and lifecycle vocabulary shared by the
//! schema, store and sync layers:
//! - [`Iid`], the client-side internal identifier given to every container
//! - [`IdSet`], the primary-key tuple (plus optional IID) naming one entity
//! - [`Item`], the field/value map of a single entity
//! - [`ChangeType`], [`DetailLevel`] and [`Owner`] lifecycle enums
//!
//! Nothing in here knows about schemas or HTTP.

mod ids;
mod item;
mod lifecycle;

pub use ids::{ids_match, IdSet, Iid};
pub use item::{is_defined, item_iid, strip_iid, Item, IID_FIELD};
pub use lifecycle::{ChangeType, DetailLevel, Owner};
