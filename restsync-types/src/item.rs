//! Item helpers.
//!
//! An item is the plain field/value map of one entity. Resident items always
//! carry their IID under [`IID_FIELD`]; the wire form never does.

use crate::Iid;
use serde_json::{Map, Value};

/// The field/value map of a single entity.
pub type Item = Map<String, Value>;

/// Field name under which a container's IID is kept inside its item.
pub const IID_FIELD: &str = "__iid";

/// Returns true if a value counts as set (present and not `null`).
#[must_use]
pub fn is_defined(value: &Value) -> bool {
    !value.is_null()
}

/// Reads the IID stored in an item, if any.
#[must_use]
pub fn item_iid(item: &Item) -> Option<Iid> {
    item.get(IID_FIELD).and_then(Iid::from_value)
}

/// Returns a copy of the item without its IID field.
#[must_use]
pub fn strip_iid(item: &Item) -> Item {
    let mut clean = item.clone();
    clean.remove(IID_FIELD);
    clean
}
