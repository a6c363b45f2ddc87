//! Identifier types used throughout restsync.
//!
//! An entity is named by an [`IdSet`]: its primary-key values, optionally
//! accompanied by the [`Iid`] of the container holding it. The IID is what
//! lets unsaved entities be referenced before the server has assigned them
//! a key.

use crate::item::{is_defined, Item, IID_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Process-unique internal identifier assigned to every container.
///
/// Never sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iid(Uuid);

impl Iid {
    /// Creates a fresh random IID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an IID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parses an IID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Reads an IID out of a JSON value, if it holds one.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_str().and_then(|s| Self::parse(s).ok())
    }

    /// The JSON form stored inside items.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::String(self.0.to_string())
    }
}

impl Default for Iid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Iid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Iid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Primary-key values identifying one entity, plus an optional IID.
///
/// Serializes as a flat map, the IID under [`IID_FIELD`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdSet {
    #[serde(rename = "__iid", default, skip_serializing_if = "Option::is_none")]
    iid: Option<Iid>,
    #[serde(flatten)]
    keys: BTreeMap<String, Value>,
}

impl IdSet {
    /// An empty id set. Matches nothing until populated.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An id set carrying only an IID (an unsaved entity).
    #[must_use]
    pub fn from_iid(iid: Iid) -> Self {
        Self {
            iid: Some(iid),
            keys: BTreeMap::new(),
        }
    }

    /// Builder: adds a key value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keys.insert(key.into(), value.into());
        self
    }

    /// Builder: attaches an IID.
    #[must_use]
    pub fn with_iid(mut self, iid: Iid) -> Self {
        self.iid = Some(iid);
        self
    }

    /// Extracts the id set of an item given its primary-key field names.
    ///
    /// Only defined key values are taken; the IID comes from [`IID_FIELD`].
    pub fn from_item<S: AsRef<str>>(item: &Item, pk_field_names: &[S]) -> Self {
        let keys = pk_field_names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                item.get(name)
                    .filter(|v| is_defined(v))
                    .map(|v| (name.to_string(), v.clone()))
            })
            .collect();
        Self {
            iid: item.get(IID_FIELD).and_then(Iid::from_value),
            keys,
        }
    }

    /// The IID, if any.
    #[must_use]
    pub fn iid(&self) -> Option<Iid> {
        self.iid
    }

    /// Looks up a key value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.keys.get(key)
    }

    /// Sets a key value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.keys.insert(key.into(), value.into());
    }

    /// All key values, defined or not.
    pub fn keys(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.keys.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Key values that are set (non-null).
    pub fn defined_keys(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.keys().filter(|(_, v)| is_defined(v))
    }

    /// True when neither an IID nor any defined key is present.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        self.iid.is_none() && self.defined_keys().next().is_none()
    }

    /// True when the set is known only by its IID.
    #[must_use]
    pub fn is_iid_only(&self) -> bool {
        self.iid.is_some() && self.defined_keys().next().is_none()
    }

    /// A copy with the IID removed (the wire form).
    #[must_use]
    pub fn without_iid(&self) -> Self {
        Self {
            iid: None,
            keys: self.keys.clone(),
        }
    }

    /// See [`ids_match`].
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        ids_match(self, other)
    }

    /// The JSON object form, IID included.
    #[must_use]
    pub fn to_item(&self) -> Item {
        let mut map: Map<String, Value> = self
            .keys
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(iid) = self.iid {
            map.insert(IID_FIELD.to_string(), iid.to_value());
        }
        map
    }
}

/// Identity rule for two id sets.
///
/// They match if both carry the same IID, or if both have the same non-empty
/// set of defined key fields with equal values. A set with no IID and no
/// defined keys never matches anything.
#[must_use]
pub fn ids_match(a: &IdSet, b: &IdSet) -> bool {
    if let (Some(x), Some(y)) = (a.iid, b.iid) {
        if x == y {
            return true;
        }
    }
    let a_keys: Vec<(&str, &Value)> = a.defined_keys().collect();
    if a_keys.is_empty() {
        return false;
    }
    a_keys.len() == b.defined_keys().count()
        && a_keys.iter().all(|(k, v)| b.keys.get(*k) == Some(*v))
}
