use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// In sync with the server.
    #[default]
    None,
    /// Created locally, never persisted.
    Add,
    /// Persisted entity with local field changes.
    Edit,
    /// Persisted entity marked for deletion.
    Delete,
}

impl ChangeType {
    /// Whether this state has to be replayed to the server.
    #[must_use]
    pub const fn is_dirty(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Add => "add",
            Self::Edit => "edit",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// How complete a resident item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    /// Partial fields, as returned by a collection listing.
    Summary,
    /// Full fields, as returned by an item fetch.
    Detail,
}

/// Why a container is resident in the store.
///
/// A container whose owner set becomes empty is evicted, unless it is dirty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    /// Shown in a collection list view.
    CollectionSearch,
    /// Offered as a candidate in a foreign-key lookup.
    LookupSearch,
    /// Currently referenced by a foreign-key field being displayed.
    LookupInUse,
    /// Opened in a detail view.
    Detail,
}

impl Owner {
    /// Search owners are the ones a page reload takes away.
    #[must_use]
    pub const fn is_search(self) -> bool {
        matches!(self, Self::CollectionSearch | Self::LookupSearch)
    }
}
