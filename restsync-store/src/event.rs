use restsync_types::Iid;

/// Change notification published by the store.
///
/// A UI adapter subscribes to these to drive whatever reactivity its
/// framework uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A container was created by a load or an add.
    Added(Iid),
    /// A container's fields, state or owners changed.
    Changed(Iid),
    /// A container left the store.
    Removed(Iid),
    /// A page of a collection was loaded.
    Loaded { collection_path: String },
    /// All local changes were discarded.
    Cancelled,
}
