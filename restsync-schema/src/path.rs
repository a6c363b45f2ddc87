//! Helpers for dotted schema paths.

/// The segment meaning "one element of the preceding array".
pub const ARRAY_MARKER: &str = "[]";

/// Splits a path into its non-empty segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

/// The item path for a collection: `makes` -> `makes.[]`.
#[must_use]
pub fn item_path(collection_path: &str) -> String {
    if collection_path.is_empty() {
        ARRAY_MARKER.to_string()
    } else {
        format!("{collection_path}.{ARRAY_MARKER}")
    }
}

/// The collection path for an item path: `makes.[]` -> `makes`.
///
/// Paths that do not end with the array marker are returned unchanged.
#[must_use]
pub fn collection_path(item_path: &str) -> &str {
    item_path
        .strip_suffix(ARRAY_MARKER)
        .map_or(item_path, |rest| rest.strip_suffix('.').unwrap_or(rest))
}

/// Whether the last segment is the array marker.
#[must_use]
pub fn is_item_path(path: &str) -> bool {
    segments(path).last() == Some(ARRAY_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_skip_empty_chunks() {
        let chunks: Vec<&str> = segments(".makes..[].models").collect();
        assert_eq!(chunks, vec!["makes", "[]", "models"]);
        assert_eq!(segments("").count(), 0);
    }

    #[test]
    fn item_and_collection_paths_invert() {
        assert_eq!(item_path("makes.[].models"), "makes.[].models.[]");
        assert_eq!(collection_path("makes.[].models.[]"), "makes.[].models");
        assert_eq!(collection_path("makes"), "makes");
        assert!(is_item_path("makes.[]"));
        assert!(!is_item_path("makes"));
    }
}
