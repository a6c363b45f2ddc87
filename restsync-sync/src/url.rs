//! Mapping schema paths and ids onto REST URLs.

use restsync_schema::path::{self, ARRAY_MARKER};
use restsync_schema::SchemaNode;
use restsync_types::{is_defined, IdSet};
use serde_json::Value;

/// Builds the URL of a collection or item.
///
/// Field segments are appended as-is. Each `[]` segment consumes the next
/// ancestor id set and appends its primary-key values in declaration order.
/// When the ancestors run out at a `[]`, `target_ids` addresses the item
/// and ends the walk. A path ending on a collection with `target_ids` given
/// addresses one item of that collection.
///
/// Key values that are missing or `null` render as the literal `null`, so
/// children of an unsaved ancestor still get a well-formed URL.
///
/// Returns `None` when a segment does not exist in the schema or a `[]` has
/// neither an ancestor nor a target id set.
#[must_use]
pub fn build_url(
    schema: &SchemaNode,
    base_url: &str,
    schema_path: &str,
    target_ids: Option<&IdSet>,
    ancestor_ids: &[IdSet],
) -> Option<String> {
    let mut url = base_url.trim_end_matches('/').to_string();
    let mut node = schema;
    let mut ancestors = ancestor_ids.iter();

    for segment in path::segments(schema_path) {
        if segment == ARRAY_MARKER {
            let element = node.as_array()?.items.as_ref();
            match ancestors.next() {
                Some(ids) => push_keys(&mut url, element, ids),
                None => {
                    push_keys(&mut url, element, target_ids?);
                    return Some(url);
                }
            }
            node = element;
        } else {
            node = node.as_object()?.field(segment)?;
            url.push('/');
            url.push_str(segment);
        }
    }

    if let (Some(ids), Some(array)) = (target_ids, node.as_array()) {
        push_keys(&mut url, &array.items, ids);
    }
    Some(url)
}

fn push_keys(url: &mut String, element: &SchemaNode, ids: &IdSet) {
    let Some(object) = element.as_object() else {
        return;
    };
    for pk in object.primary_key_field_names() {
        url.push('/');
        url.push_str(&urlencoding::encode(&key_text(ids.get(pk))));
    }
}

fn key_text(value: Option<&Value>) -> String {
    match value.filter(|v| is_defined(v)) {
        None => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
