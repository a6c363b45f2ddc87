//! Walking the schema tree.

use crate::error::{SchemaError, SchemaResult};
use crate::node::{ArraySchema, FieldDescriptor, ObjectSchema, SchemaNode};
use crate::path::{self, ARRAY_MARKER};

/// Resolves the node at a dotted path. The empty path is the root.
///
/// `[]` segments descend into an array's element schema; other segments
/// descend into an object's named child.
pub fn resolve<'a>(root: &'a SchemaNode, schema_path: &str) -> SchemaResult<&'a SchemaNode> {
    let mut node = root;
    for segment in path::segments(schema_path) {
        let next = if segment == ARRAY_MARKER {
            node.as_array().map(|a| a.items.as_ref())
        } else {
            node.as_object().and_then(|o| o.field(segment))
        };
        node = next.ok_or_else(|| SchemaError::PathResolution {
            path: schema_path.to_string(),
        })?;
    }
    Ok(node)
}

/// Resolves a path that must name an array.
pub fn resolve_array<'a>(root: &'a SchemaNode, schema_path: &str) -> SchemaResult<&'a ArraySchema> {
    resolve(root, schema_path)?
        .as_array()
        .ok_or_else(|| SchemaError::NotAnArray {
            path: schema_path.to_string(),
        })
}

/// Resolves the element schema of a collection, which must be an object.
pub fn resolve_item_schema<'a>(
    root: &'a SchemaNode,
    collection_path: &str,
) -> SchemaResult<&'a ObjectSchema> {
    let item_path = path::item_path(collection_path);
    resolve(root, &item_path)?
        .as_object()
        .ok_or(SchemaError::NotAnObject { path: item_path })
}

/// Reduces a field node to the descriptor used for metadata extraction.
///
/// Conditional fields are not evaluated against sibling values; the first
/// branch stands in for all of them. A field whose FK-ness depends on the
/// condition can therefore be misclassified. Object and array nodes have no
/// descriptor.
#[must_use]
pub fn normalize_conditional(node: &SchemaNode) -> Option<&FieldDescriptor> {
    match node {
        SchemaNode::Field(field) => Some(field),
        SchemaNode::Conditional(c) => c.branches.first(),
        SchemaNode::Object(_) | SchemaNode::Array(_) => None,
    }
}

/// Human label for a field: its explicit label, else the camelCase name
/// split into words with the first letter capitalized.
#[must_use]
pub fn field_display_name(field_name: &str, field: Option<&FieldDescriptor>) -> String {
    if let Some(label) = field.and_then(|f| f.label.as_ref()) {
        return label.clone();
    }
    let mut out = String::with_capacity(field_name.len() + 4);
    for (i, ch) in field_name.chars().enumerate() {
        if i > 0 && ch.is_uppercase() {
            out.push(' ');
        }
        if i == 0 {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}
