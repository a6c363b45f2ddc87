//! Rebuilding the nested object tree from flat containers.

use crate::error::{StoreError, StoreResult};
use restsync_schema::path::{self, ARRAY_MARKER};
use restsync_schema::{SchemaError, SchemaNode};
use restsync_types::{ids_match, IdSet, Item, IID_FIELD};
use serde_json::{Map, Value};

/// Inserts `item` into `data` at `collection_path`, descending one ancestor
/// id set per `[]` segment.
///
/// Missing intermediate arrays, objects and ancestor entries are created on
/// the way down; an ancestor entry created here is a stub holding just the
/// ancestor's ids and is filled in when the ancestor itself is poked.
pub(crate) fn poke_item(
    data: &mut Value,
    root: &SchemaNode,
    collection_path: &str,
    parent_ids: &[IdSet],
    item: &Item,
    item_ids: &IdSet,
) -> StoreResult<()> {
    let segments: Vec<&str> = path::segments(collection_path).collect();
    poke(data, root, &segments, parent_ids, item, item_ids, collection_path)
}

fn poke(
    data: &mut Value,
    schema: &SchemaNode,
    segments: &[&str],
    parent_ids: &[IdSet],
    item: &Item,
    item_ids: &IdSet,
    full_path: &str,
) -> StoreResult<()> {
    let unexpected = || StoreError::UnexpectedPath {
        path: full_path.to_string(),
    };

    let Some((segment, rest)) = segments.split_first() else {
        let pk_names = element_pk_names(schema);
        let entries = data.as_array_mut().ok_or_else(unexpected)?;
        match entries.iter_mut().find(|entry| entry_matches(entry, &pk_names, item_ids)) {
            Some(Value::Object(existing)) => merge_into_stub(existing, item),
            Some(_) => return Err(unexpected()),
            None => entries.push(Value::Object(item.clone())),
        }
        return Ok(());
    };

    if *segment == ARRAY_MARKER {
        let (ancestor, remaining_parents) = parent_ids.split_first().ok_or_else(unexpected)?;
        let element_schema = schema.as_array().ok_or_else(unexpected)?.items.as_ref();
        let pk_names = element_pk_names(schema);
        let entries = data.as_array_mut().ok_or_else(unexpected)?;
        let index = match entries
            .iter()
            .position(|entry| ancestor_matches(entry, &pk_names, ancestor))
        {
            Some(index) => index,
            None => {
                entries.push(Value::Object(ancestor.to_item()));
                entries.len() - 1
            }
        };
        return poke(
            &mut entries[index],
            element_schema,
            rest,
            remaining_parents,
            item,
            item_ids,
            full_path,
        );
    }

    let child_schema = schema
        .as_object()
        .and_then(|o| o.field(segment))
        .ok_or_else(|| SchemaError::PathResolution {
            path: full_path.to_string(),
        })?;
    let fields = data.as_object_mut().ok_or_else(unexpected)?;
    let child = fields.entry(segment.to_string()).or_insert_with(|| {
        if child_schema.is_array() {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        }
    });
    poke(child, child_schema, rest, parent_ids, item, item_ids, full_path)
}

/// Primary-key names of an array node's element schema.
fn element_pk_names(array: &SchemaNode) -> Vec<String> {
    array
        .as_array()
        .and_then(|a| a.items.as_object())
        .map(|o| {
            o.primary_key_field_names()
                .into_iter()
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn entry_ids(entry: &Value, pk_names: &[String]) -> Option<IdSet> {
    entry.as_object().map(|obj| IdSet::from_item(obj, pk_names))
}

fn entry_matches(entry: &Value, pk_names: &[String], item_ids: &IdSet) -> bool {
    entry_ids(entry, pk_names).is_some_and(|ids| ids_match(item_ids, &ids))
}

fn ancestor_matches(entry: &Value, pk_names: &[String], ancestor: &IdSet) -> bool {
    entry_ids(entry, pk_names).is_some_and(|ids| ids_match(&ids, ancestor))
}

/// Copies an item's fields over an existing entry. Child collections
/// already built under the entry are kept.
fn merge_into_stub(existing: &mut Map<String, Value>, item: &Item) {
    for (name, value) in item {
        match existing.get(name) {
            Some(Value::Array(_)) if value.is_array() => {}
            _ => {
                existing.insert(name.clone(), value.clone());
            }
        }
    }
}

/// Removes every IID field, at any depth.
pub(crate) fn strip_iids(data: &mut Value) {
    match data {
        Value::Array(entries) => entries.iter_mut().for_each(strip_iids),
        Value::Object(fields) => {
            fields.remove(IID_FIELD);
            fields.values_mut().for_each(strip_iids);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restsync_schema::FieldDescriptor;
    use restsync_types::Iid;
    use serde_json::json;

    fn cars() -> SchemaNode {
        SchemaNode::object([(
            "makes",
            SchemaNode::array(SchemaNode::object([
                ("makeId", FieldDescriptor::string().pk().into()),
                ("name", FieldDescriptor::string().into()),
                (
                    "models",
                    SchemaNode::array(SchemaNode::object([(
                        "modelId",
                        FieldDescriptor::string().pk().into(),
                    )])),
                ),
            ])),
        )])
    }

    fn obj(value: Value) -> Item {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn child_before_parent_fills_the_stub() {
        let schema = cars();
        let mut data = Value::Object(Map::new());
        let ford = IdSet::new().with("makeId", "ford");
        let capri = IdSet::new().with("modelId", "capri");
        poke_item(
            &mut data,
            &schema,
            "makes.[].models",
            &[ford.clone()],
            &obj(json!({ "modelId": "capri" })),
            &capri,
        )
        .unwrap();
        poke_item(
            &mut data,
            &schema,
            "makes",
            &[],
            &obj(json!({ "makeId": "ford", "name": "Ford" })),
            &ford,
        )
        .unwrap();
        assert_eq!(
            data,
            json!({ "makes": [{ "makeId": "ford", "name": "Ford", "models": [{ "modelId": "capri" }] }] })
        );
    }

    #[test]
    fn missing_ancestor_ids_are_rejected() {
        let schema = cars();
        let mut data = Value::Object(Map::new());
        let err = poke_item(
            &mut data,
            &schema,
            "makes.[].models",
            &[],
            &obj(json!({ "modelId": "capri" })),
            &IdSet::new().with("modelId", "capri"),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::UnexpectedPath { .. }));
    }

    #[test]
    fn strips_nested_iids() {
        let iid = Iid::new();
        let mut data = json!({ "makes": [{ "__iid": iid.to_string(), "models": [{ "__iid": iid.to_string(), "modelId": "x" }] }] });
        strip_iids(&mut data);
        assert_eq!(data, json!({ "makes": [{ "models": [{ "modelId": "x" }] }] }));
    }
}
