use pretty_assertions::assert_eq;
use restsync_schema::{FieldDescriptor, SchemaNode};
use restsync_sync::build_url;
use restsync_types::{IdSet, Iid};

fn cars() -> SchemaNode {
    SchemaNode::object([(
        "makes",
        SchemaNode::array(SchemaNode::object([
            ("makeId", FieldDescriptor::string().pk().into()),
            ("name", FieldDescriptor::string().into()),
            (
                "models",
                SchemaNode::array(SchemaNode::object([
                    ("modelId", FieldDescriptor::string().pk().into()),
                    ("year", FieldDescriptor::integer().pk().into()),
                    (
                        "trims",
                        SchemaNode::array(SchemaNode::object([(
                            "trimId",
                            FieldDescriptor::string().pk().into(),
                        )])),
                    ),
                ])),
            ),
        ])),
    )])
}

fn ford() -> IdSet {
    IdSet::new().with("makeId", "ford")
}

#[test]
fn collection_url_appends_ancestor_keys() {
    let url = build_url(&cars(), "http://x", "makes.[].models", None, &[ford()]);
    assert_eq!(url.as_deref(), Some("http://x/makes/ford/models"));
}

#[test]
fn target_ids_address_one_item_of_the_collection() {
    let capri = IdSet::new().with("modelId", "capri").with("year", 1969);
    let url = build_url(&cars(), "http://x", "makes.[].models", Some(&capri), &[ford()]);
    assert_eq!(url.as_deref(), Some("http://x/makes/ford/models/capri/1969"));
}

#[test]
fn item_path_takes_target_ids_at_the_last_marker() {
    let url = build_url(
        &cars(),
        "http://x/",
        "makes.[]",
        Some(&IdSet::new().with("makeId", "ford")),
        &[],
    );
    assert_eq!(url.as_deref(), Some("http://x/makes/ford"));
}

#[test]
fn compound_keys_follow_declaration_order() {
    let model = IdSet::new().with("year", 1969).with("modelId", "capri");
    let url = build_url(&cars(), "http://x", "makes.[].models.[].trims", None, &[ford(), model]);
    assert_eq!(url.as_deref(), Some("http://x/makes/ford/models/capri/1969/trims"));
}

#[test]
fn missing_ancestor_key_renders_as_null() {
    let unsaved = IdSet::from_iid(Iid::new());
    let url = build_url(&cars(), "http://x", "makes.[].models", None, &[unsaved]);
    assert_eq!(url.as_deref(), Some("http://x/makes/null/models"));

    let null_key = IdSet::new().with("makeId", serde_json::Value::Null);
    let url = build_url(&cars(), "http://x", "makes.[].models", None, &[null_key]);
    assert_eq!(url.as_deref(), Some("http://x/makes/null/models"));
}

#[test]
fn key_values_are_url_encoded() {
    let odd = IdSet::new().with("makeId", "rolls royce/ltd");
    let url = build_url(&cars(), "http://x", "makes.[].models", None, &[odd]);
    assert_eq!(url.as_deref(), Some("http://x/makes/rolls%20royce%2Fltd/models"));
}

#[test]
fn unresolvable_paths_yield_none() {
    assert_eq!(build_url(&cars(), "http://x", "makes.[]", None, &[]), None);
    assert_eq!(build_url(&cars(), "http://x", "trucks", None, &[]), None);
    assert_eq!(build_url(&cars(), "http://x", "makes.[].name.[]", None, &[ford()]), None);
}

#[test]
fn building_is_pure() {
    let schema = cars();
    let first = build_url(&schema, "http://x", "makes.[].models", None, &[ford()]);
    let second = build_url(&schema, "http://x", "makes.[].models", None, &[ford()]);
    assert_eq!(first, second);
}
