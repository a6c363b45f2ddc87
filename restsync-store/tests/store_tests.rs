use pretty_assertions::assert_eq;
use restsync_schema::{FieldDescriptor, SchemaNode};
use restsync_store::{EntityStore, StoreError, StoreEvent};
use restsync_types::{ChangeType, DetailLevel, IdSet, Iid, Item, Owner, IID_FIELD};
use serde_json::{json, Value};

fn cars() -> SchemaNode {
    SchemaNode::object([(
        "makes",
        SchemaNode::array(SchemaNode::object([
            ("makeId", FieldDescriptor::string().pk().generated().into()),
            ("name", FieldDescriptor::string().into()),
            (
                "models",
                SchemaNode::array(SchemaNode::object([
                    ("modelId", FieldDescriptor::string().pk().into()),
                    ("name", FieldDescriptor::string().required().into()),
                ])),
            ),
        ])),
    )])
}

fn items(values: Value) -> Vec<Item> {
    values
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
}

fn make(id: &str) -> IdSet {
    IdSet::new().with("makeId", id)
}

fn load_makes(store: &mut EntityStore, values: Value) -> Vec<Iid> {
    store
        .load("makes", &[], items(values), DetailLevel::Summary, Owner::CollectionSearch)
        .unwrap()
}

// ── Loading & identity ───────────────────────────────────────────

#[test]
fn load_creates_clean_containers() {
    let mut store = EntityStore::new(cars());
    let iids = load_makes(&mut store, json!([{ "makeId": "ford" }, { "makeId": "austin" }]));

    assert_eq!(iids.len(), 2);
    assert!(!store.is_dirty());
    let ford = store.find_container("makes", &[], &make("ford"), None).unwrap();
    assert_eq!(ford.iid(), iids[0]);
    assert_eq!(ford.change_type(), ChangeType::None);
    assert_eq!(ford.detail_level(), DetailLevel::Summary);
    assert!(ford.has_owner(Owner::CollectionSearch));
}

#[test]
fn reloading_never_duplicates() {
    let mut store = EntityStore::new(cars());
    let first = load_makes(&mut store, json!([{ "makeId": "ford" }]));
    let second = load_makes(&mut store, json!([{ "makeId": "ford" }]));

    assert_eq!(first, second);
    assert_eq!(store.containers().len(), 1);
}

#[test]
fn detail_load_upgrades_in_place() {
    let mut store = EntityStore::new(cars());
    let iid = load_makes(&mut store, json!([{ "makeId": "ford" }]))[0];
    store
        .load(
            "makes",
            &[],
            items(json!([{ "makeId": "ford", "name": "Ford" }])),
            DetailLevel::Detail,
            Owner::Detail,
        )
        .unwrap();

    assert_eq!(store.containers().len(), 1);
    let ford = store.container(iid).unwrap();
    assert_eq!(ford.detail_level(), DetailLevel::Detail);
    assert_eq!(ford.get_item_field_value("name"), Some(&json!("Ford")));
    assert!(ford.has_owner(Owner::Detail));
    assert!(ford.has_owner(Owner::CollectionSearch));
    assert!(store
        .find_container("makes", &[], &make("ford"), Some(DetailLevel::Detail))
        .is_some());
}

#[test]
fn detail_load_keeps_local_edits() {
    let mut store = EntityStore::new(cars());
    let iid = load_makes(&mut store, json!([{ "makeId": "ford", "name": "Ford" }]))[0];
    store.set_item_field_value(iid, "name", json!("Fnord")).unwrap();
    store
        .upgrade_to_detail(iid, items(json!([{ "makeId": "ford", "name": "Ford", "models": [] }])).remove(0))
        .unwrap();

    let ford = store.container(iid).unwrap();
    assert_eq!(ford.get_item_field_value("name"), Some(&json!("Fnord")));
    assert_eq!(ford.get_item_field_value("models"), Some(&json!([])));
    assert_eq!(ford.detail_level(), DetailLevel::Detail);
}

#[test]
fn unknown_collection_is_a_schema_error() {
    let mut store = EntityStore::new(cars());
    let err = store
        .load("engines", &[], vec![], DetailLevel::Summary, Owner::CollectionSearch)
        .unwrap_err();
    assert!(matches!(err, StoreError::Schema(_)));
}

#[test]
fn ancestor_ids_must_match_path_depth() {
    let mut store = EntityStore::new(cars());
    let err = store
        .load(
            "makes.[].models",
            &[],
            items(json!([{ "modelId": "capri" }])),
            DetailLevel::Summary,
            Owner::CollectionSearch,
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::UnexpectedPath { .. }));

    let err = store.add_container("makes", vec![make("ford")]).unwrap_err();
    assert!(matches!(err, StoreError::UnexpectedPath { .. }));
    assert!(store.containers().is_empty());

    let ford = load_makes(&mut store, json!([{ "makeId": "ford" }]))[0];
    store.set_item_field_value(ford, "name", json!("Fnord")).unwrap();
}

#[test]
fn children_are_scoped_by_parent_ids() {
    let mut store = EntityStore::new(cars());
    for parent in ["ford", "austin"] {
        store
            .load(
                "makes.[].models",
                &[make(parent)],
                items(json!([{ "modelId": "mini" }])),
                DetailLevel::Summary,
                Owner::CollectionSearch,
            )
            .unwrap();
    }
    assert_eq!(store.containers().len(), 2);
    assert_eq!(
        store.get_containers("makes.[].models", &[make("ford")], None).len(),
        1
    );
}

// ── Purge & eviction ─────────────────────────────────────────────

#[test]
fn next_page_evicts_unowned_clean_containers() {
    let mut store = EntityStore::new(cars());
    load_makes(&mut store, json!([{ "makeId": "ford" }, { "makeId": "austin" }]));
    load_makes(&mut store, json!([{ "makeId": "rover" }]));

    let ids: Vec<Value> = store
        .containers()
        .iter()
        .filter_map(|c| c.get_item_field_value("makeId").cloned())
        .collect();
    assert_eq!(ids, vec![json!("rover")]);
}

#[test]
fn purge_spares_dirty_and_otherwise_owned_containers() {
    let mut store = EntityStore::new(cars());
    let iids = load_makes(
        &mut store,
        json!([{ "makeId": "ford" }, { "makeId": "austin" }, { "makeId": "rover" }]),
    );
    store.set_item_field_value(iids[0], "name", json!("Fnord")).unwrap();
    store.register_owner(iids[1], Owner::Detail).unwrap();

    load_makes(&mut store, json!([{ "makeId": "morris" }]));

    assert!(store.container(iids[0]).is_some());
    let austin = store.container(iids[1]).unwrap();
    assert!(!austin.has_owner(Owner::CollectionSearch));
    assert!(store.container(iids[2]).is_none());
    assert!(store
        .get_containers("makes", &[], Some(Owner::CollectionSearch))
        .iter()
        .all(|c| c.iid() != iids[1]));
}

#[test]
fn detail_loads_do_not_purge() {
    let mut store = EntityStore::new(cars());
    load_makes(&mut store, json!([{ "makeId": "ford" }]));
    store
        .load(
            "makes",
            &[],
            items(json!([{ "makeId": "austin" }])),
            DetailLevel::Detail,
            Owner::Detail,
        )
        .unwrap();
    assert_eq!(store.containers().len(), 2);
}

// ── getContainers ────────────────────────────────────────────────

#[test]
fn collection_search_prepends_unsaved_items() {
    let mut store = EntityStore::new(cars());
    load_makes(&mut store, json!([{ "makeId": "ford" }]));
    let new = store.add_container("makes", vec![]).unwrap();

    let listed = store.get_containers("makes", &[], Some(Owner::CollectionSearch));
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].iid(), new);

    let lookups = store.get_containers("makes", &[], Some(Owner::LookupSearch));
    assert!(lookups.is_empty());
}

#[test]
fn search_views_hide_pending_deletes() {
    let mut store = EntityStore::new(cars());
    let iids = load_makes(&mut store, json!([{ "makeId": "ford" }, { "makeId": "austin" }]));
    assert_eq!(store.delete_container(iids[0]).unwrap(), ChangeType::Delete);

    let listed = store.get_containers("makes", &[], Some(Owner::CollectionSearch));
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].iid(), iids[1]);
    assert_eq!(store.get_containers("makes", &[], None).len(), 2);
}

// ── Mutation & validation ────────────────────────────────────────

#[test]
fn field_edits_revalidate() {
    let mut store = EntityStore::new(cars());
    let parent = vec![make("ford")];
    let iid = store.add_container("makes.[].models", parent).unwrap();
    store.set_item_field_value(iid, "modelId", json!("capri")).unwrap();

    let model = store.container(iid).unwrap();
    assert_eq!(model.change_type(), ChangeType::Add);
    assert_eq!(model.get_validation_errors("name"), vec!["\"Name\" is required"]);
    assert!(store.has_errors());

    store.set_item_field_value(iid, "name", json!("Capri")).unwrap();
    assert!(!store.has_errors());
}

#[test]
fn edit_is_rolled_back_when_tree_cannot_be_rebuilt() {
    let mut store = EntityStore::new(cars());
    let ford = load_makes(&mut store, json!([{ "makeId": "ford", "name": "Ford", "models": "oops" }]))[0];
    store
        .load(
            "makes.[].models",
            &[make("ford")],
            items(json!([{ "modelId": "capri" }])),
            DetailLevel::Summary,
            Owner::CollectionSearch,
        )
        .unwrap();

    let err = store.set_item_field_value(ford, "name", json!("Fnord")).unwrap_err();
    assert!(matches!(err, StoreError::UnexpectedPath { .. }));

    let container = store.container(ford).unwrap();
    assert_eq!(container.get_item_field_value("name"), Some(&json!("Ford")));
    assert!(!container.is_dirty());
    assert!(container.original_item().is_none());
    assert!(!store.is_dirty());
}

#[test]
fn validate_dirty_counts_failures() {
    let mut store = EntityStore::new(cars());
    let iid = store.add_container("makes.[].models", vec![make("ford")]).unwrap();
    store.set_item_field_value(iid, "modelId", json!("capri")).unwrap();
    assert_eq!(store.validate_dirty().unwrap(), 1);
}

#[test]
fn add_then_delete_leaves_nothing_to_save() {
    let mut store = EntityStore::new(cars());
    let iid = store.add_container("makes", vec![]).unwrap();
    assert_eq!(store.delete_container(iid).unwrap(), ChangeType::None);
    assert!(store.container(iid).is_none());
    assert!(store.get_dirty_containers().is_empty());
    assert!(!store.is_dirty());
}

#[test]
fn missing_container_is_reported() {
    let mut store = EntityStore::new(cars());
    let ghost = Iid::new();
    let err = store.set_item_field_value(ghost, "name", json!("x")).unwrap_err();
    assert!(matches!(err, StoreError::ContainerNotFound(iid) if iid == ghost));
}

// ── Dirty ordering ───────────────────────────────────────────────

#[test]
fn dirty_containers_follow_change_order() {
    let mut store = EntityStore::new(cars());
    let iids = load_makes(&mut store, json!([{ "makeId": "a" }, { "makeId": "b" }]));

    // Touch them out of store order: edit b, add c, delete a.
    store.set_item_field_value(iids[1], "name", json!("B")).unwrap();
    let added = store.add_container("makes", vec![]).unwrap();
    store.delete_container(iids[0]).unwrap();

    let order: Vec<(Iid, ChangeType)> = store
        .get_dirty_containers()
        .iter()
        .map(|c| (c.iid(), c.change_type()))
        .collect();
    assert_eq!(
        order,
        vec![
            (iids[1], ChangeType::Edit),
            (added, ChangeType::Add),
            (iids[0], ChangeType::Delete),
        ]
    );
}

// ── Tree reconstruction ──────────────────────────────────────────

#[test]
fn to_object_rebuilds_nested_tree_without_iids() {
    let mut store = EntityStore::new(cars());
    load_makes(&mut store, json!([{ "makeId": "austin" }]));
    store
        .load(
            "makes.[].models",
            &[make("austin")],
            items(json!([{ "modelId": "mini" }])),
            DetailLevel::Summary,
            Owner::CollectionSearch,
        )
        .unwrap();

    assert_eq!(
        store.to_object().unwrap(),
        json!({ "makes": [{ "makeId": "austin", "models": [{ "modelId": "mini" }] }] })
    );
}

#[test]
fn to_object_handles_unsaved_parents() {
    let mut store = EntityStore::new(cars());
    let parent = store.add_container("makes", vec![]).unwrap();
    store.set_item_field_value(parent, "name", json!("Ford")).unwrap();
    let child = store
        .add_container("makes.[].models", vec![IdSet::from_iid(parent)])
        .unwrap();
    store.set_item_field_value(child, "modelId", json!("capri")).unwrap();

    let tree = store.to_object().unwrap();
    assert_eq!(
        tree,
        json!({ "makes": [{ "name": "Ford", "models": [{ "modelId": "capri" }] }] })
    );
    assert!(!tree.to_string().contains(IID_FIELD));
}

// ── Save support ─────────────────────────────────────────────────

#[test]
fn fix_parent_ids_picks_up_saved_parent_key() {
    let mut store = EntityStore::new(cars());
    let parent = store.add_container("makes", vec![]).unwrap();
    let child = store
        .add_container("makes.[].models", vec![IdSet::from_iid(parent)])
        .unwrap();

    let created = items(json!([{ "makeId": "ford" }])).remove(0);
    store.finalize_container(parent, Some(created)).unwrap();
    store.fix_parent_ids(child).unwrap();

    let fixed = &store.container(child).unwrap().parent_ids()[0];
    assert_eq!(fixed, &make("ford").with_iid(parent));
    assert_eq!(store.container(child).unwrap().clean_parent_ids(), vec![make("ford")]);
}

#[test]
fn finalize_patches_generated_fields() {
    let mut store = EntityStore::new(cars());
    let iid = store.add_container("makes", vec![]).unwrap();
    store.set_item_field_value(iid, "name", json!("Ford")).unwrap();

    let created = items(json!([{ "makeId": "0101" }])).remove(0);
    store.finalize_container(iid, Some(created)).unwrap();

    let container = store.container(iid).unwrap();
    let mut expected = Item::new();
    expected.insert(IID_FIELD.to_string(), iid.to_value());
    expected.insert("makeId".to_string(), json!("0101"));
    assert_eq!(container.item(), &expected);
    assert!(!container.is_dirty());
    assert!(container.has_owner(Owner::CollectionSearch));
}

#[test]
fn finalize_removes_deleted_containers() {
    let mut store = EntityStore::new(cars());
    let iid = load_makes(&mut store, json!([{ "makeId": "ford" }]))[0];
    store.delete_container(iid).unwrap();
    store.finalize_container(iid, None).unwrap();
    assert!(store.container(iid).is_none());
}

// ── Cancel ───────────────────────────────────────────────────────

#[test]
fn cancel_drops_new_and_reverts_the_rest() {
    let mut store = EntityStore::new(cars());
    let iids = load_makes(
        &mut store,
        json!([{ "makeId": "ford", "name": "Ford" }, { "makeId": "austin", "name": "Austin" }]),
    );
    let added = store.add_container("makes", vec![]).unwrap();
    store.delete_container(iids[0]).unwrap();
    store.set_item_field_value(iids[1], "name", json!("Ostin")).unwrap();

    store.cancel();

    assert!(store.container(added).is_none());
    let ford = store.container(iids[0]).unwrap();
    assert_eq!(ford.change_type(), ChangeType::None);
    assert_eq!(ford.get_item_field_value("name"), Some(&json!("Ford")));
    let austin = store.container(iids[1]).unwrap();
    assert_eq!(austin.get_item_field_value("name"), Some(&json!("Austin")));
    assert!(austin.original_item().is_none());
    assert!(!store.is_dirty());
}

// ── Events ───────────────────────────────────────────────────────

#[test]
fn events_are_broadcast() {
    let mut store = EntityStore::new(cars());
    let mut rx = store.subscribe();
    let iid = load_makes(&mut store, json!([{ "makeId": "ford" }]))[0];
    store.cancel();

    assert_eq!(rx.try_recv().unwrap(), StoreEvent::Added(iid));
    assert_eq!(
        rx.try_recv().unwrap(),
        StoreEvent::Loaded {
            collection_path: "makes".to_string()
        }
    );
    assert_eq!(rx.try_recv().unwrap(), StoreEvent::Cancelled);
}
