use pretty_assertions::assert_eq;
use proptest::prelude::*;
use restsync_types::{ids_match, item_iid, strip_iid, IdSet, Iid, Item, IID_FIELD};
use serde_json::json;

fn item(value: serde_json::Value) -> Item {
    value.as_object().cloned().unwrap()
}

// ── Iid ──────────────────────────────────────────────────────────

#[test]
fn iid_is_unique() {
    assert_ne!(Iid::new(), Iid::new());
}

#[test]
fn iid_roundtrips_through_string() {
    let iid = Iid::new();
    let parsed: Iid = iid.to_string().parse().unwrap();
    assert_eq!(iid, parsed);
}

#[test]
fn iid_from_value_rejects_garbage() {
    assert!(Iid::from_value(&json!("not-a-uuid")).is_none());
    assert!(Iid::from_value(&json!(12)).is_none());
}

// ── ids_match ────────────────────────────────────────────────────

#[test]
fn iid_wins_over_differing_keys() {
    let iid = Iid::new();
    let a = IdSet::new().with("pk", "x").with_iid(iid);
    let b = IdSet::new().with("pk", "y").with_iid(iid);
    assert!(ids_match(&a, &b));
}

#[test]
fn equal_keys_match() {
    let a = IdSet::new().with("pk", "x");
    let b = IdSet::new().with("pk", "x");
    assert!(ids_match(&a, &b));
}

#[test]
fn equal_keys_match_despite_differing_iids() {
    let a = IdSet::new().with("makeId", "a").with_iid(Iid::new());
    let b = IdSet::new().with("makeId", "a").with_iid(Iid::new());
    assert!(ids_match(&a, &b));
}

#[test]
fn empty_sets_never_match() {
    assert!(!ids_match(&IdSet::new(), &IdSet::new()));
}

#[test]
fn undefined_keys_never_match() {
    let a = IdSet::new().with("makeId", serde_json::Value::Null);
    let b = IdSet::new().with("makeId", serde_json::Value::Null);
    assert!(!ids_match(&a, &b));
}

#[test]
fn different_iids_and_undefined_keys_do_not_match() {
    let a = IdSet::from_iid(Iid::new()).with("makeId", serde_json::Value::Null);
    let b = IdSet::from_iid(Iid::new()).with("makeId", serde_json::Value::Null);
    assert!(!ids_match(&a, &b));
}

#[test]
fn key_subsets_do_not_match() {
    let a = IdSet::new().with("makeId", "a");
    let b = IdSet::new().with("makeId", "a").with("modelId", "m");
    assert!(!ids_match(&a, &b));
    assert!(!ids_match(&b, &a));
}

// ── IdSet extraction ─────────────────────────────────────────────

#[test]
fn from_item_takes_only_defined_primary_keys_and_iid() {
    let iid = Iid::new();
    let source = item(json!({
        "makeId": "ford",
        "name": "Ford",
        "country": null,
        IID_FIELD: iid.to_string(),
    }));
    let ids = IdSet::from_item(&source, &["makeId", "country"]);
    assert_eq!(ids, IdSet::new().with("makeId", "ford").with_iid(iid));
}

#[test]
fn without_iid_strips_only_the_iid() {
    let ids = IdSet::new().with("makeId", "toyota").with_iid(Iid::new());
    assert_eq!(ids.without_iid(), IdSet::new().with("makeId", "toyota"));
}

#[test]
fn iid_only_detection() {
    assert!(IdSet::from_iid(Iid::new()).is_iid_only());
    assert!(!IdSet::new().with("a", 1).with_iid(Iid::new()).is_iid_only());
    assert!(IdSet::new().is_unresolved());
}

#[test]
fn id_set_serializes_flat() {
    let iid = Iid::new();
    let ids = IdSet::new().with("makeId", "ford").with_iid(iid);
    let value = serde_json::to_value(&ids).unwrap();
    assert_eq!(value, json!({ "makeId": "ford", "__iid": iid.to_string() }));
    let back: IdSet = serde_json::from_value(value).unwrap();
    assert_eq!(back, ids);
}

#[test]
fn item_helpers_read_and_strip_iid() {
    let iid = Iid::new();
    let source = item(json!({ "makeId": "ford", IID_FIELD: iid.to_string() }));
    assert_eq!(item_iid(&source), Some(iid));
    assert_eq!(strip_iid(&source), item(json!({ "makeId": "ford" })));
}

// ── Properties ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn matching_is_symmetric(a in "[a-c]{0,2}", b in "[a-c]{0,2}", share_iid in any::<bool>()) {
        let mut x = IdSet::new();
        let mut y = IdSet::new();
        if !a.is_empty() { x.set("pk", a.clone()); }
        if !b.is_empty() { y.set("pk", b.clone()); }
        if share_iid {
            let iid = Iid::new();
            x = x.with_iid(iid);
            y = y.with_iid(iid);
        }
        prop_assert_eq!(ids_match(&x, &y), ids_match(&y, &x));
    }

    #[test]
    fn defined_sets_match_themselves(key in "[a-z]{1,8}", value in "[a-z0-9]{1,8}") {
        let ids = IdSet::new().with(key, value);
        prop_assert!(ids_match(&ids, &ids));
    }
}
