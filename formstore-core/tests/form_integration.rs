//! Form Integration Tests
//!
//! Tests the complete store-to-form flow including:
//! - Store trees built from entities
//! - Clone isolation
//! - Edit mode cascading through forms
//! - Reset and live source synchronization
//! - Builder scenarios

use std::sync::Arc;

use formstore_core::{
    build_node, clone_list, clone_node, make_form_node, Entity, EntityEntry, FieldEntry, FieldMetadata,
    FieldType, FormEntityField, FormListNode, FormNode, FormNodeBuilder, FormNodeOptions,
    StoreEntry, StoreError, StoreListNode, StoreNode,
};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Address entity with a required city.
fn address() -> Arc<Entity> {
    Entity::builder("Address")
        .field(FieldEntry::builder("city", FieldType::String).required(true))
        .field(FieldEntry::builder("zip", FieldType::String))
        .build()
        .expect("valid entity")
}

/// Person entity with a nested address and recursive children.
fn person() -> Arc<Entity> {
    Entity::builder("Person")
        .field(FieldEntry::builder("firstName", FieldType::String).required(true))
        .field(FieldEntry::builder("age", FieldType::Number))
        .object("address", address())
        .recursive_list("children")
        .build()
        .expect("valid entity")
}

/// Visit every form field of a form tree, depth-first.
fn each_field(form: &FormNode, visit: &mut dyn FnMut(&str, &FormEntityField)) {
    for (name, entry) in form.entries() {
        match entry {
            StoreEntry::Field(field) => {
                visit(&name, &FormEntityField::from_field(&field).expect("form field"));
            }
            StoreEntry::Node(node) => each_field(&FormNode::from_node(&node).expect("form node"), visit),
            StoreEntry::List(list) => {
                for item in FormListNode::from_list(&list).expect("form list").items() {
                    each_field(&item, visit);
                }
            }
        }
    }
}

fn child_record(name: &str, age: i64, city: &str) -> Value {
    json!({
        "firstName": name,
        "age": age,
        "address": { "city": city, "zip": "00000" },
        "children": [],
    })
}

// ============================================================================
// Store Tree Tests
// ============================================================================

#[test]
fn test_keys_match_entity_with_node_kinds() {
    let entity = person();
    let node = build_node(&entity);

    let expected: Vec<_> = entity.entries().map(|(name, _)| name.to_string()).collect();
    assert_eq!(node.keys(), expected);

    for (name, entry) in entity.entries() {
        let built = node.get(name).expect("entry built");
        let matches_kind = matches!(
            (entry, &built),
            (EntityEntry::Field(_), StoreEntry::Field(_))
                | (EntityEntry::Object(_), StoreEntry::Node(_))
                | (EntityEntry::List(_) | EntityEntry::RecursiveList, StoreEntry::List(_))
        );
        assert!(matches_kind, "{name}: {} built as {}", entry.kind(), built.kind());
    }
    let children = node.list("children").expect("recursive list");
    assert!(Arc::ptr_eq(children.entity(), &entity));
    assert!(children.is_empty());
}

#[test]
fn test_set_first_name_leaves_address_empty() {
    let node = build_node(&person());
    node.set(&json!({ "firstName": "Ada" })).expect("set");

    assert_eq!(node.field("firstName").and_then(|f| f.value()), Some(json!("Ada")));
    let address = node.node("address").expect("address node");
    assert_eq!(address.to_flat_values(), json!({}));
    assert!(address
        .entries()
        .iter()
        .all(|(_, entry)| matches!(entry, StoreEntry::Field(field) if field.value().is_none())));
}

#[test]
fn test_invalid_shape_is_rejected_before_any_write() {
    let node = build_node(&person());
    node.set(&json!({ "firstName": "Ada" })).expect("set");

    let err = node
        .set(&json!({ "firstName": "Grace", "children": [{ "address": "nowhere" }] }))
        .expect_err("address must be an object");
    assert!(matches!(err, StoreError::InvalidData { .. }));
    assert_eq!(node.field("firstName").and_then(|f| f.value()), Some(json!("Ada")));
    assert!(node.list("children").expect("list").is_empty());
}

// ============================================================================
// Clone Tests
// ============================================================================

#[test]
fn test_deep_clone_of_three_item_list() {
    let source = StoreListNode::new(person());
    source
        .push_node(&[
            child_record("Ada", 36, "London"),
            child_record("Grace", 85, "Arlington"),
            child_record("Alan", 41, "Wilmslow"),
        ])
        .expect("push");

    let copy = clone_list(&source, true).expect("clone");
    assert_eq!(copy.len(), 3);
    for index in 0..3 {
        let (original, cloned) = (source.get(index).expect("item"), copy.get(index).expect("item"));
        assert_ne!(original, cloned);
        assert_eq!(
            cloned.field("firstName").and_then(|f| f.value()),
            original.field("firstName").and_then(|f| f.value())
        );
    }
    assert_eq!(copy.to_flat_values(), source.to_flat_values());
}

#[test]
fn test_clone_of_form_is_rejected() {
    let source = build_node(&person());
    let form = make_form_node(&source, FormNodeOptions::default()).expect("form");

    assert!(matches!(clone_node(form.as_node(), true), Err(StoreError::CloneFormNode(_))));
    assert!(matches!(
        make_form_node(form.as_node(), FormNodeOptions::default()),
        Err(StoreError::CloneFormNode(_))
    ));
}

// ============================================================================
// Edit Mode Tests
// ============================================================================

#[test]
fn test_parent_edit_false_disables_every_descendant() {
    let source = build_node(&person());
    source
        .set(&json!({ "children": [child_record("B", 3, "Paris"), {}] }))
        .expect("set");
    let form = FormNodeBuilder::new(&source).expect("builder").edit(true).build().expect("form");

    let mut count = 0;
    each_field(&form, &mut |_, field| {
        field.set_edit(true);
        assert!(field.is_edit());
        count += 1;
    });
    assert_eq!(count, 4 + 4 + 4);

    form.set_edit(false);
    each_field(&form, &mut |name, field| assert!(!field.is_edit(), "{name} still editable"));

    form.set_edit(true);
    each_field(&form, &mut |name, field| assert!(field.is_edit(), "{name} not editable"));
}

#[test]
fn test_required_field_in_and_out_of_edit_mode() {
    let source = build_node(&person());
    let form = make_form_node(&source, FormNodeOptions { is_edit: true, is_empty: false }).expect("form");
    let first = form.field("firstName").expect("field");

    assert!(first.value().is_none());
    assert!(first.is_edit());
    assert!(first.error().is_some());
    assert!(!first.is_valid());

    form.set_edit(false);
    assert!(first.error().is_some());
    assert!(first.is_valid());
    assert!(form.is_valid());
    assert!(form.errors().is_empty());
}

#[test]
fn test_patched_field_is_no_longer_required() {
    let source = build_node(&person());
    source.set(&json!({ "address": { "city": "London" } })).expect("set");

    let form = FormNodeBuilder::new(&source)
        .expect("builder")
        .edit(true)
        .patch_field("firstName", |field, _| {
            field.metadata(FieldMetadata {
                is_required: Some(false),
                ..FieldMetadata::default()
            })
        })
        .build()
        .expect("form");

    let first = form.field("firstName").expect("field");
    assert!(first.is_edit());
    assert!(first.error().is_none());
    assert!(form.is_valid());
    assert!(source.field("firstName").expect("source field").field().is_required());
}

// ============================================================================
// Reset Tests
// ============================================================================

#[test]
fn test_reset_twice_yields_identical_state() {
    let source = build_node(&person());
    source
        .set(&json!({ "firstName": "Ada", "children": [child_record("B", 3, "Paris"), {}] }))
        .expect("set");
    let form = make_form_node(&source, FormNodeOptions { is_edit: true, is_empty: false }).expect("form");
    form.field("firstName").expect("field").set_value(Some(json!("edited")));

    form.reset().expect("reset");
    let (values, errors) = (form.to_flat_values(), form.errors());
    form.reset().expect("reset");

    assert_eq!(form.to_flat_values(), values);
    assert_eq!(form.errors(), errors);
    assert_eq!(values, source.to_flat_values());
}

#[test]
fn test_built_form_follows_live_source() {
    let source = build_node(&person());
    source.set(&json!({ "firstName": "Ada" })).expect("set");
    let form = make_form_node(&source, FormNodeOptions { is_edit: true, is_empty: false }).expect("form");
    let first = form.field("firstName").expect("field");

    first.set_value(Some(json!("draft")));
    assert_eq!(source.field("firstName").and_then(|f| f.value()), Some(json!("Ada")));

    source.set(&json!({ "firstName": "Grace", "children": [{}] })).expect("set");
    assert_eq!(first.value(), Some(json!("Grace")));
    let child = form.list("children").and_then(|l| l.get(0)).expect("child form");
    assert_eq!(child.source(), source.list("children").and_then(|l| l.get(0)));

    form.dispose();
    source.set(&json!({ "firstName": "Alan" })).expect("set");
    assert_eq!(first.value(), Some(json!("Grace")));
}

#[test]
fn test_empty_form_does_not_copy_source() {
    let source = build_node(&person());
    source.set(&json!({ "firstName": "Ada" })).expect("set");
    let form = make_form_node(&source, FormNodeOptions { is_edit: false, is_empty: true }).expect("form");

    assert!(form.field("firstName").and_then(|f| f.value()).is_none());
    source.set(&json!({ "firstName": "Grace" })).expect("set");
    assert!(form.field("firstName").and_then(|f| f.value()).is_none());

    form.reset().expect("explicit reset");
    assert_eq!(form.field("firstName").and_then(|f| f.value()), Some(json!("Grace")));
}

#[test]
fn test_dispose_after_source_dropped() {
    let source = build_node(&person());
    let form = make_form_node(&source, FormNodeOptions::default()).expect("form");
    drop(source);

    assert!(!form.is_source_alive());
    assert!(matches!(form.reset(), Err(StoreError::SourceDetached(_))));
    form.dispose();
    form.dispose();
}

// ============================================================================
// Property Tests
// ============================================================================

fn arb_child() -> impl Strategy<Value = Value> {
    ("[a-zA-Z]{1,12}", any::<i32>(), "[a-z ]{0,16}")
        .prop_map(|(name, age, city)| child_record(&name, i64::from(age), &city))
}

fn arb_person() -> impl Strategy<Value = Value> {
    (
        "[a-zA-Z]{1,12}",
        any::<i32>(),
        "[a-z ]{0,16}",
        "[0-9]{5}",
        prop::collection::vec(arb_child(), 0..4),
    )
        .prop_map(|(name, age, city, zip, children)| {
            json!({
                "firstName": name,
                "age": age,
                "address": { "city": city, "zip": zip },
                "children": children,
            })
        })
}

proptest! {
    #[test]
    fn prop_replace_then_flatten_round_trips(first in arb_person(), second in arb_person()) {
        let node = build_node(&person());
        node.replace(&first).expect("replace");
        prop_assert_eq!(node.to_flat_values(), first);

        node.replace(&second).expect("replace");
        prop_assert_eq!(node.to_flat_values(), second);
    }

    #[test]
    fn prop_clone_is_isolated(data in arb_person(), name in "[a-z]{1,8}") {
        let node: StoreNode = build_node(&person());
        node.set(&data).expect("set");
        let copy = clone_node(&node, true).expect("clone");

        copy.set(&json!({ "firstName": format!("copy-{name}"), "children": [] })).expect("set");
        prop_assert_eq!(node.to_flat_values(), data.clone());

        node.set(&json!({ "address": { "city": name } })).expect("set");
        prop_assert_eq!(
            copy.node("address").expect("address").to_flat_values(),
            data["address"].clone()
        );
    }
}
