//! Synthetic-to-real identity reconciliation scenarios.

use serde_json::json;
use weft::{
    Cache, CacheError, Document, EntityId, EntityRef, Error, Field, SelectionSet, StoreValue,
};

use crate::fixtures::{
    anonymous_user_document, identified_user_document, key, no_vars, todo_list_document, user,
};

/// `{ todoList { __typename id todos { text note } } }` - the todo
/// elements carry no identity fields, so they store synthetically.
fn anonymous_todo_list_document() -> Document {
    Document::query(SelectionSet::new(vec![
        Field::new(
            "todoList",
            SelectionSet::new(vec![
                Field::leaf("__typename").into(),
                Field::leaf("id").into(),
                Field::new(
                    "todos",
                    SelectionSet::new(vec![
                        Field::leaf("text").into(),
                        Field::leaf("note").into(),
                    ]),
                )
                .into(),
            ]),
        )
        .into(),
    ]))
}

#[test]
fn synthetic_entity_is_absorbed_into_the_real_one() {
    let mut cache = Cache::new();

    // first response: no identity, so the child is stored synthetically
    cache
        .write(
            &anonymous_user_document(),
            &json!({"user": {"name": "Ada"}}),
            &no_vars(),
        )
        .unwrap();

    let synthetic = EntityId::synthetic_child(&EntityId::root_query(), &key("user"));
    assert!(cache.contains(&synthetic));

    // second response carries the real identity for the same object
    cache
        .write(
            &identified_user_document(),
            &json!({"user": {"__typename": "User", "id": "42", "name": "Ada Lovelace"}}),
            &no_vars(),
        )
        .unwrap();

    // the synthetic entity is gone and its scalars merged onto the real id
    assert!(!cache.contains(&synthetic));
    let snapshot = cache.extract(false);
    assert!(snapshot.get(&synthetic).is_none());

    let real = snapshot.get(&user("User42")).unwrap();
    assert_eq!(
        real.get(&key("name")),
        Some(&StoreValue::Scalar(json!("Ada Lovelace")))
    );

    // the parent slot now holds a durable reference
    let root = snapshot.get(&EntityId::root_query()).unwrap();
    assert_eq!(
        root.get(&key("user")),
        Some(&StoreValue::Ref(EntityRef::new(user("User42"))))
    );
}

#[test]
fn reconciliation_keeps_fields_only_the_synthetic_entity_had() {
    let mut cache = Cache::new();

    cache
        .write(
            &anonymous_user_document(),
            &json!({"user": {"name": "Ada"}}),
            &no_vars(),
        )
        .unwrap();

    // the second response does not select `name`
    let narrow = Document::query(SelectionSet::new(vec![
        Field::new(
            "user",
            SelectionSet::new(vec![
                Field::leaf("__typename").into(),
                Field::leaf("id").into(),
            ]),
        )
        .into(),
    ]));
    cache
        .write(
            &narrow,
            &json!({"user": {"__typename": "User", "id": "42"}}),
            &no_vars(),
        )
        .unwrap();

    // `name` survived the merge
    let read = cache.read(&anonymous_user_document(), &no_vars()).unwrap();
    assert_eq!(read.data, Some(json!({"user": {"name": "Ada"}})));
}

#[test]
fn durable_identity_cannot_be_overwritten_by_a_synthetic_one() {
    let mut cache = Cache::new();

    cache
        .write(
            &identified_user_document(),
            &json!({"user": {"__typename": "User", "id": "42", "name": "Ada"}}),
            &no_vars(),
        )
        .unwrap();

    // a response without identity fields would demote the slot
    let err = cache
        .write(
            &anonymous_user_document(),
            &json!({"user": {"name": "Imposter"}}),
            &no_vars(),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Cache(CacheError::IdentityOverwrite { existing, .. }) if existing == "User42"
    ));
}

#[test]
fn list_element_synthetic_is_absorbed_when_identity_arrives() {
    let mut cache = Cache::new();

    // first response: the todo has no identity, so it stores under
    // `$TodoList5.todos.0`
    cache
        .write(
            &anonymous_todo_list_document(),
            &json!({
                "todoList": {
                    "__typename": "TodoList",
                    "id": "5",
                    "todos": [{"text": "hi", "note": "keep me"}]
                }
            }),
            &no_vars(),
        )
        .unwrap();

    let synthetic = EntityId::synthetic_element(&user("TodoList5"), &key("todos"), &[0]);
    assert!(cache.contains(&synthetic));

    // second response identifies the same element
    cache
        .write(
            &todo_list_document(),
            &json!({
                "todoList": {
                    "__typename": "TodoList",
                    "id": "5",
                    "todos": [{"__typename": "Todo", "id": "3", "text": "hi there"}]
                }
            }),
            &no_vars(),
        )
        .unwrap();

    // the synthetic element entity is gone and its fields merged
    assert!(!cache.contains(&synthetic));
    let snapshot = cache.extract(false);
    let todo = snapshot.get(&user("Todo3")).unwrap();
    assert_eq!(
        todo.get(&key("text")),
        Some(&StoreValue::Scalar(json!("hi there")))
    );
    assert_eq!(
        todo.get(&key("note")),
        Some(&StoreValue::Scalar(json!("keep me")))
    );

    // the list slot now holds the durable reference
    let read = cache.read(&todo_list_document(), &no_vars()).unwrap();
    assert!(read.is_complete());
    assert_eq!(
        read.data.unwrap()["todoList"]["todos"][0]["id"],
        json!("3")
    );
}

#[test]
fn list_element_durable_identity_cannot_be_demoted() {
    let mut cache = Cache::new();

    cache
        .write(
            &todo_list_document(),
            &json!({
                "todoList": {
                    "__typename": "TodoList",
                    "id": "5",
                    "todos": [{"__typename": "Todo", "id": "3", "text": "hi"}]
                }
            }),
            &no_vars(),
        )
        .unwrap();
    let before = cache.extract(false);

    // an unidentified element at the same position would demote the slot
    let err = cache
        .write(
            &anonymous_todo_list_document(),
            &json!({
                "todoList": {
                    "__typename": "TodoList",
                    "id": "5",
                    "todos": [{"text": "imposter", "note": "n"}]
                }
            }),
            &no_vars(),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Cache(CacheError::IdentityOverwrite { existing, .. }) if existing == "Todo3"
    ));
    assert_eq!(cache.extract(false), before);
}

#[test]
fn real_to_real_reference_updates_are_ordinary_writes() {
    let mut cache = Cache::new();

    cache
        .write(
            &identified_user_document(),
            &json!({"user": {"__typename": "User", "id": "42", "name": "Ada"}}),
            &no_vars(),
        )
        .unwrap();
    cache
        .write(
            &identified_user_document(),
            &json!({"user": {"__typename": "User", "id": "43", "name": "Grace"}}),
            &no_vars(),
        )
        .unwrap();

    // both entities exist; the slot points at the newer one
    assert!(cache.contains(&user("User42")));
    let read = cache.read(&identified_user_document(), &no_vars()).unwrap();
    assert_eq!(
        read.data,
        Some(json!({"user": {"__typename": "User", "id": "43", "name": "Grace"}}))
    );
}
