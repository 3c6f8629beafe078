//! Shared builders for the integration suite.

#![allow(dead_code)]

use serde_json::{Value, json};
use weft::{Document, EntityId, Field, FieldKey, SelectionSet, StoreValue, Variables};

pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn no_vars() -> Variables {
    Variables::new()
}

pub fn key(name: &str) -> FieldKey {
    FieldKey::bare(name)
}

pub fn user(id: &str) -> EntityId {
    EntityId::user(id).unwrap()
}

/// `{ __typename id text }`
pub fn todo_selection() -> SelectionSet {
    SelectionSet::new(vec![
        Field::leaf("__typename").into(),
        Field::leaf("id").into(),
        Field::leaf("text").into(),
    ])
}

/// `{ todoList { __typename id todos { __typename id text } } }`
pub fn todo_list_document() -> Document {
    Document::query(SelectionSet::new(vec![
        Field::new(
            "todoList",
            SelectionSet::new(vec![
                Field::leaf("__typename").into(),
                Field::leaf("id").into(),
                Field::new("todos", todo_selection()).into(),
            ]),
        )
        .into(),
    ]))
}

pub fn todo(id: &str, text: &str) -> Value {
    json!({"__typename": "Todo", "id": id, "text": text})
}

/// The canonical three-todo list used across scenarios.
pub fn base_todo_list() -> Value {
    json!({
        "todoList": {
            "__typename": "TodoList",
            "id": "5",
            "todos": [todo("3", "buy milk"), todo("6", "water plants"), todo("12", "call mom")]
        }
    })
}

/// Result tree with the same list but a different set of todos.
pub fn todo_list_with(todos: Vec<Value>) -> Value {
    json!({
        "todoList": {
            "__typename": "TodoList",
            "id": "5",
            "todos": todos
        }
    })
}

/// `{ user { __typename id name } }`
pub fn identified_user_document() -> Document {
    Document::query(SelectionSet::new(vec![
        Field::new(
            "user",
            SelectionSet::new(vec![
                Field::leaf("__typename").into(),
                Field::leaf("id").into(),
                Field::leaf("name").into(),
            ]),
        )
        .into(),
    ]))
}

/// `{ user { name } }` - no identity fields, so the child gets a
/// synthetic id.
pub fn anonymous_user_document() -> Document {
    Document::query(SelectionSet::new(vec![
        Field::new(
            "user",
            SelectionSet::new(vec![Field::leaf("name").into()]),
        )
        .into(),
    ]))
}

pub fn scalar(v: Value) -> StoreValue {
    StoreValue::Scalar(v)
}
