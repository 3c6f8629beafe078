//! Watcher dependency tracking and notification batching.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use weft::{Cache, Document, EntityId, Field, SelectionSet, Variables, WatchUpdate};

use crate::fixtures::{self, base_todo_list, no_vars, todo_list_document, user};

fn user_document() -> Document {
    fixtures::identified_user_document()
}

/// Collects updates through a callback watcher.
fn collecting_watcher(
    cache: &mut Cache,
    document: Document,
) -> (weft::WatchHandle, Rc<RefCell<Vec<WatchUpdate>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let handle = cache
        .watch(document, Variables::new(), EntityId::root_query(), move |update| {
            sink.borrow_mut().push(update);
        })
        .unwrap();
    (handle, seen)
}

#[test]
fn watcher_fires_only_for_intersecting_writes() {
    let mut cache = Cache::new();
    cache
        .write(&todo_list_document(), &base_todo_list(), &no_vars())
        .unwrap();
    cache
        .write(
            &user_document(),
            &json!({"user": {"__typename": "User", "id": "42", "name": "Ada"}}),
            &no_vars(),
        )
        .unwrap();

    let (_, todo_updates) = collecting_watcher(&mut cache, todo_list_document());
    let (_, user_updates) = collecting_watcher(&mut cache, user_document());

    // touching only the user leaves the todo watcher silent
    cache
        .write(
            &user_document(),
            &json!({"user": {"__typename": "User", "id": "42", "name": "Countess"}}),
            &no_vars(),
        )
        .unwrap();

    assert!(todo_updates.borrow().is_empty());
    assert_eq!(user_updates.borrow().len(), 1);
    assert_eq!(
        user_updates.borrow()[0].data,
        Some(json!({"user": {"__typename": "User", "id": "42", "name": "Countess"}}))
    );
}

#[test]
fn identical_rewrite_does_not_notify() {
    let mut cache = Cache::new();
    cache
        .write(&todo_list_document(), &base_todo_list(), &no_vars())
        .unwrap();

    let (_, updates) = collecting_watcher(&mut cache, todo_list_document());

    cache
        .write(&todo_list_document(), &base_todo_list(), &no_vars())
        .unwrap();
    assert!(updates.borrow().is_empty());
}

#[test]
fn batch_collapses_writes_into_one_notification() {
    let mut cache = Cache::new();
    cache
        .write(&todo_list_document(), &base_todo_list(), &no_vars())
        .unwrap();

    let (_, updates) = collecting_watcher(&mut cache, todo_list_document());

    cache
        .batch(|cache| {
            cache.write(
                &todo_list_document(),
                &fixtures::todo_list_with(vec![fixtures::todo("3", "first pass")]),
                &no_vars(),
            )?;
            cache.write(
                &todo_list_document(),
                &fixtures::todo_list_with(vec![fixtures::todo("3", "second pass")]),
                &no_vars(),
            )?;
            Ok(())
        })
        .unwrap();

    let seen = updates.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].data.as_ref().unwrap()["todoList"]["todos"][0]["text"],
        json!("second pass")
    );
}

#[test]
fn unwatch_stops_notifications() {
    let mut cache = Cache::new();
    cache
        .write(&todo_list_document(), &base_todo_list(), &no_vars())
        .unwrap();

    let (handle, updates) = collecting_watcher(&mut cache, todo_list_document());
    assert!(cache.unwatch(handle));
    assert!(!cache.unwatch(handle));

    cache
        .write(
            &todo_list_document(),
            &fixtures::todo_list_with(vec![fixtures::todo("3", "changed")]),
            &no_vars(),
        )
        .unwrap();
    assert!(updates.borrow().is_empty());
}

#[test]
fn dropped_subscription_is_pruned_at_the_next_flush() {
    let mut cache = Cache::new();
    cache
        .write(&todo_list_document(), &base_todo_list(), &no_vars())
        .unwrap();

    let subscription = cache
        .subscribe(todo_list_document(), no_vars(), EntityId::root_query())
        .unwrap();
    assert_eq!(cache.watcher_count(), 1);

    drop(subscription);
    cache
        .write(
            &todo_list_document(),
            &fixtures::todo_list_with(vec![fixtures::todo("3", "changed")]),
            &no_vars(),
        )
        .unwrap();
    assert_eq!(cache.watcher_count(), 0);
}

#[test]
fn watcher_tracks_dependencies_across_result_changes() {
    let mut cache = Cache::new();
    cache
        .write(&todo_list_document(), &base_todo_list(), &no_vars())
        .unwrap();

    let (_, updates) = collecting_watcher(&mut cache, todo_list_document());

    // shrink the list: Todo12 leaves the dependency set
    cache
        .write(
            &todo_list_document(),
            &fixtures::todo_list_with(vec![fixtures::todo("3", "only one")]),
            &no_vars(),
        )
        .unwrap();
    assert_eq!(updates.borrow().len(), 1);

    // a later write touching only the departed entity stays silent
    let todo_doc = Document::query(SelectionSet::new(vec![Field::leaf("text").into()]));
    cache
        .write_at(
            &todo_doc,
            &json!({"text": "stale entity"}),
            &no_vars(),
            &user("Todo12"),
        )
        .unwrap();
    assert_eq!(updates.borrow().len(), 1);
}

#[test]
fn watch_registration_does_not_fire_the_callback() {
    let mut cache = Cache::new();
    cache
        .write(&todo_list_document(), &base_todo_list(), &no_vars())
        .unwrap();

    let (_, updates) = collecting_watcher(&mut cache, todo_list_document());
    assert!(updates.borrow().is_empty());
}
