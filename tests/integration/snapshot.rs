//! Snapshot extract/restore, reset, evict lifecycle.

use serde_json::{Value, json};
use weft::{Cache, CacheConfig, EntityId, Limits, SerializedStore, Variables};

use crate::fixtures::{self, base_todo_list, no_vars, todo_list_document, user};

#[test]
fn extract_restore_roundtrip_is_byte_identical() {
    let mut cache = Cache::new();
    cache
        .write(&todo_list_document(), &base_todo_list(), &no_vars())
        .unwrap();

    let wire = serde_json::to_string(&cache.extract(false)).unwrap();

    let mut restored = Cache::new();
    restored
        .restore(serde_json::from_str(&wire).unwrap())
        .unwrap();

    assert_eq!(serde_json::to_string(&restored.extract(false)).unwrap(), wire);

    // the restored cache serves the same reads
    let read = restored.read(&todo_list_document(), &no_vars()).unwrap();
    assert_eq!(read.data, Some(base_todo_list()));
}

#[test]
fn snapshot_wire_shape_is_stable() {
    let mut cache = Cache::new();
    cache
        .write(
            &todo_list_document(),
            &fixtures::todo_list_with(vec![fixtures::todo("3", "hi")]),
            &no_vars(),
        )
        .unwrap();

    let wire: Value = serde_json::to_value(cache.extract(false)).unwrap();
    assert_eq!(
        wire["ROOT_QUERY"]["todoList"],
        json!({"type": "id", "id": "TodoList5", "generated": false})
    );
    assert_eq!(
        wire["TodoList5"]["todos"],
        json!([{"type": "id", "id": "Todo3", "generated": false}])
    );
    assert_eq!(wire["Todo3"]["text"], json!("hi"));
}

#[test]
fn extract_can_include_or_exclude_optimistic_layers() {
    let mut cache = Cache::new();
    cache
        .write(&todo_list_document(), &base_todo_list(), &no_vars())
        .unwrap();
    let base_only = cache.extract(false);

    cache
        .record_optimistic("spec", |writer: &mut weft::OptimisticWriter<'_>| {
            writer.write(
                &todo_list_document(),
                &fixtures::todo_list_with(vec![fixtures::todo("99", "speculative")]),
                &Variables::new(),
            )?;
            Ok(())
        })
        .unwrap();

    assert_eq!(cache.extract(false), base_only);
    let with_layers = cache.extract(true);
    assert_ne!(with_layers, base_only);
    assert!(with_layers.get(&user("Todo99")).is_some());
}

#[test]
fn restore_drops_optimistic_layers_and_notifies() {
    let mut cache = Cache::new();
    cache
        .write(&todo_list_document(), &base_todo_list(), &no_vars())
        .unwrap();
    let snapshot = cache.extract(false);

    cache
        .record_optimistic("spec", |writer: &mut weft::OptimisticWriter<'_>| {
            writer.write(
                &todo_list_document(),
                &fixtures::todo_list_with(vec![fixtures::todo("99", "speculative")]),
                &Variables::new(),
            )?;
            Ok(())
        })
        .unwrap();

    let subscription = cache
        .subscribe(todo_list_document(), no_vars(), EntityId::root_query())
        .unwrap();

    cache.restore(snapshot).unwrap();
    assert_eq!(cache.optimistic_layer_count(), 0);

    let updates = subscription.drain();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].data, Some(base_todo_list()));
}

#[test]
fn restore_refuses_oversized_snapshots() {
    let mut cache = Cache::new();
    cache
        .write(&todo_list_document(), &base_todo_list(), &no_vars())
        .unwrap();
    let snapshot = cache.extract(false);

    let mut tight = Cache::with_config(CacheConfig::with_limits(Limits {
        max_snapshot_entries: 2,
        ..Limits::default()
    }));
    assert!(tight.restore(snapshot).is_err());
}

#[test]
fn reset_empties_the_store_but_keeps_watchers() {
    let mut cache = Cache::new();
    cache
        .write(&todo_list_document(), &base_todo_list(), &no_vars())
        .unwrap();
    let subscription = cache
        .subscribe(todo_list_document(), no_vars(), EntityId::root_query())
        .unwrap();

    cache.reset().unwrap();
    assert_eq!(cache.entity_count(), 0);
    assert_eq!(cache.watcher_count(), 1);

    let updates = subscription.drain();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].data, None);

    // the watcher is live: a fresh write renotifies
    cache
        .write(&todo_list_document(), &base_todo_list(), &no_vars())
        .unwrap();
    let updates = subscription.drain();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].data, Some(base_todo_list()));
}

#[test]
fn evicted_entities_leave_dangling_references() {
    let mut cache = Cache::new();
    cache
        .write(&todo_list_document(), &base_todo_list(), &no_vars())
        .unwrap();

    assert!(cache.evict(&user("Todo6")).unwrap());
    assert!(!cache.evict(&user("Todo6")).unwrap());
    assert!(!cache.contains(&user("Todo6")));

    let read = cache.read(&todo_list_document(), &no_vars()).unwrap();
    assert!(!read.is_complete());
    // the hole is at index 1 of the list
    assert_eq!(
        read.missing,
        vec![weft::Path::root().key("todoList").key("todos").index(1)]
    );
}

#[test]
fn snapshot_type_roundtrips_as_a_value() {
    let snapshot: SerializedStore = serde_json::from_value(json!({
        "ROOT_QUERY": {"flag": true},
        "User42": {"name": "Ada"}
    }))
    .unwrap();
    assert_eq!(snapshot.len(), 2);

    let mut cache = Cache::new();
    cache.restore(snapshot.clone()).unwrap();
    assert_eq!(cache.extract(false), snapshot);
}
