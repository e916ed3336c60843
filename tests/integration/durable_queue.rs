//! Integration tests for frames fed from the durable pending queue

use super::test_utils::{clients, put, registry};
use pokesync::mutation::{PendingQueue, QueuedMutationSource};
use pokesync::{ClientMutation, FrameProcessor, FrameWindow, VersionedStore};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn test_consumed_entries_leave_queue_on_commit() {
    let store = VersionedStore::temporary().unwrap();
    let queue = PendingQueue::new(&store);
    queue
        .push(vec![
            put("c1", 1, "a", "x", 50),
            put("c1", 2, "b", "y", 150),
            put("c1", 3, "c", "z", 250),
        ])
        .unwrap();

    let registry = registry();
    let processor = FrameProcessor::new(&registry);
    let mut source = QueuedMutationSource::new();
    let outcome = processor
        .run(&store, &mut source, &clients(&["c1"]), FrameWindow::new(100, 200))
        .unwrap();

    assert_eq!(outcome.stats.applied, 1);
    assert_eq!(outcome.stats.skipped_stale, 1);
    let remaining = queue.list().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, 3);
}

#[test]
fn test_failed_frame_leaves_queue_untouched() {
    let store = VersionedStore::temporary().unwrap();
    let queue = PendingQueue::new(&store);
    queue
        .push(vec![
            put("c1", 1, "a", "x", 10),
            ClientMutation::new("c1", 2, "fail", json!(null), 20),
        ])
        .unwrap();

    let registry = registry();
    let processor = FrameProcessor::new(&registry);
    let mut source = QueuedMutationSource::new();
    assert!(processor
        .run(&store, &mut source, &clients(&["c1"]), FrameWindow::new(0, 100))
        .is_err());

    assert_eq!(queue.len().unwrap(), 2);
    assert_eq!(store.version().unwrap(), 0);
    assert!(store.user_value("a").unwrap().is_none());

    // Retrying with a window that excludes the bad mutation commits the rest.
    let outcome = processor
        .run(&store, &mut source, &clients(&["c1"]), FrameWindow::new(0, 15))
        .unwrap();
    assert_eq!(outcome.cookie, 1);
    assert_eq!(queue.len().unwrap(), 1);
}

#[test]
fn test_mutations_pushed_between_frames_are_picked_up() {
    let store = VersionedStore::temporary().unwrap();
    let queue = PendingQueue::new(&store);
    let registry = registry();
    let processor = FrameProcessor::new(&registry);
    let mut source = QueuedMutationSource::new();

    queue.push(vec![put("c1", 1, "a", "x", 10)]).unwrap();
    processor
        .run(&store, &mut source, &clients(&["c1"]), FrameWindow::new(0, 100))
        .unwrap();

    queue.push(vec![put("c1", 2, "a", "y", 110)]).unwrap();
    let outcome = processor
        .run(&store, &mut source, &clients(&["c1"]), FrameWindow::new(100, 200))
        .unwrap();

    assert_eq!(outcome.base_cookie, 1);
    assert_eq!(outcome.cookie, 2);
    assert_eq!(outcome.pokes[0].poke.last_mutation_id, 2);
    assert!(queue.is_empty().unwrap());
}

#[test]
fn test_queue_and_state_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = VersionedStore::open(temp_dir.path())
            .unwrap()
            .with_flush_on_commit(true);
        PendingQueue::new(&store)
            .push(vec![put("c1", 1, "a", "x", 10), put("c1", 2, "b", "y", 500)])
            .unwrap();
        let registry = registry();
        let processor = FrameProcessor::new(&registry);
        let mut source = QueuedMutationSource::new();
        processor
            .run(&store, &mut source, &clients(&["c1"]), FrameWindow::new(0, 100))
            .unwrap();
    }

    let store = VersionedStore::open(temp_dir.path()).unwrap();
    assert_eq!(store.version().unwrap(), 1);
    assert_eq!(store.user_value("a").unwrap().unwrap().value, json!("x"));
    let pending = PendingQueue::new(&store).list().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, 2);
}
