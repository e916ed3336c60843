//! Integration tests for the pull read path against concurrent frames

use super::test_utils::{clients, incr, put, registry};
use pokesync::pull::pull;
use pokesync::{FrameProcessor, FrameWindow, MemoryMutationSource, PatchOp, VersionedStore};
use serde_json::json;
use std::sync::Arc;

#[test]
fn test_pull_reflects_committed_frames() {
    let store = VersionedStore::temporary().unwrap();
    let registry = registry();
    let processor = FrameProcessor::new(&registry);
    let mut source = MemoryMutationSource::new(vec![
        put("c1", 1, "b", "2", 10),
        put("c2", 1, "a", "1", 11),
    ]);
    processor
        .run(&store, &mut source, &clients(&["c1", "c2"]), FrameWindow::new(0, 100))
        .unwrap();

    let response = pull(&store, "c2").unwrap();
    assert_eq!(response.cookie, 1);
    assert_eq!(response.last_mutation_id, 1);
    assert_eq!(
        response.patch,
        vec![
            PatchOp::Put {
                key: "a".to_string(),
                value: json!("1")
            },
            PatchOp::Put {
                key: "b".to_string(),
                value: json!("2")
            },
        ]
    );
}

/// Every frame bumps two counters together; a reader must never see them
/// disagree or see a counter ahead of the cookie.
#[test]
fn test_pull_never_observes_partial_frame() {
    let store = Arc::new(VersionedStore::temporary().unwrap());
    let frames = 40u64;

    let writer = {
        let store = Arc::clone(&store);
        std::thread::spawn(move || {
            let registry = registry();
            let processor = FrameProcessor::new(&registry);
            for i in 0..frames {
                let ts = i * 10;
                let mut source = MemoryMutationSource::new(vec![
                    incr("w", i * 2 + 1, "x", ts),
                    incr("w", i * 2 + 2, "y", ts + 1),
                ]);
                processor
                    .run(&store, &mut source, &clients(&["w"]), FrameWindow::new(ts, ts + 10))
                    .unwrap();
            }
        })
    };

    for _ in 0..200 {
        let response = pull(&store, "w").unwrap();
        let value_of = |key: &str| {
            response
                .patch
                .iter()
                .find_map(|op| match op {
                    PatchOp::Put { key: k, value } if k == key => value.as_u64(),
                    _ => None,
                })
                .unwrap_or(0)
        };
        let x = value_of("x");
        let y = value_of("y");
        assert_eq!(x, y);
        assert_eq!(x, response.cookie);
        assert_eq!(response.last_mutation_id, response.cookie * 2);
    }

    writer.join().unwrap();
    assert_eq!(store.version().unwrap(), frames);
}

/// Each frame advances every client's cursor together, so client listings
/// and status summaries must always show one shared cursor matching the
/// version.
#[test]
fn test_client_listing_never_observes_partial_frame() {
    let store = Arc::new(VersionedStore::temporary().unwrap());
    let writers: Vec<String> = (0..32).map(|n| format!("c{n:02}")).collect();
    let frames = 60u64;

    let writer = {
        let store = Arc::clone(&store);
        let writers = writers.clone();
        std::thread::spawn(move || {
            let registry = registry();
            let processor = FrameProcessor::new(&registry);
            for i in 0..frames {
                let ts = i * 10;
                let mut source = MemoryMutationSource::new(
                    writers
                        .iter()
                        .map(|client| put(client, i + 1, client, "v", ts))
                        .collect::<Vec<_>>(),
                );
                processor
                    .run(&store, &mut source, &writers, FrameWindow::new(ts, ts + 10))
                    .unwrap();
            }
        })
    };

    for _ in 0..200 {
        let listed = store.clients().unwrap();
        if let Some((_, first)) = listed.first() {
            assert_eq!(listed.len(), writers.len());
            assert!(listed
                .iter()
                .all(|(_, record)| record.last_mutation_id == first.last_mutation_id));
        }

        let summary = store.summary().unwrap();
        assert!(summary
            .clients
            .iter()
            .all(|(_, record)| record.last_mutation_id == summary.version));
        assert_eq!(summary.values, if summary.version == 0 { 0 } else { writers.len() });
    }

    writer.join().unwrap();
    assert_eq!(store.version().unwrap(), frames);
}
