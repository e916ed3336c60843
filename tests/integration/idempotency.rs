//! Property tests: replay idempotency and same-key coalescing

use super::test_utils::{clients, put, registry};
use pokesync::pull::pull;
use pokesync::{ClientMutation, FrameProcessor, FrameWindow, MemoryMutationSource, PatchOp, VersionedStore};
use proptest::prelude::*;
use serde_json::json;

const CLIENTS: [&str; 3] = ["c0", "c1", "c2"];
const KEYS: [&str; 4] = ["a", "b", "c", "d"];

/// Turn (client, key, value) triples into mutations with per-client
/// increasing ids and increasing timestamps starting at `base_ts`.
fn build(ops: &[(usize, usize, u32)], base_ts: u64) -> Vec<ClientMutation> {
    let mut next_id = [0u64; 3];
    ops.iter()
        .enumerate()
        .map(|(i, (client, key, value))| {
            next_id[*client] += 1;
            put(
                CLIENTS[*client],
                next_id[*client],
                KEYS[*key],
                &value.to_string(),
                base_ts + i as u64,
            )
        })
        .collect()
}

fn snapshot(store: &VersionedStore) -> (u64, Vec<PatchOp>, Vec<(String, u64)>) {
    let state = pull(store, "c0").unwrap();
    let records = store
        .clients()
        .unwrap()
        .into_iter()
        .map(|(id, r)| (id, r.last_mutation_id))
        .collect();
    (state.cookie, state.patch, records)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn replayed_mutations_change_nothing(
        ops in prop::collection::vec((0usize..3, 0usize..4, 0u32..1000), 1..24)
    ) {
        let store = VersionedStore::temporary().unwrap();
        let registry = registry();
        let processor = FrameProcessor::new(&registry);
        let connected = clients(&CLIENTS);

        let mut source = MemoryMutationSource::new(build(&ops, 0));
        let first = processor
            .run(&store, &mut source, &connected, FrameWindow::new(0, 1_000))
            .unwrap();
        prop_assert_eq!(first.cookie, 1);
        let before = snapshot(&store);

        // Same (client, id) pairs delivered again in a later window.
        let mut replay = MemoryMutationSource::new(build(&ops, 1_000));
        let second = processor
            .run(&store, &mut replay, &connected, FrameWindow::new(1_000, 2_000))
            .unwrap();

        prop_assert!(second.pokes.is_empty());
        prop_assert_eq!(second.stats.skipped_duplicate, ops.len());
        prop_assert_eq!(snapshot(&store), before);
    }

    #[test]
    fn same_key_writes_yield_one_patch_entry(
        values in prop::collection::vec(0u32..1000, 1..16)
    ) {
        let store = VersionedStore::temporary().unwrap();
        let registry = registry();
        let processor = FrameProcessor::new(&registry);
        let mutations: Vec<ClientMutation> = values
            .iter()
            .enumerate()
            .map(|(i, v)| put("c1", i as u64 + 1, "k", &v.to_string(), i as u64))
            .collect();
        let mut source = MemoryMutationSource::new(mutations);

        let outcome = processor
            .run(&store, &mut source, &clients(&["c1", "c2"]), FrameWindow::new(0, 100))
            .unwrap();

        let last = values.last().unwrap().to_string();
        let expected = vec![PatchOp::Put { key: "k".to_string(), value: json!(last) }];
        prop_assert_eq!(&outcome.pokes[0].poke.patch, &expected);
        prop_assert_eq!(&outcome.pokes[1].poke.patch, &expected);
        prop_assert_eq!(outcome.pokes[0].poke.last_mutation_id, values.len() as u64);
        prop_assert_eq!(outcome.pokes[1].poke.last_mutation_id, 0);
        prop_assert_eq!(outcome.cookie, 1);
    }
}
