//! Property tests over reconciliation
//!
//! `replace` with uniquely-keyed entries must converge the membership to
//! exactly the incoming key set, preserve the handles of every member whose
//! key survives, and keep the key slot store in lockstep throughout.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use tether_collection::{CollectionOptions, Entry, Parent};
use tether_core::{Attrs, Entity, KeyValue, SlotKey};

use crate::MemoryBackend;

fn unique_keys() -> impl Strategy<Value = Vec<i64>> {
    proptest::collection::vec(0..50i64, 0..12).prop_map(|keys| {
        let mut seen = HashSet::new();
        keys.into_iter().filter(|k| seen.insert(*k)).collect()
    })
}

fn keyed_payload(key: i64) -> Attrs {
    Attrs::from_value(json!({"id": key})).expect("object payload")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_replace_converges_to_incoming_keys(
        current in unique_keys(),
        incoming in unique_keys(),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");
        rt.block_on(async {
            let backend = Arc::new(MemoryBackend::new("item"));
            let parent = Parent::new();
            let collection =
                parent.bind_collection("items", backend as _, CollectionOptions::default());

            let mut handles: HashMap<i64, Entity> = HashMap::new();
            for key in &current {
                let entity = collection.add_at(usize::MAX, keyed_payload(*key)).unwrap();
                handles.insert(*key, entity);
            }

            let entries: Vec<Entry> = incoming.iter().map(|k| keyed_payload(*k).into()).collect();
            collection.replace(entries).await.unwrap();

            // membership is exactly the incoming key set
            let final_keys: HashSet<i64> = collection
                .members()
                .iter()
                .filter_map(|m| match m.primary() {
                    Some(KeyValue::Int(k)) => Some(k),
                    _ => None,
                })
                .collect();
            let expected: HashSet<i64> = incoming.iter().copied().collect();
            assert_eq!(final_keys, expected);

            // surviving keys keep their original handles
            for key in incoming.iter().filter(|k| handles.contains_key(*k)) {
                let survivor = collection.find_by_key(&KeyValue::Int(*key)).unwrap();
                assert!(Entity::ptr_eq(&survivor, &handles[key]));
            }

            // sequence and slots stay in lockstep, pairwise
            let members = collection.members();
            let slots = collection.key_slots().unwrap();
            assert_eq!(members.len(), slots.len());
            for (member, slot) in members.iter().zip(&slots) {
                assert_eq!(slot, &SlotKey::Primary(member.primary().unwrap()));
            }
        });
    }
}
