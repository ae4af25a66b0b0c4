//! Property tests for packet storage: round trips, id reuse, statistics,
//! iteration order, compression bounds, and iterator positioning.

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use tile_packet::{
    AllocationPolicy, DirectoryConfig, PacketResult, RawEditor, TileFile, TileFileOptions,
};
use tile_store::InMemoryBackend;
use tile_types::{Compression, DataType, PacketId};

fn file(compression: Compression, policy: AllocationPolicy) -> TileFile {
    let options = TileFileOptions {
        root: DirectoryConfig::new(DataType::Raw, compression),
        policy,
    };
    TileFile::create(Arc::new(InMemoryBackend::new()), options).unwrap()
}

fn scheme() -> impl Strategy<Value = Compression> {
    prop_oneof![
        Just(Compression::None),
        (1..=9i32).prop_map(|level| Compression::Zstd { level }),
        (0..=9u32).prop_map(|level| Compression::Deflate { level }),
    ]
}

fn policy() -> impl Strategy<Value = AllocationPolicy> {
    prop_oneof![
        Just(AllocationPolicy::FirstFit),
        Just(AllocationPolicy::BestFit),
        Just(AllocationPolicy::AppendOnly),
    ]
}

/// Payloads that compress well sometimes and not at all other times.
fn payload() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..512),
        (any::<u8>(), 0..2048usize).prop_map(|(b, n)| vec![b; n]),
    ]
}

#[derive(Clone, Debug)]
enum Op {
    Add(Vec<u8>),
    Set(usize, Vec<u8>),
    Remove(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => payload().prop_map(Op::Add),
        2 => (any::<usize>(), payload()).prop_map(|(i, p)| Op::Set(i, p)),
        2 => any::<usize>().prop_map(Op::Remove),
    ]
}

/// Pick an existing id from the model by index, if any.
fn pick(model: &BTreeMap<u32, Vec<u8>>, i: usize) -> Option<u32> {
    if model.is_empty() {
        return None;
    }
    model.keys().nth(i % model.len()).copied()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn add_then_get_roundtrips(scheme in scheme(), data in payload()) {
        let mut file = file(scheme, AllocationPolicy::FirstFit);
        let id = file.packets_mut(&[]).unwrap().add(data.clone()).unwrap();
        let mgr = file.packets(&[]).unwrap();
        prop_assert_eq!(mgr.get(id).unwrap(), data.clone());
        prop_assert_eq!(mgr.size(id), data.len() as u64);
    }

    #[test]
    fn operations_match_model(
        scheme in scheme(),
        policy in policy(),
        ops in prop::collection::vec(op(), 1..60),
    ) {
        let mut file = file(scheme, policy);
        let mut model: BTreeMap<u32, Vec<u8>> = BTreeMap::new();

        for op in ops {
            let mut mgr = file.packets_mut(&[]).unwrap();
            match op {
                Op::Add(data) => {
                    let id = mgr.add(data.clone()).unwrap();
                    // Lowest free id first.
                    let expected = (0u32..).find(|i| !model.contains_key(i)).unwrap();
                    prop_assert_eq!(id.get(), expected);
                    model.insert(id.get(), data);
                }
                Op::Set(i, data) => {
                    if let Some(id) = pick(&model, i) {
                        mgr.set(PacketId::new(id), data.clone()).unwrap();
                        model.insert(id, data);
                    }
                }
                Op::Remove(i) => {
                    if let Some(id) = pick(&model, i) {
                        mgr.remove(PacketId::new(id)).unwrap();
                        model.remove(&id);
                    }
                }
            }
        }

        let mgr = file.packets(&[]).unwrap();

        // Iteration yields exactly the live ids, ascending.
        let ids: Vec<u32> = mgr.ids().map(PacketId::get).collect();
        let expected: Vec<u32> = model.keys().copied().collect();
        prop_assert_eq!(&ids, &expected);

        // Statistics agree with the live set.
        prop_assert_eq!(mgr.count(), model.len());
        let summed: u64 = ids.iter().map(|&id| mgr.size(PacketId::new(id))).sum();
        prop_assert_eq!(mgr.total_size(), summed);
        prop_assert_eq!(mgr.total_size(), model.values().map(|v| v.len() as u64).sum::<u64>());

        // Every packet reads back exactly.
        for (&id, data) in &model {
            prop_assert_eq!(&mgr.get(PacketId::new(id)).unwrap(), data);
        }

        // Lossless compression never inflates.
        let ratio = mgr.compression_ratio();
        prop_assert!(ratio <= 1.0, "ratio {}", ratio);
        if mgr.total_size() > 0 {
            prop_assert!(ratio > 0.0, "ratio {}", ratio);
        }
    }

    #[test]
    fn create_matches_begin_plus_n(
        removed in prop::collection::btree_set(0u32..40, 0..30),
        n in 0usize..40,
    ) {
        let mut file = file(Compression::None, AllocationPolicy::FirstFit);
        let tag = file
            .sub_dirs_mut(&[])
            .unwrap()
            .create_dir(DirectoryConfig::default())
            .unwrap();
        {
            let mut mgr = file.packets_mut(&[tag]).unwrap();
            for i in 0..40u32 {
                mgr.add(i.to_le_bytes().to_vec()).unwrap();
            }
            for &id in &removed {
                mgr.remove(PacketId::new(id)).unwrap();
            }
        }
        let subs = file.sub_dirs(&[]).unwrap();
        let mgr = subs.packets(tag).unwrap();
        let live: Vec<PacketId> = mgr.ids().collect();
        prop_assume!(!live.is_empty());
        let n = n % live.len();

        let editor = RawEditor;
        let mut walked = mgr.iter(&editor);
        for _ in 0..n {
            walked.move_next();
        }
        let created = subs.create(tag, live[n], &editor).unwrap();
        prop_assert!(walked == created);
        prop_assert_eq!(walked.get().unwrap(), created.get().unwrap());

        // Walking the rest from either position yields the same tail.
        let tail_a: PacketResult<Vec<_>> = walked.collect();
        let tail_b: PacketResult<Vec<_>> = created.collect();
        prop_assert_eq!(tail_a.unwrap(), tail_b.unwrap());
    }
}
