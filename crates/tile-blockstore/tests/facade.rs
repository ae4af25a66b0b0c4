//! The block store contract as an engine sees it, over memory and files.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use proptest::prelude::*;
use tempfile::TempDir;
use tile_blockstore::{
    BlockStore, BlockStoreError, DirectoryBlockStore, Extent3d, MasterHeader, NodeHeader,
    StoreConfig,
};
use tile_store::{InMemoryBackend, SyncMode};
use tile_types::BlockId;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
struct Point {
    xyz: [f64; 3],
    intensity: u16,
    class: u8,
    flags: u8,
    _pad: u32,
}

type Store = DirectoryBlockStore<NodeHeader, Point>;

fn cloud(n: usize, seed: u16) -> Vec<Point> {
    (0..n)
        .map(|i| Point {
            xyz: [i as f64 * 0.25, seed as f64, -(i as f64)],
            intensity: seed.wrapping_mul(i as u16),
            class: (i % 7) as u8,
            ..Default::default()
        })
        .collect()
}

fn memory_store() -> Store {
    Store::create(Arc::new(InMemoryBackend::new()), &StoreConfig::default()).unwrap()
}

/// Generic engine code that only knows the trait.
fn build_two_level_index<S>(store: &mut S, leaves: &[Vec<S::Point>]) -> BlockId
where
    S: BlockStore<Header = NodeHeader>,
{
    let root = store.store_new_point_block(&[]).unwrap();
    let mut children = Vec::new();
    for leaf in leaves {
        let id = store.store_new_point_block(leaf).unwrap();
        store
            .store_header(
                &NodeHeader {
                    level: 1,
                    is_leaf: true,
                    total_count: leaf.len() as u64,
                    parent: Some(root),
                    ..Default::default()
                },
                id,
            )
            .unwrap();
        children.push(id);
    }
    let total = leaves.iter().map(|l| l.len() as u64).sum::<u64>();
    store
        .store_header(
            &NodeHeader {
                total_count: total,
                children,
                ..Default::default()
            },
            root,
        )
        .unwrap();
    root
}

// ---------------------------------------------------------------------------
// Point block contract
// ---------------------------------------------------------------------------

#[test]
fn short_buffer_is_rejected_untouched() {
    let mut store = memory_store();
    let id = store.store_new_point_block(&cloud(100, 1)).unwrap();
    assert_eq!(store.point_block_data_count(id).unwrap(), 100);

    let sentinel = Point {
        intensity: 0xBEEF,
        ..Default::default()
    };
    let mut buf = vec![sentinel; 99];
    let err = store.load_point_block(&mut buf, 99, id).unwrap_err();
    assert!(matches!(err, BlockStoreError::InvalidArgument(_)));
    assert!(buf.iter().all(|p| *p == sentinel));

    // Room in the buffer but a smaller declared maximum.
    let mut buf = vec![sentinel; 200];
    assert!(store.load_point_block(&mut buf, 50, id).is_err());
    assert!(buf.iter().all(|p| *p == sentinel));

    assert_eq!(store.load_point_block(&mut buf, 200, id).unwrap(), 100);
    assert_eq!(&buf[..100], &cloud(100, 1)[..]);
    assert_eq!(buf[100], sentinel);
}

#[test]
fn replacing_points_changes_count() {
    let mut store = memory_store();
    let id = store.store_new_point_block(&cloud(10, 2)).unwrap();
    store.store_point_block(&cloud(500, 3), id).unwrap();
    assert_eq!(store.point_block_data_count(id).unwrap(), 500);
    store.store_point_block(&[], id).unwrap();
    assert_eq!(store.point_block_data_count(id).unwrap(), 0);

    let ghost = BlockId::from_raw(id.to_raw() + 1);
    assert!(matches!(
        store.store_point_block(&cloud(1, 0), ghost),
        Err(BlockStoreError::NotFound(_))
    ));
}

#[test]
fn destroy_reports_absence() {
    let mut store = memory_store();
    let id = store.store_new_point_block(&cloud(3, 0)).unwrap();
    assert!(store.destroy_point_block(id).unwrap());
    assert!(!store.destroy_point_block(id).unwrap());
    assert!(matches!(
        store.point_block_data_count(id),
        Err(BlockStoreError::NotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// Master header
// ---------------------------------------------------------------------------

#[test]
fn master_header_reports_full_size_on_truncation() {
    let mut store = memory_store();
    let mut small = [0u8; 4];
    assert_eq!(store.load_master_header(&mut small).unwrap(), 0);

    let master = MasterHeader {
        depth: 6,
        extent: Extent3d::new([-10.0; 3], [10.0; 3]),
        ..Default::default()
    };
    let bytes = master.to_bytes().unwrap();
    store.store_master_header(&bytes).unwrap();

    assert_eq!(store.load_master_header(&mut small).unwrap(), bytes.len());
    assert_eq!(small, bytes[..4]);

    let mut full = vec![0u8; 256];
    let n = store.load_master_header(&mut full).unwrap();
    assert_eq!(MasterHeader::from_bytes(&full[..n]).unwrap(), master);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn closed_store_refuses_everything() {
    let mut store = memory_store();
    let id = store.store_new_point_block(&cloud(5, 0)).unwrap();
    store.close().unwrap();
    store.close().unwrap();

    let mut buf = vec![Point::default(); 5];
    assert!(matches!(
        store.load_point_block(&mut buf, 5, id),
        Err(BlockStoreError::Closed)
    ));
    assert!(matches!(
        store.store_new_point_block(&cloud(1, 0)),
        Err(BlockStoreError::Closed)
    ));
    assert!(matches!(
        store.store_master_header(b"m"),
        Err(BlockStoreError::Closed)
    ));
    assert!(matches!(store.load_header(id), Err(BlockStoreError::Closed)));
}

#[test]
fn index_survives_reopen_from_disk() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index.tiles");
    let config = StoreConfig {
        sync_mode: SyncMode::EveryWrite,
        ..Default::default()
    };
    let leaves = vec![cloud(40, 1), cloud(900, 2), cloud(7, 3)];

    let root = {
        let mut store = Store::create_file(&path, &config).unwrap();
        let root = build_two_level_index(&mut store, &leaves);
        let master = MasterHeader {
            root: Some(root),
            depth: 2,
            ..Default::default()
        };
        store.store_master_header(&master.to_bytes().unwrap()).unwrap();
        store.close().unwrap();
        root
    };

    let store = Store::open_file(&path, &config).unwrap();
    let mut buf = vec![0u8; 128];
    let n = store.load_master_header(&mut buf).unwrap();
    assert_eq!(MasterHeader::from_bytes(&buf[..n]).unwrap().root, Some(root));

    let header = store.load_header(root).unwrap();
    assert_eq!(header.total_count, 947);
    for (child, expected) in header.children.iter().zip(&leaves) {
        let leaf = store.load_header(*child).unwrap();
        assert_eq!(leaf.parent, Some(root));
        let mut points = vec![Point::default(); expected.len()];
        let n = store
            .load_point_block(&mut points, expected.len(), *child)
            .unwrap();
        assert_eq!(&points[..n], &expected[..]);
    }
}

#[test]
fn mapped_store_is_read_only() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index.tiles");
    let config = StoreConfig::default();
    let id = {
        let mut store = Store::create_file(&path, &config).unwrap();
        let id = store.store_new_point_block(&cloud(12, 4)).unwrap();
        store.close().unwrap();
        id
    };

    let mut store = Store::open_mapped(&path, &config).unwrap();
    assert_eq!(store.point_block_data_count(id).unwrap(), 12);
    assert!(matches!(
        store.store_new_point_block(&cloud(1, 0)),
        Err(BlockStoreError::Packet(_))
    ));
    // An empty block writes no bytes but still needs a catalog entry.
    assert!(matches!(
        store.store_new_point_block(&[]),
        Err(BlockStoreError::Packet(_))
    ));
    assert!(matches!(
        store.store_point_block(&cloud(2, 0), id),
        Err(BlockStoreError::Packet(_))
    ));
    assert!(matches!(
        store.destroy_point_block(id),
        Err(BlockStoreError::Packet(_))
    ));
    assert_eq!(store.block_count().unwrap(), 1);

    store.close().unwrap();
    store.close().unwrap();
    assert!(matches!(store.block_count(), Err(BlockStoreError::Closed)));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn point_blocks_round_trip(sizes in prop::collection::vec(0usize..300, 1..12)) {
        let mut store = memory_store();
        let ids: Vec<_> = sizes
            .iter()
            .enumerate()
            .map(|(i, &n)| store.store_new_point_block(&cloud(n, i as u16)).unwrap())
            .collect();
        for (i, (&id, &n)) in ids.iter().zip(&sizes).enumerate() {
            prop_assert_eq!(store.point_block_data_count(id).unwrap(), n);
            let mut buf = vec![Point::default(); n];
            prop_assert_eq!(store.load_point_block(&mut buf, n, id).unwrap(), n);
            prop_assert_eq!(buf, cloud(n, i as u16));
        }
    }
}
