use std::sync::Arc;
use std::thread;

use super::{CacheSnapshot, PartitionManager};
use crate::column_set::ColumnSet;
use crate::partition::StrippedPartition;
use crate::pool::WorkerPool;
use crate::Error;

fn set(universe: usize, columns: &[usize]) -> ColumnSet {
    ColumnSet::from_columns(universe, columns.iter().copied()).unwrap()
}

fn part(num_rows: usize, clusters: &[&[usize]]) -> StrippedPartition {
    StrippedPartition::new(num_rows, clusters.iter().map(|c| c.to_vec()).collect())
}

/// The 12-row fixture: three single-column base partitions.
fn fixture_base() -> Vec<StrippedPartition> {
    vec![
        part(12, &[&[0, 2, 3, 5], &[1, 7, 10]]),
        part(12, &[&[1, 9], &[0, 2, 3], &[8, 11]]),
        part(12, &[&[0, 1], &[2, 3], &[4, 5], &[6, 7], &[8, 9], &[10, 11]]),
    ]
}

fn fixture_manager(max_weight: usize) -> PartitionManager {
    let pool = Arc::new(WorkerPool::new(2).unwrap());
    PartitionManager::new(fixture_base(), max_weight, pool).unwrap()
}

#[test]
fn build_folds_base_partitions() {
    let manager = fixture_manager(usize::MAX);
    let built = manager.build_partition(&set(3, &[0, 1, 2])).unwrap();
    assert_eq!(*built, part(12, &[&[2, 3]]));
}

#[test]
fn intermediates_are_cached() {
    let manager = fixture_manager(usize::MAX);
    assert!(!manager.is_cached(&set(3, &[0, 1])));
    manager.build_partition(&set(3, &[0, 1, 2])).unwrap();
    assert!(manager.is_cached(&set(3, &[0, 1])));
    assert!(manager.is_cached(&set(3, &[0, 1, 2])));
    // The trie mirrors the cache.
    assert!(manager.has_cached_superset_of(&set(3, &[0, 1])));
    assert_eq!(
        manager.cached_supersets_of(&set(3, &[0, 1])).len(),
        2 // {0,1} and {0,1,2}
    );
}

#[test]
fn cached_intermediates_are_reused() {
    let manager = fixture_manager(usize::MAX);
    // Plant a distinguishable partition under {0,1}: if the build reuses it,
    // the result is unique instead of {{2,3}}.
    manager
        .add_to_cache(&set(3, &[0, 1]), StrippedPartition::unique(12))
        .unwrap();
    let built = manager.build_partition(&set(3, &[0, 1, 2])).unwrap();
    assert!(built.is_unique());
}

#[test]
fn get_partition_serves_base_and_empty() {
    let manager = fixture_manager(usize::MAX);
    let base = manager.get_partition(&set(3, &[1])).unwrap();
    assert_eq!(*base, fixture_base()[1]);

    let empty = manager.get_partition(&ColumnSet::empty(3)).unwrap();
    assert!(empty.is_unique());
    assert_eq!(empty.num_rows(), 12);
}

#[test]
fn multi_combination_intersection_tolerates_overlap() {
    let manager = fixture_manager(usize::MAX);
    // {0,1} ∩ {1,2} over partitions equals the partition of {0,1,2}.
    let combined = manager
        .get_partitions_intersection(&[set(3, &[0, 1]), set(3, &[1, 2])])
        .unwrap();
    assert_eq!(*combined, part(12, &[&[2, 3]]));

    assert!(manager.get_partitions_intersection(&[]).is_err());
}

#[test]
fn wrong_universe_is_a_build_error() {
    let manager = fixture_manager(usize::MAX);
    let wide = set(5, &[0, 4]);
    assert!(matches!(
        manager.build_partition(&wide),
        Err(Error::Build(_))
    ));
    assert!(matches!(manager.get_partition(&wide), Err(Error::Build(_))));
}

#[test]
fn eviction_is_weight_bounded_and_spares_base() {
    // Tight bound: only the base entries ever fit.
    let manager = fixture_manager(1);
    manager.build_partition(&set(3, &[0, 1, 2])).unwrap();

    let cached = manager.cached_combinations();
    assert_eq!(cached.len(), 3);
    assert!(cached.iter().all(|c| c.len() == 1));
    assert!(!manager.is_cached(&set(3, &[0, 1])));
    assert!(!manager.is_cached(&set(3, &[0, 1, 2])));

    // Rebuilding still works; results are unaffected by eviction.
    let built = manager.build_partition(&set(3, &[0, 1, 2])).unwrap();
    assert_eq!(*built, part(12, &[&[2, 3]]));
}

#[test]
fn cache_and_trie_stay_consistent_under_eviction() {
    let base = fixture_base();
    let pool = Arc::new(WorkerPool::new(1).unwrap());
    // Weight for the base entries plus roughly one extra entry.
    let budget = super::entry_weight(3, &base[0]) * 4;
    let manager = PartitionManager::new(base, budget, pool).unwrap();

    manager.build_partition(&set(3, &[0, 1, 2])).unwrap();
    manager.build_partition(&set(3, &[1, 2])).unwrap();

    let mut cached = manager.cached_combinations();
    cached.sort();
    let mut direct: Vec<ColumnSet> = (0..3)
        .map(|c| set(3, &[c]))
        .filter(|c| manager.is_cached(c))
        .collect();
    for key in [set(3, &[0, 1]), set(3, &[0, 1, 2]), set(3, &[1, 2])] {
        if manager.is_cached(&key) {
            direct.push(key);
        }
    }
    direct.sort();
    assert_eq!(cached, direct);
    assert!(manager.weight() <= budget);
}

#[test]
fn remove_from_cache_prunes_the_trie() {
    let manager = fixture_manager(usize::MAX);
    manager.build_partition(&set(3, &[0, 1, 2])).unwrap();

    let removed = manager.remove_from_cache(&set(3, &[0, 1])).unwrap();
    assert!(removed.is_some());
    assert!(!manager.is_cached(&set(3, &[0, 1])));
    assert!(!manager
        .cached_subsets_of(&set(3, &[0, 1]))
        .contains(&set(3, &[0, 1])));

    // Base entries are protected.
    assert!(manager.remove_from_cache(&set(3, &[2])).unwrap().is_none());
    assert!(manager.is_cached(&set(3, &[2])));

    // Removing an absent key is not an error.
    assert!(manager.remove_from_cache(&set(3, &[0, 1])).unwrap().is_none());
}

#[test]
fn close_fails_later_builds_but_not_reads() {
    let manager = fixture_manager(usize::MAX);
    let built = manager.build_partition(&set(3, &[0, 1])).unwrap();
    manager.close();

    assert!(matches!(
        manager.build_partition(&set(3, &[0, 1, 2])),
        Err(Error::PoolShutdown)
    ));
    // Cached results stay readable.
    assert_eq!(manager.get_partition(&set(3, &[0, 1])).unwrap(), built);
}

#[test]
fn concurrent_gets_agree() {
    let manager = fixture_manager(usize::MAX);
    let target = set(3, &[0, 1, 2]);
    let expected = part(12, &[&[2, 3]]);

    thread::scope(|scope| {
        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = &manager;
            let target = target.clone();
            handles.push(scope.spawn(move || (*manager.get_partition(&target).unwrap()).clone()));
        }
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
    assert!(manager.is_cached(&target));
}

#[test]
fn snapshot_round_trips_through_json() {
    let manager = fixture_manager(usize::MAX);
    manager.build_partition(&set(3, &[0, 1, 2])).unwrap();
    let snapshot = manager.snapshot();
    assert_eq!(snapshot.entries.len(), 2); // {0,1}, {0,1,2}

    let json = snapshot.to_json().unwrap();
    let restored = CacheSnapshot::from_json(&json).unwrap();

    let pool = Arc::new(WorkerPool::new(1).unwrap());
    let revived =
        PartitionManager::with_cache(fixture_base(), usize::MAX, pool, restored).unwrap();
    assert!(revived.is_cached(&set(3, &[0, 1])));
    assert!(revived.is_cached(&set(3, &[0, 1, 2])));
    assert_eq!(
        *revived.get_partition(&set(3, &[0, 1, 2])).unwrap(),
        part(12, &[&[2, 3]])
    );
}

#[test]
fn snapshot_shape_mismatch_is_rejected() {
    let manager = fixture_manager(usize::MAX);
    let snapshot = manager.snapshot();
    let pool = Arc::new(WorkerPool::new(1).unwrap());
    let two_columns = fixture_base().into_iter().take(2).collect();
    assert!(matches!(
        PartitionManager::with_cache(two_columns, usize::MAX, pool, snapshot),
        Err(Error::Build(_))
    ));
}

#[test]
fn mismatched_base_row_counts_are_rejected() {
    let pool = Arc::new(WorkerPool::new(1).unwrap());
    let base = vec![part(12, &[&[0, 1]]), part(10, &[&[0, 1]])];
    assert!(matches!(
        PartitionManager::new(base, usize::MAX, pool),
        Err(Error::Build(_))
    ));
}
