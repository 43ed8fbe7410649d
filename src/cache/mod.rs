//! On-demand partition construction with a weight-bounded cache.
//!
//! The manager owns one base partition per column and builds the partition
//! of any column combination by folding pairwise intersections over the
//! combination's columns, reusing whatever prefix combinations are already
//! cached and caching every intermediate it produces along the way. A
//! [`SetTrie`] mirrors the cached keys so callers can ask "is this already
//! cached or subsumed" without touching partition data; cache and trie are
//! kept consistent under one lock.

use std::mem;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::column_set::ColumnSet;
use crate::partition::StrippedPartition;
use crate::pool::WorkerPool;
use crate::trie::DenseSetTrie;
use crate::{Error, Result};

#[cfg(test)]
mod tests;

/// Approximates the resident cost of one cache entry: bit-vector blocks for
/// the key plus the clustered row indices, scaled by a small over-allocation
/// factor.
fn entry_weight(universe: usize, partition: &StrippedPartition) -> usize {
    let key_bytes = (universe + 63) / 64 * mem::size_of::<u64>();
    let row_bytes = partition.clustered_rows() * mem::size_of::<usize>();
    (key_bytes + row_bytes) * 5 / 4
}

struct Entry {
    partition: Arc<StrippedPartition>,
    weight: usize,
}

struct CacheState {
    /// Insertion-ordered, so eviction walks oldest-first.
    entries: IndexMap<ColumnSet, Entry>,
    /// Containment index over the cached keys, always consistent with
    /// `entries`.
    keys: DenseSetTrie,
    weight: usize,
}

/// Builds, caches, and hands out stripped partitions for column
/// combinations.
///
/// Partitions are shared as [`Arc`]s; clone the inner value for a private
/// mutable copy. All methods take `&self` and are safe to call concurrently;
/// two racing requests for the same missing combination may both build it,
/// and the loser's result is discarded on insertion.
pub struct PartitionManager {
    universe: usize,
    num_rows: usize,
    all_columns: ColumnSet,
    max_weight: usize,
    pool: Arc<WorkerPool>,
    state: Mutex<CacheState>,
}

impl PartitionManager {
    /// Creates a manager over `base` partitions, one per column in column
    /// order. Base partitions must agree on the row count; they are cached
    /// up front and never evicted.
    pub fn new(
        base: Vec<StrippedPartition>,
        max_weight: usize,
        pool: Arc<WorkerPool>,
    ) -> Result<Self> {
        let universe = base.len();
        let num_rows = base.first().map_or(0, StrippedPartition::num_rows);
        if let Some(odd) = base.iter().find(|p| p.num_rows() != num_rows) {
            return Err(Error::Build(format!(
                "base partitions disagree on row count: {} vs {}",
                odd.num_rows(),
                num_rows
            )));
        }

        let mut state = CacheState {
            entries: IndexMap::with_capacity(universe),
            keys: DenseSetTrie::new(universe),
            weight: 0,
        };
        for (column, partition) in base.into_iter().enumerate() {
            let key = ColumnSet::single(universe, column)?;
            let weight = entry_weight(universe, &partition);
            state.keys.insert(&key)?;
            state.weight += weight;
            state.entries.insert(
                key,
                Entry {
                    partition: Arc::new(partition),
                    weight,
                },
            );
        }
        log::info!(
            "partition cache over {universe} columns, {num_rows} rows, \
             base weight {} of {max_weight}",
            state.weight
        );

        Ok(PartitionManager {
            universe,
            num_rows,
            all_columns: ColumnSet::full(universe),
            max_weight,
            pool,
            state: Mutex::new(state),
        })
    }

    /// Like [`new`](Self::new), pre-populating the cache from a snapshot of
    /// an earlier run.
    pub fn with_cache(
        base: Vec<StrippedPartition>,
        max_weight: usize,
        pool: Arc<WorkerPool>,
        snapshot: CacheSnapshot,
    ) -> Result<Self> {
        let manager = PartitionManager::new(base, max_weight, pool)?;
        if snapshot.universe != manager.universe || snapshot.num_rows != manager.num_rows {
            return Err(Error::Build(format!(
                "snapshot shape ({} columns, {} rows) does not match table \
                 ({} columns, {} rows)",
                snapshot.universe, snapshot.num_rows, manager.universe, manager.num_rows
            )));
        }
        for (combination, partition) in snapshot.entries {
            manager.add_to_cache(&combination, partition)?;
        }
        Ok(manager)
    }

    /// The number of columns.
    pub fn universe(&self) -> usize {
        self.universe
    }

    /// The number of rows in the table snapshot.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// The combination of every column.
    pub fn all_columns(&self) -> &ColumnSet {
        &self.all_columns
    }

    /// Current total entry weight.
    pub fn weight(&self) -> usize {
        self.state.lock().weight
    }

    fn check(&self, combination: &ColumnSet) -> Result<()> {
        if combination.universe() == self.universe {
            Ok(())
        } else {
            Err(Error::Build(format!(
                "combination {combination:?} spans universe {}, table has {} columns",
                combination.universe(),
                self.universe
            )))
        }
    }

    fn lookup(&self, combination: &ColumnSet) -> Option<Arc<StrippedPartition>> {
        self.state
            .lock()
            .entries
            .get(combination)
            .map(|entry| entry.partition.clone())
    }

    /// The partition for `combination`, from cache or built on demand.
    pub fn get_partition(&self, combination: &ColumnSet) -> Result<Arc<StrippedPartition>> {
        self.check(combination)?;
        if combination.is_empty() {
            return Ok(Arc::new(StrippedPartition::unique(self.num_rows)));
        }
        if let Some(hit) = self.lookup(combination) {
            return Ok(hit);
        }
        self.build_partition(combination)
    }

    /// The intersection of the partitions of several combinations, not the
    /// partition of their union. Arguments need not be disjoint; each one is
    /// resolved (and possibly built) independently, then folded.
    pub fn get_partitions_intersection(
        &self,
        combinations: &[ColumnSet],
    ) -> Result<Arc<StrippedPartition>> {
        let mut iter = combinations.iter();
        let first = iter
            .next()
            .ok_or_else(|| Error::Build("no combinations given".to_owned()))?;
        let mut current = self.get_partition(first)?;
        for combination in iter {
            if current.is_unique() {
                break;
            }
            let other = self.get_partition(combination)?;
            current = Arc::new(current.intersect_with(&self.pool, &other)?);
        }
        Ok(current)
    }

    /// Builds the partition for `combination` by folding intersections over
    /// its columns, reusing cached prefixes and caching every intermediate
    /// combination produced, including the result, before returning.
    ///
    /// Fails with a build error when the combination is not over this
    /// manager's universe, and with [`Error::PoolShutdown`] after
    /// [`close`](Self::close).
    pub fn build_partition(&self, combination: &ColumnSet) -> Result<Arc<StrippedPartition>> {
        self.check(combination)?;
        if combination.is_empty() {
            return Ok(Arc::new(StrippedPartition::unique(self.num_rows)));
        }

        let columns: Vec<usize> = combination.iter().collect();
        let mut prefix = ColumnSet::single(self.universe, columns[0])?;
        let mut current = self.base_partition(columns[0])?;

        for &column in &columns[1..] {
            prefix = prefix.with(column)?;
            if let Some(hit) = self.lookup(&prefix) {
                current = hit;
                continue;
            }
            let base = self.base_partition(column)?;
            let built = Arc::new(current.intersect_with(&self.pool, &base)?);
            log::debug!(
                "built partition {prefix:?}: {} clusters, key error {}",
                built.cluster_count(),
                built.key_error()
            );
            self.insert_entry(prefix.clone(), built.clone(), false)?;
            current = built;
        }
        Ok(current)
    }

    fn base_partition(&self, column: usize) -> Result<Arc<StrippedPartition>> {
        let key = ColumnSet::single(self.universe, column)?;
        self.lookup(&key)
            .ok_or_else(|| Error::Build(format!("missing base partition for column {column}")))
    }

    /// Inserts a partition under `combination` directly. The key trie is
    /// updated in the same critical section; the weight bound is enforced
    /// afterwards.
    pub fn add_to_cache(
        &self,
        combination: &ColumnSet,
        partition: StrippedPartition,
    ) -> Result<()> {
        self.check(combination)?;
        if combination.is_empty() {
            log::warn!("ignoring attempt to cache the empty combination");
            return Ok(());
        }
        if partition.num_rows() != self.num_rows {
            return Err(Error::Build(format!(
                "partition covers {} rows, table has {}",
                partition.num_rows(),
                self.num_rows
            )));
        }
        self.insert_entry(combination.clone(), Arc::new(partition), true)
    }

    fn insert_entry(
        &self,
        combination: ColumnSet,
        partition: Arc<StrippedPartition>,
        replace: bool,
    ) -> Result<()> {
        let weight = entry_weight(self.universe, &partition);
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(existing) = state.entries.get_mut(&combination) {
            if !replace {
                // A concurrent build got here first; keep its result.
                return Ok(());
            }
            state.weight += weight;
            let old = mem::replace(existing, Entry { partition, weight });
            state.weight -= old.weight;
        } else {
            state.keys.insert(&combination)?;
            state.weight += weight;
            state.entries.insert(combination, Entry { partition, weight });
        }
        self.evict_locked(state);
        Ok(())
    }

    /// Evicts oldest-first until the weight bound holds, skipping base
    /// entries. Cache map and key trie change together under the held lock.
    fn evict_locked(&self, state: &mut CacheState) {
        while state.weight > self.max_weight {
            let victim = state
                .entries
                .iter()
                .find(|(key, _)| key.len() > 1)
                .map(|(key, _)| key.clone());
            let key = match victim {
                Some(key) => key,
                None => break, // only base entries remain
            };
            let entry = state.entries.shift_remove(&key).unwrap();
            state.weight -= entry.weight;
            let _ = state.keys.remove(&key);
            log::debug!("evicted cached partition {key:?} ({} bytes)", entry.weight);
        }
    }

    /// Removes a cached entry, pruning the key from the containment index in
    /// the same critical section. Base combinations are protected and report
    /// `None`.
    pub fn remove_from_cache(
        &self,
        combination: &ColumnSet,
    ) -> Result<Option<Arc<StrippedPartition>>> {
        self.check(combination)?;
        if combination.len() == 1 {
            log::warn!("refusing to remove base partition {combination:?} from the cache");
            return Ok(None);
        }
        let mut state = self.state.lock();
        match state.entries.shift_remove(combination) {
            Some(entry) => {
                state.weight -= entry.weight;
                let _ = state.keys.remove(combination);
                Ok(Some(entry.partition))
            }
            None => Ok(None),
        }
    }

    /// Whether a partition for `combination` is currently cached.
    pub fn is_cached(&self, combination: &ColumnSet) -> bool {
        self.state.lock().entries.contains_key(combination)
    }

    /// Every cached combination, base entries included.
    pub fn cached_combinations(&self) -> Vec<ColumnSet> {
        self.state.lock().keys.sets()
    }

    /// Cached combinations that are subsets of `combination`.
    pub fn cached_subsets_of(&self, combination: &ColumnSet) -> Vec<ColumnSet> {
        self.state.lock().keys.subsets_of(combination)
    }

    /// Cached combinations that are supersets of `combination`.
    pub fn cached_supersets_of(&self, combination: &ColumnSet) -> Vec<ColumnSet> {
        self.state.lock().keys.supersets_of(combination)
    }

    /// Whether some cached combination subsumes `combination`.
    pub fn has_cached_superset_of(&self, combination: &ColumnSet) -> bool {
        self.state.lock().keys.contains_superset_of(combination)
    }

    /// A serializable snapshot of the non-base cache contents. Base
    /// partitions are re-supplied at construction and not included.
    pub fn snapshot(&self) -> CacheSnapshot {
        let state = self.state.lock();
        let entries = state
            .entries
            .iter()
            .filter(|(key, _)| key.len() > 1)
            .map(|(key, entry)| (key.clone(), (*entry.partition).clone()))
            .collect();
        CacheSnapshot {
            universe: self.universe,
            num_rows: self.num_rows,
            entries,
        }
    }

    /// Shuts the worker pool down. Build requests made afterwards fail with
    /// [`Error::PoolShutdown`]; already-cached partitions stay readable.
    pub fn close(&self) {
        self.pool.shutdown();
        log::info!("partition cache closed");
    }
}

/// Opaque, serializable image of a manager's cached combinations: row-index
/// clusters plus the row count per combination, for reuse across runs.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub universe: usize,
    pub num_rows: usize,
    pub entries: Vec<(ColumnSet, StrippedPartition)>,
}

impl CacheSnapshot {
    /// Serializes the snapshot as a JSON blob.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Restores a snapshot from [`to_json`](Self::to_json) output. Cluster
    /// shapes are re-validated on the way in.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
