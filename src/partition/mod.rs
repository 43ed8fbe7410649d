//! Stripped partitions (position list indexes) and their intersection.
//!
//! A stripped partition stores the equivalence classes that one or more
//! columns induce over the rows of a table, keeping only classes of size ≥ 2.
//! Rows absent from every cluster are implicitly unique, which is what keeps
//! the representation small on mostly-unique columns and the intersection
//! linear in the number of clustered rows actually touched rather than
//! quadratic in the row count.

use std::hash::BuildHasherDefault;
use std::mem;

use hashbrown::HashMap;
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use rustc_hash::FxHasher;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::pool::WorkerPool;
use crate::{Error, Result};


/// Row-table entry for rows that belong to no cluster.
const UNIQUE: usize = usize::MAX;

type FxScratch = HashMap<usize, Vec<usize>, BuildHasherDefault<FxHasher>>;

/// The equivalence classes induced over `num_rows` rows by some column
/// combination, with singleton classes stripped.
///
/// The representation is normalized at construction: rows within a cluster
/// ascend, clusters are ordered by their first row, and clusters of fewer
/// than two rows are discarded. Equality therefore compares partitions
/// independent of the order clusters were produced in, and exactly on the
/// row count.
#[derive(Debug, Clone)]
pub struct StrippedPartition {
    clusters: Vec<Vec<usize>>,
    num_rows: usize,
    key_error: OnceCell<usize>,
}

impl PartialEq for StrippedPartition {
    fn eq(&self, other: &Self) -> bool {
        self.num_rows == other.num_rows && self.clusters == other.clusters
    }
}

impl Eq for StrippedPartition {}

impl StrippedPartition {
    /// Builds a partition from raw clusters, normalizing them: rows within a
    /// cluster are sorted, clusters of size < 2 dropped, and clusters ordered
    /// by first row. Clusters must be pairwise disjoint with rows below
    /// `num_rows`; that invariant is the caller's and checked in debug builds
    /// only (use [`checked`](Self::checked) for untrusted input).
    pub fn new(num_rows: usize, clusters: Vec<Vec<usize>>) -> Self {
        let mut clusters: Vec<Vec<usize>> = clusters
            .into_iter()
            .filter(|c| c.len() >= 2)
            .map(|mut c| {
                c.sort_unstable();
                c
            })
            .collect();
        clusters.sort_unstable_by_key(|c| c[0]);
        #[cfg(debug_assertions)]
        {
            let mut seen = vec![false; num_rows];
            for row in clusters.iter().flatten() {
                assert!(*row < num_rows, "row {row} out of range for {num_rows} rows");
                assert!(!mem::replace(&mut seen[*row], true), "row {row} in two clusters");
            }
        }
        StrippedPartition {
            clusters,
            num_rows,
            key_error: OnceCell::new(),
        }
    }

    /// Like [`new`](Self::new), but validates the invariants and fails with a
    /// build error instead of asserting. Used for deserialized snapshots.
    pub fn checked(num_rows: usize, clusters: Vec<Vec<usize>>) -> Result<Self> {
        let mut seen = vec![false; num_rows];
        for row in clusters.iter().flatten() {
            if *row >= num_rows {
                return Err(Error::Build(format!(
                    "cluster row {row} out of range for {num_rows} rows"
                )));
            }
            if mem::replace(&mut seen[*row], true) {
                return Err(Error::Build(format!("row {row} appears in two clusters")));
            }
        }
        Ok(StrippedPartition::new(num_rows, clusters))
    }

    /// The partition in which every row is its own class.
    pub fn unique(num_rows: usize) -> Self {
        StrippedPartition {
            clusters: Vec::new(),
            num_rows,
            key_error: OnceCell::new(),
        }
    }

    /// Total number of rows in the underlying table snapshot.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// The clusters, normalized. Rows not listed are unique.
    pub fn clusters(&self) -> &[Vec<usize>] {
        &self.clusters
    }

    /// Number of stripped clusters.
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Number of rows that belong to some cluster.
    pub fn clustered_rows(&self) -> usize {
        self.clusters.iter().map(Vec::len).sum()
    }

    /// Whether the inducing column combination is a key: no cluster remains,
    /// every row is its own class.
    pub fn is_unique(&self) -> bool {
        self.clusters.is_empty()
    }

    /// The minimum number of row removals that would make the combination
    /// unique: `Σ cluster size − cluster count`. Computed on first access and
    /// cached. Not monotonic under intersection: the key error of an
    /// intersection may exceed that of either operand's minimum.
    pub fn key_error(&self) -> usize {
        *self
            .key_error
            .get_or_init(|| self.clustered_rows() - self.cluster_count())
    }

    /// Row → cluster-index table; rows in no cluster map to [`UNIQUE`].
    fn row_table(&self) -> Vec<usize> {
        let mut table = vec![UNIQUE; self.num_rows];
        for (index, cluster) in self.clusters.iter().enumerate() {
            for &row in cluster {
                table[row] = index;
            }
        }
        table
    }

    /// One right-cluster pass: groups the cluster's rows by the left cluster
    /// owning them and keeps groups of size ≥ 2. Rows beyond the table or
    /// owned by no left cluster are unique in the result and dropped here.
    fn split_cluster(table: &[usize], cluster: &[usize]) -> Vec<Vec<usize>> {
        let mut groups = FxScratch::with_capacity_and_hasher(4, Default::default());
        for &row in cluster {
            let owner = table.get(row).copied().unwrap_or(UNIQUE);
            if owner != UNIQUE {
                groups.entry(owner).or_insert_with(Vec::new).push(row);
            }
        }
        groups.into_values().filter(|g| g.len() >= 2).collect()
    }

    /// Intersects two partitions: the result's clusters are the size-≥ 2
    /// groups of rows equal under both operands. Symmetric up to the
    /// normalized equality; the row count is taken from `self`.
    pub fn intersect(&self, other: &Self) -> Self {
        if self.is_unique() || other.is_unique() {
            return StrippedPartition::unique(self.num_rows);
        }
        let table = self.row_table();
        let mut clusters = Vec::new();
        for cluster in &other.clusters {
            clusters.extend(Self::split_cluster(&table, cluster));
        }
        StrippedPartition::new(self.num_rows, clusters)
    }

    /// [`intersect`](Self::intersect) with the right-cluster passes
    /// dispatched to `pool`. Each pass reads the shared row table and writes
    /// only its own groups, so the result is identical for every worker
    /// count.
    pub fn intersect_with(&self, pool: &WorkerPool, other: &Self) -> Result<Self> {
        if self.is_unique() || other.is_unique() {
            return Ok(StrippedPartition::unique(self.num_rows));
        }
        let table = self.row_table();
        let split: Vec<Vec<Vec<usize>>> = pool.install(|| {
            other
                .clusters
                .par_iter()
                .map(|cluster| Self::split_cluster(&table, cluster))
                .collect()
        })?;
        let clusters = split.into_iter().flatten().collect();
        Ok(StrippedPartition::new(self.num_rows, clusters))
    }

    /// Folds [`intersect`](Self::intersect) left to right over `others`.
    pub fn intersect_all<'a>(&self, others: impl IntoIterator<Item = &'a Self>) -> Self {
        let mut current = self.clone();
        for other in others {
            if current.is_unique() {
                break;
            }
            current = current.intersect(other);
        }
        current
    }

    /// Folds [`intersect_with`](Self::intersect_with) left to right.
    pub fn intersect_all_with<'a>(
        &self,
        pool: &WorkerPool,
        others: impl IntoIterator<Item = &'a Self>,
    ) -> Result<Self> {
        let mut current = self.clone();
        for other in others {
            if current.is_unique() {
                break;
            }
            current = current.intersect_with(pool, other)?;
        }
        Ok(current)
    }
}

#[derive(Serialize, Deserialize)]
struct PartitionRepr {
    num_rows: usize,
    clusters: Vec<Vec<usize>>,
}

impl Serialize for StrippedPartition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        PartitionRepr {
            num_rows: self.num_rows,
            clusters: self.clusters.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StrippedPartition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let repr = PartitionRepr::deserialize(deserializer)?;
        StrippedPartition::checked(repr.num_rows, repr.clusters).map_err(D::Error::custom)
    }
}
