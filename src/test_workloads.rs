//! Shared randomized-workload helpers and independent oracles for the
//! module tests.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::column_set::ColumnSet;
use crate::partition::StrippedPartition;

/// Seeded generator so failures reproduce.
pub(crate) fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A partition drawn by assigning every row one of `classes` values.
pub(crate) fn random_partition(
    rng: &mut StdRng,
    num_rows: usize,
    classes: usize,
) -> StrippedPartition {
    let mut clusters: Vec<Vec<usize>> = vec![Vec::new(); classes];
    for row in 0..num_rows {
        clusters[rng.gen_range(0..classes)].push(row);
    }
    StrippedPartition::new(num_rows, clusters)
}

/// A column set where each column is drawn independently with probability
/// `density`.
pub(crate) fn random_column_set(rng: &mut StdRng, universe: usize, density: f64) -> ColumnSet {
    let columns: Vec<usize> = (0..universe).filter(|_| rng.gen_bool(density)).collect();
    ColumnSet::from_columns(universe, columns).unwrap()
}

/// Intersection oracle independent of the production algorithm: groups rows
/// by their (left class, right class) pair and keeps groups of size ≥ 2.
pub(crate) fn intersect_oracle(a: &StrippedPartition, b: &StrippedPartition) -> StrippedPartition {
    let class_of = |p: &StrippedPartition, row: usize| -> Option<usize> {
        p.clusters().iter().position(|c| c.contains(&row))
    };
    let mut groups: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
    let shared = a.num_rows().min(b.num_rows());
    for row in 0..shared {
        if let (Some(left), Some(right)) = (class_of(a, row), class_of(b, row)) {
            groups.entry((left, right)).or_default().push(row);
        }
    }
    StrippedPartition::new(a.num_rows(), groups.into_values().collect())
}
