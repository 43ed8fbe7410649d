//! Row-source boundary: base partitions from raw table rows.
//!
//! One pass over the rows groups row indices by per-column cell value;
//! groups of one row are dropped by partition normalization, which is what
//! makes the result a stripped partition. The same scan also yields the
//! distinct sorted values of every column.

use indexmap::IndexMap;

use crate::partition::StrippedPartition;
use crate::{Error, Result};

/// How missing-value cells compare during grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPolicy {
    /// Two missing cells are equal: all null rows of a column form one
    /// group.
    Equal,
    /// Every missing cell is distinct: each null row is a singleton group
    /// and therefore absent from the partition.
    Distinct,
}

/// Everything one scan produces.
#[derive(Debug)]
pub struct TableScan {
    /// One base partition per column, in column order.
    pub partitions: Vec<StrippedPartition>,
    /// Distinct non-null values per column, sorted ascending.
    pub distinct_values: Vec<Vec<String>>,
    /// Number of rows consumed.
    pub num_rows: usize,
}

/// Scans a finite, single-pass row source into per-column base partitions.
///
/// Each row is an ordered sequence of optional string cells; `None` is a
/// missing value handled per `nulls`. Rows whose cell count differs from
/// `column_count` fail the scan with a build error. Errors from the source
/// itself are propagated unchanged as [`Error::Source`].
pub fn scan_rows<I, E>(rows: I, column_count: usize, nulls: NullPolicy) -> Result<TableScan>
where
    I: IntoIterator<Item = std::result::Result<Vec<Option<String>>, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut groups: Vec<IndexMap<String, Vec<usize>>> =
        (0..column_count).map(|_| IndexMap::new()).collect();
    let mut null_rows: Vec<Vec<usize>> = vec![Vec::new(); column_count];
    let mut num_rows = 0usize;

    for (row_index, row) in rows.into_iter().enumerate() {
        let row = row.map_err(|e| Error::Source(Box::new(e)))?;
        if row.len() != column_count {
            return Err(Error::Build(format!(
                "row {row_index} has {} cells, expected {column_count}",
                row.len()
            )));
        }
        for (column, cell) in row.into_iter().enumerate() {
            match cell {
                Some(value) => groups[column].entry(value).or_default().push(row_index),
                None => null_rows[column].push(row_index),
            }
        }
        num_rows += 1;
    }

    let mut partitions = Vec::with_capacity(column_count);
    let mut distinct_values = Vec::with_capacity(column_count);
    for (column, group) in groups.into_iter().enumerate() {
        let mut values: Vec<String> = group.keys().cloned().collect();
        values.sort_unstable();
        distinct_values.push(values);

        let mut clusters: Vec<Vec<usize>> = group.into_values().collect();
        if nulls == NullPolicy::Equal {
            clusters.push(std::mem::take(&mut null_rows[column]));
        }
        // Under NullPolicy::Distinct every null row is its own group; those
        // singletons are exactly what normalization strips.
        partitions.push(StrippedPartition::new(num_rows, clusters));
    }

    log::debug!("scanned {num_rows} rows into {column_count} base partitions");
    Ok(TableScan {
        partitions,
        distinct_values,
        num_rows,
    })
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::io;

    use super::*;

    /// The 5-row, 4-column fixture. `None` marks missing values.
    fn rows() -> Vec<std::result::Result<Vec<Option<String>>, Infallible>> {
        let cells = [
            ["1", "1", "5", ""],
            ["2", "1", "5", "2"],
            ["3", "1", "3", ""],
            ["4", "1", "3", "4"],
            ["5", "1", "5", "5"],
        ];
        cells
            .iter()
            .map(|row| {
                Ok(row
                    .iter()
                    .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                    .collect())
            })
            .collect()
    }

    fn clusters(partition: &StrippedPartition) -> &[Vec<usize>] {
        partition.clusters()
    }

    #[test]
    fn nulls_equal_grouping() {
        let scan = scan_rows(rows(), 4, NullPolicy::Equal).unwrap();
        assert_eq!(scan.num_rows, 5);

        assert!(scan.partitions[0].is_unique());
        assert_eq!(clusters(&scan.partitions[1]), &[vec![0, 1, 2, 3, 4]]);
        assert_eq!(clusters(&scan.partitions[2]), &[vec![0, 1, 4], vec![2, 3]]);
        // The two null rows of column 3 group together.
        assert_eq!(clusters(&scan.partitions[3]), &[vec![0, 2]]);
    }

    #[test]
    fn nulls_distinct_grouping() {
        let scan = scan_rows(rows(), 4, NullPolicy::Distinct).unwrap();
        // Each null row is a singleton, so column 3 becomes fully unique.
        assert!(scan.partitions[3].is_unique());
        // Columns without nulls are unaffected by the policy.
        assert_eq!(clusters(&scan.partitions[2]), &[vec![0, 1, 4], vec![2, 3]]);
    }

    #[test]
    fn distinct_values_are_sorted_byproducts() {
        let scan = scan_rows(rows(), 4, NullPolicy::Equal).unwrap();
        assert_eq!(scan.distinct_values[0], vec!["1", "2", "3", "4", "5"]);
        assert_eq!(scan.distinct_values[1], vec!["1"]);
        assert_eq!(scan.distinct_values[2], vec!["3", "5"]);
        // Nulls are not values.
        assert_eq!(scan.distinct_values[3], vec!["2", "4", "5"]);
    }

    #[test]
    fn ragged_rows_fail_the_scan() {
        let rows: Vec<std::result::Result<Vec<Option<String>>, Infallible>> =
            vec![Ok(vec![Some("a".to_string()), Some("b".to_string())])];
        assert!(matches!(scan_rows(rows, 3, NullPolicy::Equal), Err(Error::Build(_))));
    }

    #[test]
    fn source_errors_propagate_unchanged() {
        let rows: Vec<std::result::Result<Vec<Option<String>>, io::Error>> = vec![
            Ok(vec![Some("a".to_string())]),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated")),
        ];
        match scan_rows(rows, 1, NullPolicy::Equal) {
            Err(Error::Source(inner)) => {
                let io_err = inner.downcast_ref::<io::Error>().unwrap();
                assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);
            }
            other => panic!("expected a source error, got {other:?}"),
        }
    }

    #[test]
    fn scan_feeds_the_partition_machinery() {
        let scan = scan_rows(rows(), 4, NullPolicy::Equal).unwrap();
        // Columns 2 and 3 together: rows must agree on both, leaving nothing.
        let both = scan.partitions[2].intersect(&scan.partitions[3]);
        assert!(both.is_unique());
        // Column 1 is constant, so intersecting with it changes nothing.
        assert_eq!(
            scan.partitions[2].intersect(&scan.partitions[1]),
            scan.partitions[2]
        );
    }
}
