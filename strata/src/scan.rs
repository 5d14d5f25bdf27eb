//! The scan pipeline: filter, project, sort, limit and a single aggregate,
//! applied in that fixed order over materialized rows.

use std::cmp::Ordering;

use crate::errors::StorageError;

/// A row as the pipeline sees it: decoded string fields.
pub type Row = Vec<String>;

/// Predicate over a decoded row. A filter that dereferences a column outside
/// the row's length is expected to return `false` for that row.
pub type RowFilter = Box<dyn Fn(&[String]) -> bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Sum,
    Abs,
}

#[derive(Debug, Clone, Copy)]
pub struct Aggregate {
    pub op: AggregateOp,
    /// Column index within the (projected) row.
    pub column: usize,
}

/// Configuration for one scan. Every field is optional; a default scan
/// returns the full materialization.
#[derive(Default)]
pub struct ScanOptions {
    pub projection: Option<Vec<usize>>,
    pub filter: Option<RowFilter>,
    pub order_by: Option<Vec<(usize, bool)>>,
    pub limit: Option<usize>,
    pub aggregate: Option<Aggregate>,
}

/// Runs the pipeline stages over already-materialized rows.
pub fn run_pipeline(mut rows: Vec<Row>, options: &ScanOptions) -> Result<Vec<Row>, StorageError> {
    if let Some(filter) = &options.filter {
        rows.retain(|row| filter(row));
    }
    if let Some(projection) = &options.projection {
        rows = rows
            .into_iter()
            .map(|row| project_row(row, projection))
            .collect();
    }
    if let Some(order_by) = &options.order_by {
        sort_rows(&mut rows, order_by);
    }
    if let Some(limit) = options.limit {
        rows.truncate(limit);
    }
    if let Some(aggregate) = &options.aggregate {
        return apply_aggregate(rows, aggregate);
    }
    Ok(rows)
}

/// Indices outside the row are silently omitted from that row.
fn project_row(row: Row, projection: &[usize]) -> Row {
    projection
        .iter()
        .filter_map(|&index| row.get(index).cloned())
        .collect()
}

/// Stable multi-key sort. A key whose column is missing from either operand
/// is skipped for that comparison.
fn sort_rows(rows: &mut [Row], order_by: &[(usize, bool)]) {
    rows.sort_by(|a, b| {
        for &(column, ascending) in order_by {
            let (Some(left), Some(right)) = (a.get(column), b.get(column)) else {
                continue;
            };
            let ordering = compare_values(left, right);
            if ordering != Ordering::Equal {
                return if ascending {
                    ordering
                } else {
                    ordering.reverse()
                };
            }
        }
        Ordering::Equal
    });
}

/// Numeric comparison when both operands parse as integers, lexicographic
/// comparison on the string form otherwise.
pub fn compare_values(left: &str, right: &str) -> Ordering {
    match (left.parse::<i64>(), right.parse::<i64>()) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => left.cmp(right),
    }
}

fn apply_aggregate(rows: Vec<Row>, aggregate: &Aggregate) -> Result<Vec<Row>, StorageError> {
    if rows.is_empty() {
        return Ok(match aggregate.op {
            AggregateOp::Sum => vec![vec!["0".to_string()]],
            AggregateOp::Abs => Vec::new(),
        });
    }
    if rows.iter().all(|row| aggregate.column >= row.len()) {
        return Err(StorageError::InvalidArgument(
            "invalid column index for aggregation".to_string(),
        ));
    }
    match aggregate.op {
        AggregateOp::Sum => {
            let mut sum: i64 = 0;
            for row in &rows {
                if let Some(value) = row.get(aggregate.column) {
                    // Non-parseable values contribute zero.
                    sum = sum.wrapping_add(value.parse::<i64>().unwrap_or(0));
                }
            }
            Ok(vec![vec![sum.to_string()]])
        }
        AggregateOp::Abs => Ok(rows
            .into_iter()
            .map(|mut row| {
                if let Some(value) = row.get_mut(aggregate.column) {
                    if let Ok(parsed) = value.parse::<i64>() {
                        *value = parsed.unsigned_abs().to_string();
                    }
                }
                row
            })
            .collect()),
    }
}
