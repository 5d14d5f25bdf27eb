//! The statement executor: resolves names against the catalog, builds scan
//! options, and lowers each statement onto the storage layer.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::errors::ExecutionError;
use crate::parser::{
    AggregateFunction, ColumnRef, CompareOp, Condition, CreateTableStatement, DataType,
    DeleteStatement, InsertStatement, JoinClause, SelectItem, SelectStatement, Statement,
};
use crate::types::{ExecuteResult, ResultSet};
use strata::catalog::ColumnSchema;
use strata::scan::{compare_values, run_pipeline, Aggregate, AggregateOp, RowFilter, ScanOptions};
use strata::HeapStore;

pub fn execute(
    statement: &Statement,
    store: &mut HeapStore,
) -> Result<ExecuteResult, ExecutionError> {
    crate::atlas_debug_log!("[execute] {}", statement);
    match statement {
        Statement::Select(select) => {
            execute_select(select, store).map(ExecuteResult::ResultSet)
        }
        Statement::CreateTable(create) => execute_create_table(create, store),
        Statement::Insert(insert) => execute_insert(insert, store),
        Statement::Delete(delete) => execute_delete(delete, store),
    }
}

fn execute_create_table(
    statement: &CreateTableStatement,
    store: &mut HeapStore,
) -> Result<ExecuteResult, ExecutionError> {
    let schema: Vec<ColumnSchema> = statement
        .columns
        .iter()
        .map(|column| match column.data_type {
            DataType::Int => ColumnSchema::int(&column.name),
            DataType::Text => ColumnSchema::text(&column.name),
        })
        .collect();
    store.create(&statement.table_name, &schema)?;
    Ok(ExecuteResult::Ddl)
}

fn execute_insert(
    statement: &InsertStatement,
    store: &mut HeapStore,
) -> Result<ExecuteResult, ExecutionError> {
    let record_id = store.insert(&statement.table_name, &statement.values)?;
    Ok(ExecuteResult::Insert(record_id))
}

fn execute_delete(
    statement: &DeleteStatement,
    store: &mut HeapStore,
) -> Result<ExecuteResult, ExecutionError> {
    let columns = store.get_column_names(&statement.table_name)?;
    let tables = vec![(statement.table_name.clone(), columns)];
    let filter = build_filter(&statement.where_clauses, &tables)?;
    let rows = store.scan_with_ids(&statement.table_name)?;
    let mut deleted = 0u32;
    for (record_id, row) in rows {
        let matches = match &filter {
            Some(filter) => filter(&row),
            None => true,
        };
        if matches {
            store.delete(&statement.table_name, record_id)?;
            deleted += 1;
        }
    }
    Ok(ExecuteResult::Delete(deleted))
}

fn execute_select(
    statement: &SelectStatement,
    store: &mut HeapStore,
) -> Result<ResultSet, ExecutionError> {
    let base_columns = store.get_column_names(&statement.from_table)?;
    if let Some(join) = &statement.join {
        return select_with_join(statement, join, base_columns, store);
    }

    let tables = vec![(statement.from_table.clone(), base_columns)];
    let plan = plan_select_list(&statement.select_list, &tables)?;
    let filter = build_filter(&statement.where_clauses, &tables)?;
    let order_by = build_order(&statement.order_by, plan.projection.as_deref(), &tables)?;
    let options = ScanOptions {
        projection: plan.projection.clone(),
        filter,
        order_by,
        limit: statement.limit,
        aggregate: plan.aggregate,
    };
    let rows = store.scan(&statement.from_table, &options)?;
    Ok(result_set(plan, rows))
}

/// Hash join: the right side is indexed on its key, matching rows are
/// concatenated left-then-right, and the usual pipeline stages run over the
/// combined width.
fn select_with_join(
    statement: &SelectStatement,
    join: &JoinClause,
    left_columns: Vec<String>,
    store: &mut HeapStore,
) -> Result<ResultSet, ExecutionError> {
    let right_columns = store.get_column_names(&join.table)?;
    let tables = vec![
        (statement.from_table.clone(), left_columns),
        (join.table.clone(), right_columns),
    ];
    let left_width = tables[0].1.len();

    let first_key = resolve_column(&join.left, &tables)?;
    let second_key = resolve_column(&join.right, &tables)?;
    let (left_key, right_key) = if first_key < left_width && second_key >= left_width {
        (first_key, second_key - left_width)
    } else if second_key < left_width && first_key >= left_width {
        (second_key, first_key - left_width)
    } else {
        return Err(ExecutionError::Unsupported(
            "JOIN condition must reference one column from each table".to_string(),
        ));
    };

    let left_rows = store.scan(&statement.from_table, &ScanOptions::default())?;
    let right_rows = store.scan(&join.table, &ScanOptions::default())?;

    let mut right_index: HashMap<&str, Vec<&Vec<String>>> = HashMap::new();
    for row in &right_rows {
        if let Some(key) = row.get(right_key) {
            right_index.entry(key.as_str()).or_default().push(row);
        }
    }
    let mut joined = Vec::new();
    for left_row in &left_rows {
        let Some(key) = left_row.get(left_key) else {
            continue;
        };
        if let Some(matching) = right_index.get(key.as_str()) {
            for right_row in matching {
                let mut combined = left_row.clone();
                combined.extend(right_row.iter().cloned());
                joined.push(combined);
            }
        }
    }

    let plan = plan_select_list(&statement.select_list, &tables)?;
    let filter = build_filter(&statement.where_clauses, &tables)?;
    let order_by = build_order(&statement.order_by, plan.projection.as_deref(), &tables)?;
    let options = ScanOptions {
        projection: plan.projection.clone(),
        filter,
        order_by,
        limit: statement.limit,
        aggregate: plan.aggregate,
    };
    let rows = run_pipeline(joined, &options)?;
    Ok(result_set(plan, rows))
}

struct SelectPlan {
    projection: Option<Vec<usize>>,
    aggregate: Option<Aggregate>,
    columns: Vec<String>,
    sum_header: Option<String>,
}

/// Lowers the select list onto column indices. The aggregate's column index
/// addresses the projected row, i.e. the item's position in the select list.
fn plan_select_list(
    select_list: &[SelectItem],
    tables: &[(String, Vec<String>)],
) -> Result<SelectPlan, ExecutionError> {
    if select_list
        .iter()
        .any(|item| matches!(item, SelectItem::Wildcard))
    {
        let columns = tables
            .iter()
            .flat_map(|(_, columns)| columns.iter().cloned())
            .collect();
        return Ok(SelectPlan {
            projection: None,
            aggregate: None,
            columns,
            sum_header: None,
        });
    }

    let mut projection = Vec::new();
    let mut aggregate = None;
    let mut columns = Vec::new();
    let mut sum_header = None;
    for (position, item) in select_list.iter().enumerate() {
        match item {
            SelectItem::Wildcard => continue,
            SelectItem::Column(reference) => {
                projection.push(resolve_column(reference, tables)?);
                columns.push(reference.to_string());
            }
            SelectItem::Aggregate { function, column } => {
                projection.push(resolve_column(column, tables)?);
                let header = format!("{}({})", function, column);
                if *function == AggregateFunction::Sum {
                    sum_header = Some(header.clone());
                }
                aggregate = Some(Aggregate {
                    op: match function {
                        AggregateFunction::Sum => AggregateOp::Sum,
                        AggregateFunction::Abs => AggregateOp::Abs,
                    },
                    column: position,
                });
                columns.push(header);
            }
        }
    }
    Ok(SelectPlan {
        projection: Some(projection),
        aggregate,
        columns,
        sum_header,
    })
}

/// A SUM collapses the result to a single column; everything else keeps the
/// planned header.
fn result_set(plan: SelectPlan, rows: Vec<Vec<String>>) -> ResultSet {
    match plan.sum_header {
        Some(header) => ResultSet {
            columns: vec![header],
            rows,
        },
        None => ResultSet {
            columns: plan.columns,
            rows,
        },
    }
}

/// Resolves a possibly qualified column against the tables in scope, laid out
/// left to right. Ambiguous unqualified names are rejected.
fn resolve_column(
    reference: &ColumnRef,
    tables: &[(String, Vec<String>)],
) -> Result<usize, ExecutionError> {
    let mut offset = 0;
    let mut found = None;
    for (table_name, columns) in tables {
        if let Some(qualifier) = &reference.table {
            if qualifier != table_name {
                offset += columns.len();
                continue;
            }
        }
        if let Some(position) = columns.iter().position(|column| column == &reference.column) {
            if found.is_some() {
                return Err(ExecutionError::Unsupported(format!(
                    "column '{}' is ambiguous",
                    reference.column
                )));
            }
            found = Some(offset + position);
        }
        offset += columns.len();
    }
    found.ok_or_else(|| ExecutionError::ColumnNotFound(reference.to_string()))
}

/// AND-combines the conditions into a single row predicate over the full
/// (unprojected) row width.
fn build_filter(
    conditions: &[Condition],
    tables: &[(String, Vec<String>)],
) -> Result<Option<RowFilter>, ExecutionError> {
    if conditions.is_empty() {
        return Ok(None);
    }
    let mut resolved: Vec<(usize, CompareOp, String)> = Vec::new();
    for condition in conditions {
        resolved.push((
            resolve_column(&condition.column, tables)?,
            condition.op,
            condition.value.clone(),
        ));
    }
    Ok(Some(Box::new(move |row: &[String]| {
        resolved.iter().all(|(index, op, value)| match row.get(*index) {
            Some(cell) => compare_with_op(cell, *op, value),
            None => false,
        })
    })))
}

/// Comparison semantics shared with the scan pipeline: numeric when both
/// sides parse as integers, string comparison otherwise.
fn compare_with_op(left: &str, op: CompareOp, right: &str) -> bool {
    let ordering = compare_values(left, right);
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::NotEq => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::LtEq => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::GtEq => ordering != Ordering::Less,
    }
}

/// ORDER BY keys address the projected row, so a sorted column must appear in
/// the select list unless the query selects `*`.
fn build_order(
    order_by: &[(ColumnRef, bool)],
    projection: Option<&[usize]>,
    tables: &[(String, Vec<String>)],
) -> Result<Option<Vec<(usize, bool)>>, ExecutionError> {
    if order_by.is_empty() {
        return Ok(None);
    }
    let mut keys = Vec::new();
    for (reference, ascending) in order_by {
        let full_index = resolve_column(reference, tables)?;
        let index = match projection {
            None => full_index,
            Some(projection) => projection
                .iter()
                .position(|&projected| projected == full_index)
                .ok_or_else(|| {
                    ExecutionError::Unsupported(format!(
                        "ORDER BY column '{}' must appear in the select list",
                        reference
                    ))
                })?,
        };
        keys.push((index, *ascending));
    }
    Ok(Some(keys))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tables() -> Vec<(String, Vec<String>)> {
        vec![
            (
                "users".to_string(),
                vec!["id".to_string(), "name".to_string()],
            ),
            (
                "orders".to_string(),
                vec!["id".to_string(), "item".to_string()],
            ),
        ]
    }

    fn unqualified(column: &str) -> ColumnRef {
        ColumnRef {
            table: None,
            column: column.to_string(),
        }
    }

    fn qualified(table: &str, column: &str) -> ColumnRef {
        ColumnRef {
            table: Some(table.to_string()),
            column: column.to_string(),
        }
    }

    #[test]
    fn resolves_qualified_and_unqualified_columns() {
        let tables = two_tables();
        assert_eq!(resolve_column(&unqualified("name"), &tables).unwrap(), 1);
        assert_eq!(resolve_column(&qualified("orders", "id"), &tables).unwrap(), 2);
        assert_eq!(resolve_column(&qualified("orders", "item"), &tables).unwrap(), 3);
        assert!(matches!(
            resolve_column(&unqualified("id"), &tables),
            Err(ExecutionError::Unsupported(_))
        ));
        assert!(matches!(
            resolve_column(&unqualified("ghost"), &tables),
            Err(ExecutionError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn comparisons_are_numeric_when_both_sides_parse() {
        assert!(compare_with_op("9", CompareOp::Lt, "10"));
        assert!(compare_with_op("-5", CompareOp::LtEq, "-5"));
        assert!(compare_with_op("10", CompareOp::Eq, "10"));
        // Lexicographic fallback when one side is not an integer.
        assert!(compare_with_op("apple", CompareOp::Lt, "pear"));
        assert!(compare_with_op("10", CompareOp::NotEq, "banana"));
    }
}
