use atlas_bin::parser::{
    parse_sql, AggregateFunction, ColumnRef, CompareOp, DataType, SelectItem, Statement,
};

fn parse_one(sql: &str) -> Statement {
    let mut statements = parse_sql(sql).expect("parse");
    assert_eq!(statements.len(), 1);
    statements.remove(0)
}

fn bare(column: &str) -> ColumnRef {
    ColumnRef {
        table: None,
        column: column.to_string(),
    }
}

#[test]
fn parses_select_star() {
    let Statement::Select(select) = parse_one("SELECT * FROM users") else {
        panic!("expected SELECT");
    };
    assert_eq!(select.select_list, vec![SelectItem::Wildcard]);
    assert_eq!(select.from_table, "users");
    assert!(select.join.is_none());
    assert!(select.where_clauses.is_empty());
    assert!(select.order_by.is_empty());
    assert_eq!(select.limit, None);
}

#[test]
fn parses_column_list_and_where_operators() {
    let Statement::Select(select) =
        parse_one("SELECT id, name FROM users WHERE id >= 2 AND name != 'Bob'")
    else {
        panic!("expected SELECT");
    };
    assert_eq!(
        select.select_list,
        vec![
            SelectItem::Column(bare("id")),
            SelectItem::Column(bare("name"))
        ]
    );
    assert_eq!(select.where_clauses.len(), 2);
    assert_eq!(select.where_clauses[0].op, CompareOp::GtEq);
    assert_eq!(select.where_clauses[0].value, "2");
    assert_eq!(select.where_clauses[1].op, CompareOp::NotEq);
    assert_eq!(select.where_clauses[1].value, "Bob");
}

#[test]
fn parses_order_by_and_limit() {
    let Statement::Select(select) =
        parse_one("SELECT * FROM t ORDER BY score DESC, name ASC, id LIMIT 10")
    else {
        panic!("expected SELECT");
    };
    assert_eq!(
        select.order_by,
        vec![(bare("score"), false), (bare("name"), true), (bare("id"), true)]
    );
    assert_eq!(select.limit, Some(10));
}

#[test]
fn parses_aggregates_in_the_select_list() {
    let Statement::Select(select) = parse_one("SELECT id, SUM(val) FROM t") else {
        panic!("expected SELECT");
    };
    assert_eq!(select.select_list.len(), 2);
    assert_eq!(
        select.select_list[1],
        SelectItem::Aggregate {
            function: AggregateFunction::Sum,
            column: bare("val"),
        }
    );

    let Statement::Select(select) = parse_one("SELECT ABS(val) FROM t") else {
        panic!("expected SELECT");
    };
    assert_eq!(
        select.select_list,
        vec![SelectItem::Aggregate {
            function: AggregateFunction::Abs,
            column: bare("val"),
        }]
    );
}

#[test]
fn parses_join_with_qualified_columns() {
    let Statement::Select(select) =
        parse_one("SELECT * FROM users JOIN orders ON users.id = orders.user_id")
    else {
        panic!("expected SELECT");
    };
    let join = select.join.expect("join clause");
    assert_eq!(join.table, "orders");
    assert_eq!(
        join.left,
        ColumnRef {
            table: Some("users".to_string()),
            column: "id".to_string(),
        }
    );
    assert_eq!(
        join.right,
        ColumnRef {
            table: Some("orders".to_string()),
            column: "user_id".to_string(),
        }
    );
}

#[test]
fn parses_create_table() {
    let Statement::CreateTable(create) = parse_one("CREATE TABLE users (id INT, name TEXT)")
    else {
        panic!("expected CREATE TABLE");
    };
    assert_eq!(create.table_name, "users");
    assert_eq!(create.columns.len(), 2);
    assert_eq!(create.columns[0].name, "id");
    assert_eq!(create.columns[0].data_type, DataType::Int);
    assert_eq!(create.columns[1].name, "name");
    assert_eq!(create.columns[1].data_type, DataType::Text);
}

#[test]
fn parses_insert_with_negative_numbers_and_strings() {
    let Statement::Insert(insert) = parse_one("INSERT INTO t VALUES (-5, 'hello world', 3)")
    else {
        panic!("expected INSERT");
    };
    assert_eq!(insert.table_name, "t");
    assert_eq!(insert.values, vec!["-5", "hello world", "3"]);
}

#[test]
fn parses_delete_with_and_without_where() {
    let Statement::Delete(delete) = parse_one("DELETE FROM t WHERE id = 3 AND name = 'x'")
    else {
        panic!("expected DELETE");
    };
    assert_eq!(delete.table_name, "t");
    assert_eq!(delete.where_clauses.len(), 2);

    let Statement::Delete(delete) = parse_one("DELETE FROM t") else {
        panic!("expected DELETE");
    };
    assert!(delete.where_clauses.is_empty());
}

#[test]
fn keywords_are_case_insensitive() {
    let Statement::Select(select) = parse_one("select id from users where id < 3 limit 1")
    else {
        panic!("expected SELECT");
    };
    assert_eq!(select.from_table, "users");
    assert_eq!(select.where_clauses[0].op, CompareOp::Lt);
    assert_eq!(select.limit, Some(1));
}

#[test]
fn parses_statement_sequences() {
    let statements =
        parse_sql("CREATE TABLE t (id INT); INSERT INTO t VALUES (1); SELECT * FROM t;")
            .expect("parse");
    assert_eq!(statements.len(), 3);
    assert!(matches!(statements[0], Statement::CreateTable(_)));
    assert!(matches!(statements[1], Statement::Insert(_)));
    assert!(matches!(statements[2], Statement::Select(_)));
}

#[test]
fn rejects_keywords_as_identifiers_and_unknown_types() {
    assert!(parse_sql("SELECT select FROM t").is_err());
    assert!(parse_sql("CREATE TABLE t (id FLOAT)").is_err());
    assert!(parse_sql("SELECT FROM t").is_err());
    assert!(parse_sql("INSERT INTO t VALUES 1").is_err());
}

#[test]
fn statements_round_trip_through_display() {
    let statement = parse_one("SELECT name, SUM(val) FROM t WHERE id > 2 ORDER BY name DESC LIMIT 3");
    assert_eq!(
        statement.to_string(),
        "SELECT name, SUM(val) FROM t WHERE id > 2 ORDER BY name DESC LIMIT 3"
    );
    let statement = parse_one("CREATE TABLE t (id INT, name TEXT)");
    assert_eq!(statement.to_string(), "CREATE TABLE t (id INT, name TEXT)");
}
