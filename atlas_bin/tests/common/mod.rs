use atlas_bin::executor;
use atlas_bin::parser;
use atlas_bin::types::ExecuteResult;
use strata::HeapStore;
use tempfile::TempDir;

pub fn open_store() -> (HeapStore, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let store = HeapStore::open(dir.path()).expect("open store");
    (store, dir)
}

/// Parses and executes every statement in `sql`, returning the last result.
pub fn run_sql(store: &mut HeapStore, sql: &str) -> ExecuteResult {
    let statements = parser::parse_sql(sql).expect("parse");
    let mut last = None;
    for statement in &statements {
        last = Some(executor::execute(statement, store).expect("execute"));
    }
    last.expect("at least one statement")
}

/// Runs a query that must produce a result set and returns its rows.
pub fn query(store: &mut HeapStore, sql: &str) -> Vec<Vec<String>> {
    match run_sql(store, sql) {
        ExecuteResult::ResultSet(set) => set.rows,
        other => panic!("expected a result set, got {:?}", other),
    }
}
