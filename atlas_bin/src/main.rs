//! The interactive SQL shell for AtlasDB.
//!
//! The storage directory comes from the first CLI argument, the
//! `ATLAS_DATA_DIR` environment variable, or `./atlas_data`.

use atlas_bin::executor;
use atlas_bin::parser;
use atlas_bin::types::ExecuteResult;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use strata::HeapStore;

fn print_help() {
    println!();
    println!("AtlasDB SQL shell. Supported statements:");
    println!("  CREATE TABLE table (col1 TYPE, col2 TYPE, ...);   TYPE is INT or TEXT");
    println!("  INSERT INTO table VALUES (val1, val2, ...);");
    println!("  DELETE FROM table [WHERE col = val [AND ...]];");
    println!("  SELECT col1, col2 FROM table [WHERE col op val [AND ...]]");
    println!("         [ORDER BY col [ASC|DESC], ...] [LIMIT n];");
    println!("  SELECT * FROM table ...");
    println!("  SELECT SUM(col) FROM table ...");
    println!("  SELECT ABS(col) FROM table ...");
    println!("  SELECT ... FROM t1 JOIN t2 ON t1.col = t2.col ...");
    println!();
    println!("Shell commands: 'help', 'exit', 'quit', 'AST ON', 'AST OFF'.");
    println!();
}

fn print_result(result: &ExecuteResult) {
    match result {
        ExecuteResult::Ddl => println!("OK"),
        ExecuteResult::Insert(record_id) => println!("Inserted record with id {}", record_id),
        ExecuteResult::Delete(count) => println!("Deleted {} record(s)", count),
        ExecuteResult::ResultSet(set) => {
            println!("{}", set.columns.join(" | "));
            for row in &set.rows {
                println!("{}", row.join(" | "));
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ATLAS_DATA_DIR").ok())
        .unwrap_or_else(|| "atlas_data".to_string());
    let mut store = HeapStore::open(&path)?;
    println!("AtlasDB SQL shell, storing data in '{path}'.");
    println!("Type SQL statements, 'help' for the grammar, or 'exit' to quit.");

    let mut rl = DefaultEditor::new()?;
    let mut print_ast = false;
    loop {
        match rl.readline("sql> ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                rl.add_history_entry(input)?;
                if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
                    break;
                }
                if input.eq_ignore_ascii_case("help") {
                    print_help();
                    continue;
                }
                if input.eq_ignore_ascii_case("ast on") {
                    print_ast = true;
                    println!("AST printing enabled.");
                    continue;
                }
                if input.eq_ignore_ascii_case("ast off") {
                    print_ast = false;
                    println!("AST printing disabled.");
                    continue;
                }

                let statements = match parser::parse_sql(input) {
                    Ok(statements) => statements,
                    Err(errors) => {
                        for error in errors {
                            println!("Parse error: {}", error);
                        }
                        continue;
                    }
                };
                for statement in &statements {
                    if print_ast {
                        println!("{}", statement);
                    }
                    match executor::execute(statement, &mut store) {
                        Ok(result) => print_result(&result),
                        Err(error) => println!("Error: {}", error),
                    }
                }
                if let Err(error) = store.flush() {
                    println!("Error: {}", error);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => {
                println!("Error: {}", error);
                break;
            }
        }
    }
    store.close()?;
    Ok(())
}
