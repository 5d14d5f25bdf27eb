//! A low-level shell over the raw record interface, bypassing SQL.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use strata::catalog::ColumnSchema;
use strata::scan::ScanOptions;
use strata::HeapStore;

fn print_help() {
    println!("Strata storage shell - available commands:");
    println!("  open <path>                        - open storage at the given directory");
    println!("  close                              - close the storage");
    println!("  create <table> <name:type> ...     - create a table (type is int or text)");
    println!("  insert <table> <value> ...         - insert a record");
    println!("  get <table> <record_id>            - fetch a record by id");
    println!("  update <table> <record_id> <value> ... - update a record in place");
    println!("  delete <table> <record_id>         - delete a record");
    println!("  scan <table>                       - list every record in the table");
    println!("  flush                              - write dirty pages to disk");
    println!("  help                               - show this message");
    println!("  exit/quit                          - leave the shell");
}

fn parse_schema(defs: &[&str]) -> Result<Vec<ColumnSchema>, String> {
    let mut schema = Vec::new();
    for def in defs {
        let Some((name, type_name)) = def.split_once(':') else {
            return Err(format!("column definition '{def}' is not name:type"));
        };
        let column = match type_name.to_ascii_lowercase().as_str() {
            "int" => ColumnSchema::int(name),
            "text" => ColumnSchema::text(name),
            other => return Err(format!("unknown column type '{other}'")),
        };
        schema.push(column);
    }
    Ok(schema)
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn main() -> anyhow::Result<()> {
    let mut store: Option<HeapStore> = None;
    let mut rl = DefaultEditor::new()?;
    println!("Strata storage shell - type 'help' for available commands or 'exit' to quit");

    loop {
        let line = match rl.readline("storage> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => return Err(error.into()),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        rl.add_history_entry(input)?;
        let args: Vec<&str> = input.split_whitespace().collect();

        match args[0] {
            "exit" | "quit" => break,
            "help" => print_help(),
            "open" => {
                if args.len() < 2 {
                    println!("Usage: open <path>");
                    continue;
                }
                match HeapStore::open(args[1]) {
                    Ok(opened) => {
                        store = Some(opened);
                        println!("Storage opened at {}", args[1]);
                    }
                    Err(error) => println!("Error: {}", error),
                }
            }
            "close" => match store.take() {
                Some(mut open_store) => match open_store.close() {
                    Ok(()) => println!("Storage closed"),
                    Err(error) => println!("Error: {}", error),
                },
                None => println!("Storage is not open"),
            },
            "create" => {
                if args.len() < 3 {
                    println!("Usage: create <table> <name:type> ...");
                    continue;
                }
                let Some(open_store) = store.as_mut() else {
                    println!("Storage is not open");
                    continue;
                };
                match parse_schema(&args[2..]) {
                    Ok(schema) => match open_store.create(args[1], &schema) {
                        Ok(()) => println!("Table created: {}", args[1]),
                        Err(error) => println!("Error: {}", error),
                    },
                    Err(message) => println!("Error: {}", message),
                }
            }
            "insert" => {
                if args.len() < 3 {
                    println!("Usage: insert <table> <value> ...");
                    continue;
                }
                let Some(open_store) = store.as_mut() else {
                    println!("Storage is not open");
                    continue;
                };
                match open_store.insert(args[1], &owned(&args[2..])) {
                    Ok(record_id) => println!("Record inserted with id {}", record_id),
                    Err(error) => println!("Error: {}", error),
                }
            }
            "get" => {
                if args.len() < 3 {
                    println!("Usage: get <table> <record_id>");
                    continue;
                }
                let Some(open_store) = store.as_mut() else {
                    println!("Storage is not open");
                    continue;
                };
                match args[2].parse() {
                    Ok(record_id) => match open_store.get(args[1], record_id) {
                        Ok(values) => println!("{}", values.join(" | ")),
                        Err(error) => println!("Error: {}", error),
                    },
                    Err(_) => println!("Error: '{}' is not a record id", args[2]),
                }
            }
            "update" => {
                if args.len() < 4 {
                    println!("Usage: update <table> <record_id> <value> ...");
                    continue;
                }
                let Some(open_store) = store.as_mut() else {
                    println!("Storage is not open");
                    continue;
                };
                match args[2].parse() {
                    Ok(record_id) => {
                        match open_store.update(args[1], record_id, &owned(&args[3..])) {
                            Ok(()) => println!("Record updated"),
                            Err(error) => println!("Error: {}", error),
                        }
                    }
                    Err(_) => println!("Error: '{}' is not a record id", args[2]),
                }
            }
            "delete" => {
                if args.len() < 3 {
                    println!("Usage: delete <table> <record_id>");
                    continue;
                }
                let Some(open_store) = store.as_mut() else {
                    println!("Storage is not open");
                    continue;
                };
                match args[2].parse() {
                    Ok(record_id) => match open_store.delete(args[1], record_id) {
                        Ok(()) => println!("Record deleted"),
                        Err(error) => println!("Error: {}", error),
                    },
                    Err(_) => println!("Error: '{}' is not a record id", args[2]),
                }
            }
            "scan" => {
                if args.len() < 2 {
                    println!("Usage: scan <table>");
                    continue;
                }
                let Some(open_store) = store.as_mut() else {
                    println!("Storage is not open");
                    continue;
                };
                match open_store.get_column_names(args[1]) {
                    Ok(columns) => println!("{}", columns.join(" | ")),
                    Err(error) => {
                        println!("Error: {}", error);
                        continue;
                    }
                }
                match open_store.scan(args[1], &ScanOptions::default()) {
                    Ok(rows) => {
                        for row in &rows {
                            println!("{}", row.join(" | "));
                        }
                        println!("{} row(s)", rows.len());
                    }
                    Err(error) => println!("Error: {}", error),
                }
            }
            "flush" => {
                let Some(open_store) = store.as_mut() else {
                    println!("Storage is not open");
                    continue;
                };
                match open_store.flush() {
                    Ok(()) => println!("Storage flushed"),
                    Err(error) => println!("Error: {}", error),
                }
            }
            other => {
                println!("Unknown command: {other}");
                println!("Type 'help' for available commands");
            }
        }
    }

    if let Some(mut open_store) = store.take() {
        open_store.close()?;
    }
    Ok(())
}
