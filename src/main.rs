use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table as ComfyTable, presets::UTF8_FULL};
use redtable::{
    parse_predicates, DatabaseError, QueryRunner, RedtableConfig, Row, TableStore, Value,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// redtable - relational tables on Redis
#[derive(Parser, Debug)]
#[command(name = "redtable", version)]
#[command(about = "Insert, query and index rows of a Redis-backed table", long_about = None)]
struct Args {
    /// Config file (default: /etc/redtable/redtable.toml or ./redtable.toml)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Connection spec: host[:port] or "sentinel <service> host[:port] ..."
    #[arg(short = 'C', long)]
    connection: Option<String>,

    /// Key prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Database name
    #[arg(short = 'd', long)]
    database: Option<String>,

    /// Table name
    #[arg(short = 't', long)]
    table: Option<String>,

    /// Column definition, repeatable: -k "n INTEGER" -k name
    #[arg(short = 'k', long = "column")]
    columns: Vec<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Insert a row; prints the new rowid
    Insert {
        /// One value per column; NULL for null
        values: Vec<String>,
    },
    /// Print rows matching a filter
    Select {
        /// e.g. "n >= 5 AND name = 'bob'"
        #[arg(short, long = "where")]
        filter: Option<String>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Replace every value of a row
    Update { rowid: i64, values: Vec<String> },
    /// Delete a row
    Delete { rowid: i64 },
    /// Index a column and backfill existing rows
    CreateIndex { column: String },
    /// Show the access path a filter would use
    Plan {
        #[arg(short, long = "where")]
        filter: Option<String>,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// CLI args override everything loaded from file and environment
fn load_config(args: &Args) -> Result<RedtableConfig, DatabaseError> {
    let mut config = RedtableConfig::load(args.config.as_deref())?;
    if let Some(connection) = &args.connection {
        config.connection.clone_from(connection);
    }
    if let Some(prefix) = &args.prefix {
        config.prefix.clone_from(prefix);
    }
    if let Some(database) = &args.database {
        config.database.clone_from(database);
    }
    if args.table.is_some() {
        config.table.clone_from(&args.table);
    }
    if !args.columns.is_empty() {
        config.columns.clone_from(&args.columns);
    }
    Ok(config)
}

fn literals(values: &[String]) -> Vec<Value> {
    values.iter().map(|v| Value::from_literal(v)).collect()
}

fn render_table(store: &TableStore, rows: &[Row]) -> String {
    let mut table = ComfyTable::new();
    table.load_preset(UTF8_FULL);

    let mut header = vec![Cell::new("rowid")];
    header.extend(store.columns().iter().map(|c| Cell::new(&c.name)));
    table.set_header(header);

    for row in rows {
        let mut cells = vec![Cell::new(row.rowid)];
        cells.extend(row.values.iter().map(Cell::new));
        table.add_row(cells);
    }

    format!("{table}\n({} rows)", rows.len())
}

fn render_json(store: &TableStore, rows: &[Row]) -> Result<String, DatabaseError> {
    let objects: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            let mut object = serde_json::Map::new();
            object.insert("rowid".to_string(), row.rowid.into());
            for (col, value) in store.columns().iter().zip(&row.values) {
                object.insert(col.name.clone(), serde_json::to_value(value)?);
            }
            Ok(serde_json::Value::Object(object))
        })
        .collect::<Result<_, serde_json::Error>>()?;
    Ok(serde_json::to_string_pretty(&objects)?)
}

fn run(args: &Args) -> Result<(), DatabaseError> {
    let config = load_config(args)?;
    let mut store = config.open_table()?;

    match &args.command {
        Cmd::Insert { values } => {
            let rowid = store.insert(&literals(values))?;
            println!("{rowid}");
        }
        Cmd::Select { filter, json } => {
            let predicates = match filter {
                Some(f) => parse_predicates(f)?,
                None => Vec::new(),
            };
            let rows = QueryRunner::select(&mut store, &predicates)?;
            if *json {
                println!("{}", render_json(&store, &rows)?);
            } else {
                println!("{}", render_table(&store, &rows));
            }
        }
        Cmd::Update { rowid, values } => {
            store.update(*rowid, &literals(values))?;
            println!("UPDATE 1");
        }
        Cmd::Delete { rowid } => {
            let deleted = store.delete(*rowid)?;
            println!("DELETE {}", u8::from(deleted));
        }
        Cmd::CreateIndex { column } => {
            let rows = store.create_index(column)?;
            println!("CREATE INDEX ({rows} rows indexed)");
        }
        Cmd::Plan { filter } => {
            let predicates = match filter {
                Some(f) => parse_predicates(f)?,
                None => Vec::new(),
            };
            let plan = QueryRunner::plan(store.columns(), &predicates)?;
            print!("{}", plan.describe(store.columns()));
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
