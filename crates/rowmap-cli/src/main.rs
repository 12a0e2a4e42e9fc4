//! rowmap CLI.
//!
//! Provides the `rowmap` binary for running ad-hoc SQL against a SQLite
//! database file. `query` prints the result set as a JSON array of dynamic
//! rows; `exec` prints the number of affected rows.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rowmap_core::{DynamicParameters, Mapper, MapperOptions, Value};
use rowmap_sqlite::{Database, DbError};

/// Run SQL against a SQLite database and map the results.
#[derive(Parser)]
#[command(name = "rowmap", about = "Run SQL against a SQLite database and map the results")]
struct Cli {
    /// Path to the database file.
    #[arg(long, global = true, env = "ROWMAP_DB_PATH", default_value = "rowmap.db")]
    db: PathBuf,

    /// JSON file with mapper options.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run a query and print the rows as JSON.
    Query {
        /// SQL text.
        sql: String,

        /// Parameter as name=value; repeatable.
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// Run a statement and print the affected row count.
    Exec {
        /// SQL text.
        sql: String,

        /// Parameter as name=value; repeatable.
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    process::exit(run(cli));
}

/// Execute the parsed command.
///
/// Returns exit code: 0 = success, 1 = SQL or mapping error,
/// 3 = I/O or open error.
fn run(cli: Cli) -> i32 {
    let options = match &cli.config {
        Some(path) => match MapperOptions::from_json_file(path) {
            Ok(options) => options,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 3;
            }
        },
        None => MapperOptions::default(),
    };

    tracing::debug!("Opening database at {}", cli.db.display());
    let db = match Database::open(&cli.db) {
        Ok(db) => db.with_mapper(Arc::new(Mapper::new(options))),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 3;
        }
    };

    let result = match cli.command {
        Commands::Query { sql, params } => {
            db.query_dynamic(&sql, &to_parameters(params)).map(|rows| {
                serde_json::to_string_pretty(&rows).unwrap_or_else(|e| {
                    format!("{{\"error\": \"failed to serialize rows: {}\"}}", e)
                })
            })
        }
        Commands::Exec { sql, params } => db
            .execute(&sql, &to_parameters(params))
            .map(|count| count.to_string()),
    };

    match result {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(DbError::Open { path, source }) => {
            eprintln!("Error: cannot open database '{}': {}", path, source);
            3
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn to_parameters(params: Vec<(String, Value)>) -> DynamicParameters {
    let mut bag = DynamicParameters::new();
    for (name, value) in params {
        bag.add(&name, value);
    }
    bag
}

/// Parses `name=value`. Values are `null`, integers, floats, `true`/`false`,
/// or text.
fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let Some((name, literal)) = raw.split_once('=') else {
        return Err(format!("expected name=value, got '{}'", raw));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in '{}'", raw));
    }
    Ok((name.to_string(), parse_literal(literal)))
}

fn parse_literal(literal: &str) -> Value {
    match literal {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(i) = literal.parse::<i64>() {
                Value::I64(i)
            } else if let Ok(f) = literal.parse::<f64>() {
                Value::F64(f)
            } else {
                Value::Text(literal.to_string())
            }
        }
    }
}
