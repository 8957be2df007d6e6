//! mssql-frame CLI - inspect SQL Server tables through the conversion engine.

use clap::{Parser, Subcommand};
use mssql_frame::{describe_schema, read, Config, Frame, FrameError, MssqlSession};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "mssql-frame")]
#[command(about = "Schema-driven typed table conversion for SQL Server")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a table's schema as JSON
    Describe {
        /// Table name, optionally schema qualified
        table: String,

        /// Fail unless these columns exist
        #[arg(long = "require")]
        required: Vec<String>,
    },

    /// Run a query and print its rows typed by a table's schema
    Read {
        /// SELECT statement to run
        statement: String,

        /// Table whose schema types the result
        #[arg(long)]
        table: String,
    },

    /// Test the database connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), FrameError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let mut session = MssqlSession::connect(&config.connection).await?;

    match cli.command {
        Commands::Describe { table, required } => {
            let schema = describe_schema(&mut session, &table, required.as_slice()).await?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }

        Commands::Read { statement, table } => {
            let schema = describe_schema(&mut session, &table, &[] as &[&str]).await?;
            let frame = read(&mut session, &statement, &schema, &[]).await?;
            println!("{}", serde_json::to_string_pretty(&rows_as_json(&frame)?)?);
        }

        Commands::HealthCheck => {
            let start = Instant::now();
            session.health_check().await?;
            println!("Health Check Results:");
            println!(
                "  SQL Server: OK ({}ms)",
                start.elapsed().as_millis()
            );
        }
    }

    Ok(())
}

/// One JSON object per row, index columns included.
fn rows_as_json(frame: &Frame) -> Result<Vec<Value>, FrameError> {
    let names = frame.all_names();
    frame
        .rows(&names)
        .into_iter()
        .map(|row| -> Result<Value, FrameError> {
            let mut object = Map::with_capacity(names.len());
            for (name, value) in names.iter().zip(row) {
                object.insert(name.clone(), serde_json::to_value(value)?);
            }
            Ok(Value::Object(object))
        })
        .collect()
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
