//! Spanhouse CLI
//!
//! Command-line interface for reading traces straight from the `ClickHouse`
//! tables. Results are printed to stdout as JSON; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! spanhouse --help
//! spanhouse services
//! spanhouse operations frontend
//! spanhouse trace 00000000000000a1
//! spanhouse find --service frontend --min-duration 100ms --tag error=true
//! ```

#![deny(unsafe_code)]

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::Value;
use shared::config::ReaderConfig;
use shared::models::{parse_duration, TraceId, TraceQueryParameters, DEFAULT_NUM_TRACES};
use shared::storage::TraceReader;
use shared::validator::Validate;
use std::time::Duration;

/// Spanhouse CLI - query traces stored in `ClickHouse`
#[derive(Parser)]
#[command(name = "spanhouse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// `ClickHouse` HTTP URL
    #[arg(long, env = "SPANHOUSE_DB_URL")]
    db_url: Option<String>,

    /// Database holding the trace tables
    #[arg(long, env = "SPANHOUSE_DB_NAME")]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List services with recorded operations
    Services,

    /// List the operations of a service
    Operations {
        /// Service name
        service: String,
    },

    /// Fetch one trace by ID
    Trace {
        /// Trace ID, 1 to 32 hex digits
        trace_id: String,

        /// Read from the archive span table
        #[arg(long)]
        archive: bool,
    },

    /// Search for traces
    Find(FindArgs),
}

#[derive(clap::Args)]
struct FindArgs {
    /// Service to search in
    #[arg(long)]
    service: String,

    /// Exact operation name
    #[arg(long)]
    operation: Option<String>,

    /// Earliest span start (RFC 3339)
    #[arg(long)]
    start: Option<DateTime<Utc>>,

    /// Latest span start (RFC 3339)
    #[arg(long)]
    end: Option<DateTime<Utc>>,

    /// Minimum span duration, e.g. 150ms
    #[arg(long, value_parser = parse_duration)]
    min_duration: Option<Duration>,

    /// Maximum span duration, e.g. 2s
    #[arg(long, value_parser = parse_duration)]
    max_duration: Option<Duration>,

    /// Tag constraint as key=value; repeatable
    #[arg(long = "tag", value_parser = parse_tag)]
    tags: Vec<(String, String)>,

    /// Maximum number of traces
    #[arg(long, default_value_t = DEFAULT_NUM_TRACES)]
    limit: u32,
}

fn parse_tag(input: &str) -> Result<(String, String), String> {
    input
        .split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got {input:?}"))
}

impl FindArgs {
    fn into_params(self) -> Result<TraceQueryParameters> {
        let mut params = TraceQueryParameters::new(self.service).with_num_traces(self.limit);
        params.operation_name = self.operation;
        params.start_time_min = self.start;
        params.start_time_max = self.end;
        params.duration_min = self.min_duration;
        params.duration_max = self.max_duration;
        params.tags = self.tags.into_iter().collect();

        params.validate().context("Invalid search parameters")?;
        Ok(params)
    }
}

/// Runs one command and returns its JSON output.
async fn execute(
    command: Commands,
    reader: &TraceReader,
    archive: Option<&TraceReader>,
) -> Result<Value> {
    let output = match command {
        Commands::Services => serde_json::to_value(reader.get_services().await?)?,
        Commands::Operations { service } => {
            serde_json::to_value(reader.get_operations(&service).await?)?
        }
        Commands::Trace {
            trace_id,
            archive: use_archive,
        } => {
            let trace_id: TraceId = trace_id
                .parse()
                .with_context(|| format!("Invalid trace ID {trace_id:?}"))?;
            let reader = if use_archive {
                match archive {
                    Some(archive) => archive,
                    None => bail!("No archive span table is configured"),
                }
            } else {
                reader
            };
            serde_json::to_value(reader.get_trace(trace_id).await?)?
        }
        Commands::Find(args) => {
            let params = args.into_params()?;
            serde_json::to_value(reader.find_traces(&params).await?)?
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ReaderConfig::from_env()?;
    if let Some(url) = cli.db_url {
        config.database.url = url;
    }
    if let Some(database) = cli.database {
        config.database.database = database;
    }
    tracing::debug!(url = %config.database.url, "Connecting to ClickHouse");

    let executor = config.executor();
    let reader = config.reader(executor.clone());
    let archive = config.archive_reader(executor);

    let output = execute(cli.command, &reader, archive.as_ref()).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
