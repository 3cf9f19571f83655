//! # Course catalog CLI (`courses`)
//!
//! ## Usage
//!
//! ```bash
//! courses --config ./config/courses.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `courses serve` | Start the HTTP server |
//! | `courses query KEY=VALUE...` | Run one query and print the result |
//! | `courses status` | Print a dataset and index summary |
//!
//! ## Examples
//!
//! ```bash
//! # Introductory programming courses, names only
//! courses query subject=COP keywords=programming excludes=description --format text
//!
//! # Labs, sorted by name, second page
//! courses query isLab=true sortBy=name skip=10 limit=10
//!
//! # Start the server
//! RUST_LOG=debug courses serve
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use course_harness::config;
use course_harness::format::{negotiate, render};
use course_harness::params::RawParams;
use course_harness::server;

/// Course catalog query service.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/courses.toml` for an example.
#[derive(Parser)]
#[command(
    name = "courses",
    about = "An in-memory course catalog with keyword search and content negotiation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/courses.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the dataset and serve queries over HTTP.
    Serve,

    /// Run a single query against the dataset.
    ///
    /// Parameters use the same names as the HTTP API. Repeat a key to
    /// pass several values, e.g. `subject=COP subject=CDA`.
    Query {
        /// Query parameters as `KEY=VALUE` pairs.
        params: Vec<String>,

        /// Output representation: json, xml, yaml, binary, or text.
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Print course count, dataset date, and index sizes.
    Status,
}

fn parse_pairs(pairs: &[String]) -> anyhow::Result<RawParams> {
    let mut params = RawParams::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("expected KEY=VALUE, got \"{}\"", pair))?;
        params.push(key, value);
    }
    Ok(params)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Query { params, format } => {
            let engine = server::load_engine(&cfg)?;
            let params = parse_pairs(&params)?;
            let format = negotiate(Some(format.as_str()), None)?;
            let shape = engine.query_by(&[params])?;
            let rendered = render(&shape, format)?;

            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&rendered.body)?;
            if !rendered.content_type.starts_with("application/octet-stream") {
                writeln!(stdout)?;
            }
        }
        Commands::Status => {
            let engine = server::load_engine(&cfg)?;
            let store = engine.store();
            println!("courses:   {}", store.len());
            println!("dataAsOf:  {}", store.data_as_of());
            println!("stems:     {}", engine.index().stem_count());
            println!("phonetics: {}", engine.index().phonetic_count());
        }
    }

    Ok(())
}
