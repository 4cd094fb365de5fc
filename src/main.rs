/*!
 * Product CLI - query the product service through the resilient clients
 *
 * Builds the pools, callers and facades from the config file and runs a
 * single lookup, printing the result as JSON.
 */

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use product_connect::ProductClient;
use product_core_resilience::CallContext;
use product_service::{
    catalog::DEFAULT_CONCURRENCY,
    config::LogLevel,
    error::{EXIT_FATAL, EXIT_SUCCESS},
    grpc_client, http_client, logging, CatalogError, ProductCatalog, ServiceConfig,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Caller name sent with every request from this tool
const CLI_CALLER: &str = "product-cli";

#[derive(Parser)]
#[command(name = "product-cli")]
#[command(version, about = "Query the product service over gRPC or HTTP", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides the config file)
    #[arg(long = "log-level", value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up one product by id
    Find {
        #[arg(long)]
        id: i64,

        #[arg(short = 't', long, value_enum, default_value = "grpc")]
        transport: Transport,
    },

    /// Look up several products, keeping the given order
    FindMany {
        /// Comma-separated product ids
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<i64>,

        /// Lookups in flight at once
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,

        #[arg(short = 't', long, value_enum, default_value = "grpc")]
        transport: Transport,
    },

    /// Full-text search, resolved to products
    Search {
        #[arg(short = 'q', long)]
        query: String,

        #[arg(short = 't', long, value_enum, default_value = "grpc")]
        transport: Transport,
    },
}

impl Commands {
    fn transport(&self) -> Transport {
        match self {
            Commands::Find { transport, .. }
            | Commands::FindMany { transport, .. }
            | Commands::Search { transport, .. } => *transport,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Transport {
    Grpc,
    Http,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<CatalogError>()
                .map_or(EXIT_FATAL, CatalogError::exit_code)
        }
    };
    std::process::exit(code);
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => ServiceConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServiceConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    config.verbose |= cli.verbose;

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(execute(cli.command, &config))
}

async fn execute(command: Commands, config: &ServiceConfig) -> anyhow::Result<()> {
    let client: Arc<dyn ProductClient> = match command.transport() {
        Transport::Grpc => Arc::new(grpc_client(&config.grpc)?),
        Transport::Http => Arc::new(http_client(&config.http)?),
    };

    // Ctrl-C aborts in-flight calls and pending pool waits
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling outstanding calls");
                shutdown.cancel();
            }
        }
    });
    let ctx = CallContext::new()
        .with_caller(CLI_CALLER)
        .with_cancellation(shutdown.child_token());

    let catalog = ProductCatalog::new(client);
    match command {
        Commands::Find { id, .. } => print_json(&catalog.find_by_id(&ctx, id).await?),
        Commands::FindMany {
            ids, concurrency, ..
        } => {
            let catalog = catalog.with_concurrency(concurrency);
            let products = catalog.find_all_by_ids(&ctx, &ids).await;
            debug!(requested = ids.len(), found = products.len(), "Lookup finished");
            print_json(&products)
        }
        Commands::Search { query, .. } => print_json(&catalog.search(&ctx, &query).await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
