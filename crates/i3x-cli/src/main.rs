//! I3X CLI - Command-line tool for I3X servers
//!
//! Browse namespaces, types and objects, read and write values, and monitor
//! live value changes over subscription streams.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use i3x_client::{ClientConfig, I3xClient};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{ArgOverrides, Config, MergedConfig};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "i3x-cli")]
#[command(author, version, about = "I3X Information Server CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Server URL [default: http://localhost:8080]
    #[arg(short, long, env = "I3X_SERVER")]
    server: Option<String>,

    /// API key
    #[arg(long, env = "I3X_API_KEY")]
    api_key: Option<String>,

    /// API secret
    #[arg(long, env = "I3X_API_SECRET", hide_env_values = true)]
    api_secret: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "I3X_CONFIG")]
    config: Option<PathBuf>,

    /// Output format [default: table]
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List namespaces
    Namespaces,

    /// List object types
    Types {
        /// Only types in this namespace
        #[arg(long)]
        namespace: Option<String>,
    },

    /// List relationship types
    Relationships {
        /// Only relationship types in this namespace
        #[arg(long)]
        namespace: Option<String>,
    },

    /// List object instances
    Objects {
        /// Only objects of this type
        #[arg(long)]
        type_id: Option<String>,
    },

    /// Read last known value(s)
    Value {
        /// Element ID(s) to read
        #[arg(required = true)]
        element_ids: Vec<String>,

        /// How many levels of child elements to include
        #[arg(long, default_value = "0")]
        depth: u32,
    },

    /// Read historical values
    History {
        /// Element ID
        element_id: String,

        /// Start of the time range (RFC 3339)
        #[arg(long)]
        start: Option<String>,

        /// End of the time range (RFC 3339)
        #[arg(long)]
        end: Option<String>,
    },

    /// Write the current value of an element
    Write {
        /// Element ID
        element_id: String,

        /// Value to write (JSON, or a plain string)
        value: String,
    },

    /// List subscriptions on the server
    Subscriptions,

    /// Monitor values in real-time (SSE streaming)
    Monitor {
        /// Element ID(s) to monitor
        #[arg(required = true)]
        element_ids: Vec<String>,

        /// How many levels of child elements to include
        #[arg(long, default_value = "0")]
        depth: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(&ArgOverrides {
        server: cli.server.as_deref(),
        api_key: cli.api_key.as_deref(),
        api_secret: cli.api_secret.as_deref(),
        output: cli.output.map(|f| f.as_str()),
        no_color: cli.no_color,
    });
    debug!(server = %merged.server, "Using server");

    let format = OutputFormat::parse(&merged.output)
        .with_context(|| format!("Unknown output format: {}", merged.output))?;
    let ctx = OutputContext::new(format, merged.no_color, cli.quiet);

    let client = create_client(&merged)?;

    // Monitor installs its own callbacks before connecting
    if let Commands::Monitor { element_ids, depth } = &cli.command {
        return commands::monitor(client, element_ids, *depth, &ctx).await;
    }

    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", merged.server))?;

    let result = run(&client, &cli.command, &ctx).await;
    client.disconnect().await;
    result
}

async fn run(client: &I3xClient, command: &Commands, ctx: &OutputContext) -> Result<()> {
    match command {
        Commands::Namespaces => commands::namespaces(client, ctx).await,

        Commands::Types { namespace } => commands::types(client, namespace.as_deref(), ctx).await,

        Commands::Relationships { namespace } => {
            commands::relationships(client, namespace.as_deref(), ctx).await
        }

        Commands::Objects { type_id } => commands::objects(client, type_id.as_deref(), ctx).await,

        Commands::Value { element_ids, depth } => {
            commands::value(client, element_ids, *depth, ctx).await
        }

        Commands::History {
            element_id,
            start,
            end,
        } => {
            commands::history(client, element_id, start.as_deref(), end.as_deref(), ctx).await
        }

        Commands::Write { element_id, value } => {
            commands::write(client, element_id, value, ctx).await
        }

        Commands::Subscriptions => commands::subscriptions(client, ctx).await,

        Commands::Monitor { .. } => unreachable!("monitor is dispatched before connecting"),
    }
}

/// Create an I3X client from the merged configuration
fn create_client(merged: &MergedConfig) -> Result<I3xClient> {
    let mut builder = ClientConfig::builder(merged.server.clone());
    if let Some(api_key) = &merged.api_key {
        builder = builder.credentials(api_key.clone(), merged.api_secret.clone());
    }

    let config = builder.build();
    config.validate().context("Invalid client configuration")?;
    I3xClient::with_config(config).context("Failed to create I3X client")
}
