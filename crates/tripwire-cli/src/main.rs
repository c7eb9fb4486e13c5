//! tripwire — trigger broker CLI.
//!
//! Thin front end over the broker core: every subcommand builds a store
//! against the configured key-value engine and event-type catalog, runs one
//! operation, and prints the result. Exits nonzero on any returned error.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::App;

#[derive(Parser)]
#[command(name = "tripwire")]
#[command(about = "Manage trigger events and their pipeline bindings")]
#[command(version)]
struct Cli {
    /// Key-value engine host
    #[arg(long, global = true, default_value = "localhost")]
    redis_host: String,

    /// Key-value engine port
    #[arg(long, global = true, default_value_t = 6379)]
    redis_port: u16,

    /// Key-value engine password
    #[arg(long, global = true)]
    redis_password: Option<String>,

    /// Event-type catalog file
    #[arg(long, global = true, default_value = "event-types.json")]
    config: PathBuf,

    /// Tenant account id
    #[arg(long, global = true, default_value = tripwire_broker::PUBLIC_ACCOUNT)]
    account: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage triggers, linking trigger events and pipelines
    Trigger {
        #[command(subcommand)]
        command: commands::trigger::TriggerCommand,
    },
    /// Manage pipelines with triggers
    Pipeline {
        #[command(subcommand)]
        command: commands::pipeline::PipelineCommand,
    },
    /// Manage trigger events
    TriggerEvent {
        #[command(subcommand)]
        command: commands::trigger_event::TriggerEventCommand,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let app = App::new(
        &cli.redis_host,
        cli.redis_port,
        cli.redis_password.clone(),
        &cli.config,
        &cli.account,
    )?;

    let result = match cli.command {
        Commands::Trigger { command } => commands::trigger::handle(&app, command).await,
        Commands::Pipeline { command } => commands::pipeline::handle(&app, command).await,
        Commands::TriggerEvent { command } => commands::trigger_event::handle(&app, command).await,
    };
    app.close().await;
    result
}
