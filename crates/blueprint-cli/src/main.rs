//! Local smoke-test CLI for the blueprint orchestration engine. Drives a
//! `Container` end to end against in-memory state and an echo provider -
//! for local iteration, not a production host.

use clap::{Parser, Subcommand};

mod commands;
mod memory;

#[derive(Parser)]
#[command(name = "blueprint")]
#[command(about = "Blueprint orchestration engine smoke-test CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a blueprint JSON file and print a structural summary.
    Validate {
        /// Path to the blueprint JSON file.
        path: String,
    },
    /// Stage, deploy, and (optionally) destroy a blueprint against an
    /// in-memory state container, printing every event as it arrives.
    Run {
        /// Path to the blueprint JSON file.
        #[arg(long)]
        blueprint: String,
        /// Name for the new instance.
        #[arg(long)]
        name: Option<String>,
        /// Variable overrides as `key=value`, repeatable.
        #[arg(long = "var")]
        vars: Vec<String>,
        /// Path to a KDL engine-config file; omitted means built-in defaults.
        #[arg(long)]
        config: Option<String>,
        /// Destroy the instance again immediately after a successful deploy.
        #[arg(long)]
        destroy_after: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { path } => commands::validate(&path)?,
        Commands::Run {
            blueprint,
            name,
            vars,
            config,
            destroy_after,
        } => commands::run(&blueprint, name, vars, config, destroy_after).await?,
    }

    Ok(())
}
