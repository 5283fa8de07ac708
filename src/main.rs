//! Command-line interface for stampede
//!
//! # Usage Examples
//!
//! ## Running a step
//! ```bash
//! # Native executor, driver taken from the context file
//! stampede run --context steps/orders.yaml
//!
//! # Different driver, fixed seed
//! STAMPEDE_DRIVER=./drivers/mysql stampede run --context steps/orders.yaml --seed 7
//! ```
//!
//! ## Previewing data
//! ```bash
//! stampede generate --rule rules/orders.yaml --count 3
//! ```

use clap::{Parser, Subcommand};
use stampede::{generate, logging, GenerateArgs, RunArgs};
use stampede_core::LoggerConfig;

#[derive(Parser)]
#[command(name = "stampede")]
#[command(about = "Seeded workload generation and step execution for load testing")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one benchmark step
    Run(RunArgs),

    /// Print values generated from a rule file as JSON lines
    Generate(GenerateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let context = stampede::run::load_context(&args)?;
            logging::init(&context.config.logger)?;
            stampede::run::run(context).await
        }
        Commands::Generate(args) => {
            logging::init(&LoggerConfig::default())?;
            generate::run(&args, &mut std::io::stdout().lock())
        }
    }
}
