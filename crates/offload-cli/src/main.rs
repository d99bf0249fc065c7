//! Offload CLI - run callables on isolated execution contexts.

mod callables;
mod colors;
mod gate;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use offload_core::Lifecycle;

#[derive(Parser)]
#[command(name = "offload")]
#[command(about = "Run callables on isolated execution contexts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in callables
    List,

    /// Dispatch one callable and print its result
    Run {
        /// Name of the callable
        callable: String,

        /// Arguments as JSON literals (anything else is passed as a string)
        args: Vec<String>,

        /// Context lifecycle: eager, per-call or singleton
        #[arg(long)]
        lifecycle: Option<Lifecycle>,

        /// Kill the context if no result arrives in time
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Dispatcher config file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Feed a trigger sequence through a gated dispatcher
    Gate {
        /// Name of the callable
        callable: String,

        /// Fixed input sent on every restart (JSON literal)
        #[arg(long)]
        input: String,

        /// Trigger values, applied in order (0 closes the gate)
        #[arg(long, num_args = 1.., required = true)]
        trigger: Vec<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Helper to format offload-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(offload_err) = err.downcast_ref::<offload_core::Error>() {
            anyhow::anyhow!("{}", offload_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::List => list(),

        Commands::Run {
            callable,
            args,
            lifecycle,
            timeout_ms,
            config,
        } => {
            let options = run::RunOptions {
                lifecycle,
                timeout_ms,
                config,
            };
            run::execute(&callable, &args, options)
                .await
                .map_err(format_error)?;
        }

        Commands::Gate {
            callable,
            input,
            trigger,
        } => {
            gate::execute(&callable, &input, &trigger)
                .await
                .map_err(format_error)?;
        }
    }

    Ok(())
}

/// Print the built-in callables.
fn list() {
    println!("{}Callables:{}", colors::BOLD, colors::RESET);
    for (callable, args, description) in callables::CATALOG {
        println!(
            "  {:<10} {}{:<8}{} {}",
            callable.name(),
            colors::DIM,
            args,
            colors::RESET,
            description
        );
    }
}

/// Parse a CLI argument as JSON, falling back to a plain string.
pub(crate) fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
