//! Run command implementation for Offload CLI.
//!
//! Dispatches one built-in callable and prints its JSON result.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use offload_core::{Dispatcher, DispatcherConfig, DispatcherFactory, Lifecycle};

use crate::{callables, colors, parse_value};

/// Options for `offload run`.
pub struct RunOptions {
    pub lifecycle: Option<Lifecycle>,
    pub timeout_ms: Option<u64>,
    pub config: Option<PathBuf>,
}

/// Execute a callable.
pub async fn execute(name: &str, raw_args: &[String], options: RunOptions) -> anyhow::Result<()> {
    let start = Instant::now();

    let callable = callables::find(name)
        .ok_or_else(|| anyhow::anyhow!("Unknown callable `{}` (see `offload list`)", name))?;

    let mut config = match &options.config {
        Some(path) => DispatcherConfig::from_json_file(path)?,
        None => DispatcherConfig::default(),
    }
    .apply_env()?;
    if let Some(lifecycle) = options.lifecycle {
        config.lifecycle = lifecycle;
    }
    if config.lifecycle == Lifecycle::Gated {
        anyhow::bail!("Gated dispatchers are driven by `offload gate`");
    }

    let table = callables::table()?;
    // Keep the factory alive for as long as its singleton dispatcher.
    let (_factory, dispatcher) = match config.lifecycle {
        Lifecycle::Singleton => {
            let factory = DispatcherFactory::new(table, config, callable)?;
            let dispatcher = factory.dispatcher()?;
            (Some(factory), dispatcher)
        }
        _ => {
            let dispatcher = Dispatcher::new(table, config)?;
            dispatcher.attach(Some(callable))?;
            (None, dispatcher)
        }
    };

    let args = raw_args.iter().map(|raw| parse_value(raw)).collect();
    let pending = dispatcher.dispatch(args)?;
    tracing::debug!(
        callable = name,
        invocation = pending.invocation_id(),
        "dispatched"
    );

    let value = match options.timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), pending).await {
            Ok(result) => result?,
            Err(_) => {
                dispatcher.kill();
                anyhow::bail!("`{}` did not finish within {} ms; context killed", name, ms);
            }
        },
        None => pending.await?,
    };

    println!("{}", value);
    eprintln!(
        "{}Completed{} {} in {:.2}s {}({}){}",
        colors::GREEN,
        colors::RESET,
        name,
        start.elapsed().as_secs_f64(),
        colors::DIM,
        dispatcher.status(),
        colors::RESET
    );
    Ok(())
}
