//! Gate command implementation for Offload CLI.
//!
//! Drives a gated dispatcher through a sequence of trigger values.

use offload_core::{Dispatcher, DispatcherConfig, Error};

use crate::{callables, colors, parse_value};

/// Feed `triggers` to a gated dispatcher running `name` with a fixed input.
pub async fn execute(name: &str, raw_input: &str, triggers: &[u64]) -> anyhow::Result<()> {
    let callable = callables::find(name)
        .ok_or_else(|| anyhow::anyhow!("Unknown callable `{}` (see `offload list`)", name))?;

    let config = DispatcherConfig::gated(parse_value(raw_input)).apply_env()?;
    let dispatcher = Dispatcher::new(callables::table()?, config)?;
    dispatcher.attach(Some(callable))?;

    let mut failed = false;
    for &trigger in triggers {
        let pending = dispatcher.set_trigger(trigger)?;
        println!(
            "{}trigger {}{} -> {} (context {})",
            colors::BOLD,
            trigger,
            colors::RESET,
            dispatcher.status(),
            dispatcher
                .context_id()
                .map_or_else(|| "none".to_string(), |id| id.to_string()),
        );

        let Some(pending) = pending else {
            continue;
        };
        match pending.await {
            Ok(value) => println!("  {}result{} {}", colors::GREEN, colors::RESET, value),
            Err(Error::Execution(message)) => {
                failed = true;
                println!("  {}error{} {}", colors::RED, colors::RESET, message);
            }
            Err(e) => return Err(e.into()),
        }
    }

    dispatcher.kill();
    if failed {
        println!(
            "{}At least one gated run failed{}",
            colors::YELLOW,
            colors::RESET
        );
    }
    Ok(())
}
