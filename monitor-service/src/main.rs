use std::{
    path::PathBuf,
    sync::{atomic::AtomicBool, Arc},
    time::{Duration, Instant},
};

use anyhow::Context;
use chrono::Utc;
use clap::{arg, command, Parser};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::info;

mod config;
mod logging;
mod monitor;
mod notify;
mod sensors;

use crate::{
    config::{Config, ConfigWatcher, RawConfig},
    logging::TracingSink,
    monitor::{Monitor, RunOptions, StdDelay},
    notify::{LogNotifier, Notifier, ThreemaNotifier},
};

#[derive(Parser, Debug)]
#[command(about, author = "Danilo Bargen", version)]
struct Args {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Stop after running for this many seconds
    #[arg(long, value_name = "SECONDS")]
    max_run_time: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Parse config
    let raw_config = match RawConfig::load(&args.config) {
        Ok(val) => val,
        Err(e) => {
            println!("Error: Failed to load config: {:#}", e);
            println!();
            println!(
                "Example config:\n\n{}",
                toml::to_string(&RawConfig::example())?
            );
            return Ok(());
        }
    };
    let mut config: Config = raw_config.try_into()?;

    logging::init(&config.logging)?;
    info!("Loaded config from {:?}", args.config);

    // Set up notifications
    let notifier: Box<dyn Notifier> = match config.threema.take() {
        Some(threema) => {
            info!(
                "Sending Threema notifications to {} recipient(s)",
                threema.recipients.len()
            );
            Box::new(ThreemaNotifier::new(threema)?)
        }
        None => {
            info!("No Threema config found, notifications are only logged");
            Box::new(LogNotifier)
        }
    };

    // Set up sensors
    let sensors = sensors::build(&config, Instant::now()).context("Failed to set up sensors")?;
    for door in &config.doors {
        info!(
            "Monitoring door {:?} (open pin {}, closed pin {})",
            door.name, door.open_pin, door.closed_pin
        );
    }

    // Stop between poll cycles on termination signals
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop))
            .context("Failed to register signal handler")?;
    }

    // Main loop
    let mut monitor = Monitor::new(&config, sensors, StdDelay, TracingSink, notifier, Utc::now());
    monitor.run(RunOptions {
        stop,
        max_run_time: args.max_run_time.map(Duration::from_secs),
        watcher: Some(ConfigWatcher::new(&args.config)),
    });

    Ok(())
}
