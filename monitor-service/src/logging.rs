//! Debug and history log trails.
//!
//! Both trails are plain `tracing` events. The history trail uses its own
//! target so it can be routed to a separate file.

use std::{fs, fs::OpenOptions, sync::Mutex};

use anyhow::Context;
use door_engine::{DoorEvent, EventKind, EventSink};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{
    filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::config::Logging;

pub const DEBUG_TARGET: &str = "garage_monitor::debug";
pub const HISTORY_TARGET: &str = "history";

/// Install the global subscriber.
///
/// Console output is filtered by `RUST_LOG`, falling back to the configured
/// filter. The history file, if any, receives only history events.
pub fn init(logging: &Logging) -> anyhow::Result<()> {
    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.filter)
            .context(format!("Invalid log filter {:?}", logging.filter))?,
    };

    let history_layer = match &logging.history_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create log directory {:?}", parent))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .context(format!("Failed to open history file at {:?}", path))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false)
                    .with_filter(Targets::new().with_target(HISTORY_TARGET, Level::INFO)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console_filter))
        .with(history_layer)
        .try_init()
        .context("Failed to install log subscriber")?;
    Ok(())
}

/// Reports monitor start and stop on both trails.
pub fn lifecycle(message: &str) {
    info!(target: HISTORY_TARGET, "{}", message);
    debug!(target: DEBUG_TARGET, "{}", message);
}

/// Forwards door events to the log trails.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn debug(&mut self, event: &DoorEvent) {
        match event.kind {
            EventKind::Conflict => warn!(target: DEBUG_TARGET, door = %event.door, "{}", event),
            _ => debug!(target: DEBUG_TARGET, door = %event.door, "{}", event),
        }
    }

    fn history(&mut self, event: &DoorEvent) {
        let at = event.at.to_rfc3339();
        match event.kind {
            EventKind::Conflict => warn!(target: HISTORY_TARGET, at = %at, "{}", event),
            _ => info!(target: HISTORY_TARGET, at = %at, "{}", event),
        }
    }
}

/// Collects everything logged while `f` runs on this thread.
#[cfg(test)]
pub fn capture(f: impl FnOnce()) -> String {
    use std::{io, sync::Arc};

    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let output = Arc::new(Mutex::new(Vec::new()));
    let writer = Arc::clone(&output);
    let subscriber = fmt()
        .with_writer(move || Buffer(Arc::clone(&writer)))
        .with_max_level(Level::DEBUG)
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = output.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}
