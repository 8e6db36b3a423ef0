//! The polling loop.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;
use door_engine::{DoorStatus, Engine, EventSink, GarageDoor, Timestamp};
use embedded_hal::blocking::delay::DelayMs;
use tracing::{debug, error, info, warn};

use crate::{
    config::{self, Config, ConfigWatcher},
    logging,
    notify::Notifier,
    sensors::BoxedSensors,
};

/// Longest uninterrupted sleep, so termination requests are noticed quickly.
const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// Blocking delay on the polling thread.
pub struct StdDelay;

impl DelayMs<u32> for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

pub struct MonitoredDoor {
    pub door: GarageDoor,
    pub sensors: BoxedSensors,
}

pub struct RunOptions {
    /// Set by the signal handlers
    pub stop: Arc<AtomicBool>,
    pub max_run_time: Option<Duration>,
    pub watcher: Option<ConfigWatcher>,
}

pub struct Monitor<D, E, N> {
    engine: Engine<D>,
    doors: Vec<MonitoredDoor>,
    sink: E,
    notifier: N,
    loop_delay: Duration,
    notify_on_conflict: bool,
}

impl<D, E, N> Monitor<D, E, N>
where
    D: DelayMs<u32>,
    E: EventSink,
    N: Notifier,
{
    /// `sensors` must be in the same order as `config.doors`.
    pub fn new(
        config: &Config,
        sensors: Vec<BoxedSensors>,
        delay: D,
        sink: E,
        notifier: N,
        now: Timestamp,
    ) -> Self {
        let doors = config
            .doors
            .iter()
            .zip(sensors)
            .map(|(door, sensors)| MonitoredDoor {
                door: GarageDoor::new(door.name.clone(), door.settings, now),
                sensors,
            })
            .collect();
        let monitor = Self {
            engine: Engine::new(config.engine, delay),
            doors,
            sink,
            notifier,
            loop_delay: config.loop_delay,
            notify_on_conflict: config.notify_on_conflict,
        };
        monitor.check_timing();
        monitor
    }

    fn check_timing(&self) {
        let settle = self.engine.settings().worst_case_settle();
        if self.loop_delay <= settle {
            warn!(
                "Loop delay {:?} is not longer than the worst case settle time {:?}",
                self.loop_delay, settle
            );
        }
    }

    #[cfg(test)]
    pub fn doors(&self) -> &[MonitoredDoor] {
        &self.doors
    }

    #[cfg(test)]
    pub fn sink(&self) -> &E {
        &self.sink
    }

    /// Evaluate every door once and send due notifications.
    ///
    /// Returns the number of notifications sent.
    pub fn poll(&mut self, now: Timestamp) -> usize {
        let mut sent = 0;
        for monitored in &mut self.doors {
            let previous = monitored.door.current_status();
            let status =
                self.engine
                    .evaluate(&mut monitored.door, &monitored.sensors, &mut self.sink, now);

            if status == DoorStatus::Conflict
                && previous != DoorStatus::Conflict
                && self.notify_on_conflict
            {
                self.notifier.notify(&format!(
                    "{} garage door reports open and closed at the same time, \
                     check the sensor wiring",
                    monitored.door.name()
                ));
                sent += 1;
            }

            if monitored.door.open_too_long(now, &mut self.sink) {
                self.notifier.notify(&monitored.door.summary(now));
                sent += 1;
            }
        }
        sent
    }

    /// Apply a reloaded config to the running doors.
    ///
    /// Doors are matched by name. Sensor wiring is only read at startup.
    pub fn apply(&mut self, config: &Config) {
        self.loop_delay = config.loop_delay;
        self.notify_on_conflict = config.notify_on_conflict;
        self.engine.set_settings(config.engine);
        for door_config in &config.doors {
            match self
                .doors
                .iter_mut()
                .find(|monitored| monitored.door.name() == door_config.name)
            {
                Some(monitored) => monitored.door.reconfigure(door_config.settings),
                None => warn!(
                    "Ignoring door {:?} from reloaded config, adding doors needs a restart",
                    door_config.name
                ),
            }
        }
        self.check_timing();
        info!("Applied reloaded config");
    }

    fn reload(&mut self, watcher: &ConfigWatcher) {
        match config::load(watcher.path()) {
            Ok(config) => self.apply(&config),
            Err(e) => error!(
                "Failed to reload config from {:?}, keeping previous config: {:#}",
                watcher.path(),
                e
            ),
        }
    }

    /// Poll until stopped by a signal or the maximum run time.
    pub fn run(&mut self, mut options: RunOptions) {
        logging::lifecycle("Starting Garage Door Monitor");
        let started = Instant::now();
        while !options.stop.load(Ordering::Relaxed) {
            if let Some(max_run_time) = options.max_run_time {
                if started.elapsed() >= max_run_time {
                    info!("Maximum run time of {:?} reached", max_run_time);
                    break;
                }
            }
            if let Some(watcher) = options.watcher.as_mut() {
                if watcher.changed() {
                    self.reload(watcher);
                }
            }

            let sent = self.poll(Utc::now());
            if sent > 0 {
                debug!("Sent {} notification(s)", sent);
            }

            // Sleep until the next cycle
            let cycle_end = Instant::now();
            while !options.stop.load(Ordering::Relaxed) {
                let slept = cycle_end.elapsed();
                if slept >= self.loop_delay {
                    break;
                }
                thread::sleep(SLEEP_SLICE.min(self.loop_delay - slept));
            }
        }
        logging::lifecycle("Stopping Garage Door Monitor");
    }
}
