//! Door state tracking.
//!
//! A [`GarageDoor`] remembers its last status and when that status was
//! entered. The [`Engine`] samples a door's sensor pair, resolves ambiguous
//! readings and records the result on the door.
//!
//! ```text
//!  open  closed   status
//!  ----  ------   --------------------------------------------
//!  1     0        Open
//!  0     1        Closed
//!  1     1        Conflict (reported on every evaluation)
//!  0     0        re-sample after the settle delay, then Unknown
//! ```

use embedded_hal::blocking::delay::DelayMs;

use crate::{
    alarm::Escalation,
    door_sensors::{ContactSensor, DoorSensors},
    events::{DoorEvent, EventKind, EventSink},
    settings::{DoorSettings, EngineSettings},
    status::{decide, Decision, DoorStatus},
    Timestamp,
};

/// A single monitored garage door.
#[derive(Debug, Clone)]
pub struct GarageDoor {
    name: String,
    pub(crate) settings: DoorSettings,
    pub(crate) status: DoorStatus,
    pub(crate) status_since: Timestamp,
    pub(crate) escalation: Escalation,
}

impl GarageDoor {
    /// A new door starts in the `Unknown` status as of `now`.
    pub fn new(name: impl Into<String>, settings: DoorSettings, now: Timestamp) -> Self {
        Self {
            name: name.into(),
            settings,
            status: DoorStatus::Unknown,
            status_since: now,
            escalation: Escalation::new(&settings),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &DoorSettings {
        &self.settings
    }

    /// The status recorded by the most recent evaluation.
    pub fn current_status(&self) -> DoorStatus {
        self.status
    }

    /// When the current status was entered.
    pub fn status_since(&self) -> Timestamp {
        self.status_since
    }

    /// How long the door has been in its current status.
    pub fn dwell(&self, now: Timestamp) -> chrono::Duration {
        now - self.status_since
    }

    /// Apply fresh settings from a config reload.
    ///
    /// An escalated alarm threshold survives the reload while the door stays
    /// open, but never drops below the new baseline.
    pub fn reconfigure(&mut self, settings: DoorSettings) {
        self.settings = settings;
        if self.status == DoorStatus::Open {
            self.escalation.raise_to(settings.time_limit());
        } else {
            self.escalation.reset(&settings);
        }
    }

    /// Human readable status line, e.g. "2-Car garage has been open for 601 seconds".
    pub fn summary(&self, now: Timestamp) -> String {
        format!(
            "{} garage has been {} for {} seconds",
            self.name,
            self.status,
            self.dwell(now).num_seconds()
        )
    }

    /// Store the status determined at `now` and report it.
    pub(crate) fn record<E: EventSink>(
        &mut self,
        status: DoorStatus,
        now: Timestamp,
        sink: &mut E,
    ) {
        if status != self.status {
            let event = DoorEvent::new(
                &self.name,
                now,
                EventKind::Transition {
                    from: self.status,
                    to: status,
                },
            );
            sink.debug(&event);
            sink.history(&event);
            self.status = status;
            if now > self.status_since {
                self.status_since = now;
            }
            if status != DoorStatus::Open {
                self.escalation.reset(&self.settings);
            }
        }
        if status == DoorStatus::Conflict {
            let event = DoorEvent::new(&self.name, now, EventKind::Conflict);
            sink.debug(&event);
            sink.history(&event);
        }
    }
}

/// Evaluates doors against their sensors.
///
/// Owns the blocking delay used while waiting for a moving door to reach
/// one of its end positions.
pub struct Engine<D> {
    settings: EngineSettings,
    delay: D,
}

impl<D> Engine<D>
where
    D: DelayMs<u32>,
{
    pub fn new(settings: EngineSettings, delay: D) -> Self {
        Self { settings, delay }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: EngineSettings) {
        self.settings = settings;
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    /// Sample the sensors of `door`, update its status and return it.
    ///
    /// Emits a transition event only when the status differs from the
    /// previous evaluation.
    pub fn evaluate<O, C, E>(
        &mut self,
        door: &mut GarageDoor,
        sensors: &DoorSensors<O, C>,
        sink: &mut E,
        now: Timestamp,
    ) -> DoorStatus
    where
        O: ContactSensor,
        C: ContactSensor,
        E: EventSink,
    {
        let status = self.read_status(door.name(), sensors, sink, now);
        door.record(status, now, sink);
        status
    }

    fn read_status<O, C, E>(
        &mut self,
        name: &str,
        sensors: &DoorSensors<O, C>,
        sink: &mut E,
        now: Timestamp,
    ) -> DoorStatus
    where
        O: ContactSensor,
        C: ContactSensor,
        E: EventSink,
    {
        let (open, closed) = sensors.query();
        if let Decision::Settled(status) = decide(open.asserted, closed.asserted) {
            return status;
        }

        // Door may be moving, give it time to reach an end position
        for attempt in 1..=self.settings.max_settle_attempts() {
            sink.debug(&DoorEvent::new(name, now, EventKind::Settling { attempt }));
            self.delay.delay_ms(self.settings.settle_delay_ms());
            let (open, closed) = sensors.query();
            if let Decision::Settled(status) = decide(open.asserted, closed.asserted) {
                return status;
            }
        }
        DoorStatus::Unknown
    }
}
