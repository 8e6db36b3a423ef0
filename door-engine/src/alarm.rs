//! Open-too-long alarm with backoff.
//!
//! The first alarm fires once the door has been open longer than the
//! configured time limit. Every alarm grows the threshold
//! (`threshold * multiplier + additive`), and the same threshold also
//! governs the quiet period before the next alarm, so re-notifications
//! start frequent and space out the longer the door stays open. Leaving the
//! `Open` status resets the threshold to the baseline.

use crate::{
    door::GarageDoor,
    events::{DoorEvent, EventKind, EventSink},
    settings::DoorSettings,
    status::DoorStatus,
    Timestamp,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Escalation {
    /// Required dwell and quiet time in seconds before the next alarm
    threshold: f64,
    /// `None` until the first alarm fires
    last_alarm_at: Option<Timestamp>,
}

impl Escalation {
    pub(crate) fn new(settings: &DoorSettings) -> Self {
        Self {
            threshold: settings.time_limit(),
            last_alarm_at: None,
        }
    }

    pub(crate) fn reset(&mut self, settings: &DoorSettings) {
        self.threshold = settings.time_limit();
    }

    pub(crate) fn raise_to(&mut self, baseline: f64) {
        if self.threshold < baseline {
            self.threshold = baseline;
        }
    }
}

fn seconds(duration: chrono::Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0
}

impl GarageDoor {
    /// Current alarm threshold in seconds.
    pub fn open_alarm_threshold(&self) -> f64 {
        self.escalation.threshold
    }

    pub fn last_alarm_at(&self) -> Option<Timestamp> {
        self.escalation.last_alarm_at
    }

    /// Decide whether an open-too-long notification is due at `now`.
    ///
    /// Call once per poll, after the door was evaluated. Returns `true` at
    /// most once per threshold period and grows the threshold when it does.
    pub fn open_too_long<E: EventSink>(&mut self, now: Timestamp, sink: &mut E) -> bool {
        if self.status != DoorStatus::Open {
            self.escalation.reset(&self.settings);
            return false;
        }

        let threshold = self.escalation.threshold;
        let dwell = self.dwell(now);
        let quiet_enough = match self.escalation.last_alarm_at {
            Some(at) => seconds(now - at) >= threshold,
            None => true,
        };
        if seconds(dwell) <= threshold || !quiet_enough {
            return false;
        }

        let next_threshold = self.settings().grow(threshold);
        self.escalation.last_alarm_at = Some(now);
        self.escalation.threshold = next_threshold;
        sink.history(&DoorEvent::new(
            self.name(),
            now,
            EventKind::Alarm {
                dwell_secs: dwell.num_seconds(),
                next_threshold_secs: next_threshold,
            },
        ));
        true
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use chrono::{Duration, TimeZone, Utc};
    use embedded_hal::blocking::delay::DelayMs;

    use super::*;
    use crate::{
        door::Engine,
        door_sensors::{ContactSensor, DoorSensors},
        events::{EventQueue, Trail},
        settings::EngineSettings,
    };

    struct Switch(Cell<bool>);

    impl ContactSensor for Switch {
        fn is_asserted(&self) -> bool {
            self.0.get()
        }
    }

    struct NoDelay;

    impl DelayMs<u32> for NoDelay {
        fn delay_ms(&mut self, _ms: u32) {}
    }

    struct Fixture {
        engine: Engine<NoDelay>,
        sensors: DoorSensors<Switch, Switch>,
        door: GarageDoor,
        events: EventQueue<64>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                engine: Engine::new(EngineSettings::default(), NoDelay),
                sensors: DoorSensors::new(Switch(Cell::new(false)), Switch(Cell::new(true))),
                door: GarageDoor::new(
                    "1-Car",
                    DoorSettings::new(600.0, 1.5, 60.0).unwrap(),
                    t(-3600),
                ),
                events: EventQueue::new(),
            }
        }

        fn set(&mut self, open: bool, closed: bool, secs: i64) {
            self.sensors.open_sensor().0.set(open);
            self.sensors.closed_sensor().0.set(closed);
            self.poll(secs);
        }

        fn poll(&mut self, secs: i64) -> bool {
            self.engine
                .evaluate(&mut self.door, &self.sensors, &mut self.events, t(secs));
            self.door.open_too_long(t(secs), &mut self.events)
        }
    }

    fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    macro_rules! assert_fires {
        ($fixture:expr, $secs:expr, $next:expr) => {{
            assert!($fixture.poll($secs), "expected alarm at t={}", $secs);
            assert_eq!($fixture.door.open_alarm_threshold(), $next);
        }};
    }

    macro_rules! assert_quiet {
        ($fixture:expr, $secs:expr) => {{
            assert!(!$fixture.poll($secs), "unexpected alarm at t={}", $secs);
        }};
    }

    #[test]
    fn test_backoff_scenario() {
        let mut f = Fixture::new();
        f.set(true, false, 0);
        assert_eq!(f.door.open_alarm_threshold(), 600.0);

        assert_quiet!(f, 300);
        assert_quiet!(f, 600);
        assert_fires!(f, 601, 960.0);
        assert_eq!(f.door.last_alarm_at(), Some(t(601)));
        assert_quiet!(f, 900);
        assert_eq!(f.door.open_alarm_threshold(), 960.0);
        assert_quiet!(f, 1560);
        assert_fires!(f, 1561, 1500.0);
        assert_quiet!(f, 3000);
        assert_fires!(f, 3061, 2310.0);
    }

    #[test]
    fn test_short_open_never_alarms_and_resets() {
        let mut f = Fixture::new();
        f.set(true, false, 0);
        assert_quiet!(f, 200);
        f.set(false, true, 300);
        assert_eq!(f.door.open_alarm_threshold(), 600.0);
        assert_eq!(f.door.last_alarm_at(), None);

        // Next open period starts from the baseline again
        f.set(true, false, 1000);
        assert_quiet!(f, 1600);
        assert_fires!(f, 1601, 960.0);
    }

    #[test]
    fn test_leaving_open_resets_threshold() {
        let mut f = Fixture::new();
        f.set(true, false, 0);
        assert_fires!(f, 601, 960.0);
        f.set(false, false, 700);
        assert_eq!(f.door.current_status(), DoorStatus::Unknown);
        assert_eq!(f.door.open_alarm_threshold(), 600.0);

        f.set(true, false, 800);
        assert_quiet!(f, 1400);
        assert_fires!(f, 1401, 960.0);
    }

    #[test]
    fn test_conflict_does_not_alarm() {
        let mut f = Fixture::new();
        f.set(true, true, 0);
        assert_quiet!(f, 10_000);
        assert_eq!(f.door.current_status(), DoorStatus::Conflict);
        assert_eq!(f.door.open_alarm_threshold(), 600.0);
    }

    #[test]
    fn test_alarm_goes_to_history() {
        let mut f = Fixture::new();
        f.set(true, false, 0);
        f.poll(601);
        let alarms: Vec<String> = f
            .events
            .trail(Trail::History)
            .filter(|e| matches!(e.kind, EventKind::Alarm { .. }))
            .map(|e| e.to_string())
            .collect();
        assert_eq!(
            alarms,
            vec!["DOOR:1-Car:ALARM:open for 601s, next alarm after 960s".to_string()]
        );
    }

    #[test]
    fn test_reconfigure_while_open_keeps_escalation() {
        let mut f = Fixture::new();
        f.set(true, false, 0);
        assert_fires!(f, 601, 960.0);

        f.door.reconfigure(DoorSettings::new(300.0, 2.0, 0.0).unwrap());
        assert_eq!(f.door.open_alarm_threshold(), 960.0);
        f.door.reconfigure(DoorSettings::new(1200.0, 2.0, 0.0).unwrap());
        assert_eq!(f.door.open_alarm_threshold(), 1200.0);

        f.set(false, true, 1000);
        assert_eq!(f.door.open_alarm_threshold(), 1200.0);
        f.door.reconfigure(DoorSettings::new(300.0, 2.0, 0.0).unwrap());
        assert_eq!(f.door.open_alarm_threshold(), 300.0);
    }
}
