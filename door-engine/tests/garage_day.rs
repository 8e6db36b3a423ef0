//! Replays a day of garage activity for two doors, polling every five seconds.

use std::cell::Cell;

use chrono::{Duration, TimeZone, Utc};
use door_engine::{
    ContactSensor, DoorSensors, DoorSettings, DoorStatus, Engine, EngineSettings, EventKind,
    EventQueue, GarageDoor, Timestamp, Trail,
};
use embedded_hal::blocking::delay::DelayMs;

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

/// Sensor state of a door starting at the given second, as (open, closed).
type Timeline = &'static [(i64, (bool, bool))];

const TWO_CAR: Timeline = &[
    (0, (false, true)),
    (3590, (false, false)),
    (3600, (true, false)),
    (3710, (false, false)),
    (3720, (false, true)),
];

const ONE_CAR: Timeline = &[
    (0, (false, true)),
    (14390, (false, false)),
    (14400, (true, false)),
    (19790, (false, false)),
    (19800, (false, true)),
];

fn state_at(timeline: Timeline, secs: i64) -> (bool, bool) {
    timeline
        .iter()
        .take_while(|(start, _)| *start <= secs)
        .last()
        .map(|(_, state)| *state)
        .unwrap_or((false, false))
}

fn t(secs: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap() + Duration::seconds(secs)
}

struct MonitoredDoor {
    door: GarageDoor,
    sensors: DoorSensors<Switch, Switch>,
    timeline: Timeline,
    events: EventQueue<128>,
    alarms: Vec<i64>,
}

impl MonitoredDoor {
    fn new(name: &str, timeline: Timeline) -> Self {
        Self {
            door: GarageDoor::new(name, DoorSettings::new(600.0, 1.5, 60.0).unwrap(), t(0)),
            sensors: DoorSensors::new(Switch(Cell::new(false)), Switch(Cell::new(false))),
            timeline,
            events: EventQueue::new(),
            alarms: Vec::new(),
        }
    }
}

fn run_day(doors: &mut [MonitoredDoor], until: i64) {
    let mut engine = Engine::new(EngineSettings::new(1.0, 1).unwrap(), NoDelay);
    for secs in (0..=until).step_by(5) {
        for monitored in doors.iter_mut() {
            let (open, closed) = state_at(monitored.timeline, secs);
            monitored.sensors.open_sensor().0.set(open);
            monitored.sensors.closed_sensor().0.set(closed);
            engine.evaluate(
                &mut monitored.door,
                &monitored.sensors,
                &mut monitored.events,
                t(secs),
            );
            if monitored.door.open_too_long(t(secs), &mut monitored.events) {
                monitored.alarms.push(secs);
            }
        }
    }
}

#[test]
fn test_short_opening_only_logs_transitions() {
    let mut doors = [MonitoredDoor::new("2-Car", TWO_CAR)];
    run_day(&mut doors, 20_000);
    let two_car = &doors[0];

    assert!(two_car.alarms.is_empty());
    assert_eq!(
        two_car.events.transitions(),
        vec![
            (DoorStatus::Unknown, DoorStatus::Closed),
            (DoorStatus::Closed, DoorStatus::Unknown),
            (DoorStatus::Unknown, DoorStatus::Open),
            (DoorStatus::Open, DoorStatus::Unknown),
            (DoorStatus::Unknown, DoorStatus::Closed),
        ]
    );
    assert_eq!(two_car.door.current_status(), DoorStatus::Closed);
    assert_eq!(two_car.door.status_since(), t(3720));
}

#[test]
fn test_long_opening_backs_off() {
    let mut doors = [
        MonitoredDoor::new("2-Car", TWO_CAR),
        MonitoredDoor::new("1-Car", ONE_CAR),
    ];
    run_day(&mut doors, 20_000);
    let one_car = &doors[1];

    // Opened at 14400: thresholds 600, 960, 1500, 2310
    assert_eq!(one_car.alarms, vec![15005, 15965, 17465, 19775]);
    assert_eq!(one_car.door.open_alarm_threshold(), 600.0);
    assert_eq!(one_car.door.last_alarm_at(), Some(t(19775)));

    let alarm_lines: Vec<String> = one_car
        .events
        .trail(Trail::History)
        .filter(|e| matches!(e.kind, EventKind::Alarm { .. }))
        .map(|e| e.to_string())
        .collect();
    assert_eq!(alarm_lines.len(), 4);
    assert_eq!(
        alarm_lines[0],
        "DOOR:1-Car:ALARM:open for 605s, next alarm after 960s"
    );
}
