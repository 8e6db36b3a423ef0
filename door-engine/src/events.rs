//! Door events and the sinks they are reported to.

use core::fmt;

use heapless::spsc::Queue;

use crate::{status::DoorStatus, Timestamp};

/// Something noteworthy that happened to a door.
#[derive(Debug, Clone, PartialEq)]
pub struct DoorEvent {
    pub door: String,
    pub at: Timestamp,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// The door status changed
    Transition { from: DoorStatus, to: DoorStatus },
    /// Both sensors are asserted. Reported on every evaluation.
    Conflict,
    /// No sensor asserted, waiting for the door to finish moving
    Settling { attempt: u8 },
    /// The door has been open too long and a notification is due
    Alarm {
        dwell_secs: i64,
        next_threshold_secs: f64,
    },
}

impl DoorEvent {
    pub fn new(door: &str, at: Timestamp, kind: EventKind) -> Self {
        Self {
            door: door.to_string(),
            at,
            kind,
        }
    }

    pub fn is_transition(&self) -> bool {
        matches!(self.kind, EventKind::Transition { .. })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transition { from, to } => write!(f, "TRANSITION:{}->{}", from, to),
            Self::Conflict => f.write_str("CONFLICT:both sensors asserted"),
            Self::Settling { attempt } => write!(f, "SETTLING:attempt {}", attempt),
            Self::Alarm {
                dwell_secs,
                next_threshold_secs,
            } => write!(
                f,
                "ALARM:open for {}s, next alarm after {:.0}s",
                dwell_secs, next_threshold_secs
            ),
        }
    }
}

/// Renders as `DOOR:<name>:<event>`.
impl fmt::Display for DoorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DOOR:{}:{}", self.door, self.kind)
    }
}

/// Receiver for door events.
///
/// The debug trail gets diagnostic detail, the history trail gets status
/// transitions and alarms.
pub trait EventSink {
    fn debug(&mut self, event: &DoorEvent);
    fn history(&mut self, event: &DoorEvent);
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn debug(&mut self, event: &DoorEvent) {
        (**self).debug(event)
    }

    fn history(&mut self, event: &DoorEvent) {
        (**self).history(event)
    }
}

/// Which trail an event was reported to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Trail {
    Debug,
    History,
}

/// In-memory sink that keeps the most recent events.
///
/// Holds at most `N - 1` entries. When full, the oldest entry is dropped.
pub struct EventQueue<const N: usize> {
    queue: Queue<(Trail, DoorEvent), N>,
}

impl<const N: usize> EventQueue<N> {
    pub fn new() -> Self {
        Self {
            queue: Queue::new(),
        }
    }

    fn push(&mut self, trail: Trail, event: &DoorEvent) {
        match self.queue.enqueue((trail, event.clone())) {
            Ok(()) => { /* Enqueued */ }
            Err(entry) => {
                // Queue full, drop the oldest value and try again
                self.queue.dequeue();
                self.queue.enqueue(entry).ok();
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Trail, DoorEvent)> {
        self.queue.iter()
    }

    /// Events reported to the given trail, oldest first.
    pub fn trail(&self, trail: Trail) -> impl Iterator<Item = &DoorEvent> {
        self.queue
            .iter()
            .filter(move |(t, _)| *t == trail)
            .map(|(_, event)| event)
    }

    /// All transition events of the history trail.
    pub fn transitions(&self) -> Vec<(DoorStatus, DoorStatus)> {
        self.trail(Trail::History)
            .filter_map(|event| match event.kind {
                EventKind::Transition { from, to } => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        while self.queue.dequeue().is_some() {}
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> EventSink for EventQueue<N> {
    fn debug(&mut self, event: &DoorEvent) {
        self.push(Trail::Debug, event);
    }

    fn history(&mut self, event: &DoorEvent) {
        self.push(Trail::History, event);
    }
}
