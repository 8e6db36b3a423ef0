//! Door status and the sensor decision table.

use core::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum DoorStatus {
    Open,
    Closed,
    /// Neither sensor asserted, usually because the door is moving
    #[default]
    Unknown,
    /// Both sensors asserted at the same time, which points to a wiring fault
    Conflict,
}

impl DoorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Unknown => "unknown",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for DoorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of applying the decision table to a single sensor sample.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Decision {
    Settled(DoorStatus),
    /// No sensor asserted. Needs a re-sample before committing to `Unknown`.
    MidTravel,
}

pub(crate) fn decide(open_sensor: bool, closed_sensor: bool) -> Decision {
    match (open_sensor, closed_sensor) {
        (true, false) => Decision::Settled(DoorStatus::Open),
        (false, true) => Decision::Settled(DoorStatus::Closed),
        (true, true) => Decision::Settled(DoorStatus::Conflict),
        (false, false) => Decision::MidTravel,
    }
}
