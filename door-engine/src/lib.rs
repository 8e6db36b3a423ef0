//! Garage door state engine.
//!
//! Infers the position of a door from two reed switches (one at the open
//! end position, one at the closed end position) and decides when a door
//! has been open long enough to notify someone.

mod alarm;
pub mod door;
pub mod door_sensors;
pub mod events;
pub mod settings;
pub mod status;

pub use door::{Engine, GarageDoor};
pub use door_sensors::{ContactInput, ContactSensor, DoorSensors, SensorPosition, SensorReading};
pub use events::{DoorEvent, EventKind, EventQueue, EventSink, Trail};
pub use settings::{DoorSettings, EngineSettings, SettingsError};
pub use status::DoorStatus;

/// Point in time used for all status and alarm bookkeeping.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
