//! The door sensors that can detect whether the door is open or closed.

use core::convert::Infallible;

use embedded_hal::digital::v2::InputPin;

/// Which end of the door travel a sensor is mounted at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SensorPosition {
    Open,
    Closed,
}

/// A single sample of one position sensor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SensorReading {
    pub position: SensorPosition,
    /// Whether the contact is closed, i.e. the door is at this sensor
    pub asserted: bool,
}

/// Anything that can report whether a position contact is currently closed.
///
/// Sensors always return a value. Backends that can fail (e.g. file based
/// GPIO access) must decide on a reading themselves.
pub trait ContactSensor {
    fn is_asserted(&self) -> bool;
}

impl<S: ContactSensor + ?Sized> ContactSensor for &S {
    fn is_asserted(&self) -> bool {
        (**self).is_asserted()
    }
}

impl<S: ContactSensor + ?Sized> ContactSensor for Box<S> {
    fn is_asserted(&self) -> bool {
        (**self).is_asserted()
    }
}

/// A digital input pin wired to a reed switch.
pub struct ContactInput<P> {
    pin: P,
    active_low: bool,
}

impl<P> ContactInput<P>
where
    P: InputPin<Error = Infallible>,
{
    /// A switch connected with a pull-up resistor: triggering the switch
    /// results in a low input.
    pub fn pull_up(pin: P) -> Self {
        Self {
            pin,
            active_low: true,
        }
    }

    /// A switch that drives the input high when triggered.
    pub fn active_high(pin: P) -> Self {
        Self {
            pin,
            active_low: false,
        }
    }

    pub fn new(pin: P, active_low: bool) -> Self {
        Self { pin, active_low }
    }
}

impl<P> ContactSensor for ContactInput<P>
where
    P: InputPin<Error = Infallible>,
{
    fn is_asserted(&self) -> bool {
        let level = if self.active_low {
            self.pin.is_low()
        } else {
            self.pin.is_high()
        };
        match level {
            Ok(asserted) => asserted,
            Err(never) => match never {},
        }
    }
}

/// The open/closed sensor pair of one door.
pub struct DoorSensors<O, C> {
    switch_open: O,
    switch_closed: C,
}

impl<O, C> DoorSensors<O, C>
where
    O: ContactSensor,
    C: ContactSensor,
{
    pub fn new(switch_open: O, switch_closed: C) -> Self {
        Self {
            switch_open,
            switch_closed,
        }
    }

    pub fn open_sensor(&self) -> &O {
        &self.switch_open
    }

    pub fn closed_sensor(&self) -> &C {
        &self.switch_closed
    }

    /// Sample both sensors, open sensor first.
    pub fn query(&self) -> (SensorReading, SensorReading) {
        (
            SensorReading {
                position: SensorPosition::Open,
                asserted: self.switch_open.is_asserted(),
            },
            SensorReading {
                position: SensorPosition::Closed,
                asserted: self.switch_closed.is_asserted(),
            },
        )
    }
}
