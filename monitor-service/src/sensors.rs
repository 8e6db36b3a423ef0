//! Sensor backends.
//!
//! Doors are either read from Linux sysfs GPIO value files or replayed from
//! a CSV recording of sensor values.

use std::{
    collections::HashMap,
    convert::Infallible,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
    time::Instant,
};

use anyhow::{bail, Context};
use door_engine::{ContactInput, ContactSensor, DoorSensors};
use embedded_hal::digital::v2::InputPin;
use tracing::warn;

use crate::config::{Config, DoorConfig, Sensors};

pub type BoxedSensors = DoorSensors<Box<dyn ContactSensor>, Box<dyn ContactSensor>>;

/// Input pin exported through `/sys/class/gpio`.
pub struct SysfsPin {
    value_path: PathBuf,
    /// Level reported when the value file cannot be read
    idle_high: bool,
}

impl SysfsPin {
    /// `idle_high` should match the level of a released switch, so a read
    /// failure never looks like contact.
    pub fn new(root: &Path, number: u32, idle_high: bool) -> Self {
        Self {
            value_path: root.join(format!("gpio{}", number)).join("value"),
            idle_high,
        }
    }

    fn read_high(&self) -> bool {
        match fs::read_to_string(&self.value_path) {
            Ok(value) => value.trim() == "1",
            Err(e) => {
                warn!("Could not read GPIO value from {:?}: {}", self.value_path, e);
                self.idle_high
            }
        }
    }
}

impl InputPin for SysfsPin {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Self::Error> {
        Ok(self.read_high())
    }

    fn is_low(&self) -> Result<bool, Self::Error> {
        Ok(!self.read_high())
    }
}

/// Sensor values recorded over time.
///
/// The CSV header is `seconds_from_start` followed by one column per sensor,
/// named `<door>_open` or `<door>_closed`.
#[derive(Debug)]
pub struct ReplayTable {
    columns: HashMap<String, usize>,
    /// Rows sorted by their start offset in seconds
    rows: Vec<(f64, Vec<bool>)>,
}

fn parse_value(value: &str) -> Option<bool> {
    match value {
        "true" | "True" => Some(true),
        "false" | "False" => Some(false),
        other => other.parse::<f64>().ok().map(|v| v != 0.0),
    }
}

impl ReplayTable {
    pub fn parse(csv: &str) -> anyhow::Result<Self> {
        let mut lines = csv.lines().filter(|line| !line.trim().is_empty());
        let header = lines.next().context("Replay file is empty")?;
        let mut names = header.split(',').map(str::trim);
        if names.next() != Some("seconds_from_start") {
            bail!("Replay file must start with a seconds_from_start column");
        }
        let columns: HashMap<String, usize> = names
            .enumerate()
            .map(|(index, name)| (name.to_string(), index))
            .collect();

        let mut rows = Vec::new();
        for (number, line) in lines.enumerate() {
            let mut fields = line.split(',').map(str::trim);
            let offset: f64 = fields
                .next()
                .unwrap_or_default()
                .parse()
                .context(format!("Invalid offset in replay row {}", number + 1))?;
            let values = fields
                .map(parse_value)
                .collect::<Option<Vec<bool>>>()
                .context(format!("Invalid sensor value in replay row {}", number + 1))?;
            if values.len() != columns.len() {
                bail!(
                    "Replay row {} has {} values, expected {}",
                    number + 1,
                    values.len(),
                    columns.len()
                );
            }
            rows.push((offset, values));
        }
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { columns, rows })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read replay file at {:?}", path))?;
        Self::parse(&contents).context(format!("Failed to parse replay file at {:?}", path))
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.get(name).copied()
    }

    /// Value of a column at `elapsed` seconds: the last row starting at or
    /// before that time. Nothing is asserted before the first row.
    pub fn value_at(&self, column: usize, elapsed: f64) -> bool {
        self.rows
            .iter()
            .take_while(|(offset, _)| *offset <= elapsed)
            .last()
            .map(|(_, values)| values[column])
            .unwrap_or(false)
    }
}

/// A single replayed sensor, advancing with wall-clock time.
pub struct ReplayInput {
    table: Rc<ReplayTable>,
    column: usize,
    started: Instant,
}

impl ContactSensor for ReplayInput {
    fn is_asserted(&self) -> bool {
        self.table
            .value_at(self.column, self.started.elapsed().as_secs_f64())
    }
}

fn sysfs_input(root: &Path, pin: u32, active_low: bool) -> Box<dyn ContactSensor> {
    Box::new(ContactInput::new(
        SysfsPin::new(root, pin, active_low),
        active_low,
    ))
}

fn replay_input(
    table: &Rc<ReplayTable>,
    door: &DoorConfig,
    sensor: &str,
    started: Instant,
) -> anyhow::Result<Box<dyn ContactSensor>> {
    let name = format!("{}_{}", door.name, sensor);
    let column = table
        .column(&name)
        .context(format!("Replay file has no column {:?}", name))?;
    Ok(Box::new(ReplayInput {
        table: Rc::clone(table),
        column,
        started,
    }))
}

/// Set up the sensor pair of every configured door, in config order.
pub fn build(config: &Config, started: Instant) -> anyhow::Result<Vec<BoxedSensors>> {
    match &config.sensors {
        Sensors::Sysfs { root } => Ok(config
            .doors
            .iter()
            .map(|door| {
                DoorSensors::new(
                    sysfs_input(root, door.open_pin, door.active_low),
                    sysfs_input(root, door.closed_pin, door.active_low),
                )
            })
            .collect()),
        Sensors::Replay { file } => {
            let table = Rc::new(ReplayTable::load(file)?);
            config
                .doors
                .iter()
                .map(|door| -> anyhow::Result<BoxedSensors> {
                    Ok(DoorSensors::new(
                        replay_input(&table, door, "open", started)?,
                        replay_input(&table, door, "closed", started)?,
                    ))
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDING: &str = "\
seconds_from_start,2-Car_open,2-Car_closed,1-Car_open,1-Car_closed
0,0,1,0,1
30,0,0,0,1
40,1,0,0,1.0
120,0,1,true,false
";

    #[test]
    fn test_replay_lookup() {
        let table = ReplayTable::parse(RECORDING).unwrap();
        let open = table.column("2-Car_open").unwrap();
        let closed = table.column("2-Car_closed").unwrap();

        assert!(!table.value_at(open, 0.0));
        assert!(table.value_at(closed, 0.0));
        assert!(table.value_at(closed, 29.9));
        assert!(!table.value_at(closed, 30.0));
        assert!(table.value_at(open, 45.0));
        assert!(table.value_at(closed, 1000.0));

        let one_car_open = table.column("1-Car_open").unwrap();
        assert!(table.value_at(one_car_open, 120.0));
    }

    #[test]
    fn test_shipped_recording() {
        let table = ReplayTable::parse(include_str!("../replay/door_input.csv")).unwrap();
        for name in ["2-Car_open", "2-Car_closed", "1-Car_open", "1-Car_closed"] {
            assert!(table.column(name).is_some(), "missing column {}", name);
        }
        let one_car_open = table.column("1-Car_open").unwrap();
        let one_car_closed = table.column("1-Car_closed").unwrap();
        assert!(table.value_at(one_car_open, 1000.0));
        assert!(table.value_at(one_car_closed, 1000.0));
    }

    #[test]
    fn test_replay_before_first_row() {
        let table = ReplayTable::parse("seconds_from_start,a_open\n10,1\n").unwrap();
        assert!(!table.value_at(0, 5.0));
        assert!(table.value_at(0, 10.0));
    }

    #[test]
    fn test_replay_unsorted_rows() {
        let table = ReplayTable::parse("seconds_from_start,a_open\n20,0\n10,1\n").unwrap();
        assert!(table.value_at(0, 15.0));
        assert!(!table.value_at(0, 25.0));
    }

    #[test]
    fn test_replay_rejects_bad_input() {
        assert!(ReplayTable::parse("").is_err());
        assert!(ReplayTable::parse("time,a_open\n0,1\n").is_err());
        assert!(ReplayTable::parse("seconds_from_start,a_open\n0,maybe\n").is_err());
        assert!(ReplayTable::parse("seconds_from_start,a_open\n0,1,1\n").is_err());
    }

    #[test]
    fn test_sysfs_pin() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("gpio17")).unwrap();
        fs::write(root.join("gpio17").join("value"), "0\n").unwrap();

        // Pull-up switch reads low when the door is at the sensor
        let contact = sysfs_input(root, 17, true);
        assert!(contact.is_asserted());
        fs::write(root.join("gpio17").join("value"), "1\n").unwrap();
        assert!(!contact.is_asserted());

        // Missing pin reads as a released switch
        assert!(!sysfs_input(root, 99, true).is_asserted());
        assert!(!sysfs_input(root, 99, false).is_asserted());
    }
}
