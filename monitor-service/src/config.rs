use std::{
    collections::HashSet,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    str::FromStr,
    time::{Duration, SystemTime},
};

use anyhow::{bail, Context};
use data_encoding::HEXLOWER_PERMISSIVE;
use door_engine::{DoorSettings, EngineSettings};
use serde::{Deserialize, Serialize};
use threema_gateway::SecretKey;

fn default_loop_delay() -> f64 {
    5.0
}

fn default_midstate_delay() -> f64 {
    1.0
}

fn default_settle_attempts() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_gpio_root() -> PathBuf {
    PathBuf::from("/sys/class/gpio")
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct RawConfig {
    /// Seconds between two polls of all doors.
    #[serde(default = "default_loop_delay")]
    pub loop_delay: f64,

    /// Seconds to wait before re-sampling a door with no sensor asserted.
    #[serde(default = "default_midstate_delay")]
    pub door_midstate_reevaluation_delay: f64,

    /// How many times a door with no sensor asserted is re-sampled.
    #[serde(default = "default_settle_attempts")]
    pub max_settle_attempts: u8,

    /// Send a notification when both sensors of a door report contact.
    #[serde(default = "default_true")]
    pub notify_on_conflict: bool,

    #[serde(default)]
    pub logging: Logging,

    pub sensors: Sensors,

    pub doors: Vec<RawDoor>,

    pub threema: Option<RawThreema>,
}

impl RawConfig {
    /// Parse the config file at the specified path.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file at {:?}", path))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .context("Failed to read config file to string")?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn example() -> Self {
        Self {
            loop_delay: default_loop_delay(),
            door_midstate_reevaluation_delay: default_midstate_delay(),
            max_settle_attempts: default_settle_attempts(),
            notify_on_conflict: true,
            logging: Logging {
                filter: default_log_filter(),
                history_file: Some(PathBuf::from_str("log/history.log").unwrap()),
            },
            sensors: Sensors::Sysfs {
                root: default_gpio_root(),
            },
            doors: vec![
                RawDoor {
                    name: "2-Car".to_string(),
                    open_pin: 17,
                    closed_pin: 27,
                    active_low: true,
                    open: RawOpenAlarm {
                        time_limit: 600.0,
                        alarm_growth_multiplier: 1.5,
                        alarm_growth_additive: 60.0,
                    },
                },
                RawDoor {
                    name: "1-Car".to_string(),
                    open_pin: 22,
                    closed_pin: 23,
                    active_low: true,
                    open: RawOpenAlarm {
                        time_limit: 900.0,
                        alarm_growth_multiplier: 2.0,
                        alarm_growth_additive: 0.0,
                    },
                },
            ],
            threema: Some(RawThreema {
                gateway_id: "*YOUR_ID".to_string(),
                gateway_secret: "your-gateway-secret".to_string(),
                private_key: "00112233..CCDDEEFF".to_string(),
                recipients: vec!["AAAAAAAA".to_string(), "BBBBBBBB".to_string()],
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Logging {
    /// Log filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// File the door history trail is appended to.
    pub history_file: Option<PathBuf>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            history_file: None,
        }
    }
}

/// Where sensor values come from.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum Sensors {
    /// Linux sysfs GPIO value files
    Sysfs {
        #[serde(default = "default_gpio_root")]
        root: PathBuf,
    },
    /// Recorded sensor values from a CSV file
    Replay { file: PathBuf },
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct RawDoor {
    /// Door name, used in log lines and notifications
    pub name: String,

    /// GPIO number of the sensor at the open end position
    pub open_pin: u32,

    /// GPIO number of the sensor at the closed end position
    pub closed_pin: u32,

    /// Switches pull the input low when triggered
    #[serde(default = "default_true")]
    pub active_low: bool,

    pub open: RawOpenAlarm,
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct RawOpenAlarm {
    /// Seconds the door may stay open before the first alarm
    pub time_limit: f64,

    /// Factor the alarm threshold is multiplied with after each alarm
    pub alarm_growth_multiplier: f64,

    /// Seconds added to the alarm threshold after each alarm
    pub alarm_growth_additive: f64,
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct RawThreema {
    /// Gateway ID (8 characters)
    pub gateway_id: String,

    /// Gateway secret (from the Gateway website)
    pub gateway_secret: String,

    /// Private key (32 bytes as lowercase hex string)
    pub private_key: String,

    /// List of recipients (Threema IDs)
    pub recipients: Vec<String>,
}

#[derive(Debug)]
pub struct Config {
    pub loop_delay: Duration,
    pub engine: EngineSettings,
    pub notify_on_conflict: bool,
    pub logging: Logging,
    pub sensors: Sensors,
    pub doors: Vec<DoorConfig>,
    pub threema: Option<Threema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoorConfig {
    pub name: String,
    pub open_pin: u32,
    pub closed_pin: u32,
    pub active_low: bool,
    pub settings: DoorSettings,
}

#[derive(Debug)]
pub struct Threema {
    /// Gateway ID (8 characters)
    pub gateway_id: String,

    /// Gateway secret (from the Gateway website)
    pub gateway_secret: String,

    /// Private key
    pub private_key: SecretKey,

    /// List of recipients (Threema IDs)
    pub recipients: Vec<String>,
}

impl TryFrom<RawConfig> for Config {
    type Error = anyhow::Error;

    fn try_from(raw_config: RawConfig) -> Result<Self, Self::Error> {
        let loop_delay = match Duration::try_from_secs_f64(raw_config.loop_delay) {
            Ok(delay) if !delay.is_zero() => delay,
            _ => bail!(
                "loop_delay must be a positive number of seconds, got {}",
                raw_config.loop_delay
            ),
        };
        let engine = EngineSettings::new(
            raw_config.door_midstate_reevaluation_delay,
            raw_config.max_settle_attempts,
        )
        .context("Invalid door re-evaluation settings")?;

        // Validate doors
        if raw_config.doors.is_empty() {
            bail!("At least one door must be configured");
        }
        let mut names = HashSet::new();
        let mut doors = Vec::with_capacity(raw_config.doors.len());
        for raw_door in raw_config.doors {
            if !names.insert(raw_door.name.clone()) {
                bail!("Door {:?} is configured more than once", raw_door.name);
            }
            let settings = DoorSettings::new(
                raw_door.open.time_limit,
                raw_door.open.alarm_growth_multiplier,
                raw_door.open.alarm_growth_additive,
            )
            .context(format!("Invalid open alarm settings for door {:?}", raw_door.name))?;
            doors.push(DoorConfig {
                name: raw_door.name,
                open_pin: raw_door.open_pin,
                closed_pin: raw_door.closed_pin,
                active_low: raw_door.active_low,
                settings,
            });
        }

        // Validate RawThreema config
        let threema = match raw_config.threema {
            Some(raw_threema) => {
                let private_key = SecretKey::from_slice(
                    HEXLOWER_PERMISSIVE
                        .decode(raw_threema.private_key.as_bytes())
                        .context("Could not decode Threema private key hex string")?
                        .as_ref(),
                )
                .ok_or(anyhow::anyhow!("Invalid Threema private key"))?;
                Some(Threema {
                    gateway_id: raw_threema.gateway_id,
                    gateway_secret: raw_threema.gateway_secret,
                    private_key,
                    recipients: raw_threema.recipients,
                })
            }
            None => None,
        };

        Ok(Config {
            loop_delay,
            engine,
            notify_on_conflict: raw_config.notify_on_conflict,
            logging: raw_config.logging,
            sensors: raw_config.sensors,
            doors,
            threema,
        })
    }
}

/// Loads the config file and validates it.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    RawConfig::load(path)?.try_into()
}

/// Detects modifications of the config file between poll cycles.
pub struct ConfigWatcher {
    path: PathBuf,
    modified: Option<SystemTime>,
}

impl ConfigWatcher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            modified: Self::modification_time(path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn modification_time(path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
    }

    /// Whether the file changed since the last call.
    pub fn changed(&mut self) -> bool {
        let modified = Self::modification_time(&self.path);
        if modified.is_some() && modified != self.modified {
            self.modified = modified;
            true
        } else {
            false
        }
    }
}
