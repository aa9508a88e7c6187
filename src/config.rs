use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FitrecConfig {
    pub sensors: SensorConfig,
    pub recorder: RecorderConfig,
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SensorConfig {
    /// Ordered list of position providers to probe ("replay", "simulated")
    #[serde(default = "default_position_providers")]
    pub position_providers: Vec<String>,

    /// Ordered list of motion providers to probe
    #[serde(default = "default_motion_providers")]
    pub motion_providers: Vec<String>,

    /// Ordered list of step-count providers to probe
    #[serde(default = "default_step_providers")]
    pub step_providers: Vec<String>,

    /// Fixture file for the replay position provider (JSON lines)
    pub position_replay_path: Option<String>,

    /// Fixture file for the replay motion provider (JSON lines)
    pub motion_replay_path: Option<String>,

    /// Fixture file for the replay step-count provider (JSON lines)
    pub step_replay_path: Option<String>,

    /// Minimum milliseconds between accepted motion samples
    #[serde(default = "default_motion_throttle_ms")]
    pub motion_throttle_ms: u64,

    /// Timeout for a single position query in seconds
    #[serde(default = "default_position_timeout_secs")]
    pub position_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RecorderConfig {
    /// Fast sampling tick: position pull interval in seconds
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,

    /// Slow summarization tick: flush interval in seconds.
    /// Deployment choice; source history used anything from 1 to 15 minutes.
    #[serde(default = "default_record_interval_secs")]
    pub record_interval_secs: u64,

    /// Cap on buffered speed samples per window
    #[serde(default = "default_speed_buffer_capacity")]
    pub speed_buffer_capacity: usize,

    /// Cap on buffered motion samples per window
    #[serde(default = "default_motion_buffer_capacity")]
    pub motion_buffer_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NotifyConfig {
    /// Decision endpoint URL; notification checks are disabled when unset
    pub endpoint_url: Option<String>,

    /// Minimum seconds between two outbound decision checks
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Timeout for a decision endpoint call in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Milliseconds between consecutive scheduled local notifications
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,
}

impl FitrecConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("fitrec.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("sensors.position_providers", default_position_providers())?
            .set_default("sensors.motion_providers", default_motion_providers())?
            .set_default("sensors.step_providers", default_step_providers())?
            .set_default("sensors.motion_throttle_ms", default_motion_throttle_ms())?
            .set_default(
                "sensors.position_timeout_secs",
                default_position_timeout_secs(),
            )?
            .set_default(
                "recorder.sample_interval_secs",
                default_sample_interval_secs(),
            )?
            .set_default(
                "recorder.record_interval_secs",
                default_record_interval_secs(),
            )?
            .set_default(
                "recorder.speed_buffer_capacity",
                default_speed_buffer_capacity() as i64,
            )?
            .set_default(
                "recorder.motion_buffer_capacity",
                default_motion_buffer_capacity() as i64,
            )?
            .set_default("storage.database_path", default_database_path())?
            .set_default("notify.cooldown_secs", default_cooldown_secs())?
            .set_default(
                "notify.request_timeout_secs",
                default_request_timeout_secs(),
            )?
            .set_default("notify.stagger_ms", default_stagger_ms())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with FITREC_ prefix. The key
            // separator is a double underscore because the leaf keys
            // themselves contain single underscores, e.g.
            // FITREC_STORAGE__DATABASE_PATH -> storage.database_path
            .add_source(
                Environment::with_prefix("FITREC")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: FitrecConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recorder.sample_interval_secs == 0 {
            return Err(ConfigError::Message(
                "Recorder sample_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.recorder.record_interval_secs == 0 {
            return Err(ConfigError::Message(
                "Recorder record_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.recorder.sample_interval_secs > self.recorder.record_interval_secs {
            return Err(ConfigError::Message(
                "Recorder sample_interval_secs must not exceed record_interval_secs".to_string(),
            ));
        }

        if self.recorder.speed_buffer_capacity == 0 {
            return Err(ConfigError::Message(
                "Speed buffer capacity must be greater than 0".to_string(),
            ));
        }

        if self.recorder.motion_buffer_capacity == 0 {
            return Err(ConfigError::Message(
                "Motion buffer capacity must be greater than 0".to_string(),
            ));
        }

        if self.storage.database_path.is_empty() {
            return Err(ConfigError::Message(
                "Storage database_path must not be empty".to_string(),
            ));
        }

        if self.notify.cooldown_secs == 0 {
            return Err(ConfigError::Message(
                "Notify cooldown_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.recorder.sample_interval_secs)
    }

    pub fn record_interval(&self) -> Duration {
        Duration::from_secs(self.recorder.record_interval_secs)
    }

    /// First flush fires early so the store is never empty for long after start
    pub fn warmup_delay(&self) -> Duration {
        std::cmp::min(Duration::from_secs(5), self.record_interval())
    }

    pub fn motion_throttle(&self) -> Duration {
        Duration::from_millis(self.sensors.motion_throttle_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.notify.cooldown_secs)
    }
}

impl Default for FitrecConfig {
    fn default() -> Self {
        Self {
            sensors: SensorConfig {
                position_providers: default_position_providers(),
                motion_providers: default_motion_providers(),
                step_providers: default_step_providers(),
                position_replay_path: None,
                motion_replay_path: None,
                step_replay_path: None,
                motion_throttle_ms: default_motion_throttle_ms(),
                position_timeout_secs: default_position_timeout_secs(),
            },
            recorder: RecorderConfig {
                sample_interval_secs: default_sample_interval_secs(),
                record_interval_secs: default_record_interval_secs(),
                speed_buffer_capacity: default_speed_buffer_capacity(),
                motion_buffer_capacity: default_motion_buffer_capacity(),
            },
            storage: StorageConfig {
                database_path: default_database_path(),
            },
            notify: NotifyConfig {
                endpoint_url: None,
                cooldown_secs: default_cooldown_secs(),
                request_timeout_secs: default_request_timeout_secs(),
                stagger_ms: default_stagger_ms(),
            },
        }
    }
}

// Default value functions
fn default_position_providers() -> Vec<String> {
    vec!["replay".to_string(), "simulated".to_string()]
}
fn default_motion_providers() -> Vec<String> {
    vec!["replay".to_string(), "simulated".to_string()]
}
fn default_step_providers() -> Vec<String> {
    vec!["replay".to_string(), "simulated".to_string()]
}
fn default_motion_throttle_ms() -> u64 {
    200
}
fn default_position_timeout_secs() -> u64 {
    3
}

fn default_sample_interval_secs() -> u64 {
    5
}
fn default_record_interval_secs() -> u64 {
    60
}
fn default_speed_buffer_capacity() -> usize {
    120
}
fn default_motion_buffer_capacity() -> usize {
    600
}

fn default_database_path() -> String {
    "./fitrec.sqlite".to_string()
}

fn default_cooldown_secs() -> u64 {
    300
}
fn default_request_timeout_secs() -> u64 {
    5
}
fn default_stagger_ms() -> u64 {
    250
}

/// Annotated template emitted by `--print-config`. A round-trip test keeps
/// it in sync with the `default_*` functions above.
pub const DEFAULT_CONFIG_TOML: &str = r#"[sensors]
# Ordered provider probe lists; the first provider that initializes wins
position_providers = ["replay", "simulated"]
motion_providers = ["replay", "simulated"]
step_providers = ["replay", "simulated"]
# Fixture files for the replay providers (JSON lines)
# position_replay_path = "./fixtures/position.jsonl"
# motion_replay_path = "./fixtures/motion.jsonl"
# step_replay_path = "./fixtures/steps.jsonl"
# Minimum milliseconds between accepted motion samples
motion_throttle_ms = 200
# Timeout for a single position query in seconds
position_timeout_secs = 3

[recorder]
# Fast sampling tick: position pull interval in seconds
sample_interval_secs = 5
# Slow summarization tick: flush interval in seconds (deployment choice)
record_interval_secs = 60
# Caps on buffered samples per window
speed_buffer_capacity = 120
motion_buffer_capacity = 600

[storage]
# Path to the SQLite database file
database_path = "./fitrec.sqlite"

[notify]
# Decision endpoint URL; notification checks are disabled when unset
# endpoint_url = "http://127.0.0.1:3000/notify"
# Minimum seconds between two outbound decision checks
cooldown_secs = 300
# Timeout for a decision endpoint call in seconds
request_timeout_secs = 5
# Milliseconds between consecutive scheduled local notifications
stagger_ms = 250
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FitrecConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recorder.sample_interval_secs, 5);
        assert_eq!(config.recorder.speed_buffer_capacity, 120);
        assert_eq!(config.recorder.motion_buffer_capacity, 600);
        assert_eq!(config.notify.cooldown_secs, 300);
    }

    #[test]
    fn test_config_validation() {
        let mut config = FitrecConfig::default();

        config.recorder.record_interval_secs = 0;
        assert!(config.validate().is_err());

        config.recorder.record_interval_secs = 60;
        assert!(config.validate().is_ok());

        // Fast tick slower than the flush tick makes no sense
        config.recorder.sample_interval_secs = 120;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_applies() {
        std::env::set_var("FITREC_STORAGE__DATABASE_PATH", "/tmp/env-override.sqlite");
        std::env::set_var("FITREC_NOTIFY__COOLDOWN_SECS", "120");

        let config = FitrecConfig::load_from_file("no-such-file.toml").unwrap();

        std::env::remove_var("FITREC_STORAGE__DATABASE_PATH");
        std::env::remove_var("FITREC_NOTIFY__COOLDOWN_SECS");

        assert_eq!(config.storage.database_path, "/tmp/env-override.sqlite");
        assert_eq!(config.notify.cooldown_secs, 120);
    }

    #[test]
    fn test_config_template_matches_defaults() {
        let parsed: FitrecConfig = Config::builder()
            .add_source(File::from_str(
                DEFAULT_CONFIG_TOML,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(parsed, FitrecConfig::default());
    }

    #[test]
    fn test_warmup_delay_capped_by_record_interval() {
        let mut config = FitrecConfig::default();
        assert_eq!(config.warmup_delay(), Duration::from_secs(5));

        config.recorder.record_interval_secs = 2;
        config.recorder.sample_interval_secs = 1;
        assert_eq!(config.warmup_delay(), Duration::from_secs(2));
    }
}
