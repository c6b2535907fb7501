use crate::DEFAULT_BRIDGE_PORT;
use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::panic::Location;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "bridge-config.json";
const CONFIG_VERSION: u32 = 1;

// ============================================
// CONFIG STRUCTS
// ============================================

/// The loopback channel the worker connects back on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Orphan handling: how long the connect-probe waits and how long a prior
/// generation gets to release the port after a shutdown request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanConfig {
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
}

impl OrphanConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl Default for OrphanConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            wait_timeout_ms: default_wait_timeout_ms(),
        }
    }
}

/// How long a worker gets between the polite termination signal and the
/// forced kill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

/// Heartbeat expectations. The worker beats on a fixed interval; the host
/// warns when `stall_multiplier` intervals pass without one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_stall_multiplier")]
    pub stall_multiplier: u32,
}

impl LivenessConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            stall_multiplier: default_stall_multiplier(),
        }
    }
}

/// Worker process settings.
///
/// `command` overrides how the worker is launched (first element is the
/// program, the rest are its leading arguments; port and host PID are
/// appended). When unset the supervisor looks for the worker binary next to
/// the host executable, then on PATH.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub orphan: OrphanConfig,

    #[serde(default)]
    pub shutdown: ShutdownConfig,

    #[serde(default)]
    pub liveness: LivenessConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            channel: ChannelConfig::default(),
            orphan: OrphanConfig::default(),
            shutdown: ShutdownConfig::default(),
            liveness: LivenessConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_port() -> u16 {
    DEFAULT_BRIDGE_PORT
}
fn default_probe_timeout_ms() -> u64 {
    250
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_wait_timeout_ms() -> u64 {
    5_000
}
fn default_grace_period_ms() -> u64 {
    3_000
}
fn default_heartbeat_interval_ms() -> u64 {
    5_000
}
fn default_stall_multiplier() -> u32 {
    3
}

// ============================================
// IMPLEMENTATION
// ============================================

impl BridgeConfig {
    /// Load config from {config_dir}/bridge-config.json.
    ///
    /// # Returns
    ///
    /// Returns `Ok(BridgeConfig)` if loaded successfully or defaults if file missing.
    /// Returns `Err(ConfigError)` if file exists but is corrupted/invalid.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        // Read file
        let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Read {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        // Parse JSON
        let config: BridgeConfig =
            serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            })?;

        // Validate
        config.validate()?;

        info!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Load config, downgrading every failure to defaults.
    ///
    /// A missing file is expected on first launch and stays quiet; a corrupt
    /// or invalid file gets a warning. Either way the bridge starts.
    pub fn load_or_default(config_dir: &Path) -> Self {
        match Self::load(config_dir) {
            Ok(config) => config,
            Err(e) => {
                warn!("Falling back to default bridge config: {e}");
                Self::default()
            }
        }
    }

    /// Save config to {config_dir}/bridge-config.json using atomic write.
    ///
    /// Uses temp file + rename for atomicity (no corruption on crash).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - Directory creation fails
    /// - Serialization fails
    /// - Write fails
    /// - Rename fails
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        // Validate before saving
        self.validate()?;

        // Ensure directory exists
        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{CONFIG_FILE_NAME}.tmp"));

        // Serialize to JSON
        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        // Write to temp file
        std::fs::write(&temp_path, json).map_err(|e| ConfigError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        // Atomic rename (POSIX guarantees atomicity)
        std::fs::rename(&temp_path, &config_path).map_err(|e| ConfigError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Version check
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(ConfigError::Validation {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid version: {} (expected 1-{})",
                    self.version, CONFIG_VERSION
                ),
            });
        }

        if self.channel.port == 0 {
            return Err(ConfigError::Validation {
                location: ErrorLocation::from(Location::caller()),
                reason: "channel.port cannot be 0 (the worker needs a fixed port to connect back)"
                    .to_string(),
            });
        }

        if self.orphan.poll_interval_ms == 0 {
            return Err(ConfigError::Validation {
                location: ErrorLocation::from(Location::caller()),
                reason: "orphan.poll_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.orphan.wait_timeout_ms < self.orphan.poll_interval_ms {
            return Err(ConfigError::Validation {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "orphan.wait_timeout_ms ({}) must be at least poll_interval_ms ({})",
                    self.orphan.wait_timeout_ms, self.orphan.poll_interval_ms
                ),
            });
        }

        if self.shutdown.grace_period_ms == 0 {
            return Err(ConfigError::Validation {
                location: ErrorLocation::from(Location::caller()),
                reason: "shutdown.grace_period_ms must be greater than 0".to_string(),
            });
        }

        if self.liveness.heartbeat_interval_ms == 0 || self.liveness.stall_multiplier == 0 {
            return Err(ConfigError::Validation {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "liveness settings must be greater than 0 (interval: {}, multiplier: {})",
                    self.liveness.heartbeat_interval_ms, self.liveness.stall_multiplier
                ),
            });
        }

        if let Some(ref command) = self.worker.command
            && command.is_empty()
        {
            return Err(ConfigError::Validation {
                location: ErrorLocation::from(Location::caller()),
                reason: "worker.command cannot be an empty list".to_string(),
            });
        }

        Ok(())
    }
}
