//! # Configuration Module
//!
//! Handles loading and validating configuration from JSON files.
//!
//! Only the list of serial endpoints is required. Every other section falls
//! back to defaults that reproduce a single-DED cockpit with the stock
//! DCS-BIOS network settings.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, Result};
use crate::router::axis::Axis;
use crate::telemetry::DED_LINE_COUNT;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Serial endpoints, one per microcontroller
    #[serde(rename = "arduinos")]
    pub endpoints: Vec<SerialEndpoint>,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub keymap: KeymapConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub shared_memory: SharedMemoryConfig,

    #[serde(default = "default_loop_interval_ms")]
    pub loop_interval_ms: u64,
}

/// A named serial endpoint
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SerialEndpoint {
    pub name: String,

    #[serde(rename = "com_port")]
    pub port: String,

    pub baud_rate: u32,
}

/// DED mirroring configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    /// Name of the endpoint that drives the display
    #[serde(default = "default_display_channel")]
    pub channel: String,

    /// Number of DED lines forwarded to the display
    #[serde(default = "default_line_count")]
    pub line_count: usize,
}

/// Keyboard and axis translation configuration
#[derive(Debug, Deserialize, Clone)]
pub struct KeymapConfig {
    /// BMS key file
    #[serde(default = "default_keymap_path")]
    pub path: PathBuf,

    /// Panel token -> key file callback. An empty callback suppresses the token.
    #[serde(default = "default_aliases")]
    pub aliases: HashMap<String, String>,

    /// Panel potentiometer name -> virtual joystick axis
    #[serde(default = "default_axes")]
    pub axes: HashMap<String, Axis>,
}

/// DCS-BIOS network configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    #[serde(default = "default_multicast_group")]
    pub multicast_group: Ipv4Addr,

    #[serde(default = "default_multicast_port")]
    pub port: u16,

    /// Where simulator-bound commands are sent
    #[serde(default = "default_command_address")]
    pub command_address: SocketAddr,
}

/// Shared memory configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SharedMemoryConfig {
    /// Directory holding the named shared memory regions
    #[serde(default = "default_shared_memory_dir")]
    pub directory: PathBuf,
}

// Default value functions
fn default_loop_interval_ms() -> u64 { 5 }

fn default_display_channel() -> String { "DED".to_string() }
fn default_line_count() -> usize { 2 }

fn default_keymap_path() -> PathBuf { PathBuf::from("keyfile.txt") }
fn default_aliases() -> HashMap<String, String> {
    HashMap::from([
        ("ICP_BTN_6 1".to_string(), "SimICPStpt".to_string()),
        ("ICP_BTN_6 0".to_string(), String::new()),
    ])
}
fn default_axes() -> HashMap<String, Axis> {
    HashMap::from([("ICP_HUD_BRT_KNB".to_string(), Axis::X)])
}

fn default_multicast_group() -> Ipv4Addr { Ipv4Addr::new(239, 255, 50, 10) }
fn default_multicast_port() -> u16 { 5010 }
fn default_command_address() -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], 7778)) }

fn default_shared_memory_dir() -> PathBuf { PathBuf::from("/dev/shm") }

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            channel: default_display_channel(),
            line_count: default_line_count(),
        }
    }
}

impl Default for KeymapConfig {
    fn default() -> Self {
        Self {
            path: default_keymap_path(),
            aliases: default_aliases(),
            axes: default_axes(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            multicast_group: default_multicast_group(),
            port: default_multicast_port(),
            command_address: default_command_address(),
        }
    }
}

impl Default for SharedMemoryConfig {
    fn default() -> Self {
        Self {
            directory: default_shared_memory_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - JSON parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cockpit_bridge::config::Config;
    ///
    /// let config = Config::load("config.json")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Look up an endpoint by name
    pub fn endpoint(&self, name: &str) -> Option<&SerialEndpoint> {
        self.endpoints.iter().find(|endpoint| endpoint.name == name)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(invalid("at least one serial endpoint is required"));
        }

        let mut names = HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.name.is_empty() {
                return Err(invalid("endpoint name cannot be empty"));
            }
            if endpoint.port.is_empty() {
                return Err(invalid(format!("endpoint '{}' has an empty com_port", endpoint.name)));
            }
            if endpoint.baud_rate == 0 {
                return Err(invalid(format!("endpoint '{}' has a zero baud_rate", endpoint.name)));
            }
            if !names.insert(endpoint.name.as_str()) {
                return Err(invalid(format!("duplicate endpoint name '{}'", endpoint.name)));
            }
        }

        if self.endpoint(&self.display.channel).is_none() {
            return Err(invalid(format!(
                "display channel '{}' does not match any endpoint",
                self.display.channel
            )));
        }

        if self.display.line_count == 0 || self.display.line_count > DED_LINE_COUNT {
            return Err(invalid(format!(
                "line_count must be between 1 and {}",
                DED_LINE_COUNT
            )));
        }

        if self.loop_interval_ms == 0 || self.loop_interval_ms > 1000 {
            return Err(invalid("loop_interval_ms must be between 1 and 1000"));
        }

        if self.keymap.path.as_os_str().is_empty() {
            return Err(invalid("keymap path cannot be empty"));
        }

        if self.network.port == 0 {
            return Err(invalid("network port must be greater than 0"));
        }

        if !self.network.multicast_group.is_multicast() {
            return Err(invalid(format!(
                "{} is not a multicast address",
                self.network.multicast_group
            )));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> BridgeError {
    BridgeError::InvalidConfig(message.into())
}
