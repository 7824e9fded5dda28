//! # Error Types
//!
//! Custom error types for Cockpit Bridge using `thiserror`.
//!
//! Errors are split into two classes. *Soft* errors describe conditions the
//! main loop recovers from by logging and trying again on the next cycle
//! (simulator not running, a serial write failing, a datagram that could not
//! be sent). Everything else is *fatal* and aborts startup.

use thiserror::Error;

/// Main error type for Cockpit Bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// Configuration parsed but failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Keymap definition file could not be read
    #[error("Failed to load keymap {path}: {source}")]
    Keymap {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Operating mode outside the supported set
    #[error("Invalid mode '{0}': expected DCS or BMS")]
    InvalidMode(String),

    /// Serial port could not be opened
    #[error("Failed to open serial port {port}: {reason}")]
    SerialOpen { port: String, reason: String },

    /// Serial read/write failure on an open channel
    #[error("Serial error: {0}")]
    Serial(String),

    /// No hardware channel registered under the given name
    #[error("Unknown hardware channel: {0}")]
    UnknownChannel(String),

    /// Telemetry region absent or truncated
    #[error("Telemetry unavailable: {0}")]
    TelemetryUnavailable(String),

    /// UDP socket failure
    #[error("Network error: {0}")]
    Network(String),

    /// Key or axis injection backend failure
    #[error("Input injection error: {0}")]
    Injection(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns `true` for conditions the main loop logs and retries.
    #[must_use]
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::Serial(_)
                | Self::UnknownChannel(_)
                | Self::TelemetryUnavailable(_)
                | Self::Network(_)
                | Self::Injection(_)
        )
    }
}

/// Result type alias for Cockpit Bridge
pub type Result<T> = std::result::Result<T, BridgeError>;
