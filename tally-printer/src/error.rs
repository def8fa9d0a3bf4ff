//! Error types for the printer library

use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// No built-in capability profile with this name
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// The active profile does not support the requested instruction
    #[error("Feature '{feature}' is not supported by profile '{profile}'")]
    UnsupportedFeature { feature: String, profile: String },

    /// Barcode content violates the symbology's character set or length
    #[error("Invalid barcode content: {0}")]
    InvalidBarcodeContent(String),

    /// Payload does not fit in a single protocol frame
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    /// Image exceeds the profile's printable area
    #[error("Image too large: {width}x{height} dots (max {max_width}x{max_height})")]
    ImageTooLarge {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    /// Session was used after `end()` or `close()`
    #[error("Session is closed")]
    SessionClosed,

    /// Instruction parameter out of its documented range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// IO error from a connector
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown connector kind in a `ConnectorSpec::ByName`
    #[error("Connector not found: {0}")]
    ConnectorNotFound(String),

    /// Network connection error
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for printer
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid printer or session configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Image file could not be decoded
    #[error("Image error: {0}")]
    Image(String),
}

impl PrintError {
    pub(crate) fn unsupported(feature: impl std::fmt::Display, profile: &str) -> Self {
        Self::UnsupportedFeature {
            feature: feature.to_string(),
            profile: profile.to_string(),
        }
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
