//! Error types for slidely operations.
//!
//! All failures in this crate are configuration-time failures: an operator is
//! either rejected while it is being validated/configured, or it runs without
//! an error channel at all. This module defines the status type those
//! configuration paths return.

use std::fmt;

/// Errors that can occur while validating or configuring an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlidelyError {
    /// The requested geometry or data-type combination is malformed.
    ConfigurationError {
        /// Human-readable error message.
        message: String,
    },
    /// No kernel in the selection table matches the requested configuration
    /// on this hardware.
    UnsupportedConfiguration {
        /// Human-readable error message.
        message: String,
    },
    /// A kernel's declared access footprint does not fit in the tensor's
    /// allocated padding, and the window had to be shrunk.
    InsufficientPadding {
        /// Human-readable error message.
        message: String,
    },
}

impl fmt::Display for SlidelyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlidelyError::ConfigurationError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            SlidelyError::UnsupportedConfiguration { message } => {
                write!(f, "Unsupported configuration: {}", message)
            }
            SlidelyError::InsufficientPadding { message } => {
                write!(f, "Insufficient padding: {}", message)
            }
        }
    }
}

impl std::error::Error for SlidelyError {}

/// Result type alias for slidely operations.
pub type Result<T> = std::result::Result<T, SlidelyError>;

/// Creates a configuration error.
pub fn configuration_error(message: impl Into<String>) -> SlidelyError {
    SlidelyError::ConfigurationError {
        message: message.into(),
    }
}

/// Creates an unsupported-configuration error.
pub fn unsupported_configuration(message: impl Into<String>) -> SlidelyError {
    SlidelyError::UnsupportedConfiguration {
        message: message.into(),
    }
}

/// Creates an insufficient-padding error.
pub fn insufficient_padding(message: impl Into<String>) -> SlidelyError {
    SlidelyError::InsufficientPadding {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let error = configuration_error("stride must be non-zero");
        let display = format!("{}", error);
        assert!(display.contains("Configuration error"));
        assert!(display.contains("stride must be non-zero"));
    }

    #[test]
    fn test_unsupported_configuration_display() {
        let error = unsupported_configuration("no kernel for q8 max pooling with window 9x9");
        let display = format!("{}", error);
        assert!(display.contains("Unsupported configuration"));
        assert!(display.contains("window 9x9"));
    }

    #[test]
    fn test_insufficient_padding_display() {
        let error = insufficient_padding("source tensor needs 2 more columns on the right");
        let display = format!("{}", error);
        assert!(display.contains("Insufficient padding"));
        assert!(display.contains("2 more columns"));
    }

    #[test]
    fn test_error_equality() {
        let error1 = configuration_error("test");
        let error2 = configuration_error("test");
        let error3 = unsupported_configuration("test");

        assert_eq!(error1, error2);
        assert_ne!(error1, error3);
    }

    #[test]
    fn test_error_trait_implementation() {
        let error = configuration_error("test error");

        let _: &dyn std::error::Error = &error;

        assert!(std::error::Error::source(&error).is_none());
    }
}
