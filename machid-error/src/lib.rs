//! Unified error handling for machid
//!
//! This crate provides the single error type returned by every machid operation.
//! Each fatal condition is one variant the caller can branch on; "value absent"
//! conditions from individual hardware sources never show up here.

use std::io;
use std::path::PathBuf;

/// Result type alias using MachIdError
pub type Result<T> = std::result::Result<T, MachIdError>;

/// Unified error type for all machid operations
#[derive(thiserror::Error, Debug)]
pub enum MachIdError {
    // ============================================================================
    // Caller Errors
    // ============================================================================
    #[error("machid: root privileges required (run with sudo)")]
    NotPrivileged,

    #[error("machid: salt cannot be empty")]
    EmptySalt,

    // ============================================================================
    // Hardware Resolution Errors
    // ============================================================================
    #[error("machid: unable to retrieve hardware identifiers from sysfs or dmidecode")]
    NoHardwareIdentifiers,

    #[error("machid: dmidecode not found, please install it (e.g., apt install dmidecode)")]
    InventoryToolMissing,

    #[error("machid: strict mode enabled - hardware identifiers unavailable and filesystem fallback is disabled")]
    StrictModeBlocked,

    #[error("machid: failed to create filesystem fallback at {path}: {reason}")]
    FallbackProvisioning {
        path: PathBuf,
        reason: String,
    },

    // ============================================================================
    // Cache Errors
    // ============================================================================
    #[error("machid: no cache entry found")]
    CacheNotFound,

    // ============================================================================
    // I/O and Serialization Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MachIdError {
    /// Create a fallback provisioning error
    pub fn fallback(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FallbackProvisioning {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a file read error
    pub fn file_read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Create a file write error
    pub fn file_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same call without changing its input can succeed.
    ///
    /// `NotPrivileged` needs a retry under elevation and `EmptySalt` needs a
    /// corrected salt, so neither counts. Missing tools and strict mode need a
    /// change to the host or to the configuration.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::FileRead { .. } | Self::FileWrite { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_and_missing_tool_are_distinct() {
        let strict = MachIdError::StrictModeBlocked.to_string();
        let missing = MachIdError::InventoryToolMissing.to_string();
        let none = MachIdError::NoHardwareIdentifiers.to_string();
        assert_ne!(strict, missing);
        assert_ne!(strict, none);
        assert!(missing.contains("dmidecode"));
        assert!(strict.contains("strict mode"));
    }

    #[test]
    fn test_fallback_helper_carries_path() {
        let err = MachIdError::fallback("/etc/.machid", "permission denied");
        let msg = err.to_string();
        assert!(msg.contains("/etc/.machid"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let err: MachIdError = io_err.into();
        assert!(matches!(err, MachIdError::Io(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_caller_errors_not_retryable() {
        assert!(!MachIdError::NotPrivileged.is_retryable());
        assert!(!MachIdError::EmptySalt.is_retryable());
        assert!(!MachIdError::StrictModeBlocked.is_retryable());
    }
}
