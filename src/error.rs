// ABOUTME: Error taxonomy for the sync engine
// ABOUTME: Every variant is caught at the component boundary and reported, never fatal

use thiserror::Error;

/// Errors surfaced by the sync components.
///
/// Adapters work with `anyhow::Result`; SessionManager, SourceReader, Uploader
/// and ConfigFile convert into this type so callers can tell the failure class
/// apart when reporting it.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid base address {address:?}: {reason}")]
    InvalidBaseAddress { address: String, reason: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{operation} rejected by server: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    #[error("source query failed: {0:#}")]
    Source(anyhow::Error),

    #[error("upload failed: {0}")]
    Upload(String),
}

impl SyncError {
    /// Message the server sent back, if this error carries one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            SyncError::Rejected { message, .. } => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_display_includes_server_message() {
        let err = SyncError::Rejected {
            operation: "upload",
            message: "quota exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "upload rejected by server: quota exceeded");
        assert_eq!(err.server_message(), Some("quota exceeded"));
    }

    #[test]
    fn test_source_error_shows_context_chain() {
        let inner = anyhow::anyhow!("no such table: DeviceLogs_3_2024")
            .context("Failed to query device logs");
        let err = SyncError::Source(inner);
        let text = err.to_string();
        assert!(text.contains("Failed to query device logs"));
        assert!(text.contains("no such table"));
        assert!(err.server_message().is_none());
    }
}
