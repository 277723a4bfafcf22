//! Error types for the archiver pipeline

use std::io;
use strum::Display;
use thiserror::Error;

/// Result type for archiver operations
pub type ArchiverResult<T = ()> = Result<T, ArchiverError>;

/// Errors that can occur while processing a fiscal document
#[derive(Debug, Error)]
pub enum ArchiverError {
    /// The XML could not be parsed at all
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// The XML parsed but is missing required fields
    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Uniqueness violation surfaced outside the insert path
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Per-file processing deadline exceeded
    #[error("processing timed out after {0} seconds")]
    Timeout(u64),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

/// Closed set of error kinds recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    XmlParseError,
    XmlInvalidStructure,
    DbConnectionError,
    DbIntegrityError,
    FileNotFound,
    FilePermissionError,
    NetworkError,
    UnknownError,
}

impl ArchiverError {
    /// Create a parse error
    pub fn xml_parse<T: std::fmt::Display>(msg: T) -> Self {
        Self::XmlParse(msg.to_string())
    }

    /// Create a structure error
    pub fn xml_structure<T: std::fmt::Display>(msg: T) -> Self {
        Self::XmlStructure(msg.to_string())
    }

    /// Audit-trail kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::XmlParse(_) => ErrorKind::XmlParseError,
            Self::XmlStructure(_) => ErrorKind::XmlInvalidStructure,
            Self::Database(_) => ErrorKind::DbConnectionError,
            Self::Integrity(_) => ErrorKind::DbIntegrityError,
            Self::Io(e) => match e.kind() {
                io::ErrorKind::NotFound => ErrorKind::FileNotFound,
                io::ErrorKind::PermissionDenied => ErrorKind::FilePermissionError,
                io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::TimedOut => ErrorKind::NetworkError,
                _ => ErrorKind::UnknownError,
            },
            Self::Timeout(_) => ErrorKind::NetworkError,
            Self::Other(_) => ErrorKind::UnknownError,
        }
    }

    /// Render the full error chain, deepest cause last
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

/// Truncate a message to the audit column budget without splitting a char
pub fn truncate_message(msg: &str, max: usize) -> String {
    if msg.len() <= max {
        return msg.to_string();
    }
    let mut end = max;
    while end > 0 && !msg.is_char_boundary(end) {
        end -= 1;
    }
    msg[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_kinds_map_to_audit_kinds() {
        let err = ArchiverError::Io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind(), ErrorKind::FileNotFound);

        let err = ArchiverError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert_eq!(err.kind(), ErrorKind::FilePermissionError);

        let err = ArchiverError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(err.kind(), ErrorKind::NetworkError);
    }

    #[test]
    fn kind_display_uses_screaming_snake_case() {
        assert_eq!(ErrorKind::XmlParseError.to_string(), "XML_PARSE_ERROR");
        assert_eq!(ErrorKind::DbIntegrityError.to_string(), "DB_INTEGRITY_ERROR");
        assert_eq!(ErrorKind::FilePermissionError.to_string(), "FILE_PERMISSION_ERROR");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let msg = "ação".repeat(200);
        let cut = truncate_message(&msg, 500);
        assert!(cut.len() <= 500);
        assert!(msg.starts_with(&cut));
    }
}
