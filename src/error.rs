use thiserror::Error;

/// Errors raised by the PDF engine.
///
/// The variants mirror the failure classes of the file format itself:
/// byte-level malformations carry the offset at which parsing gave up,
/// while the remaining variants describe failures of the layers built
/// on top of the raw syntax.
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream violates the PDF format at a locatable offset.
    #[error("malformed PDF at byte {position}: {message}")]
    Malformed { position: usize, message: String },

    /// Wrong password, unsupported security handler, or tampered
    /// authentication data.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Invalid filter parameters, truncated encoded data, or an
    /// unknown filter name.
    #[error("filter error: {0}")]
    Filter(String),

    /// A typed dictionary violates its schema and the violation is not
    /// correctable (or auto-correction is off).
    #[error("validation error: {0}")]
    Validation(String),

    /// Caller misuse, e.g. deleting the last revision or resolving a
    /// reference that belongs to another document.
    #[error("usage error: {0}")]
    Usage(String),
}

impl PdfError {
    /// Convenience constructor for [`PdfError::Malformed`].
    pub fn malformed(position: usize, message: impl Into<String>) -> Self {
        PdfError::Malformed {
            position,
            message: message.into(),
        }
    }

    /// Whether this error is a byte-level malformation. The file-level
    /// parser uses this to decide when to fall back to cross-reference
    /// reconstruction.
    pub fn is_malformed(&self) -> bool {
        matches!(self, PdfError::Malformed { .. })
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, PdfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_carries_position() {
        let err = PdfError::malformed(42, "unexpected delimiter");
        assert!(err.is_malformed());
        assert_eq!(
            err.to_string(),
            "malformed PDF at byte 42: unexpected delimiter"
        );
    }

    #[test]
    fn test_other_kinds_are_not_malformed() {
        assert!(!PdfError::Filter("bad predictor".into()).is_malformed());
        assert!(!PdfError::Usage("two documents".into()).is_malformed());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "sudden EOF");
        let err = PdfError::from(io);
        match err {
            PdfError::Io(inner) => assert_eq!(inner.kind(), std::io::ErrorKind::UnexpectedEof),
            _ => panic!("expected IO variant"),
        }
    }
}
