//! Engine configuration.
//!
//! The original design kept a process-wide configuration table; here it
//! is an explicit value owned by every [`Document`](crate::Document) so
//! two documents with different settings can coexist.

use std::rc::Rc;

/// Callback consulted when the parser hits a correctable malformation.
/// Receives the message and the byte offset; returning `true` lets the
/// parser recover and continue, `false` turns the problem into a hard
/// [`PdfError::Malformed`](crate::PdfError::Malformed).
pub type CorrectableErrorHandler = Rc<dyn Fn(&str, usize) -> bool>;

/// Configuration threaded through a `Document` and the subsystems it
/// drives.
#[derive(Clone)]
pub struct Configuration {
    /// Chunk size used by filter pipeline sources.
    pub chunk_size: usize,

    /// Flate compression level used when encoding streams (0-9).
    pub flate_compression: u32,

    /// When `false`, predictor decoding tolerates a trailing
    /// short row instead of failing.
    pub predictor_strict: bool,

    /// Handler for correctable parse errors. `None` means recover
    /// silently (matching the behavior of most real-world readers).
    pub on_correctable_error: Option<CorrectableErrorHandler>,
}

impl Configuration {
    /// Strict configuration: every correctable error is fatal and
    /// predictor rows must match exactly.
    pub fn strict() -> Self {
        Self {
            predictor_strict: true,
            on_correctable_error: Some(Rc::new(|_, _| false)),
            ..Self::default()
        }
    }

    /// Whether a correctable error at `position` should be recovered.
    pub(crate) fn recover(&self, message: &str, position: usize) -> bool {
        match &self.on_correctable_error {
            Some(handler) => handler(message, position),
            None => true,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            chunk_size: 65_536,
            flate_compression: 9,
            predictor_strict: true,
            on_correctable_error: None,
        }
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("chunk_size", &self.chunk_size)
            .field("flate_compression", &self.flate_compression)
            .field("predictor_strict", &self.predictor_strict)
            .field(
                "on_correctable_error",
                &self.on_correctable_error.as_ref().map(|_| "<handler>"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Configuration::default();
        assert_eq!(config.chunk_size, 65_536);
        assert_eq!(config.flate_compression, 9);
        assert!(config.predictor_strict);
        assert!(config.recover("anything", 0));
    }

    #[test]
    fn test_strict_rejects_recovery() {
        let config = Configuration::strict();
        assert!(!config.recover("broken entry", 17));
    }

    #[test]
    fn test_custom_handler() {
        let mut config = Configuration::default();
        config.on_correctable_error = Some(Rc::new(|msg, _| msg.contains("length")));
        assert!(config.recover("bad length", 3));
        assert!(!config.recover("bad header", 3));
    }
}
