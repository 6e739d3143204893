//! Diagnostic reporting for failures that are absorbed rather than returned.
//!
//! The restore path never raises, so the only way a caller learns about a
//! discarded or unreadable snapshot is through a [`DiagnosticSink`]. The
//! [`Diagnostics`] wrapper pairs a sink with a [`BuildMode`] and stays
//! silent in production.

use std::fmt;
use std::sync::Arc;

use crate::config::BuildMode;
use crate::error::PersistError;

/// A logger capability: where absorbed errors and warnings go.
pub trait DiagnosticSink: Send + Sync {
    fn error(&self, error: &PersistError);

    fn warn(&self, message: &str);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn error(&self, error: &PersistError) {
        tracing::error!(error = %error, "rehydra diagnostic");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

/// A sink gated by build mode.
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<dyn DiagnosticSink>,
    mode: BuildMode,
}

impl Diagnostics {
    pub fn new(sink: Arc<dyn DiagnosticSink>, mode: BuildMode) -> Self {
        Self { sink, mode }
    }

    /// Tracing-backed diagnostics for the given mode.
    pub fn tracing(mode: BuildMode) -> Self {
        Self::new(Arc::new(TracingSink), mode)
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    /// Whether reports reach the sink at all.
    pub fn is_enabled(&self) -> bool {
        !self.mode.is_production()
    }

    pub fn error(&self, error: &PersistError) {
        if self.is_enabled() {
            self.sink.error(error);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.is_enabled() {
            self.sink.warn(message);
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::tracing(BuildMode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        errors: AtomicUsize,
        warnings: AtomicUsize,
    }

    impl DiagnosticSink for CountingSink {
        fn error(&self, _error: &PersistError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn warn(&self, _message: &str) {
            self.warnings.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn storage_error() -> PersistError {
        StorageError::LockPoisoned.into()
    }

    #[test]
    fn test_development_reports() {
        let sink = Arc::new(CountingSink::default());
        let diagnostics = Diagnostics::new(sink.clone(), BuildMode::Development);
        diagnostics.error(&storage_error());
        diagnostics.warn("snapshot discarded");
        assert_eq!(sink.errors.load(Ordering::SeqCst), 1);
        assert_eq!(sink.warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_production_is_silent() {
        let sink = Arc::new(CountingSink::default());
        let diagnostics = Diagnostics::new(sink.clone(), BuildMode::Production);
        diagnostics.error(&storage_error());
        diagnostics.warn("snapshot discarded");
        assert!(!diagnostics.is_enabled());
        assert_eq!(sink.errors.load(Ordering::SeqCst), 0);
        assert_eq!(sink.warnings.load(Ordering::SeqCst), 0);
    }
}
