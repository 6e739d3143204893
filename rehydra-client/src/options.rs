//! Options shared by restore, save and watch.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rehydra_core::{
    Clock, DiagnosticSink, Diagnostics, LiveCache, PersistConfig, SystemClock, TracingSink,
};

/// Everything the protocol needs besides the cache and the store.
///
/// `hydrate_options` and `dehydrate_options` are the cache's own types and
/// are handed over untouched.
pub struct PersistOptions<C: LiveCache> {
    pub config: PersistConfig,
    pub hydrate_options: C::HydrateOptions,
    pub dehydrate_options: C::DehydrateOptions,
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl<C: LiveCache> PersistOptions<C> {
    pub fn new(config: PersistConfig) -> Self {
        Self {
            config,
            hydrate_options: C::HydrateOptions::default(),
            dehydrate_options: C::DehydrateOptions::default(),
            clock: Arc::new(SystemClock),
            sink: None,
        }
    }

    pub fn with_hydrate_options(mut self, options: C::HydrateOptions) -> Self {
        self.hydrate_options = options;
        self
    }

    pub fn with_dehydrate_options(mut self, options: C::DehydrateOptions) -> Self {
        self.dehydrate_options = options;
        self
    }

    /// Override the time source used for snapshot timestamps and expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Send diagnostics here instead of the cache's own logger.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Diagnostics for `cache`: the explicit sink, else the cache's logger,
    /// else tracing. Gated by the configured build mode.
    pub fn diagnostics(&self, cache: &C) -> Diagnostics {
        let sink = self
            .sink
            .clone()
            .or_else(|| cache.diagnostic_sink())
            .unwrap_or_else(|| Arc::new(TracingSink));
        Diagnostics::new(sink, self.config.mode)
    }
}

impl<C: LiveCache> Default for PersistOptions<C> {
    fn default() -> Self {
        Self::new(PersistConfig::default())
    }
}

impl<C: LiveCache> Clone for PersistOptions<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            hydrate_options: self.hydrate_options.clone(),
            dehydrate_options: self.dehydrate_options.clone(),
            clock: Arc::clone(&self.clock),
            sink: self.sink.clone(),
        }
    }
}

impl<C: LiveCache> fmt::Debug for PersistOptions<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistOptions")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}
