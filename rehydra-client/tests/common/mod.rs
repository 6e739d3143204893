//! Shared helpers for the client integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rehydra_client::PersistOptions;
use rehydra_core::{BuildMode, ManualClock, PersistConfig};
use rehydra_test_utils::{init_test_tracing, MemoryQueryCache, RecordingSink};

pub const ONE_DAY: Duration = Duration::from_millis(86_400_000);

/// Options in development mode that report into a fresh recording sink.
pub fn recorded_options(
    config: PersistConfig,
) -> (PersistOptions<MemoryQueryCache>, Arc<RecordingSink>) {
    init_test_tracing();
    let sink = Arc::new(RecordingSink::new());
    let options = PersistOptions::new(config.with_mode(BuildMode::Development))
        .with_sink(sink.clone());
    (options, sink)
}

/// Like [`recorded_options`] with time controlled by the returned clock.
pub fn clocked_options(
    config: PersistConfig,
    clock: &ManualClock,
) -> (PersistOptions<MemoryQueryCache>, Arc<RecordingSink>) {
    let (options, sink) = recorded_options(config);
    (options.with_clock(Arc::new(clock.clone())), sink)
}

/// Poll `condition` until it holds, yielding to spawned tasks in between.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
