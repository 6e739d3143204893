//! Fuzz test for decoding and judging stored snapshots
//!
//! Whatever a storage backend hands back is untrusted. Decoding must fail
//! cleanly and validation of anything that does decode must not panic.
//!
//! Run with: cargo +nightly fuzz run snapshot_decode_fuzz -- -max_total_time=60

#![no_main]

use chrono::DateTime;
use libfuzzer_sys::fuzz_target;
use rehydra_core::{Snapshot, SnapshotError, SnapshotPolicy};
use rehydra_storage::{JsonCodec, SnapshotCodec};
use std::time::Duration;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let decoded: Result<Snapshot<serde_json::Value>, _> = JsonCodec.decode(input);
    let Ok(snapshot) = decoded else {
        return;
    };

    let policy = SnapshotPolicy::new("fuzz", Duration::from_millis(1_000));
    for now in [DateTime::UNIX_EPOCH, DateTime::<chrono::Utc>::MAX_UTC] {
        match snapshot.validate(&policy, now) {
            Err(SnapshotError::Corrupt { .. }) => {
                assert!(snapshot.timestamp().is_none(), "only a missing timestamp is corrupt");
            }
            Ok(()) => {
                assert_eq!(snapshot.buster(), "fuzz");
                assert!(snapshot.age(now).is_some());
            }
            Err(_) => {}
        }
    }
});
