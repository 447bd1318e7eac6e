//! Tests for the manual reclamation mode.
//!
//! Each integration test file is its own process, so this file can install a
//! manual-mode configuration before anything else starts the reclaimer.
//! Tests are serialized because a `collect` in one would reclaim keys another
//! is still observing.

use std::sync::Once;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use weak_identity_map::{
    collect, configure, reclaim, reclaim_metrics, Key, ReclaimConfig, ReclaimMode,
    WeakIdentityMap, WeakMapError,
};

static SERIAL: Mutex<()> = Mutex::new(());

fn manual_mode() -> MutexGuard<'static, ()> {
    static INIT: Once = Once::new();
    let guard = SERIAL.lock();
    INIT.call_once(|| {
        configure(ReclaimConfig::default().with_mode(ReclaimMode::Manual))
            .expect("reclaimer configured before first use");
    });
    guard
}

#[test]
fn test_eviction_waits_for_collect() {
    let _serial = manual_mode();
    assert_eq!(reclaim::mode(), ReclaimMode::Manual);

    let map = WeakIdentityMap::new();
    let k1 = Key::new(1);
    let k2 = Key::new(2);
    map.put(&k1, "one").unwrap();
    map.put(&k2, "two").unwrap();

    drop(k1);
    std::thread::sleep(Duration::from_millis(50));

    // Nothing runs passes on its own in manual mode.
    assert_eq!(map.len(), 2);
    assert!(reclaim_metrics().queued >= 1);

    collect();
    assert_eq!(map.len(), 1);
    assert_eq!(map.get(&k2), Some("two"));
}

#[test]
fn test_second_configure_is_rejected() {
    let _serial = manual_mode();
    assert_eq!(
        configure(ReclaimConfig::default()),
        Err(WeakMapError::ReclaimerStarted)
    );
    assert_eq!(reclaim::mode(), ReclaimMode::Manual);
}

#[test]
fn test_collect_counts_pass() {
    let _serial = manual_mode();
    let before = reclaim_metrics();

    let map = WeakIdentityMap::new();
    let key = Key::new(());
    map.put(&key, 0u8).unwrap();
    drop(key);
    collect();

    let after = reclaim_metrics();
    assert!(after.passes > before.passes);
    assert!(after.keys_reclaimed > before.keys_reclaimed);
    assert!(map.is_empty());
}
