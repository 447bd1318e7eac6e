//! The reclaimer.
//!
//! Stands in for a tracing collector's finalizer queue. Keys whose last
//! handle was dropped are pushed onto a lock-free queue. A reclamation pass
//! pops them, runs each key's hook with its identity token and then releases
//! the allocation.
//!
//! Passes are serialized by a single pass lock: every pop happens while it is
//! held. When [`collect`] acquires the lock, any pass that popped earlier keys
//! has therefore finished, and `collect` itself drains the rest.
//!
//! Lock order: pass lock, then a key's hook slot, then a map's entries.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam_queue::SegQueue;
use parking_lot::ReentrantMutex;

use crate::config::{ReclaimConfig, ReclaimMode};
use crate::error::WeakMapError;
use crate::identity::IdentityToken;
use crate::key::Reclaimable;
use crate::metrics::COUNTERS;
use crate::tracing::{internal as trace, next_pass_id};

struct Reclaimer {
    queue: SegQueue<Arc<dyn Reclaimable>>,
    /// Reentrant so a hook may drop keys or call [`collect`] itself.
    pass_lock: ReentrantMutex<()>,
    /// Wakes the background thread. `None` in manual mode.
    wake: Option<Sender<()>>,
    mode: ReclaimMode,
    max_batch: usize,
}

static RECLAIMER: OnceLock<Reclaimer> = OnceLock::new();

impl Reclaimer {
    fn start(config: ReclaimConfig) -> Self {
        let max_batch = config.max_batch.max(1);
        let (mode, wake) = match config.mode {
            ReclaimMode::Manual => (ReclaimMode::Manual, None),
            ReclaimMode::Background => {
                // Capacity 1: a pending wake-up already covers anything pushed
                // before the thread gets to it.
                let (tx, rx) = channel::bounded(1);
                let spawned = thread::Builder::new()
                    .name(config.thread_name)
                    .spawn(move || worker_loop(&rx));
                match spawned {
                    Ok(_) => (ReclaimMode::Background, Some(tx)),
                    Err(err) => {
                        trace::log_spawn_failed(&err);
                        (ReclaimMode::Manual, None)
                    }
                }
            }
        };
        Self {
            queue: SegQueue::new(),
            pass_lock: ReentrantMutex::new(()),
            wake,
            mode,
            max_batch,
        }
    }

    fn push(&self, item: Arc<dyn Reclaimable>) {
        COUNTERS.record_queued();
        self.queue.push(item);
        if let Some(wake) = &self.wake {
            // Full means a wake-up is already pending.
            let _ = wake.try_send(());
        }
    }

    /// Reclaim up to `limit` queued keys. Returns how many were reclaimed.
    fn run_pass(&self, limit: usize) -> usize {
        let _pass = self.pass_lock.lock();
        let pass_id = next_pass_id();
        let _span = trace::trace_reclaim_pass(pass_id);

        let mut reclaimed = 0;
        while reclaimed < limit {
            let Some(item) = self.queue.pop() else {
                break;
            };
            reclaim_one(item);
            reclaimed += 1;
        }

        COUNTERS.record_pass();
        trace::log_pass_end(pass_id, reclaimed);
        reclaimed
    }
}

/// Run the hook of one unreachable key and release its allocation.
fn reclaim_one(item: Arc<dyn Reclaimable>) {
    let token = IdentityToken::from_ptr(Arc::as_ptr(&item));
    let hook = item.header().take_hook();
    let ran_hook = hook.is_some();

    let mut panicked = false;
    if let Some(hook) = hook {
        let callback = hook.callback;
        if panic::catch_unwind(AssertUnwindSafe(move || callback(token))).is_err() {
            trace::log_hook_panicked(token);
            panicked = true;
        }
    }

    // The value's destructor is user code too.
    if panic::catch_unwind(AssertUnwindSafe(move || drop(item))).is_err() {
        trace::log_drop_panicked(token);
        panicked = true;
    }

    COUNTERS.record_reclaimed(ran_hook, panicked);
}

fn worker_loop(wake: &Receiver<()>) {
    for () in wake.iter() {
        let reclaimer = global();
        while reclaimer.run_pass(reclaimer.max_batch) == reclaimer.max_batch {}
    }
}

fn global() -> &'static Reclaimer {
    RECLAIMER.get_or_init(|| Reclaimer::start(ReclaimConfig::from_env()))
}

/// Queue an unreachable key for reclamation.
pub(crate) fn enqueue(item: Arc<dyn Reclaimable>) {
    global().push(item);
}

/// Install the process-wide reclaimer configuration.
///
/// Must be called before the reclaimer starts, which happens the first time a
/// key's last handle is dropped or [`collect`] runs. Without a call the
/// reclaimer is configured from [`ReclaimConfig::from_env`].
///
/// # Errors
///
/// Returns [`WeakMapError::ReclaimerStarted`] if the reclaimer is already
/// running. The running configuration is left untouched.
pub fn configure(config: ReclaimConfig) -> Result<(), WeakMapError> {
    let mut installed = false;
    RECLAIMER.get_or_init(|| {
        installed = true;
        Reclaimer::start(config)
    });
    if installed {
        Ok(())
    } else {
        Err(WeakMapError::ReclaimerStarted)
    }
}

/// Force a full reclamation pass on the calling thread.
///
/// When this returns, the hook of every key whose last handle was dropped
/// before the call has run, along with the hooks of any keys those hooks
/// released in turn. Keys dropped concurrently by other threads may or may
/// not be included.
pub fn collect() {
    global().run_pass(usize::MAX);
}

/// The mode the reclaimer is actually running in.
///
/// Differs from the configured mode if the background thread could not be
/// spawned.
#[must_use]
pub fn mode() -> ReclaimMode {
    global().mode
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_collect_runs_hook_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let key = Key::new(vec![1u8, 2, 3]);
        let expected = Key::identity(&key);
        let seen = Arc::new(parking_lot::Mutex::new(None));

        Key::on_reclaim(&key, {
            let calls = Arc::clone(&calls);
            let seen = Arc::clone(&seen);
            move |token| {
                calls.fetch_add(1, Ordering::SeqCst);
                *seen.lock() = Some(token);
            }
        });

        drop(key);
        collect();
        collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), Some(expected));
    }

    #[test]
    fn test_hook_not_run_while_handles_remain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let key = Key::new(0u64);
        let other = key.clone();
        Key::on_reclaim(&key, {
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        drop(key);
        collect();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        drop(other);
        collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_configure_after_start_is_rejected() {
        collect();
        assert_eq!(
            configure(ReclaimConfig::default()),
            Err(WeakMapError::ReclaimerStarted)
        );
    }
}
