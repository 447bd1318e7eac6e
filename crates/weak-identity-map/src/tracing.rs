//! Reclamation tracing support.
//!
//! When the `tracing` feature is enabled, this module provides structured
//! tracing spans and events for reclamation passes and map evictions.
//! Without the feature every helper compiles to nothing.

use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identifier for a reclamation pass.
///
/// Used to correlate all events of a single pass. Monotonically increasing,
/// starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassId(pub u64);

static NEXT_PASS_ID: AtomicU64 = AtomicU64::new(1);

/// Generate the next unique pass ID.
pub fn next_pass_id() -> PassId {
    PassId(NEXT_PASS_ID.fetch_add(1, Ordering::Relaxed))
}

#[cfg(feature = "tracing")]
pub mod internal {
    use tracing::{span, Level};

    use super::PassId;
    use crate::identity::{HookOwner, IdentityToken, MapId};

    /// Span covering one reclamation pass.
    pub fn trace_reclaim_pass(pass_id: PassId) -> span::EnteredSpan {
        span!(Level::DEBUG, "reclaim_pass", pass_id = pass_id.0).entered()
    }

    pub fn log_pass_end(pass_id: PassId, keys_reclaimed: usize) {
        tracing::debug!(pass_id = pass_id.0, keys_reclaimed, "pass_end");
    }

    pub fn log_evicted(map: MapId, token: IdentityToken) {
        tracing::debug!(map = map.get(), token = %token, "evicted");
    }

    pub fn log_hook_replaced(token: IdentityToken, previous: HookOwner, owner: HookOwner) {
        tracing::warn!(
            token = %token,
            previous = %previous,
            owner = %owner,
            "reclamation hook replaced; the previous owner will not be notified"
        );
    }

    pub fn log_hook_panicked(token: IdentityToken) {
        tracing::error!(token = %token, "reclamation hook panicked");
    }

    pub fn log_drop_panicked(token: IdentityToken) {
        tracing::error!(token = %token, "key destructor panicked during reclamation");
    }

    pub fn log_spawn_failed(err: &std::io::Error) {
        tracing::error!(error = %err, "failed to spawn reclaimer thread; falling back to manual mode");
    }
}

#[cfg(not(feature = "tracing"))]
pub mod internal {
    use super::PassId;
    use crate::identity::{HookOwner, IdentityToken, MapId};

    /// Stub guard when tracing is disabled.
    pub struct NoSpan;

    pub const fn trace_reclaim_pass(_pass_id: PassId) -> NoSpan {
        NoSpan
    }

    pub const fn log_pass_end(_pass_id: PassId, _keys_reclaimed: usize) {}

    pub const fn log_evicted(_map: MapId, _token: IdentityToken) {}

    pub const fn log_hook_replaced(_token: IdentityToken, _previous: HookOwner, _owner: HookOwner) {}

    pub const fn log_hook_panicked(_token: IdentityToken) {}

    pub const fn log_drop_panicked(_token: IdentityToken) {}

    pub const fn log_spawn_failed(_err: &std::io::Error) {}
}
