//! Error type.

use thiserror::Error;

use crate::identity::{HookOwner, IdentityToken};

/// Errors returned by map and reclaimer operations.
///
/// Both variants are contract violations local to the call that produced
/// them. Retrying the same call will fail the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WeakMapError {
    /// The key already carries a reclamation hook registered by someone else,
    /// and the map was configured with [`HookConflictPolicy::Reject`].
    ///
    /// [`HookConflictPolicy::Reject`]: crate::HookConflictPolicy::Reject
    #[error("key {token} already carries a reclamation hook owned by {owner}")]
    HookConflict {
        /// Identity of the key.
        token: IdentityToken,
        /// Owner of the hook that would have been replaced.
        owner: HookOwner,
    },
    /// [`configure`](crate::reclaim::configure) was called after the
    /// reclaimer had already started.
    #[error("reclaimer already started; configure it before the first key is dropped")]
    ReclaimerStarted,
}
