//! Identity tokens and hook ownership tags.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque surrogate for a key's runtime identity.
///
/// The token is the address of the key's allocation, stored as a plain
/// integer. It carries no provenance and no ownership, so holding it does not
/// keep the key alive.
///
/// Token values may be reused once a key has been reclaimed and its storage
/// handed out again. Never compare tokens across reclamation epochs without a
/// separate liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentityToken(usize);

impl IdentityToken {
    /// Derive a token from a pointer.
    ///
    /// Only the address is kept; the metadata of wide pointers is discarded.
    #[inline]
    #[must_use]
    pub fn from_ptr<T: ?Sized>(ptr: *const T) -> Self {
        Self(ptr.cast::<()>().addr())
    }

    /// The raw address value.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Unique identifier of a [`WeakIdentityMap`](crate::WeakIdentityMap).
///
/// IDs are handed out from a monotonically increasing counter starting at 1
/// and are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MapId(u64);

static NEXT_MAP_ID: AtomicU64 = AtomicU64::new(1);

impl MapId {
    pub(crate) fn next() -> Self {
        Self(NEXT_MAP_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric value of this ID.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map#{}", self.0)
    }
}

/// Who registered the reclamation hook currently installed on a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookOwner {
    /// Installed by [`WeakIdentityMap::put`](crate::WeakIdentityMap::put).
    Map(MapId),
    /// Installed through [`Key::on_reclaim`](crate::Key::on_reclaim).
    External,
}

impl fmt::Display for HookOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map(id) => fmt::Display::fmt(id, f),
            Self::External => f.write_str("external hook"),
        }
    }
}
