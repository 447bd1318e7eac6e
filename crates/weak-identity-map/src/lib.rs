//! A concurrent map keyed by object identity that never keeps its keys alive.
//!
//! `weak-identity-map` associates auxiliary data with objects whose lifetime
//! it does not control. Keys are [`Key<T>`] handles, shared reference-counted
//! objects with a stable address. The map stores only each key's
//! [`IdentityToken`], so an entry does not keep its key reachable. When the
//! last handle to a key is dropped, the reclaimer runs the hook the map
//! installed on it and the entry disappears.
//!
//! # Quick Start
//!
//! ```
//! use weak_identity_map::{collect, Key, WeakIdentityMap};
//!
//! let labels = WeakIdentityMap::new();
//!
//! let node = Key::new(vec![1, 2, 3]);
//! labels.put(&node, "root").unwrap();
//! assert_eq!(labels.get(&node), Some("root"));
//!
//! drop(node);
//! collect(); // run pending reclamation hooks now
//! assert!(labels.is_empty());
//! ```
//!
//! # Reclamation
//!
//! Eviction is asynchronous. By default a background thread runs reclamation
//! passes as keys become unreachable; [`collect`] forces a pass on the calling
//! thread. See [`reclaim`] and [`ReclaimConfig`] for manual mode and tuning.
//!
//! A key's allocation is released only after its hook has run, so an identity
//! token is never reused while an eviction for it is still pending.
//!
//! # Hook conflicts
//!
//! Each key has a single hook slot. Putting a key into a second map, or
//! registering [`Key::on_reclaim`] on a key already in a map, replaces the
//! previous hook. This is logged as a warning, or rejected outright under
//! [`HookConflictPolicy::Reject`].
//!
//! # Thread Safety
//!
//! `WeakIdentityMap<V>` requires `V: Send + Sync`. `put`, `get`, `len`
//! and evictions serialize on one lock per map. A `get` racing the eviction of
//! the same key may observe either the old value or `None`. No caller code
//! runs while the map lock is held, so a closure passed to
//! [`WeakIdentityMap::get_with`] may itself call [`collect`].

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod identity;
mod key;
mod map;
mod metrics;
pub mod reclaim;
mod tracing;

pub use config::{
    HookConflictPolicy, MapConfig, ReclaimConfig, ReclaimMode, ENV_RECLAIM_BATCH,
    ENV_RECLAIM_MODE,
};
pub use error::WeakMapError;
pub use identity::{HookOwner, IdentityToken, MapId};
pub use key::Key;
pub use map::WeakIdentityMap;
pub use metrics::{reclaim_metrics, ReclaimMetrics};
pub use reclaim::{collect, configure};
