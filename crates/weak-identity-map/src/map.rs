//! The `WeakIdentityMap` type.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::{HookConflictPolicy, MapConfig};
use crate::error::WeakMapError;
use crate::identity::{HookOwner, IdentityToken, MapId};
use crate::key::{Key, ReclaimHook};
use crate::tracing::internal as trace;

/// State shared between the map and the hooks it installs.
///
/// Payloads are stored behind `Arc` so readers can take them out of the lock
/// before running any caller code on them.
struct MapShared<V> {
    id: MapId,
    config: MapConfig,
    entries: Mutex<HashMap<IdentityToken, Arc<V>>>,
}

impl<V> MapShared<V> {
    /// Body of the reclamation hook.
    fn evict(&self, token: IdentityToken) {
        let removed = self.entries.lock().remove(&token);
        if removed.is_some() {
            trace::log_evicted(self.id, token);
        }
        // The payload is dropped after the lock is released.
        drop(removed);
    }
}

/// A map from key identity to payload that never keeps its keys alive.
///
/// Entries are keyed by the [`IdentityToken`] of a [`Key`], not by its value:
/// two keys holding equal values occupy separate entries. Every `put`
/// registers a reclamation hook on the key; once the key's last handle is
/// dropped the reclaimer runs that hook and the entry is removed. Eviction is
/// asynchronous, so [`len`](Self::len) can briefly include keys that are
/// already unreachable. Call [`collect`](crate::collect) to force pending
/// evictions.
///
/// All operations, including evictions, serialize on one lock per map. The
/// lock is never held while caller code runs: payload clones, payload
/// destructors and the closure passed to [`get_with`](Self::get_with) all run
/// after it is released.
///
/// Payloads are shared with readers while they run, so `V` must be
/// `Send + Sync`.
///
/// # Hook conflicts
///
/// A key has a single hook slot. `put` on a key whose hook belongs to someone
/// else either replaces that hook with a warning (the default) or fails,
/// depending on [`HookConflictPolicy`]. Replacing means the previous owner is
/// never told the key was reclaimed; in particular, putting the same key into
/// two maps leaves the first map's entry in place forever.
///
/// # Examples
///
/// ```
/// use weak_identity_map::{collect, Key, WeakIdentityMap};
///
/// let map = WeakIdentityMap::new();
/// let k1 = Key::new(1);
/// let k2 = Key::new(2);
///
/// map.put(&k1, "one").unwrap();
/// map.put(&k2, "two").unwrap();
/// assert_eq!(map.get(&k1), Some("one"));
///
/// drop(k1);
/// collect();
/// assert_eq!(map.len(), 1);
/// assert_eq!(map.get(&k2), Some("two"));
/// ```
///
/// Value types have no identity and cannot be used as keys:
///
/// ```compile_fail
/// use weak_identity_map::WeakIdentityMap;
///
/// let map = WeakIdentityMap::new();
/// map.put(&42, "answer").unwrap();
/// ```
pub struct WeakIdentityMap<V: Send + Sync + 'static> {
    shared: Arc<MapShared<V>>,
}

impl<V: Send + Sync + 'static> WeakIdentityMap<V> {
    /// Create an empty map with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MapConfig::new())
    }

    /// Create an empty map with the given configuration.
    #[must_use]
    pub fn with_config(config: MapConfig) -> Self {
        Self {
            shared: Arc::new(MapShared {
                id: MapId::next(),
                config,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// This map's unique ID, as reported in [`HookOwner::Map`].
    #[must_use]
    pub fn id(&self) -> MapId {
        self.shared.id
    }

    /// Associate `value` with `key`, replacing any previous value for it.
    ///
    /// Installs this map's reclamation hook on `key`. After `put` returns,
    /// [`get`](Self::get) on the same key yields `value` until another `put`
    /// overwrites it or the key becomes unreachable.
    ///
    /// # Errors
    ///
    /// Returns [`WeakMapError::HookConflict`] if the key carries a hook from
    /// another owner and the map uses [`HookConflictPolicy::Reject`]. Neither
    /// the key nor the map is modified in that case.
    pub fn put<T>(&self, key: &Key<T>, value: V) -> Result<(), WeakMapError>
    where
        T: Send + Sync + 'static,
    {
        let token = Key::identity(key);
        let replace_foreign = self.shared.config.hook_conflict == HookConflictPolicy::Replace;

        // The key is alive for the duration of this call, so its hook cannot
        // fire between registration and insertion.
        key.install_hook(self.eviction_hook(), replace_foreign)
            .map_err(|owner| WeakMapError::HookConflict { token, owner })?;

        let previous = self.shared.entries.lock().insert(token, Arc::new(value));
        drop(previous);
        Ok(())
    }

    /// The value associated with `key`, or `None`.
    ///
    /// `None` does not distinguish a key that was never inserted from one
    /// whose entry was evicted.
    #[must_use]
    pub fn get<T>(&self, key: &Key<T>) -> Option<V>
    where
        T: Send + Sync + 'static,
        V: Clone,
    {
        self.lookup(key).map(|value| V::clone(&value))
    }

    /// Run `f` on the value associated with `key` without cloning it.
    ///
    /// `f` runs after the map lock is released, so it may use this map or
    /// call [`collect`](crate::collect). The value it sees stays valid even if
    /// the key is evicted while `f` runs.
    pub fn get_with<T, R>(&self, key: &Key<T>, f: impl FnOnce(&V) -> R) -> Option<R>
    where
        T: Send + Sync + 'static,
    {
        self.lookup(key).map(|value| f(&value))
    }

    /// Returns `true` if the map holds an entry for `key`.
    #[must_use]
    pub fn contains_key<T>(&self, key: &Key<T>) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.shared.entries.lock().contains_key(&Key::identity(key))
    }

    /// Number of entries, including any whose key is unreachable but whose
    /// eviction has not run yet.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    /// Returns `true` if the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.entries.lock().is_empty()
    }

    fn lookup<T>(&self, key: &Key<T>) -> Option<Arc<V>>
    where
        T: Send + Sync + 'static,
    {
        self.shared.entries.lock().get(&Key::identity(key)).cloned()
    }

    /// Build the hook `put` installs on a key.
    ///
    /// Holds the map weakly: a hook firing after the map is gone does nothing.
    fn eviction_hook(&self) -> ReclaimHook {
        let shared: Weak<MapShared<V>> = Arc::downgrade(&self.shared);
        ReclaimHook::new(HookOwner::Map(self.shared.id), move |token| {
            if let Some(shared) = shared.upgrade() {
                shared.evict(token);
            }
        })
    }
}

impl<V: Send + Sync + 'static> Default for WeakIdentityMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Send + Sync + 'static> fmt::Debug for WeakIdentityMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakIdentityMap")
            .field("id", &self.shared.id)
            .field("len", &self.len())
            .field("config", &self.shared.config)
            .finish()
    }
}
