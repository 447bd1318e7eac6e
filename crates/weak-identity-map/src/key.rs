//! The `Key<T>` handle.
//!
//! A `Key<T>` is a shared, reference-counted object with a stable address and
//! a single reclamation hook slot. When its last handle is dropped the
//! allocation is handed to the reclaimer instead of being freed: the hook runs
//! first, and only then is the storage released. Because the address stays
//! occupied until the hook has run, an [`IdentityToken`] can never be reused by
//! a new key while an eviction for the old one is still pending.

use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::sync::atomic::{self, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::identity::{HookOwner, IdentityToken};
use crate::reclaim;

// ============================================================================
// Hooks
// ============================================================================

pub(crate) type HookFn = Box<dyn FnOnce(IdentityToken) + Send + 'static>;

/// A reclamation callback together with the party that registered it.
pub(crate) struct ReclaimHook {
    pub(crate) owner: HookOwner,
    pub(crate) callback: HookFn,
}

impl ReclaimHook {
    pub(crate) fn new(owner: HookOwner, callback: impl FnOnce(IdentityToken) + Send + 'static) -> Self {
        Self {
            owner,
            callback: Box::new(callback),
        }
    }
}

// ============================================================================
// `KeyBox` - the shared allocation
// ============================================================================

/// Type-erased bookkeeping shared by every key allocation.
pub(crate) struct KeyHeader {
    /// Number of live `Key<T>` handles. The `Arc` strong count is larger
    /// while the allocation sits in the reclaim queue.
    handles: AtomicUsize,
    /// At most one hook per key. Registering replaces.
    hook: Mutex<Option<ReclaimHook>>,
}

impl KeyHeader {
    const fn new() -> Self {
        Self {
            handles: AtomicUsize::new(1),
            hook: Mutex::new(None),
        }
    }

    /// Remove the installed hook, if any.
    pub(crate) fn take_hook(&self) -> Option<ReclaimHook> {
        self.hook.lock().take()
    }
}

struct KeyBox<T> {
    header: KeyHeader,
    value: T,
}

/// An allocation the reclaimer can process without knowing its value type.
pub(crate) trait Reclaimable: Send + Sync {
    fn header(&self) -> &KeyHeader;
}

impl<T: Send + Sync> Reclaimable for KeyBox<T> {
    fn header(&self) -> &KeyHeader {
        &self.header
    }
}

// ============================================================================
// `Key<T>` - the user-facing handle
// ============================================================================

/// A shared key object with a stable identity.
///
/// `Key<T>` behaves like `Arc<T>`: cloning it creates another handle to the
/// same allocation. Unlike `Arc<T>`, dropping the last handle notifies the
/// reclamation hook registered on the key before the value is destroyed.
///
/// The value is dropped on whichever thread runs the reclamation pass, so
/// `T` must be `Send + Sync`.
///
/// # Examples
///
/// ```
/// use weak_identity_map::Key;
///
/// let a = Key::new(String::from("node"));
/// let b = Key::clone(&a);
/// assert!(Key::ptr_eq(&a, &b));
/// assert_eq!(Key::identity(&a), Key::identity(&b));
/// assert_eq!(Key::handle_count(&a), 2);
/// ```
pub struct Key<T: Send + Sync + 'static> {
    /// Released by hand in `Drop`: the last handle moves it to the reclaimer.
    inner: ManuallyDrop<Arc<KeyBox<T>>>,
}

impl<T: Send + Sync + 'static> Key<T> {
    /// Allocate a new key holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: ManuallyDrop::new(Arc::new(KeyBox {
                header: KeyHeader::new(),
                value,
            })),
        }
    }

    /// The identity token of this key.
    ///
    /// Equal for all handles to the same allocation, distinct for distinct
    /// live keys regardless of their values.
    #[inline]
    #[must_use]
    pub fn identity(this: &Self) -> IdentityToken {
        IdentityToken::from_ptr(Arc::as_ptr(&this.inner))
    }

    /// Returns `true` if both handles point to the same allocation.
    #[inline]
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    /// Number of live handles to this key.
    #[must_use]
    pub fn handle_count(this: &Self) -> usize {
        this.inner.header.handles.load(Ordering::Acquire)
    }

    /// Register `f` to run once this key becomes unreachable.
    ///
    /// `f` receives the key's identity token. It runs on the reclaimer, after
    /// the last handle has been dropped and before the value is destroyed.
    ///
    /// A key holds a single hook. Registering replaces whatever hook was
    /// installed before, including one installed by a
    /// [`WeakIdentityMap`](crate::WeakIdentityMap); that map's entry for this
    /// key will then never be evicted. The owner of the replaced hook is
    /// returned so the caller can detect this.
    ///
    /// The hook must not panic. A panicking hook is logged and counted in
    /// [`ReclaimMetrics::hooks_panicked`](crate::ReclaimMetrics::hooks_panicked).
    pub fn on_reclaim<F>(this: &Self, f: F) -> Option<HookOwner>
    where
        F: FnOnce(IdentityToken) + Send + 'static,
    {
        match this.install_hook(ReclaimHook::new(HookOwner::External, f), true) {
            Ok(previous) => previous,
            Err(owner) => Some(owner),
        }
    }

    /// Owner of the hook currently installed on this key.
    #[must_use]
    pub fn hook_owner(this: &Self) -> Option<HookOwner> {
        this.inner.header.hook.lock().as_ref().map(|hook| hook.owner)
    }

    /// Install `hook`, replacing the current one.
    ///
    /// If `replace_foreign` is false and the slot holds a hook from a different
    /// owner, nothing changes and `Err` carries that owner.
    pub(crate) fn install_hook(
        &self,
        hook: ReclaimHook,
        replace_foreign: bool,
    ) -> Result<Option<HookOwner>, HookOwner> {
        let owner = hook.owner;
        let replaced = {
            let mut slot = self.inner.header.hook.lock();
            if let Some(existing) = slot.as_ref() {
                if existing.owner != owner && !replace_foreign {
                    return Err(existing.owner);
                }
            }
            slot.replace(hook)
        };
        // The replaced callback is dropped outside the slot lock.
        let previous = replaced.map(|old| old.owner);
        if let Some(prev) = previous {
            if prev != owner {
                crate::tracing::internal::log_hook_replaced(Self::identity(self), prev, owner);
            }
        }
        Ok(previous)
    }
}

impl<T: Send + Sync + 'static> Clone for Key<T> {
    #[inline]
    fn clone(&self) -> Self {
        self.inner.header.handles.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: ManuallyDrop::new(Arc::clone(&self.inner)),
        }
    }
}

impl<T: Send + Sync + 'static> Drop for Key<T> {
    fn drop(&mut self) {
        if self.inner.header.handles.fetch_sub(1, Ordering::Release) != 1 {
            // SAFETY: `inner` is not used again after this point.
            unsafe { ManuallyDrop::drop(&mut self.inner) };
            return;
        }
        atomic::fence(Ordering::Acquire);
        // Last handle: the queue takes over this handle's reference, so the
        // allocation (and its address) lives until the reclaimer has run the
        // hook, and the value is destroyed only by the reclaimer.
        // SAFETY: `inner` is not used again after this point.
        let inner = unsafe { ManuallyDrop::take(&mut self.inner) };
        let erased: Arc<dyn Reclaimable> = inner;
        reclaim::enqueue(erased);
    }
}

impl<T: Send + Sync + 'static> Deref for Key<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner.value
    }
}

impl<T: Send + Sync + 'static> AsRef<T> for Key<T> {
    fn as_ref(&self) -> &T {
        self
    }
}

/// Compares values, not identities. Two keys can be equal here and still
/// occupy separate entries in a [`WeakIdentityMap`](crate::WeakIdentityMap).
impl<T: Send + Sync + PartialEq + 'static> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl<T: Send + Sync + Eq + 'static> Eq for Key<T> {}

impl<T: Send + Sync + fmt::Debug + 'static> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Key").field(&**self).finish()
    }
}

impl<T: Send + Sync + fmt::Display + 'static> fmt::Display for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl<T: Send + Sync + 'static> fmt::Pointer for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&Arc::as_ptr(&self.inner), f)
    }
}

impl<T: Send + Sync + Default + 'static> Default for Key<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
