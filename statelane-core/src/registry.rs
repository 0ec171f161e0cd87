//! Copy-on-write hook registries
//!
//! Reducers, middleware, and listeners may be added or removed from any thread
//! while cycles are running. A cycle never walks the live list: it takes a
//! [`Snapshot`] when it starts, which is an `Arc` clone of the current list.
//! Writers clone the list before changing it whenever a snapshot is alive.

use std::any::TypeId;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Handle returned when a hook is registered, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

impl HookId {
    /// Raw numeric id
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook#{}", self.0)
    }
}

struct Entries<T: ?Sized> {
    ids: Vec<HookId>,
    keys: Vec<Option<TypeId>>,
    hooks: Vec<Arc<T>>,
}

impl<T: ?Sized> Clone for Entries<T> {
    fn clone(&self) -> Self {
        Self {
            ids: self.ids.clone(),
            keys: self.keys.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

impl<T: ?Sized> Default for Entries<T> {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            keys: Vec::new(),
            hooks: Vec::new(),
        }
    }
}

/// An ordered set of hooks with unique membership.
///
/// Membership is by pointer identity: registering the same `Arc` twice keeps
/// one entry and returns the id it already had. Hooks added through
/// [`add_keyed`](Registry::add_keyed) are also identified by their key, so a
/// value without identity of its own (a zero-sized fn item, say) can be
/// registered once even when it is wrapped in a fresh `Arc` every time.
pub struct Registry<T: ?Sized> {
    entries: RwLock<Arc<Entries<T>>>,
    next_id: AtomicU64,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("len", &self.len()).finish()
    }
}

impl<T: ?Sized> Registry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Entries::default())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a hook. Returns the existing id if this exact `Arc` is already registered.
    pub fn add(&self, hook: Arc<T>) -> HookId {
        self.add_keyed(hook, None)
    }

    /// Register a hook under an identity key.
    ///
    /// Returns the existing id if this exact `Arc`, or a hook with the same
    /// `Some` key, is already registered.
    pub fn add_keyed(&self, hook: Arc<T>, key: Option<TypeId>) -> HookId {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let existing = guard
            .hooks
            .iter()
            .zip(&guard.keys)
            .position(|(h, k)| same_hook(h, &hook) || (key.is_some() && *k == key));
        if let Some(pos) = existing {
            return guard.ids[pos];
        }

        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entries = Arc::make_mut(&mut *guard);
        entries.ids.push(id);
        entries.keys.push(key);
        entries.hooks.push(hook);
        id
    }

    /// Unregister a hook. Returns `false` if the id was not registered.
    pub fn remove(&self, id: HookId) -> bool {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let Some(pos) = guard.ids.iter().position(|i| *i == id) else {
            return false;
        };

        let entries = Arc::make_mut(&mut *guard);
        entries.ids.remove(pos);
        entries.keys.remove(pos);
        entries.hooks.remove(pos);
        true
    }

    /// Whether a hook with this id is registered
    pub fn contains(&self, id: HookId) -> bool {
        self.read().ids.contains(&id)
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.read().ids.len()
    }

    /// Whether no hooks are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unregister every hook
    pub fn clear(&self) {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(Entries::default());
    }

    /// Point-in-time view of the registered hooks, in registration order
    pub fn snapshot(&self) -> Snapshot<T> {
        Snapshot(self.read())
    }

    fn read(&self) -> Arc<Entries<T>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn same_hook<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    // Compare data pointers only; vtable pointers of the same type may differ
    // between codegen units.
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Immutable view of a [`Registry`] taken at one instant.
///
/// Dereferences to a slice of hooks in registration order.
pub struct Snapshot<T: ?Sized>(Arc<Entries<T>>);

impl<T: ?Sized> Snapshot<T> {
    /// Ids of the hooks in this snapshot, parallel to the slice
    pub fn ids(&self) -> &[HookId] {
        &self.0.ids
    }
}

impl<T: ?Sized> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: ?Sized> Deref for Snapshot<T> {
    type Target = [Arc<T>];

    fn deref(&self) -> &[Arc<T>] {
        &self.0.hooks
    }
}
