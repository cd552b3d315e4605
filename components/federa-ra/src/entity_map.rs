use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};

/// Names an entity (a failover unit, a replica set) on this node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(derive_more::Display)]
#[serde(transparent)]
pub struct EntityId(Arc<str>);

#[derive(derive_more::Debug)]
pub struct EntityEntry<E> {
    id:    EntityId,
    #[debug(skip)]
    state: Mutex<E>,
}

/// The entities this node hosts. Lookups are counted so that callers can
/// tell whether a message ever reached entity state.
#[derive(derive_more::Debug)]
pub struct EntityMap<E> {
    #[debug(skip)]
    entries: RwLock<HashMap<EntityId, Arc<EntityEntry<E>>>>,
    lookups: AtomicU64,
}

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_arc(&self) -> &Arc<str> {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl<E> EntityEntry<E> {
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn lock(&self) -> MutexGuard<'_, E> {
        self.state.lock()
    }
}

impl<E> EntityMap<E> {
    pub fn new() -> Self {
        Self {
            entries: Default::default(),
            lookups: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn lookups(&self) -> u64 {
        self.lookups.load(AtomicOrdering::Relaxed)
    }

    /// Adds an entity; an existing one under the same id is kept.
    pub fn insert(&self, id: EntityId, state: E) -> Arc<EntityEntry<E>> {
        self.entries
            .write()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(EntityEntry::new(id, state)))
            .clone()
    }

    pub fn remove(&self, id: &EntityId) -> Option<Arc<EntityEntry<E>>> {
        self.entries.write().remove(id)
    }

    pub fn get(&self, id: &EntityId) -> Option<Arc<EntityEntry<E>>> {
        self.lookups.fetch_add(1, AtomicOrdering::Relaxed);
        self.entries.read().get(id).cloned()
    }

    /// Looks `id` up and, if allowed, creates it with `create`. The flag is
    /// set when this call created the entity.
    pub fn get_or_create(
        &self,
        id: &EntityId,
        allow_create: bool,
        create: impl FnOnce(&EntityId) -> E,
    ) -> Option<(Arc<EntityEntry<E>>, bool)> {
        if let Some(entry) = self.get(id) {
            return Some((entry, false))
        }
        if !allow_create {
            return None
        }
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(id) {
            return Some((entry.clone(), false))
        }
        let entry = Arc::new(EntityEntry::new(id.clone(), create(id)));
        entries.insert(id.clone(), entry.clone());
        Some((entry, true))
    }

    pub fn with<R>(&self, id: &EntityId, f: impl FnOnce(&E) -> R) -> Option<R> {
        let entry = self.entries.read().get(id).cloned()?;
        let state = entry.lock();
        Some(f(&state))
    }
}

impl<E> Default for EntityMap<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EntityEntry<E> {
    fn new(id: EntityId, state: E) -> Self {
        Self {
            id,
            state: Mutex::new(state),
        }
    }
}
