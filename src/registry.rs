//! Registry of live entities, keyed by context and id.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::entity::FetchableEntity;

/// One [`FetchableEntity`] per (context, id) for the life of the process.
pub struct EntityRegistry<T, P> {
    entities: RwLock<HashMap<String, HashMap<String, Arc<FetchableEntity<T, P>>>>>,
}

impl<T, P> EntityRegistry<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Register `entity`, returning any entity it replaced.
    pub fn insert(&self, entity: FetchableEntity<T, P>) -> Option<Arc<FetchableEntity<T, P>>> {
        let mut entities = self.entities.write();
        entities
            .entry(entity.context_id().to_string())
            .or_default()
            .insert(entity.id().to_string(), Arc::new(entity))
    }

    /// The registered entity, or a new one built by `make`.
    pub fn get_or_insert_with(
        &self,
        context_id: &str,
        id: &str,
        make: impl FnOnce() -> FetchableEntity<T, P>,
    ) -> Arc<FetchableEntity<T, P>> {
        if let Some(entity) = self.find(context_id, id) {
            return entity;
        }
        let mut entities = self.entities.write();
        let context = entities.entry(context_id.to_string()).or_default();
        Arc::clone(
            context
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(make())),
        )
    }

    pub fn find(&self, context_id: &str, id: &str) -> Option<Arc<FetchableEntity<T, P>>> {
        self.entities
            .read()
            .get(context_id)
            .and_then(|context| context.get(id))
            .cloned()
    }

    /// All entities of one context, sorted by id.
    pub fn in_context(&self, context_id: &str) -> Vec<Arc<FetchableEntity<T, P>>> {
        let mut found: Vec<_> = self
            .entities
            .read()
            .get(context_id)
            .map(|context| context.values().cloned().collect())
            .unwrap_or_default();
        found.sort_by(|a, b| a.id().cmp(b.id()));
        found
    }

    pub fn evict(&self, context_id: &str, id: &str) -> Option<Arc<FetchableEntity<T, P>>> {
        let mut entities = self.entities.write();
        let context = entities.get_mut(context_id)?;
        let evicted = context.remove(id);
        if context.is_empty() {
            entities.remove(context_id);
        }
        evicted
    }

    /// Put every settled entity back to `Ready`.
    ///
    /// Entities with a fetch in flight are left alone. Returns how many
    /// entities are `Ready` afterwards.
    pub fn reset_all(&self) -> usize {
        let entities = self.entities.read();
        let (mut ready, mut busy) = (0, 0);
        for entity in entities.values().flat_map(HashMap::values) {
            if entity.reset() {
                ready += 1;
            } else {
                busy += 1;
            }
        }
        debug!(ready, busy, "reset entity states");
        ready
    }

    pub fn len(&self) -> usize {
        self.entities.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, P> Default for EntityRegistry<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
