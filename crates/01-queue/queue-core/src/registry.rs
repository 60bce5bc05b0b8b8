//! Name-to-backend map with race-free lazy creation.
//!
//! The registry is owned by whichever component hosts the real storage and is
//! passed around by reference. Lookups take a shared lock; creation upgrades to
//! the exclusive lock and re-checks, so concurrent first references to one name
//! agree on a single backend. Queue operations run on the returned `Arc`
//! outside the registry lock, so traffic on different names never contends.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::QueueResult;

/// Outcome of [`QueueRegistry::get_or_create_with`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// The name was unseen and the factory produced a new backend.
    Created,
    /// A backend was already registered; the factory was not called.
    Existing,
}

/// Registry of named queues.
pub struct QueueRegistry<Q> {
    queues: RwLock<HashMap<String, Arc<Q>>>,
}

impl<Q> Default for QueueRegistry<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q> QueueRegistry<Q> {
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the backend registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<Arc<Q>> {
        self.queues.read().get(name).cloned()
    }

    /// Returns the backend for `name`, creating it with `factory` exactly once.
    ///
    /// An existing entry is never replaced. If the factory fails nothing is
    /// registered and the error is returned to the caller.
    pub fn get_or_create_with<F>(&self, name: &str, factory: F) -> QueueResult<(Arc<Q>, Registration)>
    where
        F: FnOnce() -> QueueResult<Q>,
    {
        if let Some(queue) = self.get(name) {
            return Ok((queue, Registration::Existing));
        }

        let mut queues = self.queues.write();
        if let Some(queue) = queues.get(name) {
            return Ok((Arc::clone(queue), Registration::Existing));
        }
        let queue = Arc::new(factory()?);
        queues.insert(name.to_owned(), Arc::clone(&queue));
        Ok((queue, Registration::Created))
    }

    /// Removes and returns the backend registered under `name`.
    pub fn remove(&self, name: &str) -> Option<Arc<Q>> {
        self.queues.write().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queues.read().contains_key(name)
    }

    /// Sorted snapshot of the registered names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.queues.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits every registered backend without holding the lock during `f`.
    pub fn for_each(&self, mut f: impl FnMut(&str, &Q)) {
        let snapshot: Vec<(String, Arc<Q>)> = self
            .queues
            .read()
            .iter()
            .map(|(name, queue)| (name.clone(), Arc::clone(queue)))
            .collect();
        for (name, queue) in &snapshot {
            f(name, queue);
        }
    }
}
