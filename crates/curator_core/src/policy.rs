use std::sync::{Arc, Mutex, MutexGuard};

use curator_logging::curator_info;

use crate::Generation;

/// Active filters plus the generation they were published under.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolicySession {
    generation: Generation,
    active_filters: Vec<String>,
}

impl PolicySession {
    pub fn new(filters: Vec<String>) -> Self {
        Self {
            generation: 1,
            active_filters: filters,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn active_filters(&self) -> &[String] {
        &self.active_filters
    }

    /// Replaces the filters and bumps the generation in one step.
    pub fn replace_filters(&mut self, filters: Vec<String>) -> Generation {
        self.active_filters = filters;
        self.generation += 1;
        self.generation
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot {
            generation: self.generation,
            filters: Arc::from(self.active_filters.as_slice()),
        }
    }
}

/// Immutable view of the policy handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySnapshot {
    pub generation: Generation,
    pub filters: Arc<[String]>,
}

impl PolicySnapshot {
    pub fn has_categories(&self) -> bool {
        !self.filters.is_empty()
    }
}

type PolicyListener = Box<dyn Fn(&PolicySnapshot) + Send>;

/// Shared policy session: the editing surface writes, the engine reads.
#[derive(Clone)]
pub struct PolicyStore {
    session: Arc<Mutex<PolicySession>>,
    listeners: Arc<Mutex<Vec<PolicyListener>>>,
}

impl PolicyStore {
    pub fn new(filters: Vec<String>) -> Self {
        Self {
            session: Arc::new(Mutex::new(PolicySession::new(filters))),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn get_active_policy(&self) -> PolicySnapshot {
        self.session().snapshot()
    }

    pub fn generation(&self) -> Generation {
        self.session().generation()
    }

    /// Publishes a new filter set. Listeners run after the session lock is
    /// released, so they may read the store again.
    pub fn replace_filters(&self, filters: Vec<String>) -> Generation {
        let snapshot = {
            let mut session = self.session();
            session.replace_filters(filters);
            session.snapshot()
        };
        curator_info!(
            "policy generation {} published with {} filter(s)",
            snapshot.generation,
            snapshot.filters.len()
        );
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for listener in listeners.iter() {
            listener(&snapshot);
        }
        snapshot.generation
    }

    pub fn on_policy_changed(&self, callback: impl Fn(&PolicySnapshot) + Send + 'static) {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(callback));
    }

    fn session(&self) -> MutexGuard<'_, PolicySession> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyStore")
            .field("session", &*self.session())
            .finish_non_exhaustive()
    }
}
