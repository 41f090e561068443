//! Host-side collaborators: an event registry standing in for page
//! visibility and window events, and the page reload capability.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use vpoll_core::Visibility;

pub type ListenerId = u64;

/// What a listener subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    VisibilityChange,
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    VisibilityChange(Visibility),
    Named(String),
}

impl HostEvent {
    fn key(&self) -> EventKey {
        match self {
            HostEvent::VisibilityChange(_) => EventKey::VisibilityChange,
            HostEvent::Named(name) => EventKey::Named(name.clone()),
        }
    }
}

type Listener = Arc<dyn Fn(&HostEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: ListenerId,
    listeners: Vec<(ListenerId, EventKey, Listener)>,
    visibility: Visibility,
}

/// Cloneable listener registry. Clones share listeners.
#[derive(Clone, Default)]
pub struct EventHub {
    registry: Arc<Mutex<Registry>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<F>(&self, key: EventKey, listener: F) -> ListenerId
    where
        F: Fn(&HostEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.push((id, key, Arc::new(listener)));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut registry = self.registry();
        let before = registry.listeners.len();
        registry.listeners.retain(|(listener_id, _, _)| *listener_id != id);
        registry.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.registry().listeners.len()
    }

    pub fn visibility(&self) -> Visibility {
        self.registry().visibility
    }

    /// Records the page visibility and notifies listeners if it changed.
    pub fn set_visibility(&self, visibility: Visibility) {
        {
            let mut registry = self.registry();
            if registry.visibility == visibility {
                return;
            }
            registry.visibility = visibility;
        }
        self.emit(&HostEvent::VisibilityChange(visibility));
    }

    /// Fires the named event.
    pub fn dispatch(&self, name: &str) {
        self.emit(&HostEvent::Named(name.to_string()));
    }

    fn emit(&self, event: &HostEvent) {
        let key = event.key();
        // Listeners may add or remove listeners, so call them unlocked.
        let matching: Vec<Listener> = self
            .registry()
            .listeners
            .iter()
            .filter(|(_, listener_key, _)| *listener_key == key)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();
        for listener in matching {
            listener(event);
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The page the controller runs in.
pub trait PageHost: Send + Sync {
    /// Reloads the page. Does not return control to the controller's cycle.
    fn reload(&self);
}
