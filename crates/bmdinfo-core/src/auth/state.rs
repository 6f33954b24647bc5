//! Current-user state with replay-latest observers.
//!
//! `AuthStateBroadcaster` is the one place the running client keeps the
//! signed-in user. Observers are called synchronously: a new observer gets
//! the present value during `subscribe`, and every `set_current_user` call
//! has reached all observers by the time it returns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::debug;

use super::store::SessionStore;
use crate::models::User;

type Observer = Arc<dyn Fn(Option<&User>) + Send + Sync>;

struct Registry {
    current: Option<User>,
    observers: Vec<(u64, Observer)>,
}

struct Inner {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct AuthStateBroadcaster {
    inner: Arc<Inner>,
}

impl AuthStateBroadcaster {
    pub fn new(initial: Option<User>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    current: initial,
                    observers: Vec::new(),
                }),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Seed the current user from whatever session is persisted.
    pub fn from_store(store: &SessionStore) -> Self {
        let initial = store.load().map(|s| s.user);
        debug!(restored = initial.is_some(), "Auth state initialized");
        Self::new(initial)
    }

    pub fn current(&self) -> Option<User> {
        self.registry().current.clone()
    }

    /// Register `observer`. It is called with the current value before this
    /// returns, then with every later change until the subscription drops.
    #[must_use = "dropping the Subscription unsubscribes the observer"]
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(Option<&User>) + Send + Sync + 'static,
    {
        let observer: Observer = Arc::new(observer);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let current = {
            let mut registry = self.registry();
            registry.observers.push((id, observer.clone()));
            registry.current.clone()
        };
        observer(current.as_ref());

        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Replace the current user and notify every observer.
    pub fn set_current_user(&self, user: Option<User>) {
        // The lock is released before fan-out so observers may call back in.
        let observers: Vec<Observer> = {
            let mut registry = self.registry();
            registry.current = user.clone();
            registry.observers.iter().map(|(_, o)| o.clone()).collect()
        };
        debug!(
            signed_in = user.is_some(),
            observers = observers.len(),
            "Broadcasting auth state"
        );
        for observer in observers {
            observer(user.as_ref());
        }
    }

    pub fn observer_count(&self) -> usize {
        self.registry().observers.len()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle for a registered observer; unsubscribes on drop.
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .observers
                .retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            username: format!("user{}", id),
            email: format!("user{}@x.com", id),
            role: "user".to_string(),
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<Option<String>>>>, impl Fn(Option<&User>) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = move |u: Option<&User>| {
            sink.lock().unwrap().push(u.map(|u| u.id.clone()));
        };
        (seen, observer)
    }

    #[test]
    fn test_new_subscriber_gets_current_value() {
        let state = AuthStateBroadcaster::new(Some(user("1")));
        let (seen, observer) = recorder();

        let _sub = state.subscribe(observer);

        assert_eq!(*seen.lock().unwrap(), vec![Some("1".to_string())]);
    }

    #[test]
    fn test_new_subscriber_gets_none_when_signed_out() {
        let state = AuthStateBroadcaster::new(None);
        let (seen, observer) = recorder();

        let _sub = state.subscribe(observer);

        assert_eq!(*seen.lock().unwrap(), vec![None]);
    }

    #[test]
    fn test_changes_delivered_in_order_before_return() {
        let state = AuthStateBroadcaster::new(None);
        let (seen, observer) = recorder();
        let _sub = state.subscribe(observer);

        state.set_current_user(Some(user("1")));
        assert_eq!(seen.lock().unwrap().len(), 2);
        state.set_current_user(Some(user("2")));
        state.set_current_user(None);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some("1".to_string()), Some("2".to_string()), None]
        );
        assert_eq!(state.current(), None);
    }

    #[test]
    fn test_late_subscriber_sees_only_latest() {
        let state = AuthStateBroadcaster::new(None);
        state.set_current_user(Some(user("1")));
        state.set_current_user(Some(user("2")));

        let (seen, observer) = recorder();
        let _sub = state.subscribe(observer);

        assert_eq!(*seen.lock().unwrap(), vec![Some("2".to_string())]);
    }

    #[test]
    fn test_dropped_subscription_stops_delivery() {
        let state = AuthStateBroadcaster::new(None);
        let (seen, observer) = recorder();
        let sub = state.subscribe(observer);
        assert_eq!(state.observer_count(), 1);

        sub.unsubscribe();
        state.set_current_user(Some(user("1")));

        assert_eq!(state.observer_count(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![None]);
    }

    #[test]
    fn test_from_store_restores_user() {
        let store = SessionStore::interactive(
            Arc::new(super::super::store::MemoryStorage::new()),
            Arc::new(super::super::store::MemoryStorage::new()),
        );
        assert_eq!(AuthStateBroadcaster::from_store(&store).current(), None);

        store.save("T", &user("9")).unwrap();
        assert_eq!(AuthStateBroadcaster::from_store(&store).current(), Some(user("9")));
    }
}
