//! Per-client application sessions.
//!
//! A session is a clone of an application kept per client fingerprint (peer address and
//! user agent) and per registered application, so one client talking to two hosts holds
//! two independent sessions. The table is a [`DashMap`]: request workers create and touch
//! sessions while the sweep evicts idle ones, and creation for one key happens at most
//! once through the entry API.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::Application;

/// Fingerprint of a client: `<peer ip>@<user agent>`.
pub fn fingerprint(peer: IpAddr, user_agent: &str) -> String {
    format!("{peer}@{user_agent}")
}

/// A client fingerprint scoped to the registered application the session was cloned from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub application: Uuid,
    pub fingerprint: String,
}

impl SessionKey {
    pub fn new(application: Uuid, fingerprint: impl Into<String>) -> Self {
        Self { application, fingerprint: fingerprint.into() }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.fingerprint, self.application)
    }
}

#[derive(Debug)]
pub struct SessionManager {
    sessions: DashMap<SessionKey, Arc<Application>>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: DashMap::new(), ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, key: &SessionKey) -> Option<Arc<Application>> {
        self.sessions.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// The session of `fingerprint` on `base`, cloning `base` when there is none yet. The
    /// flag is true when this call created the session.
    pub fn get_or_create(&self, fingerprint: &str, base: &Application) -> (Arc<Application>, bool) {
        match self.sessions.entry(SessionKey::new(base.id(), fingerprint)) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let session = Arc::new(base.clone_session());
                entry.insert(Arc::clone(&session));
                info!(fingerprint, application = %base.id(), session = %session.id(), "session created");
                (session, true)
            }
        }
    }

    pub fn evict(&self, key: &SessionKey) -> Option<Arc<Application>> {
        let removed = self.sessions.remove(key).map(|(_, session)| session);
        if removed.is_some() {
            debug!(key = %key, "session evicted");
        }
        removed
    }

    /// Removes every session idle for longer than the TTL at `now`.
    ///
    /// The idle check is repeated under the entry lock, so a session touched after the
    /// scan started survives.
    pub fn sweep(&self, now: Instant) -> Vec<Arc<Application>> {
        let candidates: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_idle(now, self.ttl))
            .map(|entry| entry.key().clone())
            .collect();

        let evicted: Vec<_> = candidates
            .iter()
            .filter_map(|key| self.sessions.remove_if(key, |_, session| session.is_idle(now, self.ttl)))
            .map(|(_, session)| session)
            .collect();

        if !evicted.is_empty() {
            info!(count = evicted.len(), remaining = self.sessions.len(), "idle sessions unloaded");
        }
        evicted
    }

    /// Removes every session.
    pub fn drain(&self) -> Vec<Arc<Application>> {
        let keys: Vec<SessionKey> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        keys.iter().filter_map(|key| self.sessions.remove(key)).map(|(_, session)| session).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn base() -> Application {
        Application::builder().host_names(["a.test"]).build().unwrap()
    }

    #[test]
    fn fingerprint_joins_ip_and_agent() {
        assert_eq!(fingerprint("10.0.0.1".parse().unwrap(), "curl/8"), "10.0.0.1@curl/8");
    }

    #[test]
    fn get_or_create_clones_once() {
        let manager = SessionManager::new(Duration::from_secs(60));
        let base = base();

        let (first, created) = manager.get_or_create("k", &base);
        assert!(created);
        assert_ne!(first.id(), base.id());

        let (second, created) = manager.get_or_create("k", &base);
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn same_client_gets_one_session_per_application() {
        let manager = SessionManager::new(Duration::from_secs(60));
        let first_app = base();
        let second_app = Application::builder().host_names(["b.test"]).build().unwrap();

        let (on_first, _) = manager.get_or_create("10.0.0.1@curl/8", &first_app);
        let (on_second, created) = manager.get_or_create("10.0.0.1@curl/8", &second_app);

        assert!(created);
        assert!(!Arc::ptr_eq(&on_first, &on_second));
        assert_eq!(on_second.config().host_names, vec!["b.test".to_string()]);
        assert_eq!(manager.len(), 2);
        assert!(manager.get(&SessionKey::new(second_app.id(), "10.0.0.1@curl/8")).is_some());
    }

    #[test]
    fn concurrent_creation_yields_one_session() {
        let manager = Arc::new(SessionManager::new(Duration::from_secs(60)));
        let base = Arc::new(base());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let base = Arc::clone(&base);
                thread::spawn(move || manager.get_or_create("same", &base))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
        assert!(results.iter().all(|(session, _)| Arc::ptr_eq(session, &results[0].0)));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn sweep_evicts_only_idle_sessions() {
        let ttl = Duration::from_secs(100);
        let manager = SessionManager::new(ttl);
        let base = base();
        let start = Instant::now();

        let (old, _) = manager.get_or_create("old", &base);
        let (fresh, _) = manager.get_or_create("fresh", &base);
        old.touch(start);
        // a request at ttl - 1 resets eligibility
        fresh.touch(start + ttl - Duration::from_secs(1));

        assert!(manager.sweep(start + ttl).is_empty());

        let evicted = manager.sweep(start + ttl + Duration::from_secs(1));
        assert_eq!(evicted.len(), 1);
        assert!(Arc::ptr_eq(&evicted[0], &old));
        assert!(manager.get(&SessionKey::new(base.id(), "fresh")).is_some());
        assert!(manager.get(&SessionKey::new(base.id(), "old")).is_none());
    }

    #[test]
    fn evict_and_drain() {
        let manager = SessionManager::new(Duration::from_secs(1));
        let base = base();
        manager.get_or_create("a", &base);
        manager.get_or_create("b", &base);

        let key = SessionKey::new(base.id(), "a");
        assert!(manager.evict(&key).is_some());
        assert!(manager.evict(&key).is_none());
        assert_eq!(manager.drain().len(), 1);
        assert!(manager.is_empty());
    }
}
