use crate::stats::{SessionSnapshot, SessionStats};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

struct SessionEntry {
    connected_at: Instant,
    stats: Arc<SessionStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub connected_secs: f64,
    #[serde(flatten)]
    pub stats: SessionSnapshot,
}

/// Active sessions by id.
///
/// Entries are sharded, so sessions never contend on a global lock.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the id is already registered.
    pub fn register(&self, session_id: &str, stats: Arc<SessionStats>) -> bool {
        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(SessionEntry {
                    connected_at: Instant::now(),
                    stats,
                });
                true
            }
        }
    }

    /// Returns true only for the call that actually removed the entry.
    pub fn unregister(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// `None` after disconnect is a normal outcome.
    pub fn lookup(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.get(session_id).map(|entry| SessionInfo {
            session_id: session_id.to_string(),
            connected_secs: entry.connected_at.elapsed().as_secs_f64(),
            stats: entry.stats.snapshot(),
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_register_and_lookup() {
        let registry = SessionRegistry::new();
        let stats = Arc::new(SessionStats::default());
        SessionStats::incr(&stats.frames_received);

        assert!(registry.register("a", stats));
        assert!(!registry.register("a", Arc::default()), "Duplicate id is refused");

        let info = registry.lookup("a").unwrap();
        assert_eq!(info.session_id, "a");
        assert_eq!(info.stats.frames_received, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_exactly_once() {
        let registry = SessionRegistry::new();
        registry.register("a", Arc::default());

        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert!(registry.lookup("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_unregister_has_single_winner() {
        let registry = Arc::new(SessionRegistry::new());
        registry.register("a", Arc::default());

        let winners: usize = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || registry.unregister("a"))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap() as usize)
            .sum();

        assert_eq!(winners, 1);
    }

    #[test]
    fn test_lookup_unknown_is_none() {
        assert!(SessionRegistry::new().lookup("ghost").is_none());
    }
}
