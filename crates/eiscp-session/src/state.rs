use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use eiscp_frame::Message;

/// Last known parameter for every command the device has reported.
///
/// Written by the session's receive task, read by any number of subscribers.
/// Readers only ever get copies.
#[derive(Debug, Clone, Default)]
pub struct StateCache {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl StateCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest parameter for a command, replacing any previous value.
    pub fn observe(&self, command: &str, parameter: &str) {
        // Entries are replaced whole, so a poisoned lock still guards a consistent map.
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match state.get_mut(command) {
            Some(value) => {
                value.clear();
                value.push_str(parameter);
            }
            None => {
                state.insert(command.to_string(), parameter.to_string());
            }
        }
    }

    /// Record a message received from the device.
    pub fn observe_message(&self, message: &Message) {
        self.observe(message.command(), message.parameter());
    }

    /// Independent copy of the whole state, taken under one read lock.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        state
            .iter()
            .map(|(command, parameter)| (command.clone(), parameter.clone()))
            .collect()
    }

    /// Latest parameter for one command.
    pub fn get(&self, command: &str) -> Option<String> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        state.get(command).cloned()
    }

    /// Number of distinct commands observed.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True if nothing has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn last_write_wins() {
        let cache = StateCache::new();
        cache.observe("PWR", "01");
        cache.observe("PWR", "02");

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.get("PWR").map(String::as_str), Some("02"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unobserved_commands_absent() {
        let cache = StateCache::new();
        assert!(cache.is_empty());
        cache.observe("MVL", "2A");

        assert!(cache.get("PWR").is_none());
        assert!(!cache.snapshot().contains_key("PWR"));
    }

    #[test]
    fn snapshot_is_independent_copy() {
        let cache = StateCache::new();
        cache.observe("PWR", "01");

        let mut snapshot = cache.snapshot();
        snapshot.insert("PWR".to_string(), "00".to_string());
        snapshot.insert("MVL".to_string(), "10".to_string());

        assert_eq!(cache.get("PWR").as_deref(), Some("01"));
        assert!(cache.get("MVL").is_none());
    }

    #[test]
    fn clones_share_state() {
        let cache = StateCache::new();
        let reader = cache.clone();
        cache.observe_message(&Message::parse("SLI23").unwrap());
        assert_eq!(reader.get("SLI").as_deref(), Some("23"));
    }

    #[test]
    fn observe_empty_parameter() {
        let cache = StateCache::new();
        cache.observe("PWR", "01");
        cache.observe("PWR", "");
        assert_eq!(cache.get("PWR").as_deref(), Some(""));
    }

    #[test]
    fn concurrent_readers_see_whole_values() {
        let cache = StateCache::new();
        cache.observe("MVL", "00");

        let writer = {
            let cache = cache.clone();
            thread::spawn(move || {
                for i in 0..500u32 {
                    cache.observe("MVL", &format!("{:02X}", i % 100));
                    cache.observe("PWR", if i % 2 == 0 { "01" } else { "00" });
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = cache.snapshot();
                        let volume = snapshot.get("MVL").expect("MVL always present");
                        assert_eq!(volume.len(), 2);
                        if let Some(power) = snapshot.get("PWR") {
                            assert!(power == "00" || power == "01");
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
