//! Registry of active calls keyed by stream identifier.

use crate::error::RelayError;
use std::collections::HashMap;

#[derive(Debug)]
pub struct SessionStore<T> {
    records: HashMap<String, T>,
}

impl<T> Default for SessionStore<T> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
        }
    }
}

impl<T> SessionStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a call. Stream identifiers are unique per process.
    pub fn insert(&mut self, stream_sid: &str, record: T) -> Result<(), RelayError> {
        if self.records.contains_key(stream_sid) {
            return Err(RelayError::DuplicateSession(stream_sid.to_string()));
        }
        self.records.insert(stream_sid.to_string(), record);
        Ok(())
    }

    pub fn remove(&mut self, stream_sid: &str) -> Option<T> {
        self.records.remove(stream_sid)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove() {
        let mut store = SessionStore::new();
        assert!(store.is_empty());

        store.insert("s1", 1).unwrap();
        store.insert("s2", 2).unwrap();
        assert_eq!(store.len(), 2);

        assert_eq!(store.remove("s1"), Some(1));
        assert_eq!(store.remove("s1"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_stream_is_rejected() {
        let mut store = SessionStore::new();
        store.insert("s1", "first").unwrap();
        let err = store.insert("s1", "second").unwrap_err();
        assert!(matches!(err, RelayError::DuplicateSession(ref id) if id == "s1"));
        assert_eq!(store.remove("s1"), Some("first"));
    }
}
