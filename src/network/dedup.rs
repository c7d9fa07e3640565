// Fingerprints of gossip already processed

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Bounded set of seen fingerprints. The oldest entries are evicted first;
/// forgetting one only costs a redundant re-broadcast, never ledger state.
pub struct SeenSet {
    seen: Mutex<LruCache<String, ()>>,
}

impl SeenSet {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            seen: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Mark `fingerprint` seen. Returns true only for the first caller, so two
    /// handlers racing on the same message cannot both act on it.
    pub fn insert(&self, fingerprint: String) -> bool {
        match self.seen.lock() {
            Ok(mut seen) => seen.put(fingerprint, ()).is_none(),
            Err(_) => {
                log::error!("Seen set lock poisoned");
                true
            }
        }
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.seen
            .lock()
            .map(|seen| seen.contains(fingerprint))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_first_insert_wins() {
        let seen = SeenSet::new(8);
        assert!(seen.insert("a".to_string()));
        assert!(!seen.insert("a".to_string()));
        assert!(seen.contains("a"));
    }

    #[test]
    fn test_bounded() {
        let seen = SeenSet::new(2);
        seen.insert("a".to_string());
        seen.insert("b".to_string());
        seen.insert("c".to_string());

        assert_eq!(seen.len(), 2);
        assert!(!seen.contains("a"));
    }

    #[test]
    fn test_concurrent_inserts_single_winner() {
        let seen = Arc::new(SeenSet::new(16));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seen = seen.clone();
                std::thread::spawn(move || seen.insert("same".to_string()))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
