use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async mutexes keyed by string, created on demand.
///
/// Used to serialize work per identity (acceptance, sweeps) and per review
/// (member edits). Not reentrant: a holder must not lock the same key again.
#[derive(Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let m = {
            let mut map = self.inner.lock().expect("lock poisoned");
            // Drop entries nobody holds or waits on.
            map.retain(|k, m| k == key || Arc::strong_count(m) > 1);
            Arc::clone(map.entry(key.to_string()).or_default())
        };
        m.lock_owned().await
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn identity_scope(identity_id: &str) -> String {
    format!("identity:{identity_id}")
}

pub(crate) fn review_scope(review_id: &str) -> String {
    format!("review:{review_id}")
}
