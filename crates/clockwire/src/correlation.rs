//! Outstanding request tracking for strict response correlation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;

/// Ids of requests published by this process that still await a response.
///
/// Ids are keyed by their JSON text, so `7` and `"7"` are distinct. Entries
/// older than the configured lifetime are treated as absent and purged lazily.
pub struct PendingRequests {
    entries: Mutex<HashMap<String, Instant>>,
    lifetime: Duration,
}

impl PendingRequests {
    /// Creates an empty table whose entries expire after `lifetime`.
    #[must_use]
    pub fn new(lifetime: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            lifetime,
        }
    }

    /// Records `id` as outstanding.
    pub fn record(&self, id: &Value) {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.retain(|_, sent| now.duration_since(*sent) < self.lifetime);
        entries.insert(id.to_string(), now);
    }

    /// Removes `id`, returning whether it was outstanding and unexpired.
    pub fn complete(&self, id: &Value) -> bool {
        self.lock()
            .remove(&id.to_string())
            .is_some_and(|sent| sent.elapsed() < self.lifetime)
    }

    /// Drops `id` without delivering anything, for requests that never left.
    pub fn forget(&self, id: &Value) {
        self.lock().remove(&id.to_string());
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
