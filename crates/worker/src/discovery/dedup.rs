use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use meetscribe_common::ids::RoomId;

/// Per-room claim-attempt cache shared across all three discovery
/// notifiers (spec §4.8). A room id seen in-window by any notifier is
/// skipped by the others; the entry is cleared when that room's
/// processing completes so it can be legitimately re-claimed later.
pub struct DedupCache {
    window: Duration,
    seen: Mutex<HashMap<RoomId, Instant>>,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if this room should be attempted (not seen within
    /// the window), and records the attempt as a side effect.
    pub fn try_claim_attempt(&self, room_id: RoomId) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap();

        if let Some(last) = seen.get(&room_id) {
            if now.duration_since(*last) < self.window {
                return false;
            }
        }

        seen.insert(room_id, now);
        true
    }

    /// Clear a room's entry once processing completes, allowing it to be
    /// legitimately re-processed later.
    pub fn clear(&self, room_id: RoomId) {
        self.seen.lock().unwrap().remove(&room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_allowed_subsequent_skipped() {
        let cache = DedupCache::new(Duration::from_secs(30));
        let room = RoomId::new();

        assert!(cache.try_claim_attempt(room));
        assert!(!cache.try_claim_attempt(room));
    }

    #[test]
    fn clear_allows_reattempt() {
        let cache = DedupCache::new(Duration::from_secs(30));
        let room = RoomId::new();

        assert!(cache.try_claim_attempt(room));
        cache.clear(room);
        assert!(cache.try_claim_attempt(room));
    }
}
