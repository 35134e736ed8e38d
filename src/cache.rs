use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::models::{CacheInfo, EngagementScore};

#[derive(Debug, Default)]
struct Snapshot {
    scores: HashMap<Uuid, EngagementScore>,
    last_computed_at: Option<DateTime<Utc>>,
}

/// Most recent completed scoring pass. Readers clone an `Arc` to the
/// current snapshot, so a concurrent `replace` can never expose a mix of
/// two passes. Only the batch engine writes, and only wholesale; there is
/// no expiry here - staleness is judged by callers via `last_computed_at`.
#[derive(Debug, Default)]
pub struct ScoreCache {
    current: RwLock<Arc<Snapshot>>,
}

impl ScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in the results of a finished pass, dropping every entry from
    /// the previous one.
    pub fn replace(&self, scores: Vec<EngagementScore>, computed_at: DateTime<Utc>) {
        let snapshot = Snapshot {
            scores: scores
                .into_iter()
                .map(|score| (score.client_id, score))
                .collect(),
            last_computed_at: Some(computed_at),
        };
        *self.current.write() = Arc::new(snapshot);
    }

    pub fn get(&self, client_id: Uuid) -> Option<EngagementScore> {
        self.current.read().scores.get(&client_id).cloned()
    }

    /// All cached scores, in no guaranteed order.
    pub fn list_all(&self) -> Vec<EngagementScore> {
        self.current.read().scores.values().cloned().collect()
    }

    pub fn info(&self) -> CacheInfo {
        let snapshot = self.current.read();
        CacheInfo {
            count: snapshot.scores.len(),
            last_computed_at: snapshot.last_computed_at,
        }
    }
}
