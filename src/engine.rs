use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use uuid::Uuid;

use crate::cache::ScoreCache;
use crate::error::EngineError;
use crate::models::{CacheInfo, EngagementReport, EngagementScore};
use crate::report;
use crate::scorer;
use crate::store::RecordStore;

const DEFAULT_MAX_CONCURRENT_CLIENTS: usize = 8;

/// Batch scoring engine. Owns the score cache; the record store is
/// injected so the same engine runs against Postgres or a test double.
pub struct EngagementEngine {
    store: Arc<dyn RecordStore>,
    cache: ScoreCache,
    max_concurrent: usize,
}

impl EngagementEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_concurrency(store, DEFAULT_MAX_CONCURRENT_CLIENTS)
    }

    pub fn with_concurrency(store: Arc<dyn RecordStore>, max_concurrent: usize) -> Self {
        Self {
            store,
            cache: ScoreCache::new(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Run one complete scoring pass over every known client.
    ///
    /// Clients are scored with bounded concurrency against a single "now"
    /// captured at pass start, so the whole fleet shares one lookback
    /// window. A client that fails to score is logged and omitted; only a
    /// failure to list the clients aborts the pass. The cache is replaced
    /// wholesale once the pass finishes.
    pub async fn run_batch(&self) -> Result<Vec<EngagementScore>, EngineError> {
        let now = Utc::now();
        let clients = self
            .store
            .list_clients()
            .await
            .map_err(EngineError::ClientList)?;
        let client_count = clients.len();
        tracing::info!(clients = client_count, "starting engagement scoring pass");

        let results: Vec<Option<EngagementScore>> = stream::iter(clients)
            .map(|client| {
                let store = Arc::clone(&self.store);
                async move {
                    match scorer::score_client(store.as_ref(), client.id, now).await {
                        Ok(score) => Some(score),
                        Err(e) => {
                            let cause = format!("{:#}", anyhow::Error::new(e));
                            tracing::warn!(
                                client_id = %client.id,
                                error = %cause,
                                "skipping client in scoring pass"
                            );
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let scores: Vec<EngagementScore> = results.into_iter().flatten().collect();
        let skipped = client_count - scores.len();
        if skipped > 0 {
            tracing::warn!(skipped, total = client_count, "some clients were not scored");
        }

        self.cache.replace(scores.clone(), Utc::now());
        tracing::info!(scored = scores.len(), "engagement scoring pass complete");
        Ok(scores)
    }

    pub fn cached_scores(&self) -> Vec<EngagementScore> {
        self.cache.list_all()
    }

    pub fn cached_score(&self, client_id: Uuid) -> Option<EngagementScore> {
        self.cache.get(client_id)
    }

    pub fn cache_info(&self) -> CacheInfo {
        self.cache.info()
    }

    /// Fresh pass, then fleet aggregates. The report never mixes passes:
    /// it is built from exactly the scores the batch just produced.
    pub async fn generate_report(&self) -> Result<EngagementReport, EngineError> {
        let scores = self.run_batch().await?;
        Ok(report::build_report(&scores, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityEvent, SessionBooking, WorkoutCompletion};
    use crate::store::memory::MemoryStore;
    use chrono::Duration;

    fn populated_store(client_count: usize) -> MemoryStore {
        let now = Utc::now();
        let mut store = MemoryStore::default();
        for i in 0..client_count {
            let id = store.add_client(&format!("Client {i}"), &format!("client{i}@example.com"));
            store.activity.insert(
                id,
                (0..=i)
                    .map(|d| ActivityEvent {
                        occurred_at: now - Duration::days(d as i64 % 7),
                    })
                    .collect(),
            );
            store.workouts.insert(
                id,
                (0..i)
                    .map(|_| WorkoutCompletion {
                        completed_at: now - Duration::days(2),
                    })
                    .collect(),
            );
            store.bookings.insert(
                id,
                vec![SessionBooking {
                    session_id: Some(Uuid::new_v4()),
                    attended: i % 2 == 0,
                    booked_at: now - Duration::days(1),
                    session_scheduled_at: Some(now - Duration::days(1)),
                }],
            );
        }
        store
    }

    #[tokio::test]
    async fn one_failing_client_does_not_poison_the_pass() {
        let mut store = populated_store(5);
        let flaky = store.clients[2].id;
        store.failing_booking_fetches.insert(flaky);

        let engine = EngagementEngine::new(Arc::new(store));
        let scores = engine.run_batch().await.unwrap();

        assert_eq!(scores.len(), 4);
        assert!(scores.iter().all(|s| s.client_id != flaky));
        let info = engine.cache_info();
        assert_eq!(info.count, 4);
        assert!(info.last_computed_at.is_some());
        assert!(engine.cached_score(flaky).is_none());
    }

    #[tokio::test]
    async fn vanished_client_is_skipped_not_fatal() {
        let mut store = populated_store(3);
        let ghost = store.clients[0].id;
        store.vanished_clients.insert(ghost);

        let engine = EngagementEngine::new(Arc::new(store));
        let scores = engine.run_batch().await.unwrap();
        assert_eq!(scores.len(), 2);
    }

    #[tokio::test]
    async fn empty_client_list_is_a_valid_pass() {
        let engine = EngagementEngine::new(Arc::new(MemoryStore::default()));
        let scores = engine.run_batch().await.unwrap();
        assert!(scores.is_empty());

        // The pass still stamps the cache.
        let info = engine.cache_info();
        assert_eq!(info.count, 0);
        assert!(info.last_computed_at.is_some());

        let report = engine.generate_report().await.unwrap();
        assert_eq!(report.total_clients, 0);
        assert_eq!(report.average_engagement_score, 0.0);
    }

    #[tokio::test]
    async fn consecutive_passes_agree_on_everything_but_the_stamp() {
        let engine = EngagementEngine::new(Arc::new(populated_store(6)));

        let mut first = engine.run_batch().await.unwrap();
        let mut second = engine.run_batch().await.unwrap();
        first.sort_by_key(|s| s.client_id);
        second.sort_by_key(|s| s.client_id);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.client_id, b.client_id);
            assert_eq!(a.overall_score, b.overall_score);
            assert_eq!(a.sub_scores.activity, b.sub_scores.activity);
            assert_eq!(a.sub_scores.session, b.sub_scores.session);
            assert_eq!(a.churn_risk, b.churn_risk);
            assert_eq!(a.days_since_last_activity, b.days_since_last_activity);
            assert_eq!(a.insights, b.insights);
        }
    }

    #[tokio::test]
    async fn report_reflects_the_fresh_pass() {
        let engine = EngagementEngine::new(Arc::new(populated_store(12)));
        let report = engine.generate_report().await.unwrap();

        assert_eq!(report.total_clients, 12);
        assert_eq!(report.top_engaged_clients.len(), 10);
        assert_eq!(report.low_engaged_clients.len(), 10);
        let dist = &report.churn_risk_distribution;
        assert_eq!(dist.low + dist.medium + dist.high, 12);
        // Everyone in the fixture was active within the window.
        assert_eq!(report.active_clients, 12);
        assert_eq!(
            report.at_risk_clients,
            dist.high,
            "at-risk count tracks the high-risk bucket"
        );
    }

    #[tokio::test]
    async fn cached_scores_match_the_last_pass() {
        let engine = EngagementEngine::new(Arc::new(populated_store(4)));
        let scores = engine.run_batch().await.unwrap();

        let mut cached = engine.cached_scores();
        cached.sort_by_key(|s| s.client_id);
        let mut returned = scores;
        returned.sort_by_key(|s| s.client_id);

        assert_eq!(cached.len(), returned.len());
        for (a, b) in cached.iter().zip(returned.iter()) {
            assert_eq!(a.client_id, b.client_id);
            assert_eq!(a.overall_score, b.overall_score);
        }
    }
}
