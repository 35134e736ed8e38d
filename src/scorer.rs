use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ScoreError, StoreError};
use crate::models::{ChurnRisk, Client, EngagementScore, SignalRecords, SubScores};
use crate::signals;
use crate::store::RecordStore;

// Signal weights for the overall score. These must sum to exactly 1.0;
// retune them together or the overall score leaves the 0..=100 range.
pub const ACTIVITY_WEIGHT: f64 = 0.15;
pub const SESSION_WEIGHT: f64 = 0.30;
pub const WORKOUT_WEIGHT: f64 = 0.25;
pub const CONTENT_WEIGHT: f64 = 0.20;
pub const MILESTONE_WEIGHT: f64 = 0.10;

/// Reported when no signal source has any record for the client.
pub const NO_ACTIVITY_SENTINEL_DAYS: i64 = 999;

/// Fetch one client's five record sets and compute their engagement score.
///
/// The five signal queries are independent reads and are issued
/// concurrently. Every failure is tagged with the client and the signal
/// that failed so the batch engine can log it before skipping the client.
pub async fn score_client(
    store: &dyn RecordStore,
    client_id: Uuid,
    now: DateTime<Utc>,
) -> Result<EngagementScore, ScoreError> {
    let window_start = signals::lookback_start(now);

    let client = store.get_client(client_id).await.map_err(|e| match e {
        StoreError::NotFound => ScoreError::ClientNotFound(client_id),
        other => ScoreError::SignalFetch {
            signal: "client",
            client_id,
            source: other,
        },
    })?;

    let (activity, bookings, workouts, content, milestones) = tokio::try_join!(
        tagged(
            store.list_activity_events(client_id, window_start),
            "activity",
            client_id,
        ),
        tagged(store.list_session_bookings(client_id), "session", client_id),
        tagged(
            store.list_workout_completions(client_id, window_start),
            "workout",
            client_id,
        ),
        tagged(
            store.list_content_views(client_id, window_start),
            "content",
            client_id,
        ),
        tagged(
            store.list_milestone_unlocks(client_id, window_start),
            "milestone",
            client_id,
        ),
    )?;

    let records = SignalRecords {
        activity,
        bookings,
        workouts,
        content,
        milestones,
    };

    Ok(compute_score(&client, &records, now))
}

async fn tagged<T>(
    fut: impl Future<Output = Result<T, StoreError>>,
    signal: &'static str,
    client_id: Uuid,
) -> Result<T, ScoreError> {
    fut.await.map_err(|source| ScoreError::SignalFetch {
        signal,
        client_id,
        source,
    })
}

/// Pure scoring step: records in, score out. `now` is captured once per
/// batch pass so every client is measured against the same window.
pub fn compute_score(
    client: &Client,
    records: &SignalRecords,
    now: DateTime<Utc>,
) -> EngagementScore {
    let window_start = signals::lookback_start(now);

    let sub_scores = SubScores {
        activity: signals::activity_subscore(&records.activity),
        session: signals::session_subscore(&records.bookings, window_start),
        workout: signals::workout_subscore(&records.workouts),
        content: signals::content_subscore(&records.content),
        milestone: signals::milestone_subscore(&records.milestones),
    };

    let overall_score = (sub_scores.activity * ACTIVITY_WEIGHT
        + sub_scores.session * SESSION_WEIGHT
        + sub_scores.workout * WORKOUT_WEIGHT
        + sub_scores.content * CONTENT_WEIGHT
        + sub_scores.milestone * MILESTONE_WEIGHT)
        .round();

    let last_activity = last_activity(records);
    let days_since_last_activity = last_activity
        .map(|at| (now - at).num_days())
        .unwrap_or(NO_ACTIVITY_SENTINEL_DAYS);

    let churn_risk = classify_churn_risk(overall_score, days_since_last_activity);
    let insights = build_insights(overall_score, days_since_last_activity, records);

    EngagementScore {
        client_id: client.id,
        client_name: client.full_name.clone(),
        client_email: client.email.clone(),
        sub_scores,
        overall_score,
        churn_risk,
        last_activity,
        days_since_last_activity,
        computed_at: now,
        insights,
    }
}

/// Most recent touch point across activity events, booking times, workout
/// completions, and content watch times. Milestone unlocks do not count as
/// activity. `None` means the client has no signal at all.
fn last_activity(records: &SignalRecords) -> Option<DateTime<Utc>> {
    let mut latest: Option<DateTime<Utc>> = None;
    let mut consider = |at: DateTime<Utc>| {
        if latest.is_none_or(|current| at > current) {
            latest = Some(at);
        }
    };

    for event in &records.activity {
        consider(event.occurred_at);
    }
    for booking in &records.bookings {
        consider(booking.booked_at);
    }
    for workout in &records.workouts {
        consider(workout.completed_at);
    }
    for view in &records.content {
        consider(view.last_watched_at);
    }

    latest
}

/// First matching rule wins: engaged and recent is low risk; a weak score
/// or a long silence is high risk; everything else is medium.
pub fn classify_churn_risk(overall_score: f64, days_since_last_activity: i64) -> ChurnRisk {
    if overall_score >= 70.0 && days_since_last_activity <= 7 {
        ChurnRisk::Low
    } else if overall_score < 40.0 || days_since_last_activity > 14 {
        ChurnRisk::High
    } else {
        ChurnRisk::Medium
    }
}

/// Human-readable observations, in a fixed order: engagement tier, recency,
/// then one nugget per signal where the record mix warrants it.
fn build_insights(
    overall_score: f64,
    days_since_last_activity: i64,
    records: &SignalRecords,
) -> Vec<String> {
    let mut insights = Vec::new();

    if overall_score >= 70.0 {
        insights.push("Highly engaged client with excellent retention indicators".to_string());
    } else if overall_score >= 40.0 {
        insights.push(
            "Moderately engaged - could benefit from re-engagement campaigns".to_string(),
        );
    } else {
        insights.push("Low engagement - at risk of churning".to_string());
    }

    if days_since_last_activity > 14 {
        insights.push(format!(
            "No activity for {days_since_last_activity} days - immediate attention needed"
        ));
    } else if days_since_last_activity > 7 {
        insights.push(format!("{days_since_last_activity} days since last activity"));
    } else {
        insights.push("Recently active user".to_string());
    }

    if records.bookings.is_empty() {
        insights.push("Not attending sessions - recommend personal outreach".to_string());
    } else if records.bookings.len() >= 5 {
        insights.push("Frequent session attendee".to_string());
    }

    if records.workouts.is_empty() {
        insights.push("No workouts completed - review training plan".to_string());
    } else if records.workouts.len() >= 10 {
        insights.push("Consistent workout completion".to_string());
    }

    if !records.content.is_empty() {
        insights.push("Engaged with video content".to_string());
    }

    if !records.milestones.is_empty() {
        insights.push(format!("Unlocked {} achievements", records.milestones.len()));
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityEvent, ContentView, MilestoneUnlock, SessionBooking, WorkoutCompletion};
    use crate::store::memory::MemoryStore;
    use chrono::Duration;

    fn sample_client() -> Client {
        Client {
            id: Uuid::new_v4(),
            full_name: "Dana Reyes".to_string(),
            email: "dana.reyes@example.com".to_string(),
        }
    }

    fn attended_booking(now: DateTime<Utc>, days_ago: i64) -> SessionBooking {
        SessionBooking {
            session_id: Some(Uuid::new_v4()),
            attended: true,
            booked_at: now - Duration::days(days_ago),
            session_scheduled_at: Some(now - Duration::days(days_ago)),
        }
    }

    #[test]
    fn weights_sum_to_one() {
        let sum =
            ACTIVITY_WEIGHT + SESSION_WEIGHT + WORKOUT_WEIGHT + CONTENT_WEIGHT + MILESTONE_WEIGHT;
        assert!((sum - 1.0).abs() < 1e-12, "weights sum to {sum}");
    }

    #[test]
    fn churn_risk_boundaries() {
        assert_eq!(classify_churn_risk(70.0, 7), ChurnRisk::Low);
        assert_eq!(classify_churn_risk(69.0, 7), ChurnRisk::Medium);
        assert_eq!(classify_churn_risk(40.0, 15), ChurnRisk::High);
        assert_eq!(classify_churn_risk(39.0, 0), ChurnRisk::High);
        assert_eq!(classify_churn_risk(70.0, 8), ChurnRisk::Medium);
        assert_eq!(classify_churn_risk(100.0, 14), ChurnRisk::Medium);
        assert_eq!(classify_churn_risk(100.0, 15), ChurnRisk::High);
    }

    #[test]
    fn silent_client_scores_zero_and_high_risk() {
        let now = Utc::now();
        let score = compute_score(&sample_client(), &SignalRecords::default(), now);

        assert_eq!(score.overall_score, 0.0);
        assert_eq!(score.churn_risk, ChurnRisk::High);
        assert_eq!(score.last_activity, None);
        assert_eq!(score.days_since_last_activity, NO_ACTIVITY_SENTINEL_DAYS);
        assert_eq!(score.insights[0], "Low engagement - at risk of churning");
        assert_eq!(
            score.insights[1],
            "No activity for 999 days - immediate attention needed"
        );
        assert!(score
            .insights
            .contains(&"Not attending sessions - recommend personal outreach".to_string()));
        assert!(score
            .insights
            .contains(&"No workouts completed - review training plan".to_string()));
    }

    #[test]
    fn saturated_core_signals_score_seventy() {
        let now = Utc::now();
        let records = SignalRecords {
            activity: (0..50)
                .map(|i| ActivityEvent {
                    occurred_at: now - Duration::days(i % 20),
                })
                .collect(),
            bookings: (0..10).map(|i| attended_booking(now, i % 25)).collect(),
            workouts: (0..20)
                .map(|i| WorkoutCompletion {
                    completed_at: now - Duration::days(i % 15),
                })
                .collect(),
            content: Vec::new(),
            milestones: Vec::new(),
        };

        let score = compute_score(&sample_client(), &records, now);

        assert_eq!(score.sub_scores.activity, 100.0);
        assert_eq!(score.sub_scores.session, 100.0);
        assert_eq!(score.sub_scores.workout, 100.0);
        assert_eq!(score.sub_scores.content, 0.0);
        assert_eq!(score.sub_scores.milestone, 0.0);
        assert_eq!(score.overall_score, 70.0);
        // Latest record is from today, so the recency gate passes.
        assert_eq!(score.days_since_last_activity, 0);
        assert_eq!(score.churn_risk, ChurnRisk::Low);
    }

    #[test]
    fn stale_but_engaged_client_is_medium_risk() {
        let now = Utc::now();
        let records = SignalRecords {
            activity: (0..50)
                .map(|_| ActivityEvent {
                    occurred_at: now - Duration::days(10),
                })
                .collect(),
            bookings: (0..10).map(|_| attended_booking(now, 10)).collect(),
            workouts: (0..20)
                .map(|_| WorkoutCompletion {
                    completed_at: now - Duration::days(10),
                })
                .collect(),
            content: Vec::new(),
            milestones: Vec::new(),
        };

        let score = compute_score(&sample_client(), &records, now);
        assert_eq!(score.overall_score, 70.0);
        assert_eq!(score.days_since_last_activity, 10);
        assert_eq!(score.churn_risk, ChurnRisk::Medium);
        assert_eq!(score.insights[1], "10 days since last activity");
    }

    #[test]
    fn insights_keep_their_order_when_all_rules_fire() {
        let now = Utc::now();
        let records = SignalRecords {
            activity: (0..60)
                .map(|_| ActivityEvent { occurred_at: now })
                .collect(),
            bookings: (0..10).map(|_| attended_booking(now, 1)).collect(),
            workouts: (0..20)
                .map(|_| WorkoutCompletion { completed_at: now })
                .collect(),
            content: (0..10)
                .map(|_| ContentView {
                    completed: true,
                    watched_seconds: 360,
                    last_watched_at: now,
                })
                .collect(),
            milestones: (0..5)
                .map(|_| MilestoneUnlock { unlocked_at: now })
                .collect(),
        };

        let score = compute_score(&sample_client(), &records, now);
        assert_eq!(score.overall_score, 100.0);
        assert_eq!(
            score.insights,
            vec![
                "Highly engaged client with excellent retention indicators".to_string(),
                "Recently active user".to_string(),
                "Frequent session attendee".to_string(),
                "Consistent workout completion".to_string(),
                "Engaged with video content".to_string(),
                "Unlocked 5 achievements".to_string(),
            ]
        );
    }

    #[test]
    fn booking_time_counts_as_activity_even_for_old_sessions() {
        let now = Utc::now();
        let records = SignalRecords {
            bookings: vec![SessionBooking {
                session_id: Some(Uuid::new_v4()),
                attended: false,
                booked_at: now - Duration::days(3),
                session_scheduled_at: Some(now - Duration::days(60)),
            }],
            ..SignalRecords::default()
        };

        let score = compute_score(&sample_client(), &records, now);
        // The session itself is outside the window, so it adds no score,
        // but the booking touch point still sets recency.
        assert_eq!(score.sub_scores.session, 0.0);
        assert_eq!(score.days_since_last_activity, 3);
    }

    #[tokio::test]
    async fn vanished_client_maps_to_not_found() {
        let mut store = MemoryStore::default();
        let id = store.add_client("Ghost", "ghost@example.com");
        store.vanished_clients.insert(id);

        let err = score_client(&store, id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ScoreError::ClientNotFound(found) if found == id));
    }

    #[tokio::test]
    async fn failed_signal_fetch_names_the_signal() {
        let mut store = MemoryStore::default();
        let id = store.add_client("Flaky", "flaky@example.com");
        store.failing_booking_fetches.insert(id);

        let err = score_client(&store, id, Utc::now()).await.unwrap_err();
        match err {
            ScoreError::SignalFetch {
                signal, client_id, ..
            } => {
                assert_eq!(signal, "session");
                assert_eq!(client_id, id);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
