use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Client {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub occurred_at: DateTime<Utc>,
}

/// One booking of a training session. `session_scheduled_at` is `None` when
/// the referenced session row no longer exists; such bookings are dropped
/// from the session sub-score entirely.
#[derive(Debug, Clone)]
pub struct SessionBooking {
    pub session_id: Option<Uuid>,
    pub attended: bool,
    pub booked_at: DateTime<Utc>,
    pub session_scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct WorkoutCompletion {
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ContentView {
    pub completed: bool,
    pub watched_seconds: i64,
    pub last_watched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MilestoneUnlock {
    pub unlocked_at: DateTime<Utc>,
}

/// The five record sets fetched for one client in one scoring pass.
/// Bookings carry no store-level time filter; the other four are already
/// restricted to the lookback window.
#[derive(Debug, Clone, Default)]
pub struct SignalRecords {
    pub activity: Vec<ActivityEvent>,
    pub bookings: Vec<SessionBooking>,
    pub workouts: Vec<WorkoutCompletion>,
    pub content: Vec<ContentView>,
    pub milestones: Vec<MilestoneUnlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChurnRisk {
    Low,
    Medium,
    High,
}

impl ChurnRisk {
    pub fn label(self) -> &'static str {
        match self {
            ChurnRisk::Low => "low",
            ChurnRisk::Medium => "medium",
            ChurnRisk::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubScores {
    pub activity: f64,
    pub session: f64,
    pub workout: f64,
    pub content: f64,
    pub milestone: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngagementScore {
    pub client_id: Uuid,
    pub client_name: String,
    pub client_email: String,
    pub sub_scores: SubScores,
    pub overall_score: f64,
    pub churn_risk: ChurnRisk,
    pub last_activity: Option<DateTime<Utc>>,
    pub days_since_last_activity: i64,
    pub computed_at: DateTime<Utc>,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub count: usize,
    pub last_computed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChurnRiskDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngagementReport {
    pub total_clients: usize,
    pub active_clients: usize,
    pub at_risk_clients: usize,
    pub top_engaged_clients: Vec<EngagementScore>,
    pub low_engaged_clients: Vec<EngagementScore>,
    pub churn_risk_distribution: ChurnRiskDistribution,
    pub average_engagement_score: f64,
    pub generated_at: DateTime<Utc>,
}
