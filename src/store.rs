use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    ActivityEvent, Client, ContentView, MilestoneUnlock, SessionBooking, WorkoutCompletion,
};

/// Read-only view of the record store. The engine owns no client data; it
/// consumes these seven queries and nothing else.
///
/// Bookings are listed without a time filter because the booking time and
/// the linked session's scheduled time differ; the scorer date-filters
/// against the session time locally.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_clients(&self) -> Result<Vec<Client>, StoreError>;

    async fn get_client(&self, id: Uuid) -> Result<Client, StoreError>;

    async fn list_activity_events(
        &self,
        client_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, StoreError>;

    async fn list_session_bookings(
        &self,
        client_id: Uuid,
    ) -> Result<Vec<SessionBooking>, StoreError>;

    async fn list_workout_completions(
        &self,
        client_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<WorkoutCompletion>, StoreError>;

    async fn list_content_views(
        &self,
        client_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ContentView>, StoreError>;

    async fn list_milestone_unlocks(
        &self,
        client_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<MilestoneUnlock>, StoreError>;
}
