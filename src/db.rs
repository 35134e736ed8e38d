use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    ActivityEvent, Client, ContentView, MilestoneUnlock, SessionBooking, WorkoutCompletion,
};
use crate::store::RecordStore;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed record store. All queries are reads; the engine never
/// writes through this interface.
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.into())
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, full_name, email FROM client_engagement.clients ORDER BY full_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|row| Client {
                id: row.get("id"),
                full_name: row.get("full_name"),
                email: row.get("email"),
            })
            .collect())
    }

    async fn get_client(&self, id: Uuid) -> Result<Client, StoreError> {
        let row = sqlx::query(
            "SELECT id, full_name, email FROM client_engagement.clients WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let row = row.ok_or(StoreError::NotFound)?;
        Ok(Client {
            id: row.get("id"),
            full_name: row.get("full_name"),
            email: row.get("email"),
        })
    }

    async fn list_activity_events(
        &self,
        client_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT occurred_at FROM client_engagement.activity_events \
             WHERE client_id = $1 AND occurred_at >= $2",
        )
        .bind(client_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|row| ActivityEvent {
                occurred_at: row.get("occurred_at"),
            })
            .collect())
    }

    async fn list_session_bookings(
        &self,
        client_id: Uuid,
    ) -> Result<Vec<SessionBooking>, StoreError> {
        // No time filter here: the booking time and the session's scheduled
        // time differ, and the scorer filters on the latter.
        let rows = sqlx::query(
            "SELECT b.session_id, b.attended, b.booked_at, s.scheduled_at AS session_scheduled_at \
             FROM client_engagement.session_bookings b \
             LEFT JOIN client_engagement.sessions s ON s.id = b.session_id \
             WHERE b.client_id = $1",
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|row| SessionBooking {
                session_id: row.get("session_id"),
                attended: row.get("attended"),
                booked_at: row.get("booked_at"),
                session_scheduled_at: row.get("session_scheduled_at"),
            })
            .collect())
    }

    async fn list_workout_completions(
        &self,
        client_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<WorkoutCompletion>, StoreError> {
        let rows = sqlx::query(
            "SELECT completed_at FROM client_engagement.workout_completions \
             WHERE client_id = $1 AND completed_at >= $2",
        )
        .bind(client_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|row| WorkoutCompletion {
                completed_at: row.get("completed_at"),
            })
            .collect())
    }

    async fn list_content_views(
        &self,
        client_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ContentView>, StoreError> {
        let rows = sqlx::query(
            "SELECT completed, watched_seconds, last_watched_at \
             FROM client_engagement.content_views \
             WHERE client_id = $1 AND last_watched_at >= $2",
        )
        .bind(client_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|row| ContentView {
                completed: row.get("completed"),
                watched_seconds: row.get("watched_seconds"),
                last_watched_at: row.get("last_watched_at"),
            })
            .collect())
    }

    async fn list_milestone_unlocks(
        &self,
        client_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<MilestoneUnlock>, StoreError> {
        let rows = sqlx::query(
            "SELECT unlocked_at FROM client_engagement.milestone_unlocks \
             WHERE client_id = $1 AND unlocked_at >= $2",
        )
        .bind(client_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|row| MilestoneUnlock {
                unlocked_at: row.get("unlocked_at"),
            })
            .collect())
    }
}

async fn upsert_client(
    pool: &PgPool,
    id: Uuid,
    name: &str,
    email: &str,
) -> anyhow::Result<Uuid> {
    let row = sqlx::query(
        r#"
        INSERT INTO client_engagement.clients (id, full_name, email)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(email)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

async fn upsert_session(
    pool: &PgPool,
    title: &str,
    scheduled_at: DateTime<Utc>,
    source_key: &str,
) -> anyhow::Result<Uuid> {
    let row = sqlx::query(
        r#"
        INSERT INTO client_engagement.sessions (id, title, scheduled_at, source_key)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (source_key) DO UPDATE
        SET title = EXCLUDED.title, scheduled_at = EXCLUDED.scheduled_at
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(title)
    .bind(scheduled_at)
    .bind(source_key)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

/// Load realistic seed data: a highly engaged client, a lapsing one, an
/// at-risk one with an orphaned booking, and a silent one. Idempotent via
/// source keys.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let now = Utc::now();

    let avery = upsert_client(
        pool,
        Uuid::parse_str("5b6f3a0e-67c1-4b6e-9dd1-4f1a2ce09b11")?,
        "Avery Chen",
        "avery.chen@forgefit.example",
    )
    .await?;
    let jules = upsert_client(
        pool,
        Uuid::parse_str("9a1e4c7b-12d8-45f0-8a3c-7be92a4d6c22")?,
        "Jules Moreno",
        "jules.moreno@forgefit.example",
    )
    .await?;
    let kiara = upsert_client(
        pool,
        Uuid::parse_str("c3d905f2-884a-4f6b-b2e1-0d5a6b7c8d33")?,
        "Kiara Patel",
        "kiara.patel@forgefit.example",
    )
    .await?;
    upsert_client(
        pool,
        Uuid::parse_str("e7f81b64-3c5d-4a2e-9f0b-1a2b3c4d5e44")?,
        "Liam Ortiz",
        "liam.ortiz@forgefit.example",
    )
    .await?;

    let mut session_ids = Vec::new();
    for i in 0..10i64 {
        let id = upsert_session(
            pool,
            &format!("Strength Foundations #{}", i + 1),
            now - Duration::days(i * 3),
            &format!("seed-session-{i}"),
        )
        .await?;
        session_ids.push(id);
    }

    // Avery: saturating activity, perfect attendance, steady workouts,
    // content and milestones on top.
    for i in 0..40i64 {
        insert_activity(pool, avery, now - Duration::days(i % 25), &format!("seed-avery-act-{i}"))
            .await?;
    }
    for (i, session_id) in session_ids.iter().take(8).enumerate() {
        insert_booking(
            pool,
            avery,
            Some(*session_id),
            true,
            now - Duration::days(i as i64 * 3 + 1),
            &format!("seed-avery-book-{i}"),
        )
        .await?;
    }
    for i in 0..15i64 {
        insert_workout(pool, avery, now - Duration::days(i % 20), &format!("seed-avery-wo-{i}"))
            .await?;
    }
    for i in 0..5i64 {
        insert_content_view(
            pool,
            avery,
            true,
            600,
            now - Duration::days(i * 2),
            &format!("seed-avery-view-{i}"),
        )
        .await?;
    }
    for i in 0..3i64 {
        insert_milestone(pool, avery, now - Duration::days(i * 7), &format!("seed-avery-ms-{i}"))
            .await?;
    }

    // Jules: tapering off, last touch over a week ago.
    for i in 0..10i64 {
        insert_activity(
            pool,
            jules,
            now - Duration::days(8 + i),
            &format!("seed-jules-act-{i}"),
        )
        .await?;
    }
    insert_booking(
        pool,
        jules,
        Some(session_ids[3]),
        true,
        now - Duration::days(10),
        "seed-jules-book-0",
    )
    .await?;
    insert_booking(
        pool,
        jules,
        Some(session_ids[4]),
        false,
        now - Duration::days(13),
        "seed-jules-book-1",
    )
    .await?;
    for i in 0..4i64 {
        insert_workout(
            pool,
            jules,
            now - Duration::days(10 + i * 2),
            &format!("seed-jules-wo-{i}"),
        )
        .await?;
    }
    insert_content_view(
        pool,
        jules,
        false,
        300,
        now - Duration::days(9),
        "seed-jules-view-0",
    )
    .await?;

    // Kiara: nearly silent, and her one booking points at a session that
    // no longer exists.
    insert_activity(pool, kiara, now - Duration::days(25), "seed-kiara-act-0").await?;
    insert_activity(pool, kiara, now - Duration::days(26), "seed-kiara-act-1").await?;
    insert_booking(pool, kiara, None, false, now - Duration::days(20), "seed-kiara-book-0")
        .await?;

    Ok(())
}

async fn insert_activity(
    pool: &PgPool,
    client_id: Uuid,
    occurred_at: DateTime<Utc>,
    source_key: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO client_engagement.activity_events (id, client_id, occurred_at, source_key)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(client_id)
    .bind(occurred_at)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert_booking(
    pool: &PgPool,
    client_id: Uuid,
    session_id: Option<Uuid>,
    attended: bool,
    booked_at: DateTime<Utc>,
    source_key: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO client_engagement.session_bookings
        (id, client_id, session_id, attended, booked_at, source_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(client_id)
    .bind(session_id)
    .bind(attended)
    .bind(booked_at)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert_workout(
    pool: &PgPool,
    client_id: Uuid,
    completed_at: DateTime<Utc>,
    source_key: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO client_engagement.workout_completions (id, client_id, completed_at, source_key)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(client_id)
    .bind(completed_at)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert_content_view(
    pool: &PgPool,
    client_id: Uuid,
    completed: bool,
    watched_seconds: i64,
    last_watched_at: DateTime<Utc>,
    source_key: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO client_engagement.content_views
        (id, client_id, completed, watched_seconds, last_watched_at, source_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(client_id)
    .bind(completed)
    .bind(watched_seconds)
    .bind(last_watched_at)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert_milestone(
    pool: &PgPool,
    client_id: Uuid,
    unlocked_at: DateTime<Utc>,
    source_key: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO client_engagement.milestone_unlocks (id, client_id, unlocked_at, source_key)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(client_id)
    .bind(unlocked_at)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(())
}

/// Bulk-import activity events from a CSV export, creating clients as
/// needed. Rows with a repeated source key are skipped.
pub async fn import_activity_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        full_name: String,
        email: String,
        occurred_at: DateTime<Utc>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let client_id = upsert_client(pool, Uuid::new_v4(), &row.full_name, &row.email).await?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO client_engagement.activity_events (id, client_id, occurred_at, source_key)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(client_id)
        .bind(row.occurred_at)
        .bind(&source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
