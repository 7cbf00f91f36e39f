use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{query_as, Executor, FromRow};
use tracing::instrument;

/// A meeting scheduled in a room
#[derive(Clone, Debug, Eq, PartialEq, FromRow)]
pub struct ScheduledMeeting {
    /// A unique ID
    pub id: i64,
    /// The opaque reference carried in the conference metadata
    pub reference: String,
    /// The display name
    pub name: String,
    /// When the meeting was scheduled to start
    pub starts_at: DateTime<Utc>,
    /// When the meeting was first created
    pub created_at: DateTime<Utc>,
    /// When the meeting was last updated
    pub updated_at: DateTime<Utc>,
}

impl ScheduledMeeting {
    /// Get a meeting by its reference
    #[instrument(name = "ScheduledMeeting::find", skip(db))]
    pub async fn find<'c, 'e, E>(reference: &str, db: E) -> Result<Option<ScheduledMeeting>>
    where
        'c: 'e,
        E: 'e + Executor<'c, Database = sqlx::Postgres>,
    {
        let meeting = query_as::<_, ScheduledMeeting>(
            "SELECT * FROM scheduled_meetings WHERE reference = $1",
        )
        .bind(reference)
        .fetch_optional(db)
        .await?;

        Ok(meeting)
    }
}
