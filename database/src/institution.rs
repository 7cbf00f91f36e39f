use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{query_as, Executor, FromRow};
use tracing::instrument;

/// An institution whose LMS talks to us through a web-service token
#[derive(Clone, Debug, Eq, PartialEq, FromRow)]
pub struct Institution {
    /// The consumer key sent with each launch
    pub consumer_key: String,
    /// The display name
    pub name: String,
    /// Where the LMS lives
    pub base_url: Option<String>,
    /// The web-service token
    pub token: Option<String>,
    /// Overrides how attendee identifiers are mapped to LMS user ids
    pub member_id_rule: Option<String>,
    /// When the institution was first created
    pub created_at: DateTime<Utc>,
    /// When the institution was last updated
    pub updated_at: DateTime<Utc>,
}

impl Institution {
    /// Get an institution by its consumer key
    #[instrument(name = "Institution::find", skip(db))]
    pub async fn find<'c, 'e, E>(consumer_key: &str, db: E) -> Result<Option<Institution>>
    where
        'c: 'e,
        E: 'e + Executor<'c, Database = sqlx::Postgres>,
    {
        let institution =
            query_as::<_, Institution>("SELECT * FROM institutions WHERE consumer_key = $1")
                .bind(consumer_key)
                .fetch_optional(db)
                .await?;

        Ok(institution)
    }
}
