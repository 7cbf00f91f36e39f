use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, Executor, FromRow};
use tracing::instrument;

/// The OAuth2 grant obtained for a launch from a REST-style LMS
#[derive(Clone, Debug, Eq, PartialEq, FromRow)]
pub struct LaunchToken {
    /// The launch the grant belongs to
    pub nonce: String,
    /// Where the LMS lives
    pub base_url: Option<String>,
    /// The bearer token
    pub access_token: Option<String>,
    /// The token used to obtain a new access token
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub expires_at: Option<DateTime<Utc>>,
    /// The OAuth2 token endpoint
    pub token_url: Option<String>,
    /// The client ID
    pub client_id: Option<String>,
    /// The client secret
    pub client_secret: Option<String>,
    /// Overrides how attendee identifiers are mapped to LMS user ids
    pub member_id_rule: Option<String>,
    /// When the grant was last updated
    pub updated_at: DateTime<Utc>,
}

impl LaunchToken {
    /// Get the grant for a launch
    #[instrument(name = "LaunchToken::find", skip(db))]
    pub async fn find<'c, 'e, E>(nonce: &str, db: E) -> Result<Option<LaunchToken>>
    where
        'c: 'e,
        E: 'e + Executor<'c, Database = sqlx::Postgres>,
    {
        let token = query_as::<_, LaunchToken>("SELECT * FROM launch_tokens WHERE nonce = $1")
            .bind(nonce)
            .fetch_optional(db)
            .await?;

        Ok(token)
    }

    /// Whether the access token has expired
    pub fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if at <= Utc::now())
    }

    /// Replace the access token after a refresh
    #[instrument(name = "LaunchToken::refreshed", skip_all, fields(%self.nonce))]
    pub async fn refreshed<'c, 'e, E>(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        db: E,
    ) -> Result<()>
    where
        'c: 'e,
        E: 'e + Executor<'c, Database = sqlx::Postgres>,
    {
        // some providers rotate the refresh token, others keep handing out the same one
        let refresh_token = refresh_token.or_else(|| self.refresh_token.take());

        query(
            r#"
            UPDATE launch_tokens
            SET access_token = $2, refresh_token = $3, expires_at = $4, updated_at = now()
            WHERE nonce = $1
            "#,
        )
        .bind(&self.nonce)
        .bind(&access_token)
        .bind(&refresh_token)
        .bind(expires_at)
        .execute(db)
        .await?;

        self.access_token = Some(access_token);
        self.refresh_token = refresh_token;
        self.expires_at = expires_at;

        Ok(())
    }
}
