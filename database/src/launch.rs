use crate::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{query_as, types::Json, Executor, FromRow};
use std::fmt::{Display, Formatter};
use tracing::instrument;

/// The family of LMS a launch originated from
#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "lms_kind", rename_all = "snake_case")]
pub enum LmsKind {
    /// A token-authenticated web-service API, called by function name
    WebService,
    /// An OAuth2 REST API
    Rest,
}

impl Display for LmsKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WebService => write!(f, "web_service"),
            Self::Rest => write!(f, "rest"),
        }
    }
}

/// A session launched from an LMS into a room
#[derive(Clone, Debug, PartialEq, FromRow)]
pub struct Launch {
    /// The opaque reference carried in the conference metadata
    pub nonce: String,
    /// Which LMS family performed the launch
    pub kind: LmsKind,
    /// The raw launch parameters sent by the LMS
    pub params: Json<Value>,
    /// When the launch happened
    pub created_at: DateTime<Utc>,
}

impl Launch {
    /// Get a launch by its nonce
    #[instrument(name = "Launch::find", skip(db))]
    pub async fn find<'c, 'e, E>(nonce: &str, db: E) -> Result<Option<Launch>>
    where
        'c: 'e,
        E: 'e + Executor<'c, Database = sqlx::Postgres>,
    {
        let launch = query_as::<_, Launch>("SELECT * FROM launches WHERE nonce = $1")
            .bind(nonce)
            .fetch_optional(db)
            .await?;

        Ok(launch)
    }

    /// Retrieve a launch parameter as a string
    ///
    /// Numbers are accepted as well since some LMSs send identifiers unquoted.
    /// Surrounding whitespace is dropped, and blank strings count as missing.
    pub fn param(&self, name: &str) -> Option<String> {
        match self.params.get(name)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
