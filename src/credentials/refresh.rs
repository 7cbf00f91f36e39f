use crate::lms::http;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use database::LaunchToken;
use reqwest::{Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    time::Duration,
};
use tracing::instrument;

type Result<T, E = Error> = std::result::Result<T, E>;

/// Exchanges refresh tokens for new access tokens
#[derive(Clone)]
pub struct Refresher {
    client: reqwest::Client,
}

impl Refresher {
    /// Construct a new OAuth2 refresh client
    pub fn new(timeout: Duration) -> Self {
        Refresher {
            client: http::client(timeout),
        }
    }

    /// Perform the refresh token grant
    #[instrument(name = "Refresher::refresh", skip_all, fields(%token.nonce))]
    pub async fn refresh(&self, token: &LaunchToken) -> Result<Grant> {
        let params = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token: required(&token.refresh_token, "refresh_token")?,
            client_id: required(&token.client_id, "client_id")?,
            client_secret: required(&token.client_secret, "client_secret")?,
        };
        let url = required(&token.token_url, "token_url")?;

        let response = self.client.post(url).form(&params).send().await?;
        let creds = deserialize_if_successful::<RefreshResponse>(response).await?;

        if creds.token_type.to_lowercase() != "bearer" {
            return Err(Error::UnknownTokenType(creds.token_type));
        }

        Ok(Grant {
            access_token: creds.access_token,
            refresh_token: creds.refresh_token,
            expires_at: creds
                .expires_in
                .map(|seconds| Utc::now() + ChronoDuration::seconds(seconds)),
        })
    }
}

/// A freshly issued access token
#[derive(Debug)]
pub struct Grant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

fn required<'t>(value: &'t Option<String>, name: &'static str) -> Result<&'t str> {
    match value.as_deref() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::Incomplete(name)),
    }
}

/// An error from the refresh client
#[derive(Debug)]
pub enum Error {
    /// The stored grant lacks a field needed to refresh
    Incomplete(&'static str),
    /// The returned token is an unknown type
    UnknownTokenType(String),
    /// Invalid response body format
    BodyParse {
        source: serde_json::Error,
        content: String,
    },
    /// An unsuccessful response was received
    Unsuccessful { status: StatusCode, content: String },
    /// Error while connecting to the provider
    Connection(reqwest::Error),
    /// An unknown error occurred
    Unknown(reqwest::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connection(e) | Self::Unknown(e) => Some(e),
            Self::BodyParse { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incomplete(field) => write!(f, "stored grant has no {field}"),
            Self::UnknownTokenType(token) => write!(f, "unknown token type {token:?}"),
            Self::BodyParse { content, .. } => write!(f, "failed to parse body: {content:?}"),
            Self::Unsuccessful { status, content } => {
                write!(f, "unsuccessful response ({status}): {content:?}")
            }
            Self::Connection(_) => write!(f, "error while connecting to provider"),
            Self::Unknown(_) => write!(f, "an unknown error occurred"),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() || error.is_builder() {
            Error::Connection(error)
        } else {
            Error::Unknown(error)
        }
    }
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'r> {
    grant_type: &'r str,
    refresh_token: &'r str,
    client_id: &'r str,
    client_secret: &'r str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    token_type: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

async fn deserialize_if_successful<T>(response: Response) -> Result<T>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let content = response.text().await?;

    if status.is_success() {
        serde_json::from_str(&content).map_err(|e| Error::BodyParse { source: e, content })
    } else {
        Err(Error::Unsuccessful { status, content })
    }
}
