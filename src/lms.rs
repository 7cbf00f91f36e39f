use async_trait::async_trait;
use chrono::{DateTime, Utc};
use database::LmsKind;
use serde::Serialize;
use std::{
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use url::Url;

mod error;
pub(crate) mod http;
mod rest;
mod web_service;

pub use error::{Error, Result};
pub use rest::Rest;
pub use web_service::WebService;

/// A course member's LMS user id
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct MemberId(pub u64);

impl Display for MemberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identifies the object grouping all the attendance records of a course
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ContainerId(pub String);

/// Identifies the attendance record of a single meeting
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BucketId(pub String);

impl Display for ContainerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Display for BucketId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The value written for a member
#[derive(Clone, Debug, PartialEq)]
pub enum Credit {
    /// A number of points in a grade object
    Points(f64),
    /// One of the statuses configured for an attendance session
    Status(String),
}

impl Display for Credit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Points(points) => write!(f, "{points} points"),
            Self::Status(id) => write!(f, "status {id}"),
        }
    }
}

/// The pair of values marking presence and absence
#[derive(Clone, Debug, PartialEq)]
pub struct CreditScale {
    pub present: Credit,
    pub absent: Credit,
}

/// A single page of course members
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    pub members: Vec<MemberId>,
    /// Where the next page starts, if there is one
    pub next: Option<String>,
}

/// How the identifiers reported by the conference map onto LMS user ids
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MemberIdRule {
    /// The id is whatever follows the last separator, i.e. `lms_42`
    LastSegment(char),
    /// The whole identifier is the id
    Whole,
}

impl MemberIdRule {
    /// The convention used by each family of LMS
    pub fn default_for(kind: LmsKind) -> Self {
        match kind {
            LmsKind::WebService => Self::LastSegment('_'),
            LmsKind::Rest => Self::Whole,
        }
    }

    /// Extract the member id from a raw identifier
    pub fn normalize(&self, raw: &str) -> Option<MemberId> {
        let id = match self {
            Self::LastSegment(separator) => raw.rsplit(*separator).next()?,
            Self::Whole => raw,
        };

        id.trim().parse().ok().map(MemberId)
    }
}

impl FromStr for MemberIdRule {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once(':') {
            None if s == "whole" => Ok(Self::Whole),
            None if s == "last_segment" => Ok(Self::LastSegment('_')),
            Some(("last_segment", separator)) => {
                let mut chars = separator.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Self::LastSegment(c)),
                    _ => Err(format!("separator must be a single character: {separator:?}")),
                }
            }
            _ => Err(format!("unknown member id rule {s:?}")),
        }
    }
}

/// Everything needed to talk to an LMS on behalf of a course
#[derive(Clone)]
pub struct Credentials {
    pub kind: LmsKind,
    pub base_url: String,
    pub token: String,
    pub member_ids: MemberIdRule,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("member_ids", &self.member_ids)
            .finish()
    }
}

/// Tunables for the adapters
#[derive(Clone, Debug)]
pub struct Settings {
    /// How long to wait for each request
    pub timeout: Duration,
    /// The points awarded for attending, in web-service gradebooks
    pub max_points: f64,
    /// The resource version for REST APIs
    pub api_version: String,
    /// How many members to request per page, where the LMS lets us choose
    pub page_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            timeout: Duration::from_secs(10),
            max_points: 100.0,
            api_version: String::from("v1"),
            page_size: 100,
        }
    }
}

/// The operations the attendance workflow needs from an LMS
///
/// Implementations parse every response into typed structures immediately, reporting anything
/// else as [`Error::UnexpectedShape`].
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Check the credentials grant access to everything the workflow uses
    async fn verify(&self) -> Result<()> {
        Ok(())
    }

    /// Get the course's attendance container by name, creating it if missing
    async fn find_or_create_container(&self, course: &str, name: &str) -> Result<ContainerId>;

    /// Create a new attendance record for a single meeting
    async fn create_bucket(
        &self,
        course: &str,
        container: Option<&ContainerId>,
        name: &str,
        when: DateTime<Utc>,
    ) -> Result<BucketId>;

    /// Determine the values used to mark presence and absence
    async fn resolve_credit_scale(&self, course: &str, bucket: &BucketId) -> Result<CreditScale>;

    /// Retrieve one page of enrolled members
    async fn list_enrollment(&self, course: &str, cursor: Option<&str>) -> Result<Page>;

    /// Record a member's attendance, overwriting any previous value
    async fn write_credit(
        &self,
        course: &str,
        bucket: &BucketId,
        member: MemberId,
        credit: &Credit,
        actor: MemberId,
    ) -> Result<()>;
}

/// Produces an adapter for a set of credentials
pub trait Connector: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn Adapter>>;
}

/// Connects to LMSs over HTTP
#[derive(Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
    settings: Settings,
}

impl HttpConnector {
    pub fn new(settings: Settings) -> Self {
        HttpConnector {
            client: http::client(settings.timeout),
            settings,
        }
    }
}

impl Connector for HttpConnector {
    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn Adapter>> {
        let mut base_url = Url::parse(&credentials.base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let adapter: Arc<dyn Adapter> = match credentials.kind {
            LmsKind::WebService => Arc::new(WebService::new(
                self.client.clone(),
                &base_url,
                &credentials.token,
                &self.settings,
            )?),
            LmsKind::Rest => Arc::new(Rest::new(
                self.client.clone(),
                base_url,
                &credentials.token,
                &self.settings,
            )),
        };

        Ok(adapter)
    }
}
