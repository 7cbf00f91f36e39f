use super::{
    error::{Error, Result},
    http, Adapter, BucketId, ContainerId, Credit, CreditScale, MemberId, Page, Settings,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

/// An LMS exposing a versioned REST API, authenticated with an OAuth2 bearer token
///
/// Containers are course-level attendance activities and buckets are attendance sessions.
pub struct Rest {
    client: reqwest::Client,
    base_url: Url,
    token: String,
    version: String,
}

impl Rest {
    pub fn new(client: reqwest::Client, base_url: Url, token: &str, settings: &Settings) -> Self {
        Rest {
            client,
            base_url,
            token: token.to_owned(),
            version: settings.api_version.clone(),
        }
    }

    /// Build the URL for a resource
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::TransportUnavailable("base url cannot have a path".into()))?
            .pop_if_empty()
            .push("api")
            .push(&self.version)
            .extend(segments);
        Ok(url)
    }

    /// Start an authenticated request
    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let url = self.url(segments)?;
        Ok(self
            .client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token)))
    }

    /// Send a request and deserialize the response
    async fn send<T>(&self, request: RequestBuilder, expected: &'static str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await?;
        http::deserialize_if_successful(response, expected).await
    }
}

#[async_trait]
impl Adapter for Rest {
    #[instrument(name = "Rest::find_or_create_container", skip(self))]
    async fn find_or_create_container(&self, course: &str, name: &str) -> Result<ContainerId> {
        let path = ["courses", course, "attendance"];

        let existing = self
            .send::<Vec<Activity>>(self.request(Method::GET, &path)?, "a list of activities")
            .await?;
        if let Some(activity) = existing.into_iter().find(|a| a.name == name) {
            debug!(id = %activity.id, "found existing activity");
            return Ok(ContainerId(activity.id.to_string()));
        }

        let created = self
            .send::<Activity>(
                self.request(Method::POST, &path)?
                    .json(&NewActivity { name }),
                "an activity",
            )
            .await?;
        Ok(ContainerId(created.id.to_string()))
    }

    #[instrument(name = "Rest::create_bucket", skip(self))]
    async fn create_bucket(
        &self,
        course: &str,
        container: Option<&ContainerId>,
        name: &str,
        when: DateTime<Utc>,
    ) -> Result<BucketId> {
        let session = NewSession {
            activity_id: container.map(|c| c.0.as_str()),
            name,
            starts_at: when,
        };

        let created = self
            .send::<Session>(
                self.request(Method::POST, &["courses", course, "attendance", "sessions"])?
                    .json(&session),
                "a session",
            )
            .await?;
        Ok(BucketId(created.id.to_string()))
    }

    #[instrument(name = "Rest::resolve_credit_scale", skip(self))]
    async fn resolve_credit_scale(&self, _course: &str, bucket: &BucketId) -> Result<CreditScale> {
        let statuses = self
            .send::<Vec<Status>>(
                self.request(
                    Method::GET,
                    &["attendance", "sessions", &bucket.0, "statuses"],
                )?,
                "a list of statuses",
            )
            .await?;

        select_extremes(&statuses).ok_or_else(|| {
            Error::shape(
                "at least two graded statuses",
                format!("{} statuses", statuses.len()),
            )
        })
    }

    #[instrument(name = "Rest::list_enrollment", skip(self))]
    async fn list_enrollment(&self, course: &str, cursor: Option<&str>) -> Result<Page> {
        let mut request = self.request(Method::GET, &["courses", course, "enrollments"])?;
        if let Some(bookmark) = cursor {
            request = request.query(&[("bookmark", bookmark)]);
        }

        let result = self
            .send::<PagedResult>(request, "a page of enrollments")
            .await?;

        let next = match (result.paging_info.has_more_items, result.paging_info.bookmark) {
            (true, Some(bookmark)) if !bookmark.is_empty() => Some(bookmark),
            (true, _) => {
                return Err(Error::shape(
                    "a bookmark for the next page",
                    "HasMoreItems without Bookmark",
                ))
            }
            (false, _) => None,
        };

        Ok(Page {
            members: result.items.into_iter().map(|e| MemberId(e.user_id)).collect(),
            next,
        })
    }

    #[instrument(name = "Rest::write_credit", skip(self))]
    async fn write_credit(
        &self,
        _course: &str,
        bucket: &BucketId,
        member: MemberId,
        credit: &Credit,
        actor: MemberId,
    ) -> Result<()> {
        let Credit::Status(status) = credit else {
            return Err(Error::shape("a status credit", credit.to_string()));
        };

        let member = member.to_string();
        let response = self
            .request(
                Method::PUT,
                &["attendance", "sessions", &bucket.0, "records", &member],
            )?
            .json(&Record {
                status_id: status,
                taken_by: actor,
            })
            .send()
            .await?;
        http::successful_body(response).await?;

        Ok(())
    }
}

/// Pick the highest-graded status for presence and the lowest-graded for absence
///
/// Ties go to whichever status was listed first. Statuses without a grade are ignored.
fn select_extremes(statuses: &[Status]) -> Option<CreditScale> {
    let mut graded = statuses
        .iter()
        .filter_map(|s| s.grade.map(|grade| (s, grade)));

    let first = graded.next()?;
    let (highest, lowest) = graded.fold((first, first), |(high, low), candidate| {
        let high = if candidate.1 > high.1 { candidate } else { high };
        let low = if candidate.1 < low.1 { candidate } else { low };
        (high, low)
    });

    if highest.0.id == lowest.0.id {
        return None;
    }

    Some(CreditScale {
        present: Credit::Status(highest.0.id.to_string()),
        absent: Credit::Status(lowest.0.id.to_string()),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Activity {
    id: u64,
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct NewActivity<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct NewSession<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    activity_id: Option<&'a str>,
    name: &'a str,
    starts_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Session {
    id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Status {
    id: u64,
    #[serde(default)]
    grade: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PagedResult {
    paging_info: PagingInfo,
    items: Vec<Enrollment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PagingInfo {
    bookmark: Option<String>,
    has_more_items: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Enrollment {
    user_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Record<'a> {
    status_id: &'a str,
    taken_by: MemberId,
}
