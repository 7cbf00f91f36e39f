use super::{
    error::{Error, Result},
    http, Adapter, BucketId, ContainerId, Credit, CreditScale, MemberId, Page, Settings,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, instrument};
use url::Url;

/// Where the web-service endpoint lives relative to the LMS root
const ENDPOINT: &str = "webservice/rest/server.php";

const SITE_INFO: &str = "core_webservice_get_site_info";
const GET_CATEGORIES: &str = "core_grades_get_gradecategories";
const CREATE_CATEGORIES: &str = "core_grades_create_gradecategories";
const CREATE_GRADE_ITEM: &str = "core_grades_create_gradeitem";
const ENROLLED_USERS: &str = "core_enrol_get_enrolled_users";
const UPDATE_GRADES: &str = "core_grades_update_grades";

/// The functions the token must be allowed to call
const REQUIRED_FUNCTIONS: [&str; 5] = [
    GET_CATEGORIES,
    CREATE_CATEGORIES,
    CREATE_GRADE_ITEM,
    ENROLLED_USERS,
    UPDATE_GRADES,
];

/// Identifies grades written by us in the gradebook history
const GRADE_SOURCE: &str = "conference_attendance";

/// An LMS exposing a token-authenticated web-service API, where each call names a function
///
/// Containers are gradebook categories and buckets are manual grade items.
pub struct WebService {
    client: reqwest::Client,
    endpoint: Url,
    token: String,
    max_points: f64,
    page_size: u32,
}

impl WebService {
    pub fn new(
        client: reqwest::Client,
        base_url: &Url,
        token: &str,
        settings: &Settings,
    ) -> Result<Self> {
        Ok(WebService {
            client,
            endpoint: base_url.join(ENDPOINT)?,
            token: token.to_owned(),
            max_points: settings.max_points,
            page_size: settings.page_size.max(1),
        })
    }

    /// Invoke a web-service function
    #[instrument(name = "WebService::call", skip(self, params))]
    async fn call<T>(&self, function: &'static str, params: Params) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let mut form = vec![
            ("wstoken", self.token.as_str()),
            ("wsfunction", function),
            ("moodlewsrestformat", "json"),
        ];
        form.extend(params.0.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let response = self
            .client
            .post(self.endpoint.clone())
            .form(&form)
            .send()
            .await?;
        let content = http::successful_body(response).await?;

        parse_response(function, &content)
    }
}

#[async_trait]
impl Adapter for WebService {
    #[instrument(name = "WebService::verify", skip(self))]
    async fn verify(&self) -> Result<()> {
        let info = self.call::<SiteInfo>(SITE_INFO, Params::default()).await?;
        let available = info
            .functions
            .iter()
            .map(|f| f.name.as_str())
            .collect::<HashSet<_>>();

        let missing = REQUIRED_FUNCTIONS
            .iter()
            .filter(|name| !available.contains(*name))
            .copied()
            .collect::<Vec<_>>();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::rejected("missing_functions", missing.join(", ")))
        }
    }

    #[instrument(name = "WebService::find_or_create_container", skip(self))]
    async fn find_or_create_container(&self, course: &str, name: &str) -> Result<ContainerId> {
        let existing = self
            .call::<Categories>(GET_CATEGORIES, Params::default().with("courseid", course))
            .await?;

        if let Some(category) = existing.categories.iter().find(|c| c.fullname == name) {
            debug!(id = category.id, "found existing category");
            return Ok(ContainerId(category.id.to_string()));
        }

        let created = self
            .call::<CreatedCategories>(
                CREATE_CATEGORIES,
                Params::default()
                    .with("courseid", course)
                    .with("categories[0][fullname]", name),
            )
            .await?;

        match created.categoryids.first() {
            Some(id) => Ok(ContainerId(id.to_string())),
            None => Err(Error::shape("a created category id", "[]")),
        }
    }

    #[instrument(name = "WebService::create_bucket", skip(self))]
    async fn create_bucket(
        &self,
        course: &str,
        container: Option<&ContainerId>,
        name: &str,
        when: DateTime<Utc>,
    ) -> Result<BucketId> {
        let mut params = Params::default()
            .with("courseid", course)
            .with("itemname", name)
            .with("grademax", self.max_points)
            .with("grademin", 0)
            .with("timecreated", when.timestamp());
        if let Some(container) = container {
            params = params.with("categoryid", container);
        }

        let created = self.call::<CreatedGradeItem>(CREATE_GRADE_ITEM, params).await?;
        Ok(BucketId(created.itemid.to_string()))
    }

    async fn resolve_credit_scale(&self, _course: &str, _bucket: &BucketId) -> Result<CreditScale> {
        Ok(CreditScale {
            present: Credit::Points(self.max_points),
            absent: Credit::Points(0.0),
        })
    }

    #[instrument(name = "WebService::list_enrollment", skip(self))]
    async fn list_enrollment(&self, course: &str, cursor: Option<&str>) -> Result<Page> {
        let offset = match cursor {
            Some(cursor) => cursor
                .parse::<u32>()
                .map_err(|_| Error::shape("a numeric offset cursor", cursor))?,
            None => 0,
        };

        let users = self
            .call::<Vec<EnrolledUser>>(
                ENROLLED_USERS,
                Params::default()
                    .with("courseid", course)
                    .with("options[0][name]", "limitfrom")
                    .with("options[0][value]", offset)
                    .with("options[1][name]", "limitnumber")
                    .with("options[1][value]", self.page_size),
            )
            .await?;

        // a short page means there is nothing left to fetch
        let next = if users.len() >= self.page_size as usize {
            Some((offset as usize + users.len()).to_string())
        } else {
            None
        };

        Ok(Page {
            members: users.into_iter().map(|u| MemberId(u.id)).collect(),
            next,
        })
    }

    #[instrument(name = "WebService::write_credit", skip(self))]
    async fn write_credit(
        &self,
        course: &str,
        bucket: &BucketId,
        member: MemberId,
        credit: &Credit,
        _actor: MemberId,
    ) -> Result<()> {
        let Credit::Points(points) = credit else {
            return Err(Error::shape("a points credit", credit.to_string()));
        };

        let status = self
            .call::<i64>(
                UPDATE_GRADES,
                Params::default()
                    .with("source", GRADE_SOURCE)
                    .with("courseid", course)
                    .with("component", "core_grades")
                    .with("activityid", bucket)
                    .with("itemnumber", 0)
                    .with("grades[0][studentid]", member)
                    .with("grades[0][grade]", points),
            )
            .await?;

        if status == 0 {
            Ok(())
        } else {
            Err(Error::rejected(
                "grade_update_failed",
                format!("gradebook returned status {status}"),
            ))
        }
    }
}

/// Function parameters, sent as form fields
#[derive(Debug, Default)]
struct Params(Vec<(String, String)>);

impl Params {
    fn with(mut self, name: &str, value: impl ToString) -> Self {
        self.0.push((name.to_owned(), value.to_string()));
        self
    }
}

/// Check a response for the failures reported alongside a 200 status
fn parse_response<T>(function: &'static str, content: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let value = serde_json::from_str::<Value>(content)
        .map_err(|_| Error::shape("a JSON response", content))?;

    if let Some(object) = value.as_object() {
        if object.contains_key("exception") {
            let failure = serde_json::from_value::<Exception>(value.clone())
                .map_err(|_| Error::shape("an exception", content))?;
            return Err(Error::rejected(failure.errorcode, failure.message));
        }

        if let Some(warning) = object
            .get("warnings")
            .and_then(Value::as_array)
            .and_then(|warnings| warnings.first())
        {
            let warning = serde_json::from_value::<Warning>(warning.clone())
                .map_err(|_| Error::shape("a warning", content))?;
            return Err(Error::rejected(warning.warningcode, warning.message));
        }
    }

    serde_json::from_value(value).map_err(|_| Error::shape(function, content))
}

#[derive(Debug, Deserialize)]
struct Exception {
    errorcode: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Warning {
    warningcode: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SiteInfo {
    #[serde(default)]
    functions: Vec<Function>,
}

#[derive(Debug, Deserialize)]
struct Function {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Categories {
    categories: Vec<Category>,
}

#[derive(Debug, Deserialize)]
struct Category {
    id: u64,
    fullname: String,
}

#[derive(Debug, Deserialize)]
struct CreatedCategories {
    categoryids: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct CreatedGradeItem {
    itemid: u64,
}

#[derive(Debug, Deserialize)]
struct EnrolledUser {
    id: u64,
}
