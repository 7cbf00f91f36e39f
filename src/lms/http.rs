use super::error::{Error, Result};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT},
    Response, StatusCode,
};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Identifies the engine to the LMS and its token endpoint
pub(crate) const USER_AGENT: &str = "conference-attendance/engine";

/// Build the HTTP client shared by the adapters and the token refresher
///
/// The timeout applies to each individual request rather than the whole workflow.
pub(crate) fn client(timeout: Duration) -> reqwest::Client {
    let headers = {
        let mut map = HeaderMap::new();
        map.insert(ACCEPT, HeaderValue::from_static("application/json"));
        map
    };

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .expect("client must build")
}

/// Read the body of a response, classifying unsuccessful statuses
pub(crate) async fn successful_body(response: Response) -> Result<String> {
    let status = response.status();
    let content = response.text().await?;

    if status.is_success() {
        Ok(content)
    } else {
        Err(classify(status, content))
    }
}

/// Deserialize the body of a successful response
pub(crate) async fn deserialize_if_successful<T>(
    response: Response,
    expected: &'static str,
) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = successful_body(response).await?;
    serde_json::from_str(&content).map_err(|_| Error::shape(expected, content))
}

/// Map an unsuccessful status to its place in the taxonomy
fn classify(status: StatusCode, content: String) -> Error {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            Error::TransportTimeout(format!("{status}").into())
        }
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
            Error::TransportUnavailable(format!("{status}").into())
        }
        _ => Error::rejected(status.as_u16().to_string(), content),
    }
}
