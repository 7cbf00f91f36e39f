use crate::{
    identity::{self, EventKeys},
    lms::{Credentials, MemberId, MemberIdRule},
    settings::LaunchParams,
    sync::Error,
};
use async_trait::async_trait;
use database::{Institution, Launch, LaunchToken, LmsKind, PgPool, ScheduledMeeting};
use tracing::{debug, instrument, warn};

mod refresh;

pub use refresh::{Grant, Refresher};

type StoreResult<T> = Result<T, database::Error>;

/// Read access to the records created when meetings were scheduled and launched
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Get a scheduled meeting by its reference
    async fn meeting(&self, reference: &str) -> StoreResult<Option<ScheduledMeeting>>;

    /// Get a launch by its nonce
    async fn launch(&self, nonce: &str) -> StoreResult<Option<Launch>>;

    /// Get the web-service credentials of an institution
    async fn institution(&self, consumer_key: &str) -> StoreResult<Option<Institution>>;

    /// Get the OAuth2 grant for a launch
    async fn launch_token(&self, nonce: &str) -> StoreResult<Option<LaunchToken>>;

    /// Persist a refreshed grant
    async fn save_grant(&self, token: &mut LaunchToken, grant: Grant) -> StoreResult<()>;
}

#[async_trait]
impl CredentialStore for PgPool {
    async fn meeting(&self, reference: &str) -> StoreResult<Option<ScheduledMeeting>> {
        ScheduledMeeting::find(reference, self).await
    }

    async fn launch(&self, nonce: &str) -> StoreResult<Option<Launch>> {
        Launch::find(nonce, self).await
    }

    async fn institution(&self, consumer_key: &str) -> StoreResult<Option<Institution>> {
        Institution::find(consumer_key, self).await
    }

    async fn launch_token(&self, nonce: &str) -> StoreResult<Option<LaunchToken>> {
        LaunchToken::find(nonce, self).await
    }

    async fn save_grant(&self, token: &mut LaunchToken, grant: Grant) -> StoreResult<()> {
        token
            .refreshed(grant.access_token, grant.refresh_token, grant.expires_at, self)
            .await
    }
}

/// Everything known about the meeting an event belongs to
#[derive(Debug)]
pub struct ResolvedContext {
    pub meeting: ScheduledMeeting,
    pub launch: Launch,
    /// The LMS course the meeting was launched from
    pub course: String,
    /// The member who launched the meeting, recorded as the grader
    pub host: MemberId,
    /// The institution the credentials belong to, for web-service launches
    pub institution: Option<String>,
    pub credentials: Credentials,
}

/// Look up the meeting, launch, and LMS credentials for an event
#[instrument(skip_all, fields(meeting = %keys.meeting, launch = %keys.launch))]
pub async fn resolve<S>(
    store: &S,
    refresher: &Refresher,
    keys: &EventKeys,
    params: &LaunchParams,
) -> Result<ResolvedContext, Error>
where
    S: CredentialStore + ?Sized,
{
    let (meeting, launch) =
        futures::try_join!(store.meeting(&keys.meeting), store.launch(&keys.launch))?;
    let meeting = meeting.ok_or_else(|| Error::UnknownMeeting(keys.meeting.clone()))?;
    let launch = launch.ok_or_else(|| Error::UnknownSession(keys.launch.clone()))?;

    let course = params
        .course
        .iter()
        .find_map(|name| launch.param(name))
        .ok_or_else(|| Error::MissingIdentityKey(params.course.join(" or ")))?;

    let (institution, credentials) = match launch.kind {
        LmsKind::WebService => {
            let key = identity::institution_key(&launch.params.0, &params.consumer_key)?;
            let credentials = institution_credentials(store, &key).await?;
            (Some(key), credentials)
        }
        LmsKind::Rest => (None, token_credentials(store, refresher, &launch.nonce).await?),
    };

    let host = launch
        .param(&params.host)
        .and_then(|raw| credentials.member_ids.normalize(&raw))
        .ok_or_else(|| Error::MissingIdentityKey(params.host.clone()))?;

    debug!(%course, %host, kind = %launch.kind, "resolved meeting context");

    Ok(ResolvedContext {
        meeting,
        launch,
        course,
        host,
        institution,
        credentials,
    })
}

async fn institution_credentials<S>(store: &S, key: &str) -> Result<Credentials, Error>
where
    S: CredentialStore + ?Sized,
{
    let institution = store
        .institution(key)
        .await?
        .ok_or_else(|| Error::credentials(format!("unknown institution {key:?}")))?;

    Ok(Credentials {
        kind: LmsKind::WebService,
        base_url: present(institution.base_url, "institution has no base url")?,
        token: present(institution.token, "institution has no web-service token")?,
        member_ids: member_id_rule(LmsKind::WebService, institution.member_id_rule.as_deref())?,
    })
}

async fn token_credentials<S>(
    store: &S,
    refresher: &Refresher,
    nonce: &str,
) -> Result<Credentials, Error>
where
    S: CredentialStore + ?Sized,
{
    let mut token = store
        .launch_token(nonce)
        .await?
        .ok_or_else(|| Error::credentials("launch has no access token"))?;

    if token.is_expired() && token.refresh_token.is_some() {
        let grant = refresher.refresh(&token).await.map_err(|error| {
            warn!(%error, "failed to refresh access token");
            Error::credentials(format!("token refresh failed: {error}"))
        })?;
        store.save_grant(&mut token, grant).await?;
    }

    Ok(Credentials {
        kind: LmsKind::Rest,
        base_url: present(token.base_url, "grant has no base url")?,
        token: present(token.access_token, "grant has no access token")?,
        member_ids: member_id_rule(LmsKind::Rest, token.member_id_rule.as_deref())?,
    })
}

fn present(value: Option<String>, reason: &'static str) -> Result<String, Error> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::credentials(reason))
}

fn member_id_rule(kind: LmsKind, configured: Option<&str>) -> Result<MemberIdRule, Error> {
    match configured {
        Some(rule) => rule.parse::<MemberIdRule>().map_err(Error::credentials),
        None => Ok(MemberIdRule::default_for(kind)),
    }
}
