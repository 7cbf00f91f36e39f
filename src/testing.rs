use crate::{
    credentials::{CredentialStore, Grant},
    lms::{
        self, Adapter, BucketId, Connector, ContainerId, Credentials, Credit, CreditScale,
        MemberId, Page,
    },
    retry::Delay,
};
use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use database::{Institution, Json, Launch, LaunchToken, LmsKind, ScheduledMeeting};
use serde_json::Value;
use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

/// Serve a router on an ephemeral local port, returning its base url
pub async fn serve(router: Router) -> String {
    let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0)))
        .serve(router.into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);

    format!("http://{addr}")
}

/// Records delays instead of sleeping
#[derive(Default)]
pub struct CountingDelay {
    waits: Mutex<Vec<Duration>>,
}

impl CountingDelay {
    pub fn count(&self) -> usize {
        self.waits.lock().unwrap().len()
    }

    pub fn total(&self) -> Duration {
        self.waits.lock().unwrap().iter().sum()
    }
}

#[async_trait]
impl Delay for CountingDelay {
    async fn wait(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

pub fn starts_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap()
}

pub fn meeting(reference: &str, name: &str) -> ScheduledMeeting {
    ScheduledMeeting {
        id: 1,
        reference: reference.to_owned(),
        name: name.to_owned(),
        starts_at: starts_at(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn launch(nonce: &str, kind: LmsKind, params: Value) -> Launch {
    Launch {
        nonce: nonce.to_owned(),
        kind,
        params: Json(params),
        created_at: Utc::now(),
    }
}

pub fn institution(consumer_key: &str, base_url: &str) -> Institution {
    Institution {
        consumer_key: consumer_key.to_owned(),
        name: String::from("Example University"),
        base_url: Some(base_url.to_owned()),
        token: Some(String::from("token")),
        member_id_rule: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn launch_token(base_url: &str) -> LaunchToken {
    LaunchToken {
        nonce: String::from("n-1"),
        base_url: Some(base_url.to_owned()),
        access_token: Some(String::from("token")),
        refresh_token: None,
        expires_at: None,
        token_url: None,
        client_id: None,
        client_secret: None,
        member_id_rule: None,
        updated_at: Utc::now(),
    }
}

/// An in-memory credential store
#[derive(Default)]
pub struct FakeStore {
    meetings: HashMap<String, ScheduledMeeting>,
    launches: HashMap<String, Launch>,
    institutions: HashMap<String, Institution>,
    tokens: HashMap<String, LaunchToken>,
    saved: Mutex<Vec<LaunchToken>>,
}

impl FakeStore {
    pub fn with_meeting(mut self, meeting: ScheduledMeeting) -> Self {
        self.meetings.insert(meeting.reference.clone(), meeting);
        self
    }

    pub fn with_launch(mut self, launch: Launch) -> Self {
        self.launches.insert(launch.nonce.clone(), launch);
        self
    }

    pub fn with_institution(mut self, institution: Institution) -> Self {
        self.institutions
            .insert(institution.consumer_key.clone(), institution);
        self
    }

    pub fn with_token(mut self, token: LaunchToken) -> Self {
        self.tokens.insert(token.nonce.clone(), token);
        self
    }

    /// The grants persisted after a refresh
    pub fn saved_grants(&self) -> Vec<LaunchToken> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialStore for FakeStore {
    async fn meeting(&self, reference: &str) -> Result<Option<ScheduledMeeting>, database::Error> {
        Ok(self.meetings.get(reference).cloned())
    }

    async fn launch(&self, nonce: &str) -> Result<Option<Launch>, database::Error> {
        Ok(self.launches.get(nonce).cloned())
    }

    async fn institution(&self, consumer_key: &str) -> Result<Option<Institution>, database::Error> {
        Ok(self.institutions.get(consumer_key).cloned())
    }

    async fn launch_token(&self, nonce: &str) -> Result<Option<LaunchToken>, database::Error> {
        Ok(self.tokens.get(nonce).cloned())
    }

    async fn save_grant(&self, token: &mut LaunchToken, grant: Grant) -> Result<(), database::Error> {
        token.access_token = Some(grant.access_token);
        token.refresh_token = grant.refresh_token.or_else(|| token.refresh_token.take());
        token.expires_at = grant.expires_at;

        self.saved.lock().unwrap().push(token.clone());
        Ok(())
    }
}

/// An in-memory LMS
pub struct FakeLms {
    pages: Vec<Vec<MemberId>>,
    failing_page: Option<usize>,
    looping: bool,
    ignore_cursor: bool,
    scale: Option<CreditScale>,
    reject_verify: bool,
    failing_members: HashSet<MemberId>,
    write_delay: Option<Duration>,
    enrollment_requests: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    containers: Mutex<Vec<(String, String)>>,
    buckets: Mutex<Vec<(Option<ContainerId>, String)>>,
    writes: Mutex<Vec<(MemberId, Credit, MemberId)>>,
}

impl Default for FakeLms {
    fn default() -> Self {
        FakeLms {
            pages: Vec::new(),
            failing_page: None,
            looping: false,
            ignore_cursor: false,
            scale: Some(CreditScale {
                present: Credit::Points(100.0),
                absent: Credit::Points(0.0),
            }),
            reject_verify: false,
            failing_members: HashSet::new(),
            write_delay: None,
            enrollment_requests: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            containers: Mutex::default(),
            buckets: Mutex::default(),
            writes: Mutex::default(),
        }
    }
}

impl FakeLms {
    pub fn with_pages(mut self, pages: Vec<Vec<MemberId>>) -> Self {
        self.pages = pages;
        self
    }

    /// Reject requests for the page at `index`
    pub fn failing_page(mut self, index: usize) -> Self {
        self.failing_page = Some(index);
        self
    }

    /// Make the last page point back at itself
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Serve the first page for every cursor, always claiming there is more
    pub fn ignoring_cursor(mut self) -> Self {
        self.ignore_cursor = true;
        self
    }

    /// Keep every write in flight for a while
    pub fn slow_writes(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn without_scale(mut self) -> Self {
        self.scale = None;
        self
    }

    pub fn rejecting_verify(mut self) -> Self {
        self.reject_verify = true;
        self
    }

    pub fn failing_member(mut self, member: MemberId) -> Self {
        self.failing_members.insert(member);
        self
    }

    pub fn enrollment_requests(&self) -> usize {
        self.enrollment_requests.load(Ordering::SeqCst)
    }

    /// The most writes that were ever in flight at once
    pub fn peak_writes(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn containers(&self) -> Vec<(String, String)> {
        self.containers.lock().unwrap().clone()
    }

    pub fn buckets(&self) -> Vec<(Option<ContainerId>, String)> {
        self.buckets.lock().unwrap().clone()
    }

    /// Every successful write as `(member, credit, actor)`
    pub fn writes(&self) -> Vec<(MemberId, Credit, MemberId)> {
        self.writes.lock().unwrap().clone()
    }

    /// The credit written for a member, if any
    pub fn credit_of(&self, member: MemberId) -> Option<Credit> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .find(|(m, _, _)| *m == member)
            .map(|(_, credit, _)| credit.clone())
    }
}

#[async_trait]
impl Adapter for FakeLms {
    async fn verify(&self) -> lms::Result<()> {
        if self.reject_verify {
            Err(lms::Error::rejected("missing_functions", "core_grades_update_grades"))
        } else {
            Ok(())
        }
    }

    async fn find_or_create_container(&self, course: &str, name: &str) -> lms::Result<ContainerId> {
        let mut containers = self.containers.lock().unwrap();
        let index = match containers.iter().position(|(c, n)| c == course && n == name) {
            Some(index) => index,
            None => {
                containers.push((course.to_owned(), name.to_owned()));
                containers.len() - 1
            }
        };

        Ok(ContainerId(format!("c-{index}")))
    }

    async fn create_bucket(
        &self,
        _course: &str,
        container: Option<&ContainerId>,
        name: &str,
        _when: DateTime<Utc>,
    ) -> lms::Result<BucketId> {
        let mut buckets = self.buckets.lock().unwrap();
        buckets.push((container.cloned(), name.to_owned()));

        Ok(BucketId(format!("b-{}", buckets.len())))
    }

    async fn resolve_credit_scale(
        &self,
        _course: &str,
        _bucket: &BucketId,
    ) -> lms::Result<CreditScale> {
        self.scale
            .clone()
            .ok_or_else(|| lms::Error::shape("two distinct graded statuses", "[]"))
    }

    async fn list_enrollment(&self, _course: &str, cursor: Option<&str>) -> lms::Result<Page> {
        self.enrollment_requests.fetch_add(1, Ordering::SeqCst);
        let index = match cursor {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| lms::Error::rejected("invalid_cursor", cursor))?,
            None => 0,
        };

        if self.failing_page == Some(index) {
            return Err(lms::Error::rejected("invalid_parameter", "page unavailable"));
        }

        if self.ignore_cursor {
            return Ok(Page {
                members: self.pages.first().cloned().unwrap_or_default(),
                next: Some((index + 1).to_string()),
            });
        }

        let members = self.pages.get(index).cloned().unwrap_or_default();
        let next = if index + 1 < self.pages.len() {
            Some((index + 1).to_string())
        } else if self.looping {
            Some(index.to_string())
        } else {
            None
        };

        Ok(Page { members, next })
    }

    async fn write_credit(
        &self,
        _course: &str,
        _bucket: &BucketId,
        member: MemberId,
        credit: &Credit,
        actor: MemberId,
    ) -> lms::Result<()> {
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_members.contains(&member) {
            return Err(lms::Error::rejected("nopermissions", "cannot grade member"));
        }

        self.writes
            .lock()
            .unwrap()
            .push((member, credit.clone(), actor));
        Ok(())
    }
}

/// Hands out the same in-memory LMS for every set of credentials
pub struct FakeConnector {
    pub lms: Arc<FakeLms>,
    pub connected: Mutex<Vec<Credentials>>,
}

impl FakeConnector {
    pub fn new(lms: FakeLms) -> Self {
        FakeConnector {
            lms: Arc::new(lms),
            connected: Mutex::default(),
        }
    }
}

impl Connector for FakeConnector {
    fn connect(&self, credentials: &Credentials) -> lms::Result<Arc<dyn Adapter>> {
        self.connected.lock().unwrap().push(credentials.clone());
        Ok(self.lms.clone())
    }
}
