use crate::{
    credentials::{self, CredentialStore, Refresher, ResolvedContext},
    event::ConferenceEndEvent,
    identity,
    lms::{Adapter, BucketId, Connector, Credit, MemberId},
    members::{self, Enrollment},
    retry::Retry,
    settings::Settings,
};
use database::ScheduledMeeting;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use tracing::{error, info, instrument, warn};

mod error;

pub use error::{Aborted, Error};

/// The steps of a synchronization, in order
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    ResolvingIdentity,
    ResolvingCredentials,
    ProvisioningContainer,
    ProvisioningBucket,
    ResolvingCreditScale,
    BuildingPresentSet,
    AggregatingEnrollment,
    MarkingPresent,
    MarkingAbsent,
    Summarizing,
    Done,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            Self::ResolvingIdentity => "resolving identity",
            Self::ResolvingCredentials => "resolving credentials",
            Self::ProvisioningContainer => "provisioning container",
            Self::ProvisioningBucket => "provisioning bucket",
            Self::ResolvingCreditScale => "resolving credit scale",
            Self::BuildingPresentSet => "building present set",
            Self::AggregatingEnrollment => "aggregating enrollment",
            Self::MarkingPresent => "marking present",
            Self::MarkingAbsent => "marking absent",
            Self::Summarizing => "summarizing",
            Self::Done => "done",
        };
        f.write_str(stage)
    }
}

/// The outcome of a synchronization
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    /// How many members a write was attempted for
    pub considered: usize,
    pub present_success: usize,
    pub present_failure: usize,
    pub absent_success: usize,
    pub absent_failure: usize,
    /// Whether the enrollment could not be fully retrieved, skipping absence marking
    pub degraded: bool,
    /// How many attendees could not be mapped to a member
    pub skipped_attendees: usize,
    /// The bucket the attendance was recorded in
    pub bucket: BucketId,
}

#[derive(Clone, Copy, Debug, Default)]
struct Tally {
    success: usize,
    failure: usize,
}

impl Tally {
    fn total(&self) -> usize {
        self.success + self.failure
    }
}

/// Records the attendance of finished conferences in the LMS they were launched from
pub struct Engine<S, C> {
    store: S,
    connector: C,
    refresher: Refresher,
    retry: Retry,
    settings: Settings,
}

impl<S, C> Engine<S, C>
where
    S: CredentialStore,
    C: Connector,
{
    pub fn new(store: S, connector: C, settings: Settings) -> Self {
        Engine {
            store,
            connector,
            refresher: Refresher::new(settings.lms.timeout),
            retry: Retry::default(),
            settings,
        }
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: Retry) -> Self {
        self.retry = retry;
        self
    }

    /// Process a single conference-ended event
    #[instrument(name = "Engine::synchronize", skip_all, fields(attendees = event.attendees.len()))]
    pub async fn synchronize(&self, event: &ConferenceEndEvent) -> Result<Summary, Aborted> {
        let mut stage = Stage::ResolvingIdentity;

        match self.run(event, &mut stage).await {
            Ok(summary) => Ok(summary),
            Err(error) => {
                error!(%stage, %error, "synchronization aborted");
                Err(Aborted { stage, error })
            }
        }
    }

    async fn run(&self, event: &ConferenceEndEvent, stage: &mut Stage) -> Result<Summary, Error> {
        let keys = identity::resolve(event, &self.settings.metadata)?;

        *stage = Stage::ResolvingCredentials;
        let context = credentials::resolve(
            &self.store,
            &self.refresher,
            &keys,
            &self.settings.launch_params,
        )
        .await?;
        let adapter = self.connector.connect(&context.credentials)?;
        self.retry.run("verify", || adapter.verify()).await?;

        *stage = Stage::ProvisioningContainer;
        let container = match &self.settings.container_name {
            Some(name) => Some(
                self.retry
                    .run("find_or_create_container", || {
                        adapter.find_or_create_container(&context.course, name)
                    })
                    .await?,
            ),
            None => None,
        };

        *stage = Stage::ProvisioningBucket;
        let name = bucket_name(&context.meeting);
        let bucket = self
            .retry
            .run("create_bucket", || {
                adapter.create_bucket(
                    &context.course,
                    container.as_ref(),
                    &name,
                    context.meeting.starts_at,
                )
            })
            .await?;
        info!(%bucket, %name, "created attendance bucket");

        *stage = Stage::ResolvingCreditScale;
        let scale = self
            .retry
            .run("resolve_credit_scale", || {
                adapter.resolve_credit_scale(&context.course, &bucket)
            })
            .await?;

        *stage = Stage::BuildingPresentSet;
        let present = members::present(
            &event.attendees,
            &context.credentials.member_ids,
            context.host,
        );
        if present.skipped > 0 {
            warn!(skipped = present.skipped, "some attendees are not course members");
        }

        *stage = Stage::AggregatingEnrollment;
        let enrollment = members::aggregate(adapter.as_ref(), &self.retry, &context.course).await;

        *stage = Stage::MarkingPresent;
        let present_tally = self
            .mark(
                adapter.as_ref(),
                &context,
                &bucket,
                present.members.iter().copied(),
                &scale.present,
            )
            .await;

        *stage = Stage::MarkingAbsent;
        let absent_tally = match &enrollment {
            Enrollment::Complete(enrolled) => {
                let absent = members::absent(enrolled, &present);
                self.mark(adapter.as_ref(), &context, &bucket, absent, &scale.absent)
                    .await
            }
            Enrollment::Partial { error, .. } => {
                warn!(%error, "enrollment incomplete, not marking absences");
                Tally::default()
            }
        };

        *stage = Stage::Summarizing;
        let summary = Summary {
            considered: present_tally.total() + absent_tally.total(),
            present_success: present_tally.success,
            present_failure: present_tally.failure,
            absent_success: absent_tally.success,
            absent_failure: absent_tally.failure,
            degraded: !enrollment.is_complete(),
            skipped_attendees: present.skipped,
            bucket,
        };
        info!(
            considered = summary.considered,
            present_success = summary.present_success,
            present_failure = summary.present_failure,
            absent_success = summary.absent_success,
            absent_failure = summary.absent_failure,
            degraded = summary.degraded,
            bucket = %summary.bucket,
            "attendance synchronized"
        );

        *stage = Stage::Done;
        Ok(summary)
    }

    /// Write the same credit for every member, tallying the outcomes
    async fn mark<I>(
        &self,
        adapter: &dyn Adapter,
        context: &ResolvedContext,
        bucket: &BucketId,
        members: I,
        credit: &Credit,
    ) -> Tally
    where
        I: IntoIterator<Item = MemberId>,
    {
        let course = context.course.as_str();
        let actor = context.host;

        stream::iter(members)
            .map(|member| async move {
                let result = self
                    .retry
                    .run("write_credit", || {
                        adapter.write_credit(course, bucket, member, credit, actor)
                    })
                    .await;

                if let Err(error) = &result {
                    warn!(%member, %credit, %error, "failed to record attendance");
                }
                result.is_ok()
            })
            .buffer_unordered(self.settings.write_concurrency.max(1))
            .fold(Tally::default(), |mut tally, ok| async move {
                if ok {
                    tally.success += 1;
                } else {
                    tally.failure += 1;
                }
                tally
            })
            .await
    }
}

/// Buckets are named after the meeting and the day it was scheduled for
fn bucket_name(meeting: &ScheduledMeeting) -> String {
    format!("{} ({})", meeting.name, meeting.starts_at.format("%Y-%m-%d"))
}
