use crate::{
    event::Attendee,
    lms::{self, Adapter, MemberId, MemberIdRule},
    retry::Retry,
};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, instrument, warn};

/// The members who attended
#[derive(Debug, Default, PartialEq)]
pub struct Present {
    pub members: BTreeSet<MemberId>,
    /// The launching member plus anyone the conference flagged as a host
    pub hosts: BTreeSet<MemberId>,
    /// How many attendees could not be mapped to a member
    pub skipped: usize,
}

/// Map the attendees onto LMS members, leaving out the hosts
pub fn present(attendees: &[Attendee], rule: &MemberIdRule, host: MemberId) -> Present {
    let mut result = Present::default();
    result.hosts.insert(host);

    for attendee in attendees {
        match rule.normalize(&attendee.external_id) {
            Some(id) if id == host || attendee.is_host => {
                result.hosts.insert(id);
            }
            Some(id) => {
                result.members.insert(id);
            }
            None => {
                debug!(external_id = %attendee.external_id, "attendee is not a course member");
                result.skipped += 1;
            }
        }
    }

    // a flagged host may also have joined under a second identifier
    for host in &result.hosts {
        result.members.remove(host);
    }

    result
}

/// The members enrolled in a course
#[derive(Debug)]
pub enum Enrollment {
    /// Every page was retrieved
    Complete(Vec<MemberId>),
    /// Retrieval stopped part way through
    Partial {
        members: Vec<MemberId>,
        error: lms::Error,
    },
}

impl Enrollment {
    /// The members retrieved so far
    pub fn members(&self) -> &[MemberId] {
        match self {
            Self::Complete(members) | Self::Partial { members, .. } => members,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// Walk every page of the course enrollment
///
/// Members are deduplicated and kept in the order they were first listed.
#[instrument(skip_all, fields(%course))]
pub async fn aggregate(adapter: &dyn Adapter, retry: &Retry, course: &str) -> Enrollment {
    let mut members = Vec::new();
    let mut seen = HashSet::new();
    let mut cursors = HashSet::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = retry
            .run("list_enrollment", || {
                adapter.list_enrollment(course, cursor.as_deref())
            })
            .await;

        let page = match page {
            Ok(page) => page,
            Err(error) => {
                warn!(%error, retrieved = members.len(), "enrollment listing failed");
                return Enrollment::Partial { members, error };
            }
        };

        let before = members.len();
        for member in page.members {
            if seen.insert(member) {
                members.push(member);
            }
        }

        match page.next {
            None => break,
            Some(next) if members.len() == before || !cursors.insert(next.clone()) => {
                let error = lms::Error::shape("a page with new members", next);
                warn!(%error, retrieved = members.len(), "enrollment listing stopped advancing");
                return Enrollment::Partial { members, error };
            }
            Some(next) => cursor = Some(next),
        }
    }

    debug!(count = members.len(), "retrieved enrollment");
    Enrollment::Complete(members)
}

/// Everyone enrolled who did not attend, other than the hosts
pub fn absent(enrollment: &[MemberId], present: &Present) -> Vec<MemberId> {
    enrollment
        .iter()
        .copied()
        .filter(|member| !present.hosts.contains(member) && !present.members.contains(member))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{absent, aggregate, present, Enrollment};
    use crate::{
        event::Attendee,
        lms::{Error, MemberId, MemberIdRule},
        retry::Retry,
        testing::{CountingDelay, FakeLms},
    };
    use std::{collections::BTreeSet, sync::Arc};

    fn attendee(id: &str) -> Attendee {
        Attendee {
            external_id: id.to_owned(),
            is_host: false,
        }
    }

    fn ids(raw: &[u64]) -> Vec<MemberId> {
        raw.iter().copied().map(MemberId).collect()
    }

    fn retry() -> Retry {
        Retry::new(Arc::new(CountingDelay::default()))
    }

    #[test]
    fn present_excludes_the_host() {
        let attendees = [attendee("p_1"), attendee("p_2"), attendee("p_9")];
        let present = present(&attendees, &MemberIdRule::LastSegment('_'), MemberId(9));

        assert_eq!(present.members, ids(&[1, 2]).into_iter().collect());
        assert_eq!(present.hosts, ids(&[9]).into_iter().collect());
        assert_eq!(present.skipped, 0);
    }

    #[test]
    fn malformed_identifiers_are_skipped() {
        let attendees = [
            attendee("p_1"),
            attendee("guest"),
            attendee("p_"),
            attendee("p_1"),
        ];
        let present = present(&attendees, &MemberIdRule::LastSegment('_'), MemberId(9));

        assert_eq!(present.members, ids(&[1]).into_iter().collect());
        assert_eq!(present.skipped, 2);
    }

    #[test]
    fn absent_is_disjoint_from_present_and_host() {
        let attendees = [attendee("p_1"), attendee("p_2")];
        let present = present(&attendees, &MemberIdRule::LastSegment('_'), MemberId(9));
        let absent = absent(&ids(&[1, 2, 3, 4, 9]), &present);

        assert_eq!(absent, ids(&[3, 4]));
        assert!(absent.iter().all(|m| !present.members.contains(m)));
    }

    #[test]
    fn flagged_hosts_are_neither_present_nor_absent() {
        let co_host = Attendee {
            external_id: String::from("p_5"),
            is_host: true,
        };
        let attendees = [attendee("p_1"), co_host, attendee("p_5")];
        let present = present(&attendees, &MemberIdRule::LastSegment('_'), MemberId(9));

        assert_eq!(present.members, ids(&[1]).into_iter().collect::<BTreeSet<_>>());
        assert_eq!(present.hosts, ids(&[5, 9]).into_iter().collect::<BTreeSet<_>>());
        assert_eq!(absent(&ids(&[1, 3, 5, 9]), &present), ids(&[3]));
    }

    #[tokio::test]
    async fn aggregates_and_deduplicates_pages() {
        let lms = FakeLms::default().with_pages(vec![ids(&[1, 2, 3]), ids(&[3, 4]), ids(&[9])]);

        let enrollment = aggregate(&lms, &retry(), "7").await;
        assert!(enrollment.is_complete());
        assert_eq!(enrollment.members(), ids(&[1, 2, 3, 4, 9]).as_slice());
    }

    #[tokio::test]
    async fn failing_page_yields_partial_enrollment() {
        let lms = FakeLms::default()
            .with_pages(vec![ids(&[1, 2]), ids(&[3, 4])])
            .failing_page(1);

        let enrollment = aggregate(&lms, &retry(), "7").await;
        match enrollment {
            Enrollment::Partial { members, error } => {
                assert_eq!(members, ids(&[1, 2]));
                assert!(matches!(error, Error::RequestRejected { .. }));
            }
            Enrollment::Complete(_) => panic!("enrollment should be partial"),
        }
    }

    #[tokio::test]
    async fn repeated_cursor_stops_listing() {
        let lms = FakeLms::default()
            .with_pages(vec![ids(&[1]), ids(&[2])])
            .looping();

        let enrollment = aggregate(&lms, &retry(), "7").await;
        assert!(!enrollment.is_complete());
        assert_eq!(enrollment.members(), ids(&[1, 2]).as_slice());
    }

    #[tokio::test]
    async fn pages_without_new_members_stop_listing() {
        let lms = FakeLms::default()
            .with_pages(vec![ids(&[1, 2])])
            .ignoring_cursor();

        let enrollment = aggregate(&lms, &retry(), "7").await;
        match enrollment {
            Enrollment::Partial { members, error } => {
                assert_eq!(members, ids(&[1, 2]));
                assert!(matches!(error, Error::UnexpectedShape { .. }));
            }
            Enrollment::Complete(_) => panic!("enrollment should be partial"),
        }
        assert_eq!(lms.enrollment_requests(), 2);
    }
}
