use super::Stage;
use crate::{identity::MissingKey, lms};
use std::fmt::{Display, Formatter};

/// Why a synchronization could not continue
#[derive(Debug)]
pub enum Error {
    /// A key needed to identify the meeting, launch, course, or host was missing
    MissingIdentityKey(String),
    /// The event refers to a meeting we never scheduled
    UnknownMeeting(String),
    /// The event refers to a launch we never recorded
    UnknownSession(String),
    /// No usable LMS credentials could be found
    MissingCredentials(String),
    /// The credential store could not be queried
    Store(database::Error),
    /// The LMS failed in a way that prevents continuing
    Lms(lms::Error),
}

impl Error {
    pub(crate) fn credentials<S: Into<String>>(reason: S) -> Self {
        Error::MissingCredentials(reason.into())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Lms(e) => Some(e),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingIdentityKey(key) => write!(f, "missing identity key {key:?}"),
            Self::UnknownMeeting(reference) => write!(f, "unknown scheduled meeting {reference:?}"),
            Self::UnknownSession(nonce) => write!(f, "unknown launch session {nonce:?}"),
            Self::MissingCredentials(reason) => write!(f, "missing lms credentials: {reason}"),
            Self::Store(_) => write!(f, "credential store unavailable"),
            Self::Lms(e) => write!(f, "lms error: {e}"),
        }
    }
}

impl From<MissingKey> for Error {
    fn from(key: MissingKey) -> Self {
        Error::MissingIdentityKey(key.0)
    }
}

impl From<database::Error> for Error {
    fn from(error: database::Error) -> Self {
        Error::Store(error)
    }
}

impl From<lms::Error> for Error {
    fn from(error: lms::Error) -> Self {
        Error::Lms(error)
    }
}

/// A synchronization that stopped before recording attendance
#[derive(Debug)]
pub struct Aborted {
    /// Where the workflow was when it stopped
    pub stage: Stage,
    pub error: Error,
}

impl std::error::Error for Aborted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl Display for Aborted {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "synchronization aborted while {}: {}", self.stage, self.error)
    }
}
