use std::fmt::{Display, Formatter};

pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error from an LMS adapter
///
/// Every failure is classified into exactly one of these so the retry policy can decide
/// whether another attempt is worthwhile.
#[derive(Debug)]
pub enum Error {
    /// The LMS did not answer in time
    TransportTimeout(BoxError),
    /// The LMS could not be reached at all, i.e. a malformed or unreachable URL
    TransportUnavailable(BoxError),
    /// The LMS refused the request
    RequestRejected {
        /// The provider-supplied reason code
        code: String,
        message: String,
    },
    /// The response did not have the expected structure
    UnexpectedShape {
        expected: &'static str,
        content: String,
    },
}

impl Error {
    /// Build a rejection from a provider reason code
    pub(crate) fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RequestRejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a shape mismatch
    pub(crate) fn shape(expected: &'static str, content: impl Into<String>) -> Self {
        Self::UnexpectedShape {
            expected,
            content: content.into(),
        }
    }

    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportTimeout(_) | Self::TransportUnavailable(_)
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportTimeout(_) => write!(f, "timed out waiting for the lms"),
            Self::TransportUnavailable(_) => write!(f, "the lms is unavailable"),
            Self::RequestRejected { code, message } => {
                write!(f, "request rejected ({code}): {message:?}")
            }
            Self::UnexpectedShape { expected, content } => {
                write!(f, "expected {expected}, got: {content:?}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TransportTimeout(e) | Self::TransportUnavailable(e) => Some(&**e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Error::TransportTimeout(Box::new(error))
        } else if error.is_decode() {
            Error::shape("a decodable body", error.to_string())
        } else {
            Error::TransportUnavailable(Box::new(error))
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(error: url::ParseError) -> Self {
        Error::TransportUnavailable(Box::new(error))
    }
}
