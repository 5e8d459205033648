use std::fmt;

/// Error type for talk-proto
///
/// Errors returned from the transport's entry points are terminal for the
/// owning session. Errors handed to a [`HttpClient`][crate::HttpClient]
/// completion only concern that one fetch.
#[derive(Debug, PartialEq, Eq)]
#[allow(missing_docs)]
#[non_exhaustive]
pub enum Error {
    BadHeader(String),
    BadContentLengthHeader,
    HttpParseFail(String),
    HttpParseTooManyHeaders,
    BadUrl(String),
    Connect(String),
    ConnectionLost,
    SessionDied,
    CallFailed(String),
    Deauthorized(String),
    Fetch(String),
}

impl Error {
    /// Tell if the session must not be recovered automatically.
    ///
    /// True when retrying would fight another client over the same session,
    /// or when the stored credentials were revoked.
    pub fn wants_to_die(&self) -> bool {
        matches!(self, Error::SessionDied | Error::Deauthorized(_))
    }
}

impl From<httparse::Error> for Error {
    fn from(value: httparse::Error) -> Self {
        match value {
            httparse::Error::TooManyHeaders => Error::HttpParseTooManyHeaders,
            _ => Error::HttpParseFail(value.to_string()),
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadHeader(v) => write!(f, "bad header: {}", v),
            Error::BadContentLengthHeader => write!(f, "content-length header not a number"),
            Error::HttpParseFail(v) => write!(f, "http parse fail: {}", v),
            Error::HttpParseTooManyHeaders => write!(f, "http parse resulted in too many headers"),
            Error::BadUrl(v) => write!(f, "bad url: {}", v),
            Error::Connect(v) => write!(f, "connect failed: {}", v),
            Error::ConnectionLost => write!(f, "lost connection to server"),
            Error::SessionDied => write!(f, "session died"),
            Error::CallFailed(v) => write!(f, "call failed: {}", v),
            Error::Deauthorized(v) => write!(f, "deauthorized: {}", v),
            Error::Fetch(v) => write!(f, "fetch failed: {}", v),
        }
    }
}
