use thiserror::Error;

use crate::envelope::YErrorMessage;

#[derive(Error, Debug)]
pub enum YahooError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("fetching the data from yahoo! finance failed: {status} {message}")]
    FetchFailed { status: u16, message: String },
    #[error("connection to yahoo! finance server failed: {0}")]
    ConnectionFailed(#[from] reqwest::Error),
    #[error("deserializing response from yahoo! finance failed: {0}")]
    DeserializeFailed(#[from] serde_json::Error),
    #[error("yahoo! finance returned an error: {0}")]
    ApiError(YErrorMessage),
    #[error("expected key missing from yahoo! finance response: {0}")]
    MissingKey(String),
    #[error("constructing yahoo! finance client failed: {0}")]
    BuilderFailed(String),
    #[error("yahoo! finance returned an empty crumb")]
    InvalidCrumb,
    #[error("no quotes in yahoo! finance response")]
    NoQuotes,
    #[error("yahoo! finance returned inconsistent data")]
    DataInconsistency,
}

impl YahooError {
    /// True for transport failures and non-2xx responses.
    pub fn is_http(&self) -> bool {
        matches!(
            self,
            YahooError::FetchFailed { .. } | YahooError::ConnectionFailed(_)
        )
    }

    /// Status code of a non-2xx response, if that is what this error is.
    pub fn status(&self) -> Option<u16> {
        match self {
            YahooError::FetchFailed { status, .. } => Some(*status),
            YahooError::ConnectionFailed(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
