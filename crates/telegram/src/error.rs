use thiserror::Error;

use dropgate_engine::TransportError;

/// Errors from Bot API calls.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// The API answered with `ok: false`.
    #[error("api error: {0}")]
    Api(String),

    /// The request never completed.
    #[error("network error: {0}")]
    Network(String),

    /// The bounded connect/read timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// The API answered `ok: true` but carried no result payload.
    #[error("missing result in response to {0}")]
    MissingResult(String),
}

impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<TelegramError> for TransportError {
    fn from(e: TelegramError) -> Self {
        match e {
            TelegramError::Api(desc) => Self::Api(desc),
            TelegramError::Network(desc) => Self::Network(desc),
            TelegramError::Timeout => Self::Timeout,
            TelegramError::MissingResult(method) => {
                Self::Api(format!("missing result for {method}"))
            }
        }
    }
}
