use std::time::Duration;

/// Failure of one API call, after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No response was received.
    Network(String),
    /// 4xx other than 429.
    Client { status: u16, message: String },
    RateLimited { retry_after: Option<Duration> },
    /// 5xx.
    Server { status: u16, message: String },
    /// The body did not match the endpoint schema.
    Decode(String),
    /// Bad input, detected before any request was sent.
    Validation(String),
}

impl ApiError {
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => ApiError::RateLimited { retry_after: None },
            500..=599 => ApiError::Server { status, message },
            _ => ApiError::Client { status, message },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Client { status, .. } | ApiError::Server { status, .. } => Some(*status),
            ApiError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "network error: {msg}"),
            ApiError::Client { status, message } => write!(f, "request rejected ({status}): {message}"),
            ApiError::RateLimited { retry_after: Some(d) } => {
                write!(f, "rate limited, retry after {}s", d.as_secs())
            }
            ApiError::RateLimited { retry_after: None } => write!(f, "rate limited"),
            ApiError::Server { status, message } => write!(f, "server error ({status}): {message}"),
            ApiError::Decode(msg) => write!(f, "unexpected response: {msg}"),
            ApiError::Validation(msg) => write!(f, "invalid request: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ApiError::from_status(status.as_u16(), e.to_string()),
            None if e.is_decode() => ApiError::Decode(e.to_string()),
            None => ApiError::Network(e.to_string()),
        }
    }
}
