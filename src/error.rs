use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid target '{target}': {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error("Environment overlay failed: {0}")]
    Env(#[from] ::config::ConfigError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a single request attempt did not count as a success.
///
/// Transport failures and unexpected statuses share one type so the retry
/// loop can treat them uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The per-call timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// Connection refused, reset, or the host could not be resolved.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other transport-level failure, including a malformed proxy.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a status that is not the accepted one.
    #[error("HTTP {0}")]
    Status(u16),
}

impl RequestError {
    pub fn is_transport(&self) -> bool {
        !matches!(self, RequestError::Status(_))
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RequestError::Timeout
        } else if err.is_connect() {
            RequestError::Connect(err.to_string())
        } else {
            RequestError::Transport(err.to_string())
        }
    }
}
