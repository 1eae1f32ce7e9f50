use crate::error::RequestError;
use std::time::{Duration, Instant};
use url::Url;

/// One unit of dispatchable work: a target URL, optionally reached through
/// a proxy endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    seq: u64,
    url: Url,
    proxy: Option<String>,
}

impl WorkItem {
    pub fn new(seq: u64, url: Url) -> Self {
        Self {
            seq,
            url,
            proxy: None,
        }
    }

    pub fn via_proxy(seq: u64, url: Url, proxy: impl Into<String>) -> Self {
        Self {
            seq,
            url,
            proxy: Some(proxy.into()),
        }
    }

    /// Position of this item in the order the source handed it out.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    /// The thing being measured: the proxy when there is one, else the URL.
    pub fn endpoint(&self) -> &str {
        self.proxy.as_deref().unwrap_or(self.url.as_str())
    }
}

/// A single execution of a [`WorkItem`].
#[derive(Debug)]
pub struct Attempt {
    pub index: u32,
    pub started: Instant,
    pub result: std::result::Result<Duration, RequestError>,
}

/// Final disposition of a [`WorkItem`] once the retry loop is done with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { latency: Duration, attempts: u32 },
    Failure { error: RequestError, attempts: u32 },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Outcome::Success { attempts, .. } | Outcome::Failure { attempts, .. } => *attempts,
        }
    }

    pub fn latency(&self) -> Option<Duration> {
        match self {
            Outcome::Success { latency, .. } => Some(*latency),
            Outcome::Failure { .. } => None,
        }
    }
}
