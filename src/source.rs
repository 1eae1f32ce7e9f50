use crate::error::{Error, Result};
use crate::item::WorkItem;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use url::Url;

/// How a dispatch run decides it is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// A fixed number of requests against one target.
    Counted,
    /// Every candidate exactly once.
    Exhaustion,
}

/// Shared, synchronized supplier of work. Workers pull from it; each call to
/// [`EndpointSource::next_item`] hands out a distinct item or `None` once the
/// source is drained.
pub trait EndpointSource: Send + Sync {
    fn next_item(&self) -> Option<WorkItem>;

    /// Number of items this source will hand out in total.
    fn total(&self) -> u64;

    fn mode(&self) -> DispatchMode;
}

/// Parses a dispatch target, rejecting anything that is not an absolute
/// http(s) URL.
pub fn parse_target(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|source| Error::InvalidTarget {
        target: raw.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::Config(format!(
            "Unsupported scheme '{}' in target {}",
            other, raw
        ))),
    }
}

/// Counted mode: the same target handed out `target` times.
///
/// Claims are ticketed, so the number of items handed out can never exceed
/// the target no matter how many workers race for the last one.
pub struct RepeatSource {
    url: Url,
    target: u64,
    issued: AtomicU64,
}

impl RepeatSource {
    pub fn new(url: Url, target: u64) -> Self {
        Self {
            url,
            target,
            issued: AtomicU64::new(0),
        }
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }
}

impl EndpointSource for RepeatSource {
    fn next_item(&self) -> Option<WorkItem> {
        let target = self.target;
        self.issued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < target).then_some(n + 1)
            })
            .ok()
            .map(|seq| WorkItem::new(seq, self.url.clone()))
    }

    fn total(&self) -> u64 {
        self.target
    }

    fn mode(&self) -> DispatchMode {
        DispatchMode::Counted
    }
}

/// Exhaustion mode: a deduplicated, ordered set of proxy endpoints, each
/// probed against the same test URL.
pub struct CandidateSource {
    test_url: Url,
    candidates: Vec<String>,
    cursor: AtomicUsize,
}

impl CandidateSource {
    /// Builds the source, keeping the first occurrence of each candidate.
    pub fn new<I, S>(test_url: Url, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let candidates: Vec<String> = candidates
            .into_iter()
            .map(Into::into)
            .filter(|c| seen.insert(c.clone()))
            .collect();

        Self {
            test_url,
            candidates,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Reads a candidate list from a file, one endpoint per line.
    pub fn from_file<P: AsRef<Path>>(test_url: Url, path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let candidates = parse_candidates(&content);
        log::info!(
            "Loaded {} candidate lines from {}",
            candidates.len(),
            path.display()
        );
        Ok(Self::new(test_url, candidates))
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }
}

impl EndpointSource for CandidateSource {
    fn next_item(&self) -> Option<WorkItem> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        self.candidates
            .get(index)
            .map(|proxy| WorkItem::via_proxy(index as u64, self.test_url.clone(), proxy.clone()))
    }

    fn total(&self) -> u64 {
        self.candidates.len() as u64
    }

    fn mode(&self) -> DispatchMode {
        DispatchMode::Exhaustion
    }
}

/// Extracts `host:port` (or full proxy URL) entries from a plain-text list.
/// Blank lines and `#` comments are skipped.
pub fn parse_candidates(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && line.contains(':'))
        .map(str::to_string)
        .collect()
}
