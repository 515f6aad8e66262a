//! Search provider trait and result normalization
//!
//! Providers return raw [`SearchResults`]; [`normalize`] enforces the record
//! invariants (resolvable unique urls, valid thumbnails) whatever the backend.

use crate::error::OrchestrationError;
use crate::models::SearchResults;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

pub mod firecrawl;
pub use firecrawl::FirecrawlClient;

/// Web, news and image search in one call
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<SearchResults>;
}

/// Thumbnail hosts and paths known to serve placeholders or block hotlinking
const BLOCKED_IMAGE_PATTERNS: &[&str] = &["lookaside.instagram.com", "google_widget/crawler", "/seo/"];

/// Host of an http(s) url, if it has one
pub fn hostname(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    parsed.host_str().map(str::to_string)
}

pub fn is_valid_image_url(raw: Option<&str>) -> bool {
    let Some(raw) = raw else {
        return false;
    };
    if BLOCKED_IMAGE_PATTERNS.iter().any(|p| raw.contains(p)) {
        return false;
    }
    match Url::parse(raw) {
        Ok(u) => u.scheme() == "http" || u.scheme() == "https",
        Err(_) => false,
    }
}

/// Drop records without a resolvable url, de-duplicate each kind by url,
/// drop images without a valid thumbnail and fill in missing site names.
pub fn normalize(results: SearchResults) -> SearchResults {
    let mut seen = HashSet::new();
    let sources = results
        .sources
        .into_iter()
        .filter_map(|mut s| {
            let host = hostname(&s.url)?;
            if !seen.insert(s.url.clone()) {
                return None;
            }
            if s.title.is_empty() {
                s.title = s.url.clone();
            }
            s.site_name.get_or_insert(host);
            Some(s)
        })
        .collect();

    let mut seen = HashSet::new();
    let news_results = results
        .news_results
        .into_iter()
        .filter_map(|mut n| {
            let host = hostname(&n.url)?;
            if !seen.insert(n.url.clone()) {
                return None;
            }
            if n.title.is_empty() {
                n.title = n.url.clone();
            }
            n.source.get_or_insert(host);
            Some(n)
        })
        .collect();

    let mut seen = HashSet::new();
    let image_results = results
        .image_results
        .into_iter()
        .filter_map(|mut i| {
            let host = hostname(&i.url)?;
            if !is_valid_image_url(i.thumbnail.as_deref()) || !seen.insert(i.url.clone()) {
                return None;
            }
            if i.title.is_empty() {
                i.title = "Untitled".to_string();
            }
            i.source.get_or_insert(host);
            Some(i)
        })
        .collect();

    SearchResults {
        sources,
        news_results,
        image_results,
    }
}

/// In-memory provider for tests and keyless demos
pub struct ScriptedSearch {
    outcome: ScriptedOutcome,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

enum ScriptedOutcome {
    Results(SearchResults),
    Failure { status: Option<u16>, message: String },
}

impl ScriptedSearch {
    pub fn with_results(results: SearchResults) -> Self {
        Self {
            outcome: ScriptedOutcome::Results(results),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            outcome: ScriptedOutcome::Failure {
                status,
                message: message.into(),
            },
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, _query: &str, limit: usize) -> Result<SearchResults> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            ScriptedOutcome::Results(results) => {
                let mut results = results.clone();
                results.sources.truncate(limit);
                Ok(results)
            }
            ScriptedOutcome::Failure { status, message } => Err(OrchestrationError::Search {
                status: *status,
                message: message.clone(),
            }),
        }
    }
}
