//! Thread Finder: tiered search for community threads about a route.
//!
//! The finder runs an ordered list of [`SearchTier`]s against a
//! [`SearchBackend`] and stops at the first tier that yields candidates:
//!
//! ```text
//! StrictPhraseTier   title:"Bacoor to MOA", sort=top, comments > 0
//!        │ empty
//!        ▼
//! LooseTermsTier     "Bacoor" "MOA", sort=relevance, comments > 1, cap 3
//!        │ empty
//!        ▼
//!   no candidates
//! ```
//!
//! The exact phrase filters out reverse-direction threads; the loose tier
//! trades precision for recall only when the strict one starves. A failed
//! search call is logged and treated as an empty tier.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::SearchConfig;
use crate::models::{Candidate, RouteQuery};

/// One query against the search service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub sort: String,
    pub limit: u32,
}

/// The third-party search service.
///
/// Implementations return hits in the service's ranking order with no
/// filtering applied; tiers decide what qualifies.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>>;
}

/// Reddit's public `search.json` endpoint.
pub struct RedditSearch {
    client: reqwest::Client,
    endpoint: String,
    site_origin: String,
}

impl RedditSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create search HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            site_origin: config.site_origin.clone(),
        })
    }
}

#[async_trait]
impl SearchBackend for RedditSearch {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>> {
        let limit = request.limit.to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", request.query.as_str()),
                ("sort", request.sort.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .context("search request failed")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("search service returned {}", status);
        }

        let json: Value = resp
            .json()
            .await
            .context("search response was not valid JSON")?;
        Ok(parse_listing(&json, &self.site_origin))
    }
}

/// Parse a `{data: {children: [{data: {...}}]}}` listing.
///
/// The schema is loose: missing containers mean no hits, a missing
/// `num_comments` counts as zero, and entries with neither a permalink nor
/// a URL are skipped. The permalink wins over `url`, which points at the
/// external page for link posts.
pub fn parse_listing(json: &Value, site_origin: &str) -> Vec<Candidate> {
    let children = json
        .get("data")
        .and_then(|d| d.get("children"))
        .and_then(|c| c.as_array());

    let Some(children) = children else {
        return Vec::new();
    };

    children
        .iter()
        .filter_map(|child| {
            let data = child.get("data")?;
            let url = data
                .get("permalink")
                .and_then(|p| p.as_str())
                .and_then(|p| absolutize(site_origin, p))
                .or_else(|| data.get("url").and_then(|u| u.as_str()).map(String::from))?;

            Some(Candidate {
                url,
                comment_count: data
                    .get("num_comments")
                    .and_then(|n| n.as_u64())
                    .unwrap_or(0),
                title: data
                    .get("title")
                    .and_then(|t| t.as_str())
                    .map(String::from),
            })
        })
        .collect()
}

fn absolutize(site_origin: &str, permalink: &str) -> Option<String> {
    if permalink.starts_with("http://") || permalink.starts_with("https://") {
        return Some(permalink.to_string());
    }
    url::Url::parse(site_origin)
        .and_then(|base| base.join(permalink))
        .map(|u| u.to_string())
        .ok()
}

// ═══════════════════════════════════════════════════════════════════════
// Tiers
// ═══════════════════════════════════════════════════════════════════════

/// One strategy in the finder's fallback sequence.
#[async_trait]
pub trait SearchTier: Send + Sync {
    fn name(&self) -> &str;

    /// Builds the query this tier issues for `route`.
    fn request(&self, route: &RouteQuery) -> SearchRequest;

    /// Filters raw hits down to the ones this tier trusts.
    fn accept(&self, hits: Vec<Candidate>) -> Vec<Candidate>;

    /// Search and filter. Never fails: a backend error is an empty result.
    async fn attempt(&self, backend: &dyn SearchBackend, route: &RouteQuery) -> Vec<Candidate> {
        let request = self.request(route);
        match backend.search(&request).await {
            Ok(hits) => {
                let returned = hits.len();
                let accepted = self.accept(hits);
                info!(
                    tier = self.name(),
                    query = %request.query,
                    returned,
                    accepted = accepted.len(),
                    "search tier finished"
                );
                accepted
            }
            Err(e) => {
                warn!(tier = self.name(), query = %request.query, "search failed: {:#}", e);
                Vec::new()
            }
        }
    }
}

/// Exact `"<origin> to <destination>"` title phrase, high precision.
pub struct StrictPhraseTier {
    pub namespace: String,
    pub sort: String,
    pub limit: u32,
    pub min_comments: u64,
}

impl StrictPhraseTier {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            sort: config.strict_sort.clone(),
            limit: config.strict_limit,
            min_comments: config.strict_min_comments,
        }
    }
}

#[async_trait]
impl SearchTier for StrictPhraseTier {
    fn name(&self) -> &str {
        "strict"
    }

    fn request(&self, route: &RouteQuery) -> SearchRequest {
        SearchRequest {
            query: format!(
                "subreddit:{} title:\"{} to {}\"",
                self.namespace, route.origin, route.destination
            ),
            sort: self.sort.clone(),
            limit: self.limit,
        }
    }

    fn accept(&self, hits: Vec<Candidate>) -> Vec<Candidate> {
        dedup_by_url(
            hits.into_iter()
                .filter(|c| c.comment_count > self.min_comments)
                .collect(),
        )
    }
}

/// Origin and destination as independent terms, higher recall.
pub struct LooseTermsTier {
    pub namespace: String,
    pub sort: String,
    pub limit: u32,
    pub min_comments: u64,
    pub max_results: usize,
}

impl LooseTermsTier {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            sort: config.loose_sort.clone(),
            limit: config.loose_limit,
            min_comments: config.loose_min_comments,
            max_results: config.loose_max_results,
        }
    }
}

#[async_trait]
impl SearchTier for LooseTermsTier {
    fn name(&self) -> &str {
        "loose"
    }

    fn request(&self, route: &RouteQuery) -> SearchRequest {
        SearchRequest {
            query: format!(
                "subreddit:{} \"{}\" \"{}\"",
                self.namespace, route.origin, route.destination
            ),
            sort: self.sort.clone(),
            limit: self.limit,
        }
    }

    fn accept(&self, hits: Vec<Candidate>) -> Vec<Candidate> {
        let mut accepted = dedup_by_url(
            hits.into_iter()
                .filter(|c| c.comment_count > self.min_comments)
                .collect(),
        );
        accepted.truncate(self.max_results);
        accepted
    }
}

fn dedup_by_url(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// ThreadFinder
// ═══════════════════════════════════════════════════════════════════════

pub struct ThreadFinder {
    backend: Arc<dyn SearchBackend>,
    tiers: Vec<Box<dyn SearchTier>>,
}

impl ThreadFinder {
    /// Strict tier first, loose tier second.
    pub fn new(backend: Arc<dyn SearchBackend>, config: &SearchConfig) -> Self {
        Self::with_tiers(
            backend,
            vec![
                Box::new(StrictPhraseTier::from_config(config)),
                Box::new(LooseTermsTier::from_config(config)),
            ],
        )
    }

    pub fn with_tiers(backend: Arc<dyn SearchBackend>, tiers: Vec<Box<dyn SearchTier>>) -> Self {
        Self { backend, tiers }
    }

    /// Runs the tiers in order; the first non-empty result wins.
    pub async fn find_threads(&self, route: &RouteQuery) -> Vec<Candidate> {
        for tier in &self.tiers {
            let found = tier.attempt(self.backend.as_ref(), route).await;
            if !found.is_empty() {
                return found;
            }
        }
        info!(
            origin = %route.origin,
            destination = %route.destination,
            "no tier produced candidates"
        );
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers by sort order and records every request.
    struct ScriptedBackend {
        top: Result<Vec<Candidate>, String>,
        relevance: Result<Vec<Candidate>, String>,
        calls: Mutex<Vec<SearchRequest>>,
    }

    impl ScriptedBackend {
        fn new(top: Vec<Candidate>, relevance: Vec<Candidate>) -> Self {
            Self {
                top: Ok(top),
                relevance: Ok(relevance),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<SearchRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchBackend for ScriptedBackend {
        async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>> {
            self.calls.lock().unwrap().push(request.clone());
            let answer = if request.sort == "top" {
                &self.top
            } else {
                &self.relevance
            };
            answer.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn hit(url: &str, comments: u64) -> Candidate {
        Candidate {
            url: url.to_string(),
            comment_count: comments,
            title: None,
        }
    }

    fn route() -> RouteQuery {
        RouteQuery::new("Bacoor", "MOA")
    }

    #[tokio::test]
    async fn strict_hit_short_circuits() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![hit("https://r/strict", 5)],
            vec![hit("https://r/loose", 9)],
        ));
        let finder = ThreadFinder::new(backend.clone(), &SearchConfig::default());

        let found = finder.find_threads(&route()).await;

        assert_eq!(found, vec![hit("https://r/strict", 5)]);
        let calls = backend.calls();
        assert_eq!(calls.len(), 1, "loose tier must not run");
        assert_eq!(
            calls[0].query,
            "subreddit:HowToGetTherePH title:\"Bacoor to MOA\""
        );
        assert_eq!(calls[0].limit, 3);
    }

    #[tokio::test]
    async fn strict_hits_without_comments_fall_through() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![hit("https://r/a", 0), hit("https://r/b", 0)],
            vec![hit("https://r/loose", 4)],
        ));
        let finder = ThreadFinder::new(backend.clone(), &SearchConfig::default());

        let found = finder.find_threads(&route()).await;

        assert_eq!(found, vec![hit("https://r/loose", 4)]);
        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].query, "subreddit:HowToGetTherePH \"Bacoor\" \"MOA\"");
        assert_eq!(calls[1].sort, "relevance");
        assert_eq!(calls[1].limit, 5);
    }

    #[tokio::test]
    async fn loose_tier_caps_and_applies_threshold() {
        let loose = vec![
            hit("https://r/1", 2),
            hit("https://r/2", 1), // not more than the threshold
            hit("https://r/3", 7),
            hit("https://r/4", 3),
            hit("https://r/5", 12),
        ];
        let backend = Arc::new(ScriptedBackend::new(vec![], loose));
        let finder = ThreadFinder::new(backend, &SearchConfig::default());

        let found = finder.find_threads(&route()).await;

        let urls: Vec<_> = found.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://r/1", "https://r/3", "https://r/4"]);
    }

    #[tokio::test]
    async fn strict_failure_degrades_to_loose() {
        let backend = Arc::new(ScriptedBackend {
            top: Err("HTTP 429 Too Many Requests".to_string()),
            relevance: Ok(vec![hit("https://r/loose", 3)]),
            calls: Mutex::new(Vec::new()),
        });
        let finder = ThreadFinder::new(backend, &SearchConfig::default());

        let found = finder.find_threads(&route()).await;
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn all_tiers_empty_or_failing() {
        let backend = Arc::new(ScriptedBackend {
            top: Ok(vec![]),
            relevance: Err("connection reset".to_string()),
            calls: Mutex::new(Vec::new()),
        });
        let finder = ThreadFinder::new(backend.clone(), &SearchConfig::default());

        assert!(finder.find_threads(&route()).await.is_empty());
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn thresholds_follow_config() {
        let config = SearchConfig {
            loose_min_comments: 10,
            loose_max_results: 1,
            ..SearchConfig::default()
        };
        let backend = Arc::new(ScriptedBackend::new(
            vec![],
            vec![hit("https://r/a", 5), hit("https://r/b", 11), hit("https://r/c", 20)],
        ));
        let finder = ThreadFinder::new(backend, &config);

        let found = finder.find_threads(&route()).await;
        assert_eq!(found, vec![hit("https://r/b", 11)]);
    }

    #[test]
    fn strict_accept_drops_duplicates() {
        let tier = StrictPhraseTier::from_config(&SearchConfig::default());
        let accepted = tier.accept(vec![hit("https://r/a", 2), hit("https://r/a", 2)]);
        assert_eq!(accepted.len(), 1);
    }

    #[test]
    fn route_text_is_substituted_verbatim() {
        let tier = StrictPhraseTier::from_config(&SearchConfig::default());
        let req = tier.request(&RouteQuery::new("  cubao ", "UP Diliman"));
        assert_eq!(
            req.query,
            "subreddit:HowToGetTherePH title:\"  cubao  to UP Diliman\""
        );
    }

    #[test]
    fn listing_prefers_permalink() {
        let json = json!({
            "data": { "children": [
                { "data": {
                    "url": "https://example.com/map.png",
                    "permalink": "/r/HowToGetTherePH/comments/abc/bacoor_to_moa/",
                    "num_comments": 5,
                    "title": "Bacoor to MOA"
                } },
                { "data": { "url": "https://www.reddit.com/r/x/comments/def/", "title": "no count" } },
                { "data": { "title": "no link at all" } },
                { "kind": "t3" }
            ] }
        });

        let hits = parse_listing(&json, "https://www.reddit.com");

        assert_eq!(hits.len(), 2);
        assert_eq!(
            hits[0].url,
            "https://www.reddit.com/r/HowToGetTherePH/comments/abc/bacoor_to_moa/"
        );
        assert_eq!(hits[0].comment_count, 5);
        assert_eq!(hits[0].title.as_deref(), Some("Bacoor to MOA"));
        assert_eq!(hits[1].url, "https://www.reddit.com/r/x/comments/def/");
        assert_eq!(hits[1].comment_count, 0);
    }

    #[test]
    fn listing_without_children_is_empty() {
        assert!(parse_listing(&json!({ "error": 429 }), "https://www.reddit.com").is_empty());
        assert!(parse_listing(&json!({ "data": {} }), "https://www.reddit.com").is_empty());
    }
}
