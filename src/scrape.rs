//! Thread Content Extractor: fetch a thread page and flatten it into
//! role-tagged text.
//!
//! Thread URLs are rewritten to the lightweight rendering host, whose
//! markup has stable class names:
//!
//! | Piece | Selector |
//! |-------|----------|
//! | Title | `a.title` |
//! | Original post | first `div.expando div.md` |
//! | Comment entry | `div.entry` inside `div.commentarea` |
//! | Comment body | `div.usertext-body div.md` inside the entry |
//! | Comment author | `p.tagline a.author` inside the entry |
//!
//! Output is one line group per piece, in page order:
//!
//! ```text
//! THREAD TITLE: Bacoor to MOA?
//! OP POST: What's the cheapest way on a weekday?
//! COMMENT: Take the jeep to Baclaran, then ...
//! ```
//!
//! [`ContentExtractor::extract_content`] never fails: a bad status, a
//! transport error, or markup with nothing usable all produce an empty
//! string.

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::config::ScrapeConfig;

/// Raw HTTP result of fetching one page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Page retrieval, separated from extraction so tests can serve fixtures.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &ScrapeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create scrape HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .with_context(|| format!("reading body of {} failed", url))?;
        Ok(FetchedPage { status, body })
    }
}

/// Rewrite a thread URL to the rendering host and drop query and fragment.
///
/// URLs that do not parse fall back to plain text surgery.
pub fn normalize_thread_url(raw: &str, config: &ScrapeConfig) -> String {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let is_primary = parsed
                .host_str()
                .map(|host| {
                    config
                        .primary_hosts
                        .iter()
                        .any(|p| p.eq_ignore_ascii_case(host))
                })
                .unwrap_or(false);
            if is_primary {
                // set_host only fails for hosts that cannot carry a name
                let _ = parsed.set_host(Some(config.render_host.as_str()));
            }
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => {
            let base = raw.split(['?', '#']).next().unwrap_or(raw);
            config
                .primary_hosts
                .iter()
                .find(|host| base.contains(host.as_str()))
                .map(|host| base.replacen(host.as_str(), &config.render_host, 1))
                .unwrap_or_else(|| base.to_string())
        }
    }
}

/// The substantive parts of one thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadContent {
    pub title: Option<String>,
    pub original_post: Option<String>,
    pub comments: Vec<String>,
}

impl ThreadContent {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.original_post.is_none() && self.comments.is_empty()
    }

    pub fn to_tagged_text(&self) -> String {
        let mut lines = Vec::new();
        if let Some(title) = &self.title {
            lines.push(format!("THREAD TITLE: {}", title));
        }
        if let Some(post) = &self.original_post {
            lines.push(format!("OP POST: {}", post));
        }
        for comment in &self.comments {
            lines.push(format!("COMMENT: {}", comment));
        }
        lines.join("\n")
    }
}

struct ThreadSelectors {
    title: Selector,
    post_body: Selector,
    comment_entry: Selector,
    body: Selector,
    author: Selector,
}

impl ThreadSelectors {
    fn new() -> Option<Self> {
        Some(Self {
            title: Selector::parse("a.title").ok()?,
            post_body: Selector::parse("div.expando div.md").ok()?,
            comment_entry: Selector::parse("div.commentarea div.entry").ok()?,
            body: Selector::parse("div.usertext-body div.md").ok()?,
            author: Selector::parse("p.tagline a.author").ok()?,
        })
    }
}

/// Parse a rendered thread page.
pub fn extract_thread(html: &str, config: &ScrapeConfig) -> ThreadContent {
    let Some(sel) = ThreadSelectors::new() else {
        return ThreadContent::default();
    };
    let document = Html::parse_document(html);

    let title = document
        .select(&sel.title)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty());

    let original_post = document
        .select(&sel.post_body)
        .next()
        .map(element_text)
        .filter(|t| !t.trim().is_empty());

    // Capped before the filters run, so a dropped comment still uses a slot.
    let comments = document
        .select(&sel.comment_entry)
        .take(config.max_comments)
        .filter_map(|entry| {
            let author = entry.select(&sel.author).next().map(element_text);
            if let Some(author) = &author {
                if config.bot_authors.iter().any(|bot| bot == author) {
                    return None;
                }
            }
            entry
                .select(&sel.body)
                .next()
                .map(element_text)
                .filter(|t| is_substantive(t, config))
        })
        .collect();

    ThreadContent {
        title,
        original_post,
        comments,
    }
}

/// Text nodes, trimmed, one per line.
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_substantive(text: &str, config: &ScrapeConfig) -> bool {
    let text = text.trim();
    !text.is_empty()
        && !config.deleted_markers.iter().any(|m| m.as_str() == text)
        && !config
            .boilerplate_markers
            .iter()
            .any(|m| text.contains(m.as_str()))
}

pub struct ContentExtractor {
    fetcher: Arc<dyn PageFetcher>,
    config: ScrapeConfig,
}

impl ContentExtractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: ScrapeConfig) -> Self {
        Self { fetcher, config }
    }

    /// Tagged text of the thread at `url`, or empty on any failure.
    pub async fn extract_content(&self, url: &str) -> String {
        let target = normalize_thread_url(url, &self.config);

        let page = match self.fetcher.fetch(&target).await {
            Ok(page) => page,
            Err(e) => {
                warn!(url = %target, "fetch failed: {:#}", e);
                return String::new();
            }
        };
        if !page.is_success() {
            warn!(url = %target, status = page.status, "fetch returned non-success status");
            return String::new();
        }

        let text = extract_thread(&page.body, &self.config).to_tagged_text();
        info!(url = %target, chars = text.chars().count(), "thread extracted");
        text
    }
}
