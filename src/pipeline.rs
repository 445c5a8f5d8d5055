//! Request orchestration: route in, status envelope out.
//!
//! ```text
//! RouteQuery
//!   │
//!   ├─ ThreadFinder::find_threads      ── empty ─▶ NoCandidatesFound
//!   ├─ ContentExtractor (sequential)   ── no text ─▶ ContentUnavailable
//!   ├─ evidence::assemble + prompt::render
//!   ├─ Oracle::complete                ── error ─▶ OracleFailure
//!   └─ normalize::normalize            ── error ─▶ MalformedResponse
//!         │
//!         ▼
//!   Itinerary { steps, source }
//! ```

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, EvidenceConfig};
use crate::error::PipelineError;
use crate::evidence;
use crate::knowledge::KnowledgeStore;
use crate::models::{EvidenceBundle, Itinerary, RouteQuery, RouteResponse};
use crate::normalize::normalize;
use crate::oracle::{create_oracle, Oracle};
use crate::prompt;
use crate::scrape::{ContentExtractor, HttpFetcher, PageFetcher};
use crate::search::{RedditSearch, SearchBackend, ThreadFinder};

pub struct RouteAnalyzer {
    finder: ThreadFinder,
    extractor: ContentExtractor,
    oracle: Arc<dyn Oracle>,
    knowledge: Arc<KnowledgeStore>,
    evidence: EvidenceConfig,
}

impl RouteAnalyzer {
    pub fn new(
        config: &Config,
        search: Arc<dyn SearchBackend>,
        fetcher: Arc<dyn PageFetcher>,
        oracle: Arc<dyn Oracle>,
        knowledge: Arc<KnowledgeStore>,
    ) -> Self {
        Self {
            finder: ThreadFinder::new(search, &config.search),
            extractor: ContentExtractor::new(fetcher, config.scrape.clone()),
            oracle,
            knowledge,
            evidence: config.evidence.clone(),
        }
    }

    /// Production wiring: HTTP search and fetch, the configured oracle.
    pub fn from_config(config: &Config, knowledge: Arc<KnowledgeStore>) -> Result<Self> {
        Ok(Self::new(
            config,
            Arc::new(RedditSearch::new(&config.search)?),
            Arc::new(HttpFetcher::new(&config.scrape)?),
            create_oracle(&config.oracle)?,
            knowledge,
        ))
    }

    pub async fn analyze(&self, route: &RouteQuery) -> Result<Itinerary, PipelineError> {
        let candidates = self.finder.find_threads(route).await;
        if candidates.is_empty() {
            return Err(PipelineError::NoCandidatesFound);
        }

        let mut bundle = EvidenceBundle::default();
        for candidate in &candidates {
            let text = self.extractor.extract_content(&candidate.url).await;
            if text.trim().is_empty() {
                continue;
            }
            bundle.push(candidate.url.clone(), text);
        }
        let Some(source) = bundle.items.first().map(|item| item.source_url.clone()) else {
            return Err(PipelineError::ContentUnavailable);
        };
        info!(
            candidates = candidates.len(),
            scraped = bundle.len(),
            "evidence gathered"
        );

        let ctx = evidence::assemble(
            route,
            &bundle,
            self.knowledge.reference_text(),
            &self.evidence,
        );
        let prompt = prompt::render(&ctx);

        info!(
            oracle = self.oracle.name(),
            prompt_chars = prompt.chars().count(),
            "calling oracle"
        );
        let raw = self
            .oracle
            .complete(&prompt)
            .await
            .map_err(PipelineError::OracleFailure)?;
        info!(response_chars = raw.chars().count(), "oracle responded");

        let steps = normalize(&raw)?;
        Ok(Itinerary { steps, source })
    }

    /// [`analyze`](Self::analyze), folded into the status envelope.
    pub async fn respond(&self, route: &RouteQuery) -> RouteResponse {
        match self.analyze(route).await {
            Ok(itinerary) => itinerary.into(),
            Err(e) => {
                warn!(
                    origin = %route.origin,
                    destination = %route.destination,
                    "route analysis failed: {}",
                    e
                );
                RouteResponse::error(e.to_string())
            }
        }
    }
}
