//! TOML configuration parsing.
//!
//! Every tunable of the pipeline lives here: search tiers, scraping rules,
//! evidence budgets, the reference folder, the oracle provider, and the
//! server bind address. All sections are optional; a missing section takes
//! the defaults below. Secrets (API keys) are read from the environment,
//! never from this file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Thread Finder settings. The two tiers share the endpoint and namespace
/// but carry their own sort order, result limit and comment threshold.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    /// Origin used to absolutize relative permalinks.
    #[serde(default = "default_site_origin")]
    pub site_origin: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_strict_limit")]
    pub strict_limit: u32,
    #[serde(default = "default_strict_sort")]
    pub strict_sort: String,
    /// Strict results must have strictly more comments than this.
    #[serde(default)]
    pub strict_min_comments: u64,
    #[serde(default = "default_loose_limit")]
    pub loose_limit: u32,
    #[serde(default = "default_loose_sort")]
    pub loose_sort: String,
    /// Loose results must have strictly more comments than this.
    #[serde(default = "default_loose_min_comments")]
    pub loose_min_comments: u64,
    #[serde(default = "default_loose_max_results")]
    pub loose_max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            site_origin: default_site_origin(),
            namespace: default_namespace(),
            user_agent: default_user_agent(),
            timeout_secs: default_search_timeout(),
            strict_limit: default_strict_limit(),
            strict_sort: default_strict_sort(),
            strict_min_comments: 0,
            loose_limit: default_loose_limit(),
            loose_sort: default_loose_sort(),
            loose_min_comments: default_loose_min_comments(),
            loose_max_results: default_loose_max_results(),
        }
    }
}

fn default_search_endpoint() -> String {
    "https://www.reddit.com/search.json".to_string()
}
fn default_site_origin() -> String {
    "https://www.reddit.com".to_string()
}
fn default_namespace() -> String {
    "HowToGetTherePH".to_string()
}
fn default_user_agent() -> String {
    BROWSER_USER_AGENT.to_string()
}
fn default_search_timeout() -> u64 {
    15
}
fn default_strict_limit() -> u32 {
    3
}
fn default_strict_sort() -> String {
    "top".to_string()
}
fn default_loose_limit() -> u32 {
    5
}
fn default_loose_sort() -> String {
    "relevance".to_string()
}
fn default_loose_min_comments() -> u64 {
    1
}
fn default_loose_max_results() -> usize {
    3
}

/// Thread Content Extractor settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ScrapeConfig {
    /// Lightweight host that serves scrape-friendly markup.
    #[serde(default = "default_render_host")]
    pub render_host: String,
    /// Hosts that get rewritten to `render_host`.
    #[serde(default = "default_primary_hosts")]
    pub primary_hosts: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_comments")]
    pub max_comments: usize,
    #[serde(default = "default_bot_authors")]
    pub bot_authors: Vec<String>,
    #[serde(default = "default_deleted_markers")]
    pub deleted_markers: Vec<String>,
    #[serde(default = "default_boilerplate_markers")]
    pub boilerplate_markers: Vec<String>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            render_host: default_render_host(),
            primary_hosts: default_primary_hosts(),
            user_agent: default_user_agent(),
            timeout_secs: default_scrape_timeout(),
            max_comments: default_max_comments(),
            bot_authors: default_bot_authors(),
            deleted_markers: default_deleted_markers(),
            boilerplate_markers: default_boilerplate_markers(),
        }
    }
}

fn default_render_host() -> String {
    "old.reddit.com".to_string()
}
fn default_primary_hosts() -> Vec<String> {
    vec![
        "www.reddit.com".to_string(),
        "reddit.com".to_string(),
        "new.reddit.com".to_string(),
    ]
}
fn default_scrape_timeout() -> u64 {
    5
}
fn default_max_comments() -> usize {
    4
}
fn default_bot_authors() -> Vec<String> {
    vec!["AutoModerator".to_string()]
}
fn default_deleted_markers() -> Vec<String> {
    vec!["[deleted]".to_string(), "[removed]".to_string()]
}
fn default_boilerplate_markers() -> Vec<String> {
    vec!["Welcome to".to_string()]
}

/// Character budgets applied by the Evidence Assembler.
#[derive(Debug, Deserialize, Clone)]
pub struct EvidenceConfig {
    #[serde(default = "default_street_budget")]
    pub street_budget: usize,
    #[serde(default = "default_reference_budget")]
    pub reference_budget: usize,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            street_budget: default_street_budget(),
            reference_budget: default_reference_budget(),
        }
    }
}

fn default_street_budget() -> usize {
    5000
}
fn default_reference_budget() -> usize {
    3000
}

/// Reference folder scanned once at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    #[serde(default = "default_knowledge_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Pages kept per document.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            root: default_knowledge_root(),
            include_globs: default_include_globs(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_knowledge_root() -> PathBuf {
    PathBuf::from("./knowledge_base")
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
    ]
}
fn default_max_pages() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// watsonx project scope. `PROJECT_ID` in the environment wins.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            project_id: None,
            max_new_tokens: default_max_new_tokens(),
            temperature: 0.0,
            timeout_secs: default_oracle_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl OracleConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_new_tokens() -> u32 {
    900
}
fn default_oracle_timeout() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let search = &config.search;
    if search.strict_limit == 0 || search.loose_limit == 0 {
        anyhow::bail!("search.strict_limit and search.loose_limit must be >= 1");
    }
    if search.loose_max_results == 0 {
        anyhow::bail!("search.loose_max_results must be >= 1");
    }
    if search.namespace.trim().is_empty() {
        anyhow::bail!("search.namespace must not be empty");
    }

    if config.scrape.timeout_secs == 0 {
        anyhow::bail!("scrape.timeout_secs must be >= 1");
    }

    if config.evidence.street_budget == 0 || config.evidence.reference_budget == 0 {
        anyhow::bail!("evidence budgets must be >= 1");
    }

    let oracle = &config.oracle;
    match oracle.provider.as_str() {
        "disabled" | "openai" | "watsonx" => {}
        other => anyhow::bail!(
            "Unknown oracle provider: '{}'. Must be disabled, openai, or watsonx.",
            other
        ),
    }
    if oracle.is_enabled() && oracle.model.is_none() {
        anyhow::bail!(
            "oracle.model must be specified when provider is '{}'",
            oracle.provider
        );
    }
    if oracle.provider == "watsonx"
        && oracle.project_id.is_none()
        && std::env::var("PROJECT_ID").is_err()
    {
        anyhow::bail!("oracle.project_id (or PROJECT_ID) is required for watsonx");
    }

    Ok(())
}
