//! Evidence Assembler: bounded prompt context from scraped threads and
//! reference text.

use crate::config::EvidenceConfig;
use crate::models::{EvidenceBundle, RouteQuery};

/// Everything the prompt template needs, with both texts already bounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub query: RouteQuery,
    pub street_evidence: String,
    pub reference_text: String,
}

/// Concatenate the bundle under provenance headers and truncate both the
/// street evidence and the reference text to their budgets.
pub fn assemble(
    route: &RouteQuery,
    bundle: &EvidenceBundle,
    reference_text: &str,
    config: &EvidenceConfig,
) -> PromptContext {
    let mut street = String::new();
    for (i, item) in bundle.items.iter().enumerate() {
        street.push_str(&format!("\n--- THREAD {} ({}) ---\n", i + 1, item.source_url));
        street.push_str(&item.text);
    }

    PromptContext {
        query: route.clone(),
        street_evidence: truncate_chars(&street, config.street_budget).to_string(),
        reference_text: truncate_chars(reference_text, config.reference_budget).to_string(),
    }
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
