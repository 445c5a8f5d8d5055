//! Recovery of a structured itinerary from free-text oracle output.
//!
//! Models reliably produce a valid JSON array but unreliably wrap it in
//! prose, code fences, or trailing narration. [`normalize`] runs:
//!
//! 1. [`strip_fences`]: drop Markdown code-fence markers.
//! 2. [`skip_preamble`]: drop everything before the first `[`.
//! 3. [`parse_strict`]: parse the remainder as one JSON document.
//! 4. On failure, the first [`Recovery`] in [`RECOVERY_CHAIN`] that applies
//!    repairs the text and the strict parse runs once more. Its outcome is
//!    final.
//! 5. [`into_steps`]: map the document onto steps. This cannot fail; array
//!    elements that are not objects are dropped.
//!
//! | Strategy | Applies when | Repair |
//! |----------|--------------|--------|
//! | [`TrailingDataCut`] | a complete array is followed by extra text | cut at the byte offset where the array ends |
//! | [`LastBracketCut`] | any other failure, text contains `]` | cut after the last `]` |
//!
//! Everything here is pure, so normalizing the same text twice yields the
//! same steps.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::ItineraryStep;

const FENCE_MARKERS: &[&str] = &["```json", "```JSON", "```"];

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("{0}")]
    Syntax(#[from] serde_json::Error),

    #[error("trailing characters after the document at byte {offset}")]
    TrailingData { offset: usize },
}

/// Why a strict parse failed. The trailing-data case carries the byte
/// offset where the complete document ended.
#[derive(Debug)]
pub enum ParseFailure {
    TrailingData { offset: usize },
    Invalid(serde_json::Error),
}

impl From<ParseFailure> for NormalizeError {
    fn from(failure: ParseFailure) -> Self {
        match failure {
            ParseFailure::TrailingData { offset } => NormalizeError::TrailingData { offset },
            ParseFailure::Invalid(e) => NormalizeError::Syntax(e),
        }
    }
}

/// Normalize raw oracle output into itinerary steps.
pub fn normalize(raw: &str) -> Result<Vec<ItineraryStep>, NormalizeError> {
    let unfenced = strip_fences(raw);
    let text = skip_preamble(&unfenced);

    let failure = match parse_strict(text) {
        Ok(document) => return Ok(into_steps(document)),
        Err(failure) => failure,
    };

    for strategy in RECOVERY_CHAIN {
        if let Some(repaired) = strategy.repair(text, &failure) {
            debug!(
                strategy = strategy.name(),
                original_len = text.len(),
                repaired_len = repaired.len(),
                "recovering oracle output"
            );
            return parse_strict(repaired)
                .map(into_steps)
                .map_err(NormalizeError::from);
        }
    }

    Err(failure.into())
}

/// Trim the text and remove every code-fence marker.
pub fn strip_fences(raw: &str) -> String {
    FENCE_MARKERS
        .iter()
        .fold(raw.trim().to_string(), |text, marker| text.replace(marker, ""))
}

/// Drop any explanation the model put before the array.
pub fn skip_preamble(text: &str) -> &str {
    match text.find('[') {
        Some(start) => &text[start..],
        None => text,
    }
}

/// Parse `text` as exactly one JSON document, distinguishing a clean
/// document followed by junk from a document that is itself broken.
pub fn parse_strict(text: &str) -> Result<Value, ParseFailure> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();

    match stream.next() {
        Some(Ok(document)) => {
            let offset = stream.byte_offset();
            if text[offset..].trim().is_empty() {
                Ok(document)
            } else {
                Err(ParseFailure::TrailingData { offset })
            }
        }
        Some(Err(e)) => Err(ParseFailure::Invalid(e)),
        // Empty or whitespace-only input
        None => Err(ParseFailure::Invalid(
            serde_json::from_str::<Value>(text)
                .err()
                .unwrap_or_else(|| {
                    <serde_json::Error as serde::de::Error>::custom("empty response")
                }),
        )),
    }
}

/// Map a parsed document onto itinerary steps.
///
/// An array yields one step per object element; any other document is
/// treated as a one-element array.
pub fn into_steps(document: Value) -> Vec<ItineraryStep> {
    let elements = match document {
        Value::Array(elements) => elements,
        other => vec![other],
    };

    elements
        .into_iter()
        .enumerate()
        .filter_map(|(index, element)| match element {
            Value::Object(fields) => Some(ItineraryStep::from(fields)),
            other => {
                warn!(index, element = %other, "dropping non-object itinerary element");
                None
            }
        })
        .collect()
}

/// One text repair in the recovery chain.
pub trait Recovery: Sync {
    fn name(&self) -> &'static str;

    /// Returns the repaired text, or `None` when this strategy does not
    /// apply to `failure`.
    fn repair<'a>(&self, text: &'a str, failure: &ParseFailure) -> Option<&'a str>;
}

/// Cut a complete document away from trailing narration.
pub struct TrailingDataCut;

impl Recovery for TrailingDataCut {
    fn name(&self) -> &'static str {
        "trailing_data_cut"
    }

    fn repair<'a>(&self, text: &'a str, failure: &ParseFailure) -> Option<&'a str> {
        match failure {
            ParseFailure::TrailingData { offset } => text.get(..*offset),
            ParseFailure::Invalid(_) => None,
        }
    }
}

/// Cut everything after the last closing bracket.
pub struct LastBracketCut;

impl Recovery for LastBracketCut {
    fn name(&self) -> &'static str {
        "last_bracket_cut"
    }

    fn repair<'a>(&self, text: &'a str, _failure: &ParseFailure) -> Option<&'a str> {
        text.rfind(']').map(|end| &text[..=end])
    }
}

pub static RECOVERY_CHAIN: &[&dyn Recovery] = &[&TrailingDataCut, &LastBracketCut];
