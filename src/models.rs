//! Core data types that flow through the route pipeline.
//!
//! A [`RouteQuery`] enters, [`Candidate`]s come out of the Thread Finder,
//! an [`EvidenceBundle`] is built from the scraped threads, and the oracle's
//! reply is normalized into a list of [`ItineraryStep`]s wrapped in a
//! [`RouteResponse`] envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An origin/destination pair, substituted verbatim into search queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteQuery {
    pub origin: String,
    pub destination: String,
}

impl RouteQuery {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
        }
    }
}

/// A search hit believed to discuss the requested route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub url: String,
    pub comment_count: u64,
    pub title: Option<String>,
}

/// Text scraped from one thread, with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceItem {
    pub source_url: String,
    pub text: String,
}

/// Ordered scrape results, one entry per candidate that yielded text.
#[derive(Debug, Clone, Default)]
pub struct EvidenceBundle {
    pub items: Vec<EvidenceItem>,
}

impl EvidenceBundle {
    pub fn push(&mut self, source_url: impl Into<String>, text: impl Into<String>) {
        self.items.push(EvidenceItem {
            source_url: source_url.into(),
            text: text.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// One step of the synthesized itinerary.
///
/// Every field is optional: the model decides what it emits and the
/// normalizer only guarantees a structural parse. Building a step from a
/// JSON object never fails. Values of the wrong JSON type are coerced where
/// the intent is obvious (`"fare": "PHP 13"` is 13) and become `None`
/// otherwise. When both `official_check` and `officialCheck` are present the
/// snake_case key wins. Fields the model adds on its own are kept in `extra`
/// and serialized back unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct ItineraryStep {
    pub step: Option<i64>,
    pub mode: Option<String>,
    pub details: Option<String>,
    pub fare: Option<i64>,
    pub official_check: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for ItineraryStep {
    fn from(mut fields: Map<String, Value>) -> Self {
        let alias = fields.remove("officialCheck");
        let official_check = fields.remove("official_check").or(alias);
        Self {
            step: fields.remove("step").and_then(lenient_int),
            mode: fields.remove("mode").and_then(lenient_text),
            details: fields.remove("details").and_then(lenient_text),
            fare: fields.remove("fare").and_then(lenient_int),
            official_check: official_check.and_then(lenient_text),
            extra: fields,
        }
    }
}

fn lenient_int(value: Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        // First run of digits, keeping a sign right before it:
        // "PHP 13" -> 13, "₱15.00" -> 15, "-5" -> -5
        Value::String(s) => {
            let start = s.find(|c: char| c.is_ascii_digit())?;
            let digits: String = s[start..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            let magnitude: i64 = digits.parse().ok()?;
            if s[..start].ends_with('-') {
                Some(-magnitude)
            } else {
                Some(magnitude)
            }
        }
        _ => None,
    }
}

fn lenient_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// A successful pipeline run: the steps plus the thread they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Itinerary {
    pub steps: Vec<ItineraryStep>,
    pub source: String,
}

/// The status envelope returned to every caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RouteResponse {
    Success {
        data: Vec<ItineraryStep>,
        source: String,
    },
    Error {
        message: String,
    },
}

impl RouteResponse {
    pub fn error(message: impl Into<String>) -> Self {
        RouteResponse::Error {
            message: message.into(),
        }
    }
}

impl From<Itinerary> for RouteResponse {
    fn from(itinerary: Itinerary) -> Self {
        RouteResponse::Success {
            data: itinerary.steps,
            source: itinerary.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_accepts_missing_fields() {
        let step: ItineraryStep = serde_json::from_value(json!({ "step": 1 })).unwrap();
        assert_eq!(step.step, Some(1));
        assert_eq!(step.mode, None);
        assert_eq!(step.fare, None);
    }

    #[test]
    fn step_accepts_camel_case_official_check() {
        let step: ItineraryStep =
            serde_json::from_value(json!({ "officialCheck": "LTFRB matrix: PHP 13" })).unwrap();
        assert_eq!(step.official_check.as_deref(), Some("LTFRB matrix: PHP 13"));
    }

    #[test]
    fn step_coerces_loosely_typed_values() {
        let step: ItineraryStep = serde_json::from_value(json!({
            "step": "3",
            "fare": "PHP 13.50",
            "mode": 7,
        }))
        .unwrap();
        assert_eq!(step.step, Some(3));
        assert_eq!(step.fare, Some(13));
        assert_eq!(step.mode.as_deref(), Some("7"));

        let step: ItineraryStep =
            serde_json::from_value(json!({ "fare": "ask the driver" })).unwrap();
        assert_eq!(step.fare, None);
    }

    #[test]
    fn step_with_both_official_check_spellings() {
        let step: ItineraryStep = serde_json::from_value(json!({
            "step": 1,
            "official_check": "a",
            "officialCheck": "b",
        }))
        .unwrap();
        assert_eq!(step.official_check.as_deref(), Some("a"));
        assert!(step.extra.is_empty());
    }

    #[test]
    fn step_keeps_sign_of_numeric_strings() {
        let step: ItineraryStep =
            serde_json::from_value(json!({ "step": "-5", "fare": "PHP -13" })).unwrap();
        assert_eq!(step.step, Some(-5));
        assert_eq!(step.fare, Some(-13));

        let step: ItineraryStep =
            serde_json::from_value(json!({ "step": "step 2", "fare": "13-15" })).unwrap();
        assert_eq!(step.step, Some(2));
        assert_eq!(step.fare, Some(13));
    }

    #[test]
    fn step_keeps_unknown_fields() {
        let step: ItineraryStep =
            serde_json::from_value(json!({ "step": 2, "duration": "15 min" })).unwrap();
        let out = serde_json::to_value(&step).unwrap();
        assert_eq!(out["duration"], "15 min");
        assert_eq!(out["fare"], Value::Null);
    }

    #[test]
    fn envelope_serializes_with_status_tag() {
        let ok = RouteResponse::Success {
            data: vec![],
            source: "https://old.reddit.com/r/x".to_string(),
        };
        let v = serde_json::to_value(&ok).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["source"], "https://old.reddit.com/r/x");

        let err = serde_json::to_value(RouteResponse::error("No relevant threads found.")).unwrap();
        assert_eq!(
            err,
            json!({ "status": "error", "message": "No relevant threads found." })
        );
    }
}
