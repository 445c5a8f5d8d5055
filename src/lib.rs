//! # Commute Truth Engine
//!
//! Answers "how do I get from A to B by public transport" with an ordered,
//! fare-annotated itinerary synthesized from community threads and checked
//! against official reference documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Thread Finder│──▶│   Content    │──▶│   Evidence   │
//! │ strict/loose │   │  Extractor   │   │  Assembler   │◀── Knowledge Store
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              ▼
//!                    ┌──────────────┐   ┌──────────────┐
//!                    │  Response    │◀──│    Oracle    │
//!                    │  Normalizer  │   │ (LLM, opaque)│
//!                    └──────┬───────┘   └──────────────┘
//!                           ▼
//!                 {status, data, source}
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cte threads "Bacoor" "MOA"        # which threads would be used
//! cte route "Bacoor" "MOA"          # full pipeline, prints the envelope
//! cte serve                         # POST /analyze_route on 127.0.0.1:8000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and the status envelope |
//! | [`error`] | Pipeline error taxonomy |
//! | [`search`] | Tiered thread search |
//! | [`scrape`] | Thread fetching and text extraction |
//! | [`evidence`] | Bounded prompt context |
//! | [`knowledge`] | Reference documents loaded at startup |
//! | [`prompt`] | Instruction template |
//! | [`oracle`] | Text-generation providers |
//! | [`normalize`] | Itinerary recovery from model output |
//! | [`pipeline`] | Request orchestration |
//! | [`server`] | HTTP API |

pub mod config;
pub mod error;
pub mod evidence;
pub mod knowledge;
pub mod models;
pub mod normalize;
pub mod oracle;
pub mod pipeline;
pub mod prompt;
pub mod scrape;
pub mod search;
pub mod server;
