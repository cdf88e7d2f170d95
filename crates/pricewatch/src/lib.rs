//! Pricewatch: resilient price extraction from JavaScript-rendered pages
//!
//! Drives a single-page comparison site through one lookup (navigate, clear
//! consent overlays, type a value into a reactive form, submit, wait for
//! results) and reads brand/price pairs from the rendered result list.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    PRICEWATCH Architecture                      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ RunConfig  │    │  Engine    │    │ Browsing   │            │
//! │   │ (YAML)     │───►│  (stages)  │───►│ Driver     │            │
//! │   │            │    │            │    │ (CDP/mock) │            │
//! │   └────────────┘    └─────┬──────┘    └────────────┘            │
//! │                           │ ExtractionBatch                     │
//! │                           ▼                                     │
//! │                     ┌────────────┐                              │
//! │                     │ StorageSink│                              │
//! │                     │ (CSV)      │                              │
//! │                     └────────────┘                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod browser;
mod config;
mod diagnostics;
mod dismiss;
mod driver;
mod engine;
mod extract;
mod inject;
mod locator;
/// In-memory driver for tests and offline runs
pub mod mock;
mod readiness;
mod result;
mod sink;
mod submit;
/// Bounded polling primitives
pub mod wait;

pub use browser::{BrowserSettings, DEFAULT_USER_AGENT};
#[cfg(feature = "browser")]
pub use browser::{ChromiumDriver, ChromiumSessionFactory};
pub use config::{
    InjectionConfig, RunConfig, SelectorConfig, Timeouts, DEFAULT_DIAGNOSTICS_DIR,
    DEFAULT_FIELD_VALUE, DEFAULT_OUTPUT, DEFAULT_TARGET_URL,
};
pub use diagnostics::{DiagnosticCapture, SavedDiagnostic};
pub use dismiss::{DismissalOutcome, OverlayDismisser};
pub use driver::{
    ActivateOptions, BoundedDriver, BrowsingDriver, DiagnosticArtifact, DomEvent, ElementHandle,
    SessionFactory, DEFAULT_ACTION_TIMEOUT_MS,
};
pub use engine::{Engine, RunFailure, RunReport, RunStage};
pub use extract::{
    normalize_price, ExtractedRecord, ExtractionBatch, ExtractorConfig, ResultExtractor,
    HEARTBEAT_BRAND, UNKNOWN_BRAND,
};
pub use inject::{AttemptRecord, FieldValue, InjectionStrategy, StrategyChain};
pub use locator::{
    DomNode, ElementKind, ElementQuery, InteractionTarget, Locator, MatchMode, Matcher,
};
pub use readiness::ReadinessWait;
pub use result::{PriceWatchError, PriceWatchResult};
pub use sink::{format_row, CsvSink, MemorySink, StorageSink, CSV_HEADER};
pub use submit::SubmissionTrigger;
pub use wait::{LoadState, WaitOptions};
