//! Multi-signal domain threat scoring.
//!
//! A raw domain, URL or message is normalized, compared against a registry
//! of brand domains, and sent to a set of independent signal collectors in
//! parallel. The collected opinions and similarity findings are merged into
//! a single [`Verdict`].

pub mod aggregator;
pub mod brands;
pub mod cache;
pub mod collectors;
pub mod config;
pub mod engine;
pub mod error;
pub mod normalizer;
pub mod orchestrator;
pub mod routes;
pub mod similarity;
pub mod types;

pub use engine::ThreatEngine;
pub use error::{AppError, CollectorError};
pub use normalizer::{normalize, NormalizedDomain};
pub use types::{SignalOpinion, SignalSource, SimilarityFinding, ThreatLevel, Verdict};
