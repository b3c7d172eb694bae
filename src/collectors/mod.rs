//! Independent threat signal sources.
//!
//! Every collector turns one external capability into a [`SignalOpinion`].
//! Vendor request and response shapes stay inside the collector module; the
//! rest of the engine only ever sees opinions.

pub mod ai_judgment;
pub mod domain_age;
pub mod reputation;
pub mod scan_engine;

use crate::{
    error::CollectorError,
    normalizer::NormalizedDomain,
    types::{SignalOpinion, SignalSource, SimilarityFinding},
};
use async_trait::async_trait;
use std::time::Duration;

pub use ai_judgment::AiJudgmentCollector;
pub use domain_age::DomainAgeCollector;
pub use reputation::ReputationCollector;
pub use scan_engine::ScanEngineCollector;

/// What a collector is asked about.
#[derive(Debug, Clone)]
pub struct CollectTarget {
    pub domain: NormalizedDomain,
    /// Brand similarity results, passed along as context for judgment sources.
    pub findings: Vec<SimilarityFinding>,
    /// Time the orchestrator will wait for this collector.
    pub budget: Duration,
}

#[async_trait]
pub trait Collector: Send + Sync {
    fn source(&self) -> SignalSource;

    /// Produce an opinion about `target`. Errors become failed opinions.
    async fn collect(&self, target: &CollectTarget) -> Result<SignalOpinion, CollectorError>;
}

/// HTTP client shared by the network collectors.
pub(crate) fn http_client(user_agent: &str) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(user_agent)
        .build()
        .unwrap_or_default()
}
