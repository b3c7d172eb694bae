use super::{http_client, CollectTarget, Collector};
use crate::{
    config::ScanEngineConfig,
    error::CollectorError,
    types::{SignalOpinion, SignalSource, ThreatLevel},
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

const HIGH_RATIO: f64 = 0.15;
const MEDIUM_RATIO: f64 = 0.05;

/// Multi-engine URL/domain scanner (VirusTotal v3 domain reports).
pub struct ScanEngineCollector {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct DomainReport {
    data: DomainData,
}

#[derive(Debug, Deserialize)]
struct DomainData {
    attributes: DomainAttributes,
}

#[derive(Debug, Deserialize)]
struct DomainAttributes {
    last_analysis_stats: AnalysisStats,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct AnalysisStats {
    #[serde(default)]
    pub harmless: u32,
    #[serde(default)]
    pub malicious: u32,
    #[serde(default)]
    pub suspicious: u32,
    #[serde(default)]
    pub undetected: u32,
    #[serde(default)]
    pub timeout: u32,
}

impl AnalysisStats {
    pub fn total(&self) -> u32 {
        self.harmless + self.malicious + self.suspicious + self.undetected + self.timeout
    }

    pub fn detection_ratio(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => (self.malicious + self.suspicious) as f64 / total as f64,
        }
    }
}

impl ScanEngineCollector {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: http_client("domain-threat-engine/scan-engine"),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &ScanEngineConfig) -> Option<Self> {
        config
            .api_key
            .as_ref()
            .map(|key| Self::new(config.base_url.clone(), key.clone()))
    }
}

#[async_trait]
impl Collector for ScanEngineCollector {
    fn source(&self) -> SignalSource {
        SignalSource::ScanEngine
    }

    async fn collect(&self, target: &CollectTarget) -> Result<SignalOpinion, CollectorError> {
        let url = format!(
            "{}/domains/{}",
            self.base_url.trim_end_matches('/'),
            target.domain.ascii()
        );

        let response = self
            .client
            .get(&url)
            .header("x-apikey", &self.api_key)
            .timeout(target.budget)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Ok(SignalOpinion::new(self.source(), ThreatLevel::Unknown, 0.0)
                    .with_reason("Domain has not been analyzed by the scan engines"));
            }
            status if !status.is_success() => return Err(CollectorError::Status(status.as_u16())),
            _ => {}
        }

        let report: DomainReport = serde_json::from_str(&response.text().await?)?;
        Ok(opinion_from_stats(&report.data.attributes.last_analysis_stats))
    }
}

/// Maps engine verdict counts to an opinion.
pub fn opinion_from_stats(stats: &AnalysisStats) -> SignalOpinion {
    let source = SignalSource::ScanEngine;
    let details = serde_json::json!({
        "malicious": stats.malicious,
        "suspicious": stats.suspicious,
        "total": stats.total(),
    });

    if stats.total() == 0 {
        return SignalOpinion::new(source, ThreatLevel::Unknown, 0.0)
            .with_reason("No scan engine returned a result")
            .with_details(details);
    }

    let ratio = stats.detection_ratio();
    let level = if ratio >= HIGH_RATIO {
        ThreatLevel::High
    } else if ratio >= MEDIUM_RATIO {
        ThreatLevel::Medium
    } else if ratio > 0.0 {
        ThreatLevel::Low
    } else {
        ThreatLevel::Safe
    };
    let confidence = 0.5 + 0.5 * (ratio / HIGH_RATIO).min(1.0);

    let reason = if ratio > 0.0 {
        format!(
            "{} of {} scan engines flag this domain",
            stats.malicious + stats.suspicious,
            stats.total()
        )
    } else {
        format!("None of {} scan engines flag this domain", stats.total())
    };

    SignalOpinion::new(source, level, confidence)
        .with_reason(reason)
        .with_details(details)
}
