use super::{http_client, CollectTarget, Collector};
use crate::{
    config::ReputationConfig,
    error::CollectorError,
    types::{SignalOpinion, SignalSource, ThreatLevel},
};
use async_trait::async_trait;
use serde::Deserialize;
use std::{collections::HashSet, fs, path::Path};
use tracing::{debug, info, warn};

/// Malicious-domain reputation: local blocklists first, then Safe Browsing.
pub struct ReputationCollector {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    blocklist: HashSet<String>,
}

#[derive(Debug, Deserialize)]
struct ThreatMatchesResponse {
    #[serde(default)]
    matches: Vec<ThreatMatch>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatMatch {
    pub threat_type: String,
}

impl ReputationCollector {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, blocklist: HashSet<String>) -> Self {
        Self {
            client: http_client("domain-threat-engine/reputation"),
            endpoint: endpoint.into(),
            api_key,
            blocklist,
        }
    }

    pub fn from_config(config: &ReputationConfig) -> Self {
        let blocklist = load_blocklists(&config.blocklist_paths);
        Self::new(config.endpoint.clone(), config.api_key.clone(), blocklist)
    }

    async fn query_safe_browsing(
        &self,
        domain: &str,
        api_key: &str,
        target: &CollectTarget,
    ) -> Result<Vec<ThreatMatch>, CollectorError> {
        let payload = serde_json::json!({
            "client": {
                "clientId": "domain-threat-engine",
                "clientVersion": env!("CARGO_PKG_VERSION")
            },
            "threatInfo": {
                "threatTypes": ["MALWARE", "SOCIAL_ENGINEERING", "UNWANTED_SOFTWARE", "POTENTIALLY_HARMFUL_APPLICATION"],
                "platformTypes": ["ANY_PLATFORM"],
                "threatEntryTypes": ["URL"],
                "threatEntries": [
                    {"url": format!("http://{}/", domain)},
                    {"url": format!("https://{}/", domain)}
                ]
            }
        });

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .timeout(target.budget)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollectorError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let parsed: ThreatMatchesResponse = serde_json::from_str(&body)?;
        Ok(parsed.matches)
    }
}

#[async_trait]
impl Collector for ReputationCollector {
    fn source(&self) -> SignalSource {
        SignalSource::Reputation
    }

    async fn collect(&self, target: &CollectTarget) -> Result<SignalOpinion, CollectorError> {
        let domain = target.domain.ascii();

        if let Some(listed) = blocklist_match(&domain, &self.blocklist) {
            debug!("Blocklist hit for {} via {}", domain, listed);
            return Ok(SignalOpinion::new(self.source(), ThreatLevel::High, 1.0)
                .with_reason(format!("Listed on a malicious-domain blocklist ({})", listed))
                .with_details(serde_json::json!({ "blocklist_entry": listed })));
        }

        match &self.api_key {
            Some(key) => {
                let matches = self.query_safe_browsing(&domain, key, target).await?;
                Ok(opinion_from_matches(&matches))
            }
            None => Ok(SignalOpinion::new(self.source(), ThreatLevel::Safe, 0.4)
                .with_reason("Not present on local blocklists")),
        }
    }
}

/// Maps Safe Browsing threat matches to an opinion.
pub fn opinion_from_matches(matches: &[ThreatMatch]) -> SignalOpinion {
    let source = SignalSource::Reputation;
    if matches.is_empty() {
        return SignalOpinion::new(source, ThreatLevel::Safe, 0.8)
            .with_reason("No reputation database lists this domain");
    }

    let (level, confidence) = matches
        .iter()
        .map(|m| classify_threat_type(&m.threat_type))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((ThreatLevel::Medium, 0.7));

    let mut seen = HashSet::new();
    let types: Vec<&str> = matches
        .iter()
        .map(|m| m.threat_type.as_str())
        .filter(|t| seen.insert(*t))
        .collect();

    SignalOpinion::new(source, level, confidence)
        .with_reasons(types.iter().map(|t| format!("Reputation database reports {}", describe_threat_type(t))))
        .with_details(serde_json::json!({ "threat_types": types }))
}

fn classify_threat_type(threat_type: &str) -> (ThreatLevel, f64) {
    match threat_type {
        "MALWARE" | "SOCIAL_ENGINEERING" => (ThreatLevel::High, 0.95),
        "UNWANTED_SOFTWARE" | "POTENTIALLY_HARMFUL_APPLICATION" => (ThreatLevel::Medium, 0.8),
        _ => (ThreatLevel::Medium, 0.7),
    }
}

fn describe_threat_type(threat_type: &str) -> &str {
    match threat_type {
        "MALWARE" => "malware distribution",
        "SOCIAL_ENGINEERING" => "phishing / social engineering",
        "UNWANTED_SOFTWARE" => "unwanted software",
        "POTENTIALLY_HARMFUL_APPLICATION" => "potentially harmful applications",
        other => other,
    }
}

/// Exact match, or a listed parent domain (`bad.example.com` when `example.com` is listed).
pub fn blocklist_match(domain: &str, set: &HashSet<String>) -> Option<String> {
    if set.contains(domain) {
        return Some(domain.to_string());
    }
    let parts: Vec<&str> = domain.split('.').collect();
    for i in 1..parts.len().saturating_sub(1) {
        let suffix = parts[i..].join(".");
        if set.contains(&suffix) {
            return Some(suffix);
        }
    }
    None
}

pub fn load_blocklists(paths: &[String]) -> HashSet<String> {
    let mut set = HashSet::new();
    for file in paths {
        if !Path::new(file).exists() {
            warn!("Blocklist {} not found, skipping", file);
            continue;
        }
        match fs::read_to_string(file) {
            Ok(content) => {
                let before = set.len();
                set.extend(content.lines().filter_map(|l| {
                    let t = l.trim();
                    if t.is_empty() || t.starts_with('#') {
                        None
                    } else {
                        Some(t.to_lowercase())
                    }
                }));
                info!("Loaded {} entries from blocklist {}", set.len() - before, file);
            }
            Err(e) => warn!("Failed to read blocklist {}: {}", file, e),
        }
    }
    set
}
