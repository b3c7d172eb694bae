use super::{http_client, CollectTarget, Collector};
use crate::{
    config::DomainAgeConfig,
    error::CollectorError,
    types::{SignalOpinion, SignalSource, ThreatLevel},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hickory_resolver::{
    config::{ResolverConfig, ResolverOpts},
    error::ResolveErrorKind,
    TokioAsyncResolver,
};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tracing::debug;

const NEW_DOMAIN_DAYS: i64 = 30;
const YOUNG_DOMAIN_DAYS: i64 = 180;
const ESTABLISHED_DOMAIN_DAYS: i64 = 365;

#[async_trait]
pub trait HostResolver: Send + Sync {
    /// `Ok(false)` only when DNS answers that the host has no A/AAAA record.
    /// Resolver failures are errors, not evidence about the host.
    async fn resolves(&self, host: &str) -> Result<bool, CollectorError>;
}

#[async_trait]
impl HostResolver for TokioAsyncResolver {
    async fn resolves(&self, host: &str) -> Result<bool, CollectorError> {
        match self.lookup_ip(host).await {
            Ok(lookup) => Ok(lookup.iter().next().is_some()),
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
                debug!("No address records for {}: {}", host, e);
                Ok(false)
            }
            Err(e) => Err(CollectorError::Dns(e.to_string())),
        }
    }
}

/// DNS presence plus registration age from RDAP.
pub struct DomainAgeCollector {
    resolver: Arc<dyn HostResolver>,
    client: reqwest::Client,
    rdap_base_url: String,
}

#[derive(Debug, Deserialize)]
struct RdapDomain {
    #[serde(default)]
    events: Vec<RdapEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapEvent {
    event_action: String,
    event_date: String,
}

impl DomainAgeCollector {
    pub fn new(resolver: Arc<dyn HostResolver>, rdap_base_url: impl Into<String>) -> Self {
        Self {
            resolver,
            client: http_client("domain-threat-engine/domain-age"),
            rdap_base_url: rdap_base_url.into(),
        }
    }

    pub fn from_config(config: &DomainAgeConfig) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(2);
        opts.attempts = 1;
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);
        Self::new(Arc::new(resolver), config.rdap_base_url.clone())
    }

    async fn registration_date(&self, domain: &str, budget: Duration) -> Option<DateTime<Utc>> {
        let url = format!(
            "{}/domain/{}",
            self.rdap_base_url.trim_end_matches('/'),
            registrable_domain(domain)
        );

        let response = match self
            .client
            .get(&url)
            .header("accept", "application/rdap+json, application/json")
            .timeout(budget)
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!("RDAP lookup for {} returned {}", domain, r.status());
                return None;
            }
            Err(e) => {
                debug!("RDAP lookup for {} failed: {}", domain, e);
                return None;
            }
        };

        let body = response.text().await.ok()?;
        parse_registration_date(&body)
    }
}

#[async_trait]
impl Collector for DomainAgeCollector {
    fn source(&self) -> SignalSource {
        SignalSource::DomainAge
    }

    async fn collect(&self, target: &CollectTarget) -> Result<SignalOpinion, CollectorError> {
        let domain = target.domain.ascii();

        let (resolves, registered) = tokio::join!(
            self.resolver.resolves(&domain),
            self.registration_date(&domain, target.budget)
        );

        Ok(assess(resolves?, registered, Utc::now()))
    }
}

/// Registration date from an RDAP domain object, if it carries one.
pub fn parse_registration_date(body: &str) -> Option<DateTime<Utc>> {
    let rdap: RdapDomain = serde_json::from_str(body).ok()?;
    rdap.events
        .iter()
        .find(|e| e.event_action.eq_ignore_ascii_case("registration"))
        .and_then(|e| DateTime::parse_from_rfc3339(&e.event_date).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// Registered name under the public suffix list, private section included,
/// so `site.github.io` is looked up as itself rather than as `github.io`.
pub fn registrable_domain(domain: &str) -> String {
    let domain = domain.trim_end_matches('.');
    psl::domain_str(domain).unwrap_or(domain).to_string()
}

/// Combines DNS presence and registration age into one opinion.
pub fn assess(resolves: bool, registered: Option<DateTime<Utc>>, now: DateTime<Utc>) -> SignalOpinion {
    let source = SignalSource::DomainAge;
    let mut reasons = Vec::new();

    let by_age = registered.map(|date| {
        let days = (now - date).num_days().max(0);
        let (level, confidence) = if days < NEW_DOMAIN_DAYS {
            (ThreatLevel::High, 0.85)
        } else if days < YOUNG_DOMAIN_DAYS {
            (ThreatLevel::Medium, 0.7)
        } else if days < ESTABLISHED_DOMAIN_DAYS {
            (ThreatLevel::Safe, 0.7)
        } else {
            (ThreatLevel::Safe, 0.8)
        };
        reasons.push(format!("Domain registered {} days ago", days));
        (level, confidence, days)
    });

    let (level, confidence) = match (resolves, by_age) {
        (true, Some((level, confidence, _))) => (level, confidence),
        (true, None) => {
            reasons.push("Registration date unavailable".to_string());
            (ThreatLevel::Unknown, 0.0)
        }
        (false, Some((ThreatLevel::High, confidence, _))) => (ThreatLevel::High, confidence),
        (false, _) => (ThreatLevel::Medium, 0.6),
    };

    if !resolves {
        reasons.push("Domain does not resolve in DNS".to_string());
    }

    SignalOpinion::new(source, level, confidence)
        .with_reasons(reasons)
        .with_details(serde_json::json!({
            "resolves": resolves,
            "registered": registered.map(|d| d.to_rfc3339()),
            "age_days": by_age.map(|(_, _, days)| days),
        }))
}
