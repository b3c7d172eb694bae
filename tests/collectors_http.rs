//! Network collectors against in-process mock vendor servers.

use async_trait::async_trait;
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use domain_threat_engine::{
    cache::OpinionCache,
    collectors::{
        domain_age::HostResolver, AiJudgmentCollector, CollectTarget, Collector, DomainAgeCollector,
        ReputationCollector, ScanEngineCollector,
    },
    normalize,
    orchestrator::SignalOrchestrator,
    CollectorError, SignalSource, ThreatLevel,
};
use serde_json::{json, Value};
use std::{collections::HashMap, collections::HashSet, sync::Arc, time::Duration};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn target(input: &str) -> CollectTarget {
    CollectTarget {
        domain: normalize(input).unwrap(),
        findings: Vec::new(),
        budget: Duration::from_secs(5),
    }
}

// --- scan engine ---

async fn domain_report(Path(domain): Path<String>, headers: HeaderMap) -> impl IntoResponse {
    if headers.get("x-apikey").and_then(|v| v.to_str().ok()) != Some("vt-key") {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
    }
    match domain.as_str() {
        "evil.example" => (
            StatusCode::OK,
            Json(json!({"data": {"id": domain, "attributes": {"last_analysis_stats": {
                "harmless": 50, "malicious": 14, "suspicious": 2, "undetected": 24, "timeout": 0
            }}}})),
        ),
        "clean.example" => (
            StatusCode::OK,
            Json(json!({"data": {"id": domain, "attributes": {"last_analysis_stats": {
                "harmless": 70, "malicious": 0, "suspicious": 0, "undetected": 20, "timeout": 0
            }}}})),
        ),
        "broken.example" => (StatusCode::OK, Json(json!({"data": {"attributes": {}}}))),
        _ => (StatusCode::NOT_FOUND, Json(json!({"error": {"code": "NotFoundError"}}))),
    }
}

fn scan_engine_app() -> Router {
    Router::new().route("/domains/:domain", get(domain_report))
}

#[tokio::test]
async fn scan_engine_maps_detection_ratio() {
    let base = serve(scan_engine_app()).await;
    let collector = ScanEngineCollector::new(base, "vt-key");

    let evil = collector.collect(&target("evil.example")).await.unwrap();
    assert_eq!(evil.level, ThreatLevel::High);
    assert_eq!(evil.confidence, 1.0);
    assert!(evil.reasons[0].contains("16 of 90"));

    let clean = collector.collect(&target("https://clean.example/")).await.unwrap();
    assert_eq!(clean.level, ThreatLevel::Safe);
}

#[tokio::test]
async fn scan_engine_unknown_domain_abstains() {
    let base = serve(scan_engine_app()).await;
    let collector = ScanEngineCollector::new(base, "vt-key");

    let opinion = collector.collect(&target("never-seen.example")).await.unwrap();
    assert_eq!(opinion.level, ThreatLevel::Unknown);
    assert!(!opinion.failed);
}

#[tokio::test]
async fn scan_engine_errors_are_reported() {
    let base = serve(scan_engine_app()).await;

    let unauthorized = ScanEngineCollector::new(base.clone(), "wrong");
    assert!(matches!(
        unauthorized.collect(&target("evil.example")).await,
        Err(CollectorError::Status(401))
    ));

    let collector = ScanEngineCollector::new(base, "vt-key");
    assert!(matches!(
        collector.collect(&target("broken.example")).await,
        Err(CollectorError::MalformedResponse(_))
    ));
}

// --- reputation ---

async fn threat_matches(Query(params): Query<HashMap<String, String>>, Json(body): Json<Value>) -> impl IntoResponse {
    if params.get("key").map(String::as_str) != Some("sb-key") {
        return (StatusCode::FORBIDDEN, Json(json!({})));
    }
    let url = body["threatInfo"]["threatEntries"][0]["url"].as_str().unwrap_or_default();
    if url.contains("phish.example") {
        (
            StatusCode::OK,
            Json(json!({"matches": [{
                "threatType": "SOCIAL_ENGINEERING",
                "platformType": "ANY_PLATFORM",
                "threat": {"url": url}
            }]})),
        )
    } else {
        (StatusCode::OK, Json(json!({})))
    }
}

fn reputation_app() -> Router {
    Router::new().route("/threat-matches", post(threat_matches))
}

#[tokio::test]
async fn reputation_queries_safe_browsing() {
    let base = serve(reputation_app()).await;
    let collector = ReputationCollector::new(
        format!("{}/threat-matches", base),
        Some("sb-key".to_string()),
        HashSet::new(),
    );

    let phish = collector.collect(&target("login.phish.example")).await.unwrap();
    assert_eq!(phish.level, ThreatLevel::High);
    assert!(phish.reasons[0].contains("phishing"));

    let clean = collector.collect(&target("bakery.example")).await.unwrap();
    assert_eq!(clean.level, ThreatLevel::Safe);
    assert_eq!(clean.confidence, 0.8);
}

#[tokio::test]
async fn reputation_blocklist_short_circuits_the_network() {
    // Nothing listens on this endpoint; a network call would fail.
    let collector = ReputationCollector::new(
        "http://127.0.0.1:9/threat-matches",
        Some("sb-key".to_string()),
        ["malware.example".to_string()].into(),
    );

    let opinion = collector.collect(&target("cdn.malware.example")).await.unwrap();
    assert_eq!(opinion.level, ThreatLevel::High);
    assert_eq!(opinion.confidence, 1.0);
}

#[tokio::test]
async fn reputation_rejected_key_is_an_error() {
    let base = serve(reputation_app()).await;
    let collector = ReputationCollector::new(
        format!("{}/threat-matches", base),
        Some("stale-key".to_string()),
        HashSet::new(),
    );

    assert!(matches!(
        collector.collect(&target("bakery.example")).await,
        Err(CollectorError::Status(403))
    ));
}

// --- AI judgment ---

async fn chat_completions(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer sk-test") {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    let prompt = body["messages"][1]["content"].as_str().unwrap_or_default().to_string();
    let content = if prompt.contains("chatty.example") {
        "Sure! This domain looks fine to me.".to_string()
    } else if prompt.contains("suspicious_pattern") {
        "```json\n{\"threatLevel\": \"high\", \"confidence\": 0.9, \"reasons\": [\"Impersonates PayPal\"]}\n```".to_string()
    } else {
        "{\"threatLevel\": \"safe\", \"confidence\": 0.7, \"reasons\": []}".to_string()
    };
    (
        StatusCode::OK,
        Json(json!({"choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]})),
    )
}

fn ai_app() -> Router {
    Router::new().route("/chat", post(chat_completions))
}

#[tokio::test]
async fn ai_judgment_parses_structured_reply() {
    let base = serve(ai_app()).await;
    let collector = AiJudgmentCollector::new(format!("{}/chat", base), "sk-test", "test-model");

    let mut lookalike = target("paypa1.com");
    lookalike.findings = vec![domain_threat_engine::SimilarityFinding::new(
        domain_threat_engine::types::FindingCategory::SuspiciousPattern,
        Some("paypal"),
        "paypal",
        1.0,
        "Contains 'paypal'",
    )];

    let opinion = collector.collect(&lookalike).await.unwrap();
    assert_eq!(opinion.source, SignalSource::AiJudgment);
    assert_eq!(opinion.level, ThreatLevel::High);
    assert_eq!(opinion.reasons, vec!["Impersonates PayPal"]);

    let plain = collector.collect(&target("bakery.example")).await.unwrap();
    assert_eq!(plain.level, ThreatLevel::Safe);
}

#[tokio::test]
async fn ai_judgment_prose_reply_is_malformed() {
    let base = serve(ai_app()).await;
    let collector = AiJudgmentCollector::new(format!("{}/chat", base), "sk-test", "test-model");

    assert!(matches!(
        collector.collect(&target("chatty.example")).await,
        Err(CollectorError::MalformedResponse(_))
    ));
}

// --- domain age ---

struct FixedResolver(bool);

#[async_trait]
impl HostResolver for FixedResolver {
    async fn resolves(&self, _host: &str) -> Result<bool, CollectorError> {
        Ok(self.0)
    }
}

async fn rdap_domain(Path(name): Path<String>) -> impl IntoResponse {
    let registered = match name.as_str() {
        "fresh.example" => Utc::now() - ChronoDuration::days(5),
        "old.example" => Utc::now() - ChronoDuration::days(3000),
        _ => return (StatusCode::NOT_FOUND, Json(json!({"errorCode": 404}))),
    };
    (
        StatusCode::OK,
        Json(json!({
            "objectClassName": "domain",
            "ldhName": name,
            "events": [{"eventAction": "registration", "eventDate": registered.to_rfc3339()}]
        })),
    )
}

fn rdap_app() -> Router {
    Router::new().route("/domain/:name", get(rdap_domain))
}

#[tokio::test]
async fn domain_age_reads_rdap_registration() {
    let base = serve(rdap_app()).await;
    let collector = DomainAgeCollector::new(Arc::new(FixedResolver(true)), base);

    let fresh = collector.collect(&target("shop.fresh.example")).await.unwrap();
    assert_eq!(fresh.level, ThreatLevel::High);

    let old = collector.collect(&target("old.example")).await.unwrap();
    assert_eq!(old.level, ThreatLevel::Safe);
}

#[tokio::test]
async fn domain_age_without_registration_data() {
    let base = serve(rdap_app()).await;

    let resolving = DomainAgeCollector::new(Arc::new(FixedResolver(true)), base.clone());
    let opinion = resolving.collect(&target("unlisted.example")).await.unwrap();
    assert_eq!(opinion.level, ThreatLevel::Unknown);
    assert!(!opinion.failed);

    let dangling = DomainAgeCollector::new(Arc::new(FixedResolver(false)), base);
    let opinion = dangling.collect(&target("unlisted.example")).await.unwrap();
    assert_eq!(opinion.level, ThreatLevel::Medium);
}

// --- orchestration over a slow vendor ---

async fn slow_report() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(10)).await;
    StatusCode::OK
}

#[tokio::test]
async fn slow_vendor_becomes_a_failed_opinion() {
    let base = serve(Router::new().route("/domains/:domain", get(slow_report))).await;
    let orchestrator = SignalOrchestrator::new(
        vec![Arc::new(ScanEngineCollector::new(base, "vt-key"))],
        OpinionCache::new(Duration::from_secs(60), 100),
        Duration::from_millis(150),
    );

    let opinions = orchestrator
        .gather(&normalize("evil.example").unwrap(), &[])
        .await;

    assert_eq!(opinions.len(), 1);
    assert!(opinions[0].failed);
    assert_eq!(opinions[0].source, SignalSource::ScanEngine);
    assert!(orchestrator
        .cache()
        .get(SignalSource::ScanEngine, "evil.example")
        .await
        .is_none());
}
