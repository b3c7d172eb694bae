use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Safe,
    Low,
    Medium,
    High,
    Unknown,
}

impl ThreatLevel {
    /// Numeric score used by the aggregator. `Unknown` abstains.
    pub fn score(&self) -> Option<f64> {
        match self {
            ThreatLevel::Safe => Some(0.0),
            ThreatLevel::Low => Some(0.3),
            ThreatLevel::Medium => Some(0.6),
            ThreatLevel::High => Some(0.9),
            ThreatLevel::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Safe => "safe",
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Unknown => "unknown",
        }
    }

    /// Parse of a model judgment. `unknown` is not a judgment and yields `None`.
    pub fn parse_lenient(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "safe" => Some(ThreatLevel::Safe),
            "low" => Some(ThreatLevel::Low),
            "medium" | "suspicious" | "warning" => Some(ThreatLevel::Medium),
            "high" | "danger" | "dangerous" | "malicious" => Some(ThreatLevel::High),
            _ => None,
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Reputation,
    ScanEngine,
    DomainAge,
    AiJudgment,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Reputation => "reputation",
            SignalSource::ScanEngine => "scan_engine",
            SignalSource::DomainAge => "domain_age",
            SignalSource::AiJudgment => "ai_judgment",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One collector's judgment about a domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalOpinion {
    pub source: SignalSource,
    pub level: ThreatLevel,
    pub confidence: f64,
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub failed: bool,
}

impl SignalOpinion {
    pub fn new(source: SignalSource, level: ThreatLevel, confidence: f64) -> Self {
        Self {
            source,
            level,
            confidence: clamp_unit(confidence),
            reasons: Vec::new(),
            details: None,
            failed: false,
        }
    }

    /// Placeholder recorded when a collector errored or ran out of time.
    pub fn failed(source: SignalSource, reason: impl Into<String>) -> Self {
        Self {
            source,
            level: ThreatLevel::Unknown,
            confidence: 0.0,
            reasons: vec![reason.into()],
            details: None,
            failed: true,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }

    pub fn with_reasons<I, S>(mut self, reasons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reasons.extend(reasons.into_iter().map(Into::into));
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// True when this opinion takes part in scoring.
    pub fn contributes(&self) -> bool {
        !self.failed && self.level != ThreatLevel::Unknown
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    EditDistance,
    SuspiciousPattern,
    KeywordCombination,
    Homograph,
    ExcessiveHyphens,
    ContainsDigits,
    SecurityTerms,
}

impl FindingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCategory::EditDistance => "edit_distance",
            FindingCategory::SuspiciousPattern => "suspicious_pattern",
            FindingCategory::KeywordCombination => "keyword_combination",
            FindingCategory::Homograph => "homograph",
            FindingCategory::ExcessiveHyphens => "excessive_hyphens",
            FindingCategory::ContainsDigits => "contains_digits",
            FindingCategory::SecurityTerms => "security_terms",
        }
    }
}

/// Result of comparing a domain against the brand registry or a generic heuristic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityFinding {
    pub category: FindingCategory,
    /// Brand the finding points at; `None` for brand-independent indicators.
    pub brand: Option<String>,
    /// Legitimate domain, pattern or term that matched.
    pub matched: String,
    pub similarity: f64,
    pub reason: String,
}

impl SimilarityFinding {
    pub fn new(
        category: FindingCategory,
        brand: Option<&str>,
        matched: impl Into<String>,
        similarity: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            category,
            brand: brand.map(String::from),
            matched: matched.into(),
            similarity: clamp_unit(similarity),
            reason: reason.into(),
        }
    }
}

/// Final answer for one analysis request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub level: ThreatLevel,
    pub confidence: f64,
    pub score: f64,
    pub reasons: Vec<String>,
    pub opinions: Vec<SignalOpinion>,
    pub findings: Vec<SimilarityFinding>,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub input: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub analysis_id: Uuid,
    pub domain: String,
    pub verdict: Verdict,
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
