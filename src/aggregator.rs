use crate::types::{
    clamp_unit, FindingCategory, SignalOpinion, SignalSource, SimilarityFinding, ThreatLevel, Verdict,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

pub const HIGH_THRESHOLD: f64 = 0.8;
pub const MEDIUM_THRESHOLD: f64 = 0.5;
pub const LOW_THRESHOLD: f64 = 0.2;

/// Fixed weights of the scoring model.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    pub ai_judgment: f64,
    pub reputation: f64,
    pub scan_engine: f64,
    pub domain_age: f64,
    /// Scale of the similarity channel relative to external opinions.
    pub similarity_scale: f64,
    /// Ceiling for a score built from similarity findings alone.
    pub similarity_only_cap: f64,
    /// Factor on the similarity channel when every answering source says `safe`.
    pub unanimous_safe_damping: f64,
    /// Floors applied when reputation or scan engines report a hit.
    pub hard_intel_high_floor: f64,
    pub hard_intel_medium_floor: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            ai_judgment: 0.6,
            reputation: 0.15,
            scan_engine: 0.15,
            domain_age: 0.10,
            similarity_scale: 0.7,
            similarity_only_cap: 0.65,
            unanimous_safe_damping: 0.5,
            hard_intel_high_floor: HIGH_THRESHOLD,
            hard_intel_medium_floor: MEDIUM_THRESHOLD,
        }
    }
}

impl ScoringWeights {
    pub fn source_weight(&self, source: SignalSource) -> f64 {
        match source {
            SignalSource::AiJudgment => self.ai_judgment,
            SignalSource::Reputation => self.reputation,
            SignalSource::ScanEngine => self.scan_engine,
            SignalSource::DomainAge => self.domain_age,
        }
    }

    pub fn category_weight(&self, category: FindingCategory) -> f64 {
        match category {
            FindingCategory::Homograph => 1.0,
            FindingCategory::SuspiciousPattern => 0.9,
            FindingCategory::EditDistance => 0.8,
            FindingCategory::KeywordCombination => 0.4,
            FindingCategory::SecurityTerms => 0.2,
            FindingCategory::ExcessiveHyphens => 0.2,
            FindingCategory::ContainsDigits => 0.1,
        }
    }
}

/// Merges collector opinions and similarity findings into one verdict.
///
/// External opinions are averaged over the weight of the sources that actually
/// answered, so a failed or abstaining collector never drags the score down.
/// Similarity findings form a second channel that can only raise the score.
#[derive(Debug, Clone, Default)]
pub struct ScoreAggregator {
    weights: ScoringWeights,
}

impl ScoreAggregator {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn aggregate(&self, opinions: &[SignalOpinion], findings: &[SimilarityFinding]) -> Verdict {
        self.aggregate_at(opinions, findings, Utc::now())
    }

    /// Deterministic given its arguments.
    pub fn aggregate_at(
        &self,
        opinions: &[SignalOpinion],
        findings: &[SimilarityFinding],
        analyzed_at: DateTime<Utc>,
    ) -> Verdict {
        let contributing: Vec<&SignalOpinion> = opinions.iter().filter(|o| o.contributes()).collect();

        let external = self.external_score(&contributing);
        let similarity = self.similarity_channel(findings);

        let (score, level) = match external {
            None if findings.is_empty() => (0.0, ThreatLevel::Unknown),
            None => {
                let score = similarity.min(self.weights.similarity_only_cap);
                (score, classify(score))
            }
            Some(external) => {
                let similarity = if contributing.iter().all(|o| o.level == ThreatLevel::Safe) {
                    similarity * self.weights.unanimous_safe_damping
                } else {
                    similarity
                };
                let combined = 1.0 - (1.0 - external) * (1.0 - similarity);
                let score = clamp_unit(combined.max(self.hard_intel_floor(&contributing)));
                (score, classify(score))
            }
        };

        Verdict {
            level,
            confidence: confidence(&contributing, findings),
            score,
            reasons: collect_reasons(&contributing, findings),
            opinions: opinions.to_vec(),
            findings: findings.to_vec(),
            analyzed_at,
        }
    }

    /// Weighted mean over sources that answered; `None` when none did.
    fn external_score(&self, contributing: &[&SignalOpinion]) -> Option<f64> {
        let mut weighted = 0.0;
        let mut available = 0.0;
        for opinion in contributing {
            if let Some(level_score) = opinion.level.score() {
                let weight = self.weights.source_weight(opinion.source);
                weighted += weight * level_score;
                available += weight;
            }
        }

        if available > 0.0 {
            Some(weighted / available)
        } else {
            None
        }
    }

    fn similarity_channel(&self, findings: &[SimilarityFinding]) -> f64 {
        let sum: f64 = findings
            .iter()
            .map(|f| f.similarity * self.weights.category_weight(f.category))
            .sum();
        sum.min(1.0) * self.weights.similarity_scale
    }

    fn hard_intel_floor(&self, contributing: &[&SignalOpinion]) -> f64 {
        contributing
            .iter()
            .filter(|o| matches!(o.source, SignalSource::Reputation | SignalSource::ScanEngine))
            .map(|o| match o.level {
                ThreatLevel::High => self.weights.hard_intel_high_floor,
                ThreatLevel::Medium => self.weights.hard_intel_medium_floor,
                _ => 0.0,
            })
            .fold(0.0, f64::max)
    }
}

pub fn classify(score: f64) -> ThreatLevel {
    if score >= HIGH_THRESHOLD {
        ThreatLevel::High
    } else if score >= MEDIUM_THRESHOLD {
        ThreatLevel::Medium
    } else if score > LOW_THRESHOLD {
        ThreatLevel::Low
    } else {
        ThreatLevel::Safe
    }
}

fn confidence(contributing: &[&SignalOpinion], findings: &[SimilarityFinding]) -> f64 {
    if !contributing.is_empty() {
        return contributing.iter().map(|o| o.confidence).fold(0.0, f64::max);
    }
    // Findings alone are weaker evidence than any collector.
    0.5 * findings.iter().map(|f| f.similarity).fold(0.0, f64::max)
}

fn collect_reasons(contributing: &[&SignalOpinion], findings: &[SimilarityFinding]) -> Vec<String> {
    let mut seen = HashSet::new();
    contributing
        .iter()
        .flat_map(|o| o.reasons.iter())
        .chain(findings.iter().map(|f| &f.reason))
        .filter(|r| seen.insert(r.as_str()))
        .cloned()
        .collect()
}
