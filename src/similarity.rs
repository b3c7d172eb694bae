use crate::{
    brands::{BrandEntry, BrandRegistry},
    normalizer::{is_homoglyph, NormalizedDomain},
    types::{FindingCategory, SimilarityFinding},
};
use std::sync::Arc;

const NEAR_MISS_THRESHOLD: f64 = 0.8;
const HOMOGRAPH_CONFIDENCE: f64 = 0.95;
const MAX_HYPHENS: usize = 2;
const SECURITY_TERMS: &[&str] = &["secure", "login", "verify", "account", "support"];

/// Compares domains against the brand registry and a few brand-independent
/// lexical indicators. Pure computation; never fails.
#[derive(Debug, Clone)]
pub struct SimilarityMatcher {
    registry: Arc<BrandRegistry>,
}

impl SimilarityMatcher {
    pub fn new(registry: Arc<BrandRegistry>) -> Self {
        Self { registry }
    }

    pub fn find_similarities(&self, domain: &NormalizedDomain) -> Vec<SimilarityFinding> {
        // A brand's own domain is the safe case, not a lookalike.
        if self.registry.is_legitimate(&domain.canonical) {
            return Vec::new();
        }

        let mut findings = Vec::new();

        for brand in self.registry.entries() {
            if let Some(finding) = edit_distance_finding(brand, &domain.canonical) {
                findings.push(finding);
            }
            if let Some(finding) = pattern_finding(brand, &domain.folded) {
                findings.push(finding);
            }
            if let Some(finding) = keyword_finding(brand, &domain.folded) {
                findings.push(finding);
            }
        }

        findings.extend(lexical_indicators(domain));
        findings
    }
}

/// `1 - levenshtein / longer length`, in [0, 1].
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - strsim::levenshtein(a, b) as f64 / longest as f64
}

fn edit_distance_finding(brand: &BrandEntry, canonical: &str) -> Option<SimilarityFinding> {
    let (legit, ratio) = brand
        .legitimate_domains
        .iter()
        .map(|legit| (legit, similarity_ratio(canonical, legit)))
        .filter(|(_, ratio)| *ratio > NEAR_MISS_THRESHOLD && *ratio < 1.0)
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    Some(SimilarityFinding::new(
        FindingCategory::EditDistance,
        Some(brand.name.as_str()),
        legit.as_str(),
        ratio,
        format!(
            "Domain closely resembles {} ({:.0}% similar)",
            legit,
            ratio * 100.0
        ),
    ))
}

fn pattern_finding(brand: &BrandEntry, folded: &str) -> Option<SimilarityFinding> {
    let pattern = brand
        .suspicious_patterns
        .iter()
        .filter(|p| folded.contains(p.as_str()))
        .max_by_key(|p| p.len())?;

    Some(SimilarityFinding::new(
        FindingCategory::SuspiciousPattern,
        Some(brand.name.as_str()),
        pattern.as_str(),
        1.0,
        format!(
            "Contains '{}', a pattern used to impersonate {}",
            pattern, brand.name
        ),
    ))
}

fn keyword_finding(brand: &BrandEntry, folded: &str) -> Option<SimilarityFinding> {
    let hits: Vec<&str> = brand
        .keywords
        .iter()
        .filter(|k| folded.contains(k.as_str()))
        .map(String::as_str)
        .collect();

    if hits.len() < 2 {
        return None;
    }

    let ratio = (0.5 + 0.1 * (hits.len() - 2) as f64).min(0.8);
    Some(SimilarityFinding::new(
        FindingCategory::KeywordCombination,
        Some(brand.name.as_str()),
        hits.join(","),
        ratio,
        format!(
            "Combines {} keywords associated with {} ({})",
            hits.len(),
            brand.name,
            hits.join(", ")
        ),
    ))
}

fn lexical_indicators(domain: &NormalizedDomain) -> Vec<SimilarityFinding> {
    let mut findings = Vec::new();

    let homoglyphs: String = domain.canonical.chars().filter(|c| is_homoglyph(*c)).collect();
    if !homoglyphs.is_empty() {
        findings.push(SimilarityFinding::new(
            FindingCategory::Homograph,
            None,
            homoglyphs.clone(),
            HOMOGRAPH_CONFIDENCE,
            format!(
                "Homograph attack: look-alike characters '{}' imitate Latin letters",
                homoglyphs
            ),
        ));
    }

    let hyphens = domain.canonical.matches('-').count();
    if hyphens > MAX_HYPHENS {
        findings.push(SimilarityFinding::new(
            FindingCategory::ExcessiveHyphens,
            None,
            "-",
            0.5,
            format!("Excessive hyphens in domain ({})", hyphens),
        ));
    }

    if domain.canonical.chars().any(|c| c.is_ascii_digit()) {
        findings.push(SimilarityFinding::new(
            FindingCategory::ContainsDigits,
            None,
            "digits",
            0.3,
            "Domain contains digits",
        ));
    }

    let terms: Vec<&str> = SECURITY_TERMS
        .iter()
        .copied()
        .filter(|t| domain.folded.contains(t))
        .collect();
    if !terms.is_empty() {
        findings.push(SimilarityFinding::new(
            FindingCategory::SecurityTerms,
            None,
            terms.join(","),
            0.5,
            format!("Contains security-related terms: {}", terms.join(", ")),
        ));
    }

    findings
}
