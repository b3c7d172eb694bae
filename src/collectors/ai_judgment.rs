use super::{http_client, CollectTarget, Collector};
use crate::{
    config::AiJudgmentConfig,
    error::CollectorError,
    types::{SignalOpinion, SignalSource, SimilarityFinding, ThreatLevel},
};
use async_trait::async_trait;
use serde::Deserialize;

const SYSTEM_PROMPT: &str = "You are a security analyst judging whether a domain is used for phishing, \
scams or malware. Reply with a single JSON object and nothing else: \
{\"threatLevel\": \"safe\" | \"low\" | \"medium\" | \"high\", \"confidence\": number between 0 and 1, \
\"reasons\": [short strings]}.";

/// Natural-language judgment service speaking the chat-completions protocol.
pub struct AiJudgmentCollector {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JudgmentReply {
    threat_level: String,
    confidence: f64,
    #[serde(default)]
    reasons: Vec<String>,
}

impl AiJudgmentCollector {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: http_client("domain-threat-engine/ai-judgment"),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &AiJudgmentConfig) -> Option<Self> {
        config
            .api_key
            .as_ref()
            .map(|key| Self::new(config.endpoint.clone(), key.clone(), config.model.clone()))
    }
}

#[async_trait]
impl Collector for AiJudgmentCollector {
    fn source(&self) -> SignalSource {
        SignalSource::AiJudgment
    }

    async fn collect(&self, target: &CollectTarget) -> Result<SignalOpinion, CollectorError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(&target.domain.canonical, &target.findings)}
            ]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(target.budget)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollectorError::Status(response.status().as_u16()));
        }

        let chat: ChatResponse = serde_json::from_str(&response.text().await?)?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CollectorError::MalformedResponse("reply has no message content".to_string()))?;

        parse_judgment(&content)
    }
}

/// User prompt: the domain plus every similarity finding as context.
pub fn build_prompt(domain: &str, findings: &[SimilarityFinding]) -> String {
    let mut prompt = format!("Domain: {}\n", domain);
    if findings.is_empty() {
        prompt.push_str("Brand similarity analysis: no findings.\n");
    } else {
        prompt.push_str("Brand similarity analysis:\n");
        for f in findings {
            prompt.push_str(&format!(
                "- [{}] {} (brand: {}, score {:.2})\n",
                f.category.as_str(),
                f.reason,
                f.brand.as_deref().unwrap_or("-"),
                f.similarity
            ));
        }
    }
    prompt.push_str("Judge the threat level of this domain.");
    prompt
}

/// Parses the model's reply. Anything that is not the expected JSON object is malformed.
pub fn parse_judgment(content: &str) -> Result<SignalOpinion, CollectorError> {
    let json = strip_code_fence(content);
    let reply: JudgmentReply = serde_json::from_str(json)?;

    let level = ThreatLevel::parse_lenient(&reply.threat_level).ok_or_else(|| {
        CollectorError::MalformedResponse(format!("unknown threat level '{}'", reply.threat_level))
    })?;

    if !reply.confidence.is_finite() {
        return Err(CollectorError::MalformedResponse("confidence is not a number".to_string()));
    }

    Ok(SignalOpinion::new(SignalSource::AiJudgment, level, reply.confidence)
        .with_reasons(reply.reasons.into_iter().filter(|r| !r.trim().is_empty())))
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FindingCategory;

    #[test]
    fn parses_plain_json_reply() {
        let opinion = parse_judgment(
            r#"{"threatLevel": "high", "confidence": 0.92, "reasons": ["Impersonates PayPal", "Uses credential keywords"]}"#,
        )
        .unwrap();
        assert_eq!(opinion.source, SignalSource::AiJudgment);
        assert_eq!(opinion.level, ThreatLevel::High);
        assert_eq!(opinion.confidence, 0.92);
        assert_eq!(opinion.reasons.len(), 2);
    }

    #[test]
    fn tolerates_code_fences_and_aliases() {
        let opinion = parse_judgment("```json\n{\"threatLevel\": \"danger\", \"confidence\": 1.4, \"reasons\": []}\n```").unwrap();
        assert_eq!(opinion.level, ThreatLevel::High);
        assert_eq!(opinion.confidence, 1.0);
    }

    #[test]
    fn malformed_replies_are_errors() {
        for reply in [
            "I think this domain is probably fine.",
            r#"{"threatLevel": "catastrophic", "confidence": 0.5}"#,
            r#"{"threatLevel": "unknown", "confidence": 0.5}"#,
            r#"{"threatLevel": "benign", "confidence": 0.5}"#,
            r#"{"confidence": 0.5}"#,
            "",
        ] {
            assert!(
                matches!(parse_judgment(reply), Err(CollectorError::MalformedResponse(_))),
                "reply {reply:?}"
            );
        }
    }

    #[test]
    fn prompt_carries_findings() {
        let findings = vec![SimilarityFinding::new(
            FindingCategory::SuspiciousPattern,
            Some("paypal"),
            "paypal",
            1.0,
            "Contains 'paypal'",
        )];
        let prompt = build_prompt("paypa1-secure.com", &findings);
        assert!(prompt.contains("paypa1-secure.com"));
        assert!(prompt.contains("suspicious_pattern"));
        assert!(prompt.contains("brand: paypal"));

        assert!(build_prompt("example.com", &[]).contains("no findings"));
    }
}
