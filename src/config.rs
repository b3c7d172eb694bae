use crate::error::AppError;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub collector_timeout_ms: u64,
    pub cache_ttl_seconds: u64,
    pub cache_max_entries: u64,
    pub brands_path: Option<String>,
    pub reputation: ReputationConfig,
    pub scan_engine: ScanEngineConfig,
    pub domain_age: DomainAgeConfig,
    pub ai_judgment: AiJudgmentConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub blocklist_paths: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanEngineConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DomainAgeConfig {
    pub enabled: bool,
    pub rdap_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiJudgmentConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            collector_timeout_ms: 4000,
            cache_ttl_seconds: 3600,
            cache_max_entries: 10_000,
            brands_path: None,
            reputation: ReputationConfig::default(),
            scan_engine: ScanEngineConfig::default(),
            domain_age: DomainAgeConfig::default(),
            ai_judgment: AiJudgmentConfig::default(),
        }
    }
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://safebrowsing.googleapis.com/v4/threatMatches:find".to_string(),
            api_key: None,
            blocklist_paths: Vec::new(),
        }
    }
}

impl Default for ScanEngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://www.virustotal.com/api/v3".to_string(),
            api_key: None,
        }
    }
}

impl Default for DomainAgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rdap_base_url: "https://rdap.org".to_string(),
        }
    }
}

impl Default for AiJudgmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

impl Config {
    /// Defaults, then `engine.toml` if present, then `THREAT_*` environment variables.
    pub fn load() -> Result<Self, AppError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name("engine").required(false))
            .add_source(
                ::config::Environment::with_prefix("THREAT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("reputation.blocklist_paths"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.collector_timeout_ms == 0 {
            return Err(invalid("collector_timeout_ms must be greater than zero"));
        }
        if self.cache_max_entries == 0 {
            return Err(invalid("cache_max_entries must be greater than zero"));
        }
        Ok(())
    }

    pub fn collector_timeout(&self) -> Duration {
        Duration::from_millis(self.collector_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Startup summary. API keys are reported as present or absent only.
    pub fn log_summary(&self) {
        info!(
            "Config: port={} collector_timeout_ms={} cache_ttl_seconds={} cache_max_entries={} brands_path={}",
            self.port,
            self.collector_timeout_ms,
            self.cache_ttl_seconds,
            self.cache_max_entries,
            self.brands_path.as_deref().unwrap_or("<builtin>")
        );
        info!(
            "Reputation: enabled={} endpoint={} api_key={} blocklists={}",
            self.reputation.enabled,
            self.reputation.endpoint,
            redact(&self.reputation.api_key),
            self.reputation.blocklist_paths.len()
        );
        info!(
            "Scan engine: enabled={} base_url={} api_key={}",
            self.scan_engine.enabled,
            self.scan_engine.base_url,
            redact(&self.scan_engine.api_key)
        );
        info!(
            "Domain age: enabled={} rdap_base_url={}",
            self.domain_age.enabled, self.domain_age.rdap_base_url
        );
        info!(
            "AI judgment: enabled={} endpoint={} model={} api_key={}",
            self.ai_judgment.enabled,
            self.ai_judgment.endpoint,
            self.ai_judgment.model,
            redact(&self.ai_judgment.api_key)
        );
    }
}

fn invalid(msg: &str) -> AppError {
    AppError::Config(::config::ConfigError::Message(msg.to_string()))
}

fn redact(secret: &Option<String>) -> &'static str {
    match secret {
        Some(s) if !s.is_empty() => "<set>",
        _ => "<unset>",
    }
}
