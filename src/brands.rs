use crate::{error::AppError, normalizer::fold};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// A brand commonly impersonated in phishing, with what is legitimately theirs
/// and what typically shows up in fakes.
#[derive(Debug, Clone, Deserialize)]
pub struct BrandEntry {
    pub name: String,
    pub legitimate_domains: Vec<String>,
    #[serde(default)]
    pub suspicious_patterns: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl BrandEntry {
    fn new(name: &str, legitimate: &[&str], patterns: &[&str], keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            legitimate_domains: legitimate.iter().map(|s| s.to_string()).collect(),
            suspicious_patterns: patterns.iter().map(|s| s.to_string()).collect(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Lowercases everything and stores patterns and keywords in folded form,
    /// the space they are compared in.
    fn prepared(mut self) -> Self {
        self.legitimate_domains = self
            .legitimate_domains
            .iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        self.suspicious_patterns = dedup_folded(&self.suspicious_patterns);
        self.keywords = dedup_folded(&self.keywords);
        self
    }

    /// True when `domain` is one of the brand's own domains or a subdomain of one.
    pub fn owns(&self, domain: &str) -> bool {
        self.legitimate_domains
            .iter()
            .any(|legit| domain == legit || domain.ends_with(&format!(".{}", legit)))
    }
}

fn dedup_folded(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let folded = fold(&value.trim().to_lowercase());
        if !folded.is_empty() && !out.contains(&folded) {
            out.push(folded);
        }
    }
    out
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    brands: Vec<BrandEntry>,
}

/// Read-only set of brands, built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct BrandRegistry {
    entries: Vec<BrandEntry>,
}

impl BrandRegistry {
    pub fn new(entries: Vec<BrandEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(BrandEntry::prepared).collect(),
        }
    }

    pub fn entries(&self) -> &[BrandEntry] {
        &self.entries
    }

    pub fn is_legitimate(&self, domain: &str) -> bool {
        self.entries.iter().any(|b| b.owns(domain))
    }

    /// Loads `{"brands": [...]}` from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let file: RegistryFile = serde_json::from_str(&content)?;
        info!(
            "Loaded {} brands from {}",
            file.brands.len(),
            path.as_ref().display()
        );
        Ok(Self::new(file.brands))
    }

    /// Registry from `path` when given and readable, built-in set otherwise.
    pub fn load(path: Option<&str>) -> Self {
        match path {
            Some(p) => Self::from_json_file(p).unwrap_or_else(|e| {
                warn!("Failed to load brand registry from {}: {}, using built-in brands", p, e);
                Self::builtin()
            }),
            None => Self::builtin(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            BrandEntry::new(
                "paypal",
                &["paypal.com", "paypal.me", "paypalobjects.com"],
                &["paypal", "paypa1", "pay-pal", "paypai", "paypall"],
                &["paypal", "payment", "wallet", "account", "login", "secure", "verify", "billing"],
            ),
            BrandEntry::new(
                "google",
                &["google.com", "gmail.com", "youtube.com", "googleapis.com", "goo.gl"],
                &["google", "g00gle", "gooogle", "googie", "gmail"],
                &["google", "gmail", "account", "login", "signin", "verify", "drive", "docs"],
            ),
            BrandEntry::new(
                "apple",
                &["apple.com", "icloud.com", "me.com"],
                &["apple", "icloud", "appleid", "itunes"],
                &["apple", "icloud", "appleid", "login", "verify", "support", "locked"],
            ),
            BrandEntry::new(
                "microsoft",
                &["microsoft.com", "live.com", "outlook.com", "office.com", "office365.com", "microsoftonline.com"],
                &["microsoft", "micros0ft", "rnicrosoft", "office365", "outlook"],
                &["microsoft", "office", "outlook", "login", "account", "verify", "password", "teams"],
            ),
            BrandEntry::new(
                "amazon",
                &["amazon.com", "amazon.co.uk", "amazon.de", "amazon.in", "amzn.to", "aws.amazon.com"],
                &["amazon", "amaz0n", "arnazon", "amazom"],
                &["amazon", "prime", "order", "account", "login", "verify", "payment", "delivery"],
            ),
            BrandEntry::new(
                "facebook",
                &["facebook.com", "fb.com", "messenger.com", "instagram.com", "whatsapp.com"],
                &["facebook", "faceb00k", "facebok", "instagram", "whatsapp"],
                &["facebook", "meta", "login", "account", "verify", "security", "support", "recover"],
            ),
            BrandEntry::new(
                "netflix",
                &["netflix.com"],
                &["netflix", "netfiix", "netf1ix"],
                &["netflix", "billing", "payment", "account", "login", "update", "subscription"],
            ),
            BrandEntry::new(
                "chase",
                &["chase.com", "jpmorganchase.com"],
                &["chase-bank", "chasebank", "chaseonline"],
                &["chase", "bank", "online", "login", "secure", "verify", "account", "alert"],
            ),
            BrandEntry::new(
                "binance",
                &["binance.com"],
                &["binance", "blnance", "binanse"],
                &["binance", "wallet", "crypto", "login", "verify", "airdrop", "withdraw"],
            ),
        ])
    }
}
