//! Canonicalization of user-supplied domains, URLs and messages.
//!
//! The canonical form is what the brand registry and every collector see.
//! The folded form maps look-alike characters onto Latin letters so that
//! `paypa1` and `pаypal` (Cyrillic `а`) both compare as `paypal`.

use crate::error::{validation_error, AppError};
use serde::Serialize;
use std::net::IpAddr;
use url::Host;

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Look-alike characters and the Latin letter they imitate.
const FOLDING_TABLE: &[(char, char)] = &[
    ('0', 'o'),
    ('1', 'l'),
    ('3', 'e'),
    ('4', 'a'),
    ('5', 's'),
    ('7', 't'),
    ('9', 'g'),
    ('а', 'a'),
    ('е', 'e'),
    ('о', 'o'),
    ('р', 'p'),
    ('с', 'c'),
    ('у', 'y'),
    ('х', 'x'),
    ('і', 'i'),
    ('ӏ', 'l'),
    ('ѕ', 's'),
    ('ј', 'j'),
    ('һ', 'h'),
    ('ԁ', 'd'),
    ('ɡ', 'g'),
];

#[derive(Debug, Clone, Serialize)]
pub struct NormalizedDomain {
    pub raw: String,
    pub canonical: String,
    pub folded: String,
}

// `raw` only records where the domain came from.
impl PartialEq for NormalizedDomain {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical && self.folded == other.folded
    }
}

impl Eq for NormalizedDomain {}

impl NormalizedDomain {
    /// Non-ASCII form suitable for DNS and HTTP lookups.
    pub fn ascii(&self) -> String {
        idna::domain_to_ascii(&self.canonical).unwrap_or_else(|_| self.canonical.clone())
    }
}

pub fn normalize(input: &str) -> Result<NormalizedDomain, AppError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(validation_error("Input cannot be empty"));
    }

    let candidate = if trimmed.chars().any(char::is_whitespace) {
        extract_host_token(trimmed)
            .ok_or_else(|| validation_error("No domain or URL found in message"))?
    } else {
        trim_punctuation(trimmed)
    };

    let canonical = canonicalize(candidate)?;
    let folded = fold(&canonical);

    Ok(NormalizedDomain {
        raw: input.to_string(),
        canonical,
        folded,
    })
}

/// Replaces every look-alike character with its Latin counterpart.
pub fn fold(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

pub fn fold_char(c: char) -> char {
    FOLDING_TABLE
        .iter()
        .find(|(from, _)| *from == c)
        .map(|(_, to)| *to)
        .unwrap_or(c)
}

/// True for the non-digit entries of the folding table.
pub fn is_homoglyph(c: char) -> bool {
    !c.is_ascii() && FOLDING_TABLE.iter().any(|(from, _)| *from == c)
}

fn canonicalize(candidate: &str) -> Result<String, AppError> {
    let host = match parsed_url_host(candidate) {
        Some(host) => host,
        None => match bare_ip(candidate) {
            Some(ip) => ip.to_string(),
            None => strip_url_parts(candidate).to_string(),
        },
    };

    let mut host = host.trim_end_matches('.').to_lowercase();

    if host.contains("xn--") {
        let (decoded, result) = idna::domain_to_unicode(&host);
        if result.is_ok() {
            host = decoded;
        }
    }

    if let Some(stripped) = host.strip_prefix("www.") {
        host = stripped.to_string();
    }

    validate_host(&host)?;
    Ok(host)
}

/// Host of a well-formed `scheme://` URL.
fn parsed_url_host(candidate: &str) -> Option<String> {
    if !candidate.contains("://") {
        return None;
    }
    let parsed = url::Url::parse(candidate).ok()?;
    match parsed.host()? {
        Host::Domain(domain) if domain.is_empty() => None,
        Host::Domain(domain) => Some(domain.to_string()),
        Host::Ipv4(addr) => Some(addr.to_string()),
        Host::Ipv6(addr) => Some(addr.to_string()),
    }
}

/// IP literal given without a scheme, IPv6 optionally bracketed.
fn bare_ip(candidate: &str) -> Option<IpAddr> {
    candidate
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .ok()
}

/// Scheme, path, userinfo and port removal for inputs `Url` rejects.
fn strip_url_parts(candidate: &str) -> &str {
    let mut host = candidate;

    if let Some(idx) = host.find("://") {
        host = &host[idx + 3..];
    }

    if let Some(end) = host.find(['/', '?', '#']) {
        host = &host[..end];
    }

    if let Some(at) = host.rfind('@') {
        host = &host[at + 1..];
    }

    if let Some(colon) = host.rfind(':') {
        let port = &host[colon + 1..];
        if port.chars().all(|c| c.is_ascii_digit()) {
            host = &host[..colon];
        }
    }

    host
}

fn validate_host(host: &str) -> Result<(), AppError> {
    if host.is_empty() {
        return Err(validation_error("No host component found"));
    }

    if host.len() > MAX_DOMAIN_LEN {
        return Err(validation_error("Domain too long"));
    }

    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return Err(AppError::InvalidInput(format!("'{}' is not a domain name", host)));
    }

    for label in &labels {
        if label.is_empty() {
            return Err(AppError::InvalidInput(format!("'{}' has an empty label", host)));
        }
        if !label.chars().all(|c| c.is_alphanumeric() || c == '-') {
            return Err(AppError::InvalidInput(format!(
                "'{}' contains characters not allowed in a host name",
                host
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(AppError::InvalidInput(format!(
                "'{}' has a label starting or ending with '-'",
                host
            )));
        }
    }

    // Label length is measured on the wire form.
    let ascii = idna::domain_to_ascii(host).unwrap_or_else(|_| host.to_string());
    if ascii.split('.').any(|label| label.len() > MAX_LABEL_LEN) {
        return Err(AppError::InvalidInput(format!("'{}' has a label longer than 63 bytes", host)));
    }

    Ok(())
}

fn extract_host_token(message: &str) -> Option<&str> {
    let tokens: Vec<&str> = message
        .split_whitespace()
        .map(trim_punctuation)
        .filter(|t| !t.is_empty())
        .collect();

    tokens
        .iter()
        .find(|t| t.contains("://"))
        .or_else(|| tokens.iter().find(|t| looks_like_host(t)))
        .copied()
}

fn looks_like_host(token: &str) -> bool {
    let host = token.split(['/', '?', '#']).next().unwrap_or(token);
    let mut labels = host.split('.');
    let first = labels.next().unwrap_or("");
    let rest: Vec<&str> = labels.collect();

    !first.is_empty()
        && !rest.is_empty()
        && rest.iter().all(|l| !l.is_empty())
        && rest
            .last()
            .map(|tld| tld.chars().all(char::is_alphabetic) && tld.chars().count() >= 2)
            .unwrap_or(false)
}

fn trim_punctuation(token: &str) -> &str {
    token
        .trim_start_matches(['"', '\'', '(', '[', '<', '{'])
        .trim_end_matches(['"', '\'', ')', ']', '>', '}', '.', ',', ';', ':', '!', '?'])
}
