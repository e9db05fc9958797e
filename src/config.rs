use anyhow::{bail, Context, Result};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Config {
    // HTTP
    pub port: u16,

    // Storage
    pub database_path: String,

    // i18n
    pub locales_dir: String,

    // Auth: bearer token -> caller identity
    pub api_keys: HashMap<String, String>,

    // Retention sweep
    pub retention_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),

            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "translation-hub.db".to_string()),

            locales_dir: std::env::var("LOCALES_DIR").unwrap_or_else(|_| "locales".to_string()),

            api_keys: parse_api_keys(&std::env::var("API_KEYS").context("API_KEYS not set")?)?,

            retention_days: std::env::var("RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7),
        })
    }
}

/// Parse the `token:identity` pairs from the API_KEYS variable
/// (comma-separated, e.g. `s3cret:alice,t0ken:bob`).
pub fn parse_api_keys(raw: &str) -> Result<HashMap<String, String>> {
    let mut keys = HashMap::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((token, identity)) = pair.split_once(':') else {
            bail!("Invalid API_KEYS entry '{}': expected token:identity", pair);
        };
        if token.is_empty() || identity.is_empty() {
            bail!("Invalid API_KEYS entry '{}': empty token or identity", pair);
        }
        keys.insert(token.to_string(), identity.to_string());
    }
    if keys.is_empty() {
        bail!("API_KEYS contained no token:identity pairs");
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_keys() {
        let keys = parse_api_keys("s3cret:alice, t0ken:bob").expect("parse");
        assert_eq!(keys.get("s3cret").map(String::as_str), Some("alice"));
        assert_eq!(keys.get("t0ken").map(String::as_str), Some("bob"));
    }

    #[test]
    fn test_parse_api_keys_rejects_malformed() {
        assert!(parse_api_keys("justatoken").is_err());
        assert!(parse_api_keys(":alice").is_err());
        assert!(parse_api_keys("token:").is_err());
        assert!(parse_api_keys("").is_err());
    }

    #[test]
    fn test_parse_api_keys_skips_empty_entries() {
        let keys = parse_api_keys("a:alice,,b:bob,").expect("parse");
        assert_eq!(keys.len(), 2);
    }
}
