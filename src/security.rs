use std::collections::HashMap;
use subtle::ConstantTimeEq;

/// Constant-time string comparison to prevent timing attacks
/// Use this for comparing API keys and other sensitive values
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Resolve a presented bearer token to a caller identity.
///
/// Every configured token is compared so the lookup cost does not depend on
/// which entry (if any) matches.
pub fn lookup_identity<'a>(api_keys: &'a HashMap<String, String>, token: &str) -> Option<&'a str> {
    let mut identity = None;
    for (candidate, caller) in api_keys {
        if constant_time_compare(candidate, token) {
            identity = Some(caller.as_str());
        }
    }
    identity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("secret123", "secret123"));
        assert!(!constant_time_compare("secret123", "secret124"));
        assert!(!constant_time_compare("secret123", "secret12"));
        assert!(!constant_time_compare("", "secret"));
    }

    #[test]
    fn test_lookup_identity() {
        let mut keys = HashMap::new();
        keys.insert("s3cret".to_string(), "alice".to_string());
        keys.insert("t0ken".to_string(), "bob".to_string());

        assert_eq!(lookup_identity(&keys, "s3cret"), Some("alice"));
        assert_eq!(lookup_identity(&keys, "t0ken"), Some("bob"));
        assert_eq!(lookup_identity(&keys, "wrong"), None);
        assert_eq!(lookup_identity(&keys, ""), None);
    }
}
