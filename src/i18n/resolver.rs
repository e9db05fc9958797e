//! Locale resolution.
//!
//! Resolution walks a locale fallback chain and probes each candidate
//! locale's message tree in order, short-circuiting on the first hit. A total
//! miss is not an error: the resolver reports it through an injected reporter
//! (fire-and-forget, failures swallowed) and returns the caller's default or
//! the key itself.

use crate::i18n::dictionary::Dictionary;
use crate::i18n::format::{format_message, Params};
use std::sync::Arc;
use tracing::debug;

/// The locale every chain ends on.
pub const DEFAULT_LOCALE: &str = "en";

/// One observed resolution miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissReport {
    pub namespace: String,
    pub key: String,
    pub locale: String,
    /// Where the miss was observed (request path or other origin marker).
    pub path: String,
}

/// Sink for resolution misses.
///
/// Implementations must not block the caller for long and must swallow their
/// own failures; `report` has no way to signal one and resolution proceeds
/// regardless.
pub trait MissReporter: Send + Sync {
    fn report(&self, report: MissReport);
}

/// Reporter that drops every miss. Useful for tooling and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl MissReporter for NoopReporter {
    fn report(&self, _report: MissReport) {}
}

/// Reporter backed by the missing-key store.
///
/// Writes happen on a blocking task off the resolution path when a runtime
/// is available; either way, storage errors are logged and dropped.
#[derive(Clone)]
pub struct DbMissReporter {
    db: crate::db::Database,
}

impl DbMissReporter {
    pub fn new(db: crate::db::Database) -> Self {
        Self { db }
    }
}

impl MissReporter for DbMissReporter {
    fn report(&self, report: MissReport) {
        let db = self.db.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn_blocking(move || {
                if let Err(e) = db.record_missing_key(&report) {
                    debug!("Dropping missing-key report: {}", e);
                }
            });
        } else if let Err(e) = db.record_missing_key(&report) {
            debug!("Dropping missing-key report: {}", e);
        }
    }
}

/// Build the fallback chain for a locale.
///
/// A locale with a region subtag falls back to its primary subtag and then
/// to the default locale ("uk-UA" gives `["uk-UA", "uk", "en"]`); one without
/// falls back straight to the default. Duplicates are removed preserving
/// order, so "en" gives just `["en"]`.
pub fn fallback_chain(locale: &str) -> Vec<String> {
    let mut chain = vec![locale.to_string()];
    if let Some((primary, _region)) = locale.split_once('-') {
        chain.push(primary.to_string());
    }
    chain.push(DEFAULT_LOCALE.to_string());

    let mut deduped: Vec<String> = Vec::with_capacity(chain.len());
    for candidate in chain {
        if !deduped.contains(&candidate) {
            deduped.push(candidate);
        }
    }
    deduped
}

/// Resolves dot-delimited message keys against a dictionary.
pub struct Resolver {
    dictionary: Dictionary,
    reporter: Arc<dyn MissReporter>,
}

impl Resolver {
    pub fn new(dictionary: Dictionary, reporter: Arc<dyn MissReporter>) -> Self {
        Self { dictionary, reporter }
    }

    /// Resolve `key` for `locale`.
    ///
    /// Probes each locale in the fallback chain in order and returns the
    /// first value found, formatted with `params` when given. On a total
    /// miss, reports through the configured reporter and returns `default`
    /// when supplied, else the key itself.
    pub fn resolve(
        &self,
        key: &str,
        locale: &str,
        params: Option<&Params>,
        default: Option<&str>,
        origin: &str,
    ) -> String {
        for candidate in fallback_chain(locale) {
            if let Some(raw) = self.dictionary.lookup(&candidate, key) {
                return match params {
                    Some(p) if !p.is_empty() => format_message(raw, p),
                    _ => raw.to_string(),
                };
            }
        }

        let (namespace, rest) = match key.split_once('.') {
            Some((ns, rest)) => (ns, rest),
            None => ("", key),
        };
        self.reporter.report(MissReport {
            namespace: namespace.to_string(),
            key: rest.to_string(),
            locale: locale.to_string(),
            path: origin.to_string(),
        });

        match default {
            Some(d) => d.to_string(),
            None => key.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Reporter that records every miss for assertions.
    #[derive(Default)]
    struct RecordingReporter {
        reports: Mutex<Vec<MissReport>>,
    }

    impl MissReporter for RecordingReporter {
        fn report(&self, report: MissReport) {
            self.reports.lock().unwrap().push(report);
        }
    }

    fn test_dictionary() -> Dictionary {
        let mut dictionary = Dictionary::new();
        dictionary.add_locale_json(
            "en",
            json!({ "common": { "greeting": "Hello", "files": "{count, number} files" } }),
        );
        dictionary.add_locale_json("uk", json!({ "common": { "greeting": "Привіт" } }));
        dictionary.add_locale_json("uk-UA", json!({ "common": { "formal": "Вітаємо" } }));
        dictionary
    }

    fn resolver_with(reporter: Arc<dyn MissReporter>) -> Resolver {
        Resolver::new(test_dictionary(), reporter)
    }

    // ==================== Fallback Chain Tests ====================

    #[test]
    fn test_chain_with_region_subtag() {
        assert_eq!(fallback_chain("uk-UA"), vec!["uk-UA", "uk", "en"]);
    }

    #[test]
    fn test_chain_without_region_subtag() {
        assert_eq!(fallback_chain("uk"), vec!["uk", "en"]);
    }

    #[test]
    fn test_chain_for_default_locale() {
        assert_eq!(fallback_chain("en"), vec!["en"]);
    }

    #[test]
    fn test_chain_for_default_with_region() {
        assert_eq!(fallback_chain("en-US"), vec!["en-US", "en"]);
    }

    // ==================== Resolution Tests ====================

    #[test]
    fn test_resolve_most_specific_locale_wins() {
        let resolver = resolver_with(Arc::new(NoopReporter));
        assert_eq!(resolver.resolve("common.formal", "uk-UA", None, None, "/"), "Вітаємо");
    }

    #[test]
    fn test_resolve_falls_back_to_primary_subtag() {
        let resolver = resolver_with(Arc::new(NoopReporter));
        // uk-UA has no greeting; the chain must probe uk's tree next.
        assert_eq!(resolver.resolve("common.greeting", "uk-UA", None, None, "/"), "Привіт");
    }

    #[test]
    fn test_resolve_falls_back_to_default_locale() {
        let resolver = resolver_with(Arc::new(NoopReporter));
        assert_eq!(resolver.resolve("common.files", "uk-UA", None, None, "/"), "{count, number} files");
    }

    #[test]
    fn test_resolve_formats_params() {
        let resolver = resolver_with(Arc::new(NoopReporter));
        let params = json!({ "count": 1200 }).as_object().expect("params").clone();
        assert_eq!(
            resolver.resolve("common.files", "en", Some(&params), None, "/"),
            "1,200 files"
        );
    }

    // ==================== Miss Handling Tests ====================

    #[test]
    fn test_miss_returns_default_when_given() {
        let resolver = resolver_with(Arc::new(NoopReporter));
        assert_eq!(
            resolver.resolve("common.absent", "en", None, Some("fallback text"), "/"),
            "fallback text"
        );
    }

    #[test]
    fn test_miss_returns_key_without_default() {
        let resolver = resolver_with(Arc::new(NoopReporter));
        assert_eq!(resolver.resolve("common.absent", "en", None, None, "/"), "common.absent");
    }

    #[test]
    fn test_miss_is_reported_with_namespace_split() {
        let reporter = Arc::new(RecordingReporter::default());
        let resolver = resolver_with(reporter.clone());

        resolver.resolve("common.nav.absent", "uk-UA", None, None, "/items/3");

        let reports = reporter.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].namespace, "common");
        assert_eq!(reports[0].key, "nav.absent");
        assert_eq!(reports[0].locale, "uk-UA");
        assert_eq!(reports[0].path, "/items/3");
    }

    #[test]
    fn test_hit_is_not_reported() {
        let reporter = Arc::new(RecordingReporter::default());
        let resolver = resolver_with(reporter.clone());

        resolver.resolve("common.greeting", "uk", None, None, "/");

        assert!(reporter.reports.lock().unwrap().is_empty());
    }

    #[test]
    fn test_key_without_namespace_reports_empty_namespace() {
        let reporter = Arc::new(RecordingReporter::default());
        let resolver = resolver_with(reporter.clone());

        resolver.resolve("standalone", "en", None, None, "/");

        let reports = reporter.reports.lock().unwrap();
        assert_eq!(reports[0].namespace, "");
        assert_eq!(reports[0].key, "standalone");
    }
}
