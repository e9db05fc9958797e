//! Internationalization (i18n) module.
//!
//! Everything needed to turn a dot-delimited message key plus a locale into
//! a display string lives here:
//!
//! - `dictionary`: typed per-locale message trees with deep merge and JSON loading
//! - `format`: ICU-style placeholder formatting and placeholder extraction
//! - `resolver`: fallback-chain resolution with miss reporting
//!
//! # Example
//!
//! ```rust,ignore
//! use translation_hub::i18n::{Dictionary, NoopReporter, Resolver};
//!
//! let mut dictionary = Dictionary::new();
//! dictionary.add_locale_json("en", serde_json::json!({"common": {"hi": "Hello"}}));
//!
//! let resolver = Resolver::new(dictionary, std::sync::Arc::new(NoopReporter));
//! assert_eq!(resolver.resolve("common.hi", "uk-UA", None, None, "/"), "Hello");
//! ```

mod dictionary;
mod format;
mod resolver;

pub use dictionary::{deep_merge, DictNode, Dictionary};
pub use format::{extract_placeholders, format_message, Params};
pub use resolver::{
    fallback_chain, DbMissReporter, MissReport, MissReporter, NoopReporter, Resolver,
    DEFAULT_LOCALE,
};
