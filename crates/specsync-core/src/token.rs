//! `{dotted.key}` token scanning and substitution
//!
//! Tokens are matched inside a single piece of text (one paragraph, one cell).
//! A token broken across formatting runs is still found because callers pass
//! the paragraph's concatenated text; see [`crate::ooxml::docx`] for what that
//! costs on write.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"\{([A-Za-z0-9_.\-]+)\}").unwrap();
}

/// Literal token text for a key, e.g. `product.name` -> `{product.name}`
pub fn token_for(key: &str) -> String {
    format!("{{{}}}", key)
}

/// All token keys in a piece of text
pub fn scan(text: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    scan_into(text, &mut found);
    found
}

/// Accumulating variant of [`scan`]
pub fn scan_into(text: &str, found: &mut BTreeSet<String>) {
    for caps in TOKEN.captures_iter(text) {
        found.insert(caps[1].to_string());
    }
}

/// True if the text holds at least one token
pub fn has_tokens(text: &str) -> bool {
    TOKEN.is_match(text)
}

/// Result of substituting tokens in one or more texts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    /// Keys replaced, with the text they were replaced by
    pub replaced: BTreeMap<String, String>,
    /// Keys left untouched because they did not resolve
    pub missing: BTreeSet<String>,
}

impl Substitution {
    pub fn merge(&mut self, other: Substitution) {
        self.replaced.extend(other.replaced);
        self.missing.extend(other.missing);
    }
}

/// Replace every token in `text` whose key resolves.
///
/// Unresolved tokens stay verbatim and are recorded as missing.
pub fn substitute<F>(text: &str, mut resolve: F) -> (String, Substitution)
where
    F: FnMut(&str) -> Option<String>,
{
    let mut outcome = Substitution::default();
    let replaced = TOKEN.replace_all(text, |caps: &Captures<'_>| {
        let key = &caps[1];
        match resolve(key) {
            Some(value) => {
                outcome.replaced.insert(key.to_string(), value.clone());
                value
            }
            None => {
                outcome.missing.insert(key.to_string());
                caps[0].to_string()
            }
        }
    });
    (replaced.into_owned(), outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scan_finds_dotted_tokens() {
        let found = scan("Name: {product.name}, Ver: {product.version}");
        let expected: BTreeSet<String> = ["product.name", "product.version"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_scan_rejects_invalid_shapes() {
        assert!(scan("{} {with space} {a/b} {{}}").is_empty());
        assert_eq!(scan("{a-b_c.9}").into_iter().collect::<Vec<_>>(), vec!["a-b_c.9"]);
        assert!(!has_tokens("plain text"));
        assert!(has_tokens("x {y} z"));
    }

    #[test]
    fn test_substitute_concrete_scenario() {
        let ssot = json!({"product": {"name": "Widget", "version": "2.1"}});
        let (text, outcome) = substitute("Name: {product.name}, Ver: {product.version}", |key| {
            crate::ssot::resolve_present(&ssot, key).map(crate::ssot::render)
        });
        assert_eq!(text, "Name: Widget, Ver: 2.1");
        assert_eq!(outcome.replaced["product.name"], "Widget");
        assert!(outcome.missing.is_empty());
    }

    #[test]
    fn test_substitute_leaves_missing_tokens() {
        let (text, outcome) = substitute("SKU {product.sku} / {a}", |key| {
            (key == "a").then(|| "A".to_string())
        });
        assert_eq!(text, "SKU {product.sku} / A");
        assert!(outcome.missing.contains("product.sku"));
        assert_eq!(outcome.replaced.len(), 1);
    }

    #[test]
    fn test_substitute_is_idempotent_for_resolved_values() {
        let resolve = |key: &str| Some(format!("<{}>", key));
        let (first, _) = substitute("{a} and {b}", resolve);
        let (second, _) = substitute("{a} and {b}", resolve);
        assert_eq!(first, second);
        assert!(scan(&first).is_empty());
    }
}
