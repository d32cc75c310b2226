// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Request path rewriting
//!
//! A rewrite rule maps every request path starting with a prefix through a
//! template, e.g. prefix `lib/` with template
//! `https://cdn.example/{path}?v={version}`. `{path}` is the path rewritten so
//! far; any other `{name}` is looked up in the configured parameters. A
//! template may start with `kind!` to force the resource kind.
//!
//! All matching rules are applied in registration order. Matching is decided
//! on the path as requested, not on the output of earlier rules. Absolute URLs
//! (`http://`, `https://`, `//`) are never rewritten.

use crate::error::Result;
use crate::module_system::split_prefix;
use crate::resource::ResourceKind;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Placeholder referring to the path rewritten so far
pub const PATH_PLACEHOLDER: &str = "path";

/// A prefix-scoped rewrite template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    /// Paths starting with this prefix are rewritten
    pub prefix: String,
    /// Template with `{path}` and `{parameter}` placeholders
    pub template: String,
    /// Resource kind forced by the rule
    pub kind: Option<ResourceKind>,
}

impl RewriteRule {
    /// Parse a rule; the template may carry a `kind!` prefix
    pub fn new(prefix: impl Into<String>, template: &str) -> Result<Self> {
        let (kind, template) = match split_prefix(template) {
            // Only a bare alphabetic word names a kind; a `!` inside a URL does not
            (Some(kind), rest) if kind.chars().all(|c| c.is_ascii_alphabetic()) => {
                (Some(ResourceKind::from_prefix(Some(kind))?), rest)
            }
            _ => (None, template),
        };

        let prefix: String = prefix.into();
        Ok(Self {
            prefix: prefix.trim_start_matches('/').to_string(),
            template: template.to_string(),
            kind,
        })
    }

    /// Whether the rule applies to `path`
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }
}

/// Whether `path` is an absolute URL with a scheme or a protocol-relative one
pub fn is_remote(path: &str) -> bool {
    path.starts_with("//") || path.starts_with("http://") || path.starts_with("https://")
}

/// Ordered collection of rewrite rules
#[derive(Debug, Clone, Default)]
pub struct RewriteEngine {
    rules: Vec<RewriteRule>,
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([A-Za-z_][\w.-]*)\}").expect("placeholder pattern is valid"))
}

impl RewriteEngine {
    /// Create an engine without rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule
    pub fn push(&mut self, rule: RewriteRule) {
        self.rules.push(rule);
    }

    /// Registered rules, in order
    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    /// Kind forced by the last matching rule that names one
    pub fn kind_for(&self, path: &str) -> Option<ResourceKind> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(path))
            .filter_map(|rule| rule.kind.clone())
            .last()
    }

    /// Rewrite `path` through every rule matching `matched`
    ///
    /// `matched` is the path as mapped, before the extension was appended.
    pub fn rewrite(
        &self,
        matched: &str,
        path: &str,
        parameters: &HashMap<String, String>,
    ) -> String {
        if is_remote(path) {
            return path.to_string();
        }

        let current = self
            .rules
            .iter()
            .filter(|rule| rule.matches(matched))
            .fold(path.to_string(), |current, rule| {
                substitute(&rule.template, &current, parameters)
            });

        tidy_query(&current)
    }
}

fn substitute(template: &str, path: &str, parameters: &HashMap<String, String>) -> String {
    placeholder_pattern()
        .replace_all(template, |captures: &regex::Captures<'_>| {
            let name = &captures[1];
            if name == PATH_PLACEHOLDER {
                path.to_string()
            } else {
                parameters.get(name).cloned().unwrap_or_default()
            }
        })
        .into_owned()
}

/// Clean up query strings produced by chained templates
///
/// Every `?` after the first becomes `&`, runs of separators collapse, and a
/// dangling `?` or `&` is dropped.
pub fn tidy_query(path: &str) -> String {
    let Some(start) = path.find('?') else {
        return path.to_string();
    };

    let (base, query) = path.split_at(start);
    let pairs: Vec<&str> = query[1..]
        .split(['?', '&'])
        .filter(|pair| !pair.is_empty())
        .collect();

    if pairs.is_empty() {
        base.to_string()
    } else {
        format!("{}?{}", base, pairs.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_cdn_rewrite() {
        let mut engine = RewriteEngine::new();
        engine.push(RewriteRule::new("lib/", "https://cdn.example/{path}?v={version}").unwrap());

        let rewritten = engine.rewrite("lib/foo", "lib/foo.js", &params(&[("version", "3")]));
        assert_eq!(rewritten, "https://cdn.example/lib/foo.js?v=3");
        assert_eq!(engine.kind_for("lib/foo"), None);

        let untouched = engine.rewrite("app/main", "app/main.js", &params(&[("version", "3")]));
        assert_eq!(untouched, "app/main.js");
    }

    #[test]
    fn test_chained_rules() {
        let mut engine = RewriteEngine::new();
        engine.push(RewriteRule::new("lib/", "https://cdn.example/{path}?v={version}").unwrap());
        engine.push(RewriteRule::new("", "{path}?bust={bust}").unwrap());

        let rewritten = engine.rewrite(
            "lib/foo",
            "lib/foo.js",
            &params(&[("version", "3"), ("bust", "abc")]),
        );
        assert_eq!(rewritten, "https://cdn.example/lib/foo.js?v=3&bust=abc");
    }

    #[test]
    fn test_missing_parameter_and_empty_query() {
        let mut engine = RewriteEngine::new();
        engine.push(RewriteRule::new("", "{path}?{bust}").unwrap());

        assert_eq!(engine.rewrite("a", "a.js", &HashMap::new()), "a.js");
    }

    #[test]
    fn test_kind_override() {
        let rule = RewriteRule::new("themes/", "css!/static/{path}").unwrap();
        assert_eq!(rule.kind, Some(ResourceKind::STYLESHEET));
        assert_eq!(rule.template, "/static/{path}");

        assert!(RewriteRule::new("x/", "tpl!{path}").is_err());

        let mut engine = RewriteEngine::new();
        engine.push(rule);
        engine.push(RewriteRule::new("themes/print", "js!{path}").unwrap());
        assert_eq!(engine.kind_for("themes/dark"), Some(ResourceKind::STYLESHEET));
        assert_eq!(engine.kind_for("themes/print"), Some(ResourceKind::SCRIPT));
        assert_eq!(engine.kind_for("app/main"), None);
    }

    #[test]
    fn test_remote_paths_are_not_rewritten() {
        let mut engine = RewriteEngine::new();
        engine.push(RewriteRule::new("", "https://cdn.example/{path}").unwrap());

        for path in ["https://other.example/jq.js", "http://x.example/a.js", "//x.example/a.js"] {
            assert_eq!(engine.rewrite(path, path, &HashMap::new()), path);
        }
        assert_eq!(
            engine.rewrite("jq", "jq.js", &HashMap::new()),
            "https://cdn.example/jq.js"
        );
    }

    #[test]
    fn test_prefix_leading_slashes_are_stripped() {
        let rule = RewriteRule::new("//lib/", "{path}?v=1").unwrap();
        assert_eq!(rule.prefix, "lib/");
        assert!(rule.matches("lib/a"));
    }

    #[test]
    fn test_tidy_query() {
        assert_eq!(tidy_query("a.js??x=1&&y=2&"), "a.js?x=1&y=2");
        assert_eq!(tidy_query("a.js?"), "a.js");
        assert_eq!(tidy_query("a.js?x=1?y=2"), "a.js?x=1&y=2");
        assert_eq!(tidy_query("a.js"), "a.js");
    }
}
