// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! CommonJS-style dependency sniffing
//!
//! A definition given as a lone function is treated as a CommonJS wrapper
//! `function (require, exports, module) { ... }`. Its dependencies are not
//! declared, so they are recovered from the factory's source text.
//!
//! This is a **heuristic**. It finds the name of the first parameter and then
//! looks for literal calls of that name with a single string argument.
//! Requires built from expressions, renamed through aliases, or hidden by
//! minification are not found. A source that does not match the expected
//! shape simply yields no implicit dependencies; it is never an error.

use regex::Regex;
use std::sync::OnceLock;

/// Finds implicit dependencies in a factory's source text
pub trait DependencyDetector: Send + Sync {
    /// Return the dependency ids referenced by `source`, in order of appearance
    fn detect(&self, source: &str) -> Vec<String>;
}

/// Default regex-based detector
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexDetector;

fn comment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").expect("comment pattern is valid")
    })
}

fn parameter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // `function name(req, ...)`, `(req, ...) =>` or `req =>`
        Regex::new(
            r"^\s*(?:async\s+)?(?:function\b[^(]*\(\s*([A-Za-z_$][\w$]*)|\(\s*([A-Za-z_$][\w$]*)|([A-Za-z_$][\w$]*)\s*=>)",
        )
        .expect("parameter pattern is valid")
    })
}

impl RegexDetector {
    /// Name of the resolver parameter, if the source has a recognisable shape
    pub fn resolver_name(source: &str) -> Option<String> {
        let captures = parameter_pattern().captures(source)?;
        (1..=3)
            .find_map(|group| captures.get(group))
            .map(|m| m.as_str().to_string())
    }
}

impl DependencyDetector for RegexDetector {
    fn detect(&self, source: &str) -> Vec<String> {
        let source = comment_pattern().replace_all(source, "");
        let Some(name) = Self::resolver_name(&source) else {
            return Vec::new();
        };

        let call = format!(
            r#"(?:^|[^\w$.]){}\s*\(\s*(?:"([^"\\]+)"|'([^'\\]+)')\s*\)"#,
            regex::escape(&name)
        );
        let Ok(call) = Regex::new(&call) else {
            return Vec::new();
        };

        let mut found: Vec<String> = Vec::new();
        for captures in call.captures_iter(&source) {
            if let Some(dep) = captures.get(1).or_else(|| captures.get(2)) {
                let dep = dep.as_str().to_string();
                if !found.contains(&dep) {
                    found.push(dep);
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_function_form() {
        let source = r#"function (require, exports, module) {
            var $ = require("jquery");
            var util = require('./util');
            exports.ready = true;
        }"#;

        assert_eq!(RegexDetector.detect(source), vec!["jquery", "./util"]);
    }

    #[test]
    fn test_detect_renamed_resolver() {
        let source = "function(r, e) { var a = r('a'); var b = require('b'); }";
        assert_eq!(RegexDetector.detect(source), vec!["a"]);
    }

    #[test]
    fn test_detect_arrow_form() {
        assert_eq!(
            RegexDetector.detect("(req, exports) => { req('x'); req('x'); }"),
            vec!["x"]
        );
        assert_eq!(RegexDetector.detect("req => req(\"y\")"), vec!["y"]);
    }

    #[test]
    fn test_detect_ignores_dynamic_and_comments() {
        let source = r#"function (require) {
            // require('commented')
            /* require("block") */
            var name = 'dyn';
            require(name);
            require('a' + name);
            foo.require('member');
        }"#;

        assert!(RegexDetector.detect(source).is_empty());
    }

    #[test]
    fn test_detect_unrecognised_shape() {
        assert!(RegexDetector.detect("!0").is_empty());
        assert_eq!(RegexDetector::resolver_name("function(){}"), None);
    }
}
