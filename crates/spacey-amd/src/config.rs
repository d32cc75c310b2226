// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader configuration
//!
//! [`Config`] is the live configuration owned by a loader. It changes only
//! through [`ConfigUpdate`], the payload of the configuration call, which is
//! merged additively: maps are extended, rewrite rules appended.

use crate::error::{LoaderError, Result};
use crate::rewrite::{RewriteEngine, RewriteRule};
use crate::value::{Function, Value};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Smallest accepted load timeout
pub const MIN_TIMEOUT_MS: u64 = 1000;

/// Load timeout used until configured otherwise
pub const DEFAULT_TIMEOUT_MS: u64 = 7000;

/// How errors are surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Errors are raised to the caller and logged loudly
    Development,
    /// Errors redirect the host to the configured error page
    Production,
}

impl Default for Mode {
    fn default() -> Self {
        if cfg!(feature = "development") {
            Mode::Development
        } else {
            Mode::Production
        }
    }
}

/// Live loader configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Error surfacing mode
    pub mode: Mode,
    /// Prefix for relative request paths
    pub base_url: Option<String>,
    /// Extra dependencies appended to a module's own list, by module id
    pub dependencies: HashMap<String, Vec<String>>,
    /// Page to redirect to in production mode
    pub on_error: Option<String>,
    /// Named values for rewrite templates
    pub parameters: HashMap<String, String>,
    /// Request path rewriting
    pub rewrite: RewriteEngine,
    /// Per-attempt load timeout
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            base_url: None,
            dependencies: HashMap::new(),
            on_error: None,
            parameters: HashMap::new(),
            rewrite: RewriteEngine::new(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl Config {
    /// Merge an update, returning the module specs for the registry
    ///
    /// Everything is validated before anything is applied, so a rejected
    /// update leaves the configuration untouched.
    pub fn apply(&mut self, update: ConfigUpdate) -> Result<Vec<(String, ModuleSpec)>> {
        if let Some(timeout) = update.timeout {
            if timeout < MIN_TIMEOUT_MS {
                return Err(LoaderError::TimeoutTooLow {
                    requested: timeout,
                    minimum: MIN_TIMEOUT_MS,
                });
            }
        }

        let rules = update
            .rewrite
            .iter()
            .map(|(prefix, template)| RewriteRule::new(prefix.clone(), template))
            .collect::<Result<Vec<_>>>()?;

        if let Some(mode) = update.mode {
            self.mode = mode;
        }
        if let Some(base_url) = update.base_url {
            self.base_url = Some(base_url);
        }
        if let Some(on_error) = update.on_error {
            self.on_error = Some(on_error);
        }
        if let Some(timeout) = update.timeout {
            self.timeout = Duration::from_millis(timeout);
        }
        for (id, extra) in update.dependencies {
            self.dependencies.entry(id).or_default().extend(extra);
        }
        self.parameters.extend(update.parameters);
        for rule in rules {
            self.rewrite.push(rule);
        }

        Ok(update.modules)
    }

    /// Extra dependencies configured for `id`
    pub fn extra_dependencies(&self, id: &str) -> &[String] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Payload of the configuration call
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigUpdate {
    /// Error surfacing mode
    pub mode: Option<Mode>,
    /// Prefix for relative request paths
    pub base_url: Option<String>,
    /// Extra dependencies, by module id
    pub dependencies: HashMap<String, Vec<String>>,
    /// Error redirect target
    pub on_error: Option<String>,
    /// Pre-registered modules
    #[serde(deserialize_with = "ordered")]
    pub modules: Vec<(String, ModuleSpec)>,
    /// Named substitution values
    pub parameters: HashMap<String, String>,
    /// Rewrite templates by path prefix, in registration order
    #[serde(deserialize_with = "ordered")]
    pub rewrite: Vec<(String, String)>,
    /// Load timeout in milliseconds
    pub timeout: Option<u64>,
}

impl ConfigUpdate {
    /// Create an empty update
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the mode
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the base URL
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Append extra dependencies for a module
    pub fn dependency<I, S>(mut self, id: impl Into<String>, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .entry(id.into())
            .or_default()
            .extend(extra.into_iter().map(Into::into));
        self
    }

    /// Set the error redirect target
    pub fn on_error(mut self, target: impl Into<String>) -> Self {
        self.on_error = Some(target.into());
        self
    }

    /// Pre-register a module
    pub fn module(mut self, id: impl Into<String>, spec: impl Into<ModuleSpec>) -> Self {
        self.modules.push((id.into(), spec.into()));
        self
    }

    /// Set a substitution parameter
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Add a rewrite rule
    pub fn rewrite(mut self, prefix: impl Into<String>, template: impl Into<String>) -> Self {
        self.rewrite.push((prefix.into(), template.into()));
        self
    }

    /// Set the load timeout in milliseconds
    pub fn timeout(mut self, millis: u64) -> Self {
        self.timeout = Some(millis);
        self
    }
}

/// Deserialize a JSON object into ordered key/value pairs
fn ordered<'de, D, T>(deserializer: D) -> std::result::Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
    map.into_iter()
        .map(|(key, value)| {
            serde_json::from_value(value)
                .map(|value| (key, value))
                .map_err(D::Error::custom)
        })
        .collect()
}

/// Pre-registration of a module
///
/// Accepted shapes: a path, a list of paths (the first is the path, the rest
/// are fallbacks), or an object `{ path, fallbacks, value }`. A configure hook
/// can only be attached in code.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawModuleSpec")]
pub struct ModuleSpec {
    /// Request path; defaults to the module id
    pub path: Option<String>,
    /// Alternate paths, tried in order
    pub fallbacks: Vec<String>,
    /// Pre-resolved export
    pub value: Option<Value>,
    /// Called with the resolved value; a non-undefined return replaces it
    pub configure: Option<Function>,
}

impl ModuleSpec {
    /// Spec with a path
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Spec with a path and fallbacks
    pub fn with_fallbacks<I, S>(path: impl Into<String>, fallbacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: Some(path.into()),
            fallbacks: fallbacks.into_iter().map(Into::into).collect(),
            value: None,
            configure: None,
        }
    }

    /// Attach a configure hook
    pub fn configure(mut self, hook: Function) -> Self {
        self.configure = Some(hook);
        self
    }

    /// Spec for an already-resolved module
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }
}

impl From<&str> for ModuleSpec {
    fn from(path: &str) -> Self {
        ModuleSpec::path(path)
    }
}

impl From<String> for ModuleSpec {
    fn from(path: String) -> Self {
        ModuleSpec::path(path)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawModuleSpec {
    Path(String),
    Paths(Vec<String>),
    Object {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        fallbacks: Vec<String>,
        #[serde(default, deserialize_with = "present")]
        value: Option<serde_json::Value>,
    },
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl From<RawModuleSpec> for ModuleSpec {
    fn from(raw: RawModuleSpec) -> Self {
        match raw {
            RawModuleSpec::Path(path) => ModuleSpec::path(path),
            RawModuleSpec::Paths(paths) => {
                let mut paths = paths.into_iter();
                ModuleSpec {
                    path: paths.next(),
                    fallbacks: paths.collect(),
                    value: None,
                    configure: None,
                }
            }
            RawModuleSpec::Object {
                path,
                fallbacks,
                value,
            } => ModuleSpec {
                path,
                fallbacks,
                value: value.as_ref().map(Value::from_json),
                configure: None,
            },
        }
    }
}
