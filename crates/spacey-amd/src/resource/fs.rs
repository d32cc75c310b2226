// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Directory-backed resource loader
//!
//! Request paths are looked up under a root directory. A script resource is a
//! JSON document holding a single definition or a list of definitions:
//!
//! ```json
//! { "id": "app/config", "dependencies": ["./base"], "value": { "debug": true } }
//! ```
//!
//! A stylesheet only has to exist. Like a browser, a script that loads but
//! cannot be executed (here: is not valid JSON) still counts as loaded, and
//! the missing definition is reported by the supervisor.

use super::{LoadAttempt, LoadHandle, ResourceLoader};
use crate::module_system::Definition;
use crate::value::Value;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Document {
    Many(Vec<DefineDocument>),
    One(DefineDocument),
}

#[derive(Debug, Deserialize)]
struct DefineDocument {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    dependencies: Option<Vec<String>>,
    #[serde(default, deserialize_with = "present")]
    value: Option<serde_json::Value>,
}

/// Distinguishes `"value": null` from a missing value
fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl DefineDocument {
    fn into_definition(self) -> Definition {
        let mut definition = Definition::new();
        definition.id = self.id;
        definition.dependencies = self.dependencies;
        if let Some(value) = self.value {
            definition = definition.value(Value::from_json(&value));
        }
        definition
    }
}

/// Loads resources from a directory
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    /// Serve resources from `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing a request path
    ///
    /// None for URLs and for paths with `..` segments, which could leave the
    /// root.
    pub fn file_for(&self, path: &str) -> Option<PathBuf> {
        if path.contains("://") || path.starts_with("//") {
            return None;
        }
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let path = path.trim_start_matches('/');
        if path.split(['/', '\\']).any(|segment| segment == "..") {
            return None;
        }
        Some(self.root.join(path))
    }
}

impl ResourceLoader for FsLoader {
    fn load(&self, attempt: LoadAttempt) -> LoadHandle {
        let file = self.file_for(attempt.path());

        tokio::spawn(async move {
            let Some(file) = file else {
                attempt.fail(format!("Unsupported location: {}", attempt.path()));
                return;
            };

            let content = match fs::read_to_string(&file).await {
                Ok(content) => content,
                Err(e) => {
                    attempt.fail(format!("{}: {}", file.display(), e));
                    return;
                }
            };
            debug!("Read {} ({} bytes)", file.display(), content.len());

            if attempt.kind().self_registering {
                match serde_json::from_str::<Document>(&content) {
                    Ok(Document::One(doc)) => {
                        attempt.define(doc.into_definition());
                    }
                    Ok(Document::Many(docs)) => {
                        for doc in docs {
                            attempt.define(doc.into_definition());
                        }
                    }
                    Err(e) => warn!("Failed to execute {}: {}", file.display(), e),
                }
            }

            attempt.succeed();
        });

        LoadHandle::detached()
    }
}
