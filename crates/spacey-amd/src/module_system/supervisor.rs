// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Fallback and timeout supervision of resource loads
//!
//! Each module load is a sequence of attempts:
//!
//! ```text
//! Requested(path0) --error/timeout--> Requested(path1) --...--> Failed
//!        \                                  \
//!         success ------------------------> success --> definition matching
//! ```
//!
//! Every attempt gets its own timer. When an attempt fails or times out it is
//! expired before the next path is tried, so a completion or definition that
//! arrives late through the old attempt is dropped. The transfer itself is
//! never aborted; the loader only stops listening.

use crate::error::{LoaderError, Result};
use crate::module_system::require::LoaderInner;
use crate::resource::{Completion, LoadAttempt, ResourceKind};
use tracing::{debug, info, warn};

/// Concrete request for one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPlan {
    /// Path handed to the resource loader
    pub path: String,
    /// Kind of resource
    pub kind: ResourceKind,
}

/// Prefix a relative path with the base URL
fn apply_base(base_url: Option<&str>, path: String) -> String {
    match base_url {
        Some(base) if !base.is_empty() && !path.starts_with('/') && !path.contains("://") => {
            format!("{}/{}", base.trim_end_matches('/'), path)
        }
        _ => path,
    }
}

impl LoaderInner {
    /// Work out the request path and resource kind for a module path
    ///
    /// An explicit `prefix!` decides the kind; otherwise the last matching
    /// rewrite rule that names one does, and scripts are the default. The
    /// kind's extension is appended, rewrite rules are applied and the result
    /// is placed under the base URL unless it is already absolute.
    pub(crate) fn plan(&self, path: &str, prefix: Option<&str>) -> Result<RequestPlan> {
        let config = self.config.read();
        let kind = match prefix {
            Some(prefix) => ResourceKind::from_prefix(Some(prefix))?,
            None => config
                .rewrite
                .kind_for(path)
                .unwrap_or(ResourceKind::SCRIPT),
        };

        let requested = kind.with_extension(path);
        let rewritten = config.rewrite.rewrite(path, &requested, &config.parameters);

        Ok(RequestPlan {
            path: apply_base(config.base_url.as_deref(), rewritten),
            kind,
        })
    }

    /// Load the resource behind `id`, walking its fallback paths
    ///
    /// Returns the attempt that succeeded, which carries the definitions the
    /// resource registered.
    pub(crate) async fn fetch(&self, id: &str) -> Result<LoadAttempt> {
        let (path, prefix) = {
            let registry = self.registry.lock();
            match registry.get(id) {
                Some(record) => (record.path.clone(), record.prefix.clone()),
                None => (id.to_string(), None),
            }
        };

        let mut plan = self.plan(&path, prefix.as_deref())?;
        let mut tried = Vec::new();

        loop {
            let (attempt, completion) = LoadAttempt::new(id, plan.path.clone(), plan.kind.clone());
            let timeout = self.config.read().timeout;
            tried.push(plan.path.clone());
            info!("Loading '{}' from {}", id, plan.path);

            let handle = self.resources.load(attempt.clone());
            if let Some(record) = self.registry.lock().get_mut(id) {
                record.load_handle = Some(handle);
            }

            let outcome = match tokio::time::timeout(timeout, completion).await {
                Ok(Ok(Completion::Loaded { path })) => Ok(path),
                Ok(Ok(Completion::Failed(reason))) => Err(reason),
                Ok(Err(_)) => Err("load was abandoned by the resource loader".to_string()),
                Err(_) => Err(format!("timed out after {}ms", timeout.as_millis())),
            };

            let handle = self
                .registry
                .lock()
                .get_mut(id)
                .and_then(|record| record.load_handle.take());
            if let Some(handle) = handle {
                handle.release();
            }

            match outcome {
                Ok(actual) if actual == plan.path => {
                    debug!("Loaded '{}' from {}", id, actual);
                    return Ok(attempt);
                }
                Ok(actual) => {
                    attempt.expire();
                    return Err(LoaderError::PathMismatch {
                        id: id.to_string(),
                        expected: plan.path,
                        actual,
                    });
                }
                Err(reason) => {
                    attempt.expire();
                    // The record's path is always the one being tried
                    let next = self.registry.lock().get_mut(id).and_then(|record| {
                        let fallback = record.fallback_paths.pop_front()?;
                        record.path = fallback.clone();
                        Some(fallback)
                    });

                    match next {
                        Some(fallback) => {
                            warn!(
                                "Loading '{}' from {} failed ({}), falling back to {}",
                                id, plan.path, reason, fallback
                            );
                            plan = self.plan(&fallback, prefix.as_deref())?;
                        }
                        None => {
                            return Err(LoaderError::LoadExhausted {
                                id: id.to_string(),
                                attempts: tried,
                                reason,
                            });
                        }
                    }
                }
            }
        }
    }
}
