// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! In-memory resource loader with scripted outcomes
//!
//! Every path is registered up front with what should happen when it is
//! fetched: define a module, fail, or never answer. Each outcome can be
//! delayed, which together with a paused tokio clock gives deterministic
//! timeout and late-completion scenarios.

use super::{LoadAttempt, LoadHandle, ResourceLoader};
use crate::module_system::Definition;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

type Script = dyn Fn(&LoadAttempt) + Send + Sync;

#[derive(Clone)]
enum Behavior {
    Execute(Arc<Script>),
    Fail(String),
    Hang,
}

/// A scripted resource
#[derive(Clone)]
pub struct Resource {
    behavior: Behavior,
    delay: Duration,
    reported_path: Option<String>,
}

impl Resource {
    /// A resource that registers one definition
    pub fn define(definition: Definition) -> Self {
        Self::execute(move |attempt| {
            attempt.define(definition.clone());
        })
    }

    /// A resource that loads without registering anything (stylesheets,
    /// or scripts that forgot to call define)
    pub fn empty() -> Self {
        Self::execute(|_| {})
    }

    /// A resource running arbitrary code against the attempt before it
    /// reports success
    pub fn execute<F>(script: F) -> Self
    where
        F: Fn(&LoadAttempt) + Send + Sync + 'static,
    {
        Self {
            behavior: Behavior::Execute(Arc::new(script)),
            delay: Duration::ZERO,
            reported_path: None,
        }
    }

    /// A resource whose fetch fails
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Fail(reason.into()),
            delay: Duration::ZERO,
            reported_path: None,
        }
    }

    /// A resource whose fetch never completes
    pub fn hang() -> Self {
        Self {
            behavior: Behavior::Hang,
            delay: Duration::ZERO,
            reported_path: None,
        }
    }

    /// Delay the outcome
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Report success under a different path than requested
    pub fn reporting_path(mut self, path: impl Into<String>) -> Self {
        self.reported_path = Some(path.into());
        self
    }
}

/// Deterministic loader for tests
#[derive(Clone, Default)]
pub struct MemoryLoader {
    resources: Arc<Mutex<HashMap<String, Resource>>>,
    requests: Arc<Mutex<Vec<String>>>,
    released: Arc<Mutex<Vec<String>>>,
}

impl MemoryLoader {
    /// Create an empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the resource served at `path`
    pub fn insert(&self, path: impl Into<String>, resource: Resource) -> &Self {
        self.resources.lock().insert(path.into(), resource);
        self
    }

    /// Builder-style [`MemoryLoader::insert`]
    pub fn with(self, path: impl Into<String>, resource: Resource) -> Self {
        self.insert(path, resource);
        self
    }

    /// Every path fetched so far, in request order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Number of times `path` was fetched
    pub fn request_count(&self, path: &str) -> usize {
        self.requests.lock().iter().filter(|p| *p == path).count()
    }

    /// Paths whose load handles were released by the supervisor
    pub fn released(&self) -> Vec<String> {
        self.released.lock().clone()
    }
}

impl ResourceLoader for MemoryLoader {
    fn load(&self, attempt: LoadAttempt) -> LoadHandle {
        let path = attempt.path().to_string();
        self.requests.lock().push(path.clone());
        let resource = self.resources.lock().get(&path).cloned();

        tokio::spawn(async move {
            let Some(resource) = resource else {
                attempt.fail(format!("404 Not Found: {}", attempt.path()));
                return;
            };

            if !resource.delay.is_zero() {
                tokio::time::sleep(resource.delay).await;
            }

            match resource.behavior {
                Behavior::Execute(script) => {
                    script(&attempt);
                    match resource.reported_path {
                        Some(reported) => attempt.succeed_at(reported),
                        None => attempt.succeed(),
                    };
                }
                Behavior::Fail(reason) => {
                    attempt.fail(reason);
                }
                Behavior::Hang => {}
            }
        });

        let released = Arc::clone(&self.released);
        LoadHandle::on_release(move || released.lock().push(path))
    }
}
