// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resource loading collaborators
//!
//! The loader never fetches anything itself. It hands a [`LoadAttempt`] to a
//! [`ResourceLoader`], which must eventually report exactly one of success or
//! failure through the attempt. Definitions made by the executing resource are
//! threaded through the same attempt, so matching a definition to its module
//! never depends on event ordering.
//!
//! Implementations:
//! - [`MemoryLoader`]: deterministic in-memory resources for tests
//! - [`FsLoader`]: resources read from a directory tree

mod fs;
mod memory;

pub use fs::FsLoader;
pub use memory::{MemoryLoader, Resource};

use crate::error::{LoaderError, Result};
use crate::module_system::Definition;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;
use tracing::debug;

/// Describes how a kind of resource is fetched and whether it registers itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKind {
    /// Prefix naming the kind (`js`, `css`)
    pub name: &'static str,
    /// Element a DOM host would inject
    pub tag: &'static str,
    /// Attribute carrying the path
    pub path_attribute: &'static str,
    /// Extra element attributes
    pub attributes: &'static [(&'static str, &'static str)],
    /// File extension appended to bare paths
    pub extension: &'static str,
    /// Whether the resource is expected to call define()
    pub self_registering: bool,
}

impl ResourceKind {
    /// JavaScript resource that registers a definition
    pub const SCRIPT: ResourceKind = ResourceKind {
        name: "js",
        tag: "script",
        path_attribute: "src",
        attributes: &[("async", "async")],
        extension: ".js",
        self_registering: true,
    };

    /// Stylesheet, resolved as soon as it loads
    pub const STYLESHEET: ResourceKind = ResourceKind {
        name: "css",
        tag: "link",
        path_attribute: "href",
        attributes: &[("rel", "stylesheet")],
        extension: ".css",
        self_registering: false,
    };

    /// Look up the kind selected by a `prefix!`; no prefix means a script
    pub fn from_prefix(prefix: Option<&str>) -> Result<Self> {
        match prefix {
            None | Some("js") => Ok(Self::SCRIPT),
            Some("css") => Ok(Self::STYLESHEET),
            Some(other) => Err(LoaderError::InvalidResourceKind(other.to_string())),
        }
    }

    /// Append the kind's extension unless the path already has it or carries
    /// a query string
    pub fn with_extension(&self, path: &str) -> String {
        if path.ends_with(self.extension) || path.contains('?') {
            path.to_string()
        } else {
            format!("{}{}", path, self.extension)
        }
    }

    /// Render the element a DOM host would inject for `path`
    pub fn element(&self, path: &str) -> String {
        let mut html = format!(
            "<{} {}=\"{}\"",
            self.tag,
            self.path_attribute,
            escape_attribute(path)
        );
        for (name, value) in self.attributes {
            html.push_str(&format!(" {}=\"{}\"", name, value));
        }
        if self.tag == "script" {
            html.push_str("></script>");
        } else {
            html.push('>');
        }
        html
    }
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Outcome reported by a resource loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The resource loaded from `path`
    Loaded {
        /// Path the resource was actually loaded from
        path: String,
    },
    /// The resource failed to load
    Failed(String),
}

struct AttemptState {
    id: String,
    path: String,
    kind: ResourceKind,
    expired: AtomicBool,
    definitions: Mutex<Vec<Definition>>,
    completion: Mutex<Option<oneshot::Sender<Completion>>>,
}

/// One attempt at fetching a module from one path
///
/// The attempt is the per-load token: the resource registers its definition
/// through it and reports completion through it. Once the supervisor gives up
/// on the attempt (timeout or fallback) it is expired, and anything arriving
/// through it afterwards is ignored.
#[derive(Clone)]
pub struct LoadAttempt {
    state: Arc<AttemptState>,
}

impl LoadAttempt {
    pub(crate) fn new(
        id: impl Into<String>,
        path: impl Into<String>,
        kind: ResourceKind,
    ) -> (Self, oneshot::Receiver<Completion>) {
        let (tx, rx) = oneshot::channel();
        let attempt = Self {
            state: Arc::new(AttemptState {
                id: id.into(),
                path: path.into(),
                kind,
                expired: AtomicBool::new(false),
                definitions: Mutex::new(Vec::new()),
                completion: Mutex::new(Some(tx)),
            }),
        };
        (attempt, rx)
    }

    /// Module id being loaded
    pub fn id(&self) -> &str {
        &self.state.id
    }

    /// Path to fetch
    pub fn path(&self) -> &str {
        &self.state.path
    }

    /// Kind of resource to fetch
    pub fn kind(&self) -> &ResourceKind {
        &self.state.kind
    }

    /// Whether the supervisor has abandoned this attempt
    pub fn is_expired(&self) -> bool {
        self.state.expired.load(Ordering::SeqCst)
    }

    /// Register a definition made by the executing resource
    ///
    /// Returns false when the attempt has expired and the definition was dropped.
    pub fn define(&self, definition: Definition) -> bool {
        if self.is_expired() {
            debug!(
                "Ignoring definition from superseded attempt for '{}' ({})",
                self.id(),
                self.path()
            );
            return false;
        }
        self.state.definitions.lock().push(definition);
        true
    }

    /// Report that the resource loaded from the requested path
    pub fn succeed(&self) -> bool {
        let path = self.path().to_string();
        self.complete(Completion::Loaded { path })
    }

    /// Report that the resource loaded from `path`
    pub fn succeed_at(&self, path: impl Into<String>) -> bool {
        self.complete(Completion::Loaded { path: path.into() })
    }

    /// Report that the resource failed to load
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.complete(Completion::Failed(reason.into()))
    }

    fn complete(&self, completion: Completion) -> bool {
        if self.is_expired() {
            debug!(
                "Ignoring late completion for '{}' from {}: {:?}",
                self.id(),
                self.path(),
                completion
            );
            return false;
        }
        match self.state.completion.lock().take() {
            Some(tx) => tx.send(completion).is_ok(),
            None => {
                debug!("Attempt for '{}' already completed", self.id());
                false
            }
        }
    }

    pub(crate) fn expire(&self) {
        self.state.expired.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_definitions(&self) -> Vec<Definition> {
        std::mem::take(&mut *self.state.definitions.lock())
    }
}

impl std::fmt::Debug for LoadAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadAttempt")
            .field("id", &self.state.id)
            .field("path", &self.state.path)
            .field("kind", &self.state.kind.name)
            .field("expired", &self.is_expired())
            .finish()
    }
}

/// Handle on an in-flight load, used to unhook its event wiring
///
/// Releasing a handle never aborts the underlying transfer.
#[derive(Default)]
pub struct LoadHandle {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LoadHandle {
    /// A handle with nothing to unhook
    pub fn detached() -> Self {
        Self::default()
    }

    /// A handle that runs `release` once the supervisor is done with the load
    pub fn on_release<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Unhook the load
    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Something able to fetch a resource by path
pub trait ResourceLoader: Send + Sync {
    /// Begin fetching `attempt.path()`
    ///
    /// Must not block. The implementation reports completion through
    /// [`LoadAttempt::succeed`] / [`LoadAttempt::fail`], at most once.
    fn load(&self, attempt: LoadAttempt) -> LoadHandle;
}

impl<T: ResourceLoader + ?Sized> ResourceLoader for Arc<T> {
    fn load(&self, attempt: LoadAttempt) -> LoadHandle {
        (**self).load(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_prefix() {
        assert_eq!(ResourceKind::from_prefix(None).unwrap(), ResourceKind::SCRIPT);
        assert_eq!(ResourceKind::from_prefix(Some("css")).unwrap(), ResourceKind::STYLESHEET);
        assert_eq!(
            ResourceKind::from_prefix(Some("tpl")),
            Err(LoaderError::InvalidResourceKind("tpl".to_string()))
        );
    }

    #[test]
    fn test_with_extension() {
        assert_eq!(ResourceKind::SCRIPT.with_extension("lib/foo"), "lib/foo.js");
        assert_eq!(ResourceKind::SCRIPT.with_extension("lib/foo.js"), "lib/foo.js");
        assert_eq!(ResourceKind::SCRIPT.with_extension("api?x=1"), "api?x=1");
        assert_eq!(ResourceKind::STYLESHEET.with_extension("theme"), "theme.css");
    }

    #[test]
    fn test_element() {
        assert_eq!(
            ResourceKind::SCRIPT.element("a.js?x=1&y=2"),
            r#"<script src="a.js?x=1&amp;y=2" async="async"></script>"#
        );
        assert_eq!(
            ResourceKind::STYLESHEET.element("t.css"),
            r#"<link href="t.css" rel="stylesheet">"#
        );
    }

    #[test]
    fn test_attempt_completes_once() {
        let (attempt, mut rx) = LoadAttempt::new("a", "a.js", ResourceKind::SCRIPT);
        assert!(attempt.succeed());
        assert!(!attempt.fail("again"));
        assert_eq!(
            rx.try_recv().unwrap(),
            Completion::Loaded { path: "a.js".to_string() }
        );
    }

    #[test]
    fn test_expired_attempt_ignores_signals() {
        let (attempt, mut rx) = LoadAttempt::new("a", "a.js", ResourceKind::SCRIPT);
        attempt.expire();

        assert!(!attempt.define(Definition::new().value(1.0)));
        assert!(!attempt.succeed());
        assert!(attempt.take_definitions().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_handle_release() {
        use std::sync::atomic::AtomicUsize;

        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        LoadHandle::on_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .release();
        LoadHandle::detached().release();

        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
