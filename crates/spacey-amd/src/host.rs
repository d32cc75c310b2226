// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host collaborators
//!
//! - [`HostMetadata`]: the startup values a host page provides (base URL,
//!   entry point, cache-busting token, parameters)
//! - [`ErrorHost`]: where production-mode errors are redirected

use crate::config::{ConfigUpdate, Mode};
use crate::error::LoaderError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

/// Query parameter appended to error redirects; its presence in the current
/// location means the error page itself failed
pub const REDIRECT_MARKER: &str = "amd-error=1";

/// Parameter name the cache-busting token is published under
pub const BUST_PARAMETER: &str = "bust";

/// Startup values supplied by the host
#[derive(Debug, Clone, Default)]
pub struct HostMetadata {
    /// Base URL for relative request paths
    pub base_url: Option<String>,
    /// Module to require once configured
    pub main: Option<String>,
    /// Cache-busting token
    pub bust: Option<String>,
    /// Arbitrary named parameters
    pub parameters: HashMap<String, String>,
}

impl From<&HostMetadata> for ConfigUpdate {
    fn from(meta: &HostMetadata) -> Self {
        let mut update = ConfigUpdate::new();
        update.base_url = meta.base_url.clone();
        update.parameters = meta.parameters.clone();
        if let Some(bust) = &meta.bust {
            update.parameters.insert(BUST_PARAMETER.to_string(), bust.clone());
        }
        update
    }
}

/// The page hosting the loader, as far as error handling is concerned
pub trait ErrorHost: Send + Sync {
    /// Current location
    fn location(&self) -> String;

    /// Navigate away to `target`
    fn navigate(&self, target: &str);
}

impl<T: ErrorHost + ?Sized> ErrorHost for Arc<T> {
    fn location(&self) -> String {
        (**self).location()
    }

    fn navigate(&self, target: &str) {
        (**self).navigate(target)
    }
}

/// Host without navigation; errors are only logged
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyHost;

impl ErrorHost for LogOnlyHost {
    fn location(&self) -> String {
        String::new()
    }

    fn navigate(&self, target: &str) {
        error!("Redirect to {} requested but the host cannot navigate", target);
    }
}

/// Host that remembers navigations instead of performing them
#[derive(Debug, Default)]
pub struct RecordingHost {
    location: Mutex<String>,
    navigations: Mutex<Vec<String>>,
}

impl RecordingHost {
    /// Host currently at `location`
    pub fn at(location: impl Into<String>) -> Self {
        Self {
            location: Mutex::new(location.into()),
            navigations: Mutex::new(Vec::new()),
        }
    }

    /// Navigations requested so far
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().clone()
    }
}

impl ErrorHost for RecordingHost {
    fn location(&self) -> String {
        self.location.lock().clone()
    }

    fn navigate(&self, target: &str) {
        self.navigations.lock().push(target.to_string());
        *self.location.lock() = target.to_string();
    }
}

/// Build the redirect URL for an error
pub fn redirect_target(on_error: &str, err: &LoaderError) -> String {
    let separator = if on_error.contains('?') { '&' } else { '?' };
    format!("{}{}{}&kind={}", on_error, separator, REDIRECT_MARKER, err.kind())
}

/// Surface an error according to the mode
///
/// Development mode logs the error; the caller receives it as an `Err`.
/// Production mode additionally redirects the host to `on_error`, unless the
/// host is already on a redirected page.
pub fn report(mode: Mode, on_error: Option<&str>, host: &dyn ErrorHost, err: &LoaderError) {
    match (mode, on_error) {
        (Mode::Production, Some(on_error)) => {
            if host.location().contains(REDIRECT_MARKER) {
                error!("{} (error page failed, not redirecting again)", err);
            } else {
                error!("{}", err);
                host.navigate(&redirect_target(on_error, err));
            }
        }
        _ => error!("{}", err),
    }
}
