// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the module loader

use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Errors that can occur while loading and resolving modules
///
/// Errors are `Clone` because a single failed load is delivered to every
/// caller waiting on the same module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    /// Unknown `prefix!` resource kind
    #[error("Invalid resource kind '{0}'")]
    InvalidResourceKind(String),

    /// Resource loaded but never called define()
    #[error("Module '{id}' loaded from '{path}' but never registered a definition")]
    DefinitionMissing {
        /// Module id
        id: String,
        /// Path that was loaded
        path: String,
    },

    /// Resource called define() more than once
    #[error("Module '{id}' registered {count} definitions, expected exactly one")]
    DefinitionDuplicate {
        /// Module id
        id: String,
        /// Number of pending definitions found
        count: usize,
    },

    /// Resource completed under a different path than requested
    #[error("Module '{id}' was requested from '{expected}' but registered from '{actual}'")]
    PathMismatch {
        /// Module id
        id: String,
        /// Requested path
        expected: String,
        /// Path reported by the resource loader
        actual: String,
    },

    /// Every path (primary and fallbacks) failed or timed out
    #[error("Failed to load module '{id}' after trying {}: {reason}", .attempts.join(", "))]
    LoadExhausted {
        /// Module id
        id: String,
        /// Paths tried, in order
        attempts: Vec<String>,
        /// Failure reason of the last attempt
        reason: String,
    },

    /// define() without a factory or value
    #[error("Definition{} supplied neither a factory nor a value", describe_id(.id))]
    MissingFactory {
        /// Explicit id of the definition, if any
        id: Option<String>,
    },

    /// Synchronous require() of a module that has not resolved yet
    #[error("Module '{0}' has not been loaded yet, use require(ids, callback)")]
    SynchronousLookupUnresolved(String),

    /// Configured timeout below the enforced floor
    #[error("Timeout of {requested}ms is below the minimum of {minimum}ms")]
    TimeoutTooLow {
        /// Requested timeout in milliseconds
        requested: u64,
        /// Enforced minimum in milliseconds
        minimum: u64,
    },

    /// A module transitively depends on itself
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    /// Anonymous define() outside of any loading resource
    #[error("Anonymous definition outside of a loading resource")]
    AnonymousDefinition,

    /// A factory returned an error
    #[error("Factory of module '{id}' failed: {message}")]
    Factory {
        /// Module id
        id: String,
        /// Error message
        message: String,
    },

    /// Configuration document could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Type error (wrong argument type)
    #[error("TypeError: {0}")]
    TypeError(String),
}

impl LoaderError {
    /// Create a new TypeError
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a factory failure for a module
    pub fn factory(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Factory {
            id: id.into(),
            message: msg.into(),
        }
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidResourceKind(_) => "InvalidResourceKind",
            Self::DefinitionMissing { .. } => "DefinitionMissing",
            Self::DefinitionDuplicate { .. } => "DefinitionDuplicate",
            Self::PathMismatch { .. } => "PathMismatch",
            Self::LoadExhausted { .. } => "LoadExhausted",
            Self::MissingFactory { .. } => "MissingFactory",
            Self::SynchronousLookupUnresolved(_) => "SynchronousLookupUnresolved",
            Self::TimeoutTooLow { .. } => "TimeoutTooLow",
            Self::CircularDependency(_) => "CircularDependency",
            Self::AnonymousDefinition => "AnonymousDefinition",
            Self::Factory { .. } => "Factory",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::TypeError(_) => "TypeError",
        }
    }
}

fn describe_id(id: &Option<String>) -> String {
    id.as_ref().map(|id| format!(" of '{}'", id)).unwrap_or_default()
}

impl From<serde_json::Error> for LoaderError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
