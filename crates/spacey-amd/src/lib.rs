// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-amd
//!
//! An asynchronous module definition (AMD) loader.
//!
//! Modules register themselves with `define()`, declaring their dependencies
//! by id. `require()` resolves a list of ids, loading each missing module's
//! resource exactly once no matter how many callers wait on it, and delivers
//! the values in the order requested.
//!
//! - Configurable per-module paths with ordered fallbacks
//! - Per-attempt timeouts
//! - Prefix-based path rewrite rules with query parameter substitution
//! - CommonJS-style factories (`require`, `exports`, `module`)
//! - Stylesheet resources alongside scripts (`css!theme`)
//! - Development and production error modes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spacey_amd::{ConfigUpdate, Definition, Loader, MemoryLoader, Resource};
//!
//! #[tokio::main]
//! async fn main() -> spacey_amd::Result<()> {
//!     let resources = MemoryLoader::new()
//!         .with("greeting.js", Resource::define(Definition::new().value("hello")));
//!     let loader = Loader::new(resources);
//!     loader.configure(ConfigUpdate::new().timeout(2000))?;
//!
//!     let values = loader.require(["greeting"]).await?;
//!     println!("{}", values[0]);
//!     Ok(())
//! }
//! ```
//!
//! Resources are provided by a [`ResourceLoader`]. Definitions made while a
//! resource executes are reported through the [`LoadAttempt`] the loader
//! handed out, which ties them to the module being loaded.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod host;
pub mod module_system;
pub mod resource;
pub mod rewrite;
pub mod value;

// Re-exports
pub use config::{Config, ConfigUpdate, DEFAULT_TIMEOUT_MS, MIN_TIMEOUT_MS, Mode, ModuleSpec};
pub use error::{LoaderError, Result};
pub use host::{ErrorHost, HostMetadata, LogOnlyHost, RecordingHost};
pub use module_system::{
    Definition, DependencyDetector, Factory, FactoryArgs, Loader, LoaderBuilder, RegexDetector,
    RequestPlan, ScopedRequire,
};
pub use resource::{
    Completion, FsLoader, LoadAttempt, LoadHandle, MemoryLoader, Resource, ResourceKind,
    ResourceLoader,
};
pub use rewrite::{RewriteEngine, RewriteRule};
pub use value::{Function, Object, Value};

/// Version of the loader
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
