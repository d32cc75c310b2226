// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! AMD module system
//!
//! - `define()` registrations and CommonJS-style factories
//! - Id normalization against a module's directory
//! - The registry of module records
//! - Load supervision (timeouts and fallback paths)
//! - `require()` resolution with fan-in of concurrent requests

mod commonjs;
mod definition;
mod normalize;
mod registry;
mod require;
mod supervisor;

pub use commonjs::{DependencyDetector, RegexDetector};
pub use definition::{
    Definition, EXPORTS, Factory, FactoryArgs, FactoryFn, MODULE, PreparedDefinition, REQUIRE,
};
pub use normalize::{PREFIX_SEPARATOR, directory_of, is_relative, normalize, split_prefix};
pub use registry::{DefinitionState, ModuleRecord, Registry, Waiter};
pub use require::{Loader, LoaderBuilder, ScopedRequire};
pub use supervisor::RequestPlan;
