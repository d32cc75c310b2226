// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module definitions: the payload of a `define()` call

use crate::error::{LoaderError, Result};
use crate::module_system::commonjs::DependencyDetector;
use crate::module_system::require::ScopedRequire;
use crate::value::{Object, Value};
use std::fmt;
use std::sync::Arc;

/// Dependency name resolving to the module's scoped `require`
pub const REQUIRE: &str = "require";
/// Dependency name resolving to the module's `exports` object
pub const EXPORTS: &str = "exports";
/// Dependency name resolving to the module wrapper object
pub const MODULE: &str = "module";

/// Signature of a module factory
pub type FactoryFn = dyn Fn(FactoryArgs) -> Result<Value> + Send + Sync;

/// What a definition computes its export from
#[derive(Clone)]
pub enum Factory {
    /// Called once with the resolved dependencies
    Function(Arc<FactoryFn>),
    /// Cached as is
    Value(Value),
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Factory::Function(_) => write!(f, "Factory::Function"),
            Factory::Value(value) => write!(f, "Factory::Value({:?})", value),
        }
    }
}

/// Arguments handed to a factory
pub struct FactoryArgs {
    /// Id of the module being defined
    pub id: String,
    /// Resolved dependency values, in declaration order
    pub values: Vec<Value>,
    /// Synchronous resolver scoped to the module's directory
    pub require: ScopedRequire,
    /// The module's exports object
    pub exports: Object,
    /// The module wrapper (`id` and `exports` properties)
    pub module: Object,
}

impl FactoryArgs {
    /// Dependency value at `index`, or undefined
    pub fn get(&self, index: usize) -> Value {
        self.values.get(index).cloned().unwrap_or_default()
    }
}

/// A registration call: `define([id], [dependencies], factory | value)`
#[derive(Clone, Debug, Default)]
pub struct Definition {
    /// Explicit module id
    pub id: Option<String>,
    /// Declared dependency list
    pub dependencies: Option<Vec<String>>,
    /// Factory or literal value
    pub factory: Option<Factory>,
    /// Source text of the factory, used for CommonJS dependency sniffing
    pub source: Option<String>,
}

impl Definition {
    /// Create an empty definition
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a definition that knows its own id
    pub fn named(id: impl Into<String>) -> Self {
        Self::new().id(id)
    }

    /// Set the explicit id
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Declare the dependency list
    pub fn dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = Some(dependencies.into_iter().map(Into::into).collect());
        self
    }

    /// Use a factory function
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(FactoryArgs) -> Result<Value> + Send + Sync + 'static,
    {
        self.factory = Some(Factory::Function(Arc::new(factory)));
        self
    }

    /// Use a literal value
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.factory = Some(Factory::Value(value.into()));
        self
    }

    /// Attach the factory's source text
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Validate the call and work out the effective dependency list
    pub(crate) fn prepare(self, detector: &dyn DependencyDetector) -> Result<PreparedDefinition> {
        let factory = self
            .factory
            .ok_or_else(|| LoaderError::MissingFactory { id: self.id.clone() })?;

        let (dependencies, commonjs) = match (self.dependencies, &factory) {
            (Some(dependencies), _) => (dependencies, false),
            (None, Factory::Function(_)) => {
                let mut dependencies = vec![
                    REQUIRE.to_string(),
                    EXPORTS.to_string(),
                    MODULE.to_string(),
                ];
                if let Some(source) = &self.source {
                    dependencies.extend(detector.detect(source));
                }
                (dependencies, true)
            }
            (None, Factory::Value(_)) => (Vec::new(), false),
        };

        Ok(PreparedDefinition {
            id: self.id,
            dependencies,
            factory,
            commonjs,
        })
    }
}

/// A validated definition attached to a module record
#[derive(Clone, Debug)]
pub struct PreparedDefinition {
    /// Explicit id given to define(), if any
    pub id: Option<String>,
    /// Effective dependency list
    pub dependencies: Vec<String>,
    /// Factory or literal value
    pub factory: Factory,
    /// Whether the definition was authored CommonJS-style
    pub commonjs: bool,
}
