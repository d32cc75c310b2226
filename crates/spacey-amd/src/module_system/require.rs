// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Dependency resolution: `require()` and `define()`
//!
//! Resolving a list of ids normalizes each one, makes sure a load is in
//! progress for every module that has not resolved yet, and joins the results
//! in list order. Concurrent requests for the same module share one load: the
//! first request starts it, later ones queue on the module record.

use crate::config::{Config, ConfigUpdate};
use crate::error::{LoaderError, Result};
use crate::host::{self, ErrorHost, LogOnlyHost};
use crate::module_system::commonjs::{DependencyDetector, RegexDetector};
use crate::module_system::definition::{
    Definition, EXPORTS, Factory, FactoryArgs, MODULE, PreparedDefinition, REQUIRE,
};
use crate::module_system::normalize::{directory_of, normalize};
use crate::module_system::registry::{DefinitionState, ModuleRecord, Registry};
use crate::module_system::supervisor::RequestPlan;
use crate::resource::ResourceLoader;
use crate::value::{Function, Object, Value};
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Shared loader state
pub(crate) struct LoaderInner {
    pub(crate) config: RwLock<Config>,
    pub(crate) registry: Mutex<Registry>,
    pub(crate) resources: Box<dyn ResourceLoader>,
    detector: Box<dyn DependencyDetector>,
    host: Box<dyn ErrorHost>,
}

/// A module that has resolved or is being waited on
enum Slot {
    Ready(Value),
    Waiting(String, oneshot::Receiver<Result<Value>>),
}

impl Slot {
    async fn resolve(self) -> Result<Value> {
        match self {
            Slot::Ready(value) => Ok(value),
            Slot::Waiting(id, rx) => rx
                .await
                .unwrap_or_else(|_| Err(LoaderError::factory(id, "resolution was abandoned"))),
        }
    }
}

/// Values injected for the `require`, `exports` and `module` dependency names
struct Injected {
    require: ScopedRequire,
    exports: Object,
    module: Object,
}

impl Injected {
    fn get(&self, name: &str) -> Option<Value> {
        match name {
            REQUIRE => Some(Value::Function(self.require.to_function())),
            EXPORTS => Some(Value::Object(self.exports.clone())),
            MODULE => Some(Value::Object(self.module.clone())),
            _ => None,
        }
    }
}

impl LoaderInner {
    fn report(&self, err: &LoaderError) {
        let (mode, on_error) = {
            let config = self.config.read();
            (config.mode, config.on_error.clone())
        };
        host::report(mode, on_error.as_deref(), self.host.as_ref(), err);
    }

    /// Return the module's value, or start/join its resolution
    ///
    /// `waiter` is the module whose dependency list is being resolved, used
    /// for cycle detection; top-level requests pass None.
    fn request(self: &Arc<Self>, id: &str, waiter: Option<&str>) -> Result<Slot> {
        let mut registry = self.registry.lock();

        if let Some(waiter) = waiter {
            if let Some(cycle) = registry.cycle(waiter, id) {
                return Err(LoaderError::CircularDependency(cycle.join(" -> ")));
            }
        }

        let record = registry.map(id, None);
        if let Some(value) = &record.cache {
            return Ok(Slot::Ready(value.clone()));
        }
        if let Some(err) = &record.failure {
            return Err(err.clone());
        }

        let (tx, rx) = oneshot::channel();
        let start = match &mut record.queue {
            Some(queue) => {
                queue.push(tx);
                false
            }
            None => {
                record.queue = Some(vec![tx]);
                true
            }
        };
        let canonical = record.id.clone();

        if let Some(waiter) = waiter.and_then(|waiter| registry.get_mut(waiter)) {
            waiter.waiting_on.push(canonical.clone());
        }
        drop(registry);

        if start {
            debug!("Starting resolution of '{}'", canonical);
            tokio::spawn(Arc::clone(self).run(canonical.clone()));
        } else {
            debug!("Joining in-progress resolution of '{}'", canonical);
        }

        Ok(Slot::Waiting(canonical, rx))
    }

    /// Resolve a module and release everything queued on it
    fn run(self: Arc<Self>, id: String) -> BoxFuture<'static, ()> {
        async move {
            let result = match self.load_and_resolve(&id).await {
                Ok(value) => self.configure_value(&id, value),
                Err(err) => Err(err),
            };
            match &result {
                Ok(_) => debug!("Module '{}' resolved", id),
                Err(err) => warn!("Module '{}' failed: {}", id, err),
            }

            let (result, waiters) = self.registry.lock().settle(&id, result);
            for waiter in waiters {
                let _ = waiter.send(result.clone());
            }
        }
        .boxed()
    }

    /// Pass a resolved value through the module's configure hook
    ///
    /// Undefined becomes null; a hook returning anything but undefined
    /// replaces the value.
    fn configure_value(&self, id: &str, value: Value) -> Result<Value> {
        let value = if value.is_undefined() { Value::Null } else { value };
        let hook = self
            .registry
            .lock()
            .get(id)
            .and_then(|record| record.configure.clone());

        match hook {
            Some(hook) => {
                let configured = hook.call(std::slice::from_ref(&value))?;
                if configured.is_undefined() {
                    Ok(value)
                } else {
                    debug!("Module '{}' replaced by its configure hook", id);
                    Ok(configured)
                }
            }
            None => Ok(value),
        }
    }

    async fn load_and_resolve(self: &Arc<Self>, id: &str) -> Result<Value> {
        let inline = {
            let registry = self.registry.lock();
            match registry.get(id).map(|record| &record.definition) {
                Some(DefinitionState::Attached(definition)) => Some(definition.clone()),
                _ => None,
            }
        };

        let definition = match inline {
            Some(definition) => Some(definition),
            None => self.load_definition(id).await?,
        };

        let base = {
            let mut registry = self.registry.lock();
            let record = registry.map(id, None);
            let base = directory_of(&record.path).to_string();
            record.base_path = Some(base.clone());
            base
        };

        match definition {
            Some(definition) => self.instantiate(id, definition, &base).await,
            None => {
                let extra = self.config.read().extra_dependencies(id).to_vec();
                self.resolve_list(&extra, &base, Some(id), None).await?;
                Ok(Value::Boolean(true))
            }
        }
    }

    /// Fetch the module's resource and match the definition it registered
    async fn load_definition(self: &Arc<Self>, id: &str) -> Result<Option<PreparedDefinition>> {
        let attempt = self.fetch(id).await?;

        if !attempt.kind().self_registering {
            if let Some(record) = self.registry.lock().get_mut(id) {
                record.definition = DefinitionState::NotExpected;
            }
            return Ok(None);
        }

        let mut definitions = attempt.take_definitions();
        attempt.expire();
        let definition = match definitions.len() {
            0 => {
                return Err(LoaderError::DefinitionMissing {
                    id: id.to_string(),
                    path: attempt.path().to_string(),
                });
            }
            1 => definitions.remove(0),
            count => {
                return Err(LoaderError::DefinitionDuplicate {
                    id: id.to_string(),
                    count,
                });
            }
        };

        let definition = definition.prepare(self.detector.as_ref())?;

        let mut registry = self.registry.lock();
        if let Some(explicit) = &definition.id {
            let explicit = normalize(explicit, "");
            if explicit != id && registry.alias(&explicit, id) {
                debug!("Module '{}' registered itself as '{}'", id, explicit);
            }
        }
        if let Some(record) = registry.get_mut(id) {
            record.definition = DefinitionState::Attached(definition.clone());
        }

        Ok(Some(definition))
    }

    /// Resolve a definition's dependencies and compute its export
    async fn instantiate(
        self: &Arc<Self>,
        id: &str,
        definition: PreparedDefinition,
        base: &str,
    ) -> Result<Value> {
        let exports = Object::new();
        let module = Object::new();
        module.set("id", id);
        module.set("exports", exports.clone());

        let injected = Injected {
            require: ScopedRequire {
                inner: Arc::downgrade(self),
                base: base.to_string(),
            },
            exports: exports.clone(),
            module: module.clone(),
        };

        let mut dependencies = definition.dependencies.clone();
        dependencies.extend(self.config.read().extra_dependencies(id).iter().cloned());

        let values = self
            .resolve_list(&dependencies, base, Some(id), Some(&injected))
            .await?;

        let uses_exports = definition.commonjs
            || definition
                .dependencies
                .iter()
                .any(|name| name == EXPORTS || name == MODULE);

        match definition.factory {
            Factory::Value(value) => Ok(value),
            Factory::Function(factory) => {
                let returned = factory(FactoryArgs {
                    id: id.to_string(),
                    values,
                    require: injected.require.clone(),
                    exports: exports.clone(),
                    module: module.clone(),
                })?;

                if !returned.is_undefined() {
                    Ok(returned)
                } else if uses_exports {
                    Ok(module.get("exports").unwrap_or(Value::Object(exports)))
                } else {
                    Ok(Value::Null)
                }
            }
        }
    }

    /// Resolve ids relative to `base` into their values, in list order
    async fn resolve_list(
        self: &Arc<Self>,
        ids: &[String],
        base: &str,
        waiter: Option<&str>,
        injected: Option<&Injected>,
    ) -> Result<Vec<Value>> {
        let slots = ids
            .iter()
            .map(|name| match injected.and_then(|injected| injected.get(name)) {
                Some(value) => Ok(Slot::Ready(value)),
                None => self.request(&normalize(name, base), waiter),
            })
            .collect::<Result<Vec<_>>>();

        let result = match slots {
            Ok(slots) => future::try_join_all(slots.into_iter().map(Slot::resolve)).await,
            Err(err) => Err(err),
        };

        if let Some(waiter) = waiter {
            if let Some(record) = self.registry.lock().get_mut(waiter) {
                record.waiting_on.clear();
            }
        }

        result
    }

    fn lookup(&self, id: &str) -> Result<Value> {
        self.registry
            .lock()
            .get(id)
            .and_then(|record| record.cache.clone())
            .ok_or_else(|| LoaderError::SynchronousLookupUnresolved(id.to_string()))
    }
}

/// Synchronous `require` handed to factories, scoped to the module's directory
#[derive(Clone)]
pub struct ScopedRequire {
    inner: Weak<LoaderInner>,
    base: String,
}

impl ScopedRequire {
    /// Directory relative ids are resolved against
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Look up an already-resolved module; never triggers loading
    pub fn get(&self, id: &str) -> Result<Value> {
        let key = normalize(id, &self.base);
        match self.inner.upgrade() {
            Some(inner) => inner.lookup(&key),
            None => Err(LoaderError::SynchronousLookupUnresolved(key)),
        }
    }

    /// The resolver as a callable value taking one string argument
    pub fn to_function(&self) -> Function {
        let scope = self.clone();
        Function::new("require", move |args| match args.first() {
            Some(Value::String(id)) => scope.get(id),
            Some(other) => Err(LoaderError::type_error(format!(
                "require expects a module id, got {}",
                other.type_of()
            ))),
            None => Err(LoaderError::type_error("require expects a module id")),
        })
    }
}

impl std::fmt::Debug for ScopedRequire {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedRequire").field("base", &self.base).finish()
    }
}

/// Builder for [`Loader`]
pub struct LoaderBuilder {
    resources: Box<dyn ResourceLoader>,
    detector: Box<dyn DependencyDetector>,
    host: Box<dyn ErrorHost>,
    config: Config,
}

impl LoaderBuilder {
    /// Replace the CommonJS dependency detector
    pub fn detector(mut self, detector: impl DependencyDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    /// Set the host that receives production-mode redirects
    pub fn host(mut self, host: impl ErrorHost + 'static) -> Self {
        self.host = Box::new(host);
        self
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Build the loader
    pub fn build(self) -> Loader {
        Loader {
            inner: Arc::new(LoaderInner {
                config: RwLock::new(self.config),
                registry: Mutex::new(Registry::new()),
                resources: self.resources,
                detector: self.detector,
                host: self.host,
            }),
        }
    }
}

/// The module loader
///
/// Cheap to clone; clones share one registry and configuration. Resolution
/// spawns tasks, so the async methods must run inside a tokio runtime.
#[derive(Clone)]
pub struct Loader {
    inner: Arc<LoaderInner>,
}

impl Loader {
    /// Create a loader with default configuration
    pub fn new(resources: impl ResourceLoader + 'static) -> Self {
        Self::builder(resources).build()
    }

    /// Start building a loader
    pub fn builder(resources: impl ResourceLoader + 'static) -> LoaderBuilder {
        LoaderBuilder {
            resources: Box::new(resources),
            detector: Box::new(RegexDetector),
            host: Box::new(LogOnlyHost),
            config: Config::default(),
        }
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> Config {
        self.inner.config.read().clone()
    }

    /// Merge a configuration update
    pub fn configure(&self, update: ConfigUpdate) -> Result<()> {
        let applied = self.inner.config.write().apply(update);
        let modules = match applied {
            Ok(modules) => modules,
            Err(err) => {
                self.inner.report(&err);
                return Err(err);
            }
        };

        let mut registry = self.inner.registry.lock();
        for (id, spec) in modules {
            registry.map(&normalize(&id, ""), Some(spec));
        }
        Ok(())
    }

    /// Register a named definition directly, outside of any loading resource
    ///
    /// Resources being loaded register through their
    /// [`LoadAttempt`](crate::resource::LoadAttempt) instead.
    pub fn define(&self, definition: Definition) -> Result<()> {
        let result = self.define_inline(definition);
        if let Err(err) = &result {
            self.inner.report(err);
        }
        result
    }

    fn define_inline(&self, definition: Definition) -> Result<()> {
        let definition = definition.prepare(self.inner.detector.as_ref())?;
        let id = match &definition.id {
            Some(id) => normalize(id, ""),
            None => return Err(LoaderError::AnonymousDefinition),
        };

        let mut registry = self.inner.registry.lock();
        let record = registry.map(&id, None);
        if record.is_resolved() || record.is_pending() {
            warn!("Module '{}' is already loading or loaded, ignoring definition", id);
            return Ok(());
        }
        record.definition = DefinitionState::Attached(definition);
        Ok(())
    }

    /// Resolve modules, returning their values in the order requested
    pub async fn require<I, S>(&self, ids: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        let result = self.inner.resolve_list(&ids, "", None, None).await;
        if let Err(err) = &result {
            self.inner.report(err);
        }
        result
    }

    /// Resolve a single module
    pub async fn require_one(&self, id: &str) -> Result<Value> {
        let mut values = self.require([id]).await?;
        Ok(values.pop().unwrap_or_default())
    }

    /// Resolve modules and hand the result to `callback`, exactly once
    pub fn require_with<I, S, F>(&self, ids: I, callback: F) -> JoinHandle<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(Result<Vec<Value>>) + Send + 'static,
    {
        let loader = self.clone();
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        tokio::spawn(async move {
            let result = loader.require(ids).await;
            callback(result);
        })
    }

    /// Look up already-resolved modules without loading anything
    pub fn require_sync<I, S>(&self, ids: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let result = ids
            .into_iter()
            .map(|id| self.inner.lookup(&normalize(id.as_ref(), "")))
            .collect::<Result<Vec<_>>>();
        if let Err(err) = &result {
            self.inner.report(err);
        }
        result
    }

    /// Look up one already-resolved module
    pub fn get(&self, id: &str) -> Result<Value> {
        let mut values = self.require_sync([id])?;
        Ok(values.pop().unwrap_or_default())
    }

    /// Whether a module has resolved
    pub fn is_resolved(&self, id: &str) -> bool {
        self.inner
            .registry
            .lock()
            .get(&normalize(id, ""))
            .is_some_and(ModuleRecord::is_resolved)
    }

    /// Request plans for a module's path and fallbacks, without loading it
    pub fn plan(&self, id: &str) -> Result<Vec<RequestPlan>> {
        let id = normalize(id, "");
        let (path, prefix, fallbacks) = {
            let registry = self.inner.registry.lock();
            match registry.get(&id) {
                Some(record) => (
                    record.path.clone(),
                    record.prefix.clone(),
                    record.fallback_paths.iter().cloned().collect::<Vec<_>>(),
                ),
                None => {
                    let record = ModuleRecord::new(id.clone());
                    (record.path, record.prefix, Vec::new())
                }
            }
        };

        std::iter::once(path)
            .chain(fallbacks)
            .map(|path| self.inner.plan(&path, prefix.as_deref()))
            .collect()
    }
}
