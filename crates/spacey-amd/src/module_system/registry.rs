// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module registry: canonical id to module record

use crate::config::ModuleSpec;
use crate::error::{LoaderError, Result};
use crate::module_system::definition::PreparedDefinition;
use crate::module_system::normalize::split_prefix;
use crate::resource::LoadHandle;
use crate::value::{Function, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::oneshot;
use tracing::warn;

/// A caller waiting for a module to resolve
pub type Waiter = oneshot::Sender<Result<Value>>;

/// What the loader knows about a module's definition
#[derive(Debug, Clone)]
pub enum DefinitionState {
    /// The resource is expected to register a definition once loaded
    Expected,
    /// The resource does not register itself; loading it resolves it
    NotExpected,
    /// A definition has been matched to the module
    Attached(PreparedDefinition),
}

/// Registry entry for one module
pub struct ModuleRecord {
    /// Canonical id
    pub id: String,
    /// Path the module is requested from, before rewriting
    pub path: String,
    /// Explicit resource kind prefix
    pub prefix: Option<String>,
    /// Directory that relative ids in the module's dependency list resolve against
    pub base_path: Option<String>,
    /// Definition state
    pub definition: DefinitionState,
    /// Resolved export; written once
    pub cache: Option<Value>,
    /// Hook applied to the value before it is cached
    pub configure: Option<Function>,
    /// Callers waiting on an in-progress load; present iff one is outstanding
    pub queue: Option<Vec<Waiter>>,
    /// Alternate paths, consumed front to back
    pub fallback_paths: VecDeque<String>,
    /// In-flight load
    pub load_handle: Option<LoadHandle>,
    /// Terminal failure
    pub failure: Option<LoaderError>,
    /// Modules this module is currently waiting on
    pub waiting_on: Vec<String>,
}

impl ModuleRecord {
    /// Create a minimal record whose path is its id
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let (prefix, path) = split_prefix(&id);
        let prefix = prefix.map(str::to_string);
        let path = path.to_string();

        Self {
            id,
            path,
            prefix,
            base_path: None,
            definition: DefinitionState::Expected,
            cache: None,
            configure: None,
            queue: None,
            fallback_paths: VecDeque::new(),
            load_handle: None,
            failure: None,
            waiting_on: Vec::new(),
        }
    }

    /// Whether the module has resolved
    pub fn is_resolved(&self) -> bool {
        self.cache.is_some()
    }

    /// Whether a load or resolve is outstanding
    pub fn is_pending(&self) -> bool {
        self.queue.is_some()
    }
}

impl std::fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("prefix", &self.prefix)
            .field("resolved", &self.is_resolved())
            .field("pending", &self.is_pending())
            .field("fallbacks", &self.fallback_paths)
            .finish()
    }
}

/// Map of canonical ids to module records
#[derive(Debug, Default)]
pub struct Registry {
    records: HashMap<String, ModuleRecord>,
    aliases: HashMap<String, String>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve aliases to the id the record is stored under
    pub fn canonical<'a>(&'a self, id: &'a str) -> &'a str {
        self.aliases.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Get a record
    pub fn get(&self, id: &str) -> Option<&ModuleRecord> {
        self.records.get(self.canonical(id))
    }

    /// Get a record mutably
    pub fn get_mut(&mut self, id: &str) -> Option<&mut ModuleRecord> {
        let id = self.canonical(id).to_string();
        self.records.get_mut(&id)
    }

    /// Create or augment the record for `id`
    ///
    /// The same id always yields the same record. A spec overwrites the
    /// record's path and fallbacks, and pre-resolves it if it carries a value.
    pub fn map(&mut self, id: &str, spec: Option<ModuleSpec>) -> &mut ModuleRecord {
        let id = self.canonical(id).to_string();
        let record = self
            .records
            .entry(id.clone())
            .or_insert_with(|| ModuleRecord::new(id));

        if let Some(spec) = spec {
            if let Some(path) = spec.path {
                record.path = path;
            }
            if !spec.fallbacks.is_empty() {
                record.fallback_paths = spec.fallbacks.into();
            }
            if let Some(hook) = spec.configure {
                record.configure = Some(hook);
            }
            if let Some(value) = spec.value {
                if record.cache.is_none() {
                    record.cache = Some(value);
                } else {
                    warn!("Module '{}' already resolved, ignoring configured value", record.id);
                }
            }
        }

        record
    }

    /// Make `alias` name the record stored under `target`
    ///
    /// Refused when `alias` already has a record of its own that is loading or
    /// resolved.
    pub fn alias(&mut self, alias: &str, target: &str) -> bool {
        let target = self.canonical(target).to_string();
        if alias == target {
            return true;
        }
        if let Some(existing) = self.records.get(alias) {
            if existing.is_resolved() || existing.is_pending() {
                warn!(
                    "Module '{}' registered as '{}', which is already in use",
                    target, alias
                );
                return false;
            }
            self.records.remove(alias);
        }
        self.aliases.insert(alias.to_string(), target);
        true
    }

    /// Record the outcome of resolving `id` and hand back its waiters
    ///
    /// The cache is write-once: if the module already resolved, the earlier
    /// value wins and is what the waiters receive.
    pub fn settle(&mut self, id: &str, result: Result<Value>) -> (Result<Value>, Vec<Waiter>) {
        let Some(record) = self.get_mut(id) else {
            return (result, Vec::new());
        };

        let result = if let Some(existing) = record.cache.clone() {
            if result.is_ok() {
                warn!("Module '{}' resolved twice, keeping the first value", record.id);
            }
            Ok(existing)
        } else {
            match result {
                Ok(value) => {
                    record.cache = Some(value.clone());
                    Ok(value)
                }
                Err(err) => {
                    record.failure = Some(err.clone());
                    Err(err)
                }
            }
        };

        record.waiting_on.clear();
        let waiters = record.queue.take().unwrap_or_default();
        (result, waiters)
    }

    /// If `waiter` starting to wait on `dependency` would close a cycle,
    /// return the cycle
    pub fn cycle(&self, waiter: &str, dependency: &str) -> Option<Vec<String>> {
        let waiter = self.canonical(waiter).to_string();
        let dependency = self.canonical(dependency).to_string();

        let mut path = vec![waiter.clone()];
        let mut visited = HashSet::new();
        if self.reaches(&dependency, &waiter, &mut path, &mut visited) {
            Some(path)
        } else {
            None
        }
    }

    fn reaches(
        &self,
        from: &str,
        target: &str,
        path: &mut Vec<String>,
        visited: &mut HashSet<String>,
    ) -> bool {
        path.push(from.to_string());
        if from == target {
            return true;
        }
        if visited.insert(from.to_string()) {
            if let Some(record) = self.records.get(from) {
                for next in &record.waiting_on {
                    let next = self.canonical(next);
                    if self.reaches(next, target, path, visited) {
                        return true;
                    }
                }
            }
        }
        path.pop();
        false
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
