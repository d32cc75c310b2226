// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module export values.
//!
//! Values are designed to be thread-safe and can be safely shared
//! between async tasks. Objects are shared by reference so a factory can
//! mutate the `exports` object it was handed and the loader observes it.

use crate::error::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Signature of a native function value
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A value exported by a module.
#[derive(Clone, Default)]
pub enum Value {
    /// undefined
    #[default]
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// Immutable list
    Array(Vec<Value>),
    /// Shared mutable object
    Object(Object),
    /// Callable function
    Function(Function),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                // Handle NaN comparisons
                if a.is_nan() && b.is_nan() {
                    false
                } else {
                    a == b
                }
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b) || a.entries() == b.entries(),
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Returns true if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if this value is a function.
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Returns the string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the object handle, if this is an object.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Calls this value if it is a function.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        match self {
            Value::Function(func) => func.call(args),
            other => Err(crate::LoaderError::type_error(format!(
                "{} is not a function",
                other.type_of()
            ))),
        }
    }

    /// Returns the type of this value as a string.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object", // Historical quirk
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) | Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// Convert a JSON document into a value
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(arr) => Value::Array(arr.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(obj) => {
                let object = Object::new();
                for (key, value) in obj {
                    object.set(key.clone(), Value::from_json(value));
                }
                Value::Object(object)
            }
        }
    }

    /// Convert this value into JSON. Functions and undefined become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(obj) => serde_json::Value::Object(
                obj.entries()
                    .into_iter()
                    .map(|(key, value)| (key, value.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(obj)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Boolean(b) => write!(f, "Boolean({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Array(items) => f.debug_list().entries(items).finish(),
            Value::Object(obj) => f.debug_map().entries(obj.entries()).finish(),
            Value::Function(func) => write!(f, "{}", func),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(_) | Value::Object(_) => write!(f, "{}", self.to_json()),
            Value::Function(func) => write!(f, "{}", func),
        }
    }
}

/// Shared, mutable string-keyed object
#[derive(Clone, Default)]
pub struct Object {
    properties: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl Object {
    /// Create an empty object
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a property
    pub fn get(&self, key: &str) -> Option<Value> {
        self.properties.read().get(key).cloned()
    }

    /// Set a property
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.write().insert(key.into(), value.into());
    }

    /// Whether the object has no properties
    pub fn is_empty(&self) -> bool {
        self.properties.read().is_empty()
    }

    /// Snapshot of all properties
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.properties
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Whether both handles point at the same object
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.properties, &other.properties)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

/// Native function value
#[derive(Clone)]
pub struct Function {
    /// Function name, if any
    pub name: Option<String>,
    call: Arc<NativeFn>,
}

impl Function {
    /// Wrap a closure as a function value
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: Some(name.into()),
            call: Arc::new(f),
        }
    }

    /// Invoke the function
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.call)(args)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "[Function: {}]", name),
            None => write!(f, "[Function (anonymous)]"),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.call, &other.call)
    }
}

impl From<Function> for Value {
    fn from(func: Function) -> Self {
        Value::Function(func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_shared_mutation() {
        let exports = Object::new();
        let alias = exports.clone();
        alias.set("answer", 42.0);

        assert_eq!(exports.get("answer"), Some(Value::Number(42.0)));
        assert!(exports.ptr_eq(&alias));
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"name": "jquery", "tags": ["dom", 3.0], "extra": null});
        let value = Value::from_json(&json);

        assert_eq!(value.type_of(), "object");
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_function_call() {
        let double = Value::Function(Function::new("double", |args| match args.first() {
            Some(Value::Number(n)) => Ok(Value::Number(n * 2.0)),
            _ => Ok(Value::Undefined),
        }));

        assert_eq!(double.call(&[Value::Number(21.0)]), Ok(Value::Number(42.0)));
        assert!(Value::Null.call(&[]).is_err());
        assert_eq!(double.to_string(), "[Function: double]");
    }

    #[test]
    fn test_nan_not_equal() {
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_eq!(Value::from("a"), Value::String("a".to_string()));
    }
}
