//! Guard structured props against prototype pollution.
//!
//! Components receive props as an object literal spliced into the render
//! expression, so keys like `__proto__` land on real objects inside the
//! context. Contexts are reused across renders, which makes a polluted
//! `Object.prototype` visible to every later render on the same context.

use serde_json::Value;
use thiserror::Error;

/// Maximum nesting depth for objects/arrays in props
const MAX_DEPTH: usize = 32;

/// Keys that reach `Object.prototype` when used in an object literal
const DANGEROUS_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnsafeProps {
    #[error("'{0}' key is forbidden in props")]
    ForbiddenKey(String),

    #[error("props nesting exceeds {} levels", MAX_DEPTH)]
    TooDeep,
}

/// Walk `value` and reject forbidden keys or excessive nesting.
pub fn sanitize_props(value: &Value) -> Result<(), UnsafeProps> {
    check(value, 0)
}

fn check(value: &Value, depth: usize) -> Result<(), UnsafeProps> {
    if depth > MAX_DEPTH {
        return Err(UnsafeProps::TooDeep);
    }

    match value {
        Value::Object(map) => {
            if let Some(key) = map.keys().find(|k| DANGEROUS_KEYS.contains(&k.as_str())) {
                return Err(UnsafeProps::ForbiddenKey(key.clone()));
            }
            map.values().try_for_each(|v| check(v, depth + 1))
        }
        Value::Array(items) => items.iter().try_for_each(|v| check(v, depth + 1)),
        _ => Ok(()),
    }
}
