//! Runtime values: what a [`crate::program::Program`] evaluates to.

use crate::error::Error;
use crate::handler::HandlerStack;
use crate::scheduler::{FutureHandle, PromiseId, TaskId};
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A type-erased payload carried by a domain effect (the capability hook, see
/// [`crate::effect::Effect::Domain`]). Boxed instead of generic so the kernel never needs to know
/// about domain effect types.
pub type DomainPayload = Arc<dyn Any + Send + Sync>;

/// The value produced by a finished [`crate::program::Program`].
#[derive(Clone)]
pub enum Value {
    /// The unit value, used as the seed value fed into coroutine `send()` on first step and as
    /// the result of effects with no interesting payload (`Tell`, `SetState`, …).
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Bytes(bytes::Bytes),
    List(Vec<Value>),
    Dict(Arc<HashMap<String, Value>>),
    TaskId(TaskId),
    Future(FutureHandle),
    /// The write side of a promise created by `CreatePromise`, paired with its read-side handle.
    Promise(PromiseId, FutureHandle),
    /// The result of `GetHandlers`, fed back into `SetHandlers` or inspected by diagnostics.
    Handlers(HandlerStack),
    /// An opaque domain value, round-tripped through the kernel without interpretation.
    Domain(DomainPayload),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "Unit"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Dict(map) => f.debug_map().entries(map.iter()).finish(),
            Value::TaskId(id) => write!(f, "TaskId({id:?})"),
            Value::Future(h) => write!(f, "Future({h:?})"),
            Value::Promise(id, h) => write!(f, "Promise({id:?}, {h:?})"),
            Value::Handlers(stack) => write!(f, "Handlers({} installed)", stack.len()),
            Value::Domain(_) => write!(f, "Domain(..)"),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Diagnostic, not round-trippable: `TaskId`/`Future`/`Promise`/`Handlers`/`Domain` serialize as
/// display strings since none of them can be reconstructed from serialized data anyway (a
/// `RunResult` is for a caller to inspect, never to feed back into a fresh `Runtime`).
impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Value::Unit => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::List(items) => items.serialize(serializer),
            Value::Dict(map) => (**map).serialize(serializer),
            Value::TaskId(id) => serializer.collect_str(id),
            Value::Future(h) => serializer.collect_str(h),
            Value::Promise(id, h) => serializer.collect_str(&format!("{id}/{h}")),
            Value::Handlers(stack) => serializer.collect_str(&format!("Handlers({} installed)", stack.len())),
            Value::Domain(_) => serializer.serialize_str("Domain(..)"),
        }
    }
}

/// Outcome of a computation that can fail: the algebra-level analogue of `Result<Value, Error>`,
/// exposed as a `Value` so it can flow through `Try`'s continuation like any other value.
#[derive(Clone, Debug)]
pub enum Outcome {
    Ok(Box<Value>),
    Err(Error),
}

impl Outcome {
    pub fn into_value(self) -> Value {
        match self {
            Outcome::Ok(v) => Value::List(vec![Value::from("ok"), *v]),
            Outcome::Err(e) => Value::List(vec![Value::from("err"), Value::from(e.to_string())]),
        }
    }
}
