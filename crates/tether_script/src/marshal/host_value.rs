//! Dynamically typed host view of script values

use super::collection::{encode_sequence, sequence_len};
use super::{FromValue, HostFunction, IntoValue, ScriptFunction};
use crate::context::Scope;
use crate::error::{BridgeError, Result, ScriptError};
use crate::value::{Tag, Value};
use std::collections::BTreeMap;

/// Nesting limit for [`HostValue`] decoding. Cyclic object graphs hit it
/// instead of recursing forever.
pub const MAX_DECODE_DEPTH: usize = 128;

/// Every shape a value can take on the host side.
///
/// Decoding dispatches on the value's [`Tag`]; encoding dispatches on the
/// variant. The narrow numeric variants only exist for encoding: the engine
/// has a single integer tag, so decoding always yields [`HostValue::Int64`]
/// or [`HostValue::Float64`].
#[derive(Debug, Clone)]
pub enum HostValue<'js> {
    Undefined,
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    BigUint64(u64),
    BigInt(num_bigint::BigInt),
    Float64(f64),
    String(String),
    List(Vec<HostValue<'js>>),
    Map(BTreeMap<String, HostValue<'js>>),
    /// A host callable to expose to scripts.
    HostFunction(HostFunction),
    /// A script function, callable from the host.
    Function(ScriptFunction<'js>),
    Error(ScriptError),
    /// Symbols and anything else without a host shape.
    Opaque(Value<'js>),
}

impl<'js> HostValue<'js> {
    /// `true` for `Undefined` and `Null`.
    pub fn is_absent(&self) -> bool {
        matches!(self, HostValue::Undefined | HostValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(text) => Some(text),
            _ => None,
        }
    }

    /// Numeric variants widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            HostValue::Int32(n) => Some(f64::from(n)),
            HostValue::Int64(n) => Some(n as f64),
            HostValue::Uint32(n) => Some(f64::from(n)),
            HostValue::BigUint64(n) => Some(n as f64),
            HostValue::Float64(n) => Some(n),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&HostValue<'js>> {
        match self {
            HostValue::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    fn decode(value: Value<'js>, depth: usize) -> Result<Self> {
        if depth > MAX_DECODE_DEPTH {
            return Err(BridgeError::DepthExceeded {
                limit: MAX_DECODE_DEPTH,
            });
        }

        let decoded = match value.tag() {
            Tag::Undefined | Tag::Uninitialized => HostValue::Undefined,
            Tag::Null => HostValue::Null,
            Tag::Bool => HostValue::Bool(value.to_bool()?),
            Tag::Int => HostValue::Int64(value.to_i64()?),
            Tag::Float => HostValue::Float64(value.to_f64()?),
            Tag::BigInt => HostValue::BigInt(value.big_int()?),
            Tag::String => HostValue::String(value.to_string()?),
            Tag::Function => HostValue::Function(ScriptFunction::new(value)?),
            Tag::Error => match value.as_error() {
                Some(error) => HostValue::Error(error),
                None => HostValue::Opaque(value),
            },
            Tag::Array => {
                let (len, capacity) = sequence_len(&value)?;
                let mut items = Vec::with_capacity(capacity);
                for index in 0..len {
                    items.push(Self::decode(value.get(index as u32)?, depth + 1)?);
                }
                HostValue::List(items)
            }
            Tag::Object => {
                let mut entries = BTreeMap::new();
                for name in value.property_names()? {
                    let property = value.get(&name)?;
                    if property.is_undefined() {
                        continue;
                    }
                    entries.insert(name, Self::decode(property, depth + 1)?);
                }
                HostValue::Map(entries)
            }
            Tag::Symbol | Tag::Unknown => HostValue::Opaque(value),
        };
        Ok(decoded)
    }
}

impl<'js> FromValue<'js> for HostValue<'js> {
    fn from_value(value: Value<'js>) -> Result<Self> {
        Self::decode(value, 0)
    }
}

impl<'js> IntoValue<'js> for HostValue<'js> {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        match self {
            HostValue::Undefined => Ok(scope.undefined()),
            HostValue::Null => Ok(scope.null()),
            HostValue::Bool(b) => Ok(scope.bool(b)),
            HostValue::Int32(n) => Ok(scope.int32(n)),
            HostValue::Int64(n) => n.into_value(scope),
            HostValue::Uint32(n) => Ok(scope.uint32(n)),
            HostValue::BigUint64(n) => scope.big_uint64(n),
            HostValue::BigInt(n) => n.into_value(scope),
            HostValue::Float64(n) => Ok(scope.float64(n)),
            HostValue::String(text) => scope.string(&text),
            HostValue::List(items) => encode_sequence(scope, items),
            HostValue::Map(entries) => entries.into_value(scope),
            HostValue::HostFunction(function) => function.into_value(scope),
            HostValue::Function(function) => function.into_value(scope),
            HostValue::Error(error) => scope.error_value(&error),
            HostValue::Opaque(value) => Ok(value),
        }
    }
}

impl From<bool> for HostValue<'_> {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<i32> for HostValue<'_> {
    fn from(value: i32) -> Self {
        HostValue::Int32(value)
    }
}

impl From<i64> for HostValue<'_> {
    fn from(value: i64) -> Self {
        HostValue::Int64(value)
    }
}

impl From<f64> for HostValue<'_> {
    fn from(value: f64) -> Self {
        HostValue::Float64(value)
    }
}

impl From<&str> for HostValue<'_> {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_string())
    }
}

impl From<String> for HostValue<'_> {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}
