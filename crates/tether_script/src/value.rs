//! Script values
//!
//! [`Value`] is an owned handle to engine memory plus the scope it belongs
//! to. Dropping it releases the engine reference exactly once; cloning it
//! takes a new reference. Singletons such as `undefined`, `null`, booleans
//! and small numbers carry no reference count, so releasing them is free.

use crate::atom::Atom;
use crate::context::{Capture, Scope};
use crate::error::{BridgeError, Result, ScriptError};
use crate::marshal::{FromValue, IntoArgs, IntoValue};
use rquickjs::function::{Rest, This};
use rquickjs::{Exception, Persistent, Type};
use std::fmt;

/// Largest length a script array can have.
const MAX_ARRAY_LENGTH: u64 = u32::MAX as u64;

/// Coarse classification of a value, as the engine tags it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Undefined,
    Uninitialized,
    Null,
    Bool,
    Int,
    Float,
    BigInt,
    String,
    Symbol,
    Array,
    Function,
    Error,
    Object,
    Unknown,
}

impl Tag {
    pub const fn name(self) -> &'static str {
        match self {
            Tag::Undefined => "undefined",
            Tag::Uninitialized => "uninitialized",
            Tag::Null => "null",
            Tag::Bool => "bool",
            Tag::Int => "int",
            Tag::Float => "float",
            Tag::BigInt => "bigint",
            Tag::String => "string",
            Tag::Symbol => "symbol",
            Tag::Array => "array",
            Tag::Function => "function",
            Tag::Error => "error",
            Tag::Object => "object",
            Tag::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value owned by a script context.
#[derive(Clone)]
pub struct Value<'js> {
    scope: Scope<'js>,
    raw: rquickjs::Value<'js>,
}

impl<'js> Value<'js> {
    pub(crate) fn from_raw(scope: Scope<'js>, raw: rquickjs::Value<'js>) -> Self {
        Self { scope, raw }
    }

    /// Adopt a raw engine value created under `scope`.
    pub fn from_engine(scope: &Scope<'js>, raw: rquickjs::Value<'js>) -> Self {
        Self::from_raw(scope.clone(), raw)
    }

    pub fn scope(&self) -> &Scope<'js> {
        &self.scope
    }

    pub fn as_raw(&self) -> &rquickjs::Value<'js> {
        &self.raw
    }

    pub fn into_raw(self) -> rquickjs::Value<'js> {
        self.raw
    }

    /// `true` for the "no value" markers the engine uses: undefined,
    /// uninitialized and null.
    pub(crate) fn is_absent_raw(raw: &rquickjs::Value<'_>) -> bool {
        raw.is_undefined() || raw.is_null() || raw.type_of() == Type::Uninitialized
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub fn tag(&self) -> Tag {
        let raw = &self.raw;
        if raw.is_undefined() {
            Tag::Undefined
        } else if raw.is_null() {
            Tag::Null
        } else if raw.is_bool() {
            Tag::Bool
        } else if raw.is_int() {
            Tag::Int
        } else if raw.is_float() {
            Tag::Float
        } else if raw.type_of() == Type::BigInt {
            Tag::BigInt
        } else if raw.is_string() {
            Tag::String
        } else if raw.is_symbol() {
            Tag::Symbol
        } else if raw.is_array() {
            Tag::Array
        } else if raw.is_function() {
            Tag::Function
        } else if let Some(obj) = raw.as_object() {
            if Exception::from_object(obj.clone()).is_some() {
                Tag::Error
            } else {
                Tag::Object
            }
        } else if raw.type_of() == Type::Uninitialized {
            Tag::Uninitialized
        } else {
            Tag::Unknown
        }
    }

    /// The script `typeof` string.
    pub fn type_of(&self) -> &'static str {
        match self.tag() {
            Tag::Undefined | Tag::Uninitialized => "undefined",
            Tag::Null | Tag::Array | Tag::Error | Tag::Object | Tag::Unknown => "object",
            Tag::Bool => "boolean",
            Tag::Int | Tag::Float => "number",
            Tag::BigInt => "bigint",
            Tag::String => "string",
            Tag::Symbol => "symbol",
            Tag::Function => "function",
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.raw.is_undefined() || self.raw.type_of() == Type::Uninitialized
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    /// Undefined, uninitialized or null.
    pub fn is_absent(&self) -> bool {
        Self::is_absent_raw(&self.raw)
    }

    pub fn is_bool(&self) -> bool {
        self.raw.is_bool()
    }

    pub fn is_number(&self) -> bool {
        self.raw.is_int() || self.raw.is_float()
    }

    pub fn is_big_int(&self) -> bool {
        self.raw.type_of() == Type::BigInt
    }

    pub fn is_string(&self) -> bool {
        self.raw.is_string()
    }

    pub fn is_symbol(&self) -> bool {
        self.raw.is_symbol()
    }

    /// Any object, including arrays, functions and errors.
    pub fn is_object(&self) -> bool {
        self.raw.as_object().is_some()
    }

    pub fn is_array(&self) -> bool {
        self.raw.is_array()
    }

    pub fn is_function(&self) -> bool {
        self.raw.is_function()
    }

    pub fn is_error(&self) -> bool {
        self.tag() == Tag::Error
    }

    // ------------------------------------------------------------------------
    // Coercions (script conversion rules)
    // ------------------------------------------------------------------------

    /// `ToInt32`.
    pub fn to_i32(&self) -> Result<i32> {
        self.coerce::<i32>()
    }

    /// `ToInt64`-style truncation; BigInts convert exactly when they fit.
    pub fn to_i64(&self) -> Result<i64> {
        self.coerce::<i64>()
    }

    /// `ToUint32`.
    pub fn to_u32(&self) -> Result<u32> {
        self.coerce::<i32>().map(|n| n as u32)
    }

    /// `ToNumber`.
    pub fn to_f64(&self) -> Result<f64> {
        self.coerce::<f64>()
    }

    /// `ToBoolean`.
    pub fn to_bool(&self) -> Result<bool> {
        self.coerce::<bool>()
    }

    /// `ToString`.
    pub fn to_string(&self) -> Result<String> {
        self.coerce::<String>()
    }

    fn coerce<T>(&self) -> Result<T>
    where
        rquickjs::Coerced<T>: rquickjs::FromJs<'js>,
    {
        self.raw
            .get::<rquickjs::Coerced<T>>()
            .map(|coerced| coerced.0)
            .capture(&self.scope)
    }

    /// Arbitrary-precision view of a BigInt value.
    pub fn big_int(&self) -> Result<num_bigint::BigInt> {
        if !self.is_big_int() {
            return Err(BridgeError::mismatch("bigint", self.tag().name()));
        }
        let digits = self.to_string()?;
        digits
            .parse::<num_bigint::BigInt>()
            .map_err(|_| BridgeError::mismatch("bigint", "malformed digits"))
    }

    /// Decode an error object; `None` for anything else.
    pub fn as_error(&self) -> Option<ScriptError> {
        if self.is_error() {
            Some(ScriptError::from_raw(self.raw.clone()))
        } else {
            None
        }
    }

    /// Decode into a host type.
    pub fn decode<T: FromValue<'js>>(self) -> Result<T> {
        T::from_value(self)
    }

    /// `JSON.stringify`. `None` when the value has no JSON form (`undefined`,
    /// functions, symbols).
    pub fn to_json_string(&self) -> Result<Option<String>> {
        let json = self
            .scope
            .ctx()
            .json_stringify(self.raw.clone())
            .capture(&self.scope)?;
        match json {
            Some(text) => text.to_string().capture(&self.scope).map(Some),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    fn object(&self) -> Result<&rquickjs::Object<'js>> {
        self.raw
            .as_object()
            .ok_or_else(|| BridgeError::mismatch("object", self.tag().name()))
    }

    pub fn get<K: PropertyKey<'js>>(&self, key: K) -> Result<Value<'js>> {
        let atom = key.into_atom(&self.scope)?;
        let raw = self
            .object()?
            .get::<_, rquickjs::Value>(atom.into_raw())
            .capture(&self.scope)?;
        Ok(self.scope.wrap(raw))
    }

    pub fn set<K: PropertyKey<'js>, V: IntoValue<'js>>(&self, key: K, value: V) -> Result<()> {
        let atom = key.into_atom(&self.scope)?;
        let value = value.into_value(&self.scope)?;
        self.object()?
            .set(atom.into_raw(), value.raw)
            .capture(&self.scope)
    }

    /// `key in object`, prototype chain included.
    pub fn has_property<K: PropertyKey<'js>>(&self, key: K) -> Result<bool> {
        let atom = key.into_atom(&self.scope)?;
        self.object()?
            .contains_key(atom.into_raw())
            .capture(&self.scope)
    }

    /// `delete object[key]`.
    pub fn delete_property<K: PropertyKey<'js>>(&self, key: K) -> Result<()> {
        let atom = key.into_atom(&self.scope)?;
        self.object()?.remove(atom.into_raw()).capture(&self.scope)
    }

    /// Own enumerable string keys, in engine order (integer keys first, then
    /// insertion order).
    pub fn property_names(&self) -> Result<Vec<String>> {
        self.object()?
            .keys::<String>()
            .collect::<rquickjs::Result<Vec<_>>>()
            .capture(&self.scope)
    }

    /// Own enumerable string keys as atoms.
    pub fn property_atoms(&self) -> Result<Vec<Atom<'js>>> {
        let raw = self
            .object()?
            .keys::<rquickjs::Atom>()
            .collect::<rquickjs::Result<Vec<_>>>()
            .capture(&self.scope)?;
        Ok(raw
            .into_iter()
            .map(|atom| Atom::from_raw(self.scope.clone(), atom))
            .collect())
    }

    /// The numeric `length` property of an array or array-like object.
    ///
    /// Sparse arrays report their full length; anything above the largest
    /// array length (2^32 - 1) is rejected.
    pub fn len(&self) -> Result<usize> {
        let length = self.get("length")?;
        if !length.is_number() {
            return Err(BridgeError::mismatch("object with a length", self.tag().name()));
        }
        let length = length.to_f64()?;
        if length.is_nan() || length <= 0.0 {
            return Ok(0);
        }
        if length > MAX_ARRAY_LENGTH as f64 {
            return Err(BridgeError::LengthExceeded {
                length: length as u64,
                limit: MAX_ARRAY_LENGTH,
            });
        }
        Ok(length as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    // ------------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------------

    /// Call with `this` set to `undefined`.
    pub fn call<A: IntoArgs<'js>>(&self, args: A) -> Result<Value<'js>> {
        let this = self.scope.undefined();
        self.call_with_this(this, args)
    }

    pub fn call_with_this<T, A>(&self, this: T, args: A) -> Result<Value<'js>>
    where
        T: IntoValue<'js>,
        A: IntoArgs<'js>,
    {
        let function = self.raw.as_function().ok_or(BridgeError::NotCallable)?;
        let this = this.into_value(&self.scope)?;
        let args = raw_args(args.into_args(&self.scope)?);
        let raw = function
            .call::<_, rquickjs::Value>((This(this.raw), Rest(args)))
            .capture(&self.scope)?;
        Ok(self.scope.wrap(raw))
    }

    /// `new value(...args)`.
    pub fn construct<A: IntoArgs<'js>>(&self, args: A) -> Result<Value<'js>> {
        if !self.is_function() {
            return Err(BridgeError::NotCallable);
        }
        let list = self.scope.array()?;
        for (index, arg) in args.into_args(&self.scope)?.into_iter().enumerate() {
            list.set(index as u32, arg)?;
        }
        let reflect = self.scope.global("Reflect")?;
        let construct = reflect.get("construct")?;
        construct.call_with_this(reflect, (self.clone(), list))
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Keep the value alive beyond this scope, e.g. across event loop turns.
    pub fn persist(&self) -> PersistentValue {
        PersistentValue {
            inner: Persistent::save(self.scope.ctx(), self.raw.clone()),
        }
    }
}

fn raw_args<'js>(args: Vec<Value<'js>>) -> Vec<rquickjs::Value<'js>> {
    args.into_iter().map(Value::into_raw).collect()
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag();
        match tag {
            Tag::Int | Tag::Float | Tag::Bool | Tag::String | Tag::BigInt => {
                match self.to_string() {
                    Ok(text) => write!(f, "Value({tag}: {text:?})"),
                    Err(_) => write!(f, "Value({tag})"),
                }
            }
            _ => write!(f, "Value({tag})"),
        }
    }
}

/// A value kept alive outside of any scope.
///
/// Must be dropped before the runtime that produced it; every holder in this
/// workspace (timers, pending promises) lives inside a context's registry
/// entries or event loop, both of which are torn down first.
#[derive(Clone)]
pub struct PersistentValue {
    inner: Persistent<rquickjs::Value<'static>>,
}

impl PersistentValue {
    pub fn restore<'js>(&self, scope: &Scope<'js>) -> Result<Value<'js>> {
        let raw = self.inner.clone().restore(scope.ctx()).capture(scope)?;
        Ok(scope.wrap(raw))
    }
}

impl fmt::Debug for PersistentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PersistentValue")
    }
}

// ============================================================================
// Property keys
// ============================================================================

/// Anything usable as a property key: names, indices and atoms.
pub trait PropertyKey<'js> {
    fn into_atom(self, scope: &Scope<'js>) -> Result<Atom<'js>>;
}

impl<'js> PropertyKey<'js> for &str {
    fn into_atom(self, scope: &Scope<'js>) -> Result<Atom<'js>> {
        scope.atom(self)
    }
}

impl<'js> PropertyKey<'js> for &String {
    fn into_atom(self, scope: &Scope<'js>) -> Result<Atom<'js>> {
        scope.atom(self)
    }
}

impl<'js> PropertyKey<'js> for String {
    fn into_atom(self, scope: &Scope<'js>) -> Result<Atom<'js>> {
        scope.atom(&self)
    }
}

impl<'js> PropertyKey<'js> for u32 {
    fn into_atom(self, scope: &Scope<'js>) -> Result<Atom<'js>> {
        Atom::from_index(scope, self)
    }
}

impl<'js> PropertyKey<'js> for Atom<'js> {
    fn into_atom(self, _scope: &Scope<'js>) -> Result<Atom<'js>> {
        Ok(self)
    }
}

impl<'js> PropertyKey<'js> for &Atom<'js> {
    fn into_atom(self, _scope: &Scope<'js>) -> Result<Atom<'js>> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use crate::{BridgeError, Runtime};

    #[test]
    fn test_tags_and_typeof() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let cases = [
                ("undefined", "undefined"),
                ("null", "object"),
                ("true", "boolean"),
                ("1", "number"),
                ("1.5", "number"),
                ("10n", "bigint"),
                ("'s'", "string"),
                ("Symbol('x')", "symbol"),
                ("[1]", "object"),
                ("(function () {})", "function"),
                ("new TypeError('x')", "object"),
                ("({})", "object"),
            ];
            for (source, expected) in cases {
                let value = scope.eval(source).unwrap();
                assert_eq!(value.type_of(), expected, "typeof {source}");
            }

            assert_eq!(scope.eval("[1]").unwrap().tag(), super::Tag::Array);
            assert_eq!(scope.eval("new RangeError('x')").unwrap().tag(), super::Tag::Error);
            assert_eq!(scope.eval("7").unwrap().tag(), super::Tag::Int);
        });
    }

    #[test]
    fn test_property_access() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let object = scope.object().unwrap();
            object.set("name", "tether").unwrap();
            object.set(0u32, 10).unwrap();
            let key = scope.atom("atomic").unwrap();
            object.set(&key, true).unwrap();

            assert_eq!(object.get("name").unwrap().to_string().unwrap(), "tether");
            assert_eq!(object.get(0u32).unwrap().to_i32().unwrap(), 10);
            assert!(object.get(&key).unwrap().to_bool().unwrap());
            assert!(object.has_property("toString").unwrap());

            object.delete_property("name").unwrap();
            assert!(!object.has_property("name").unwrap());
            assert!(object.get("name").unwrap().is_undefined());
            assert_eq!(object.property_names().unwrap(), vec!["0", "atomic"]);
        });
    }

    #[test]
    fn test_property_access_on_primitive_fails() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let number = scope.int32(3);
            assert!(number.get("x").is_err());
        });
    }

    #[test]
    fn test_class_instance_own_keys_in_order() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let instance = scope
                .eval(
                    "class A { constructor() { this.a = 1 } }; \
                     class B extends A { constructor() { super(); this.b = 1 } }; \
                     new B()",
                )
                .unwrap();
            assert_eq!(instance.property_names().unwrap(), vec!["a", "b"]);
        });
    }

    #[test]
    fn test_call_construct_and_this() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let add = scope.eval("(a, b) => a + b").unwrap();
            assert_eq!(add.call((2, 3)).unwrap().to_i32().unwrap(), 5);

            let read_this = scope.eval("(function () { return this.value; })").unwrap();
            let receiver = scope.object().unwrap();
            receiver.set("value", "bound").unwrap();
            let seen = read_this.call_with_this(receiver, ()).unwrap();
            assert_eq!(seen.to_string().unwrap(), "bound");

            let point = scope
                .eval("(class Point { constructor(x, y) { this.x = x; this.y = y } })")
                .unwrap();
            let instance = point.construct((1, 2)).unwrap();
            assert_eq!(instance.get("y").unwrap().to_i32().unwrap(), 2);

            assert!(scope.int32(1).call(()).is_err());
        });
    }

    #[test]
    fn test_coercions_follow_script_rules() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            assert_eq!(scope.eval("'42'").unwrap().to_i32().unwrap(), 42);
            assert_eq!(scope.eval("-1").unwrap().to_u32().unwrap(), u32::MAX);
            assert!(!scope.eval("''").unwrap().to_bool().unwrap());
            assert_eq!(scope.eval("[1, 2]").unwrap().to_string().unwrap(), "1,2");
            assert_eq!(scope.eval("[1, 2, 3]").unwrap().len().unwrap(), 3);
        });
    }

    #[test]
    fn test_len_of_sparse_and_array_like_values() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let sparse = scope.eval("const a = []; a.length = 2 ** 32 - 1; a").unwrap();
            assert_eq!(sparse.len().unwrap(), u32::MAX as usize);

            let like = scope.eval("({ length: 2.5 })").unwrap();
            assert_eq!(like.len().unwrap(), 2);

            let huge = scope.eval("({ length: 2 ** 40 })").unwrap();
            assert!(matches!(huge.len(), Err(BridgeError::LengthExceeded { .. })));
            assert!(scope.eval("({})").unwrap().len().is_err());
        });
    }

    #[test]
    fn test_big_int_and_json() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let big = scope.eval("2n ** 80n").unwrap();
            let expected = num_bigint::BigInt::from(2u8).pow(80);
            assert_eq!(big.big_int().unwrap(), expected);

            let json = scope.eval("JSON.stringify({a:1,b:[1,2]})").unwrap();
            assert_eq!(json.to_string().unwrap(), r#"{"a":1,"b":[1,2]}"#);

            let object = scope.parse_json(r#"{"a":1,"b":[1,2]}"#).unwrap();
            assert_eq!(object.to_json_string().unwrap().unwrap(), r#"{"a":1,"b":[1,2]}"#);
            assert_eq!(scope.undefined().to_json_string().unwrap(), None);
            assert!(scope.parse_json("{broken").is_err());
        });
    }

    #[test]
    fn test_persistent_value_survives_scopes() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        let kept = context.with(|scope| scope.eval("({ kept: 'yes' })").unwrap().persist());
        context.with(|scope| {
            let value = kept.restore(&scope).unwrap();
            assert_eq!(value.get("kept").unwrap().to_string().unwrap(), "yes");
        });
        drop(kept);
    }
}
