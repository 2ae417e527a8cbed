//! Scalar conversions
//!
//! Encoding picks the narrowest script representation: 32-bit signed and
//! unsigned integers keep the int tag where they fit, `i64` falls back to a
//! double up to 2^53 and to a BigInt beyond it, and `u64` always becomes a
//! BigInt so no bits are lost. Decoding accepts numbers (and BigInts, preferred over any float
//! reading) for numeric targets and rejects every other tag.

use super::{FromValue, IntoValue};
use crate::context::Scope;
use crate::error::{BridgeError, Result, ScriptError};
use crate::value::{Tag, Value};

impl<'js> IntoValue<'js> for () {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        Ok(scope.undefined())
    }
}

/// Accepts anything; used for calls whose result is ignored.
impl<'js> FromValue<'js> for () {
    fn from_value(_value: Value<'js>) -> Result<Self> {
        Ok(())
    }
}

impl<'js> IntoValue<'js> for bool {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        Ok(scope.bool(self))
    }
}

impl<'js> FromValue<'js> for bool {
    fn from_value(value: Value<'js>) -> Result<Self> {
        match value.as_raw().as_bool() {
            Some(flag) => Ok(flag),
            None => Err(BridgeError::mismatch("bool", value.tag().name())),
        }
    }
}

// ============================================================================
// Integers
// ============================================================================

macro_rules! impl_int32 {
    ($($ty:ty),*) => {$(
        impl<'js> IntoValue<'js> for $ty {
            fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
                Ok(scope.int32(i32::from(self)))
            }
        }
    )*};
}

macro_rules! impl_uint32 {
    ($($ty:ty),*) => {$(
        impl<'js> IntoValue<'js> for $ty {
            fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
                Ok(scope.uint32(u32::from(self)))
            }
        }
    )*};
}

impl_int32!(i8, i16, i32);
impl_uint32!(u8, u16, u32);

/// Largest integer a double represents exactly.
const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Plain numbers while exactly representable, BigInt beyond that.
fn encode_i64<'js>(scope: &Scope<'js>, value: i64) -> Result<Value<'js>> {
    if (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&value) {
        Ok(scope.int64(value))
    } else {
        scope.big_int64(value)
    }
}

impl<'js> IntoValue<'js> for i64 {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        encode_i64(scope, self)
    }
}

impl<'js> IntoValue<'js> for isize {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        encode_i64(scope, self as i64)
    }
}

impl<'js> IntoValue<'js> for u64 {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        scope.big_uint64(self)
    }
}

/// Sizes and counts stay plain numbers while they are exactly representable.
impl<'js> IntoValue<'js> for usize {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        if self <= MAX_SAFE_INTEGER as usize {
            Ok(scope.int64(self as i64))
        } else {
            scope.big_uint64(self as u64)
        }
    }
}

/// Read an integer from a number (truncating) or an exact BigInt.
///
/// Doubles outside the `i64` range, and NaN or infinities, are rejected
/// rather than wrapped.
fn decode_i64(value: &Value<'_>, target: &'static str) -> Result<i64> {
    // 2^63 is exact as a double; i64::MAX is not.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    match value.tag() {
        Tag::Int => value.to_i64(),
        Tag::Float => {
            let number = value.to_f64()?.trunc();
            if !number.is_finite() || number < -LIMIT || number >= LIMIT {
                return Err(BridgeError::mismatch(target, "out-of-range number"));
            }
            Ok(number as i64)
        }
        Tag::BigInt => i64::try_from(value.big_int()?)
            .map_err(|_| BridgeError::mismatch(target, "out-of-range bigint")),
        other => Err(BridgeError::mismatch(target, other.name())),
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {$(
        impl<'js> FromValue<'js> for $ty {
            fn from_value(value: Value<'js>) -> Result<Self> {
                if let Some(small) = value.as_raw().as_int() {
                    return <$ty>::try_from(small)
                        .map_err(|_| BridgeError::mismatch(stringify!($ty), "out-of-range number"));
                }
                let wide = decode_i64(&value, stringify!($ty))?;
                <$ty>::try_from(wide)
                    .map_err(|_| BridgeError::mismatch(stringify!($ty), "out-of-range number"))
            }
        }
    )*};
}

impl_from_int!(i8, i16, i32, isize, u8, u16, u32, usize);

impl<'js> FromValue<'js> for i64 {
    fn from_value(value: Value<'js>) -> Result<Self> {
        decode_i64(&value, "i64")
    }
}

impl<'js> FromValue<'js> for u64 {
    fn from_value(value: Value<'js>) -> Result<Self> {
        match value.tag() {
            Tag::BigInt => u64::try_from(value.big_int()?)
                .map_err(|_| BridgeError::mismatch("u64", "out-of-range bigint")),
            _ => u64::try_from(decode_i64(&value, "u64")?)
                .map_err(|_| BridgeError::mismatch("u64", "negative number")),
        }
    }
}

// ============================================================================
// Floats
// ============================================================================

impl<'js> IntoValue<'js> for f64 {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        Ok(scope.float64(self))
    }
}

impl<'js> IntoValue<'js> for f32 {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        Ok(scope.float64(f64::from(self)))
    }
}

impl<'js> FromValue<'js> for f64 {
    fn from_value(value: Value<'js>) -> Result<Self> {
        match value.tag() {
            Tag::Int | Tag::Float => value.to_f64(),
            Tag::BigInt => value
                .big_int()?
                .to_string()
                .parse::<f64>()
                .map_err(|_| BridgeError::mismatch("f64", "bigint")),
            other => Err(BridgeError::mismatch("f64", other.name())),
        }
    }
}

impl<'js> FromValue<'js> for f32 {
    fn from_value(value: Value<'js>) -> Result<Self> {
        f64::from_value(value).map(|n| n as f32)
    }
}

// ============================================================================
// Big integers
// ============================================================================

impl<'js> IntoValue<'js> for num_bigint::BigInt {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        if let Ok(small) = i64::try_from(&self) {
            return scope.big_int64(small);
        }
        scope.global("BigInt")?.call((self.to_string(),))
    }
}

impl<'js> FromValue<'js> for num_bigint::BigInt {
    fn from_value(value: Value<'js>) -> Result<Self> {
        match value.tag() {
            Tag::BigInt => value.big_int(),
            Tag::Int => Ok(num_bigint::BigInt::from(value.to_i64()?)),
            Tag::Float => {
                let n = value.to_f64()?;
                if n.fract() != 0.0 || !n.is_finite() {
                    return Err(BridgeError::mismatch("integer", "fractional number"));
                }
                format!("{n:.0}")
                    .parse()
                    .map_err(|_| BridgeError::mismatch("integer", "number"))
            }
            other => Err(BridgeError::mismatch("bigint", other.name())),
        }
    }
}

// ============================================================================
// Strings
// ============================================================================

impl<'js> IntoValue<'js> for &str {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        scope.string(self)
    }
}

impl<'js> IntoValue<'js> for String {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        scope.string(&self)
    }
}

impl<'js> IntoValue<'js> for &String {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        scope.string(self)
    }
}

impl<'js> IntoValue<'js> for char {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        scope.string(self.encode_utf8(&mut [0; 4]))
    }
}

impl<'js> FromValue<'js> for String {
    fn from_value(value: Value<'js>) -> Result<Self> {
        if !value.is_string() {
            return Err(BridgeError::mismatch("string", value.tag().name()));
        }
        value.to_string()
    }
}

impl<'js> FromValue<'js> for char {
    fn from_value(value: Value<'js>) -> Result<Self> {
        let text = String::from_value(value)?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(BridgeError::mismatch("single character", "string")),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

impl<'js> IntoValue<'js> for ScriptError {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        scope.error_value(&self)
    }
}

impl<'js> FromValue<'js> for ScriptError {
    fn from_value(value: Value<'js>) -> Result<Self> {
        value
            .as_error()
            .ok_or_else(|| BridgeError::mismatch("error", value.tag().name()))
    }
}

/// `Err` results throw an `Error` carrying the error's message.
impl<'js, T, E> IntoValue<'js> for std::result::Result<T, E>
where
    T: IntoValue<'js>,
    E: std::fmt::Display,
{
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        match self {
            Ok(value) => value.into_value(scope),
            Err(err) => Err(BridgeError::Host(err.to_string())),
        }
    }
}
