//! Sequences, maps and optional values
//!
//! Sequences become arrays through positional index sets, so order and
//! length survive a round trip. String-keyed maps become plain objects with
//! one property per entry; on the way back, properties holding `undefined`
//! are left out.

use super::{FromValue, IntoValue};
use crate::context::Scope;
use crate::error::{BridgeError, Result};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

impl<'js, T: IntoValue<'js>> IntoValue<'js> for Option<T> {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        match self {
            Some(value) => value.into_value(scope),
            None => Ok(scope.undefined()),
        }
    }
}

/// `null`, `undefined` and uninitialized all read as `None`.
impl<'js, T: FromValue<'js>> FromValue<'js> for Option<T> {
    fn from_value(value: Value<'js>) -> Result<Self> {
        if value.is_absent() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

// ============================================================================
// Sequences
// ============================================================================

pub(crate) fn encode_sequence<'js, I>(scope: &Scope<'js>, items: I) -> Result<Value<'js>>
where
    I: IntoIterator,
    I::Item: IntoValue<'js>,
{
    let array = scope.array()?;
    for (index, item) in items.into_iter().enumerate() {
        array.set(index as u32, item)?;
    }
    Ok(array)
}

/// Longest array decoded into a host sequence.
///
/// A sparse script array can claim a huge length at almost no cost, so the
/// host side refuses to materialize anything larger.
pub const MAX_DECODE_LENGTH: usize = 1 << 24;

/// Capacity reserved up front; longer sequences grow as they are read.
const PREALLOCATE_LIMIT: usize = 1024;

/// Length of `value` checked against [`MAX_DECODE_LENGTH`], plus a safe
/// initial capacity.
pub(crate) fn sequence_len(value: &Value<'_>) -> Result<(usize, usize)> {
    let len = value.len()?;
    if len > MAX_DECODE_LENGTH {
        return Err(BridgeError::LengthExceeded {
            length: len as u64,
            limit: MAX_DECODE_LENGTH as u64,
        });
    }
    Ok((len, len.min(PREALLOCATE_LIMIT)))
}

pub(crate) fn decode_sequence<'js, T: FromValue<'js>>(value: &Value<'js>) -> Result<Vec<T>> {
    if !value.is_array() {
        return Err(BridgeError::mismatch("array", value.tag().name()));
    }
    let (len, capacity) = sequence_len(value)?;
    let mut items = Vec::with_capacity(capacity);
    for index in 0..len {
        items.push(T::from_value(value.get(index as u32)?)?);
    }
    Ok(items)
}

impl<'js, T: IntoValue<'js>> IntoValue<'js> for Vec<T> {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        encode_sequence(scope, self)
    }
}

impl<'js, T> IntoValue<'js> for &[T]
where
    T: Clone + IntoValue<'js>,
{
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        encode_sequence(scope, self.iter().cloned())
    }
}

impl<'js, T: IntoValue<'js>, const N: usize> IntoValue<'js> for [T; N] {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        encode_sequence(scope, self)
    }
}

impl<'js, T: FromValue<'js>> FromValue<'js> for Vec<T> {
    fn from_value(value: Value<'js>) -> Result<Self> {
        decode_sequence(&value)
    }
}

// ============================================================================
// Maps
// ============================================================================

fn encode_entries<'js, K, V, I>(scope: &Scope<'js>, entries: I) -> Result<Value<'js>>
where
    K: AsRef<str>,
    V: IntoValue<'js>,
    I: IntoIterator<Item = (K, V)>,
{
    let object = scope.object()?;
    for (key, value) in entries {
        object.set(key.as_ref(), value)?;
    }
    Ok(object)
}

/// Own enumerable entries of an object, skipping `undefined` values.
pub(crate) fn decode_entries<'js, T: FromValue<'js>>(
    value: &Value<'js>,
) -> Result<Vec<(String, T)>> {
    if !value.is_object() {
        return Err(BridgeError::mismatch("object", value.tag().name()));
    }
    let mut entries = Vec::new();
    for name in value.property_names()? {
        let property = value.get(&name)?;
        if property.is_undefined() {
            continue;
        }
        entries.push((name, T::from_value(property)?));
    }
    Ok(entries)
}

impl<'js, K, V, S> IntoValue<'js> for HashMap<K, V, S>
where
    K: AsRef<str>,
    V: IntoValue<'js>,
{
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        encode_entries(scope, self)
    }
}

impl<'js, K: AsRef<str>, V: IntoValue<'js>> IntoValue<'js> for BTreeMap<K, V> {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        encode_entries(scope, self)
    }
}

impl<'js, K, V, S> FromValue<'js> for HashMap<K, V, S>
where
    K: From<String> + Eq + Hash,
    V: FromValue<'js>,
    S: BuildHasher + Default,
{
    fn from_value(value: Value<'js>) -> Result<Self> {
        Ok(decode_entries::<V>(&value)?
            .into_iter()
            .map(|(key, value)| (K::from(key), value))
            .collect())
    }
}

impl<'js, K, V> FromValue<'js> for BTreeMap<K, V>
where
    K: From<String> + Ord,
    V: FromValue<'js>,
{
    fn from_value(value: Value<'js>) -> Result<Self> {
        Ok(decode_entries::<V>(&value)?
            .into_iter()
            .map(|(key, value)| (K::from(key), value))
            .collect())
    }
}

// ============================================================================
// Tuples (multiple results)
// ============================================================================

macro_rules! impl_tuple {
    ($len:literal => $($item:ident $index:literal),+) => {
        /// Encoded as an ordered array, like a multi-value return.
        impl<'js, $($item: IntoValue<'js>,)+> IntoValue<'js> for ($($item,)+) {
            #[allow(non_snake_case)]
            fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
                let ($($item,)+) = self;
                let array = scope.array()?;
                $(array.set($index as u32, $item)?;)+
                Ok(array)
            }
        }

        impl<'js, $($item: FromValue<'js>,)+> FromValue<'js> for ($($item,)+) {
            fn from_value(value: Value<'js>) -> Result<Self> {
                if !value.is_array() {
                    return Err(BridgeError::mismatch("array", value.tag().name()));
                }
                if value.len()? < $len {
                    return Err(BridgeError::mismatch(concat!("array of ", $len), "shorter array"));
                }
                Ok(($($item::from_value(value.get($index as u32)?)?,)+))
            }
        }
    };
}

impl_tuple!(2 => A 0, B 1);
impl_tuple!(3 => A 0, B 1, C 2);
impl_tuple!(4 => A 0, B 1, C 2, D 3);
impl_tuple!(5 => A 0, B 1, C 2, D 3, E 4);
impl_tuple!(6 => A 0, B 1, C 2, D 3, E 4, F 5);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HostFunction, Runtime};

    #[test]
    fn test_sequence_preserves_order_and_length() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let items = vec![3, 1, 4, 1, 5, 9, 2, 6];
            let array = items.clone().into_value(&scope).unwrap();
            assert!(array.is_array());
            assert_eq!(array.len().unwrap(), items.len());
            assert_eq!(array.get(2u32).unwrap().to_i32().unwrap(), 4);
            assert_eq!(Vec::<i32>::from_value(array).unwrap(), items);

            let empty: Vec<String> = Vec::new();
            let array = empty.into_value(&scope).unwrap();
            assert!(Vec::<String>::from_value(array).unwrap().is_empty());
        });
    }

    #[test]
    fn test_nested_sequences_and_slices() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let grid = vec![vec!["a", "b"], vec!["c"]];
            let value = grid.into_value(&scope).unwrap();
            scope.set_global("grid", value).unwrap();
            let flat: String = scope.eval("grid.flat().join('')").unwrap().decode().unwrap();
            assert_eq!(flat, "abc");

            let slice: &[f64] = &[0.5, 1.5];
            let value = slice.into_value(&scope).unwrap();
            assert_eq!(Vec::<f64>::from_value(value).unwrap(), vec![0.5, 1.5]);
        });
    }

    #[test]
    fn test_maps_skip_undefined_properties() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let object = scope.eval("({ a: 1, gone: undefined, b: 2 })").unwrap();
            let map: BTreeMap<String, i32> = object.decode().unwrap();
            assert_eq!(map.len(), 2);
            assert_eq!(map["b"], 2);

            let mut host = HashMap::new();
            host.insert("x".to_string(), 1.5);
            host.insert("y".to_string(), -2.0);
            let value = host.clone().into_value(&scope).unwrap();
            assert_eq!(value.property_names().unwrap().len(), 2);
            let back: HashMap<String, f64> = value.decode().unwrap();
            assert_eq!(back, host);
        });
    }

    #[test]
    fn test_option_and_tuples() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            assert!(None::<i32>.into_value(&scope).unwrap().is_undefined());
            assert_eq!(Option::<i32>::from_value(scope.null()).unwrap(), None);
            assert_eq!(Option::<i32>::from_value(scope.int32(4)).unwrap(), Some(4));

            let pair = (1, "two").into_value(&scope).unwrap();
            assert_eq!(pair.to_json_string().unwrap().unwrap(), r#"[1,"two"]"#);
            let (n, s): (i32, String) = pair.decode().unwrap();
            assert_eq!((n, s.as_str()), (1, "two"));
            assert!(<(i32, i32, i32)>::from_value(scope.eval("[1, 2]").unwrap()).is_err());
        });
    }

    #[test]
    fn test_sparse_array_length_is_bounded() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let sparse = scope.eval("const a = []; a.length = 2 ** 31 - 1; a").unwrap();
            let err = Vec::<Option<i32>>::from_value(sparse).unwrap_err();
            assert!(matches!(
                err,
                BridgeError::LengthExceeded { limit, .. } if limit == MAX_DECODE_LENGTH as u64
            ));

            let holes: Vec<Option<i32>> = scope.eval("[, , 3]").unwrap().decode().unwrap();
            assert_eq!(holes, vec![None, None, Some(3)]);

            let count = HostFunction::new(|items: Vec<Option<i32>>| items.len());
            scope.set_global("count", count).unwrap();
            let outcome: String = scope
                .eval(
                    "const b = []; b.length = 2 ** 32 - 1; \
                     try { String(count(b)); } catch (e) { e.name; }",
                )
                .unwrap()
                .decode()
                .unwrap();
            assert_eq!(outcome, "RangeError");
        });
    }
}
