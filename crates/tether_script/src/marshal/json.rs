//! `serde_json::Value` interop
//!
//! Encoding walks the JSON tree directly so integers keep the int tag.
//! Decoding goes through the engine's `JSON.stringify`, which gives script
//! semantics for free: `undefined` and function properties are dropped,
//! `toJSON` is honored and BigInts are rejected with a `TypeError`.

use super::{FromValue, IntoValue};
use crate::context::Scope;
use crate::error::{BridgeError, Result};
use crate::value::Value;

impl<'js> IntoValue<'js> for serde_json::Value {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        match self {
            serde_json::Value::Null => Ok(scope.null()),
            serde_json::Value::Bool(b) => Ok(scope.bool(b)),
            serde_json::Value::Number(number) => {
                if let Some(n) = number.as_i64() {
                    Ok(scope.int64(n))
                } else {
                    Ok(scope.float64(number.as_f64().unwrap_or(f64::NAN)))
                }
            }
            serde_json::Value::String(text) => scope.string(&text),
            serde_json::Value::Array(items) => items.into_value(scope),
            serde_json::Value::Object(entries) => {
                let object = scope.object()?;
                for (key, value) in entries {
                    object.set(key, value)?;
                }
                Ok(object)
            }
        }
    }
}

/// A value with no JSON form (`undefined`, a bare function) decodes as `null`.
impl<'js> FromValue<'js> for serde_json::Value {
    fn from_value(value: Value<'js>) -> Result<Self> {
        match value.to_json_string()? {
            Some(text) => serde_json::from_str(&text)
                .map_err(|err| BridgeError::Host(format!("malformed JSON from engine: {err}"))),
            None => Ok(serde_json::Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Runtime;
    use serde_json::json;

    #[test]
    fn test_json_from_script_object() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let value = scope
                .eval("({ a: 1, b: [1, 2], skip: undefined, f() {} })")
                .unwrap();
            let decoded = serde_json::Value::from_value(value).unwrap();
            assert_eq!(decoded, json!({ "a": 1, "b": [1, 2] }));
            assert_eq!(
                serde_json::Value::from_value(scope.undefined()).unwrap(),
                serde_json::Value::Null
            );
        });
    }

    #[test]
    fn test_json_into_script() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let config = json!({ "name": "tether", "limits": { "stack": 262144 }, "ratio": 0.5 });
            scope.set_global("config", config).unwrap();
            let stack = scope.eval("config.limits.stack").unwrap();
            assert!(stack.is_number());
            assert_eq!(stack.to_i64().unwrap(), 262144);
            assert_eq!(scope.eval("config.ratio * 2").unwrap().to_f64().unwrap(), 1.0);
        });
    }

    #[test]
    fn test_big_int_has_no_json_form() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let err = serde_json::Value::from_value(scope.eval("({ n: 1n })").unwrap()).unwrap_err();
            assert_eq!(err.script().unwrap().name.as_deref(), Some("TypeError"));
        });
    }
}
