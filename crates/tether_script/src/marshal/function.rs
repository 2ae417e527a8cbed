//! Typed host functions and script function wrappers

use super::{FromValue, HostValue, IntoArgs, IntoValue};
use crate::callback::{self, Callback};
use crate::context::Scope;
use crate::error::{BridgeError, Result};
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// A host callable that can be handed to scripts.
///
/// Built from any `Fn(A1, .., An) -> R` (n up to 6) whose parameters decode
/// with [`FromValue`] and whose result encodes with [`IntoValue`]. Each
/// encode registers a fresh script function in the callback registry.
#[derive(Clone)]
pub struct HostFunction {
    arity: usize,
    callback: Callback,
}

impl HostFunction {
    pub fn new<F, Marker>(function: F) -> Self
    where
        F: IntoHostFunction<Marker>,
    {
        function.into_host_function()
    }

    /// Wrap a closure that works on raw `this` and arguments.
    pub fn from_raw<F>(arity: usize, function: F) -> Self
    where
        F: for<'js> Fn(&Scope<'js>, Value<'js>, Vec<Value<'js>>) -> Result<Value<'js>> + 'static,
    {
        Self {
            arity,
            callback: Rc::new(function),
        }
    }

    /// Declared parameter count; calls with fewer arguments throw.
    pub fn arity(&self) -> usize {
        self.arity
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl<'js> IntoValue<'js> for HostFunction {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        callback::register(scope, self.callback).map(|(_, function)| function)
    }
}

/// Conversion of plain Rust callables into [`HostFunction`].
///
/// `Marker` only disambiguates the blanket impls per arity.
pub trait IntoHostFunction<Marker> {
    fn into_host_function(self) -> HostFunction;
}

impl IntoHostFunction<()> for HostFunction {
    fn into_host_function(self) -> HostFunction {
        self
    }
}

fn check_arity(required: usize, received: usize) -> Result<()> {
    if received < required {
        return Err(BridgeError::InsufficientArguments { required, received });
    }
    Ok(())
}

macro_rules! impl_into_host_function {
    ($arity:literal $(; $($arg:ident $name:ident),+)?) => {
        impl<Func, Ret $($(, $arg)+)?> IntoHostFunction<fn($($($arg,)+)?) -> Ret> for Func
        where
            Func: Fn($($($arg),+)?) -> Ret + 'static,
            Ret: for<'js> IntoValue<'js>,
            $($($arg: for<'js> FromValue<'js>,)+)?
        {
            fn into_host_function(self) -> HostFunction {
                HostFunction::from_raw($arity, move |scope, _this, args| {
                    check_arity($arity, args.len())?;
                    #[allow(unused_mut, unused_variables)]
                    let mut args = args.into_iter();
                    $($(
                        let $name = $arg::from_value(
                            args.next().unwrap_or_else(|| scope.undefined()),
                        )?;
                    )+)?
                    (self)($($($name),+)?).into_value(scope)
                })
            }
        }
    };
}

impl_into_host_function!(0);
impl_into_host_function!(1; A a);
impl_into_host_function!(2; A a, B b);
impl_into_host_function!(3; A a, B b, C c);
impl_into_host_function!(4; A a, B b, C c, D d);
impl_into_host_function!(5; A a, B b, C c, D d, E e);
impl_into_host_function!(6; A a, B b, C c, D d, E e, F f);

// ============================================================================
// Script functions seen from the host
// ============================================================================

/// A script function held by the host.
#[derive(Clone)]
pub struct ScriptFunction<'js> {
    function: Value<'js>,
}

impl<'js> ScriptFunction<'js> {
    pub fn new(function: Value<'js>) -> Result<Self> {
        if !function.is_function() {
            return Err(BridgeError::mismatch("function", function.tag().name()));
        }
        Ok(Self { function })
    }

    /// Call with encoded `args` and decode the result dynamically.
    ///
    /// A script exception comes back as [`BridgeError::Script`].
    pub fn call<A: IntoArgs<'js>>(&self, args: A) -> Result<HostValue<'js>> {
        self.invoke(args)
    }

    /// Call and decode the result into `R`.
    pub fn invoke<A, R>(&self, args: A) -> Result<R>
    where
        A: IntoArgs<'js>,
        R: FromValue<'js>,
    {
        self.function.call(args).and_then(R::from_value)
    }

    pub fn as_value(&self) -> &Value<'js> {
        &self.function
    }

    pub fn into_inner(self) -> Value<'js> {
        self.function
    }
}

impl fmt::Debug for ScriptFunction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScriptFunction")
    }
}

impl<'js> IntoValue<'js> for ScriptFunction<'js> {
    fn into_value(self, _scope: &Scope<'js>) -> Result<Value<'js>> {
        Ok(self.function)
    }
}

impl<'js> FromValue<'js> for ScriptFunction<'js> {
    fn from_value(value: Value<'js>) -> Result<Self> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Runtime;

    #[test]
    fn test_typed_function_called_from_script() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let add = HostFunction::new(|a: i64, b: i64| a + b);
            assert_eq!(add.arity(), 2);
            scope.set_global("add", add).unwrap();
            let sum: i64 = scope.eval("add(1, 41)").unwrap().decode().unwrap();
            assert_eq!(sum, 42);
        });
    }

    #[test]
    fn test_too_few_arguments_throw_type_error() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            scope
                .set_global("add", HostFunction::new(|a: i64, b: i64| a + b))
                .unwrap();
            let err = scope.eval("add(1)").unwrap_err();
            let script = err.script().unwrap();
            assert_eq!(script.name.as_deref(), Some("TypeError"));
            assert!(script.message.starts_with("insufficient arguments"));

            let caught: String = scope
                .eval("try { add() } catch (e) { e.constructor.name }")
                .unwrap()
                .decode()
                .unwrap();
            assert_eq!(caught, "TypeError");
        });
    }

    #[test]
    fn test_result_shapes() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            scope.set_global("nothing", HostFunction::new(|| ())).unwrap();
            scope
                .set_global("split", HostFunction::new(|n: i32| (n / 2, n % 2)))
                .unwrap();
            scope
                .set_global(
                    "parse",
                    HostFunction::new(|text: String| text.parse::<i32>()),
                )
                .unwrap();

            assert!(scope.eval("nothing()").unwrap().is_undefined());
            let pair = scope.eval("split(7)").unwrap();
            assert_eq!(pair.to_json_string().unwrap().unwrap(), "[3,1]");
            assert_eq!(scope.eval("parse('12')").unwrap().to_i32().unwrap(), 12);
            let err = scope.eval("parse('twelve')").unwrap_err();
            assert_eq!(err.script().unwrap().name.as_deref(), Some("Error"));
        });
    }

    #[test]
    fn test_wrong_argument_type_is_type_error() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            scope
                .set_global("shout", HostFunction::new(|text: String| text.to_uppercase()))
                .unwrap();
            assert_eq!(scope.eval("shout('hi')").unwrap().to_string().unwrap(), "HI");
            let err = scope.eval("shout(5)").unwrap_err();
            assert_eq!(err.script().unwrap().name.as_deref(), Some("TypeError"));
        });
    }

    #[test]
    fn test_script_function_from_host() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let join: ScriptFunction = scope
                .eval("(a, b) => `${a}-${b}`")
                .unwrap()
                .decode()
                .unwrap();
            let joined: String = join.invoke(("x", 2)).unwrap();
            assert_eq!(joined, "x-2");
            assert!(matches!(join.call(("a", "b")).unwrap(), HostValue::String(s) if s == "a-b"));

            let boom: ScriptFunction = scope
                .eval("() => { throw new RangeError('nope') }")
                .unwrap()
                .decode()
                .unwrap();
            let err = boom.call(()).unwrap_err();
            assert_eq!(err.to_string(), "RangeError: nope");

            assert!(ScriptFunction::new(scope.int32(1)).is_err());
        });
    }
}
