//! Marshaling between host data and script values
//!
//! Conversion is type-directed and statically dispatched:
//!
//! - [`IntoValue`] encodes a host value into a [`Value`].
//! - [`FromValue`] decodes a [`Value`] into a declared host type.
//! - [`HostValue`] is the closed set of shapes a value can take when the
//!   host type is not known up front.
//! - [`HostFunction`] turns any `Fn(A, B, ..) -> R` into a script function.
//! - [`Record`] types (see [`record!`](crate::record)) encode to objects
//!   holding their exported fields and bound methods.

mod collection;
mod function;
mod host_value;
mod json;
mod primitive;
mod record;

pub use collection::MAX_DECODE_LENGTH;
pub use function::{HostFunction, IntoHostFunction, ScriptFunction};
pub use host_value::{HostValue, MAX_DECODE_DEPTH};
pub use record::Record;

use crate::context::Scope;
use crate::error::Result;
use crate::value::Value;

/// Encode a host value into the script world.
pub trait IntoValue<'js> {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>>;
}

/// Decode a script value into a host type.
pub trait FromValue<'js>: Sized {
    fn from_value(value: Value<'js>) -> Result<Self>;
}

/// An argument list for script calls.
pub trait IntoArgs<'js> {
    fn into_args(self, scope: &Scope<'js>) -> Result<Vec<Value<'js>>>;
}

impl<'js> IntoValue<'js> for Value<'js> {
    fn into_value(self, _scope: &Scope<'js>) -> Result<Value<'js>> {
        Ok(self)
    }
}

impl<'js> IntoValue<'js> for &Value<'js> {
    fn into_value(self, _scope: &Scope<'js>) -> Result<Value<'js>> {
        Ok(self.clone())
    }
}

impl<'js> FromValue<'js> for Value<'js> {
    fn from_value(value: Value<'js>) -> Result<Self> {
        Ok(value)
    }
}

impl<'js> IntoValue<'js> for crate::value::PersistentValue {
    fn into_value(self, scope: &Scope<'js>) -> Result<Value<'js>> {
        self.restore(scope)
    }
}

impl<'js> IntoArgs<'js> for () {
    fn into_args(self, _scope: &Scope<'js>) -> Result<Vec<Value<'js>>> {
        Ok(Vec::new())
    }
}

impl<'js, T: IntoValue<'js>> IntoArgs<'js> for Vec<T> {
    fn into_args(self, scope: &Scope<'js>) -> Result<Vec<Value<'js>>> {
        self.into_iter().map(|arg| arg.into_value(scope)).collect()
    }
}

macro_rules! impl_into_args {
    ($($arg:ident),+) => {
        impl<'js, $($arg: IntoValue<'js>,)+> IntoArgs<'js> for ($($arg,)+) {
            #[allow(non_snake_case)]
            fn into_args(self, scope: &Scope<'js>) -> Result<Vec<Value<'js>>> {
                let ($($arg,)+) = self;
                Ok(vec![$($arg.into_value(scope)?,)+])
            }
        }
    };
}

impl_into_args!(A);
impl_into_args!(A, B);
impl_into_args!(A, B, C);
impl_into_args!(A, B, C, D);
impl_into_args!(A, B, C, D, E);
impl_into_args!(A, B, C, D, E, F);
