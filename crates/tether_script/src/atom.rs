//! Interned property keys

use crate::context::{Capture, Scope};
use crate::error::Result;
use crate::value::Value;
use std::fmt;

/// An interned string used for property lookups.
///
/// Holds one engine reference, released on drop.
#[derive(Clone)]
pub struct Atom<'js> {
    scope: Scope<'js>,
    raw: rquickjs::Atom<'js>,
}

impl<'js> Atom<'js> {
    pub(crate) fn from_raw(scope: Scope<'js>, raw: rquickjs::Atom<'js>) -> Self {
        Self { scope, raw }
    }

    pub(crate) fn from_index(scope: &Scope<'js>, index: u32) -> Result<Self> {
        let raw = rquickjs::Atom::from_u32(scope.ctx().clone(), index).capture(scope)?;
        Ok(Self::from_raw(scope.clone(), raw))
    }

    /// Intern a value (string, number or symbol) as a key.
    pub fn from_value(value: &Value<'js>) -> Result<Self> {
        let scope = value.scope();
        let raw = rquickjs::Atom::from_value(scope.ctx().clone(), value.as_raw()).capture(scope)?;
        Ok(Self::from_raw(scope.clone(), raw))
    }

    pub fn to_string(&self) -> Result<String> {
        self.raw.to_string().capture(&self.scope)
    }

    pub fn to_value(&self) -> Result<Value<'js>> {
        let raw = self.raw.to_value().capture(&self.scope)?;
        Ok(Value::from_raw(self.scope.clone(), raw))
    }

    pub(crate) fn into_raw(self) -> rquickjs::Atom<'js> {
        self.raw
    }
}

impl fmt::Debug for Atom<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_string() {
            Ok(name) => write!(f, "Atom({name:?})"),
            Err(_) => f.write_str("Atom(?)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Runtime;

    #[test]
    fn test_atom_round_trips() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let atom = scope.atom("speed").unwrap();
            assert_eq!(atom.to_string().unwrap(), "speed");
            assert_eq!(atom.to_value().unwrap().to_string().unwrap(), "speed");

            let from_number = Atom::from_value(&scope.int32(7)).unwrap();
            assert_eq!(from_number.to_string().unwrap(), "7");
        });
    }

    #[test]
    fn test_property_atoms_match_names() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let object = scope.eval("({ x: 1, y: 2 })").unwrap();
            let names: Vec<String> = object
                .property_atoms()
                .unwrap()
                .iter()
                .map(|atom| atom.to_string().unwrap())
                .collect();
            assert_eq!(names, vec!["x", "y"]);
        });
    }
}
