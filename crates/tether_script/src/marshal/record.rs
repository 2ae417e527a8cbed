//! Struct-like host records
//!
//! A record is an ordinary Rust struct registered with [`record!`]. Only the
//! fields listed in the macro are exported; each may be renamed with
//! `field => "name"`. Listed methods become bound script functions that
//! close over a copy of the record.
//!
//! ```ignore
//! #[derive(Clone, Default)]
//! struct Player {
//!     name: String,
//!     score: i64,
//!     token: String,
//! }
//!
//! impl Player {
//!     fn greet(&self, other: String) -> String {
//!         format!("{} greets {other}", self.name)
//!     }
//! }
//!
//! tether_script::record!(Player {
//!     name => "displayName",
//!     score,
//! } methods {
//!     greet(other: String),
//! });
//! ```
//!
//! Decoding starts from `Default` and fills every exported field from the
//! property of the same (renamed) name; a missing property decodes as
//! `undefined`, so `Option` fields become `None` and required ones fail.

/// A host type with a fixed script-facing shape.
pub trait Record: Clone + Default + 'static {
    /// Property names of the exported fields, in declaration order.
    const FIELDS: &'static [&'static str];
    /// Property names of the exported methods.
    const METHODS: &'static [&'static str];
}

/// Implement [`Record`], `IntoValue` and `FromValue` for a struct.
#[macro_export]
macro_rules! record {
    (
        $ty:ident {
            $($field:ident $(=> $rename:literal)?),* $(,)?
        }
        $(methods {
            $($method:ident($($arg:ident : $arg_ty:ty),* $(,)?)),* $(,)?
        })?
    ) => {
        impl $crate::Record for $ty {
            const FIELDS: &'static [&'static str] = &[$($crate::__record_key!($field $($rename)?)),*];
            const METHODS: &'static [&'static str] = &[$($(stringify!($method)),*)?];
        }

        impl<'js> $crate::IntoValue<'js> for $ty {
            fn into_value(
                self,
                scope: &$crate::Scope<'js>,
            ) -> $crate::Result<$crate::Value<'js>> {
                let object = scope.object()?;
                $(
                    object.set(
                        $crate::__record_key!($field $($rename)?),
                        ::std::clone::Clone::clone(&self.$field),
                    )?;
                )*
                $($(
                    let receiver = ::std::clone::Clone::clone(&self);
                    object.set(
                        stringify!($method),
                        $crate::HostFunction::new(move |$($arg: $arg_ty),*| receiver.$method($($arg),*)),
                    )?;
                )*)?
                Ok(object)
            }
        }

        impl<'js> $crate::FromValue<'js> for $ty {
            fn from_value(value: $crate::Value<'js>) -> $crate::Result<Self> {
                if !value.is_object() {
                    return Err($crate::BridgeError::mismatch(
                        stringify!($ty),
                        value.tag().name(),
                    ));
                }
                #[allow(unused_mut)]
                let mut record = <$ty as ::std::default::Default>::default();
                $(
                    record.$field = $crate::FromValue::from_value(
                        value.get($crate::__record_key!($field $($rename)?))?,
                    )?;
                )*
                Ok(record)
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __record_key {
    ($field:ident) => {
        stringify!($field)
    };
    ($field:ident $rename:literal) => {
        $rename
    };
}

#[cfg(test)]
mod tests {
    use super::Record;
    use crate::marshal::{FromValue, IntoValue};
    use crate::Runtime;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Player {
        name: String,
        score: i64,
        tags: Vec<String>,
        nickname: Option<String>,
        token: String,
    }

    impl Player {
        fn greet(&self, other: String) -> String {
            format!("{} greets {other}", self.name)
        }

        fn doubled(&self) -> i64 {
            self.score * 2
        }
    }

    crate::record!(Player {
        name => "displayName",
        score,
        tags,
        nickname,
    } methods {
        greet(other: String),
        doubled(),
    });

    fn sample() -> Player {
        Player {
            name: "ada".into(),
            score: 21,
            tags: vec!["red".into()],
            nickname: None,
            token: "do not export".into(),
        }
    }

    #[test]
    fn test_exported_fields_and_methods_only() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let object = sample().into_value(&scope).unwrap();
            let names = object.property_names().unwrap();
            assert_eq!(names.len(), Player::FIELDS.len() + Player::METHODS.len());
            assert_eq!(
                names,
                vec!["displayName", "score", "tags", "nickname", "greet", "doubled"]
            );

            assert!(object.get("token").unwrap().is_undefined());
            assert!(object.get("name").unwrap().is_undefined());
            assert_eq!(object.get("displayName").unwrap().to_string().unwrap(), "ada");
        });
    }

    #[test]
    fn test_methods_are_bound() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            scope.set_global("player", sample()).unwrap();
            let greeting: String = scope.eval("player.greet('bob')").unwrap().decode().unwrap();
            assert_eq!(greeting, "ada greets bob");

            let detached: i64 = scope
                .eval("const d = player.doubled; d()")
                .unwrap()
                .decode()
                .unwrap();
            assert_eq!(detached, 42);

            let err = scope.eval("player.greet()").unwrap_err();
            assert_eq!(err.script().unwrap().name.as_deref(), Some("TypeError"));
        });
    }

    #[test]
    fn test_decode_from_script_object() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let value = scope
                .eval("({ displayName: 'grace', score: 7, tags: ['a', 'b'], token: 'ignored' })")
                .unwrap();
            let player = Player::from_value(value).unwrap();
            assert_eq!(
                player,
                Player {
                    name: "grace".into(),
                    score: 7,
                    tags: vec!["a".into(), "b".into()],
                    nickname: None,
                    token: String::new(),
                }
            );

            let missing = scope.eval("({ score: 1, tags: [] })").unwrap();
            assert!(Player::from_value(missing).is_err());
            assert!(Player::from_value(scope.int32(3)).is_err());
        });
    }
}
