//! Tether Scripting Bridge
//!
//! Host/script interop on top of an embedded QuickJS engine
//!
//! ## Architecture
//!
//! - **Runtime:** engine heap, limits and the callback registry ([`Runtime`])
//! - **Context:** one global environment, entered through a [`Scope`]
//! - **Values:** owned, scope-bound handles ([`Value`], [`Atom`])
//! - **Callbacks:** host closures reached through a single trampoline
//! - **Marshaling:** [`IntoValue`] / [`FromValue`], [`HostValue`], [`record!`]
//! - **Jobs:** promise continuations run only when the host pumps them
//!   ([`Context::execute_pending_job`])
//!
//! Timers, `fetch` and the event loop live in `tether_services`.

mod atom;
mod callback;
mod context;
mod error;
pub mod marshal;
mod promise;
mod runtime;
mod settings;
mod value;

pub use atom::Atom;
pub use callback::CallbackHandle;
pub use context::{Context, ContextId, JobStatus, Scope};
pub use error::{BridgeError, Result, ScriptError};
pub use marshal::{
    FromValue, HostFunction, HostValue, IntoArgs, IntoHostFunction, IntoValue, Record,
    ScriptFunction, MAX_DECODE_DEPTH, MAX_DECODE_LENGTH,
};
pub use promise::PromiseResolvers;
pub use runtime::Runtime;
pub use settings::RuntimeSettings;
pub use value::{PersistentValue, PropertyKey, Tag, Value};

pub use rquickjs;
pub use tether_metrics::{BridgeEvent, CounterSnapshot};
