//! Tether Services Layer
//!
//! Script-visible host services and the loop that drives them:
//!
//! - `setTimeout` / `clearTimeout` backed by tokio timers
//! - `fetch` over a pluggable [`FetchTransport`]
//! - `console` routed into `tracing`
//!
//! Background work never touches the engine. Timer and transport threads
//! post messages onto the [`EventLoop`] queue, and the thread that owns the
//! context performs every script call.

mod console;
pub mod error;
pub mod event_loop;
pub mod fetch;
pub mod settings;
pub mod timers;

pub use error::ServiceError;
pub use event_loop::{EventLoop, LoopHandle};
pub use fetch::{FetchRequest, FetchResponse, FetchTransport, UnavailableTransport};
pub use settings::{ServiceSettings, Settings};
pub use timers::{TimerId, Timers};
