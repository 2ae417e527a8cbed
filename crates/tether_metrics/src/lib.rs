//! Tether Metrics - counters for host/script bridge activity
//!
//! Provides zero-cost counters that completely vanish in production builds
//! via feature flags.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable counter collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use tether_metrics::{BridgeEvent, Counter};
//!
//! let counter = Counter::new();
//! counter.increment(BridgeEvent::TrampolineCall);
//! println!("calls: {}", counter.get(BridgeEvent::TrampolineCall));
//! ```
//!
//! Without the `metrics` feature every method is an empty inline stub and
//! snapshots read as zero.

mod event;

#[cfg(feature = "metrics")]
mod counter;

pub use event::{BridgeEvent, CounterSnapshot};

#[cfg(feature = "metrics")]
pub use counter::Counter;

/// Whether counters are compiled in.
pub const ENABLED: bool = cfg!(feature = "metrics");

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Default)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    #[inline(always)]
    pub fn increment(&self, _event: BridgeEvent) {}
    #[inline(always)]
    pub fn add(&self, _event: BridgeEvent, _value: u64) {}
    pub fn get(&self, _event: BridgeEvent) -> u64 { 0 }
    pub fn reset_all(&self) {}
    pub fn snapshot(&self) -> CounterSnapshot { CounterSnapshot::default() }
}
