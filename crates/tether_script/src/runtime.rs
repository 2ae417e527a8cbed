//! Script runtime management
//!
//! A [`Runtime`] owns one engine runtime (heap, stack limit, GC trigger) and
//! the callback registry shared by all of its contexts. It is a cheap,
//! reference-counted handle: every [`Context`] keeps its runtime alive, so
//! the engine runtime can never be freed underneath a live context.

use crate::callback::CallbackRegistry;
use crate::context::{Context, ContextId};
use crate::error::{BridgeError, Result};
use crate::settings::RuntimeSettings;
use std::cell::Cell;
use std::rc::Rc;
use tether_metrics::{BridgeEvent, Counter, CounterSnapshot};
use tracing::debug;

/// Handle to one script runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Field order matters: registered closures may hold persistent script
/// values, so the registry is dropped before the engine runtime.
pub(crate) struct RuntimeInner {
    registry: CallbackRegistry,
    counters: Counter,
    settings: RuntimeSettings,
    next_context: Cell<u32>,
    engine: rquickjs::Runtime,
}

impl RuntimeInner {
    pub(crate) fn engine(&self) -> &rquickjs::Runtime {
        &self.engine
    }

    pub(crate) fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    pub(crate) fn counters(&self) -> &Counter {
        &self.counters
    }

    pub(crate) fn allocate_context_id(&self) -> ContextId {
        let id = self.next_context.get();
        self.next_context.set(id.wrapping_add(1));
        ContextId::new(id)
    }
}

impl Runtime {
    pub fn new() -> Result<Self> {
        Self::with_settings(RuntimeSettings::default())
    }

    /// Create a runtime and apply `settings` before any context exists.
    pub fn with_settings(settings: RuntimeSettings) -> Result<Self> {
        let engine = rquickjs::Runtime::new().map_err(BridgeError::Engine)?;
        if let Some(bytes) = settings.max_stack_bytes {
            engine.set_max_stack_size(bytes);
        }
        if let Some(bytes) = settings.max_heap_bytes {
            engine.set_memory_limit(bytes);
        }
        if let Some(bytes) = settings.gc_threshold_bytes {
            engine.set_gc_threshold(bytes);
        }

        debug!(?settings, "script runtime created");
        Ok(Self {
            inner: Rc::new(RuntimeInner {
                registry: CallbackRegistry::new(),
                counters: Counter::new(),
                settings,
                next_context: Cell::new(1),
                engine,
            }),
        })
    }

    /// Create a context with every intrinsic installed.
    pub fn new_context(&self) -> Result<Context> {
        Context::new(self)
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.inner.settings
    }

    pub fn set_max_stack_size(&self, bytes: usize) {
        self.inner.engine.set_max_stack_size(bytes);
    }

    pub fn set_memory_limit(&self, bytes: usize) {
        self.inner.engine.set_memory_limit(bytes);
    }

    pub fn set_gc_threshold(&self, bytes: usize) {
        self.inner.engine.set_gc_threshold(bytes);
    }

    /// Force a garbage collection pass. Must not be called from inside a scope.
    pub fn run_gc(&self) {
        self.inner.engine.run_gc();
    }

    pub fn is_job_pending(&self) -> bool {
        self.inner.engine.is_job_pending()
    }

    /// Host functions currently registered across all contexts.
    pub fn registered_callbacks(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.inner.counters.snapshot()
    }

    /// Count an event raised outside the bridge itself (timers, services).
    pub fn record(&self, event: BridgeEvent) {
        self.inner.counters.increment(event);
    }

    pub(crate) fn inner(&self) -> &RuntimeInner {
        &self.inner
    }

    pub(crate) fn inner_rc(&self) -> Rc<RuntimeInner> {
        self.inner.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::FromValue;

    #[test]
    fn test_contexts_get_distinct_ids() {
        let runtime = Runtime::new().unwrap();
        let first = runtime.new_context().unwrap();
        let second = runtime.new_context().unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_runtime_outlives_dropped_handle() {
        let context = {
            let runtime = Runtime::new().unwrap();
            runtime.new_context().unwrap()
        };
        let value: i32 = context.eval("6 * 7").unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_stack_overflow_is_a_script_exception() {
        let runtime =
            Runtime::with_settings(RuntimeSettings::default().with_max_stack_bytes(256 * 1024))
                .unwrap();
        let context = runtime.new_context().unwrap();
        let err = context
            .eval::<()>("function down(n) { return down(n + 1) + 1; } down(0);")
            .unwrap_err();
        assert!(err.script().is_some(), "unexpected error: {err}");
    }

    #[test]
    fn test_memory_limit_is_a_script_exception() {
        let runtime =
            Runtime::with_settings(RuntimeSettings::default().with_max_heap_bytes(4 * 1024 * 1024))
                .unwrap();
        let context = runtime.new_context().unwrap();
        let result = context.with(|scope| {
            scope
                .eval("const hoard = []; for (let i = 0; i < 100000; i++) hoard.push(new Array(1024).fill(i)); hoard.length")
                .and_then(i64::from_value)
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_run_gc_outside_scope() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.eval::<()>("globalThis.garbage = [1, 2, 3]; garbage = null;").unwrap();
        runtime.run_gc();
        assert!(!runtime.is_job_pending());
    }

    #[test]
    fn test_runtimes_on_separate_threads() {
        let workers: Vec<_> = (0..4)
            .map(|n| {
                std::thread::spawn(move || {
                    let runtime = Runtime::new().unwrap();
                    let context = runtime.new_context().unwrap();
                    context.eval::<i64>(&format!("{n} * 10")).unwrap()
                })
            })
            .collect();

        let results: Vec<i64> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        assert_eq!(results, vec![0, 10, 20, 30]);
    }
}
