//! Host callback registry and trampoline
//!
//! The engine only calls native functions through one fixed signature, so
//! every host closure goes through the same indirection:
//!
//! 1. The closure is stored in the runtime's [`CallbackRegistry`] under a
//!    generational [`CallbackHandle`].
//! 2. A tiny script adapter builds a function that forwards
//!    `(index, generation, ...arguments)` to the context's single native
//!    trampoline, with the caller's `this` preserved.
//! 3. The trampoline resolves the handle, runs the closure and converts any
//!    error or panic into a script exception before returning to the engine.
//!
//! Entries are evicted when their context is torn down, which bumps the slot
//! generation; a handle that outlives its entry resolves to
//! [`BridgeError::StaleCallback`] instead of to somebody else's closure.

use crate::context::{Capture, ContextId, ContextShared, Scope};
use crate::error::{BridgeError, Result};
use crate::value::Value;
use rquickjs::function::{Rest, This};
use rquickjs::{Ctx, Exception, Persistent};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tether_metrics::{BridgeEvent, Counter};
use tracing::{debug, trace, warn};

/// Host closure as stored in the registry.
pub(crate) type Callback =
    Rc<dyn for<'js> Fn(&Scope<'js>, Value<'js>, Vec<Value<'js>>) -> Result<Value<'js>>>;

/// Builds script functions that forward to the trampoline with a handle.
const ADAPTER_SOURCE: &str = "((trampoline, index, generation) => function () { \
     return trampoline.call(this, index, generation, ...arguments); \
 })";

// ============================================================================
// Handles
// ============================================================================

/// Registry handle (generation-indexed for safety)
///
/// Format: [32-bit index | 32-bit generation]
/// - Index: Slot in the registry arena
/// - Generation: Incremented when the slot is released
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CallbackHandle {
    index: u32,
    generation: u32,
}

impl CallbackHandle {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Pack into the opaque 64-bit form.
    pub fn to_bits(&self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }

    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Display for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callback#{}v{}", self.index, self.generation)
    }
}

// ============================================================================
// Registry
// ============================================================================

struct Entry {
    context: ContextId,
    callback: Callback,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Arena {
    fn release(&mut self, index: u32) -> Option<Entry> {
        let slot = self.slots.get_mut(index as usize)?;
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.live -= 1;
        Some(entry)
    }
}

/// Runtime-owned table of host closures.
///
/// One mutex guards insertion, lookup and eviction. It is never held while a
/// closure runs or while evicted closures are dropped.
pub(crate) struct CallbackRegistry {
    arena: Mutex<Arena>,
}

impl CallbackRegistry {
    pub(crate) fn new() -> Self {
        Self {
            arena: Mutex::new(Arena::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, context: ContextId, callback: Callback) -> CallbackHandle {
        let mut arena = self.lock();
        let entry = Entry { context, callback };
        arena.live += 1;

        if let Some(index) = arena.free.pop() {
            let slot = &mut arena.slots[index as usize];
            slot.entry = Some(entry);
            return CallbackHandle::new(index, slot.generation);
        }

        let index = arena.slots.len() as u32;
        arena.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        CallbackHandle::new(index, 0)
    }

    /// Resolve `handle` for a call made from `context`.
    pub(crate) fn lookup(&self, handle: CallbackHandle, context: ContextId) -> Option<Callback> {
        let arena = self.lock();
        let slot = arena.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry
            .as_ref()
            .filter(|entry| entry.context == context)
            .map(|entry| entry.callback.clone())
    }

    pub(crate) fn remove(&self, handle: CallbackHandle, counters: &Counter) -> bool {
        let removed = {
            let mut arena = self.lock();
            let current = arena
                .slots
                .get(handle.index as usize)
                .is_some_and(|slot| slot.generation == handle.generation);
            if current {
                arena.release(handle.index)
            } else {
                None
            }
        };
        if removed.is_some() {
            counters.increment(BridgeEvent::CallbackEvicted);
        }
        removed.is_some()
    }

    /// Drop every entry registered by `context`; returns how many went.
    pub(crate) fn evict_context(&self, context: ContextId, counters: &Counter) -> usize {
        let evicted: Vec<Entry> = {
            let mut arena = self.lock();
            let owned: Vec<u32> = arena
                .slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.entry.as_ref().is_some_and(|e| e.context == context))
                .map(|(index, _)| index as u32)
                .collect();
            owned
                .into_iter()
                .filter_map(|index| arena.release(index))
                .collect()
        };
        counters.add(BridgeEvent::CallbackEvicted, evicted.len() as u64);
        evicted.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().live
    }
}

// ============================================================================
// Trampoline
// ============================================================================

/// Store `callback` and build the script function that reaches it.
pub(crate) fn register<'js>(
    scope: &Scope<'js>,
    callback: Callback,
) -> Result<(CallbackHandle, Value<'js>)> {
    let runtime = scope.runtime();
    let handle = runtime.registry().insert(scope.context_id(), callback);
    runtime.counters().increment(BridgeEvent::CallbackRegistered);
    debug!(%handle, context = %scope.context_id(), "host function registered");

    let built = build_function(scope, handle);
    if built.is_err() {
        runtime.registry().remove(handle, runtime.counters());
    }
    built.map(|function| (handle, function))
}

fn build_function<'js>(scope: &Scope<'js>, handle: CallbackHandle) -> Result<Value<'js>> {
    let ctx = scope.ctx();
    let shared = scope.shared();
    let trampoline = cached(ctx, shared.trampoline_slot(), || {
        trampoline(ctx, Rc::downgrade(shared))
    })
    .capture(scope)?;
    let adapter = cached(ctx, shared.adapter_slot(), || {
        ctx.eval::<rquickjs::Function, _>(ADAPTER_SOURCE)
    })
    .capture(scope)?;

    let function = adapter
        .call::<_, rquickjs::Value>((trampoline, handle.index, handle.generation))
        .capture(scope)?;
    Ok(Value::from_engine(scope, function))
}

/// Restore a context-cached helper function, creating it on first use.
fn cached<'js>(
    ctx: &Ctx<'js>,
    slot: &std::cell::RefCell<Option<Persistent<rquickjs::Function<'static>>>>,
    create: impl FnOnce() -> rquickjs::Result<rquickjs::Function<'js>>,
) -> rquickjs::Result<rquickjs::Function<'js>> {
    if let Some(saved) = slot.borrow().as_ref() {
        return saved.clone().restore(ctx);
    }
    let function = create()?;
    *slot.borrow_mut() = Some(Persistent::save(ctx, function.clone()));
    Ok(function)
}

/// The one native function every host function funnels through.
///
/// Holds only a weak reference to the context so the engine-owned function
/// object never keeps the context state alive.
fn trampoline<'js>(
    ctx: &Ctx<'js>,
    shared: Weak<ContextShared>,
) -> rquickjs::Result<rquickjs::Function<'js>> {
    rquickjs::Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>,
              this: This<rquickjs::Value<'js>>,
              args: Rest<rquickjs::Value<'js>>|
              -> rquickjs::Result<rquickjs::Value<'js>> {
            let Some(shared) = shared.upgrade() else {
                return Err(Exception::throw_internal(&ctx, "script context has been released"));
            };
            let scope = Scope::new(ctx, shared);
            dispatch(&scope, this.0, args.0)
        },
    )
}

fn dispatch<'js>(
    scope: &Scope<'js>,
    this: rquickjs::Value<'js>,
    args: Vec<rquickjs::Value<'js>>,
) -> rquickjs::Result<rquickjs::Value<'js>> {
    let mut args = args.into_iter();
    let index = args.next().and_then(|v| v.as_number());
    let generation = args.next().and_then(|v| v.as_number());
    let (Some(index), Some(generation)) = (index, generation) else {
        return Err(Exception::throw_internal(
            scope.ctx(),
            "trampoline called without a callback handle",
        ));
    };
    let handle = CallbackHandle::new(index as u32, generation as u32);

    let runtime = scope.runtime();
    runtime.counters().increment(BridgeEvent::TrampolineCall);
    let Some(callback) = runtime.registry().lookup(handle, scope.context_id()) else {
        warn!(%handle, context = %scope.context_id(), "call through stale callback handle");
        return Err(scope.raise(BridgeError::StaleCallback(handle)));
    };

    trace!(%handle, argc = args.len(), "trampoline call");
    let this = Value::from_engine(scope, this);
    let args: Vec<Value<'js>> = args.map(|raw| Value::from_engine(scope, raw)).collect();

    match panic::catch_unwind(AssertUnwindSafe(|| callback(scope, this, args))) {
        Ok(Ok(value)) => Ok(value.into_raw()),
        Ok(Err(err)) => {
            trace!(%handle, error = %err, "host function failed");
            Err(scope.raise(err))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(%handle, %message, "host function panicked");
            Err(scope.raise(BridgeError::HostPanic(message)))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
