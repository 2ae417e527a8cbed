//! Script contexts and scopes
//!
//! A [`Context`] is one execution environment (globals, module registry)
//! bound to a [`Runtime`]. Code only touches it through [`Context::with`],
//! which hands out a [`Scope`]: the `'js` lifetime on the scope ties every
//! [`Value`] and [`Atom`] created inside to that borrow, so nothing can be
//! read or released after the context goes away.

use crate::atom::Atom;
use crate::callback::{self, CallbackHandle};
use crate::error::{BridgeError, Result, ScriptError};
use crate::marshal::{FromValue, IntoValue};
use crate::runtime::{Runtime, RuntimeInner};
use crate::value::Value;
use rquickjs::context::EvalOptions;
use rquickjs::promise::PromiseState;
use rquickjs::{Ctx, Exception, Object, Persistent};
use std::cell::RefCell;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use tether_metrics::BridgeEvent;
use tracing::{debug, trace};

/// Identifier of a context within its runtime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(u32);

impl ContextId {
    pub(crate) const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Outcome of one [`Context::execute_pending_job`] call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// A job ran to completion.
    Ran,
    /// The queue was empty; nothing ran.
    Idle,
}

// ============================================================================
// Shared per-context state
// ============================================================================

/// State reachable from every scope of a context and from its trampoline.
pub(crate) struct ContextShared {
    id: ContextId,
    runtime: Rc<RuntimeInner>,
    globals: RefCell<Option<Persistent<Object<'static>>>>,
    trampoline: RefCell<Option<Persistent<rquickjs::Function<'static>>>>,
    adapter: RefCell<Option<Persistent<rquickjs::Function<'static>>>>,
}

impl ContextShared {
    pub(crate) fn id(&self) -> ContextId {
        self.id
    }

    pub(crate) fn runtime(&self) -> &RuntimeInner {
        &self.runtime
    }

    pub(crate) fn trampoline_slot(&self) -> &RefCell<Option<Persistent<rquickjs::Function<'static>>>> {
        &self.trampoline
    }

    pub(crate) fn adapter_slot(&self) -> &RefCell<Option<Persistent<rquickjs::Function<'static>>>> {
        &self.adapter
    }

    fn clear_cache(&self) {
        self.adapter.borrow_mut().take();
        self.trampoline.borrow_mut().take();
        self.globals.borrow_mut().take();
    }
}

// ============================================================================
// Context
// ============================================================================

/// One script execution environment.
///
/// Dropping the context (or calling [`Context::free`]) evicts every host
/// function it registered, releases the cached global object and helper
/// functions, and only then frees the engine context. The runtime stays
/// alive for as long as any of its contexts does.
pub struct Context {
    shared: Rc<ContextShared>,
    engine: rquickjs::Context,
    runtime: Runtime,
}

impl Context {
    pub(crate) fn new(runtime: &Runtime) -> Result<Self> {
        let inner = runtime.inner();
        let engine = rquickjs::Context::full(inner.engine()).map_err(BridgeError::Engine)?;
        let id = inner.allocate_context_id();
        let shared = Rc::new(ContextShared {
            id,
            runtime: runtime.inner_rc(),
            globals: RefCell::new(None),
            trampoline: RefCell::new(None),
            adapter: RefCell::new(None),
        });

        debug!(context = %id, "script context created");
        Ok(Self {
            shared,
            engine,
            runtime: runtime.clone(),
        })
    }

    pub fn id(&self) -> ContextId {
        self.shared.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Enter the context.
    ///
    /// Must not be called from inside a host function running on this
    /// context; those already receive a [`Scope`].
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: for<'js> FnOnce(Scope<'js>) -> R,
    {
        let shared = self.shared.clone();
        self.engine.with(move |ctx| f(Scope::new(ctx, shared)))
    }

    /// Evaluate `source` in global mode and decode the result.
    pub fn eval<T>(&self, source: &str) -> Result<T>
    where
        T: for<'js> FromValue<'js>,
    {
        self.with(|scope| scope.eval(source).and_then(T::from_value))
    }

    // ------------------------------------------------------------------------
    // Job pump
    // ------------------------------------------------------------------------

    /// Run one pending job (promise continuation).
    ///
    /// An empty queue is reported as [`JobStatus::Idle`], not as an error.
    /// A job that throws yields the decoded exception.
    pub fn execute_pending_job(&self) -> Result<JobStatus> {
        let inner = self.runtime.inner();
        match inner.engine().execute_pending_job() {
            Ok(true) => {
                inner.counters().increment(BridgeEvent::JobRun);
                trace!(context = %self.shared.id, "pending job ran");
                Ok(JobStatus::Ran)
            }
            Ok(false) => Ok(JobStatus::Idle),
            // The job may belong to any context of this runtime.
            Err(failed) => Err(BridgeError::Script(job_exception(&failed.0))),
        }
    }

    /// Drain the job queue; returns how many jobs ran.
    ///
    /// Stops at the first job that throws.
    pub fn run_pending_jobs(&self) -> Result<usize> {
        let mut ran = 0;
        while self.execute_pending_job()? == JobStatus::Ran {
            ran += 1;
        }
        Ok(ran)
    }

    pub fn is_job_pending(&self) -> bool {
        self.runtime.is_job_pending()
    }

    /// Tear the context down now instead of at end of scope.
    pub fn free(self) {}
}

impl Drop for Context {
    fn drop(&mut self) {
        let evicted = self
            .shared
            .runtime
            .registry()
            .evict_context(self.shared.id, self.shared.runtime.counters());
        self.shared.clear_cache();
        debug!(context = %self.shared.id, evicted, "script context released");
    }
}

// ============================================================================
// Scope
// ============================================================================

/// An entered context, valid for `'js`.
#[derive(Clone)]
pub struct Scope<'js> {
    ctx: Ctx<'js>,
    shared: Rc<ContextShared>,
}

impl<'js> Scope<'js> {
    pub(crate) fn new(ctx: Ctx<'js>, shared: Rc<ContextShared>) -> Self {
        Self { ctx, shared }
    }

    /// The underlying engine context, for callers that need raw `rquickjs` access.
    pub fn ctx(&self) -> &Ctx<'js> {
        &self.ctx
    }

    pub fn context_id(&self) -> ContextId {
        self.shared.id
    }

    pub(crate) fn shared(&self) -> &Rc<ContextShared> {
        &self.shared
    }

    pub(crate) fn runtime(&self) -> &RuntimeInner {
        &self.shared.runtime
    }

    /// The global object, cached on first use.
    pub fn globals(&self) -> Result<Value<'js>> {
        let mut slot = self.shared.globals.borrow_mut();
        let persistent = slot.get_or_insert_with(|| Persistent::save(&self.ctx, self.ctx.globals()));
        let globals = persistent.clone().restore(&self.ctx).capture(self)?;
        Ok(Value::from_raw(self.clone(), globals.into_value()))
    }

    pub fn global(&self, name: &str) -> Result<Value<'js>> {
        self.globals()?.get(name)
    }

    pub fn set_global<V: IntoValue<'js>>(&self, name: &str, value: V) -> Result<()> {
        self.globals()?.set(name, value)
    }

    // ------------------------------------------------------------------------
    // Value construction
    // ------------------------------------------------------------------------

    pub fn undefined(&self) -> Value<'js> {
        self.wrap(rquickjs::Value::new_undefined(self.ctx.clone()))
    }

    pub fn null(&self) -> Value<'js> {
        self.wrap(rquickjs::Value::new_null(self.ctx.clone()))
    }

    pub fn bool(&self, value: bool) -> Value<'js> {
        self.wrap(rquickjs::Value::new_bool(self.ctx.clone(), value))
    }

    pub fn int32(&self, value: i32) -> Value<'js> {
        self.wrap(rquickjs::Value::new_int(self.ctx.clone(), value))
    }

    /// Integers that fit 32 bits keep the int tag; the rest become doubles.
    pub fn int64(&self, value: i64) -> Value<'js> {
        match i32::try_from(value) {
            Ok(small) => self.int32(small),
            Err(_) => self.float64(value as f64),
        }
    }

    pub fn uint32(&self, value: u32) -> Value<'js> {
        self.int64(i64::from(value))
    }

    pub fn big_uint64(&self, value: u64) -> Result<Value<'js>> {
        let big = rquickjs::BigInt::from_u64(self.ctx.clone(), value).capture(self)?;
        Ok(self.wrap(big.into_value()))
    }

    pub fn big_int64(&self, value: i64) -> Result<Value<'js>> {
        let big = rquickjs::BigInt::from_i64(self.ctx.clone(), value).capture(self)?;
        Ok(self.wrap(big.into_value()))
    }

    pub fn float64(&self, value: f64) -> Value<'js> {
        self.wrap(rquickjs::Value::new_float(self.ctx.clone(), value))
    }

    pub fn string(&self, value: &str) -> Result<Value<'js>> {
        let string = rquickjs::String::from_str(self.ctx.clone(), value).capture(self)?;
        Ok(self.wrap(string.into_value()))
    }

    pub fn object(&self) -> Result<Value<'js>> {
        let object = Object::new(self.ctx.clone()).capture(self)?;
        Ok(self.wrap(object.into_value()))
    }

    pub fn array(&self) -> Result<Value<'js>> {
        let array = rquickjs::Array::new(self.ctx.clone()).capture(self)?;
        Ok(self.wrap(array.into_value()))
    }

    pub fn atom(&self, name: &str) -> Result<Atom<'js>> {
        let raw = rquickjs::Atom::from_str(self.ctx.clone(), name).capture(self)?;
        Ok(Atom::from_raw(self.clone(), raw))
    }

    /// A new `Error` object carrying `message`.
    pub fn error(&self, message: &str) -> Result<Value<'js>> {
        self.error_value(&ScriptError::new(message))
    }

    /// Rebuild a script error object from its decoded form.
    ///
    /// The class is looked up on the global object by name and falls back to
    /// `Error`. A decoded non-error throw becomes its message string.
    pub fn error_value(&self, error: &ScriptError) -> Result<Value<'js>> {
        let Some(name) = error.name.as_deref() else {
            return self.string(&error.message);
        };

        let constructor = match self.global(name)? {
            class if class.is_function() => class,
            _ => self.global("Error")?,
        };
        let object = constructor.construct((error.message.as_str(),))?;
        if let Some(stack) = &error.stack {
            object.set("stack", stack.as_str())?;
        }
        Ok(object)
    }

    /// Register a host closure and return the script function that calls it.
    ///
    /// The closure receives the call's `this` and arguments; its result (or
    /// error, converted to a script exception) goes back to the caller.
    pub fn function<F>(&self, f: F) -> Result<Value<'js>>
    where
        F: for<'a> Fn(&Scope<'a>, Value<'a>, Vec<Value<'a>>) -> Result<Value<'a>> + 'static,
    {
        callback::register(self, Rc::new(f)).map(|(_, function)| function)
    }

    /// Like [`Scope::function`] but also returns the registry handle.
    pub fn register_function<F>(&self, f: F) -> Result<(CallbackHandle, Value<'js>)>
    where
        F: for<'a> Fn(&Scope<'a>, Value<'a>, Vec<Value<'a>>) -> Result<Value<'a>> + 'static,
    {
        callback::register(self, Rc::new(f))
    }

    /// Drop a registered host function before its context goes away.
    ///
    /// Script functions still pointing at it throw `ReferenceError` afterwards.
    pub fn unregister_function(&self, handle: CallbackHandle) -> bool {
        self.runtime()
            .registry()
            .remove(handle, self.runtime().counters())
    }

    pub fn to_value<T: IntoValue<'js>>(&self, value: T) -> Result<Value<'js>> {
        value.into_value(self)
    }

    pub fn from_value<T: FromValue<'js>>(&self, value: Value<'js>) -> Result<T> {
        T::from_value(value)
    }

    // ------------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------------

    /// Evaluate as a classic (non-strict, global) script.
    pub fn eval(&self, source: &str) -> Result<Value<'js>> {
        self.eval_global(source)
    }

    pub fn eval_global(&self, source: &str) -> Result<Value<'js>> {
        self.eval_with(source, true)
    }

    /// Evaluate as an ES module. The result is the module's evaluation promise.
    ///
    /// A module that throws while it runs is an `Err` like any other script
    /// exception. A module still awaiting at top level returns its pending
    /// promise, which settles as jobs are pumped.
    pub fn eval_module(&self, source: &str) -> Result<Value<'js>> {
        self.eval_with(source, false)
    }

    /// Evaluate a file; `.mjs` files are treated as modules.
    pub fn eval_file(&self, path: &Path) -> Result<Value<'js>> {
        let source = std::fs::read_to_string(path)?;
        let module = path.extension().is_some_and(|ext| ext == "mjs");
        self.eval_with(&source, !module)
    }

    fn eval_with(&self, source: &str, global: bool) -> Result<Value<'js>> {
        let mut options = EvalOptions::default();
        options.global = global;
        options.strict = !global;
        let raw = self
            .ctx
            .eval_with_options::<rquickjs::Value, _>(source, options)
            .capture(self)?;
        if !global {
            self.check_module_evaluation(&raw)?;
        }
        Ok(self.wrap(raw))
    }

    fn check_module_evaluation(&self, evaluation: &rquickjs::Value<'js>) -> Result<()> {
        let Some(promise) = evaluation.as_promise() else {
            return Ok(());
        };
        if !matches!(promise.state(), PromiseState::Rejected) {
            return Ok(());
        }
        // Reading a rejected result throws the rejection reason.
        match promise.result::<rquickjs::Value>() {
            Some(Err(err)) => Err(self.capture(err)),
            _ => Err(BridgeError::Script(ScriptError::new("module evaluation failed"))),
        }
    }

    // ------------------------------------------------------------------------
    // JSON
    // ------------------------------------------------------------------------

    /// Parse with the engine's own `JSON.parse`.
    pub fn parse_json(&self, json: &str) -> Result<Value<'js>> {
        let raw = self.ctx.json_parse(json).capture(self)?;
        Ok(self.wrap(raw))
    }

    // ------------------------------------------------------------------------
    // Exceptions
    // ------------------------------------------------------------------------

    /// Take the pending exception, if any.
    pub fn take_exception(&self) -> Option<ScriptError> {
        let thrown = self.ctx.catch();
        if Value::is_absent_raw(&thrown) {
            return None;
        }
        Some(ScriptError::from_raw(thrown))
    }

    /// Throw `value`. Return the result from a host function to propagate it.
    pub fn throw(&self, value: Value<'js>) -> BridgeError {
        let _ = self.ctx.throw(value.into_raw());
        BridgeError::Thrown
    }

    pub fn throw_error(&self, message: &str) -> BridgeError {
        let _ = Exception::throw_message(&self.ctx, message);
        BridgeError::Thrown
    }

    pub fn throw_type_error(&self, message: &str) -> BridgeError {
        let _ = Exception::throw_type(&self.ctx, message);
        BridgeError::Thrown
    }

    pub fn throw_range_error(&self, message: &str) -> BridgeError {
        let _ = Exception::throw_range(&self.ctx, message);
        BridgeError::Thrown
    }

    pub fn throw_reference_error(&self, message: &str) -> BridgeError {
        let _ = Exception::throw_reference(&self.ctx, message);
        BridgeError::Thrown
    }

    pub fn throw_syntax_error(&self, message: &str) -> BridgeError {
        let _ = Exception::throw_syntax(&self.ctx, message);
        BridgeError::Thrown
    }

    pub fn throw_internal_error(&self, message: &str) -> BridgeError {
        let _ = Exception::throw_internal(&self.ctx, message);
        BridgeError::Thrown
    }

    /// Convert a bridge error into a pending script exception.
    ///
    /// Marshaling failures become `TypeError`, stale handles
    /// `ReferenceError`, decode overflows `RangeError` and host panics
    /// `InternalError`. Decoded script errors are rethrown with their class.
    pub(crate) fn raise(&self, error: BridgeError) -> rquickjs::Error {
        let message = error.to_string();
        match error {
            BridgeError::Thrown => rquickjs::Error::Exception,
            BridgeError::Engine(inner) => inner,
            BridgeError::Script(script) => match self.error_value(&script) {
                Ok(value) => self.ctx.throw(value.into_raw()),
                Err(_) => Exception::throw_message(&self.ctx, &script.message),
            },
            BridgeError::InsufficientArguments { .. }
            | BridgeError::TypeMismatch { .. }
            | BridgeError::NotCallable => Exception::throw_type(&self.ctx, &message),
            BridgeError::StaleCallback(_) => Exception::throw_reference(&self.ctx, &message),
            BridgeError::DepthExceeded { .. } | BridgeError::LengthExceeded { .. } => {
                Exception::throw_range(&self.ctx, &message)
            }
            BridgeError::HostPanic(_) => Exception::throw_internal(&self.ctx, &message),
            BridgeError::Host(text) => Exception::throw_message(&self.ctx, &text),
            BridgeError::Settings(_) | BridgeError::Io(_) => {
                Exception::throw_message(&self.ctx, &message)
            }
        }
    }

    /// Turn an engine error into a bridge error, decoding a pending exception.
    pub(crate) fn capture(&self, error: rquickjs::Error) -> BridgeError {
        match error {
            rquickjs::Error::Exception => match self.take_exception() {
                Some(script) => BridgeError::Script(script),
                None => BridgeError::Script(ScriptError::new("unknown exception")),
            },
            other => BridgeError::Engine(other),
        }
    }

    pub(crate) fn wrap(&self, raw: rquickjs::Value<'js>) -> Value<'js> {
        Value::from_raw(self.clone(), raw)
    }
}

/// Decode pending exceptions while converting engine results.
/// Take the pending exception of the context a failed job ran in.
fn job_exception(failed: &rquickjs::Context) -> ScriptError {
    failed.with(|ctx| {
        let thrown = ctx.catch();
        if Value::is_absent_raw(&thrown) {
            ScriptError::new("pending job failed")
        } else {
            ScriptError::from_raw(thrown)
        }
    })
}

pub(crate) trait Capture<T> {
    fn capture(self, scope: &Scope<'_>) -> Result<T>;
}

impl<T> Capture<T> for rquickjs::Result<T> {
    fn capture(self, scope: &Scope<'_>) -> Result<T> {
        self.map_err(|err| scope.capture(err))
    }
}
