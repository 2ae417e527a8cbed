//! Host-created promises

use crate::context::Scope;
use crate::error::{BridgeError, Result};
use crate::marshal::IntoValue;
use crate::value::{PersistentValue, Value};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

/// The `resolve`/`reject` pair of a pending promise, kept outside any scope.
///
/// Settling consumes the pair; a promise settles at most once anyway.
#[derive(Debug, Clone)]
pub struct PromiseResolvers {
    resolve: PersistentValue,
    reject: PersistentValue,
}

impl PromiseResolvers {
    pub fn resolve<'js, V: IntoValue<'js>>(self, scope: &Scope<'js>, value: V) -> Result<()> {
        self.resolve.restore(scope)?.call((value,))?;
        Ok(())
    }

    pub fn reject<'js, V: IntoValue<'js>>(self, scope: &Scope<'js>, reason: V) -> Result<()> {
        self.reject.restore(scope)?.call((reason,))?;
        Ok(())
    }
}

impl<'js> Scope<'js> {
    /// Construct a script `Promise` whose executor is a host closure.
    ///
    /// `runner` receives `resolve` and `reject` synchronously, during
    /// construction. Returning `Err` rejects the promise with the converted
    /// error, the same way a throwing executor does.
    pub fn new_promise<F>(&self, runner: F) -> Result<Value<'js>>
    where
        F: for<'a> FnOnce(&Scope<'a>, Value<'a>, Value<'a>) -> Result<()> + 'static,
    {
        let runner = RefCell::new(Some(runner));
        let (handle, executor) = self.register_function(move |scope, _this, args| {
            let runner = runner
                .borrow_mut()
                .take()
                .ok_or_else(|| BridgeError::Host("promise executor called twice".into()))?;
            let mut args = args.into_iter();
            let resolve = args.next().unwrap_or_else(|| scope.undefined());
            let reject = args.next().unwrap_or_else(|| scope.undefined());
            runner(scope, resolve, reject)?;
            Ok(scope.undefined())
        })?;

        let promise = self
            .global("Promise")
            .and_then(|constructor| constructor.construct((executor,)));
        // The executor only runs during construction.
        self.unregister_function(handle);
        trace!(context = %self.context_id(), "promise created");
        promise
    }

    /// A pending promise plus resolvers that can settle it later, e.g. when
    /// a background operation posts its result back to this context.
    pub fn promise_capability(&self) -> Result<(Value<'js>, PromiseResolvers)> {
        let slot: Rc<RefCell<Option<PromiseResolvers>>> = Rc::default();
        let sink = Rc::clone(&slot);
        let promise = self.new_promise(move |_, resolve, reject| {
            *sink.borrow_mut() = Some(PromiseResolvers {
                resolve: resolve.persist(),
                reject: reject.persist(),
            });
            Ok(())
        })?;

        let resolvers = slot
            .borrow_mut()
            .take()
            .ok_or_else(|| BridgeError::Host("promise executor did not run".into()))?;
        Ok((promise, resolvers))
    }
}
