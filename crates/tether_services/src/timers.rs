//! `setTimeout` / `clearTimeout`
//!
//! Each timer is `Scheduled` until it either fires or is cancelled. The
//! delay runs as a tokio task that only posts the timer id back to the event
//! loop; the callback itself always runs on the context thread. A cancelled
//! timer's entry is gone, so a late message for it is ignored.

use crate::event_loop::LoopHandle;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use tether_script::{BridgeEvent, Context, PersistentValue, Result, Scope, Value};
use tokio::task::AbortHandle;
use tracing::{debug, error, trace};

/// Sequence id handed to scripts; the first timer gets 1.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TimerId(u32);

impl TimerId {
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

struct TimerEntry {
    task: AbortHandle,
    callback: PersistentValue,
    args: Vec<PersistentValue>,
}

/// Scheduled timers of one context.
pub struct Timers {
    next_id: u32,
    entries: HashMap<TimerId, TimerEntry>,
}

impl Timers {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            entries: HashMap::new(),
        }
    }

    fn schedule(
        &mut self,
        queue: &LoopHandle,
        delay: Duration,
        callback: PersistentValue,
        args: Vec<PersistentValue>,
    ) -> TimerId {
        self.next_id = self.next_id.wrapping_add(1);
        let id = TimerId(self.next_id);
        let task = queue.spawn_timer(id, delay);
        self.entries.insert(id, TimerEntry { task, callback, args });
        id
    }

    /// Abort the delay and drop the entry. `false` for unknown ids.
    fn cancel(&mut self, id: TimerId) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                entry.task.abort();
                true
            }
            None => false,
        }
    }

    fn take(&mut self, id: TimerId) -> Option<TimerEntry> {
        self.entries.remove(&id)
    }

    /// Timers scheduled and not yet fired or cancelled.
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.task.abort();
        }
    }
}

/// Install `setTimeout` and `clearTimeout` on the global object.
pub(crate) fn install(scope: &Scope<'_>, timers: Rc<RefCell<Timers>>, queue: LoopHandle) -> Result<()> {
    let table = Rc::clone(&timers);
    let set_timeout = scope.function(move |scope, _this, args| {
        let mut args = args.into_iter();
        let callback = args.next().unwrap_or_else(|| scope.undefined());
        if !callback.is_function() {
            return Err(scope.throw_type_error(&format!(
                "ERR_INVALID_CALLBACK: Callback must be a function. Received {}",
                callback.type_of()
            )));
        }
        let delay = match args.next() {
            Some(delay) if !delay.is_undefined() => parse_delay(scope, &delay)?,
            _ => Duration::ZERO,
        };
        let extra = args.map(|arg| arg.persist()).collect();

        let id = table
            .borrow_mut()
            .schedule(&queue, delay, callback.persist(), extra);
        trace!(timer = %id, ?delay, "timer scheduled");
        Ok(scope.uint32(id.get()))
    })?;

    let clear_timeout = scope.function(move |scope, _this, args| {
        let id = match args.first() {
            Some(id) if id.is_number() => TimerId(id.to_u32()?),
            _ => return Ok(scope.undefined()),
        };
        if timers.borrow_mut().cancel(id) {
            trace!(timer = %id, "timer cancelled");
        } else {
            debug!(timer = %id, "clearTimeout for unknown timer");
        }
        Ok(scope.undefined())
    })?;

    scope.set_global("setTimeout", set_timeout)?;
    scope.set_global("clearTimeout", clear_timeout)?;
    Ok(())
}

/// Milliseconds; negative and NaN delays run as soon as possible.
fn parse_delay(scope: &Scope<'_>, delay: &Value<'_>) -> Result<Duration> {
    if !delay.is_number() {
        return Err(scope.throw_type_error(&format!(
            "ERR_INVALID_TIMEOUT: timeout must be a number. Received {}",
            delay.type_of()
        )));
    }
    let millis = delay.to_f64()?;
    if millis.is_nan() || millis <= 0.0 {
        return Ok(Duration::ZERO);
    }
    Ok(Duration::from_secs_f64(millis.min(u32::MAX as f64) / 1000.0))
}

/// Run the callback of a fired timer on the context thread.
///
/// Errors are logged; there is no script caller left to receive them.
pub(crate) fn fire(context: &Context, timers: &RefCell<Timers>, id: TimerId) {
    let Some(entry) = timers.borrow_mut().take(id) else {
        trace!(timer = %id, "timer fired after cancellation");
        return;
    };
    context.runtime().record(BridgeEvent::TimerFired);

    let outcome = context.with(|scope| -> Result<()> {
        let callback = entry.callback.restore(&scope)?;
        let args = entry
            .args
            .iter()
            .map(|arg| arg.restore(&scope))
            .collect::<Result<Vec<_>>>()?;
        callback.call(args)?;
        Ok(())
    });
    if let Err(err) = outcome {
        error!(timer = %id, error = %err, "unhandled error in timer callback");
    }
}
