//! Event loop
//!
//! The loop owns the script [`Context`] and a small tokio runtime. Timers
//! sleep and fetches block on tokio threads; when they finish they only send
//! a [`Message`] back. [`EventLoop::run`] receives those messages on the
//! context's own thread, makes the script calls, and pumps promise jobs in
//! between.

use crate::error::ServiceError;
use crate::fetch::{self, FetchRequest, FetchResponse, FetchTransport, PendingFetches, UnavailableTransport};
use crate::settings::ServiceSettings;
use crate::timers::{self, TimerId, Timers};
use crate::console;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tether_script::Context;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, trace};

/// Work posted back to the context thread.
#[derive(Debug)]
pub(crate) enum Message {
    TimerFired(TimerId),
    Fetched {
        ticket: u64,
        result: Result<FetchResponse, ServiceError>,
    },
}

/// Sendable handle for scheduling background work that reports back to the loop.
#[derive(Clone)]
pub struct LoopHandle {
    sender: mpsc::UnboundedSender<Message>,
    runtime: tokio::runtime::Handle,
}

impl LoopHandle {
    pub(crate) fn spawn_timer(&self, id: TimerId, delay: Duration) -> AbortHandle {
        let sender = self.sender.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(Message::TimerFired(id)).is_err() {
                trace!(timer = %id, "event loop gone before timer fired");
            }
        });
        task.abort_handle()
    }

    pub(crate) fn spawn_fetch(
        &self,
        ticket: u64,
        transport: Arc<dyn FetchTransport>,
        request: FetchRequest,
    ) {
        let sender = self.sender.clone();
        self.runtime.spawn_blocking(move || {
            let result = transport.fetch(request);
            if sender.send(Message::Fetched { ticket, result }).is_err() {
                trace!(ticket, "event loop gone before fetch completed");
            }
        });
    }
}

/// Drives one context: installed services, background completions, jobs.
pub struct EventLoop {
    // Persistent script values live in these tables; they go before the context.
    timers: Rc<RefCell<Timers>>,
    fetches: Rc<RefCell<PendingFetches>>,
    sender: mpsc::UnboundedSender<Message>,
    receiver: mpsc::UnboundedReceiver<Message>,
    tokio: Option<tokio::runtime::Runtime>,
    context: Context,
}

impl EventLoop {
    /// Build a loop whose `fetch` has no transport and always rejects.
    pub fn new(context: Context, settings: &ServiceSettings) -> Result<Self, ServiceError> {
        Self::with_transport(context, settings, Arc::new(UnavailableTransport))
    }

    pub fn with_transport(
        context: Context,
        settings: &ServiceSettings,
        transport: Arc<dyn FetchTransport>,
    ) -> Result<Self, ServiceError> {
        let tokio = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(settings.timer_threads.max(1))
            .thread_name("tether-timer")
            .enable_time()
            .build()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let event_loop = Self {
            timers: Rc::new(RefCell::new(Timers::new())),
            fetches: Rc::new(RefCell::new(PendingFetches::new())),
            sender,
            receiver,
            tokio: Some(tokio),
            context,
        };
        event_loop.install(settings, transport)?;
        Ok(event_loop)
    }

    fn install(
        &self,
        settings: &ServiceSettings,
        transport: Arc<dyn FetchTransport>,
    ) -> Result<(), ServiceError> {
        let handle = self.handle()?;
        self.context.with(|scope| -> Result<(), ServiceError> {
            if settings.enable_timers {
                timers::install(&scope, Rc::clone(&self.timers), handle.clone())?;
            }
            if settings.enable_fetch {
                fetch::install(&scope, Rc::clone(&self.fetches), handle.clone(), transport)?;
            }
            if settings.enable_console {
                console::install(&scope)?;
            }
            Ok(())
        })?;
        debug!(context = %self.context.id(), ?settings, "services installed");
        Ok(())
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn handle(&self) -> Result<LoopHandle, ServiceError> {
        let runtime = self
            .tokio
            .as_ref()
            .map(|tokio| tokio.handle().clone())
            .ok_or_else(|| ServiceError::Settings("event loop has shut down".into()))?;
        Ok(LoopHandle {
            sender: self.sender.clone(),
            runtime,
        })
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().pending()
    }

    pub fn pending_fetches(&self) -> usize {
        self.fetches.borrow().len()
    }

    /// `true` while timers, fetches or promise jobs are outstanding.
    pub fn has_pending_work(&self) -> bool {
        self.pending_timers() > 0 || self.pending_fetches() > 0 || self.context.is_job_pending()
    }

    /// Run until no timer, fetch or job is left.
    pub fn run(&mut self) -> Result<(), ServiceError> {
        loop {
            self.pump_jobs();
            if !self.has_pending_work() {
                return Ok(());
            }
            let Some(tokio) = self.tokio.as_ref() else {
                return Ok(());
            };
            match tokio.block_on(self.receiver.recv()) {
                Some(message) => self.dispatch(message),
                None => return Ok(()),
            }
        }
    }

    /// Handle whatever has already arrived, without waiting.
    ///
    /// Returns how many messages were processed.
    pub fn run_once(&mut self) -> usize {
        self.pump_jobs();
        let mut handled = 0;
        while let Ok(message) = self.receiver.try_recv() {
            self.dispatch(message);
            self.pump_jobs();
            handled += 1;
        }
        handled
    }

    fn pump_jobs(&self) {
        loop {
            match self.context.run_pending_jobs() {
                Ok(0) => return,
                Ok(ran) => trace!(ran, "promise jobs drained"),
                Err(err) => error!(error = %err, "unhandled error in promise job"),
            }
        }
    }

    fn dispatch(&self, message: Message) {
        match message {
            Message::TimerFired(id) => timers::fire(&self.context, &self.timers, id),
            Message::Fetched { ticket, result } => {
                fetch::settle(&self.context, &self.fetches, ticket, result)
            }
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.timers.borrow_mut().clear();
        self.fetches.borrow_mut().clear();
        if let Some(tokio) = self.tokio.take() {
            tokio.shutdown_background();
        }
    }
}
