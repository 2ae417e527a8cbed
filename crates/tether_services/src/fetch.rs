//! `fetch`
//!
//! `fetch(url, init?)` returns a promise right away. The request runs on a
//! blocking tokio thread through the configured [`FetchTransport`], and the
//! result is posted back so the promise settles on the context thread.

use crate::error::ServiceError;
use crate::event_loop::LoopHandle;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::Arc;
use tether_script::{
    BridgeError, Context, FromValue, PromiseResolvers, Result, Scope, ScriptError, Value,
};
use tracing::{debug, error, warn};

/// A request as seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

/// A completed response, body fully read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchResponse {
    pub status: u16,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl FetchResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network backend for `fetch`. Called on a blocking worker thread.
pub trait FetchTransport: Send + Sync + 'static {
    fn fetch(&self, request: FetchRequest) -> std::result::Result<FetchResponse, ServiceError>;
}

/// Transport used when none is configured; every request fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableTransport;

impl FetchTransport for UnavailableTransport {
    fn fetch(&self, request: FetchRequest) -> std::result::Result<FetchResponse, ServiceError> {
        Err(ServiceError::Transport(format!(
            "no transport configured for {} {}",
            request.method, request.url
        )))
    }
}

/// The optional second `fetch` argument.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FetchInit {
    method: Option<String>,
    headers: BTreeMap<String, String>,
    body: Option<serde_json::Value>,
}

/// Promises waiting for their transport result, keyed by ticket.
pub(crate) struct PendingFetches {
    next_ticket: u64,
    pending: HashMap<u64, PromiseResolvers>,
}

impl PendingFetches {
    pub(crate) fn new() -> Self {
        Self {
            next_ticket: 0,
            pending: HashMap::new(),
        }
    }

    fn insert(&mut self, resolvers: PromiseResolvers) -> u64 {
        self.next_ticket += 1;
        self.pending.insert(self.next_ticket, resolvers);
        self.next_ticket
    }

    fn take(&mut self, ticket: u64) -> Option<PromiseResolvers> {
        self.pending.remove(&ticket)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}

pub(crate) fn install(
    scope: &Scope<'_>,
    fetches: Rc<RefCell<PendingFetches>>,
    queue: LoopHandle,
    transport: Arc<dyn FetchTransport>,
) -> Result<()> {
    let fetch = scope.function(move |scope, _this, args| {
        let request = parse_request(scope, args)?;
        debug!(method = %request.method, url = %request.url, "fetch");
        let (promise, resolvers) = scope.promise_capability()?;
        let ticket = fetches.borrow_mut().insert(resolvers);
        queue.spawn_fetch(ticket, Arc::clone(&transport), request);
        Ok(promise)
    })?;
    scope.set_global("fetch", fetch)
}

fn parse_request<'js>(scope: &Scope<'js>, args: Vec<Value<'js>>) -> Result<FetchRequest> {
    let mut args = args.into_iter();
    let Some(url) = args.next() else {
        return Err(scope.throw_error("must provide url at least"));
    };
    if !url.is_string() {
        return Err(scope.throw_error("must provide a string as url"));
    }

    let init = match args.next() {
        Some(init) if init.is_undefined() => FetchInit::default(),
        Some(init) if init.is_object() => {
            let json = serde_json::Value::from_value(init)?;
            serde_json::from_value(json)
                .map_err(|err| BridgeError::Host(format!("invalid fetch init: {err}")))?
        }
        Some(_) => return Err(scope.throw_error("must provide an object as init")),
        None => FetchInit::default(),
    };

    let body = init.body.map(|body| match body {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    });
    Ok(FetchRequest {
        url: url.to_string()?,
        method: init
            .method
            .filter(|method| !method.is_empty())
            .unwrap_or_else(|| "GET".to_string()),
        headers: init.headers,
        body,
    })
}

/// Settle the promise of `ticket` on the context thread.
pub(crate) fn settle(
    context: &Context,
    fetches: &RefCell<PendingFetches>,
    ticket: u64,
    result: std::result::Result<FetchResponse, ServiceError>,
) {
    let Some(resolvers) = fetches.borrow_mut().take(ticket) else {
        warn!(ticket, "fetch result without a pending promise");
        return;
    };

    let outcome = context.with(|scope| -> Result<()> {
        match result {
            Ok(response) => {
                let response = response_object(&scope, response)?;
                resolvers.resolve(&scope, response)
            }
            Err(err) => {
                error!(ticket, error = %err, "fetch failed");
                resolvers.reject(&scope, ScriptError::new(err.to_string()))
            }
        }
    });
    if let Err(err) = outcome {
        error!(ticket, error = %err, "could not settle fetch promise");
    }
}

/// `{ status, ok, url, headers, text(), json() }`, plus `Text`/`Json` aliases.
fn response_object<'js>(scope: &Scope<'js>, response: FetchResponse) -> Result<Value<'js>> {
    let object = scope.object()?;
    object.set("status", u32::from(response.status))?;
    object.set("ok", response.ok())?;
    object.set("url", response.url.as_str())?;
    object.set("headers", response.headers)?;

    let body: Rc<str> = Rc::from(response.body);
    let text_body = Rc::clone(&body);
    let text = scope.function(move |scope, _this, _args| {
        let body = Rc::clone(&text_body);
        scope.new_promise(move |scope, resolve, _reject| {
            resolve.call((scope.string(&body)?,))?;
            Ok(())
        })
    })?;
    let json = scope.function(move |scope, _this, _args| {
        let body = Rc::clone(&body);
        scope.new_promise(move |scope, resolve, _reject| {
            resolve.call((scope.parse_json(&body)?,))?;
            Ok(())
        })
    })?;

    object.set("text", &text)?;
    object.set("Text", text)?;
    object.set("json", &json)?;
    object.set("Json", json)?;
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoop;
    use crate::settings::ServiceSettings;
    use std::sync::Mutex;
    use tether_script::Runtime;

    /// Answers every request with a JSON echo of what it received.
    #[derive(Default)]
    struct EchoTransport {
        seen: Mutex<Vec<FetchRequest>>,
    }

    impl FetchTransport for EchoTransport {
        fn fetch(&self, request: FetchRequest) -> std::result::Result<FetchResponse, ServiceError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request.clone());
            }
            if request.url.ends_with("/missing") {
                return Err(ServiceError::Transport("connection refused".into()));
            }
            let body = serde_json::json!({ "method": request.method, "body": request.body });
            Ok(FetchResponse {
                status: 200,
                url: request.url,
                headers: BTreeMap::from([("content-type".into(), "application/json".into())]),
                body: body.to_string(),
            })
        }
    }

    fn event_loop(transport: Arc<EchoTransport>) -> EventLoop {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        EventLoop::with_transport(context, &ServiceSettings::default(), transport).unwrap()
    }

    #[test]
    fn test_fetch_resolves_with_response() {
        let transport = Arc::new(EchoTransport::default());
        let mut event_loop = event_loop(Arc::clone(&transport));
        event_loop
            .context()
            .eval::<()>(
                "globalThis.out = null; \
                 fetch('https://example.test/api', { method: 'POST', headers: { accept: 'json' }, body: { a: 1 } }) \
                   .then((res) => Promise.all([res.status, res.ok, res.headers['content-type'], res.Json()])) \
                   .then((parts) => { out = parts; });",
            )
            .unwrap();
        assert_eq!(event_loop.pending_fetches(), 1);

        event_loop.run().unwrap();
        let out: serde_json::Value = event_loop.context().eval("out").unwrap();
        assert_eq!(
            out,
            serde_json::json!([200, true, "application/json", { "method": "POST", "body": "{\"a\":1}" }])
        );

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].headers.get("accept").map(String::as_str), Some("json"));
    }

    #[test]
    fn test_method_defaults_to_get_and_text_works() {
        let mut event_loop = event_loop(Arc::new(EchoTransport::default()));
        event_loop
            .context()
            .eval::<()>(
                "globalThis.out = null; \
                 fetch('https://example.test/').then((res) => res.text()).then((t) => { out = t; });",
            )
            .unwrap();
        event_loop.run().unwrap();
        let out: String = event_loop.context().eval("out").unwrap();
        assert_eq!(out, r#"{"body":null,"method":"GET"}"#);
    }

    #[test]
    fn test_transport_failure_rejects() {
        let mut event_loop = event_loop(Arc::new(EchoTransport::default()));
        event_loop
            .context()
            .eval::<()>(
                "globalThis.reason = null; \
                 fetch('https://example.test/missing').catch((e) => { reason = e.message; });",
            )
            .unwrap();
        event_loop.run().unwrap();
        let reason: String = event_loop.context().eval("reason").unwrap();
        assert_eq!(reason, "fetch failed: connection refused");
        assert_eq!(event_loop.pending_fetches(), 0);
    }

    #[test]
    fn test_argument_validation() {
        let event_loop = event_loop(Arc::new(EchoTransport::default()));
        let messages: Vec<String> = event_loop
            .context()
            .eval(
                "[() => fetch(), () => fetch(42), () => fetch('https://example.test', 'POST')] \
                 .map((f) => { try { f(); return 'no error'; } catch (e) { return e.message; } })",
            )
            .unwrap();
        assert_eq!(
            messages,
            vec![
                "must provide url at least",
                "must provide a string as url",
                "must provide an object as init",
            ]
        );
        assert_eq!(event_loop.pending_fetches(), 0);
    }
}
