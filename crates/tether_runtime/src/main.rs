//! Tether Runtime
//!
//! Runs one script file on a fresh runtime with the standard services
//! installed, then drives the event loop until nothing is left to do.
//!
//! ```text
//! tether <script.js> [--module] [--settings <file.json>]
//! ```
//!
//! The binary bundles no network client: `fetch` is installed, but every
//! request rejects until an embedder supplies a `FetchTransport` through
//! `EventLoop::with_transport`.

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use tether_script::{Runtime, ScriptError};
use tether_services::{EventLoop, Settings};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, PartialEq, Eq)]
#[command(
    name = "tether",
    version,
    about = "Run a script on an embedded QuickJS runtime",
    after_help = "fetch() is available but rejects every request: no network transport is bundled."
)]
struct Options {
    /// Script to run.
    script: PathBuf,

    /// Evaluate the script as an ES module.
    #[arg(long)]
    module: bool,

    /// JSON settings file with optional `runtime` and `services` sections.
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options = Options::parse();
    let settings = match &options.settings {
        Some(path) => Settings::load(path)
            .with_context(|| format!("reading settings from {}", path.display()))?,
        None => Settings::default(),
    };

    tracing::info!("Tether v{}", env!("CARGO_PKG_VERSION"));
    let runtime = Runtime::with_settings(settings.runtime)?;
    let context = runtime.new_context()?;
    let mut event_loop = EventLoop::new(context, &settings.services)?;

    let source = std::fs::read_to_string(&options.script)
        .with_context(|| format!("reading {}", options.script.display()))?;

    // Failures after a top-level await only show up as a rejected evaluation promise.
    let rejection: Rc<RefCell<Option<ScriptError>>> = Rc::default();
    let sink = Rc::clone(&rejection);
    event_loop.context().with(|scope| -> tether_script::Result<()> {
        if !options.module {
            scope.eval_global(&source)?;
            return Ok(());
        }
        let evaluation = scope.eval_module(&source)?;
        let on_reject = scope.function(move |scope, _this, args| {
            let error = match args.into_iter().next() {
                Some(reason) => match reason.as_error() {
                    Some(error) => error,
                    None => ScriptError::with_name("Uncaught", reason.to_string()?),
                },
                None => ScriptError::new("module evaluation failed"),
            };
            *sink.borrow_mut() = Some(error);
            Ok(scope.undefined())
        })?;
        evaluation
            .get("catch")?
            .call_with_this(&evaluation, (on_reject,))?;
        Ok(())
    })?;

    event_loop.run()?;

    if let Some(error) = rejection.borrow_mut().take() {
        bail!("{error}");
    }

    if tether_metrics::ENABLED {
        for (event, count) in runtime.counters().iter() {
            tracing::debug!(event = event.name(), count, "bridge counter");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, clap::Error> {
        Options::try_parse_from(std::iter::once("tether").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_script_only() {
        let options = parse(&["main.js"]).unwrap();
        assert_eq!(
            options,
            Options {
                script: PathBuf::from("main.js"),
                module: false,
                settings: None,
            }
        );
    }

    #[test]
    fn test_parse_flags_in_any_order() {
        let options = parse(&["--settings", "tether.json", "app.mjs", "--module"]).unwrap();
        assert!(options.module);
        assert_eq!(options.script, PathBuf::from("app.mjs"));
        assert_eq!(options.settings, Some(PathBuf::from("tether.json")));
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["a.js", "b.js"]).is_err());
        assert!(parse(&["a.js", "--settings"]).is_err());
        assert!(parse(&["a.js", "--verbose"]).is_err());
    }
}
