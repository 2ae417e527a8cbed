//! `console`
//!
//! Script output goes through `tracing` under the `tether::console` target,
//! so it is filtered and formatted like every other log line.

use tether_script::{Result, Scope, Value};
use tracing::{debug, error, info, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

pub(crate) fn install(scope: &Scope<'_>) -> Result<()> {
    let console = scope.object()?;
    for (name, level) in [
        ("log", Level::Info),
        ("info", Level::Info),
        ("debug", Level::Debug),
        ("warn", Level::Warn),
        ("error", Level::Error),
    ] {
        let method = scope.function(move |scope, _this, args| {
            let line = render(&args)?;
            match level {
                Level::Debug => debug!(target: "tether::console", "{line}"),
                Level::Info => info!(target: "tether::console", "{line}"),
                Level::Warn => warn!(target: "tether::console", "{line}"),
                Level::Error => error!(target: "tether::console", "{line}"),
            }
            Ok(scope.undefined())
        })?;
        console.set(name, method)?;
    }
    scope.set_global("console", console)
}

/// Join arguments with spaces. Plain objects and arrays print as JSON.
fn render(args: &[Value<'_>]) -> Result<String> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        let part = if arg.is_error() || arg.is_function() || !arg.is_object() {
            arg.to_string()?
        } else {
            match arg.to_json_string() {
                Ok(Some(json)) => json,
                // Cycles and BigInt fields have no JSON form.
                _ => arg.to_string()?,
            }
        };
        parts.push(part);
    }
    Ok(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_script::Runtime;

    fn rendered(source: &str) -> String {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| {
            let args = scope.eval(source).unwrap();
            let args: Vec<Value<'_>> = scope.from_value(args).unwrap();
            render(&args).unwrap()
        })
    }

    #[test]
    fn test_render_mixes_json_and_text() {
        assert_eq!(
            rendered("['count', 3, { a: [1, 2] }, null, undefined]"),
            r#"count 3 {"a":[1,2]} null undefined"#
        );
    }

    #[test]
    fn test_render_errors_and_cycles_as_text() {
        assert_eq!(
            rendered("const o = {}; o.self = o; [new TypeError('bad'), o]"),
            "TypeError: bad [object Object]"
        );
    }

    #[test]
    fn test_every_method_is_callable() {
        let runtime = Runtime::new().unwrap();
        let context = runtime.new_context().unwrap();
        context.with(|scope| install(&scope)).unwrap();
        let kinds: Vec<String> = context
            .eval(
                "['log', 'info', 'debug', 'warn', 'error'].map((m) => { console[m]('hello', m, { m }); return typeof console[m]; })",
            )
            .unwrap();
        assert_eq!(kinds, vec!["function"; 5]);
    }
}
