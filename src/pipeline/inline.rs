//! `@echo` and `@exec`, plus the shared inline replacement loop

use regex::Captures;
use tracing::warn;

use super::{unquote, Preprocessor};
use crate::context::{Context, Value};
use crate::dialect::{Dialect, Directive, InlinePattern};
use crate::PreprocessError;

/// Replace every match of each alternative in turn with `replacement`'s output
///
/// Each alternative runs over the output of the previous one.
pub(super) fn replace_all<F>(
    mut text: String,
    pattern: &InlinePattern,
    mut replacement: F,
) -> Result<String, PreprocessError>
where
    F: FnMut(&Captures<'_>) -> Result<String, PreprocessError>,
{
    for re in pattern.alternatives() {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in re.captures_iter(&text) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&text[last..whole.start()]);
            out.push_str(&replacement(&caps)?);
            last = whole.end();
        }
        out.push_str(&text[last..]);
        text = out;
    }
    Ok(text)
}

impl Preprocessor {
    pub(super) fn echo_pass(
        &self,
        text: String,
        ctx: &Context,
        dialect: &Dialect,
    ) -> Result<String, PreprocessError> {
        match dialect.inline(Directive::Echo) {
            Some(pattern) => replace_all(text, pattern, |caps| Ok(echo(caps, ctx))),
            None => Ok(text),
        }
    }

    pub(super) fn exec_pass(
        &self,
        text: String,
        ctx: &Context,
        dialect: &Dialect,
    ) -> Result<String, PreprocessError> {
        match dialect.inline(Directive::Exec) {
            Some(pattern) => replace_all(text, pattern, |caps| Ok(exec(caps, ctx))),
            None => Ok(text),
        }
    }
}

/// A quoted argument verbatim, otherwise the named context entry
fn echo(caps: &Captures<'_>, ctx: &Context) -> String {
    let arg = caps.get(1).map_or("", |m| m.as_str()).trim();
    if let Some(literal) = unquote(arg) {
        return literal.to_string();
    }
    ctx.lookup(arg).map(ToString::to_string).unwrap_or_default()
}

/// Call a context function; quoted parameters are literals, bare ones are names
fn exec(caps: &Captures<'_>, ctx: &Context) -> String {
    let name = caps.get(1).map_or("", |m| m.as_str()).trim();
    let params = caps.get(2).map_or("", |m| m.as_str());

    let Some(function) = ctx.lookup(name).and_then(Value::as_function) else {
        warn!(name, "@exec of something that is not a function");
        return String::new();
    };

    // `f()` still carries one blank parameter, which looks up as undefined
    let args: Vec<Value> = params
        .split(',')
        .map(|param| exec_argument(param.trim(), ctx))
        .collect();
    function.call(ctx, &args).to_string()
}

fn exec_argument(param: &str, ctx: &Context) -> Value {
    let is_quote = |c: char| c == '\'' || c == '"';
    if param.len() >= 2 && param.starts_with(is_quote) && param.ends_with(is_quote) {
        Value::from(&param[1..param.len() - 1])
    } else {
        ctx.lookup(param).cloned().unwrap_or_default()
    }
}
