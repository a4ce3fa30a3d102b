//! `@foreach`, `@exclude` and the `@if` family

use tracing::warn;

use super::{unquote, Preprocessor};
use crate::block::BlockMatch;
use crate::context::{Context, Value};
use crate::expression::test_passes;
use crate::PreprocessError;

type Recurse<'a> = &'a dyn Fn(&str) -> Result<String, PreprocessError>;

impl Preprocessor {
    /// Repeat the resolved body once per element of a context entry
    pub(super) fn foreach_block(
        &self,
        block: &BlockMatch<'_>,
        recurse: Recurse<'_>,
        ctx: &Context,
    ) -> Result<String, PreprocessError> {
        let header = block.start.get(1).trim();
        let params: Vec<&str> = header.split_whitespace().collect();
        let [item, _, key] = params.as_slice() else {
            warn!(header, "malformed @foreach header, expected `<item> in <key>`");
            return Ok(String::new());
        };
        let Some(source) = ctx.lookup(key) else {
            warn!(key = *key, "@foreach over a missing context entry");
            return Ok(String::new());
        };
        let items = match loop_items(source) {
            Ok(items) => items,
            Err(err) => {
                warn!(key = *key, %err, "@foreach source is not valid JSON");
                return Ok(String::new());
            }
        };

        let body = recurse(block.body)?;
        Ok(items.iter().map(|value| body.replace(*item, value)).collect())
    }

    /// Keep the resolved body only when the test fails
    pub(super) fn exclude_block(
        &self,
        block: &BlockMatch<'_>,
        recurse: Recurse<'_>,
        ctx: &Context,
    ) -> Result<String, PreprocessError> {
        if test_passes(block.start.get(1), ctx)? {
            Ok(String::new())
        } else {
            recurse(block.body)
        }
    }

    pub(super) fn if_block(
        &self,
        block: &BlockMatch<'_>,
        recurse: Recurse<'_>,
        ctx: &Context,
    ) -> Result<String, PreprocessError> {
        let keyword = block.start.get(1);
        let test = block.start.get(2).trim();
        let keep = match keyword {
            "if" => test_passes(test, ctx)?,
            "ifdef" => is_defined(ctx, test),
            "ifndef" => !is_defined(ctx, test),
            _ => {
                return Err(PreprocessError::UnknownConditional {
                    keyword: keyword.to_string(),
                })
            }
        };
        if keep {
            recurse(block.body)
        } else {
            Ok(String::new())
        }
    }
}

fn is_defined(ctx: &Context, name: &str) -> bool {
    !matches!(ctx.get(name), None | Some(Value::Undefined))
}

/// The string forms a `@foreach` iterates over
///
/// Lists yield their elements and maps their values. Text holding `{…}` is
/// read as JSON, text holding `[…]` is a bracketed comma list whose quoted
/// elements are unquoted, and any other text is split on commas.
fn loop_items(source: &Value) -> Result<Vec<String>, serde_json::Error> {
    match source {
        Value::List(items) => Ok(items.iter().map(ToString::to_string).collect()),
        Value::Map(map) => Ok(map.values().map(ToString::to_string).collect()),
        other => {
            let text = other.to_string();
            if has_pair(&text, '{', '}') {
                let json: serde_json::Value = serde_json::from_str(&text)?;
                Ok(match Value::from(json) {
                    Value::List(items) => items.iter().map(ToString::to_string).collect(),
                    Value::Map(map) => map.values().map(ToString::to_string).collect(),
                    scalar => vec![scalar.to_string()],
                })
            } else if has_pair(&text, '[', ']') {
                let mut inner = text.chars();
                inner.next();
                inner.next_back();
                Ok(inner
                    .as_str()
                    .split(',')
                    .map(|entry| unquote(entry.trim()).unwrap_or(entry).to_string())
                    .collect())
            } else {
                Ok(text.split(',').map(str::to_string).collect())
            }
        }
    }
}

/// Whether some line has `open` followed later by `close`
fn has_pair(text: &str, open: char, close: char) -> bool {
    text.lines().any(|line| {
        line.find(open)
            .is_some_and(|at| line[at + open.len_utf8()..].contains(close))
    })
}
