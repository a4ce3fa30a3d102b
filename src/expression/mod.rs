//! Test expressions for `@if` and `@exclude`
//!
//! Expressions are a small, script-like language over the flattened context:
//! literals, dotted names, calls of context functions, `! - +` prefixes,
//! arithmetic, relational and equality operators (a lone `=` means equality),
//! `&&`, `||` and `?:`. Names that are not in the context evaluate to
//! `undefined`.

pub mod ast;
mod eval;
mod grammar;
pub mod lexer;

pub use ast::*;
pub use eval::evaluate;
pub use grammar::parse;

use crate::context::Context;
use crate::error::ExpressionError;

/// Decide whether `test` holds in `ctx`
///
/// An empty (or all-whitespace) test is true. Only the first syntax error is
/// reported.
pub fn test_passes(test: &str, ctx: &Context) -> Result<bool, ExpressionError> {
    let test = test.trim();
    if test.is_empty() {
        return Ok(true);
    }
    let expr = parse(test).map_err(|errs| {
        errs.into_iter()
            .next()
            .unwrap_or_else(|| ExpressionError::Syntax {
                expression: test.to_string(),
                span: 0..test.len(),
                message: "malformed expression".to_string(),
                expected: Vec::new(),
            })
    })?;
    Ok(evaluate(&expr, ctx).is_truthy())
}
