//! Directive Preprocess - conditional compilation and includes for any text
//!
//! This library rewrites source text according to directives written inside
//! the comment syntax of its file type: `@if`/`@ifdef`/`@ifndef`, `@exclude`,
//! `@foreach`, `@extend`/`@extendable`, `@include`/`@once`/`@include-static`,
//! `@echo` and `@exec`. Directives are evaluated against a [`Context`] of
//! named values and functions.
//!
//! # Example
//!
//! ```rust
//! use directive_preprocess::{preprocess, Context};
//!
//! let ctx = Context::new().with("NODE_ENV", "production");
//! let out = preprocess(
//!     "<!-- @if NODE_ENV='production' -->minified<!-- @endif -->",
//!     &ctx,
//!     Some("html"),
//! )
//! .unwrap();
//! assert_eq!(out, "minified");
//! ```

pub mod block;
pub mod context;
pub mod dialect;
pub mod eol;
pub mod error;
pub mod expression;
pub mod once;
pub mod pipeline;

pub use context::{Context, ContextError, Function, Value};
pub use dialect::{Dialect, DialectError, DialectRegistry, Directive, DEFAULT_DIALECT};
pub use error::ExpressionError;
pub use once::OnceSet;
pub use pipeline::Preprocessor;

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use thiserror::Error;

static DEFAULT_PREPROCESSOR: Lazy<Preprocessor> = Lazy::new(Preprocessor::default);

/// Errors that can occur during a preprocessing run
#[derive(Debug, Error)]
pub enum PreprocessError {
    /// A source, included file or destination could not be read or written
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A malformed `@if` or `@exclude` test
    #[error("expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// Unknown dialect, or a broken dialect table
    #[error("dialect error: {0}")]
    Dialect(#[from] DialectError),

    /// An `@if`-family keyword other than `if`, `ifdef` or `ifndef`
    #[error("unknown conditional '@{keyword}'; expected if, ifdef or ifndef")]
    UnknownConditional { keyword: String },

    /// A context file or definition could not be loaded
    #[error("context error: {0}")]
    Context(#[from] ContextError),
}

impl PreprocessError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        PreprocessError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Configuration for a [`Preprocessor`]
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Dialects available to the run
    pub registry: DialectRegistry,
    /// Record of files pulled in by `@once`
    pub once_set: OnceSet,
    /// Dialect used when none is named or the file type is unknown
    pub default_dialect: String,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            registry: DialectRegistry::builtin().clone(),
            once_set: OnceSet::global(),
            default_dialect: DEFAULT_DIALECT.to_string(),
        }
    }
}

impl PreprocessConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dialect registry
    pub fn with_registry(mut self, registry: DialectRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use a private once-set instead of the process-wide one
    pub fn with_once_set(mut self, once_set: OnceSet) -> Self {
        self.once_set = once_set;
        self
    }

    /// Set the fallback dialect
    pub fn with_default_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.default_dialect = dialect.into();
        self
    }
}

/// Preprocess `source` with the built-in dialects and the global once-set
///
/// `dialect` names a dialect or alias; `None` or an unknown name selects `html`.
///
/// # Example
///
/// ```rust
/// use directive_preprocess::{preprocess, Context};
///
/// let ctx = Context::new().with("name", "world");
/// let out = preprocess("// @echo 'hello' \n// @echo name", &ctx, Some("js")).unwrap();
/// assert_eq!(out, "hello\nworld");
/// ```
pub fn preprocess(
    source: impl AsRef<[u8]>,
    ctx: &Context,
    dialect: Option<&str>,
) -> Result<String, PreprocessError> {
    DEFAULT_PREPROCESSOR.preprocess(source, ctx, dialect)
}

/// Preprocess the file `src` into `dest`, picking the dialect from `src`'s extension
pub async fn preprocess_file(
    src: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    ctx: &Context,
) -> Result<String, PreprocessError> {
    DEFAULT_PREPROCESSOR
        .preprocess_file(src.as_ref(), dest.as_ref(), ctx)
        .await
}

/// Blocking [`preprocess_file`]
pub fn preprocess_file_sync(
    src: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    ctx: &Context,
) -> Result<String, PreprocessError> {
    DEFAULT_PREPROCESSOR.preprocess_file_sync(src.as_ref(), dest.as_ref(), ctx)
}

/// Forget every file recorded by `@once` in the global once-set
pub fn reset_included() {
    OnceSet::global().reset();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(source: &str, ctx: &Context, dialect: &str) -> String {
        let pre = Preprocessor::new(PreprocessConfig::new().with_once_set(OnceSet::new()));
        pre.preprocess(source, ctx, Some(dialect)).expect("Should preprocess")
    }

    #[test]
    fn test_directive_free_text_is_unchanged() {
        let text = "plain text\r\nwith <!-- comments --> and // slashes\r\n";
        for dialect in ["simple", "html", "js", "coffee"] {
            assert_eq!(run(text, &Context::new(), dialect), text);
        }
    }

    #[test]
    fn test_if_keeps_and_drops() {
        let ctx = Context::new().with("NODE_ENV", "production");
        let src = "a\n<!-- @if NODE_ENV='production' -->\nprod\n<!-- @endif -->\nb\n";
        assert_eq!(run(src, &ctx, "html"), "a\nprod\nb\n");
        assert_eq!(run(src, &Context::new(), "html"), "a\nb\n");
    }

    #[test]
    fn test_exclude_is_negated_if() {
        let ctx = Context::new().with("debug", true);
        let src = "// @exclude debug\nshipped\n// @endexclude\nrest";
        assert_eq!(run(src, &ctx, "js"), "rest");
        assert_eq!(run(src, &Context::new(), "js"), "shipped\nrest");
    }

    #[test]
    fn test_ifdef_and_ifndef() {
        let ctx = Context::new().with("FLAG", "");
        let src = "# @ifdef FLAG\non\n# @endif\n# @ifndef FLAG\noff\n# @endif\n";
        assert_eq!(run(src, &ctx, "coffee"), "on\n");
        assert_eq!(run(src, &Context::new(), "coffee"), "off\n");
    }

    #[test]
    fn test_echo_forms() {
        let ctx = Context::new().with("name", "Ada");
        let src = "<!-- @echo name --> <!-- @echo 'lit' --> [<!-- @echo missing -->]";
        assert_eq!(run(src, &ctx, "html"), "Ada lit []");
    }

    #[test]
    fn test_exec_calls_context_function() {
        let mut ctx = Context::new().with("who", "Ada");
        ctx.insert_fn("greet", |_, args| {
            let parts: Vec<String> = args.iter().map(ToString::to_string).collect();
            Value::from(parts.join(" "))
        });
        let src = "// @exec greet('hello', who)\n";
        assert_eq!(run(src, &ctx, "js"), "hello Ada\n");
    }

    #[test]
    fn test_foreach_repeats_body() {
        let ctx = Context::new().with("list", "a,b,c");
        let src = "<!-- @foreach x in list -->-x-<!-- @endfor -->";
        assert_eq!(run(src, &ctx, "html"), "-a--b--c-");
    }

    #[test]
    fn test_unknown_conditional_is_fatal() {
        let registry = DialectRegistry::from_str(
            r#"
[dialects.odd.if]
start = '\{(\w+) (.*?)\}'
end = '\{end\}'
"#,
        )
        .expect("Should parse");
        let pre = Preprocessor::new(
            PreprocessConfig::new()
                .with_registry(registry)
                .with_once_set(OnceSet::new()),
        );
        let err = pre
            .preprocess("{unless x}y{end}", &Context::new(), Some("odd"))
            .expect_err("Should fail");
        assert!(matches!(
            err,
            PreprocessError::UnknownConditional { keyword } if keyword == "unless"
        ));
    }

    #[test]
    fn test_bad_expression_is_fatal() {
        let pre = Preprocessor::new(PreprocessConfig::new().with_once_set(OnceSet::new()));
        let err = pre
            .preprocess("<!-- @if a && -->x<!-- @endif -->", &Context::new(), None)
            .expect_err("Should fail");
        assert!(matches!(err, PreprocessError::Expression(_)));
    }
}
