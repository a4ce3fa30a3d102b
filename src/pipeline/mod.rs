//! The directive pipeline
//!
//! A run normalizes line endings, flattens the context, then makes one pass
//! per directive over the whole text in a fixed order: include, once, extend,
//! foreach, exclude, if, echo, exec, include-static. Included and extended
//! files go through the same pipeline with a derived context. Only the
//! outermost run puts the original line endings back.

mod blocks;
mod include;
mod inline;

use std::path::Path;

use tracing::{debug, warn};

use crate::context::{Context, CURRENT_FILE};
use crate::dialect::{Dialect, DialectRegistry, Directive};
use crate::eol;
use crate::once::OnceSet;
use crate::{PreprocessConfig, PreprocessError};

use include::IncludeMode;

/// Directive engine bound to a dialect registry and a once-set
#[derive(Debug, Clone)]
pub struct Preprocessor {
    registry: DialectRegistry,
    once: OnceSet,
    default_dialect: String,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self {
            registry: config.registry,
            once: config.once_set,
            default_dialect: config.default_dialect,
        }
    }

    pub fn registry(&self) -> &DialectRegistry {
        &self.registry
    }

    pub fn once_set(&self) -> &OnceSet {
        &self.once
    }

    /// Forget every file recorded by `@once`
    pub fn reset_included(&self) {
        self.once.reset();
    }

    /// Resolve a dialect by name or alias
    ///
    /// An absent or unknown name selects the configured default. Only a
    /// default that is itself unknown is an error.
    pub fn dialect(&self, name: Option<&str>) -> Result<&Dialect, PreprocessError> {
        if let Some(name) = name {
            if let Some(dialect) = self.registry.get(name) {
                return Ok(dialect);
            }
            warn!(dialect = name, fallback = %self.default_dialect, "unknown dialect");
        }
        Ok(self.registry.resolve(Some(&self.default_dialect))?)
    }

    /// The dialect for a file, by extension, else the configured default
    pub fn dialect_for_path(&self, path: &Path) -> Result<&Dialect, PreprocessError> {
        match self.registry.for_path(path) {
            Some(dialect) => Ok(dialect),
            None => self.dialect(None),
        }
    }

    /// Preprocess `source` with `ctx`
    ///
    /// Invalid UTF-8 in `source` is replaced rather than rejected. Relative
    /// include paths resolve against the context's `currentDir`, or the
    /// working directory when it is unset.
    pub fn preprocess(
        &self,
        source: impl AsRef<[u8]>,
        ctx: &Context,
        dialect: Option<&str>,
    ) -> Result<String, PreprocessError> {
        let dialect = self.dialect(dialect)?;
        let source = String::from_utf8_lossy(source.as_ref());
        self.run(&source, ctx, dialect, true)
    }

    /// Preprocess the file `src` into `dest`, returning the written text
    pub fn preprocess_file_sync(
        &self,
        src: &Path,
        dest: &Path,
        ctx: &Context,
    ) -> Result<String, PreprocessError> {
        let bytes = std::fs::read(src).map_err(|source| PreprocessError::io(src, source))?;
        let output = self.preprocess_loaded(src, &bytes, ctx)?;
        std::fs::write(dest, &output).map_err(|source| PreprocessError::io(dest, source))?;
        Ok(output)
    }

    /// Async [`Preprocessor::preprocess_file_sync`]
    ///
    /// Only the top-level read and write are asynchronous; directive
    /// resolution itself runs to completion on the calling task.
    pub async fn preprocess_file(
        &self,
        src: &Path,
        dest: &Path,
        ctx: &Context,
    ) -> Result<String, PreprocessError> {
        let bytes = tokio::fs::read(src)
            .await
            .map_err(|source| PreprocessError::io(src, source))?;
        let output = self.preprocess_loaded(src, &bytes, ctx)?;
        tokio::fs::write(dest, &output)
            .await
            .map_err(|source| PreprocessError::io(dest, source))?;
        Ok(output)
    }

    fn preprocess_loaded(&self, src: &Path, bytes: &[u8], ctx: &Context) -> Result<String, PreprocessError> {
        let dialect = self.dialect_for_path(src)?;
        let source = String::from_utf8_lossy(bytes);
        self.run(&source, &ctx.for_file(src), dialect, true)
    }

    /// One pipeline run over `source`
    pub(crate) fn run(
        &self,
        source: &str,
        ctx: &Context,
        dialect: &Dialect,
        restore_eol: bool,
    ) -> Result<String, PreprocessError> {
        let style = eol::detect(source);
        let ctx = ctx.flatten();
        let mut text = eol::normalize(source);

        debug!(
            dialect = dialect.name(),
            file = %ctx.get(CURRENT_FILE).map(ToString::to_string).unwrap_or_default(),
            "preprocessing"
        );

        text = self.include_pass(text, &ctx, dialect, IncludeMode::Processed)?;
        text = self.include_pass(text, &ctx, dialect, IncludeMode::Once)?;

        if let Some(pattern) = dialect.block(Directive::Extend) {
            text = pattern.replace(&text, &|block, recurse| {
                self.extend_block(block, recurse, &ctx, dialect)
            })?;
        }
        if let Some(pattern) = dialect.block(Directive::Foreach) {
            text = pattern.replace(&text, &|block, recurse| {
                self.foreach_block(block, recurse, &ctx)
            })?;
        }
        if let Some(pattern) = dialect.block(Directive::Exclude) {
            text = pattern.replace(&text, &|block, recurse| {
                self.exclude_block(block, recurse, &ctx)
            })?;
        }
        if let Some(pattern) = dialect.block(Directive::If) {
            text = pattern.replace(&text, &|block, recurse| self.if_block(block, recurse, &ctx))?;
        }

        text = self.echo_pass(text, &ctx, dialect)?;
        text = self.exec_pass(text, &ctx, dialect)?;
        text = self.include_pass(text, &ctx, dialect, IncludeMode::Static)?;

        if restore_eol {
            text = eol::restore(&text, style);
        }
        Ok(text)
    }
}

/// Text between a pair of matching quotes, if `text` is exactly that
fn unquote(text: &str) -> Option<&str> {
    let mut chars = text.chars();
    let first = chars.next()?;
    let last = chars.next_back()?;
    if (first == '"' || first == '\'') && first == last {
        Some(chars.as_str())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("'abc'"), Some("abc"));
        assert_eq!(unquote("\"\""), Some(""));
        assert_eq!(unquote("'abc\""), None);
        assert_eq!(unquote("'"), None);
        assert_eq!(unquote("abc"), None);
    }

    #[test]
    fn test_default_dialect_is_configurable() {
        let pre = Preprocessor::new(PreprocessConfig::new().with_default_dialect("js"));
        assert_eq!(pre.dialect(None).expect("dialect").name(), "js");
        assert_eq!(
            pre.dialect_for_path(Path::new("notes.txt")).expect("dialect").name(),
            "js"
        );
        assert_eq!(
            pre.dialect_for_path(Path::new("page.xml")).expect("dialect").name(),
            "html"
        );
    }

    #[test]
    fn test_unknown_dialect_falls_back_to_default() {
        let pre = Preprocessor::new(PreprocessConfig::new().with_once_set(OnceSet::new()));
        assert_eq!(pre.dialect(Some("cobol")).expect("dialect").name(), "html");
        let out = pre
            .preprocess("<!-- @echo 'x' -->", &Context::new(), Some("cobol"))
            .expect("Should preprocess");
        assert_eq!(out, "x");
    }

    #[test]
    fn test_unknown_default_dialect_is_an_error() {
        let pre = Preprocessor::new(
            PreprocessConfig::new()
                .with_default_dialect("cobol")
                .with_once_set(OnceSet::new()),
        );
        let err = pre
            .preprocess("x", &Context::new(), None)
            .expect_err("Should fail");
        assert!(matches!(err, PreprocessError::Dialect(_)));
    }
}
