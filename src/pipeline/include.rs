//! `@include`, `@once`, `@include-static` and `@extend`

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::inline::replace_all;
use super::Preprocessor;
use crate::block::BlockMatch;
use crate::context::Context;
use crate::dialect::{Dialect, Directive};
use crate::eol;
use crate::PreprocessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum IncludeMode {
    /// `@include`: the file is preprocessed before splicing
    Processed,
    /// `@once`: like `Processed`, at most once per once-set
    Once,
    /// `@include-static`: the file is spliced as-is
    Static,
}

impl IncludeMode {
    fn directive(self) -> Directive {
        match self {
            IncludeMode::Processed => Directive::Include,
            IncludeMode::Once => Directive::Once,
            IncludeMode::Static => Directive::IncludeStatic,
        }
    }
}

impl Preprocessor {
    pub(super) fn include_pass(
        &self,
        text: String,
        ctx: &Context,
        dialect: &Dialect,
        mode: IncludeMode,
    ) -> Result<String, PreprocessError> {
        let Some(pattern) = dialect.inline(mode.directive()) else {
            return Ok(text);
        };
        replace_all(text, pattern, |caps| {
            let prefix = caps.get(1).map_or("", |m| m.as_str());
            let file = caps.get(2).map_or("", |m| m.as_str()).trim();
            self.include_file(prefix, file, ctx, dialect, mode)
        })
    }

    fn include_file(
        &self,
        prefix: &str,
        file: &str,
        ctx: &Context,
        dialect: &Dialect,
        mode: IncludeMode,
    ) -> Result<String, PreprocessError> {
        let target = resolve_target(ctx, file);
        if !target.exists() {
            debug!(path = %target.display(), "include target missing");
            return Ok(not_found(&target));
        }
        if mode == IncludeMode::Once && !self.once.insert(&target) {
            trace!(path = %target.display(), "already included once, skipping");
            return Ok(String::new());
        }

        let raw = read_text(&target)?;
        let content = match mode {
            IncludeMode::Static => raw,
            IncludeMode::Processed | IncludeMode::Once => {
                self.run(&raw, &ctx.for_file(&target), dialect, false)?
            }
        };

        let content = eol::normalize_with_indent(&content, &indent_for(prefix));
        if content.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("{}{}", prefix, content))
        }
    }

    pub(super) fn extend_block(
        &self,
        block: &BlockMatch<'_>,
        recurse: &dyn Fn(&str) -> Result<String, PreprocessError>,
        ctx: &Context,
        dialect: &Dialect,
    ) -> Result<String, PreprocessError> {
        let target = resolve_target(ctx, block.start.get(1).trim());
        if !target.exists() {
            debug!(path = %target.display(), "extend target missing");
            return Ok(not_found(&target));
        }

        let raw = read_text(&target)?;
        let base = self.run(&raw, &ctx.for_file(&target), dialect, false)?;
        let base = base.trim();
        if base.is_empty() {
            return Ok(String::new());
        }

        let body = block.body.strip_prefix('\n').unwrap_or(block.body);
        let body = body.strip_suffix('\n').unwrap_or(body);
        let body = recurse(body)?;

        let mut extended = base.to_string();
        if let Some(marker) = dialect.inline(Directive::Extendable) {
            for re in marker.alternatives() {
                extended = re.replace_all(&extended, regex::NoExpand(&body)).into_owned();
            }
        }
        Ok(extended)
    }
}

/// `file` relative to the directory of the file being processed
fn resolve_target(ctx: &Context, file: &str) -> PathBuf {
    Path::new(ctx.current_dir()).join(file)
}

fn not_found(target: &Path) -> String {
    format!("{} not found", target.display())
}

fn read_text(path: &Path) -> Result<String, PreprocessError> {
    let bytes = std::fs::read(path).map_err(|source| PreprocessError::io(path, source))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Blank out everything but whitespace so continuation lines line up
fn indent_for(prefix: &str) -> String {
    prefix
        .chars()
        .map(|c| if c.is_whitespace() { c } else { ' ' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent_keeps_whitespace_and_blanks_the_rest() {
        assert_eq!(indent_for("\t  x = "), "\t      ");
        assert_eq!(indent_for(""), "");
    }

    #[test]
    fn test_resolve_target_uses_current_dir() {
        let ctx = Context::new().for_file(Path::new("src/page.html"));
        assert_eq!(resolve_target(&ctx, "part.html"), Path::new("src/part.html"));
        assert_eq!(resolve_target(&Context::new(), "part.html"), Path::new("part.html"));
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(not_found(Path::new("src/nope.js")), "src/nope.js not found");
    }
}
