//! Dialect tables loaded from TOML

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::{compile_pattern, Dialect, Directive, InlinePattern};
use crate::block::BlockPattern;

/// Dialect used when none is named or the file type is not recognised
pub const DEFAULT_DIALECT: &str = "html";

const BUILTIN_DIALECTS: &str = include_str!("dialects.toml");

static BUILTIN: Lazy<DialectRegistry> = Lazy::new(|| {
    DialectRegistry::from_str(BUILTIN_DIALECTS)
        .and_then(|registry| registry.validate().map(|()| registry))
        .expect("Built-in dialect table should be valid")
});

/// Errors that can occur when loading or querying dialect tables
#[derive(Error, Debug)]
pub enum DialectError {
    #[error("Failed to read dialect file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse dialect TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("invalid `{directive}` pattern in dialect `{dialect}`: {source}")]
    InvalidPattern {
        dialect: String,
        directive: String,
        #[source]
        source: regex::Error,
    },
    #[error("block directive `{directive}` in dialect `{dialect}` needs both a start and an end pattern")]
    MissingBlockDelimiter { dialect: String, directive: String },
    #[error("`{directive}` in dialect `{dialect}` must be {expected}")]
    WrongShape {
        dialect: String,
        directive: String,
        expected: &'static str,
    },
    #[error("unknown directive `{directive}` in dialect `{dialect}`")]
    UnknownDirective { dialect: String, directive: String },
    #[error("alias `{alias}` points to unknown dialect `{target}`")]
    UnknownAliasTarget { alias: String, target: String },
    #[error("unknown dialect `{0}`")]
    UnknownDialect(String),
}

/// TOML structure for deserializing dialect tables
#[derive(Deserialize)]
struct TomlRegistry {
    #[serde(default)]
    dialects: HashMap<String, HashMap<String, TomlPattern>>,
    #[serde(default)]
    aliases: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TomlPattern {
    Single(String),
    Alternatives(Vec<String>),
    Block {
        start: Option<String>,
        end: Option<String>,
    },
}

/// Named dialects plus aliases, looked up case-insensitively
#[derive(Debug, Clone, Default)]
pub struct DialectRegistry {
    dialects: HashMap<String, Arc<Dialect>>,
    aliases: HashMap<String, String>,
}

impl DialectRegistry {
    /// The dialects compiled into the crate
    pub fn builtin() -> &'static DialectRegistry {
        &BUILTIN
    }

    /// Load a dialect table from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, DialectError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load a dialect table from a TOML string
    ///
    /// Alias targets are not checked here since a table may alias dialects
    /// it is later merged over; call [`DialectRegistry::validate`] once the
    /// final registry is assembled.
    pub fn from_str(content: &str) -> Result<Self, DialectError> {
        let parsed: TomlRegistry = toml::from_str(content)?;

        let mut dialects = HashMap::with_capacity(parsed.dialects.len());
        for (name, table) in parsed.dialects {
            let name = name.to_ascii_lowercase();
            let dialect = compile_dialect(&name, table)?;
            dialects.insert(name, Arc::new(dialect));
        }

        let aliases = parsed
            .aliases
            .into_iter()
            .map(|(alias, target)| (alias.to_ascii_lowercase(), target.to_ascii_lowercase()))
            .collect();

        Ok(DialectRegistry { dialects, aliases })
    }

    /// Lay `other` over this registry
    ///
    /// Directives of a dialect present in both are replaced one by one, new
    /// dialects are added, and aliases of `other` win.
    pub fn merge(&mut self, other: DialectRegistry) {
        for (name, dialect) in other.dialects {
            match self.dialects.get_mut(&name) {
                Some(existing) => Arc::make_mut(existing).overlay(&dialect),
                None => {
                    self.dialects.insert(name, dialect);
                }
            }
        }
        self.aliases.extend(other.aliases);
    }

    /// Check that every alias names a known dialect
    pub fn validate(&self) -> Result<(), DialectError> {
        for (alias, target) in &self.aliases {
            if !self.dialects.contains_key(target) {
                return Err(DialectError::UnknownAliasTarget {
                    alias: alias.clone(),
                    target: target.clone(),
                });
            }
        }
        Ok(())
    }

    /// Find a dialect by name or alias
    pub fn get(&self, name: &str) -> Option<&Dialect> {
        let name = name.to_ascii_lowercase();
        if let Some(dialect) = self.dialects.get(&name) {
            return Some(dialect.as_ref());
        }
        self.aliases
            .get(&name)
            .and_then(|target| self.dialects.get(target))
            .map(|dialect| dialect.as_ref())
    }

    /// Find the named dialect, or the default one when no name is given
    pub fn resolve(&self, name: Option<&str>) -> Result<&Dialect, DialectError> {
        let name = name.unwrap_or(DEFAULT_DIALECT);
        self.get(name)
            .ok_or_else(|| DialectError::UnknownDialect(name.to_string()))
    }

    /// Pick the dialect claiming the extension of `path`
    pub fn for_path(&self, path: &Path) -> Option<&Dialect> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        let dialect = self.get(ext);
        if dialect.is_none() {
            debug!(path = %path.display(), ext, "no dialect claims extension");
        }
        dialect
    }

    /// Aliases that resolve to `dialect`, sorted
    pub fn aliases_of(&self, dialect: &str) -> Vec<&str> {
        let mut aliases: Vec<&str> = self
            .aliases
            .iter()
            .filter(|(_, target)| target.as_str() == dialect)
            .map(|(alias, _)| alias.as_str())
            .collect();
        aliases.sort_unstable();
        aliases
    }

    /// Sorted names of the dialects themselves, without aliases
    pub fn dialect_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dialects.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn compile_dialect(name: &str, table: HashMap<String, TomlPattern>) -> Result<Dialect, DialectError> {
    let mut dialect = Dialect::new(name);
    for (key, pattern) in table {
        let directive = Directive::from_name(&key).ok_or_else(|| DialectError::UnknownDirective {
            dialect: name.to_string(),
            directive: key.clone(),
        })?;
        let compile = |source: &str| {
            compile_pattern(source).map_err(|source| DialectError::InvalidPattern {
                dialect: name.to_string(),
                directive: key.clone(),
                source,
            })
        };

        match (directive.is_block(), pattern) {
            (true, TomlPattern::Block { start, end }) => {
                let (Some(start), Some(end)) = (start, end) else {
                    return Err(DialectError::MissingBlockDelimiter {
                        dialect: name.to_string(),
                        directive: key,
                    });
                };
                dialect.set_block(directive, BlockPattern::new(compile(&start)?, compile(&end)?));
            }
            (true, _) => {
                return Err(DialectError::WrongShape {
                    dialect: name.to_string(),
                    directive: key,
                    expected: "a table with `start` and `end` patterns",
                });
            }
            (false, TomlPattern::Single(source)) => {
                dialect.set_inline(directive, InlinePattern::new(vec![compile(&source)?]));
            }
            (false, TomlPattern::Alternatives(sources)) => {
                let alternatives = sources
                    .iter()
                    .map(|source| compile(source))
                    .collect::<Result<Vec<_>, _>>()?;
                dialect.set_inline(directive, InlinePattern::new(alternatives));
            }
            (false, TomlPattern::Block { .. }) => {
                return Err(DialectError::WrongShape {
                    dialect: name.to_string(),
                    directive: key,
                    expected: "a pattern or a list of patterns",
                });
            }
        }
    }
    Ok(dialect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_dialects_load() {
        let registry = DialectRegistry::builtin();
        assert_eq!(registry.dialect_names(), vec!["coffee", "html", "js", "simple"]);
    }

    #[test]
    fn test_builtin_dialects_spell_every_directive() {
        let registry = DialectRegistry::builtin();
        for name in ["html", "js", "coffee"] {
            let dialect = registry.get(name).expect("Should exist");
            for directive in Directive::ALL {
                assert!(dialect.supports(directive), "{} lacks {:?}", name, directive);
            }
        }
        let simple = registry.get("simple").expect("Should exist");
        assert!(simple.supports(Directive::Echo));
        assert!(!simple.supports(Directive::If));
    }

    #[test]
    fn test_aliases_resolve() {
        let registry = DialectRegistry::builtin();
        assert_eq!(registry.get("xml").map(Dialect::name), Some("html"));
        assert_eq!(registry.get("CSS").map(Dialect::name), Some("js"));
        assert_eq!(registry.get("sh").map(Dialect::name), Some("coffee"));
        assert!(registry.get("rust").is_none());
        assert!(registry.aliases_of("coffee").contains(&"bash"));
    }

    #[test]
    fn test_resolve_defaults_to_html() {
        let registry = DialectRegistry::builtin();
        assert_eq!(registry.resolve(None).expect("default").name(), "html");
        assert!(matches!(
            registry.resolve(Some("nope")),
            Err(DialectError::UnknownDialect(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_for_path_uses_extension() {
        let registry = DialectRegistry::builtin();
        let name = |p: &str| registry.for_path(Path::new(p)).map(|d| d.name().to_string());
        assert_eq!(name("src/app.JS").as_deref(), Some("js"));
        assert_eq!(name("deploy.sh").as_deref(), Some("coffee"));
        assert_eq!(name("page.html").as_deref(), Some("html"));
        assert_eq!(name("README"), None);
        assert_eq!(name("notes.unknown"), None);
    }

    #[test]
    fn test_block_without_end_is_rejected() {
        let toml_str = r#"
[dialects.mini.if]
start = '@if (.*)'
"#;
        let err = DialectRegistry::from_str(toml_str).expect_err("Should fail");
        assert!(matches!(err, DialectError::MissingBlockDelimiter { .. }));
    }

    #[test]
    fn test_inline_directive_as_table_is_rejected() {
        let toml_str = r#"
[dialects.mini.echo]
start = '@echo'
end = '@end'
"#;
        let err = DialectRegistry::from_str(toml_str).expect_err("Should fail");
        assert!(matches!(err, DialectError::WrongShape { .. }));
    }

    #[test]
    fn test_unknown_directive_is_rejected() {
        let err = DialectRegistry::from_str("[dialects.mini]\nshout = 'x'\n").expect_err("Should fail");
        assert!(matches!(err, DialectError::UnknownDirective { directive, .. } if directive == "shout"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = DialectRegistry::from_str("[dialects.mini]\necho = '(unclosed'\n").expect_err("Should fail");
        assert!(matches!(err, DialectError::InvalidPattern { .. }));
    }

    #[test]
    fn test_unknown_alias_target_fails_validation() {
        let registry = DialectRegistry::from_str("[aliases]\nrs = 'rust'\n").expect("Should parse");
        assert!(matches!(
            registry.validate(),
            Err(DialectError::UnknownAliasTarget { alias, .. }) if alias == "rs"
        ));
    }

    #[test]
    fn test_merge_overrides_and_extends() {
        let overlay = DialectRegistry::from_str(
            r#"
[dialects.html]
echo = '\{\{[ \t]*(\w+)[ \t]*\}\}'

[dialects.rst]
echo = '\.\. echo:: (\w+)'

[aliases]
rs = "js"
"#,
        )
        .expect("Should parse");

        let mut registry = DialectRegistry::builtin().clone();
        registry.merge(overlay);
        registry.validate().expect("Should validate");

        let html = registry.get("html").expect("html");
        let echo = html.inline(Directive::Echo).expect("echo");
        assert!(echo.alternatives()[0].is_match("{{ name }}"));
        assert!(html.supports(Directive::If));
        assert!(registry.get("rst").is_some());
        assert_eq!(registry.get("rs").map(Dialect::name), Some("js"));
        // The shared built-in table is untouched
        let builtin_echo = DialectRegistry::builtin()
            .get("html")
            .and_then(|d| d.inline(Directive::Echo))
            .expect("echo");
        assert!(!builtin_echo.alternatives()[0].is_match("{{ name }}"));
    }
}
