//! Comment-syntax dialects
//!
//! A dialect decides how each directive is spelled in one family of source
//! files (`<!-- @if x -->` in HTML, `// @if x` in C-like code, `# @if x` in
//! shell scripts). Semantics never depend on the dialect.

mod registry;

pub use registry::{DialectError, DialectRegistry, DEFAULT_DIALECT};

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};

use crate::block::BlockPattern;

/// Every directive the pipeline understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    Echo,
    Exec,
    Include,
    Once,
    IncludeStatic,
    Exclude,
    Extend,
    /// Marker inside an extended base where the extending body is spliced
    Extendable,
    If,
    Foreach,
}

impl Directive {
    pub const ALL: [Directive; 10] = [
        Directive::Echo,
        Directive::Exec,
        Directive::Include,
        Directive::Once,
        Directive::IncludeStatic,
        Directive::Exclude,
        Directive::Extend,
        Directive::Extendable,
        Directive::If,
        Directive::Foreach,
    ];

    /// Key used for this directive in dialect tables
    pub fn name(self) -> &'static str {
        match self {
            Directive::Echo => "echo",
            Directive::Exec => "exec",
            Directive::Include => "include",
            Directive::Once => "once",
            Directive::IncludeStatic => "include-static",
            Directive::Exclude => "exclude",
            Directive::Extend => "extend",
            Directive::Extendable => "extendable",
            Directive::If => "if",
            Directive::Foreach => "foreach",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name)
    }

    /// Whether the directive is spelled as a start/end pair
    pub fn is_block(self) -> bool {
        matches!(
            self,
            Directive::Exclude | Directive::Extend | Directive::If | Directive::Foreach
        )
    }
}

/// One or more patterns for an inline directive, applied in order
#[derive(Debug, Clone)]
pub struct InlinePattern {
    alternatives: Vec<Regex>,
}

impl InlinePattern {
    pub fn new(alternatives: Vec<Regex>) -> Self {
        Self { alternatives }
    }

    pub fn alternatives(&self) -> &[Regex] {
        &self.alternatives
    }
}

/// Compiled directive spellings of one dialect
#[derive(Debug, Clone)]
pub struct Dialect {
    name: String,
    inline: HashMap<Directive, InlinePattern>,
    blocks: HashMap<Directive, BlockPattern>,
}

impl Dialect {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inline: HashMap::new(),
            blocks: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inline(&self, directive: Directive) -> Option<&InlinePattern> {
        self.inline.get(&directive)
    }

    pub fn block(&self, directive: Directive) -> Option<&BlockPattern> {
        self.blocks.get(&directive)
    }

    /// Whether this dialect spells `directive` at all
    pub fn supports(&self, directive: Directive) -> bool {
        self.inline.contains_key(&directive) || self.blocks.contains_key(&directive)
    }

    pub(crate) fn set_inline(&mut self, directive: Directive, pattern: InlinePattern) {
        self.inline.insert(directive, pattern);
    }

    pub(crate) fn set_block(&mut self, directive: Directive, pattern: BlockPattern) {
        self.blocks.insert(directive, pattern);
    }

    /// Take every directive spelled by `other`, keeping the rest
    pub(crate) fn overlay(&mut self, other: &Dialect) {
        for (directive, pattern) in &other.inline {
            self.blocks.remove(directive);
            self.inline.insert(*directive, pattern.clone());
        }
        for (directive, pattern) in &other.blocks {
            self.inline.remove(directive);
            self.blocks.insert(*directive, pattern.clone());
        }
    }
}

/// Compile a directive pattern the way every dialect table expects it
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .multi_line(true)
        .case_insensitive(true)
        .build()
}
