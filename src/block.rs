//! Balanced matching of block directives
//!
//! Block directives share one start/end spelling at every nesting level
//! (`@if … @if … @endif … @endif`), so the partner of a start marker cannot be
//! found with a single pattern. [`BlockPattern::segments`] walks the text from
//! marker to marker keeping a depth counter, and only closes a block when the
//! depth returns to zero.

use std::ops::Range;

use regex::Regex;
use tracing::warn;

/// Start/end matcher pair for one block directive
#[derive(Debug, Clone)]
pub struct BlockPattern {
    start: Regex,
    end: Regex,
}

/// Capture groups of one matched marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Groups<'t> {
    groups: Vec<Option<&'t str>>,
}

impl<'t> Groups<'t> {
    fn from_captures(caps: &regex::Captures<'t>) -> Self {
        Self {
            groups: caps.iter().map(|m| m.map(|m| m.as_str())).collect(),
        }
    }

    /// The whole marker text
    pub fn marker(&self) -> &'t str {
        self.get(0)
    }

    /// Group `index`, or `""` when it did not participate
    pub fn get(&self, index: usize) -> &'t str {
        self.groups.get(index).copied().flatten().unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// One complete, properly nested block occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMatch<'t> {
    /// Captures of the outer start marker
    pub start: Groups<'t>,
    /// Raw text between the outer start and end markers, not yet resolved
    pub body: &'t str,
    /// Captures of the matching end marker
    pub end: Groups<'t>,
    /// Byte range of the whole block in the scanned text
    pub span: Range<usize>,
}

/// Which marker of a block failed to find a partner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unbalanced {
    /// A start marker with no matching end before the end of the text
    Start,
    /// An end marker with no open block
    End,
}

/// A piece of scanned text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'t> {
    Literal(&'t str),
    Block(BlockMatch<'t>),
    /// A marker without a partner, left as-is
    Unbalanced { kind: Unbalanced, marker: &'t str },
}

#[derive(Debug)]
enum Delimiter<'t> {
    Start(regex::Captures<'t>),
    End(regex::Captures<'t>),
}

impl Delimiter<'_> {
    fn range(&self) -> Range<usize> {
        let caps = match self {
            Delimiter::Start(c) | Delimiter::End(c) => c,
        };
        caps.get(0).map(|m| m.range()).unwrap_or(0..0)
    }
}

impl BlockPattern {
    pub fn new(start: Regex, end: Regex) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> &Regex {
        &self.start
    }

    pub fn end(&self) -> &Regex {
        &self.end
    }

    /// Partition `text` into literal spans and outermost blocks
    pub fn segments<'p, 't>(&'p self, text: &'t str) -> Segments<'p, 't> {
        Segments {
            pattern: self,
            text,
            pos: 0,
        }
    }

    /// Replace every outermost block in `text` with the handler's output
    ///
    /// The handler is given a recursion callback that runs this same
    /// replacement over any text, so it decides whether and when to resolve
    /// the block body. Unbalanced markers are kept verbatim.
    pub fn replace<F, E>(&self, text: &str, handler: &F) -> Result<String, E>
    where
        F: Fn(&BlockMatch<'_>, &dyn Fn(&str) -> Result<String, E>) -> Result<String, E>,
    {
        let recurse = |body: &str| self.replace(body, handler);
        let mut out = String::with_capacity(text.len());
        for segment in self.segments(text) {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Block(block) => out.push_str(&handler(&block, &recurse)?),
                Segment::Unbalanced { kind, marker } => {
                    warn!(?kind, marker = marker.trim(), "unbalanced block marker left in output");
                    out.push_str(marker);
                }
            }
        }
        Ok(out)
    }

    /// Leftmost non-empty start or end marker at or after `from`; a start wins a tie
    fn next_delimiter<'t>(&self, text: &'t str, from: usize) -> Option<Delimiter<'t>> {
        let start = find_non_empty(&self.start, text, from);
        let end = find_non_empty(&self.end, text, from);
        match (start, end) {
            (Some(s), Some(e)) => {
                let s_at = s.get(0).map_or(usize::MAX, |m| m.start());
                let e_at = e.get(0).map_or(usize::MAX, |m| m.start());
                if s_at <= e_at {
                    Some(Delimiter::Start(s))
                } else {
                    Some(Delimiter::End(e))
                }
            }
            (Some(s), None) => Some(Delimiter::Start(s)),
            (None, Some(e)) => Some(Delimiter::End(e)),
            (None, None) => None,
        }
    }
}

/// Find the first match of `re` at or after `from` that consumes input
fn find_non_empty<'t>(re: &Regex, text: &'t str, mut from: usize) -> Option<regex::Captures<'t>> {
    while from <= text.len() {
        let caps = re.captures_at(text, from)?;
        let m = caps.get(0)?;
        if !m.is_empty() {
            return Some(caps);
        }
        from = m.end() + text[m.end()..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

/// Iterator over the [`Segment`]s of a text
pub struct Segments<'p, 't> {
    pattern: &'p BlockPattern,
    text: &'t str,
    pos: usize,
}

impl<'t> Iterator for Segments<'_, 't> {
    type Item = Segment<'t>;

    fn next(&mut self) -> Option<Segment<'t>> {
        let text = self.text;
        if self.pos >= text.len() {
            return None;
        }

        let Some(first) = self.pattern.next_delimiter(text, self.pos) else {
            let rest = &text[self.pos..];
            self.pos = text.len();
            return Some(Segment::Literal(rest));
        };

        let first_range = first.range();
        if first_range.start > self.pos {
            let literal = &text[self.pos..first_range.start];
            self.pos = first_range.start;
            return Some(Segment::Literal(literal));
        }

        let open = match first {
            Delimiter::End(_) => {
                self.pos = first_range.end;
                return Some(Segment::Unbalanced {
                    kind: Unbalanced::End,
                    marker: &text[first_range],
                });
            }
            Delimiter::Start(caps) => caps,
        };

        let mut depth = 1usize;
        let mut cursor = first_range.end;
        while let Some(delimiter) = self.pattern.next_delimiter(text, cursor) {
            let range = delimiter.range();
            cursor = range.end;
            match delimiter {
                Delimiter::Start(_) => depth += 1,
                Delimiter::End(close) => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos = range.end;
                        return Some(Segment::Block(BlockMatch {
                            start: Groups::from_captures(&open),
                            body: &text[first_range.end..range.start],
                            end: Groups::from_captures(&close),
                            span: first_range.start..range.end,
                        }));
                    }
                }
            }
        }

        // No partner: keep the start marker and rescan what follows it, so
        // complete blocks further on still resolve.
        self.pos = first_range.end;
        Some(Segment::Unbalanced {
            kind: Unbalanced::Start,
            marker: &text[first_range],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> BlockPattern {
        BlockPattern::new(
            Regex::new(r"\[if ([a-z]+)\]").expect("valid"),
            Regex::new(r"\[endif\]").expect("valid"),
        )
    }

    /// Resolve `[if x]` blocks, keeping the body when `x` is listed in `truthy`
    fn resolve(text: &str, truthy: &[&str]) -> String {
        pattern()
            .replace::<_, ()>(text, &|block, recurse| {
                if truthy.contains(&block.start.get(1)) {
                    recurse(block.body)
                } else {
                    Ok(String::new())
                }
            })
            .expect("Should resolve")
    }

    #[test]
    fn test_segments_literal_only() {
        let segs: Vec<_> = pattern().segments("plain text").collect();
        assert_eq!(segs, vec![Segment::Literal("plain text")]);
    }

    #[test]
    fn test_segments_single_block() {
        let text = "a[if x]body[endif]b";
        let segs: Vec<_> = pattern().segments(text).collect();
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0], Segment::Literal("a"));
        match &segs[1] {
            Segment::Block(block) => {
                assert_eq!(block.start.get(1), "x");
                assert_eq!(block.start.marker(), "[if x]");
                assert_eq!(block.end.marker(), "[endif]");
                assert_eq!(block.body, "body");
                assert_eq!(block.span, 1..18);
            }
            other => panic!("Expected block, got {:?}", other),
        }
        assert_eq!(segs[2], Segment::Literal("b"));
    }

    #[test]
    fn test_segments_match_by_depth_not_proximity() {
        let text = "[if a]1[if b]2[endif]3[endif]4";
        let segs: Vec<_> = pattern().segments(text).collect();
        assert_eq!(segs.len(), 2);
        match &segs[0] {
            Segment::Block(block) => {
                assert_eq!(block.start.get(1), "a");
                assert_eq!(block.body, "1[if b]2[endif]3");
            }
            other => panic!("Expected block, got {:?}", other),
        }
        assert_eq!(segs[1], Segment::Literal("4"));
    }

    #[test]
    fn test_segments_sibling_blocks() {
        let segs: Vec<_> = pattern()
            .segments("[if a]1[endif][if b]2[endif]")
            .collect();
        assert_eq!(segs.len(), 2);
        assert!(segs.iter().all(|s| matches!(s, Segment::Block(_))));
    }

    #[test]
    fn test_replace_nested_both_true() {
        assert_eq!(resolve("[if a][if b]X[endif][endif]", &["a", "b"]), "X");
    }

    #[test]
    fn test_replace_nested_inner_false_does_not_leak() {
        assert_eq!(resolve("[if a][if b]X[endif][endif]", &["a"]), "");
        assert_eq!(resolve("[if a]<[if b]X[endif]>[endif]", &["a"]), "<>");
    }

    #[test]
    fn test_replace_outer_false_skips_inner() {
        assert_eq!(resolve("[if a][if b]X[endif][endif]!", &["b"]), "!");
    }

    #[test]
    fn test_replace_deep_nesting() {
        let text = "[if a][if a][if a][if a]deep[endif][endif][endif][endif]";
        assert_eq!(resolve(text, &["a"]), "deep");
    }

    #[test]
    fn test_unterminated_start_is_kept_and_rest_resolved() {
        let text = "x[if a]y[if b]z[endif]";
        let segs: Vec<_> = pattern().segments(text).collect();
        assert_eq!(segs[0], Segment::Literal("x"));
        assert_eq!(
            segs[1],
            Segment::Unbalanced {
                kind: Unbalanced::Start,
                marker: "[if a]"
            }
        );
        assert_eq!(resolve(text, &["b"]), "x[if a]yz");
    }

    #[test]
    fn test_stray_end_is_kept() {
        let segs: Vec<_> = pattern().segments("a[endif]b").collect();
        assert_eq!(
            segs,
            vec![
                Segment::Literal("a"),
                Segment::Unbalanced {
                    kind: Unbalanced::End,
                    marker: "[endif]"
                },
                Segment::Literal("b"),
            ]
        );
    }

    #[test]
    fn test_handler_error_propagates() {
        let result = pattern().replace("[if a]x[endif]", &|_, _| Err("boom".to_string()));
        assert_eq!(result, Err("boom".to_string()));
    }
}
