//! Lexer for test expressions using logos

use logos::Logos;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Literal keywords
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("undefined")]
    Undefined,

    // Equality operators (longer patterns first)
    #[token("===")]
    StrictEq,
    #[token("!==")]
    StrictNotEq,
    #[token("==")]
    Eq,
    #[token("!=")]
    NotEq,
    // A lone `=` is read as equality, never assignment
    #[token("=")]
    Assign,

    // Relational operators
    #[token("<=")]
    LessOrEqual,
    #[token(">=")]
    GreaterOrEqual,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,

    // Logical operators
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("!")]
    Bang,

    // Arithmetic
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    // Delimiters
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,

    // Identifiers must come after keywords
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unescape(lex.slice()))]
    String(String),

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    /// Input the lexer could not recognise
    Error(String),
}

/// Strip the quotes of a string literal and resolve backslash escapes
fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Lex input string into tokens with spans
///
/// Unrecognised input becomes [`Token::Error`] so the parser can report it.
pub fn lex(input: &str) -> impl Iterator<Item = (Token, Span)> + '_ {
    let mut lexer = Token::lexer(input);
    std::iter::from_fn(move || {
        let tok = lexer.next()?;
        let span = lexer.span();
        Some(match tok {
            Ok(t) => (t, span),
            Err(()) => (Token::Error(lexer.slice().to_string()), span),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input).map(|(t, _)| t).collect()
    }

    #[test]
    fn test_equality_operators() {
        assert_eq!(
            tokens("=== !== == != ="),
            vec![
                Token::StrictEq,
                Token::StrictNotEq,
                Token::Eq,
                Token::NotEq,
                Token::Assign
            ]
        );
    }

    #[test]
    fn test_single_equals_between_identifiers() {
        assert_eq!(
            tokens("a=1"),
            vec![Token::Ident("a".to_string()), Token::Assign, Token::Number(1.0)]
        );
    }

    #[test]
    fn test_relational_operators_are_not_split() {
        assert_eq!(
            tokens("a<=1 b>=2"),
            vec![
                Token::Ident("a".to_string()),
                Token::LessOrEqual,
                Token::Number(1.0),
                Token::Ident("b".to_string()),
                Token::GreaterOrEqual,
                Token::Number(2.0),
            ]
        );
    }

    #[test]
    fn test_strings_with_both_quotes() {
        assert_eq!(
            tokens(r#""dev" 'prod' "it\"s""#),
            vec![
                Token::String("dev".to_string()),
                Token::String("prod".to_string()),
                Token::String("it\"s".to_string()),
            ]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            tokens("true false null undefined trueish"),
            vec![
                Token::True,
                Token::False,
                Token::Null,
                Token::Undefined,
                Token::Ident("trueish".to_string())
            ]
        );
    }

    #[test]
    fn test_dotted_path() {
        assert_eq!(
            tokens("site.debug"),
            vec![
                Token::Ident("site".to_string()),
                Token::Dot,
                Token::Ident("debug".to_string())
            ]
        );
    }

    #[test]
    fn test_logical_and_ternary() {
        assert_eq!(
            tokens("!a && b || c ? 1 : 2"),
            vec![
                Token::Bang,
                Token::Ident("a".to_string()),
                Token::And,
                Token::Ident("b".to_string()),
                Token::Or,
                Token::Ident("c".to_string()),
                Token::Question,
                Token::Number(1.0),
                Token::Colon,
                Token::Number(2.0),
            ]
        );
    }

    #[test]
    fn test_unknown_input_becomes_error_token() {
        let toks = tokens("a # b");
        assert_eq!(toks[1], Token::Error("#".to_string()));
    }
}
