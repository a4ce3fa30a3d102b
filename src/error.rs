//! Error types for test expressions

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::expression::lexer::Token;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("invalid test expression `{expression}` at {span:?}: {message}")]
    Syntax {
        expression: String,
        span: Span,
        message: String,
        expected: Vec<String>,
    },
}

impl ExpressionError {
    /// The offending expression text
    pub fn expression(&self) -> &str {
        match self {
            ExpressionError::Syntax { expression, .. } => expression,
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            ExpressionError::Syntax { span, .. } => span,
        }
    }

    /// Format the error with the expression as source context using ariadne
    pub fn report(&self, filename: &str) -> String {
        let mut buf = Vec::new();
        match self {
            ExpressionError::Syntax {
                expression,
                span,
                message,
                expected,
            } => {
                let expected_str = if expected.is_empty() {
                    String::new()
                } else {
                    format!("\nExpected: {}", expected.join(", "))
                };

                let written = Report::build(ReportKind::Error, filename, span.start)
                    .with_message(message)
                    .with_label(
                        Label::new((filename, span.clone()))
                            .with_message(format!("{}{}", message, expected_str))
                            .with_color(Color::Red),
                    )
                    .finish()
                    .write((filename, Source::from(expression.as_str())), &mut buf);
                if written.is_err() {
                    return self.to_string();
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub(crate) fn from_rich(err: chumsky::error::Rich<'_, Token>, expression: &str) -> Self {
        use chumsky::error::{RichPattern, RichReason};

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => {
                let found_str = match found {
                    Some(tok) => format_token(tok),
                    None => "end of expression".to_string(),
                };
                format!("Unexpected {}", found_str)
            }
            RichReason::Custom(msg) => msg.to_string(),
            #[allow(unreachable_patterns)]
            _ => "malformed expression".to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                RichPattern::Token(tok) => Some(format_token(tok)),
                RichPattern::Label(label) => Some(label.to_string()),
                RichPattern::EndOfInput => Some("end of expression".to_string()),
                #[allow(unreachable_patterns)]
                _ => None,
            })
            .collect();

        ExpressionError::Syntax {
            expression: expression.to_string(),
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

/// Format a token for human-readable error messages
fn format_token(tok: &Token) -> String {
    match tok {
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::String(s) => format!("string \"{}\"", s),
        Token::Number(n) => format!("number {}", n),
        Token::Error(s) => format!("character '{}'", s),
        Token::StrictEq => "'==='".to_string(),
        Token::StrictNotEq => "'!=='".to_string(),
        Token::Eq => "'=='".to_string(),
        Token::NotEq => "'!='".to_string(),
        Token::Assign => "'='".to_string(),
        Token::LessOrEqual => "'<='".to_string(),
        Token::GreaterOrEqual => "'>='".to_string(),
        Token::Less => "'<'".to_string(),
        Token::Greater => "'>'".to_string(),
        Token::And => "'&&'".to_string(),
        Token::Or => "'||'".to_string(),
        Token::Bang => "'!'".to_string(),
        Token::ParenOpen => "'('".to_string(),
        Token::ParenClose => "')'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Question => "'?'".to_string(),
        Token::Colon => "':'".to_string(),
        _ => format!("{:?}", tok),
    }
}
