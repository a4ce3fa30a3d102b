//! Parser implementation using chumsky
//!
//! Precedence, loosest first: ternary, `||`, `&&`, equality, relational,
//! additive, multiplicative, unary prefix, atoms.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::context::Value;
use crate::error::ExpressionError;
use crate::expression::ast::*;
use crate::expression::lexer::Token;

/// Parse a test expression into an AST
pub fn parse(input: &str) -> Result<Expr, Vec<ExpressionError>> {
    let len = input.len();

    // Create a logos lexer and convert to token stream
    let token_iter = crate::expression::lexer::lex(input).map(|(tok, span)| (tok, span.into()));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    expression_parser()
        .then_ignore(end())
        .parse(token_stream)
        .into_result()
        .map_err(|errs| {
            errs.into_iter()
                .map(|e| ExpressionError::from_rich(e, input))
                .collect()
        })
}

fn expression_parser<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let literal = select! {
            Token::Number(n) => Expr::Literal(Value::Number(n)),
            Token::String(s) => Expr::Literal(Value::String(s)),
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
            Token::Null => Expr::Literal(Value::Null),
            Token::Undefined => Expr::Literal(Value::Undefined),
        };

        // Dotted names address flattened keys directly: `site.debug`
        let name = select! { Token::Ident(s) => s }
            .separated_by(just(Token::Dot))
            .at_least(1)
            .collect::<Vec<_>>()
            .map(|segments| segments.join("."));

        let arguments = expr
            .clone()
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

        let reference = name.then(arguments.or_not()).map(|(name, args)| match args {
            Some(args) => Expr::Call { callee: name, args },
            None => Expr::Variable(name),
        });

        let atom = choice((
            literal,
            reference,
            expr.clone()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        ))
        .boxed();

        let unary = choice((
            just(Token::Bang).to(UnaryOp::Not),
            just(Token::Minus).to(UnaryOp::Neg),
            just(Token::Plus).to(UnaryOp::Plus),
        ))
        .repeated()
        .foldr(atom, Expr::unary)
        .boxed();

        let product = unary
            .clone()
            .foldl(
                choice((
                    just(Token::Star).to(BinaryOp::Mul),
                    just(Token::Slash).to(BinaryOp::Div),
                    just(Token::Percent).to(BinaryOp::Rem),
                ))
                .then(unary)
                .repeated(),
                |lhs, (op, rhs)| Expr::binary(lhs, op, rhs),
            )
            .boxed();

        let sum = product
            .clone()
            .foldl(
                choice((
                    just(Token::Plus).to(BinaryOp::Add),
                    just(Token::Minus).to(BinaryOp::Sub),
                ))
                .then(product)
                .repeated(),
                |lhs, (op, rhs)| Expr::binary(lhs, op, rhs),
            )
            .boxed();

        let relational = sum
            .clone()
            .foldl(
                choice((
                    just(Token::LessOrEqual).to(BinaryOp::LessOrEqual),
                    just(Token::GreaterOrEqual).to(BinaryOp::GreaterOrEqual),
                    just(Token::Less).to(BinaryOp::Less),
                    just(Token::Greater).to(BinaryOp::Greater),
                ))
                .then(sum)
                .repeated(),
                |lhs, (op, rhs)| Expr::binary(lhs, op, rhs),
            )
            .boxed();

        let equality = relational
            .clone()
            .foldl(
                choice((
                    just(Token::StrictEq).to(BinaryOp::StrictEq),
                    just(Token::StrictNotEq).to(BinaryOp::StrictNotEq),
                    just(Token::Eq).to(BinaryOp::Eq),
                    just(Token::Assign).to(BinaryOp::Eq),
                    just(Token::NotEq).to(BinaryOp::NotEq),
                ))
                .then(relational)
                .repeated(),
                |lhs, (op, rhs)| Expr::binary(lhs, op, rhs),
            )
            .boxed();

        let and = equality
            .clone()
            .foldl(
                just(Token::And).to(BinaryOp::And).then(equality).repeated(),
                |lhs, (op, rhs)| Expr::binary(lhs, op, rhs),
            )
            .boxed();

        let or = and
            .clone()
            .foldl(
                just(Token::Or).to(BinaryOp::Or).then(and).repeated(),
                |lhs, (op, rhs)| Expr::binary(lhs, op, rhs),
            )
            .boxed();

        or.then(
            just(Token::Question)
                .ignore_then(expr.clone())
                .then_ignore(just(Token::Colon))
                .then(expr)
                .or_not(),
        )
        .map(|(test, branches)| match branches {
            Some((then, otherwise)) => Expr::Conditional {
                test: Box::new(test),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            None => test,
        })
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Variable(name.to_string())
    }

    fn num(n: f64) -> Expr {
        Expr::Literal(Value::Number(n))
    }

    #[test]
    fn test_parse_single_equals_as_equality() {
        let expr = parse("a=1").expect("Should parse");
        assert_eq!(expr, Expr::binary(var("a"), BinaryOp::Eq, num(1.0)));
    }

    #[test]
    fn test_parse_dotted_variable() {
        let expr = parse("site.debug").expect("Should parse");
        assert_eq!(expr, var("site.debug"));
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse("a || b && c").expect("Should parse");
        assert_eq!(
            expr,
            Expr::binary(
                var("a"),
                BinaryOp::Or,
                Expr::binary(var("b"), BinaryOp::And, var("c"))
            )
        );
    }

    #[test]
    fn test_parse_arithmetic_binds_tighter_than_comparison() {
        let expr = parse("1 + 2 * 3 > 6").expect("Should parse");
        assert_eq!(
            expr,
            Expr::binary(
                Expr::binary(
                    num(1.0),
                    BinaryOp::Add,
                    Expr::binary(num(2.0), BinaryOp::Mul, num(3.0))
                ),
                BinaryOp::Greater,
                num(6.0)
            )
        );
    }

    #[test]
    fn test_parse_unary_chain() {
        let expr = parse("!!a").expect("Should parse");
        assert_eq!(
            expr,
            Expr::unary(UnaryOp::Not, Expr::unary(UnaryOp::Not, var("a")))
        );
    }

    #[test]
    fn test_parse_call() {
        let expr = parse("isEnabled('x', y)").expect("Should parse");
        assert_eq!(
            expr,
            Expr::Call {
                callee: "isEnabled".to_string(),
                args: vec![Expr::Literal(Value::from("x")), var("y")],
            }
        );
    }

    #[test]
    fn test_parse_ternary() {
        let expr = parse("a ? 1 : 2").expect("Should parse");
        assert!(matches!(expr, Expr::Conditional { .. }));
    }

    #[test]
    fn test_parse_parentheses() {
        let expr = parse("(a || b) && c").expect("Should parse");
        assert_eq!(
            expr,
            Expr::binary(
                Expr::binary(var("a"), BinaryOp::Or, var("b")),
                BinaryOp::And,
                var("c")
            )
        );
    }

    #[test]
    fn test_parse_error_on_dangling_operator() {
        let result = parse("a &&");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_error_on_unknown_character() {
        let errs = parse("a # b").expect_err("Should fail");
        assert!(!errs.is_empty());
    }
}
