//! Evaluation of parsed test expressions against a flattened context

use crate::context::{Context, Value};
use crate::expression::ast::{BinaryOp, Expr, UnaryOp};

/// Evaluate `expr`; unknown names yield [`Value::Undefined`] instead of failing
pub fn evaluate(expr: &Expr, ctx: &Context) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Variable(name) => ctx.lookup(name).cloned().unwrap_or_default(),
        Expr::Call { callee, args } => match ctx.lookup(callee) {
            Some(Value::Function(f)) => {
                let args: Vec<Value> = args.iter().map(|a| evaluate(a, ctx)).collect();
                f.call(ctx, &args)
            }
            _ => Value::Undefined,
        },
        Expr::Unary(op, operand) => {
            let value = evaluate(operand, ctx);
            match op {
                UnaryOp::Not => Value::Bool(!value.is_truthy()),
                UnaryOp::Neg => Value::Number(-value.to_number()),
                UnaryOp::Plus => Value::Number(value.to_number()),
            }
        }
        Expr::Binary(lhs, BinaryOp::And, rhs) => {
            let left = evaluate(lhs, ctx);
            if left.is_truthy() {
                evaluate(rhs, ctx)
            } else {
                left
            }
        }
        Expr::Binary(lhs, BinaryOp::Or, rhs) => {
            let left = evaluate(lhs, ctx);
            if left.is_truthy() {
                left
            } else {
                evaluate(rhs, ctx)
            }
        }
        Expr::Binary(lhs, op, rhs) => {
            let left = evaluate(lhs, ctx);
            let right = evaluate(rhs, ctx);
            apply_binary(*op, &left, &right)
        }
        Expr::Conditional {
            test,
            then,
            otherwise,
        } => {
            if evaluate(test, ctx).is_truthy() {
                evaluate(then, ctx)
            } else {
                evaluate(otherwise, ctx)
            }
        }
    }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            if is_textual(left) || is_textual(right) {
                Value::String(format!("{}{}", left, right))
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Less => Value::Bool(compare(left, right, |o| o.is_lt())),
        BinaryOp::LessOrEqual => Value::Bool(compare(left, right, |o| o.is_le())),
        BinaryOp::Greater => Value::Bool(compare(left, right, |o| o.is_gt())),
        BinaryOp::GreaterOrEqual => Value::Bool(compare(left, right, |o| o.is_ge())),
        BinaryOp::Eq => Value::Bool(loose_eq(left, right)),
        BinaryOp::NotEq => Value::Bool(!loose_eq(left, right)),
        BinaryOp::StrictEq => Value::Bool(strict_eq(left, right)),
        BinaryOp::StrictNotEq => Value::Bool(!strict_eq(left, right)),
        // Short-circuiting operators are handled in `evaluate`
        BinaryOp::And | BinaryOp::Or => Value::Undefined,
    }
}

/// Values that `+` concatenates rather than adds
fn is_textual(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::List(_) | Value::Map(_) | Value::Function(_)
    )
}

/// Relational comparison: strings compare lexically, everything else numerically
fn compare(left: &Value, right: &Value, test: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return test(a.cmp(b));
    }
    match left.to_number().partial_cmp(&right.to_number()) {
        Some(ordering) => test(ordering),
        None => false,
    }
}

fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a == b,
        _ => left == right,
    }
}

/// `==` with the usual coercions between numbers, strings and booleans
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Bool(_), _) => loose_eq(&Value::Number(left.to_number()), right),
        (_, Value::Bool(_)) => loose_eq(left, &Value::Number(right.to_number())),
        (Value::Number(a), Value::String(_)) => *a == right.to_number(),
        (Value::String(_), Value::Number(b)) => left.to_number() == *b,
        (Value::Number(_) | Value::String(_), Value::List(_) | Value::Map(_)) => {
            loose_eq(left, &Value::String(right.to_string()))
        }
        (Value::List(_) | Value::Map(_), Value::Number(_) | Value::String(_)) => {
            loose_eq(&Value::String(left.to_string()), right)
        }
        _ => strict_eq(left, right),
    }
}
