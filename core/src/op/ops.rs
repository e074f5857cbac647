use std::cmp::Ordering;

use crate::{
    error::{ErrorKind, OpResult},
    val::{StrHandle, Value},
};

use super::{BinOp, UnaryOp};

pub(crate) fn err_op<R>(l: &Value, op: BinOp, r: &Value) -> OpResult<R> {
    Err(ErrorKind::InvalidOperands {
        op: op.symbol(),
        lhs: l.type_name(),
        rhs: r.type_name(),
    })
}

fn err_unary<R>(op: &'static str, v: &Value) -> OpResult<R> {
    Err(ErrorKind::InvalidOperand {
        op,
        operand: v.type_name(),
    })
}

fn flag(b: bool) -> Value {
    Value::Int(b as i64)
}

fn tri(ord: Ordering) -> i32 {
    match ord {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// Apply a binary operator to two already-evaluated operands.
pub fn binary(op: BinOp, l: &Value, r: &Value) -> OpResult<Value> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => arith(op, l, r),
        BinOp::Shl | BinOp::Shr | BinOp::BitAnd | BinOp::BitOr | BinOp::Xor => bitwise(op, l, r),
        BinOp::LogAnd => Ok(flag(l.is_truthy() && r.is_truthy())),
        BinOp::LogOr => Ok(flag(l.is_truthy() || r.is_truthy())),
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => relational(op, l, r),
    }
}

fn arith(op: BinOp, l: &Value, r: &Value) -> OpResult<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => int_arith(op, *a, *b).map(Value::Int),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (Some(a), Some(b)) = (l.as_number(), r.as_number()) else {
                return err_op(l, op, r);
            };
            Ok(Value::Float(float_arith(op, a, b)))
        }
        (Value::Str(a), Value::Str(b)) if op == BinOp::Add => Ok(Value::Str(StrHandle::concat(a, b))),
        _ => err_op(l, op, r),
    }
}

fn int_arith(op: BinOp, a: i64, b: i64) -> OpResult<i64> {
    Ok(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div | BinOp::Mod if b == 0 => return Err(ErrorKind::DivideByZero),
        BinOp::Div => a.wrapping_div(b),
        BinOp::Mod => a.wrapping_rem(b),
        _ => crate::bug!("'{op}' routed to integer arithmetic"),
    })
}

fn float_arith(op: BinOp, a: f64, b: f64) -> f64 {
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Mod => a % b,
        _ => crate::bug!("'{op}' routed to float arithmetic"),
    }
}

fn bitwise(op: BinOp, l: &Value, r: &Value) -> OpResult<Value> {
    let (Value::Int(a), Value::Int(b)) = (l, r) else {
        return err_op(l, op, r);
    };
    let (a, b) = (*a, *b);
    let shift = || u32::try_from(b).ok().filter(|s| *s < 64).ok_or(ErrorKind::BadShift(b));
    Ok(Value::Int(match op {
        BinOp::Shl => a.wrapping_shl(shift()?),
        BinOp::Shr => a.wrapping_shr(shift()?),
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::Xor => a ^ b,
        _ => crate::bug!("'{op}' routed to bitwise"),
    }))
}

/// Three-way comparison: -1, 0 or 1.
///
/// Defined for numbers (mixed int/float compares as float), strings
/// (bytewise) and two empties.
pub fn compare(l: &Value, r: &Value) -> OpResult<i32> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(tri(a.cmp(b))),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (Some(a), Some(b)) = (l.as_number(), r.as_number()) else {
                return err_op(l, BinOp::Lt, r);
            };
            Ok(if a == b {
                0
            } else if a < b {
                -1
            } else {
                1
            })
        }
        (Value::Str(a), Value::Str(b)) => Ok(a.with_bytes(|a| b.with_bytes(|b| tri(a.cmp(b))))),
        (Value::Empty, Value::Empty) => Ok(0),
        _ => err_op(l, BinOp::Lt, r),
    }
}

fn relational(op: BinOp, l: &Value, r: &Value) -> OpResult<Value> {
    if matches!(op, BinOp::Eq | BinOp::Ne) {
        let equal = match (l, r) {
            (Value::Array(_), Value::Array(_))
            | (Value::Object(_), Value::Object(_))
            | (Value::Function(_), Value::Function(_)) => l.heap_id() == r.heap_id(),
            _ if l.kind() == r.kind() || (l.kind().is_numeric() && r.kind().is_numeric()) => {
                match compare(l, r) {
                    Ok(c) => c == 0,
                    Err(_) => return err_op(l, op, r),
                }
            }
            _ => false,
        };
        return Ok(flag(equal == (op == BinOp::Eq)));
    }
    let c = compare(l, r).or_else(|_| err_op(l, op, r))?;
    Ok(flag(match op {
        BinOp::Lt => c < 0,
        BinOp::Le => c <= 0,
        BinOp::Gt => c > 0,
        _ => c >= 0,
    }))
}

pub fn unary(op: UnaryOp, v: &Value) -> OpResult<Value> {
    match (op, v) {
        (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Not, _) => Ok(flag(!v.is_truthy())),
        (UnaryOp::BitNot, Value::Int(i)) => Ok(Value::Int(!i)),
        _ => err_unary(op.symbol(), v),
    }
}

/// In-place `++`.
pub fn incr(v: &mut Value) -> OpResult<()> {
    match v {
        Value::Int(i) => *i = i.wrapping_add(1),
        Value::Float(f) => *f += 1.0,
        _ => return err_unary("++", v),
    }
    Ok(())
}

/// In-place `--`.
pub fn decr(v: &mut Value) -> OpResult<()> {
    match v {
        Value::Int(i) => *i = i.wrapping_sub(1),
        Value::Float(f) => *f -= 1.0,
        _ => return err_unary("--", v),
    }
    Ok(())
}

/// Typed assignment.
///
/// An empty target takes anything and numbers convert between int and
/// float. Otherwise the kinds must match; aggregates are shared, not copied.
pub fn mov(to: &mut Value, from: &Value) -> OpResult<()> {
    let next = match (&*to, from) {
        (_, Value::Ptr(_)) => {
            return Err(ErrorKind::IncompatibleAssign {
                to: to.type_name(),
                from: from.type_name(),
            });
        }
        (Value::Empty, _) | (_, Value::Empty) => from.clone(),
        (Value::Int(_), Value::Float(f)) => Value::Int(*f as i64),
        (Value::Float(_), Value::Int(i)) => Value::Float(*i as f64),
        _ if to.kind() == from.kind() => from.clone(),
        _ => {
            return Err(ErrorKind::IncompatibleAssign {
                to: to.type_name(),
                from: from.type_name(),
            });
        }
    };
    *to = next;
    Ok(())
}

/// Unconditional overwrite, used when binding fresh storage.
pub fn clobber(to: &mut Value, from: &Value) -> OpResult<()> {
    if matches!(from, Value::Ptr(_)) {
        return Err(ErrorKind::IncompatibleAssign {
            to: to.type_name(),
            from: from.type_name(),
        });
    }
    *to = from.clone();
    Ok(())
}
