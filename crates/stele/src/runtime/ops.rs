// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

//! Operators, comparisons, containment, iteration and subscripting.

use super::format::{percent_format, repr};
use super::value::{AccessorKind, Key, Value};
use super::{frame, groupby, series};
use crate::ast::{BinOp, CmpOp, UnaryOp};
use crate::error::{ErrorKind, RtResult, RuntimeError};
use chrono::TimeDelta;
use std::cmp::Ordering;
use std::rc::Rc;

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn num(value: &Value) -> Option<Num> {
    match value {
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn unsupported(op: &str, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        left.type_name(),
        right.type_name()
    ))
}

/// Longest string or list a repetition may build.
pub const MAX_REPEAT_LEN: usize = 1 << 24;

fn repeat_len(len: usize, times: i64) -> RtResult<usize> {
    let times = usize::try_from(times.max(0)).map_err(|_| {
        RuntimeError::new(ErrorKind::OverflowError, "cannot fit 'int' into an index-sized integer")
    })?;
    let total = len.checked_mul(times).ok_or_else(|| {
        RuntimeError::new(ErrorKind::OverflowError, "repeated sequence is too long")
    })?;
    if total > MAX_REPEAT_LEN {
        return Err(RuntimeError::new(
            ErrorKind::MemoryError,
            format!("repeated sequence of {total} items exceeds the {MAX_REPEAT_LEN} item limit"),
        ));
    }
    Ok(total)
}

/// Elements a `str`/`list`/`tuple` repetition would build; zero for every
/// other operation. The interpreter charges this as gas before evaluating.
pub fn repeat_cost(op: BinOp, left: &Value, right: &Value) -> RtResult<u64> {
    if op != BinOp::Mul {
        return Ok(0);
    }
    let (len, times) = match (left, right) {
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => (s.len(), *n),
        (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
            (items.borrow().len(), *n)
        }
        (Value::Tuple(items), Value::Int(n)) | (Value::Int(n), Value::Tuple(items)) => (items.len(), *n),
        _ => return Ok(0),
    };
    repeat_len(len, times).map(|total| total as u64)
}

pub fn binary_op(op: BinOp, left: &Value, right: &Value) -> RtResult<Value> {
    match (left, right) {
        (Value::Series(s), other) => return series::binary(op, s, other, false).map(Value::series),
        (other, Value::Series(s)) => return series::binary(op, s, other, true).map(Value::series),
        (Value::Frame(f), other) => {
            let result = frame::binary(op, &f.borrow(), other, false)?;
            return Ok(Value::frame(result));
        }
        (other, Value::Frame(f)) => {
            let result = frame::binary(op, &f.borrow(), other, true)?;
            return Ok(Value::frame(result));
        }
        _ => {}
    }
    scalar_binary(op, left, right)
}

fn int_or_float(value: Option<i64>, fallback: f64) -> Value {
    value.map_or(Value::Float(fallback), Value::Int)
}

fn floor_mod_int(a: i64, b: i64) -> i64 {
    let r = a % b;
    if r != 0 && ((r < 0) != (b < 0)) {
        r + b
    } else {
        r
    }
}

fn floor_mod_float(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
        r + b
    } else {
        r
    }
}

fn repeat_items(items: &[Value], times: i64) -> RtResult<Vec<Value>> {
    let mut out = Vec::with_capacity(repeat_len(items.len(), times)?);
    for _ in 0..times.max(0) {
        out.extend(items.iter().cloned());
    }
    Ok(out)
}

pub fn scalar_binary(op: BinOp, left: &Value, right: &Value) -> RtResult<Value> {
    if let (Some(a), Some(b)) = (num(left), num(right)) {
        if op == BinOp::BitAnd || op == BinOp::BitOr || op == BinOp::BitXor {
            if let (Value::Bool(x), Value::Bool(y)) = (left, right) {
                return Ok(Value::Bool(match op {
                    BinOp::BitAnd => *x && *y,
                    BinOp::BitOr => *x || *y,
                    _ => x ^ y,
                }));
            }
        }
        return numeric_binary(op, a, b, left, right);
    }

    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{a}{b}"))),
        (BinOp::Add, Value::Str(_), other) => Err(RuntimeError::type_error(format!(
            "can only concatenate str (not \"{}\") to str",
            other.type_name()
        ))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOp::Add, Value::List(_), other) => Err(RuntimeError::type_error(format!(
            "can only concatenate list (not \"{}\") to list",
            other.type_name()
        ))),
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            let mut items = a.to_vec();
            items.extend(b.iter().cloned());
            Ok(Value::tuple(items))
        }
        (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
            repeat_len(s.len(), *n)?;
            Ok(Value::str(s.repeat((*n).max(0) as usize)))
        }
        (BinOp::Mul, Value::List(items), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::List(items)) => {
            let items = items.borrow();
            Ok(Value::list(repeat_items(&items, *n)?))
        }
        (BinOp::Mul, Value::Tuple(items), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Tuple(items)) => {
            Ok(Value::tuple(repeat_items(items, *n)?))
        }
        (BinOp::Mod, Value::Str(template), args) => Ok(Value::str(percent_format(template, args)?)),
        (BinOp::Add, Value::Timestamp(ts), Value::Timedelta(d))
        | (BinOp::Add, Value::Timedelta(d), Value::Timestamp(ts)) => ts
            .checked_add_signed(*d)
            .map(Value::Timestamp)
            .ok_or_else(|| RuntimeError::value_error("timestamp out of range")),
        (BinOp::Sub, Value::Timestamp(ts), Value::Timedelta(d)) => ts
            .checked_sub_signed(*d)
            .map(Value::Timestamp)
            .ok_or_else(|| RuntimeError::value_error("timestamp out of range")),
        (BinOp::Sub, Value::Timestamp(a), Value::Timestamp(b)) => Ok(Value::Timedelta(*a - *b)),
        (BinOp::Add, Value::Timedelta(a), Value::Timedelta(b)) => Ok(Value::Timedelta(*a + *b)),
        (BinOp::Sub, Value::Timedelta(a), Value::Timedelta(b)) => Ok(Value::Timedelta(*a - *b)),
        (BinOp::Div, Value::Timedelta(a), Value::Timedelta(b)) => {
            let denominator = b.num_milliseconds();
            if denominator == 0 {
                return Err(RuntimeError::zero_division("division by zero"));
            }
            Ok(Value::Float(a.num_milliseconds() as f64 / denominator as f64))
        }
        (BinOp::Mul, Value::Timedelta(d), factor) | (BinOp::Mul, factor, Value::Timedelta(d)) => {
            let factor = factor.as_f64().ok_or_else(|| unsupported("*", left, right))?;
            Ok(Value::Timedelta(TimeDelta::milliseconds(
                (d.num_milliseconds() as f64 * factor) as i64,
            )))
        }
        (BinOp::Div, Value::Timedelta(d), divisor) => {
            let divisor = divisor.as_f64().ok_or_else(|| unsupported("/", left, right))?;
            if divisor == 0.0 {
                return Err(RuntimeError::zero_division("division by zero"));
            }
            Ok(Value::Timedelta(TimeDelta::milliseconds(
                (d.num_milliseconds() as f64 / divisor) as i64,
            )))
        }
        _ => Err(unsupported(op.symbol(), left, right)),
    }
}

fn numeric_binary(op: BinOp, a: Num, b: Num, left: &Value, right: &Value) -> RtResult<Value> {
    use Num::{Float, Int};
    let fa = match a {
        Int(i) => i as f64,
        Float(f) => f,
    };
    let fb = match b {
        Int(i) => i as f64,
        Float(f) => f,
    };
    Ok(match (op, a, b) {
        (BinOp::Add, Int(x), Int(y)) => int_or_float(x.checked_add(y), fa + fb),
        (BinOp::Sub, Int(x), Int(y)) => int_or_float(x.checked_sub(y), fa - fb),
        (BinOp::Mul, Int(x), Int(y)) => int_or_float(x.checked_mul(y), fa * fb),
        (BinOp::Add, ..) => Value::Float(fa + fb),
        (BinOp::Sub, ..) => Value::Float(fa - fb),
        (BinOp::Mul, ..) => Value::Float(fa * fb),
        (BinOp::Div, ..) => {
            if fb == 0.0 {
                return Err(RuntimeError::zero_division(match b {
                    Int(_) if matches!(a, Int(_)) => "division by zero",
                    _ => "float division by zero",
                }));
            }
            Value::Float(fa / fb)
        }
        (BinOp::FloorDiv, Int(x), Int(y)) => {
            if y == 0 {
                return Err(RuntimeError::zero_division("integer division or modulo by zero"));
            }
            Value::Int((x - floor_mod_int(x, y)) / y)
        }
        (BinOp::FloorDiv, ..) => {
            if fb == 0.0 {
                return Err(RuntimeError::zero_division("float floor division by zero"));
            }
            Value::Float((fa / fb).floor())
        }
        (BinOp::Mod, Int(x), Int(y)) => {
            if y == 0 {
                return Err(RuntimeError::zero_division("integer modulo by zero"));
            }
            Value::Int(floor_mod_int(x, y))
        }
        (BinOp::Mod, ..) => {
            if fb == 0.0 {
                return Err(RuntimeError::zero_division("float modulo"));
            }
            Value::Float(floor_mod_float(fa, fb))
        }
        (BinOp::Pow, Int(x), Int(y)) if y >= 0 => match u32::try_from(y).ok().and_then(|e| x.checked_pow(e)) {
            Some(v) => Value::Int(v),
            None => Value::Float(fa.powf(fb)),
        },
        (BinOp::Pow, ..) => {
            if fa == 0.0 && fb < 0.0 {
                return Err(RuntimeError::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            Value::Float(fa.powf(fb))
        }
        (BinOp::BitAnd, Int(x), Int(y)) => Value::Int(x & y),
        (BinOp::BitOr, Int(x), Int(y)) => Value::Int(x | y),
        (BinOp::BitXor, Int(x), Int(y)) => Value::Int(x ^ y),
        (BinOp::LShift, Int(x), Int(y)) if (0..63).contains(&y) => Value::Int(x << y),
        (BinOp::RShift, Int(x), Int(y)) if y >= 0 => Value::Int(x >> y.min(63)),
        _ => return Err(unsupported(op.symbol(), left, right)),
    })
}

pub fn unary_op(op: UnaryOp, value: &Value) -> RtResult<Value> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy()?)),
        (_, Value::Series(s)) => series::unary(op, s).map(Value::series),
        (UnaryOp::Neg, Value::Int(i)) => Ok(i.checked_neg().map_or(Value::Float(-(*i as f64)), Value::Int)),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-i64::from(*b))),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, Value::Timedelta(d)) => Ok(Value::Timedelta(-*d)),
        (UnaryOp::Pos, v @ (Value::Int(_) | Value::Float(_) | Value::Timedelta(_))) => Ok(v.clone()),
        (UnaryOp::Pos, Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
        (UnaryOp::Invert, Value::Int(i)) => Ok(Value::Int(!i)),
        (UnaryOp::Invert, Value::Bool(b)) => Ok(Value::Int(!i64::from(*b))),
        (op, v) => {
            let symbol = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                _ => "~",
            };
            Err(RuntimeError::type_error(format!(
                "bad operand type for unary {symbol}: '{}'",
                v.type_name()
            )))
        }
    }
}

pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bytes(a), Value::Bytes(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Dict(a), Value::Dict(b)) => {
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len()
                && a.items().iter().all(|(k, v)| {
                    matches!(b.get(k), Ok(Some(other)) if values_equal(v, &other))
                })
        }
        (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
        (Value::Timedelta(a), Value::Timedelta(b)) => a == b,
        (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
        (Value::Series(a), Value::Series(b)) => Rc::ptr_eq(a, b),
        (Value::Frame(a), Value::Frame(b)) => Rc::ptr_eq(a, b),
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
        (Value::Module(a), Value::Module(b)) => a.name == b.name,
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
        (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
        (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Bool(_), _) | (_, Value::Bool(_)) => false,
        (Value::None, Value::None) => true,
        (Value::None, _) | (_, Value::None) => false,
        (a, b) => values_equal(a, b),
    }
}

/// Ordering used by `<` and sorting; `None` when the values are
/// unordered (NaN involved).
pub fn compare_values(left: &Value, right: &Value) -> RtResult<Option<Ordering>> {
    Ok(match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (Value::Timedelta(a), Value::Timedelta(b)) => Some(a.cmp(b)),
        (Value::Tuple(a), Value::Tuple(b)) => sequence_order(a, b)?,
        (Value::List(a), Value::List(b)) => sequence_order(&a.borrow(), &b.borrow())?,
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => {
                return Err(RuntimeError::type_error(format!(
                    "'<' not supported between instances of '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                )))
            }
        },
    })
}

fn sequence_order(a: &[Value], b: &[Value]) -> RtResult<Option<Ordering>> {
    for (x, y) in a.iter().zip(b.iter()) {
        if values_equal(x, y) {
            continue;
        }
        return compare_values(x, y);
    }
    Ok(Some(a.len().cmp(&b.len())))
}

/// Total order for sorting; unordered pairs compare equal.
pub fn sort_order(left: &Value, right: &Value) -> RtResult<Ordering> {
    Ok(compare_values(left, right)?.unwrap_or(Ordering::Equal))
}

pub fn compare_op(op: CmpOp, left: &Value, right: &Value) -> RtResult<Value> {
    match op {
        CmpOp::In => return contains(right, left).map(Value::Bool),
        CmpOp::NotIn => return contains(right, left).map(|b| Value::Bool(!b)),
        CmpOp::Is => return Ok(Value::Bool(identical(left, right))),
        CmpOp::IsNot => return Ok(Value::Bool(!identical(left, right))),
        _ => {}
    }
    match (left, right) {
        (Value::Series(s), other) => return series::compare(op, s, other, false).map(Value::series),
        (other, Value::Series(s)) => return series::compare(op, s, other, true).map(Value::series),
        (Value::Index(items), other) | (other, Value::Index(items)) => {
            let swapped = matches!(right, Value::Index(_));
            let out: RtResult<Vec<Value>> = items
                .iter()
                .map(|v| {
                    if swapped {
                        compare_op(op, other, v)
                    } else {
                        compare_op(op, v, other)
                    }
                })
                .collect();
            return Ok(Value::series(series::Series::new(None, out?)));
        }
        _ => {}
    }
    scalar_compare(op, left, right).map(Value::Bool)
}

pub fn scalar_compare(op: CmpOp, left: &Value, right: &Value) -> RtResult<bool> {
    Ok(match op {
        CmpOp::Eq => values_equal(left, right),
        CmpOp::NotEq => !values_equal(left, right),
        CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
            let ordering = compare_values(left, right).map_err(|_| {
                RuntimeError::type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op.symbol(),
                    left.type_name(),
                    right.type_name()
                ))
            })?;
            match ordering {
                None => false,
                Some(o) => match op {
                    CmpOp::Lt => o == Ordering::Less,
                    CmpOp::LtE => o != Ordering::Greater,
                    CmpOp::Gt => o == Ordering::Greater,
                    _ => o != Ordering::Less,
                },
            }
        }
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
        CmpOp::Is => identical(left, right),
        CmpOp::IsNot => !identical(left, right),
    })
}

pub fn contains(container: &Value, item: &Value) -> RtResult<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_ref())),
            other => Err(RuntimeError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| values_equal(v, item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Dict(dict) => dict.borrow().contains(item),
        Value::Index(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Series(series) => {
            let key = Key::from_value(item)?;
            Ok(series
                .index
                .iter()
                .any(|label| Key::from_value(label).is_ok_and(|k| k == key)))
        }
        Value::Frame(frame) => Ok(match item {
            Value::Str(name) => frame.borrow().columns.contains_key(name.as_ref()),
            _ => false,
        }),
        other => Err(RuntimeError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

pub fn iterate(value: &Value) -> RtResult<Vec<Value>> {
    Ok(match value {
        Value::List(items) => items.borrow().clone(),
        Value::Tuple(items) => items.to_vec(),
        Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
        Value::Bytes(b) => b.iter().map(|c| Value::Int(i64::from(*c))).collect(),
        Value::Dict(dict) => dict.borrow().keys(),
        Value::Series(series) => series.values.clone(),
        Value::Index(items) => items.as_ref().clone(),
        Value::Frame(frame) => frame.borrow().columns.keys().map(Value::str).collect(),
        Value::GroupBy(gb) => groupby::iterate(gb)?,
        other => {
            return Err(RuntimeError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            )))
        }
    })
}

pub fn length(value: &Value) -> RtResult<usize> {
    Ok(match value {
        Value::Str(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        Value::Dict(dict) => dict.borrow().len(),
        Value::Series(series) => series.len(),
        Value::Index(items) => items.len(),
        Value::Frame(frame) => frame.borrow().len(),
        Value::GroupBy(gb) => gb.group_rows()?.len(),
        other => {
            return Err(RuntimeError::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    })
}

/// Resolves a possibly negative position into `0..len`.
pub fn resolve_position(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { index + len } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

fn sequence_index(what: &str, index: &Value, len: usize) -> RtResult<usize> {
    let Some(position) = index.as_i64() else {
        return Err(RuntimeError::type_error(format!(
            "{what} indices must be integers or slices, not {}",
            index.type_name()
        )));
    };
    resolve_position(position, len)
        .ok_or_else(|| RuntimeError::index_error(format!("{what} index out of range")))
}

pub fn get_item(container: &Value, index: &Value) -> RtResult<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            if let Value::Slice(slice) = index {
                let positions = slice.positions(items.len())?;
                return Ok(Value::list(positions.into_iter().map(|p| items[p].clone()).collect()));
            }
            let position = sequence_index("list", index, items.len())?;
            Ok(items[position].clone())
        }
        Value::Tuple(items) => {
            if let Value::Slice(slice) = index {
                let positions = slice.positions(items.len())?;
                return Ok(Value::tuple(positions.into_iter().map(|p| items[p].clone()).collect()));
            }
            let position = sequence_index("tuple", index, items.len())?;
            Ok(items[position].clone())
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            if let Value::Slice(slice) = index {
                let positions = slice.positions(chars.len())?;
                return Ok(Value::str(positions.into_iter().map(|p| chars[p]).collect::<String>()));
            }
            let position = sequence_index("string", index, chars.len())?;
            Ok(Value::str(chars[position].to_string()))
        }
        Value::Dict(dict) => dict
            .borrow()
            .get(index)?
            .ok_or_else(|| RuntimeError::key_error(repr(index))),
        Value::Index(items) => {
            if let Value::Slice(slice) = index {
                let positions = slice.positions(items.len())?;
                return Ok(Value::Index(Rc::new(positions.into_iter().map(|p| items[p].clone()).collect())));
            }
            let position = sequence_index("index", index, items.len())?;
            Ok(items[position].clone())
        }
        Value::Series(series) => series::get_item(series, index),
        Value::Frame(frame) => frame::get_item(&frame.borrow(), index),
        Value::GroupBy(gb) => groupby::select(gb, index).map(|g| Value::GroupBy(Rc::new(g))),
        Value::Accessor(accessor) => match accessor.kind {
            AccessorKind::ILoc | AccessorKind::Loc => match &accessor.target {
                Value::Series(series) => series::index_with(series, accessor.kind, index),
                Value::Frame(frame) => frame::index_with(&frame.borrow(), accessor.kind, index),
                other => Err(RuntimeError::type_error(format!(
                    "'{}' object is not subscriptable",
                    other.type_name()
                ))),
            },
            AccessorKind::Str => match &accessor.target {
                Value::Series(series) => series::str_subscript(series, index),
                other => Err(RuntimeError::type_error(format!(
                    "'{}' object is not subscriptable",
                    other.type_name()
                ))),
            },
            _ => Err(RuntimeError::type_error(format!(
                "'{}' object is not subscriptable",
                accessor.kind.type_name()
            ))),
        },
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

pub fn set_item(container: &Value, index: &Value, value: Value) -> RtResult<()> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let len = items.len();
            let position = index
                .as_i64()
                .ok_or_else(|| {
                    RuntimeError::type_error(format!(
                        "list indices must be integers or slices, not {}",
                        index.type_name()
                    ))
                })
                .and_then(|i| {
                    resolve_position(i, len).ok_or_else(|| {
                        RuntimeError::index_error("list assignment index out of range")
                    })
                })?;
            items[position] = value;
            Ok(())
        }
        Value::Dict(dict) => dict.borrow_mut().insert(index.clone(), value),
        Value::Frame(frame) => frame::set_item(&mut frame.borrow_mut(), index, value),
        Value::Accessor(accessor) if matches!(accessor.kind, AccessorKind::Loc | AccessorKind::ILoc) => {
            match &accessor.target {
                Value::Frame(frame) => {
                    frame::set_with(&mut frame.borrow_mut(), accessor.kind, index, value)
                }
                _ => Err(RuntimeError::type_error(
                    "item assignment through a Series indexer is not supported",
                )),
            }
        }
        Value::Series(_) => Err(RuntimeError::type_error(
            "'Series' item assignment is not supported; assign through the DataFrame instead",
        )),
        other => Err(RuntimeError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn sort_class(value: &Value) -> u8 {
    match value {
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => 0,
        Value::Str(_) => 1,
        Value::Timestamp(_) => 2,
        Value::Timedelta(_) => 3,
        Value::Tuple(_) => 4,
        Value::List(_) => 5,
        Value::Bytes(_) => 6,
        _ => 7,
    }
}

fn check_sortable(column: &[Value]) -> RtResult<()> {
    let mut present = column.iter().filter(|v| !v.is_missing());
    let Some(first) = present.next() else {
        return Ok(());
    };
    if sort_class(first) == 7 {
        compare_values(first, first)?;
    }
    for value in present {
        if sort_class(value) != sort_class(first) {
            compare_values(value, first)?;
        }
    }
    Ok(())
}

/// Stable ordering of row positions by one or more key columns. Missing
/// values sort last whatever the direction.
pub fn sort_positions(columns: &[&[Value]], ascending: &[bool]) -> RtResult<Vec<usize>> {
    for column in columns {
        check_sortable(column)?;
    }
    let len = columns.first().map_or(0, |c| c.len());
    let mut positions: Vec<usize> = (0..len).collect();
    positions.sort_by(|&a, &b| {
        for (column, &asc) in columns.iter().zip(ascending.iter().chain(std::iter::repeat(&true))) {
            let (x, y) = (&column[a], &column[b]);
            let ordering = match (x.is_missing(), y.is_missing()) {
                (true, true) => Ordering::Equal,
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                _ => {
                    let o = sort_order(x, y).unwrap_or(Ordering::Equal);
                    if asc {
                        o
                    } else {
                        o.reverse()
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(positions)
}

/// Rounds half to even at `digits` decimal places, the way numpy does.
pub fn round_half_even(value: f64, digits: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(digits);
    let scaled = value * scale;
    if !scaled.is_finite() {
        return value;
    }
    let floor = scaled.floor();
    let diff = scaled - floor;
    let rounded = if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if floor % 2.0 == 0.0 {
        floor
    } else {
        floor + 1.0
    };
    rounded / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_division_semantics() {
        assert!(matches!(scalar_binary(BinOp::FloorDiv, &Value::Int(-7), &Value::Int(2)).unwrap(), Value::Int(-4)));
        assert!(matches!(scalar_binary(BinOp::Mod, &Value::Int(-7), &Value::Int(2)).unwrap(), Value::Int(1)));
        assert!(matches!(scalar_binary(BinOp::Div, &Value::Int(7), &Value::Int(2)).unwrap(), Value::Float(f) if f == 3.5));
        let err = scalar_binary(BinOp::Div, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.summary(), "ZeroDivisionError: division by zero");
    }

    #[test]
    fn int_overflow_degrades_to_float() {
        let out = scalar_binary(BinOp::Mul, &Value::Int(i64::MAX), &Value::Int(2)).unwrap();
        assert!(matches!(out, Value::Float(_)));
    }

    #[test]
    fn repetition_is_capped_before_allocating() {
        let err = scalar_binary(BinOp::Mul, &Value::str("ab"), &Value::Int(1 << 62)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MemoryError);
        let list = Value::list(vec![Value::Int(0)]);
        let err = scalar_binary(BinOp::Mul, &list, &Value::Int(i64::MAX)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MemoryError);
        let huge = Value::list(vec![Value::Int(0); 4]);
        assert_eq!(
            repeat_cost(BinOp::Mul, &huge, &Value::Int(i64::MAX)).unwrap_err().kind,
            ErrorKind::OverflowError
        );
    }

    #[test]
    fn repetition_cost_counts_built_elements() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(repeat_cost(BinOp::Mul, &Value::Int(3), &list).unwrap(), 6);
        assert_eq!(repeat_cost(BinOp::Mul, &Value::str("abc"), &Value::Int(-2)).unwrap(), 0);
        assert_eq!(repeat_cost(BinOp::Add, &list, &list).unwrap(), 0);
        let out = scalar_binary(BinOp::Mul, &Value::tuple(vec![Value::Int(7)]), &Value::Int(3)).unwrap();
        assert_eq!(repr(&out), "(7, 7, 7)");
    }

    #[test]
    fn str_plus_int_message() {
        let err = scalar_binary(BinOp::Add, &Value::str("a"), &Value::Int(1)).unwrap_err();
        assert_eq!(err.message, "can only concatenate str (not \"int\") to str");
    }

    #[test]
    fn mixed_numeric_equality_and_ordering() {
        assert!(values_equal(&Value::Int(1), &Value::Float(1.0)));
        assert!(values_equal(&Value::Bool(true), &Value::Int(1)));
        assert!(scalar_compare(CmpOp::Lt, &Value::Int(1), &Value::Float(1.5)).unwrap());
        assert!(scalar_compare(CmpOp::Lt, &Value::str("a"), &Value::Int(1)).is_err());
    }

    #[test]
    fn negative_indexing_and_slices() {
        let list = Value::list((0..5).map(Value::Int).collect());
        assert!(matches!(get_item(&list, &Value::Int(-1)).unwrap(), Value::Int(4)));
        let slice = Value::Slice(Rc::new(super::super::value::SliceValue {
            start: Value::Int(1),
            stop: Value::None,
            step: Value::Int(2),
        }));
        assert_eq!(repr(&get_item(&list, &slice).unwrap()), "[1, 3]");
        assert!(get_item(&list, &Value::Int(9)).is_err());
    }

    #[test]
    fn sorting_puts_missing_last_and_rejects_mixed_types() {
        let column = vec![Value::Int(3), Value::None, Value::Int(1), Value::Float(2.0)];
        assert_eq!(sort_positions(&[&column], &[true]).unwrap(), vec![2, 3, 0, 1]);
        assert_eq!(sort_positions(&[&column], &[false]).unwrap(), vec![0, 3, 2, 1]);
        let mixed = vec![Value::Int(1), Value::str("a")];
        assert!(sort_positions(&[&mixed], &[true]).is_err());
    }

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(round_half_even(2.5, 0), 2.0);
        assert_eq!(round_half_even(3.5, 0), 4.0);
        assert_eq!(round_half_even(1.234, 2), 1.23);
    }

    #[test]
    fn missing_dict_key_is_a_key_error_with_repr() {
        let dict = Value::dict(Default::default());
        let err = get_item(&dict, &Value::str("Sales")).unwrap_err();
        assert_eq!(err.summary(), "KeyError: 'Sales'");
    }
}
