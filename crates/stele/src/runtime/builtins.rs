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

//! Builtin functions visible in every scope.
//!
//! There is deliberately no `open`, `eval`, `exec` or `__import__`; scripts
//! reach the outside world only through what the host puts in scope.

use crate::ast::{BinOp, CmpOp};
use crate::error::{ErrorKind, RtResult, RuntimeError};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::info;

use super::format::{format_value, repr, to_str};
use super::interpreter::Interpreter;
use super::methods::{get_attribute, mapping_pairs};
use super::ops::{self, round_half_even};
use super::series::{self, unique_values};
use super::value::{Builtin, CallArgs, Dict, NativeFn, Value};

const FUNCTIONS: &[(&str, NativeFn)] = &[
    ("len", len),
    ("sum", sum),
    ("min", min),
    ("max", max),
    ("round", round),
    ("abs", abs),
    ("str", str_),
    ("int", int),
    ("float", float),
    ("bool", bool_),
    ("list", list),
    ("dict", dict),
    ("tuple", tuple),
    ("set", set),
    ("sorted", sorted),
    ("range", range),
    ("enumerate", enumerate),
    ("zip", zip),
    ("isinstance", isinstance),
    ("any", any),
    ("all", all),
    ("print", print),
    ("reversed", reversed),
    ("map", map),
    ("filter", filter),
    ("repr", repr_),
    ("hasattr", hasattr),
    ("getattr", getattr),
    ("divmod", divmod),
    ("pow", pow),
    ("ord", ord),
    ("chr", chr),
    ("format", format),
    ("callable", callable),
    ("iter", iter),
    ("next", next),
];

pub(crate) fn builtin(name: &'static str, func: NativeFn) -> Value {
    Value::Builtin(Rc::new(Builtin { name, func }))
}

pub fn table() -> HashMap<&'static str, Value> {
    let mut table: HashMap<&'static str, Value> = FUNCTIONS
        .iter()
        .map(|&(name, func)| (name, builtin(name, func)))
        .collect();
    for &kind in ErrorKind::all() {
        table.insert(kind.name(), Value::ExceptionType(kind));
    }
    for alias in ["BaseException", "LookupError", "ArithmeticError"] {
        if let Some(kind) = ErrorKind::from_name(alias) {
            table.insert(alias, Value::ExceptionType(kind));
        }
    }
    table
}

fn only(args: &CallArgs, func: &str) -> RtResult<Value> {
    args.positional.first().cloned().ok_or_else(|| {
        RuntimeError::type_error(format!("{func}() takes exactly one argument (0 given)"))
    })
}

fn len(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    ops::length(&only(&args, "len")?).map(Value::from)
}

fn sum(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let items = ops::iterate(args.require(0, "iterable", "sum")?)?;
    interp.consume_gas(items.len() as u64)?;
    let mut total = args.get(1, "start").cloned().unwrap_or(Value::Int(0));
    for item in &items {
        total = ops::binary_op(BinOp::Add, &total, item)?;
    }
    Ok(total)
}

fn extreme(interp: &mut Interpreter, args: CallArgs, func: &str, op: CmpOp) -> RtResult<Value> {
    let items = match args.positional.as_slice() {
        [] => {
            return Err(RuntimeError::type_error(format!(
                "{func} expected at least 1 argument, got 0"
            )))
        }
        [single] => ops::iterate(single)?,
        many => many.to_vec(),
    };
    interp.consume_gas(items.len() as u64)?;
    let key = args.keyword("key").filter(|k| !matches!(k, Value::None)).cloned();
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let rank = match &key {
            Some(key) => interp.call(key, vec![item.clone()])?,
            None => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_rank, _)) => ops::scalar_compare(op, &rank, best_rank)?,
        };
        if replace {
            best = Some((rank, item));
        }
    }
    match best {
        Some((_, item)) => Ok(item),
        None => args.keyword("default").cloned().ok_or_else(|| {
            RuntimeError::value_error(format!("{func}() arg is an empty sequence"))
        }),
    }
}

fn min(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    extreme(interp, args, "min", CmpOp::Lt)
}

fn max(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    extreme(interp, args, "max", CmpOp::Gt)
}

fn round(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let value = args.require(0, "number", "round")?.clone();
    let digits = args.get_some(1, "ndigits").cloned();
    if let Value::Series(s) = &value {
        let mut forwarded = CallArgs::default();
        forwarded.positional.extend(digits);
        return series::call_method(interp, s, "round", forwarded);
    }
    let digits = match digits {
        None => None,
        Some(d) => Some(d.as_i64().ok_or_else(|| {
            RuntimeError::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                d.type_name()
            ))
        })?),
    };
    match (&value, digits) {
        (Value::Int(i), None) => Ok(Value::Int(*i)),
        (Value::Bool(b), None) => Ok(Value::Int(i64::from(*b))),
        (Value::Int(i), Some(d)) if d >= 0 => Ok(Value::Int(*i)),
        (Value::Int(i), Some(d)) => {
            Ok(Value::Int(round_half_even(*i as f64, d as i32) as i64))
        }
        (Value::Float(f), None) => int_value(&Value::Float(round_half_even(*f, 0))),
        (Value::Float(f), Some(d)) => Ok(Value::Float(round_half_even(*f, d as i32))),
        (other, _) => Err(RuntimeError::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn abs(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    match only(&args, "abs")? {
        Value::Int(i) => Ok(i.checked_abs().map_or(Value::Float((i as f64).abs()), Value::Int)),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::Timedelta(d) => Ok(Value::Timedelta(d.abs())),
        Value::Series(s) => series::call_method(interp, &s, "abs", CallArgs::default()),
        other => Err(RuntimeError::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn str_(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    Ok(match args.get(0, "object") {
        Some(Value::Bytes(bytes)) if args.get(1, "encoding").is_some() => {
            Value::from(String::from_utf8_lossy(bytes).into_owned())
        }
        Some(value) => Value::from(to_str(value)),
        None => Value::str(""),
    })
}

/// `int(value)` conversion shared with `astype(int)`.
pub(crate) fn int_value(value: &Value) -> RtResult<Value> {
    match value {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) if f.is_nan() => Err(RuntimeError::value_error(
            "cannot convert float NaN to integer",
        )),
        Value::Float(f) if f.is_infinite() => Err(RuntimeError::value_error(
            "cannot convert float infinity to integer",
        )),
        Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
        Value::Str(s) => {
            let cleaned = s.trim().replace('_', "");
            cleaned.parse::<i64>().map(Value::Int).map_err(|_| {
                RuntimeError::value_error(format!(
                    "invalid literal for int() with base 10: {}",
                    repr(value)
                ))
            })
        }
        other => Err(RuntimeError::type_error(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

/// `float(value)` conversion shared with `astype(float)`.
pub(crate) fn float_value(value: &Value) -> RtResult<f64> {
    match value {
        Value::Str(s) => {
            let trimmed = s.trim();
            let lowered = trimmed.to_ascii_lowercase();
            let unsigned = lowered.trim_start_matches(['+', '-']);
            if matches!(unsigned, "nan" | "inf" | "infinity") {
                let magnitude = if unsigned == "nan" { f64::NAN } else { f64::INFINITY };
                return Ok(if lowered.starts_with('-') { -magnitude } else { magnitude });
            }
            trimmed.replace('_', "").parse::<f64>().map_err(|_| {
                RuntimeError::value_error(format!(
                    "could not convert string to float: {}",
                    repr(value)
                ))
            })
        }
        other => other.as_f64().ok_or_else(|| {
            RuntimeError::type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn int(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let Some(value) = args.get(0, "x") else {
        return Ok(Value::Int(0));
    };
    match (value, args.get_some(1, "base")) {
        (Value::Str(s), Some(base)) => {
            let radix = base.as_i64().unwrap_or(10) as u32;
            let digits = s.trim().to_ascii_lowercase();
            let digits = digits
                .strip_prefix("0x")
                .or_else(|| digits.strip_prefix("0b"))
                .or_else(|| digits.strip_prefix("0o"))
                .unwrap_or(&digits);
            i64::from_str_radix(digits, radix).map(Value::Int).map_err(|_| {
                RuntimeError::value_error(format!(
                    "invalid literal for int() with base {radix}: {}",
                    repr(value)
                ))
            })
        }
        (value, _) => int_value(value),
    }
}

fn float(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    match args.get(0, "x") {
        Some(value) => float_value(value).map(Value::Float),
        None => Ok(Value::Float(0.0)),
    }
}

fn bool_(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    match args.get(0, "x") {
        Some(value) => value.truthy().map(Value::Bool),
        None => Ok(Value::Bool(false)),
    }
}

fn list(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    match args.get(0, "iterable") {
        Some(value) => ops::iterate(value).map(Value::list),
        None => Ok(Value::list(Vec::new())),
    }
}

fn tuple(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    match args.get(0, "iterable") {
        Some(value) => ops::iterate(value).map(Value::tuple),
        None => Ok(Value::tuple(Vec::new())),
    }
}

fn set(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    match args.get(0, "iterable") {
        Some(value) => Ok(Value::list(unique_values(&ops::iterate(value)?)?)),
        None => Ok(Value::list(Vec::new())),
    }
}

fn dict(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let mut out = Dict::new();
    if let Some(source) = args.positional.first() {
        if let Value::Series(s) = source {
            for (label, value) in s.index.iter().zip(&s.values) {
                out.insert(label.clone(), value.clone())?;
            }
        } else {
            for (key, value) in mapping_pairs(source)? {
                out.insert(key, value)?;
            }
        }
    }
    for (key, value) in &args.keywords {
        out.insert(Value::str(key), value.clone())?;
    }
    Ok(Value::dict(out))
}

/// Stable sort with an optional key function, as `sorted` and `list.sort`
/// use it.
pub(crate) fn sorted_values(
    interp: &mut Interpreter,
    items: Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> RtResult<Vec<Value>> {
    interp.consume_gas(items.len() as u64)?;
    let ranks = match key {
        Some(key) => items
            .iter()
            .map(|item| interp.call(key, vec![item.clone()]))
            .collect::<RtResult<Vec<_>>>()?,
        None => items.clone(),
    };
    let order = ops::sort_positions(&[ranks.as_slice()], &[!reverse])?;
    Ok(order.into_iter().map(|p| items[p].clone()).collect())
}

fn sorted(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let items = ops::iterate(args.require(0, "iterable", "sorted")?)?;
    let key = args.keyword("key").filter(|k| !matches!(k, Value::None)).cloned();
    let reverse = args.flag(usize::MAX, "reverse", false)?;
    sorted_values(interp, items, key.as_ref(), reverse).map(Value::list)
}

fn range(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let mut bounds = Vec::with_capacity(3);
    for value in &args.positional {
        bounds.push(value.as_i64().ok_or_else(|| {
            RuntimeError::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                value.type_name()
            ))
        })?);
    }
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(RuntimeError::type_error(format!(
                "range expected at most 3 arguments, got {}",
                bounds.len()
            )))
        }
    };
    if step == 0 {
        return Err(RuntimeError::value_error("range() arg 3 must not be zero"));
    }
    let count = if step > 0 {
        (stop - start + step - 1).max(0) / step
    } else {
        (start - stop - step - 1).max(0) / -step
    };
    interp.consume_gas(count as u64)?;
    Ok(Value::list(
        (0..count).map(|i| Value::Int(start + i * step)).collect(),
    ))
}

fn enumerate(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let items = ops::iterate(args.require(0, "iterable", "enumerate")?)?;
    let start = args.int(1, "start", 0)?;
    Ok(Value::list(
        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| Value::tuple(vec![Value::Int(start + i as i64), item]))
            .collect(),
    ))
}

fn zip(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let columns = args
        .positional
        .iter()
        .map(ops::iterate)
        .collect::<RtResult<Vec<_>>>()?;
    let len = columns.iter().map(Vec::len).min().unwrap_or(0);
    Ok(Value::list(
        (0..len)
            .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
            .collect(),
    ))
}

fn instance_of(value: &Value, spec: &Value) -> RtResult<bool> {
    let name = match spec {
        Value::Tuple(items) => {
            for item in items.iter() {
                if instance_of(value, item)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        Value::ExceptionType(kind) => {
            return Ok(matches!(value, Value::Exception(e) if e.kind.caught_by(*kind)))
        }
        Value::Builtin(b) => b.name,
        other => {
            return Err(RuntimeError::type_error(format!(
                "isinstance() arg 2 must be a type, a tuple of types, or a union, not {}",
                other.type_name()
            )))
        }
    };
    Ok(match name {
        "int" => matches!(value, Value::Int(_) | Value::Bool(_)),
        "integer" | "int64" => matches!(value, Value::Int(_)),
        "float" | "floating" | "float64" => matches!(value, Value::Float(_)),
        "number" => matches!(value, Value::Int(_) | Value::Float(_)),
        "bool" | "bool_" => matches!(value, Value::Bool(_)),
        "str" => matches!(value, Value::Str(_)),
        "list" | "set" => matches!(value, Value::List(_)),
        "tuple" => matches!(value, Value::Tuple(_)),
        "dict" => matches!(value, Value::Dict(_)),
        "Series" => matches!(value, Value::Series(_)),
        "DataFrame" => matches!(value, Value::Frame(_)),
        "Timestamp" => matches!(value, Value::Timestamp(_)),
        "Timedelta" => matches!(value, Value::Timedelta(_)),
        _ => false,
    })
}

fn isinstance(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let value = args.require(0, "obj", "isinstance")?;
    let spec = args.require(1, "class_or_tuple", "isinstance")?;
    instance_of(value, spec).map(Value::Bool)
}

fn any(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    for item in ops::iterate(&only(&args, "any")?)? {
        if item.truthy()? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn all(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    for item in ops::iterate(&only(&args, "all")?)? {
        if !item.truthy()? {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn print(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let sep = match args.keyword("sep") {
        Some(Value::Str(s)) => s.to_string(),
        _ => " ".to_string(),
    };
    let line = args
        .positional
        .iter()
        .map(to_str)
        .collect::<Vec<_>>()
        .join(&sep);
    info!(target: "script", "{line}");
    Ok(Value::None)
}

fn reversed(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let mut items = ops::iterate(&only(&args, "reversed")?)?;
    items.reverse();
    Ok(Value::list(items))
}

fn map(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let func = args.require(0, "func", "map")?.clone();
    let columns = args
        .positional
        .iter()
        .skip(1)
        .map(ops::iterate)
        .collect::<RtResult<Vec<_>>>()?;
    if columns.is_empty() {
        return Err(RuntimeError::type_error("map() must have at least two arguments."));
    }
    let len = columns.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let row = columns.iter().map(|c| c[i].clone()).collect();
        out.push(interp.call(&func, row)?);
    }
    Ok(Value::list(out))
}

fn filter(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let func = args.require(0, "function", "filter")?.clone();
    let items = ops::iterate(args.require(1, "iterable", "filter")?)?;
    let mut out = Vec::new();
    for item in items {
        let keep = match &func {
            Value::None => item.truthy()?,
            f => interp.call(f, vec![item.clone()])?.truthy()?,
        };
        if keep {
            out.push(item);
        }
    }
    Ok(Value::list(out))
}

fn repr_(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    Ok(Value::from(repr(&only(&args, "repr")?)))
}

fn attribute_name<'a>(args: &'a CallArgs, func: &str) -> RtResult<&'a str> {
    match args.require(1, "name", func)? {
        Value::Str(s) => Ok(s),
        _ => Err(RuntimeError::type_error(format!(
            "{func}(): attribute name must be string"
        ))),
    }
}

fn hasattr(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let object = args.require(0, "obj", "hasattr")?;
    let name = attribute_name(&args, "hasattr")?;
    match get_attribute(object, name) {
        Ok(_) => Ok(Value::Bool(true)),
        Err(err) if err.kind == ErrorKind::AttributeError => Ok(Value::Bool(false)),
        Err(err) => Err(err),
    }
}

fn getattr(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let object = args.require(0, "obj", "getattr")?;
    let name = attribute_name(&args, "getattr")?;
    match (get_attribute(object, name), args.positional.get(2)) {
        (Err(err), Some(default)) if err.kind == ErrorKind::AttributeError => Ok(default.clone()),
        (result, _) => result,
    }
}

fn divmod(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let a = args.require(0, "a", "divmod")?;
    let b = args.require(1, "b", "divmod")?;
    Ok(Value::tuple(vec![
        ops::binary_op(BinOp::FloorDiv, a, b)?,
        ops::binary_op(BinOp::Mod, a, b)?,
    ]))
}

fn pow(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let base = args.require(0, "base", "pow")?;
    let exp = args.require(1, "exp", "pow")?;
    let result = ops::binary_op(BinOp::Pow, base, exp)?;
    match args.get_some(2, "mod") {
        Some(modulus) => ops::binary_op(BinOp::Mod, &result, modulus),
        None => Ok(result),
    }
}

fn ord(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    match only(&args, "ord")? {
        Value::Str(s) if s.chars().count() == 1 => {
            Ok(Value::Int(s.chars().next().map_or(0, |c| i64::from(u32::from(c)))))
        }
        Value::Str(s) => Err(RuntimeError::type_error(format!(
            "ord() expected a character, but string of length {} found",
            s.chars().count()
        ))),
        other => Err(RuntimeError::type_error(format!(
            "ord() expected string of length 1, but {} found",
            other.type_name()
        ))),
    }
}

fn chr(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let code = args.int(0, "i", 0)?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::from(c.to_string()))
        .ok_or_else(|| RuntimeError::value_error("chr() arg not in range(0x110000)"))
}

fn format(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let value = args.require(0, "value", "format")?;
    let spec = match args.get(1, "format_spec") {
        Some(Value::Str(s)) => s.to_string(),
        _ => String::new(),
    };
    format_value(value, &spec).map(Value::from)
}

fn callable(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    Ok(Value::Bool(matches!(
        only(&args, "callable")?,
        Value::Function(_) | Value::Builtin(_) | Value::Method(_) | Value::ExceptionType(_)
    )))
}

/// Iterators are materialised lists that `next` consumes from the front.
fn iter(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    ops::iterate(&only(&args, "iter")?).map(Value::list)
}

fn next(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let iterator = args.require(0, "iterator", "next")?;
    let Value::List(items) = iterator else {
        return Err(RuntimeError::type_error(format!(
            "'{}' object is not an iterator",
            iterator.type_name()
        )));
    };
    let mut items = items.borrow_mut();
    if items.is_empty() {
        return match args.positional.get(1) {
            Some(default) => Ok(default.clone()),
            None => Err(RuntimeError::new(ErrorKind::StopIteration, "")),
        };
    }
    Ok(items.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::interpreter::Limits;

    fn call(name: &str, args: CallArgs) -> RtResult<Value> {
        let mut interp = Interpreter::new(Limits::default());
        let func = table().remove(name).unwrap();
        interp.call_value(&func, args)
    }

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().map(|&v| Value::Int(v)).collect())
    }

    #[test]
    fn sum_starts_from_zero_and_adds_floats() {
        let total = call("sum", CallArgs::new(vec![ints(&[10000, 15000, 12000, 8000, 20000])])).unwrap();
        assert_eq!(repr(&total), "65000");
        let mixed = Value::list(vec![Value::Int(1), Value::Float(0.5)]);
        assert_eq!(repr(&call("sum", CallArgs::new(vec![mixed])).unwrap()), "1.5");
    }

    #[test]
    fn max_with_key_and_default() {
        let words = Value::list(vec!["aa".into(), "b".into(), "cccc".into()]);
        let args = CallArgs::new(vec![words]).with_keyword("key", table()["len"].clone());
        assert_eq!(repr(&call("max", args).unwrap()), "'cccc'");
        let empty = CallArgs::new(vec![ints(&[])]).with_keyword("default", Value::Int(-1));
        assert_eq!(repr(&call("min", empty).unwrap()), "-1");
        let err = call("min", CallArgs::new(vec![ints(&[])])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValueError);
    }

    #[test]
    fn round_is_half_even_and_rejects_nan() {
        assert_eq!(repr(&call("round", CallArgs::new(vec![Value::Float(2.5)])).unwrap()), "2");
        assert_eq!(repr(&call("round", CallArgs::new(vec![Value::Float(3.5)])).unwrap()), "4");
        let rounded = call("round", CallArgs::new(vec![Value::Float(1.2345), Value::Int(2)])).unwrap();
        assert_eq!(repr(&rounded), "1.23");
        let err = call("round", CallArgs::new(vec![Value::Float(f64::NAN)])).unwrap_err();
        assert_eq!(err.summary(), "ValueError: cannot convert float NaN to integer");
    }

    #[test]
    fn int_and_float_parse_strings() {
        assert_eq!(repr(&call("int", CallArgs::new(vec![" 42 ".into()])).unwrap()), "42");
        assert_eq!(repr(&call("int", CallArgs::new(vec![Value::Float(-3.9)])).unwrap()), "-3");
        let err = call("int", CallArgs::new(vec!["x1".into()])).unwrap_err();
        assert_eq!(err.summary(), "ValueError: invalid literal for int() with base 10: 'x1'");
        assert_eq!(repr(&call("float", CallArgs::new(vec!["-inf".into()])).unwrap()), "-inf");
    }

    #[test]
    fn range_charges_gas_before_allocating() {
        let mut interp = Interpreter::new(Limits {
            max_steps: 100,
            max_depth: 10,
        });
        let range = table()["range"].clone();
        let err = interp.call(&range, vec![Value::Int(1_000_000_000)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ExecutionLimitExceeded);
        let small = call("range", CallArgs::new(vec![Value::Int(10), Value::Int(0), Value::Int(-3)])).unwrap();
        assert_eq!(repr(&small), "[10, 7, 4, 1]");
    }

    #[test]
    fn isinstance_understands_numpy_style_types() {
        let numbers = crate::runtime::modules::import("numpy").unwrap();
        let Value::Module(numpy) = numbers else { panic!("numpy is a module") };
        let args = CallArgs::new(vec![Value::Int(3), numpy.attrs["integer"].clone()]);
        assert_eq!(repr(&call("isinstance", args).unwrap()), "True");
        let spec = Value::tuple(vec![table()["int"].clone(), table()["float"].clone()]);
        let args = CallArgs::new(vec![Value::Float(1.0), spec]);
        assert_eq!(repr(&call("isinstance", args).unwrap()), "True");
        let args = CallArgs::new(vec![Value::Bool(true), table()["int"].clone()]);
        assert_eq!(repr(&call("isinstance", args).unwrap()), "True");
    }

    #[test]
    fn next_consumes_an_iterator_then_stops() {
        let mut interp = Interpreter::new(Limits::default());
        let it = interp.call(&table()["iter"], vec![ints(&[1])]).unwrap();
        assert_eq!(repr(&interp.call(&table()["next"], vec![it.clone()]).unwrap()), "1");
        let err = interp.call(&table()["next"], vec![it]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StopIteration);
    }
}
