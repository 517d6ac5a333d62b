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

//! Guarded stand-ins for `tolist`, `mul` and `fillna`. The rewriter routes
//! those calls here so generated code survives scalar and column-like
//! receivers alike.

use crate::error::{RtResult, RuntimeError};
use crate::rewrite::{SAFE_FILLNA, SAFE_MUL, SAFE_TOLIST};
use std::rc::Rc;

use super::builtins::builtin;
use super::frame::Frame;
use super::interpreter::{Interpreter, Scope};
use super::methods::{self, has_method};
use super::ops;
use super::series::Series;
use super::value::{CallArgs, Dict, Value};
use crate::ast::BinOp;

/// Binds the guard functions into `scope`.
pub fn install(scope: &Scope) {
    scope.set(SAFE_TOLIST, builtin(SAFE_TOLIST, safe_tolist));
    scope.set(SAFE_MUL, builtin(SAFE_MUL, safe_mul));
    scope.set(SAFE_FILLNA, builtin(SAFE_FILLNA, safe_fillna));
}

/// Native list extraction: what `value.tolist()` yields for values that
/// support it. Frames yield their rows as records.
pub fn native_list(value: &Value) -> Option<Value> {
    match value {
        Value::Series(s) => Some(Value::list(s.values.clone())),
        Value::Index(labels) => Some(Value::list(labels.as_ref().clone())),
        Value::Frame(f) => Some(Value::list(
            f.borrow()
                .records()
                .into_iter()
                .map(|row| Value::dict(row.into_iter().collect::<Dict>()))
                .collect(),
        )),
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => Some(value.clone()),
        _ => None,
    }
}

fn safe_tolist(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let target = args.require(0, "x", SAFE_TOLIST)?;
    if let Some(list) = native_list(target) {
        return Ok(list);
    }
    match target {
        Value::List(_) => Ok(target.clone()),
        other => match ops::iterate(other) {
            Ok(items) => {
                interp.consume_gas(items.len() as u64)?;
                Ok(Value::list(items))
            }
            Err(_) => Ok(Value::list(vec![other.clone()])),
        },
    }
}

fn safe_mul(interp: &mut Interpreter, mut args: CallArgs) -> RtResult<Value> {
    if args.positional.is_empty() {
        return Err(RuntimeError::type_error(format!(
            "{SAFE_MUL}() missing 1 required positional argument: 'x'"
        )));
    }
    let target = args.positional.remove(0);
    if has_method(&target, "mul") {
        return methods::call_method(interp, &target, "mul", args);
    }
    let operand = args
        .get_some(0, "other")
        .ok_or_else(|| RuntimeError::type_error("mul requires an operand when used on scalars"))?;
    interp.consume_gas(ops::repeat_cost(BinOp::Mul, &target, operand)?)?;
    ops::binary_op(BinOp::Mul, &target, operand)
}

/// Adds `fill` to the categories of `column` when it is categorical and
/// the value is not yet a category.
fn with_category(column: &Series, fill: &Value) -> Option<Series> {
    let categories = column.categories.as_ref()?;
    if fill.is_missing() || categories.iter().any(|c| ops::values_equal(c, fill)) {
        return None;
    }
    let mut extended = categories.as_ref().clone();
    extended.push(fill.clone());
    let mut out = column.clone();
    out.categories = Some(Rc::new(extended));
    Some(out)
}

/// A copy of `frame` whose categorical columns also accept the fill value.
fn with_frame_categories(frame: &Frame, fill: &Value) -> RtResult<Frame> {
    let mut out = frame.clone();
    for (name, column) in &frame.columns {
        let per_column = match fill {
            Value::Dict(mapping) => mapping.borrow().get(&Value::str(name))?,
            Value::Series(_) => None,
            scalar => Some(scalar.clone()),
        };
        if let Some(extended) = per_column.and_then(|v| with_category(column, &v)) {
            out.columns.insert(name.clone(), Rc::new(extended));
        }
    }
    Ok(out)
}

fn safe_fillna(interp: &mut Interpreter, mut args: CallArgs) -> RtResult<Value> {
    if args.positional.is_empty() {
        return Err(RuntimeError::type_error(format!(
            "{SAFE_FILLNA}() missing 1 required positional argument: 'x'"
        )));
    }
    let target = args.positional.remove(0);
    let fill = args.get_some(0, "value").cloned();
    let target = match (&target, &fill) {
        (Value::Frame(f), Some(fill)) => {
            let extended = with_frame_categories(&f.borrow(), fill)?;
            if args.flag(usize::MAX, "inplace", false)? {
                *f.borrow_mut() = extended;
                target
            } else {
                Value::frame(extended)
            }
        }
        (Value::Series(s), Some(fill)) if s.categories.is_some() => match fill {
            Value::Dict(_) => target,
            scalar => match with_category(s, scalar) {
                Some(extended) => Value::series(extended),
                None => target,
            },
        },
        _ => target,
    };
    if has_method(&target, "fillna") {
        return methods::call_method(interp, &target, "fillna", args);
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::runtime::format::repr;
    use crate::runtime::interpreter::Limits;

    fn guard(name: &str, args: CallArgs) -> RtResult<Value> {
        let scope = Scope::new();
        install(&scope);
        let func = scope.get(name).expect("guard installed");
        Interpreter::new(Limits::default()).call_value(&func, args)
    }

    fn column(values: Vec<Value>) -> Value {
        Value::series(Series::new(Some("x".into()), values))
    }

    #[test]
    fn tolist_handles_scalars_lists_and_columns() {
        let scalar = guard(SAFE_TOLIST, CallArgs::new(vec![Value::Int(7)])).unwrap();
        assert_eq!(repr(&scalar), "7");
        let listed = guard(SAFE_TOLIST, CallArgs::new(vec![column(vec![Value::Int(1), Value::Int(2)])])).unwrap();
        assert_eq!(repr(&listed), "[1, 2]");
        let wrapped = guard(SAFE_TOLIST, CallArgs::new(vec![Value::None])).unwrap();
        assert_eq!(repr(&wrapped), "[None]");
        let tuple = guard(SAFE_TOLIST, CallArgs::new(vec![Value::tuple(vec![Value::Int(1)])])).unwrap();
        assert_eq!(repr(&tuple), "[1]");
    }

    #[test]
    fn mul_falls_back_to_scalar_multiply() {
        let out = guard(SAFE_MUL, CallArgs::new(vec![Value::Int(6), Value::Int(7)])).unwrap();
        assert_eq!(repr(&out), "42");
        let err = guard(SAFE_MUL, CallArgs::new(vec![Value::Int(6)])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
        assert_eq!(err.message, "mul requires an operand when used on scalars");
    }

    #[test]
    fn mul_delegates_to_columns() {
        let out = guard(SAFE_MUL, CallArgs::new(vec![column(vec![Value::Int(2)]), Value::Int(3)])).unwrap();
        let Value::Series(s) = out else { panic!("series expected") };
        assert_eq!(repr(&s.values[0]), "6");
    }

    #[test]
    fn fillna_registers_new_category_first() {
        let plain = Series::new(Some("tier".into()), vec!["a".into(), Value::None]);
        let categorical = super::super::series::astype(&plain, "category").unwrap();
        let out = guard(
            SAFE_FILLNA,
            CallArgs::new(vec![Value::series(categorical), "unknown".into()]),
        )
        .unwrap();
        let Value::Series(s) = out else { panic!("series expected") };
        assert_eq!(repr(&s.values[1]), "'unknown'");
        assert_eq!(s.categories.as_ref().map(|c| c.len()), Some(2));
    }

    #[test]
    fn fillna_on_scalar_returns_it_unchanged() {
        let out = guard(SAFE_FILLNA, CallArgs::new(vec![Value::Int(3), Value::Int(0)])).unwrap();
        assert_eq!(repr(&out), "3");
    }

    #[test]
    fn fillna_with_mapping_skips_series() {
        let data = column(vec![Value::None]);
        let mapping = Value::dict(Dict::new());
        let out = guard(SAFE_FILLNA, CallArgs::new(vec![data, mapping])).unwrap();
        let Value::Series(s) = out else { panic!("series expected") };
        assert!(s.values[0].is_missing());
    }
}
