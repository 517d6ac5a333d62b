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

//! One-dimensional labelled columns.
//!
//! A `Series` is immutable once built; every operation returns a new one.
//! Missing entries are `None` or a float NaN and are skipped by the
//! reductions.

use super::format::{repr, strftime, to_str};
use super::frame::Frame;
use super::interpreter::Interpreter;
use super::ops::{self, compare_values, round_half_even, scalar_compare, values_equal};
use super::value::{Accessor, AccessorKind, CallArgs, Dict, Key, Value};
use crate::ast::{BinOp, CmpOp, UnaryOp};
use crate::error::{RtResult, RuntimeError};
use chrono::{Datelike, NaiveDateTime, TimeDelta, Timelike};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct Series {
    pub name: Option<String>,
    pub values: Vec<Value>,
    pub index: Rc<Vec<Value>>,
    /// Names of the index levels; empty for a default range index.
    pub index_names: Vec<String>,
    /// Set for categorical columns.
    pub categories: Option<Rc<Vec<Value>>>,
}

pub fn range_index(len: usize) -> Rc<Vec<Value>> {
    Rc::new((0..len as i64).map(Value::Int).collect())
}

/// Reports the pandas-style dtype of a column of values.
pub fn infer_dtype(values: &[Value]) -> &'static str {
    let mut ints = 0;
    let mut floats = 0;
    let mut bools = 0;
    let mut timestamps = 0;
    let mut deltas = 0;
    let mut missing = 0;
    let mut other = 0;
    let mut nan = false;
    for value in values {
        match value {
            Value::None => missing += 1,
            Value::Float(f) if f.is_nan() => {
                missing += 1;
                nan = true;
            }
            Value::Int(_) => ints += 1,
            Value::Float(_) => floats += 1,
            Value::Bool(_) => bools += 1,
            Value::Timestamp(_) => timestamps += 1,
            Value::Timedelta(_) => deltas += 1,
            _ => other += 1,
        }
    }
    let present = values.len() - missing;
    if present == 0 {
        return if nan { "float64" } else { "object" };
    }
    if other > 0 {
        "object"
    } else if bools == present {
        if missing > 0 {
            "object"
        } else {
            "bool"
        }
    } else if ints == present {
        if missing > 0 {
            "float64"
        } else {
            "int64"
        }
    } else if ints + floats == present {
        "float64"
    } else if timestamps == present {
        "datetime64[ns]"
    } else if deltas == present {
        "timedelta64[ns]"
    } else {
        "object"
    }
}

impl Series {
    pub fn new(name: Option<String>, values: Vec<Value>) -> Self {
        let index = range_index(values.len());
        Self::with_index(name, values, index)
    }

    pub fn with_index(name: Option<String>, values: Vec<Value>, index: Rc<Vec<Value>>) -> Self {
        Self {
            name,
            values,
            index,
            index_names: Vec::new(),
            categories: None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn dtype(&self) -> &'static str {
        if self.categories.is_some() {
            "category"
        } else {
            infer_dtype(&self.values)
        }
    }

    /// New values under the same labels and name.
    pub fn with_values(&self, values: Vec<Value>) -> Self {
        Self {
            name: self.name.clone(),
            values,
            index: self.index.clone(),
            index_names: self.index_names.clone(),
            categories: None,
        }
    }

    /// Selects rows by position, keeping labels and categories.
    pub fn take(&self, positions: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            values: positions.iter().map(|&p| self.values[p].clone()).collect(),
            index: Rc::new(positions.iter().map(|&p| self.index[p].clone()).collect()),
            index_names: self.index_names.clone(),
            categories: self.categories.clone(),
        }
    }

    pub fn position_of(&self, label: &Value) -> RtResult<Option<usize>> {
        let key = Key::from_value(label)?;
        for (i, candidate) in self.index.iter().enumerate() {
            if Key::from_value(candidate)? == key {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    fn present(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().filter(|v| !v.is_missing())
    }

    pub fn render(&self) -> String {
        let labels: Vec<String> = self.index.iter().map(to_str).collect();
        let cells: Vec<String> = self
            .values
            .iter()
            .map(|v| if v.is_missing() { "NaN".to_string() } else { to_str(v) })
            .collect();
        let label_width = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        let cell_width = cells.iter().map(|c| c.chars().count()).max().unwrap_or(0);
        let mut out = String::new();
        if !self.index_names.is_empty() {
            out.push_str(&self.index_names.join(", "));
            out.push('\n');
        }
        for (label, cell) in labels.iter().zip(cells.iter()) {
            out.push_str(&format!("{label:<label_width$}    {cell:>cell_width$}\n"));
        }
        match &self.name {
            Some(name) => out.push_str(&format!("Name: {name}, dtype: {}", self.dtype())),
            None => out.push_str(&format!("dtype: {}", self.dtype())),
        }
        out
    }
}

fn same_labels(left: &[Value], right: &[Value]) -> bool {
    left.len() == right.len() && left.iter().zip(right).all(|(a, b)| values_equal(a, b))
}

fn nan() -> Value {
    Value::Float(f64::NAN)
}

/// Pairs up two series by label. The result keeps the left labels first
/// and appends labels only the right side has.
fn align(left: &Series, right: &Series) -> RtResult<(Rc<Vec<Value>>, Vec<(Value, Value)>)> {
    if same_labels(&left.index, &right.index) {
        let pairs = left.values.iter().cloned().zip(right.values.iter().cloned()).collect();
        return Ok((left.index.clone(), pairs));
    }
    let mut right_by_label: IndexMap<Key, (Value, Value)> = IndexMap::new();
    for (label, value) in right.index.iter().zip(&right.values) {
        right_by_label.insert(Key::from_value(label)?, (label.clone(), value.clone()));
    }
    let mut labels = Vec::new();
    let mut pairs = Vec::new();
    for (label, value) in left.index.iter().zip(&left.values) {
        let other = right_by_label
            .shift_remove(&Key::from_value(label)?)
            .map_or_else(nan, |(_, v)| v);
        labels.push(label.clone());
        pairs.push((value.clone(), other));
    }
    for (_, (label, value)) in right_by_label {
        labels.push(label);
        pairs.push((nan(), value));
    }
    Ok((Rc::new(labels), pairs))
}

fn list_like(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::List(items) => Some(items.borrow().clone()),
        Value::Tuple(items) => Some(items.to_vec()),
        Value::Index(items) => Some(items.as_ref().clone()),
        _ => None,
    }
}

fn elementwise(op: BinOp, left: &Value, right: &Value) -> RtResult<Value> {
    if matches!(op, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor)
        && (left.is_missing() || right.is_missing())
    {
        let l = !left.is_missing() && left.truthy()?;
        let r = !right.is_missing() && right.truthy()?;
        return Ok(Value::Bool(match op {
            BinOp::BitAnd => l && r,
            BinOp::BitOr => l || r,
            _ => l ^ r,
        }));
    }
    if left.is_missing() || right.is_missing() {
        return Ok(nan());
    }
    if matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod) {
        if let (Some(a), Some(0.0)) = (left.as_f64(), right.as_f64()) {
            return Ok(Value::Float(match op {
                BinOp::Div => a / 0.0,
                BinOp::FloorDiv => (a / 0.0).floor(),
                _ => f64::NAN,
            }));
        }
    }
    ops::scalar_binary(op, left, right)
}

fn result_name(left: &Series, right: &Series) -> Option<String> {
    if left.name == right.name {
        left.name.clone()
    } else {
        None
    }
}

pub fn binary(op: BinOp, series: &Series, other: &Value, reversed: bool) -> RtResult<Series> {
    let apply = |a: &Value, b: &Value| {
        if reversed {
            elementwise(op, b, a)
        } else {
            elementwise(op, a, b)
        }
    };
    if let Value::Series(rhs) = other {
        let (index, pairs) = align(series, rhs)?;
        let values = pairs
            .iter()
            .map(|(a, b)| apply(a, b))
            .collect::<RtResult<Vec<_>>>()?;
        let mut out = Series::with_index(result_name(series, rhs), values, index);
        out.index_names = series.index_names.clone();
        return Ok(out);
    }
    if let Some(items) = list_like(other) {
        if items.len() != series.len() {
            return Err(RuntimeError::value_error(format!(
                "operands could not be broadcast together with shapes ({},) ({},)",
                series.len(),
                items.len()
            )));
        }
        let values = series
            .values
            .iter()
            .zip(&items)
            .map(|(a, b)| apply(a, b))
            .collect::<RtResult<Vec<_>>>()?;
        return Ok(series.with_values(values));
    }
    let values = series
        .values
        .iter()
        .map(|a| apply(a, other))
        .collect::<RtResult<Vec<_>>>()?;
    Ok(series.with_values(values))
}

fn compare_element(op: CmpOp, left: &Value, right: &Value) -> RtResult<Value> {
    if left.is_missing() || right.is_missing() {
        return Ok(Value::Bool(op == CmpOp::NotEq));
    }
    scalar_compare(op, left, right).map(Value::Bool)
}

pub fn compare(op: CmpOp, series: &Series, other: &Value, reversed: bool) -> RtResult<Series> {
    let apply = |a: &Value, b: &Value| {
        if reversed {
            compare_element(op, b, a)
        } else {
            compare_element(op, a, b)
        }
    };
    let values = if let Value::Series(rhs) = other {
        if !same_labels(&series.index, &rhs.index) {
            return Err(RuntimeError::value_error(
                "Can only compare identically-labeled Series objects",
            ));
        }
        series
            .values
            .iter()
            .zip(&rhs.values)
            .map(|(a, b)| apply(a, b))
            .collect::<RtResult<Vec<_>>>()?
    } else if let Some(items) = list_like(other) {
        if items.len() != series.len() {
            return Err(RuntimeError::value_error("Lengths must match to compare"));
        }
        series
            .values
            .iter()
            .zip(&items)
            .map(|(a, b)| apply(a, b))
            .collect::<RtResult<Vec<_>>>()?
    } else {
        series
            .values
            .iter()
            .map(|a| apply(a, other))
            .collect::<RtResult<Vec<_>>>()?
    };
    Ok(series.with_values(values))
}

pub fn unary(op: UnaryOp, series: &Series) -> RtResult<Series> {
    let values = series
        .values
        .iter()
        .map(|v| match (op, v) {
            (_, v) if v.is_missing() => Ok(v.clone()),
            (UnaryOp::Invert, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (op, v) => ops::unary_op(op, v),
        })
        .collect::<RtResult<Vec<_>>>()?;
    Ok(series.with_values(values))
}

fn numeric_or_error(values: &[&Value], func: &str) -> RtResult<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                RuntimeError::type_error(format!(
                    "Could not convert {} to numeric for {func}",
                    repr(v)
                ))
            })
        })
        .collect()
}

fn sum_values(values: &[&Value]) -> RtResult<Value> {
    if values.is_empty() {
        return Ok(Value::Int(0));
    }
    if values.iter().all(|v| matches!(v, Value::Str(_))) {
        return Ok(Value::str(values.iter().map(|v| to_str(v)).collect::<String>()));
    }
    if values.iter().all(|v| matches!(v, Value::Timedelta(_))) {
        let total = values.iter().fold(TimeDelta::zero(), |acc, v| match v {
            Value::Timedelta(d) => acc + *d,
            _ => acc,
        });
        return Ok(Value::Timedelta(total));
    }
    let mut total = Value::Int(0);
    for value in values {
        if !value.is_numeric() {
            return Err(RuntimeError::type_error(format!(
                "unsupported operand type(s) for +: '{}' and '{}'",
                total.type_name(),
                value.type_name()
            )));
        }
        total = ops::scalar_binary(BinOp::Add, &total, value)?;
    }
    Ok(total)
}

fn variance(values: &[f64], ddof: usize) -> Option<f64> {
    if values.len() <= ddof {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some(squares / (values.len() - ddof) as f64)
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

fn quantile_of(mut values: Vec<f64>, q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let position = q * (values.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(values[lower] + (values[upper] - values[lower]) * fraction)
}

fn extreme(values: &[&Value], want: Ordering) -> RtResult<Value> {
    let mut best: Option<&Value> = None;
    for value in values {
        best = match best {
            None => Some(value),
            Some(current) => {
                if compare_values(value, current)? == Some(want) {
                    Some(value)
                } else {
                    Some(current)
                }
            }
        };
    }
    Ok(best.cloned().unwrap_or_else(nan))
}

pub fn distinct_count(values: &[Value]) -> RtResult<usize> {
    let mut seen = HashSet::new();
    for value in values.iter().filter(|v| !v.is_missing()) {
        seen.insert(Key::from_value(value)?);
    }
    Ok(seen.len())
}

/// Reduces a series with a named aggregate. Shared with group-by.
pub fn aggregate(series: &Series, func: &str, ddof: usize) -> RtResult<Value> {
    let present: Vec<&Value> = series.present().collect();
    let result = match func {
        "sum" => sum_values(&present)?,
        "prod" | "product" => {
            let numbers = numeric_or_error(&present, func)?;
            if present.iter().all(|v| matches!(v, Value::Int(_) | Value::Bool(_))) {
                let mut acc = Value::Int(1);
                for v in &present {
                    acc = ops::scalar_binary(BinOp::Mul, &acc, v)?;
                }
                acc
            } else {
                Value::Float(numbers.iter().product())
            }
        }
        "mean" | "average" => {
            let numbers = numeric_or_error(&present, func)?;
            if numbers.is_empty() {
                nan()
            } else {
                Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        "median" => float_or_nan(median(numeric_or_error(&present, func)?)),
        "std" => float_or_nan(variance(&numeric_or_error(&present, func)?, ddof).map(f64::sqrt)),
        "var" => float_or_nan(variance(&numeric_or_error(&present, func)?, ddof)),
        "min" => extreme(&present, Ordering::Less)?,
        "max" => extreme(&present, Ordering::Greater)?,
        "count" => Value::Int(present.len() as i64),
        "size" => Value::Int(series.len() as i64),
        "nunique" => Value::Int(distinct_count(&series.values)? as i64),
        "first" => present.first().map_or_else(nan, |v| (*v).clone()),
        "last" => present.last().map_or_else(nan, |v| (*v).clone()),
        "any" => Value::Bool(present.iter().any(|v| v.truthy().unwrap_or(true))),
        "all" => Value::Bool(present.iter().all(|v| v.truthy().unwrap_or(true))),
        other => {
            return Err(RuntimeError::attribute_error(format!(
                "'{other}' is not a valid function for 'Series' object"
            )))
        }
    };
    // Integer results of a float64 column (ints with gaps) stay floats.
    Ok(match result {
        Value::Int(i) if !matches!(func, "count" | "size" | "nunique") && series.dtype() == "float64" => {
            Value::Float(i as f64)
        }
        other => other,
    })
}

fn float_or_nan(value: Option<f64>) -> Value {
    Value::Float(value.unwrap_or(f64::NAN))
}

pub const AGGREGATES: &[&str] = &[
    "sum", "mean", "median", "min", "max", "count", "std", "var", "nunique", "prod", "first",
    "last", "size",
];

fn mask_positions(series_len: usize, mask: &[Value]) -> RtResult<Vec<usize>> {
    if mask.len() != series_len {
        return Err(RuntimeError::index_error(format!(
            "Boolean index has wrong length: {} instead of {series_len}",
            mask.len()
        )));
    }
    let mut out = Vec::new();
    for (i, flag) in mask.iter().enumerate() {
        if !flag.is_missing() && flag.truthy()? {
            out.push(i);
        }
    }
    Ok(out)
}

fn is_bool_mask(values: &[Value]) -> bool {
    !values.is_empty() && values.iter().all(|v| matches!(v, Value::Bool(_)))
}

/// Positions selected by a boolean series, aligned on labels.
pub fn mask_from_series(labels: &Rc<Vec<Value>>, mask: &Series) -> RtResult<Vec<usize>> {
    if same_labels(labels, &mask.index) {
        return mask_positions(labels.len(), &mask.values);
    }
    let mut by_label = std::collections::HashMap::new();
    for (label, flag) in mask.index.iter().zip(&mask.values) {
        by_label.insert(Key::from_value(label)?, flag.clone());
    }
    let mut out = Vec::new();
    for (i, label) in labels.iter().enumerate() {
        match by_label.get(&Key::from_value(label)?) {
            Some(flag) if !flag.is_missing() && flag.truthy()? => out.push(i),
            Some(_) => {}
            None => {
                return Err(RuntimeError::new(
                    crate::error::ErrorKind::IndexError,
                    "Unalignable boolean Series provided as indexer",
                ))
            }
        }
    }
    Ok(out)
}

fn label_positions(series: &Series, labels: &[Value]) -> RtResult<Vec<usize>> {
    let mut out = Vec::with_capacity(labels.len());
    for label in labels {
        match series.position_of(label)? {
            Some(p) => out.push(p),
            None => return Err(RuntimeError::key_error(format!("\"[{}] not in index\"", repr(label)))),
        }
    }
    Ok(out)
}

fn index_is_integer(index: &[Value]) -> bool {
    index.iter().all(|v| matches!(v, Value::Int(_)))
}

pub fn get_item(series: &Rc<Series>, key: &Value) -> RtResult<Value> {
    match key {
        Value::Series(mask) if is_bool_mask(&mask.values) => {
            let positions = mask_from_series(&series.index, mask)?;
            Ok(Value::series(series.take(&positions)))
        }
        Value::Slice(slice) => {
            let positions = slice.positions(series.len())?;
            Ok(Value::series(series.take(&positions)))
        }
        other => {
            if let Some(items) = list_like(other) {
                let positions = if is_bool_mask(&items) {
                    mask_positions(series.len(), &items)?
                } else {
                    label_positions(series, &items)?
                };
                return Ok(Value::series(series.take(&positions)));
            }
            if let Some(p) = series.position_of(other)? {
                return Ok(series.values[p].clone());
            }
            if let (Value::Int(i), false) = (other, index_is_integer(&series.index)) {
                if let Some(p) = ops::resolve_position(*i, series.len()) {
                    return Ok(series.values[p].clone());
                }
            }
            Err(RuntimeError::key_error(repr(other)))
        }
    }
}

pub fn iloc_positions(len: usize, key: &Value) -> RtResult<Result<Vec<usize>, usize>> {
    match key {
        Value::Int(i) => ops::resolve_position(*i, len)
            .map(Err)
            .ok_or_else(|| RuntimeError::index_error("single positional indexer is out-of-bounds")),
        Value::Slice(slice) => Ok(Ok(slice.positions(len)?)),
        Value::Series(mask) if is_bool_mask(&mask.values) => Ok(Ok(mask_positions(len, &mask.values)?)),
        other => match list_like(other) {
            Some(items) if is_bool_mask(&items) => Ok(Ok(mask_positions(len, &items)?)),
            Some(items) => items
                .iter()
                .map(|v| {
                    v.as_i64()
                        .and_then(|i| ops::resolve_position(i, len))
                        .ok_or_else(|| RuntimeError::index_error("positional indexers are out-of-bounds"))
                })
                .collect::<RtResult<Vec<_>>>()
                .map(Ok),
            None => Err(RuntimeError::type_error(format!(
                "Cannot index by location index with a non-integer key of type {}",
                other.type_name()
            ))),
        },
    }
}

/// Resolves a `.loc` key to either one position or a selection.
pub fn loc_positions(labels: &Rc<Vec<Value>>, key: &Value) -> RtResult<Result<Vec<usize>, usize>> {
    let find = |label: &Value| -> RtResult<usize> {
        let wanted = Key::from_value(label)?;
        for (i, candidate) in labels.iter().enumerate() {
            if Key::from_value(candidate)? == wanted {
                return Ok(i);
            }
        }
        Err(RuntimeError::key_error(repr(label)))
    };
    match key {
        Value::Series(mask) if is_bool_mask(&mask.values) => Ok(Ok(mask_from_series(labels, mask)?)),
        Value::Slice(slice) => {
            let start = match &slice.start {
                Value::None => 0,
                label => find(label)?,
            };
            let stop = match &slice.stop {
                Value::None => labels.len(),
                label => find(label)? + 1,
            };
            Ok(Ok((start..stop.max(start)).collect()))
        }
        other => match list_like(other) {
            Some(items) if is_bool_mask(&items) => Ok(Ok(mask_positions(labels.len(), &items)?)),
            Some(items) => Ok(Ok(items.iter().map(find).collect::<RtResult<Vec<_>>>()?)),
            None => Ok(Err(find(other)?)),
        },
    }
}

pub fn index_with(series: &Rc<Series>, kind: AccessorKind, key: &Value) -> RtResult<Value> {
    let selection = if kind == AccessorKind::ILoc {
        iloc_positions(series.len(), key)?
    } else {
        loc_positions(&series.index, key)?
    };
    Ok(match selection {
        Err(position) => series.values[position].clone(),
        Ok(positions) => Value::series(series.take(&positions)),
    })
}

pub fn str_subscript(series: &Rc<Series>, key: &Value) -> RtResult<Value> {
    let values = series
        .values
        .iter()
        .map(|v| match v {
            Value::Str(_) | Value::List(_) | Value::Tuple(_) => {
                ops::get_item(v, key).or_else(|_| Ok(nan()))
            }
            _ => Ok(nan()),
        })
        .collect::<RtResult<Vec<_>>>()?;
    Ok(Value::series(series.with_values(values)))
}

/// Positions kept by `head(n)`; a negative `n` drops from the end.
pub fn head_positions(len: usize, n: i64) -> Vec<usize> {
    let count = if n >= 0 {
        (n as usize).min(len)
    } else {
        len.saturating_sub(n.unsigned_abs() as usize)
    };
    (0..count).collect()
}

pub fn tail_positions(len: usize, n: i64) -> Vec<usize> {
    let count = if n >= 0 {
        (n as usize).min(len)
    } else {
        len.saturating_sub(n.unsigned_abs() as usize)
    };
    (len - count..len).collect()
}

/// Canonical dtype name for an `astype` argument.
pub fn dtype_name(value: &Value) -> RtResult<String> {
    let name = match value {
        Value::Str(s) => s.to_string(),
        Value::Builtin(b) => b.name.to_string(),
        other => {
            return Err(RuntimeError::type_error(format!(
                "data type {} not understood",
                repr(other)
            )))
        }
    };
    Ok(match name.as_str() {
        "int" | "int64" | "int32" | "int16" | "int8" | "integer" => "int64".to_string(),
        "float" | "float64" | "float32" | "floating" | "number" => "float64".to_string(),
        "str" | "string" => "str".to_string(),
        "object" | "O" => "object".to_string(),
        "bool" | "boolean" => "bool".to_string(),
        "Int64" | "category" | "datetime64[ns]" | "datetime64" | "timedelta64[ns]" => name,
        other => {
            return Err(RuntimeError::type_error(format!(
                "data type '{other}' not understood"
            )))
        }
    })
}

fn cast(value: &Value, dtype: &str) -> RtResult<Value> {
    Ok(match dtype {
        "int64" => {
            if value.is_missing() {
                return Err(RuntimeError::value_error(
                    "Cannot convert non-finite values (NA or inf) to integer",
                ));
            }
            super::builtins::int_value(value)?
        }
        "Int64" => {
            if value.is_missing() {
                Value::None
            } else {
                super::builtins::int_value(value)?
            }
        }
        "float64" => {
            if value.is_missing() {
                nan()
            } else {
                Value::Float(super::builtins::float_value(value)?)
            }
        }
        "str" => {
            if value.is_missing() && !matches!(value, Value::None) {
                Value::str("nan")
            } else {
                Value::str(to_str(value))
            }
        }
        "bool" => Value::Bool(!value.is_missing() && value.truthy()?),
        "datetime64[ns]" | "datetime64" => match value {
            Value::Timestamp(_) => value.clone(),
            Value::Str(s) => super::modules::parse_datetime(s, None)
                .map(Value::Timestamp)
                .ok_or_else(|| {
                    RuntimeError::value_error(format!("Unknown datetime string format, unable to parse: {s}"))
                })?,
            v if v.is_missing() => Value::None,
            other => {
                return Err(RuntimeError::type_error(format!(
                    "{} is not convertible to datetime",
                    other.type_name()
                )))
            }
        },
        _ => value.clone(),
    })
}

pub fn astype(series: &Series, dtype: &str) -> RtResult<Series> {
    if dtype == "category" {
        let mut out = series.clone();
        let mut categories = unique_values(&series.values)?;
        categories.retain(|v| !v.is_missing());
        check_sortable_categories(&mut categories)?;
        out.categories = Some(Rc::new(categories));
        return Ok(out);
    }
    let values = series
        .values
        .iter()
        .map(|v| cast(v, dtype))
        .collect::<RtResult<Vec<_>>>()?;
    Ok(series.with_values(values))
}

fn check_sortable_categories(categories: &mut Vec<Value>) -> RtResult<()> {
    let order = ops::sort_positions(&[categories.as_slice()], &[true])?;
    *categories = order.into_iter().map(|p| categories[p].clone()).collect();
    Ok(())
}

/// Distinct values in order of first appearance; missing counts once.
pub fn unique_values(values: &[Value]) -> RtResult<Vec<Value>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in values {
        if seen.insert(Key::from_value(value)?) {
            out.push(value.clone());
        }
    }
    Ok(out)
}

pub fn value_counts(series: &Series, args: &CallArgs) -> RtResult<Series> {
    let normalize = args.flag(0, "normalize", false)?;
    let sort = args.flag(1, "sort", true)?;
    let ascending = args.flag(2, "ascending", false)?;
    let dropna = args.flag(4, "dropna", true)?;
    let mut counts: IndexMap<Key, (Value, i64)> = IndexMap::new();
    if let Some(categories) = &series.categories {
        for category in categories.iter() {
            counts.insert(Key::from_value(category)?, (category.clone(), 0));
        }
    }
    for value in &series.values {
        if dropna && value.is_missing() {
            continue;
        }
        let entry = counts
            .entry(Key::from_value(value)?)
            .or_insert_with(|| (value.clone(), 0));
        entry.1 += 1;
    }
    let mut rows: Vec<(Value, i64)> = counts.into_values().collect();
    if sort {
        rows.sort_by(|a, b| if ascending { a.1.cmp(&b.1) } else { b.1.cmp(&a.1) });
    }
    let total: i64 = rows.iter().map(|(_, c)| c).sum();
    let (labels, values): (Vec<Value>, Vec<Value>) = rows
        .into_iter()
        .map(|(label, count)| {
            let value = if normalize {
                Value::Float(count as f64 / total.max(1) as f64)
            } else {
                Value::Int(count)
            };
            (label, value)
        })
        .unzip();
    let name = if normalize { "proportion" } else { "count" };
    let mut out = Series::with_index(Some(name.to_string()), values, Rc::new(labels));
    out.index_names = series.name.iter().cloned().collect();
    Ok(out)
}

fn fill_value_allowed(series: &Series, value: &Value) -> RtResult<()> {
    if let Some(categories) = &series.categories {
        if !value.is_missing() && !categories.iter().any(|c| values_equal(c, value)) {
            return Err(RuntimeError::type_error(format!(
                "Cannot setitem on a Categorical with a new category ({}), set the categories first",
                to_str(value)
            )));
        }
    }
    Ok(())
}

pub fn fillna(series: &Series, value: &Value) -> RtResult<Series> {
    if let Value::Series(other) = value {
        let (_, pairs) = align(series, other)?;
        let values = pairs
            .into_iter()
            .take(series.len())
            .map(|(a, b)| if a.is_missing() { b } else { a })
            .collect();
        let mut out = series.with_values(values);
        out.categories = series.categories.clone();
        return Ok(out);
    }
    fill_value_allowed(series, value)?;
    let values = series
        .values
        .iter()
        .map(|v| if v.is_missing() { value.clone() } else { v.clone() })
        .collect();
    let mut out = series.with_values(values);
    out.categories = series.categories.clone();
    Ok(out)
}

fn fill_forward(series: &Series, backward: bool) -> Series {
    let mut values = series.values.clone();
    let mut last: Option<Value> = None;
    let mut fill = |slot: &mut Value| {
        if slot.is_missing() {
            if let Some(previous) = &last {
                *slot = previous.clone();
            }
        } else {
            last = Some(slot.clone());
        }
    };
    if backward {
        values.iter_mut().rev().for_each(&mut fill);
    } else {
        values.iter_mut().for_each(&mut fill);
    }
    let mut out = series.with_values(values);
    out.categories = series.categories.clone();
    out
}

fn to_dict(series: &Series) -> RtResult<Dict> {
    let mut dict = Dict::new();
    for (label, value) in series.index.iter().zip(&series.values) {
        dict.insert(label.clone(), value.clone())?;
    }
    Ok(dict)
}

/// Moves the index into columns, as `Series.reset_index()` does.
pub fn reset_index(series: &Series, name: Option<String>) -> RtResult<Frame> {
    let value_name = name
        .or_else(|| series.name.clone())
        .unwrap_or_else(|| "0".to_string());
    let mut columns = index_columns(&series.index, &series.index_names);
    columns.push((value_name, series.values.clone()));
    Ok(Frame::from_columns(columns, range_index(series.len())))
}

/// Splits index labels into one column per level.
pub fn index_columns(index: &[Value], names: &[String]) -> Vec<(String, Vec<Value>)> {
    let levels = names.len().max(1);
    let mut columns: Vec<(String, Vec<Value>)> = (0..levels)
        .map(|level| {
            let name = names.get(level).cloned().unwrap_or_else(|| {
                if levels == 1 {
                    "index".to_string()
                } else {
                    format!("level_{level}")
                }
            });
            (name, Vec::with_capacity(index.len()))
        })
        .collect();
    for label in index {
        match label {
            Value::Tuple(parts) if levels > 1 => {
                for (level, column) in columns.iter_mut().enumerate() {
                    column.1.push(parts.get(level).cloned().unwrap_or(Value::None));
                }
            }
            other => columns[0].1.push(other.clone()),
        }
    }
    columns
}

fn extreme_label(series: &Series, want: Ordering, func: &str) -> RtResult<Value> {
    let mut best: Option<usize> = None;
    for (i, value) in series.values.iter().enumerate() {
        if value.is_missing() {
            continue;
        }
        best = match best {
            None => Some(i),
            Some(current) if compare_values(value, &series.values[current])? == Some(want) => Some(i),
            keep => keep,
        };
    }
    best.map(|p| series.index[p].clone()).ok_or_else(|| {
        RuntimeError::value_error(format!("attempt to get {func} of an empty sequence"))
    })
}

fn quantile(series: &Series, q: &Value) -> RtResult<Value> {
    let present: Vec<&Value> = series.present().collect();
    let numbers = numeric_or_error(&present, "quantile")?;
    let one = |q: &Value| -> RtResult<Value> {
        let q = q
            .as_f64()
            .filter(|q| (0.0..=1.0).contains(q))
            .ok_or_else(|| RuntimeError::value_error("percentiles should all be in the interval [0, 1]"))?;
        Ok(float_or_nan(quantile_of(numbers.clone(), q)))
    };
    match list_like(q) {
        Some(qs) => {
            let values = qs.iter().map(one).collect::<RtResult<Vec<_>>>()?;
            Ok(Value::series(Series::with_index(series.name.clone(), values, Rc::new(qs))))
        }
        None => one(q),
    }
}

fn isin_keys(values: &Value) -> RtResult<HashSet<Key>> {
    let items = match values {
        Value::Series(s) => s.values.clone(),
        Value::Dict(d) => d.borrow().keys(),
        other => ops::iterate(other)?,
    };
    items.iter().map(Key::from_value).collect()
}

pub fn isin(values: &[Value], candidates: &Value) -> RtResult<Vec<Value>> {
    let keys = isin_keys(candidates)?;
    values
        .iter()
        .map(|v| Ok(Value::Bool(Key::from_value(v).is_ok_and(|k| keys.contains(&k)))))
        .collect()
}

fn nlargest(series: &Series, n: i64, largest: bool) -> RtResult<Series> {
    let order = ops::sort_positions(&[series.values.as_slice()], &[!largest])?;
    let keep: Vec<usize> = order
        .into_iter()
        .filter(|&p| !series.values[p].is_missing())
        .take(n.max(0) as usize)
        .collect();
    Ok(series.take(&keep))
}

fn map_values(
    interp: &mut Interpreter,
    series: &Series,
    func: &Value,
    skip_missing: bool,
) -> RtResult<Vec<Value>> {
    let mut out = Vec::with_capacity(series.len());
    for value in &series.values {
        if skip_missing && value.is_missing() {
            out.push(value.clone());
            continue;
        }
        interp.consume_gas(1)?;
        let result = match func {
            Value::Dict(mapping) => mapping.borrow().get(value)?.unwrap_or_else(nan),
            Value::Series(mapping) => match mapping.position_of(value)? {
                Some(p) => mapping.values[p].clone(),
                None => nan(),
            },
            callable => interp.call_value(callable, CallArgs::new(vec![value.clone()]))?,
        };
        out.push(result);
    }
    Ok(out)
}

fn replace(series: &Series, args: &CallArgs) -> RtResult<Series> {
    let mut pairs: Vec<(Value, Value)> = Vec::new();
    match args.get(0, "to_replace") {
        Some(Value::Dict(mapping)) => pairs.extend(mapping.borrow().items()),
        Some(Value::List(olds)) => {
            let new = args.get(1, "value").cloned().unwrap_or(Value::None);
            match list_like(&new) {
                Some(news) => pairs.extend(olds.borrow().iter().cloned().zip(news)),
                None => pairs.extend(olds.borrow().iter().map(|o| (o.clone(), new.clone()))),
            }
        }
        Some(old) => pairs.push((old.clone(), args.get(1, "value").cloned().unwrap_or(Value::None))),
        None => return Ok(series.clone()),
    }
    let values = series
        .values
        .iter()
        .map(|v| {
            pairs
                .iter()
                .find(|(old, _)| values_equal(old, v) || (old.is_missing() && v.is_missing()))
                .map_or_else(|| v.clone(), |(_, new)| new.clone())
        })
        .collect();
    Ok(series.with_values(values))
}

fn shifted(series: &Series, periods: i64) -> Vec<Value> {
    let len = series.len() as i64;
    (0..len)
        .map(|i| {
            let source = i - periods;
            if (0..len).contains(&source) {
                series.values[source as usize].clone()
            } else {
                nan()
            }
        })
        .collect()
}

fn cumulative(series: &Series, op: BinOp) -> RtResult<Vec<Value>> {
    let mut acc: Option<Value> = None;
    series
        .values
        .iter()
        .map(|v| {
            if v.is_missing() {
                return Ok(nan());
            }
            let next = match &acc {
                None => v.clone(),
                Some(previous) => ops::scalar_binary(op, previous, v)?,
            };
            acc = Some(next.clone());
            Ok(next)
        })
        .collect()
}

fn running_extreme(series: &Series, want: Ordering) -> RtResult<Vec<Value>> {
    let mut best: Option<Value> = None;
    series
        .values
        .iter()
        .map(|v| {
            if v.is_missing() {
                return Ok(nan());
            }
            let keep = match &best {
                Some(current) if compare_values(v, current)? != Some(want) => current.clone(),
                _ => v.clone(),
            };
            best = Some(keep.clone());
            Ok(keep)
        })
        .collect()
}

fn arithmetic_method(name: &str) -> Option<(BinOp, bool)> {
    Some(match name {
        "add" => (BinOp::Add, false),
        "sub" | "subtract" => (BinOp::Sub, false),
        "mul" | "multiply" => (BinOp::Mul, false),
        "div" | "truediv" | "divide" => (BinOp::Div, false),
        "floordiv" => (BinOp::FloorDiv, false),
        "mod" => (BinOp::Mod, false),
        "pow" => (BinOp::Pow, false),
        "radd" => (BinOp::Add, true),
        "rsub" => (BinOp::Sub, true),
        "rmul" => (BinOp::Mul, true),
        "rdiv" | "rtruediv" => (BinOp::Div, true),
        _ => return None,
    })
}

fn comparison_method(name: &str) -> Option<CmpOp> {
    Some(match name {
        "eq" => CmpOp::Eq,
        "ne" => CmpOp::NotEq,
        "lt" => CmpOp::Lt,
        "le" => CmpOp::LtE,
        "gt" => CmpOp::Gt,
        "ge" => CmpOp::GtE,
        _ => return None,
    })
}

pub const METHODS: &[&str] = &[
    "sum", "mean", "median", "min", "max", "count", "std", "var", "nunique", "prod", "product",
    "unique", "tolist", "to_list", "value_counts", "mul", "multiply", "add", "sub", "subtract",
    "div", "divide", "truediv", "floordiv", "mod", "pow", "radd", "rsub", "rmul", "rdiv",
    "rtruediv", "eq", "ne", "lt", "le", "gt", "ge", "fillna", "ffill", "bfill", "head", "tail",
    "round", "astype", "isna", "isnull", "notna", "notnull", "dropna", "sort_values",
    "sort_index", "idxmax", "idxmin", "abs", "cumsum", "cumprod", "cummax", "cummin", "to_dict",
    "items", "apply", "map", "isin", "between", "quantile", "nlargest", "nsmallest",
    "reset_index", "item", "any", "all", "copy", "rename", "diff", "pct_change", "shift",
    "replace", "get", "keys", "clip", "to_frame", "groupby", "describe", "mode", "agg",
    "aggregate", "drop_duplicates", "duplicated", "where", "first", "last",
];

pub fn property(series: &Rc<Series>, name: &str) -> RtResult<Option<Value>> {
    let target = || Value::Series(series.clone());
    Ok(Some(match name {
        "index" => Value::Index(series.index.clone()),
        "values" | "array" => Value::series(Series::new(None, series.values.clone())),
        "name" => series.name.clone().map_or(Value::None, Value::str),
        "dtype" | "dtypes" => Value::str(series.dtype()),
        "shape" => Value::tuple(vec![Value::from(series.len())]),
        "size" => Value::from(series.len()),
        "ndim" => Value::Int(1),
        "empty" => Value::Bool(series.is_empty()),
        "is_unique" => Value::Bool(distinct_count(&series.values)? == series.len()),
        "hasnans" => Value::Bool(series.values.iter().any(Value::is_missing)),
        "str" | "dt" | "cat" | "iloc" | "loc" => {
            let kind = match name {
                "str" => AccessorKind::Str,
                "dt" => AccessorKind::Dt,
                "cat" => AccessorKind::Cat,
                "iloc" => AccessorKind::ILoc,
                _ => AccessorKind::Loc,
            };
            if kind == AccessorKind::Cat && series.categories.is_none() {
                return Err(RuntimeError::attribute_error(
                    "Can only use .cat accessor with a 'category' dtype",
                ));
            }
            if kind == AccessorKind::Dt
                && !series
                    .values
                    .iter()
                    .all(|v| v.is_missing() || matches!(v, Value::Timestamp(_) | Value::Timedelta(_)))
            {
                return Err(RuntimeError::attribute_error(
                    "Can only use .dt accessor with datetimelike values",
                ));
            }
            if kind == AccessorKind::Str
                && !series.values.iter().all(|v| v.is_missing() || matches!(v, Value::Str(_)))
            {
                return Err(RuntimeError::attribute_error(
                    "Can only use .str accessor with string values!",
                ));
            }
            Value::Accessor(Rc::new(Accessor {
                kind,
                target: target(),
            }))
        }
        _ => return Ok(None),
    }))
}

fn bool_series(series: &Series, values: Vec<bool>) -> Value {
    Value::series(series.with_values(values.into_iter().map(Value::Bool).collect()))
}

pub fn call_method(
    interp: &mut Interpreter,
    series: &Rc<Series>,
    name: &str,
    args: CallArgs,
) -> RtResult<Value> {
    interp.consume_gas(series.len() as u64)?;
    if AGGREGATES.contains(&name) || name == "product" {
        let ddof = args.int(usize::MAX, "ddof", 1)?.max(0) as usize;
        if matches!(name, "first" | "last") {
            let n = args.get(0, "offset").and_then(Value::as_i64).unwrap_or(1);
            let positions = if name == "first" {
                head_positions(series.len(), n)
            } else {
                tail_positions(series.len(), n)
            };
            return Ok(Value::series(series.take(&positions)));
        }
        return aggregate(series, name, ddof);
    }
    if let Some((op, reversed)) = arithmetic_method(name) {
        let other = args.require(0, "other", name)?;
        let mut left = (**series).clone();
        if let Some(fill) = args.get_some(usize::MAX, "fill_value") {
            left = fillna(&left, fill)?;
        }
        return binary(op, &left, other, reversed).map(Value::series);
    }
    if let Some(op) = comparison_method(name) {
        let other = args.require(0, "other", name)?;
        return compare(op, series, other, false).map(Value::series);
    }
    match name {
        "unique" => Ok(Value::series(Series::new(None, unique_values(&series.values)?))),
        "tolist" | "to_list" => Ok(Value::list(series.values.clone())),
        "value_counts" => value_counts(series, &args).map(Value::series),
        "fillna" => match args.get_some(0, "value") {
            Some(Value::Dict(_)) => Ok(Value::Series(series.clone())),
            Some(value) => fillna(series, value).map(Value::series),
            None => match args.get_some(usize::MAX, "method").and_then(Value::as_str) {
                Some("ffill" | "pad") => Ok(Value::series(fill_forward(series, false))),
                Some("bfill" | "backfill") => Ok(Value::series(fill_forward(series, true))),
                _ => Err(RuntimeError::value_error("Must specify a fill 'value' or 'method'.")),
            },
        },
        "ffill" => Ok(Value::series(fill_forward(series, false))),
        "bfill" => Ok(Value::series(fill_forward(series, true))),
        "head" => Ok(Value::series(series.take(&head_positions(series.len(), args.int(0, "n", 5)?)))),
        "tail" => Ok(Value::series(series.take(&tail_positions(series.len(), args.int(0, "n", 5)?)))),
        "round" => {
            let digits = args.int(0, "decimals", 0)? as i32;
            let values = series
                .values
                .iter()
                .map(|v| match v {
                    Value::Float(f) => Value::Float(round_half_even(*f, digits)),
                    other => other.clone(),
                })
                .collect();
            Ok(Value::series(series.with_values(values)))
        }
        "astype" => {
            let dtype = dtype_name(args.require(0, "dtype", "astype")?)?;
            astype(series, &dtype).map(Value::series)
        }
        "isna" | "isnull" => Ok(bool_series(series, series.values.iter().map(Value::is_missing).collect())),
        "notna" | "notnull" => Ok(bool_series(series, series.values.iter().map(|v| !v.is_missing()).collect())),
        "dropna" => {
            let keep: Vec<usize> = (0..series.len()).filter(|&i| !series.values[i].is_missing()).collect();
            Ok(Value::series(series.take(&keep)))
        }
        "sort_values" => {
            let ascending = args.flag(0, "ascending", true)?;
            let order = ops::sort_positions(&[series.values.as_slice()], &[ascending])?;
            Ok(Value::series(series.take(&order)))
        }
        "sort_index" => {
            let ascending = args.flag(usize::MAX, "ascending", true)?;
            let order = ops::sort_positions(&[series.index.as_slice()], &[ascending])?;
            Ok(Value::series(series.take(&order)))
        }
        "idxmax" => extreme_label(series, Ordering::Greater, "argmax"),
        "idxmin" => extreme_label(series, Ordering::Less, "argmin"),
        "abs" => unary_map(series, |v| match v {
            Value::Int(i) => Ok(Value::Int(i.abs())),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            Value::Timedelta(d) => Ok(Value::Timedelta(d.abs())),
            other => Err(RuntimeError::type_error(format!(
                "bad operand type for abs(): '{}'",
                other.type_name()
            ))),
        }),
        "cumsum" => Ok(Value::series(series.with_values(cumulative(series, BinOp::Add)?))),
        "cumprod" => Ok(Value::series(series.with_values(cumulative(series, BinOp::Mul)?))),
        "cummax" => Ok(Value::series(series.with_values(running_extreme(series, Ordering::Greater)?))),
        "cummin" => Ok(Value::series(series.with_values(running_extreme(series, Ordering::Less)?))),
        "to_dict" => Ok(Value::dict(to_dict(series)?)),
        "items" => Ok(Value::list(
            series
                .index
                .iter()
                .zip(&series.values)
                .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                .collect(),
        )),
        "keys" => Ok(Value::Index(series.index.clone())),
        "apply" => {
            let func = args.require(0, "func", "apply")?.clone();
            let values = map_values(interp, series, &func, false)?;
            Ok(Value::series(series.with_values(values)))
        }
        "map" => {
            let func = args.require(0, "arg", "map")?.clone();
            let skip = args.get_some(1, "na_action").and_then(Value::as_str) == Some("ignore");
            let values = map_values(interp, series, &func, skip)?;
            Ok(Value::series(series.with_values(values)))
        }
        "isin" => {
            let values = isin(&series.values, args.require(0, "values", "isin")?)?;
            Ok(Value::series(series.with_values(values)))
        }
        "between" => {
            let left = args.require(0, "left", "between")?;
            let right = args.require(1, "right", "between")?;
            let inclusive = args.get_some(2, "inclusive").and_then(Value::as_str).unwrap_or("both");
            let (low, high) = match inclusive {
                "both" => (CmpOp::GtE, CmpOp::LtE),
                "neither" => (CmpOp::Gt, CmpOp::Lt),
                "left" => (CmpOp::GtE, CmpOp::Lt),
                "right" => (CmpOp::Gt, CmpOp::LtE),
                other => {
                    return Err(RuntimeError::value_error(format!(
                        "Inclusive has to be either string of 'both','left', 'right', or 'neither', got {other}"
                    )))
                }
            };
            let mut flags = Vec::with_capacity(series.len());
            for v in &series.values {
                flags.push(
                    !v.is_missing() && scalar_compare(low, v, left)? && scalar_compare(high, v, right)?,
                );
            }
            Ok(bool_series(series, flags))
        }
        "quantile" => quantile(series, args.get(0, "q").unwrap_or(&Value::Float(0.5))),
        "nlargest" => nlargest(series, args.int(0, "n", 5)?, true).map(Value::series),
        "nsmallest" => nlargest(series, args.int(0, "n", 5)?, false).map(Value::series),
        "reset_index" => {
            if args.flag(1, "drop", false)? {
                let mut out = series.with_values(series.values.clone());
                out.index = range_index(series.len());
                out.index_names.clear();
                return Ok(Value::series(out));
            }
            let name = args.get_some(usize::MAX, "name").map(to_str);
            reset_index(series, name).map(Value::frame)
        }
        "to_frame" => {
            let name = args
                .get_some(0, "name")
                .map(to_str)
                .or_else(|| series.name.clone())
                .unwrap_or_else(|| "0".to_string());
            let mut frame = Frame::from_columns(vec![(name, series.values.clone())], series.index.clone());
            frame.index_names = series.index_names.clone();
            Ok(Value::frame(frame))
        }
        "item" => {
            if series.len() == 1 {
                Ok(series.values[0].clone())
            } else {
                Err(RuntimeError::value_error(
                    "can only convert an array of size 1 to a Python scalar",
                ))
            }
        }
        "any" => aggregate(series, "any", 1),
        "all" => aggregate(series, "all", 1),
        "copy" => Ok(Value::series((**series).clone())),
        "rename" => {
            let mut out = (**series).clone();
            match args.get(0, "index") {
                Some(Value::Dict(mapping)) => {
                    let mapping = mapping.borrow();
                    let labels = series
                        .index
                        .iter()
                        .map(|l| Ok(mapping.get(l)?.unwrap_or_else(|| l.clone())))
                        .collect::<RtResult<Vec<_>>>()?;
                    out.index = Rc::new(labels);
                }
                Some(Value::None) => out.name = None,
                Some(name) => out.name = Some(to_str(name)),
                None => {}
            }
            Ok(Value::series(out))
        }
        "diff" => {
            let periods = args.int(0, "periods", 1)?;
            let previous = series.with_values(shifted(series, periods));
            binary(BinOp::Sub, series, &Value::series(previous), false).map(Value::series)
        }
        "pct_change" => {
            let periods = args.int(0, "periods", 1)?;
            let previous = Value::series(series.with_values(shifted(series, periods)));
            let ratio = binary(BinOp::Div, series, &previous, false)?;
            binary(BinOp::Sub, &ratio, &Value::Int(1), false).map(Value::series)
        }
        "shift" => {
            let periods = args.int(0, "periods", 1)?;
            Ok(Value::series(series.with_values(shifted(series, periods))))
        }
        "replace" => replace(series, &args).map(Value::series),
        "get" => {
            let key = args.require(0, "key", "get")?;
            Ok(match series.position_of(key)? {
                Some(p) => series.values[p].clone(),
                None => args.get(1, "default").cloned().unwrap_or(Value::None),
            })
        }
        "clip" => {
            let lower = args.get_some(0, "lower").cloned();
            let upper = args.get_some(1, "upper").cloned();
            let mut values = Vec::with_capacity(series.len());
            for v in &series.values {
                let mut v = v.clone();
                if !v.is_missing() {
                    if let Some(lower) = &lower {
                        if scalar_compare(CmpOp::Lt, &v, lower)? {
                            v = lower.clone();
                        }
                    }
                    if let Some(upper) = &upper {
                        if scalar_compare(CmpOp::Gt, &v, upper)? {
                            v = upper.clone();
                        }
                    }
                }
                values.push(v);
            }
            Ok(Value::series(series.with_values(values)))
        }
        "mode" => {
            let counts = value_counts(series, &CallArgs::default())?;
            let top = counts.values.first().cloned().unwrap_or(Value::Int(0));
            let mut modes: Vec<Value> = counts
                .index
                .iter()
                .zip(&counts.values)
                .filter(|(_, c)| values_equal(c, &top))
                .map(|(label, _)| label.clone())
                .collect();
            let order = ops::sort_positions(&[modes.as_slice()], &[true])?;
            modes = order.into_iter().map(|p| modes[p].clone()).collect();
            Ok(Value::series(Series::new(series.name.clone(), modes)))
        }
        "describe" => describe(series).map(Value::series),
        "agg" | "aggregate" => {
            let func = args.require(0, "func", name)?;
            match func {
                Value::List(funcs) => {
                    let funcs = funcs.borrow().clone();
                    let mut labels = Vec::new();
                    let mut values = Vec::new();
                    for func in &funcs {
                        let label = aggregate_label(func);
                        values.push(apply_aggregate(interp, series, func)?);
                        labels.push(Value::str(label));
                    }
                    Ok(Value::series(Series::with_index(series.name.clone(), values, Rc::new(labels))))
                }
                other => apply_aggregate(interp, series, other),
            }
        }
        "drop_duplicates" => {
            let mut seen = HashSet::new();
            let mut keep = Vec::new();
            for (i, v) in series.values.iter().enumerate() {
                if seen.insert(Key::from_value(v)?) {
                    keep.push(i);
                }
            }
            Ok(Value::series(series.take(&keep)))
        }
        "duplicated" => {
            let mut seen = HashSet::new();
            let mut flags = Vec::with_capacity(series.len());
            for v in &series.values {
                flags.push(!seen.insert(Key::from_value(v)?));
            }
            Ok(bool_series(series, flags))
        }
        "where" => {
            let cond = args.require(0, "cond", "where")?;
            let other = args.get(1, "other").cloned().unwrap_or_else(nan);
            let flags = match cond {
                Value::Series(mask) => mask.values.clone(),
                other => ops::iterate(other)?,
            };
            let mut values = Vec::with_capacity(series.len());
            for (i, v) in series.values.iter().enumerate() {
                let keep = match flags.get(i) {
                    Some(flag) => !flag.is_missing() && flag.truthy()?,
                    None => false,
                };
                values.push(if keep {
                    v.clone()
                } else {
                    match &other {
                        Value::Series(s) => s.values.get(i).cloned().unwrap_or_else(nan),
                        scalar => scalar.clone(),
                    }
                });
            }
            Ok(Value::series(series.with_values(values)))
        }
        "groupby" => {
            let frame_name = series.name.clone().unwrap_or_else(|| "0".to_string());
            let frame = Frame::from_columns(vec![(frame_name.clone(), series.values.clone())], series.index.clone());
            let mut grouped = super::groupby::from_frame(Rc::new(frame), &args)?;
            grouped.selection = super::groupby::Selection::Column(frame_name);
            Ok(Value::GroupBy(Rc::new(grouped)))
        }
        other => Err(RuntimeError::attribute_error(format!(
            "'Series' object has no attribute '{other}'"
        ))),
    }
}

fn unary_map(series: &Series, f: impl Fn(&Value) -> RtResult<Value>) -> RtResult<Value> {
    let values = series
        .values
        .iter()
        .map(|v| if v.is_missing() { Ok(v.clone()) } else { f(v) })
        .collect::<RtResult<Vec<_>>>()?;
    Ok(Value::series(series.with_values(values)))
}

/// Display label of an aggregate passed to `agg`.
pub fn aggregate_label(func: &Value) -> String {
    match func {
        Value::Str(s) => s.to_string(),
        Value::Builtin(b) => b.name.to_string(),
        Value::Function(f) => f.name.clone(),
        other => to_str(other),
    }
}

/// Applies a string, builtin or callable aggregate to one series.
pub fn apply_aggregate(interp: &mut Interpreter, series: &Series, func: &Value) -> RtResult<Value> {
    match func {
        Value::Str(name) => {
            let name = match name.as_ref() {
                "average" => "mean",
                other => other,
            };
            aggregate(series, name, 1)
        }
        Value::Builtin(b) if AGGREGATES.contains(&b.name) || matches!(b.name, "len") => {
            let name = if b.name == "len" { "size" } else { b.name };
            aggregate(series, name, 1)
        }
        callable => interp.call_value(callable, CallArgs::new(vec![Value::series(series.clone())])),
    }
}

fn describe(series: &Series) -> RtResult<Series> {
    let present: Vec<&Value> = series.present().collect();
    let numeric = !present.is_empty() && present.iter().all(|v| v.is_numeric());
    let (labels, values): (Vec<&str>, Vec<Value>) = if numeric {
        let numbers = numeric_or_error(&present, "describe")?;
        vec![
            ("count", Value::Float(numbers.len() as f64)),
            ("mean", aggregate(series, "mean", 1)?),
            ("std", aggregate(series, "std", 1)?),
            ("min", Value::float_or_none(numbers.iter().cloned().reduce(f64::min))),
            ("25%", float_or_nan(quantile_of(numbers.clone(), 0.25))),
            ("50%", float_or_nan(quantile_of(numbers.clone(), 0.5))),
            ("75%", float_or_nan(quantile_of(numbers.clone(), 0.75))),
            ("max", Value::float_or_none(numbers.iter().cloned().reduce(f64::max))),
        ]
        .into_iter()
        .unzip()
    } else {
        let counts = value_counts(series, &CallArgs::default())?;
        vec![
            ("count", Value::from(present.len())),
            ("unique", Value::from(counts.len())),
            ("top", counts.index.first().cloned().unwrap_or_else(nan)),
            ("freq", counts.values.first().cloned().unwrap_or_else(nan)),
        ]
        .into_iter()
        .unzip()
    };
    Ok(Series::with_index(
        series.name.clone(),
        values,
        Rc::new(labels.into_iter().map(Value::str).collect()),
    ))
}

pub(crate) const DAY_NAMES: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

pub(crate) const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

fn map_present(series: &Series, f: impl Fn(&Value) -> RtResult<Value>) -> RtResult<Value> {
    let values = series
        .values
        .iter()
        .map(|v| if v.is_missing() { Ok(nan()) } else { f(v) })
        .collect::<RtResult<Vec<_>>>()?;
    Ok(Value::series(series.with_values(values)))
}

pub(crate) fn timestamp_part(value: &Value, part: &str) -> RtResult<Value> {
    let Value::Timestamp(ts) = value else {
        return timedelta_part(value, part);
    };
    Ok(match part {
        "year" => Value::Int(i64::from(ts.year())),
        "month" => Value::Int(i64::from(ts.month())),
        "day" => Value::Int(i64::from(ts.day())),
        "hour" => Value::Int(i64::from(ts.hour())),
        "minute" => Value::Int(i64::from(ts.minute())),
        "second" => Value::Int(i64::from(ts.second())),
        "dayofweek" | "weekday" | "day_of_week" => {
            Value::Int(i64::from(ts.weekday().num_days_from_monday()))
        }
        "dayofyear" | "day_of_year" => Value::Int(i64::from(ts.ordinal())),
        "quarter" => Value::Int(i64::from((ts.month() - 1) / 3 + 1)),
        "week" | "weekofyear" => Value::Int(i64::from(ts.iso_week().week())),
        "date" => Value::Timestamp(ts.date().and_time(chrono::NaiveTime::MIN)),
        "is_month_start" => Value::Bool(ts.day() == 1),
        "days_in_month" => Value::Int(days_in_month(ts)),
        other => {
            return Err(RuntimeError::attribute_error(format!(
                "'DatetimeProperties' object has no attribute '{other}'"
            )))
        }
    })
}

fn days_in_month(ts: &NaiveDateTime) -> i64 {
    let (year, month) = (ts.year(), ts.month());
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    match (
        chrono::NaiveDate::from_ymd_opt(year, month, 1),
        chrono::NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(start), Some(end)) => (end - start).num_days(),
        _ => 30,
    }
}

pub(crate) fn timedelta_part(value: &Value, part: &str) -> RtResult<Value> {
    let Value::Timedelta(delta) = value else {
        return Err(RuntimeError::attribute_error(
            "Can only use .dt accessor with datetimelike values",
        ));
    };
    Ok(match part {
        "days" => Value::Int(delta.num_days()),
        "seconds" => Value::Int(delta.num_seconds() - delta.num_days() * 86_400),
        "total_seconds" => Value::Float(delta.num_milliseconds() as f64 / 1000.0),
        other => {
            return Err(RuntimeError::attribute_error(format!(
                "'TimedeltaProperties' object has no attribute '{other}'"
            )))
        }
    })
}

/// Period label for `to_period`, rendered as text.
pub fn period_label(ts: &NaiveDateTime, freq: &str) -> RtResult<String> {
    let freq = freq.trim_end_matches('S').trim_end_matches("-DEC");
    Ok(match freq {
        "M" | "ME" => format!("{:04}-{:02}", ts.year(), ts.month()),
        "Q" | "QE" => format!("{:04}Q{}", ts.year(), (ts.month() - 1) / 3 + 1),
        "Y" | "A" | "YE" => format!("{:04}", ts.year()),
        "D" => ts.format("%Y-%m-%d").to_string(),
        "W" | "W-SUN" => {
            let start = ts.date() - TimeDelta::days(i64::from(ts.weekday().num_days_from_monday()));
            let end = start + TimeDelta::days(6);
            format!("{}/{}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
        }
        other => return Err(RuntimeError::value_error(format!("Invalid frequency: {other}"))),
    })
}

pub const STR_METHODS: &[&str] = &[
    "lower", "upper", "strip", "lstrip", "rstrip", "title", "capitalize", "len", "contains",
    "startswith", "endswith", "replace", "split", "slice", "get", "zfill", "isdigit",
    "isnumeric", "isalpha", "extract", "cat", "count", "find", "pad", "fullmatch", "match",
];

pub const DT_METHODS: &[&str] = &[
    "day_name", "month_name", "strftime", "to_period", "normalize", "total_seconds", "floor",
];

pub const CAT_METHODS: &[&str] = &[
    "add_categories", "remove_unused_categories", "set_categories", "rename_categories",
];

pub fn accessor_property(kind: AccessorKind, series: &Rc<Series>, name: &str) -> RtResult<Option<Value>> {
    Ok(match kind {
        AccessorKind::Dt if !DT_METHODS.contains(&name) => {
            Some(map_present(series, |v| timestamp_part(v, name))?)
        }
        AccessorKind::Cat => match name {
            "categories" => Some(Value::Index(Rc::new(
                series.categories.as_deref().cloned().unwrap_or_default(),
            ))),
            "codes" => {
                let categories = series.categories.clone().unwrap_or_default();
                let codes = series
                    .values
                    .iter()
                    .map(|v| {
                        Value::Int(
                            categories
                                .iter()
                                .position(|c| values_equal(c, v))
                                .map_or(-1, |p| p as i64),
                        )
                    })
                    .collect();
                Some(Value::series(series.with_values(codes)))
            }
            "ordered" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    })
}

fn compile(pattern: &str, case: bool, literal: bool) -> RtResult<regex::Regex> {
    let body = if literal { regex::escape(pattern) } else { pattern.to_string() };
    regex::RegexBuilder::new(&body)
        .case_insensitive(!case)
        .build()
        .map_err(|e| RuntimeError::value_error(format!("invalid regular expression: {e}")))
}

fn text_of(value: &Value) -> Option<&str> {
    value.as_str()
}

fn string_method(series: &Series, name: &str, args: &CallArgs) -> RtResult<Value> {
    let pattern_arg = |index: usize, key: &str| -> RtResult<String> {
        args.require(index, key, name).map(to_str)
    };
    match name {
        "lower" | "upper" | "strip" | "lstrip" | "rstrip" | "title" | "capitalize" => {
            let chars = args.get_some(0, "to_strip").map(to_str);
            map_present(series, |v| {
                let Some(text) = text_of(v) else { return Ok(nan()) };
                let trim: &[char] = &[' ', '\t', '\n', '\r'];
                let custom: Vec<char> = chars.as_deref().map(|c| c.chars().collect()).unwrap_or_default();
                let set: &[char] = if chars.is_some() { &custom } else { trim };
                Ok(Value::str(match name {
                    "lower" => text.to_lowercase(),
                    "upper" => text.to_uppercase(),
                    "strip" => text.trim_matches(set).to_string(),
                    "lstrip" => text.trim_start_matches(set).to_string(),
                    "rstrip" => text.trim_end_matches(set).to_string(),
                    "title" => super::methods::title_case(text),
                    _ => super::methods::capitalize(text),
                }))
            })
        }
        "len" => map_present(series, |v| {
            Ok(text_of(v).map_or_else(nan, |t| Value::from(t.chars().count())))
        }),
        "contains" | "match" | "fullmatch" | "count" => {
            let pattern = pattern_arg(0, "pat")?;
            let case = args.flag(1, "case", true)?;
            let literal = name == "contains" && !args.flag(usize::MAX, "regex", true)?;
            let regex = compile(&pattern, case, literal)?;
            let na = args.get(usize::MAX, "na").cloned();
            let values = series
                .values
                .iter()
                .map(|v| match text_of(v) {
                    None => na.clone().unwrap_or_else(nan),
                    Some(text) => match name {
                        "contains" => Value::Bool(regex.is_match(text)),
                        "match" => Value::Bool(regex.find(text).is_some_and(|m| m.start() == 0)),
                        "fullmatch" => Value::Bool(
                            regex.find(text).is_some_and(|m| m.start() == 0 && m.end() == text.len()),
                        ),
                        _ => Value::from(regex.find_iter(text).count()),
                    },
                })
                .collect();
            Ok(Value::series(series.with_values(values)))
        }
        "startswith" | "endswith" => {
            let prefixes: Vec<String> = match args.require(0, "pat", name)? {
                Value::Tuple(items) => items.iter().map(to_str).collect(),
                other => vec![to_str(other)],
            };
            let na = args.get(1, "na").cloned();
            let values = series
                .values
                .iter()
                .map(|v| match text_of(v) {
                    None => na.clone().unwrap_or_else(nan),
                    Some(text) => Value::Bool(prefixes.iter().any(|p| {
                        if name == "startswith" {
                            text.starts_with(p.as_str())
                        } else {
                            text.ends_with(p.as_str())
                        }
                    })),
                })
                .collect();
            Ok(Value::series(series.with_values(values)))
        }
        "replace" => {
            let pattern = pattern_arg(0, "pat")?;
            let replacement = pattern_arg(1, "repl")?;
            let use_regex = args.flag(usize::MAX, "regex", false)?;
            let case = args.flag(usize::MAX, "case", true)?;
            let regex = compile(&pattern, case, !use_regex)?;
            let replacement = if use_regex {
                replacement.replace("\\", "$")
            } else {
                replacement.replace('$', "$$")
            };
            map_present(series, |v| {
                Ok(text_of(v).map_or_else(nan, |t| Value::str(regex.replace_all(t, replacement.as_str()))))
            })
        }
        "split" => {
            let separator = args.get_some(0, "pat").map(to_str);
            let limit = args.int(1, "n", -1)?;
            map_present(series, |v| {
                let Some(text) = text_of(v) else { return Ok(nan()) };
                let parts: Vec<Value> = match (&separator, limit) {
                    (None, _) => text.split_whitespace().map(Value::str).collect(),
                    (Some(sep), n) if n >= 0 => text.splitn(n as usize + 1, sep.as_str()).map(Value::str).collect(),
                    (Some(sep), _) => text.split(sep.as_str()).map(Value::str).collect(),
                };
                Ok(Value::list(parts))
            })
        }
        "slice" => {
            let slice = super::value::SliceValue {
                start: args.get(0, "start").cloned().unwrap_or(Value::None),
                stop: args.get(1, "stop").cloned().unwrap_or(Value::None),
                step: args.get(2, "step").cloned().unwrap_or(Value::None),
            };
            let key = Value::Slice(Rc::new(slice));
            map_present(series, |v| ops::get_item(v, &key))
        }
        "get" => {
            let key = args.require(0, "i", "get")?.clone();
            map_present(series, |v| Ok(ops::get_item(v, &key).unwrap_or_else(|_| nan())))
        }
        "zfill" | "pad" => {
            let width = args.int(0, "width", 0)?.max(0) as usize;
            map_present(series, |v| {
                let Some(text) = text_of(v) else { return Ok(nan()) };
                let count = text.chars().count();
                if count >= width {
                    return Ok(v.clone());
                }
                let fill = if name == "zfill" { "0" } else { " " };
                Ok(Value::str(format!("{}{text}", fill.repeat(width - count))))
            })
        }
        "isdigit" | "isnumeric" | "isalpha" => map_present(series, |v| {
            Ok(text_of(v).map_or_else(nan, |t| {
                Value::Bool(
                    !t.is_empty()
                        && t.chars().all(|c| if name == "isalpha" { c.is_alphabetic() } else { c.is_numeric() }),
                )
            }))
        }),
        "find" => {
            let needle = pattern_arg(0, "sub")?;
            map_present(series, |v| {
                Ok(text_of(v).map_or_else(nan, |t| {
                    Value::Int(t.find(needle.as_str()).map_or(-1, |b| t[..b].chars().count() as i64))
                }))
            })
        }
        "extract" => {
            let regex = compile(&pattern_arg(0, "pat")?, true, false)?;
            map_present(series, |v| {
                Ok(text_of(v)
                    .and_then(|t| regex.captures(t))
                    .and_then(|c| c.get(1).or_else(|| c.get(0)))
                    .map_or_else(nan, |m| Value::str(m.as_str())))
            })
        }
        "cat" => {
            let separator = args.get_some(usize::MAX, "sep").map(to_str).unwrap_or_default();
            let parts: Vec<String> = series.present().map(to_str).collect();
            Ok(Value::str(parts.join(&separator)))
        }
        other => Err(RuntimeError::attribute_error(format!(
            "'StringMethods' object has no attribute '{other}'"
        ))),
    }
}

fn datetime_method(series: &Series, name: &str, args: &CallArgs) -> RtResult<Value> {
    let timestamp = |v: &Value| -> RtResult<NaiveDateTime> {
        match v {
            Value::Timestamp(ts) => Ok(*ts),
            other => Err(RuntimeError::attribute_error(format!(
                "'{}' object has no attribute '{name}'",
                other.type_name()
            ))),
        }
    };
    match name {
        "day_name" => map_present(series, |v| {
            Ok(Value::str(DAY_NAMES[timestamp(v)?.weekday().num_days_from_monday() as usize]))
        }),
        "month_name" => map_present(series, |v| {
            Ok(Value::str(MONTH_NAMES[timestamp(v)?.month0() as usize]))
        }),
        "strftime" => {
            let pattern = args.require(0, "date_format", "strftime")?;
            let pattern = to_str(pattern);
            map_present(series, |v| strftime(&timestamp(v)?, &pattern).map(Value::str))
        }
        "to_period" => {
            let freq = args.get_some(0, "freq").map(to_str).unwrap_or_else(|| "D".to_string());
            map_present(series, |v| period_label(&timestamp(v)?, &freq).map(Value::str))
        }
        "normalize" => map_present(series, |v| {
            Ok(Value::Timestamp(timestamp(v)?.date().and_time(chrono::NaiveTime::MIN)))
        }),
        "floor" => {
            let freq = args.get_some(0, "freq").map(to_str).unwrap_or_else(|| "D".to_string());
            map_present(series, |v| {
                let ts = timestamp(v)?;
                Ok(Value::Timestamp(match freq.as_str() {
                    "h" | "H" => ts.date().and_hms_opt(ts.hour(), 0, 0).unwrap_or(ts),
                    _ => ts.date().and_time(chrono::NaiveTime::MIN),
                }))
            })
        }
        "total_seconds" => map_present(series, |v| timedelta_part(v, "total_seconds")),
        other => Err(RuntimeError::attribute_error(format!(
            "'DatetimeProperties' object has no attribute '{other}'"
        ))),
    }
}

fn categorical_method(series: &Series, name: &str, args: &CallArgs) -> RtResult<Value> {
    let current = series.categories.as_deref().cloned().unwrap_or_default();
    let mut out = series.clone();
    match name {
        "add_categories" => {
            let additions = match args.require(0, "new_categories", name)? {
                Value::Str(s) => vec![Value::Str(s.clone())],
                other => ops::iterate(other)?,
            };
            let mut categories = current;
            for addition in additions {
                if categories.iter().any(|c| values_equal(c, &addition)) {
                    return Err(RuntimeError::value_error(format!(
                        "new categories must not include old categories: {{{}}}",
                        repr(&addition)
                    )));
                }
                categories.push(addition);
            }
            out.categories = Some(Rc::new(categories));
        }
        "remove_unused_categories" => {
            let used: Vec<Value> = current
                .into_iter()
                .filter(|c| series.values.iter().any(|v| values_equal(v, c)))
                .collect();
            out.categories = Some(Rc::new(used));
        }
        "set_categories" => {
            let categories = ops::iterate(args.require(0, "new_categories", name)?)?;
            out.values = out
                .values
                .iter()
                .map(|v| {
                    if categories.iter().any(|c| values_equal(c, v)) {
                        v.clone()
                    } else {
                        nan()
                    }
                })
                .collect();
            out.categories = Some(Rc::new(categories));
        }
        "rename_categories" => {
            let renamed = match args.require(0, "new_categories", name)? {
                Value::Dict(mapping) => {
                    let mapping = mapping.borrow();
                    current
                        .iter()
                        .map(|c| Ok(mapping.get(c)?.unwrap_or_else(|| c.clone())))
                        .collect::<RtResult<Vec<_>>>()?
                }
                other => ops::iterate(other)?,
            };
            if renamed.len() != current.len() {
                return Err(RuntimeError::value_error(
                    "new categories need to have the same number of items as the old categories!",
                ));
            }
            out.values = out
                .values
                .iter()
                .map(|v| {
                    current
                        .iter()
                        .position(|c| values_equal(c, v))
                        .map_or_else(|| v.clone(), |p| renamed[p].clone())
                })
                .collect();
            out.categories = Some(Rc::new(renamed));
        }
        other => {
            return Err(RuntimeError::attribute_error(format!(
                "'CategoricalAccessor' object has no attribute '{other}'"
            )))
        }
    }
    Ok(Value::series(out))
}

pub fn accessor_method(
    interp: &mut Interpreter,
    kind: AccessorKind,
    series: &Rc<Series>,
    name: &str,
    args: CallArgs,
) -> RtResult<Value> {
    interp.consume_gas(series.len() as u64)?;
    match kind {
        AccessorKind::Str => string_method(series, name, &args),
        AccessorKind::Dt => datetime_method(series, name, &args),
        AccessorKind::Cat => categorical_method(series, name, &args),
        AccessorKind::ILoc | AccessorKind::Loc => Err(RuntimeError::type_error(format!(
            "'{}' object is not callable",
            kind.type_name()
        ))),
    }
}

pub fn accessor_has_method(kind: AccessorKind, name: &str) -> bool {
    match kind {
        AccessorKind::Str => STR_METHODS.contains(&name),
        AccessorKind::Dt => DT_METHODS.contains(&name),
        AccessorKind::Cat => CAT_METHODS.contains(&name),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::runtime::interpreter::Limits;

    fn ints(values: &[i64]) -> Series {
        Series::new(Some("n".into()), values.iter().map(|&v| Value::Int(v)).collect())
    }

    #[test]
    fn aggregates_skip_missing_values() {
        let mut s = ints(&[1, 2, 3]);
        s.values.push(Value::Float(f64::NAN));
        assert_eq!(repr(&aggregate(&s, "sum", 1).unwrap()), "6.0");
        assert_eq!(repr(&aggregate(&s, "count", 1).unwrap()), "3");
        assert_eq!(repr(&aggregate(&s, "mean", 1).unwrap()), "2.0");
        assert_eq!(repr(&aggregate(&s, "std", 1).unwrap()), "1.0");
    }

    #[test]
    fn dtype_widens_ints_with_gaps() {
        assert_eq!(ints(&[1, 2]).dtype(), "int64");
        let gappy = Series::new(None, vec![Value::Int(1), Value::None]);
        assert_eq!(gappy.dtype(), "float64");
        let text = Series::new(None, vec![Value::str("a"), Value::Int(1)]);
        assert_eq!(text.dtype(), "object");
    }

    #[test]
    fn value_counts_sorts_descending() {
        let s = Series::new(None, ["b", "a", "b", "c", "b", "a"].into_iter().map(Value::str).collect());
        let counts = value_counts(&s, &CallArgs::default()).unwrap();
        assert_eq!(repr(&Value::list(counts.index.as_ref().clone())), "['b', 'a', 'c']");
        assert_eq!(repr(&Value::list(counts.values.clone())), "[3, 2, 1]");
    }

    #[test]
    fn categorical_fill_requires_known_category() {
        let s = Series::new(None, vec![Value::str("x"), Value::None]);
        let categorical = astype(&s, "category").unwrap();
        assert!(fillna(&categorical, &Value::str("x")).is_ok());
        let err = fillna(&categorical, &Value::str("y")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    }

    #[test]
    fn cumulative_sum_and_product_fold_left() {
        let s = ints(&[1, 2, 3]);
        assert_eq!(repr(&Value::list(cumulative(&s, BinOp::Add).unwrap())), "[1, 3, 6]");
        assert_eq!(repr(&Value::list(cumulative(&s, BinOp::Mul).unwrap())), "[1, 2, 6]");
    }

    #[test]
    fn isin_matches_by_key() {
        let flags = isin(&ints(&[1, 2, 3]).values, &Value::list(vec![Value::Int(2), Value::Int(3)])).unwrap();
        assert_eq!(repr(&Value::list(flags)), "[False, True, True]");
    }

    #[test]
    fn method_dispatch_charges_gas() {
        let mut interp = Interpreter::new(Limits::default());
        let before = interp.gas();
        let s = Rc::new(ints(&[5, 1, 4]));
        let out = call_method(&mut interp, &s, "sort_values", CallArgs::default()).unwrap();
        let Value::Series(sorted) = out else { panic!("series expected") };
        assert_eq!(repr(&Value::list(sorted.values.clone())), "[1, 4, 5]");
        assert!(interp.gas() < before);
    }
}
