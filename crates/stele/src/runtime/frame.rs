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

//! Two-dimensional tables of named columns sharing one row index.

use super::format::{repr, to_str};
use super::groupby;
use super::interpreter::Interpreter;
use super::ops::{self, values_equal};
use super::series::{self, range_index, Series};
use super::value::{AccessorKind, CallArgs, Dict, Key, Value};
use crate::ast::BinOp;
use crate::error::{RtResult, RuntimeError};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub columns: IndexMap<String, Rc<Series>>,
    pub index: Rc<Vec<Value>>,
    pub index_names: Vec<String>,
}

/// Which columns a `.loc`/`.iloc` key addresses.
enum Columns {
    One(String),
    Many(Vec<String>),
}

impl Frame {
    pub fn from_columns(columns: Vec<(String, Vec<Value>)>, index: Rc<Vec<Value>>) -> Self {
        let mut frame = Frame {
            columns: IndexMap::new(),
            index,
            index_names: Vec::new(),
        };
        for (name, values) in columns {
            frame.put(name, values, None);
        }
        frame
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.columns.is_empty()
    }

    pub fn column(&self, name: &str) -> RtResult<Rc<Series>> {
        self.columns
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::key_error(repr(&Value::str(name))))
    }

    fn put(&mut self, name: String, values: Vec<Value>, categories: Option<Rc<Vec<Value>>>) {
        let series = Series {
            name: Some(name.clone()),
            values,
            index: self.index.clone(),
            index_names: self.index_names.clone(),
            categories,
        };
        self.columns.insert(name, Rc::new(series));
    }

    /// Rows at `positions`, in that order.
    pub fn take(&self, positions: &[usize]) -> Frame {
        let index = Rc::new(positions.iter().map(|&p| self.index[p].clone()).collect());
        let mut out = Frame {
            columns: IndexMap::new(),
            index,
            index_names: self.index_names.clone(),
        };
        for (name, column) in &self.columns {
            let values = positions.iter().map(|&p| column.values[p].clone()).collect();
            out.put(name.clone(), values, column.categories.clone());
        }
        out
    }

    fn select(&self, names: &[String]) -> RtResult<Frame> {
        let missing: Vec<Value> = names
            .iter()
            .filter(|n| !self.columns.contains_key(n.as_str()))
            .map(Value::str)
            .collect();
        if !missing.is_empty() {
            return Err(RuntimeError::key_error(format!(
                "\"{} not in index\"",
                repr(&Value::list(missing))
            )));
        }
        let mut out = Frame {
            columns: IndexMap::new(),
            index: self.index.clone(),
            index_names: self.index_names.clone(),
        };
        for name in names {
            out.columns.insert(name.clone(), self.columns[name.as_str()].clone());
        }
        Ok(out)
    }

    /// Swaps the row labels, keeping every column's values.
    pub fn reindex_rows(&mut self, index: Rc<Vec<Value>>, names: Vec<String>) {
        self.index = index;
        self.index_names = names;
        let columns = std::mem::take(&mut self.columns);
        for (name, column) in columns {
            let categories = column.categories.clone();
            self.put(name, column.values.clone(), categories);
        }
    }

    /// One row as a series labelled by column name.
    pub fn row(&self, position: usize) -> Series {
        Series::with_index(
            Some(to_str(&self.index[position])),
            self.columns.values().map(|c| c.values[position].clone()).collect(),
            Rc::new(self.columns.keys().map(Value::str).collect()),
        )
    }

    /// Row records in column order, the wire form of a frame.
    pub fn records(&self) -> Vec<Vec<(String, Value)>> {
        (0..self.len())
            .map(|i| {
                self.columns
                    .iter()
                    .map(|(name, column)| (name.clone(), column.values[i].clone()))
                    .collect()
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let mut header = vec![String::new()];
        header.extend(self.columns.keys().cloned());
        let mut rows = vec![header];
        for i in 0..self.len() {
            let mut row = vec![to_str(&self.index[i])];
            row.extend(self.columns.values().map(|c| {
                let v = &c.values[i];
                if v.is_missing() {
                    "NaN".to_string()
                } else {
                    to_str(v)
                }
            }));
            rows.push(row);
        }
        let widths: Vec<usize> = (0..rows[0].len())
            .map(|c| rows.iter().map(|r| r[c].chars().count()).max().unwrap_or(0))
            .collect();
        let mut lines: Vec<String> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(c, cell)| {
                        let width = widths[c];
                        if c == 0 {
                            format!("{cell:<width$}")
                        } else {
                            format!("{cell:>width$}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("  ")
            })
            .collect();
        if self.columns.is_empty() {
            lines = vec![format!(
                "Empty DataFrame\nColumns: []\nIndex: [{}]",
                self.index.iter().map(to_str).collect::<Vec<_>>().join(", ")
            )];
        }
        lines.join("\n")
    }

    /// Values for a new column, aligned to this frame's rows.
    fn conform(&self, value: &Value) -> RtResult<(Vec<Value>, Option<Rc<Vec<Value>>>)> {
        match value {
            Value::Series(series) => {
                if series.len() == self.len()
                    && series.index.iter().zip(self.index.iter()).all(|(a, b)| values_equal(a, b))
                {
                    return Ok((series.values.clone(), series.categories.clone()));
                }
                let mut by_label = std::collections::HashMap::new();
                for (label, v) in series.index.iter().zip(&series.values) {
                    by_label.insert(Key::from_value(label)?, v.clone());
                }
                let values = self
                    .index
                    .iter()
                    .map(|label| {
                        Ok(by_label
                            .get(&Key::from_value(label)?)
                            .cloned()
                            .unwrap_or(Value::Float(f64::NAN)))
                    })
                    .collect::<RtResult<Vec<_>>>()?;
                Ok((values, series.categories.clone()))
            }
            Value::List(_) | Value::Tuple(_) | Value::Index(_) => {
                let items = ops::iterate(value)?;
                if items.len() != self.len() {
                    return Err(RuntimeError::value_error(format!(
                        "Length of values ({}) does not match length of index ({})",
                        items.len(),
                        self.len()
                    )));
                }
                Ok((items, None))
            }
            Value::Frame(_) => Err(RuntimeError::value_error(
                "Cannot set a DataFrame with multiple columns to the single column",
            )),
            scalar => Ok((vec![scalar.clone(); self.len()], None)),
        }
    }

    pub fn set_column(&mut self, name: &str, value: &Value) -> RtResult<()> {
        if self.columns.is_empty() && self.index.is_empty() {
            if let Value::Series(series) = value {
                self.index = series.index.clone();
                self.index_names = series.index_names.clone();
            } else if let Value::List(items) = value {
                self.index = range_index(items.borrow().len());
            }
        }
        let (values, categories) = self.conform(value)?;
        self.put(name.to_string(), values, categories);
        Ok(())
    }
}

pub fn binary(op: BinOp, frame: &Frame, other: &Value, reversed: bool) -> RtResult<Frame> {
    let mut out = Frame {
        columns: IndexMap::new(),
        index: frame.index.clone(),
        index_names: frame.index_names.clone(),
    };
    for (name, column) in &frame.columns {
        let operand = match other {
            Value::Frame(rhs) => match rhs.try_borrow() {
                Ok(rhs) => rhs
                    .columns
                    .get(name)
                    .map_or(Value::Float(f64::NAN), |c| Value::Series(c.clone())),
                Err(_) => Value::Series(column.clone()),
            },
            Value::Series(rhs) => match rhs.position_of(&Value::str(name))? {
                Some(p) => rhs.values[p].clone(),
                None => Value::Float(f64::NAN),
            },
            scalar => scalar.clone(),
        };
        let result = series::binary(op, column, &operand, reversed)?;
        out.put(name.clone(), result.values, None);
    }
    Ok(out)
}

fn column_names(value: &Value) -> RtResult<Vec<String>> {
    match value {
        Value::Str(s) => Ok(vec![s.to_string()]),
        other => ops::iterate(other)?
            .iter()
            .map(|v| Ok(to_str(v)))
            .collect(),
    }
}

fn is_bool_list(items: &[Value]) -> bool {
    !items.is_empty() && items.iter().all(|v| matches!(v, Value::Bool(_)))
}

pub fn get_item(frame: &Frame, key: &Value) -> RtResult<Value> {
    match key {
        Value::Str(name) => Ok(Value::Series(frame.column(name)?)),
        Value::Series(mask) => {
            let positions = series::mask_from_series(&frame.index, mask)?;
            Ok(Value::frame(frame.take(&positions)))
        }
        Value::Slice(slice) => Ok(Value::frame(frame.take(&slice.positions(frame.len())?))),
        Value::List(_) | Value::Tuple(_) | Value::Index(_) => {
            let items = ops::iterate(key)?;
            if is_bool_list(&items) && items.len() == frame.len() {
                let positions: Vec<usize> = items
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| matches!(v, Value::Bool(true)))
                    .map(|(i, _)| i)
                    .collect();
                return Ok(Value::frame(frame.take(&positions)));
            }
            let names: Vec<String> = items.iter().map(to_str).collect();
            Ok(Value::frame(frame.select(&names)?))
        }
        Value::Frame(mask) => {
            let mask = mask.borrow();
            let mut out = frame.clone();
            for (name, column) in &frame.columns {
                if let Some(flags) = mask.columns.get(name) {
                    let values = column
                        .values
                        .iter()
                        .zip(&flags.values)
                        .map(|(v, f)| if matches!(f, Value::Bool(true)) { v.clone() } else { Value::Float(f64::NAN) })
                        .collect();
                    out.put(name.clone(), values, None);
                }
            }
            Ok(Value::frame(out))
        }
        other => Err(RuntimeError::key_error(repr(other))),
    }
}

pub fn set_item(frame: &mut Frame, key: &Value, value: Value) -> RtResult<()> {
    match key {
        Value::Str(name) => frame.set_column(name, &value),
        Value::List(_) | Value::Tuple(_) => {
            let names = column_names(key)?;
            match &value {
                Value::Frame(source) => {
                    let source = source
                        .try_borrow()
                        .map_err(|_| RuntimeError::value_error("cannot assign a frame to itself"))?
                        .clone();
                    if source.columns.len() != names.len() {
                        return Err(RuntimeError::value_error("Columns must be same length as key"));
                    }
                    for (name, column) in names.iter().zip(source.columns.values()) {
                        frame.set_column(name, &Value::Series(column.clone()))?;
                    }
                    Ok(())
                }
                other => {
                    for name in &names {
                        frame.set_column(name, other)?;
                    }
                    Ok(())
                }
            }
        }
        other => Err(RuntimeError::type_error(format!(
            "cannot set a column with a key of type {}",
            other.type_name()
        ))),
    }
}

fn select_columns(frame: &Frame, kind: AccessorKind, key: &Value) -> RtResult<Columns> {
    let names: Vec<String> = frame.columns.keys().cloned().collect();
    match (kind, key) {
        (AccessorKind::Loc, Value::Str(name)) => Ok(Columns::One(name.to_string())),
        (AccessorKind::ILoc, Value::Int(i)) => ops::resolve_position(*i, names.len())
            .map(|p| Columns::One(names[p].clone()))
            .ok_or_else(|| RuntimeError::index_error("single positional indexer is out-of-bounds")),
        (AccessorKind::ILoc, Value::Slice(slice)) => Ok(Columns::Many(
            slice.positions(names.len())?.into_iter().map(|p| names[p].clone()).collect(),
        )),
        (AccessorKind::Loc, Value::Slice(slice)) => {
            let locate = |v: &Value, default: usize, offset: usize| -> RtResult<usize> {
                match v {
                    Value::None => Ok(default),
                    label => names
                        .iter()
                        .position(|n| Some(n.as_str()) == label.as_str())
                        .map(|p| p + offset)
                        .ok_or_else(|| RuntimeError::key_error(repr(label))),
                }
            };
            let start = locate(&slice.start, 0, 0)?;
            let stop = locate(&slice.stop, names.len(), 1)?;
            Ok(Columns::Many(names[start..stop.max(start)].to_vec()))
        }
        (AccessorKind::ILoc, other) => {
            let positions = ops::iterate(other)?;
            positions
                .iter()
                .map(|v| {
                    v.as_i64()
                        .and_then(|i| ops::resolve_position(i, names.len()))
                        .map(|p| names[p].clone())
                        .ok_or_else(|| RuntimeError::index_error("positional indexers are out-of-bounds"))
                })
                .collect::<RtResult<Vec<_>>>()
                .map(Columns::Many)
        }
        (_, other) => {
            let items = ops::iterate(other)?;
            if is_bool_list(&items) {
                return Ok(Columns::Many(
                    names
                        .iter()
                        .zip(&items)
                        .filter(|(_, f)| matches!(f, Value::Bool(true)))
                        .map(|(n, _)| n.clone())
                        .collect(),
                ));
            }
            Ok(Columns::Many(items.iter().map(to_str).collect()))
        }
    }
}

fn split_key(key: &Value) -> (Value, Option<Value>) {
    match key {
        Value::Tuple(parts) if parts.len() == 2 => (parts[0].clone(), Some(parts[1].clone())),
        other => (other.clone(), None),
    }
}

fn row_selection(frame: &Frame, kind: AccessorKind, key: &Value) -> RtResult<Result<Vec<usize>, usize>> {
    if kind == AccessorKind::ILoc {
        series::iloc_positions(frame.len(), key)
    } else {
        series::loc_positions(&frame.index, key)
    }
}

pub fn index_with(frame: &Frame, kind: AccessorKind, key: &Value) -> RtResult<Value> {
    let (rows, columns) = split_key(key);
    let rows = row_selection(frame, kind, &rows)?;
    let columns = columns.map(|c| select_columns(frame, kind, &c)).transpose()?;
    Ok(match (rows, columns) {
        (Err(position), None) => Value::series(frame.row(position)),
        (Ok(positions), None) => Value::frame(frame.take(&positions)),
        (Err(position), Some(Columns::One(name))) => frame.column(&name)?.values[position].clone(),
        (Ok(positions), Some(Columns::One(name))) => {
            Value::series(frame.column(&name)?.take(&positions))
        }
        (Err(position), Some(Columns::Many(names))) => {
            Value::series(frame.select(&names)?.row(position))
        }
        (Ok(positions), Some(Columns::Many(names))) => {
            Value::frame(frame.select(&names)?.take(&positions))
        }
    })
}

/// Assignment through `.loc`/`.iloc`, e.g. `df.loc[mask, 'col'] = value`.
pub fn set_with(frame: &mut Frame, kind: AccessorKind, key: &Value, value: Value) -> RtResult<()> {
    let (rows, columns) = split_key(key);
    let positions = match row_selection(frame, kind, &rows)? {
        Err(position) => vec![position],
        Ok(positions) => positions,
    };
    let names = match columns.map(|c| select_columns(frame, kind, &c)).transpose()? {
        Some(Columns::One(name)) => vec![name],
        Some(Columns::Many(names)) => names,
        None => frame.columns.keys().cloned().collect(),
    };
    let row_value = |i: usize, position: usize| -> RtResult<Value> {
        Ok(match &value {
            Value::Series(source) if kind == AccessorKind::Loc => {
                match source.position_of(&frame.index[position])? {
                    Some(p) => source.values[p].clone(),
                    None => Value::Float(f64::NAN),
                }
            }
            Value::Series(source) => source.values.get(i).cloned().unwrap_or(Value::Float(f64::NAN)),
            Value::List(items) => items.borrow().get(i).cloned().ok_or_else(|| {
                RuntimeError::value_error("Must have equal len keys and value when setting with an iterable")
            })?,
            scalar => scalar.clone(),
        })
    };
    let mut updates = Vec::with_capacity(names.len());
    for name in &names {
        let (mut values, categories) = match frame.columns.get(name) {
            Some(column) => (column.values.clone(), column.categories.clone()),
            None => (vec![Value::Float(f64::NAN); frame.len()], None),
        };
        for (i, &position) in positions.iter().enumerate() {
            values[position] = row_value(i, position)?;
        }
        updates.push((name.clone(), values, categories));
    }
    for (name, values, categories) in updates {
        frame.put(name, values, categories);
    }
    Ok(())
}

pub const METHODS: &[&str] = &[
    "head", "tail", "copy", "dropna", "fillna", "groupby", "sort_values", "sort_index",
    "nlargest", "nsmallest", "rename", "drop_duplicates", "reset_index", "to_dict", "nunique",
    "mul", "multiply", "add", "sub", "div", "sum", "mean", "min", "max", "count", "median",
    "std", "var", "drop", "set_index", "select_dtypes", "astype", "apply", "iterrows", "items",
    "isna", "isnull", "notna", "notnull", "assign", "round", "pivot_table", "insert", "agg",
    "aggregate", "get", "keys", "any", "all", "duplicated", "first_valid_index",
];

pub fn property(frame: &Rc<RefCell<Frame>>, name: &str) -> RtResult<Option<Value>> {
    let snapshot = frame.borrow();
    Ok(Some(match name {
        "shape" => Value::tuple(vec![Value::from(snapshot.len()), Value::from(snapshot.columns.len())]),
        "columns" => Value::Index(Rc::new(snapshot.columns.keys().map(Value::str).collect())),
        "index" => Value::Index(snapshot.index.clone()),
        "empty" => Value::Bool(snapshot.is_empty()),
        "size" => Value::from(snapshot.len() * snapshot.columns.len()),
        "ndim" => Value::Int(2),
        "dtypes" => Value::series(Series::with_index(
            None,
            snapshot.columns.values().map(|c| Value::str(c.dtype())).collect(),
            Rc::new(snapshot.columns.keys().map(Value::str).collect()),
        )),
        "values" => Value::list(
            (0..snapshot.len())
                .map(|i| Value::list(snapshot.columns.values().map(|c| c.values[i].clone()).collect()))
                .collect(),
        ),
        "iloc" | "loc" => Value::Accessor(Rc::new(super::value::Accessor {
            kind: if name == "iloc" { AccessorKind::ILoc } else { AccessorKind::Loc },
            target: Value::Frame(frame.clone()),
        })),
        other => match snapshot.columns.get(other) {
            Some(column) => Value::Series(column.clone()),
            None => return Ok(None),
        },
    }))
}

fn numeric_column(column: &Series) -> bool {
    matches!(column.dtype(), "int64" | "float64" | "bool")
}

/// Column-wise (or row-wise with `axis=1`) reduction.
fn reduce(interp: &mut Interpreter, frame: &Frame, func: &str, args: &CallArgs) -> RtResult<Value> {
    let numeric_only = args.flag(usize::MAX, "numeric_only", false)?;
    let ddof = args.int(usize::MAX, "ddof", 1)?.max(0) as usize;
    let axis = axis_arg(args, 0)?;
    let columns: Vec<(&String, &Rc<Series>)> = frame
        .columns
        .iter()
        .filter(|(_, c)| !numeric_only || numeric_column(c))
        .collect();
    if axis == 1 {
        let mut values = Vec::with_capacity(frame.len());
        for i in 0..frame.len() {
            interp.consume_gas(columns.len() as u64)?;
            let row = Series::new(None, columns.iter().map(|(_, c)| c.values[i].clone()).collect());
            values.push(series::aggregate(&row, func, ddof)?);
        }
        return Ok(Value::series(Series::with_index(None, values, frame.index.clone())));
    }
    let mut values = Vec::with_capacity(columns.len());
    for (_, column) in &columns {
        interp.consume_gas(column.len() as u64)?;
        values.push(series::aggregate(column, func, ddof)?);
    }
    Ok(Value::series(Series::with_index(
        None,
        values,
        Rc::new(columns.iter().map(|(n, _)| Value::str(n)).collect()),
    )))
}

fn axis_arg(args: &CallArgs, default: i64) -> RtResult<i64> {
    match args.keyword("axis") {
        Some(Value::Str(s)) if s.as_ref() == "columns" => Ok(1),
        Some(Value::Str(s)) if s.as_ref() == "index" => Ok(0),
        Some(other) => other
            .as_i64()
            .ok_or_else(|| RuntimeError::value_error(format!("No axis named {}", repr(other)))),
        None => Ok(default),
    }
}

fn optional_names(value: Option<&Value>) -> RtResult<Option<Vec<String>>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(v) => column_names(v).map(Some),
    }
}

fn dropna(frame: &Frame, args: &CallArgs) -> RtResult<Frame> {
    let how_all = args.get_some(1, "how").and_then(Value::as_str) == Some("all");
    let subset = optional_names(args.get(3, "subset"))?;
    if axis_arg(args, 0)? == 1 {
        let keep: Vec<String> = frame
            .columns
            .iter()
            .filter(|(_, c)| {
                let missing = c.values.iter().filter(|v| v.is_missing()).count();
                if how_all {
                    missing < c.len() || c.is_empty()
                } else {
                    missing == 0
                }
            })
            .map(|(n, _)| n.clone())
            .collect();
        return frame.select(&keep);
    }
    let columns: Vec<Rc<Series>> = match &subset {
        Some(names) => names.iter().map(|n| frame.column(n)).collect::<RtResult<_>>()?,
        None => frame.columns.values().cloned().collect(),
    };
    let keep: Vec<usize> = (0..frame.len())
        .filter(|&i| {
            let missing = columns.iter().filter(|c| c.values[i].is_missing()).count();
            if how_all {
                missing < columns.len()
            } else {
                missing == 0
            }
        })
        .collect();
    Ok(frame.take(&keep))
}

fn fillna(frame: &Frame, value: &Value) -> RtResult<Frame> {
    let mut out = frame.clone();
    for (name, column) in &frame.columns {
        let fill = match value {
            Value::Dict(mapping) => match mapping.borrow().get(&Value::str(name))? {
                Some(v) => v,
                None => continue,
            },
            Value::Series(mapping) => match mapping.position_of(&Value::str(name))? {
                Some(p) => mapping.values[p].clone(),
                None => continue,
            },
            scalar => scalar.clone(),
        };
        let filled = series::fillna(column, &fill)?;
        out.put(name.clone(), filled.values, filled.categories);
    }
    Ok(out)
}

fn sort_values(frame: &Frame, args: &CallArgs) -> RtResult<Frame> {
    let by = column_names(args.require(0, "by", "sort_values")?)?;
    let ascending: Vec<bool> = match args.get(2, "ascending") {
        None => vec![true; by.len()],
        Some(Value::List(flags)) => flags
            .borrow()
            .iter()
            .map(Value::truthy)
            .collect::<RtResult<Vec<_>>>()?,
        Some(flag) => vec![flag.truthy()?; by.len()],
    };
    if ascending.len() != by.len() {
        return Err(RuntimeError::value_error(format!(
            "Length of ascending ({}) != length of by ({})",
            ascending.len(),
            by.len()
        )));
    }
    let columns = by.iter().map(|n| frame.column(n)).collect::<RtResult<Vec<_>>>()?;
    let keys: Vec<&[Value]> = columns.iter().map(|c| c.values.as_slice()).collect();
    let order = ops::sort_positions(&keys, &ascending)?;
    Ok(frame.take(&order))
}

fn nlargest(frame: &Frame, args: &CallArgs, largest: bool) -> RtResult<Frame> {
    let n = args.int(0, "n", 5)?.max(0) as usize;
    let by = column_names(args.require(1, "columns", "nlargest")?)?;
    let columns = by.iter().map(|c| frame.column(c)).collect::<RtResult<Vec<_>>>()?;
    let keys: Vec<&[Value]> = columns.iter().map(|c| c.values.as_slice()).collect();
    let order = ops::sort_positions(&keys, &vec![!largest; keys.len()])?;
    let keep: Vec<usize> = order
        .into_iter()
        .filter(|&p| !columns[0].values[p].is_missing())
        .take(n)
        .collect();
    Ok(frame.take(&keep))
}

fn rename(frame: &Frame, args: &CallArgs) -> RtResult<Frame> {
    let mapping = args.get_some(usize::MAX, "columns").or_else(|| args.get_some(0, "mapper"));
    let mut out = frame.clone();
    if let Some(mapping) = mapping {
        out.columns = IndexMap::new();
        for (name, column) in &frame.columns {
            let renamed = match mapping {
                Value::Dict(map) => map
                    .borrow()
                    .get(&Value::str(name))?
                    .map_or_else(|| name.clone(), |v| to_str(&v)),
                callable => return Err(RuntimeError::type_error(format!(
                    "rename mapper must be a dict, not {}",
                    callable.type_name()
                ))),
            };
            let mut column = (**column).clone();
            column.name = Some(renamed.clone());
            out.columns.insert(renamed, Rc::new(column));
        }
    }
    if let Some(Value::Dict(map)) = args.get_some(usize::MAX, "index") {
        let map = map.borrow();
        let labels = frame
            .index
            .iter()
            .map(|l| Ok(map.get(l)?.unwrap_or_else(|| l.clone())))
            .collect::<RtResult<Vec<_>>>()?;
        let names = out.index_names.clone();
        out.reindex_rows(Rc::new(labels), names);
    }
    Ok(out)
}

fn row_keys(frame: &Frame, subset: &Option<Vec<String>>) -> RtResult<Vec<Key>> {
    let columns: Vec<Rc<Series>> = match subset {
        Some(names) => names.iter().map(|n| frame.column(n)).collect::<RtResult<_>>()?,
        None => frame.columns.values().cloned().collect(),
    };
    (0..frame.len())
        .map(|i| {
            Ok(Key::Tuple(
                columns
                    .iter()
                    .map(|c| Key::from_value(&c.values[i]))
                    .collect::<RtResult<Vec<_>>>()?,
            ))
        })
        .collect()
}

fn duplicated_flags(frame: &Frame, args: &CallArgs) -> RtResult<Vec<bool>> {
    let subset = optional_names(args.get(0, "subset"))?;
    let keep_last = args.get_some(1, "keep").and_then(Value::as_str) == Some("last");
    let keys = row_keys(frame, &subset)?;
    let mut seen = HashSet::new();
    let mut flags = vec![false; keys.len()];
    let order: Vec<usize> = if keep_last {
        (0..keys.len()).rev().collect()
    } else {
        (0..keys.len()).collect()
    };
    for i in order {
        flags[i] = !seen.insert(keys[i].clone());
    }
    Ok(flags)
}

/// Moves the index into leading columns.
pub fn reset_index(frame: &Frame, drop: bool) -> Frame {
    let mut columns = Vec::new();
    if !drop {
        let named = !frame.index_names.is_empty();
        for (name, values) in series::index_columns(&frame.index, &frame.index_names) {
            if named || !frame.columns.contains_key("index") {
                columns.push((name, values));
            } else {
                columns.push(("level_0".to_string(), values));
            }
        }
    }
    for (name, column) in &frame.columns {
        columns.push((name.clone(), column.values.clone()));
    }
    let mut out = Frame::from_columns(columns, range_index(frame.len()));
    for (name, column) in &frame.columns {
        if let Some(categories) = &column.categories {
            out.put(name.clone(), column.values.clone(), Some(categories.clone()));
        }
    }
    out
}

fn to_dict(frame: &Frame, orient: &str) -> RtResult<Value> {
    Ok(match orient {
        "dict" => {
            let mut out = Dict::new();
            for (name, column) in &frame.columns {
                let mut inner = Dict::new();
                for (label, value) in column.index.iter().zip(&column.values) {
                    inner.insert(label.clone(), value.clone())?;
                }
                out.insert_str(name, Value::dict(inner));
            }
            Value::dict(out)
        }
        "list" | "series" => {
            let mut out = Dict::new();
            for (name, column) in &frame.columns {
                let value = if orient == "list" {
                    Value::list(column.values.clone())
                } else {
                    Value::Series(column.clone())
                };
                out.insert_str(name, value);
            }
            Value::dict(out)
        }
        "records" => Value::list(
            frame
                .records()
                .into_iter()
                .map(|row| Value::dict(row.into_iter().collect()))
                .collect(),
        ),
        "index" => {
            let mut out = Dict::new();
            for (label, row) in frame.index.iter().zip(frame.records()) {
                out.insert(label.clone(), Value::dict(row.into_iter().collect()))?;
            }
            Value::dict(out)
        }
        other => {
            return Err(RuntimeError::value_error(format!(
                "orient '{other}' not understood"
            )))
        }
    })
}

fn drop_labels(frame: &Frame, args: &CallArgs) -> RtResult<Frame> {
    let axis = axis_arg(args, 0)?;
    let errors_ignore = args.get_some(usize::MAX, "errors").and_then(Value::as_str) == Some("ignore");
    let (columns, rows) = match (args.get_some(usize::MAX, "columns"), args.get_some(usize::MAX, "index")) {
        (None, None) => {
            let labels = args.require(0, "labels", "drop")?.clone();
            if axis == 1 {
                (Some(labels), None)
            } else {
                (None, Some(labels))
            }
        }
        (columns, rows) => (columns.cloned(), rows.cloned()),
    };
    let mut out = frame.clone();
    if let Some(columns) = columns {
        for name in column_names(&columns)? {
            if out.columns.shift_remove(&name).is_none() && !errors_ignore {
                return Err(RuntimeError::key_error(format!(
                    "\"{} not found in axis\"",
                    repr(&Value::list(vec![Value::str(&name)]))
                )));
            }
        }
    }
    if let Some(rows) = rows {
        let labels = match &rows {
            Value::List(_) | Value::Tuple(_) | Value::Index(_) => ops::iterate(&rows)?,
            single => vec![single.clone()],
        };
        let drop: HashSet<Key> = labels.iter().map(Key::from_value).collect::<RtResult<_>>()?;
        let keep: Vec<usize> = (0..out.len())
            .filter(|&i| Key::from_value(&out.index[i]).map_or(true, |k| !drop.contains(&k)))
            .collect();
        out = out.take(&keep);
    }
    Ok(out)
}

fn set_index(frame: &Frame, args: &CallArgs) -> RtResult<Frame> {
    let keys = column_names(args.require(0, "keys", "set_index")?)?;
    let drop = args.flag(1, "drop", true)?;
    let columns = keys.iter().map(|k| frame.column(k)).collect::<RtResult<Vec<_>>>()?;
    let labels: Vec<Value> = (0..frame.len())
        .map(|i| {
            if columns.len() == 1 {
                columns[0].values[i].clone()
            } else {
                Value::tuple(columns.iter().map(|c| c.values[i].clone()).collect())
            }
        })
        .collect();
    let mut out = frame.clone();
    if drop {
        for key in &keys {
            out.columns.shift_remove(key);
        }
    }
    out.reindex_rows(Rc::new(labels), keys);
    Ok(out)
}

fn dtype_matches(column: &Series, selector: &str) -> bool {
    let dtype = column.dtype();
    match selector {
        "number" | "numeric" => matches!(dtype, "int64" | "float64"),
        "int" | "int64" | "integer" => dtype == "int64",
        "float" | "float64" | "floating" => dtype == "float64",
        "object" | "str" | "string" | "O" => dtype == "object",
        "bool" => dtype == "bool",
        "category" => dtype == "category",
        "datetime" | "datetime64" | "datetime64[ns]" => dtype == "datetime64[ns]",
        other => dtype == other,
    }
}

fn selectors(value: Option<&Value>) -> RtResult<Vec<String>> {
    match value {
        None | Some(Value::None) => Ok(Vec::new()),
        Some(Value::List(items)) => items
            .borrow()
            .iter()
            .map(|v| match v {
                Value::Builtin(_) => series::dtype_name(v),
                other => Ok(to_str(other)),
            })
            .collect(),
        Some(Value::Builtin(b)) => Ok(vec![b.name.to_string()]),
        Some(other) => Ok(vec![to_str(other)]),
    }
}

fn select_dtypes(frame: &Frame, args: &CallArgs) -> RtResult<Frame> {
    let include = selectors(args.get(0, "include"))?;
    let exclude = selectors(args.get(1, "exclude"))?;
    let names: Vec<String> = frame
        .columns
        .iter()
        .filter(|(_, c)| include.is_empty() || include.iter().any(|s| dtype_matches(c, s)))
        .filter(|(_, c)| !exclude.iter().any(|s| dtype_matches(c, s)))
        .map(|(n, _)| n.clone())
        .collect();
    frame.select(&names)
}

fn astype(frame: &Frame, dtype: &Value) -> RtResult<Frame> {
    let mut out = frame.clone();
    for (name, column) in &frame.columns {
        let target = match dtype {
            Value::Dict(mapping) => match mapping.borrow().get(&Value::str(name))? {
                Some(d) => d,
                None => continue,
            },
            other => other.clone(),
        };
        let cast = series::astype(column, &series::dtype_name(&target)?)?;
        out.put(name.clone(), cast.values, cast.categories);
    }
    Ok(out)
}

fn apply(interp: &mut Interpreter, frame: &Frame, args: &CallArgs) -> RtResult<Value> {
    let func = args.require(0, "func", "apply")?.clone();
    let axis = match args.get(1, "axis") {
        Some(Value::Str(s)) if s.as_ref() == "columns" => 1,
        Some(v) => v.as_i64().unwrap_or(0),
        None => 0,
    };
    if axis == 1 {
        let mut values = Vec::with_capacity(frame.len());
        for i in 0..frame.len() {
            interp.consume_gas(1)?;
            values.push(interp.call_value(&func, CallArgs::new(vec![Value::series(frame.row(i))]))?);
        }
        return Ok(Value::series(Series::with_index(None, values, frame.index.clone())));
    }
    let mut values = Vec::with_capacity(frame.columns.len());
    for column in frame.columns.values() {
        values.push(interp.call_value(&func, CallArgs::new(vec![Value::Series(column.clone())]))?);
    }
    if values.iter().all(|v| matches!(v, Value::Series(_))) && !values.is_empty() {
        let columns = frame
            .columns
            .keys()
            .cloned()
            .zip(values.iter().map(|v| match v {
                Value::Series(s) => s.values.clone(),
                _ => Vec::new(),
            }))
            .collect();
        let index = match &values[0] {
            Value::Series(s) => s.index.clone(),
            _ => frame.index.clone(),
        };
        return Ok(Value::frame(Frame::from_columns(columns, index)));
    }
    Ok(Value::series(Series::with_index(
        None,
        values,
        Rc::new(frame.columns.keys().map(Value::str).collect()),
    )))
}

fn pivot_table(interp: &mut Interpreter, frame: &Frame, args: &CallArgs) -> RtResult<Frame> {
    let values = args.get_some(0, "values").map(to_str);
    let index = column_names(args.require(1, "index", "pivot_table")?)?;
    let columns = args.get_some(2, "columns").map(to_str);
    let aggfunc = args.get_some(3, "aggfunc").cloned().unwrap_or_else(|| Value::str("mean"));
    let fill_value = args.get_some(4, "fill_value").cloned();
    let Some(value_column) = values else {
        return Err(RuntimeError::type_error("pivot_table() requires 'values'"));
    };
    let mut keys = index.clone();
    if let Some(c) = &columns {
        keys.push(c.clone());
    }
    let snapshot = Rc::new(frame.clone());
    let grouped = groupby::GroupBy::new(snapshot, &keys, true, true)?;
    let groups = grouped.group_rows()?;
    let source = frame.column(&value_column)?;
    let mut row_labels: IndexMap<Key, Value> = IndexMap::new();
    let mut column_labels: IndexMap<Key, Value> = IndexMap::new();
    let mut cells: std::collections::HashMap<(Key, Key), Value> = std::collections::HashMap::new();
    for (label, rows) in groups {
        let parts: Vec<Value> = match &label {
            Value::Tuple(parts) if keys.len() > 1 => parts.to_vec(),
            single => vec![single.clone()],
        };
        let (row_label, column_label) = if columns.is_some() {
            let row_parts = &parts[..parts.len() - 1];
            let row = if row_parts.len() == 1 {
                row_parts[0].clone()
            } else {
                Value::tuple(row_parts.to_vec())
            };
            (row, parts[parts.len() - 1].clone())
        } else {
            (label.clone(), Value::str(&value_column))
        };
        let subset = source.take(&rows);
        let result = series::apply_aggregate(interp, &subset, &aggfunc)?;
        let (rk, ck) = (Key::from_value(&row_label)?, Key::from_value(&column_label)?);
        row_labels.entry(rk.clone()).or_insert(row_label);
        column_labels.entry(ck.clone()).or_insert(column_label);
        cells.insert((rk, ck), result);
    }
    let mut ordered_columns: Vec<(Key, Value)> = column_labels.into_iter().collect();
    let column_values: Vec<Value> = ordered_columns.iter().map(|(_, v)| v.clone()).collect();
    let order = ops::sort_positions(&[column_values.as_slice()], &[true])?;
    ordered_columns = order.into_iter().map(|p| ordered_columns[p].clone()).collect();
    let missing = fill_value.unwrap_or(Value::Float(f64::NAN));
    let out_columns = ordered_columns
        .iter()
        .map(|(ck, label)| {
            let values = row_labels
                .keys()
                .map(|rk| cells.get(&(rk.clone(), ck.clone())).cloned().unwrap_or_else(|| missing.clone()))
                .collect();
            (to_str(label), values)
        })
        .collect();
    let mut out = Frame::from_columns(out_columns, Rc::new(row_labels.into_values().collect()));
    let names = index.clone();
    out.reindex_rows(out.index.clone(), names);
    Ok(out)
}

fn frame_agg(interp: &mut Interpreter, frame: &Frame, func: &Value) -> RtResult<Value> {
    match func {
        Value::Dict(spec) => {
            let spec = spec.borrow().items();
            let mut out = Dict::new();
            for (column, func) in spec {
                let series = frame.column(&to_str(&column))?;
                let value = match &func {
                    Value::List(funcs) => {
                        let funcs = funcs.borrow().clone();
                        let mut labels = Vec::new();
                        let mut values = Vec::new();
                        for f in &funcs {
                            labels.push(Value::str(series::aggregate_label(f)));
                            values.push(series::apply_aggregate(interp, &series, f)?);
                        }
                        Value::series(Series::with_index(series.name.clone(), values, Rc::new(labels)))
                    }
                    single => series::apply_aggregate(interp, &series, single)?,
                };
                out.insert(column, value)?;
            }
            let all_scalar = out.values().iter().all(|v| !matches!(v, Value::Series(_)));
            if all_scalar {
                let labels = out.keys();
                return Ok(Value::series(Series::with_index(None, out.values(), Rc::new(labels))));
            }
            Ok(Value::dict(out))
        }
        Value::List(funcs) => {
            let funcs = funcs.borrow().clone();
            let labels: Vec<Value> = funcs.iter().map(|f| Value::str(series::aggregate_label(f))).collect();
            let mut columns = Vec::new();
            for (name, column) in &frame.columns {
                let values = funcs
                    .iter()
                    .map(|f| series::apply_aggregate(interp, column, f))
                    .collect::<RtResult<Vec<_>>>()?;
                columns.push((name.clone(), values));
            }
            Ok(Value::frame(Frame::from_columns(columns, Rc::new(labels))))
        }
        single => {
            let mut values = Vec::new();
            for column in frame.columns.values() {
                values.push(series::apply_aggregate(interp, column, single)?);
            }
            Ok(Value::series(Series::with_index(
                None,
                values,
                Rc::new(frame.columns.keys().map(Value::str).collect()),
            )))
        }
    }
}

fn map_columns(frame: &Frame, f: impl Fn(&Series) -> RtResult<Series>) -> RtResult<Frame> {
    let mut out = frame.clone();
    for (name, column) in &frame.columns {
        let mapped = f(column)?;
        out.put(name.clone(), mapped.values, mapped.categories);
    }
    Ok(out)
}

fn missing_mask(frame: &Frame, missing: bool) -> RtResult<Frame> {
    map_columns(frame, |c| {
        Ok(c.with_values(c.values.iter().map(|v| Value::Bool(v.is_missing() == missing)).collect()))
    })
}

fn finish(target: &Rc<RefCell<Frame>>, result: Frame, inplace: bool) -> Value {
    if inplace {
        *target.borrow_mut() = result;
        Value::None
    } else {
        Value::frame(result)
    }
}

pub fn call_method(
    interp: &mut Interpreter,
    target: &Rc<RefCell<Frame>>,
    name: &str,
    args: CallArgs,
) -> RtResult<Value> {
    let frame = target.borrow().clone();
    interp.consume_gas((frame.len() * frame.columns.len().max(1)) as u64)?;
    let inplace = args.flag(usize::MAX, "inplace", false)?;
    match name {
        "head" => Ok(Value::frame(frame.take(&series::head_positions(frame.len(), args.int(0, "n", 5)?)))),
        "tail" => Ok(Value::frame(frame.take(&series::tail_positions(frame.len(), args.int(0, "n", 5)?)))),
        "copy" => Ok(Value::frame(frame)),
        "dropna" => Ok(finish(target, dropna(&frame, &args)?, inplace)),
        "fillna" => {
            let value = args.get_some(0, "value").ok_or_else(|| {
                RuntimeError::value_error("Must specify a fill 'value' or 'method'.")
            })?;
            Ok(finish(target, fillna(&frame, value)?, inplace))
        }
        "groupby" => Ok(Value::GroupBy(Rc::new(groupby::from_frame(Rc::new(frame), &args)?))),
        "sort_values" => Ok(finish(target, sort_values(&frame, &args)?, inplace)),
        "sort_index" => {
            let ascending = args.flag(usize::MAX, "ascending", true)?;
            let order = ops::sort_positions(&[frame.index.as_slice()], &[ascending])?;
            Ok(finish(target, frame.take(&order), inplace))
        }
        "nlargest" => nlargest(&frame, &args, true).map(Value::frame),
        "nsmallest" => nlargest(&frame, &args, false).map(Value::frame),
        "rename" => Ok(finish(target, rename(&frame, &args)?, inplace)),
        "drop_duplicates" => {
            let flags = duplicated_flags(&frame, &args)?;
            let keep: Vec<usize> = (0..frame.len()).filter(|&i| !flags[i]).collect();
            let mut out = frame.take(&keep);
            if args.flag(usize::MAX, "ignore_index", false)? {
                out = reset_index(&out, true);
            }
            Ok(finish(target, out, inplace))
        }
        "duplicated" => {
            let flags = duplicated_flags(&frame, &args)?;
            Ok(Value::series(Series::with_index(
                None,
                flags.into_iter().map(Value::Bool).collect(),
                frame.index.clone(),
            )))
        }
        "reset_index" => Ok(finish(target, reset_index(&frame, args.flag(1, "drop", false)?), inplace)),
        "to_dict" => {
            let orient = args.get_some(0, "orient").map(to_str).unwrap_or_else(|| "dict".to_string());
            to_dict(&frame, &orient)
        }
        "nunique" => {
            let values = frame
                .columns
                .values()
                .map(|c| series::distinct_count(&c.values).map(Value::from))
                .collect::<RtResult<Vec<_>>>()?;
            Ok(Value::series(Series::with_index(
                None,
                values,
                Rc::new(frame.columns.keys().map(Value::str).collect()),
            )))
        }
        "mul" | "multiply" | "add" | "sub" | "div" => {
            let op = match name {
                "add" => BinOp::Add,
                "sub" => BinOp::Sub,
                "div" => BinOp::Div,
                _ => BinOp::Mul,
            };
            let other = args.require(0, "other", name)?;
            binary(op, &frame, other, false).map(Value::frame)
        }
        "sum" | "mean" | "min" | "max" | "count" | "median" | "std" | "var" | "any" | "all" => {
            reduce(interp, &frame, name, &args)
        }
        "drop" => Ok(finish(target, drop_labels(&frame, &args)?, inplace)),
        "set_index" => Ok(finish(target, set_index(&frame, &args)?, inplace)),
        "select_dtypes" => select_dtypes(&frame, &args).map(Value::frame),
        "astype" => astype(&frame, args.require(0, "dtype", "astype")?).map(Value::frame),
        "apply" => apply(interp, &frame, &args),
        "iterrows" => Ok(Value::list(
            (0..frame.len())
                .map(|i| Value::tuple(vec![frame.index[i].clone(), Value::series(frame.row(i))]))
                .collect(),
        )),
        "items" => Ok(Value::list(
            frame
                .columns
                .iter()
                .map(|(n, c)| Value::tuple(vec![Value::str(n), Value::Series(c.clone())]))
                .collect(),
        )),
        "keys" => Ok(Value::Index(Rc::new(frame.columns.keys().map(Value::str).collect()))),
        "get" => {
            let key = args.require(0, "key", "get")?;
            match key.as_str().and_then(|k| frame.columns.get(k)) {
                Some(column) => Ok(Value::Series(column.clone())),
                None => Ok(args.get(1, "default").cloned().unwrap_or(Value::None)),
            }
        }
        "isna" | "isnull" => missing_mask(&frame, true).map(Value::frame),
        "notna" | "notnull" => missing_mask(&frame, false).map(Value::frame),
        "assign" => {
            let mut out = frame.clone();
            for (column, value) in &args.keywords {
                let value = match value {
                    Value::Function(_) | Value::Builtin(_) | Value::Method(_) => interp.call_value(
                        value,
                        CallArgs::new(vec![Value::frame(out.clone())]),
                    )?,
                    other => other.clone(),
                };
                out.set_column(column, &value)?;
            }
            Ok(Value::frame(out))
        }
        "insert" => {
            let position = args.int(0, "loc", 0)?.max(0) as usize;
            let column = to_str(args.require(1, "column", "insert")?);
            let value = args.require(2, "value", "insert")?;
            let mut out = frame.clone();
            out.set_column(&column, value)?;
            let last = out.columns.len() - 1;
            out.columns.move_index(last, position.min(last));
            *target.borrow_mut() = out;
            Ok(Value::None)
        }
        "round" => {
            let digits = args.int(0, "decimals", 0)? as i32;
            map_columns(&frame, |c| {
                Ok(c.with_values(
                    c.values
                        .iter()
                        .map(|v| match v {
                            Value::Float(f) => Value::Float(ops::round_half_even(*f, digits)),
                            other => other.clone(),
                        })
                        .collect(),
                ))
            })
            .map(Value::frame)
        }
        "pivot_table" => pivot_table(interp, &frame, &args).map(Value::frame),
        "agg" | "aggregate" => frame_agg(interp, &frame, args.require(0, "func", name)?),
        "first_valid_index" => Ok((0..frame.len())
            .find(|&i| frame.columns.values().any(|c| !c.values[i].is_missing()))
            .map_or(Value::None, |i| frame.index[i].clone())),
        other => Err(RuntimeError::attribute_error(format!(
            "'DataFrame' object has no attribute '{other}'"
        ))),
    }
}

/// Builds a frame from the `pd.DataFrame(...)` constructor arguments.
pub fn construct(data: Option<&Value>, columns: Option<&Value>) -> RtResult<Frame> {
    let mut frame = match data {
        None | Some(Value::None) => Frame::default(),
        Some(Value::Dict(mapping)) => {
            let mapping = mapping.borrow().items();
            let mut frame = Frame::default();
            let length = mapping
                .iter()
                .map(|(_, v)| match v {
                    Value::List(items) => items.borrow().len(),
                    Value::Series(s) => s.len(),
                    Value::Tuple(items) => items.len(),
                    _ => 1,
                })
                .max()
                .unwrap_or(0);
            if let Some((_, Value::Series(first))) = mapping.iter().find(|(_, v)| matches!(v, Value::Series(_))) {
                frame.index = first.index.clone();
            } else {
                frame.index = range_index(length);
            }
            for (name, value) in &mapping {
                let value = match value {
                    Value::Series(_) | Value::List(_) | Value::Tuple(_) | Value::Index(_) => value.clone(),
                    scalar => Value::list(vec![scalar.clone(); length]),
                };
                frame.set_column(&to_str(name), &value)?;
            }
            frame
        }
        Some(Value::List(rows)) => {
            let rows = rows.borrow().clone();
            let mut values: IndexMap<String, Vec<Value>> = IndexMap::new();
            for (i, row) in rows.iter().enumerate() {
                match row {
                    Value::Dict(record) => {
                        for (key, value) in record.borrow().items() {
                            let key = to_str(&key);
                            if !values.contains_key(&key) {
                                values.insert(key.clone(), vec![Value::Float(f64::NAN); i]);
                            }
                            if let Some(column) = values.get_mut(&key) {
                                column.push(value);
                            }
                        }
                        for column in values.values_mut() {
                            column.resize(i + 1, Value::Float(f64::NAN));
                        }
                    }
                    Value::List(_) | Value::Tuple(_) => {
                        let cells = ops::iterate(row)?;
                        for (c, cell) in cells.into_iter().enumerate() {
                            let key = c.to_string();
                            if !values.contains_key(&key) {
                                values.insert(key.clone(), vec![Value::Float(f64::NAN); i]);
                            }
                            if let Some(column) = values.get_mut(&key) {
                                column.push(cell);
                            }
                        }
                        for column in values.values_mut() {
                            column.resize(i + 1, Value::Float(f64::NAN));
                        }
                    }
                    other => {
                        return Err(RuntimeError::value_error(format!(
                            "DataFrame constructor not properly called with row {}",
                            repr(other)
                        )))
                    }
                }
            }
            Frame::from_columns(values.into_iter().collect(), range_index(rows.len()))
        }
        Some(Value::Frame(other)) => other.borrow().clone(),
        Some(other) => {
            return Err(RuntimeError::value_error(format!(
                "DataFrame constructor not properly called! got {}",
                other.type_name()
            )))
        }
    };
    if let Some(columns) = columns {
        let names = column_names(columns)?;
        if frame.columns.len() == names.len()
            && frame.columns.keys().enumerate().all(|(i, k)| k == &i.to_string())
        {
            let renamed: Vec<(String, Vec<Value>)> = names
                .into_iter()
                .zip(frame.columns.values().map(|c| c.values.clone()))
                .collect();
            frame = Frame::from_columns(renamed, frame.index.clone());
        } else {
            frame = frame.select(&names)?;
        }
    }
    Ok(frame)
}

/// Replaces the column labels, as `df.columns = [...]` does.
pub fn set_columns(frame: &mut Frame, names: &Value) -> RtResult<()> {
    let names = column_names(names)?;
    if names.len() != frame.columns.len() {
        return Err(RuntimeError::value_error(format!(
            "Length mismatch: Expected axis has {} elements, new values have {} elements",
            frame.columns.len(),
            names.len()
        )));
    }
    let columns = std::mem::take(&mut frame.columns);
    for (name, column) in names.into_iter().zip(columns.into_values()) {
        let mut column = (*column).clone();
        column.name = Some(name.clone());
        frame.columns.insert(name, Rc::new(column));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::runtime::interpreter::Limits;

    fn sample() -> Frame {
        Frame::from_columns(
            vec![
                ("city".into(), vec![Value::str("Oslo"), Value::str("Rome"), Value::str("Oslo")]),
                ("temp".into(), vec![Value::Int(3), Value::Int(18), Value::Float(f64::NAN)]),
            ],
            range_index(3),
        )
    }

    #[test]
    fn missing_column_is_a_key_error() {
        let err = sample().column("wind").err().expect("no such column");
        assert_eq!(err.kind, ErrorKind::KeyError);
        assert_eq!(err.message, "'wind'");
    }

    #[test]
    fn boolean_mask_keeps_original_labels() {
        let frame = sample();
        let mask = Series::new(None, vec![Value::Bool(false), Value::Bool(true), Value::Bool(true)]);
        let Value::Frame(picked) = get_item(&frame, &Value::series(mask)).unwrap() else {
            panic!("frame expected")
        };
        let picked = picked.borrow();
        assert_eq!(picked.len(), 2);
        assert_eq!(repr(&Value::list(picked.index.as_ref().clone())), "[1, 2]");
    }

    #[test]
    fn scalar_assignment_broadcasts() {
        let mut frame = sample();
        set_item(&mut frame, &Value::str("flag"), Value::Bool(true)).unwrap();
        assert_eq!(frame.columns.len(), 3);
        assert_eq!(frame.column("flag").unwrap().dtype(), "bool");
    }

    #[test]
    fn fillna_with_mapping_touches_named_columns_only() {
        let mut fill = Dict::new();
        fill.insert_str("temp", Value::Int(0));
        let filled = fillna(&sample(), &Value::dict(fill)).unwrap();
        assert_eq!(repr(&filled.column("temp").unwrap().values[2]), "0");
    }

    #[test]
    fn dropna_and_reset_index() {
        let frame = Rc::new(RefCell::new(sample()));
        let mut interp = Interpreter::new(Limits::default());
        let Value::Frame(clean) = call_method(&mut interp, &frame, "dropna", CallArgs::default()).unwrap() else {
            panic!("frame expected")
        };
        let reset = reset_index(&clean.borrow(), true);
        assert_eq!(reset.len(), 2);
        assert_eq!(repr(&Value::list(reset.index.as_ref().clone())), "[0, 1]");
        assert_eq!(frame.borrow().len(), 3);
    }

    #[test]
    fn construct_from_records() {
        let rows = Value::list(vec![
            Value::dict([("a".to_string(), Value::Int(1))].into_iter().collect()),
            Value::dict([("a".to_string(), Value::Int(2)), ("b".to_string(), Value::Int(3))].into_iter().collect()),
        ]);
        let frame = construct(Some(&rows), None).unwrap();
        assert_eq!(frame.columns.keys().cloned().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(frame.column("b").unwrap().values[0].is_missing());
    }
}
