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

//! Split-apply-combine over one or more key columns.

use super::format::{repr, to_str};
use super::frame::{self, Frame};
use super::interpreter::Interpreter;
use super::ops::{self, values_equal};
use super::series::{self, Series};
use super::value::{CallArgs, Key, Value};
use crate::error::{ErrorKind, RtResult, RuntimeError};
use indexmap::IndexMap;
use std::rc::Rc;

pub struct GroupKey {
    pub name: String,
    pub values: Vec<Value>,
    pub categories: Option<Rc<Vec<Value>>>,
}

#[derive(Clone)]
pub enum Selection {
    All,
    Column(String),
    Columns(Vec<String>),
}

#[derive(Clone)]
pub struct GroupBy {
    pub frame: Rc<Frame>,
    pub keys: Rc<Vec<GroupKey>>,
    pub selection: Selection,
    pub sort: bool,
    pub dropna: bool,
    pub as_index: bool,
    pub observed: bool,
}

impl GroupBy {
    pub fn new(frame: Rc<Frame>, columns: &[String], sort: bool, dropna: bool) -> RtResult<Self> {
        let keys = columns
            .iter()
            .map(|name| {
                let column = frame.column(name)?;
                Ok(GroupKey {
                    name: name.clone(),
                    values: column.values.clone(),
                    categories: column.categories.clone(),
                })
            })
            .collect::<RtResult<Vec<_>>>()?;
        Ok(Self {
            frame,
            keys: Rc::new(keys),
            selection: Selection::All,
            sort,
            dropna,
            as_index: true,
            observed: false,
        })
    }

    pub fn is_series(&self) -> bool {
        matches!(self.selection, Selection::Column(_))
    }

    pub fn key_names(&self) -> Vec<String> {
        self.keys.iter().map(|k| k.name.clone()).collect()
    }

    fn value_columns(&self) -> Vec<String> {
        match &self.selection {
            Selection::All => {
                let keys = self.key_names();
                self.frame
                    .columns
                    .keys()
                    .filter(|c| !keys.contains(c))
                    .cloned()
                    .collect()
            }
            Selection::Column(name) => vec![name.clone()],
            Selection::Columns(names) => names.clone(),
        }
    }

    fn label_at(&self, row: usize) -> Value {
        if self.keys.len() == 1 {
            self.keys[0].values[row].clone()
        } else {
            Value::tuple(self.keys.iter().map(|k| k.values[row].clone()).collect())
        }
    }

    /// Group labels with their row positions, in output order.
    pub fn group_rows(&self) -> RtResult<Vec<(Value, Vec<usize>)>> {
        let mut groups: IndexMap<Key, (Value, Vec<usize>)> = IndexMap::new();
        let categorical = self.keys.len() == 1 && self.keys[0].categories.is_some();
        if categorical && !self.observed {
            for category in self.keys[0].categories.iter().flat_map(|c| c.iter()) {
                groups.insert(Key::from_value(category)?, (category.clone(), Vec::new()));
            }
        }
        for row in 0..self.frame.len() {
            if self.dropna && self.keys.iter().any(|k| k.values[row].is_missing()) {
                continue;
            }
            let label = self.label_at(row);
            groups
                .entry(Key::from_value(&label)?)
                .or_insert_with(|| (label, Vec::new()))
                .1
                .push(row);
        }
        let mut groups: Vec<(Value, Vec<usize>)> = groups.into_values().collect();
        if categorical {
            if let Some(categories) = &self.keys[0].categories {
                if self.sort {
                    let rank = |label: &Value| {
                        categories
                            .iter()
                            .position(|c| values_equal(c, label))
                            .unwrap_or(usize::MAX)
                    };
                    groups.sort_by_key(|(label, _)| rank(label));
                }
            }
        } else if self.sort {
            let labels: Vec<Value> = groups.iter().map(|(l, _)| l.clone()).collect();
            let order = ops::sort_positions(&[labels.as_slice()], &[true])?;
            let mut slots: Vec<Option<(Value, Vec<usize>)>> = groups.into_iter().map(Some).collect();
            groups = order.into_iter().filter_map(|p| slots[p].take()).collect();
        }
        Ok(groups)
    }

    fn labels_index(&self, groups: &[(Value, Vec<usize>)]) -> Rc<Vec<Value>> {
        Rc::new(groups.iter().map(|(l, _)| l.clone()).collect())
    }

    /// Wraps per-group results as a series or frame labelled by group.
    fn combine(
        &self,
        groups: &[(Value, Vec<usize>)],
        columns: Vec<(String, Vec<Value>)>,
        series_result: bool,
    ) -> Value {
        let index = self.labels_index(groups);
        if series_result && columns.len() == 1 && self.as_index {
            let (name, values) = columns.into_iter().next().unwrap_or_default();
            let mut out = Series::with_index(Some(name), values, index);
            out.index_names = self.key_names();
            return Value::series(out);
        }
        let mut out = Frame::from_columns(columns, index.clone());
        out.reindex_rows(index, self.key_names());
        if self.as_index {
            Value::frame(out)
        } else {
            Value::frame(frame::reset_index(&out, false))
        }
    }

    fn reduce_with(
        &self,
        interp: &mut Interpreter,
        groups: &[(Value, Vec<usize>)],
        mut reducer: impl FnMut(&mut Interpreter, &Series) -> RtResult<Value>,
        numeric_only: bool,
    ) -> RtResult<Value> {
        let mut columns = Vec::new();
        for name in self.value_columns() {
            let column = self.frame.column(&name)?;
            if numeric_only && !matches!(column.dtype(), "int64" | "float64" | "bool") {
                continue;
            }
            let mut values = Vec::with_capacity(groups.len());
            for (_, rows) in groups {
                interp.consume_gas(rows.len() as u64 + 1)?;
                values.push(reducer(interp, &column.take(rows))?);
            }
            columns.push((name, values));
        }
        Ok(self.combine(groups, columns, self.is_series()))
    }
}

fn key_from_series(frame: &Frame, series: &Series, position: usize) -> RtResult<GroupKey> {
    let values = if series.len() == frame.len()
        && series.index.iter().zip(frame.index.iter()).all(|(a, b)| values_equal(a, b))
    {
        series.values.clone()
    } else {
        frame
            .index
            .iter()
            .map(|label| {
                Ok(series
                    .position_of(label)?
                    .map_or(Value::Float(f64::NAN), |p| series.values[p].clone()))
            })
            .collect::<RtResult<Vec<_>>>()?
    };
    Ok(GroupKey {
        name: series.name.clone().unwrap_or_else(|| format!("key_{position}")),
        values,
        categories: series.categories.clone(),
    })
}

/// `df.groupby(by, as_index=..., sort=..., dropna=..., observed=...)`.
pub fn from_frame(frame: Rc<Frame>, args: &CallArgs) -> RtResult<GroupBy> {
    let by = args
        .get(0, "by")
        .ok_or_else(|| RuntimeError::type_error("You have to supply one of 'by' and 'level'"))?;
    let specs = match by {
        Value::List(items) => items.borrow().clone(),
        Value::Tuple(items) => items.to_vec(),
        single => vec![single.clone()],
    };
    let mut keys = Vec::with_capacity(specs.len());
    for (position, spec) in specs.iter().enumerate() {
        keys.push(match spec {
            Value::Series(series) => key_from_series(&frame, series, position)?,
            Value::Index(labels) => key_from_series(&frame, &Series::new(None, labels.as_ref().clone()), position)?,
            name => {
                let name = to_str(name);
                let column = frame.column(&name)?;
                GroupKey {
                    name,
                    values: column.values.clone(),
                    categories: column.categories.clone(),
                }
            }
        });
    }
    Ok(GroupBy {
        frame,
        keys: Rc::new(keys),
        selection: Selection::All,
        sort: args.flag(usize::MAX, "sort", true)?,
        dropna: args.flag(usize::MAX, "dropna", true)?,
        as_index: args.flag(usize::MAX, "as_index", true)?,
        observed: args.flag(usize::MAX, "observed", false)?,
    })
}

/// Column selection, `gb['col']` or `gb[['a', 'b']]`.
pub fn select(gb: &Rc<GroupBy>, key: &Value) -> RtResult<GroupBy> {
    let mut out = (**gb).clone();
    out.selection = match key {
        Value::Str(name) => {
            gb.frame.column(name)?;
            Selection::Column(name.to_string())
        }
        Value::List(_) | Value::Tuple(_) => {
            let names: Vec<String> = ops::iterate(key)?.iter().map(to_str).collect();
            for name in &names {
                gb.frame.column(name)?;
            }
            Selection::Columns(names)
        }
        other => return Err(RuntimeError::key_error(repr(other))),
    };
    Ok(out)
}

fn group_value(gb: &GroupBy, rows: &[usize]) -> RtResult<Value> {
    Ok(match &gb.selection {
        Selection::Column(name) => Value::series(gb.frame.column(name)?.take(rows)),
        Selection::Columns(names) => {
            let sub = gb.frame.take(rows);
            let mut selected = Frame {
                columns: IndexMap::new(),
                index: sub.index.clone(),
                index_names: sub.index_names.clone(),
            };
            for name in names {
                selected.columns.insert(name.clone(), sub.column(name)?);
            }
            Value::frame(selected)
        }
        Selection::All => Value::frame(gb.frame.take(rows)),
    })
}

/// `for name, group in df.groupby(...)`.
pub fn iterate(gb: &Rc<GroupBy>) -> RtResult<Vec<Value>> {
    gb.group_rows()?
        .into_iter()
        .filter(|(_, rows)| !rows.is_empty())
        .map(|(label, rows)| Ok(Value::tuple(vec![label, group_value(gb, &rows)?])))
        .collect()
}

pub const METHODS: &[&str] = &[
    "sum", "mean", "median", "min", "max", "count", "size", "nunique", "std", "var", "first",
    "last", "prod", "agg", "aggregate", "apply", "get_group", "transform", "head", "cumsum",
    "cumcount",
];

pub fn property(gb: &Rc<GroupBy>, name: &str) -> RtResult<Option<Value>> {
    Ok(match name {
        "ngroups" => Some(Value::from(gb.group_rows()?.len())),
        "groups" => {
            let mut out = super::value::Dict::new();
            for (label, rows) in gb.group_rows()? {
                let labels = rows.iter().map(|&r| gb.frame.index[r].clone()).collect();
                out.insert(label, Value::Index(Rc::new(labels)))?;
            }
            Some(Value::dict(out))
        }
        column if !gb.is_series() && gb.frame.columns.contains_key(column) => {
            Some(Value::GroupBy(Rc::new(select(gb, &Value::str(column))?)))
        }
        _ => None,
    })
}

fn not_implemented(message: &str) -> RuntimeError {
    RuntimeError::new(ErrorKind::NotImplementedError, message)
}

fn agg(interp: &mut Interpreter, gb: &GroupBy, args: &CallArgs) -> RtResult<Value> {
    let groups = gb.group_rows()?;
    if args.positional.is_empty() && args.keyword("func").is_none() && !args.keywords.is_empty() {
        // Named aggregation: new_name=('column', func) or, on a series, new_name=func.
        let mut columns = Vec::new();
        for (output, spec) in &args.keywords {
            let (column, func) = match spec {
                Value::Tuple(parts) if parts.len() == 2 => (to_str(&parts[0]), parts[1].clone()),
                func if gb.is_series() => (gb.value_columns()[0].clone(), func.clone()),
                other => {
                    return Err(RuntimeError::type_error(format!(
                        "Must provide 'func' or tuples of '(column, aggfunc)', got {}",
                        repr(other)
                    )))
                }
            };
            let source = gb.frame.column(&column)?;
            let mut values = Vec::with_capacity(groups.len());
            for (_, rows) in &groups {
                interp.consume_gas(rows.len() as u64 + 1)?;
                values.push(series::apply_aggregate(interp, &source.take(rows), &func)?);
            }
            columns.push((output.clone(), values));
        }
        return Ok(gb.combine(&groups, columns, false));
    }
    let func = args.require(0, "func", "agg")?;
    match func {
        Value::List(funcs) => {
            let funcs = funcs.borrow().clone();
            let value_columns = gb.value_columns();
            if value_columns.len() != 1 {
                return Err(not_implemented(
                    "aggregating several columns with a list of functions needs multi-level columns; use named aggregation instead",
                ));
            }
            let source = gb.frame.column(&value_columns[0])?;
            let mut columns = Vec::new();
            for func in &funcs {
                let mut values = Vec::with_capacity(groups.len());
                for (_, rows) in &groups {
                    interp.consume_gas(rows.len() as u64 + 1)?;
                    values.push(series::apply_aggregate(interp, &source.take(rows), func)?);
                }
                columns.push((series::aggregate_label(func), values));
            }
            Ok(gb.combine(&groups, columns, false))
        }
        Value::Dict(spec) => {
            let spec = spec.borrow().items();
            let mut columns = Vec::new();
            for (column, func) in spec {
                if matches!(func, Value::List(_) | Value::Tuple(_)) {
                    return Err(not_implemented(
                        "several functions per column need multi-level columns; use named aggregation instead",
                    ));
                }
                let column = to_str(&column);
                let source = gb.frame.column(&column)?;
                let mut values = Vec::with_capacity(groups.len());
                for (_, rows) in &groups {
                    interp.consume_gas(rows.len() as u64 + 1)?;
                    values.push(series::apply_aggregate(interp, &source.take(rows), &func)?);
                }
                columns.push((column, values));
            }
            Ok(gb.combine(&groups, columns, false))
        }
        single => {
            let single = single.clone();
            gb.reduce_with(interp, &groups, |interp, s| series::apply_aggregate(interp, s, &single), false)
        }
    }
}

fn apply(interp: &mut Interpreter, gb: &GroupBy, func: &Value) -> RtResult<Value> {
    let groups: Vec<(Value, Vec<usize>)> =
        gb.group_rows()?.into_iter().filter(|(_, rows)| !rows.is_empty()).collect();
    let mut results = Vec::with_capacity(groups.len());
    for (_, rows) in &groups {
        interp.consume_gas(rows.len() as u64 + 1)?;
        let group = group_value(gb, rows)?;
        results.push(interp.call_value(func, CallArgs::new(vec![group]))?);
    }
    let index = gb.labels_index(&groups);
    if !results.is_empty() && results.iter().all(|r| matches!(r, Value::Series(_))) {
        let mut columns: IndexMap<String, Vec<Value>> = IndexMap::new();
        for (i, result) in results.iter().enumerate() {
            if let Value::Series(s) = result {
                for (label, value) in s.index.iter().zip(&s.values) {
                    let column = columns
                        .entry(to_str(label))
                        .or_insert_with(|| vec![Value::Float(f64::NAN); results.len()]);
                    column[i] = value.clone();
                }
            }
        }
        let mut out = Frame::from_columns(columns.into_iter().collect(), index.clone());
        out.reindex_rows(index, gb.key_names());
        return Ok(Value::frame(out));
    }
    if !results.is_empty() && results.iter().all(|r| matches!(r, Value::Frame(_))) {
        let mut columns: IndexMap<String, Vec<Value>> = IndexMap::new();
        let mut labels = Vec::new();
        for result in &results {
            if let Value::Frame(f) = result {
                let f = f.borrow();
                let offset = labels.len();
                labels.extend(f.index.iter().cloned());
                for (name, column) in &f.columns {
                    let slot = columns
                        .entry(name.clone())
                        .or_insert_with(|| vec![Value::Float(f64::NAN); offset]);
                    slot.resize(offset, Value::Float(f64::NAN));
                    slot.extend(column.values.iter().cloned());
                }
            }
        }
        for column in columns.values_mut() {
            column.resize(labels.len(), Value::Float(f64::NAN));
        }
        return Ok(Value::frame(Frame::from_columns(columns.into_iter().collect(), Rc::new(labels))));
    }
    let mut out = Series::with_index(None, results, index);
    out.index_names = gb.key_names();
    Ok(Value::series(out))
}

fn transform(interp: &mut Interpreter, gb: &GroupBy, func: &Value) -> RtResult<Value> {
    let groups = gb.group_rows()?;
    let mut columns = Vec::new();
    for name in gb.value_columns() {
        let source = gb.frame.column(&name)?;
        let mut values = vec![Value::Float(f64::NAN); gb.frame.len()];
        for (_, rows) in &groups {
            interp.consume_gas(rows.len() as u64 + 1)?;
            let part = source.take(rows);
            let result = series::apply_aggregate(interp, &part, func)?;
            match result {
                Value::Series(s) if s.len() == rows.len() => {
                    for (&row, value) in rows.iter().zip(&s.values) {
                        values[row] = value.clone();
                    }
                }
                scalar => {
                    for &row in rows {
                        values[row] = scalar.clone();
                    }
                }
            }
        }
        columns.push((name, values));
    }
    if gb.is_series() {
        let (name, values) = columns.into_iter().next().unwrap_or_default();
        return Ok(Value::series(Series::with_index(Some(name), values, gb.frame.index.clone())));
    }
    Ok(Value::frame(Frame::from_columns(columns, gb.frame.index.clone())))
}

pub fn call_method(
    interp: &mut Interpreter,
    gb: &Rc<GroupBy>,
    name: &str,
    args: CallArgs,
) -> RtResult<Value> {
    match name {
        "size" => {
            let groups = gb.group_rows()?;
            let values = groups.iter().map(|(_, rows)| Value::from(rows.len())).collect();
            let mut out = Series::with_index(None, values, gb.labels_index(&groups));
            out.index_names = gb.key_names();
            if gb.as_index {
                return Ok(Value::series(out));
            }
            out.name = Some("size".to_string());
            series::reset_index(&out, None).map(Value::frame)
        }
        "sum" | "mean" | "median" | "min" | "max" | "count" | "nunique" | "std" | "var"
        | "first" | "last" | "prod" => {
            let groups = gb.group_rows()?;
            let numeric_only = args.flag(usize::MAX, "numeric_only", false)?;
            let ddof = args.int(usize::MAX, "ddof", 1)?.max(0) as usize;
            gb.reduce_with(interp, &groups, |_, s| series::aggregate(s, name, ddof), numeric_only)
        }
        "agg" | "aggregate" => agg(interp, gb, &args),
        "apply" => apply(interp, gb, args.require(0, "func", "apply")?),
        "transform" => transform(interp, gb, args.require(0, "func", "transform")?),
        "get_group" => {
            let wanted = Key::from_value(args.require(0, "name", "get_group")?)?;
            for (label, rows) in gb.group_rows()? {
                if Key::from_value(&label)? == wanted && !rows.is_empty() {
                    return group_value(gb, &rows);
                }
            }
            Err(RuntimeError::key_error(repr(args.require(0, "name", "get_group")?)))
        }
        "head" => {
            let n = args.int(0, "n", 5)?.max(0) as usize;
            let mut rows: Vec<usize> = gb
                .group_rows()?
                .into_iter()
                .flat_map(|(_, rows)| rows.into_iter().take(n))
                .collect();
            rows.sort_unstable();
            group_value(gb, &rows)
        }
        "cumcount" => {
            let mut values = vec![Value::Int(0); gb.frame.len()];
            for (_, rows) in gb.group_rows()? {
                for (i, row) in rows.into_iter().enumerate() {
                    values[row] = Value::from(i);
                }
            }
            Ok(Value::series(Series::with_index(None, values, gb.frame.index.clone())))
        }
        "cumsum" => {
            let mut columns = Vec::new();
            for column in gb.value_columns() {
                let source = gb.frame.column(&column)?;
                let mut values = vec![Value::Float(f64::NAN); gb.frame.len()];
                for (_, rows) in gb.group_rows()? {
                    let mut total = Value::Int(0);
                    for row in rows {
                        let v = &source.values[row];
                        if !v.is_missing() {
                            total = ops::scalar_binary(crate::ast::BinOp::Add, &total, v)?;
                            values[row] = total.clone();
                        }
                    }
                }
                columns.push((column, values));
            }
            if gb.is_series() {
                let (name, values) = columns.into_iter().next().unwrap_or_default();
                return Ok(Value::series(Series::with_index(Some(name), values, gb.frame.index.clone())));
            }
            Ok(Value::frame(Frame::from_columns(columns, gb.frame.index.clone())))
        }
        other => Err(RuntimeError::attribute_error(format!(
            "'{}' object has no attribute '{other}'",
            if gb.is_series() { "SeriesGroupBy" } else { "DataFrameGroupBy" }
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::interpreter::Limits;
    use crate::runtime::series::range_index;

    fn orders() -> Rc<Frame> {
        Rc::new(Frame::from_columns(
            vec![
                ("region".into(), ["W", "E", "W", "E", "W"].into_iter().map(Value::str).collect()),
                ("units".into(), [1, 2, 3, 4, 5].into_iter().map(Value::Int).collect()),
            ],
            range_index(5),
        ))
    }

    fn grouped(frame: Rc<Frame>, column: &str) -> Rc<GroupBy> {
        let gb = Rc::new(from_frame(frame, &CallArgs::new(vec![Value::str("region")])).unwrap());
        Rc::new(select(&gb, &Value::str(column)).unwrap())
    }

    #[test]
    fn sum_sorts_group_labels() {
        let mut interp = Interpreter::new(Limits::default());
        let out = call_method(&mut interp, &grouped(orders(), "units"), "sum", CallArgs::default()).unwrap();
        let Value::Series(s) = out else { panic!("series expected") };
        assert_eq!(repr(&Value::list(s.index.as_ref().clone())), "['E', 'W']");
        assert_eq!(repr(&Value::list(s.values.clone())), "[6, 9]");
    }

    #[test]
    fn size_counts_rows() {
        let mut interp = Interpreter::new(Limits::default());
        let gb = Rc::new(from_frame(orders(), &CallArgs::new(vec![Value::str("region")])).unwrap());
        let Value::Series(s) = call_method(&mut interp, &gb, "size", CallArgs::default()).unwrap() else {
            panic!("series expected")
        };
        assert_eq!(repr(&Value::list(s.values.clone())), "[2, 3]");
    }

    #[test]
    fn unknown_column_selection_fails() {
        let gb = Rc::new(from_frame(orders(), &CallArgs::new(vec![Value::str("region")])).unwrap());
        let err = select(&gb, &Value::str("price")).err().expect("no such column");
        assert_eq!(err.kind, ErrorKind::KeyError);
    }

    #[test]
    fn unknown_method_names_the_groupby_type() {
        let mut interp = Interpreter::new(Limits::default());
        let err = call_method(&mut interp, &grouped(orders(), "units"), "pivot", CallArgs::default()).unwrap_err();
        assert_eq!(err.message, "'SeriesGroupBy' object has no attribute 'pivot'");
    }
}
