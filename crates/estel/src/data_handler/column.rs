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

use crate::data_handler::common::DataType;
use crate::error::{DataHandlerError, Result};
use rayon::prelude::*;
use std::sync::Arc;

pub trait ColumnData: Send + Sync + std::fmt::Debug {
    fn len(&self) -> usize;
    fn data_type(&self) -> DataType;
    fn null_count(&self) -> usize;
    fn get_string(&self, index: usize) -> Option<String>;
    fn to_f64(&self, index: usize) -> Option<f64>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int64(Arc<[Option<i64>]>),
    Float64(Arc<[Option<f64>]>),
    String(Arc<[Option<Arc<str>>]>),
    Boolean(Arc<[Option<bool>]>),
}

impl ColumnData for Column {
    fn len(&self) -> usize {
        match self {
            Column::Int64(data) => data.len(),
            Column::Float64(data) => data.len(),
            Column::String(data) => data.len(),
            Column::Boolean(data) => data.len(),
        }
    }
    fn data_type(&self) -> DataType {
        match self {
            Column::Int64(_) => DataType::Int64,
            Column::Float64(_) => DataType::Float64,
            Column::String(_) => DataType::String,
            Column::Boolean(_) => DataType::Boolean,
        }
    }
    fn null_count(&self) -> usize {
        match self {
            Column::Int64(data) => data.par_iter().filter(|v| v.is_none()).count(),
            Column::Float64(data) => data
                .par_iter()
                .filter(|v| v.map_or(true, f64::is_nan))
                .count(),
            Column::String(data) => data.par_iter().filter(|v| v.is_none()).count(),
            Column::Boolean(data) => data.par_iter().filter(|v| v.is_none()).count(),
        }
    }
    fn get_string(&self, index: usize) -> Option<String> {
        match self {
            Column::Int64(data) => data.get(index)?.as_ref().map(|v| v.to_string()),
            Column::Float64(data) => data.get(index)?.as_ref().map(|v| format_float(*v)),
            Column::String(data) => data.get(index)?.as_ref().map(|s| s.to_string()),
            Column::Boolean(data) => data
                .get(index)?
                .as_ref()
                .map(|v| if *v { "True" } else { "False" }.to_string()),
        }
    }
    fn to_f64(&self, index: usize) -> Option<f64> {
        match self {
            Column::Int64(data) => data.get(index).and_then(|opt| opt.map(|v| v as f64)),
            Column::Float64(data) => data.get(index).copied()?,
            Column::String(data) => data
                .get(index)
                .and_then(|opt| opt.as_ref().and_then(|s| s.trim().parse::<f64>().ok())),
            Column::Boolean(data) => {
                data.get(index).and_then(|opt| opt.map(|v| if v { 1.0 } else { 0.0 }))
            }
        }
    }
}

/// Renders floats the way CSV exports show them: integral values keep a trailing `.0`.
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

impl Column {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn from_strings(values: &[Option<String>], data_type: DataType) -> Result<Self> {
        Ok(match data_type {
            DataType::Int64 => {
                let parsed: Result<Vec<Option<i64>>> = values
                    .par_iter()
                    .map(|opt_str| match opt_str {
                        None => Ok(None),
                        Some(s) if s.trim().is_empty() => Ok(None),
                        Some(s) => s.trim().parse::<i64>().map(Some).map_err(Into::into),
                    })
                    .collect();
                Column::Int64(parsed?.into())
            }
            DataType::Float64 => {
                let parsed: Result<Vec<Option<f64>>> = values
                    .par_iter()
                    .map(|opt_str| match opt_str {
                        None => Ok(None),
                        Some(s) if s.trim().is_empty() => Ok(None),
                        Some(s) => s.trim().parse::<f64>().map(Some).map_err(Into::into),
                    })
                    .collect();
                Column::Float64(parsed?.into())
            }
            DataType::Boolean => {
                let parsed: Result<Vec<Option<bool>>> = values
                    .par_iter()
                    .map(|opt_str| match opt_str {
                        None => Ok(None),
                        Some(s) if s.trim().is_empty() => Ok(None),
                        Some(s) => parse_bool(s).map(Some).ok_or_else(|| {
                            DataHandlerError::Parse(format!("Cannot parse '{s}' as boolean"))
                        }),
                    })
                    .collect();
                Column::Boolean(parsed?.into())
            }
            DataType::String => {
                let strings: Vec<Option<Arc<str>>> = values
                    .iter()
                    .map(|opt| opt.as_ref().map(|s| Arc::from(s.as_str())))
                    .collect();
                Column::String(strings.into())
            }
        })
    }

    pub fn select_rows(&self, indices: &[usize]) -> Result<Column> {
        fn pick<T: Clone + Send + Sync>(data: &[T], indices: &[usize]) -> Result<Vec<T>> {
            indices
                .par_iter()
                .map(|&i| data.get(i).cloned().ok_or(DataHandlerError::OutOfBounds(i)))
                .collect()
        }
        Ok(match self {
            Column::Int64(data) => Column::Int64(pick(data, indices)?.into()),
            Column::Float64(data) => Column::Float64(pick(data, indices)?.into()),
            Column::String(data) => Column::String(pick(data, indices)?.into()),
            Column::Boolean(data) => Column::Boolean(pick(data, indices)?.into()),
        })
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Collects raw cells for one column and settles on the narrowest type
/// every non-blank cell parses as.
#[derive(Debug, Default)]
pub struct ColumnBuilder {
    values: Vec<Option<String>>,
}

impl ColumnBuilder {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: Option<String>) {
        let value = value.filter(|s| !s.trim().is_empty());
        self.values.push(value);
    }

    pub fn build(self) -> Result<Column> {
        let data_type = Self::infer_type(&self.values);
        Column::from_strings(&self.values, data_type)
    }

    fn infer_type(values: &[Option<String>]) -> DataType {
        let mut present = values.iter().flatten().map(|s| s.trim()).peekable();
        if present.peek().is_none() {
            // All-blank columns behave as missing floats.
            return DataType::Float64;
        }
        let samples: Vec<&str> = present.collect();
        if samples.iter().all(|s| s.parse::<i64>().is_ok()) {
            DataType::Int64
        } else if samples.iter().all(|s| s.parse::<f64>().is_ok()) {
            DataType::Float64
        } else if samples.iter().all(|s| parse_bool(s).is_some()) {
            DataType::Boolean
        } else {
            DataType::String
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(cells: &[&str]) -> Column {
        let mut builder = ColumnBuilder::new();
        for cell in cells {
            builder.push(Some(cell.to_string()));
        }
        builder.build().unwrap()
    }

    #[test]
    fn integers_widen_to_float_when_any_cell_is_fractional() {
        let column = build(&["1", "2.5", ""]);
        assert_eq!(column.data_type(), DataType::Float64);
        assert_eq!(column.to_f64(1), Some(2.5));
        assert_eq!(column.null_count(), 1);
    }

    #[test]
    fn mixed_text_falls_back_to_strings() {
        let column = build(&["10", "n/a", "30"]);
        assert_eq!(column.data_type(), DataType::String);
        assert_eq!(column.get_string(1).as_deref(), Some("n/a"));
    }

    #[test]
    fn booleans_are_recognised_case_insensitively() {
        let column = build(&["True", "false", "TRUE"]);
        assert_eq!(column.data_type(), DataType::Boolean);
        assert_eq!(column.get_string(1).as_deref(), Some("False"));
    }

    #[test]
    fn select_rows_rejects_out_of_range_indices() {
        let column = build(&["1", "2", "3"]);
        let picked = column.select_rows(&[2, 0]).unwrap();
        assert_eq!(picked.get_string(0).as_deref(), Some("3"));
        assert!(matches!(
            column.select_rows(&[7]),
            Err(DataHandlerError::OutOfBounds(7))
        ));
    }
}
