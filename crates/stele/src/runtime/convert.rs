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

use estel::{Column, DataFrame};
use std::rc::Rc;

use super::frame::Frame;
use super::series::range_index;
use super::value::Value;

fn column_values(column: &Column) -> Vec<Value> {
    match column {
        Column::Int64(data) => data.iter().map(|v| v.map_or(Value::None, Value::Int)).collect(),
        Column::Float64(data) => data
            .iter()
            .map(|v| Value::Float(v.unwrap_or(f64::NAN)))
            .collect(),
        Column::String(data) => data
            .iter()
            .map(|v| v.as_deref().map_or(Value::None, Value::str))
            .collect(),
        Column::Boolean(data) => data.iter().map(|v| v.map_or(Value::None, Value::Bool)).collect(),
    }
}

/// Copies a loaded dataset into the script engine's frame model with a
/// default `0..n` index. Integer columns with gaps are widened to floats.
pub fn frame_from_dataset(dataset: &DataFrame) -> Frame {
    let columns = dataset
        .iter_columns()
        .map(|(name, column)| {
            let mut values = column_values(column);
            if values.iter().any(|v| matches!(v, Value::None)) && matches!(column, Column::Int64(_)) {
                values = values
                    .into_iter()
                    .map(|v| match v {
                        Value::Int(i) => Value::Float(i as f64),
                        _ => Value::Float(f64::NAN),
                    })
                    .collect();
            }
            (name.to_string(), values)
        })
        .collect();
    Frame::from_columns(columns, range_index(dataset.row_count()))
}

pub fn dataset_value(dataset: &DataFrame) -> Value {
    Value::Frame(Rc::new(std::cell::RefCell::new(frame_from_dataset(dataset))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use estel::CsvReader;

    #[test]
    fn columns_keep_their_dtypes() {
        let dataset = CsvReader::new()
            .read_str("region,sales,score,ok\nA,10,1.5,true\nB,,2.5,false\n", "t")
            .unwrap();
        let frame = frame_from_dataset(&dataset);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.column("region").unwrap().dtype(), "object");
        assert_eq!(frame.column("sales").unwrap().dtype(), "float64");
        assert_eq!(frame.column("score").unwrap().dtype(), "float64");
        assert_eq!(frame.column("ok").unwrap().dtype(), "bool");
    }
}
