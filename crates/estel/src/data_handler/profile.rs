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

use crate::data_handler::column::{Column, ColumnData};
use crate::data_handler::common::SAMPLE_ROWS;
use crate::data_handler::dataframe::DataFrame;
use crate::error::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnTypes {
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSummary {
    pub columns: Vec<String>,
    pub row_count: usize,
    pub sample_data: String,
    pub column_types: ColumnTypes,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ColumnStatistics {
    Numeric {
        mean: Option<f64>,
        sum: f64,
        min: Option<f64>,
        max: Option<f64>,
        std: Option<f64>,
    },
    Categorical {
        value_counts: IndexMap<String, usize>,
        unique_count: usize,
    },
}

pub fn column_types(df: &DataFrame) -> ColumnTypes {
    let mut types = ColumnTypes {
        numeric_columns: Vec::new(),
        categorical_columns: Vec::new(),
    };
    for (name, column) in df.iter_columns() {
        if column.data_type().is_numeric() {
            types.numeric_columns.push(name.to_string());
        } else if matches!(column, Column::String(_)) {
            types.categorical_columns.push(name.to_string());
        }
    }
    types
}

pub fn summarize(df: &DataFrame) -> Result<DataSummary> {
    Ok(DataSummary {
        columns: df.column_names().to_vec(),
        row_count: df.row_count(),
        sample_data: df.head(SAMPLE_ROWS)?.to_csv_string()?,
        column_types: column_types(df),
    })
}

pub fn numeric_values(column: &Column) -> Vec<f64> {
    (0..column.len())
        .filter_map(|i| column.to_f64(i))
        .filter(|v| !v.is_nan())
        .collect()
}

pub fn calculate_statistics(df: &DataFrame) -> IndexMap<String, ColumnStatistics> {
    let types = column_types(df);
    let mut stats = IndexMap::new();
    for name in &types.numeric_columns {
        if let Some(column) = df.get_column(name) {
            stats.insert(name.clone(), numeric_statistics(&numeric_values(column)));
        }
    }
    for name in &types.categorical_columns {
        if let Some(column) = df.get_column(name) {
            let value_counts = value_counts(column);
            stats.insert(
                name.clone(),
                ColumnStatistics::Categorical {
                    unique_count: value_counts.len(),
                    value_counts,
                },
            );
        }
    }
    stats
}

fn numeric_statistics(values: &[f64]) -> ColumnStatistics {
    let n = values.len();
    let sum: f64 = values.iter().sum();
    let mean = (n > 0).then(|| sum / n as f64);
    let std = mean.filter(|_| n > 1).map(|m| {
        let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64;
        var.sqrt()
    });
    ColumnStatistics::Numeric {
        mean,
        sum,
        min: values.iter().copied().reduce(f64::min),
        max: values.iter().copied().reduce(f64::max),
        std,
    }
}

/// Non-null value frequencies, most frequent first; ties keep first-seen order.
pub fn value_counts(column: &Column) -> IndexMap<String, usize> {
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for i in 0..column.len() {
        if let Some(value) = column.get_string(i) {
            *counts.entry(value).or_insert(0) += 1;
        }
    }
    counts.sort_by(|_, a, _, b| b.cmp(a));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        DataFrame::from_columns(
            "shop",
            vec![
                (
                    "city",
                    Column::String(
                        vec![
                            Some("Osaka".into()),
                            Some("Tokyo".into()),
                            Some("Tokyo".into()),
                            None,
                        ]
                        .into(),
                    ),
                ),
                (
                    "sales",
                    Column::Float64(vec![Some(1.0), Some(2.0), Some(3.0), None].into()),
                ),
                (
                    "open",
                    Column::Boolean(vec![Some(true), Some(false), Some(true), None].into()),
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn summary_splits_numeric_and_categorical_columns() {
        let summary = summarize(&frame()).unwrap();
        assert_eq!(summary.row_count, 4);
        assert_eq!(summary.column_types.numeric_columns, vec!["sales"]);
        assert_eq!(summary.column_types.categorical_columns, vec!["city"]);
        assert!(summary.sample_data.starts_with("city,sales,open\nOsaka,1.0,True\n"));
    }

    #[test]
    fn statistics_skip_missing_values() {
        let stats = calculate_statistics(&frame());
        match &stats["sales"] {
            ColumnStatistics::Numeric { mean, sum, min, max, std } => {
                assert_eq!(*sum, 6.0);
                assert_eq!(*mean, Some(2.0));
                assert_eq!(*min, Some(1.0));
                assert_eq!(*max, Some(3.0));
                assert_eq!(*std, Some(1.0));
            }
            other => panic!("unexpected statistics {other:?}"),
        }
        match &stats["city"] {
            ColumnStatistics::Categorical { value_counts, unique_count } => {
                assert_eq!(*unique_count, 2);
                assert_eq!(value_counts.get_index(0), Some((&"Tokyo".to_string(), &2)));
            }
            other => panic!("unexpected statistics {other:?}"),
        }
    }
}
