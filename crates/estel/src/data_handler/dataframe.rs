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
use crate::data_handler::common::{ColumnMetadata, DatasetMetadata};
use crate::error::{DataHandlerError, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DataFrame {
    pub columns: HashMap<String, Arc<Column>>,
    pub metadata: DatasetMetadata,
    column_order: Vec<String>,
}

impl DataFrame {
    pub fn new(metadata: DatasetMetadata) -> Self {
        Self {
            columns: HashMap::new(),
            metadata,
            column_order: Vec::new(),
        }
    }

    pub fn from_columns<I, S>(name: &str, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Column)>,
        S: Into<String>,
    {
        let mut frame = Self::new(DatasetMetadata::named(name));
        for (column_name, column) in columns {
            frame.add_column(column_name.into(), column)?;
        }
        Ok(frame)
    }

    pub fn add_column(&mut self, name: String, column: Column) -> Result<()> {
        if let Some(first) = self.column_order.first().and_then(|n| self.columns.get(n)) {
            let expected = first.len();
            let replacing_only_column = self.column_order.len() == 1 && self.column_order[0] == name;
            if column.len() != expected && !replacing_only_column {
                return Err(DataHandlerError::InvalidOperation(format!(
                    "Column length mismatch: expected {}, got {}",
                    expected,
                    column.len()
                )));
            }
        }
        if !self.columns.contains_key(&name) {
            self.column_order.push(name.clone());
        }
        self.metadata.row_count = column.len();
        self.columns.insert(name, Arc::new(column));
        self.metadata.column_count = self.columns.len();
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.metadata.row_count
    }

    pub fn column_count(&self) -> usize {
        self.metadata.column_count
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_order
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name).map(|arc| arc.as_ref())
    }

    /// Columns in declaration order.
    pub fn iter_columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.column_order
            .iter()
            .filter_map(|name| self.columns.get(name).map(|c| (name.as_str(), c.as_ref())))
    }

    pub fn column_metadata(&self) -> Vec<ColumnMetadata> {
        self.column_order
            .par_iter()
            .filter_map(|name| {
                let column = self.columns.get(name)?;
                Some(ColumnMetadata {
                    name: name.clone(),
                    data_type: column.data_type(),
                    null_count: column.null_count(),
                })
            })
            .collect()
    }

    pub fn select_rows(&self, indices: &[usize]) -> Result<DataFrame> {
        let mut metadata = self.metadata.clone();
        metadata.row_count = indices.len();
        metadata.column_count = 0;
        let mut new_df = DataFrame::new(metadata);
        for (name, column) in self.iter_columns() {
            new_df.add_column(name.to_string(), column.select_rows(indices)?)?;
        }
        new_df.metadata.row_count = indices.len();
        Ok(new_df)
    }

    pub fn head(&self, limit: usize) -> Result<DataFrame> {
        let end = limit.min(self.row_count());
        let indices: Vec<usize> = (0..end).collect();
        self.select_rows(&indices)
    }

    pub fn filter<P>(&self, predicate: P) -> Result<DataFrame>
    where
        P: Fn(usize) -> bool + Send + Sync,
    {
        let indices: Vec<usize> = (0..self.row_count())
            .into_par_iter()
            .filter(|&i| predicate(i))
            .collect();
        self.select_rows(&indices)
    }

    /// Serialises the frame as CSV text with a header row and no index column.
    pub fn to_csv_string(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.column_order)?;
        for row in 0..self.row_count() {
            let record: Vec<String> = self
                .iter_columns()
                .map(|(_, column)| column.get_string(row).unwrap_or_default())
                .collect();
            writer.write_record(&record)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| DataHandlerError::InvalidOperation(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| DataHandlerError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handler::common::DataType;

    fn sample() -> DataFrame {
        DataFrame::from_columns(
            "sales",
            vec![
                (
                    "region",
                    Column::String(
                        vec![Some("North".into()), Some("South".into()), None].into(),
                    ),
                ),
                ("sales", Column::Int64(vec![Some(10), Some(20), Some(30)].into())),
            ],
        )
        .unwrap()
    }

    #[test]
    fn columns_keep_insertion_order() {
        let df = sample();
        assert_eq!(df.column_names(), &["region".to_string(), "sales".to_string()]);
        assert_eq!(df.row_count(), 3);
        assert_eq!(df.column_count(), 2);
    }

    #[test]
    fn mismatched_column_lengths_are_rejected() {
        let mut df = sample();
        let err = df
            .add_column("extra".into(), Column::Int64(vec![Some(1)].into()))
            .unwrap_err();
        assert!(err.to_string().contains("length mismatch"));
    }

    #[test]
    fn head_and_csv_rendering() {
        let df = sample();
        let csv = df.head(2).unwrap().to_csv_string().unwrap();
        assert_eq!(csv, "region,sales\nNorth,10\nSouth,20\n");
    }

    #[test]
    fn filter_keeps_matching_rows() {
        let df = sample();
        let sales = df.get_column("sales").unwrap().clone();
        let filtered = df.filter(|i| sales.to_f64(i).unwrap_or(0.0) > 15.0).unwrap();
        assert_eq!(filtered.row_count(), 2);
        assert_eq!(filtered.column_metadata()[1].data_type, DataType::Int64);
        assert_eq!(filtered.column_metadata()[0].null_count, 1);
    }
}
