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

pub mod column;
pub mod common;
pub mod dataframe;
pub mod io;
pub mod profile;

pub use column::{format_float, Column, ColumnBuilder, ColumnData};
pub use common::{ColumnMetadata, DataType, DatasetId, DatasetMetadata, SAMPLE_ROWS};
pub use dataframe::DataFrame;
pub use io::{CsvReader, DataLoader, SUPPORTED_ENCODINGS};
pub use profile::{calculate_statistics, summarize, ColumnStatistics, ColumnTypes, DataSummary};

pub fn load_csv<P: AsRef<std::path::Path>>(path: P) -> crate::Result<DataFrame> {
    DataLoader::new().load_file(path)
}
