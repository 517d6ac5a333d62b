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

use crate::data_handler::column::ColumnBuilder;
use crate::data_handler::common::DatasetMetadata;
use crate::data_handler::dataframe::DataFrame;
use crate::error::{DataHandlerError, Result};
use encoding_rs::Encoding;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Encodings tried by [`DataLoader`], in order. `cp932` is resolved through its
/// WHATWG label `windows-31j`.
pub const SUPPORTED_ENCODINGS: &[(&str, &str)] = &[
    ("utf-8", "utf-8"),
    ("shift_jis", "shift_jis"),
    ("cp932", "windows-31j"),
    ("euc-jp", "euc-jp"),
];

#[derive(Debug, Clone)]
pub struct CsvReader {
    has_headers: bool,
    delimiter: u8,
    quote_char: u8,
}

impl CsvReader {
    pub fn new() -> Self {
        Self {
            has_headers: true,
            delimiter: b',',
            quote_char: b'"',
        }
    }

    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote(mut self, quote_char: u8) -> Self {
        self.quote_char = quote_char;
        self
    }

    pub fn read_str(&self, text: &str, dataset_name: &str) -> Result<DataFrame> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(self.has_headers)
            .delimiter(self.delimiter)
            .quote(self.quote_char)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut headers: Vec<String> = if self.has_headers {
            reader
                .headers()?
                .iter()
                .map(|h| h.trim().to_string())
                .collect()
        } else {
            Vec::new()
        };

        let mut builders: Vec<ColumnBuilder> =
            headers.iter().map(|_| ColumnBuilder::new()).collect();
        let mut row_count = 0usize;
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            if !self.has_headers && headers.is_empty() {
                headers = (0..record.len()).map(|i| format!("column_{i}")).collect();
                builders = headers.iter().map(|_| ColumnBuilder::new()).collect();
            }
            if record.len() > headers.len() {
                return Err(DataHandlerError::Parse(format!(
                    "Line {}: Expected {} fields, got {}",
                    line + 2,
                    headers.len(),
                    record.len()
                )));
            }
            for (i, builder) in builders.iter_mut().enumerate() {
                builder.push(record.get(i).map(str::to_string));
            }
            row_count += 1;
        }
        if headers.is_empty() {
            return Err(DataHandlerError::Empty(format!(
                "'{dataset_name}' has no columns"
            )));
        }

        let mut metadata = DatasetMetadata::named(dataset_name);
        metadata.row_count = row_count;
        let mut dataframe = DataFrame::new(metadata);
        for (header, builder) in headers.into_iter().zip(builders) {
            dataframe.add_column(header, builder.build()?)?;
        }
        debug!(
            dataset = dataset_name,
            rows = dataframe.row_count(),
            columns = dataframe.column_count(),
            "Parsed CSV text"
        );
        Ok(dataframe)
    }
}

impl Default for CsvReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes raw upload bytes by trying each supported encoding in turn.
#[derive(Debug, Clone, Default)]
pub struct DataLoader {
    reader: CsvReader,
}

impl DataLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reader(reader: CsvReader) -> Self {
        Self { reader }
    }

    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<DataFrame> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        self.load_bytes(&bytes, &name)
    }

    pub fn load_bytes(&self, data: &[u8], name: &str) -> Result<DataFrame> {
        let mut parse_error = None;
        for (label, whatwg_label) in SUPPORTED_ENCODINGS {
            let Some(text) = decode_strict(data, whatwg_label) else {
                debug!(encoding = label, "Bytes are not valid in this encoding");
                continue;
            };
            match self.reader.read_str(&text, name) {
                Ok(mut frame) => {
                    frame.metadata.encoding = Some((*label).to_string());
                    debug!(encoding = label, dataset = name, "Loaded CSV");
                    return Ok(frame);
                }
                Err(e) => {
                    warn!(encoding = label, error = %e, "Decoded text did not parse as CSV");
                    parse_error = Some(e);
                }
            }
        }
        Err(parse_error.unwrap_or_else(|| DataHandlerError::UnsupportedEncoding {
            tried: SUPPORTED_ENCODINGS
                .iter()
                .map(|(label, _)| *label)
                .collect::<Vec<_>>()
                .join(", "),
        }))
    }
}

fn decode_strict(data: &[u8], label: &str) -> Option<String> {
    if label == "utf-8" {
        let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
        return std::str::from_utf8(data).ok().map(str::to_string);
    }
    let encoding = Encoding::for_label(label.as_bytes())?;
    encoding
        .decode_without_bom_handling_and_without_replacement(data)
        .map(|text| text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handler::column::ColumnData;
    use crate::data_handler::common::DataType;
    use std::io::Write;

    #[test]
    fn reads_utf8_with_inferred_types() {
        let df = DataLoader::new()
            .load_bytes(b"name,age,score\nalice,30,1.5\nbob,,2\n", "people")
            .unwrap();
        assert_eq!(df.row_count(), 2);
        assert_eq!(df.get_column("age").unwrap().data_type(), DataType::Int64);
        assert_eq!(df.get_column("age").unwrap().null_count(), 1);
        assert_eq!(df.get_column("score").unwrap().data_type(), DataType::Float64);
        assert_eq!(df.metadata.encoding.as_deref(), Some("utf-8"));
    }

    #[test]
    fn falls_back_to_shift_jis() {
        let (encoded, _, had_errors) = encoding_rs::SHIFT_JIS.encode("地域,売上\n東京,100\n大阪,200\n");
        assert!(!had_errors);
        let df = DataLoader::new().load_bytes(&encoded, "jp").unwrap();
        assert_eq!(df.column_names(), &["地域".to_string(), "売上".to_string()]);
        assert_eq!(df.get_column("地域").unwrap().get_string(0).as_deref(), Some("東京"));
        assert_eq!(df.metadata.encoding.as_deref(), Some("shift_jis"));
    }

    #[test]
    fn strips_utf8_byte_order_mark() {
        let df = DataLoader::new()
            .load_bytes("\u{feff}a,b\n1,2\n".as_bytes(), "bom")
            .unwrap();
        assert_eq!(df.column_names()[0], "a");
    }

    #[test]
    fn short_rows_are_padded_with_nulls() {
        let df = CsvReader::new().read_str("a,b,c\n1,2\n3,4,5\n", "ragged").unwrap();
        assert_eq!(df.get_column("c").unwrap().null_count(), 1);
    }

    #[test]
    fn load_file_uses_the_file_stem_as_name() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "x,y").unwrap();
        writeln!(file, "1,2").unwrap();
        let df = DataLoader::new().load_file(file.path()).unwrap();
        assert_eq!(df.row_count(), 1);
        assert!(!df.metadata.name.is_empty());
        assert!(!df.metadata.name.ends_with(".csv"));
    }
}
