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

use oracle_dash::{GenerateOptions, Settings};
use llm_contracts::Provider;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const SALES_CSV: &str = "region,product,sales\n\
West,Widget,15000\n\
East,Widget,10000\n\
East,Gadget,12000\n\
West,Gadget,8000\n\
West,Widget,20000\n";

fn sales_file(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("sales.csv");
    fs::write(&path, SALES_CSV).unwrap();
    path
}

#[test]
fn test_summary_reports_types_and_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let report = oracle_dash::summary(&sales_file(&dir)).unwrap();

    assert_eq!(report["summary"]["row_count"], 5);
    assert_eq!(report["summary"]["columns"], json!(["region", "product", "sales"]));
    assert_eq!(report["summary"]["column_types"]["numeric_columns"], json!(["sales"]));
    assert_eq!(report["statistics"]["sales"]["sum"], json!(65000.0));
    assert_eq!(report["statistics"]["region"]["unique_count"], 2);
    assert_eq!(report["statistics"]["region"]["value_counts"]["West"], 3);
}

#[test]
fn test_summary_missing_file_names_the_path() {
    let err = oracle_dash::summary(&PathBuf::from("/nonexistent/oracle.csv")).unwrap_err();
    assert!(format!("{err:#}").contains("/nonexistent/oracle.csv"));
}

#[test]
fn test_generate_mock_writes_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let options = GenerateOptions {
        csv: sales_file(&dir),
        out: dir.path().join("dashboard.html"),
        mock: true,
        data_out: Some(dir.path().join("data.json")),
        blueprint_out: Some(dir.path().join("blueprint.md")),
    };

    let result = oracle_dash::generate(&Settings::default(), &options).unwrap();

    let html = fs::read_to_string(&options.out).unwrap();
    assert_eq!(html, result.html);
    assert!(html.contains("Chart.js Safety Net Error:"));
    let data: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("data.json")).unwrap()).unwrap();
    assert_eq!(data["kpi"]["total_passengers"], 891);
    let blueprint = fs::read_to_string(dir.path().join("blueprint.md")).unwrap();
    assert!(blueprint.contains("Mock Blueprint"));
}

#[test]
fn test_mock_provider_setting_selects_mock_generator() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.provider.provider = Provider::Mock;
    let options = GenerateOptions {
        csv: sales_file(&dir),
        out: dir.path().join("dashboard.html"),
        ..GenerateOptions::default()
    };

    let result = oracle_dash::generate(&settings, &options).unwrap();
    assert!(result.blueprint.contains("Mock Blueprint"));
    assert!(options.out.exists());
}

#[test]
fn test_chat_refuses_mock_provider() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.provider.provider = Provider::Mock;

    let err = oracle_dash::chat(&settings, &sales_file(&dir), "hello").unwrap_err();
    assert!(err.to_string().contains("mock provider"));
}
