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

//! Canned dashboard for demos without a model.

use crate::assembler::assemble;
use crate::error::PipelineResult;
use crate::generator::{DashboardGenerator, GenerationResult, TOTAL_STEPS};
use crate::logging::log_step_started;
use estel::DataFrame;
use serde_json::{json, Value as Json};
use tracing::info;

const MOCK_TEMPLATE: &str = include_str!("templates/mock_dashboard.html");
const MOCK_BLUEPRINT: &str = "## Mock Blueprint\n- This is a pre-defined demo blueprint.";

/// Executive summary of the Titanic passenger list.
pub fn mock_data() -> Json {
    json!({
        "kpi": {
            "total_passengers": 891,
            "survival_rate": "38.4%",
            "avg_fare": "$32.20",
            "first_class_survival": "62.9%"
        },
        "charts": {
            "survival_by_class": {
                "labels": ["1st Class", "2nd Class", "3rd Class"],
                "datasets": [{"label": "Survival Rate", "data": [62.9, 47.3, 24.2], "type": "bar"}]
            },
            "survival_by_gender": {
                "labels": ["Female", "Male"],
                "datasets": [{"label": "Survivors", "data": [233, 109], "type": "doughnut"}]
            },
            "age_distribution": {
                "labels": ["0-10", "11-20", "21-30", "31-40", "41-50", "51-60", "60+"],
                "datasets": [{
                    "label": "Passenger Count",
                    "data": [64, 115, 230, 155, 86, 42, 22],
                    "type": "line",
                    "fill": true
                }]
            },
            "fare_analysis": {
                "labels": ["S", "C", "Q"],
                "datasets": [{"label": "Average Fare", "data": [27.07, 59.95, 13.27], "type": "radar"}]
            }
        },
        "insight_summary": "Overall survival rate was 38.4%. First-class passengers had a significantly higher survival chance (62.9%) compared to 3rd class (24.2%). Females were prioritized in rescue operations."
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MockGenerator;

impl DashboardGenerator for MockGenerator {
    fn generate_oneshot(
        &self,
        _dataset: &DataFrame,
        progress: &mut dyn FnMut(u8, &str),
    ) -> PipelineResult<GenerationResult> {
        info!("Mock mode: building the demo dashboard without a model call");
        for (step, message) in [
            (1, "Preparing demo data"),
            (2, "Extracting executive insights"),
            (3, "Building visualisations"),
            (4, "Done"),
        ] {
            log_step_started(step, TOTAL_STEPS, message);
            progress(step, message);
        }

        let data = mock_data();
        Ok(GenerationResult {
            html: assemble(MOCK_TEMPLATE, &data),
            data,
            blueprint: MOCK_BLUEPRINT.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estel::CsvReader;

    #[test]
    fn mock_reports_four_steps_and_injects_data() {
        let dataset = CsvReader::new().read_str("a\n1\n", "ignored").unwrap();
        let mut steps = Vec::new();
        let result = MockGenerator
            .generate_oneshot(&dataset, &mut |step, _| steps.push(step))
            .unwrap();
        assert_eq!(steps, vec![1, 2, 3, 4]);
        assert!(result.blueprint.contains("Mock Blueprint"));
        assert_eq!(result.data["kpi"]["total_passengers"], 891);
        assert!(!result.html.contains("JSON_DATA"));
        assert!(result.html.contains("\"total_passengers\":891"));
        assert!(result.html.contains("Direct View: Dashboard initialized"));
    }
}
