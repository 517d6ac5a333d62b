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

use crate::assembler::assemble;
use crate::config::PipelineConfig;
use crate::error::{ExtractionFailure, PipelineResult};
use crate::executor::AggregationExecutor;
use crate::extract::{extract_html, extract_python_code};
use crate::logging::log_step_started;
use crate::prompts::PromptSet;
use estel::DataFrame;
use llm_contracts::TextGenerator;
use serde::Serialize;
use serde_json::Value as Json;
use tracing::{debug, info};

/// Steps reported through the progress callback.
pub const TOTAL_STEPS: u8 = 4;

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub html: String,
    pub data: Json,
    pub blueprint: String,
}

/// The two artefacts of phase two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    pub python: String,
    pub html: String,
}

/// Anything that can turn a dataset into a finished dashboard.
pub trait DashboardGenerator {
    fn generate_oneshot(
        &self,
        dataset: &DataFrame,
        progress: &mut dyn FnMut(u8, &str),
    ) -> PipelineResult<GenerationResult>;
}

/// Drives blueprint, code generation, aggregation and assembly against a model.
pub struct AIGenerator<G> {
    generator: G,
    prompts: PromptSet,
    config: PipelineConfig,
}

impl<G: TextGenerator> AIGenerator<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            prompts: PromptSet::default(),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Phase one: a Markdown plan of the charts to build.
    pub fn generate_blueprint(&self, dataset: &DataFrame) -> PipelineResult<String> {
        let sample = dataset.head(self.config.sample_rows)?.to_csv_string()?;
        let prompt = self
            .prompts
            .blueprint_prompt(dataset.column_names(), &sample);
        let reply = self.generator.generate(&prompt)?;
        debug!(chars = reply.text.len(), "Blueprint received");
        Ok(reply.text)
    }

    /// Phase two: the aggregation function and the dashboard template.
    pub fn generate_code(
        &self,
        blueprint: &str,
        dataset: &DataFrame,
    ) -> PipelineResult<GeneratedCode> {
        let prompt = self
            .prompts
            .dashboard_prompt(blueprint, dataset.column_names());
        let content = self.generator.generate(&prompt)?.text;
        let python = extract_python_code(&content).ok_or(ExtractionFailure::MissingPython)?;
        let html = extract_html(&content).ok_or(ExtractionFailure::MissingHtml)?;
        Ok(GeneratedCode { python, html })
    }

    pub fn execute_aggregation(&self, code: &str, dataset: &DataFrame) -> PipelineResult<Json> {
        AggregationExecutor::with_config(&self.generator, &self.config).execute(code, dataset)
    }

    pub fn assemble_html(&self, template: &str, data: &Json) -> String {
        assemble(template, data)
    }
}

impl<G: TextGenerator> DashboardGenerator for AIGenerator<G> {
    fn generate_oneshot(
        &self,
        dataset: &DataFrame,
        progress: &mut dyn FnMut(u8, &str),
    ) -> PipelineResult<GenerationResult> {
        let mut notify = |step: u8, message: &str| {
            log_step_started(step, TOTAL_STEPS, message);
            progress(step, message);
        };

        notify(1, "Analysing the data structure");
        let blueprint = self.generate_blueprint(dataset)?;

        notify(2, "Designing the dashboard");
        let code = self.generate_code(&blueprint, dataset)?;

        notify(3, "Aggregating the data");
        let data = self.execute_aggregation(&code.python, dataset)?;

        notify(4, "Assembling the dashboard");
        let html = self.assemble_html(&code.html, &data);
        info!(
            generator = self.generator.name(),
            html_bytes = html.len(),
            "Dashboard generated"
        );

        Ok(GenerationResult {
            html,
            data,
            blueprint,
        })
    }
}
