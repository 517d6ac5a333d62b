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

use crate::settings::Settings;
use anyhow::{bail, Context, Result};
use estel::{calculate_statistics, load_csv, summarize, DataFrame};
use llm_contracts::{Provider, TextGenerator};
use serde_json::{json, Value};
use sleet::{AIGenerator, ChatHandler, ChatResponse, DashboardGenerator, GenerationResult, MockGenerator};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub csv: PathBuf,
    pub out: PathBuf,
    pub mock: bool,
    pub data_out: Option<PathBuf>,
    pub blueprint_out: Option<PathBuf>,
}

fn load_dataset(path: &Path) -> Result<DataFrame> {
    let dataset = load_csv(path).with_context(|| format!("failed to load {}", path.display()))?;
    info!(
        rows = dataset.row_count(),
        columns = dataset.column_count(),
        "Dataset loaded"
    );
    Ok(dataset)
}

fn model_generator(settings: &Settings) -> Result<Box<dyn TextGenerator>> {
    if settings.provider.provider == Provider::Mock {
        bail!("the mock provider only serves `generate --mock`; configure gemini or ollama");
    }
    steel::build_generator(&settings.provider).context("failed to build the model client")
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

pub fn generate(settings: &Settings, options: &GenerateOptions) -> Result<GenerationResult> {
    let dataset = load_dataset(&options.csv)?;
    let mut progress = |step: u8, message: &str| {
        eprintln!("[{step}/{}] {message}", sleet::generator::TOTAL_STEPS);
    };

    let result = if options.mock || settings.provider.provider == Provider::Mock {
        MockGenerator.generate_oneshot(&dataset, &mut progress)?
    } else {
        let prompts = settings.pipeline.load_prompts()?;
        AIGenerator::new(model_generator(settings)?)
            .with_prompts(prompts)
            .with_config(settings.pipeline.clone())
            .generate_oneshot(&dataset, &mut progress)?
    };

    write_file(&options.out, &result.html)?;
    if let Some(path) = &options.data_out {
        let data = serde_json::to_string_pretty(&result.data)?;
        write_file(path, &data)?;
    }
    if let Some(path) = &options.blueprint_out {
        write_file(path, &result.blueprint)?;
    }
    info!(out = %options.out.display(), "Dashboard written");
    Ok(result)
}

pub fn summary(csv: &Path) -> Result<Value> {
    let dataset = load_dataset(csv)?;
    let summary = summarize(&dataset)?;
    Ok(json!({
        "summary": summary,
        "statistics": calculate_statistics(&dataset),
    }))
}

pub fn chat(settings: &Settings, csv: &Path, message: &str) -> Result<ChatResponse> {
    let dataset = load_dataset(csv)?;
    let prompts = settings.pipeline.load_prompts()?;
    let handler = ChatHandler::with_prompts(model_generator(settings)?, prompts.chat);
    Ok(handler.handle_message(message, Some(&dataset)))
}
