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

use crate::error::PipelineResult;
use crate::prompts::PromptSet;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use stele::Limits;

/// Tuning for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Evaluation steps each aggregation attempt may spend.
    pub max_steps: u64,
    /// Nested script calls before `RecursionError`.
    pub max_depth: usize,
    /// Rows of the dataset shown to the model in the blueprint prompt.
    pub sample_rows: usize,
    /// Stack reserved for the thread that runs generated code, in MiB.
    pub stack_size_mib: usize,
    pub prompt_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            max_steps: limits.max_steps,
            max_depth: limits.max_depth,
            sample_rows: estel::SAMPLE_ROWS,
            stack_size_mib: 64,
            prompt_file: None,
        }
    }
}

impl PipelineConfig {
    pub fn limits(&self) -> Limits {
        Limits {
            max_steps: self.max_steps,
            max_depth: self.max_depth,
        }
    }

    /// The configured prompt file, or the built-in prompts.
    pub fn load_prompts(&self) -> PipelineResult<PromptSet> {
        match &self.prompt_file {
            Some(path) => PromptSet::load(path),
            None => Ok(PromptSet::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_interpreter_limits() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_steps, 5_000_000);
        assert_eq!(config.max_depth, 200);
        assert_eq!(config.sample_rows, 5);
        assert_eq!(config.limits(), Limits::default());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: PipelineConfig = toml::from_str("max_steps = 1000").unwrap();
        assert_eq!(config.max_steps, 1000);
        assert_eq!(config.max_depth, 200);
        assert!(config.load_prompts().is_ok());
    }
}
