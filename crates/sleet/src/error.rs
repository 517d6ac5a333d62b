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

use estel::DataHandlerError;
use llm_contracts::LLMError;
use stele::{RuntimeError, SyntaxError};
use thiserror::Error;

/// Which fenced block the phase-two reply was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExtractionFailure {
    #[error("no python code block found in the model reply")]
    MissingPython,
    #[error("no HTML block found in the model reply")]
    MissingHtml,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionFailure),

    #[error("{} aggregation code has a syntax error: {message}", stage(.repaired))]
    Syntax { repaired: bool, message: String },

    #[error("{} aggregation code does not define aggregate_all_data", stage(.repaired))]
    MissingEntryPoint { repaired: bool },

    #[error("{} aggregation code failed: {kind}: {message}", stage(.repaired))]
    Runtime {
        repaired: bool,
        kind: String,
        message: String,
        traceback: String,
    },

    #[error("Generation error: {0}")]
    Generation(#[from] LLMError),

    #[error("Data error: {0}")]
    Data(#[from] DataHandlerError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

fn stage(repaired: &bool) -> &'static str {
    if *repaired {
        "Repaired"
    } else {
        "Generated"
    }
}

impl PipelineError {
    pub fn syntax(repaired: bool, error: &SyntaxError) -> Self {
        Self::Syntax {
            repaired,
            message: error.render(),
        }
    }

    pub fn runtime(repaired: bool, error: &RuntimeError) -> Self {
        Self::Runtime {
            repaired,
            kind: error.kind.name().to_string(),
            message: error.message.clone(),
            traceback: error.format_traceback(),
        }
    }

    /// Whether the failure came from code the model had already been asked to fix.
    pub fn is_post_repair(&self) -> bool {
        match self {
            Self::Syntax { repaired, .. }
            | Self::MissingEntryPoint { repaired }
            | Self::Runtime { repaired, .. } => *repaired,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stele::ErrorKind;

    #[test]
    fn syntax_display_carries_rendered_parse_error() {
        let parse = SyntaxError::new("invalid syntax", 1, 9, "def f(:\n");
        let err = PipelineError::syntax(false, &parse);
        let text = err.to_string();
        assert!(text.starts_with("Generated aggregation code has a syntax error"));
        assert!(text.contains("invalid syntax (line 1)"));
        assert!(!err.is_post_repair());
    }

    #[test]
    fn runtime_display_is_kind_and_message() {
        let err = PipelineError::runtime(true, &RuntimeError::new(ErrorKind::KeyError, "'sales'"));
        assert_eq!(err.to_string(), "Repaired aggregation code failed: KeyError: 'sales'");
        assert!(err.is_post_repair());
    }
}
