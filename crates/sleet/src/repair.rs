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

//! One-shot repair requests for aggregation code that failed to parse or run.

use crate::extract::extract_python_code;
use crate::logging::{log_repair_outcome, log_repair_requested, RepairKind};
use estel::DataFrame;
use llm_contracts::TextGenerator;
use stele::{RuntimeError, SyntaxError};
use tracing::warn;

/// `msg (line N)`, the offending line and a caret under the column.
pub fn format_syntax_error(error: &SyntaxError) -> String {
    error.render()
}

/// `Kind: message`.
pub fn format_runtime_error(error: &RuntimeError) -> String {
    error.summary()
}

pub fn syntax_prompt(code: &str, error: &SyntaxError) -> String {
    let mut location = format!("line {}", error.line);
    if error.column > 0 {
        location.push_str(&format!(", column {}", error.column));
    }
    format!(
        "The following Python code has a syntax error. Fix it and return only valid Python code.\n\
         Keep the function name aggregate_all_data and preserve the output schema expected by the HTML.\n\
         Error: {} ({location})\n\
         Error line: {}\n\n\
         Python code:\n\
         {code}\n",
        error.message,
        error.line_text.trim_end(),
    )
}

pub fn runtime_prompt(code: &str, error: &RuntimeError, columns: &[String]) -> String {
    format!(
        "The following Python code raised a runtime error when calling aggregate_all_data(df). Fix it and return only valid Python code.\n\
         Keep the function name aggregate_all_data and preserve the output schema expected by the HTML.\n\
         Error: {}\n\
         DataFrame columns: {}\n\
         Traceback:\n\
         {}\n\n\
         Python code:\n\
         {code}\n",
        format_runtime_error(error),
        columns.join(", "),
        error.format_traceback(),
    )
}

/// Asks the model to fix failing code. Each call sends exactly one prompt.
pub struct RepairLoop<'g> {
    generator: &'g dyn TextGenerator,
}

impl<'g> RepairLoop<'g> {
    pub fn new(generator: &'g dyn TextGenerator) -> Self {
        Self { generator }
    }

    pub fn repair_syntax(&self, code: &str, error: &SyntaxError) -> Option<String> {
        log_repair_requested(RepairKind::Syntax, &format_syntax_error(error));
        self.ask(RepairKind::Syntax, &syntax_prompt(code, error))
    }

    pub fn repair_runtime(
        &self,
        code: &str,
        error: &RuntimeError,
        dataset: &DataFrame,
    ) -> Option<String> {
        log_repair_requested(RepairKind::Runtime, &format_runtime_error(error));
        self.ask(
            RepairKind::Runtime,
            &runtime_prompt(code, error, dataset.column_names()),
        )
    }

    fn ask(&self, kind: RepairKind, prompt: &str) -> Option<String> {
        let reply = match self.generator.generate(prompt) {
            Ok(reply) => reply.text,
            Err(e) => {
                warn!(repair = kind.as_str(), error = %e, "Repair request failed");
                log_repair_outcome(kind, false);
                return None;
            }
        };
        let content = reply.trim();
        let repaired = (!content.is_empty())
            .then(|| extract_python_code(content).unwrap_or_else(|| content.to_string()));
        log_repair_outcome(kind, repaired.is_some());
        repaired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estel::CsvReader;
    use llm_contracts::{FnGenerator, GeneratedText, LLMError};
    use stele::ErrorKind;

    #[test]
    fn syntax_prompt_layout() {
        let code = "def aggregate_all_data(df)\n    return {}\n";
        let error = SyntaxError::new("expected ':'", 1, 27, code);
        let prompt = syntax_prompt(code, &error);
        assert!(prompt.starts_with(
            "The following Python code has a syntax error. Fix it and return only valid Python code.\n"
        ));
        assert!(prompt.contains("Error: expected ':' (line 1, column 27)\n"));
        assert!(prompt.contains("Error line: def aggregate_all_data(df)\n\nPython code:\n"));
        assert!(prompt.ends_with("    return {}\n\n"));
    }

    #[test]
    fn syntax_prompt_omits_unknown_column() {
        let error = SyntaxError::new("unexpected EOF", 3, 0, "a\nb\nc");
        assert!(syntax_prompt("a\nb\nc", &error).contains("Error: unexpected EOF (line 3)\n"));
    }

    #[test]
    fn runtime_prompt_lists_columns_and_traceback() {
        let error = RuntimeError::new(ErrorKind::KeyError, "'revenue'");
        let columns = vec!["region".to_string(), "sales".to_string()];
        let prompt = runtime_prompt("code", &error, &columns);
        assert!(prompt.contains("Error: KeyError: 'revenue'\n"));
        assert!(prompt.contains("DataFrame columns: region, sales\n"));
        assert!(prompt.contains("Traceback:\nTraceback (most recent call last):\n"));
    }

    #[test]
    fn reply_fence_is_extracted_or_whole_reply_used() {
        let fenced = FnGenerator::new("fenced", |_: &str| {
            Ok(GeneratedText::new("Fixed:\n```python\nx = 1\n```\n"))
        });
        let bare = FnGenerator::new("bare", |_: &str| Ok(GeneratedText::new("  y = 2  \n")));
        let error = SyntaxError::new("invalid syntax", 1, 1, "x = = 1");
        assert_eq!(
            RepairLoop::new(&fenced).repair_syntax("x = = 1", &error).as_deref(),
            Some("x = 1")
        );
        assert_eq!(
            RepairLoop::new(&bare).repair_syntax("x = = 1", &error).as_deref(),
            Some("y = 2")
        );
    }

    #[test]
    fn blank_reply_or_generator_error_yields_none() {
        let blank = FnGenerator::new("blank", |_: &str| Ok(GeneratedText::new("   ")));
        let failing = FnGenerator::new("down", |_: &str| Err(LLMError::Timeout));
        let dataset = CsvReader::new().read_str("a\n1\n", "t").unwrap();
        let error = RuntimeError::type_error("boom");
        assert_eq!(RepairLoop::new(&blank).repair_runtime("x", &error, &dataset), None);
        assert_eq!(RepairLoop::new(&failing).repair_runtime("x", &error, &dataset), None);
    }
}
