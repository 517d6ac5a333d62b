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

use anyhow::Result;
use estel::{CsvReader, DataFrame};
use llm_contracts::{GeneratedText, LLMError, LLMResult, TextGenerator};
use serde_json::json;
use sleet::{
    AIGenerator, AggregationExecutor, DashboardGenerator, ExtractionFailure, PipelineConfig,
    PipelineError,
};
use std::cell::RefCell;
use std::collections::VecDeque;

const SALES_CSV: &str = "\
region,product,sales,date
East,Widget,10000,2024-01-15
West,Widget,15000,2024-02-03
East,Gadget,12000,2024-02-20
West,Gadget,8000,2024-03-11
West,Widget,20000,2024-03-30
";

const TOTAL_CODE: &str = "\
def aggregate_all_data(df):
    return {\"kpi\": {\"total\": int(df[\"sales\"].sum())}}
";

/// Replays canned replies in order and remembers every prompt it saw.
#[derive(Default)]
struct ScriptedGenerator {
    replies: RefCell<VecDeque<LLMResult<String>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedGenerator {
    fn new<I: IntoIterator<Item = &'static str>>(replies: I) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
            prompts: RefCell::default(),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    fn prompt(&self, index: usize) -> String {
        self.prompts.borrow()[index].clone()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, prompt: &str) -> LLMResult<GeneratedText> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(LLMError::Unavailable("script exhausted".into())))
            .map(GeneratedText::new)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn sales() -> Result<DataFrame> {
    Ok(CsvReader::new().read_str(SALES_CSV, "sales")?)
}

fn fenced(code: &str) -> String {
    format!("Here is the fix:\n```python\n{code}```\n")
}

#[test]
fn test_end_to_end_injects_total() -> Result<()> {
    let phase_two = format!(
        "### 1. Python\n```python\n{TOTAL_CODE}```\n\n### 2. HTML\n```html\n<!DOCTYPE html>\n<html><body>\n<script>const dashboardData = {{{{JSON_DATA}}}};</script>\n</body></html>\n```\n"
    );
    let generator = ScriptedGenerator::new(["## Blueprint\n| 1 | Total | sales | kpi |"]);
    generator
        .replies
        .borrow_mut()
        .push_back(Ok(phase_two));
    let pipeline = AIGenerator::new(&generator);
    let mut steps = Vec::new();
    let result = pipeline.generate_oneshot(&sales()?, &mut |step, _| steps.push(step))?;

    assert_eq!(steps, vec![1, 2, 3, 4]);
    assert_eq!(generator.calls(), 2);
    assert!(generator.prompt(0).contains("region, product, sales, date"));
    assert!(generator.prompt(0).contains("East,Widget,10000,2024-01-15"));
    assert!(generator.prompt(1).contains("## Blueprint"));
    assert_eq!(result.data, json!({"kpi": {"total": 65000}}));
    assert!(result
        .html
        .contains(r#"const dashboardData = {"kpi":{"total":65000}};"#));
    assert!(result.blueprint.starts_with("## Blueprint"));
    Ok(())
}

#[test]
fn test_missing_python_block_is_extraction_failure() -> Result<()> {
    let generator = ScriptedGenerator::new(["plan", "```html\n<html></html>\n```"]);
    let err = AIGenerator::new(&generator)
        .generate_oneshot(&sales()?, &mut |_, _| {})
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Extraction(ExtractionFailure::MissingPython)
    ));
    Ok(())
}

#[test]
fn test_generator_failure_is_surfaced_unchanged() -> Result<()> {
    let generator = ScriptedGenerator::default();
    let err = AIGenerator::new(&generator)
        .generate_blueprint(&sales()?)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Generation(LLMError::Unavailable(_))));
    Ok(())
}

#[test]
fn test_syntax_error_without_repair_reports_parse_error() -> Result<()> {
    let generator = ScriptedGenerator::new(["   "]);
    let code = "def aggregate_all_data(df)\n    return {}\n";
    let err = AggregationExecutor::new(&generator)
        .execute(code, &sales()?)
        .unwrap_err();

    assert_eq!(generator.calls(), 1);
    assert!(generator.prompt(0).contains("has a syntax error"));
    assert!(generator.prompt(0).contains("Error line: def aggregate_all_data(df)"));
    match err {
        PipelineError::Syntax { repaired, message } => {
            assert!(!repaired);
            assert!(message.contains("(line 1)"), "{message}");
            assert!(message.contains("def aggregate_all_data(df)"));
        }
        other => panic!("expected a syntax failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_syntax_repair_is_used() -> Result<()> {
    let fixed = fenced(TOTAL_CODE);
    let generator = ScriptedGenerator::default();
    generator.replies.borrow_mut().push_back(Ok(fixed));
    let out = AggregationExecutor::new(&generator)
        .execute("def aggregate_all_data(df)\n    return 1\n", &sales()?)?;
    assert_eq!(out, json!({"kpi": {"total": 65000}}));
    assert_eq!(generator.calls(), 1);
    Ok(())
}

#[test]
fn test_repaired_code_that_still_fails_to_parse_is_terminal() -> Result<()> {
    let generator = ScriptedGenerator::new(["```python\ndef broken(:\n```"]);
    let err = AggregationExecutor::new(&generator)
        .execute("def f(\n", &sales()?)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Syntax { repaired: true, .. }));
    assert_eq!(generator.calls(), 1);
    Ok(())
}

#[test]
fn test_runtime_error_repair_carries_columns_and_traceback() -> Result<()> {
    let broken = "\
def helper(df):
    return df['revenue'].sum()

def aggregate_all_data(df):
    return {'kpi': {'total': helper(df)}}
";
    let generator = ScriptedGenerator::default();
    generator.replies.borrow_mut().push_back(Ok(fenced(TOTAL_CODE)));
    let out = AggregationExecutor::new(&generator).execute(broken, &sales()?)?;

    assert_eq!(out, json!({"kpi": {"total": 65000}}));
    assert_eq!(generator.calls(), 1);
    let prompt = generator.prompt(0);
    assert!(prompt.contains("DataFrame columns: region, product, sales, date"));
    assert!(prompt.contains("Error: KeyError: "));
    assert!(prompt.contains("in helper"));
    assert!(prompt.contains("df['revenue']"));
    Ok(())
}

#[test]
fn test_runtime_failure_after_repair_is_terminal() -> Result<()> {
    let still_broken = "```python\ndef aggregate_all_data(df):\n    return 1 / 0\n```";
    let generator = ScriptedGenerator::new([still_broken]);
    let err = AggregationExecutor::new(&generator)
        .execute("def aggregate_all_data(df):\n    return df['x']\n", &sales()?)
        .unwrap_err();
    assert_eq!(generator.calls(), 1);
    match err {
        PipelineError::Runtime {
            repaired,
            kind,
            traceback,
            ..
        } => {
            assert!(repaired);
            assert_eq!(kind, "ZeroDivisionError");
            assert!(traceback.contains("in aggregate_all_data"));
        }
        other => panic!("expected a runtime failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_unparseable_runtime_fix_gets_the_unspent_syntax_repair() -> Result<()> {
    let missing_colon = "```python\ndef aggregate_all_data(df)\n    return 1\n```";
    let generator = ScriptedGenerator::new([missing_colon]);
    generator.replies.borrow_mut().push_back(Ok(fenced(TOTAL_CODE)));
    let out = AggregationExecutor::new(&generator)
        .execute("def aggregate_all_data(df):\n    return df['x']\n", &sales()?)?;

    assert_eq!(out, json!({"kpi": {"total": 65000}}));
    assert_eq!(generator.calls(), 2);
    assert!(generator.prompt(0).contains("raised a runtime error"));
    let syntax_prompt = generator.prompt(1);
    assert!(syntax_prompt.contains("has a syntax error"));
    assert!(syntax_prompt.contains("Python code:\ndef aggregate_all_data(df)\n    return 1"));
    Ok(())
}

#[test]
fn test_unparseable_runtime_fix_after_syntax_repair_is_terminal() -> Result<()> {
    let raises = "```python\ndef aggregate_all_data(df):\n    return df['x']\n```";
    let missing_colon = "```python\ndef aggregate_all_data(df)\n    return 1\n```";
    let generator = ScriptedGenerator::new([raises, missing_colon]);
    let err = AggregationExecutor::new(&generator)
        .execute("def aggregate_all_data(df)\n    return 1\n", &sales()?)
        .unwrap_err();

    assert_eq!(generator.calls(), 2);
    assert!(generator.prompt(0).contains("has a syntax error"));
    assert!(generator.prompt(1).contains("raised a runtime error"));
    assert!(matches!(err, PipelineError::Syntax { repaired: true, .. }));
    Ok(())
}

#[test]
fn test_syntax_repair_then_runtime_repair() -> Result<()> {
    let raises = "```python\ndef aggregate_all_data(df):\n    return df['x']\n```";
    let generator = ScriptedGenerator::new([raises]);
    generator.replies.borrow_mut().push_back(Ok(fenced(TOTAL_CODE)));
    let out = AggregationExecutor::new(&generator)
        .execute("def aggregate_all_data(df)\n    return 1\n", &sales()?)?;

    assert_eq!(out, json!({"kpi": {"total": 65000}}));
    assert_eq!(generator.calls(), 2);
    assert!(generator.prompt(1).contains("Error: KeyError: "));
    Ok(())
}

#[test]
fn test_oversized_allocation_in_entry_point_is_repaired() -> Result<()> {
    let generator = ScriptedGenerator::default();
    generator.replies.borrow_mut().push_back(Ok(fenced(TOTAL_CODE)));
    let out = AggregationExecutor::new(&generator).execute(
        "def aggregate_all_data(df):\n    return len('ab' * (2 ** 62))\n",
        &sales()?,
    )?;

    assert_eq!(out, json!({"kpi": {"total": 65000}}));
    assert_eq!(generator.calls(), 1);
    assert!(generator.prompt(0).contains("Error: MemoryError: "));
    Ok(())
}

#[test]
fn test_module_level_errors_are_not_repaired() -> Result<()> {
    let generator = ScriptedGenerator::default();
    let err = AggregationExecutor::new(&generator)
        .execute("import os\n\ndef aggregate_all_data(df):\n    return {}\n", &sales()?)
        .unwrap_err();
    assert_eq!(generator.calls(), 0);
    assert!(
        matches!(&err, PipelineError::Runtime { repaired: false, kind, .. } if kind == "ModuleNotFoundError")
    );
    Ok(())
}

#[test]
fn test_missing_entry_point_is_terminal() -> Result<()> {
    let generator = ScriptedGenerator::default();
    let err = AggregationExecutor::new(&generator)
        .execute("def aggregate(df):\n    return {}\n", &sales()?)
        .unwrap_err();
    assert_eq!(generator.calls(), 0);
    assert!(matches!(err, PipelineError::MissingEntryPoint { repaired: false }));
    Ok(())
}

#[test]
fn test_runaway_code_hits_step_budget() -> Result<()> {
    let config = PipelineConfig {
        max_steps: 20_000,
        ..PipelineConfig::default()
    };
    let generator = ScriptedGenerator::default();
    let err = AggregationExecutor::with_config(&generator, &config)
        .execute(
            "def aggregate_all_data(df):\n    while True:\n        pass\n",
            &sales()?,
        )
        .unwrap_err();
    assert_eq!(generator.calls(), 1);
    assert!(
        matches!(&err, PipelineError::Runtime { kind, .. } if kind == "ExecutionLimitExceeded")
    );
    Ok(())
}

#[test]
fn test_guarded_calls_survive_scalar_receivers() -> Result<()> {
    let code = "\
def aggregate_all_data(df):
    total = df['sales'].sum()
    by_region = df.groupby('region')['sales'].sum()
    return {
        'total': total.tolist(),
        'doubled': total.mul(2),
        'regions': by_region.index.tolist(),
        'values': by_region.tolist(),
    }
";
    let generator = ScriptedGenerator::default();
    let out = AggregationExecutor::new(&generator).execute(code, &sales()?)?;
    assert_eq!(
        out,
        json!({
            "total": 65000,
            "doubled": 130000,
            "regions": ["East", "West"],
            "values": [22000, 43000],
        })
    );
    assert_eq!(generator.calls(), 0);
    Ok(())
}

#[test]
fn test_timestamps_serialise_as_iso() -> Result<()> {
    let code = "\
def aggregate_all_data(df):
    dates = pd.to_datetime(df['date'])
    return {'first': dates.min(), 'span': dates.max() - dates.min()}
";
    let generator = ScriptedGenerator::default();
    let out = AggregationExecutor::new(&generator).execute(code, &sales()?)?;
    assert_eq!(out["first"], "2024-01-15T00:00:00");
    assert_eq!(out["span"], json!(75.0 * 86_400.0));
    Ok(())
}
