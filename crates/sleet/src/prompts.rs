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

//! Prompt templates. The defaults can be overridden wholesale or per field
//! from a YAML or TOML file.

use crate::error::{PipelineError, PipelineResult};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([A-Za-z_]+)\}").unwrap());

const BLUEPRINT_PROMPT: &str = r#"
A CSV file with the structure below has been uploaded.
Analyse it and propose a blueprint describing which 20 charts to build.

## Data summary
- Columns: {columns}
- Sample (5 rows):
{sample_data}

## Output format
Answer in Markdown:

> **Data analysis and visualisation plan**
> 1. Role of each column (date / metric / dimension / location). Ignore identifiers.
> 2. Charts to build (at least 20, none omitted):
> | No. | Chart title | Data used | Chart type | Purpose |
> | :-- | :-- | :-- | :-- | :-- |
"#;

const DASHBOARD_PROMPT: &str = r##"
The user approved the visualisation plan below.
Generate the Python aggregation logic and a dashboard that renders the pre-aggregated JSON.

## Approved plan (Blueprint)
{{BLUEPRINT}}

## Available columns
{{COLUMNS}}

## Requirements
1. [PYTHON] Write `aggregate_all_data(df)` using pandas. It aggregates the whole dataset and
   returns one dictionary holding every array or object the charts need, KPIs included.
   Do all data cleansing (BOM removal, numeric conversion) here.
2. [HTML] The page receives `const dashboardData = {{JSON_DATA}};` and draws it with Chart.js.
   Do not loop over or aggregate raw rows in the browser; only display the JSON as given.
3. Use a dark theme: deep navy backgrounds, cyan and gold accents, 'Cormorant Garamond'
   headings and 'DM Sans' body text. Never use a white background.
4. Give each chart a settings button that lets the user switch chart type and colour,
   persisting the choice in localStorage as {"chartId": {"type": "...", "color": "#..."}}.

## Output format
Return exactly two code blocks.

### 1. Python aggregation logic
```python
def aggregate_all_data(df):
    # result = {"kpi": {...}, "charts": {...}}
    return result
```

### 2. HTML dashboard
```html
<!DOCTYPE html>
<html>
<head>
    <script src="https://cdn.jsdelivr.net/npm/chart.js"></script>
</head>
<body>
    <script>
        const dashboardData = {{JSON_DATA}};
        function renderCharts() { /* ... */ }
    </script>
</body>
</html>
```
"##;

const INTENT_PROMPT: &str = r#"
Classify the user's message into one of these categories.

- question: a question about the data ("what is...", "why...", "which is highest...")
- add_chart: a request for a chart ("show me...", "add a graph", "visualise...")
- analyze: a request for analysis ("analyse", "compare", "look for correlation")
- summarize: a request for a summary ("sum up", "make a report", "summarise")
- general: anything else

User message: {message}

Answer in JSON: {"intent": "category", "entities": ["extracted entities"]}
"#;

const QUESTION_PROMPT: &str = r#"
Answer the question about the data below.

## Data
{data_info}

## Question
{message}

Answer concisely in three to five sentences and include concrete figures where available.
"#;

const ADD_CHART_PROMPT: &str = r#"
Produce a chart specification for the request below.

## Available columns
{columns}

## Request
{message}

Answer in this form:
Chart created.

```chart_spec
{"type": "bar|line|pie", "title": "Chart title", "x": "x column", "y": "y column"}
```
"#;

const ANALYZE_PROMPT: &str = r#"
Analyse the data below and provide insights.

## Data
{data_info}

## Analysis request
{message}

Present the findings as bullet points.
"#;

const SUMMARIZE_PROMPT: &str = r#"
Summarise the data below.

## Data
{data_info}

## Request
{message}

Keep the summary short and to the point.
"#;

const GENERAL_PROMPT: &str = r#"
You are a data analysis assistant. Reply to the message below.

Message: {message}

Be friendly, and point the user to what they can ask about their data.
"#;

const CHART_SPEC_PROMPT: &str = r#"
Produce a chart specification in JSON for the request below.

Available columns: {columns}
Request: {request}

Answer with JSON only:
{"type": "bar|line|pie", "title": "Title", "x": "x column", "y": "y column", "aggregation": "sum|mean|count"}
"#;

/// Replaces `{name}` placeholders in one pass. Unknown names and JSON
/// braces are left as they are.
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            vars.iter()
                .find(|(name, _)| *name == &caps[1])
                .map_or_else(|| caps[0].to_string(), |(_, value)| (*value).to_string())
        })
        .into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatPrompts {
    pub intent: String,
    pub question: String,
    pub add_chart: String,
    pub analyze: String,
    pub summarize: String,
    pub general: String,
    pub chart_spec: String,
}

impl Default for ChatPrompts {
    fn default() -> Self {
        Self {
            intent: INTENT_PROMPT.to_string(),
            question: QUESTION_PROMPT.to_string(),
            add_chart: ADD_CHART_PROMPT.to_string(),
            analyze: ANALYZE_PROMPT.to_string(),
            summarize: SUMMARIZE_PROMPT.to_string(),
            general: GENERAL_PROMPT.to_string(),
            chart_spec: CHART_SPEC_PROMPT.to_string(),
        }
    }
}

/// Every prompt the pipeline and the chat handler send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSet {
    /// Phase one. Placeholders: `{columns}`, `{sample_data}`.
    pub blueprint: String,
    /// Phase two. Placeholders: `{{BLUEPRINT}}`, `{{COLUMNS}}`.
    pub dashboard: String,
    pub chat: ChatPrompts,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            blueprint: BLUEPRINT_PROMPT.to_string(),
            dashboard: DASHBOARD_PROMPT.to_string(),
            chat: ChatPrompts::default(),
        }
    }
}

impl PromptSet {
    pub fn from_yaml_str(text: &str) -> PipelineResult<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| PipelineError::Config(format!("invalid prompt YAML: {e}")))
    }

    pub fn from_toml_str(text: &str) -> PipelineResult<Self> {
        toml::from_str(text).map_err(|e| PipelineError::Config(format!("invalid prompt TOML: {e}")))
    }

    /// Loads a prompt file, choosing the format by extension.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read prompt file {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loading prompt overrides");
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            other => Err(PipelineError::Config(format!(
                "unsupported prompt file extension {:?}",
                other.unwrap_or("")
            ))),
        }
    }

    pub fn blueprint_prompt(&self, columns: &[String], sample_csv: &str) -> String {
        fill(
            &self.blueprint,
            &[("columns", &columns.join(", ")), ("sample_data", sample_csv)],
        )
    }

    pub fn dashboard_prompt(&self, blueprint: &str, columns: &[String]) -> String {
        self.dashboard
            .replace("{{BLUEPRINT}}", blueprint)
            .replace("{{COLUMNS}}", &columns.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn fill_leaves_json_braces_and_unknown_names() {
        let out = fill(
            "m={message} {\"intent\": \"x\"} {other}",
            &[("message", "hi {data_info}"), ("data_info", "nope")],
        );
        assert_eq!(out, "m=hi {data_info} {\"intent\": \"x\"} {other}");
    }

    #[test]
    fn blueprint_prompt_lists_columns_and_sample() {
        let prompts = PromptSet::default();
        let columns = vec!["region".to_string(), "sales".to_string()];
        let prompt = prompts.blueprint_prompt(&columns, "region,sales\nEast,1\n");
        assert!(prompt.contains("- Columns: region, sales"));
        assert!(prompt.contains("region,sales\nEast,1\n"));
    }

    #[test]
    fn dashboard_prompt_keeps_json_marker() {
        let prompts = PromptSet::default();
        let prompt = prompts.dashboard_prompt("## Plan", &["a".to_string()]);
        assert!(prompt.contains("## Plan"));
        assert!(!prompt.contains("{{BLUEPRINT}}"));
        assert!(prompt.contains("{{JSON_DATA}}"));
    }

    #[test]
    fn dashboard_prompt_carries_settings_example_and_html_skeleton() {
        let prompts = PromptSet::default();
        assert!(prompts
            .dashboard
            .contains(r##"{"chartId": {"type": "...", "color": "#..."}}"##));
        assert!(prompts.dashboard.trim_end().ends_with("</html>\n```"));
    }

    #[test]
    fn yaml_overrides_merge_with_defaults() {
        let prompts = PromptSet::from_yaml_str(
            "blueprint: \"cols={columns}\"\nchat:\n  general: \"hello {message}\"\n",
        )
        .unwrap();
        assert_eq!(prompts.blueprint, "cols={columns}");
        assert_eq!(prompts.chat.general, "hello {message}");
        assert_eq!(prompts.dashboard, PromptSet::default().dashboard);
        assert_eq!(prompts.chat.intent, ChatPrompts::default().intent);
    }

    #[test]
    fn toml_file_is_loaded_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "dashboard = \"plan: {{{{BLUEPRINT}}}}\"").unwrap();
        let prompts = PromptSet::load(file.path()).unwrap();
        assert_eq!(prompts.dashboard, "plan: {{BLUEPRINT}}");
    }

    #[test]
    fn unknown_extension_is_a_config_error() {
        let file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        assert!(matches!(
            PromptSet::load(file.path()),
            Err(PipelineError::Config(_))
        ));
    }
}
