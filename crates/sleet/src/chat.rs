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

//! Conversational follow-ups on a loaded dataset.
//!
//! Chart requests never run generated code: the model only names the
//! columns and aggregation, and the grouping happens here.

use crate::extract::{extract_chart_spec, extract_json_from_text};
use crate::prompts::{fill, ChatPrompts};
use estel::{Column, ColumnData, DataFrame};
use indexmap::IndexMap;
use llm_contracts::TextGenerator;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use std::cmp::Ordering;
use std::str::FromStr;
use tracing::{debug, warn};

/// History entries kept when building a context.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Question,
    AddChart,
    Analyze,
    Summarize,
    General,
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "question" => Ok(Intent::Question),
            "add_chart" => Ok(Intent::AddChart),
            "analyze" => Ok(Intent::Analyze),
            "summarize" => Ok(Intent::Summarize),
            "general" => Ok(Intent::General),
            other => Err(format!("unknown intent '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Text,
    Chart,
    Insight,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub content: String,
    pub chart_spec: Option<Json>,
    pub chart_html: Option<String>,
    pub data: Option<Json>,
}

impl ChatResponse {
    fn new(kind: ResponseKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            chart_spec: None,
            chart_html: None,
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatContext {
    pub data_summary: String,
    pub columns: String,
    pub chat_history: Vec<ChatMessage>,
}

/// Row count, columns and sum/mean/min/max of every numeric column.
pub fn data_info(dataset: &DataFrame) -> String {
    let mut stats = Map::new();
    for (name, column) in dataset.iter_columns() {
        if !column.data_type().is_numeric() {
            continue;
        }
        let values = estel::data_handler::profile::numeric_values(column);
        let sum: f64 = values.iter().sum();
        let mean = (!values.is_empty()).then(|| sum / values.len() as f64);
        stats.insert(
            name.to_string(),
            json!({
                "sum": sum,
                "mean": mean,
                "min": values.iter().copied().reduce(f64::min),
                "max": values.iter().copied().reduce(f64::max),
            }),
        );
    }
    format!(
        "\nRows: {}\nColumns: {}\nNumeric column statistics: {}\n",
        dataset.row_count(),
        dataset.column_names().join(", "),
        Json::Object(stats)
    )
}

pub fn build_context(dataset: &DataFrame, history: &[ChatMessage]) -> ChatContext {
    let keep = history.len().saturating_sub(HISTORY_LIMIT);
    ChatContext {
        data_summary: format!(
            "Rows: {}, columns: {}",
            dataset.row_count(),
            dataset.column_count()
        ),
        columns: dataset.column_names().join(", "),
        chat_history: history[keep..].to_vec(),
    }
}

/// Group key for chart data. Numeric columns sort by value, others by text.
struct Label {
    json: Json,
    number: Option<f64>,
    text: String,
}

fn label_at(column: &Column, row: usize) -> Option<Label> {
    let text = column.get_string(row)?;
    let json = match column {
        Column::Int64(data) => json!(data.get(row).copied().flatten()?),
        Column::Float64(data) => {
            let value = data.get(row).copied().flatten().filter(|v| !v.is_nan())?;
            json!(value)
        }
        Column::Boolean(data) => json!(data.get(row).copied().flatten()?),
        Column::String(_) => Json::String(text.clone()),
    };
    Some(Label {
        json,
        number: column.data_type().is_numeric().then(|| column.to_f64(row)).flatten(),
        text,
    })
}

#[derive(Default)]
struct Bucket {
    sum: f64,
    numeric: usize,
    count: usize,
}

/// Groups `x` and aggregates `y` by `aggregation` (sum, mean or count;
/// anything else sums). Unknown columns yield empty series.
pub fn generate_chart_data(spec: &Json, dataset: &DataFrame) -> Json {
    let empty = json!({"labels": [], "values": []});
    let (Some(x), Some(y)) = (
        spec.get("x").and_then(Json::as_str),
        spec.get("y").and_then(Json::as_str),
    ) else {
        return empty;
    };
    let (Some(x_col), Some(y_col)) = (dataset.get_column(x), dataset.get_column(y)) else {
        debug!(x = x, y = y, "Chart spec names unknown columns");
        return empty;
    };
    let aggregation = spec
        .get("aggregation")
        .and_then(Json::as_str)
        .unwrap_or("sum");

    let mut groups: IndexMap<String, (Label, Bucket)> = IndexMap::new();
    for row in 0..dataset.row_count() {
        let Some(label) = label_at(x_col, row) else {
            continue;
        };
        let (_, bucket) = groups
            .entry(label.text.clone())
            .or_insert_with(|| (label, Bucket::default()));
        if y_col.get_string(row).is_some() {
            bucket.count += 1;
        }
        if let Some(v) = y_col.to_f64(row).filter(|v| !v.is_nan()) {
            bucket.sum += v;
            bucket.numeric += 1;
        }
    }

    let mut groups: Vec<(Label, Bucket)> = groups.into_values().collect();
    groups.sort_by(|(a, _), (b, _)| match (a.number, b.number) {
        (Some(l), Some(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => a.text.cmp(&b.text),
    });

    let integral = matches!(y_col, Column::Int64(_) | Column::Boolean(_));
    let (labels, values): (Vec<Json>, Vec<Json>) = groups
        .into_iter()
        .map(|(label, bucket)| {
            let value = match aggregation {
                "count" => json!(bucket.count),
                "mean" if bucket.numeric == 0 => Json::Null,
                "mean" => json!(bucket.sum / bucket.numeric as f64),
                _ if integral => json!(bucket.sum as i64),
                _ => json!(bucket.sum),
            };
            (label.json, value)
        })
        .unzip();
    json!({"labels": labels, "values": values})
}

fn escape_html(text: &str) -> String {
    htmlescape::encode_minimal(text).replace('\'', "&#x27;")
}

/// JSON safe to embed inside a `<script>` element.
fn script_json(value: &Json) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "[]".to_string())
        .replace("</", "<\\/")
}

/// A standalone Chart.js snippet for one extra chart.
pub fn generate_chart_html(spec: &Json, data: &Json) -> String {
    let chart_type = escape_html(spec.get("type").and_then(Json::as_str).unwrap_or("bar"));
    let title = escape_html(spec.get("title").and_then(Json::as_str).unwrap_or("Chart"));
    let labels = script_json(data.get("labels").unwrap_or(&Json::Array(Vec::new())));
    let values = script_json(data.get("values").unwrap_or(&Json::Array(Vec::new())));
    format!(
        r#"
<div style="width: 100%; max-width: 600px;">
    <canvas id="additionalChart"></canvas>
    <script>
        new Chart(document.getElementById('additionalChart'), {{
            type: '{chart_type}',
            data: {{
                labels: {labels},
                datasets: [{{
                    label: '{title}',
                    data: {values},
                    backgroundColor: 'rgba(54, 162, 235, 0.5)',
                    borderColor: 'rgba(54, 162, 235, 1)',
                    borderWidth: 1
                }}]
            }},
            options: {{
                responsive: true,
                plugins: {{
                    title: {{
                        display: true,
                        text: '{title}'
                    }}
                }}
            }}
        }});
    </script>
</div>
"#
    )
}

pub struct ChatHandler<G> {
    generator: G,
    prompts: ChatPrompts,
}

impl<G: TextGenerator> ChatHandler<G> {
    pub fn new(generator: G) -> Self {
        Self::with_prompts(generator, ChatPrompts::default())
    }

    pub fn with_prompts(generator: G, prompts: ChatPrompts) -> Self {
        Self { generator, prompts }
    }

    /// Falls back to [`Intent::General`] whenever the reply is unusable.
    pub fn classify_intent(&self, message: &str) -> Intent {
        let prompt = fill(&self.prompts.intent, &[("message", message)]);
        let reply = match self.generator.generate(&prompt) {
            Ok(reply) => reply.text,
            Err(e) => {
                warn!(error = %e, "Intent classification failed");
                return Intent::General;
            }
        };
        extract_json_from_text(&reply)
            .as_ref()
            .and_then(|value| value.get("intent"))
            .and_then(Json::as_str)
            .and_then(|intent| intent.parse().ok())
            .unwrap_or(Intent::General)
    }

    pub fn handle_message(&self, message: &str, dataset: Option<&DataFrame>) -> ChatResponse {
        let intent = self.classify_intent(message);
        debug!(intent = ?intent, "Dispatching chat message");
        let info = dataset.map(data_info).unwrap_or_default();
        match intent {
            Intent::Question => self.reply(
                ResponseKind::Text,
                &self.prompts.question,
                &[("data_info", &info), ("message", message)],
            ),
            Intent::AddChart => self.add_chart(message, dataset),
            Intent::Analyze => self.reply(
                ResponseKind::Insight,
                &self.prompts.analyze,
                &[("data_info", &info), ("message", message)],
            ),
            Intent::Summarize => self.reply(
                ResponseKind::Text,
                &self.prompts.summarize,
                &[("data_info", &info), ("message", message)],
            ),
            Intent::General => {
                self.reply(ResponseKind::Text, &self.prompts.general, &[("message", message)])
            }
        }
    }

    fn reply(&self, kind: ResponseKind, template: &str, vars: &[(&str, &str)]) -> ChatResponse {
        match self.generator.generate(&fill(template, vars)) {
            Ok(reply) => ChatResponse::new(kind, reply.text),
            Err(e) => ChatResponse::new(ResponseKind::Error, e.to_string()),
        }
    }

    fn add_chart(&self, message: &str, dataset: Option<&DataFrame>) -> ChatResponse {
        let columns = dataset
            .map(|df| format!("{:?}", df.column_names()))
            .unwrap_or_else(|| "[]".to_string());
        let mut response = self.reply(
            ResponseKind::Chart,
            &self.prompts.add_chart,
            &[("columns", &columns), ("message", message)],
        );
        if response.kind != ResponseKind::Chart {
            return response;
        }
        response.chart_spec = extract_chart_spec(&response.content);
        if let (Some(spec), Some(df)) = (&response.chart_spec, dataset) {
            let data = generate_chart_data(spec, df);
            response.chart_html = Some(generate_chart_html(spec, &data));
            response.data = Some(data);
        }
        response
    }

    /// A chart spec for `request`, or a bar chart of the first two columns.
    pub fn generate_chart_spec(&self, request: &str, columns: &[String]) -> Json {
        let prompt = fill(
            &self.prompts.chart_spec,
            &[("columns", &format!("{columns:?}")), ("request", request)],
        );
        let parsed = self
            .generator
            .generate(&prompt)
            .ok()
            .and_then(|reply| extract_json_from_text(&reply.text))
            .filter(Json::is_object);
        parsed.unwrap_or_else(|| {
            let first = columns.first();
            json!({
                "type": "bar",
                "title": request,
                "x": first,
                "y": columns.get(1).or(first),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estel::CsvReader;
    use llm_contracts::{FnGenerator, GeneratedText, LLMError};

    fn sales() -> DataFrame {
        CsvReader::new()
            .read_str(
                "region,product,sales\nWest,Widget,15000\nEast,Widget,10000\nEast,Gadget,12000\nWest,Gadget,8000\nWest,Widget,20000\n",
                "sales",
            )
            .unwrap()
    }

    fn replying(text: &'static str) -> FnGenerator<impl Fn(&str) -> llm_contracts::LLMResult<GeneratedText>> {
        FnGenerator::new("canned", move |_: &str| Ok(GeneratedText::new(text)))
    }

    #[test]
    fn intent_parses_json_and_defaults_to_general() {
        let handler = ChatHandler::new(replying(r#"{"intent": "add_chart", "entities": ["sales"]}"#));
        assert_eq!(handler.classify_intent("show sales"), Intent::AddChart);
        let handler = ChatHandler::new(replying("I think it's a question"));
        assert_eq!(handler.classify_intent("?"), Intent::General);
        let handler = ChatHandler::new(replying(r#"{"intent": "dance"}"#));
        assert_eq!(handler.classify_intent("?"), Intent::General);
    }

    #[test]
    fn data_info_reports_numeric_stats() {
        let info = data_info(&sales());
        assert!(info.contains("Rows: 5\n"));
        assert!(info.contains("Columns: region, product, sales\n"));
        assert!(info.contains(r#""sales":{"sum":65000.0,"mean":13000.0,"min":8000.0,"max":20000.0}"#));
        assert!(!info.contains("\"region\""));
    }

    #[test]
    fn context_keeps_last_ten_messages() {
        let history: Vec<ChatMessage> = (0..12)
            .map(|i| ChatMessage {
                role: "user".into(),
                content: format!("m{i}"),
            })
            .collect();
        let context = build_context(&sales(), &history);
        assert_eq!(context.chat_history.len(), 10);
        assert_eq!(context.chat_history[0].content, "m2");
        assert_eq!(context.columns, "region, product, sales");
        assert_eq!(context.data_summary, "Rows: 5, columns: 3");
    }

    #[test]
    fn chart_data_groups_sorted_keys() {
        let df = sales();
        let sum = generate_chart_data(&json!({"x": "region", "y": "sales"}), &df);
        assert_eq!(sum, json!({"labels": ["East", "West"], "values": [22000, 43000]}));
        let mean = generate_chart_data(
            &json!({"x": "region", "y": "sales", "aggregation": "mean"}),
            &df,
        );
        assert_eq!(mean["values"], json!([11000.0, 43000.0 / 3.0]));
        let count = generate_chart_data(
            &json!({"x": "product", "y": "sales", "aggregation": "count"}),
            &df,
        );
        assert_eq!(count, json!({"labels": ["Gadget", "Widget"], "values": [2, 3]}));
    }

    #[test]
    fn chart_data_with_unknown_column_is_empty() {
        let out = generate_chart_data(&json!({"x": "region", "y": "profit"}), &sales());
        assert_eq!(out, json!({"labels": [], "values": []}));
    }

    #[test]
    fn chart_html_escapes_title() {
        let html = generate_chart_html(
            &json!({"type": "line", "title": "Sales <b>'24</b> & more"}),
            &json!({"labels": ["a</script>"], "values": [1]}),
        );
        assert!(html.contains("type: 'line'"));
        assert!(html.contains("label: 'Sales &lt;b&gt;&#x27;24&lt;/b&gt; &amp; more'"));
        assert!(html.contains(r#"labels: ["a<\/script>"]"#));
        assert!(html.contains("id=\"additionalChart\""));
    }

    #[test]
    fn chart_spec_falls_back_to_first_columns() {
        let handler = ChatHandler::new(replying("sorry, no JSON today"));
        let columns = vec!["region".to_string(), "sales".to_string()];
        assert_eq!(
            handler.generate_chart_spec("sales by region", &columns),
            json!({"type": "bar", "title": "sales by region", "x": "region", "y": "sales"})
        );
        let single = vec!["only".to_string()];
        assert_eq!(handler.generate_chart_spec("r", &single)["y"], "only");
    }

    #[test]
    fn add_chart_builds_spec_data_and_html() {
        let handler = ChatHandler::new(FnGenerator::new("chart", |prompt: &str| {
            if prompt.contains("Classify") {
                Ok(GeneratedText::new(r#"{"intent": "add_chart"}"#))
            } else {
                Ok(GeneratedText::new(
                    "Chart created.\n\n```chart_spec\n{\"type\": \"bar\", \"title\": \"By region\", \"x\": \"region\", \"y\": \"sales\"}\n```",
                ))
            }
        }));
        let response = handler.handle_message("show sales by region", Some(&sales()));
        assert_eq!(response.kind, ResponseKind::Chart);
        assert_eq!(response.chart_spec.as_ref().unwrap()["x"], "region");
        assert_eq!(response.data.as_ref().unwrap()["values"], json!([22000, 43000]));
        assert!(response.chart_html.unwrap().contains("By region"));
    }

    #[test]
    fn generator_failure_becomes_error_response() {
        let handler = ChatHandler::new(FnGenerator::new("down", |_: &str| {
            Err(LLMError::Network("refused".into()))
        }));
        let response = handler.handle_message("hello", None);
        assert_eq!(response.kind, ResponseKind::Error);
        assert!(response.content.contains("refused"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["type"], "error");
    }
}
