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

//! Pulling code and JSON out of free-form model replies.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

static PYTHON_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)`{3,}\s*python\s*\n(.*?)\n`{3,}").unwrap());
static HTML_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)`{3,}\s*html?\s*\n(.*?)\n`{3,}").unwrap());
static HTML_DOCUMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)(<!DOCTYPE html>.*?</html>)").unwrap());
static CHART_SPEC_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```chart_spec\s*(.*?)\s*```").unwrap());

/// Body of the first ```` ```python ```` fence, trimmed.
pub fn extract_python_code(content: &str) -> Option<String> {
    let body = PYTHON_BLOCK.captures(content)?.get(1)?.as_str().trim();
    (!body.is_empty()).then(|| body.to_string())
}

/// The HTML fence, or failing that a bare `<!DOCTYPE html>…</html>` document.
pub fn extract_html(content: &str) -> Option<String> {
    let captures = HTML_BLOCK
        .captures(content)
        .or_else(|| HTML_DOCUMENT.captures(content))?;
    let body = captures.get(1)?.as_str().trim();
    (!body.is_empty()).then(|| body.to_string())
}

/// The JSON inside a ```` ```chart_spec ```` fence, when it parses.
pub fn extract_chart_spec(content: &str) -> Option<Value> {
    let body = CHART_SPEC_BLOCK.captures(content)?.get(1)?.as_str();
    match serde_json::from_str(body) {
        Ok(spec) => Some(spec),
        Err(e) => {
            warn!(error = %e, "chart_spec block is not valid JSON");
            None
        }
    }
}

/// Best-effort JSON recovery: the whole reply, then json fences, then the
/// first balanced object or array.
pub fn extract_json_from_text(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Some(value);
    }

    for (language, body) in extract_code_blocks(text) {
        if language.as_deref().map_or(true, |lang| lang.eq_ignore_ascii_case("json")) {
            if let Ok(value) = serde_json::from_str::<Value>(&body) {
                debug!("Parsed JSON from a fenced block");
                return Some(value);
            }
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let Some(candidate) = find_json_delimiters(text, open, close) {
            if let Ok(value) = serde_json::from_str(candidate) {
                return Some(value);
            }
            debug!(candidate = candidate, "Balanced span failed to parse as JSON");
        }
    }
    None
}

fn find_json_delimiters(text: &str, open: char, close: char) -> Option<&str> {
    let mut balance = 0usize;
    let mut start = None;
    for (i, ch) in text.char_indices() {
        if ch == open {
            if balance == 0 {
                start = Some(i);
            }
            balance += 1;
        } else if ch == close && balance > 0 {
            balance -= 1;
            if balance == 0 {
                return start.map(|s| &text[s..=i]);
            }
        }
    }
    None
}

/// Every fenced block in `text` with its info-string language, if any.
pub fn extract_code_blocks(text: &str) -> Vec<(Option<String>, String)> {
    let mut blocks = Vec::new();
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let Some(info) = line.trim().strip_prefix("```") else {
            continue;
        };
        let language = Some(info.trim())
            .filter(|lang| !lang.is_empty())
            .map(str::to_string);
        let body: Vec<&str> = lines
            .by_ref()
            .take_while(|l| !l.trim().starts_with("```"))
            .collect();
        blocks.push((language, body.join("\n")));
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const REPLY: &str = "Here is the plan.\n\n### 1. Python\n```python\ndef aggregate_all_data(df):\n    return {}\n```\n\n### 2. HTML\n```html\n<!DOCTYPE html>\n<html><body></body></html>\n```\n";

    #[test]
    fn python_fence_is_trimmed() {
        assert_eq!(
            extract_python_code(REPLY).as_deref(),
            Some("def aggregate_all_data(df):\n    return {}")
        );
    }

    #[test]
    fn python_fence_tag_is_case_insensitive() {
        let reply = "````Python\nx = 1\n````";
        assert_eq!(extract_python_code(reply).as_deref(), Some("x = 1"));
        assert_eq!(extract_python_code("no code here"), None);
    }

    #[test]
    fn html_prefers_fence_then_bare_document() {
        assert_eq!(
            extract_html(REPLY).as_deref(),
            Some("<!DOCTYPE html>\n<html><body></body></html>")
        );
        let bare = "prefix <!doctype HTML><html><body>x</body></html> suffix";
        assert_eq!(
            extract_html(bare).as_deref(),
            Some("<!doctype HTML><html><body>x</body></html>")
        );
        assert_eq!(extract_html("```htm\n<p>hi</p>\n```").as_deref(), Some("<p>hi</p>"));
        assert_eq!(extract_html("nothing"), None);
    }

    #[test]
    fn chart_spec_block_parses() {
        let reply = "Chart ready.\n```chart_spec\n{\"type\": \"bar\", \"x\": \"region\"}\n```";
        assert_eq!(
            extract_chart_spec(reply),
            Some(json!({"type": "bar", "x": "region"}))
        );
        assert_eq!(extract_chart_spec("```chart_spec\n{oops\n```"), None);
    }

    #[test]
    fn json_recovered_from_fences_and_prose() {
        assert_eq!(
            extract_json_from_text("```json\n{\"intent\": \"question\"}\n```"),
            Some(json!({"intent": "question"}))
        );
        assert_eq!(
            extract_json_from_text("Sure! {\"intent\": \"add_chart\", \"entities\": []} done"),
            Some(json!({"intent": "add_chart", "entities": []}))
        );
        assert_eq!(extract_json_from_text("plain words"), None);
    }
}
