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

//! Splices aggregated data into the generated dashboard page.

use crate::coerce::coerce;
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use serde_json::Value as Json;
use tracing::{debug, warn};

/// Loads the icon set, pins Chart.js defaults and makes sure the palette
/// helpers exist even when the generated page forgot them.
pub const CHART_SAFETY_NET_SCRIPT: &str = r#"
<script src="https://unpkg.com/lucide@latest"></script>
<script>
(function () {
    try {
        if (window.lucide && typeof window.lucide.createIcons === 'function') {
            window.lucide.createIcons();
        }
        if (window.Chart && window.Chart.defaults) {
            Chart.defaults.color = '#cbd5e1';
            Chart.defaults.borderColor = '#334155';
            Chart.defaults.font.family = "'DM Sans', sans-serif";
        }
        if (typeof window.ORACLE_COLORS === 'undefined') {
            window.ORACLE_COLORS = [
                '#38bdf8', '#fbbf24', '#818cf8', '#34d399', '#f472b6',
                '#2dd4bf', '#a78bfa', '#fb923c', '#9ca3af', '#60a5fa'
            ];
        }
        if (typeof window.assignOracleColors !== 'function') {
            window.assignOracleColors = function (chartData, index) {
                const colors = window.ORACLE_COLORS;
                const color = colors[(index || 0) % colors.length];
                (chartData.datasets || []).forEach(function (ds) {
                    if (ds.type === 'pie' || ds.type === 'doughnut') {
                        ds.backgroundColor = ds.backgroundColor || colors;
                        ds.borderColor = ds.borderColor || '#1e293b';
                    } else {
                        ds.backgroundColor = ds.backgroundColor || color;
                        ds.borderColor = ds.borderColor || color;
                    }
                });
                return chartData;
            };
        }
    } catch (e) {
        console.error('Chart.js Safety Net Error:', e);
    }
})();
</script>
"#;

/// Renders the charts once the page has loaded, keeping any existing handler.
pub const DIRECT_VIEW_SCRIPT: &str = r#"
<script>
(function () {
    const previousOnload = window.onload;
    window.onload = function (event) {
        if (typeof previousOnload === 'function') {
            previousOnload.call(window, event);
        }
        console.log('Direct View: Dashboard initialized');
        if (typeof renderCharts === 'function') {
            renderCharts();
        }
    };
})();
</script>
"#;

static JSON_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*JSON_DATA\s*\}\}").unwrap());
static DATA_ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(const\s+dashboardData\s*=\s*)(.*?)(\s*;)").unwrap());
static LOOSE_ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"const\s+dashboardData\s*=").unwrap());

/// Inserts `script` before the last `</body>`, or appends it when there is none.
fn inject_script(html: &str, script: &str) -> String {
    match html.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + script.len());
            out.push_str(&html[..pos]);
            out.push_str(script);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}{script}"),
    }
}

/// Substitutes `data` into `template` and appends the support scripts.
pub fn assemble(template: &str, data: &Json) -> String {
    let json = serde_json::to_string(data).unwrap_or_else(|e| {
        warn!(error = %e, "Could not serialise dashboard data, injecting null");
        "null".to_string()
    });

    let html = if JSON_MARKER.is_match(template) {
        debug!("Replacing JSON_DATA markers");
        JSON_MARKER.replace_all(template, NoExpand(&json)).into_owned()
    } else if let Some(caps) = DATA_ASSIGNMENT.captures(template) {
        debug!("Replacing existing dashboardData assignment");
        let (Some(whole), Some(head), Some(tail)) = (caps.get(0), caps.get(1), caps.get(3)) else {
            return inject_support(template.to_string());
        };
        format!(
            "{}{}{json}{}{}",
            &template[..whole.start()],
            head.as_str(),
            tail.as_str(),
            &template[whole.end()..]
        )
    } else if LOOSE_ASSIGNMENT.is_match(template) {
        warn!("dashboardData assignment has no terminator, overriding it");
        let replacement = format!("// replaced\nconst dashboardData = {json}; //");
        LOOSE_ASSIGNMENT
            .replace(template, NoExpand(&replacement))
            .into_owned()
    } else {
        debug!("No injection point found, adding a data script");
        inject_script(
            template,
            &format!("<script>const dashboardData = {json};</script>"),
        )
    };

    inject_support(html)
}

fn inject_support(html: String) -> String {
    let html = inject_script(&html, CHART_SAFETY_NET_SCRIPT);
    inject_script(&html, DIRECT_VIEW_SCRIPT)
}

/// Coerces a raw script value before assembling.
pub fn assemble_value(template: &str, result: &stele::Value) -> String {
    assemble(template, &coerce(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn marker_is_replaced_verbatim_and_scripts_added_once() {
        let template = "<html><body><script>const dashboardData = {{JSON_DATA}};</script></body></html>";
        let html = assemble(template, &json!({"k": "v"}));
        assert!(html.contains(r#"const dashboardData = {"k":"v"};"#));
        assert_eq!(count(&html, "Chart.js Safety Net Error"), 1);
        assert_eq!(count(&html, "Direct View: Dashboard initialized"), 1);
        assert!(html.ends_with("</script>\n</body></html>"));
    }

    #[test]
    fn palette_helper_keeps_colours_set_by_the_dashboard() {
        assert!(CHART_SAFETY_NET_SCRIPT.contains("ds.backgroundColor = ds.backgroundColor || color;"));
        assert!(CHART_SAFETY_NET_SCRIPT.contains("ds.borderColor = ds.borderColor || '#1e293b';"));
        assert!(!CHART_SAFETY_NET_SCRIPT.contains("ds.backgroundColor = colors;"));
    }

    #[test]
    fn every_marker_is_replaced_including_spaced_ones() {
        let template = "<p>{{ JSON_DATA }}</p><p>{{JSON_DATA}}</p>";
        let html = assemble(template, &json!([1, 2]));
        assert_eq!(count(&html, "[1,2]"), 2);
        assert!(!html.contains("JSON_DATA"));
    }

    #[test]
    fn existing_assignment_is_overwritten() {
        let template = "<body><script>\nconst dashboardData = {\n  kpi: {}\n};\nrender();\n</script></body>";
        let html = assemble(template, &json!({"kpi": {"total": 1}}));
        assert!(html.contains(r#"const dashboardData = {"kpi":{"total":1}};"#));
        assert!(html.contains("render();"));
        assert!(!html.contains("kpi: {}"));
    }

    #[test]
    fn unterminated_assignment_is_commented_out() {
        let template = "<script>const dashboardData = loadIt()</script>";
        let html = assemble(template, &json!({"a": 1}));
        assert!(html.starts_with("<script>// replaced\nconst dashboardData = {\"a\":1}; // loadIt()"));
    }

    #[test]
    fn missing_everything_still_defines_data() {
        let html = assemble("<div>plain</div>", &json!({"a": null}));
        assert!(html.contains(r#"<script>const dashboardData = {"a":null};</script>"#));
        assert!(html.starts_with("<div>plain</div>"));
    }

    #[test]
    fn data_script_lands_before_body_close() {
        let html = assemble("<body><h1>x</h1></body>", &json!(1));
        let data = html.find("const dashboardData = 1;").unwrap();
        let safety = html.find("Chart.js Safety Net Error").unwrap();
        let direct = html.find("Direct View").unwrap();
        let close = html.find("</body>").unwrap();
        assert!(data < safety && safety < direct && direct < close);
    }

    #[test]
    fn non_ascii_is_preserved_and_dollar_signs_are_literal() {
        let html = assemble("{{JSON_DATA}}", &json!({"地域": "$1 東京"}));
        assert!(html.starts_with(r#"{"地域":"$1 東京"}"#));
    }
}
