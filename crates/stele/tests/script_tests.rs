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
use estel::CsvReader;
use stele::runtime::{dataset_value, guards, modules, repr};
use stele::{rewrite, ErrorKind, Interpreter, Limits, RuntimeError, Scope, ScriptError};

const SALES_CSV: &str = "\
region,product,sales,date
East,Widget,10000,2024-01-15
West,Widget,15000,2024-02-03
East,Gadget,12000,2024-02-20
West,Gadget,8000,2024-03-11
West,Widget,20000,2024-03-30
";

fn sandbox() -> Result<Scope> {
    let dataset = CsvReader::new().read_str(SALES_CSV, "sales")?;
    let scope = Scope::new();
    scope.set("df", dataset_value(&dataset));
    for (alias, module) in [("pd", "pandas"), ("np", "numpy")] {
        if let Some(value) = modules::import(module) {
            scope.set(alias, value);
        }
    }
    guards::install(&scope);
    Ok(scope)
}

/// Runs `source` and renders the `result` binding it leaves behind.
fn run(source: &str) -> Result<String> {
    let scope = sandbox()?;
    Interpreter::new(Limits::default()).run(source, &scope)?;
    let result = scope
        .get("result")
        .ok_or_else(|| anyhow::anyhow!("script did not bind `result`"))?;
    Ok(repr(&result))
}

fn runtime_error(source: &str, limits: Limits) -> RuntimeError {
    let scope = sandbox().unwrap();
    match Interpreter::new(limits).run(source, &scope) {
        Err(ScriptError::Runtime(err)) => err,
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[test]
fn test_total_sales() -> Result<()> {
    assert_eq!(run("result = df['sales'].sum()")?, "65000");
    Ok(())
}

#[test]
fn test_entry_point_builds_nested_result() -> Result<()> {
    let source = r#"
def aggregate_all_data(df):
    by_region = df.groupby('region')['sales'].sum()
    return {
        "kpi": {"total": int(df["sales"].sum()), "orders": len(df)},
        "regions": by_region.to_dict(),
    }

result = aggregate_all_data(df)
"#;
    assert_eq!(
        run(source)?,
        "{'kpi': {'total': 65000, 'orders': 5}, 'regions': {'East': 22000, 'West': 43000}}"
    );
    Ok(())
}

#[test]
fn test_boolean_filtering_and_comprehension() -> Result<()> {
    let source = r#"
big = df[df['sales'] > 11000]
result = [p for p in big['product'].tolist() if p != 'Gadget']
"#;
    assert_eq!(run(source)?, "['Widget', 'Widget']");
    Ok(())
}

#[test]
fn test_fstring_number_formatting() -> Result<()> {
    assert_eq!(run("result = f\"{1234.5:,.1f} / {0.256:.1%}\"")?, "'1,234.5 / 25.6%'");
    Ok(())
}

#[test]
fn test_sorted_with_lambda_key() -> Result<()> {
    let source = r#"
totals = {'a': 3, 'b': 7, 'c': 5}
result = [k for k, v in sorted(totals.items(), key=lambda kv: -kv[1])]
"#;
    assert_eq!(run(source)?, "['b', 'c', 'a']");
    Ok(())
}

#[test]
fn test_datetime_accessor() -> Result<()> {
    let source = r#"
dates = pd.to_datetime(df['date'])
result = dates.dt.month.tolist()
"#;
    assert_eq!(run(source)?, "[1, 2, 2, 3, 3]");
    Ok(())
}

#[test]
fn test_except_catches_missing_column() -> Result<()> {
    let source = r#"
try:
    df['profit']
    result = 'found'
except KeyError as e:
    result = 'missing'
"#;
    assert_eq!(run(source)?, "'missing'");
    Ok(())
}

#[test]
fn test_rewritten_calls_tolerate_scalars() -> Result<()> {
    let source = rewrite("total = df['sales'].sum()\nresult = [total.tolist(), total.mul(2)]");
    assert!(source.contains("_safe_tolist(total)"));
    assert_eq!(run(&source)?, "[65000, 130000]");
    Ok(())
}

#[test]
fn test_traceback_names_generated_frames() {
    let source = "def ratio(a, b):\n    return a / b\n\nresult = ratio(1, 0)\n";
    let err = runtime_error(source, Limits::default());
    assert_eq!(err.kind, ErrorKind::ZeroDivisionError);
    let traceback = err.format_traceback();
    assert!(traceback.contains("File \"<generated>\", line 4, in <module>"));
    assert!(traceback.contains("File \"<generated>\", line 2, in ratio"));
}

#[test]
fn test_step_budget_stops_runaway_loops() {
    let limits = Limits {
        max_steps: 10_000,
        ..Limits::default()
    };
    let err = runtime_error("while True:\n    pass\n", limits);
    assert_eq!(err.kind, ErrorKind::ExecutionLimitExceeded);
}

#[test]
fn test_unbounded_recursion_is_reported() {
    let handle = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(|| runtime_error("def f(n):\n    return f(n + 1)\n\nf(0)\n", Limits::default()))
        .unwrap();
    let err = handle.join().unwrap();
    assert_eq!(err.kind, ErrorKind::RecursionError);
}

#[test]
fn test_only_known_modules_import() {
    let err = runtime_error("import os\n", Limits::default());
    assert_eq!(err.kind, ErrorKind::ModuleNotFoundError);
    assert_eq!(err.message, "No module named 'os'");
}

#[test]
fn test_syntax_error_reports_position() -> Result<()> {
    let scope = sandbox()?;
    match Interpreter::new(Limits::default()).run("def f(:\n    pass\n", &scope) {
        Err(ScriptError::Syntax(err)) => {
            assert_eq!(err.line, 1);
            assert_eq!(err.line_text, "def f(:");
        }
        other => panic!("expected a syntax error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_script_mutation_stays_in_its_scope() -> Result<()> {
    let source = r#"
df['double'] = df['sales'] * 2
result = list(df.columns)
"#;
    assert_eq!(run(source)?, "['region', 'product', 'sales', 'date', 'double']");
    assert_eq!(run("result = list(df.columns)")?, "['region', 'product', 'sales', 'date']");
    Ok(())
}

#[test]
fn test_blank_lines_and_comments_between_functions() -> Result<()> {
    let source = "\
import pandas as pd


def helper(x):
    return x * 2

# entry point
def aggregate_all_data(df):
    total = df['sales'].sum()

    # doubled for the headline figure
    return {'total': helper(total)}

result = aggregate_all_data(df)
";
    assert_eq!(run(source)?, "{'total': 130000}");
    Ok(())
}

#[test]
fn test_sequence_repetition_spends_the_step_budget() {
    let err = runtime_error("n = len([0] * 6000000)\n", Limits::default());
    assert_eq!(err.kind, ErrorKind::ExecutionLimitExceeded);
}

#[test]
fn test_oversized_repetition_is_a_memory_error() {
    let err = runtime_error("s = 'ab' * (2 ** 62)\n", Limits::default());
    assert_eq!(err.kind, ErrorKind::MemoryError);
}

#[test]
fn test_raised_runtime_error_keeps_its_kind() {
    let err = runtime_error("raise RuntimeError('boom')\n", Limits::default());
    assert_eq!(err.kind, ErrorKind::RuntimeError);
    assert_eq!(err.summary(), "RuntimeError: boom");
}

#[test]
fn test_guarded_fillna_leaves_the_source_frame_alone() -> Result<()> {
    let source = rewrite(
        "df['region'] = df['region'].astype('category')\n\
         filled = df.fillna('North')\n\
         result = [len(df['region'].cat.categories), len(filled['region'].cat.categories)]\n",
    );
    assert!(source.contains("_safe_fillna(df, 'North')"));
    assert_eq!(run(&source)?, "[2, 3]");
    Ok(())
}

#[test]
fn test_guarded_fillna_inplace_extends_the_source_frame() -> Result<()> {
    let source = rewrite(
        "df['region'] = df['region'].astype('category')\n\
         df.fillna('North', inplace=True)\n\
         result = len(df['region'].cat.categories)\n",
    );
    assert_eq!(run(&source)?, "3");
    Ok(())
}
