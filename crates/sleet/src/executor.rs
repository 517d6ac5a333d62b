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

//! Runs generated aggregation code against a dataset, with one repair
//! round per failure class.
//!
//! Every attempt gets a fresh interpreter and scope holding `df`, `pd`,
//! `np` and the guard functions, and runs on its own thread with a large
//! stack so deeply nested scripts hit the depth limit before the host
//! stack does. Only the coerced JSON result leaves that thread.

use crate::coerce::coerce;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::log_attempt;
use crate::repair::RepairLoop;
use estel::DataFrame;
use llm_contracts::TextGenerator;
use serde_json::Value as Json;
use stele::runtime::{dataset_value, guards, modules};
use stele::{rewrite, ErrorKind, Interpreter, Limits, RuntimeError, Scope, SyntaxError};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

pub const ENTRY_POINT: &str = "aggregate_all_data";

/// Why one attempt stopped.
#[derive(Debug, Clone)]
pub enum Failure {
    Syntax(SyntaxError),
    /// Raised while the module body itself ran.
    Module(RuntimeError),
    MissingEntryPoint,
    /// Raised by `aggregate_all_data(df)`.
    Call(RuntimeError),
}

impl Failure {
    fn terminal(self, repaired: bool) -> PipelineError {
        match self {
            Failure::Syntax(err) => PipelineError::syntax(repaired, &err),
            Failure::Module(err) | Failure::Call(err) => PipelineError::runtime(repaired, &err),
            Failure::MissingEntryPoint => PipelineError::MissingEntryPoint { repaired },
        }
    }
}

/// The namespace generated code sees.
pub fn sandbox(df: stele::Value) -> Scope {
    let scope = Scope::new();
    scope.set("df", df);
    for (alias, module) in [("pd", "pandas"), ("np", "numpy")] {
        if let Some(value) = modules::import(module) {
            scope.set(alias, value);
        }
    }
    guards::install(&scope);
    scope
}

/// Parses, runs and calls the entry point once, on the current thread.
pub fn run_attempt(source: &str, dataset: &DataFrame, limits: Limits) -> Result<Json, Failure> {
    run_tracked(source, dataset, limits, &AtomicBool::new(false))
}

/// `in_call` is raised once the module body has finished and the entry
/// point is about to run.
fn run_tracked(
    source: &str,
    dataset: &DataFrame,
    limits: Limits,
    in_call: &AtomicBool,
) -> Result<Json, Failure> {
    let module = stele::parse(source).map_err(Failure::Syntax)?;
    let df = dataset_value(dataset);
    let scope = sandbox(df.clone());
    let mut interpreter = Interpreter::new(limits);
    interpreter
        .exec_module(&module, source, &scope)
        .map_err(Failure::Module)?;

    let entry = scope
        .contains(ENTRY_POINT)
        .then(|| scope.get(ENTRY_POINT))
        .flatten()
        .ok_or(Failure::MissingEntryPoint)?;
    in_call.store(true, Ordering::SeqCst);
    let result = interpreter.call(&entry, vec![df]).map_err(Failure::Call)?;
    debug!(gas_left = interpreter.gas(), "Entry point returned");
    Ok(coerce(&result))
}

/// Classifies a worker panic by the phase it interrupted.
fn worker_panic(in_call: bool, payload: &(dyn Any + Send)) -> Failure {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    let err = RuntimeError::new(
        ErrorKind::RuntimeError,
        format!("aggregation worker panicked: {detail}"),
    );
    if in_call {
        Failure::Call(err)
    } else {
        Failure::Module(err)
    }
}

pub struct AggregationExecutor<'g> {
    repair: RepairLoop<'g>,
    limits: Limits,
    stack_size: usize,
}

impl<'g> AggregationExecutor<'g> {
    pub fn new(generator: &'g dyn TextGenerator) -> Self {
        Self::with_config(generator, &PipelineConfig::default())
    }

    pub fn with_config(generator: &'g dyn TextGenerator, config: &PipelineConfig) -> Self {
        Self {
            repair: RepairLoop::new(generator),
            limits: config.limits(),
            stack_size: config.stack_size_mib.max(1) * 1024 * 1024,
        }
    }

    /// Runs `code` against `dataset`. `code` as generated, never its
    /// rewritten form, is what a repair request carries.
    pub fn execute(&self, code: &str, dataset: &DataFrame) -> PipelineResult<Json> {
        let (failure, syntax_repaired) = match self.attempt(1, code, dataset) {
            Ok(result) => return Ok(result),
            Err(Failure::Syntax(err)) => {
                let Some(fixed) = self.repair.repair_syntax(code, &err) else {
                    return Err(PipelineError::syntax(false, &err));
                };
                match self.attempt(2, &fixed, dataset) {
                    Ok(result) => return Ok(result),
                    Err(failure) => (failure, true),
                }
            }
            Err(failure) => (failure, false),
        };

        let Failure::Call(err) = failure else {
            return Err(failure.terminal(syntax_repaired));
        };
        let Some(fixed) = self.repair.repair_runtime(code, &err, dataset) else {
            return Err(PipelineError::runtime(syntax_repaired, &err));
        };
        match self.attempt(3, &fixed, dataset) {
            Ok(result) => Ok(result),
            // The syntax repair is still unspent when the first draft parsed.
            Err(Failure::Syntax(err)) if !syntax_repaired => {
                let Some(refixed) = self.repair.repair_syntax(&fixed, &err) else {
                    return Err(PipelineError::syntax(true, &err));
                };
                self.attempt(4, &refixed, dataset)
                    .map_err(|failure| failure.terminal(true))
            }
            Err(failure) => Err(failure.terminal(true)),
        }
    }

    fn attempt(&self, attempt: u8, code: &str, dataset: &DataFrame) -> Result<Json, Failure> {
        let source = rewrite(code);
        log_attempt(attempt, source.lines().count());
        let limits = self.limits;
        let in_call = AtomicBool::new(false);
        std::thread::scope(|s| {
            let spawned = std::thread::Builder::new()
                .name(format!("aggregate-{attempt}"))
                .stack_size(self.stack_size)
                .spawn_scoped(s, || run_tracked(&source, dataset, limits, &in_call));
            match spawned {
                Ok(handle) => handle.join().unwrap_or_else(|payload| {
                    Err(worker_panic(in_call.load(Ordering::SeqCst), payload.as_ref()))
                }),
                Err(e) => {
                    warn!(error = %e, "Could not spawn aggregation thread, running inline");
                    run_attempt(&source, dataset, limits)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estel::CsvReader;
    use serde_json::json;

    fn dataset() -> DataFrame {
        CsvReader::new()
            .read_str("region,sales\nEast,10\nWest,15\nEast,5\n", "t")
            .unwrap()
    }

    #[test]
    fn attempt_returns_coerced_result() {
        let code = "def aggregate_all_data(df):\n    return {'total': df['sales'].sum(), 'regions': df['region'].unique().tolist()}\n";
        let out = run_attempt(&rewrite(code), &dataset(), Limits::default()).unwrap();
        assert_eq!(out, json!({"total": 30, "regions": ["East", "West"]}));
    }

    #[test]
    fn attempt_classifies_failures() {
        let limits = Limits::default();
        assert!(matches!(
            run_attempt("def f(:\n", &dataset(), limits),
            Err(Failure::Syntax(_))
        ));
        assert!(matches!(
            run_attempt("import os\n", &dataset(), limits),
            Err(Failure::Module(err)) if err.kind == ErrorKind::ModuleNotFoundError
        ));
        assert!(matches!(
            run_attempt("x = 1\n", &dataset(), limits),
            Err(Failure::MissingEntryPoint)
        ));
        assert!(matches!(
            run_attempt("def aggregate_all_data(df):\n    return df['nope']\n", &dataset(), limits),
            Err(Failure::Call(err)) if err.kind == ErrorKind::KeyError
        ));
    }

    #[test]
    fn worker_panic_is_classified_by_phase() {
        let payload: Box<dyn Any + Send> = Box::new("capacity overflow");
        assert!(matches!(
            worker_panic(true, payload.as_ref()),
            Failure::Call(err) if err.message == "aggregation worker panicked: capacity overflow"
        ));
        let payload: Box<dyn Any + Send> = Box::new(String::from("bad module"));
        assert!(matches!(worker_panic(false, payload.as_ref()), Failure::Module(_)));
    }

    #[test]
    fn oversized_allocation_in_entry_point_is_a_call_failure() {
        let code = "def aggregate_all_data(df):\n    return len('ab' * (2 ** 62))\n";
        assert!(matches!(
            run_attempt(code, &dataset(), Limits::default()),
            Err(Failure::Call(err)) if err.kind == ErrorKind::MemoryError
        ));
    }

    #[test]
    fn scope_carries_guards_and_namespaces() {
        let scope = sandbox(stele::Value::None);
        for name in ["df", "pd", "np", stele::SAFE_TOLIST, stele::SAFE_MUL, stele::SAFE_FILLNA] {
            assert!(scope.contains(name), "{name} missing");
        }
    }

    #[test]
    fn module_level_mutation_of_df_does_not_leak_between_attempts() {
        let data = dataset();
        let code = "df['sales'] = df['sales'] * 0\ndef aggregate_all_data(df):\n    return int(df['sales'].sum())\n";
        assert_eq!(run_attempt(code, &data, Limits::default()).unwrap(), json!(0));
        let clean = "def aggregate_all_data(df):\n    return int(df['sales'].sum())\n";
        assert_eq!(run_attempt(clean, &data, Limits::default()).unwrap(), json!(30));
    }
}
