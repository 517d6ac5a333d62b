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

//! A sandboxed engine for model-generated aggregation scripts.
//!
//! Scripts are written in a Python subset and run against an in-memory
//! dataset through a pandas-like API. The engine has no I/O; its only
//! capabilities are the dataset, the `pandas`/`numpy`/`math` namespaces,
//! the builtins and the guard functions installed by [`runtime::guards`].
//! Every run is bounded by a step budget and a call-depth limit.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod rewrite;
pub mod runtime;
pub mod unparse;

pub use error::{ErrorKind, RtResult, RuntimeError, ScriptError, SyntaxError, TraceFrame};
pub use parser::{parse, parse_expression};
pub use rewrite::{rewrite, CodeRewriter, RewriteStats, SAFE_FILLNA, SAFE_MUL, SAFE_TOLIST};
pub use runtime::{Interpreter, Limits, Scope, Value};
pub use unparse::unparse;
