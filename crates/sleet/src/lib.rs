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

//! The dashboard pipeline: ask a model for a plan and code, run the
//! generated aggregation against the dataset in the `stele` sandbox,
//! repair it once when it fails, and splice the result into the page.

pub mod assembler;
pub mod chat;
pub mod coerce;
pub mod config;
pub mod error;
pub mod executor;
pub mod extract;
pub mod generator;
pub mod logging;
pub mod mock;
pub mod prompts;
pub mod repair;

pub use assembler::{assemble, assemble_value, CHART_SAFETY_NET_SCRIPT, DIRECT_VIEW_SCRIPT};
pub use chat::{ChatHandler, ChatMessage, ChatResponse, Intent, ResponseKind};
pub use coerce::coerce;
pub use config::PipelineConfig;
pub use error::{ExtractionFailure, PipelineError, PipelineResult};
pub use executor::{AggregationExecutor, ENTRY_POINT};
pub use generator::{AIGenerator, DashboardGenerator, GeneratedCode, GenerationResult};
pub use mock::MockGenerator;
pub use prompts::{ChatPrompts, PromptSet};
pub use repair::{format_runtime_error, format_syntax_error, RepairLoop};
