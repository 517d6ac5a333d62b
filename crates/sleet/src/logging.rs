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

use tracing::{debug, info, warn};

/// Which failure class a repair was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairKind {
    Syntax,
    Runtime,
}

impl RepairKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RepairKind::Syntax => "syntax",
            RepairKind::Runtime => "runtime",
        }
    }
}

pub fn log_step_started(step: u8, total: u8, message: &str) {
    info!(step = step, total = total, "{message}");
}

pub fn log_attempt(attempt: u8, source_lines: usize) {
    debug!(
        attempt = attempt,
        source_lines = source_lines,
        "Running aggregation attempt"
    );
}

pub fn log_repair_requested(kind: RepairKind, diagnostic: &str) {
    info!(
        repair = kind.as_str(),
        diagnostic = diagnostic,
        "Requesting repaired aggregation code"
    );
}

pub fn log_repair_outcome(kind: RepairKind, repaired: bool) {
    if repaired {
        info!(repair = kind.as_str(), "Model returned repaired code");
    } else {
        warn!(repair = kind.as_str(), "Model returned no usable repair");
    }
}

pub fn log_coercion_degraded(type_name: &str, rendered: &str) {
    warn!(
        value_type = type_name,
        rendered = rendered,
        "Result value has no JSON form, serialising its repr"
    );
}
