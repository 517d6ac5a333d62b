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

pub mod builtins;
pub mod convert;
pub mod format;
pub mod frame;
pub mod groupby;
pub mod guards;
pub mod interpreter;
pub mod methods;
pub mod modules;
pub mod ops;
pub mod series;
pub mod value;

pub use convert::{dataset_value, frame_from_dataset};
pub use format::{repr, timestamp_str, to_str};
pub use frame::Frame;
pub use groupby::GroupBy;
pub use guards::native_list;
pub use interpreter::{Interpreter, Limits, Scope};
pub use methods::get_attribute;
pub use series::Series;
pub use value::{CallArgs, Dict, Key, Value};
