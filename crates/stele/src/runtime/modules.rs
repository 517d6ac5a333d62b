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

//! The importable namespaces: `pandas`, `numpy` and `math`.

use crate::error::{RtResult, RuntimeError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::rc::Rc;

use super::builtins::{builtin, float_value, int_value};
use super::format::{repr, to_str};
use super::frame::{self, Frame};
use super::interpreter::Interpreter;
use super::ops::{self, round_half_even};
use super::series::{self, range_index, Series};
use super::value::{CallArgs, ModuleObject, NativeFn, Value};

pub fn import(name: &str) -> Option<Value> {
    let (name, attrs): (&'static str, Vec<(&'static str, Value)>) = match name {
        "pandas" => ("pandas", pandas()),
        "numpy" => ("numpy", numpy()),
        "math" => ("math", math()),
        _ => return None,
    };
    Some(Value::Module(Rc::new(ModuleObject {
        name,
        attrs: attrs.into_iter().collect::<HashMap<_, _>>(),
    })))
}

fn functions(table: &[(&'static str, NativeFn)]) -> Vec<(&'static str, Value)> {
    table.iter().map(|&(name, func)| (name, builtin(name, func))).collect()
}

fn pandas() -> Vec<(&'static str, Value)> {
    let mut attrs = functions(&[
        ("to_datetime", to_datetime),
        ("to_timedelta", to_timedelta),
        ("to_numeric", to_numeric),
        ("isna", isna),
        ("isnull", isna),
        ("notna", notna),
        ("notnull", notna),
        ("Series", series_new),
        ("DataFrame", frame_new),
        ("Timestamp", timestamp_new),
        ("Timedelta", timedelta_new),
        ("concat", concat),
    ]);
    attrs.push(("NA", Value::None));
    attrs.push(("NaT", Value::None));
    attrs
}

fn numpy() -> Vec<(&'static str, Value)> {
    let mut attrs = functions(&[
        ("mean", np_mean),
        ("average", np_mean),
        ("sum", np_sum),
        ("median", np_median),
        ("std", np_std),
        ("var", np_var),
        ("min", np_min),
        ("max", np_max),
        ("nanmean", np_nanmean),
        ("nansum", np_nansum),
        ("nanmedian", np_nanmedian),
        ("nanmin", np_nanmin),
        ("nanmax", np_nanmax),
        ("sqrt", np_sqrt),
        ("log", np_log),
        ("log10", np_log10),
        ("log2", np_log2),
        ("log1p", np_log1p),
        ("exp", np_exp),
        ("floor", np_floor),
        ("ceil", np_ceil),
        ("abs", np_abs),
        ("round", np_round),
        ("isnan", np_isnan),
        ("where", np_where),
        ("array", np_array),
        ("unique", np_unique),
        ("percentile", np_percentile),
        ("arange", np_arange),
        ("int64", np_int),
        ("integer", np_int),
        ("float64", np_float),
        ("floating", np_float),
        ("number", np_float),
        ("bool_", np_bool),
    ]);
    attrs.extend([
        ("nan", Value::Float(f64::NAN)),
        ("NaN", Value::Float(f64::NAN)),
        ("inf", Value::Float(f64::INFINITY)),
        ("pi", Value::Float(std::f64::consts::PI)),
        ("e", Value::Float(std::f64::consts::E)),
    ]);
    attrs
}

fn math() -> Vec<(&'static str, Value)> {
    let mut attrs = functions(&[
        ("sqrt", math_sqrt),
        ("floor", math_floor),
        ("ceil", math_ceil),
        ("trunc", math_trunc),
        ("log", math_log),
        ("log10", math_log10),
        ("log2", math_log2),
        ("exp", math_exp),
        ("pow", math_pow),
        ("fabs", math_fabs),
        ("isnan", math_isnan),
        ("isinf", math_isinf),
        ("isfinite", math_isfinite),
        ("isclose", math_isclose),
        ("fsum", math_fsum),
    ]);
    attrs.extend([
        ("pi", Value::Float(std::f64::consts::PI)),
        ("e", Value::Float(std::f64::consts::E)),
        ("inf", Value::Float(f64::INFINITY)),
        ("nan", Value::Float(f64::NAN)),
    ]);
    attrs
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S%.f",
    "%Y年%m月%d日 %H:%M:%S",
    "%Y年%m月%d日 %H:%M",
    "%Y年%m月%d日 %H時%M分",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%Y.%m.%d",
    "%Y年%m月%d日",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%m/%d/%y",
];

fn parse_with(text: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, format)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Parses the date and datetime spellings found in business CSVs. With a
/// `format`, only that pattern is tried.
pub fn parse_datetime(text: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Some(format) = format.filter(|f| !matches!(*f, "mixed" | "ISO8601")) {
        return parse_with(text, format).or_else(|| {
            if format.contains("%d") {
                None
            } else {
                parse_with(&format!("{text}-01"), &format!("{format}-%d"))
            }
        });
    }
    if let Ok(aware) = DateTime::parse_from_rfc3339(text) {
        return Some(aware.naive_local());
    }
    if let Ok(aware) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%z") {
        return Some(aware.naive_local());
    }
    let text = text.strip_suffix('Z').unwrap_or(text);
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    if text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y%m%d") {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    for (suffix, format) in [("-01", "%Y-%m-%d"), ("/01", "%Y/%m/%d"), ("1日", "%Y年%m月%d日")] {
        if let Ok(date) = NaiveDate::parse_from_str(&format!("{text}{suffix}"), format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    if text.len() == 4 {
        if let Ok(year) = text.parse::<i32>() {
            return NaiveDate::from_ymd_opt(year, 1, 1).map(|d| d.and_time(NaiveTime::MIN));
        }
    }
    None
}

fn unit_nanos(unit: &str) -> Option<f64> {
    Some(match unit {
        "W" | "w" | "week" | "weeks" => 604_800e9,
        "D" | "d" | "day" | "days" => 86_400e9,
        "h" | "H" | "hr" | "hour" | "hours" => 3_600e9,
        "m" | "min" | "mins" | "minute" | "minutes" | "T" => 60e9,
        "s" | "S" | "sec" | "secs" | "second" | "seconds" => 1e9,
        "ms" | "L" | "milli" | "millis" | "millisecond" | "milliseconds" => 1e6,
        "us" | "U" | "micro" | "micros" | "microsecond" | "microseconds" => 1e3,
        "ns" | "N" | "nano" | "nanos" | "nanosecond" | "nanoseconds" => 1.0,
        _ => return None,
    })
}

fn from_epoch(amount: f64, unit: &str) -> Option<NaiveDateTime> {
    let nanos = amount * unit_nanos(unit)?;
    if !nanos.is_finite() {
        return None;
    }
    let seconds = (nanos / 1e9).floor();
    let remainder = (nanos - seconds * 1e9).round() as u32;
    DateTime::from_timestamp(seconds as i64, remainder.min(999_999_999)).map(|d| d.naive_utc())
}

fn errors_mode(args: &CallArgs) -> RtResult<&str> {
    match args.get_some(usize::MAX, "errors") {
        None => Ok("raise"),
        Some(Value::Str(mode)) if matches!(mode.as_ref(), "raise" | "coerce" | "ignore") => Ok(mode.as_ref()),
        Some(_) => Err(RuntimeError::value_error(
            "errors must be one of 'ignore', 'raise', or 'coerce'",
        )),
    }
}

fn keyword_str<'a>(args: &'a CallArgs, name: &str) -> Option<&'a str> {
    args.keyword(name).and_then(Value::as_str)
}

fn convert_datetime(value: &Value, format: Option<&str>, unit: Option<&str>, errors: &str) -> RtResult<Value> {
    let parsed = match value {
        v if v.is_missing() => return Ok(Value::None),
        Value::Timestamp(_) => return Ok(value.clone()),
        Value::Str(s) if matches!(s.trim(), "" | "NaT" | "nan" | "None") => return Ok(Value::None),
        Value::Str(s) => parse_datetime(s, format),
        Value::Int(_) | Value::Float(_) => value.as_f64().and_then(|n| from_epoch(n, unit.unwrap_or("ns"))),
        _ => None,
    };
    match (parsed, errors) {
        (Some(ts), _) => Ok(Value::Timestamp(ts)),
        (None, "coerce") => Ok(Value::None),
        (None, "ignore") => Ok(value.clone()),
        (None, _) => Err(RuntimeError::value_error(match (value, format) {
            (Value::Str(s), Some(format)) => {
                format!("time data \"{s}\" doesn't match format \"{format}\"")
            }
            (Value::Str(s), None) => format!("Unknown datetime string format, unable to parse: {s}"),
            (other, _) => format!("Given date string {} not likely a datetime", repr(other)),
        })),
    }
}

/// Applies `convert` across a column-like argument, keeping the shape of
/// the input: Series stay Series, lists become an Index, scalars stay
/// scalar.
fn map_column(
    interp: &mut Interpreter,
    arg: &Value,
    mut convert: impl FnMut(&Value) -> RtResult<Value>,
) -> RtResult<Value> {
    match arg {
        Value::Series(s) => {
            interp.consume_gas(s.len() as u64)?;
            let values = s.values.iter().map(&mut convert).collect::<RtResult<Vec<_>>>()?;
            Ok(Value::series(s.with_values(values)))
        }
        Value::List(_) | Value::Tuple(_) | Value::Index(_) => {
            let items = ops::iterate(arg)?;
            interp.consume_gas(items.len() as u64)?;
            let values = items.iter().map(&mut convert).collect::<RtResult<Vec<_>>>()?;
            Ok(Value::Index(Rc::new(values)))
        }
        scalar => convert(scalar),
    }
}

fn to_datetime(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let arg = args.require(0, "arg", "to_datetime")?.clone();
    let errors = errors_mode(&args)?;
    let format = keyword_str(&args, "format");
    let unit = keyword_str(&args, "unit");
    if let Value::Frame(_) = arg {
        return Err(RuntimeError::value_error(
            "to assemble mappings requires at least that [year, month, day] be specified",
        ));
    }
    map_column(interp, &arg, |v| convert_datetime(v, format, unit, errors))
}

/// Parses `"1 days"`, `"2 days 03:00:00"`, `"30min"` and similar spans.
fn parse_timedelta(text: &str) -> Option<f64> {
    let mut total = 0.0;
    let mut pending: Option<f64> = None;
    let mut matched = false;
    for token in text.split_whitespace() {
        if token.contains(':') {
            let mut nanos = 0.0;
            for (part, scale) in token.split(':').zip([3_600e9, 60e9, 1e9]) {
                nanos += part.parse::<f64>().ok()? * scale;
            }
            total += nanos;
            matched = true;
            continue;
        }
        let split = token
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(token.len());
        let (number, unit) = token.split_at(split);
        match (number.is_empty(), unit.is_empty()) {
            (false, true) => pending = Some(number.parse().ok()?),
            (false, false) => {
                total += number.parse::<f64>().ok()? * unit_nanos(unit)?;
                matched = true;
            }
            (true, false) => {
                total += pending.take()? * unit_nanos(unit)?;
                matched = true;
            }
            (true, true) => {}
        }
    }
    if let Some(number) = pending {
        total += number;
        matched = true;
    }
    matched.then_some(total)
}

fn delta_from_nanos(nanos: f64) -> RtResult<TimeDelta> {
    if !nanos.is_finite() || nanos.abs() > 9.2e18 {
        return Err(RuntimeError::value_error("Timedelta value is out of bounds"));
    }
    Ok(TimeDelta::nanoseconds(nanos.round() as i64))
}

fn convert_timedelta(value: &Value, unit: &str) -> RtResult<Value> {
    match value {
        v if v.is_missing() => Ok(Value::None),
        Value::Timedelta(_) => Ok(value.clone()),
        Value::Int(_) | Value::Float(_) => {
            let scale = unit_nanos(unit)
                .ok_or_else(|| RuntimeError::value_error(format!("invalid unit abbreviation: {unit}")))?;
            let amount = value.as_f64().unwrap_or(0.0);
            Ok(Value::Timedelta(delta_from_nanos(amount * scale)?))
        }
        Value::Str(s) => parse_timedelta(s)
            .ok_or_else(|| RuntimeError::value_error(format!("unit abbreviation w/o a number: {s}")))
            .and_then(delta_from_nanos)
            .map(Value::Timedelta),
        other => Err(RuntimeError::value_error(format!(
            "Invalid type for timedelta scalar: {}",
            other.type_name()
        ))),
    }
}

fn to_timedelta(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let arg = args.require(0, "arg", "to_timedelta")?.clone();
    let unit = keyword_str(&args, "unit").unwrap_or("ns").to_string();
    map_column(interp, &arg, |v| convert_timedelta(v, &unit))
}

fn timedelta_new(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    if let Some(value) = args.get_some(0, "value") {
        let unit = args.get(1, "unit").and_then(Value::as_str).unwrap_or("ns");
        return convert_timedelta(value, unit);
    }
    let mut nanos = 0.0;
    for (name, amount) in &args.keywords {
        let scale = unit_nanos(name).ok_or_else(|| {
            RuntimeError::type_error(format!("Timedelta() got an unexpected keyword argument '{name}'"))
        })?;
        nanos += float_value(amount)? * scale;
    }
    delta_from_nanos(nanos).map(Value::Timedelta)
}

fn timestamp_new(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    if let Some(value) = args.get_some(0, "ts_input") {
        let unit = keyword_str(&args, "unit");
        return convert_datetime(value, None, unit, "raise");
    }
    let part = |name: &str, default: i64| args.int(usize::MAX, name, default);
    let date = NaiveDate::from_ymd_opt(part("year", 1970)? as i32, part("month", 1)? as u32, part("day", 1)? as u32);
    let time = NaiveTime::from_hms_opt(part("hour", 0)? as u32, part("minute", 0)? as u32, part("second", 0)? as u32);
    match (date, time) {
        (Some(date), Some(time)) => Ok(Value::Timestamp(date.and_time(time))),
        _ => Err(RuntimeError::value_error("day is out of range for month")),
    }
}

fn numeric_value(value: &Value, errors: &str) -> RtResult<Value> {
    match value {
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => Ok(value.clone()),
        Value::None => Ok(Value::Float(f64::NAN)),
        Value::Str(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(Value::Int(i));
            }
            match float_value(value) {
                Ok(f) if !trimmed.is_empty() => Ok(Value::Float(f)),
                _ => match errors {
                    "coerce" => Ok(Value::Float(f64::NAN)),
                    "ignore" => Ok(value.clone()),
                    _ => Err(RuntimeError::value_error(format!(
                        "Unable to parse string \"{s}\""
                    ))),
                },
            }
        }
        other => match errors {
            "coerce" => Ok(Value::Float(f64::NAN)),
            "ignore" => Ok(other.clone()),
            _ => Err(RuntimeError::type_error(format!(
                "Invalid object type {}",
                other.type_name()
            ))),
        },
    }
}

/// Integers widen to floats once any element is fractional or missing.
fn widen(values: Vec<Value>) -> Vec<Value> {
    if !values.iter().any(|v| matches!(v, Value::Float(_))) {
        return values;
    }
    values
        .into_iter()
        .map(|v| match v {
            Value::Int(i) => Value::Float(i as f64),
            other => other,
        })
        .collect()
}

fn to_numeric(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let arg = args.require(0, "arg", "to_numeric")?.clone();
    let errors = errors_mode(&args)?;
    match map_column(interp, &arg, |v| numeric_value(v, errors))? {
        Value::Series(s) => Ok(Value::series(s.with_values(widen(s.values.clone())))),
        Value::Index(items) => Ok(Value::series(Series::new(None, widen(items.as_ref().clone())))),
        scalar => Ok(scalar),
    }
}

fn missing_flags(interp: &mut Interpreter, args: CallArgs, missing: bool) -> RtResult<Value> {
    let arg = args.require(0, "obj", if missing { "isna" } else { "notna" })?.clone();
    match &arg {
        Value::Frame(f) => {
            frame::call_method(interp, f, if missing { "isna" } else { "notna" }, CallArgs::default())
        }
        Value::Series(_) | Value::List(_) | Value::Tuple(_) | Value::Index(_) => {
            match map_column(interp, &arg, |v| Ok(Value::Bool(v.is_missing() == missing)))? {
                Value::Index(items) => Ok(Value::series(Series::new(None, items.as_ref().clone()))),
                other => Ok(other),
            }
        }
        scalar => Ok(Value::Bool(scalar.is_missing() == missing)),
    }
}

fn isna(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    missing_flags(interp, args, true)
}

fn notna(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    missing_flags(interp, args, false)
}

fn series_new(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let data = args.get_some(0, "data");
    let labels = args.get_some(1, "index").map(ops::iterate).transpose()?;
    let name = args.get_some(3, "name").map(to_str);
    let (values, index) = match data {
        None => {
            let len = labels.as_ref().map_or(0, Vec::len);
            (vec![Value::Float(f64::NAN); len], labels.clone())
        }
        Some(Value::Dict(mapping)) => {
            let mapping = mapping.borrow();
            match &labels {
                Some(labels) => {
                    let values = labels
                        .iter()
                        .map(|l| Ok(mapping.get(l)?.unwrap_or(Value::Float(f64::NAN))))
                        .collect::<RtResult<Vec<_>>>()?;
                    (values, Some(labels.clone()))
                }
                None => (mapping.values(), Some(mapping.keys())),
            }
        }
        Some(Value::Series(source)) => match &labels {
            Some(labels) => {
                let mut values = Vec::with_capacity(labels.len());
                for label in labels {
                    values.push(match source.position_of(label)? {
                        Some(p) => source.values[p].clone(),
                        None => Value::Float(f64::NAN),
                    });
                }
                (values, Some(labels.clone()))
            }
            None => (source.values.clone(), Some(source.index.as_ref().clone())),
        },
        Some(list @ (Value::List(_) | Value::Tuple(_) | Value::Index(_))) => {
            (ops::iterate(list)?, labels.clone())
        }
        Some(scalar) => {
            let len = labels.as_ref().map_or(1, Vec::len);
            (vec![scalar.clone(); len], labels.clone())
        }
    };
    interp.consume_gas(values.len() as u64)?;
    let index = match index {
        Some(index) if index.len() != values.len() => {
            return Err(RuntimeError::value_error(format!(
                "Length of values ({}) does not match length of index ({})",
                values.len(),
                index.len()
            )))
        }
        Some(index) => Rc::new(index),
        None => range_index(values.len()),
    };
    let mut out = Series::with_index(name, values, index);
    if let Some(dtype) = args.get_some(2, "dtype") {
        out = series::astype(&out, &series::dtype_name(dtype)?)?;
    }
    Ok(Value::series(out))
}

fn frame_new(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let frame = frame::construct(args.get_some(0, "data"), args.get_some(usize::MAX, "columns"))?;
    interp.consume_gas((frame.len() * frame.columns.len().max(1)) as u64)?;
    Ok(Value::frame(frame))
}

fn concat(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let objs = ops::iterate(args.require(0, "objs", "concat")?)?;
    let axis = match args.get_some(1, "axis") {
        Some(Value::Str(s)) if s.as_ref() == "columns" => 1,
        Some(value) => value.as_i64().unwrap_or(0),
        None => 0,
    };
    let ignore_index = args.flag(usize::MAX, "ignore_index", false)?;
    if objs.is_empty() {
        return Err(RuntimeError::value_error("No objects to concatenate"));
    }
    let frames = objs
        .iter()
        .enumerate()
        .map(|(i, obj)| match obj {
            Value::Frame(f) => Ok(f.borrow().clone()),
            Value::Series(s) => {
                let name = s.name.clone().unwrap_or_else(|| i.to_string());
                let mut frame = Frame::from_columns(vec![(name, s.values.clone())], s.index.clone());
                frame.index_names = s.index_names.clone();
                Ok(frame)
            }
            other => Err(RuntimeError::type_error(format!(
                "cannot concatenate object of type '{}'; only Series and DataFrame objs are valid",
                other.type_name()
            ))),
        })
        .collect::<RtResult<Vec<_>>>()?;
    interp.consume_gas(frames.iter().map(|f| f.len() * f.columns.len().max(1)).sum::<usize>() as u64)?;
    if axis == 1 {
        let first = &frames[0];
        let mut columns = Vec::new();
        for frame in &frames {
            if frame.len() != first.len() {
                return Err(RuntimeError::value_error(
                    "all objects must have the same length for axis=1 concatenation",
                ));
            }
            columns.extend(frame.columns.iter().map(|(k, c)| (k.clone(), c.values.clone())));
        }
        return Ok(Value::frame(Frame::from_columns(columns, first.index.clone())));
    }
    let all_series = objs.iter().all(|o| matches!(o, Value::Series(_)));
    let total: usize = frames.iter().map(Frame::len).sum();
    let mut index = Vec::with_capacity(total);
    let mut columns: IndexMap<String, Vec<Value>> = IndexMap::new();
    let mut filled = 0;
    for frame in &frames {
        index.extend(frame.index.iter().cloned());
        for (name, column) in &frame.columns {
            let name = if all_series { "0".to_string() } else { name.clone() };
            let target = columns
                .entry(name)
                .or_insert_with(|| vec![Value::Float(f64::NAN); filled]);
            target.extend(column.values.iter().cloned());
        }
        filled += frame.len();
        for target in columns.values_mut() {
            target.resize(filled, Value::Float(f64::NAN));
        }
    }
    let index = if ignore_index { range_index(total) } else { Rc::new(index) };
    if all_series {
        let names: Vec<Option<String>> = objs
            .iter()
            .map(|o| match o {
                Value::Series(s) => s.name.clone(),
                _ => None,
            })
            .collect();
        let name = names.first().cloned().flatten().filter(|n| names.iter().all(|m| m.as_ref() == Some(n)));
        let values = columns.into_values().next().unwrap_or_default();
        return Ok(Value::series(Series::with_index(name, values, index)));
    }
    Ok(Value::frame(Frame::from_columns(columns.into_iter().collect(), index)))
}

/// Elements of a column-like argument; scalars count as one element.
fn elements(value: &Value) -> RtResult<Vec<Value>> {
    match value {
        Value::Series(s) => Ok(s.values.clone()),
        Value::List(_) | Value::Tuple(_) | Value::Index(_) => ops::iterate(value),
        scalar => Ok(vec![scalar.clone()]),
    }
}

fn numpy_reduce(interp: &mut Interpreter, args: CallArgs, func: &'static str) -> RtResult<Value> {
    let target = args.require(0, "a", func)?.clone();
    let ddof = args.int(usize::MAX, "ddof", 0)?.max(0) as usize;
    let skip_missing = func.starts_with("nan");
    let base = func.trim_start_matches("nan");
    match &target {
        Value::Series(s) => {
            interp.consume_gas(s.len() as u64)?;
            series::aggregate(s, base, ddof)
        }
        Value::Frame(f) => frame::call_method(
            interp,
            f,
            base,
            CallArgs::default().with_keyword("ddof", Value::Int(ddof as i64)),
        ),
        other => {
            let values = elements(other)?;
            interp.consume_gas(values.len() as u64)?;
            if !skip_missing && values.iter().any(Value::is_missing) {
                return Ok(Value::Float(f64::NAN));
            }
            let result = series::aggregate(&Series::new(None, values), base, ddof)?;
            Ok(match (base, result) {
                ("mean" | "median" | "std" | "var", Value::Int(i)) => Value::Float(i as f64),
                (_, result) => result,
            })
        }
    }
}

macro_rules! reducers {
    ($($name:ident => $func:literal),* $(,)?) => {
        $(
            fn $name(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
                numpy_reduce(interp, args, $func)
            }
        )*
    };
}

reducers! {
    np_mean => "mean",
    np_sum => "sum",
    np_median => "median",
    np_std => "std",
    np_var => "var",
    np_min => "min",
    np_max => "max",
    np_nanmean => "nanmean",
    np_nansum => "nansum",
    np_nanmedian => "nanmedian",
    np_nanmin => "nanmin",
    np_nanmax => "nanmax",
}

fn apply_float(value: &Value, func: &str, f: fn(f64) -> f64) -> RtResult<Value> {
    if value.is_missing() {
        return Ok(Value::Float(f64::NAN));
    }
    value.as_f64().map(|x| Value::Float(f(x))).ok_or_else(|| {
        RuntimeError::type_error(format!(
            "ufunc '{func}' not supported for the input types"
        ))
    })
}

fn numpy_map(
    interp: &mut Interpreter,
    args: &CallArgs,
    func: &str,
    convert: impl Fn(&Value) -> RtResult<Value>,
) -> RtResult<Value> {
    let target = args.require(0, "x", func)?.clone();
    match map_column(interp, &target, convert)? {
        Value::Index(items) => Ok(Value::series(Series::new(None, items.as_ref().clone()))),
        other => Ok(other),
    }
}

macro_rules! ufuncs {
    ($($name:ident => $func:literal, $op:expr);* $(;)?) => {
        $(
            fn $name(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
                numpy_map(interp, &args, $func, |v| apply_float(v, $func, $op))
            }
        )*
    };
}

ufuncs! {
    np_sqrt => "sqrt", f64::sqrt;
    np_log => "log", f64::ln;
    np_log10 => "log10", f64::log10;
    np_log2 => "log2", f64::log2;
    np_log1p => "log1p", f64::ln_1p;
    np_exp => "exp", f64::exp;
    np_floor => "floor", f64::floor;
    np_ceil => "ceil", f64::ceil;
}

fn np_abs(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    numpy_map(interp, &args, "absolute", |v| match v {
        Value::Int(i) => Ok(Value::Int(i.saturating_abs())),
        Value::Bool(b) => Ok(Value::Bool(*b)),
        other => apply_float(other, "absolute", f64::abs),
    })
}

fn np_round(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let digits = args.int(1, "decimals", 0)?;
    numpy_map(interp, &args, "round", |v| match v {
        Value::Int(i) if digits >= 0 => Ok(Value::Int(*i)),
        other => apply_float(other, "round", |x| x).map(|rounded| match rounded {
            Value::Float(x) => Value::Float(round_half_even(x, digits as i32)),
            other => other,
        }),
    })
}

fn np_isnan(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    numpy_map(interp, &args, "isnan", |v| Ok(Value::Bool(v.is_missing())))
}

fn np_where(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let condition = args.require(0, "condition", "where")?;
    let chosen = args.require(1, "x", "where")?;
    let other = args.require(2, "y", "where")?;
    let flags = elements(condition)?;
    interp.consume_gas(flags.len() as u64)?;
    let pick = |source: &Value, i: usize| -> Value {
        match source {
            Value::Series(s) => s.values.get(i).cloned().unwrap_or(Value::Float(f64::NAN)),
            Value::List(items) => items.borrow().get(i).cloned().unwrap_or(Value::Float(f64::NAN)),
            Value::Tuple(items) => items.get(i).cloned().unwrap_or(Value::Float(f64::NAN)),
            scalar => scalar.clone(),
        }
    };
    let mut values = Vec::with_capacity(flags.len());
    for (i, flag) in flags.iter().enumerate() {
        let take = !flag.is_missing() && flag.truthy()?;
        values.push(if take { pick(chosen, i) } else { pick(other, i) });
    }
    match condition {
        Value::Series(s) => Ok(Value::series(Series::with_index(None, widen(values), s.index.clone()))),
        Value::List(_) | Value::Tuple(_) | Value::Index(_) => Ok(Value::series(Series::new(None, widen(values)))),
        _ => Ok(values.into_iter().next().unwrap_or(Value::None)),
    }
}

fn np_array(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let values = elements(args.require(0, "object", "array")?)?;
    interp.consume_gas(values.len() as u64)?;
    let mut out = Series::new(None, values);
    if let Some(dtype) = args.get_some(usize::MAX, "dtype") {
        out = series::astype(&out, &series::dtype_name(dtype)?)?;
    }
    Ok(Value::series(out))
}

fn np_unique(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let values = elements(args.require(0, "ar", "unique")?)?;
    interp.consume_gas(values.len() as u64)?;
    let unique = series::unique_values(&values)?;
    let order = ops::sort_positions(&[unique.as_slice()], &[true])?;
    Ok(Value::series(Series::new(
        None,
        order.into_iter().map(|p| unique[p].clone()).collect(),
    )))
}

fn np_percentile(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let values = elements(args.require(0, "a", "percentile")?)?;
    let q = args.require(1, "q", "percentile")?;
    let fraction = |q: &Value| -> RtResult<Value> {
        q.as_f64()
            .map(|q| Value::Float(q / 100.0))
            .ok_or_else(|| RuntimeError::type_error("percentile q must be numeric"))
    };
    let q = match q {
        Value::List(_) | Value::Tuple(_) | Value::Series(_) => {
            Value::list(elements(q)?.iter().map(fraction).collect::<RtResult<Vec<_>>>()?)
        }
        scalar => fraction(scalar)?,
    };
    let column = Rc::new(Series::new(None, values));
    series::call_method(interp, &column, "quantile", CallArgs::new(vec![q]))
}

fn np_arange(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let bounds: Vec<Value> = args.positional.clone();
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (Value::Int(0), stop.clone(), Value::Int(1)),
        [start, stop] => (start.clone(), stop.clone(), Value::Int(1)),
        [start, stop, step] => (start.clone(), stop.clone(), step.clone()),
        _ => return Err(RuntimeError::type_error("arange() requires stop to be specified.")),
    };
    let integral = [&start, &stop, &step].iter().all(|v| matches!(v, Value::Int(_)));
    let (a, b, s) = match (start.as_f64(), stop.as_f64(), step.as_f64()) {
        (Some(a), Some(b), Some(s)) if s != 0.0 => (a, b, s),
        (_, _, Some(s)) if s == 0.0 => return Err(RuntimeError::zero_division("division by zero")),
        _ => return Err(RuntimeError::type_error("arange() arguments must be numeric")),
    };
    let count = ((b - a) / s).ceil().max(0.0) as u64;
    interp.consume_gas(count)?;
    let values = (0..count)
        .map(|i| {
            let x = a + i as f64 * s;
            if integral {
                Value::Int(x as i64)
            } else {
                Value::Float(x)
            }
        })
        .collect();
    Ok(Value::series(Series::new(None, values)))
}

fn np_int(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    args.get(0, "x").map_or(Ok(Value::Int(0)), int_value)
}

fn np_float(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    args.get(0, "x")
        .map_or(Ok(0.0), float_value)
        .map(Value::Float)
}

fn np_bool(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    args.get(0, "x").map_or(Ok(false), Value::truthy).map(Value::Bool)
}

fn real(args: &CallArgs, index: usize, name: &str, func: &str) -> RtResult<f64> {
    let value = args.require(index, name, func)?;
    match value {
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => Ok(value.as_f64().unwrap_or(f64::NAN)),
        other => Err(RuntimeError::type_error(format!(
            "must be real number, not {}",
            other.type_name()
        ))),
    }
}

fn domain_error() -> RuntimeError {
    RuntimeError::value_error("math domain error")
}

fn math_sqrt(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let x = real(&args, 0, "x", "sqrt")?;
    if x < 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(x.sqrt()))
}

fn integral(x: f64) -> RtResult<Value> {
    int_value(&Value::Float(x))
}

fn math_floor(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    match args.require(0, "x", "floor")? {
        Value::Int(i) => Ok(Value::Int(*i)),
        _ => integral(real(&args, 0, "x", "floor")?.floor()),
    }
}

fn math_ceil(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    match args.require(0, "x", "ceil")? {
        Value::Int(i) => Ok(Value::Int(*i)),
        _ => integral(real(&args, 0, "x", "ceil")?.ceil()),
    }
}

fn math_trunc(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    integral(real(&args, 0, "x", "trunc")?.trunc())
}

fn math_log(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let x = real(&args, 0, "x", "log")?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    match args.get_some(1, "base") {
        Some(_) => {
            let base = real(&args, 1, "base", "log")?;
            if base <= 0.0 || base == 1.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(x.ln() / base.ln()))
        }
        None => Ok(Value::Float(x.ln())),
    }
}

fn math_log10(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let x = real(&args, 0, "x", "log10")?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(x.log10()))
}

fn math_log2(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let x = real(&args, 0, "x", "log2")?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(x.log2()))
}

fn math_exp(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let x = real(&args, 0, "x", "exp")?;
    let y = x.exp();
    if y.is_infinite() && x.is_finite() {
        return Err(RuntimeError::value_error("math range error"));
    }
    Ok(Value::Float(y))
}

fn math_pow(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let x = real(&args, 0, "x", "pow")?;
    let y = real(&args, 1, "y", "pow")?;
    if x < 0.0 && y.fract() != 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(x.powf(y)))
}

fn math_fabs(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    Ok(Value::Float(real(&args, 0, "x", "fabs")?.abs()))
}

fn math_isnan(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    Ok(Value::Bool(real(&args, 0, "x", "isnan")?.is_nan()))
}

fn math_isinf(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    Ok(Value::Bool(real(&args, 0, "x", "isinf")?.is_infinite()))
}

fn math_isfinite(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    Ok(Value::Bool(real(&args, 0, "x", "isfinite")?.is_finite()))
}

fn math_isclose(_: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let a = real(&args, 0, "a", "isclose")?;
    let b = real(&args, 1, "b", "isclose")?;
    let rel = args.keyword("rel_tol").and_then(Value::as_f64).unwrap_or(1e-9);
    let abs = args.keyword("abs_tol").and_then(Value::as_f64).unwrap_or(0.0);
    Ok(Value::Bool(
        a == b || (a - b).abs() <= (rel * a.abs().max(b.abs())).max(abs),
    ))
}

fn math_fsum(interp: &mut Interpreter, args: CallArgs) -> RtResult<Value> {
    let items = ops::iterate(args.require(0, "seq", "fsum")?)?;
    interp.consume_gas(items.len() as u64)?;
    let mut total = 0.0;
    for item in &items {
        total += item.as_f64().ok_or_else(|| {
            RuntimeError::type_error(format!(
                "must be real number, not {}",
                item.type_name()
            ))
        })?;
    }
    Ok(Value::Float(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::runtime::interpreter::Limits;

    fn attr(module: &str, name: &str) -> Value {
        match import(module) {
            Some(Value::Module(m)) => m.attrs[name].clone(),
            _ => panic!("{module} is importable"),
        }
    }

    fn call(module: &str, name: &str, args: CallArgs) -> RtResult<Value> {
        let mut interp = Interpreter::new(Limits::default());
        interp.call_value(&attr(module, name), args)
    }

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_time(NaiveTime::MIN)
    }

    #[test]
    fn only_three_namespaces_are_importable() {
        assert!(import("pandas").is_some());
        assert!(import("numpy").is_some());
        assert!(import("math").is_some());
        assert!(import("os").is_none());
    }

    #[test]
    fn parse_datetime_accepts_common_spellings() {
        assert_eq!(parse_datetime("2024-01-31", None), Some(ts(2024, 1, 31)));
        assert_eq!(parse_datetime("2024/01/31", None), Some(ts(2024, 1, 31)));
        assert_eq!(parse_datetime("01/31/2024", None), Some(ts(2024, 1, 31)));
        assert_eq!(parse_datetime("2024年1月31日", None), Some(ts(2024, 1, 31)));
        assert_eq!(parse_datetime("20240131", None), Some(ts(2024, 1, 31)));
        assert_eq!(parse_datetime("2024-03", None), Some(ts(2024, 3, 1)));
        assert_eq!(
            parse_datetime("2024-01-31 08:15:00", None),
            ts(2024, 1, 31).date().and_hms_opt(8, 15, 0)
        );
        assert_eq!(parse_datetime("31/01/2024", Some("%d/%m/%Y")), Some(ts(2024, 1, 31)));
        assert_eq!(parse_datetime("not a date", None), None);
    }

    #[test]
    fn to_datetime_errors_modes() {
        let bad = Value::list(vec!["2024-01-01".into(), "junk".into()]);
        let err = call("pandas", "to_datetime", CallArgs::new(vec![bad.clone()])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValueError);
        let coerced = call(
            "pandas",
            "to_datetime",
            CallArgs::new(vec![bad]).with_keyword("errors", "coerce".into()),
        )
        .unwrap();
        let Value::Index(items) = coerced else { panic!("index expected") };
        assert!(matches!(items[0], Value::Timestamp(t) if t == ts(2024, 1, 1)));
        assert!(items[1].is_missing());
    }

    #[test]
    fn to_numeric_coerces_and_widens() {
        let column = Value::series(Series::new(None, vec!["1".into(), "2.5".into(), "x".into()]));
        let out = call(
            "pandas",
            "to_numeric",
            CallArgs::new(vec![column]).with_keyword("errors", "coerce".into()),
        )
        .unwrap();
        let Value::Series(s) = out else { panic!("series expected") };
        assert_eq!(s.dtype(), "float64");
        assert!(s.values[2].is_missing());
    }

    #[test]
    fn timedelta_accepts_keywords_and_strings() {
        let delta = call("pandas", "Timedelta", CallArgs::default().with_keyword("minutes", Value::Int(1))).unwrap();
        assert!(matches!(delta, Value::Timedelta(d) if d.num_seconds() == 60));
        let parsed = call("pandas", "Timedelta", CallArgs::new(vec!["2 days 01:00:00".into()])).unwrap();
        assert!(matches!(parsed, Value::Timedelta(d) if d.num_hours() == 49));
    }

    #[test]
    fn numpy_mean_of_list_with_nan_is_nan() {
        let values = Value::list(vec![Value::Int(1), Value::Float(f64::NAN)]);
        let mean = call("numpy", "mean", CallArgs::new(vec![values.clone()])).unwrap();
        assert!(matches!(mean, Value::Float(f) if f.is_nan()));
        let nanmean = call("numpy", "nanmean", CallArgs::new(vec![values])).unwrap();
        assert_eq!(repr(&nanmean), "1.0");
    }

    #[test]
    fn numpy_where_picks_elementwise() {
        let flags = Value::series(Series::new(None, vec![Value::Bool(true), Value::Bool(false)]));
        let out = call(
            "numpy",
            "where",
            CallArgs::new(vec![flags, "hi".into(), "lo".into()]),
        )
        .unwrap();
        let Value::Series(s) = out else { panic!("series expected") };
        assert_eq!(repr(&Value::list(s.values.clone())), "['hi', 'lo']");
    }

    #[test]
    fn math_sqrt_of_negative_is_a_domain_error() {
        let err = call("math", "sqrt", CallArgs::new(vec![Value::Int(-1)])).unwrap_err();
        assert_eq!(err.summary(), "ValueError: math domain error");
        let floor = call("math", "floor", CallArgs::new(vec![Value::Float(2.7)])).unwrap();
        assert_eq!(repr(&floor), "2");
    }

    #[test]
    fn concat_series_stacks_values() {
        let a = Value::series(Series::new(Some("x".into()), vec![Value::Int(1)]));
        let b = Value::series(Series::new(Some("x".into()), vec![Value::Int(2)]));
        let out = call(
            "pandas",
            "concat",
            CallArgs::new(vec![Value::list(vec![a, b])]).with_keyword("ignore_index", Value::Bool(true)),
        )
        .unwrap();
        let Value::Series(s) = out else { panic!("series expected") };
        assert_eq!(s.name.as_deref(), Some("x"));
        assert_eq!(s.len(), 2);
    }
}
