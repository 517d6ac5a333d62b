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

//! Text conversion: `repr`, `str`, format specs and `%` interpolation.

use super::value::Value;
use crate::error::{RtResult, RuntimeError};
use crate::unparse::string_literal;
use chrono::{NaiveDateTime, TimeDelta, Timelike};

pub fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let text = format!("{value:?}");
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(rest) => ('-', rest),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

pub fn timestamp_str(ts: &NaiveDateTime) -> String {
    if ts.nanosecond() == 0 {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// `strftime` that reports bad directives instead of panicking.
pub fn strftime(ts: &NaiveDateTime, pattern: &str) -> RtResult<String> {
    use std::fmt::Write;
    let mut out = String::new();
    write!(out, "{}", ts.format(pattern))
        .map_err(|_| RuntimeError::value_error(format!("Invalid format string '{pattern}'")))?;
    Ok(out)
}

pub fn timedelta_str(delta: &TimeDelta) -> String {
    let days = delta.num_days();
    let rest = *delta - TimeDelta::days(days);
    let seconds = rest.num_seconds();
    format!(
        "{days} days {:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

pub fn repr(value: &Value) -> String {
    match value {
        Value::Str(s) => string_literal(s),
        Value::Timestamp(ts) => format!("Timestamp('{}')", timestamp_str(ts)),
        Value::Timedelta(d) => format!("Timedelta('{}')", timedelta_str(d)),
        other => to_str(other),
    }
}

fn join_repr<'a>(items: impl Iterator<Item = &'a Value>) -> String {
    items.map(repr).collect::<Vec<_>>().join(", ")
}

pub fn to_str(value: &Value) -> String {
    match value {
        Value::None => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => float_repr(*f),
        Value::Str(s) => s.to_string(),
        Value::Bytes(b) => {
            let body: String = b
                .iter()
                .map(|c| match *c {
                    0x20..=0x7e if *c != b'\'' && *c != b'\\' => (*c as char).to_string(),
                    other => format!("\\x{other:02x}"),
                })
                .collect();
            format!("b'{body}'")
        }
        Value::List(items) => format!("[{}]", join_repr(items.borrow().iter())),
        Value::Tuple(items) => {
            if items.len() == 1 {
                format!("({},)", repr(&items[0]))
            } else {
                format!("({})", join_repr(items.iter()))
            }
        }
        Value::Dict(dict) => {
            let body = dict
                .borrow()
                .items()
                .iter()
                .map(|(k, v)| format!("{}: {}", repr(k), repr(v)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{body}}}")
        }
        Value::Slice(s) => format!("slice({}, {}, {})", repr(&s.start), repr(&s.stop), repr(&s.step)),
        Value::Timestamp(ts) => timestamp_str(ts),
        Value::Timedelta(d) => timedelta_str(d),
        Value::Series(series) => series.render(),
        Value::Index(items) => format!("Index([{}], dtype='{}')", join_repr(items.iter()), super::series::infer_dtype(items)),
        Value::Frame(frame) => frame.borrow().render(),
        Value::GroupBy(_) => "<pandas.core.groupby.generic.GroupBy object>".to_string(),
        Value::Accessor(a) => format!("<pandas accessor {}>", a.kind.type_name()),
        Value::Function(f) => format!("<function {}>", f.name),
        Value::Builtin(b) => format!("<built-in function {}>", b.name),
        Value::Method(m) => format!("<bound method {}.{}>", m.receiver.type_name(), m.name),
        Value::Module(m) => format!("<module '{}'>", m.name),
        Value::ExceptionType(kind) => format!("<class '{}'>", kind.name()),
        Value::Exception(err) => err.message.clone(),
    }
}

fn group_thousands(digits: &str, sep: char) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let len = digits.len();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Default)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> RtResult<Spec> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = Some(chars[0]);
        out.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        out.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c @ ('+' | '-' | ' ')) = chars.get(i) {
        out.sign = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        out.zero = true;
        i += 1;
    }
    let width_start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i > width_start {
        out.width = chars[width_start..i].iter().collect::<String>().parse().unwrap_or(0);
    }
    if let Some(&c @ (',' | '_')) = chars.get(i) {
        out.grouping = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i == start {
            return Err(RuntimeError::value_error("Format specifier missing precision"));
        }
        out.precision = chars[start..i].iter().collect::<String>().parse().ok();
    }
    if let Some(&c) = chars.get(i) {
        out.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(RuntimeError::value_error("Invalid format specifier"));
    }
    Ok(out)
}

fn exponent_repr(value: f64, precision: usize, upper: bool) -> String {
    let text = format!("{value:.precision$e}");
    let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(rest) => ('-', rest),
        None => ('+', exponent),
    };
    let e = if upper { 'E' } else { 'e' };
    format!("{mantissa}{e}{sign}{digits:0>2}")
}

fn general_repr(value: f64, precision: usize) -> String {
    let precision = precision.max(1);
    if value == 0.0 {
        return "0".to_string();
    }
    let exponent = value.abs().log10().floor() as i32;
    if exponent < -4 || exponent >= precision as i32 {
        let text = exponent_repr(value, precision - 1, false);
        let (mantissa, exp) = text.split_once('e').unwrap_or((&text, ""));
        let mantissa = if mantissa.contains('.') {
            mantissa.trim_end_matches('0').trim_end_matches('.')
        } else {
            mantissa
        };
        format!("{mantissa}e{exp}")
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        let text = format!("{value:.decimals$}");
        if text.contains('.') {
            text.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            text
        }
    }
}

fn apply_grouping(body: &str, grouping: Option<char>) -> String {
    let Some(sep) = grouping else {
        return body.to_string();
    };
    let (int_part, frac) = match body.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => (&body[..pos], &body[pos..]),
        None => (body, ""),
    };
    format!("{}{frac}", group_thousands(int_part, sep))
}

fn pad(body: String, negative: bool, spec: &Spec, numeric: bool) -> String {
    let sign = if negative {
        "-"
    } else {
        match spec.sign {
            Some('+') if numeric => "+",
            Some(' ') if numeric => " ",
            _ => "",
        }
    };
    let len = sign.chars().count() + body.chars().count();
    if len >= spec.width {
        return format!("{sign}{body}");
    }
    let padding = spec.width - len;
    let fill = spec.fill.unwrap_or(if spec.zero && numeric { '0' } else { ' ' });
    let align = spec
        .align
        .unwrap_or(if spec.zero && numeric { '=' } else if numeric { '>' } else { '<' });
    let fill_str = |n: usize| fill.to_string().repeat(n);
    match align {
        '<' => format!("{sign}{body}{}", fill_str(padding)),
        '^' => {
            let left = padding / 2;
            format!("{}{sign}{body}{}", fill_str(left), fill_str(padding - left))
        }
        '=' => format!("{sign}{}{body}", fill_str(padding)),
        _ => format!("{}{sign}{body}", fill_str(padding)),
    }
}

fn format_float(value: f64, spec: &Spec) -> RtResult<String> {
    let negative = value.is_sign_negative() && value != 0.0 && !value.is_nan();
    let magnitude = value.abs();
    let body = if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        "inf".to_string()
    } else {
        match spec.kind {
            Some('f' | 'F') => {
                let p = spec.precision.unwrap_or(6);
                apply_grouping(&format!("{magnitude:.p$}"), spec.grouping)
            }
            Some('%') => {
                let p = spec.precision.unwrap_or(6);
                format!("{}%", apply_grouping(&format!("{:.p$}", magnitude * 100.0), spec.grouping))
            }
            Some('e' | 'E') => exponent_repr(magnitude, spec.precision.unwrap_or(6), spec.kind == Some('E')),
            Some('g' | 'G') => apply_grouping(&general_repr(magnitude, spec.precision.unwrap_or(6)), spec.grouping),
            Some('n') => general_repr(magnitude, spec.precision.unwrap_or(6)),
            None => match spec.precision {
                Some(p) => apply_grouping(&general_repr(magnitude, p), spec.grouping),
                None => apply_grouping(&float_repr(magnitude), spec.grouping),
            },
            Some(other) => {
                return Err(RuntimeError::value_error(format!(
                    "Unknown format code '{other}' for object of type 'float'"
                )))
            }
        }
    };
    Ok(pad(body, negative, spec, true))
}

fn format_int(value: i64, spec: &Spec) -> RtResult<String> {
    match spec.kind {
        None | Some('d' | 'n') => {
            if spec.precision.is_some() {
                return Err(RuntimeError::value_error(
                    "Precision not allowed in integer format specifier",
                ));
            }
            let body = apply_grouping(&value.unsigned_abs().to_string(), spec.grouping);
            Ok(pad(body, value < 0, spec, true))
        }
        Some('x') => Ok(pad(format!("{:x}", value.unsigned_abs()), value < 0, spec, true)),
        Some('X') => Ok(pad(format!("{:X}", value.unsigned_abs()), value < 0, spec, true)),
        Some('b') => Ok(pad(format!("{:b}", value.unsigned_abs()), value < 0, spec, true)),
        Some('o') => Ok(pad(format!("{:o}", value.unsigned_abs()), value < 0, spec, true)),
        Some('c') => Ok(pad(
            char::from_u32(value as u32).map(String::from).unwrap_or_default(),
            false,
            spec,
            false,
        )),
        Some('s') => Err(RuntimeError::value_error(
            "Unknown format code 's' for object of type 'int'",
        )),
        Some(_) => format_float(value as f64, spec),
    }
}

/// Applies a format spec the way `format(value, spec)` does.
pub fn format_value(value: &Value, spec: &str) -> RtResult<String> {
    if spec.is_empty() {
        return Ok(to_str(value));
    }
    if let Value::Timestamp(ts) = value {
        if spec.contains('%') {
            return strftime(ts, spec);
        }
    }
    let parsed = parse_spec(spec)?;
    match value {
        Value::Bool(b) if parsed.kind.is_none() => Ok(pad(to_str(&Value::Bool(*b)), false, &parsed, false)),
        Value::Bool(b) => format_int(i64::from(*b), &parsed),
        Value::Int(i) => format_int(*i, &parsed),
        Value::Float(f) => format_float(*f, &parsed),
        Value::Timestamp(ts) => Ok(pad(timestamp_str(ts), false, &parsed, false)),
        other => {
            if matches!(parsed.kind, Some(k) if k != 's') {
                return Err(RuntimeError::value_error(format!(
                    "Unknown format code '{}' for object of type '{}'",
                    parsed.kind.unwrap_or('?'),
                    other.type_name()
                )));
            }
            let mut text = to_str(other);
            if let Some(p) = parsed.precision {
                text = text.chars().take(p).collect();
            }
            Ok(pad(text, false, &parsed, false))
        }
    }
}

/// `template % args` printf-style interpolation.
pub fn percent_format(template: &str, args: &Value) -> RtResult<String> {
    let values: Vec<Value> = match args {
        Value::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    };
    let mut next = values.into_iter();
    let mut out = String::new();
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        if chars.get(i) == Some(&'%') {
            out.push('%');
            i += 1;
            continue;
        }
        let start = i;
        while chars.get(i).is_some_and(|c| matches!(c, '-' | '+' | ' ' | '0' | '.' | ',') || c.is_ascii_digit()) {
            i += 1;
        }
        let Some(&conversion) = chars.get(i) else {
            return Err(RuntimeError::value_error("incomplete format"));
        };
        i += 1;
        let flags: String = chars[start..i - 1].iter().collect();
        let value = next.next().ok_or_else(|| {
            RuntimeError::type_error("not enough arguments for format string")
        })?;
        let flags = flags.replacen('-', "<", 1);
        let piece = match conversion {
            's' => format_value(&Value::str(to_str(&value)), &flags)?,
            'r' => format_value(&Value::str(repr(&value)), &flags)?,
            'd' | 'i' => {
                let int = match &value {
                    Value::Float(f) => Value::Int(f.trunc() as i64),
                    other => other.clone(),
                };
                format_value(&int, &format!("{flags}d"))?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'x' | 'X' => {
                format_value(&value, &format!("{flags}{conversion}"))?
            }
            other => {
                return Err(RuntimeError::value_error(format!(
                    "unsupported format character '{other}'"
                )))
            }
        };
        out.push_str(&piece);
    }
    if next.next().is_some() {
        return Err(RuntimeError::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_repr_matches_scripting_conventions() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(0.1), "0.1");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(1e-5), "1e-05");
    }

    #[test]
    fn currency_style_specs() {
        assert_eq!(format_value(&Value::Float(1234567.891), ",.2f").unwrap(), "1,234,567.89");
        assert_eq!(format_value(&Value::Int(65000), ",").unwrap(), "65,000");
        assert_eq!(format_value(&Value::Float(0.256), ".1%").unwrap(), "25.6%");
        assert_eq!(format_value(&Value::Float(-3.5), ".0f").unwrap(), "-4");
        assert_eq!(format_value(&Value::Int(7), "03d").unwrap(), "007");
        assert_eq!(format_value(&Value::str("ab"), ">4").unwrap(), "  ab");
    }

    #[test]
    fn int_rejects_string_code() {
        assert!(format_value(&Value::Int(3), "s").is_err());
    }

    #[test]
    fn percent_interpolation() {
        let args = Value::tuple(vec![Value::str("North"), Value::Float(12.345)]);
        assert_eq!(percent_format("%s: %.1f%%", &args).unwrap(), "North: 12.3%");
        assert!(percent_format("%s %s", &Value::Int(1)).is_err());
    }

    #[test]
    fn reprs_of_containers() {
        let list = Value::list(vec![Value::Int(1), Value::str("a"), Value::None]);
        assert_eq!(repr(&list), "[1, 'a', None]");
        assert_eq!(repr(&Value::tuple(vec![Value::Int(1)])), "(1,)");
    }
}
