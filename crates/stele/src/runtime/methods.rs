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

//! Attribute lookup and method dispatch for every runtime value.
//!
//! Tabular receivers delegate to their own modules; plain strings, lists,
//! dicts, tuples and timestamps are handled here.

use crate::error::{RtResult, RuntimeError};
use chrono::{Datelike, NaiveTime, Timelike};
use std::cell::RefCell;
use std::rc::Rc;

use super::builtins::sorted_values;
use super::format::{format_value, repr, strftime, to_str};
use super::interpreter::Interpreter;
use super::ops::{self, resolve_position, values_equal};
use super::series::{self, Series, DAY_NAMES, MONTH_NAMES};
use super::value::{AccessorKind, BoundMethod, CallArgs, Dict, Value};
use super::{frame, groupby};

const STR_METHODS: &[&str] = &[
    "lower", "upper", "strip", "lstrip", "rstrip", "split", "rsplit", "join", "replace",
    "startswith", "endswith", "format", "title", "capitalize", "find", "rfind", "index", "count",
    "isdigit", "isnumeric", "isdecimal", "isalpha", "isalnum", "isspace", "islower", "isupper",
    "zfill", "center", "ljust", "rjust", "partition", "rpartition", "removeprefix",
    "removesuffix", "splitlines", "swapcase", "casefold", "encode",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "index", "count", "sort", "reverse", "copy",
    "clear", "add", "update", "discard", "union", "intersection", "difference",
];

const DICT_METHODS: &[&str] = &[
    "get", "keys", "values", "items", "update", "pop", "setdefault", "copy", "clear", "popitem",
];

const TUPLE_METHODS: &[&str] = &["index", "count"];

const TIMESTAMP_METHODS: &[&str] = &[
    "strftime", "date", "isoformat", "weekday", "isoweekday", "month_name", "day_name",
    "normalize", "timestamp", "to_period", "to_pydatetime",
];

const INDEX_METHODS: &[&str] = &[
    "tolist", "to_list", "unique", "astype", "isin", "sort_values", "copy", "min", "max",
];

pub(crate) fn has_method(receiver: &Value, name: &str) -> bool {
    match receiver {
        Value::Str(_) => STR_METHODS.contains(&name),
        Value::List(_) => LIST_METHODS.contains(&name),
        Value::Dict(_) => DICT_METHODS.contains(&name),
        Value::Tuple(_) => TUPLE_METHODS.contains(&name),
        Value::Timestamp(_) => TIMESTAMP_METHODS.contains(&name),
        Value::Timedelta(_) => name == "total_seconds",
        Value::Index(_) => INDEX_METHODS.contains(&name),
        Value::Series(_) => series::METHODS.contains(&name),
        Value::Frame(_) => frame::METHODS.contains(&name),
        Value::GroupBy(_) => groupby::METHODS.contains(&name),
        Value::Accessor(accessor) => series::accessor_has_method(accessor.kind, name),
        _ => false,
    }
}

fn no_attribute(value: &Value, name: &str) -> RuntimeError {
    RuntimeError::attribute_error(format!(
        "'{}' object has no attribute '{name}'",
        value.type_name()
    ))
}

pub fn get_attribute(value: &Value, name: &str) -> RtResult<Value> {
    let property = match value {
        Value::Series(s) => series::property(s, name)?,
        Value::Frame(f) => frame::property(f, name)?,
        Value::GroupBy(g) => groupby::property(g, name)?,
        Value::Accessor(accessor) if !has_method(value, name) => match &accessor.target {
            Value::Series(s) if !matches!(accessor.kind, AccessorKind::ILoc | AccessorKind::Loc) => {
                series::accessor_property(accessor.kind, s, name)?
            }
            _ => None,
        },
        Value::Module(module) => {
            return module.attrs.get(name).cloned().ok_or_else(|| {
                RuntimeError::attribute_error(format!(
                    "module '{}' has no attribute '{name}'",
                    module.name
                ))
            })
        }
        Value::Exception(exception) if name == "args" => {
            Some(Value::tuple(vec![Value::str(&exception.message)]))
        }
        Value::Timestamp(_) if !has_method(value, name) => {
            series::timestamp_part(value, name).ok()
        }
        Value::Timedelta(_) if !has_method(value, name) => {
            series::timedelta_part(value, name).ok()
        }
        Value::Function(function) if name == "__name__" => Some(Value::str(&function.name)),
        Value::Builtin(builtin) if name == "__name__" => Some(Value::str(builtin.name)),
        Value::Index(labels) => match name {
            "values" | "array" => Some(value.clone()),
            "size" => Some(Value::from(labels.len())),
            "shape" => Some(Value::tuple(vec![Value::from(labels.len())])),
            "name" => Some(Value::None),
            "dtype" => Some(Value::str(series::infer_dtype(labels))),
            "empty" => Some(Value::Bool(labels.is_empty())),
            _ => None,
        },
        _ => None,
    };
    if let Some(found) = property {
        return Ok(found);
    }
    if has_method(value, name) {
        return Ok(Value::Method(Rc::new(BoundMethod {
            receiver: value.clone(),
            name: name.to_string(),
        })));
    }
    Err(no_attribute(value, name))
}

/// `receiver.name(args)` without materialising a bound method first.
pub fn call_method(interp: &mut Interpreter, receiver: &Value, name: &str, args: CallArgs) -> RtResult<Value> {
    if !has_method(receiver, name) {
        let callee = get_attribute(receiver, name)?;
        return interp.call_value(&callee, args);
    }
    match receiver {
        Value::Series(s) => series::call_method(interp, s, name, args),
        Value::Frame(f) => frame::call_method(interp, f, name, args),
        Value::GroupBy(g) => groupby::call_method(interp, g, name, args),
        Value::Accessor(accessor) => match &accessor.target {
            Value::Series(s) => series::accessor_method(interp, accessor.kind, s, name, args),
            _ => Err(no_attribute(receiver, name)),
        },
        Value::Str(text) => str_method(text, name, &args),
        Value::List(items) => list_method(interp, items, name, args),
        Value::Dict(dict) => dict_method(dict, name, &args),
        Value::Tuple(items) => sequence_method(items, name, &args),
        Value::Timestamp(_) | Value::Timedelta(_) => timestamp_method(receiver, name, &args),
        Value::Index(labels) => index_method(labels, name, &args),
        _ => Err(no_attribute(receiver, name)),
    }
}

fn str_arg<'a>(args: &'a CallArgs, index: usize, name: &str, method: &str) -> RtResult<&'a str> {
    match args.require(index, name, method)? {
        Value::Str(s) => Ok(s),
        other => Err(RuntimeError::type_error(format!(
            "must be str, not {}",
            other.type_name()
        ))),
    }
}

fn opt_str<'a>(args: &'a CallArgs, index: usize, name: &str) -> RtResult<Option<&'a str>> {
    match args.get_some(index, name) {
        None => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s)),
        Some(other) => Err(RuntimeError::type_error(format!(
            "must be str or None, not {}",
            other.type_name()
        ))),
    }
}

fn char_offset(text: &str, byte: usize) -> i64 {
    text[..byte].chars().count() as i64
}

fn strip_chars<'a>(text: &'a str, chars: Option<&str>, left: bool, right: bool) -> &'a str {
    let matches = |c: char| match chars {
        Some(set) => set.contains(c),
        None => c.is_whitespace(),
    };
    let mut out = text;
    if left {
        out = out.trim_start_matches(matches);
    }
    if right {
        out = out.trim_end_matches(matches);
    }
    out
}

fn split(text: &str, sep: Option<&str>, maxsplit: i64, from_right: bool) -> RtResult<Vec<Value>> {
    let limit = usize::try_from(maxsplit).ok();
    let parts: Vec<String> = match sep {
        Some("") => return Err(RuntimeError::value_error("empty separator")),
        Some(sep) => match (limit, from_right) {
            (None, _) => text.split(sep).map(str::to_string).collect(),
            (Some(n), false) => text.splitn(n + 1, sep).map(str::to_string).collect(),
            (Some(n), true) => {
                let mut parts: Vec<String> = text.rsplitn(n + 1, sep).map(str::to_string).collect();
                parts.reverse();
                parts
            }
        },
        None => {
            let words: Vec<&str> = text.split_whitespace().collect();
            match limit {
                Some(n) if n < words.len() => {
                    if from_right {
                        let keep = words.len() - n;
                        let head = strip_chars(text, None, true, true);
                        let mut rest: Vec<String> = words[keep..].iter().map(|w| w.to_string()).collect();
                        let mut cut = head.len();
                        for word in words[keep..].iter().rev() {
                            if let Some(pos) = head[..cut].rfind(word) {
                                cut = pos;
                            }
                        }
                        let mut parts = vec![head[..cut].trim_end().to_string()];
                        parts.append(&mut rest);
                        parts
                    } else {
                        let mut parts: Vec<String> = words[..n].iter().map(|w| w.to_string()).collect();
                        let mut rest = text.trim_start();
                        for word in &words[..n] {
                            rest = rest[word.len()..].trim_start();
                        }
                        parts.push(rest.to_string());
                        parts
                    }
                }
                _ => words.into_iter().map(str::to_string).collect(),
            }
        }
    };
    Ok(parts.into_iter().map(Value::from).collect())
}

fn affix_matches(text: &str, candidates: &Value, suffix: bool) -> RtResult<bool> {
    let check = |value: &Value| -> RtResult<bool> {
        match value {
            Value::Str(s) => Ok(if suffix { text.ends_with(s.as_ref()) } else { text.starts_with(s.as_ref()) }),
            other => Err(RuntimeError::type_error(format!(
                "{} first arg must be str or a tuple of str, not {}",
                if suffix { "endswith" } else { "startswith" },
                other.type_name()
            ))),
        }
    };
    match candidates {
        Value::Tuple(items) => {
            for item in items.iter() {
                if check(item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => check(other),
    }
}

fn pad(text: &str, width: i64, fill: char, align: char) -> String {
    let len = text.chars().count() as i64;
    if width <= len {
        return text.to_string();
    }
    let total = (width - len) as usize;
    let (left, right) = match align {
        '<' => (0, total),
        '>' => (total, 0),
        _ => {
            let left = total / 2 + (total & width as usize & 1);
            (left, total - left)
        }
    };
    let fill = fill.to_string();
    format!("{}{text}{}", fill.repeat(left), fill.repeat(right))
}

fn fill_char(args: &CallArgs) -> RtResult<char> {
    match opt_str(args, 1, "fillchar")? {
        None => Ok(' '),
        Some(s) if s.chars().count() == 1 => Ok(s.chars().next().unwrap_or(' ')),
        Some(_) => Err(RuntimeError::type_error(
            "The fill character must be exactly one character long",
        )),
    }
}

/// `str.title`: capitalise the first letter of every alphabetic run.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_alpha = false;
    for c in text.chars() {
        if previous_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_alpha = c.is_alphabetic();
    }
    out
}

pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn str_method(text: &Rc<str>, name: &str, args: &CallArgs) -> RtResult<Value> {
    let text: &str = text;
    Ok(match name {
        "lower" | "casefold" => Value::from(text.to_lowercase()),
        "upper" => Value::from(text.to_uppercase()),
        "swapcase" => Value::from(
            text.chars()
                .map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().collect::<String>()
                    } else {
                        c.to_uppercase().collect()
                    }
                })
                .collect::<String>(),
        ),
        "strip" | "lstrip" | "rstrip" => {
            let chars = opt_str(args, 0, "chars")?;
            Value::str(strip_chars(text, chars, name != "rstrip", name != "lstrip"))
        }
        "split" | "rsplit" => {
            let sep = opt_str(args, 0, "sep")?;
            let maxsplit = args.int(1, "maxsplit", -1)?;
            Value::list(split(text, sep, maxsplit, name == "rsplit")?)
        }
        "splitlines" => Value::list(text.lines().map(Value::from).collect()),
        "join" => {
            let items = ops::iterate(args.require(0, "iterable", "join")?)?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(s) => parts.push(s.to_string()),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )))
                    }
                }
            }
            Value::from(parts.join(text))
        }
        "replace" => {
            let old = str_arg(args, 0, "old", "replace")?;
            let new = str_arg(args, 1, "new", "replace")?;
            let count = args.int(2, "count", -1)?;
            match usize::try_from(count) {
                Ok(n) => Value::from(text.replacen(old, new, n)),
                Err(_) => Value::from(text.replace(old, new)),
            }
        }
        "startswith" | "endswith" => {
            Value::Bool(affix_matches(text, args.require(0, "prefix", name)?, name == "endswith")?)
        }
        "format" => Value::from(str_format(text, args)?),
        "title" => Value::from(title_case(text)),
        "capitalize" => Value::from(capitalize(text)),
        "find" | "rfind" | "index" => {
            let needle = str_arg(args, 0, "sub", name)?;
            let found = if name == "rfind" { text.rfind(needle) } else { text.find(needle) };
            match found {
                Some(byte) => Value::Int(char_offset(text, byte)),
                None if name == "index" => {
                    return Err(RuntimeError::value_error("substring not found"))
                }
                None => Value::Int(-1),
            }
        }
        "count" => {
            let needle = str_arg(args, 0, "sub", "count")?;
            if needle.is_empty() {
                Value::from(text.chars().count() + 1)
            } else {
                Value::from(text.matches(needle).count())
            }
        }
        "isdigit" | "isnumeric" | "isdecimal" => {
            Value::Bool(!text.is_empty() && text.chars().all(|c| c.is_numeric()))
        }
        "isalpha" => Value::Bool(!text.is_empty() && text.chars().all(char::is_alphabetic)),
        "isalnum" => Value::Bool(!text.is_empty() && text.chars().all(char::is_alphanumeric)),
        "isspace" => Value::Bool(!text.is_empty() && text.chars().all(char::is_whitespace)),
        "islower" => Value::Bool(
            text.chars().any(char::is_lowercase) && !text.chars().any(char::is_uppercase),
        ),
        "isupper" => Value::Bool(
            text.chars().any(char::is_uppercase) && !text.chars().any(char::is_lowercase),
        ),
        "zfill" => {
            let width = args.int(0, "width", 0)?;
            let (sign, digits) = match text.strip_prefix(['-', '+']) {
                Some(rest) => (&text[..1], rest),
                None => ("", text),
            };
            let padded = pad(digits, width - sign.len() as i64, '0', '>');
            Value::from(format!("{sign}{padded}"))
        }
        "center" | "ljust" | "rjust" => {
            let width = args.int(0, "width", 0)?;
            let align = match name {
                "ljust" => '<',
                "rjust" => '>',
                _ => '^',
            };
            Value::from(pad(text, width, fill_char(args)?, align))
        }
        "partition" | "rpartition" => {
            let sep = str_arg(args, 0, "sep", name)?;
            let found = if name == "partition" { text.split_once(sep) } else { text.rsplit_once(sep) };
            match found {
                Some((head, tail)) => Value::tuple(vec![head.into(), sep.into(), tail.into()]),
                None if name == "partition" => Value::tuple(vec![text.into(), "".into(), "".into()]),
                None => Value::tuple(vec!["".into(), "".into(), text.into()]),
            }
        }
        "removeprefix" => {
            let prefix = str_arg(args, 0, "prefix", name)?;
            Value::str(text.strip_prefix(prefix).unwrap_or(text))
        }
        "removesuffix" => {
            let suffix = str_arg(args, 0, "suffix", name)?;
            Value::str(text.strip_suffix(suffix).unwrap_or(text))
        }
        "encode" => Value::Bytes(Rc::from(text.as_bytes())),
        _ => return Err(no_attribute(&Value::str(text), name)),
    })
}

/// `str.format` with automatic and explicit field numbering, keyword
/// fields, `!r`/`!s` conversions and format specs.
pub fn str_format(template: &str, args: &CallArgs) -> RtResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(RuntimeError::value_error(
                    "Single '}' encountered in format string",
                ))
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    field.push(c);
                }
                if !closed {
                    return Err(RuntimeError::value_error(
                        "Single '{' encountered in format string",
                    ));
                }
                let (head, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let (key, conversion) = match head.split_once('!') {
                    Some((key, conv)) => (key, conv.chars().next()),
                    None => (head, None),
                };
                let value = if key.is_empty() {
                    let value = args.positional.get(auto).cloned();
                    auto += 1;
                    value.ok_or_else(|| {
                        RuntimeError::index_error(format!(
                            "Replacement index {} out of range for positional args tuple",
                            auto - 1
                        ))
                    })?
                } else if let Ok(position) = key.parse::<usize>() {
                    args.positional.get(position).cloned().ok_or_else(|| {
                        RuntimeError::index_error(format!(
                            "Replacement index {position} out of range for positional args tuple"
                        ))
                    })?
                } else {
                    args.keyword(key)
                        .cloned()
                        .ok_or_else(|| RuntimeError::key_error(format!("'{key}'")))?
                };
                let value = match conversion {
                    Some('r') | Some('a') => Value::str(repr(&value)),
                    Some('s') => Value::str(to_str(&value)),
                    _ => value,
                };
                if spec.is_empty() {
                    out.push_str(&to_str(&value));
                } else {
                    out.push_str(&format_value(&value, spec)?);
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn position_of(items: &[Value], needle: &Value) -> Option<usize> {
    items.iter().position(|item| values_equal(item, needle))
}

fn add_unique(items: &mut Vec<Value>, value: Value) {
    if position_of(items, &value).is_none() {
        items.push(value);
    }
}

fn list_method(
    interp: &mut Interpreter,
    list: &Rc<RefCell<Vec<Value>>>,
    name: &str,
    args: CallArgs,
) -> RtResult<Value> {
    match name {
        "append" => {
            let value = args.require(0, "object", "append")?.clone();
            list.borrow_mut().push(value);
        }
        "extend" => {
            let extra = ops::iterate(args.require(0, "iterable", "extend")?)?;
            list.borrow_mut().extend(extra);
        }
        "insert" => {
            let index = args.int(0, "index", 0)?;
            let value = args.require(1, "object", "insert")?.clone();
            let mut items = list.borrow_mut();
            let len = items.len() as i64;
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(at as usize, value);
        }
        "pop" => {
            let mut items = list.borrow_mut();
            if items.is_empty() {
                return Err(RuntimeError::index_error("pop from empty list"));
            }
            let index = args.int(0, "index", -1)?;
            let position = resolve_position(index, items.len())
                .ok_or_else(|| RuntimeError::index_error("pop index out of range"))?;
            return Ok(items.remove(position));
        }
        "remove" => {
            let needle = args.require(0, "value", "remove")?;
            let mut items = list.borrow_mut();
            let position = position_of(&items, needle)
                .ok_or_else(|| RuntimeError::value_error("list.remove(x): x not in list"))?;
            items.remove(position);
        }
        "index" | "count" => {
            let snapshot = list.borrow().clone();
            return sequence_method(&snapshot, name, &args);
        }
        "sort" => {
            let snapshot = list.borrow().clone();
            let key = args.get_some(usize::MAX, "key").cloned();
            let reverse = args.flag(usize::MAX, "reverse", false)?;
            let sorted = sorted_values(interp, snapshot, key.as_ref(), reverse)?;
            *list.borrow_mut() = sorted;
        }
        "reverse" => list.borrow_mut().reverse(),
        "copy" => return Ok(Value::list(list.borrow().clone())),
        "clear" => list.borrow_mut().clear(),
        "add" => {
            let value = args.require(0, "elem", "add")?.clone();
            add_unique(&mut list.borrow_mut(), value);
        }
        "update" => {
            for other in &args.positional {
                for value in ops::iterate(other)? {
                    add_unique(&mut list.borrow_mut(), value);
                }
            }
        }
        "discard" => {
            let needle = args.require(0, "elem", "discard")?;
            let mut items = list.borrow_mut();
            if let Some(position) = position_of(&items, needle) {
                items.remove(position);
            }
        }
        "union" => {
            let mut out = Vec::new();
            for value in list.borrow().iter() {
                add_unique(&mut out, value.clone());
            }
            for other in &args.positional {
                for value in ops::iterate(other)? {
                    add_unique(&mut out, value);
                }
            }
            return Ok(Value::list(out));
        }
        "intersection" | "difference" => {
            let others = args
                .positional
                .iter()
                .map(ops::iterate)
                .collect::<RtResult<Vec<_>>>()?;
            let keep_shared = name == "intersection";
            let mut out = Vec::new();
            for value in list.borrow().iter() {
                let shared = others.iter().all(|o| position_of(o, value).is_some());
                let anywhere = others.iter().any(|o| position_of(o, value).is_some());
                if (keep_shared && shared) || (!keep_shared && !anywhere) {
                    add_unique(&mut out, value.clone());
                }
            }
            return Ok(Value::list(out));
        }
        _ => return Err(no_attribute(&Value::List(list.clone()), name)),
    }
    Ok(Value::None)
}

/// `index` and `count`, shared by lists and tuples.
fn sequence_method(items: &[Value], name: &str, args: &CallArgs) -> RtResult<Value> {
    let needle = args.require(0, "value", name)?;
    match name {
        "count" => Ok(Value::from(
            items.iter().filter(|item| values_equal(item, needle)).count(),
        )),
        _ => position_of(items, needle)
            .map(Value::from)
            .ok_or_else(|| RuntimeError::value_error(format!("{} is not in list", repr(needle)))),
    }
}

fn dict_method(dict: &Rc<RefCell<Dict>>, name: &str, args: &CallArgs) -> RtResult<Value> {
    Ok(match name {
        "get" => {
            let key = args.require(0, "key", "get")?;
            let default = args.get(1, "default").cloned().unwrap_or(Value::None);
            dict.borrow().get(key)?.unwrap_or(default)
        }
        "keys" => Value::list(dict.borrow().keys()),
        "values" => Value::list(dict.borrow().values()),
        "items" => Value::list(
            dict.borrow()
                .items()
                .into_iter()
                .map(|(k, v)| Value::tuple(vec![k, v]))
                .collect(),
        ),
        "update" => {
            let mut pairs = Vec::new();
            if let Some(other) = args.positional.first() {
                pairs.extend(mapping_pairs(other)?);
            }
            for (key, value) in &args.keywords {
                pairs.push((Value::str(key), value.clone()));
            }
            let mut target = dict.borrow_mut();
            for (key, value) in pairs {
                target.insert(key, value)?;
            }
            Value::None
        }
        "pop" => {
            let key = args.require(0, "key", "pop")?;
            match dict.borrow_mut().remove(key)? {
                Some(value) => value,
                None => match args.get(1, "default") {
                    Some(default) => default.clone(),
                    None => return Err(RuntimeError::key_error(repr(key))),
                },
            }
        }
        "setdefault" => {
            let key = args.require(0, "key", "setdefault")?;
            let existing = dict.borrow().get(key)?;
            match existing {
                Some(value) => value,
                None => {
                    let default = args.get(1, "default").cloned().unwrap_or(Value::None);
                    dict.borrow_mut().insert(key.clone(), default.clone())?;
                    default
                }
            }
        }
        "copy" => Value::dict(dict.borrow().clone()),
        "clear" => {
            dict.borrow_mut().clear();
            Value::None
        }
        "popitem" => match dict.borrow_mut().pop_last() {
            Some((key, value)) => Value::tuple(vec![key, value]),
            None => return Err(RuntimeError::key_error("'popitem(): dictionary is empty'")),
        },
        _ => return Err(no_attribute(&Value::Dict(dict.clone()), name)),
    })
}

/// Key/value pairs from a dict or an iterable of pairs.
pub(crate) fn mapping_pairs(value: &Value) -> RtResult<Vec<(Value, Value)>> {
    if let Value::Dict(dict) = value {
        return Ok(dict.borrow().items());
    }
    let mut pairs = Vec::new();
    for (i, item) in ops::iterate(value)?.into_iter().enumerate() {
        let parts = ops::iterate(&item)?;
        let [key, value]: [Value; 2] = parts.try_into().map_err(|parts: Vec<Value>| {
            RuntimeError::value_error(format!(
                "dictionary update sequence element #{i} has length {}; 2 is required",
                parts.len()
            ))
        })?;
        pairs.push((key, value));
    }
    Ok(pairs)
}

fn timestamp_method(receiver: &Value, name: &str, args: &CallArgs) -> RtResult<Value> {
    let ts = match receiver {
        Value::Timestamp(ts) => *ts,
        Value::Timedelta(delta) if name == "total_seconds" => {
            return Ok(Value::Float(delta.num_milliseconds() as f64 / 1000.0))
        }
        other => return Err(no_attribute(other, name)),
    };
    Ok(match name {
        "strftime" => Value::from(strftime(&ts, str_arg(args, 0, "format", "strftime")?)?),
        "date" => Value::from(ts.format("%Y-%m-%d").to_string()),
        "isoformat" => {
            let sep = opt_str(args, 0, "sep")?.unwrap_or("T");
            let pattern = if ts.nanosecond() == 0 {
                format!("%Y-%m-%d{sep}%H:%M:%S")
            } else {
                format!("%Y-%m-%d{sep}%H:%M:%S%.6f")
            };
            Value::from(ts.format(&pattern).to_string())
        }
        "weekday" => Value::Int(i64::from(ts.weekday().num_days_from_monday())),
        "isoweekday" => Value::Int(i64::from(ts.weekday().number_from_monday())),
        "month_name" => Value::str(MONTH_NAMES[ts.month0() as usize]),
        "day_name" => Value::str(DAY_NAMES[ts.weekday().num_days_from_monday() as usize]),
        "normalize" => Value::Timestamp(ts.date().and_time(NaiveTime::MIN)),
        "timestamp" => Value::Float(ts.and_utc().timestamp_millis() as f64 / 1000.0),
        "to_period" => {
            let freq = opt_str(args, 0, "freq")?.unwrap_or("D");
            Value::from(series::period_label(&ts, freq)?)
        }
        "to_pydatetime" => receiver.clone(),
        _ => return Err(no_attribute(receiver, name)),
    })
}

fn index_method(labels: &Rc<Vec<Value>>, name: &str, args: &CallArgs) -> RtResult<Value> {
    Ok(match name {
        "tolist" | "to_list" => Value::list(labels.as_ref().clone()),
        "copy" => Value::Index(labels.clone()),
        "unique" => Value::Index(Rc::new(series::unique_values(labels)?)),
        "astype" => {
            let dtype = series::dtype_name(args.require(0, "dtype", "astype")?)?;
            let cast = series::astype(&Series::new(None, labels.as_ref().clone()), &dtype)?;
            Value::Index(Rc::new(cast.values))
        }
        "isin" => {
            let flags = series::isin(labels, args.require(0, "values", "isin")?)?;
            Value::series(Series::new(None, flags))
        }
        "sort_values" => {
            let ascending = args.flag(usize::MAX, "ascending", true)?;
            let order = ops::sort_positions(&[labels.as_slice()], &[ascending])?;
            Value::Index(Rc::new(order.into_iter().map(|p| labels[p].clone()).collect()))
        }
        "min" | "max" => series::aggregate(&Series::new(None, labels.as_ref().clone()), name, 1)?,
        _ => return Err(no_attribute(&Value::Index(labels.clone()), name)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::runtime::interpreter::Limits;

    fn call(receiver: Value, name: &str, args: Vec<Value>) -> RtResult<Value> {
        let mut interp = Interpreter::new(Limits::default());
        call_method(&mut interp, &receiver, name, CallArgs::new(args))
    }

    fn text(value: RtResult<Value>) -> String {
        to_str(&value.unwrap())
    }

    #[test]
    fn string_helpers_follow_python_casing() {
        assert_eq!(title_case("hello wORLD-wide"), "Hello World-Wide");
        assert_eq!(capitalize("hELLO"), "Hello");
        assert_eq!(text(call(Value::str("  pad "), "strip", vec![])), "pad");
        assert_eq!(text(call(Value::str("xxhixx"), "strip", vec!["x".into()])), "hi");
    }

    #[test]
    fn split_honours_separator_and_maxsplit() {
        let parts = call(Value::str("a,b,c"), "split", vec![",".into(), Value::Int(1)]).unwrap();
        assert_eq!(repr(&parts), "['a', 'b,c']");
        let parts = call(Value::str("a,b,c"), "rsplit", vec![",".into(), Value::Int(1)]).unwrap();
        assert_eq!(repr(&parts), "['a,b', 'c']");
        let words = call(Value::str("  one  two three "), "split", vec![]).unwrap();
        assert_eq!(repr(&words), "['one', 'two', 'three']");
    }

    #[test]
    fn format_fills_positional_and_keyword_fields() {
        let args = CallArgs::new(vec![Value::Float(1234.5)]).with_keyword("unit", "JPY".into());
        assert_eq!(str_format("{:,.1f} {unit} {{ok}}", &args).unwrap(), "1,234.5 JPY {ok}");
        let err = str_format("{1}", &args).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexError);
    }

    #[test]
    fn list_mutation_is_visible_through_aliases() {
        let list = Value::list(vec![Value::Int(3), Value::Int(1)]);
        call(list.clone(), "append", vec![Value::Int(2)]).unwrap();
        call(list.clone(), "sort", vec![]).unwrap();
        assert_eq!(repr(&list), "[1, 2, 3]");
        let popped = call(list.clone(), "pop", vec![]).unwrap();
        assert_eq!(repr(&popped), "3");
        let err = call(Value::list(vec![]), "pop", vec![]).unwrap_err();
        assert_eq!(err.summary(), "IndexError: pop from empty list");
    }

    #[test]
    fn dict_pop_missing_key_raises_key_error() {
        let mut dict = Dict::new();
        dict.insert_str("a", Value::Int(1));
        let dict = Value::dict(dict);
        let got = call(dict.clone(), "get", vec!["b".into(), Value::Int(0)]).unwrap();
        assert_eq!(repr(&got), "0");
        let err = call(dict, "pop", vec!["b".into()]).unwrap_err();
        assert_eq!(err.summary(), "KeyError: 'b'");
    }

    #[test]
    fn unknown_attribute_names_the_type() {
        let err = get_attribute(&Value::Int(1), "foo").unwrap_err();
        assert_eq!(err.summary(), "AttributeError: 'int' object has no attribute 'foo'");
    }

    #[test]
    fn timestamp_exposes_parts_and_methods() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 3, 15)
            .and_then(|d| d.and_hms_opt(10, 30, 0))
            .map(Value::Timestamp)
            .unwrap();
        assert_eq!(repr(&get_attribute(&ts, "month").unwrap()), "3");
        assert_eq!(text(call(ts.clone(), "strftime", vec!["%Y/%m".into()])), "2024/03");
        assert_eq!(text(call(ts.clone(), "day_name", vec![])), "Friday");
        assert_eq!(text(call(ts, "isoformat", vec![])), "2024-03-15T10:30:00");
    }
}
