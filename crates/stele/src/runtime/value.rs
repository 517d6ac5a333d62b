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

use crate::ast::{Expr, Stmt};
use crate::error::{ErrorKind, RtResult, RuntimeError};
use chrono::{NaiveDateTime, TimeDelta};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::frame::Frame;
use super::groupby::GroupBy;
use super::interpreter::{Env, Interpreter};
use super::series::Series;

pub type NativeFn = fn(&mut Interpreter, CallArgs) -> RtResult<Value>;

/// A runtime value. Containers share through `Rc` so aliasing matches the
/// reference semantics scripts expect.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Dict(Rc<RefCell<Dict>>),
    Slice(Rc<SliceValue>),
    Timestamp(NaiveDateTime),
    Timedelta(TimeDelta),
    Series(Rc<Series>),
    Index(Rc<Vec<Value>>),
    Frame(Rc<RefCell<Frame>>),
    GroupBy(Rc<GroupBy>),
    Accessor(Rc<Accessor>),
    Function(Rc<Function>),
    Builtin(Rc<Builtin>),
    Method(Rc<BoundMethod>),
    Module(Rc<ModuleObject>),
    ExceptionType(ErrorKind),
    Exception(Rc<RuntimeError>),
}

impl Value {
    pub fn str(text: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(text.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::from(items))
    }

    pub fn dict(dict: Dict) -> Self {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn series(series: Series) -> Self {
        Value::Series(Rc::new(series))
    }

    pub fn frame(frame: Frame) -> Self {
        Value::Frame(Rc::new(RefCell::new(frame)))
    }

    pub fn float_or_none(value: Option<f64>) -> Self {
        value.map_or(Value::None, Value::Float)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Slice(_) => "slice",
            Value::Timestamp(_) => "Timestamp",
            Value::Timedelta(_) => "Timedelta",
            Value::Series(_) => "Series",
            Value::Index(_) => "Index",
            Value::Frame(_) => "DataFrame",
            Value::GroupBy(g) => {
                if g.is_series() {
                    "SeriesGroupBy"
                } else {
                    "DataFrameGroupBy"
                }
            }
            Value::Accessor(a) => a.kind.type_name(),
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Method(_) => "method",
            Value::Module(_) => "module",
            Value::ExceptionType(_) => "type",
            Value::Exception(e) => e.kind.name(),
        }
    }

    /// Missing in the tabular sense: `None` or a float NaN.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::None => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::Bool(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn truthy(&self) -> RtResult<bool> {
        Ok(match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Timedelta(d) => !d.is_zero(),
            Value::Index(items) => {
                return Err(RuntimeError::value_error(format!(
                    "The truth value of a Index is ambiguous. Use a.empty, a.bool(), a.item(), a.any() or a.all(). (len {})",
                    items.len()
                )))
            }
            Value::Series(_) => {
                return Err(RuntimeError::value_error(
                    "The truth value of a Series is ambiguous. Use a.empty, a.bool(), a.item(), a.any() or a.all().",
                ))
            }
            Value::Frame(_) => {
                return Err(RuntimeError::value_error(
                    "The truth value of a DataFrame is ambiguous. Use a.empty, a.bool(), a.item(), a.any() or a.all().",
                ))
            }
            _ => true,
        })
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::str(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Rc::from(value))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&super::format::repr(self))
    }
}

/// Hashable projection of a value used for dict keys and grouping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    Tuple(Vec<Key>),
    Timestamp(NaiveDateTime),
    Timedelta(i64),
}

impl Key {
    pub fn from_value(value: &Value) -> RtResult<Self> {
        Ok(match value {
            Value::None => Key::None,
            Value::Bool(b) => Key::Int(i64::from(*b)),
            Value::Int(i) => Key::Int(*i),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 9.0e15 {
                    Key::Int(*f as i64)
                } else if f.is_nan() {
                    Key::Float(f64::NAN.to_bits())
                } else {
                    Key::Float(f.to_bits())
                }
            }
            Value::Str(s) => Key::Str(s.clone()),
            Value::Bytes(b) => Key::Bytes(b.clone()),
            Value::Tuple(items) => Key::Tuple(
                items
                    .iter()
                    .map(Key::from_value)
                    .collect::<RtResult<Vec<_>>>()?,
            ),
            Value::Timestamp(ts) => Key::Timestamp(*ts),
            Value::Timedelta(d) => Key::Timedelta(d.num_milliseconds()),
            Value::ExceptionType(kind) => Key::Str(Rc::from(kind.name())),
            other => {
                return Err(RuntimeError::type_error(format!(
                    "unhashable type: '{}'",
                    other.type_name()
                )))
            }
        })
    }
}

/// Insertion-ordered mapping that remembers the original key values.
#[derive(Clone, Default)]
pub struct Dict {
    entries: IndexMap<Key, (Value, Value)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, key: Value, value: Value) -> RtResult<()> {
        let hashed = Key::from_value(&key)?;
        match self.entries.get_mut(&hashed) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(hashed, (key, value));
            }
        }
        Ok(())
    }

    pub fn insert_str(&mut self, key: &str, value: Value) {
        self.entries
            .insert(Key::Str(Rc::from(key)), (Value::str(key), value));
    }

    pub fn get(&self, key: &Value) -> RtResult<Option<Value>> {
        let hashed = Key::from_value(key)?;
        Ok(self.entries.get(&hashed).map(|(_, v)| v.clone()))
    }

    pub fn contains(&self, key: &Value) -> RtResult<bool> {
        Ok(self.entries.contains_key(&Key::from_value(key)?))
    }

    pub fn remove(&mut self, key: &Value) -> RtResult<Option<Value>> {
        let hashed = Key::from_value(key)?;
        Ok(self.entries.shift_remove(&hashed).map(|(_, v)| v))
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.values().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.values().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.entries.values().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn pop_last(&mut self) -> Option<(Value, Value)> {
        self.entries.pop().map(|(_, kv)| kv)
    }
}

impl FromIterator<(String, Value)> for Dict {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut dict = Dict::new();
        for (key, value) in iter {
            dict.insert_str(&key, value);
        }
        dict
    }
}

pub struct SliceValue {
    pub start: Value,
    pub stop: Value,
    pub step: Value,
}

impl SliceValue {
    /// Resolves to concrete `(start, stop, step)` positions for a sequence
    /// of `len` items.
    pub fn indices(&self, len: usize) -> RtResult<(i64, i64, i64)> {
        let bound = |value: &Value| -> RtResult<Option<i64>> {
            match value {
                Value::None => Ok(None),
                other => other.as_i64().map(Some).ok_or_else(|| {
                    RuntimeError::type_error(
                        "slice indices must be integers or None or have an __index__ method",
                    )
                }),
            }
        };
        let len = len as i64;
        let step = bound(&self.step)?.unwrap_or(1);
        if step == 0 {
            return Err(RuntimeError::value_error("slice step cannot be zero"));
        }
        let clamp = |v: i64, lower: i64, upper: i64| v.max(lower).min(upper);
        let resolve = |v: Option<i64>, default: i64| -> i64 {
            match v {
                None => default,
                Some(i) if i < 0 => {
                    if step > 0 {
                        clamp(i + len, 0, len)
                    } else {
                        clamp(i + len, -1, len - 1)
                    }
                }
                Some(i) => {
                    if step > 0 {
                        clamp(i, 0, len)
                    } else {
                        clamp(i, -1, len - 1)
                    }
                }
            }
        };
        let (start, stop) = if step > 0 {
            (resolve(bound(&self.start)?, 0), resolve(bound(&self.stop)?, len))
        } else {
            (resolve(bound(&self.start)?, len - 1), resolve(bound(&self.stop)?, -1))
        };
        Ok((start, stop, step))
    }

    pub fn positions(&self, len: usize) -> RtResult<Vec<usize>> {
        let (start, stop, step) = self.indices(len)?;
        let mut out = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            out.push(i as usize);
            i += step;
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    Str,
    Dt,
    Cat,
    ILoc,
    Loc,
}

impl AccessorKind {
    pub fn type_name(self) -> &'static str {
        match self {
            AccessorKind::Str => "StringMethods",
            AccessorKind::Dt => "DatetimeProperties",
            AccessorKind::Cat => "CategoricalAccessor",
            AccessorKind::ILoc => "_iLocIndexer",
            AccessorKind::Loc => "_LocIndexer",
        }
    }
}

pub struct Accessor {
    pub kind: AccessorKind,
    pub target: Value,
}

pub enum FunctionBody {
    Block(Rc<Vec<Stmt>>),
    Lambda(Rc<Expr>),
}

pub struct Function {
    pub name: String,
    pub params: Vec<(String, Option<Value>)>,
    pub body: FunctionBody,
    pub closure: Rc<Env>,
    pub line: usize,
    pub source: Rc<Vec<String>>,
}

pub struct Builtin {
    pub name: &'static str,
    pub func: NativeFn,
}

pub struct BoundMethod {
    pub receiver: Value,
    pub name: String,
}

pub struct ModuleObject {
    pub name: &'static str,
    pub attrs: HashMap<&'static str, Value>,
}

/// Positional and keyword arguments of one call.
#[derive(Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    pub fn with_keyword(mut self, name: &str, value: Value) -> Self {
        self.keywords.push((name.to_string(), value));
        self
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Looks an argument up by keyword, then by position.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.keyword(name).or_else(|| self.positional.get(index))
    }

    /// Like [`CallArgs::get`] but treats an explicit `None` as absent.
    pub fn get_some(&self, index: usize, name: &str) -> Option<&Value> {
        self.get(index, name).filter(|v| !matches!(v, Value::None))
    }

    pub fn require(&self, index: usize, name: &str, func: &str) -> RtResult<&Value> {
        self.get(index, name).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "{func}() missing 1 required positional argument: '{name}'"
            ))
        })
    }

    pub fn flag(&self, index: usize, name: &str, default: bool) -> RtResult<bool> {
        match self.get(index, name) {
            Some(value) => value.truthy(),
            None => Ok(default),
        }
    }

    pub fn int(&self, index: usize, name: &str, default: i64) -> RtResult<i64> {
        match self.get(index, name) {
            None | Some(Value::None) => Ok(default),
            Some(value) => value.as_i64().ok_or_else(|| {
                RuntimeError::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    value.type_name()
                ))
            }),
        }
    }

    pub fn max_positional(&self, max: usize, func: &str) -> RtResult<()> {
        if self.positional.len() > max {
            return Err(RuntimeError::type_error(format!(
                "{func}() takes at most {max} positional arguments ({} given)",
                self.positional.len()
            )));
        }
        Ok(())
    }
}

pub fn exception_instance(kind: ErrorKind, message: impl Into<String>) -> Value {
    Value::Exception(Rc::new(RuntimeError::new(kind, message)))
}
