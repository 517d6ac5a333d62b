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

//! Turns whatever `aggregate_all_data` returned into plain JSON.
//!
//! Coercion never fails. Values with no JSON shape fall back to their
//! `repr`, cyclic containers and runaway nesting collapse to `null`.

use crate::logging::log_coercion_degraded;
use chrono::{NaiveDateTime, TimeDelta, Timelike};
use serde_json::{Map, Number, Value as Json};
use stele::runtime::{native_list, repr, to_str};
use stele::Value;
use tracing::warn;

/// Containers nested deeper than this are cut off.
const MAX_DEPTH: usize = 256;

pub fn coerce(value: &Value) -> Json {
    Coercer::default().coerce(value, 0)
}

/// ISO-8601 without a zone; fractional seconds only when present.
pub fn isoformat(ts: &NaiveDateTime) -> String {
    if ts.nanosecond() == 0 {
        ts.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

pub fn total_seconds(delta: &TimeDelta) -> f64 {
    delta.num_seconds() as f64 + f64::from(delta.subsec_nanos()) / 1e9
}

fn number(value: f64) -> Json {
    Number::from_f64(value).map_or(Json::Null, Json::Number)
}

#[derive(Default)]
struct Coercer {
    /// Containers currently being walked, to break reference cycles.
    open: Vec<*const ()>,
}

impl Coercer {
    fn coerce(&mut self, value: &Value, depth: usize) -> Json {
        if depth > MAX_DEPTH {
            warn!(depth = depth, "Result nesting too deep, truncating");
            return Json::Null;
        }
        match value {
            Value::Dict(dict) => {
                let ptr = dict.as_ptr() as *const ();
                let Ok(entries) = dict.try_borrow().map(|d| d.items()) else {
                    return Json::Null;
                };
                self.enter(ptr, |this| {
                    let mut map = Map::new();
                    for (key, item) in &entries {
                        map.insert(to_str(key), this.coerce(item, depth + 1));
                    }
                    Json::Object(map)
                })
            }
            Value::List(items) => {
                let ptr = items.as_ptr() as *const ();
                let Ok(items) = items.try_borrow().map(|l| l.clone()) else {
                    return Json::Null;
                };
                self.enter(ptr, |this| this.array(&items, depth))
            }
            Value::Tuple(items) => self.array(items, depth),
            Value::Bytes(bytes) => Json::String(String::from_utf8_lossy(bytes).into_owned()),
            Value::None => Json::Null,
            Value::Float(f) if f.is_nan() => Json::Null,
            Value::Series(series) => self.array(&series.values, depth),
            Value::Index(labels) => self.array(labels, depth),
            Value::Timestamp(ts) => Json::String(isoformat(ts)),
            Value::Timedelta(delta) => number(total_seconds(delta)),
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::Number((*i).into()),
            Value::Float(f) => number(*f),
            Value::Str(s) => Json::String(s.to_string()),
            other => match native_list(other) {
                Some(list) => self.coerce(&list, depth + 1),
                None => {
                    let rendered = repr(other);
                    log_coercion_degraded(other.type_name(), &rendered);
                    Json::String(rendered)
                }
            },
        }
    }

    fn array(&mut self, items: &[Value], depth: usize) -> Json {
        Json::Array(items.iter().map(|v| self.coerce(v, depth + 1)).collect())
    }

    fn enter(&mut self, ptr: *const (), walk: impl FnOnce(&mut Self) -> Json) -> Json {
        if self.open.contains(&ptr) {
            warn!("Result contains a reference cycle, emitting null");
            return Json::Null;
        }
        self.open.push(ptr);
        let out = walk(self);
        self.open.pop();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use serde_json::json;
    use stele::runtime::{Dict, Series};
    use std::rc::Rc;

    fn midnight(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    #[test]
    fn none_is_null() {
        assert_eq!(coerce(&Value::None), Json::Null);
        assert_eq!(coerce(&Value::Float(f64::NAN)), Json::Null);
    }

    #[test]
    fn timestamp_in_mapping_is_isoformat() {
        let mut dict = Dict::new();
        dict.insert_str("a", Value::Timestamp(midnight(2024, 1, 1)));
        assert_eq!(coerce(&Value::dict(dict)), json!({"a": "2024-01-01T00:00:00"}));
    }

    #[test]
    fn timedelta_is_total_seconds() {
        assert_eq!(coerce(&Value::Timedelta(TimeDelta::seconds(60))), json!(60.0));
        assert_eq!(
            coerce(&Value::Timedelta(TimeDelta::milliseconds(1500))),
            json!(1.5)
        );
    }

    #[test]
    fn bytes_decode_lossily() {
        assert_eq!(coerce(&Value::Bytes(Rc::from(&b"hello"[..]))), json!("hello"));
        assert_eq!(
            coerce(&Value::Bytes(Rc::from(&[0x68, 0xff][..]))),
            json!("h\u{fffd}")
        );
    }

    #[test]
    fn mapping_keys_are_string_cast_in_order() {
        let mut dict = Dict::new();
        dict.insert(Value::Int(2), Value::str("two")).unwrap();
        dict.insert(Value::str("b"), Value::Bool(true)).unwrap();
        dict.insert(Value::Int(1), Value::Float(0.5)).unwrap();
        let out = serde_json::to_string(&coerce(&Value::dict(dict))).unwrap();
        assert_eq!(out, r#"{"2":"two","b":true,"1":0.5}"#);
    }

    #[test]
    fn series_and_tuples_become_arrays() {
        let series = Series::new(
            Some("sales".into()),
            vec![Value::Int(1), Value::Float(f64::NAN), Value::Int(3)],
        );
        assert_eq!(coerce(&Value::series(series)), json!([1, null, 3]));
        let tuple = Value::tuple(vec![Value::str("x"), Value::None]);
        assert_eq!(coerce(&tuple), json!(["x", null]));
    }

    #[test]
    fn opaque_values_fall_back_to_repr() {
        let module = stele::runtime::modules::import("math").unwrap();
        let out = coerce(&module);
        assert!(out.as_str().is_some_and(|s| s.contains("math")));
    }

    #[test]
    fn self_referencing_list_terminates() {
        let list = Value::list(vec![Value::Int(1)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(coerce(&list), json!([1, null]));
    }

    #[test]
    fn infinities_have_no_json_form() {
        assert_eq!(coerce(&Value::Float(f64::INFINITY)), Json::Null);
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::None),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            any::<f64>().prop_map(Value::Float),
            ".{0,12}".prop_map(Value::str),
            proptest::collection::vec(any::<u8>(), 0..8).prop_map(|b| Value::Bytes(Rc::from(b))),
            (0i64..4_000_000_000).prop_map(|secs| Value::Timestamp(
                midnight(1970, 1, 1) + TimeDelta::seconds(secs)
            )),
            any::<i32>().prop_map(|ms| Value::Timedelta(TimeDelta::milliseconds(i64::from(ms)))),
        ]
    }

    fn tree() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::list),
                proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::tuple),
                proptest::collection::vec(inner.clone(), 0..6)
                    .prop_map(|values| Value::series(Series::new(None, values))),
                proptest::collection::vec((".{0,6}", inner), 0..6).prop_map(|pairs| {
                    let mut dict = Dict::new();
                    for (key, value) in pairs {
                        dict.insert_str(&key, value);
                    }
                    Value::dict(dict)
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn coercion_is_total_and_yields_json(value in tree()) {
            let json = coerce(&value);
            let text = serde_json::to_string(&json).unwrap();
            prop_assert!(serde_json::from_str::<Json>(&text).is_ok());
        }
    }
}
