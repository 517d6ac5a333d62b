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

//! Tree-walking evaluator for aggregation scripts.
//!
//! Every statement and expression consumes one unit of gas; native
//! operations over whole columns charge per element. When the budget runs
//! out the interpreter raises `ExecutionLimitExceeded`, which scripts cannot
//! catch.

use crate::ast::{
    BinOp, BoolOp, CmpOp, Comprehension, Constant, ExceptHandler, Expr, FStringPart, Keyword, Module,
    Param, Stmt, StmtKind,
};
use crate::error::{ErrorKind, RtResult, RuntimeError, ScriptError};
use crate::parser::parse;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, trace};

use super::format::{format_value, repr, to_str};
use super::frame;
use super::ops;
use super::series::unique_values;
use super::value::{
    CallArgs, Dict, Function, FunctionBody, SliceValue, Value,
};
use super::{builtins, methods, modules};

/// Frames kept on a traceback before further callers are dropped.
const MAX_TRACEBACK: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Gas available to one interpreter.
    pub max_steps: u64,
    /// Nested function calls allowed before `RecursionError`.
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 5_000_000,
            max_depth: 200,
        }
    }
}

/// One lexical frame. Function calls and comprehensions chain a child to
/// the environment they close over.
pub struct Env {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Env>>,
}

impl Env {
    pub fn new(parent: Option<Rc<Env>>) -> Rc<Env> {
        Rc::new(Env {
            vars: RefCell::new(HashMap::new()),
            parent,
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(name))
    }

    pub fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }
}

/// The global namespace a script runs in.
#[derive(Clone)]
pub struct Scope(Rc<Env>);

impl Scope {
    pub fn new() -> Self {
        Scope(Env::new(None))
    }

    pub fn set(&self, name: &str, value: Value) {
        self.0.set(name, value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.lookup(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.vars.borrow().contains_key(name)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter {
    limits: Limits,
    gas: u64,
    depth: usize,
    line: usize,
    builtins: HashMap<&'static str, Value>,
    /// Exceptions whose handlers are running, innermost last.
    handling: Vec<Rc<RuntimeError>>,
    source: Rc<Vec<String>>,
}

impl Interpreter {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            gas: limits.max_steps,
            depth: 0,
            line: 0,
            builtins: builtins::table(),
            handling: Vec::new(),
            source: Rc::new(Vec::new()),
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Remaining gas.
    pub fn gas(&self) -> u64 {
        self.gas
    }

    pub fn consume_gas(&mut self, amount: u64) -> RtResult<()> {
        if amount > self.gas {
            self.gas = 0;
            return Err(RuntimeError::new(
                ErrorKind::ExecutionLimitExceeded,
                format!("step budget of {} exhausted", self.limits.max_steps),
            ));
        }
        self.gas -= amount;
        Ok(())
    }

    /// Parses and runs `source` as a module in `scope`.
    pub fn run(&mut self, source: &str, scope: &Scope) -> Result<(), ScriptError> {
        let module = parse(source)?;
        self.exec_module(&module, source, scope)?;
        Ok(())
    }

    pub fn exec_module(&mut self, module: &Module, source: &str, scope: &Scope) -> RtResult<()> {
        self.source = Rc::new(source.lines().map(str::to_string).collect());
        let env = scope.0.clone();
        match self.exec_block(&module.body, &env) {
            Ok(_) => {
                debug!(gas_left = self.gas, "Module body finished");
                Ok(())
            }
            Err(mut err) => {
                err.push_frame("<module>", self.line, &self.source);
                Err(err)
            }
        }
    }

    /// Calls `func` with positional arguments only.
    pub fn call(&mut self, func: &Value, args: Vec<Value>) -> RtResult<Value> {
        self.call_value(func, CallArgs::new(args))
    }

    pub fn call_value(&mut self, func: &Value, args: CallArgs) -> RtResult<Value> {
        match func {
            Value::Function(function) => self.call_function(function, args),
            Value::Builtin(builtin) => (builtin.func)(self, args),
            Value::Method(method) => {
                methods::call_method(self, &method.receiver, &method.name, args)
            }
            Value::ExceptionType(kind) => Ok(exception_from_args(*kind, &args)),
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(&mut self, function: &Rc<Function>, args: CallArgs) -> RtResult<Value> {
        if self.depth >= self.limits.max_depth {
            return Err(RuntimeError::new(
                ErrorKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        let env = Env::new(Some(function.closure.clone()));
        bind_params(function, args, &env)?;
        self.depth += 1;
        let caller_line = self.line;
        let result = match &function.body {
            FunctionBody::Block(body) => self.exec_block(body, &env).map(|flow| match flow {
                Flow::Return(value) => value,
                _ => Value::None,
            }),
            FunctionBody::Lambda(body) => self.eval(body, &env),
        };
        self.depth -= 1;
        self.line = caller_line;
        result.map_err(|mut err| {
            if err.traceback.len() < MAX_TRACEBACK {
                err.push_frame(&function.name, function.line, &function.source);
            } else {
                err.pending_line = None;
            }
            err
        })
    }

    fn exec_block(&mut self, body: &[Stmt], env: &Rc<Env>) -> RtResult<Flow> {
        for stmt in body {
            match self.exec_stmt(stmt, env)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Rc<Env>) -> RtResult<Flow> {
        self.consume_gas(1)?;
        self.line = stmt.line;
        self.exec_kind(stmt, env).map_err(|err| err.mark_line(stmt.line))
    }

    fn exec_kind(&mut self, stmt: &Stmt, env: &Rc<Env>) -> RtResult<Flow> {
        match &stmt.kind {
            StmtKind::FunctionDef { name, params, body } => {
                let function = Function {
                    name: name.clone(),
                    params: self.eval_params(params, env)?,
                    body: FunctionBody::Block(Rc::new(body.clone())),
                    closure: env.clone(),
                    line: stmt.line,
                    source: self.source.clone(),
                };
                env.set(name, Value::Function(Rc::new(function)));
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::If { test, body, orelse } => {
                let branch = if self.eval(test, env)?.truthy()? { body } else { orelse };
                return self.exec_block(branch, env);
            }
            StmtKind::For { target, iter, body } => {
                let iterable = self.eval(iter, env)?;
                for item in ops::iterate(&iterable)? {
                    self.assign(target, item, env)?;
                    match self.exec_block(body, env)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::While { test, body } => {
                while self.eval(test, env)?.truthy()? {
                    match self.exec_block(body, env)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, env)?;
                for target in targets {
                    self.assign(target, value.clone(), env)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value, env)?,
            StmtKind::Expr(expr) => {
                self.eval(expr, env)?;
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.exec_try(body, handlers, orelse, finalbody, env),
            StmtKind::Raise(value) => return Err(self.raise(value.as_ref(), env)?),
            StmtKind::Assert { test, msg } => {
                if !self.eval(test, env)?.truthy()? {
                    let message = match msg {
                        Some(expr) => to_str(&self.eval(expr, env)?),
                        None => String::new(),
                    };
                    return Err(RuntimeError::new(ErrorKind::AssertionError, message));
                }
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    let module = modules::import(&alias.name).ok_or_else(|| {
                        RuntimeError::new(
                            ErrorKind::ModuleNotFoundError,
                            format!("No module named '{}'", alias.name),
                        )
                    })?;
                    let bound = alias.asname.as_deref().unwrap_or(&alias.name);
                    env.set(bound, module);
                }
            }
            StmtKind::ImportFrom { module, names } => {
                let Some(Value::Module(object)) = modules::import(module) else {
                    return Err(RuntimeError::new(
                        ErrorKind::ModuleNotFoundError,
                        format!("No module named '{module}'"),
                    ));
                };
                for alias in names {
                    let value = object.attrs.get(alias.name.as_str()).cloned().ok_or_else(|| {
                        RuntimeError::new(
                            ErrorKind::ImportError,
                            format!("cannot import name '{}' from '{module}'", alias.name),
                        )
                    })?;
                    env.set(alias.asname.as_deref().unwrap_or(&alias.name), value);
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
        env: &Rc<Env>,
    ) -> RtResult<Flow> {
        let outcome = match self.exec_block(body, env) {
            Ok(Flow::Normal) => self.exec_block(orelse, env),
            Ok(flow) => Ok(flow),
            Err(err) => self.handle(err, handlers, env),
        };
        if finalbody.is_empty() {
            return outcome;
        }
        match self.exec_block(finalbody, env)? {
            Flow::Normal => outcome,
            flow => Ok(flow),
        }
    }

    fn handle(&mut self, err: RuntimeError, handlers: &[ExceptHandler], env: &Rc<Env>) -> RtResult<Flow> {
        if err.kind == ErrorKind::ExecutionLimitExceeded {
            return Err(err);
        }
        for handler in handlers {
            if !self.handler_matches(handler, err.kind, env)? {
                continue;
            }
            trace!(kind = %err.kind, line = handler.line, "Exception caught");
            let exception = Rc::new(err);
            if let Some(name) = &handler.name {
                env.set(name, Value::Exception(exception.clone()));
            }
            self.handling.push(exception);
            let result = self.exec_block(&handler.body, env);
            self.handling.pop();
            return result;
        }
        Err(err)
    }

    fn handler_matches(&mut self, handler: &ExceptHandler, kind: ErrorKind, env: &Rc<Env>) -> RtResult<bool> {
        let Some(expr) = &handler.kind else {
            return Ok(true);
        };
        let spec = self.eval(expr, env)?;
        exception_matches(&spec, kind)
    }

    /// Builds the error a `raise` statement throws.
    fn raise(&mut self, value: Option<&Expr>, env: &Rc<Env>) -> RtResult<RuntimeError> {
        let Some(expr) = value else {
            return match self.handling.last() {
                Some(active) => Ok(fresh(active)),
                None => Err(RuntimeError::new(
                    ErrorKind::RuntimeError,
                    "No active exception to reraise",
                )),
            };
        };
        match self.eval(expr, env)? {
            Value::ExceptionType(kind) => Ok(RuntimeError::new(kind, "")),
            Value::Exception(exception) => Ok(fresh(&exception)),
            _ => Err(RuntimeError::type_error(
                "exceptions must derive from BaseException",
            )),
        }
    }

    fn eval_params(&mut self, params: &[Param], env: &Rc<Env>) -> RtResult<Vec<(String, Option<Value>)>> {
        params
            .iter()
            .map(|param| {
                let default = match &param.default {
                    Some(expr) => Some(self.eval(expr, env)?),
                    None => None,
                };
                Ok((param.name.clone(), default))
            })
            .collect()
    }

    fn lookup(&self, name: &str, env: &Rc<Env>) -> RtResult<Value> {
        env.lookup(name)
            .or_else(|| self.builtins.get(name).cloned())
            .ok_or_else(|| RuntimeError::name_error(name))
    }

    pub(crate) fn eval(&mut self, expr: &Expr, env: &Rc<Env>) -> RtResult<Value> {
        self.consume_gas(1)?;
        match expr {
            Expr::Name(name) => self.lookup(name, env),
            Expr::Constant(constant) => Ok(constant_value(constant)),
            Expr::FString(parts) => self.eval_fstring(parts, env),
            Expr::List(items) => Ok(Value::list(self.eval_items(items, env)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_items(items, env)?)),
            Expr::Set(items) => {
                let items = self.eval_items(items, env)?;
                Ok(Value::list(unique_values(&items)?))
            }
            Expr::Dict(pairs) => {
                let mut dict = Dict::new();
                for (key, value) in pairs {
                    let key = self.eval(key, env)?;
                    let value = self.eval(value, env)?;
                    dict.insert(key, value)?;
                }
                Ok(Value::dict(dict))
            }
            Expr::BinOp { left, op, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                self.binary(*op, &left, &right)
            }
            Expr::UnaryOp { op, operand } => {
                let operand = self.eval(operand, env)?;
                ops::unary_op(*op, &operand)
            }
            Expr::BoolOp { op, values } => {
                let mut last = Value::None;
                for value in values {
                    last = self.eval(value, env)?;
                    let truthy = last.truthy()?;
                    match op {
                        BoolOp::And if !truthy => return Ok(last),
                        BoolOp::Or if truthy => return Ok(last),
                        _ => {}
                    }
                }
                Ok(last)
            }
            Expr::Compare {
                left,
                ops: operators,
                comparators,
            } => self.eval_compare(left, operators, comparators, env),
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                if let Expr::Attribute { value, attr } = func.as_ref() {
                    let receiver = self.eval(value, env)?;
                    let args = self.eval_call_args(args, keywords, env)?;
                    return methods::call_method(self, &receiver, attr, args);
                }
                let callee = self.eval(func, env)?;
                let args = self.eval_call_args(args, keywords, env)?;
                self.call_value(&callee, args)
            }
            Expr::Attribute { value, attr } => {
                let value = self.eval(value, env)?;
                methods::get_attribute(&value, attr)
            }
            Expr::Subscript { value, index } => {
                let container = self.eval(value, env)?;
                let index = self.eval(index, env)?;
                ops::get_item(&container, &index)
            }
            Expr::Slice { lower, upper, step } => {
                let mut bound = |part: &Option<Box<Expr>>| -> RtResult<Value> {
                    match part {
                        Some(expr) => self.eval(expr, env),
                        None => Ok(Value::None),
                    }
                };
                let start = bound(lower)?;
                let stop = bound(upper)?;
                let step = bound(step)?;
                Ok(Value::Slice(Rc::new(SliceValue { start, stop, step })))
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test, env)?.truthy()? {
                    self.eval(body, env)
                } else {
                    self.eval(orelse, env)
                }
            }
            Expr::Lambda { params, body } => {
                let function = Function {
                    name: "<lambda>".to_string(),
                    params: self.eval_params(params, env)?,
                    body: FunctionBody::Lambda(Rc::new(body.as_ref().clone())),
                    closure: env.clone(),
                    line: self.line,
                    source: self.source.clone(),
                };
                Ok(Value::Function(Rc::new(function)))
            }
            Expr::ListComp { elt, generators } | Expr::GeneratorExp { elt, generators } => {
                Ok(Value::list(self.collect_comprehension(elt, generators, env)?))
            }
            Expr::SetComp { elt, generators } => {
                let items = self.collect_comprehension(elt, generators, env)?;
                Ok(Value::list(unique_values(&items)?))
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                let scope = Env::new(Some(env.clone()));
                let mut dict = Dict::new();
                self.comprehend(generators, &scope, &mut |interp, env| {
                    let k = interp.eval(key, env)?;
                    let v = interp.eval(value, env)?;
                    dict.insert(k, v)
                })?;
                Ok(Value::dict(dict))
            }
            Expr::Starred(_) => Err(RuntimeError::type_error(
                "can't use starred expression here",
            )),
        }
    }

    fn eval_fstring(&mut self, parts: &[FStringPart], env: &Rc<Env>) -> RtResult<Value> {
        let mut out = String::new();
        for part in parts {
            match part {
                FStringPart::Literal(text) => out.push_str(text),
                FStringPart::Field {
                    expr,
                    conversion,
                    spec,
                } => {
                    let mut value = self.eval(expr, env)?;
                    match conversion {
                        Some('r') | Some('a') => value = Value::str(repr(&value)),
                        Some('s') => value = Value::str(to_str(&value)),
                        _ => {}
                    }
                    match spec {
                        Some(spec) => out.push_str(&format_value(&value, spec)?),
                        None => out.push_str(&to_str(&value)),
                    }
                }
            }
        }
        Ok(Value::str(out))
    }

    fn eval_compare(
        &mut self,
        left: &Expr,
        operators: &[CmpOp],
        comparators: &[Expr],
        env: &Rc<Env>,
    ) -> RtResult<Value> {
        let mut left = self.eval(left, env)?;
        let mut result = Value::Bool(true);
        for (position, (op, comparator)) in operators.iter().zip(comparators).enumerate() {
            let right = self.eval(comparator, env)?;
            result = ops::compare_op(*op, &left, &right)?;
            if position + 1 < operators.len() && !result.truthy()? {
                return Ok(result);
            }
            left = right;
        }
        Ok(result)
    }

    /// Evaluates a display's elements, expanding `*iterable`.
    fn eval_items(&mut self, items: &[Expr], env: &Rc<Env>) -> RtResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if let Expr::Starred(inner) = item {
                let iterable = self.eval(inner, env)?;
                out.extend(ops::iterate(&iterable)?);
            } else {
                out.push(self.eval(item, env)?);
            }
        }
        Ok(out)
    }

    fn eval_call_args(&mut self, args: &[Expr], keywords: &[Keyword], env: &Rc<Env>) -> RtResult<CallArgs> {
        let positional = self.eval_items(args, env)?;
        let mut call = CallArgs::new(positional);
        for keyword in keywords {
            let value = self.eval(&keyword.value, env)?;
            match &keyword.arg {
                Some(name) => call.keywords.push((name.clone(), value)),
                None => {
                    let Value::Dict(mapping) = &value else {
                        return Err(RuntimeError::type_error(format!(
                            "argument after ** must be a mapping, not {}",
                            value.type_name()
                        )));
                    };
                    for (key, item) in mapping.borrow().items() {
                        let Value::Str(name) = key else {
                            return Err(RuntimeError::type_error("keywords must be strings"));
                        };
                        call.keywords.push((name.to_string(), item));
                    }
                }
            }
        }
        Ok(call)
    }

    fn collect_comprehension(
        &mut self,
        elt: &Expr,
        generators: &[Comprehension],
        env: &Rc<Env>,
    ) -> RtResult<Vec<Value>> {
        let scope = Env::new(Some(env.clone()));
        let mut out = Vec::new();
        self.comprehend(generators, &scope, &mut |interp, env| {
            out.push(interp.eval(elt, env)?);
            Ok(())
        })?;
        Ok(out)
    }

    fn comprehend(
        &mut self,
        generators: &[Comprehension],
        env: &Rc<Env>,
        emit: &mut dyn FnMut(&mut Self, &Rc<Env>) -> RtResult<()>,
    ) -> RtResult<()> {
        let Some((first, rest)) = generators.split_first() else {
            return emit(self, env);
        };
        let iterable = self.eval(&first.iter, env)?;
        'items: for item in ops::iterate(&iterable)? {
            self.assign(&first.target, item, env)?;
            for condition in &first.ifs {
                if !self.eval(condition, env)?.truthy()? {
                    continue 'items;
                }
            }
            self.comprehend(rest, env, emit)?;
        }
        Ok(())
    }

    fn assign(&mut self, target: &Expr, value: Value, env: &Rc<Env>) -> RtResult<()> {
        match target {
            Expr::Name(name) => {
                env.set(name, value);
                Ok(())
            }
            Expr::Tuple(targets) | Expr::List(targets) => {
                let values = ops::iterate(&value)?;
                self.unpack(targets, values, env)
            }
            Expr::Subscript { value: container, index } => {
                let container = self.eval(container, env)?;
                let index = self.eval(index, env)?;
                ops::set_item(&container, &index, value)
            }
            Expr::Attribute { value: object, attr } => {
                let object = self.eval(object, env)?;
                set_attribute(&object, attr, value)
            }
            _ => Err(RuntimeError::type_error("cannot assign to expression")),
        }
    }

    fn unpack(&mut self, targets: &[Expr], values: Vec<Value>, env: &Rc<Env>) -> RtResult<()> {
        let starred = targets.iter().position(|t| matches!(t, Expr::Starred(_)));
        let Some(star) = starred else {
            if values.len() > targets.len() {
                return Err(RuntimeError::value_error(format!(
                    "too many values to unpack (expected {})",
                    targets.len()
                )));
            }
            if values.len() < targets.len() {
                return Err(RuntimeError::value_error(format!(
                    "not enough values to unpack (expected {}, got {})",
                    targets.len(),
                    values.len()
                )));
            }
            for (target, value) in targets.iter().zip(values) {
                self.assign(target, value, env)?;
            }
            return Ok(());
        };
        let after = targets.len() - star - 1;
        if values.len() < star + after {
            return Err(RuntimeError::value_error(format!(
                "not enough values to unpack (expected at least {}, got {})",
                star + after,
                values.len()
            )));
        }
        let mut values = values;
        let tail = values.split_off(values.len() - after);
        let middle = values.split_off(star);
        for (target, value) in targets[..star].iter().zip(values) {
            self.assign(target, value, env)?;
        }
        if let Expr::Starred(inner) = &targets[star] {
            self.assign(inner, Value::list(middle), env)?;
        }
        for (target, value) in targets[star + 1..].iter().zip(tail) {
            self.assign(target, value, env)?;
        }
        Ok(())
    }

    /// Sequence repetition is charged per element built.
    fn binary(&mut self, op: BinOp, left: &Value, right: &Value) -> RtResult<Value> {
        self.consume_gas(ops::repeat_cost(op, left, right)?)?;
        ops::binary_op(op, left, right)
    }

    fn aug_assign(&mut self, target: &Expr, op: BinOp, value: &Expr, env: &Rc<Env>) -> RtResult<()> {
        match target {
            Expr::Name(name) => {
                let current = self.lookup(name, env)?;
                let operand = self.eval(value, env)?;
                if let (BinOp::Add, Value::List(items)) = (op, &current) {
                    let extra = ops::iterate(&operand)?;
                    self.consume_gas(extra.len() as u64)?;
                    items.borrow_mut().extend(extra);
                    env.set(name, current);
                    return Ok(());
                }
                let result = self.binary(op, &current, &operand)?;
                env.set(name, result);
                Ok(())
            }
            Expr::Subscript { value: container, index } => {
                let container = self.eval(container, env)?;
                let index = self.eval(index, env)?;
                let current = ops::get_item(&container, &index)?;
                let operand = self.eval(value, env)?;
                let result = self.binary(op, &current, &operand)?;
                ops::set_item(&container, &index, result)
            }
            Expr::Attribute { value: object, attr } => {
                let object = self.eval(object, env)?;
                let current = methods::get_attribute(&object, attr)?;
                let operand = self.eval(value, env)?;
                let result = self.binary(op, &current, &operand)?;
                set_attribute(&object, attr, result)
            }
            _ => Err(RuntimeError::type_error(
                "illegal expression for augmented assignment",
            )),
        }
    }
}

fn bind_params(function: &Function, args: CallArgs, env: &Rc<Env>) -> RtResult<()> {
    let name = &function.name;
    let expected = function.params.len();
    if args.positional.len() > expected {
        let noun = if expected == 1 { "argument" } else { "arguments" };
        let verb = if args.positional.len() == 1 { "was" } else { "were" };
        return Err(RuntimeError::type_error(format!(
            "{name}() takes {expected} positional {noun} but {} {verb} given",
            args.positional.len()
        )));
    }
    let mut slots: Vec<Option<Value>> = vec![None; expected];
    for (slot, value) in slots.iter_mut().zip(args.positional) {
        *slot = Some(value);
    }
    for (keyword, value) in args.keywords {
        let Some(position) = function.params.iter().position(|(p, _)| *p == keyword) else {
            return Err(RuntimeError::type_error(format!(
                "{name}() got an unexpected keyword argument '{keyword}'"
            )));
        };
        if slots[position].is_some() {
            return Err(RuntimeError::type_error(format!(
                "{name}() got multiple values for argument '{keyword}'"
            )));
        }
        slots[position] = Some(value);
    }
    for ((param, default), slot) in function.params.iter().zip(slots) {
        let value = slot.or_else(|| default.clone()).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "{name}() missing 1 required positional argument: '{param}'"
            ))
        })?;
        env.set(param, value);
    }
    Ok(())
}

fn constant_value(constant: &Constant) -> Value {
    match constant {
        Constant::None => Value::None,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(i) => Value::Int(*i),
        Constant::Float(f) => Value::Float(*f),
        Constant::Str(s) => Value::str(s),
        Constant::Bytes(b) => Value::Bytes(Rc::from(b.as_slice())),
    }
}

/// A re-raised exception starts a new traceback.
fn fresh(exception: &RuntimeError) -> RuntimeError {
    RuntimeError::new(exception.kind, exception.message.clone())
}

fn exception_matches(spec: &Value, kind: ErrorKind) -> RtResult<bool> {
    match spec {
        Value::ExceptionType(handler) => Ok(kind.caught_by(*handler)),
        Value::Tuple(items) => {
            for item in items.iter() {
                if exception_matches(item, kind)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(RuntimeError::type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

/// `KeyError('x')` keeps the repr of its argument; other kinds keep its text.
pub(crate) fn exception_from_args(kind: ErrorKind, args: &CallArgs) -> Value {
    let message = match args.positional.as_slice() {
        [] => String::new(),
        [single] if kind == ErrorKind::KeyError => repr(single),
        [single] => to_str(single),
        many => repr(&Value::tuple(many.to_vec())),
    };
    Value::Exception(Rc::new(RuntimeError::new(kind, message)))
}

fn set_attribute(object: &Value, attr: &str, value: Value) -> RtResult<()> {
    match object {
        Value::Frame(target) => {
            let mut data = target.borrow_mut();
            match attr {
                "columns" => frame::set_columns(&mut data, &value),
                "index" => {
                    let labels = ops::iterate(&value)?;
                    if labels.len() != data.len() {
                        return Err(RuntimeError::value_error(format!(
                            "Length mismatch: Expected axis has {} elements, new values have {} elements",
                            data.len(),
                            labels.len()
                        )));
                    }
                    data.reindex_rows(Rc::new(labels), Vec::new());
                    Ok(())
                }
                name if data.columns.contains_key(name) => data.set_column(name, &value),
                _ => Err(RuntimeError::attribute_error(
                    "Pandas doesn't allow columns to be created via a new attribute name",
                )),
            }
        }
        other => Err(RuntimeError::attribute_error(format!(
            "'{}' object attribute '{attr}' is read-only",
            other.type_name()
        ))),
    }
}
