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

//! Syntax tree for aggregation scripts plus a mutable visitor.

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

impl Stmt {
    pub fn new(kind: StmtKind, line: usize) -> Self {
        Self { kind, line }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub kind: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    FunctionDef {
        name: String,
        params: Vec<Param>,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Pass,
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    Expr(Expr),
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    Raise(Option<Expr>),
    Assert {
        test: Expr,
        msg: Option<Expr>,
    },
    Import(Vec<Alias>),
    ImportFrom {
        module: String,
        names: Vec<Alias>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    MatMul,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::MatMul => "@",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::LShift => "<<",
            BinOp::RShift => ">>",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "//" => BinOp::FloorDiv,
            "%" => BinOp::Mod,
            "**" => BinOp::Pow,
            "@" => BinOp::MatMul,
            "&" => BinOp::BitAnd,
            "|" => BinOp::BitOr,
            "^" => BinOp::BitXor,
            "<<" => BinOp::LShift,
            ">>" => BinOp::RShift,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    /// `None` for a `**mapping` spread.
    pub arg: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    Field {
        expr: Box<Expr>,
        conversion: Option<char>,
        spec: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Constant(Constant),
    FString(Vec<FStringPart>),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Set(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BoolOp {
        op: BoolOp,
        values: Vec<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOp>,
        comparators: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
    },
    ListComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    SetComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    GeneratorExp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    Starred(Box<Expr>),
}

impl Expr {
    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name(name.into())
    }

    pub fn call(func: Expr, args: Vec<Expr>, keywords: Vec<Keyword>) -> Self {
        Expr::Call {
            func: Box::new(func),
            args,
            keywords,
        }
    }
}

/// Walks the tree mutably; override a method and call the matching `walk_*`
/// function to keep descending.
pub trait VisitMut {
    fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
        walk_stmt_mut(self, stmt);
    }

    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        walk_expr_mut(self, expr);
    }
}

pub fn walk_module_mut<V: VisitMut + ?Sized>(visitor: &mut V, module: &mut Module) {
    for stmt in &mut module.body {
        visitor.visit_stmt_mut(stmt);
    }
}

fn walk_body<V: VisitMut + ?Sized>(visitor: &mut V, body: &mut [Stmt]) {
    for stmt in body {
        visitor.visit_stmt_mut(stmt);
    }
}

pub fn walk_stmt_mut<V: VisitMut + ?Sized>(visitor: &mut V, stmt: &mut Stmt) {
    match &mut stmt.kind {
        StmtKind::FunctionDef { params, body, .. } => {
            for param in params {
                if let Some(default) = &mut param.default {
                    visitor.visit_expr_mut(default);
                }
            }
            walk_body(visitor, body);
        }
        StmtKind::Return(value) | StmtKind::Raise(value) => {
            if let Some(value) = value {
                visitor.visit_expr_mut(value);
            }
        }
        StmtKind::If { test, body, orelse } => {
            visitor.visit_expr_mut(test);
            walk_body(visitor, body);
            walk_body(visitor, orelse);
        }
        StmtKind::For { target, iter, body } => {
            visitor.visit_expr_mut(target);
            visitor.visit_expr_mut(iter);
            walk_body(visitor, body);
        }
        StmtKind::While { test, body } => {
            visitor.visit_expr_mut(test);
            walk_body(visitor, body);
        }
        StmtKind::Assign { targets, value } => {
            for target in targets {
                visitor.visit_expr_mut(target);
            }
            visitor.visit_expr_mut(value);
        }
        StmtKind::AugAssign { target, value, .. } => {
            visitor.visit_expr_mut(target);
            visitor.visit_expr_mut(value);
        }
        StmtKind::Expr(expr) => visitor.visit_expr_mut(expr),
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            walk_body(visitor, body);
            for handler in handlers {
                if let Some(kind) = &mut handler.kind {
                    visitor.visit_expr_mut(kind);
                }
                walk_body(visitor, &mut handler.body);
            }
            walk_body(visitor, orelse);
            walk_body(visitor, finalbody);
        }
        StmtKind::Assert { test, msg } => {
            visitor.visit_expr_mut(test);
            if let Some(msg) = msg {
                visitor.visit_expr_mut(msg);
            }
        }
        StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Pass
        | StmtKind::Import(_)
        | StmtKind::ImportFrom { .. } => {}
    }
}

fn walk_generators<V: VisitMut + ?Sized>(visitor: &mut V, generators: &mut [Comprehension]) {
    for generator in generators {
        visitor.visit_expr_mut(&mut generator.target);
        visitor.visit_expr_mut(&mut generator.iter);
        for cond in &mut generator.ifs {
            visitor.visit_expr_mut(cond);
        }
    }
}

pub fn walk_expr_mut<V: VisitMut + ?Sized>(visitor: &mut V, expr: &mut Expr) {
    match expr {
        Expr::Name(_) | Expr::Constant(_) => {}
        Expr::FString(parts) => {
            for part in parts {
                if let FStringPart::Field { expr, .. } = part {
                    visitor.visit_expr_mut(expr);
                }
            }
        }
        Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => {
            for item in items {
                visitor.visit_expr_mut(item);
            }
        }
        Expr::Dict(pairs) => {
            for (key, value) in pairs {
                visitor.visit_expr_mut(key);
                visitor.visit_expr_mut(value);
            }
        }
        Expr::BinOp { left, right, .. } => {
            visitor.visit_expr_mut(left);
            visitor.visit_expr_mut(right);
        }
        Expr::UnaryOp { operand, .. } => visitor.visit_expr_mut(operand),
        Expr::BoolOp { values, .. } => {
            for value in values {
                visitor.visit_expr_mut(value);
            }
        }
        Expr::Compare {
            left, comparators, ..
        } => {
            visitor.visit_expr_mut(left);
            for comparator in comparators {
                visitor.visit_expr_mut(comparator);
            }
        }
        Expr::Call {
            func,
            args,
            keywords,
        } => {
            visitor.visit_expr_mut(func);
            for arg in args {
                visitor.visit_expr_mut(arg);
            }
            for keyword in keywords {
                visitor.visit_expr_mut(&mut keyword.value);
            }
        }
        Expr::Attribute { value, .. } => visitor.visit_expr_mut(value),
        Expr::Subscript { value, index } => {
            visitor.visit_expr_mut(value);
            visitor.visit_expr_mut(index);
        }
        Expr::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                visitor.visit_expr_mut(part);
            }
        }
        Expr::IfExp { test, body, orelse } => {
            visitor.visit_expr_mut(test);
            visitor.visit_expr_mut(body);
            visitor.visit_expr_mut(orelse);
        }
        Expr::Lambda { params, body } => {
            for param in params {
                if let Some(default) = &mut param.default {
                    visitor.visit_expr_mut(default);
                }
            }
            visitor.visit_expr_mut(body);
        }
        Expr::ListComp { elt, generators }
        | Expr::SetComp { elt, generators }
        | Expr::GeneratorExp { elt, generators } => {
            walk_generators(visitor, generators);
            visitor.visit_expr_mut(elt);
        }
        Expr::DictComp {
            key,
            value,
            generators,
        } => {
            walk_generators(visitor, generators);
            visitor.visit_expr_mut(key);
            visitor.visit_expr_mut(value);
        }
        Expr::Starred(inner) => visitor.visit_expr_mut(inner),
    }
}
