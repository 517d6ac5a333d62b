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

//! Renders a syntax tree back to canonical source.
//!
//! Output is normalised: four-space indentation, minimal parentheses and a
//! single quoting style. Parsing the output yields the same tree, so
//! `unparse(parse(unparse(m)))` is a fixed point.

use crate::ast::{
    BinOp, BoolOp, Comprehension, Constant, ExceptHandler, Expr, FStringPart, Keyword, Module,
    Param, Stmt, StmtKind, UnaryOp,
};

const PREC_TEST: u8 = 1;
const PREC_OR: u8 = 2;
const PREC_AND: u8 = 3;
const PREC_NOT: u8 = 4;
const PREC_CMP: u8 = 5;
const PREC_BOR: u8 = 6;
const PREC_BXOR: u8 = 7;
const PREC_BAND: u8 = 8;
const PREC_SHIFT: u8 = 9;
const PREC_ARITH: u8 = 10;
const PREC_TERM: u8 = 11;
const PREC_FACTOR: u8 = 12;
const PREC_POWER: u8 = 13;
const PREC_ATOM: u8 = 14;

pub fn unparse(module: &Module) -> String {
    let mut out = String::new();
    write_body(&mut out, &module.body, 0);
    out
}

pub fn unparse_expr(expr: &Expr) -> String {
    expr_to_string(expr, PREC_TEST)
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("    ");
    }
}

fn write_body(out: &mut String, body: &[Stmt], level: usize) {
    for stmt in body {
        write_stmt(out, stmt, level);
    }
}

fn write_block(out: &mut String, header: &str, body: &[Stmt], level: usize) {
    indent(out, level);
    out.push_str(header);
    out.push_str(":\n");
    write_body(out, body, level + 1);
}

fn params_to_string(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| match &p.default {
            Some(default) => format!("{}={}", p.name, expr_to_string(default, PREC_TEST)),
            None => p.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_if(out: &mut String, keyword: &str, test: &Expr, body: &[Stmt], orelse: &[Stmt], level: usize) {
    write_block(out, &format!("{keyword} {}", expr_to_string(test, PREC_TEST)), body, level);
    if let [Stmt {
        kind: StmtKind::If { test, body, orelse },
        ..
    }] = orelse
    {
        write_if(out, "elif", test, body, orelse, level);
    } else if !orelse.is_empty() {
        write_block(out, "else", orelse, level);
    }
}

fn write_handler(out: &mut String, handler: &ExceptHandler, level: usize) {
    let header = match (&handler.kind, &handler.name) {
        (None, _) => "except".to_string(),
        (Some(kind), None) => format!("except {}", expr_to_string(kind, PREC_TEST)),
        (Some(kind), Some(name)) => format!("except {} as {name}", expr_to_string(kind, PREC_TEST)),
    };
    write_block(out, &header, &handler.body, level);
}

fn write_stmt(out: &mut String, stmt: &Stmt, level: usize) {
    let simple = match &stmt.kind {
        StmtKind::FunctionDef { name, params, body } => {
            write_block(out, &format!("def {name}({})", params_to_string(params)), body, level);
            return;
        }
        StmtKind::If { test, body, orelse } => {
            write_if(out, "if", test, body, orelse, level);
            return;
        }
        StmtKind::For { target, iter, body } => {
            let header = format!(
                "for {} in {}",
                expr_to_string(target, PREC_TEST),
                expr_to_string(iter, PREC_TEST)
            );
            write_block(out, &header, body, level);
            return;
        }
        StmtKind::While { test, body } => {
            write_block(out, &format!("while {}", expr_to_string(test, PREC_TEST)), body, level);
            return;
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            write_block(out, "try", body, level);
            for handler in handlers {
                write_handler(out, handler, level);
            }
            if !orelse.is_empty() {
                write_block(out, "else", orelse, level);
            }
            if !finalbody.is_empty() {
                write_block(out, "finally", finalbody, level);
            }
            return;
        }
        StmtKind::Return(None) => "return".to_string(),
        StmtKind::Return(Some(value)) => format!("return {}", expr_to_string(value, PREC_TEST)),
        StmtKind::Raise(None) => "raise".to_string(),
        StmtKind::Raise(Some(value)) => format!("raise {}", expr_to_string(value, PREC_TEST)),
        StmtKind::Break => "break".to_string(),
        StmtKind::Continue => "continue".to_string(),
        StmtKind::Pass => "pass".to_string(),
        StmtKind::Assign { targets, value } => {
            let mut line = String::new();
            for target in targets {
                line.push_str(&expr_to_string(target, PREC_TEST));
                line.push_str(" = ");
            }
            line.push_str(&expr_to_string(value, PREC_TEST));
            line
        }
        StmtKind::AugAssign { target, op, value } => format!(
            "{} {}= {}",
            expr_to_string(target, PREC_TEST),
            op.symbol(),
            expr_to_string(value, PREC_TEST)
        ),
        StmtKind::Expr(expr) => expr_to_string(expr, PREC_TEST),
        StmtKind::Assert { test, msg } => match msg {
            Some(msg) => format!(
                "assert {}, {}",
                expr_to_string(test, PREC_TEST),
                expr_to_string(msg, PREC_TEST)
            ),
            None => format!("assert {}", expr_to_string(test, PREC_TEST)),
        },
        StmtKind::Import(names) => format!("import {}", aliases(names)),
        StmtKind::ImportFrom { module, names } => format!("from {module} import {}", aliases(names)),
    };
    indent(out, level);
    out.push_str(&simple);
    out.push('\n');
}

fn aliases(names: &[crate::ast::Alias]) -> String {
    names
        .iter()
        .map(|a| match &a.asname {
            Some(asname) => format!("{} as {asname}", a.name),
            None => a.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn binop_precedence(op: BinOp) -> u8 {
    match op {
        BinOp::BitOr => PREC_BOR,
        BinOp::BitXor => PREC_BXOR,
        BinOp::BitAnd => PREC_BAND,
        BinOp::LShift | BinOp::RShift => PREC_SHIFT,
        BinOp::Add | BinOp::Sub => PREC_ARITH,
        BinOp::Mul | BinOp::Div | BinOp::FloorDiv | BinOp::Mod | BinOp::MatMul => PREC_TERM,
        BinOp::Pow => PREC_POWER,
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Lambda { .. } | Expr::IfExp { .. } => PREC_TEST,
        Expr::BoolOp { op: BoolOp::Or, .. } => PREC_OR,
        Expr::BoolOp { op: BoolOp::And, .. } => PREC_AND,
        Expr::UnaryOp { op: UnaryOp::Not, .. } => PREC_NOT,
        Expr::Compare { .. } => PREC_CMP,
        Expr::BinOp { op, .. } => binop_precedence(*op),
        Expr::UnaryOp { .. } => PREC_FACTOR,
        Expr::Starred(_) => PREC_BOR,
        _ => PREC_ATOM,
    }
}

fn expr_to_string(expr: &Expr, context: u8) -> String {
    let text = render(expr);
    if precedence(expr) < context {
        format!("({text})")
    } else {
        text
    }
}

fn join(items: &[Expr]) -> String {
    items
        .iter()
        .map(|item| expr_to_string(item, PREC_TEST))
        .collect::<Vec<_>>()
        .join(", ")
}

fn generators_to_string(generators: &[Comprehension]) -> String {
    let mut out = String::new();
    for generator in generators {
        out.push_str(" for ");
        out.push_str(&expr_to_string(&generator.target, PREC_TEST));
        out.push_str(" in ");
        out.push_str(&expr_to_string(&generator.iter, PREC_OR));
        for cond in &generator.ifs {
            out.push_str(" if ");
            out.push_str(&expr_to_string(cond, PREC_OR));
        }
    }
    out
}

fn keywords_to_string(keywords: &[Keyword]) -> impl Iterator<Item = String> + '_ {
    keywords.iter().map(|k| match &k.arg {
        Some(arg) => format!("{arg}={}", expr_to_string(&k.value, PREC_TEST)),
        None => format!("**{}", expr_to_string(&k.value, PREC_TEST)),
    })
}

fn render(expr: &Expr) -> String {
    match expr {
        Expr::Name(name) => name.clone(),
        Expr::Constant(constant) => constant_repr(constant),
        Expr::FString(parts) => fstring_repr(parts),
        Expr::List(items) => format!("[{}]", join(items)),
        Expr::Tuple(items) => match items.len() {
            1 => format!("({},)", expr_to_string(&items[0], PREC_TEST)),
            _ => format!("({})", join(items)),
        },
        Expr::Set(items) => format!("{{{}}}", join(items)),
        Expr::Dict(pairs) => {
            let body = pairs
                .iter()
                .map(|(k, v)| format!("{}: {}", expr_to_string(k, PREC_TEST), expr_to_string(v, PREC_TEST)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{body}}}")
        }
        Expr::BinOp { left, op, right } => {
            let prec = binop_precedence(*op);
            let (left_ctx, right_ctx) = if *op == BinOp::Pow {
                (PREC_ATOM, PREC_FACTOR)
            } else {
                (prec, prec + 1)
            };
            format!(
                "{} {} {}",
                expr_to_string(left, left_ctx),
                op.symbol(),
                expr_to_string(right, right_ctx)
            )
        }
        Expr::UnaryOp { op, operand } => match op {
            UnaryOp::Not => format!("not {}", expr_to_string(operand, PREC_NOT)),
            UnaryOp::Neg => format!("-{}", expr_to_string(operand, PREC_FACTOR)),
            UnaryOp::Pos => format!("+{}", expr_to_string(operand, PREC_FACTOR)),
            UnaryOp::Invert => format!("~{}", expr_to_string(operand, PREC_FACTOR)),
        },
        Expr::BoolOp { op, values } => {
            let (word, prec) = match op {
                BoolOp::And => (" and ", PREC_AND),
                BoolOp::Or => (" or ", PREC_OR),
            };
            values
                .iter()
                .map(|v| expr_to_string(v, prec + 1))
                .collect::<Vec<_>>()
                .join(word)
        }
        Expr::Compare {
            left,
            ops,
            comparators,
        } => {
            let mut out = expr_to_string(left, PREC_BOR);
            for (op, comparator) in ops.iter().zip(comparators) {
                out.push(' ');
                out.push_str(op.symbol());
                out.push(' ');
                out.push_str(&expr_to_string(comparator, PREC_BOR));
            }
            out
        }
        Expr::Call {
            func,
            args,
            keywords,
        } => {
            let rendered: Vec<String> = args
                .iter()
                .map(|arg| expr_to_string(arg, PREC_TEST))
                .chain(keywords_to_string(keywords))
                .collect();
            format!("{}({})", receiver(func), rendered.join(", "))
        }
        Expr::Attribute { value, attr } => format!("{}.{attr}", receiver(value)),
        Expr::Subscript { value, index } => {
            let inner = match index.as_ref() {
                Expr::Tuple(items) if !items.is_empty() => {
                    let body = items
                        .iter()
                        .map(subscript_item)
                        .collect::<Vec<_>>()
                        .join(", ");
                    if items.len() == 1 {
                        format!("{body},")
                    } else {
                        body
                    }
                }
                other => subscript_item(other),
            };
            format!("{}[{inner}]", receiver(value))
        }
        Expr::Slice { .. } => subscript_item(expr),
        Expr::IfExp { test, body, orelse } => format!(
            "{} if {} else {}",
            expr_to_string(body, PREC_OR),
            expr_to_string(test, PREC_OR),
            expr_to_string(orelse, PREC_TEST)
        ),
        Expr::Lambda { params, body } => {
            if params.is_empty() {
                format!("lambda: {}", expr_to_string(body, PREC_TEST))
            } else {
                format!("lambda {}: {}", params_to_string(params), expr_to_string(body, PREC_TEST))
            }
        }
        Expr::ListComp { elt, generators } => format!(
            "[{}{}]",
            expr_to_string(elt, PREC_TEST),
            generators_to_string(generators)
        ),
        Expr::SetComp { elt, generators } => format!(
            "{{{}{}}}",
            expr_to_string(elt, PREC_TEST),
            generators_to_string(generators)
        ),
        Expr::GeneratorExp { elt, generators } => format!(
            "({}{})",
            expr_to_string(elt, PREC_TEST),
            generators_to_string(generators)
        ),
        Expr::DictComp {
            key,
            value,
            generators,
        } => format!(
            "{{{}: {}{}}}",
            expr_to_string(key, PREC_TEST),
            expr_to_string(value, PREC_TEST),
            generators_to_string(generators)
        ),
        Expr::Starred(inner) => format!("*{}", expr_to_string(inner, PREC_BOR)),
    }
}

fn receiver(expr: &Expr) -> String {
    match expr {
        Expr::Constant(Constant::Int(_)) | Expr::Constant(Constant::Float(_)) => {
            format!("({})", render(expr))
        }
        _ => expr_to_string(expr, PREC_ATOM),
    }
}

fn subscript_item(expr: &Expr) -> String {
    match expr {
        Expr::Slice { lower, upper, step } => {
            let part = |p: &Option<Box<Expr>>| {
                p.as_ref()
                    .map(|e| expr_to_string(e, PREC_TEST))
                    .unwrap_or_default()
            };
            let mut out = format!("{}:{}", part(lower), part(upper));
            if step.is_some() {
                out.push(':');
                out.push_str(&part(step));
            }
            out
        }
        other => expr_to_string(other, PREC_TEST),
    }
}

pub fn float_literal(value: f64) -> String {
    if value.is_nan() {
        return "float('nan')".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 {
            "float('inf')".to_string()
        } else {
            "-float('inf')".to_string()
        };
    }
    let text = format!("{value:?}");
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{text}.0")
    }
}

fn constant_repr(constant: &Constant) -> String {
    match constant {
        Constant::None => "None".to_string(),
        Constant::Bool(true) => "True".to_string(),
        Constant::Bool(false) => "False".to_string(),
        Constant::Int(value) => value.to_string(),
        Constant::Float(value) => float_literal(*value),
        Constant::Str(text) => string_literal(text),
        Constant::Bytes(data) => {
            let text: String = data
                .iter()
                .map(|b| match *b {
                    b'\\' => "\\\\".to_string(),
                    b'\'' => "\\'".to_string(),
                    b'\n' => "\\n".to_string(),
                    b'\t' => "\\t".to_string(),
                    b'\r' => "\\r".to_string(),
                    0x20..=0x7e => (*b as char).to_string(),
                    other => format!("\\x{other:02x}"),
                })
                .collect();
            format!("b'{text}'")
        }
    }
}

fn escape_body(text: &str, quote: char) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Single quotes unless the text holds one and no double quote.
pub fn string_literal(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    format!("{quote}{}{quote}", escape_body(text, quote))
}

fn fstring_repr(parts: &[FStringPart]) -> String {
    let fields: Vec<String> = parts
        .iter()
        .map(|part| match part {
            FStringPart::Literal(text) => text.clone(),
            FStringPart::Field { expr, .. } => {
                let rendered = expr_to_string(expr, PREC_TEST);
                if rendered.starts_with('{') {
                    format!(" {rendered}")
                } else {
                    rendered
                }
            }
        })
        .collect();
    let uses_single = parts.iter().zip(&fields).any(|(part, text)| {
        matches!(part, FStringPart::Field { .. }) && text.contains('\'')
    });
    let quote = if uses_single { '"' } else { '\'' };

    let mut out = String::from("f");
    out.push(quote);
    for (part, text) in parts.iter().zip(fields) {
        match part {
            FStringPart::Literal(_) => {
                out.push_str(&escape_body(text.as_str(), quote).replace('{', "{{").replace('}', "}}"));
            }
            FStringPart::Field {
                conversion, spec, ..
            } => {
                out.push('{');
                out.push_str(&text);
                if let Some(conversion) = conversion {
                    out.push('!');
                    out.push(*conversion);
                }
                if let Some(spec) = spec {
                    out.push(':');
                    out.push_str(spec);
                }
                out.push('}');
            }
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn roundtrip(source: &str) -> String {
        unparse(&parse(source).unwrap())
    }

    #[test]
    fn canonicalises_layout_and_quotes() {
        let out = roundtrip("def f( df ):\n  x = df[\"a\"]  # note\n  return x\n");
        assert_eq!(out, "def f(df):\n    x = df['a']\n    return x\n");
    }

    #[test]
    fn keeps_needed_parentheses_only() {
        assert_eq!(roundtrip("y = (a + b) * c\n"), "y = (a + b) * c\n");
        assert_eq!(roundtrip("y = a + (b * c)\n"), "y = a + b * c\n");
        assert_eq!(roundtrip("y = a - (b - c)\n"), "y = a - (b - c)\n");
        assert_eq!(roundtrip("y = (-x) ** 2\n"), "y = (-x) ** 2\n");
        assert_eq!(roundtrip("m = (df['a'] > 1) & (df['b'] < 2)\n"), "m = (df['a'] > 1) & (df['b'] < 2)\n");
    }

    #[test]
    fn elif_chains_survive() {
        let src = "if a:\n    pass\nelif b:\n    pass\nelse:\n    x = 1\n";
        assert_eq!(roundtrip(src), src);
    }

    #[test]
    fn fstring_switches_quote_for_nested_strings() {
        assert_eq!(roundtrip("s = f'{d[\"k\"]:,.0f}%'\n"), "s = f\"{d['k']:,.0f}%\"\n");
    }

    #[test]
    fn floats_keep_a_decimal_point() {
        assert_eq!(roundtrip("x = 2.0 + 1e20 + 0.5\n"), "x = 2.0 + 1e20 + 0.5\n");
    }

    #[test]
    fn unparse_is_a_fixed_point() {
        let src = "import pandas as pd\nfrom math import sqrt as s\n\ndef agg(df, n=3):\n    out = {k: v for (k, v) in zip(a, b) if v}\n    try:\n        t = sorted(out.items(), key=lambda kv: -kv[1])[:n]\n    except (KeyError, ValueError) as e:\n        raise\n    finally:\n        pass\n    return {'top': t, 'n': len(t), 'g': sum((x for x in t))}\n";
        let once = roundtrip(src);
        assert_eq!(roundtrip(&once), once);
    }
}
