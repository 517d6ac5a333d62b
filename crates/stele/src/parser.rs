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

use crate::ast::{
    Alias, BinOp, BoolOp, CmpOp, Comprehension, Constant, ExceptHandler, Expr, FStringPart,
    Keyword, Module, Param, Stmt, StmtKind, UnaryOp,
};
use crate::error::SyntaxError;
use crate::lexer::{tokenize, unescape, Token, TokenKind, KEYWORDS};

type PResult<T> = Result<T, SyntaxError>;

pub fn parse(source: &str) -> PResult<Module> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(source, tokens);
    parser.parse_module()
}

/// Parses a standalone expression, as found inside f-string fields.
pub fn parse_expression(source: &str) -> PResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(source, tokens);
    let expr = parser.parse_expr_list()?;
    parser.skip_newlines();
    if !matches!(parser.peek_kind(), TokenKind::Eof) {
        return Err(parser.error_here("invalid syntax"));
    }
    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
        }
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_kind_at(&self, offset: usize) -> &TokenKind {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Op(o) if *o == op)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Name(n) if n == keyword)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> SyntaxError {
        let token = self.peek();
        SyntaxError::new(message, token.line, token.column, self.source)
    }

    fn expect_op(&mut self, op: &str) -> PResult<Token> {
        if self.at_op(op) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!("expected '{op}'")))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> PResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{keyword}'")))
        }
    }

    fn expect_name(&mut self) -> PResult<String> {
        match self.peek_kind() {
            TokenKind::Name(name) if !KEYWORDS.contains(&name.as_str()) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here("invalid syntax")),
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek_kind(), TokenKind::Newline) {
            self.advance();
        }
    }

    fn end_of_simple(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Eof) || self.at_op(";")
    }

    fn parse_module(&mut self) -> PResult<Module> {
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek_kind() {
                TokenKind::Eof => break,
                TokenKind::Indent => return Err(self.error_here("unexpected indent")),
                TokenKind::Dedent => {
                    self.advance();
                }
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(Module { body })
    }

    fn parse_statement(&mut self) -> PResult<Vec<Stmt>> {
        let line = self.peek().line;
        let word = match self.peek_kind() {
            TokenKind::Name(word) => Some(word.clone()),
            _ => None,
        };
        if let Some(word) = word {
            match word.as_str() {
                "def" => return Ok(vec![self.parse_def()?]),
                "if" => {
                    self.advance();
                    return Ok(vec![self.parse_if(line)?]);
                }
                "for" => return Ok(vec![self.parse_for()?]),
                "while" => return Ok(vec![self.parse_while()?]),
                "try" => return Ok(vec![self.parse_try()?]),
                "class" | "with" | "async" | "global" | "nonlocal" | "del" | "yield" | "await" => {
                    return Err(self.error_here(format!("unsupported statement '{word}'")));
                }
                "elif" | "else" | "except" | "finally" => {
                    return Err(self.error_here("invalid syntax"));
                }
                _ => {}
            }
        }
        if self.at_op("@") {
            return Err(self.error_here("decorators are not supported"));
        }
        self.parse_simple_line()
    }

    fn parse_simple_line(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = vec![self.parse_simple()?];
        while self.eat_op(";") {
            if matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_simple()?);
        }
        match self.peek_kind() {
            TokenKind::Newline => {
                self.advance();
            }
            TokenKind::Eof => {}
            _ => return Err(self.error_here("invalid syntax")),
        }
        Ok(stmts)
    }

    fn parse_block(&mut self, header: &str, header_line: usize) -> PResult<Vec<Stmt>> {
        self.expect_op(":")?;
        if !matches!(self.peek_kind(), TokenKind::Newline) {
            return self.parse_simple_line();
        }
        self.advance();
        if !matches!(self.peek_kind(), TokenKind::Indent) {
            return Err(self.error_here(format!(
                "expected an indented block after '{header}' statement on line {header_line}"
            )));
        }
        self.advance();
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek_kind() {
                TokenKind::Dedent => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => break,
                TokenKind::Indent => return Err(self.error_here("unexpected indent")),
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(body)
    }

    fn parse_def(&mut self) -> PResult<Stmt> {
        let line = self.advance().line;
        let name = self.expect_name()?;
        self.expect_op("(")?;
        let params = self.parse_params(")")?;
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.parse_expression()?;
        }
        let body = self.parse_block("function definition", line)?;
        Ok(Stmt::new(StmtKind::FunctionDef { name, params, body }, line))
    }

    fn parse_params(&mut self, closing: &str) -> PResult<Vec<Param>> {
        let mut params: Vec<Param> = Vec::new();
        while !self.at_op(closing) {
            if self.at_op("*") || self.at_op("**") || self.at_op("/") {
                return Err(self.error_here("variadic parameters are not supported"));
            }
            let name = self.expect_name()?;
            if closing == ")" && self.eat_op(":") {
                self.parse_expression()?;
            }
            let default = if self.eat_op("=") {
                Some(self.parse_expression()?)
            } else {
                if params.iter().any(|p| p.default.is_some()) {
                    return Err(self.error_here("non-default argument follows default argument"));
                }
                None
            };
            if params.iter().any(|p| p.name == name) {
                return Err(self.error_here(format!(
                    "duplicate argument '{name}' in function definition"
                )));
            }
            params.push(Param { name, default });
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(params)
    }

    fn parse_if(&mut self, line: usize) -> PResult<Stmt> {
        let test = self.parse_expression()?;
        let body = self.parse_block("if", line)?;
        let orelse = if self.at_keyword("elif") {
            let elif_line = self.advance().line;
            vec![self.parse_if(elif_line)?]
        } else if self.at_keyword("else") {
            let else_line = self.advance().line;
            self.parse_block("else", else_line)?
        } else {
            Vec::new()
        };
        Ok(Stmt::new(StmtKind::If { test, body, orelse }, line))
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let line = self.advance().line;
        let target = self.parse_target_list()?;
        self.expect_keyword("in")?;
        let iter = self.parse_expr_list()?;
        let body = self.parse_block("for", line)?;
        if self.at_keyword("else") {
            return Err(self.error_here("for-else is not supported"));
        }
        Ok(Stmt::new(StmtKind::For { target, iter, body }, line))
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let line = self.advance().line;
        let test = self.parse_expression()?;
        let body = self.parse_block("while", line)?;
        if self.at_keyword("else") {
            return Err(self.error_here("while-else is not supported"));
        }
        Ok(Stmt::new(StmtKind::While { test, body }, line))
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        let line = self.advance().line;
        let body = self.parse_block("try", line)?;
        let mut handlers = Vec::new();
        while self.at_keyword("except") {
            let handler_line = self.advance().line;
            let (kind, name) = if self.at_op(":") {
                (None, None)
            } else {
                let kind = self.parse_expression()?;
                let name = if self.eat_keyword("as") {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                (Some(kind), name)
            };
            let body = self.parse_block("except", handler_line)?;
            handlers.push(ExceptHandler {
                kind,
                name,
                body,
                line: handler_line,
            });
        }
        let orelse = if !handlers.is_empty() && self.at_keyword("else") {
            let else_line = self.advance().line;
            self.parse_block("else", else_line)?
        } else {
            Vec::new()
        };
        let finalbody = if self.at_keyword("finally") {
            let finally_line = self.advance().line;
            self.parse_block("finally", finally_line)?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error_here("expected 'except' or 'finally' block"));
        }
        Ok(Stmt::new(
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
            line,
        ))
    }

    fn parse_simple(&mut self) -> PResult<Stmt> {
        let line = self.peek().line;
        let word = match self.peek_kind() {
            TokenKind::Name(word) => Some(word.clone()),
            _ => None,
        };
        if let Some(word) = word {
            match word.as_str() {
                "pass" => {
                    self.advance();
                    return Ok(Stmt::new(StmtKind::Pass, line));
                }
                "break" => {
                    self.advance();
                    return Ok(Stmt::new(StmtKind::Break, line));
                }
                "continue" => {
                    self.advance();
                    return Ok(Stmt::new(StmtKind::Continue, line));
                }
                "return" => {
                    self.advance();
                    let value = if self.end_of_simple() {
                        None
                    } else {
                        Some(self.parse_expr_list()?)
                    };
                    return Ok(Stmt::new(StmtKind::Return(value), line));
                }
                "raise" => {
                    self.advance();
                    let value = if self.end_of_simple() {
                        None
                    } else {
                        let exc = self.parse_expression()?;
                        if self.eat_keyword("from") {
                            self.parse_expression()?;
                        }
                        Some(exc)
                    };
                    return Ok(Stmt::new(StmtKind::Raise(value), line));
                }
                "assert" => {
                    self.advance();
                    let test = self.parse_expression()?;
                    let msg = if self.eat_op(",") {
                        Some(self.parse_expression()?)
                    } else {
                        None
                    };
                    return Ok(Stmt::new(StmtKind::Assert { test, msg }, line));
                }
                "import" => {
                    self.advance();
                    let mut names = vec![self.parse_alias(true)?];
                    while self.eat_op(",") {
                        names.push(self.parse_alias(true)?);
                    }
                    return Ok(Stmt::new(StmtKind::Import(names), line));
                }
                "from" => {
                    self.advance();
                    let module = self.parse_dotted_name()?;
                    self.expect_keyword("import")?;
                    if self.at_op("*") {
                        return Err(self.error_here("wildcard imports are not supported"));
                    }
                    let parenthesized = self.eat_op("(");
                    let mut names = vec![self.parse_alias(false)?];
                    while self.eat_op(",") {
                        if parenthesized && self.at_op(")") {
                            break;
                        }
                        names.push(self.parse_alias(false)?);
                    }
                    if parenthesized {
                        self.expect_op(")")?;
                    }
                    return Ok(Stmt::new(StmtKind::ImportFrom { module, names }, line));
                }
                _ => {}
            }
        }

        let first = self.parse_expr_list()?;
        if self.at_op("=") {
            let mut exprs = vec![first];
            while self.eat_op("=") {
                exprs.push(self.parse_expr_list()?);
            }
            let value = exprs.pop().unwrap_or(Expr::Constant(Constant::None));
            for target in &exprs {
                self.check_target(target)?;
            }
            return Ok(Stmt::new(StmtKind::Assign { targets: exprs, value }, line));
        }
        if let &TokenKind::Op(op) = self.peek_kind() {
            if op.len() >= 2 && op.ends_with('=') && !matches!(op, "==" | "!=" | "<=" | ">=") {
                let symbol = &op[..op.len() - 1];
                if let Some(bin) = BinOp::from_symbol(symbol) {
                    if !matches!(first, Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. }) {
                        return Err(self.error_here(format!(
                            "'{}' is an illegal expression for augmented assignment",
                            describe(&first)
                        )));
                    }
                    self.advance();
                    let value = self.parse_expr_list()?;
                    return Ok(Stmt::new(
                        StmtKind::AugAssign {
                            target: first,
                            op: bin,
                            value,
                        },
                        line,
                    ));
                }
            }
        }
        if self.at_op(":") && matches!(first, Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. }) {
            self.advance();
            self.parse_expression()?;
            if self.eat_op("=") {
                let value = self.parse_expr_list()?;
                return Ok(Stmt::new(
                    StmtKind::Assign {
                        targets: vec![first],
                        value,
                    },
                    line,
                ));
            }
            return Ok(Stmt::new(StmtKind::Pass, line));
        }
        Ok(Stmt::new(StmtKind::Expr(first), line))
    }

    fn parse_dotted_name(&mut self) -> PResult<String> {
        let mut name = String::new();
        while self.at_op(".") {
            self.advance();
            name.push('.');
        }
        name.push_str(&self.expect_name()?);
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn parse_alias(&mut self, dotted: bool) -> PResult<Alias> {
        let name = if dotted {
            self.parse_dotted_name()?
        } else {
            self.expect_name()?
        };
        let asname = if self.eat_keyword("as") {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok(Alias { name, asname })
    }

    fn check_target(&self, target: &Expr) -> PResult<()> {
        match target {
            Expr::Name(name) if !KEYWORDS.contains(&name.as_str()) => Ok(()),
            Expr::Attribute { .. } | Expr::Subscript { .. } => Ok(()),
            Expr::Tuple(items) | Expr::List(items) => {
                items.iter().try_for_each(|item| self.check_target(item))
            }
            Expr::Starred(inner) => self.check_target(inner),
            other => Err(self.error_here(format!("cannot assign to {}", describe(other)))),
        }
    }

    fn starts_expression(&self) -> bool {
        match self.peek_kind() {
            TokenKind::Name(name) => {
                !KEYWORDS.contains(&name.as_str())
                    || matches!(name.as_str(), "True" | "False" | "None" | "not" | "lambda")
            }
            TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::Bytes(_)
            | TokenKind::FString { .. } => true,
            TokenKind::Op(op) => matches!(*op, "(" | "[" | "{" | "-" | "+" | "~" | "*"),
            _ => false,
        }
    }

    /// Comma-separated expressions; more than one (or a trailing comma)
    /// yields a tuple.
    fn parse_expr_list(&mut self) -> PResult<Expr> {
        let first = self.parse_star_or_expression()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if !self.starts_expression() {
                break;
            }
            items.push(self.parse_star_or_expression()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_star_or_expression(&mut self) -> PResult<Expr> {
        if self.eat_op("*") {
            return Ok(Expr::Starred(Box::new(self.parse_bitor()?)));
        }
        self.parse_expression()
    }

    fn parse_target_list(&mut self) -> PResult<Expr> {
        let parse_one = |p: &mut Self| -> PResult<Expr> {
            if p.eat_op("*") {
                Ok(Expr::Starred(Box::new(p.parse_bitor()?)))
            } else {
                p.parse_bitor()
            }
        };
        let first = parse_one(self)?;
        let target = if self.at_op(",") {
            let mut items = vec![first];
            while self.eat_op(",") {
                if self.at_keyword("in") {
                    break;
                }
                items.push(parse_one(self)?);
            }
            Expr::Tuple(items)
        } else {
            first
        };
        self.check_target(&target)?;
        Ok(target)
    }

    fn parse_expression(&mut self) -> PResult<Expr> {
        if self.at_keyword("lambda") {
            return self.parse_lambda();
        }
        let body = self.parse_or()?;
        if self.eat_keyword("if") {
            let test = self.parse_or()?;
            self.expect_keyword("else")?;
            let orelse = self.parse_expression()?;
            return Ok(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn parse_lambda(&mut self) -> PResult<Expr> {
        self.advance();
        let params = self.parse_params(":")?;
        self.expect_op(":")?;
        let body = self.parse_expression()?;
        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
        })
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let first = self.parse_and()?;
        if !self.at_keyword("or") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword("or") {
            values.push(self.parse_and()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::Or,
            values,
        })
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let first = self.parse_not()?;
        if !self.at_keyword("and") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword("and") {
            values.push(self.parse_not()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::And,
            values,
        })
    }

    fn parse_not(&mut self) -> PResult<Expr> {
        if self.eat_keyword("not") {
            let operand = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek_kind() {
            TokenKind::Op("==") => CmpOp::Eq,
            TokenKind::Op("!=") => CmpOp::NotEq,
            TokenKind::Op("<") => CmpOp::Lt,
            TokenKind::Op("<=") => CmpOp::LtE,
            TokenKind::Op(">") => CmpOp::Gt,
            TokenKind::Op(">=") => CmpOp::GtE,
            TokenKind::Name(n) if n == "in" => CmpOp::In,
            TokenKind::Name(n) if n == "is" => {
                if matches!(self.peek_kind_at(1), TokenKind::Name(m) if m == "not") {
                    self.advance();
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            TokenKind::Name(n) if n == "not" => {
                if matches!(self.peek_kind_at(1), TokenKind::Name(m) if m == "in") {
                    self.advance();
                    CmpOp::NotIn
                } else {
                    return None;
                }
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let left = self.parse_bitor()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.comparison_op() {
            ops.push(op);
            comparators.push(self.parse_bitor()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare {
            left: Box::new(left),
            ops,
            comparators,
        })
    }

    fn parse_binary_level(
        &mut self,
        symbols: &[&str],
        next: fn(&mut Self) -> PResult<Expr>,
    ) -> PResult<Expr> {
        let mut left = next(self)?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Op(op) if symbols.contains(op) => BinOp::from_symbol(op),
                _ => None,
            };
            let Some(op) = op else { break };
            self.advance();
            let right = next(self)?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_bitor(&mut self) -> PResult<Expr> {
        self.parse_binary_level(&["|"], Self::parse_bitxor)
    }

    fn parse_bitxor(&mut self) -> PResult<Expr> {
        self.parse_binary_level(&["^"], Self::parse_bitand)
    }

    fn parse_bitand(&mut self) -> PResult<Expr> {
        self.parse_binary_level(&["&"], Self::parse_shift)
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        self.parse_binary_level(&["<<", ">>"], Self::parse_sum)
    }

    fn parse_sum(&mut self) -> PResult<Expr> {
        self.parse_binary_level(&["+", "-"], Self::parse_term)
    }

    fn parse_term(&mut self) -> PResult<Expr> {
        self.parse_binary_level(&["*", "/", "//", "%", "@"], Self::parse_factor)
    }

    fn parse_factor(&mut self) -> PResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Op("-") => Some(UnaryOp::Neg),
            TokenKind::Op("+") => Some(UnaryOp::Pos),
            TokenKind::Op("~") => Some(UnaryOp::Invert),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_factor()?;
            return Ok(Expr::UnaryOp {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> PResult<Expr> {
        let base = self.parse_primary()?;
        if self.eat_op("**") {
            let exponent = self.parse_factor()?;
            return Ok(Expr::BinOp {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.eat_op(".") {
                let attr = self.expect_name()?;
                expr = Expr::Attribute {
                    value: Box::new(expr),
                    attr,
                };
            } else if self.eat_op("(") {
                let (args, keywords) = self.parse_call_args()?;
                self.expect_op(")")?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    keywords,
                };
            } else if self.eat_op("[") {
                let index = self.parse_subscript()?;
                self.expect_op("]")?;
                expr = Expr::Subscript {
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> PResult<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();
        while !self.at_op(")") {
            if self.eat_op("**") {
                let value = self.parse_expression()?;
                keywords.push(Keyword { arg: None, value });
            } else if self.eat_op("*") {
                args.push(Expr::Starred(Box::new(self.parse_expression()?)));
            } else if matches!(self.peek_kind(), TokenKind::Name(_))
                && matches!(self.peek_kind_at(1), TokenKind::Op("="))
            {
                let arg = self.expect_name()?;
                self.advance();
                let value = self.parse_expression()?;
                if keywords.iter().any(|k| k.arg.as_deref() == Some(arg.as_str())) {
                    return Err(self.error_here(format!("keyword argument repeated: {arg}")));
                }
                keywords.push(Keyword {
                    arg: Some(arg),
                    value,
                });
            } else {
                if !keywords.is_empty() {
                    return Err(self.error_here("positional argument follows keyword argument"));
                }
                let value = self.parse_expression()?;
                if self.at_keyword("for") {
                    let generators = self.parse_comprehension()?;
                    args.push(Expr::GeneratorExp {
                        elt: Box::new(value),
                        generators,
                    });
                } else {
                    args.push(value);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok((args, keywords))
    }

    fn parse_subscript(&mut self) -> PResult<Expr> {
        let first = self.parse_slice_item()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op("]") {
                break;
            }
            items.push(self.parse_slice_item()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_slice_item(&mut self) -> PResult<Expr> {
        let lower = if self.at_op(":") {
            None
        } else {
            let expr = self.parse_star_or_expression()?;
            if !self.at_op(":") {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect_op(":")?;
        let bound_ends = |p: &Self| p.at_op(":") || p.at_op("]") || p.at_op(",");
        let upper = if bound_ends(self) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let step = if self.eat_op(":") && !bound_ends(self) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn parse_comprehension(&mut self) -> PResult<Vec<Comprehension>> {
        let mut generators = Vec::new();
        while self.eat_keyword("for") {
            let target = self.parse_target_list()?;
            self.expect_keyword("in")?;
            let iter = self.parse_or()?;
            let mut ifs = Vec::new();
            while self.eat_keyword("if") {
                ifs.push(self.parse_or()?);
            }
            generators.push(Comprehension { target, iter, ifs });
        }
        Ok(generators)
    }

    fn parse_atom(&mut self) -> PResult<Expr> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Name(name) => {
                let expr = match name.as_str() {
                    "True" => Expr::Constant(Constant::Bool(true)),
                    "False" => Expr::Constant(Constant::Bool(false)),
                    "None" => Expr::Constant(Constant::None),
                    n if KEYWORDS.contains(&n) => return Err(self.error_here("invalid syntax")),
                    n => Expr::Name(n.to_string()),
                };
                self.advance();
                Ok(expr)
            }
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expr::Constant(Constant::Int(*value)))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expr::Constant(Constant::Float(*value)))
            }
            TokenKind::Str(_) | TokenKind::Bytes(_) | TokenKind::FString { .. } => self.parse_strings(),
            TokenKind::Op("(") => {
                self.advance();
                if self.eat_op(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.parse_star_or_expression()?;
                if self.at_keyword("for") {
                    let generators = self.parse_comprehension()?;
                    self.expect_op(")")?;
                    return Ok(Expr::GeneratorExp {
                        elt: Box::new(first),
                        generators,
                    });
                }
                if self.eat_op(")") {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.at_op(")") {
                        break;
                    }
                    items.push(self.parse_star_or_expression()?);
                }
                self.expect_op(")")?;
                Ok(Expr::Tuple(items))
            }
            TokenKind::Op("[") => {
                self.advance();
                if self.eat_op("]") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.parse_star_or_expression()?;
                if self.at_keyword("for") {
                    let generators = self.parse_comprehension()?;
                    self.expect_op("]")?;
                    return Ok(Expr::ListComp {
                        elt: Box::new(first),
                        generators,
                    });
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.at_op("]") {
                        break;
                    }
                    items.push(self.parse_star_or_expression()?);
                }
                self.expect_op("]")?;
                Ok(Expr::List(items))
            }
            TokenKind::Op("{") => {
                self.advance();
                if self.eat_op("}") {
                    return Ok(Expr::Dict(Vec::new()));
                }
                if self.at_op("**") {
                    return Err(self.error_here("dict unpacking is not supported"));
                }
                let first = self.parse_star_or_expression()?;
                if self.eat_op(":") {
                    let value = self.parse_expression()?;
                    if self.at_keyword("for") {
                        let generators = self.parse_comprehension()?;
                        self.expect_op("}")?;
                        return Ok(Expr::DictComp {
                            key: Box::new(first),
                            value: Box::new(value),
                            generators,
                        });
                    }
                    let mut pairs = vec![(first, value)];
                    while self.eat_op(",") {
                        if self.at_op("}") {
                            break;
                        }
                        let key = self.parse_expression()?;
                        self.expect_op(":")?;
                        let value = self.parse_expression()?;
                        pairs.push((key, value));
                    }
                    self.expect_op("}")?;
                    return Ok(Expr::Dict(pairs));
                }
                if self.at_keyword("for") {
                    let generators = self.parse_comprehension()?;
                    self.expect_op("}")?;
                    return Ok(Expr::SetComp {
                        elt: Box::new(first),
                        generators,
                    });
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.at_op("}") {
                        break;
                    }
                    items.push(self.parse_star_or_expression()?);
                }
                self.expect_op("}")?;
                Ok(Expr::Set(items))
            }
            TokenKind::Eof | TokenKind::Newline => {
                Err(self.error_here("invalid syntax"))
            }
            TokenKind::Indent => Err(self.error_here("unexpected indent")),
            _ => Err(self.error_here("invalid syntax")),
        }
    }

    /// Adjacent string literals concatenate; any f-string makes the whole
    /// run an f-string.
    fn parse_strings(&mut self) -> PResult<Expr> {
        let mut parts: Vec<FStringPart> = Vec::new();
        let mut bytes: Option<Vec<u8>> = None;
        let mut saw_text = false;
        let mut saw_format = false;
        loop {
            let token = self.peek().clone();
            match &token.kind {
                TokenKind::Str(text) => {
                    saw_text = true;
                    push_literal(&mut parts, text.clone());
                }
                TokenKind::FString { body, raw } => {
                    saw_text = true;
                    saw_format = true;
                    for part in self.parse_fstring(body, *raw, &token)? {
                        match part {
                            FStringPart::Literal(text) => push_literal(&mut parts, text),
                            field => parts.push(field),
                        }
                    }
                }
                TokenKind::Bytes(data) => {
                    bytes.get_or_insert_with(Vec::new).extend_from_slice(data);
                }
                _ => break,
            }
            self.advance();
        }
        if bytes.is_some() && saw_text {
            return Err(self.error_here("cannot mix bytes and nonbytes literals"));
        }
        if let Some(data) = bytes {
            return Ok(Expr::Constant(Constant::Bytes(data)));
        }
        if !saw_format {
            let text = match parts.pop() {
                Some(FStringPart::Literal(text)) => text,
                _ => String::new(),
            };
            return Ok(Expr::Constant(Constant::Str(text)));
        }
        Ok(Expr::FString(parts))
    }

    fn parse_fstring(&self, body: &str, raw: bool, token: &Token) -> PResult<Vec<FStringPart>> {
        let fail = |message: &str| {
            SyntaxError::new(format!("f-string: {message}"), token.line, token.column, self.source)
        };
        let chars: Vec<char> = body.chars().collect();
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '{' && chars.get(i + 1) == Some(&'{') {
                literal.push('{');
                i += 2;
                continue;
            }
            if c == '}' {
                if chars.get(i + 1) == Some(&'}') {
                    literal.push('}');
                    i += 2;
                    continue;
                }
                return Err(fail("single '}' is not allowed"));
            }
            if c != '{' {
                literal.push(c);
                i += 1;
                continue;
            }

            if !literal.is_empty() {
                let text = std::mem::take(&mut literal);
                parts.push(FStringPart::Literal(if raw { text } else { unescape(&text) }));
            }
            let start = i + 1;
            let mut depth = 0usize;
            let mut quote: Option<char> = None;
            let mut expr_end = None;
            let mut conversion_at = None;
            let mut spec_at = None;
            let mut j = start;
            while j < chars.len() {
                let ch = chars[j];
                if let Some(q) = quote {
                    if ch == q {
                        quote = None;
                    }
                    j += 1;
                    continue;
                }
                match ch {
                    '\'' | '"' if spec_at.is_none() => quote = Some(ch),
                    '(' | '[' | '{' if spec_at.is_none() => depth += 1,
                    ')' | ']' if depth > 0 => depth -= 1,
                    '}' if depth > 0 && spec_at.is_none() => depth -= 1,
                    '}' => {
                        expr_end.get_or_insert(j);
                        break;
                    }
                    '!' if depth == 0 && spec_at.is_none() && chars.get(j + 1) != Some(&'=') => {
                        expr_end.get_or_insert(j);
                        conversion_at = Some(j + 1);
                    }
                    ':' if depth == 0 && spec_at.is_none() => {
                        expr_end.get_or_insert(j);
                        spec_at = Some(j + 1);
                    }
                    _ => {}
                }
                j += 1;
            }
            if j >= chars.len() {
                return Err(fail("expecting '}'"));
            }
            let expr_end = expr_end.unwrap_or(j);
            let expr_text: String = chars[start..expr_end].iter().collect();
            if expr_text.trim().is_empty() {
                return Err(fail("empty expression not allowed"));
            }
            let conversion = match conversion_at {
                Some(at) => match chars.get(at) {
                    Some(&c @ ('r' | 's' | 'a')) => Some(c),
                    _ => return Err(fail("invalid conversion character")),
                },
                None => None,
            };
            let spec = spec_at.map(|at| chars[at..j].iter().collect::<String>());
            let expr = parse_expression(expr_text.trim())
                .map_err(|err| fail(&err.message))?;
            parts.push(FStringPart::Field {
                expr: Box::new(expr),
                conversion,
                spec,
            });
            i = j + 1;
        }
        if !literal.is_empty() {
            parts.push(FStringPart::Literal(if raw { literal } else { unescape(&literal) }));
        }
        Ok(parts)
    }
}

fn push_literal(parts: &mut Vec<FStringPart>, text: String) {
    if let Some(FStringPart::Literal(existing)) = parts.last_mut() {
        existing.push_str(&text);
    } else if !text.is_empty() || parts.is_empty() {
        parts.push(FStringPart::Literal(text));
    }
}

fn describe(expr: &Expr) -> &'static str {
    match expr {
        Expr::Call { .. } => "function call",
        Expr::Constant(_) | Expr::FString(_) => "literal",
        Expr::Compare { .. } => "comparison",
        Expr::BoolOp { .. } | Expr::BinOp { .. } | Expr::UnaryOp { .. } => "expression",
        Expr::Lambda { .. } => "lambda",
        Expr::IfExp { .. } => "conditional expression",
        Expr::Dict(_) | Expr::Set(_) => "dict literal",
        Expr::ListComp { .. } | Expr::SetComp { .. } | Expr::DictComp { .. } => "comprehension",
        Expr::GeneratorExp { .. } => "generator expression",
        Expr::Tuple(_) => "tuple",
        Expr::List(_) => "list",
        _ => "expression",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(source: &str) -> Vec<Stmt> {
        parse(source).unwrap().body
    }

    #[test]
    fn parses_function_with_groupby_chain() {
        let stmts = body(
            "def aggregate_all_data(df):\n    totals = df.groupby('region')['sales'].sum()\n    return {'totals': totals.to_dict()}\n",
        );
        assert_eq!(stmts.len(), 1);
        let StmtKind::FunctionDef { name, params, body } = &stmts[0].kind else {
            panic!("expected def");
        };
        assert_eq!(name, "aggregate_all_data");
        assert_eq!(params[0].name, "df");
        assert_eq!(body.len(), 2);
        assert_eq!(body[1].line, 3);
    }

    #[test]
    fn functions_separated_by_blank_lines() {
        let stmts = body("def a():\n    return 1\n\ndef b():\n    return 2\n");
        let names: Vec<&str> = stmts
            .iter()
            .map(|s| match &s.kind {
                StmtKind::FunctionDef { name, .. } => name.as_str(),
                _ => panic!("expected def"),
            })
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn generated_module_with_imports_helpers_and_comments() {
        let source = "import pandas as pd\n\n\n\
def _clean(series):\n    # strip thousands separators\n    return pd.to_numeric(series, errors='coerce')\n\n\
# entry point\n\
def aggregate_all_data(df):\n    sales = _clean(df['sales'])\n\n    if sales.empty:\n        return {}\n    # done\n\n    return {'total': sales.sum()}\n";
        let stmts = body(source);
        assert_eq!(stmts.len(), 3);
        let StmtKind::FunctionDef { name, body: inner, .. } = &stmts[2].kind else {
            panic!("expected def");
        };
        assert_eq!(name, "aggregate_all_data");
        assert_eq!(inner.len(), 3);
        assert!(matches!(inner[2].kind, StmtKind::Return(Some(_))));
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let stmts = body("x = -2 ** 2\n");
        let StmtKind::Assign { value, .. } = &stmts[0].kind else {
            panic!("expected assign");
        };
        assert!(matches!(value, Expr::UnaryOp { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn elif_nests_in_orelse() {
        let stmts = body("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        let StmtKind::If { orelse, .. } = &stmts[0].kind else {
            panic!("expected if");
        };
        assert!(matches!(orelse[0].kind, StmtKind::If { .. }));
    }

    #[test]
    fn chained_comparison_and_membership() {
        let stmts = body("ok = 0 < x <= 10 and k not in seen\n");
        let StmtKind::Assign { value, .. } = &stmts[0].kind else {
            panic!("expected assign");
        };
        let Expr::BoolOp { values, .. } = value else {
            panic!("expected and");
        };
        assert!(matches!(&values[0], Expr::Compare { ops, .. } if ops.len() == 2));
        assert!(matches!(&values[1], Expr::Compare { ops, .. } if ops == &vec![CmpOp::NotIn]));
    }

    #[test]
    fn fstring_fields_carry_spec_and_conversion() {
        let stmts = body("s = f'{total:,.2f} and {name!r}'\n");
        let StmtKind::Assign { value: Expr::FString(parts), .. } = &stmts[0].kind else {
            panic!("expected f-string");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], FStringPart::Field { spec: Some(s), .. } if s == ",.2f"));
        assert!(matches!(&parts[2], FStringPart::Field { conversion: Some('r'), .. }));
    }

    #[test]
    fn generator_argument_and_slices() {
        let stmts = body("t = sum(v for v in xs if v)\nh = rows[1:-1, ::2]\n");
        let StmtKind::Assign { value: Expr::Call { args, .. }, .. } = &stmts[0].kind else {
            panic!("expected call");
        };
        assert!(matches!(args[0], Expr::GeneratorExp { .. }));
        let StmtKind::Assign { value: Expr::Subscript { index, .. }, .. } = &stmts[1].kind else {
            panic!("expected subscript");
        };
        assert!(matches!(index.as_ref(), Expr::Tuple(items) if items.len() == 2));
    }

    #[test]
    fn missing_colon_is_a_syntax_error_with_position() {
        let err = parse("def f(df)\n    return 1\n").unwrap_err();
        assert_eq!(err.message, "expected ':'");
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 10);
    }

    #[test]
    fn missing_block_names_the_header() {
        let err = parse("for x in y:\nz = 1\n").unwrap_err();
        assert!(err.message.contains("after 'for' statement on line 1"));
    }

    #[test]
    fn assignment_to_call_is_rejected() {
        let err = parse("f() = 3\n").unwrap_err();
        assert_eq!(err.message, "cannot assign to function call");
    }

    #[test]
    fn adjacent_strings_concatenate() {
        let stmts = body("s = 'a' \"b\"\n");
        assert!(matches!(
            &stmts[0].kind,
            StmtKind::Assign { value: Expr::Constant(Constant::Str(s)), .. } if s == "ab"
        ));
    }
}
