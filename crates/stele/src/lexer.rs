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

use crate::error::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Raw f-string body; `raw` records an `r` prefix.
    FString { body: String, raw: bool },
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=",
    "%=", "&=", "|=", "^=", "->", ":=", "<<", ">>", "+", "-", "*", "/", "%", "@", "&", "|", "^",
    "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=",
];

pub const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "break", "class", "continue", "def", "del",
    "elif", "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is",
    "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    line_start: usize,
    indents: Vec<usize>,
    brackets: Vec<(char, usize, usize)>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            line_start: 0,
            indents: vec![0],
            brackets: Vec::new(),
            tokens: Vec::new(),
        }
    }

    fn error(&self, message: impl Into<String>, line: usize, column: usize) -> SyntaxError {
        SyntaxError::new(message, line, column, self.source)
    }

    fn column(&self) -> usize {
        self.pos - self.line_start + 1
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind, line: usize, column: usize) {
        self.tokens.push(Token { kind, line, column });
    }

    fn newline(&mut self) {
        self.pos += 1;
        self.line += 1;
        self.line_start = self.pos;
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut at_line_start = true;
        while self.pos < self.chars.len() {
            if at_line_start && self.brackets.is_empty() {
                at_line_start = false;
                if self.handle_indentation()? {
                    at_line_start = true;
                    continue;
                }
            }
            let c = self.chars[self.pos];
            match c {
                '\n' => {
                    if self.brackets.is_empty() {
                        self.push(TokenKind::Newline, self.line, self.column());
                        at_line_start = true;
                    }
                    self.newline();
                }
                '\r' => self.pos += 1,
                ' ' | '\t' | '\x0c' => self.pos += 1,
                '#' => {
                    while self.peek(0).is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                '\\' => {
                    let next = if self.peek(1) == Some('\r') { 2 } else { 1 };
                    if self.peek(next) == Some('\n') {
                        self.pos += next;
                        self.newline();
                    } else {
                        return Err(self.error(
                            "unexpected character after line continuation character",
                            self.line,
                            self.column(),
                        ));
                    }
                }
                c if c.is_ascii_digit() || (c == '.' && self.peek(1).is_some_and(|d| d.is_ascii_digit())) => {
                    self.lex_number()?;
                }
                c if c == '_' || c.is_alphabetic() => self.lex_name_or_string()?,
                '\'' | '"' => self.lex_string(String::new())?,
                _ => self.lex_operator()?,
            }
        }

        if let Some(&(open, line, column)) = self.brackets.last() {
            return Err(self.error(format!("'{open}' was never closed"), line, column));
        }
        let needs_newline = !matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline) | Some(TokenKind::Dedent) | Some(TokenKind::Indent)
        );
        if needs_newline {
            self.push(TokenKind::Newline, self.line, self.column());
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, self.line, 1);
        }
        self.push(TokenKind::Eof, self.line, 1);
        Ok(self.tokens)
    }

    /// Measures leading whitespace of a logical line. Returns true when the
    /// line is blank or a comment so the caller restarts on the next line.
    fn handle_indentation(&mut self) -> Result<bool, SyntaxError> {
        let mut width = 0usize;
        while let Some(c) = self.peek(0) {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' => width = 0,
                _ => break,
            }
            self.pos += 1;
        }
        match self.peek(0) {
            None => return Ok(true),
            Some('\n') => {
                self.newline();
                return Ok(true);
            }
            Some('\r') if self.peek(1) == Some('\n') => {
                self.pos += 1;
                self.newline();
                return Ok(true);
            }
            Some('#') => {
                while self.peek(0).is_some_and(|c| c != '\n') {
                    self.pos += 1;
                }
                if self.peek(0).is_some() {
                    self.newline();
                }
                return Ok(true);
            }
            _ => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            if self.tokens.is_empty() {
                return Err(self.error("unexpected indent", self.line, self.column()));
            }
            self.indents.push(width);
            self.push(TokenKind::Indent, self.line, self.column());
        } else if width < current {
            while self.indents.last().is_some_and(|&w| w > width) {
                self.indents.pop();
                self.push(TokenKind::Dedent, self.line, self.column());
            }
            if self.indents.last().copied() != Some(width) {
                return Err(self.error(
                    "unindent does not match any outer indentation level",
                    self.line,
                    self.column(),
                ));
            }
        }
        Ok(false)
    }

    fn lex_number(&mut self) -> Result<(), SyntaxError> {
        let (line, column) = (self.line, self.column());
        let start = self.pos;
        if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')) {
            let radix = match self.peek(1) {
                Some('x' | 'X') => 16,
                Some('o' | 'O') => 8,
                _ => 2,
            };
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek(0).is_some_and(|c| c.is_digit(radix) || c == '_') {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos].iter().filter(|c| **c != '_').collect();
            let value = i64::from_str_radix(&digits, radix)
                .map_err(|_| self.error("invalid number literal", line, column))?;
            self.push(TokenKind::Int(value), line, column);
            return Ok(());
        }

        let mut is_float = false;
        while self.peek(0).is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.pos += 1;
        }
        if self.peek(0) == Some('.') {
            is_float = true;
            self.pos += 1;
            while self.peek(0).is_some_and(|c| c.is_ascii_digit() || c == '_') {
                self.pos += 1;
            }
        }
        if matches!(self.peek(0), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek(1), Some('+' | '-')));
            if self.peek(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign;
                while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        if self.peek(0).is_some_and(|c| c == 'j' || c == 'J' || c.is_alphabetic() || c == '_') {
            return Err(self.error("invalid decimal literal", line, column));
        }
        let text: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.error("invalid decimal literal", line, column))?;
            self.push(TokenKind::Float(value), line, column);
        } else {
            match text.parse::<i64>() {
                Ok(value) => self.push(TokenKind::Int(value), line, column),
                Err(_) => {
                    let value: f64 = text
                        .parse()
                        .map_err(|_| self.error("invalid decimal literal", line, column))?;
                    self.push(TokenKind::Float(value), line, column);
                }
            }
        }
        Ok(())
    }

    fn lex_name_or_string(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        while self.peek(0).is_some_and(|c| c == '_' || c.is_alphanumeric()) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        let lower = word.to_ascii_lowercase();
        let is_prefix = matches!(lower.as_str(), "r" | "b" | "f" | "rb" | "br" | "fr" | "rf" | "u");
        if is_prefix && matches!(self.peek(0), Some('\'' | '"')) {
            self.pos = start;
            let column = self.column();
            self.pos += word.chars().count();
            return self.lex_string_at(lower, column);
        }
        let column = start - self.line_start + 1;
        self.push(TokenKind::Name(word), self.line, column);
        Ok(())
    }

    fn lex_string(&mut self, prefix: String) -> Result<(), SyntaxError> {
        let column = self.column();
        self.lex_string_at(prefix, column)
    }

    fn lex_string_at(&mut self, prefix: String, column: usize) -> Result<(), SyntaxError> {
        let line = self.line;
        let raw = prefix.contains('r');
        let is_bytes = prefix.contains('b');
        let is_format = prefix.contains('f');
        let quote = self.chars[self.pos];
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut body = String::new();
        let mut depth = 0usize;
        loop {
            let Some(c) = self.peek(0) else {
                let message = if triple {
                    format!("unterminated triple-quoted string literal (detected at line {})", self.line)
                } else {
                    format!("unterminated string literal (detected at line {line})")
                };
                return Err(self.error(message, line, column));
            };
            if is_format && !raw && depth > 0 && (c == '\'' || c == '"') && c != quote {
                // nested string inside a replacement field
                body.push(c);
                self.pos += 1;
                while let Some(n) = self.peek(0) {
                    body.push(n);
                    self.pos += 1;
                    if n == c {
                        break;
                    }
                }
                continue;
            }
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            if c == '\n' {
                if !triple {
                    return Err(self.error(
                        format!("unterminated string literal (detected at line {line})"),
                        line,
                        column,
                    ));
                }
                body.push(c);
                self.newline();
                continue;
            }
            if c == '\\' {
                if let Some(next) = self.peek(1) {
                    body.push(c);
                    body.push(next);
                    if next == '\n' {
                        self.pos += 1;
                        self.newline();
                    } else {
                        self.pos += 2;
                    }
                    continue;
                }
            }
            if is_format {
                match c {
                    '{' if self.peek(1) == Some('{') && depth == 0 => {
                        body.push_str("{{");
                        self.pos += 2;
                        continue;
                    }
                    '{' => depth += 1,
                    '}' if depth > 0 => depth -= 1,
                    _ => {}
                }
            }
            body.push(c);
            self.pos += 1;
        }

        let kind = if is_format {
            TokenKind::FString { body, raw }
        } else if is_bytes {
            let text = if raw { body } else { unescape(&body) };
            TokenKind::Bytes(text.chars().map(|c| c as u32 as u8).collect())
        } else if raw {
            TokenKind::Str(body)
        } else {
            TokenKind::Str(unescape(&body))
        };
        self.push(kind, line, column);
        Ok(())
    }

    fn lex_operator(&mut self) -> Result<(), SyntaxError> {
        let (line, column) = (self.line, self.column());
        let rest: String = self.chars[self.pos..(self.pos + 3).min(self.chars.len())].iter().collect();
        let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
            let c = self.chars[self.pos];
            return Err(self.error(
                format!("invalid character '{c}' (U+{:04X})", c as u32),
                line,
                column,
            ));
        };
        match *op {
            "(" | "[" | "{" => {
                let open = self.chars[self.pos];
                self.brackets.push((open, line, column));
            }
            ")" | "]" | "}" => {
                let close = self.chars[self.pos];
                let expected = match close {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match self.brackets.pop() {
                    Some((open, _, _)) if open == expected => {}
                    Some((open, _, _)) => {
                        return Err(self.error(
                            format!("closing parenthesis '{close}' does not match opening parenthesis '{open}'"),
                            line,
                            column,
                        ))
                    }
                    None => return Err(self.error(format!("unmatched '{close}'"), line, column)),
                }
            }
            _ => {}
        }
        self.pos += op.chars().count();
        self.push(TokenKind::Op(op), line, column);
        Ok(())
    }
}

/// Processes backslash escapes the way a non-raw literal does.
pub fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '\n' => {}
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'x' | 'u' | 'U' => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = (0..width).filter_map(|_| chars.next()).collect();
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if digits.len() == width => out.push(decoded),
                    _ => {
                        out.push('\\');
                        out.push(next);
                        out.push_str(&digits);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn emits_indent_and_dedent_around_blocks() {
        let toks = kinds("if x:\n    y = 1\nz\n");
        assert!(toks.contains(&TokenKind::Indent));
        assert!(toks.contains(&TokenKind::Dedent));
        assert_eq!(toks.last(), Some(&TokenKind::Eof));
    }

    #[test]
    fn blank_line_before_dedent_still_closes_block() {
        let toks = kinds("def a():\n    return 1\n\ndef b():\n    return 2\n");
        let indents = toks.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = toks.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!((indents, dedents), (2, 2));
        let second_def = toks
            .iter()
            .rposition(|k| *k == TokenKind::Name("def".into()))
            .unwrap();
        assert_eq!(toks[second_def - 1], TokenKind::Dedent);
    }

    #[test]
    fn comment_line_before_dedent_still_closes_block() {
        let toks = kinds("if x:\n    y = 1\n# totals\n    # indented note\nz = 2\n");
        let z = toks.iter().position(|k| *k == TokenKind::Name("z".into())).unwrap();
        assert_eq!(toks[z - 1], TokenKind::Dedent);
    }

    #[test]
    fn blank_lines_inside_a_block_keep_indentation() {
        let toks = kinds("def f():\n    a = 1\n\n    \n    return a\n");
        assert_eq!(toks.iter().filter(|k| **k == TokenKind::Indent).count(), 1);
        assert_eq!(toks.iter().filter(|k| **k == TokenKind::Dedent).count(), 1);
    }

    #[test]
    fn brackets_join_lines() {
        let toks = kinds("x = [1,\n     2]\n");
        let newlines = toks.iter().filter(|k| **k == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn numbers_and_strings() {
        let toks = kinds("a = 1_000 + 2.5e3 + 0x1f\nb = 'it\\'s'\n");
        assert!(toks.contains(&TokenKind::Int(1000)));
        assert!(toks.contains(&TokenKind::Float(2500.0)));
        assert!(toks.contains(&TokenKind::Int(31)));
        assert!(toks.contains(&TokenKind::Str("it's".into())));
    }

    #[test]
    fn fstring_keeps_nested_quotes_inside_fields() {
        let toks = kinds("f\"{d['k']:,.2f} total\"\n");
        assert_eq!(
            toks[0],
            TokenKind::FString { body: "{d['k']:,.2f} total".into(), raw: false }
        );
    }

    #[test]
    fn unterminated_string_reports_line() {
        let err = tokenize("x = 1\ny = 'abc\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.starts_with("unterminated string literal"));
    }

    #[test]
    fn unclosed_bracket_is_reported_at_opening() {
        let err = tokenize("total = sum(\n").unwrap_err();
        assert_eq!(err.message, "'(' was never closed");
        assert_eq!((err.line, err.column), (1, 12));
    }

    #[test]
    fn inconsistent_dedent_is_rejected() {
        let err = tokenize("if x:\n        a\n    b\n").unwrap_err();
        assert!(err.message.contains("unindent"));
    }

    #[test]
    fn unescape_handles_hex_and_unknown() {
        assert_eq!(unescape("a\\x41\\d"), "aA\\d");
    }
}
