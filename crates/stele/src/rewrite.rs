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

//! Source-to-source guard pass for generated aggregation scripts.
//!
//! Three method calls that break on plain values are rerouted through
//! runtime guards that degrade gracefully:
//!
//! | call                | becomes                      |
//! |---------------------|------------------------------|
//! | `x.tolist()`        | `_safe_tolist(x)`            |
//! | `x.mul(a, ...)`     | `_safe_mul(x, a, ...)`       |
//! | `x.fillna(a, ...)`  | `_safe_fillna(x, a, ...)`    |
//!
//! Source that does not parse is returned unchanged; the executor reports
//! the syntax error from its own parse.

use crate::ast::{walk_expr_mut, walk_module_mut, Expr, VisitMut};
use crate::parser::parse;
use crate::unparse::unparse;
use tracing::debug;

pub const SAFE_TOLIST: &str = "_safe_tolist";
pub const SAFE_MUL: &str = "_safe_mul";
pub const SAFE_FILLNA: &str = "_safe_fillna";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteStats {
    pub tolist: usize,
    pub mul: usize,
    pub fillna: usize,
}

impl RewriteStats {
    pub fn total(&self) -> usize {
        self.tolist + self.mul + self.fillna
    }
}

#[derive(Debug, Default)]
pub struct CodeRewriter {
    stats: RewriteStats,
}

impl CodeRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RewriteStats {
        self.stats
    }

    /// Rewrites `source`, returning canonical source with guard calls in
    /// place. Unparseable input comes back as-is.
    pub fn rewrite(&mut self, source: &str) -> String {
        let mut module = match parse(source) {
            Ok(module) => module,
            Err(err) => {
                debug!(error = %err, "Leaving unparseable source untouched");
                return source.to_string();
            }
        };
        walk_module_mut(self, &mut module);
        debug!(
            tolist = self.stats.tolist,
            mul = self.stats.mul,
            fillna = self.stats.fillna,
            "Rewrote guarded method calls"
        );
        unparse(&module)
    }
}

impl VisitMut for CodeRewriter {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        walk_expr_mut(self, expr);

        let Expr::Call {
            func,
            args,
            keywords,
        } = expr
        else {
            return;
        };
        let Expr::Attribute { value, attr } = func.as_mut() else {
            return;
        };
        let guard = match attr.as_str() {
            "tolist" if args.is_empty() && keywords.is_empty() => {
                self.stats.tolist += 1;
                SAFE_TOLIST
            }
            "mul" => {
                self.stats.mul += 1;
                SAFE_MUL
            }
            "fillna" => {
                self.stats.fillna += 1;
                SAFE_FILLNA
            }
            _ => return,
        };
        let receiver = std::mem::replace(value.as_mut(), Expr::Constant(crate::ast::Constant::None));
        let mut guarded_args = Vec::with_capacity(args.len() + 1);
        guarded_args.push(receiver);
        guarded_args.append(args);
        *func = Box::new(Expr::name(guard));
        *args = guarded_args;
    }
}

/// Convenience wrapper over [`CodeRewriter::rewrite`].
pub fn rewrite(source: &str) -> String {
    CodeRewriter::new().rewrite(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reroutes_the_three_methods() {
        let out = rewrite(
            "a = s.tolist()\nb = df['x'].mul(2)\nc = s.fillna(0, downcast=None)\nd = s.tolist(1)\n",
        );
        assert_eq!(
            out,
            "a = _safe_tolist(s)\nb = _safe_mul(df['x'], 2)\nc = _safe_fillna(s, 0, downcast=None)\nd = s.tolist(1)\n"
        );
    }

    #[test]
    fn nested_calls_are_rewritten_inside_out() {
        let out = rewrite("v = df['a'].fillna(0).mul(df['b']).tolist()\n");
        assert_eq!(out, "v = _safe_tolist(_safe_mul(_safe_fillna(df['a'], 0), df['b']))\n");
    }

    #[test]
    fn counts_rewrites() {
        let mut rewriter = CodeRewriter::new();
        rewriter.rewrite("x = a.tolist()\ny = b.mul(c)\n");
        assert_eq!(rewriter.stats().total(), 2);
    }

    #[test]
    fn leaves_broken_source_alone() {
        let broken = "def f(:\n    pass\n";
        assert_eq!(rewrite(broken), broken);
    }

    #[test]
    fn rewriting_twice_changes_nothing() {
        let once = rewrite("def f(df):\n    return {'v': df['a'].tolist(), 'w': df.b.mul(2)}\n");
        assert_eq!(rewrite(&once), once);
    }

    fn arb_name() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["df", "s", "x", "totals", "col"]).prop_map(str::to_string)
    }

    fn arb_expr() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            arb_name(),
            (0i64..1000).prop_map(|n| n.to_string()),
            (0.0f64..1e6).prop_map(|f| format!("{f:?}")),
            "[a-z]{0,6}".prop_map(|s| format!("'{s}'")),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({a} + {b})")),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} * {b}")),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("-{a} ** {b}")),
                inner.clone().prop_map(|a| format!("{a}.tolist()")),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a}.mul({b})")),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a}.fillna({b})")),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("[{a}, {b}]")),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{{{a}: {b}}}")),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({a} if {b} else None)")),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a}[{b}]")),
                inner.clone().prop_map(|a| format!("not {a}")),
                inner.prop_map(|a| format!("f'{{{a}}} items'")),
            ]
        })
    }

    proptest! {
        #[test]
        fn rewrite_is_idempotent(exprs in prop::collection::vec(arb_expr(), 1..5)) {
            let source: String = exprs
                .iter()
                .enumerate()
                .map(|(i, e)| format!("v{i} = {e}\n"))
                .collect();
            let once = rewrite(&source);
            prop_assert_eq!(rewrite(&once), once);
        }
    }
}
