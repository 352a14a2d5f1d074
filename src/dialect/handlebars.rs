//! Handlebars syntax.
//!
//! Comparisons and connectives are emitted as subexpression helpers
//! (`(eq a b)`, `(and a b)`, `(not a)`); the host registers them along with
//! one helper per filter. `each` changes the context, so paths that are not
//! rooted at a block parameter climb one `../` per enclosing loop. Inside a
//! partial that lands on the partial's own context, which holds its hash
//! parameters; in a page it lands on the data root. Partials included from a
//! loop get that same outer context passed explicitly.

use serde_json::Value;
use std::collections::BTreeMap;

use super::{block_name, layout_path, partial_path, Branch, Dialect, DialectEmitter, EmitResult, LoopFrame};
use crate::expr::{BinaryOp, Expr};
use crate::filters::Filter;

pub struct HandlebarsEmitter;

fn helper(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "eq",
        BinaryOp::Ne => "ne",
        BinaryOp::Lt => "lt",
        BinaryOp::Le => "lte",
        BinaryOp::Gt => "gt",
        BinaryOp::Ge => "gte",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
    }
}

fn path(segments: &[String], scope: &[LoopFrame]) -> String {
    let root = segments[0].as_str();
    let bound = scope
        .iter()
        .any(|frame| frame.alias == root || frame.key.as_deref() == Some(root));

    let joined = segments
        .iter()
        .map(|s| {
            if s.chars().all(|c| c.is_ascii_digit()) {
                format!("[{}]", s)
            } else {
                s.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(".");

    if bound {
        joined
    } else {
        format!("{}{}", "../".repeat(scope.len()), joined)
    }
}

/// Context outside every enclosing loop, for partial calls.
fn outer_context(scope: &[LoopFrame]) -> Option<String> {
    if scope.is_empty() {
        None
    } else {
        Some(format!("{}this", "../".repeat(scope.len())))
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => Value::String(s.clone()).to_string(),
        other => Value::String(other.to_string()).to_string(),
    }
}

/// Expression in argument position.
fn argument(expr: &Expr, scope: &[LoopFrame]) -> String {
    match expr {
        Expr::Path(segments) => path(segments, scope),
        Expr::Literal(value) => literal(value),
        Expr::Not(_) | Expr::Binary { .. } => format!("({})", call(expr, scope)),
    }
}

/// Expression directly inside a mustache, where a helper needs no parens.
fn call(expr: &Expr, scope: &[LoopFrame]) -> String {
    match expr {
        Expr::Not(inner) => format!("not {}", argument(inner, scope)),
        Expr::Binary { op, left, right } => format!(
            "{} {} {}",
            helper(*op),
            argument(left, scope),
            argument(right, scope)
        ),
        other => argument(other, scope),
    }
}

impl DialectEmitter for HandlebarsEmitter {
    fn dialect(&self) -> Dialect {
        Dialect::Handlebars
    }

    fn text(&self, text: &str) -> String {
        text.replace("{{", "\\{{")
    }

    fn variable(
        &self,
        expr: &Expr,
        default: Option<&str>,
        filter: Option<Filter>,
        raw: bool,
        scope: &[LoopFrame],
    ) -> EmitResult {
        let inner = match filter {
            Some(f) => format!("{} {}", f.name(), argument(expr, scope)),
            None => call(expr, scope),
        };
        let tag = if raw {
            format!("{{{{{{{}}}}}}}", inner)
        } else {
            format!("{{{{{}}}}}", inner)
        };

        Ok(match default {
            Some(fallback) => format!(
                "{{{{#if {}}}}}{}{{{{else}}}}{}{{{{/if}}}}",
                argument(expr, scope),
                tag,
                self.text(&crate::node::escape_text(fallback))
            ),
            None => tag,
        })
    }

    fn conditional(&self, branches: &[Branch], scope: &[LoopFrame]) -> EmitResult {
        let Some(first) = branches.first() else {
            return Ok(String::new());
        };
        let Some(condition) = &first.condition else {
            return Ok(first.body.clone());
        };

        // A lone negated test reads better as `unless`
        let has_elseif = branches.iter().skip(1).any(|b| b.condition.is_some());
        let (open, close) = match condition {
            Expr::Not(inner) if !has_elseif => (
                format!("{{{{#unless {}}}}}", argument(inner, scope)),
                "{{/unless}}",
            ),
            _ => (format!("{{{{#if {}}}}}", argument(condition, scope)), "{{/if}}"),
        };

        let mut out = open;
        out.push_str(&first.body);
        for branch in &branches[1..] {
            match &branch.condition {
                Some(c) => out.push_str(&format!("{{{{else if {}}}}}", argument(c, scope))),
                None => out.push_str("{{else}}"),
            }
            out.push_str(&branch.body);
        }
        out.push_str(close);
        Ok(out)
    }

    fn loop_block(
        &self,
        items: &Expr,
        frame: &LoopFrame,
        body: &str,
        scope: &[LoopFrame],
    ) -> EmitResult {
        let params = match &frame.key {
            Some(key) => format!("{} {}", frame.alias, key),
            None => frame.alias.clone(),
        };
        Ok(format!(
            "{{{{#each {} as |{}|}}}}{}{{{{/each}}}}",
            argument(items, scope),
            params,
            body
        ))
    }

    fn slot(&self, name: &str, default_body: &str) -> String {
        format!("{{{{#> {n}}}}}{}{{{{/{n}}}}}", default_body, n = block_name(name))
    }

    fn include(
        &self,
        template: &str,
        props: &BTreeMap<String, Expr>,
        scope: &[LoopFrame],
        _warnings: &mut Vec<String>,
    ) -> EmitResult {
        let mut out = format!("{{{{> {}", partial_path(template));
        if let Some(context) = outer_context(scope) {
            out.push_str(&format!(" {}", context));
        }
        for (name, expr) in props {
            out.push_str(&format!(" {}={}", name, argument(expr, scope)));
        }
        out.push_str("}}");
        Ok(out)
    }

    fn extends(&self, parent: &str, blocks: &[(String, String)]) -> String {
        let parent = layout_path(parent);
        let mut out = format!("{{{{#> {}}}}}", parent);
        for (name, body) in blocks {
            out.push_str(&format!(
                "{{{{#*inline \"{}\"}}}}{}{{{{/inline}}}}",
                block_name(name),
                body
            ));
        }
        out.push_str(&format!("{{{{/{}}}}}", parent));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(alias: &str) -> LoopFrame {
        LoopFrame {
            alias: alias.to_string(),
            key: None,
        }
    }

    #[test]
    fn test_outer_paths_inside_each() {
        let scope = vec![frame("item")];
        assert_eq!(path(&["item".into(), "name".into()], &scope), "item.name");
        assert_eq!(path(&["site".into(), "title".into()], &scope), "../site.title");
        assert_eq!(path(&["rows".into(), "0".into()], &[]), "rows.[0]");
    }

    #[test]
    fn test_nested_each_climbs_per_loop() {
        let scope = vec![frame("row"), frame("cell")];
        assert_eq!(path(&["row".into(), "id".into()], &scope), "row.id");
        assert_eq!(path(&["title".into()], &scope), "../../title");
    }

    #[test]
    fn test_include_inside_each_passes_outer_context() {
        let mut props = BTreeMap::new();
        props.insert("label".to_string(), Expr::path("item.name"));
        let mut warnings = Vec::new();

        let out = HandlebarsEmitter
            .include("Badge", &props, &[frame("item")], &mut warnings)
            .unwrap();
        assert_eq!(out, "{{> partials/Badge ../this label=item.name}}");

        let out = HandlebarsEmitter
            .include("Badge", &BTreeMap::new(), &[], &mut warnings)
            .unwrap();
        assert_eq!(out, "{{> partials/Badge}}");
    }

    #[test]
    fn test_helpers_for_comparisons() {
        let expr = Expr::parse("status == 'open' && !closed").unwrap();
        assert_eq!(argument(&expr, &[]), "(and (eq status \"open\") (not closed))");

        let out = HandlebarsEmitter
            .variable(&Expr::parse("a > 1").unwrap(), None, None, false, &[])
            .unwrap();
        assert_eq!(out, "{{gt a 1}}");
    }

    #[test]
    fn test_unless_for_single_negation() {
        let branches = vec![
            Branch {
                condition: Some(Expr::parse("!items").unwrap()),
                body: "empty".to_string(),
            },
            Branch {
                condition: None,
                body: "list".to_string(),
            },
        ];
        assert_eq!(
            HandlebarsEmitter.conditional(&branches, &[]).unwrap(),
            "{{#unless items}}empty{{else}}list{{/unless}}"
        );
    }

    #[test]
    fn test_variable_filter_and_default() {
        let out = HandlebarsEmitter
            .variable(&Expr::path("price"), Some("free"), Some(Filter::Currency), false, &[])
            .unwrap();
        assert_eq!(out, "{{#if price}}{{currency price}}{{else}}free{{/if}}");
    }
}
