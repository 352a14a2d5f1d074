//! Jinja2 / Django-family syntax.

use serde_json::Value;
use std::collections::BTreeMap;

use super::{block_name, layout_path, partial_path, Branch, Dialect, DialectEmitter, EmitResult, LoopFrame};
use crate::expr::{BinaryOp, Expr};
use crate::filters::Filter;

pub struct JinjaEmitter;

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "none".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn operator(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        other => other.symbol(),
    }
}

fn expression(expr: &Expr) -> String {
    match expr {
        Expr::Path(segments) => segments.join("."),
        Expr::Literal(value) => literal(value),
        Expr::Not(inner) => format!("not {}", operand(inner)),
        Expr::Binary { op, left, right } => {
            format!("{} {} {}", operand(left), operator(*op), operand(right))
        }
    }
}

fn operand(expr: &Expr) -> String {
    match expr {
        Expr::Binary { .. } => format!("({})", expression(expr)),
        _ => expression(expr),
    }
}

fn filter_name(filter: Filter) -> &'static str {
    match filter {
        Filter::Json => "tojson",
        other => other.name(),
    }
}

impl DialectEmitter for JinjaEmitter {
    fn dialect(&self) -> Dialect {
        Dialect::Jinja
    }

    fn text(&self, text: &str) -> String {
        if text.contains("{{") || text.contains("{%") || text.contains("{#") {
            format!("{{% raw %}}{}{{% endraw %}}", text)
        } else {
            text.to_string()
        }
    }

    fn variable(
        &self,
        expr: &Expr,
        default: Option<&str>,
        filter: Option<Filter>,
        raw: bool,
        _scope: &[LoopFrame],
    ) -> EmitResult {
        let mut out = operand(expr);
        if let Some(fallback) = default {
            // `true` also replaces none and empty values
            out.push_str(&format!(
                " | default({}, true)",
                Value::String(fallback.to_string())
            ));
        }
        if let Some(f) = filter {
            out.push_str(" | ");
            out.push_str(filter_name(f));
        }
        if raw && filter != Some(Filter::Json) {
            out.push_str(" | safe");
        }
        Ok(format!("{{{{ {} }}}}", out))
    }

    fn conditional(&self, branches: &[Branch], _scope: &[LoopFrame]) -> EmitResult {
        let mut out = String::new();
        for (i, branch) in branches.iter().enumerate() {
            match (&branch.condition, i) {
                (Some(condition), 0) => {
                    out.push_str(&format!("{{% if {} %}}", expression(condition)))
                }
                (Some(condition), _) => {
                    out.push_str(&format!("{{% elif {} %}}", expression(condition)))
                }
                (None, 0) => return Ok(branch.body.clone()),
                (None, _) => out.push_str("{% else %}"),
            }
            out.push_str(&branch.body);
        }
        if !out.is_empty() {
            out.push_str("{% endif %}");
        }
        Ok(out)
    }

    fn loop_block(
        &self,
        items: &Expr,
        frame: &LoopFrame,
        body: &str,
        _scope: &[LoopFrame],
    ) -> EmitResult {
        let mut out = format!("{{% for {} in {} %}}", frame.alias, operand(items));
        if let Some(key) = &frame.key {
            out.push_str(&format!("{{% set {} = loop.index0 %}}", key));
        }
        out.push_str(body);
        out.push_str("{% endfor %}");
        Ok(out)
    }

    fn slot(&self, name: &str, default_body: &str) -> String {
        format!(
            "{{% block {} %}}{}{{% endblock %}}",
            block_name(name),
            default_body
        )
    }

    fn include(
        &self,
        template: &str,
        props: &BTreeMap<String, Expr>,
        _scope: &[LoopFrame],
        _warnings: &mut Vec<String>,
    ) -> EmitResult {
        let include = format!(
            "{{% include \"{}\" %}}",
            Dialect::Jinja.reference(&partial_path(template))
        );
        if props.is_empty() {
            return Ok(include);
        }

        let bindings: Vec<String> = props
            .iter()
            .map(|(name, expr)| format!("{}={}", block_name(name), expression(expr)))
            .collect();
        Ok(format!(
            "{{% with {} %}}{}{{% endwith %}}",
            bindings.join(", "),
            include
        ))
    }

    fn extends(&self, parent: &str, blocks: &[(String, String)]) -> String {
        let mut out = format!(
            "{{% extends \"{}\" %}}",
            Dialect::Jinja.reference(&layout_path(parent))
        );
        for (name, body) in blocks {
            out.push_str(&self.slot(name, body));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_printing() {
        let expr = Expr::parse("!(a == 'x') && b.c >= 2 || d").unwrap();
        assert_eq!(
            expression(&expr),
            "(not (a == \"x\") and (b.c >= 2)) or d"
        );
        assert_eq!(expression(&Expr::parse("null").unwrap()), "none");
    }

    #[test]
    fn test_variable_pipeline() {
        let out = JinjaEmitter
            .variable(&Expr::path("total"), Some("0"), Some(Filter::Currency), true, &[])
            .unwrap();
        assert_eq!(out, "{{ total | default(\"0\", true) | currency | safe }}");

        let out = JinjaEmitter
            .variable(&Expr::path("data"), None, Some(Filter::Json), true, &[])
            .unwrap();
        assert_eq!(out, "{{ data | tojson }}");
    }

    #[test]
    fn test_loop_with_key() {
        let frame = LoopFrame {
            alias: "row".to_string(),
            key: Some("i".to_string()),
        };
        let out = JinjaEmitter
            .loop_block(&Expr::path("rows"), &frame, "<td>x</td>", &[])
            .unwrap();
        assert_eq!(
            out,
            "{% for row in rows %}{% set i = loop.index0 %}<td>x</td>{% endfor %}"
        );
    }

    #[test]
    fn test_include_with_props() {
        let mut props = BTreeMap::new();
        props.insert("title".to_string(), Expr::string("Hi"));
        props.insert("count".to_string(), Expr::path("items.length"));
        let out = JinjaEmitter
            .include("Card", &props, &[], &mut Vec::new())
            .unwrap();
        assert_eq!(
            out,
            "{% with count=items.length, title=\"Hi\" %}{% include \"partials/Card.jinja\" %}{% endwith %}"
        );
    }
}
