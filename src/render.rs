//! Preview rendering.
//!
//! Evaluates a component tree against JSON data to produce static HTML. All
//! component references are inlined, and `Extends` chains are followed
//! through the layout registry with child `Define` blocks overriding the
//! parent's slots.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::component::Resolver;
use crate::discovery::ComponentRegistry;
use crate::error::{
    CompilerError, E_EXTENDS_PLACEMENT, E_LAYOUT, E_ORPHAN_BRANCH, E_UNRESOLVED_COMPONENT,
};
use crate::expr::{truthy, Expr};
use crate::filters::display_value;
use crate::node::{escape_attribute, escape_text, AttributeValue, ComponentTree, Marker, NodeId, NodeKind};
use crate::parse::is_void_element;

/// Slot a layout exposes for the page body.
pub const CONTENT_SLOT: &str = "content";

pub struct Renderer<'r> {
    components: &'r ComponentRegistry,
    layouts: &'r ComponentRegistry,
    currency_symbol: String,
}

impl<'r> Renderer<'r> {
    pub fn new(
        components: &'r ComponentRegistry,
        layouts: &'r ComponentRegistry,
        currency_symbol: &str,
    ) -> Self {
        Renderer {
            components,
            layouts,
            currency_symbol: currency_symbol.to_string(),
        }
    }

    pub fn render(&self, tree: &ComponentTree, data: &Value) -> Result<String, CompilerError> {
        let resolved = Resolver::inline(self.components).resolve(tree)?.tree;
        let visited = BTreeSet::from([tree.file.clone()]);
        self.render_chain(resolved, data, BTreeMap::new(), visited)
    }

    /// Render a registered layout with `body` filling its content slot.
    pub fn render_in_layout(
        &self,
        layout: &str,
        body: String,
        data: &Value,
    ) -> Result<String, CompilerError> {
        let (_, tree) = self.layout(layout, layout)?;
        let resolved = Resolver::inline(self.components).resolve(tree)?.tree;
        let overrides = BTreeMap::from([(CONTENT_SLOT.to_string(), body)]);
        let visited = BTreeSet::from([tree.file.clone()]);
        self.render_chain(resolved, data, overrides, visited)
    }

    fn layout(&self, name: &str, requested_by: &str) -> Result<(&'r str, &'r ComponentTree), CompilerError> {
        self.layouts.get(name).ok_or_else(|| {
            CompilerError::new(
                E_LAYOUT,
                &format!("layout \"{}\" is not registered", name),
                requested_by,
            )
            .with_hint(format!("registered layouts: {}", self.layouts.names().join(", ")))
        })
    }

    /// Follow the `Extends` chain from `current`; the most derived template
    /// wins for each region.
    fn render_chain(
        &self,
        mut current: ComponentTree,
        data: &Value,
        mut overrides: BTreeMap<String, String>,
        mut visited: BTreeSet<String>,
    ) -> Result<String, CompilerError> {
        let resolver = Resolver::inline(self.components);

        loop {
            let Some(parent) = current.extends().map(|p| p.to_string()) else {
                return Evaluation::new(&current, data, &self.currency_symbol, &overrides)
                    .render_children(current.roots());
            };

            let mut defined = Vec::new();
            {
                let mut eval = Evaluation::new(&current, data, &self.currency_symbol, &overrides);
                for id in current.define_blocks() {
                    if let NodeKind::Marker(Marker::Define { name }) = current.kind(id) {
                        let body = eval.render_children(current.children(id))?;
                        defined.push((name.clone(), body));
                    }
                }
            }
            for (name, body) in defined {
                overrides.entry(name).or_insert(body);
            }

            let (registered, layout) = self.layout(&parent, &current.file)?;
            if !visited.insert(layout.file.clone()) {
                return Err(CompilerError::new(
                    E_LAYOUT,
                    &format!("layout \"{}\" extends itself", registered),
                    &layout.file,
                ));
            }
            current = resolver.resolve(layout)?.tree;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVALUATION
// ═══════════════════════════════════════════════════════════════════════════════

struct Evaluation<'a> {
    tree: &'a ComponentTree,
    data: &'a Value,
    currency_symbol: &'a str,
    overrides: &'a BTreeMap<String, String>,
    /// Loop bindings, innermost last
    bindings: Vec<(String, Value)>,
}

impl<'a> Evaluation<'a> {
    fn new(
        tree: &'a ComponentTree,
        data: &'a Value,
        currency_symbol: &'a str,
        overrides: &'a BTreeMap<String, String>,
    ) -> Self {
        Evaluation {
            tree,
            data,
            currency_symbol,
            overrides,
            bindings: Vec::new(),
        }
    }

    fn error(&self, id: NodeId, code: &str, message: &str) -> CompilerError {
        CompilerError::at(code, message, &self.tree.file, self.tree.node_path(id))
    }

    fn lookup(&self, segments: &[String]) -> Value {
        let root = segments[0].as_str();
        let base = self
            .bindings
            .iter()
            .rev()
            .find(|(name, _)| name == root)
            .map(|(_, value)| value)
            .or_else(|| self.data.get(root));

        let Some(mut current) = base else {
            return Value::Null;
        };
        for segment in &segments[1..] {
            let next = match current {
                Value::Object(map) => map.get(segment.as_str()),
                Value::Array(items) => {
                    if segment == "length" {
                        return Value::from(items.len());
                    }
                    segment.parse::<usize>().ok().and_then(|i| items.get(i))
                }
                Value::String(s) if segment == "length" => {
                    return Value::from(s.chars().count());
                }
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return Value::Null,
            }
        }
        current.clone()
    }

    fn evaluate(&self, expr: &Expr) -> Value {
        expr.evaluate(&mut |segments| self.lookup(segments))
    }

    fn render_children(&mut self, ids: &[NodeId]) -> Result<String, CompilerError> {
        let tree = self.tree;
        let mut out = String::new();
        let mut i = 0;

        while i < ids.len() {
            let id = ids[i];
            if matches!(tree.kind(id), NodeKind::Marker(Marker::If { .. })) {
                let (chain, end) = tree.branch_chain(ids, i);
                out.push_str(&self.render_chain(&chain)?);
                i = end;
            } else {
                out.push_str(&self.render_node(id)?);
                i += 1;
            }
        }
        Ok(out)
    }

    fn render_chain(&mut self, chain: &[NodeId]) -> Result<String, CompilerError> {
        let tree = self.tree;
        for &id in chain {
            let taken = match tree.kind(id) {
                NodeKind::Marker(Marker::If { condition })
                | NodeKind::Marker(Marker::ElseIf { condition }) => {
                    truthy(&self.evaluate(condition))
                }
                _ => true,
            };
            if taken {
                return self.render_children(tree.children(id));
            }
        }
        Ok(String::new())
    }

    fn render_node(&mut self, id: NodeId) -> Result<String, CompilerError> {
        let tree = self.tree;

        match tree.kind(id) {
            NodeKind::Doctype { name } => Ok(format!("<!DOCTYPE {}>", name)),

            NodeKind::Text { value } => Ok(escape_text(value)),

            NodeKind::Element { tag, attributes } => {
                let mut out = format!("<{}", tag);
                for attr in attributes {
                    let value = match &attr.value {
                        AttributeValue::Static(v) => Value::String(v.clone()),
                        AttributeValue::Dynamic(expr) => self.evaluate(expr),
                    };
                    match value {
                        Value::Null | Value::Bool(false) => {}
                        Value::Bool(true) => out.push_str(&format!(" {}", attr.name)),
                        Value::String(s) if s.is_empty() => {
                            out.push_str(&format!(" {}", attr.name))
                        }
                        other => out.push_str(&format!(
                            " {}=\"{}\"",
                            attr.name,
                            escape_attribute(&display_value(&other))
                        )),
                    }
                }
                out.push('>');

                if is_void_element(tag) {
                    return Ok(out);
                }
                out.push_str(&self.render_children(tree.children(id))?);
                out.push_str(&format!("</{}>", tag));
                Ok(out)
            }

            NodeKind::Component { name, .. } => Err(self.error(
                id,
                E_UNRESOLVED_COMPONENT,
                &format!("component \"{}\" was not resolved", name),
            )),

            NodeKind::Marker(marker) => self.render_marker(id, marker),
        }
    }

    fn render_marker(&mut self, id: NodeId, marker: &Marker) -> Result<String, CompilerError> {
        let tree = self.tree;

        match marker {
            Marker::If { .. } => self.render_chain(&[id]),

            Marker::ElseIf { .. } | Marker::Else => Err(self.error(
                id,
                E_ORPHAN_BRANCH,
                &format!("<{}> must directly follow an <If> or <ElseIf>", marker.tag()),
            )),

            Marker::Loop { items, alias, key } => {
                let entries: Vec<(Value, Value)> = match self.evaluate(items) {
                    Value::Array(values) => values
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (Value::from(i), v))
                        .collect(),
                    Value::Object(map) => map
                        .into_iter()
                        .map(|(k, v)| (Value::String(k), v))
                        .collect(),
                    _ => Vec::new(),
                };

                let mut out = String::new();
                for (index, value) in entries {
                    self.bindings.push((alias.clone(), value));
                    if let Some(key) = key {
                        self.bindings.push((key.clone(), index));
                    }
                    let body = self.render_children(tree.children(id));
                    if key.is_some() {
                        self.bindings.pop();
                    }
                    self.bindings.pop();
                    out.push_str(&body?);
                }
                Ok(out)
            }

            Marker::Var {
                path,
                default,
                filter,
                raw,
            } => {
                let value = self.evaluate(path);
                let text = match (default, truthy(&value)) {
                    (Some(fallback), false) => fallback.clone(),
                    _ => match filter {
                        Some(f) => f.apply(&value, self.currency_symbol),
                        None => display_value(&value),
                    },
                };
                Ok(if *raw { text } else { escape_text(&text) })
            }

            Marker::Slot { name } => match self.overrides.get(name) {
                Some(body) => Ok(body.clone()),
                None => self.render_children(tree.children(id)),
            },

            Marker::Include { template, .. } => Err(self.error(
                id,
                E_UNRESOLVED_COMPONENT,
                &format!("include of \"{}\" was not inlined", template),
            )),

            Marker::Extends { .. } | Marker::Define { .. } => Err(self.error(
                id,
                E_EXTENDS_PLACEMENT,
                &format!("<{}> is only valid at the top of a template", marker.tag()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_component;
    use serde_json::json;

    fn render(source: &str, data: Value) -> String {
        let tree = parse_component(source, "views/test.cmp").unwrap();
        let registry = ComponentRegistry::new();
        Renderer::new(&registry, &registry, "$")
            .render(&tree, &data)
            .unwrap()
    }

    #[test]
    fn test_currency_filter() {
        let out = render(
            r#"<span><Var path="price" filter="currency" /></span>"#,
            json!({"price": 9}),
        );
        assert_eq!(out, "<span>$9.00</span>");
    }

    #[test]
    fn test_branch_chain_picks_first_true_arm() {
        let source = r#"<p><If condition={n > 10}>big</If><ElseIf condition={n > 1}>some</ElseIf><Else>few</Else></p>"#;
        assert_eq!(render(source, json!({"n": 20})), "<p>big</p>");
        assert_eq!(render(source, json!({"n": 5})), "<p>some</p>");
        assert_eq!(render(source, json!({"n": 0})), "<p>few</p>");
    }

    #[test]
    fn test_loop_with_key_and_default() {
        let source = r#"<ul><Loop items={rows} as="row" key="i"><li><Var path={i} />:<Var path={row.name} default="?" /></li></Loop></ul>"#;
        let out = render(source, json!({"rows": [{"name": "a"}, {}]}));
        assert_eq!(out, "<ul><li>0:a</li><li>1:?</li></ul>");
    }

    #[test]
    fn test_escaping_and_raw() {
        let out = render(
            r#"<div><Var path="html" /><Var path="html" raw /></div>"#,
            json!({"html": "<b>x</b>"}),
        );
        assert_eq!(out, "<div>&lt;b&gt;x&lt;/b&gt;<b>x</b></div>");
    }

    #[test]
    fn test_extends_overrides_slots() {
        let layout = parse_component(
            r#"<main><Slot name="content">fallback</Slot><footer><Slot name="footer">(c)</Slot></footer></main>"#,
            "layouts/base.cmp",
        )
        .unwrap();
        let mut layouts = ComponentRegistry::new();
        layouts.insert("base", layout);
        let components = ComponentRegistry::new();

        let view = parse_component(
            r#"<Extends parent="base"><Define name="content"><h1><Var path="title" /></h1></Define></Extends>"#,
            "views/index.cmp",
        )
        .unwrap();
        let out = Renderer::new(&components, &layouts, "$")
            .render(&view, &json!({"title": "Home"}))
            .unwrap();
        assert_eq!(out, "<main><h1>Home</h1><footer>(c)</footer></main>");
    }

    #[test]
    fn test_unknown_layout_is_an_error() {
        let view = parse_component(
            r#"<Extends parent="missing"><Define name="content">x</Define></Extends>"#,
            "views/index.cmp",
        )
        .unwrap();
        let registry = ComponentRegistry::new();
        let err = Renderer::new(&registry, &registry, "$")
            .render(&view, &json!({}))
            .unwrap_err();
        assert_eq!(err.code, E_LAYOUT);
    }

    #[test]
    fn test_render_in_layout_and_cycles() {
        let mut layouts = ComponentRegistry::new();
        layouts.insert(
            "default",
            parse_component(
                r#"<html><head><title><Var path="title" /></title></head><body><Slot name="content" /></body></html>"#,
                "layouts/default.cmp",
            )
            .unwrap(),
        );
        layouts.insert(
            "loop",
            parse_component(
                r#"<Extends parent="loop"><Define name="content">x</Define></Extends>"#,
                "layouts/loop.cmp",
            )
            .unwrap(),
        );
        let components = ComponentRegistry::new();
        let renderer = Renderer::new(&components, &layouts, "$");

        let out = renderer
            .render_in_layout("default", "<p>hi</p>".to_string(), &json!({"title": "T"}))
            .unwrap();
        assert_eq!(
            out,
            "<html><head><title>T</title></head><body><p>hi</p></body></html>"
        );

        let err = renderer
            .render_in_layout("loop", String::new(), &json!({}))
            .unwrap_err();
        assert_eq!(err.code, E_LAYOUT);
    }
}
