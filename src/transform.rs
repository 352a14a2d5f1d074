//! Transform Module for the Stencil Compiler
//!
//! Lowers a component tree into one target dialect: component references
//! are resolved first, then a depth-first walk emits literal markup and hands
//! every marker to the dialect emitter through one exhaustive match.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::component::{Resolution, Resolver, Substitution};
use crate::dialect::{Branch, Dialect, DialectEmitter, LoopFrame};
use crate::discovery::ComponentRegistry;
use crate::error::{
    CompilerError, E_EXTENDS_PLACEMENT, E_ORPHAN_BRANCH, E_UNRESOLVED_COMPONENT, E_UNSUPPORTED,
};
use crate::expr::{truthy, Expr};
use crate::filters::display_value;
use crate::node::{
    escape_attribute, escape_text, AttributeValue, ComponentTree, Marker, NodeId, NodeKind,
};
use crate::parse::is_void_element;

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Inline every component instead of emitting partials
    pub inline_components: bool,
    pub currency_symbol: String,
}

impl Default for TransformOptions {
    fn default() -> Self {
        TransformOptions {
            inline_components: false,
            currency_symbol: "$".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOutput {
    pub dialect: Dialect,
    pub name: String,
    pub content: String,
    /// Data paths the template reads; loop items appear as `items[].field`
    pub variables: BTreeSet<String>,
    pub partials: BTreeSet<String>,
    pub extends: Option<String>,
    pub warnings: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFORMER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Transformer<'r> {
    registry: &'r ComponentRegistry,
    options: TransformOptions,
}

impl<'r> Transformer<'r> {
    pub fn new(registry: &'r ComponentRegistry, options: TransformOptions) -> Self {
        Transformer { registry, options }
    }

    /// Lower a view or layout.
    pub fn transform(
        &self,
        name: &str,
        tree: &ComponentTree,
        dialect: Dialect,
    ) -> Result<TemplateOutput, CompilerError> {
        let resolution = Resolver::new(self.registry, Some(dialect), self.options.inline_components)
            .resolve(tree)?;
        self.lower(name, &resolution, dialect)
    }

    /// Lower a registered component as a standalone partial; its `props.x`
    /// paths become the include-site parameters `x`.
    pub fn transform_partial(
        &self,
        component: &str,
        dialect: Dialect,
    ) -> Result<TemplateOutput, CompilerError> {
        let (registered, tree) = self.registry.get(component).ok_or_else(|| {
            CompilerError::new(
                E_UNRESOLVED_COMPONENT,
                &format!("component \"{}\" is not registered", component),
                component,
            )
        })?;
        let resolution = Resolver::new(self.registry, Some(dialect), self.options.inline_components)
            .resolve_with(tree, Substitution::StripPropsPrefix)?;
        self.lower(registered, &resolution, dialect)
    }

    fn lower(
        &self,
        name: &str,
        resolution: &Resolution,
        dialect: Dialect,
    ) -> Result<TemplateOutput, CompilerError> {
        let mut emitter = dialect.emitter();
        emitter.iterated_paths(iterated_paths(&resolution.tree));
        let mut lowerer = Lowerer {
            tree: &resolution.tree,
            emitter,
            currency_symbol: &self.options.currency_symbol,
            frames: Vec::new(),
            sources: Vec::new(),
            variables: BTreeSet::new(),
            warnings: Vec::new(),
        };
        let content = lowerer.lower_root()?;

        for warning in &lowerer.warnings {
            log::warn!("[{}] {}: {}", dialect, resolution.tree.file, warning);
        }

        Ok(TemplateOutput {
            dialect,
            name: name.to_string(),
            content,
            variables: lowerer.variables,
            partials: resolution.partials.clone(),
            extends: resolution.tree.extends().map(|p| p.to_string()),
            warnings: lowerer.warnings,
        })
    }
}

fn iterated_paths(tree: &ComponentTree) -> BTreeSet<Vec<String>> {
    tree.ids()
        .filter_map(|id| match tree.kind(id) {
            NodeKind::Marker(Marker::Loop { items, .. }) => items.as_path().map(|s| s.to_vec()),
            _ => None,
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOWERING WALK
// ═══════════════════════════════════════════════════════════════════════════════

struct Lowerer<'t> {
    tree: &'t ComponentTree,
    emitter: Box<dyn DialectEmitter>,
    currency_symbol: &'t str,
    /// Enclosing loops, innermost last
    frames: Vec<LoopFrame>,
    /// Tracked data path of each enclosing loop's items
    sources: Vec<Option<String>>,
    variables: BTreeSet<String>,
    warnings: Vec<String>,
}

impl<'t> Lowerer<'t> {
    fn error(&self, id: NodeId, code: &str, message: &str) -> CompilerError {
        CompilerError::at(code, message, &self.tree.file, self.tree.node_path(id))
    }

    fn unsupported(&self, id: NodeId, message: String) -> CompilerError {
        self.error(
            id,
            E_UNSUPPORTED,
            &format!("{}: {}", self.emitter.dialect(), message),
        )
    }

    /// Path as seen from the data root; `None` for loop keys.
    fn tracked_path(&self, segments: &[String]) -> Option<String> {
        let root = segments[0].as_str();
        for (frame, source) in self.frames.iter().zip(&self.sources).rev() {
            if frame.alias == root {
                let source = source.as_ref()?;
                let rest: String = segments[1..].iter().map(|s| format!(".{}", s)).collect();
                return Some(format!("{}[]{}", source, rest));
            }
            if frame.key.as_deref() == Some(root) {
                return None;
            }
        }
        Some(Expr::dotted(segments))
    }

    fn track(&mut self, expr: &Expr) {
        for segments in expr.paths() {
            if let Some(path) = self.tracked_path(segments) {
                self.variables.insert(path);
            }
        }
    }

    fn lower_root(&mut self) -> Result<String, CompilerError> {
        let tree = self.tree;

        if let Some(parent) = tree.extends() {
            let mut blocks = Vec::new();
            for id in tree.define_blocks() {
                if let NodeKind::Marker(Marker::Define { name }) = tree.kind(id) {
                    let body = self.lower_children(tree.children(id))?;
                    blocks.push((name.clone(), body));
                }
            }
            return Ok(self.emitter.extends(parent, &blocks));
        }

        self.lower_children(tree.roots())
    }

    fn lower_children(&mut self, ids: &[NodeId]) -> Result<String, CompilerError> {
        let tree = self.tree;
        let mut out = String::new();
        let mut i = 0;

        while i < ids.len() {
            let id = ids[i];

            if !matches!(tree.kind(id), NodeKind::Marker(Marker::If { .. })) {
                out.push_str(&self.lower_node(id)?);
                i += 1;
                continue;
            }

            let (chain, end) = tree.branch_chain(ids, i);
            out.push_str(&self.lower_chain(&chain)?);
            i = end;
        }

        Ok(out)
    }

    fn lower_chain(&mut self, chain: &[NodeId]) -> Result<String, CompilerError> {
        let tree = self.tree;
        let mut branches = Vec::new();

        for &id in chain {
            let condition = match tree.kind(id) {
                NodeKind::Marker(Marker::If { condition })
                | NodeKind::Marker(Marker::ElseIf { condition }) => Some(condition.clone()),
                _ => None,
            };

            // Literal conditions (usually substituted props) fold away
            match condition.as_ref().and_then(|c| c.static_truthiness()) {
                Some(false) => continue,
                Some(true) => {
                    let body = self.lower_children(tree.children(id))?;
                    branches.push(Branch {
                        condition: None,
                        body,
                    });
                    break;
                }
                None => {
                    if let Some(c) = &condition {
                        self.track(c);
                    }
                    let body = self.lower_children(tree.children(id))?;
                    let is_else = condition.is_none();
                    branches.push(Branch { condition, body });
                    if is_else {
                        break;
                    }
                }
            }
        }

        self.emitter
            .conditional(&branches, &self.frames)
            .map_err(|m| self.unsupported(chain[0], m))
    }

    fn lower_node(&mut self, id: NodeId) -> Result<String, CompilerError> {
        let tree = self.tree;

        match tree.kind(id) {
            NodeKind::Doctype { name } => Ok(format!("<!DOCTYPE {}>", name)),

            NodeKind::Text { value } => Ok(self.emitter.text(&escape_text(value))),

            NodeKind::Element { tag, attributes } => {
                let mut out = format!("<{}", tag);
                for attr in attributes {
                    match &attr.value {
                        AttributeValue::Static(v) if v.is_empty() => {
                            out.push_str(&format!(" {}", attr.name));
                        }
                        AttributeValue::Static(v) => {
                            out.push_str(&format!(
                                " {}=\"{}\"",
                                attr.name,
                                self.emitter.text(&escape_attribute(v))
                            ));
                        }
                        AttributeValue::Dynamic(Expr::Literal(v)) => {
                            out.push_str(&format!(
                                " {}=\"{}\"",
                                attr.name,
                                self.emitter.text(&escape_attribute(&display_value(v)))
                            ));
                        }
                        AttributeValue::Dynamic(expr) => {
                            self.track(expr);
                            let value = self
                                .emitter
                                .variable(expr, None, None, false, &self.frames)
                                .map_err(|m| self.unsupported(id, m))?;
                            out.push_str(&format!(" {}=\"{}\"", attr.name, value));
                        }
                    }
                }
                out.push('>');

                if is_void_element(tag) {
                    return Ok(out);
                }

                out.push_str(&self.lower_children(tree.children(id))?);
                out.push_str(&format!("</{}>", tag));
                Ok(out)
            }

            NodeKind::Component { name, .. } => Err(self.error(
                id,
                E_UNRESOLVED_COMPONENT,
                &format!("component \"{}\" was not resolved", name),
            )),

            NodeKind::Marker(marker) => self.lower_marker(id, marker),
        }
    }

    fn lower_marker(&mut self, id: NodeId, marker: &Marker) -> Result<String, CompilerError> {
        let tree = self.tree;

        match marker {
            Marker::If { .. } => self.lower_chain(&[id]),

            Marker::ElseIf { .. } | Marker::Else => Err(self.error(
                id,
                E_ORPHAN_BRANCH,
                &format!("<{}> must directly follow an <If> or <ElseIf>", marker.tag()),
            )),

            Marker::Loop { items, alias, key } => {
                self.track(items);
                let frame = LoopFrame {
                    alias: alias.clone(),
                    key: key.clone(),
                };
                let source = items.as_path().and_then(|s| self.tracked_path(s));

                self.frames.push(frame.clone());
                self.sources.push(source);
                let body = self.lower_children(tree.children(id));
                self.frames.pop();
                self.sources.pop();
                let body = body?;

                self.emitter
                    .loop_block(items, &frame, &body, &self.frames)
                    .map_err(|m| self.unsupported(id, m))
            }

            Marker::Var {
                path,
                default,
                filter,
                raw,
            } => {
                if let Expr::Literal(value) = path {
                    let text = match (value, default) {
                        (v, Some(fallback)) if !truthy(v) => fallback.clone(),
                        _ => match filter {
                            Some(f) => f.apply(value, self.currency_symbol),
                            None => display_value(value),
                        },
                    };
                    let text = if *raw { text } else { escape_text(&text) };
                    return Ok(self.emitter.text(&text));
                }

                self.track(path);
                self.emitter
                    .variable(path, default.as_deref(), *filter, *raw, &self.frames)
                    .map_err(|m| self.unsupported(id, m))
            }

            Marker::Slot { name } => {
                let body = self.lower_children(tree.children(id))?;
                Ok(self.emitter.slot(name, &body))
            }

            Marker::Include { template, props } => {
                for expr in props.values() {
                    self.track(expr);
                }
                let result =
                    self.emitter
                        .include(template, props, &self.frames, &mut self.warnings);
                result.map_err(|m| self.unsupported(id, m))
            }

            Marker::Extends { .. } | Marker::Define { .. } => Err(self.error(
                id,
                E_EXTENDS_PLACEMENT,
                &format!("<{}> is only valid at the top of a template", marker.tag()),
            )),
        }
    }
}
