//! Component Resolution
//!
//! Expands component references in a parsed tree. Each reference is either
//! inlined (props substituted, slots filled) or turned into an `Include`
//! marker when the target dialect can express it as a partial.
//!
//! Resolution copies nodes into a fresh arena. Every inlined instance gets a
//! frame recording which tree its nodes come from, how `props.*` paths are
//! substituted, and which caller nodes fill its slots. The chain of frames is
//! the resolution path used for cycle detection.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::dialect::Dialect;
use crate::discovery::ComponentRegistry;
use crate::error::{CompilerError, E_COMPONENT_CYCLE, E_ORPHAN_COMPOUND, E_UNRESOLVED_COMPONENT};
use crate::expr::Expr;
use crate::node::{Attribute, AttributeValue, ComponentTree, Marker, NodeId, NodeKind};

const PROPS_ROOT: &str = "props";

// ═══════════════════════════════════════════════════════════════════════════════
// SUBSTITUTION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub enum Substitution {
    /// Top-level view: paths are left alone
    None,
    /// Inlined instance: `props.x` becomes the caller's value for `x`
    Props(BTreeMap<String, Expr>),
    /// Standalone partial: `props.x` becomes the partial's own `x`
    StripPropsPrefix,
}

impl Substitution {
    pub fn apply(&self, expr: &Expr) -> Expr {
        match self {
            Substitution::None => expr.clone(),
            Substitution::StripPropsPrefix => expr.map_paths(&mut |segments| {
                if segments.len() > 1 && segments[0] == PROPS_ROOT {
                    Some(Expr::Path(segments[1..].to_vec()))
                } else {
                    None
                }
            }),
            Substitution::Props(props) => expr.map_paths(&mut |segments| {
                if segments.len() < 2 || segments[0] != PROPS_ROOT {
                    return None;
                }
                // html5ever lowercases attribute names
                let wanted = segments[1].to_lowercase();
                let value = props
                    .iter()
                    .find(|(name, _)| name.to_lowercase() == wanted)
                    .map(|(_, value)| value);
                Some(match (value, &segments[2..]) {
                    (None, _) => Expr::Literal(Value::Null),
                    (Some(value), []) => value.clone(),
                    (Some(Expr::Path(base)), rest) => {
                        let mut joined = base.clone();
                        joined.extend(rest.iter().cloned());
                        Expr::Path(joined)
                    }
                    (Some(_), _) => Expr::Literal(Value::Null),
                })
            }),
        }
    }

    fn attribute(&self, value: &AttributeValue) -> AttributeValue {
        match value {
            AttributeValue::Static(s) => AttributeValue::Static(s.clone()),
            AttributeValue::Dynamic(expr) => match self.apply(expr) {
                Expr::Literal(Value::String(s)) => AttributeValue::Static(s),
                other => AttributeValue::Dynamic(other),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
struct SlotContent {
    default: Vec<NodeId>,
    named: BTreeMap<String, Vec<NodeId>>,
}

impl SlotContent {
    fn is_empty(&self) -> bool {
        self.default.is_empty() && self.named.is_empty()
    }
}

struct Frame<'a> {
    name: String,
    tree: &'a ComponentTree,
    subst: Substitution,
    slots: SlotContent,
    /// Frame the slot content belongs to; `None` for the root
    caller: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub tree: ComponentTree,
    /// Components referenced through `Include`, by registered name
    pub partials: BTreeSet<String>,
}

pub struct Resolver<'r> {
    registry: &'r ComponentRegistry,
    /// `None` inlines every reference (preview rendering)
    dialect: Option<Dialect>,
    inline_components: bool,
}

struct Walk<'a> {
    frames: Vec<Frame<'a>>,
    out: ComponentTree,
    partials: BTreeSet<String>,
    root_file: String,
}

impl<'r> Resolver<'r> {
    pub fn new(registry: &'r ComponentRegistry, dialect: Option<Dialect>, inline_components: bool) -> Self {
        Resolver {
            registry,
            dialect,
            inline_components,
        }
    }

    /// Resolver for preview rendering: references and includes are inlined.
    pub fn inline(registry: &'r ComponentRegistry) -> Self {
        Self::new(registry, None, true)
    }

    pub fn resolve(&self, tree: &ComponentTree) -> Result<Resolution, CompilerError> {
        self.resolve_with(tree, Substitution::None)
    }

    pub fn resolve_with(
        &self,
        tree: &ComponentTree,
        subst: Substitution,
    ) -> Result<Resolution, CompilerError> {
        let mut walk = Walk {
            frames: vec![Frame {
                name: tree.file.clone(),
                tree,
                subst,
                slots: SlotContent::default(),
                caller: None,
            }],
            out: ComponentTree::new(&tree.file),
            partials: BTreeSet::new(),
            root_file: tree.file.clone(),
        };

        for &root in tree.roots() {
            self.copy_node(&mut walk, 0, root, None)?;
        }

        Ok(Resolution {
            tree: walk.out,
            partials: walk.partials,
        })
    }

    fn error(&self, walk: &Walk, frame: usize, id: NodeId, code: &str, message: &str) -> CompilerError {
        let tree = walk.frames[frame].tree;
        let mut err = CompilerError::at(code, message, &tree.file, tree.node_path(id));
        if tree.file != walk.root_file {
            err = err.with_hint(format!("while compiling {}", walk.root_file));
        }
        err
    }

    fn copy_children<'a>(
        &self,
        walk: &mut Walk<'a>,
        frame: usize,
        id: NodeId,
        out_parent: Option<NodeId>,
    ) -> Result<(), CompilerError>
    where
        'r: 'a,
    {
        let tree = walk.frames[frame].tree;
        for &child in tree.children(id) {
            self.copy_node(walk, frame, child, out_parent)?;
        }
        Ok(())
    }

    fn copy_node<'a>(
        &self,
        walk: &mut Walk<'a>,
        frame: usize,
        id: NodeId,
        out_parent: Option<NodeId>,
    ) -> Result<(), CompilerError>
    where
        'r: 'a,
    {
        let tree: &'a ComponentTree = walk.frames[frame].tree;

        match tree.kind(id) {
            NodeKind::Doctype { .. } | NodeKind::Text { .. } => {
                walk.out.push(tree.kind(id).clone(), out_parent);
                Ok(())
            }

            NodeKind::Element { tag, attributes } => {
                let subst = &walk.frames[frame].subst;
                let attributes = attributes
                    .iter()
                    .map(|a| Attribute {
                        name: a.name.clone(),
                        value: subst.attribute(&a.value),
                    })
                    .collect();
                let copied = walk.out.push(
                    NodeKind::Element {
                        tag: tag.clone(),
                        attributes,
                    },
                    out_parent,
                );
                self.copy_children(walk, frame, id, Some(copied))
            }

            NodeKind::Component { name, attributes } => {
                if name.contains('.') {
                    return Err(self.error(
                        walk,
                        frame,
                        id,
                        E_ORPHAN_COMPOUND,
                        &format!("<{}> must be a direct child of its parent component", name),
                    ));
                }
                let subst = &walk.frames[frame].subst;
                let props: BTreeMap<String, Expr> = attributes
                    .iter()
                    .map(|a| {
                        let value = match subst.attribute(&a.value) {
                            AttributeValue::Static(s) => Expr::string(&s),
                            AttributeValue::Dynamic(expr) => expr,
                        };
                        (a.name.clone(), value)
                    })
                    .collect();
                let slots = self.collect_slots(tree, id, name);
                self.expand_reference(walk, frame, id, name, props, slots, out_parent)
            }

            NodeKind::Marker(Marker::Slot { name }) => {
                let current = &walk.frames[frame];
                match current.caller {
                    Some(caller) => {
                        let content = if name == "default" {
                            current.slots.default.clone()
                        } else {
                            current.slots.named.get(name).cloned().unwrap_or_default()
                        };
                        if content.is_empty() {
                            self.copy_children(walk, frame, id, out_parent)
                        } else {
                            for node in content {
                                self.copy_node(walk, caller, node, out_parent)?;
                            }
                            Ok(())
                        }
                    }
                    None => {
                        let copied = walk.out.push(tree.kind(id).clone(), out_parent);
                        self.copy_children(walk, frame, id, Some(copied))
                    }
                }
            }

            NodeKind::Marker(Marker::Include { template, props }) => {
                let subst = &walk.frames[frame].subst;
                let props: BTreeMap<String, Expr> = props
                    .iter()
                    .map(|(k, v)| (k.clone(), subst.apply(v)))
                    .collect();
                if self.dialect.is_none() || self.inline_components {
                    self.expand_reference(
                        walk,
                        frame,
                        id,
                        template,
                        props,
                        SlotContent::default(),
                        out_parent,
                    )
                } else {
                    let Some((registered, _)) = self.registry.get(template) else {
                        return Err(self.unresolved(walk, frame, id, template));
                    };
                    walk.partials.insert(registered.to_string());
                    let copied = walk.out.push(
                        NodeKind::Marker(Marker::Include {
                            template: registered.to_string(),
                            props,
                        }),
                        out_parent,
                    );
                    self.copy_children(walk, frame, id, Some(copied))
                }
            }

            NodeKind::Marker(marker) => {
                let subst = &walk.frames[frame].subst;
                let marker = match marker {
                    Marker::If { condition } => Marker::If {
                        condition: subst.apply(condition),
                    },
                    Marker::ElseIf { condition } => Marker::ElseIf {
                        condition: subst.apply(condition),
                    },
                    Marker::Loop { items, alias, key } => Marker::Loop {
                        items: subst.apply(items),
                        alias: alias.clone(),
                        key: key.clone(),
                    },
                    Marker::Var {
                        path,
                        default,
                        filter,
                        raw,
                    } => Marker::Var {
                        path: subst.apply(path),
                        default: default.clone(),
                        filter: *filter,
                        raw: *raw,
                    },
                    other => other.clone(),
                };
                let copied = walk.out.push(NodeKind::Marker(marker), out_parent);
                self.copy_children(walk, frame, id, Some(copied))
            }
        }
    }

    fn unresolved(&self, walk: &Walk, frame: usize, id: NodeId, name: &str) -> CompilerError {
        let known = self.registry.names();
        let hint = if known.is_empty() {
            "no components are registered".to_string()
        } else {
            format!("registered components: {}", known.join(", "))
        };
        self.error(
            walk,
            frame,
            id,
            E_UNRESOLVED_COMPONENT,
            &format!("component \"{}\" is not registered", name),
        )
        .with_hint(hint)
    }

    /// Split a reference's children into default content and `Name.Part`
    /// named slot fillers.
    fn collect_slots(&self, tree: &ComponentTree, id: NodeId, name: &str) -> SlotContent {
        let prefix = format!("{}.", name);
        let mut slots = SlotContent::default();

        for &child in tree.children(id) {
            if let NodeKind::Component { name: child_name, .. } = tree.kind(child) {
                if let Some(part) = child_name.strip_prefix(&prefix) {
                    slots
                        .named
                        .entry(part.to_lowercase())
                        .or_default()
                        .extend(tree.children(child).iter().copied());
                    continue;
                }
            }
            slots.default.push(child);
        }

        if slots.default.iter().all(|c| tree.is_blank_text(*c)) {
            slots.default.clear();
        }
        slots
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_reference<'a>(
        &self,
        walk: &mut Walk<'a>,
        frame: usize,
        id: NodeId,
        name: &str,
        props: BTreeMap<String, Expr>,
        slots: SlotContent,
        out_parent: Option<NodeId>,
    ) -> Result<(), CompilerError>
    where
        'r: 'a,
    {
        let Some((registered, component)) = self.registry.get(name) else {
            return Err(self.unresolved(walk, frame, id, name));
        };

        // Resolution path: this frame and its callers
        let mut chain = Vec::new();
        let mut cursor = Some(frame);
        while let Some(f) = cursor {
            chain.push(walk.frames[f].name.clone());
            cursor = walk.frames[f].caller;
        }
        if chain.iter().any(|n| n == registered) {
            chain.reverse();
            chain.push(registered.to_string());
            return Err(self.error(
                walk,
                frame,
                id,
                E_COMPONENT_CYCLE,
                &format!("component cycle: {}", chain.join(" -> ")),
            ));
        }

        if self.emit_as_partial(&props, &slots) {
            walk.partials.insert(registered.to_string());
            walk.out.push(
                NodeKind::Marker(Marker::Include {
                    template: registered.to_string(),
                    props,
                }),
                out_parent,
            );
            return Ok(());
        }

        walk.frames.push(Frame {
            name: registered.to_string(),
            tree: component,
            subst: Substitution::Props(props),
            slots,
            caller: Some(frame),
        });
        let instance = walk.frames.len() - 1;
        for &root in component.roots() {
            self.copy_node(walk, instance, root, out_parent)?;
        }
        Ok(())
    }

    fn emit_as_partial(&self, props: &BTreeMap<String, Expr>, slots: &SlotContent) -> bool {
        match self.dialect {
            Some(dialect) if !self.inline_components => {
                dialect.supports_partials()
                    && slots.is_empty()
                    && (props.is_empty() || dialect.supports_parameterized_partials())
            }
            _ => false,
        }
    }
}
