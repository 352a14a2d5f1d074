//! Component Tree IR
//!
//! Parsed sources are stored in a flat arena. A node refers to its children
//! (and its parent) by `NodeId`, so inlining copies ids instead of sharing
//! ownership and node paths can be rebuilt for error reporting.

use std::collections::BTreeMap;

use crate::expr::Expr;
use crate::filters::Filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Static(String),
    Dynamic(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new_static(name: &str, value: &str) -> Self {
        Attribute {
            name: name.to_string(),
            value: AttributeValue::Static(value.to_string()),
        }
    }
}

/// Control-flow vocabulary. Every lowering matches on this exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    If {
        condition: Expr,
    },
    ElseIf {
        condition: Expr,
    },
    Else,
    Loop {
        items: Expr,
        alias: String,
        key: Option<String>,
    },
    Var {
        path: Expr,
        default: Option<String>,
        filter: Option<Filter>,
        raw: bool,
    },
    Slot {
        name: String,
    },
    Include {
        template: String,
        props: BTreeMap<String, Expr>,
    },
    Extends {
        parent: String,
    },
    Define {
        name: String,
    },
}

impl Marker {
    pub const TAGS: [&'static str; 9] = [
        "If", "ElseIf", "Else", "Loop", "Var", "Slot", "Include", "Extends", "Define",
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Marker::If { .. } => "If",
            Marker::ElseIf { .. } => "ElseIf",
            Marker::Else => "Else",
            Marker::Loop { .. } => "Loop",
            Marker::Var { .. } => "Var",
            Marker::Slot { .. } => "Slot",
            Marker::Include { .. } => "Include",
            Marker::Extends { .. } => "Extends",
            Marker::Define { .. } => "Define",
        }
    }

    pub fn is_marker_tag(tag: &str) -> bool {
        Self::TAGS.contains(&tag)
    }

    /// Expressions carried by the marker, for variable tracking.
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            Marker::If { condition } | Marker::ElseIf { condition } => vec![condition],
            Marker::Loop { items, .. } => vec![items],
            Marker::Var { path, .. } => vec![path],
            Marker::Include { props, .. } => props.values().collect(),
            Marker::Else | Marker::Slot { .. } | Marker::Extends { .. } | Marker::Define { .. } => {
                vec![]
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Doctype {
        name: String,
    },
    Element {
        tag: String,
        attributes: Vec<Attribute>,
    },
    Text {
        value: String,
    },
    /// Reference to another component (`<Card title="x">`)
    Component {
        name: String,
        attributes: Vec<Attribute>,
    },
    Marker(Marker),
}

impl NodeKind {
    pub fn label(&self) -> &str {
        match self {
            NodeKind::Doctype { .. } => "!doctype",
            NodeKind::Element { tag, .. } => tag,
            NodeKind::Text { .. } => "#text",
            NodeKind::Component { name, .. } => name,
            NodeKind::Marker(marker) => marker.tag(),
        }
    }

    pub fn as_marker(&self) -> Option<&Marker> {
        match self {
            NodeKind::Marker(marker) => Some(marker),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// One parsed (or resolved) component source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentTree {
    pub file: String,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl ComponentTree {
    pub fn new(file: &str) -> Self {
        ComponentTree {
            file: file.to_string(),
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Every node id in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Append a node under `parent`, or as a root when `parent` is `None`.
    pub fn push(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Sibling list the node belongs to.
    pub fn siblings(&self, id: NodeId) -> &[NodeId] {
        match self.nodes[id.0].parent {
            Some(p) => &self.nodes[p.0].children,
            None => &self.roots,
        }
    }

    /// Whitespace-only text, skipped when grouping branch chains.
    pub fn is_blank_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Text { value } if value.trim().is_empty())
    }

    /// Closest preceding sibling that is not blank text.
    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let siblings = self.siblings(id);
        let index = siblings.iter().position(|s| *s == id)?;
        siblings[..index]
            .iter()
            .rev()
            .find(|s| !self.is_blank_text(**s))
            .copied()
    }

    /// The If/ElseIf/Else chain starting at `siblings[start]`, plus the index
    /// just past its last member. Blank text between arms is skipped.
    pub fn branch_chain(&self, siblings: &[NodeId], start: usize) -> (Vec<NodeId>, usize) {
        let mut chain = vec![siblings[start]];
        let mut end = start + 1;
        let mut i = start + 1;
        while i < siblings.len() {
            let id = siblings[i];
            if self.is_blank_text(id) {
                i += 1;
                continue;
            }
            match self.kind(id) {
                NodeKind::Marker(Marker::ElseIf { .. }) => {
                    chain.push(id);
                    i += 1;
                    end = i;
                }
                NodeKind::Marker(Marker::Else) => {
                    chain.push(id);
                    end = i + 1;
                    break;
                }
                _ => break,
            }
        }
        (chain, end)
    }

    /// `tag[index]/tag[index]` path from the root, indices within each sibling list.
    pub fn node_path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let index = self
                .siblings(cur)
                .iter()
                .position(|s| *s == cur)
                .unwrap_or(0);
            segments.push(format!("{}[{}]", self.kind(cur).label(), index));
            current = self.nodes[cur.0].parent;
        }
        segments.reverse();
        segments.join("/")
    }

    /// Pre-order traversal of every node reachable from the roots.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Slot names declared anywhere in the tree.
    pub fn slot_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for id in self.walk() {
            if let NodeKind::Marker(Marker::Slot { name }) = self.kind(id) {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// `Define` blocks of an extending template, at the root or directly
    /// under the `Extends` marker, in source order.
    pub fn define_blocks(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &id in &self.roots {
            match self.kind(id) {
                NodeKind::Marker(Marker::Define { .. }) => out.push(id),
                NodeKind::Marker(Marker::Extends { .. }) => out.extend(
                    self.children(id)
                        .iter()
                        .copied()
                        .filter(|c| matches!(self.kind(*c), NodeKind::Marker(Marker::Define { .. }))),
                ),
                _ => {}
            }
        }
        out
    }

    /// Parent template name when the tree's root is an `Extends` marker.
    pub fn extends(&self) -> Option<&str> {
        self.roots.iter().find_map(|id| match self.kind(*id) {
            NodeKind::Marker(Marker::Extends { parent }) => Some(parent.as_str()),
            _ => None,
        })
    }
}

pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}
