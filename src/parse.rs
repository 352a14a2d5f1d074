//! Parse Module for the Stencil Compiler
//!
//! Turns a `.cmp` component source into a `ComponentTree`.
//! html5ever does the tokenizing; a few regex pre-passes keep it from
//! applying document semantics the component format does not want
//! (tag lowercasing, implicit table/head restructuring, ignored `/>`).

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;
use std::collections::HashMap;

use crate::error::{
    CompilerError, E_EXTENDS_PLACEMENT, E_INVALID_EXPRESSION, E_MISSING_ATTRIBUTE,
    E_ORPHAN_BRANCH, E_PARSE, E_UNKNOWN_FILTER,
};
use crate::expr::Expr;
use crate::filters::{display_value, Filter};
use crate::node::{Attribute, AttributeValue, ComponentTree, Marker, NodeId, NodeKind};

/// Attribute carrying the original (cased) name of a capitalized tag
const ORIGINAL_TAG_ATTR: &str = "data-stencil-tag";
/// Element name every capitalized tag is parsed as
const CAPITALIZED_PLACEHOLDER: &str = "stencil-cmp";
const STRUCTURAL_PREFIX: &str = "stencil-";

// ═══════════════════════════════════════════════════════════════════════════════
// SVG ATTRIBUTE CASE MAPPING
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    /// html5ever lowercases attribute names; SVG needs these back in camelCase.
    static ref SVG_ATTR_CASE_MAP: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("viewbox", "viewBox");
        m.insert("preserveaspectratio", "preserveAspectRatio");
        m.insert("gradienttransform", "gradientTransform");
        m.insert("gradientunits", "gradientUnits");
        m.insert("patternunits", "patternUnits");
        m.insert("clippathunits", "clipPathUnits");
        m.insert("markerheight", "markerHeight");
        m.insert("markerwidth", "markerWidth");
        m.insert("pathlength", "pathLength");
        m.insert("stddeviation", "stdDeviation");
        m.insert("textlength", "textLength");
        m
    };

    static ref SVG_TAGS: std::collections::HashSet<&'static str> = [
        "svg", "path", "circle", "ellipse", "line", "polyline", "polygon", "rect", "g",
        "defs", "use", "symbol", "clippath", "mask", "pattern", "marker",
        "lineargradient", "radialgradient", "stop", "filter", "fegaussianblur", "text",
        "tspan", "textpath",
    ]
    .into_iter()
    .collect();

    /// Tags html5ever would move or drop outside their document context.
    static ref STRUCTURAL_TAGS: std::collections::HashSet<&'static str> = [
        "html", "head", "body", "title", "table", "thead", "tbody", "tfoot", "tr", "td",
        "th", "caption", "select", "option", "optgroup", "textarea", "template",
    ]
    .into_iter()
    .collect();

    static ref EXPR_PLACEHOLDER_RE: Regex = Regex::new(r"^__STENCIL_EXPR_(\d+)__$").unwrap();

    static ref IDENT_RE: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
}

/// Elements serialized without a closing tag.
pub const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str())
}

// ═══════════════════════════════════════════════════════════════════════════════
// SVG ATTRIBUTE CORRECTION
// ═══════════════════════════════════════════════════════════════════════════════

fn correct_svg_attribute_name(attr_name: &str, tag_name: &str) -> String {
    let lower_tag = tag_name.to_lowercase();
    let lower_attr = attr_name.to_lowercase();

    if SVG_TAGS.contains(lower_tag.as_str()) {
        if let Some(&corrected) = SVG_ATTR_CASE_MAP.get(lower_attr.as_str()) {
            return corrected.to_string();
        }
    }

    attr_name.to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRE-PASSES
// ═══════════════════════════════════════════════════════════════════════════════

/// Find the end of a balanced brace expression, skipping quoted strings.
/// Returns the index after the closing brace, or None if unbalanced.
fn find_balanced_brace_end(chars: &[char], start_index: usize) -> Option<usize> {
    let mut depth = 0;
    let mut i = start_index;
    let mut in_string: Option<char> = None;

    while i < chars.len() {
        let c = chars[i];

        if c == '\\' && i + 1 < chars.len() {
            i += 2;
            continue;
        }

        if let Some(quote) = in_string {
            if c == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => in_string = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }

        i += 1;
    }

    None
}

/// Replace `attr={expr}` inside start tags with a quoted placeholder so
/// html5ever sees an ordinary attribute value. Text content is left alone.
fn normalize_dynamic_attributes(html: &str) -> (String, HashMap<String, String>) {
    let chars: Vec<char> = html.chars().collect();
    let mut normalized = String::with_capacity(html.len());
    let mut expressions = HashMap::new();
    let mut in_tag = false;
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if !in_tag {
            if c == '<' && chars.get(i + 1).map_or(false, |n| n.is_ascii_alphabetic()) {
                in_tag = true;
            }
            normalized.push(c);
            i += 1;
            continue;
        }

        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            normalized.push(c);
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '>' => in_tag = false,
            '=' => {
                let mut j = i + 1;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if chars.get(j) == Some(&'{') {
                    if let Some(end) = find_balanced_brace_end(&chars, j) {
                        let code: String = chars[j + 1..end - 1].iter().collect();
                        let placeholder = format!("__STENCIL_EXPR_{}__", expressions.len());
                        normalized.push_str(&format!("=\"{}\"", placeholder));
                        expressions.insert(placeholder, code.trim().to_string());
                        i = end;
                        continue;
                    }
                }
            }
            _ => {}
        }

        normalized.push(c);
        i += 1;
    }

    (normalized, expressions)
}

/// html5ever ignores `/>` on non-void elements, which would nest the
/// following siblings inside the tag.
fn convert_self_closing_tags(html: &str) -> String {
    lazy_static! {
        static ref SELF_CLOSING_RE: Regex = Regex::new(
            r#"<([A-Za-z][A-Za-z0-9.\-]*)((?:[^>"']|"[^"]*"|'[^']*')*?)\s*/>"#
        )
        .unwrap();
    }

    SELF_CLOSING_RE
        .replace_all(html, |caps: &regex::Captures| {
            let name = &caps[1];
            if is_void_element(name) {
                caps[0].to_string()
            } else {
                format!("<{}{}></{}>", name, &caps[2], name)
            }
        })
        .to_string()
}

/// Strip inline script and style blocks. External scripts stay.
fn strip_blocks(html: &str) -> String {
    lazy_static! {
        static ref SCRIPT_RE: Regex =
            Regex::new(r"(?is)<script\b([^>]*)>([\s\S]*?)</script>").unwrap();
        static ref STYLE_RE: Regex = Regex::new(r"(?is)<style[^>]*>[\s\S]*?</style>").unwrap();
    }

    let result = SCRIPT_RE.replace_all(html, |caps: &regex::Captures| {
        if caps[1].contains("src=") {
            caps[0].to_string()
        } else {
            String::new()
        }
    });

    STYLE_RE.replace_all(&result, "").to_string()
}

/// Pre-pass to keep capitalized tags and structural tags intact.
/// Capitalized tags become a single placeholder element carrying the
/// original name; structural tags get a prefix that is removed again
/// when the tree is built.
fn mark_tags(html: &str) -> String {
    lazy_static! {
        static ref CAP_OPEN_RE: Regex = Regex::new(r"<([A-Z][a-zA-Z0-9.]*)(\s|>)").unwrap();
        static ref CAP_CLOSE_RE: Regex = Regex::new(r"</([A-Z][a-zA-Z0-9.]*)\s*>").unwrap();
        static ref LOWER_OPEN_RE: Regex = Regex::new(r"<(/?)([a-z][a-z0-9]*)(\s|>|/)").unwrap();
    }

    let marked = CAP_OPEN_RE.replace_all(html, |caps: &regex::Captures| {
        format!(
            "<{} {}=\"{}\"{}",
            CAPITALIZED_PLACEHOLDER, ORIGINAL_TAG_ATTR, &caps[1], &caps[2]
        )
    });
    let marked = CAP_CLOSE_RE.replace_all(&marked, format!("</{}>", CAPITALIZED_PLACEHOLDER));

    LOWER_OPEN_RE
        .replace_all(&marked, |caps: &regex::Captures| {
            let name = &caps[2];
            if STRUCTURAL_TAGS.contains(name) {
                format!("<{}{}{}{}", &caps[1], STRUCTURAL_PREFIX, name, &caps[3])
            } else {
                caps[0].to_string()
            }
        })
        .to_string()
}

fn restore_structural_name(local: &str) -> String {
    match local.strip_prefix(STRUCTURAL_PREFIX) {
        Some(rest) if STRUCTURAL_TAGS.contains(rest) => rest.to_string(),
        _ => local.to_string(),
    }
}

/// Check if a tag name represents a component or marker (starts with uppercase)
pub fn is_component_tag(tag_name: &str) -> bool {
    tag_name
        .chars()
        .next()
        .map(|c| c.is_uppercase())
        .unwrap_or(false)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TREE BUILDING
// ═══════════════════════════════════════════════════════════════════════════════

struct TreeBuilder<'a> {
    tree: ComponentTree,
    expressions: &'a HashMap<String, String>,
}

impl<'a> TreeBuilder<'a> {
    fn file(&self) -> String {
        self.tree.file.clone()
    }

    fn child_path(&self, parent: Option<NodeId>, label: &str) -> String {
        let index = match parent {
            Some(p) => self.tree.children(p).len(),
            None => self.tree.roots().len(),
        };
        let segment = format!("{}[{}]", label, index);
        match parent {
            Some(p) => format!("{}/{}", self.tree.node_path(p), segment),
            None => segment,
        }
    }

    fn build_children(&mut self, handle: &Handle, parent: Option<NodeId>) -> Result<(), CompilerError> {
        for child in handle.children.borrow().iter() {
            self.build_node(child, parent)?;
        }
        Ok(())
    }

    fn build_node(&mut self, handle: &Handle, parent: Option<NodeId>) -> Result<(), CompilerError> {
        match &handle.data {
            NodeData::Document => self.build_children(handle, parent),

            NodeData::Doctype { name, .. } => {
                self.tree.push(
                    NodeKind::Doctype {
                        name: name.to_string(),
                    },
                    parent,
                );
                Ok(())
            }

            NodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                // Indentation between tags carries no content
                if text.trim().is_empty() && text.contains('\n') {
                    return Ok(());
                }
                self.tree.push(NodeKind::Text { value: text }, parent);
                Ok(())
            }

            NodeData::Element { name, attrs, .. } => {
                let local = name.local.to_string();

                // Wrappers html5ever synthesizes; authored ones were renamed.
                if local == "html" || local == "head" || local == "body" {
                    return self.build_children(handle, parent);
                }

                let attributes = attrs.borrow();
                let original = attributes
                    .iter()
                    .find(|a| &*a.name.local == ORIGINAL_TAG_ATTR)
                    .map(|a| a.value.to_string());
                let raw: Vec<(String, String)> = attributes
                    .iter()
                    .filter(|a| &*a.name.local != ORIGINAL_TAG_ATTR)
                    .map(|a| (a.name.local.to_string(), a.value.to_string()))
                    .collect();
                drop(attributes);

                let kind = match original {
                    Some(tag) if Marker::is_marker_tag(&tag) => {
                        let path = self.child_path(parent, &tag);
                        NodeKind::Marker(self.parse_marker(&tag, &raw, &path)?)
                    }
                    Some(tag) => {
                        let path = self.child_path(parent, &tag);
                        NodeKind::Component {
                            attributes: self.parse_attributes(&raw, &tag, &path)?,
                            name: tag,
                        }
                    }
                    None => {
                        let tag = restore_structural_name(&local);
                        let path = self.child_path(parent, &tag);
                        NodeKind::Element {
                            attributes: self.parse_attributes(&raw, &tag, &path)?,
                            tag,
                        }
                    }
                };

                let id = self.tree.push(kind, parent);
                self.build_children(handle, Some(id))
            }

            NodeData::Comment { .. } => Ok(()),
            NodeData::ProcessingInstruction { .. } => Ok(()),
        }
    }

    fn placeholder_code(&self, value: &str) -> Option<&String> {
        if EXPR_PLACEHOLDER_RE.is_match(value) {
            self.expressions.get(value)
        } else {
            None
        }
    }

    fn parse_expr(&self, code: &str, path: &str) -> Result<Expr, CompilerError> {
        Expr::parse(code).map_err(|e| {
            CompilerError::at(E_INVALID_EXPRESSION, &e.to_string(), &self.file(), path.to_string())
        })
    }

    fn parse_attributes(
        &self,
        raw: &[(String, String)],
        tag: &str,
        path: &str,
    ) -> Result<Vec<Attribute>, CompilerError> {
        let mut parsed = Vec::with_capacity(raw.len());
        for (name, value) in raw {
            let value = match self.placeholder_code(value) {
                Some(code) => AttributeValue::Dynamic(self.parse_expr(code, path)?),
                None => AttributeValue::Static(value.clone()),
            };
            parsed.push(Attribute {
                name: correct_svg_attribute_name(name, tag),
                value,
            });
        }
        Ok(parsed)
    }

    fn parse_marker(
        &self,
        tag: &str,
        raw: &[(String, String)],
        path: &str,
    ) -> Result<Marker, CompilerError> {
        let get = |name: &str| raw.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str());
        let require = |name: &str| {
            get(name).filter(|v| !v.trim().is_empty()).ok_or_else(|| {
                CompilerError::at(
                    E_MISSING_ATTRIBUTE,
                    &format!("<{}> requires a `{}` attribute", tag, name),
                    &self.file(),
                    path.to_string(),
                )
            })
        };
        // Expression attributes accept both `attr="a.b"` and `attr={a.b}`
        let expr_attr = |name: &str| -> Result<Expr, CompilerError> {
            let value = require(name)?;
            let code = self.placeholder_code(value).map(|s| s.as_str()).unwrap_or(value);
            self.parse_expr(code, path)
        };
        let identifier = |name: &str, value: &str| -> Result<String, CompilerError> {
            if IDENT_RE.is_match(value) {
                Ok(value.to_string())
            } else {
                Err(CompilerError::at(
                    E_INVALID_EXPRESSION,
                    &format!("`{}` on <{}> must be an identifier, got \"{}\"", name, tag, value),
                    &self.file(),
                    path.to_string(),
                ))
            }
        };

        let marker = match tag {
            "If" => Marker::If {
                condition: expr_attr("condition")?,
            },
            "ElseIf" => Marker::ElseIf {
                condition: expr_attr("condition")?,
            },
            "Else" => Marker::Else,
            "Loop" => {
                let alias = identifier("as", get("as").unwrap_or("item"))?;
                let key = match get("key").or_else(|| get("index")) {
                    Some(k) => Some(identifier("key", k)?),
                    None => None,
                };
                Marker::Loop {
                    items: expr_attr("items")?,
                    alias,
                    key,
                }
            }
            "Var" => {
                let filter = match get("filter") {
                    Some(name) => Some(name.parse::<Filter>().map_err(|msg| {
                        CompilerError::at(E_UNKNOWN_FILTER, &msg, &self.file(), path.to_string())
                    })?),
                    None => None,
                };
                let default = match get("default") {
                    Some(value) => match self.placeholder_code(value) {
                        Some(code) => match self.parse_expr(code, path)? {
                            Expr::Literal(v) => Some(display_value(&v)),
                            _ => {
                                return Err(CompilerError::at(
                                    E_INVALID_EXPRESSION,
                                    "`default` on <Var> must be a literal",
                                    &self.file(),
                                    path.to_string(),
                                ))
                            }
                        },
                        None => Some(value.to_string()),
                    },
                    None => None,
                };
                Marker::Var {
                    path: expr_attr("path")?,
                    default,
                    filter,
                    raw: get("raw").map_or(false, |v| v != "false"),
                }
            }
            "Slot" => Marker::Slot {
                name: get("name")
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or("default")
                    .to_string(),
            },
            "Include" => {
                let template = require("template")?.to_string();
                let mut props = std::collections::BTreeMap::new();
                for (name, value) in raw.iter().filter(|(n, _)| n != "template") {
                    let expr = match self.placeholder_code(value) {
                        Some(code) => self.parse_expr(code, path)?,
                        None => Expr::string(value),
                    };
                    props.insert(name.clone(), expr);
                }
                Marker::Include { template, props }
            }
            "Extends" => Marker::Extends {
                parent: require("parent")?.to_string(),
            },
            "Define" => Marker::Define {
                name: require("name")?.to_string(),
            },
            other => {
                return Err(CompilerError::at(
                    E_PARSE,
                    &format!("unknown marker <{}>", other),
                    &self.file(),
                    path.to_string(),
                ))
            }
        };

        Ok(marker)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRUCTURAL VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

fn is_define(tree: &ComponentTree, id: NodeId) -> bool {
    matches!(tree.kind(id), NodeKind::Marker(Marker::Define { .. }))
}

/// Branch chains and inheritance placement.
pub fn validate_structure(tree: &ComponentTree) -> Result<(), CompilerError> {
    let file = tree.file.as_str();
    let extends: Vec<NodeId> = tree
        .walk()
        .into_iter()
        .filter(|id| matches!(tree.kind(*id), NodeKind::Marker(Marker::Extends { .. })))
        .collect();

    if extends.len() > 1 {
        return Err(CompilerError::at(
            E_EXTENDS_PLACEMENT,
            "a template can extend only one parent",
            file,
            tree.node_path(extends[1]),
        ));
    }
    if let Some(&ext) = extends.first() {
        if tree.node(ext).parent.is_some() {
            return Err(CompilerError::at(
                E_EXTENDS_PLACEMENT,
                "<Extends> must be a top-level node",
                file,
                tree.node_path(ext),
            ));
        }
        let strays = tree
            .roots()
            .iter()
            .chain(tree.children(ext).iter())
            .copied()
            .find(|id| *id != ext && !is_define(tree, *id) && !tree.is_blank_text(*id));
        if let Some(stray) = strays {
            return Err(CompilerError::at(
                E_EXTENDS_PLACEMENT,
                "an extending template may only contain <Define> blocks next to <Extends>",
                file,
                tree.node_path(stray),
            )
            .with_hint("wrap the content in <Define name=\"...\">"));
        }
    }

    for id in tree.walk() {
        match tree.kind(id) {
            NodeKind::Marker(Marker::ElseIf { .. }) | NodeKind::Marker(Marker::Else) => {
                let continues_chain = matches!(
                    tree.previous_sibling(id).map(|p| tree.kind(p)),
                    Some(NodeKind::Marker(Marker::If { .. }))
                        | Some(NodeKind::Marker(Marker::ElseIf { .. }))
                );
                if !continues_chain {
                    return Err(CompilerError::at(
                        E_ORPHAN_BRANCH,
                        &format!(
                            "<{}> must directly follow an <If> or <ElseIf>",
                            tree.kind(id).label()
                        ),
                        file,
                        tree.node_path(id),
                    ));
                }
            }
            NodeKind::Marker(Marker::Define { .. }) => {
                let parent_ok = match tree.node(id).parent {
                    None => !extends.is_empty(),
                    Some(p) => matches!(tree.kind(p), NodeKind::Marker(Marker::Extends { .. })),
                };
                if !parent_ok {
                    return Err(CompilerError::at(
                        E_EXTENDS_PLACEMENT,
                        "<Define> is only valid in a template that uses <Extends>",
                        file,
                        tree.node_path(id),
                    ));
                }
            }
            _ => {}
        }
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN PARSING FUNCTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse a component source into a validated tree.
pub fn parse_component(source: &str, file_path: &str) -> Result<ComponentTree, CompilerError> {
    // Step 1: Strip inline script and style blocks
    let stripped = strip_blocks(source);

    // Step 2: Normalize `attr={expr}` to placeholders
    let (normalized, expressions) = normalize_dynamic_attributes(&stripped);

    // Step 3: Expand self-closing tags
    let expanded = convert_self_closing_tags(&normalized);

    // Step 4: Preserve capitalized and structural tags
    let marked = mark_tags(&expanded);

    // Step 5: Parse with html5ever
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut marked.as_bytes())
        .map_err(|e| {
            CompilerError::new(E_PARSE, &format!("failed to parse markup: {}", e), file_path)
        })?;

    // Step 6: Convert the DOM into the arena
    let mut builder = TreeBuilder {
        tree: ComponentTree::new(file_path),
        expressions: &expressions,
    };
    builder.build_node(&dom.document, None)?;

    validate_structure(&builder.tree)?;
    Ok(builder.tree)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_component_tag() {
        assert!(is_component_tag("Button"));
        assert!(is_component_tag("Card.Header"));
        assert!(!is_component_tag("div"));
    }

    #[test]
    fn test_svg_attribute_correction() {
        assert_eq!(correct_svg_attribute_name("viewbox", "svg"), "viewBox");
        assert_eq!(correct_svg_attribute_name("class", "svg"), "class");
        assert_eq!(correct_svg_attribute_name("viewbox", "div"), "viewbox");
    }

    #[test]
    fn test_find_balanced_brace() {
        let chars: Vec<char> = "{a.b}".chars().collect();
        assert_eq!(find_balanced_brace_end(&chars, 0), Some(5));
        let chars: Vec<char> = "{'x }' == y}".chars().collect();
        assert_eq!(find_balanced_brace_end(&chars, 0), Some(12));
        let chars: Vec<char> = "{open".chars().collect();
        assert_eq!(find_balanced_brace_end(&chars, 0), None);
    }

    #[test]
    fn test_normalize_only_touches_attributes() {
        let (normalized, exprs) =
            normalize_dynamic_attributes("<If condition={a > 1}>{literal}</If>");
        assert_eq!(normalized, "<If condition=\"__STENCIL_EXPR_0__\">{literal}</If>");
        assert_eq!(exprs.get("__STENCIL_EXPR_0__").map(String::as_str), Some("a > 1"));
    }

    #[test]
    fn test_convert_self_closing() {
        assert_eq!(convert_self_closing_tags("<Button />"), "<Button></Button>");
        assert_eq!(
            convert_self_closing_tags("<Var path=\"a\" filter=\"upper\"/>"),
            "<Var path=\"a\" filter=\"upper\"></Var>"
        );
        assert_eq!(convert_self_closing_tags("<br />"), "<br />");
        assert_eq!(
            convert_self_closing_tags("<Card.Header />"),
            "<Card.Header></Card.Header>"
        );
    }

    #[test]
    fn test_mark_tags() {
        let marked = mark_tags("<table><Card title=\"x\"></Card></table>");
        assert_eq!(
            marked,
            "<stencil-table><stencil-cmp data-stencil-tag=\"Card\" title=\"x\"></stencil-cmp></stencil-table>"
        );
        assert_eq!(restore_structural_name("stencil-table"), "table");
        assert_eq!(restore_structural_name("stencil-cmp"), "stencil-cmp");
    }

    #[test]
    fn test_strip_blocks_keeps_external_scripts() {
        let html = "<script>let a = 1;</script><script src=\"/app.js\"></script><style>p{}</style><p>x</p>";
        assert_eq!(strip_blocks(html), "<script src=\"/app.js\"></script><p>x</p>");
    }
}
