//! Target template dialects.
//!
//! Each dialect implements `DialectEmitter`; the lowering walk in
//! `transform` decides *what* to emit and the emitter decides the syntax.
//! Emitters return `Err(message)` for constructs the dialect cannot express;
//! the caller attaches file and node path.

mod handlebars;
mod jinja;
mod mustache;

pub use handlebars::HandlebarsEmitter;
pub use jinja::JinjaEmitter;
pub use mustache::MustacheEmitter;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::expr::Expr;
use crate::filters::Filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Mustache,
    Jinja,
    Handlebars,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Mustache, Dialect::Jinja, Dialect::Handlebars];

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Mustache => "mustache",
            Dialect::Jinja => "jinja",
            Dialect::Handlebars => "handlebars",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Dialect::Mustache => "mustache",
            Dialect::Jinja => "jinja",
            Dialect::Handlebars => "hbs",
        }
    }

    /// Whether a component reference can be emitted as a partial include.
    pub fn supports_partials(&self) -> bool {
        true
    }

    /// Whether partials accept arguments at the include site.
    pub fn supports_parameterized_partials(&self) -> bool {
        !matches!(self, Dialect::Mustache)
    }

    /// How a template refers to another template file, e.g. `partials/Card`.
    pub fn reference(&self, path: &str) -> String {
        match self {
            Dialect::Jinja => format!("{}.{}", path, self.extension()),
            Dialect::Mustache | Dialect::Handlebars => path.to_string(),
        }
    }

    pub fn emitter(&self) -> Box<dyn DialectEmitter> {
        match self {
            Dialect::Mustache => Box::new(MustacheEmitter::default()),
            Dialect::Jinja => Box::new(JinjaEmitter),
            Dialect::Handlebars => Box::new(HandlebarsEmitter),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mustache" => Ok(Dialect::Mustache),
            "jinja" | "jinja2" => Ok(Dialect::Jinja),
            "handlebars" | "hbs" => Ok(Dialect::Handlebars),
            other => Err(format!(
                "unknown dialect \"{}\" (expected mustache, jinja or handlebars)",
                other
            )),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EMITTER CONTRACT
// ═══════════════════════════════════════════════════════════════════════════════

/// One enclosing `Loop`, innermost last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopFrame {
    pub alias: String,
    pub key: Option<String>,
}

/// One arm of a grouped conditional; `None` is the `Else` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Option<Expr>,
    pub body: String,
}

pub type EmitResult = Result<String, String>;

pub trait DialectEmitter {
    fn dialect(&self) -> Dialect;

    /// Paths some `Loop` in the template iterates over, given before lowering.
    fn iterated_paths(&mut self, _paths: BTreeSet<Vec<String>>) {}

    /// Literal markup text, already HTML-escaped; escape dialect delimiters.
    fn text(&self, text: &str) -> String;

    /// Interpolation of an expression.
    fn variable(
        &self,
        expr: &Expr,
        default: Option<&str>,
        filter: Option<Filter>,
        raw: bool,
        scope: &[LoopFrame],
    ) -> EmitResult;

    /// One construct for a whole If/ElseIf/Else chain.
    fn conditional(&self, branches: &[Branch], scope: &[LoopFrame]) -> EmitResult;

    /// `scope` is the scope outside the loop; `body` was lowered inside it.
    fn loop_block(
        &self,
        items: &Expr,
        frame: &LoopFrame,
        body: &str,
        scope: &[LoopFrame],
    ) -> EmitResult;

    fn slot(&self, name: &str, default_body: &str) -> String;

    fn include(
        &self,
        template: &str,
        props: &BTreeMap<String, Expr>,
        scope: &[LoopFrame],
        warnings: &mut Vec<String>,
    ) -> EmitResult;

    /// Child template: parent reference plus overridden regions in order.
    fn extends(&self, parent: &str, blocks: &[(String, String)]) -> String;
}

/// Region names must be identifiers in Jinja; all dialects share the
/// same mapping so parent slots and child defines stay paired.
pub fn block_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

pub fn partial_path(component: &str) -> String {
    format!("partials/{}", component)
}

pub fn layout_path(layout: &str) -> String {
    format!("layouts/{}", layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_names() {
        assert_eq!("hbs".parse::<Dialect>(), Ok(Dialect::Handlebars));
        assert_eq!("Jinja".parse::<Dialect>(), Ok(Dialect::Jinja));
        assert!("liquid".parse::<Dialect>().is_err());
        assert_eq!(Dialect::Handlebars.extension(), "hbs");
        assert_eq!(Dialect::Jinja.reference("partials/Card"), "partials/Card.jinja");
    }

    #[test]
    fn test_block_name() {
        assert_eq!(block_name("content"), "content");
        assert_eq!(block_name("header-nav"), "header_nav");
        assert_eq!(block_name("2col"), "_2col");
    }
}
