use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConfigError;
use crate::css::ExtractError;
use crate::pipeline::PipelineError;
use crate::services::RegistryError;

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const E_PARSE: &str = "STN-ERR-PARSE";
pub const E_MISSING_ATTRIBUTE: &str = "STN-ERR-MARKER-ATTR";
pub const E_ORPHAN_BRANCH: &str = "STN-ERR-ORPHAN-BRANCH";
pub const E_EXTENDS_PLACEMENT: &str = "STN-ERR-EXTENDS";
pub const E_INVALID_EXPRESSION: &str = "STN-ERR-EXPR";
pub const E_UNKNOWN_FILTER: &str = "STN-ERR-FILTER";
pub const E_UNRESOLVED_COMPONENT: &str = "STN-ERR-UNRESOLVED";
pub const E_COMPONENT_CYCLE: &str = "STN-ERR-COMPONENT-CYCLE";
pub const E_ORPHAN_COMPOUND: &str = "STN-ERR-ORPHAN-COMPOUND";
pub const E_UNSUPPORTED: &str = "STN-ERR-DIALECT";
pub const E_LAYOUT: &str = "STN-ERR-LAYOUT";

fn get_guarantee(code: &str) -> &'static str {
    match code {
        E_PARSE => "Component sources are well-formed markup.",
        E_MISSING_ATTRIBUTE => "Every marker carries the attributes its lowering needs.",
        E_ORPHAN_BRANCH => "ElseIf and Else always continue an If chain.",
        E_EXTENDS_PLACEMENT => {
            "An extending template consists of one Extends marker and Define blocks only."
        }
        E_INVALID_EXPRESSION => "Marker expressions are parsed before lowering.",
        E_UNKNOWN_FILTER => "Var filters are drawn from the known filter set.",
        E_UNRESOLVED_COMPONENT => "All component and include references resolve at compile time.",
        E_COMPONENT_CYCLE => "Component inlining terminates.",
        E_ORPHAN_COMPOUND => {
            "Compound slot markers must be direct children of their parent component."
        }
        E_UNSUPPORTED => "Emitted templates only use syntax the target dialect understands.",
        E_LAYOUT => "Layout inheritance chains resolve and terminate.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// A compile error for one source file. Fatal for that file only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerError {
    pub code: String,
    pub message: String,
    pub guarantee: String,
    pub file: String,
    /// Path from the root to the offending node, e.g. `ul[0]/Loop[0]/Var[1]`
    pub node_path: Option<String>,
    pub hints: Vec<String>,
}

impl CompilerError {
    pub fn new(code: &str, message: &str, file: &str) -> Self {
        CompilerError {
            code: code.to_string(),
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            file: file.to_string(),
            node_path: None,
            hints: vec![],
        }
    }

    pub fn at(code: &str, message: &str, file: &str, node_path: String) -> Self {
        Self::new(code, message, file).with_node_path(node_path)
    }

    pub fn with_node_path(mut self, node_path: String) -> Self {
        self.node_path = Some(node_path);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.file)?;
        if let Some(path) = &self.node_path {
            write!(f, " ({})", path)?;
        }
        write!(f, ": {}", self.message)?;
        for hint in &self.hints {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompilerError {}

// ═══════════════════════════════════════════════════════════════════════════════
// CRATE ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Compile(#[from] CompilerError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("whitelist out of sync: {invalid} invalid prop values, {duplicates} duplicates")]
    Unsynced { invalid: usize, duplicates: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_location() {
        let err = CompilerError::at(
            E_UNRESOLVED_COMPONENT,
            "component \"Card\" is not registered",
            "views/index.cmp",
            "div[0]/Card[1]".to_string(),
        )
        .with_hint("registered components: Button");

        let text = err.to_string();
        assert!(text.starts_with("[STN-ERR-UNRESOLVED] views/index.cmp (div[0]/Card[1])"));
        assert!(text.contains("hint: registered components: Button"));
        assert_eq!(
            err.guarantee,
            "All component and include references resolve at compile time."
        );
    }
}
