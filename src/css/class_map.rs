//! ClassMap: utility token → CSS declarations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Delimiter between variant prefixes and the base token (`md:hover:p-4`).
pub const VARIANT_DELIMITER: char = ':';

const STATE_VARIANTS: [(&str, &str); 9] = [
    ("hover", ":hover"),
    ("focus", ":focus"),
    ("active", ":active"),
    ("visited", ":visited"),
    ("disabled", ":disabled"),
    ("focus-within", ":focus-within"),
    ("focus-visible", ":focus-visible"),
    ("first", ":first-child"),
    ("last", ":last-child"),
];

pub fn default_breakpoints() -> BTreeMap<String, String> {
    [
        ("sm", "640px"),
        ("md", "768px"),
        ("lg", "1024px"),
        ("xl", "1280px"),
        ("2xl", "1536px"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Token carries a variant prefix and is excluded from coverage.
pub fn is_variant_token(token: &str) -> bool {
    token.contains(VARIANT_DELIMITER)
}

/// Numeric part of a breakpoint width, for ordering media blocks.
pub fn breakpoint_width(value: &str) -> f64 {
    let digits: String = value
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().unwrap_or(0.0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToken<'a> {
    /// Breakpoint name when the token was `bp:...`
    pub breakpoint: Option<String>,
    /// Pseudo-class suffix, e.g. `:hover`
    pub pseudo: Option<&'static str>,
    pub declarations: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassMap {
    entries: BTreeMap<String, String>,
}

impl ClassMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn insert(&mut self, token: &str, declarations: &str) {
        self.entries
            .insert(token.to_string(), declarations.to_string());
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries.get(token).map(|s| s.as_str())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.entries.contains_key(token)
    }

    /// All tokens in sorted order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a token, stripping variant prefixes when the token is not
    /// present verbatim. A verbatim entry keeps the variants its own prefixes
    /// name. Unknown prefixes or base tokens resolve to `None`.
    pub fn resolve(
        &self,
        token: &str,
        breakpoints: &BTreeMap<String, String>,
    ) -> Option<ResolvedToken<'_>> {
        let mut parts: Vec<&str> = token.split(VARIANT_DELIMITER).collect();
        let base = parts.pop()?;

        if let Some(declarations) = self.get(token) {
            let (breakpoint, pseudo) = variants(&parts, breakpoints).unwrap_or_default();
            return Some(ResolvedToken {
                breakpoint,
                pseudo,
                declarations,
            });
        }

        if parts.is_empty() {
            return None;
        }
        let (breakpoint, pseudo) = variants(&parts, breakpoints)?;

        Some(ResolvedToken {
            breakpoint,
            pseudo,
            declarations: self.get(base)?,
        })
    }
}

/// At most one breakpoint and one state variant; anything else is `None`.
fn variants(
    prefixes: &[&str],
    breakpoints: &BTreeMap<String, String>,
) -> Option<(Option<String>, Option<&'static str>)> {
    let mut breakpoint = None;
    let mut pseudo = None;
    for prefix in prefixes {
        if breakpoints.contains_key(*prefix) && breakpoint.is_none() {
            breakpoint = Some(prefix.to_string());
        } else if let Some((_, suffix)) = STATE_VARIANTS
            .iter()
            .find(|(name, _)| name == prefix)
            .filter(|_| pseudo.is_none())
        {
            pseudo = Some(*suffix);
        } else {
            return None;
        }
    }
    Some((breakpoint, pseudo))
}

/// Split a declaration string (`display:flex; gap:1rem`) into statements.
pub fn declarations(text: &str) -> impl Iterator<Item = &str> {
    text.split(';').map(|d| d.trim()).filter(|d| !d.is_empty())
}
