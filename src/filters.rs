//! Named `Var` filters.
//!
//! Dialect emitters only print the filter name; the preview renderer and
//! constant folding apply the formatting here.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Currency,
    Number,
    Upper,
    Lower,
    Capitalize,
    Json,
}

impl Filter {
    pub const ALL: [Filter; 6] = [
        Filter::Currency,
        Filter::Number,
        Filter::Upper,
        Filter::Lower,
        Filter::Capitalize,
        Filter::Json,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Filter::Currency => "currency",
            Filter::Number => "number",
            Filter::Upper => "upper",
            Filter::Lower => "lower",
            Filter::Capitalize => "capitalize",
            Filter::Json => "json",
        }
    }

    /// Apply the filter to an evaluated value.
    pub fn apply(&self, value: &Value, currency_symbol: &str) -> String {
        match self {
            Filter::Currency => match as_number(value) {
                Some(n) => {
                    let sign = if n < 0.0 { "-" } else { "" };
                    format!("{}{}{:.2}", sign, currency_symbol, n.abs())
                }
                None => display_value(value),
            },
            Filter::Number => match as_number(value) {
                Some(n) => format!("{:.2}", n),
                None => display_value(value),
            },
            Filter::Upper => display_value(value).to_uppercase(),
            Filter::Lower => display_value(value).to_lowercase(),
            Filter::Capitalize => {
                let text = display_value(value);
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
            Filter::Json => serde_json::to_string(value).unwrap_or_default(),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Filter::ALL
            .iter()
            .find(|f| f.name() == s.trim())
            .copied()
            .ok_or_else(|| {
                let known: Vec<&str> = Filter::ALL.iter().map(|f| f.name()).collect();
                format!("unknown filter \"{}\" (known: {})", s, known.join(", "))
            })
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Text form of a value as it appears in rendered markup.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
