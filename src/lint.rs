//! Whitelist / Lint Validator
//!
//! Cross-checks the authored property table (PropsMap) against the generated
//! class database (ClassMap). The result is data; callers decide whether any
//! finding fails a build.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::css::class_map::{is_variant_token, ClassMap};
use crate::filters::display_value;

/// Value key used for a property's default branch when no default variant
/// is recorded.
pub const DEFAULT_VARIANT_KEY: &str = "default";

/// Maximum edit distance for typo suggestions.
pub const TYPO_THRESHOLD: usize = 2;

// ═══════════════════════════════════════════════════════════════════════════════
// PROPS MAP
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PropSpec {
    /// Allowed values in authored order; `""` stands for the bare property
    pub values: Vec<String>,
    pub default: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawProp {
    Values(Vec<Value>),
    Table {
        values: Vec<Value>,
        #[serde(default)]
        default: Option<Value>,
    },
}

impl From<RawProp> for PropSpec {
    fn from(raw: RawProp) -> Self {
        let strings = |values: Vec<Value>| -> Vec<String> { values.iter().map(display_value).collect() };
        match raw {
            RawProp::Values(values) => PropSpec {
                values: strings(values),
                default: None,
            },
            RawProp::Table { values, default } => PropSpec {
                values: strings(values),
                default: default.as_ref().map(display_value),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct PropsMap {
    props: BTreeMap<String, PropSpec>,
}

impl<'de> Deserialize<'de> for PropsMap {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, RawProp>::deserialize(deserializer)?;
        Ok(PropsMap {
            props: raw.into_iter().map(|(k, v)| (k, v.into())).collect(),
        })
    }
}

impl PropsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn insert(&mut self, property: &str, values: &[&str], default: Option<&str>) {
        self.props.insert(
            property.to_string(),
            PropSpec {
                values: values.iter().map(|v| v.to_string()).collect(),
                default: default.map(|d| d.to_string()),
            },
        );
    }

    pub fn get(&self, property: &str) -> Option<&PropSpec> {
        self.props.get(property)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropSpec)> {
        self.props.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Value used for the property's default branch.
    ///
    /// A recorded default wins when it is one of the allowed values.
    /// Otherwise a value literally named [`DEFAULT_VARIANT_KEY`] is used.
    /// Anything else has no default branch.
    pub fn default_variant(&self, property: &str) -> Option<&str> {
        let spec = self.props.get(property)?;
        let allowed = |v: &str| spec.values.iter().any(|x| x == v);

        match spec.default.as_deref() {
            Some(recorded) if allowed(recorded) => Some(recorded),
            _ if allowed(DEFAULT_VARIANT_KEY) => Some(DEFAULT_VARIANT_KEY),
            _ => None,
        }
    }
}

/// `property` for the empty value, else `property-value`.
pub fn expected_token(property: &str, value: &str) -> String {
    if value.is_empty() {
        property.to_string()
    } else {
        format!("{}-{}", property, value)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EDIT DISTANCE
// ═══════════════════════════════════════════════════════════════════════════════

/// Levenshtein distance with a single row sized to the shorter string.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    let mut row: Vec<usize> = (0..=short.len()).collect();
    for (i, lc) in long.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let above = row[j + 1];
            let cost = if lc == sc { 0 } else { 1 };
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }
    row[short.len()]
}

/// Closest candidate within `threshold` edits; the first one wins ties.
pub fn find_closest_match<S: AsRef<str>>(
    target: &str,
    candidates: &[S],
    threshold: usize,
) -> Option<String> {
    let target_len = target.chars().count();
    let mut best: Option<(usize, &str)> = None;

    for candidate in candidates {
        let candidate = candidate.as_ref();
        let len = candidate.chars().count();
        let length_gap = target_len.abs_diff(len);
        if length_gap > threshold {
            continue;
        }

        // One string extends the other: the distance is the length gap
        let distance = if candidate.starts_with(target)
            || target.starts_with(candidate)
            || candidate.ends_with(target)
            || target.ends_with(candidate)
        {
            length_gap
        } else {
            levenshtein(target, candidate)
        };

        if distance == 0 {
            return Some(candidate.to_string());
        }
        if distance <= threshold && best.map_or(true, |(d, _)| distance < d) {
            best = Some((distance, candidate));
        }
    }

    best.map(|(_, c)| c.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYNC
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidPropValue {
    pub property: String,
    pub value: String,
    pub expected_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateValue {
    pub property: String,
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypoSuggestion {
    pub property: String,
    pub value: String,
    pub token: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidDefault {
    pub property: String,
    pub default: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub class_map_tokens: usize,
    pub variant_tokens: usize,
    pub prop_values: usize,
    pub covered_tokens: usize,
    /// Percent of non-variant ClassMap tokens reachable from the PropsMap
    pub coverage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// No invalid values and no duplicates
    pub synced: bool,
    pub missing_in_props: Vec<String>,
    pub invalid_prop_values: Vec<InvalidPropValue>,
    pub duplicates: Vec<DuplicateValue>,
    pub typos: Vec<TypoSuggestion>,
    pub invalid_defaults: Vec<InvalidDefault>,
    /// Value each property falls back to, for properties that have one
    pub defaults: BTreeMap<String, String>,
    pub stats: SyncStats,
}

pub fn sync_whitelist(class_map: &ClassMap, props_map: &PropsMap) -> SyncResult {
    let known: Vec<&str> = class_map.tokens().collect();
    let mut result = SyncResult::default();
    let mut reachable = BTreeSet::new();

    for (property, spec) in props_map.iter() {
        let mut counts: Vec<(&str, usize)> = Vec::new();

        for value in &spec.values {
            result.stats.prop_values += 1;
            match counts.iter_mut().find(|(v, _)| *v == value.as_str()) {
                Some((_, count)) => {
                    *count += 1;
                    continue;
                }
                None => counts.push((value.as_str(), 1)),
            }

            let token = expected_token(property, value);
            if class_map.contains(&token) {
                reachable.insert(token);
                continue;
            }

            if let Some(suggestion) = find_closest_match(&token, &known, TYPO_THRESHOLD) {
                result.typos.push(TypoSuggestion {
                    property: property.to_string(),
                    value: value.clone(),
                    token: token.clone(),
                    suggestion,
                });
            }
            result.invalid_prop_values.push(InvalidPropValue {
                property: property.to_string(),
                value: value.clone(),
                expected_token: token,
            });
        }

        for (value, count) in counts.into_iter().filter(|(_, c)| *c > 1) {
            result.duplicates.push(DuplicateValue {
                property: property.to_string(),
                value: value.to_string(),
                count,
            });
        }

        let resolved = props_map.default_variant(property);
        if let Some(recorded) = &spec.default {
            if resolved != Some(recorded.as_str()) {
                result.invalid_defaults.push(InvalidDefault {
                    property: property.to_string(),
                    default: recorded.clone(),
                });
            }
        }
        if let Some(variant) = resolved {
            result.defaults.insert(property.to_string(), variant.to_string());
        }
    }

    let mut plain = 0;
    for token in &known {
        if is_variant_token(token) {
            result.stats.variant_tokens += 1;
            continue;
        }
        plain += 1;
        if !reachable.contains(*token) {
            result.missing_in_props.push(token.to_string());
        }
    }

    result.stats.class_map_tokens = known.len();
    result.stats.covered_tokens = reachable.iter().filter(|t| !is_variant_token(t)).count();
    result.stats.coverage = if plain == 0 {
        100
    } else {
        ((result.stats.covered_tokens as f64 / plain as f64) * 100.0).round() as u32
    };
    result.synced = result.invalid_prop_values.is_empty() && result.duplicates.is_empty();

    log::debug!(
        "whitelist sync: {} invalid, {} duplicates, {} missing, coverage {}%",
        result.invalid_prop_values.len(),
        result.duplicates.len(),
        result.missing_in_props.len(),
        result.stats.coverage
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("gap-5", "gap-4"), 1);
        assert_eq!(levenshtein("flex", "flex"), 0);
    }

    #[test]
    fn test_closest_match_within_threshold() {
        let found = find_closest_match("gap-5", &["gap-4", "gap-6"], 2).unwrap();
        assert!(found == "gap-4" || found == "gap-6");
        assert!(levenshtein("gap-5", &found) <= 2);

        assert_eq!(find_closest_match("gap-5", &["display-grid", "p-12"], 2), None);
        assert_eq!(
            find_closest_match("rounded", &["rounded-lg", "round"], 2),
            Some("round".to_string())
        );
    }

    #[test]
    fn test_scenario_fully_synced() {
        let class_map =
            ClassMap::from_json(r#"{"flex": "display:flex;", "gap-4": "gap:1rem;"}"#).unwrap();
        let props_map = PropsMap::from_json(r#"{"flex": [""], "gap": ["4"]}"#).unwrap();

        let result = sync_whitelist(&class_map, &props_map);
        assert!(result.synced);
        assert_eq!(result.stats.coverage, 100);
        assert!(result.missing_in_props.is_empty());
    }

    #[test]
    fn test_findings() {
        let class_map = ClassMap::from_json(
            r#"{"gap-4": "gap:1rem;", "gap-6": "gap:1.5rem;", "md:gap-4": "gap:1rem;", "hidden": "display:none;"}"#,
        )
        .unwrap();
        let props_map = PropsMap::from_json(
            r#"{"gap": {"values": ["4", "5", "4"], "default": "8"}, "size": [1]}"#,
        )
        .unwrap();

        let result = sync_whitelist(&class_map, &props_map);
        assert!(!result.synced);
        assert_eq!(
            result
                .invalid_prop_values
                .iter()
                .map(|i| i.expected_token.as_str())
                .collect::<Vec<_>>(),
            vec!["gap-5", "size-1"]
        );
        assert_eq!(result.typos.len(), 1);
        assert_eq!(result.typos[0].suggestion, "gap-4");
        assert_eq!(
            result.duplicates,
            vec![DuplicateValue {
                property: "gap".to_string(),
                value: "4".to_string(),
                count: 2,
            }]
        );
        assert_eq!(result.missing_in_props, vec!["gap-6", "hidden"]);
        assert_eq!(result.invalid_defaults.len(), 1);
        assert!(result.defaults.is_empty());
        assert_eq!(result.stats.variant_tokens, 1);
        // 1 of 3 plain tokens
        assert_eq!(result.stats.coverage, 33);
    }

    #[test]
    fn test_default_variant_fallback() {
        let mut props = PropsMap::new();
        props.insert("tone", &["default", "muted"], None);
        props.insert("size", &["sm", "lg"], Some("lg"));
        props.insert("weight", &["bold"], Some("heavy"));
        props.insert("align", &["left"], None);

        assert_eq!(props.default_variant("tone"), Some("default"));
        assert_eq!(props.default_variant("size"), Some("lg"));
        assert_eq!(props.default_variant("weight"), None);
        assert_eq!(props.default_variant("align"), None);
        assert_eq!(props.default_variant("missing"), None);
    }

    #[test]
    fn test_sync_reports_resolved_defaults() {
        let class_map = ClassMap::from_json(
            r#"{"tone-default": "color:inherit;", "tone-muted": "color:gray;", "size-sm": "font-size:.875rem;", "size-lg": "font-size:1.125rem;", "weight-bold": "font-weight:700;"}"#,
        )
        .unwrap();
        let props_map = PropsMap::from_json(
            r#"{"tone": ["default", "muted"], "size": {"values": ["sm", "lg"], "default": "lg"}, "weight": {"values": ["bold"], "default": "heavy"}}"#,
        )
        .unwrap();

        let result = sync_whitelist(&class_map, &props_map);
        assert!(result.synced);
        assert_eq!(
            result.defaults,
            BTreeMap::from([
                ("size".to_string(), "lg".to_string()),
                ("tone".to_string(), DEFAULT_VARIANT_KEY.to_string()),
            ])
        );
        assert_eq!(
            result.invalid_defaults,
            vec![InvalidDefault {
                property: "weight".to_string(),
                default: "heavy".to_string(),
            }]
        );
    }
}
