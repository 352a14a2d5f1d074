//! Style Extraction Engine
//!
//! Scans generated markup for utility classes, collapses them into semantic
//! selectors and writes two stylesheets: an alias sheet (`@apply` of the
//! tokens) and a property sheet with the tokens expanded through the
//! ClassMap.
//!
//! Tags are found with a single regex pass; the markup is produced by this
//! crate, so no DOM is built.

pub mod class_map;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::join_all;
use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use class_map::{default_breakpoints, ClassMap};

use crate::discovery::find_files;

pub const ALIAS_STYLESHEET: &str = "styles.alias.css";
pub const PROPERTY_STYLESHEET: &str = "styles.css";

/// Extensions scanned for markup.
pub const MARKUP_EXTENSIONS: [&str; 4] = ["html", "mustache", "jinja", "hbs"];

lazy_static! {
    static ref START_TAG_RE: Regex =
        Regex::new(r#"<([a-zA-Z][a-zA-Z0-9-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#).unwrap();
    static ref ATTRIBUTE_RE: Regex =
        Regex::new(r#"([^\s=/"'<>]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap();
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid class map {path}: {source}")]
    ClassMap {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub style_attribute: String,
    pub selector_attribute: String,
    pub breakpoints: BTreeMap<String, String>,
    /// Header timestamp; `None` uses the current time
    pub timestamp: Option<DateTime<Utc>>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            style_attribute: "class".to_string(),
            selector_attribute: "data-semantic".to_string(),
            breakpoints: default_breakpoints(),
            timestamp: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCANNING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledTag {
    pub tag: String,
    pub tokens: Vec<String>,
    pub selector: Option<String>,
}

fn is_noise(token: &str) -> bool {
    token.contains("data-") || token.contains('{') || token.contains('}')
}

/// Every start tag carrying a non-empty style attribute.
pub fn scan_tags(markup: &str, options: &ExtractOptions) -> Vec<StyledTag> {
    let mut out = Vec::new();

    for caps in START_TAG_RE.captures_iter(markup) {
        let tag = caps[1].to_lowercase();
        let mut tokens = None;
        let mut selector = None;

        for attr in ATTRIBUTE_RE.captures_iter(&caps[2]) {
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .map_or("", |m| m.as_str());
            let name = &attr[1];
            if name == options.style_attribute {
                tokens = Some(
                    value
                        .split_whitespace()
                        .filter(|t| !is_noise(t))
                        .map(|t| t.to_string())
                        .collect::<Vec<_>>(),
                );
            } else if name == options.selector_attribute && !value.trim().is_empty() {
                selector = Some(value.trim().to_string());
            }
        }

        match tokens {
            Some(tokens) if !tokens.is_empty() => out.push(StyledTag {
                tag,
                tokens,
                selector,
            }),
            _ => {}
        }
    }

    out
}

/// Selector for a tag without a semantic name: tag plus a short hash of the
/// tag and its normalized tokens, stable across runs.
pub fn synthesize_selector(tag: &str, tokens: &[String]) -> String {
    let normalized = normalize(tokens.iter().cloned());
    let mut hasher = Sha256::new();
    hasher.update(tag.as_bytes());
    hasher.update(b"\0");
    hasher.update(normalized.join(" ").as_bytes());
    let digest = hasher.finalize();
    let suffix: String = digest[..3].iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}", tag, suffix)
}

fn normalize(tokens: impl Iterator<Item = String>) -> Vec<String> {
    tokens.collect::<BTreeSet<_>>().into_iter().collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// GROUPING & MERGING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorGroup {
    pub selector: String,
    /// Sorted and deduplicated
    pub class_tokens: Vec<String>,
    pub source_files: BTreeSet<String>,
}

/// Group the tags of every `(file name, markup)` pair by selector.
pub fn group_selectors(
    files: &[(String, String)],
    options: &ExtractOptions,
) -> BTreeMap<String, SelectorGroup> {
    let scanned: Vec<(&String, Vec<StyledTag>)> = files
        .par_iter()
        .map(|(name, markup)| (name, scan_tags(markup, options)))
        .collect();

    let mut accumulated: BTreeMap<String, (BTreeSet<String>, BTreeSet<String>)> = BTreeMap::new();
    for (file, tags) in scanned {
        for tag in tags {
            let selector = tag
                .selector
                .clone()
                .unwrap_or_else(|| synthesize_selector(&tag.tag, &tag.tokens));
            let entry = accumulated.entry(selector).or_default();
            entry.0.extend(tag.tokens);
            entry.1.insert(file.clone());
        }
    }

    accumulated
        .into_iter()
        .map(|(selector, (tokens, files))| {
            let group = SelectorGroup {
                selector: selector.clone(),
                class_tokens: tokens.into_iter().collect(),
                source_files: files,
            };
            (selector, group)
        })
        .collect()
}

/// One emitted rule: every selector sharing an identical token set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedRule {
    /// Sorted lexicographically
    pub selectors: Vec<String>,
    pub tokens: Vec<String>,
}

impl MergedRule {
    pub fn selector_list(&self, pseudo: &str) -> String {
        self.selectors
            .iter()
            .map(|s| format!("{}{}", class_selector(s), pseudo))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn class_selector(selector: &str) -> String {
    if selector.starts_with('.') {
        selector.to_string()
    } else {
        format!(".{}", selector)
    }
}

/// Invert selector → tokens into tokens → selectors. Rules come out sorted
/// by their first selector.
pub fn merge_groups(groups: &BTreeMap<String, SelectorGroup>) -> Vec<MergedRule> {
    let mut by_tokens: BTreeMap<&[String], Vec<String>> = BTreeMap::new();
    for group in groups.values() {
        by_tokens
            .entry(group.class_tokens.as_slice())
            .or_default()
            .push(group.selector.clone());
    }

    let mut rules: Vec<MergedRule> = by_tokens
        .into_iter()
        .map(|(tokens, mut selectors)| {
            selectors.sort();
            MergedRule {
                selectors,
                tokens: tokens.to_vec(),
            }
        })
        .collect();
    rules.sort_by(|a, b| a.selectors.cmp(&b.selectors));
    rules
}

// ═══════════════════════════════════════════════════════════════════════════════
// EMISSION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn header(kind: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "/* {} generated by stencil at {} */\n",
        kind,
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

pub fn alias_stylesheet(rules: &[MergedRule]) -> String {
    let mut out = String::new();
    for rule in rules {
        out.push_str(&format!(
            "{} {{\n  @apply {};\n}}\n",
            rule.selector_list(""),
            rule.tokens.join(" ")
        ));
    }
    out
}

/// Property sheet plus the tokens the ClassMap could not resolve.
pub fn property_stylesheet(
    rules: &[MergedRule],
    class_map: &ClassMap,
    breakpoints: &BTreeMap<String, String>,
) -> (String, BTreeSet<String>) {
    let mut unknown = BTreeSet::new();
    let mut out = String::new();
    // breakpoint → rendered rules
    let mut media: BTreeMap<String, String> = BTreeMap::new();

    for rule in rules {
        let mut base = String::new();
        let mut pseudo_blocks: BTreeMap<&str, String> = BTreeMap::new();
        let mut media_blocks: BTreeMap<String, BTreeMap<&str, String>> = BTreeMap::new();

        for token in &rule.tokens {
            let Some(resolved) = class_map.resolve(token, breakpoints) else {
                unknown.insert(token.clone());
                base.push_str(&format!("  /* unknown class: {} */\n", token));
                continue;
            };
            let pseudo = resolved.pseudo.unwrap_or("");
            let target = match &resolved.breakpoint {
                Some(bp) => media_blocks
                    .entry(bp.clone())
                    .or_default()
                    .entry(pseudo)
                    .or_default(),
                None if pseudo.is_empty() => &mut base,
                None => pseudo_blocks.entry(pseudo).or_default(),
            };
            for declaration in class_map::declarations(resolved.declarations) {
                target.push_str(&format!("  {};\n", declaration));
            }
        }

        if !base.is_empty() {
            out.push_str(&format!("{} {{\n{}}}\n", rule.selector_list(""), base));
        }
        for (pseudo, body) in pseudo_blocks {
            out.push_str(&format!("{} {{\n{}}}\n", rule.selector_list(pseudo), body));
        }
        for (bp, blocks) in media_blocks {
            let section = media.entry(bp).or_default();
            for (pseudo, body) in blocks {
                section.push_str(&format!("  {} {{\n", rule.selector_list(pseudo)));
                for line in body.lines() {
                    section.push_str(&format!("  {}\n", line));
                }
                section.push_str("  }\n");
            }
        }
    }

    let mut ordered: Vec<(&String, &String)> = media.iter().collect();
    ordered.sort_by(|a, b| {
        let wa = breakpoints.get(a.0).map_or(0.0, |w| class_map::breakpoint_width(w));
        let wb = breakpoints.get(b.0).map_or(0.0, |w| class_map::breakpoint_width(w));
        wa.total_cmp(&wb).then_with(|| a.0.cmp(b.0))
    });
    for (bp, body) in ordered {
        let width = breakpoints.get(bp).map_or("0px", |w| w.as_str());
        out.push_str(&format!("@media (min-width: {}) {{\n{}}}\n", width, body));
    }

    (out, unknown)
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXTRACTION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stylesheets {
    pub alias: String,
    pub property: String,
    pub groups: Vec<SelectorGroup>,
    pub rules: Vec<MergedRule>,
    pub unknown_tokens: BTreeSet<String>,
}

/// Build both stylesheets from in-memory markup.
pub fn build_stylesheets(
    files: &[(String, String)],
    class_map: &ClassMap,
    options: &ExtractOptions,
) -> Stylesheets {
    let groups = group_selectors(files, options);
    let rules = merge_groups(&groups);
    let timestamp = options.timestamp.unwrap_or_else(Utc::now);

    let alias = format!("{}{}", header("Alias stylesheet", timestamp), alias_stylesheet(&rules));
    let (body, unknown_tokens) = property_stylesheet(&rules, class_map, &options.breakpoints);
    let property = format!("{}{}", header("Property stylesheet", timestamp), body);

    for token in &unknown_tokens {
        log::warn!("unknown class token `{}`", token);
    }

    Stylesheets {
        alias,
        property,
        groups: groups.into_values().collect(),
        rules,
        unknown_tokens,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractReport {
    pub files_scanned: usize,
    pub selectors: usize,
    pub rules: usize,
    pub unknown_tokens: BTreeSet<String>,
    pub alias_path: PathBuf,
    pub property_path: PathBuf,
    pub alias_size: usize,
    pub property_size: usize,
}

pub async fn load_class_map(path: &Path) -> Result<ClassMap, ExtractError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ExtractError::Read {
            path: path.display().to_string(),
            source,
        })?;
    ClassMap::from_json(&json).map_err(|source| ExtractError::ClassMap {
        path: path.display().to_string(),
        source,
    })
}

/// Scan every markup file under `dirs` and (over)write both stylesheets
/// into `out_dir`.
pub async fn extract(
    dirs: &[PathBuf],
    out_dir: &Path,
    class_map: &ClassMap,
    options: &ExtractOptions,
) -> Result<ExtractReport, ExtractError> {
    let mut paths: Vec<(PathBuf, String)> = Vec::new();
    for dir in dirs {
        for path in find_files(dir, None) {
            let is_markup = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| MARKUP_EXTENSIONS.contains(&e));
            if is_markup {
                let name = path
                    .strip_prefix(dir)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                paths.push((path, name));
            }
        }
    }

    let reads = paths.iter().map(|(path, name)| async move {
        tokio::fs::read_to_string(path)
            .await
            .map(|markup| (name.clone(), markup))
            .map_err(|source| ExtractError::Read {
                path: path.display().to_string(),
                source,
            })
    });
    let files = join_all(reads)
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    let sheets = build_stylesheets(&files, class_map, options);

    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|source| ExtractError::Write {
            path: out_dir.display().to_string(),
            source,
        })?;
    let alias_path = out_dir.join(ALIAS_STYLESHEET);
    let property_path = out_dir.join(PROPERTY_STYLESHEET);
    let writes = [
        (&alias_path, &sheets.alias),
        (&property_path, &sheets.property),
    ]
    .map(|(path, content)| async move {
        tokio::fs::write(path, content)
            .await
            .map_err(|source| ExtractError::Write {
                path: path.display().to_string(),
                source,
            })
    });
    for result in join_all(writes).await {
        result?;
    }

    log::debug!(
        "extracted {} rules from {} files into {}",
        sheets.rules.len(),
        files.len(),
        out_dir.display()
    );

    Ok(ExtractReport {
        files_scanned: files.len(),
        selectors: sheets.groups.len(),
        rules: sheets.rules.len(),
        unknown_tokens: sheets.unknown_tokens,
        alias_path,
        property_path,
        alias_size: sheets.alias.len(),
        property_size: sheets.property.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn options() -> ExtractOptions {
        ExtractOptions {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single(),
            ..ExtractOptions::default()
        }
    }

    fn files(markup: &str) -> Vec<(String, String)> {
        vec![("index.html".to_string(), markup.to_string())]
    }

    #[test]
    fn test_scan_skips_empty_and_noise() {
        let tags = scan_tags(
            r#"<div class=""></div><p class="data-x p-2" data-semantic="intro"></p><span class='a b'>"#,
            &options(),
        );
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].tokens, vec!["p-2".to_string()]);
        assert_eq!(tags[0].selector.as_deref(), Some("intro"));
        assert_eq!(tags[1].tag, "span");
    }

    #[test]
    fn test_identical_sets_merge_into_one_rule() {
        let markup = r#"<div class="p-4 bg-card" data-semantic="card-b"></div>
<div class="bg-card p-4" data-semantic="card-a"></div>"#;
        let mut class_map = ClassMap::new();
        class_map.insert("p-4", "padding:1rem;");
        let sheets = build_stylesheets(&files(markup), &class_map, &options());

        assert_eq!(sheets.rules.len(), 1);
        assert_eq!(
            sheets.alias,
            "/* Alias stylesheet generated by stencil at 2024-01-01T00:00:00Z */\n\
             .card-a, .card-b {\n  @apply bg-card p-4;\n}\n"
        );
        assert!(sheets
            .property
            .contains(".card-a, .card-b {\n  /* unknown class: bg-card */\n  padding:1rem;\n}\n"));
        assert!(sheets.unknown_tokens.contains("bg-card"));
    }

    #[test]
    fn test_synthesized_selector_is_deterministic() {
        let tokens = vec!["p-4".to_string(), "flex".to_string()];
        let reordered = vec!["flex".to_string(), "p-4".to_string()];
        let a = synthesize_selector("div", &tokens);
        assert_eq!(a, synthesize_selector("div", &reordered));
        assert!(a.starts_with("div-"));
        assert_eq!(a.len(), "div-".len() + 6);
        assert_ne!(a, synthesize_selector("span", &tokens));
    }

    #[test]
    fn test_responsive_tokens_go_into_media_queries() {
        let markup = r#"<section class="p-4 md:p-8 lg:p-16 hover:p-8" data-semantic="hero"></section>"#;
        let mut class_map = ClassMap::new();
        class_map.insert("p-4", "padding:1rem;");
        class_map.insert("p-8", "padding:2rem;");
        class_map.insert("p-16", "padding:4rem;");
        let sheets = build_stylesheets(&files(markup), &class_map, &options());

        let body = sheets.property.lines().skip(1).collect::<Vec<_>>().join("\n");
        assert_eq!(
            body,
            ".hero {\n  padding:1rem;\n}\n\
             .hero:hover {\n  padding:2rem;\n}\n\
             @media (min-width: 768px) {\n  .hero {\n    padding:2rem;\n  }\n}\n\
             @media (min-width: 1024px) {\n  .hero {\n    padding:4rem;\n  }\n}"
        );
    }

    #[test]
    fn test_verbatim_responsive_token_stays_in_its_media_query() {
        let markup = r#"<nav class="hidden md:flex" data-semantic="nav"></nav>"#;
        let mut class_map = ClassMap::new();
        class_map.insert("hidden", "display:none;");
        class_map.insert("md:flex", "display:flex;");
        let sheets = build_stylesheets(&files(markup), &class_map, &options());

        let body = sheets.property.lines().skip(1).collect::<Vec<_>>().join("\n");
        assert_eq!(
            body,
            ".nav {\n  display:none;\n}\n\
             @media (min-width: 768px) {\n  .nav {\n    display:flex;\n  }\n}"
        );
        assert!(sheets.unknown_tokens.is_empty());
    }

    #[test]
    fn test_output_is_stable_across_runs() {
        let markup = r#"<a class="x y"></a><b class="y x" data-semantic="z"></b><i class="q"></i>"#;
        let class_map = ClassMap::new();
        let first = build_stylesheets(&files(markup), &class_map, &options());
        let second = build_stylesheets(&files(markup), &class_map, &options());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_extract_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let pages = dir.path().join("pages");
        std::fs::create_dir_all(&pages).unwrap();
        std::fs::write(
            pages.join("index.html"),
            r#"<div class="flex" data-semantic="row"></div>"#,
        )
        .unwrap();
        std::fs::write(pages.join("notes.txt"), r#"<div class="ignored"></div>"#).unwrap();

        let mut class_map = ClassMap::new();
        class_map.insert("flex", "display:flex;");
        let out = dir.path().join("css");
        let report = extract(&[pages], &out, &class_map, &options()).await.unwrap();

        assert_eq!(report.files_scanned, 1);
        assert_eq!(report.rules, 1);
        let css = std::fs::read_to_string(out.join(PROPERTY_STYLESHEET)).unwrap();
        assert!(css.ends_with(".row {\n  display:flex;\n}\n"));
        assert!(out.join(ALIAS_STYLESHEET).exists());
    }
}
