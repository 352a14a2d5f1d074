//! Discovery Module for the Stencil Compiler
//!
//! Recursively scans the source directories for `.cmp` files, reads them
//! concurrently and parses components into a name-keyed registry.

use futures::future::join_all;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::CompilerError;
use crate::node::ComponentTree;
use crate::parse::parse_component;

pub const SOURCE_EXTENSION: &str = "cmp";

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE FILES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the scanned directory, `/`-separated, without extension
    pub name: String,
    pub path: PathBuf,
    pub source: String,
}

/// Recursively find files with the given extension, sorted by path.
pub fn find_files(dir: &Path, extension: Option<&str>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if !dir.exists() {
        return files;
    }

    for entry in WalkDir::new(dir).follow_links(true).into_iter().flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = match extension {
            Some(wanted) => path.extension().map_or(false, |ext| ext == wanted),
            None => true,
        };
        if matches {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    files
}

/// `views/docs/intro.cmp` under `views` → `docs/intro`
pub fn relative_name(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    let without_ext = relative.with_extension("");
    without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Read every `.cmp` file under `dir`. A missing directory yields no files.
pub async fn load_sources(dir: &Path) -> std::io::Result<Vec<SourceFile>> {
    let paths = find_files(dir, Some(SOURCE_EXTENSION));
    let reads = paths.iter().map(|path| tokio::fs::read_to_string(path));
    let contents = join_all(reads).await;

    let mut files = Vec::with_capacity(paths.len());
    for (path, source) in paths.into_iter().zip(contents) {
        files.push(SourceFile {
            name: relative_name(dir, &path),
            source: source?,
            path,
        });
    }
    Ok(files)
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// How registered names are derived from source files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Naming {
    /// `components/cards/Card.cmp` → `Card`
    FileStem,
    /// `views/docs/intro.cmp` → `docs/intro`
    RelativePath,
}

/// Parsed components keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: BTreeMap<String, ComponentTree>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, tree: ComponentTree) {
        self.components.insert(name.to_string(), tree);
    }

    /// Exact match first, then case-insensitive. Returns the registered name.
    pub fn get(&self, name: &str) -> Option<(&str, &ComponentTree)> {
        if let Some((key, tree)) = self.components.get_key_value(name) {
            return Some((key.as_str(), tree));
        }
        let lower = name.to_lowercase();
        self.components
            .iter()
            .find(|(key, _)| key.to_lowercase() == lower)
            .map(|(key, tree)| (key.as_str(), tree))
    }

    pub fn names(&self) -> Vec<&str> {
        self.components.keys().map(|k| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Parse component sources. A file that fails to parse is reported and
    /// left out of the registry; the rest still register.
    pub fn from_sources(files: &[SourceFile], naming: Naming) -> (Self, Vec<CompilerError>) {
        let parsed: Vec<(String, Result<ComponentTree, CompilerError>)> = files
            .par_iter()
            .map(|file| {
                let name = match naming {
                    Naming::FileStem => file
                        .path
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_else(|| file.name.clone()),
                    Naming::RelativePath => file.name.clone(),
                };
                let path = file.path.to_string_lossy();
                (name, parse_component(&file.source, &path))
            })
            .collect();

        let mut registry = ComponentRegistry::new();
        let mut errors = Vec::new();
        for (name, result) in parsed {
            match result {
                Ok(tree) => {
                    if registry.components.contains_key(&name) {
                        log::warn!("component \"{}\" is defined more than once; keeping the last", name);
                    }
                    registry.insert(&name, tree);
                }
                Err(e) => {
                    log::warn!("failed to parse component {}: {}", name, e);
                    errors.push(e);
                }
            }
        }

        (registry, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_case_insensitive_lookup() {
        let mut registry = ComponentRegistry::new();
        registry.insert("PriceTag", ComponentTree::new("PriceTag.cmp"));

        assert_eq!(registry.get("PriceTag").map(|(n, _)| n), Some("PriceTag"));
        assert_eq!(registry.get("pricetag").map(|(n, _)| n), Some("PriceTag"));
        assert!(registry.get("Price").is_none());
    }

    #[test]
    fn test_relative_name() {
        let base = Path::new("/src/views");
        assert_eq!(relative_name(base, Path::new("/src/views/index.cmp")), "index");
        assert_eq!(
            relative_name(base, Path::new("/src/views/docs/intro.cmp")),
            "docs/intro"
        );
    }

    #[tokio::test]
    async fn test_load_sources_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("index.cmp"), "<p>home</p>").unwrap();
        std::fs::write(dir.path().join("docs/intro.cmp"), "<p>intro</p>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let files = load_sources(dir.path()).await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["docs/intro", "index"]);

        let missing = load_sources(&dir.path().join("nope")).await.unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_from_sources_collects_errors() {
        let files = vec![
            SourceFile {
                name: "Good".to_string(),
                path: PathBuf::from("components/Good.cmp"),
                source: "<span>ok</span>".to_string(),
            },
            SourceFile {
                name: "Bad".to_string(),
                path: PathBuf::from("components/Bad.cmp"),
                source: "<Else>orphan</Else>".to_string(),
            },
        ];

        let (registry, errors) = ComponentRegistry::from_sources(&files, Naming::FileStem);
        assert_eq!(registry.names(), vec!["Good"]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, crate::error::E_ORPHAN_BRANCH);
    }
}
