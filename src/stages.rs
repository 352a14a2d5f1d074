//! Build stages.
//!
//! The six stages of a build, in dependency order:
//!
//! - `layout`   publishes the layout registry (injecting a built-in default)
//! - `view`     renders every routed view with preview data into a fresh staging dir
//! - `css`      extracts both stylesheets from the staged pages
//! - `html`     links the stylesheet into each page and writes it to `out_dir`
//! - `asset`    copies `src/assets` verbatim
//! - `template` lowers views, layouts and partials into each dialect
//!
//! Stages read their inputs from `PipelineContext` resources published by
//! the services in `builder`. Per-file compile errors become diagnostics and
//! the stage carries on; I/O failures abort it.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::builder::{ComponentLibrary, PreviewData};
use crate::config::{route_file_name, route_path, BuildConfig};
use crate::css::{self, ClassMap, PROPERTY_STYLESHEET};
use crate::dialect::Dialect;
use crate::discovery::{find_files, ComponentRegistry};
use crate::error::{CompilerError, E_UNRESOLVED_COMPONENT};
use crate::events::BuildEvent;
use crate::node::ComponentTree;
use crate::parse::parse_component;
use crate::pipeline::{Diagnostic, PipelineContext, Stage, StageError, StageResult};
use crate::render::{Renderer, CONTENT_SLOT};
use crate::transform::Transformer;

pub const LAYOUT: &str = "layout";
pub const VIEW: &str = "view";
pub const CSS: &str = "css";
pub const HTML: &str = "html";
pub const ASSET: &str = "asset";
pub const TEMPLATE: &str = "template";

const BUILTIN_LAYOUT_FILE: &str = "<builtin>/layouts/default.cmp";

const BUILTIN_LAYOUT: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8" />
<title><Var path="title" /></title>
<Loop items="metaTags" as="tag"><meta name={tag.name} content={tag.content} /></Loop>
</head>
<body>
<Slot name="content" />
</body>
</html>
"#;

/// The layout registry as seen by the rest of the build.
#[derive(Debug, Clone, Default)]
pub struct Layouts(pub ComponentRegistry);

/// Every stage of a full build, in registration order.
pub fn default_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(LayoutStage),
        Box::new(ViewStage),
        Box::new(CssStage),
        Box::new(HtmlStage),
        Box::new(AssetStage),
        Box::new(TemplateStage),
    ]
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAGES
// ═══════════════════════════════════════════════════════════════════════════════

/// A routed view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub route: String,
    /// Registered view name
    pub view: String,
    /// Output name relative to its directory, without extension
    pub file_name: String,
    pub title: String,
    pub meta: BTreeMap<String, String>,
}

impl Page {
    /// Preview data for this page: the shared data plus `title`, `meta`,
    /// `metaTags` (`[{name, content}]`, for dialects without map iteration)
    /// and `route`.
    pub fn data(&self, preview: &Value) -> Value {
        let mut data = match preview {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        let tags: Vec<Value> = self
            .meta
            .iter()
            .map(|(name, content)| json!({ "name": name, "content": content }))
            .collect();
        data.insert("title".to_string(), Value::from(self.title.clone()));
        data.insert("meta".to_string(), json!(self.meta));
        data.insert("metaTags".to_string(), Value::Array(tags));
        data.insert("route".to_string(), Value::from(self.route.clone()));
        Value::Object(data)
    }
}

/// Resolve configured routes against the views. With no routes configured,
/// every view becomes a page titled by its name.
pub fn pages(config: &BuildConfig, views: &ComponentRegistry) -> (Vec<Page>, Vec<Diagnostic>) {
    let mut pages = Vec::new();
    let mut diagnostics = Vec::new();

    if config.routes.is_empty() {
        for name in views.names() {
            pages.push(Page {
                route: route_path(name),
                view: name.to_string(),
                file_name: name.to_string(),
                title: name.to_string(),
                meta: BTreeMap::new(),
            });
        }
        return (pages, diagnostics);
    }

    for (route, settings) in &config.routes {
        let file_name = route_file_name(route);
        match views.get(&file_name) {
            Some((registered, _)) => pages.push(Page {
                route: route.clone(),
                view: registered.to_string(),
                file_name,
                title: settings.title.clone(),
                meta: settings.meta.clone(),
            }),
            None => {
                let err = CompilerError::new(
                    E_UNRESOLVED_COMPONENT,
                    &format!("route \"{}\" has no view \"{}\"", route, file_name),
                    &config.views_dir().display().to_string(),
                )
                .with_hint(format!("add views/{}.cmp", file_name));
                diagnostics.push(Diagnostic::from(&err));
            }
        }
    }

    (pages, diagnostics)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Create parent directories, then await every write as one batch.
/// Returns the written paths, sorted.
async fn write_files(files: Vec<(PathBuf, String)>) -> Result<Vec<String>, StageError> {
    let dirs: BTreeSet<PathBuf> = files
        .iter()
        .filter_map(|(path, _)| path.parent().map(Path::to_path_buf))
        .collect();
    for dir in &dirs {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StageError::io(dir, e))?;
    }

    let writes = files.iter().map(|(path, content)| async move {
        tokio::fs::write(path, content)
            .await
            .map_err(|e| StageError::io(path, e))
    });
    for result in join_all(writes).await {
        result?;
    }

    let mut written: Vec<String> = files.iter().map(|(p, _)| p.display().to_string()).collect();
    written.sort();
    Ok(written)
}

fn relative(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Event `type` of a copied asset.
pub fn asset_kind(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "avif" | "ico" => "image",
        "woff" | "woff2" | "ttf" | "otf" | "eot" => "font",
        "js" | "mjs" => "script",
        "css" => "style",
        _ => "other",
    }
}

/// Link the property stylesheet into a page at `depth` directories below
/// `out_dir`. Pages without a `</head>` get the link prepended.
pub fn link_stylesheet(html: &str, depth: usize) -> String {
    let link = format!(
        "<link rel=\"stylesheet\" href=\"{}css/{}\">",
        "../".repeat(depth),
        PROPERTY_STYLESHEET
    );
    match html.find("</head>") {
        Some(pos) => format!("{}{}{}", &html[..pos], link, &html[pos..]),
        None => format!("{}\n{}", link, html),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LAYOUT
// ═══════════════════════════════════════════════════════════════════════════════

pub struct LayoutStage;

fn builtin_layout() -> Result<ComponentTree, CompilerError> {
    parse_component(BUILTIN_LAYOUT, BUILTIN_LAYOUT_FILE)
}

#[async_trait]
impl Stage for LayoutStage {
    fn name(&self) -> &str {
        LAYOUT
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<StageResult, StageError> {
        let config = ctx.resource::<BuildConfig>()?;
        let library = ctx.resource::<ComponentLibrary>()?;

        let mut layouts = library.layouts.clone();
        let builtin = layouts.get(&config.default_layout).is_none();
        if builtin {
            log::debug!(
                "layout \"{}\" not found; using the built-in layout",
                config.default_layout
            );
            layouts.insert(&config.default_layout, builtin_layout()?);
        }

        let names: Vec<String> = layouts.names().iter().map(|n| n.to_string()).collect();
        ctx.resources.insert(Layouts(layouts));

        Ok(StageResult {
            written: Vec::new(),
            diagnostics: library.errors.iter().map(Diagnostic::from).collect(),
            summary: json!({ "layouts": names, "builtin": builtin }),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VIEW
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ViewStage;

/// Drop output left by a previous build.
async fn reset_dir(dir: &Path) -> Result<(), StageError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            log::debug!("cleared {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StageError::io(dir, e)),
    }
}

/// Views that extend a layout render through it; the rest are wrapped in
/// the default layout's content slot.
pub fn render_page(
    renderer: &Renderer<'_>,
    tree: &ComponentTree,
    default_layout: &str,
    data: &Value,
) -> Result<String, CompilerError> {
    if tree.extends().is_some() {
        return renderer.render(tree, data);
    }
    let body = renderer.render(tree, data)?;
    renderer.render_in_layout(default_layout, body, data)
}

#[async_trait]
impl Stage for ViewStage {
    fn name(&self) -> &str {
        VIEW
    }

    fn dependencies(&self) -> Vec<String> {
        vec![LAYOUT.to_string()]
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<StageResult, StageError> {
        let config = ctx.resource::<BuildConfig>()?;
        let library = ctx.resource::<ComponentLibrary>()?;
        let layouts = ctx.resource::<Layouts>()?;
        let preview = ctx.resource::<PreviewData>()?;

        let renderer = Renderer::new(&library.components, &layouts.0, &config.currency_symbol);
        let (pages, mut diagnostics) = pages(&config, &library.views);
        let staging = config.staging_dir();

        let mut files = Vec::new();
        for page in &pages {
            let Some((_, tree)) = library.views.get(&page.view) else {
                continue;
            };
            match render_page(&renderer, tree, &config.default_layout, &page.data(&preview.0)) {
                Ok(html) => files.push((staging.join(format!("{}.html", page.file_name)), html)),
                Err(e) => diagnostics.push(Diagnostic::from(&e)),
            }
        }

        reset_dir(&staging).await?;
        let rendered = files.len();
        let written = write_files(files).await?;
        Ok(StageResult {
            written,
            diagnostics,
            summary: json!({ "pages": pages.len(), "rendered": rendered }),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CSS
// ═══════════════════════════════════════════════════════════════════════════════

pub struct CssStage;

#[async_trait]
impl Stage for CssStage {
    fn name(&self) -> &str {
        CSS
    }

    fn dependencies(&self) -> Vec<String> {
        vec![VIEW.to_string()]
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<StageResult, StageError> {
        let config = ctx.resource::<BuildConfig>()?;
        let class_map = ctx.resource::<ClassMap>()?;
        let options = config.extract_options()?;

        let report = css::extract(&[config.staging_dir()], &config.css_dir(), &class_map, &options)
            .await?;

        for (path, size) in [
            (&report.alias_path, report.alias_size),
            (&report.property_path, report.property_size),
        ] {
            ctx.events.emit(BuildEvent::CssGenerated {
                path: path.display().to_string(),
                size,
            });
        }

        let mut written = vec![
            report.alias_path.display().to_string(),
            report.property_path.display().to_string(),
        ];
        written.sort();
        Ok(StageResult {
            written,
            diagnostics: Vec::new(),
            summary: serde_json::to_value(&report)?,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTML
// ═══════════════════════════════════════════════════════════════════════════════

pub struct HtmlStage;

#[async_trait]
impl Stage for HtmlStage {
    fn name(&self) -> &str {
        HTML
    }

    fn dependencies(&self) -> Vec<String> {
        vec![CSS.to_string()]
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<StageResult, StageError> {
        let config = ctx.resource::<BuildConfig>()?;
        let staging = config.staging_dir();
        let staged = find_files(&staging, Some("html"));

        let reads = staged.iter().map(|path| async move {
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| StageError::io(path, e))
        });
        let contents = join_all(reads).await;

        let mut files = Vec::with_capacity(staged.len());
        for (path, html) in staged.iter().zip(contents) {
            let name = relative(&staging, path);
            let depth = name.matches('/').count();
            files.push((config.out_dir.join(&name), link_stylesheet(&html?, depth)));
        }

        let written = write_files(files).await?;
        Ok(StageResult {
            summary: json!({ "pages": written.len() }),
            written,
            diagnostics: Vec::new(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ASSET
// ═══════════════════════════════════════════════════════════════════════════════

pub struct AssetStage;

#[async_trait]
impl Stage for AssetStage {
    fn name(&self) -> &str {
        ASSET
    }

    fn dependencies(&self) -> Vec<String> {
        vec![HTML.to_string()]
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<StageResult, StageError> {
        let config = ctx.resource::<BuildConfig>()?;
        let source_dir = config.assets_dir();
        let dest_dir = config.out_dir.join("assets");

        let copies: Vec<(PathBuf, PathBuf)> = find_files(&source_dir, None)
            .into_iter()
            .map(|path| {
                let dest = dest_dir.join(relative(&source_dir, &path));
                (path, dest)
            })
            .collect();

        let dirs: BTreeSet<PathBuf> = copies
            .iter()
            .filter_map(|(_, dest)| dest.parent().map(Path::to_path_buf))
            .collect();
        for dir in &dirs {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StageError::io(dir, e))?;
        }

        let jobs = copies.iter().map(|(source, dest)| async move {
            tokio::fs::copy(source, dest)
                .await
                .map_err(|e| StageError::io(source, e))
        });
        let mut bytes = 0;
        for result in join_all(jobs).await {
            bytes += result?;
        }

        let mut written = Vec::with_capacity(copies.len());
        for (source, dest) in &copies {
            ctx.events.emit(BuildEvent::AssetCopied {
                source: source.display().to_string(),
                dest: dest.display().to_string(),
                kind: asset_kind(source).to_string(),
            });
            written.push(dest.display().to_string());
        }
        written.sort();

        Ok(StageResult {
            summary: json!({ "copied": written.len(), "bytes": bytes }),
            written,
            diagnostics: Vec::new(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Page templates mirror `render_page`: views without `Extends` extend
/// `default_layout` with their markup as the content block.
pub struct TemplateStage;

/// Templates for one dialect, before they are written.
#[derive(Default)]
struct DialectBatch {
    files: Vec<(PathBuf, String)>,
    /// Route → data paths the page template reads
    variables: BTreeMap<String, BTreeSet<String>>,
    partials: BTreeSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl DialectBatch {
    fn compile(
        transformer: &Transformer<'_>,
        dialect: Dialect,
        dir: &Path,
        pages: &[Page],
        views: &ComponentRegistry,
        layouts: &ComponentRegistry,
        default_layout: &str,
    ) -> Self {
        let mut batch = DialectBatch::default();
        let ext = dialect.extension();
        let mut pending: Vec<String> = Vec::new();

        for page in pages {
            let Some((_, tree)) = views.get(&page.view) else {
                continue;
            };
            match transformer.transform(&page.view, tree, dialect) {
                Ok(output) => {
                    pending.extend(output.partials.iter().cloned());
                    batch.variables.insert(page.route.clone(), output.variables);
                    let content = match output.extends {
                        Some(_) => output.content,
                        None => dialect
                            .emitter()
                            .extends(default_layout, &[(CONTENT_SLOT.to_string(), output.content)]),
                    };
                    batch
                        .files
                        .push((dir.join(format!("{}.{}", page.file_name, ext)), content));
                }
                Err(e) => batch.diagnostics.push(Diagnostic::from(&e)),
            }
        }

        for name in layouts.names() {
            let Some((_, tree)) = layouts.get(name) else {
                continue;
            };
            match transformer.transform(name, tree, dialect) {
                Ok(output) => {
                    pending.extend(output.partials.iter().cloned());
                    batch
                        .files
                        .push((dir.join("layouts").join(format!("{}.{}", name, ext)), output.content));
                }
                Err(e) => batch.diagnostics.push(Diagnostic::from(&e)),
            }
        }

        // Partials may include further partials
        while let Some(name) = pending.pop() {
            if !batch.partials.insert(name.clone()) {
                continue;
            }
            match transformer.transform_partial(&name, dialect) {
                Ok(output) => {
                    pending.extend(output.partials.iter().cloned());
                    batch
                        .files
                        .push((dir.join("partials").join(format!("{}.{}", name, ext)), output.content));
                }
                Err(e) => batch.diagnostics.push(Diagnostic::from(&e)),
            }
        }

        batch
    }
}

#[async_trait]
impl Stage for TemplateStage {
    fn name(&self) -> &str {
        TEMPLATE
    }

    fn dependencies(&self) -> Vec<String> {
        vec![LAYOUT.to_string()]
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<StageResult, StageError> {
        let config = ctx.resource::<BuildConfig>()?;
        let library = ctx.resource::<ComponentLibrary>()?;
        let layouts = ctx.resource::<Layouts>()?;

        let transformer = Transformer::new(&library.components, config.transform_options());
        let (pages, mut diagnostics) = pages(&config, &library.views);

        let mut files = Vec::new();
        let mut summary = Map::new();
        for &dialect in &config.dialects {
            let dir = config.templates_dir(dialect);
            let mut batch = DialectBatch::compile(
                &transformer,
                dialect,
                &dir,
                &pages,
                &library.views,
                &layouts.0,
                &config.default_layout,
            );

            summary.insert(
                dialect.name().to_string(),
                json!({
                    "templates": batch.variables.len(),
                    "partials": batch.partials.len(),
                    "errors": batch.diagnostics.len(),
                }),
            );

            let variables = serde_json::to_string_pretty(&batch.variables)?;
            batch.files.push((dir.join("variables.json"), format!("{}\n", variables)));
            files.append(&mut batch.files);
            diagnostics.append(&mut batch.diagnostics);
        }

        let written = write_files(files).await?;
        Ok(StageResult {
            written,
            diagnostics,
            summary: Value::Object(summary),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use pretty_assertions::assert_eq;

    fn views(names: &[&str]) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        for name in names {
            registry.insert(name, ComponentTree::new(&format!("views/{}.cmp", name)));
        }
        registry
    }

    #[test]
    fn test_pages_from_routes() {
        let mut config = BuildConfig::default();
        config.routes.insert(
            "/".to_string(),
            RouteConfig {
                title: "Home".to_string(),
                meta: BTreeMap::new(),
            },
        );
        config.routes.insert(
            "/docs/intro".to_string(),
            RouteConfig {
                title: "Intro".to_string(),
                meta: BTreeMap::new(),
            },
        );
        config.routes.insert(
            "/missing".to_string(),
            RouteConfig::default(),
        );

        let (pages, diagnostics) = pages(&config, &views(&["index", "docs/intro"]));
        let names: Vec<_> = pages.iter().map(|p| p.file_name.as_str()).collect();
        assert_eq!(names, vec!["index", "docs/intro"]);
        assert_eq!(pages[0].title, "Home");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code.as_deref(), Some(E_UNRESOLVED_COMPONENT));
    }

    #[test]
    fn test_pages_without_routes_cover_every_view() {
        let (pages, diagnostics) = pages(&BuildConfig::default(), &views(&["about", "index"]));
        assert!(diagnostics.is_empty());
        let routes: Vec<_> = pages.iter().map(|p| p.route.as_str()).collect();
        assert_eq!(routes, vec!["/about", "/"]);
        assert_eq!(pages[0].title, "about");
    }

    #[test]
    fn test_page_data_overlays_preview() {
        let page = Page {
            route: "/".to_string(),
            view: "index".to_string(),
            file_name: "index".to_string(),
            title: "Home".to_string(),
            meta: BTreeMap::new(),
        };
        let data = page.data(&json!({"title": "ignored", "user": {"name": "Ada"}}));
        assert_eq!(data["title"], "Home");
        assert_eq!(data["user"]["name"], "Ada");
        assert_eq!(data["route"], "/");
    }

    #[test]
    fn test_link_stylesheet() {
        assert_eq!(
            link_stylesheet("<html><head></head></html>", 0),
            "<html><head><link rel=\"stylesheet\" href=\"css/styles.css\"></head></html>"
        );
        assert!(link_stylesheet("<p>x</p>", 2)
            .starts_with("<link rel=\"stylesheet\" href=\"../../css/styles.css\">"));
    }

    #[test]
    fn test_asset_kind() {
        assert_eq!(asset_kind(Path::new("logo.SVG")), "image");
        assert_eq!(asset_kind(Path::new("fonts/inter.woff2")), "font");
        assert_eq!(asset_kind(Path::new("app.js")), "script");
        assert_eq!(asset_kind(Path::new("README")), "other");
    }

    #[test]
    fn test_builtin_layout_wraps_body() {
        let mut layouts = ComponentRegistry::new();
        layouts.insert("default", builtin_layout().unwrap());
        let components = ComponentRegistry::new();
        let renderer = Renderer::new(&components, &layouts, "$");

        let view = parse_component("<p>Hello</p>", "views/index.cmp").unwrap();
        let page = Page {
            route: "/".to_string(),
            view: "index".to_string(),
            file_name: "index".to_string(),
            title: "Home".to_string(),
            meta: BTreeMap::from([("description".to_string(), "Welcome".to_string())]),
        };
        let data = page.data(&json!({}));
        let html = render_page(&renderer, &view, "default", &data).unwrap();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Home</title>"));
        assert!(html.contains("<meta name=\"description\" content=\"Welcome\">"));
        assert!(html.contains("<p>Hello</p>"));
    }
}
