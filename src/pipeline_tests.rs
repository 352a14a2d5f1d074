#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use crate::builder::Builder;
    use crate::config::{BuildConfig, LintConfig, RouteConfig};
    use crate::discovery::find_files;
    use crate::events::{BuildEvent, EventBus};
    use crate::graph::GraphError;
    use crate::pipeline::{
        result_key, Pipeline, PipelineContext, PipelineError, Stage, StageError, StageResult,
    };
    use crate::services::Resources;

    // ═══════════════════════════════════════════════════════════════════════════════
    // ORCHESTRATION
    // ═══════════════════════════════════════════════════════════════════════════════

    struct Recording {
        name: String,
        dependencies: Vec<String>,
        fail: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    fn stage(name: &str, deps: &[&str], log: &Arc<Mutex<Vec<String>>>) -> Box<dyn Stage> {
        Box::new(Recording {
            name: name.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            fail: false,
            log: Arc::clone(log),
        })
    }

    fn failing(name: &str, deps: &[&str], log: &Arc<Mutex<Vec<String>>>) -> Box<dyn Stage> {
        Box::new(Recording {
            name: name.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            fail: true,
            log: Arc::clone(log),
        })
    }

    #[async_trait]
    impl Stage for Recording {
        fn name(&self) -> &str {
            &self.name
        }

        fn dependencies(&self) -> Vec<String> {
            self.dependencies.clone()
        }

        async fn execute(&self, ctx: &mut PipelineContext) -> Result<StageResult, StageError> {
            self.log.lock().unwrap().push(self.name.clone());
            // Every dependency's result is visible
            for dependency in &self.dependencies {
                ctx.state(&result_key(dependency))?;
            }
            if self.fail {
                return Err(StageError::MissingState(format!("{}:input", self.name)));
            }
            Ok(StageResult::with_summary(json!({ "stage": self.name })))
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_dependency_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline.add_stage(stage("html", &["css"], &log)).unwrap();
        pipeline.add_stage(stage("layout", &[], &log)).unwrap();
        pipeline.add_stage(stage("css", &["view"], &log)).unwrap();
        pipeline.add_stage(stage("view", &["layout"], &log)).unwrap();
        pipeline.add_stage(stage("template", &["layout"], &log)).unwrap();

        let events = EventBus::default();
        let mut rx = events.subscribe();
        let mut ctx = PipelineContext::new(Resources::new(), events);
        let report = pipeline.execute(&mut ctx).await.unwrap();

        let expected = vec!["layout", "view", "css", "html", "template"];
        assert_eq!(*log.lock().unwrap(), expected);
        let completed: Vec<&str> = report.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(completed, expected);
        assert_eq!(ctx.state["css:result"]["summary"]["stage"], "css");

        let mut announced = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let BuildEvent::StageComplete { name, .. } = event {
                announced.push(name);
            }
        }
        assert_eq!(announced, expected);
    }

    #[tokio::test]
    async fn test_stage_cycle_detected_before_execution() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline.add_stage(stage("a", &["b"], &log)).unwrap();
        pipeline.add_stage(stage("b", &["a"], &log)).unwrap();

        let mut ctx = PipelineContext::default();
        let err = pipeline.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Dependency(GraphError::Cycle { .. })
        ));
        assert!(log.lock().unwrap().is_empty());

        let mut pipeline = Pipeline::new();
        pipeline.add_stage(stage("css", &["views"], &log)).unwrap();
        assert!(matches!(
            pipeline.order(),
            Err(PipelineError::Dependency(GraphError::UnknownDependency { .. }))
        ));
    }

    #[tokio::test]
    async fn test_failure_stops_the_run_and_keeps_state() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline.add_stage(stage("layout", &[], &log)).unwrap();
        pipeline.add_stage(failing("view", &["layout"], &log)).unwrap();
        pipeline.add_stage(stage("css", &["view"], &log)).unwrap();

        let mut ctx = PipelineContext::default();
        let err = pipeline.execute(&mut ctx).await.unwrap_err();

        match err {
            PipelineError::Stage { name, .. } => assert_eq!(name, "view"),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(*log.lock().unwrap(), vec!["layout", "view"]);
        assert!(ctx.state.contains_key("layout:result"));
        assert!(!ctx.state.contains_key("view:result"));
        assert!(!ctx.state.contains_key("css:result"));
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline.add_stage(stage("css", &[], &log)).unwrap();
        assert!(matches!(
            pipeline.add_stage(stage("css", &[], &log)),
            Err(PipelineError::Duplicate(_))
        ));
        assert_eq!(pipeline.len(), 1);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // END TO END
    // ═══════════════════════════════════════════════════════════════════════════════

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn project(root: &Path) -> BuildConfig {
        write(
            root,
            "src/components/Card.cmp",
            r#"<div class="card p-4"><Var path="props.title" /></div>"#,
        );
        write(
            root,
            "src/views/index.cmp",
            r#"<main class="flex p-4">
<h1><Var path="title" /></h1>
<Card title={site.name} />
<p>Total: <Var path="total" filter="currency" /></p>
</main>
"#,
        );
        write(
            root,
            "src/views/docs/intro.cmp",
            r#"<article class="p-4 flex"><Var path="site.name" default="Docs" /></article>"#,
        );
        write(root, "src/assets/logo.svg", "<svg></svg>");
        write(
            root,
            "class-map.json",
            r#"{"p-4": "padding: 1rem", "flex": "display: flex"}"#,
        );
        write(root, "props-map.json", r#"{"p": ["4"], "flex": [""]}"#);
        write(root, "preview.json", r#"{"site": {"name": "Stencil"}, "total": 9}"#);

        let mut routes = BTreeMap::new();
        routes.insert(
            "/".to_string(),
            RouteConfig {
                title: "Home".to_string(),
                meta: BTreeMap::new(),
            },
        );
        routes.insert(
            "/docs/intro".to_string(),
            RouteConfig {
                title: "Intro".to_string(),
                meta: BTreeMap::new(),
            },
        );

        BuildConfig {
            src_dir: root.join("src"),
            out_dir: root.join("dist"),
            routes,
            class_map: Some(root.join("class-map.json")),
            props_map: Some(root.join("props-map.json")),
            preview_data: Some(root.join("preview.json")),
            timestamp: Some("2024-01-01T00:00:00Z".to_string()),
            lint: LintConfig {
                enabled: true,
                deny: false,
            },
            ..BuildConfig::default()
        }
    }

    fn snapshot(dir: &Path) -> BTreeMap<String, String> {
        find_files(dir, None)
            .into_iter()
            .map(|path| {
                let content = std::fs::read_to_string(&path).unwrap();
                (path.display().to_string(), content)
            })
            .collect()
    }

    fn read(root: &Path, relative: &str) -> String {
        std::fs::read_to_string(root.join(relative)).unwrap()
    }

    #[tokio::test]
    async fn test_full_build() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let builder = Builder::new(project(root));
        let mut rx = builder.events().subscribe();

        let report = builder.build().await.unwrap();
        let diagnostics: Vec<_> = report.pipeline.diagnostics().collect();
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert!(report.lint.as_ref().unwrap().synced);

        let stages: Vec<&str> = report.pipeline.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(stages, vec!["layout", "view", "css", "html", "asset", "template"]);

        let index = read(root, "dist/index.html");
        assert!(index.starts_with("<!DOCTYPE html>"));
        assert!(index.contains("<title>Home</title>"));
        assert!(index.contains("<link rel=\"stylesheet\" href=\"css/styles.css\"></head>"));
        assert!(index.contains("<div class=\"card p-4\">Stencil</div>"));
        assert!(index.contains("Total: $9.00"));

        let intro = read(root, "dist/docs/intro.html");
        assert!(intro.contains("href=\"../css/styles.css\""));
        assert!(intro.contains("<article class=\"p-4 flex\">Stencil</article>"));

        let styles = read(root, "dist/css/styles.css");
        assert!(styles.starts_with("/* Property stylesheet generated by stencil at 2024-01-01T00:00:00Z */\n"));
        assert!(styles.contains("padding: 1rem;"));
        assert!(styles.contains("/* unknown class: card */"));
        let aliases = read(root, "dist/css/styles.alias.css");
        assert!(aliases.contains("@apply flex p-4;"));

        assert_eq!(read(root, "dist/assets/logo.svg"), "<svg></svg>");

        let jinja = read(root, "dist/templates/jinja/index.jinja");
        assert!(jinja.starts_with("{% extends \"layouts/default.jinja\" %}{% block content %}<main"));
        assert!(jinja.ends_with("{% endblock %}"));
        assert!(jinja.contains("{% include \"partials/Card.jinja\" %}"));
        assert!(jinja.contains("{{ total | currency }}"));
        assert_eq!(
            read(root, "dist/templates/jinja/partials/Card.jinja"),
            "<div class=\"card p-4\">{{ title }}</div>"
        );
        assert!(root.join("dist/templates/jinja/layouts/default.jinja").exists());
        assert!(read(root, "dist/templates/mustache/docs/intro.mustache")
            .starts_with("{{<layouts/default}}{{$content}}<article"));
        assert!(root.join("dist/templates/handlebars/index.hbs").exists());

        let variables: serde_json::Value =
            serde_json::from_str(&read(root, "dist/templates/jinja/variables.json")).unwrap();
        assert_eq!(variables["/"], json!(["site.name", "title", "total"]));
        assert_eq!(variables["/docs/intro"], json!(["site.name"]));

        let mut kinds = Vec::new();
        let mut stylesheets = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                BuildEvent::AssetCopied { kind, .. } => kinds.push(kind),
                BuildEvent::CssGenerated { .. } => stylesheets += 1,
                BuildEvent::StageComplete { .. } => {}
            }
        }
        assert_eq!(kinds, vec!["image"]);
        assert_eq!(stylesheets, 2);
    }

    #[tokio::test]
    async fn test_rebuild_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let config = project(root);

        Builder::new(config.clone()).build().await.unwrap();
        let first = snapshot(&root.join("dist"));
        Builder::new(config).build().await.unwrap();
        let second = snapshot(&root.join("dist"));

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rebuild_drops_pages_that_no_longer_render() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mut config = project(root);
        config.routes.insert(
            "/about".to_string(),
            RouteConfig {
                title: "About".to_string(),
                meta: BTreeMap::new(),
            },
        );
        write(root, "src/views/about.cmp", r#"<p class="old-token">v1</p>"#);

        Builder::new(config.clone()).build().await.unwrap();
        assert!(read(root, "dist/about.html").contains("v1"));
        assert!(read(root, "dist/css/styles.alias.css").contains("old-token"));

        write(root, "src/views/about.cmp", "<Else>broken</Else>");
        std::fs::remove_file(root.join("dist/about.html")).unwrap();
        std::fs::remove_dir_all(root.join("dist/css")).unwrap();

        let report = Builder::new(config).build().await.unwrap();
        assert!(report.pipeline.diagnostics().count() > 0);
        assert!(!root.join("dist/about.html").exists());
        assert!(root.join("dist/index.html").exists());
        assert!(!read(root, "dist/css/styles.alias.css").contains("old-token"));
        assert!(!read(root, "dist/css/styles.css").contains("old-token"));
    }

    #[tokio::test]
    async fn test_unsynced_lint_can_fail_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mut config = project(root);
        write(root, "props-map.json", r#"{"p": ["4", "9"]}"#);
        config.lint.deny = true;

        let err = Builder::new(config.clone()).build().await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Unsynced {
                invalid: 1,
                duplicates: 0
            }
        ));
        assert!(!root.join("dist").exists());

        let result = Builder::new(config).lint().await.unwrap();
        assert!(!result.synced);
        assert_eq!(result.invalid_prop_values[0].expected_token, "p-9");
    }
}
