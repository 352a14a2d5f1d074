//! Build entry point.
//!
//! `Builder` wires a `BuildConfig` into the service registry (loaded maps,
//! component library, preview data, lint) and the stage pipeline, runs the
//! pipeline, and disposes the services whether or not the run succeeded.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::BuildConfig;
use crate::css::{load_class_map, ClassMap};
use crate::discovery::{load_sources, ComponentRegistry, Naming};
use crate::error::{CompilerError, Error};
use crate::events::EventBus;
use crate::lint::{sync_whitelist, PropsMap, SyncResult};
use crate::pipeline::{Pipeline, PipelineContext, PipelineError, PipelineReport};
use crate::services::{
    require, RegistryError, Resources, Service, ServiceDescriptor, ServiceError, ServiceRegistry,
};
use crate::stages::default_stages;

pub const CLASSES: &str = "classes";
pub const PROPS: &str = "props";
pub const LIBRARY: &str = "library";
pub const PREVIEW_DATA: &str = "preview-data";
pub const LINT: &str = "lint";

// ═══════════════════════════════════════════════════════════════════════════════
// RESOURCES
// ═══════════════════════════════════════════════════════════════════════════════

/// Every parsed source of a project.
#[derive(Debug, Clone, Default)]
pub struct ComponentLibrary {
    /// `components/`, keyed by file stem
    pub components: ComponentRegistry,
    /// `layouts/`, keyed by file stem
    pub layouts: ComponentRegistry,
    /// `views/`, keyed by relative path
    pub views: ComponentRegistry,
    /// Sources that failed to parse
    pub errors: Vec<CompilerError>,
}

impl ComponentLibrary {
    pub async fn load(config: &BuildConfig) -> std::io::Result<Self> {
        let (components, mut errors) =
            ComponentRegistry::from_sources(&load_sources(&config.components_dir()).await?, Naming::FileStem);
        let (layouts, layout_errors) =
            ComponentRegistry::from_sources(&load_sources(&config.layouts_dir()).await?, Naming::FileStem);
        let (views, view_errors) =
            ComponentRegistry::from_sources(&load_sources(&config.views_dir()).await?, Naming::RelativePath);
        errors.extend(layout_errors);
        errors.extend(view_errors);

        log::debug!(
            "loaded {} components, {} layouts, {} views",
            components.len(),
            layouts.len(),
            views.len()
        );
        Ok(ComponentLibrary {
            components,
            layouts,
            views,
            errors,
        })
    }
}

/// JSON data views are rendered against.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewData(pub Value);

async fn read_json(path: &Path) -> Result<String, ServiceError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ServiceError::Failed(format!("failed to read {}: {}", path.display(), e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICES
// ═══════════════════════════════════════════════════════════════════════════════

/// Publishes the `ClassMap`; empty when no path is configured.
pub struct ClassesService {
    descriptor: ServiceDescriptor,
    path: Option<PathBuf>,
}

impl ClassesService {
    pub fn new(path: Option<PathBuf>) -> Self {
        ClassesService {
            descriptor: ServiceDescriptor::new(CLASSES, &[]),
            path,
        }
    }
}

#[async_trait]
impl Service for ClassesService {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    async fn initialize(&mut self, resources: &mut Resources) -> Result<(), ServiceError> {
        let class_map = match &self.path {
            Some(path) => load_class_map(path)
                .await
                .map_err(|e| ServiceError::Failed(e.to_string()))?,
            None => ClassMap::new(),
        };
        log::debug!("class map has {} tokens", class_map.len());
        resources.insert(class_map);
        Ok(())
    }
}

/// Publishes the `PropsMap`; empty when no path is configured.
pub struct PropsService {
    descriptor: ServiceDescriptor,
    path: Option<PathBuf>,
}

impl PropsService {
    pub fn new(path: Option<PathBuf>) -> Self {
        PropsService {
            descriptor: ServiceDescriptor::new(PROPS, &[]),
            path,
        }
    }
}

#[async_trait]
impl Service for PropsService {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    async fn initialize(&mut self, resources: &mut Resources) -> Result<(), ServiceError> {
        let props_map = match &self.path {
            Some(path) => PropsMap::from_json(&read_json(path).await?).map_err(|e| {
                ServiceError::Failed(format!("invalid props map {}: {}", path.display(), e))
            })?,
            None => PropsMap::new(),
        };
        resources.insert(props_map);
        Ok(())
    }
}

pub struct LibraryService {
    descriptor: ServiceDescriptor,
    config: Arc<BuildConfig>,
}

impl LibraryService {
    pub fn new(config: Arc<BuildConfig>) -> Self {
        LibraryService {
            descriptor: ServiceDescriptor::new(LIBRARY, &[]),
            config,
        }
    }
}

#[async_trait]
impl Service for LibraryService {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    async fn initialize(&mut self, resources: &mut Resources) -> Result<(), ServiceError> {
        resources.insert(ComponentLibrary::load(&self.config).await?);
        Ok(())
    }
}

pub struct PreviewDataService {
    descriptor: ServiceDescriptor,
    path: Option<PathBuf>,
}

impl PreviewDataService {
    pub fn new(path: Option<PathBuf>) -> Self {
        PreviewDataService {
            descriptor: ServiceDescriptor::new(PREVIEW_DATA, &[]),
            path,
        }
    }
}

#[async_trait]
impl Service for PreviewDataService {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    async fn initialize(&mut self, resources: &mut Resources) -> Result<(), ServiceError> {
        let data = match &self.path {
            Some(path) => serde_json::from_str(&read_json(path).await?).map_err(|e| {
                ServiceError::Failed(format!("invalid preview data {}: {}", path.display(), e))
            })?,
            None => Value::Object(Default::default()),
        };
        resources.insert(PreviewData(data));
        Ok(())
    }
}

/// Cross-checks the props map against the class map on `execute`.
pub struct LintService {
    descriptor: ServiceDescriptor,
}

impl LintService {
    pub fn new() -> Self {
        LintService {
            descriptor: ServiceDescriptor::new(LINT, &[CLASSES, PROPS]),
        }
    }
}

impl Default for LintService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service for LintService {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    async fn initialize(&mut self, resources: &mut Resources) -> Result<(), ServiceError> {
        require::<ClassMap>(resources)?;
        require::<PropsMap>(resources)?;
        Ok(())
    }

    async fn execute(&mut self, resources: &mut Resources) -> Result<Value, ServiceError> {
        let class_map = require::<ClassMap>(resources)?;
        let props_map = require::<PropsMap>(resources)?;
        let result = sync_whitelist(&class_map, &props_map);

        for invalid in &result.invalid_prop_values {
            log::warn!(
                "{}=\"{}\" needs class \"{}\"",
                invalid.property,
                invalid.value,
                invalid.expected_token
            );
        }
        for typo in &result.typos {
            log::info!("\"{}\" may be a typo of \"{}\"", typo.token, typo.suggestion);
        }

        let value = serde_json::to_value(&result)
            .map_err(|e| ServiceError::Failed(e.to_string()))?;
        resources.insert(result);
        Ok(value)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildReport {
    pub pipeline: PipelineReport,
    pub lint: Option<SyncResult>,
}

pub struct Builder {
    config: Arc<BuildConfig>,
    events: EventBus,
}

impl Builder {
    pub fn new(config: BuildConfig) -> Self {
        Builder {
            config: Arc::new(config),
            events: EventBus::default(),
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn services(&self) -> Result<ServiceRegistry, RegistryError> {
        let mut registry = self.lint_services()?;
        registry.register(Box::new(LibraryService::new(Arc::clone(&self.config))))?;
        registry.register(Box::new(PreviewDataService::new(self.config.preview_data.clone())))?;
        Ok(registry)
    }

    fn lint_services(&self) -> Result<ServiceRegistry, RegistryError> {
        let mut registry = ServiceRegistry::new();
        registry.register(Box::new(ClassesService::new(self.config.class_map.clone())))?;
        registry.register(Box::new(PropsService::new(self.config.props_map.clone())))?;
        registry.register(Box::new(LintService::new()))?;
        Ok(registry)
    }

    pub fn pipeline(&self) -> Result<Pipeline, PipelineError> {
        let mut pipeline = Pipeline::new();
        for stage in default_stages() {
            pipeline.add_stage(stage)?;
        }
        Ok(pipeline)
    }

    /// Run a full build.
    pub async fn build(&self) -> Result<BuildReport, Error> {
        let pipeline = self.pipeline()?;
        pipeline.order()?;

        let mut services = self.services()?;
        let mut resources = Resources::new();
        resources.insert(BuildConfig::clone(&self.config));

        let outcome = match services.initialize_all(&mut resources).await {
            Ok(_) => self.run(&pipeline, &mut services, resources).await,
            Err(e) => Err(e.into()),
        };
        let disposed = services.dispose_all().await;

        let report = outcome?;
        disposed?;
        Ok(report)
    }

    async fn run(
        &self,
        pipeline: &Pipeline,
        services: &mut ServiceRegistry,
        mut resources: Resources,
    ) -> Result<BuildReport, Error> {
        let lint = if self.config.lint.enabled {
            let result = run_lint(services, &mut resources).await?;
            if self.config.lint.deny && !result.synced {
                return Err(Error::Unsynced {
                    invalid: result.invalid_prop_values.len(),
                    duplicates: result.duplicates.len(),
                });
            }
            Some(result)
        } else {
            None
        };

        let mut ctx = PipelineContext::new(resources, self.events.clone());
        let report = pipeline.execute(&mut ctx).await?;
        log::info!(
            "build finished: {} files written, {} diagnostics",
            report.written().count(),
            report.diagnostics().count()
        );
        Ok(BuildReport {
            pipeline: report,
            lint,
        })
    }

    /// Load only the maps and run the whitelist sync.
    pub async fn lint(&self) -> Result<SyncResult, Error> {
        let mut services = self.lint_services()?;
        let mut resources = Resources::new();

        let outcome = match services.initialize_all(&mut resources).await {
            Ok(_) => run_lint(&mut services, &mut resources).await,
            Err(e) => Err(e.into()),
        };
        let disposed = services.dispose_all().await;

        let result = outcome?;
        disposed?;
        Ok(result)
    }
}

async fn run_lint(
    services: &mut ServiceRegistry,
    resources: &mut Resources,
) -> Result<SyncResult, Error> {
    services.execute(LINT, resources).await?;
    let result = resources
        .get::<SyncResult>()
        .ok_or(RegistryError::Service {
            name: LINT.to_string(),
            phase: "execute",
            source: ServiceError::MissingResource(std::any::type_name::<SyncResult>()),
        })?;
    Ok(SyncResult::clone(&result))
}
