//! Pipeline Orchestrator
//!
//! Stages declare the stages they depend on. The pipeline orders them with
//! Kahn's algorithm (ties broken by registration order) and runs them one at
//! a time, each to completion. A stage's result is stored in the shared
//! state under `<name>:result` and announced as `stage:complete`.
//!
//! A failing stage stops the run. Nothing is rolled back: state and files
//! from completed stages stay in place.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::ConfigError;
use crate::css::ExtractError;
use crate::error::CompilerError;
use crate::events::{BuildEvent, EventBus};
use crate::graph::{topological_order, GraphError};
use crate::services::Resources;

// ═══════════════════════════════════════════════════════════════════════════════
// RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// A per-file problem that did not stop the stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub file: String,
    pub message: String,
    pub code: Option<String>,
    pub node_path: Option<String>,
}

impl Diagnostic {
    pub fn new(file: &str, message: impl Into<String>) -> Self {
        Diagnostic {
            file: file.to_string(),
            message: message.into(),
            code: None,
            node_path: None,
        }
    }
}

impl From<&CompilerError> for Diagnostic {
    fn from(err: &CompilerError) -> Self {
        Diagnostic {
            file: err.file.clone(),
            message: err.message.clone(),
            code: Some(err.code.clone()),
            node_path: err.node_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    /// Files written by the stage, sorted
    pub written: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    /// Stage-specific details
    pub summary: Value,
}

impl StageResult {
    pub fn with_summary(summary: Value) -> Self {
        StageResult {
            summary,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedStage {
    pub name: String,
    pub result: StageResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    pub stages: Vec<CompletedStage>,
}

impl PipelineReport {
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.stages.iter().flat_map(|s| s.result.diagnostics.iter())
    }

    pub fn written(&self) -> impl Iterator<Item = &String> {
        self.stages.iter().flat_map(|s| s.result.written.iter())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum StageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Compile(#[from] CompilerError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("missing resource: {0}")]
    MissingResource(&'static str),
    #[error("missing state `{0}`")]
    MissingState(String),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StageError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        StageError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage `{0}` is already registered")]
    Duplicate(String),
    #[error(transparent)]
    Dependency(#[from] GraphError),
    #[error("stage `{name}` failed: {source}")]
    Stage {
        name: String,
        #[source]
        source: StageError,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTEXT & STAGES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct PipelineContext {
    pub resources: Resources,
    pub events: EventBus,
    /// Cross-stage state; each stage writes under its own namespace
    pub state: BTreeMap<String, Value>,
}

impl PipelineContext {
    pub fn new(resources: Resources, events: EventBus) -> Self {
        PipelineContext {
            resources,
            events,
            state: BTreeMap::new(),
        }
    }

    pub fn resource<T: std::any::Any + Send + Sync>(&self) -> Result<std::sync::Arc<T>, StageError> {
        self.resources
            .get::<T>()
            .ok_or(StageError::MissingResource(std::any::type_name::<T>()))
    }

    pub fn state(&self, key: &str) -> Result<&Value, StageError> {
        self.state
            .get(key)
            .ok_or_else(|| StageError::MissingState(key.to_string()))
    }
}

pub fn result_key(stage: &str) -> String {
    format!("{}:result", stage)
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<StageResult, StageError>;
}

#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stage(&mut self, stage: Box<dyn Stage>) -> Result<(), PipelineError> {
        if self.stages.iter().any(|s| s.name() == stage.name()) {
            return Err(PipelineError::Duplicate(stage.name().to_string()));
        }
        self.stages.push(stage);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn order(&self) -> Result<Vec<String>, PipelineError> {
        let nodes: Vec<(String, Vec<String>)> = self
            .stages
            .iter()
            .map(|s| (s.name().to_string(), s.dependencies()))
            .collect();
        Ok(topological_order(&nodes)?)
    }

    pub async fn execute(&self, ctx: &mut PipelineContext) -> Result<PipelineReport, PipelineError> {
        let order = self.order()?;
        let mut report = PipelineReport::default();

        for name in order {
            let Some(stage) = self.stages.iter().find(|s| s.name() == name) else {
                continue;
            };

            log::info!("running stage `{}`", name);
            let result = stage
                .execute(ctx)
                .await
                .map_err(|source| PipelineError::Stage {
                    name: name.clone(),
                    source,
                })?;

            for diagnostic in &result.diagnostics {
                log::warn!("[{}] {}: {}", name, diagnostic.file, diagnostic.message);
            }

            let value = serde_json::to_value(&result).map_err(|e| PipelineError::Stage {
                name: name.clone(),
                source: e.into(),
            })?;
            ctx.state.insert(result_key(&name), value.clone());
            ctx.events.emit(BuildEvent::StageComplete {
                name: name.clone(),
                result: value,
            });

            report.stages.push(CompletedStage { name, result });
        }

        Ok(report)
    }
}
