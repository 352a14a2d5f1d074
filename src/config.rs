//! Build configuration, loaded from `stencil.toml`.
//!
//! Every field has a default, so an empty file is a valid configuration.
//! Relative paths are resolved against the directory of the config file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::css::{default_breakpoints, ExtractOptions};
use crate::dialect::Dialect;
use crate::transform::TransformOptions;

pub const CONFIG_FILE: &str = "stencil.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteConfig {
    pub title: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LintConfig {
    /// Run the whitelist sync as part of `build`
    pub enabled: bool,
    /// Treat an unsynced result as a build failure
    pub deny: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub src_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Route path → page settings; empty compiles every view
    pub routes: BTreeMap<String, RouteConfig>,
    pub dialects: Vec<Dialect>,
    pub class_map: Option<PathBuf>,
    pub props_map: Option<PathBuf>,
    pub preview_data: Option<PathBuf>,
    /// Layout that wraps views without an `Extends`
    pub default_layout: String,
    pub inline_components: bool,
    pub style_attribute: String,
    pub selector_attribute: String,
    pub currency_symbol: String,
    pub breakpoints: BTreeMap<String, String>,
    /// RFC 3339 timestamp for stylesheet headers; unset uses the clock
    pub timestamp: Option<String>,
    pub lint: LintConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            src_dir: PathBuf::from("src"),
            out_dir: PathBuf::from("dist"),
            routes: BTreeMap::new(),
            dialects: Dialect::ALL.to_vec(),
            class_map: None,
            props_map: None,
            preview_data: None,
            default_layout: "default".to_string(),
            inline_components: false,
            style_attribute: "class".to_string(),
            selector_attribute: "data-semantic".to_string(),
            currency_symbol: "$".to_string(),
            breakpoints: default_breakpoints(),
            timestamp: None,
            lint: LintConfig::default(),
        }
    }
}

impl BuildConfig {
    pub fn from_toml(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: BuildConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; relative paths are rebased onto its directory.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        let config = Self::from_toml(&text, &path.display().to_string())?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.rebase(base))
    }

    pub fn rebase(mut self, base: &Path) -> Self {
        let join = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };
        self.src_dir = join(&self.src_dir);
        self.out_dir = join(&self.out_dir);
        self.class_map = self.class_map.as_deref().map(join);
        self.props_map = self.props_map.as_deref().map(join);
        self.preview_data = self.preview_data.as_deref().map(join);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dialects.is_empty() {
            return Err(ConfigError::Invalid("`dialects` must not be empty".to_string()));
        }
        if let Some(bad) = self.routes.keys().find(|r| !r.starts_with('/')) {
            return Err(ConfigError::Invalid(format!(
                "route \"{}\" must start with `/`",
                bad
            )));
        }
        self.header_timestamp()?;
        Ok(())
    }

    pub fn header_timestamp(&self) -> Result<Option<DateTime<Utc>>, ConfigError> {
        match &self.timestamp {
            None => Ok(None),
            Some(text) => DateTime::parse_from_rfc3339(text)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|e| ConfigError::Invalid(format!("timestamp \"{}\": {}", text, e))),
        }
    }

    pub fn views_dir(&self) -> PathBuf {
        self.src_dir.join("views")
    }

    pub fn components_dir(&self) -> PathBuf {
        self.src_dir.join("components")
    }

    pub fn layouts_dir(&self) -> PathBuf {
        self.src_dir.join("layouts")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.src_dir.join("assets")
    }

    /// Rendered pages before stylesheet links are added.
    pub fn staging_dir(&self) -> PathBuf {
        self.out_dir.join(".stencil").join("pages")
    }

    pub fn css_dir(&self) -> PathBuf {
        self.out_dir.join("css")
    }

    pub fn templates_dir(&self, dialect: Dialect) -> PathBuf {
        self.out_dir.join("templates").join(dialect.name())
    }

    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            inline_components: self.inline_components,
            currency_symbol: self.currency_symbol.clone(),
        }
    }

    pub fn extract_options(&self) -> Result<ExtractOptions, ConfigError> {
        Ok(ExtractOptions {
            style_attribute: self.style_attribute.clone(),
            selector_attribute: self.selector_attribute.clone(),
            breakpoints: self.breakpoints.clone(),
            timestamp: self.header_timestamp()?,
        })
    }
}

/// `/` → `index`, `/about` → `about`, `/docs/intro/` → `docs/intro`.
pub fn route_file_name(route: &str) -> String {
    let trimmed = route.trim_matches('/');
    if trimmed.is_empty() {
        "index".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Inverse of [`route_file_name`] for views without a configured route.
pub fn route_path(name: &str) -> String {
    if name == "index" {
        "/".to_string()
    } else {
        format!("/{}", name)
    }
}
