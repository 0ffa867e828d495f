//! Project configuration loading
//!
//! A Siphon project directory looks like:
//!
//! - `siphon.yaml` - project root configuration
//! - `sources.yaml` - source-group configuration tree
//! - `pipelines/*.yaml` - pipeline definitions
//! - `schemas/*.yaml` - persisted table schema snapshots

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::source_ref::ConfigNode;

/// Root project configuration from `siphon.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,

    /// Environment assumed when none is given on the command line
    #[serde(default)]
    pub default_env: Option<String>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// Main project container
#[derive(Debug, Clone)]
pub struct Project {
    /// Project configuration
    pub config: ProjectConfig,

    /// Base path of the project
    pub base_path: std::path::PathBuf,
}

impl Project {
    /// Load a project from a directory or a `siphon.yaml` path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join("siphon.yaml"), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let config: ProjectConfig = serde_yaml::from_str(&contents)?;

        Ok(Self { config, base_path })
    }

    /// Load the source-group configuration tree from `sources.yaml`.
    ///
    /// The root must be a mapping of group names.
    pub fn load_sources(&self) -> Result<ConfigNode> {
        let path = self.base_path.join("sources.yaml");
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&path)?;
        let tree: ConfigNode = serde_yaml::from_str(&contents)?;
        if tree.as_table().is_none() {
            return Err(Error::ConfigInvalid {
                message: "sources.yaml must be a mapping of group names".to_string(),
            });
        }
        Ok(tree)
    }

    /// Load all pipeline definitions from `pipelines/*.yaml`, in sorted
    /// file order.
    pub fn load_pipelines(&self) -> Result<Vec<Pipeline>> {
        let pipelines_dir = self.base_path.join("pipelines");
        if !pipelines_dir.exists() {
            return Ok(vec![]);
        }

        let mut entries: Vec<_> = std::fs::read_dir(&pipelines_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        entries.sort_by_key(|e| e.path());

        let mut pipelines = Vec::new();
        for entry in entries {
            let contents = std::fs::read_to_string(entry.path())?;
            let pipeline: Pipeline = serde_yaml::from_str(&contents)?;
            pipelines.push(pipeline);
        }
        Ok(pipelines)
    }

    /// Path of the schema snapshot directory.
    pub fn schemas_dir(&self) -> std::path::PathBuf {
        self.base_path.join("schemas")
    }
}
