//! Lecture dependency manifest (`package.json`).
//!
//! Existing entries are preserved; only the presentation tool packages are
//! injected, and unknown top-level keys survive a rewrite untouched.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::{STALE_THEME_PACKAGE, TOOL_CLIENT_PACKAGE, TOOL_RUNTIME_PACKAGE};
use crate::error::{LecternError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub scripts: Map<String, Value>,
    #[serde(default)]
    pub dependencies: Map<String, Value>,
    #[serde(default)]
    pub dev_dependencies: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

/// Where the manifest handed back by [`Manifest::load_or_create`] came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestSource {
    Existing,
    Created,
    /// The file existed but could not be parsed; a fresh one replaces it.
    Recreated(String),
}

impl Manifest {
    pub fn new(lecture_id: &str) -> Self {
        Self {
            name: package_name(lecture_id),
            version: default_version(),
            private: true,
            scripts: Map::new(),
            dependencies: Map::new(),
            dev_dependencies: Map::new(),
            extra: Map::new(),
        }
    }

    /// Read a manifest. `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| LecternError::Manifest {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let manifest = serde_json::from_str(&content).map_err(|e| LecternError::Manifest {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(Some(manifest))
    }

    /// Read the manifest at `path`, or start a new one when it is missing or broken.
    pub fn load_or_create(path: &Path, lecture_id: &str) -> (Self, ManifestSource) {
        match Self::load(path) {
            Ok(Some(manifest)) => (manifest, ManifestSource::Existing),
            Ok(None) => (Self::new(lecture_id), ManifestSource::Created),
            Err(e) => {
                tracing::warn!("Recreating manifest: {}", e);
                (Self::new(lecture_id), ManifestSource::Recreated(e.to_string()))
            }
        }
    }

    /// Pin the presentation tool packages to `version` and fill missing scripts.
    pub fn ensure_tool(&mut self, version: &str) {
        if self.name.is_empty() {
            self.name = default_name();
        }

        for (script, command) in [
            ("dev", "slidev --open"),
            ("build", "slidev build"),
            ("export", "slidev export"),
        ] {
            self.scripts
                .entry(script)
                .or_insert_with(|| Value::String(command.to_string()));
        }

        self.dependencies.remove(STALE_THEME_PACKAGE);
        self.dev_dependencies.remove(STALE_THEME_PACKAGE);

        self.dependencies.insert(
            TOOL_CLIENT_PACKAGE.to_string(),
            Value::String(version.to_string()),
        );
        self.dev_dependencies.insert(
            TOOL_RUNTIME_PACKAGE.to_string(),
            Value::String(version.to_string()),
        );
    }

    /// Declared version of the tool runtime, if any.
    pub fn tool_version(&self) -> Option<&str> {
        self.dev_dependencies
            .get(TOOL_RUNTIME_PACKAGE)
            .or_else(|| self.dependencies.get(TOOL_RUNTIME_PACKAGE))
            .and_then(Value::as_str)
    }

    /// Write with 2-space indentation and a trailing newline.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        std::fs::write(path, content)?;
        tracing::debug!("Wrote manifest {}", path.display());
        Ok(())
    }
}

fn default_name() -> String {
    "lecture".to_string()
}

/// npm package names are lowercase without spaces.
fn package_name(lecture_id: &str) -> String {
    let name: String = lecture_id
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let name = name.trim_matches(|c| c == '-' || c == '.' || c == '_');

    if name.is_empty() {
        default_name()
    } else {
        name.to_string()
    }
}
