// packages/engine/src/template/store.rs
//! Template persistence
//!
//! ```text
//! <root>/
//!   <sub_dir>/
//!     <template>/          raw fragments
//!       common.yaml
//!       combat.yaml
//!     <template>.yaml      merged artifact
//! ```

use crate::rules::model::{Fragment, OperationTemplate};
use crate::template::merge::{merge, MergedArtifact};
use crate::utils::errors::{EngineError, Result};
use crate::utils::fs::atomic_write;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ARTIFACT_EXTENSION: &str = "yaml";

/// Reads fragments and merged artifacts, writes merged artifacts
#[derive(Debug, Clone)]
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of all templates in `sub_dir`, sorted
    pub fn list_templates(&self, sub_dir: &str) -> Result<Vec<String>> {
        let dir = self.sub_dir_path(sub_dir)?;
        let entries = std::fs::read_dir(&dir).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                EngineError::NotFound(format!("template sub-directory {:?}", dir))
            }
            _ => EngineError::io(&dir, e),
        })?;

        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::io(&dir, e))?;
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') {
                continue;
            }
            if path.is_dir() {
                names.insert(file_name);
            } else if is_yaml(&path) {
                if let Some(stem) = path.file_stem() {
                    names.insert(stem.to_string_lossy().into_owned());
                }
            }
        }

        Ok(names.into_iter().collect())
    }

    /// Raw fragments of a template, sorted by file name
    pub fn load_fragments(&self, sub_dir: &str, name: &str) -> Result<Vec<Fragment>> {
        let dir = self.fragment_dir(sub_dir, name)?;
        if !dir.is_dir() {
            return Err(EngineError::NotFound(format!(
                "fragments of template '{}/{}' at {:?}",
                sub_dir, name, dir
            )));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map_err(|e| EngineError::io(&dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_yaml(path) && !is_hidden(path))
            .collect();
        paths.sort();

        let mut fragments = Vec::with_capacity(paths.len());
        for path in paths {
            let content = std::fs::read_to_string(&path).map_err(|e| EngineError::io(&path, e))?;
            let source_name = path.display().to_string();
            let mut fragment: Fragment = if content.trim().is_empty() {
                Fragment::default()
            } else {
                serde_yaml::from_str(&content).map_err(|e| EngineError::parse(&source_name, e))?
            };
            if fragment.name.is_empty() {
                fragment.name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
            }
            debug!("Loaded fragment '{}' with {} rules", fragment.name, fragment.rules.len());
            fragments.push(fragment);
        }

        Ok(fragments)
    }

    /// Load a template from its merged artifact or from its raw fragments
    pub fn load(&self, sub_dir: &str, name: &str, merged: bool) -> Result<OperationTemplate> {
        let template = if merged {
            let artifact = self.read_merged(sub_dir, name)?;
            let path = self.artifact_path(sub_dir, name)?;
            let template = artifact.decode(&path.display().to_string())?;
            if template.sub_dir != sub_dir || template.name != name {
                return Err(EngineError::ConfigError(format!(
                    "artifact {:?} holds template '{}/{}'",
                    path, template.sub_dir, template.name
                )));
            }
            template
        } else {
            merge(sub_dir, name, self.load_fragments(sub_dir, name)?)?
        };

        info!(
            "Loaded template '{}/{}' ({} rules, merged={})",
            sub_dir,
            name,
            template.rules.len(),
            merged
        );
        Ok(template)
    }

    pub fn read_merged(&self, sub_dir: &str, name: &str) -> Result<MergedArtifact> {
        let path = self.artifact_path(sub_dir, name)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(MergedArtifact::from_bytes(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::NotFound(
                format!("merged artifact of '{}/{}' at {:?}", sub_dir, name, path),
            )),
            Err(e) => Err(EngineError::io(path, e)),
        }
    }

    /// Atomically replace the merged artifact of a template
    pub fn write_merged(&self, sub_dir: &str, name: &str, artifact: &MergedArtifact) -> Result<PathBuf> {
        let path = self.artifact_path(sub_dir, name)?;
        atomic_write(&path, artifact.as_bytes())?;
        info!("Wrote merged artifact {:?} ({} bytes)", path, artifact.len());
        Ok(path)
    }

    pub fn artifact_path(&self, sub_dir: &str, name: &str) -> Result<PathBuf> {
        validate_component("template name", name)?;
        Ok(self
            .sub_dir_path(sub_dir)?
            .join(format!("{}.{}", name, ARTIFACT_EXTENSION)))
    }

    pub fn fragment_dir(&self, sub_dir: &str, name: &str) -> Result<PathBuf> {
        validate_component("template name", name)?;
        Ok(self.sub_dir_path(sub_dir)?.join(name))
    }

    fn sub_dir_path(&self, sub_dir: &str) -> Result<PathBuf> {
        validate_component("sub-directory", sub_dir)?;
        Ok(self.root.join(sub_dir))
    }
}

fn validate_component(what: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.starts_with('.')
        && !value.contains(|c: char| c == '/' || c == '\\');
    if valid {
        Ok(())
    } else {
        Err(EngineError::ConfigError(format!("invalid {} '{}'", what, value)))
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map_or(false, |n| n.to_string_lossy().starts_with('.'))
}
