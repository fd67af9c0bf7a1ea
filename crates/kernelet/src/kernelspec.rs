//! Kernel specification discovery.
//!
//! Kernel specs live at `<data-dir>/kernels/<name>/kernel.json`, where the
//! data directories are the entries of `JUPYTER_PATH` followed by the
//! user-level and system-level Jupyter directories. The spec's `argv` is a
//! command template; `{connection_file}` and `{resource_dir}` placeholders
//! are substituted at launch time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Kernel launched when no name is given.
pub const DEFAULT_KERNEL: &str = "python3";

/// How the kernel wants to be interrupted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptMode {
    /// SIGINT to the kernel process.
    #[default]
    Signal,
    /// `interrupt_request` on the control channel.
    Message,
}

/// Parsed `kernel.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelSpec {
    /// Command template. `{connection_file}` and `{resource_dir}` are
    /// replaced before spawn.
    pub argv: Vec<String>,
    pub display_name: String,
    pub language: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub interrupt_mode: InterruptMode,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl KernelSpec {
    /// Substitute launch-time placeholders into the argv template.
    pub fn render_argv(&self, connection_file: &Path, resource_dir: &Path) -> Vec<String> {
        let connection_file = connection_file.display().to_string();
        let resource_dir = resource_dir.display().to_string();
        self.argv
            .iter()
            .map(|arg| {
                arg.replace("{connection_file}", &connection_file)
                    .replace("{resource_dir}", &resource_dir)
            })
            .collect()
    }
}

/// A kernel spec located on disk, with the directory its resources live in.
#[derive(Debug, Clone)]
pub struct ResolvedSpec {
    pub name: String,
    pub spec: KernelSpec,
    pub resource_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum KernelSpecError {
    #[error("kernel spec '{name}' not found (searched {searched:?})")]
    NotFound {
        name: String,
        searched: Vec<PathBuf>,
    },

    #[error("failed to read kernel spec {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid kernel spec {path}: {source}")]
    Invalid {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Jupyter data directories, in search order.
pub fn data_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(jupyter_path) = std::env::var("JUPYTER_PATH") {
        for entry in std::env::split_paths(&jupyter_path) {
            if !entry.as_os_str().is_empty() {
                dirs.push(entry);
            }
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        dirs.push(PathBuf::from(home).join(".local/share/jupyter"));
    }
    dirs.push(PathBuf::from("/usr/local/share/jupyter"));
    dirs.push(PathBuf::from("/usr/share/jupyter"));

    dirs
}

/// Locate `name` in the default data directories.
pub fn find(name: &str) -> Result<ResolvedSpec, KernelSpecError> {
    find_in(&data_dirs(), name)
}

/// Locate `name` in an explicit list of data directories.
pub fn find_in(dirs: &[PathBuf], name: &str) -> Result<ResolvedSpec, KernelSpecError> {
    for dir in dirs {
        let resource_dir = dir.join("kernels").join(name);
        let path = resource_dir.join("kernel.json");
        if !path.is_file() {
            continue;
        }

        let raw = std::fs::read(&path).map_err(|source| KernelSpecError::Unreadable {
            path: path.clone(),
            source,
        })?;
        let spec: KernelSpec =
            serde_json::from_slice(&raw).map_err(|source| KernelSpecError::Invalid {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(kernel = name, path = %path.display(), "Found kernel spec");
        return Ok(ResolvedSpec {
            name: name.to_string(),
            spec,
            resource_dir,
        });
    }

    Err(KernelSpecError::NotFound {
        name: name.to_string(),
        searched: dirs.to_vec(),
    })
}
