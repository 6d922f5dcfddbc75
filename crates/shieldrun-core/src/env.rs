//! Locates and loads `.env` files into the process environment.
//!
//! Candidate directories, in order: the current directory, the directory of
//! the running executable, the target folder, and the target folder's parent.
//! Loaded values are exported so every spawned tool and scheduler job
//! inherits them. Missing files are skipped silently.

use crate::constants::files;
use crate::errors::ConfigError;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Load only the first file found; never replace variables that are
    /// already set. Used by the top-level pipeline.
    FirstMatch,
    /// Load every file found in candidate order, each overriding earlier
    /// values. Used by the stage-1 submission step.
    Cascade,
}

#[derive(Debug, Clone)]
pub struct EnvCandidates {
    dirs: Vec<PathBuf>,
}

impl EnvCandidates {
    pub fn new(cwd: &Path, exe_dir: Option<&Path>, folder: &Path) -> Self {
        let mut dirs = vec![cwd.to_path_buf()];
        if let Some(exe_dir) = exe_dir {
            dirs.push(exe_dir.to_path_buf());
        }
        dirs.push(folder.to_path_buf());
        if let Some(parent) = folder.parent().filter(|p| !p.as_os_str().is_empty()) {
            dirs.push(parent.to_path_buf());
        }
        Self { dirs }
    }

    /// Candidates for the running process.
    pub fn for_process(folder: &Path) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir()?;
        let exe_dir = current_exe_dir();
        Ok(Self::new(&cwd, exe_dir.as_deref(), folder))
    }

    /// Candidate files, with the same directory never listed twice.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut seen: Vec<PathBuf> = Vec::new();
        let mut out = Vec::new();
        for dir in &self.dirs {
            let key = fs_err::canonicalize(dir).unwrap_or_else(|_| dir.clone());
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            out.push(dir.join(files::ENV_FILE));
        }
        out
    }

    /// Loads the candidates and returns the files that were actually applied.
    pub fn load(&self, mode: LoadMode) -> Result<Vec<PathBuf>, ConfigError> {
        let mut loaded = Vec::new();
        for file in self.files() {
            if !file.is_file() {
                continue;
            }
            let result = match mode {
                LoadMode::FirstMatch => dotenvy::from_path(&file),
                LoadMode::Cascade => dotenvy::from_path_override(&file),
            };
            result.map_err(|source| ConfigError::Dotenv {
                path: file.clone(),
                source,
            })?;
            tracing::debug!("Loaded environment file {}", file.display());
            loaded.push(file);
            if mode == LoadMode::FirstMatch {
                break;
            }
        }
        Ok(loaded)
    }
}

pub fn current_exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}
