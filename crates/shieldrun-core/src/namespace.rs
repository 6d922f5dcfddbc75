use crate::constants::dirs;
use crate::errors::ConfigError;
use crate::model::Stage;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Per-user log directory layout. Directories are shared by every run of the
/// same user and are never cleaned up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogNamespace {
    pub root: PathBuf,
    pub pipeline_dir: PathBuf,
    pub ensemble_dir: PathBuf,
    pub aggregate_dir: PathBuf,
    pub gef_dir: PathBuf,
}

impl LogNamespace {
    /// Computes the layout without touching the filesystem.
    pub fn derive(log_root: &Path, user_id: &str) -> Self {
        let root = log_root.join(user_id);
        Self {
            pipeline_dir: root.join(dirs::PIPELINE),
            ensemble_dir: root.join(dirs::ENSEMBLE),
            aggregate_dir: root.join(dirs::AGGREGATE),
            gef_dir: root.join(dirs::GEF),
            root,
        }
    }

    pub fn stage_dir(&self, stage: Stage) -> &Path {
        match stage {
            Stage::Ensemble => &self.ensemble_dir,
            Stage::Aggregate => &self.aggregate_dir,
            Stage::Gef => &self.gef_dir,
        }
    }

    pub fn all_dirs(&self) -> [&Path; 4] {
        [
            &self.pipeline_dir,
            &self.ensemble_dir,
            &self.aggregate_dir,
            &self.gef_dir,
        ]
    }

    /// Creates every directory. Safe to call repeatedly.
    pub fn ensure(&self) -> Result<(), ConfigError> {
        for dir in self.all_dirs() {
            fs_err::create_dir_all(dir).map_err(|source| ConfigError::PathIo {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        tracing::debug!("Log namespace ready under {}", self.root.display());
        Ok(())
    }

    /// Derives and creates the namespace in one step.
    pub fn create(log_root: &Path, user_id: &str) -> Result<Self, ConfigError> {
        let ns = Self::derive(log_root, user_id);
        ns.ensure()?;
        Ok(ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_derive_layout() {
        let ns = LogNamespace::derive(Path::new("/var/log/shield"), "alice");
        assert_eq!(ns.root, PathBuf::from("/var/log/shield/alice"));
        assert_eq!(ns.pipeline_dir, PathBuf::from("/var/log/shield/alice/pipeline"));
        assert_eq!(ns.ensemble_dir, PathBuf::from("/var/log/shield/alice/ensemble"));
        assert_eq!(ns.aggregate_dir, PathBuf::from("/var/log/shield/alice/aggregate"));
        assert_eq!(ns.gef_dir, PathBuf::from("/var/log/shield/alice/gef"));
        assert_eq!(ns.stage_dir(Stage::Gef), ns.gef_dir.as_path());
    }

    #[test]
    fn test_create_is_idempotent() {
        let dir = tempdir().unwrap();
        let first = LogNamespace::create(dir.path(), "bob").unwrap();
        let marker = first.gef_dir.join("gef_A-1.out");
        fs_err::write(&marker, "kept").unwrap();

        let second = LogNamespace::create(dir.path(), "bob").unwrap();
        assert_eq!(first, second);
        for d in second.all_dirs() {
            assert!(d.is_dir(), "{} should exist", d.display());
        }
        assert!(marker.exists(), "existing logs must survive a second run");
    }

    #[test]
    fn test_users_are_isolated() {
        let dir = tempdir().unwrap();
        let a = LogNamespace::create(dir.path(), "a").unwrap();
        let b = LogNamespace::create(dir.path(), "b").unwrap();
        assert_ne!(a.pipeline_dir, b.pipeline_dir);
    }
}
