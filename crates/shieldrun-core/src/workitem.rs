use crate::constants::{contract, defaults, files};
use crate::errors::{ConfigError, DomainError};
use crate::model::ArrayRange;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One model subdirectory of the target folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub name: String,
    pub path: PathBuf,
}

impl WorkItem {
    pub fn from_path(path: &Path) -> Result<Self, DomainError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| DomainError::InvalidItemName(path.to_path_buf()))?;
        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
        })
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.path.join(files::DESCRIPTOR)
    }

    pub fn is_eligible(&self) -> bool {
        self.descriptor_path().is_file()
    }

    pub fn script_path(&self) -> PathBuf {
        self.path.join(files::ENSEMBLE_SCRIPT)
    }

    /// Reads `NRUNS` from the descriptor. A missing descriptor makes the item
    /// ineligible; an absent or malformed key yields the default of 1. The
    /// descriptor need not be valid UTF-8.
    pub fn read_nruns(&self) -> Result<u32, DomainError> {
        let bytes = fs_err::read(self.descriptor_path()).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                DomainError::DescriptorMissing {
                    item: self.name.clone(),
                }
            } else {
                DomainError::DescriptorRead {
                    item: self.name.clone(),
                    source,
                }
            }
        })?;
        Ok(parse_nruns(&String::from_utf8_lossy(&bytes)))
    }

    pub fn array_range(&self) -> Result<ArrayRange, DomainError> {
        self.read_nruns().map(ArrayRange::one_to)
    }
}

pub fn parse_nruns(descriptor: &str) -> u32 {
    descriptor
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .find(|(key, _)| key.trim() == contract::NRUNS_KEY)
        .and_then(|(_, value)| {
            value
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .parse::<u32>()
                .ok()
        })
        .filter(|n| *n >= 1)
        .unwrap_or(defaults::NRUNS)
}

/// Lists the immediate, non-hidden subdirectories of `folder`, sorted by name.
pub fn discover(folder: &Path) -> Result<Vec<WorkItem>, ConfigError> {
    let mut items = Vec::new();
    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        match WorkItem::from_path(entry.path()) {
            Ok(item) => items.push(item),
            Err(e) => tracing::warn!("{}", e),
        }
    }
    tracing::debug!(
        "Discovered {} work items under {}",
        items.len(),
        folder.display()
    );
    Ok(items)
}
