use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use shieldrun_core::{constants::contract, model::JobId};
use std::path::Path;

/// Machine-readable list of the array job identifiers a stage-1 submission
/// step produced, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdManifest {
    pub version: u32,
    pub job_ids: Vec<JobId>,
}

impl IdManifest {
    pub fn new(job_ids: Vec<JobId>) -> Self {
        Self {
            version: contract::VERSION,
            job_ids,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|source| ClientError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;
        fs_err::write(path, json).map_err(|source| ClientError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `Ok(None)` when the step never wrote a manifest.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let content = match fs_err::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ClientError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let manifest: Self =
            serde_json::from_str(&content).map_err(|source| ClientError::Manifest {
                path: path.to_path_buf(),
                source,
            })?;
        if manifest.version != contract::VERSION {
            tracing::warn!(
                "ID manifest {} has version {}, expected {}; ignoring it",
                path.display(),
                manifest.version,
                contract::VERSION
            );
            return Ok(None);
        }
        Ok(Some(manifest))
    }
}
