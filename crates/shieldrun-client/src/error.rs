use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] shieldrun_core::errors::ConfigError),

    #[error(transparent)]
    Domain(#[from] shieldrun_core::errors::DomainError),

    #[error("I/O error on path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Scheduler rejected job '{job_name}' (exit code {code}): {stderr}")]
    SubmissionRejected {
        job_name: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed to parse SLURM job ID from output: {0:?}")]
    JobIdParse(String),

    #[error("Job script '{0}' is empty; nothing to patch.")]
    EmptyScript(PathBuf),

    #[error("Failed to replace '{path}' with patched script: {source}")]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse job ID manifest '{path}': {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ClientError>;
