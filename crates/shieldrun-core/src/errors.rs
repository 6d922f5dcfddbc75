use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path '{path}': {source}")]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Error walking directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Failed to load environment file '{path}': {source}")]
    Dotenv {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("Invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },

    #[error("Target folder '{0}' does not exist or is not a directory.")]
    FolderNotFound(PathBuf),

    #[error("Required {tool} tool not found at '{path}'. Set the matching *_TOOL variable to override.")]
    ToolNotFound { tool: String, path: PathBuf },

    #[error("Invalid configuration: {0}")]
    General(String),
}

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Work item '{item}' has no descriptor file; it is not eligible for ensemble generation.")]
    DescriptorMissing { item: String },

    #[error("Could not read descriptor of work item '{item}': {source}")]
    DescriptorRead {
        item: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Work item path '{0}' has no usable directory name.")]
    InvalidItemName(PathBuf),
}
