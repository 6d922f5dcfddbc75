use shieldrun_core::model::Stage;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] shieldrun_core::errors::ConfigError),

    #[error(transparent)]
    Domain(#[from] shieldrun_core::errors::DomainError),

    #[error(transparent)]
    Client(#[from] shieldrun_client::error::ClientError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Stage {} ({stage}) failed: {message}{}", .stage.number(), log_hint(.log_path))]
    StageFailed {
        stage: Stage,
        message: String,
        log_path: Option<PathBuf>,
    },
}

fn log_hint(log_path: &Option<PathBuf>) -> String {
    match log_path {
        Some(path) => format!("\nSee log: {}", path.display()),
        None => String::new(),
    }
}
