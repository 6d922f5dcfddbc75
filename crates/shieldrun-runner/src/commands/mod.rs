use shieldrun_core::{
    config::Config,
    env::{EnvCandidates, LoadMode},
    errors::ConfigError,
};
use std::path::{Path, PathBuf};

pub mod run;
pub mod show_config;
pub mod submit_ensembles;

/// Resolves `.env` files for `folder`, then builds the configuration from the
/// resulting process environment.
pub(crate) fn load_config(folder: &Path, mode: LoadMode) -> Result<(Config, Vec<PathBuf>), ConfigError> {
    let loaded = EnvCandidates::for_process(folder)?.load(mode)?;
    let config = Config::from_env()?;
    Ok((config, loaded))
}
