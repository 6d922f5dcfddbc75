use crate::{cli::ShowConfigArgs, error::CliError};
use serde::Serialize;
use shieldrun_core::{config::Config, env::LoadMode};
use std::path::PathBuf;

#[derive(Serialize)]
struct EffectiveConfig<'a> {
    env_files: &'a [PathBuf],
    #[serde(flatten)]
    config: &'a Config,
}

pub fn handle_show_config(args: ShowConfigArgs) -> Result<(), CliError> {
    let (config, env_files) = super::load_config(&args.folder, LoadMode::FirstMatch)?;
    let view = EffectiveConfig {
        env_files: &env_files,
        config: &config,
    };
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
