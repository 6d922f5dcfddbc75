pub mod cli;
pub mod commands;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod step;

use cli::{Cli, Commands};
use error::CliError;
use shieldrun_core::logging;

pub fn run(cli: Cli) -> Result<(), CliError> {
    logging::set_log_level_from_env();
    logging::set_log_level_from_verbosity(cli.verbose);

    match cli.command {
        Commands::Run(args) => commands::run::handle_run(args),
        Commands::ShowConfig(args) => commands::show_config::handle_show_config(args),
        Commands::InternalSubmitEnsembles(args) => {
            commands::submit_ensembles::handle_submit_ensembles(args)
        }
    }
}
