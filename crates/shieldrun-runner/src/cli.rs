use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Submits the ensemble, aggregation and GEF stages of a model run to SLURM.",
    long_about = "This tool submits one ensemble array job per model, a single aggregation job that waits for all of them, and one GEF analysis job per model that waits for the aggregation."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase verbosity level (-v for debug, -vv for trace)")]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Submit the full three-stage pipeline for a run folder")]
    Run(RunArgs),

    #[command(about = "Print the effective configuration as JSON")]
    ShowConfig(ShowConfigArgs),

    #[command(hide = true)]
    InternalSubmitEnsembles(RunArgs),
}

#[derive(Args, Clone)]
pub struct RunArgs {
    #[arg(value_name = "FOLDER", help = "Run folder whose subdirectories are the models")]
    pub folder: PathBuf,

    #[arg(value_name = "USER_ID")]
    pub user_id: String,

    #[arg(value_name = "EMAIL")]
    pub email: String,

    #[arg(value_name = "NAME")]
    pub name: String,
}

#[derive(Args)]
pub struct ShowConfigArgs {
    #[arg(value_name = "FOLDER")]
    pub folder: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_takes_four_positionals() {
        let cli = Cli::try_parse_from(["shieldrun", "-v", "run", "/data/run", "u1", "a@b.c", "Ada"])
            .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.folder, PathBuf::from("/data/run"));
                assert_eq!(args.name, "Ada");
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_rejects_wrong_count() {
        assert!(Cli::try_parse_from(["shieldrun", "run", "/data/run", "u1", "a@b.c"]).is_err());
        assert!(
            Cli::try_parse_from(["shieldrun", "run", "/d", "u1", "a@b.c", "Ada", "extra"]).is_err()
        );
    }
}
