use clap::Parser;
use colored::Colorize;
use shieldrun_runner::cli::Cli;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = shieldrun_runner::run(cli) {
        eprintln!("{}", format!("[ERROR] {}", e).red());
        std::process::exit(1);
    }
}
