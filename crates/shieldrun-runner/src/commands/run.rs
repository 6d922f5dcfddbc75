use colored::Colorize;
use comfy_table::{Cell, Color, Table};
use indicatif::{ProgressBar, ProgressStyle};
use shieldrun_client::SlurmScheduler;
use shieldrun_core::{
    config::RunContext, env::LoadMode, errors::ConfigError, logging, model::Stage,
    namespace::LogNamespace,
};
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;

use crate::{
    cli::RunArgs,
    error::CliError,
    pipeline::{Pipeline, PipelineEvent, RunSummary, Stage1Outcome, Stage3Outcome},
    report::{styled_table, ItemOutcome},
    step::ProcessStepRunner,
};

pub fn handle_run(args: RunArgs) -> Result<(), CliError> {
    let (config, env_files) = super::load_config(&args.folder, LoadMode::FirstMatch)?;
    let config = Arc::new(config);
    let ctx = RunContext::new(&args.folder, &args.user_id, &args.email, &args.name, &config)?;
    let namespace = LogNamespace::create(&ctx.log_root, &ctx.user_id)?;

    let session_log = match logging::init_session_logger(&namespace.pipeline_dir) {
        Ok(path) => Some(path),
        Err(e) => {
            eprintln!(
                "{}",
                format!("[ERROR] Failed to initialize session logger: {}", e).red()
            );
            None
        }
    };
    for file in &env_files {
        tracing::info!("Environment loaded from {}", file.display());
    }
    tracing::info!(
        "Run for user '{}' ({}) on {}",
        ctx.user_id,
        ctx.email,
        ctx.folder.display()
    );

    println!(
        "- Submitting pipeline for {} as user '{}'...",
        ctx.folder.display().to_string().cyan(),
        ctx.user_id.cyan()
    );

    let scheduler = SlurmScheduler::new(&config.sbatch);
    let step = ProcessStepRunner;
    let (tx, rx) = mpsc::channel();

    let outcome = thread::scope(|s| {
        let pipeline = Pipeline::new(Arc::clone(&config), &ctx, &namespace, &scheduler, &step)
            .with_events(tx)
            .with_session_log(session_log.clone());
        let handle = s.spawn(move || pipeline.run());

        let mut renderer = EventRenderer::default();
        for event in rx {
            renderer.render(event);
        }
        renderer.finish();
        handle.join()
    });

    let summary = match outcome {
        Ok(result) => result?,
        Err(_) => {
            return Err(CliError::Config(ConfigError::General(
                "Pipeline thread panicked".to_string(),
            )))
        }
    };

    println!("{}", summary_table(&summary));
    if let Stage3Outcome::Submitted(report) = &summary.stage3 {
        if report.failed() > 0 {
            println!("{}", report.to_table());
        }
    }
    println!("{} {}", "Pipeline submitted.".green().bold(), chain_line(&summary));
    Ok(())
}

#[derive(Default)]
struct EventRenderer {
    pb: Option<ProgressBar>,
}

impl EventRenderer {
    fn render(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::StageStarted(stage) => {
                println!("- Stage {}: {}...", stage.number(), stage_title(stage));
            }
            PipelineEvent::ShortcutTaken => {
                println!(
                    "  {} skipping ensembles, aggregation runs without a dependency",
                    ">>".cyan()
                );
            }
            PipelineEvent::StepOutput(line) => {
                println!("  {} {}", "|".dimmed(), line);
            }
            PipelineEvent::IdsDiscovered { ids, source } => {
                let joined = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ");
                println!(
                    "  Found {} ensemble array job(s) via {}: {}",
                    ids.len().to_string().bold(),
                    source,
                    joined
                );
            }
            PipelineEvent::Warning(message) => {
                self.println(format!("  {} {}", "[WARN]".yellow().bold(), message));
            }
            PipelineEvent::JobSubmitted { stage, job_id } => {
                println!(
                    "  Submitted {} job as SLURM ID {}",
                    stage,
                    job_id.to_string().yellow()
                );
            }
            PipelineEvent::FanoutStarted { total } => {
                let pb = ProgressBar::new(total as u64);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                {
                    pb.set_style(style.progress_chars("#>-"));
                }
                pb.set_message("Submitting GEF jobs...");
                self.pb = Some(pb);
            }
            PipelineEvent::ItemFinished(report) => {
                let line = match &report.outcome {
                    ItemOutcome::Submitted(id) => {
                        format!("  {} gef_{} -> {}", "OK".green().bold(), report.item, id)
                    }
                    ItemOutcome::Skipped { reason } => {
                        format!("  {} gef_{}: {}", "SKIP".yellow().bold(), report.item, reason)
                    }
                    ItemOutcome::Failed { error } => {
                        format!("  {} gef_{}: {}", "FAIL".red().bold(), report.item, error)
                    }
                };
                self.println(line);
                if let Some(pb) = &self.pb {
                    pb.inc(1);
                    pb.set_message(report.item);
                }
            }
            PipelineEvent::StageSkipped { stage, reason } => {
                println!(
                    "- Stage {}: {}",
                    stage.number(),
                    format!("skipped ({})", reason).yellow()
                );
            }
        }
    }

    fn println(&self, line: String) {
        match &self.pb {
            Some(pb) => pb.suspend(|| println!("{}", line)),
            None => println!("{}", line),
        }
    }

    fn finish(&mut self) {
        if let Some(pb) = self.pb.take() {
            pb.finish_with_message("GEF submission complete");
        }
    }
}

fn stage_title(stage: Stage) -> &'static str {
    match stage {
        Stage::Ensemble => "submitting ensemble array jobs",
        Stage::Aggregate => "submitting aggregation",
        Stage::Gef => "submitting GEF analysis per model",
    }
}

fn describe_stage1(outcome: &Stage1Outcome) -> String {
    match outcome {
        Stage1Outcome::Submitted { ids, source } => {
            format!("{} array job(s), IDs from {}", ids.len(), source)
        }
        Stage1Outcome::NoIdentifiers => "no job IDs detected".to_string(),
        Stage1Outcome::Bypassed => "skipped (SKIP_ENSEMBLE)".to_string(),
    }
}

fn describe_stage3(outcome: &Stage3Outcome) -> String {
    match outcome {
        Stage3Outcome::Submitted(report) => report.counts_line(),
        Stage3Outcome::Skipped(reason) => reason.to_string(),
    }
}

fn path_cell(path: &Path) -> Cell {
    Cell::new(path.display())
}

pub(crate) fn summary_table(summary: &RunSummary) -> Table {
    let ns = &summary.namespace;
    let mut table = styled_table(&["Pipeline", "Details"]);

    table.add_row(vec![
        Cell::new("Stage 1 (ensemble)"),
        Cell::new(describe_stage1(&summary.stage1)),
    ]);
    let dependency = summary
        .aggregate_dependency
        .as_ref()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "no dependency".to_string());
    table.add_row(vec![
        Cell::new("Stage 2 (aggregate)"),
        Cell::new(format!("{} ({})", summary.aggregate_id, dependency)).fg(Color::Yellow),
    ]);
    let stage3_color = match &summary.stage3 {
        Stage3Outcome::Submitted(r) if r.failed() == 0 => Color::Green,
        Stage3Outcome::Submitted(_) => Color::Red,
        Stage3Outcome::Skipped(_) => Color::Yellow,
    };
    table.add_row(vec![
        Cell::new("Stage 3 (gef)"),
        Cell::new(describe_stage3(&summary.stage3)).fg(stage3_color),
    ]);

    if let Some(log) = &summary.session_log {
        table.add_row(vec![Cell::new("Session log"), path_cell(log)]);
    }
    if let Some(log) = &summary.stage1_log {
        table.add_row(vec![Cell::new("Stage 1 output"), path_cell(log)]);
    }
    table.add_row(vec![Cell::new("Ensemble logs"), path_cell(&ns.ensemble_dir)]);
    table.add_row(vec![Cell::new("Aggregate logs"), path_cell(&ns.aggregate_dir)]);
    table.add_row(vec![Cell::new("GEF logs"), path_cell(&ns.gef_dir)]);
    table
}

/// `7,9 -> 101 -> 102,103`
pub(crate) fn chain_line(summary: &RunSummary) -> String {
    let join = |ids: Vec<String>| {
        if ids.is_empty() {
            "-".to_string()
        } else {
            ids.join(",")
        }
    };
    let stage1 = match &summary.stage1 {
        Stage1Outcome::Submitted { ids, .. } => join(ids.iter().map(|i| i.to_string()).collect()),
        _ => "-".to_string(),
    };
    let stage3 = match &summary.stage3 {
        Stage3Outcome::Submitted(r) => join(r.job_ids().iter().map(|i| i.to_string()).collect()),
        Stage3Outcome::Skipped(_) => "-".to_string(),
    };
    format!("Chain: {} -> {} -> {}", stage1, summary.aggregate_id, stage3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{GefSkipReason, IdSource};
    use crate::report::{FanoutReport, ItemReport};
    use shieldrun_core::model::{Dependency, JobId};
    use std::path::PathBuf;

    fn summary(stage1: Stage1Outcome, stage3: Stage3Outcome) -> RunSummary {
        let dependency = stage1.dependency();
        RunSummary {
            namespace: LogNamespace::derive(Path::new("/logs"), "alice"),
            session_log: Some(PathBuf::from("/logs/alice/pipeline/shieldrun_x.log")),
            stage1_log: None,
            stage1,
            aggregate_id: JobId::from("42"),
            aggregate_dependency: dependency,
            stage3,
        }
    }

    #[test]
    fn test_chain_line() {
        let s = summary(
            Stage1Outcome::Submitted {
                ids: vec![JobId::from("7"), JobId::from("9")],
                source: IdSource::Manifest,
            },
            Stage3Outcome::Submitted(FanoutReport {
                items: vec![
                    ItemReport::submitted("A", JobId::from("43")),
                    ItemReport::failed("B", "refused"),
                ],
            }),
        );
        assert_eq!(chain_line(&s), "Chain: 7,9 -> 42 -> 43");
        assert_eq!(
            s.aggregate_dependency,
            Dependency::after_any(&[JobId::from("7"), JobId::from("9")])
        );
    }

    #[test]
    fn test_summary_mentions_gef_skip() {
        let s = summary(
            Stage1Outcome::Bypassed,
            Stage3Outcome::Skipped(GefSkipReason::ToolNotFound(PathBuf::from("/t/gef.sh"))),
        );
        let rendered = summary_table(&s).to_string();
        assert!(rendered.contains("GEF skipped — tool not found"));
        assert!(rendered.contains("skipped (SKIP_ENSEMBLE)"));
        assert!(rendered.contains("42 (no dependency)"));
        assert!(rendered.contains("/logs/alice/gef"));
        assert_eq!(chain_line(&s), "Chain: - -> 42 -> -");
    }
}
