//! The built-in stage-1 submission step.
//!
//! Runs in its own process, spawned by `run`. Everything it prints is teed
//! by the driver; the `Job array ID: <id>` lines on stdout and the JSON ID
//! manifest are its two result channels.

use crate::{
    cli::RunArgs,
    error::CliError,
    report::{FanoutReport, ItemOutcome, ItemReport},
};
use shieldrun_client::{
    manifest::IdManifest, resources::resolve_for_stage, ClientError, JobDescriptor, Scheduler,
    ScriptPatcher, SlurmScheduler,
};
use shieldrun_core::{
    config::{Config, RunContext},
    constants::{contract, env, files},
    env::LoadMode,
    errors::DomainError,
    logging,
    model::{ArrayRange, JobId, Stage},
    namespace::LogNamespace,
    workitem::{self, WorkItem},
};
use std::path::{Path, PathBuf};
use std::process::Command;

pub fn handle_submit_ensembles(args: RunArgs) -> Result<(), CliError> {
    logging::init_stderr_logger();

    let (config, _) = super::load_config(&args.folder, LoadMode::Cascade)?;
    let ctx = RunContext::new(&args.folder, &args.user_id, &args.email, &args.name, &config)?;
    let namespace = LogNamespace::create(&ctx.log_root, &ctx.user_id)?;
    let scheduler = SlurmScheduler::new(&config.sbatch);
    let submitter = EnsembleSubmitter::new(&config, &namespace, &scheduler);

    let report = submitter.submit_all(&ctx.folder)?;

    if let Ok(path) = std::env::var(env::ID_MANIFEST) {
        let manifest = IdManifest::new(report.job_ids());
        manifest.write(Path::new(&path))?;
        tracing::info!("Wrote {} job IDs to {}", manifest.job_ids.len(), path);
    }

    println!("{}", report.to_table());
    println!("Ensemble submission: {}", report.counts_line());
    Ok(())
}

pub struct EnsembleSubmitter<'a> {
    config: &'a Config,
    namespace: &'a LogNamespace,
    scheduler: &'a dyn Scheduler,
    patcher: ScriptPatcher,
}

impl<'a> EnsembleSubmitter<'a> {
    pub fn new(config: &'a Config, namespace: &'a LogNamespace, scheduler: &'a dyn Scheduler) -> Self {
        Self {
            config,
            namespace,
            scheduler,
            patcher: ScriptPatcher::from_config(config),
        }
    }

    /// One array job per eligible item, in name order. Only a scheduler
    /// refusal stops the loop.
    pub fn submit_all(&self, folder: &Path) -> Result<FanoutReport, CliError> {
        let mut report = FanoutReport::default();
        for item in workitem::discover(folder)? {
            let result = self.submit_item(&item)?;
            if let ItemOutcome::Submitted(job_id) = &result.outcome {
                println!("{}", id_line(job_id));
            }
            report.push(result);
        }
        Ok(report)
    }

    fn submit_item(&self, item: &WorkItem) -> Result<ItemReport, CliError> {
        let range = match item.array_range() {
            Ok(range) => range,
            Err(DomainError::DescriptorMissing { .. }) => {
                tracing::info!("Skipping '{}': no {}", item.name, files::DESCRIPTOR);
                return Ok(ItemReport::skipped(
                    &item.name,
                    format!("no {}", files::DESCRIPTOR),
                ));
            }
            Err(e) => {
                tracing::error!("Skipping '{}': {}", item.name, e);
                return Ok(ItemReport::failed(&item.name, e.to_string()));
            }
        };

        if let Err(reason) = self.run_setup(item) {
            tracing::error!("Skipping '{}': {}", item.name, reason);
            return Ok(ItemReport::skipped(&item.name, reason));
        }

        let script = item.script_path();
        if !script.is_file() {
            let reason = format!("setup produced no {}", files::ENSEMBLE_SCRIPT);
            tracing::error!("Skipping '{}': {}", item.name, reason);
            return Ok(ItemReport::skipped(&item.name, reason));
        }

        let job_name = format!("ens_{}", item.name);
        match self.patcher.patch(&script, &job_name) {
            Ok(_) => {}
            Err(ClientError::EmptyScript(_)) => {
                tracing::error!("Skipping '{}': {} is empty", item.name, script.display());
                return Ok(ItemReport::skipped(
                    &item.name,
                    format!("{} is empty", files::ENSEMBLE_SCRIPT),
                ));
            }
            Err(e) => {
                tracing::error!("Could not patch {}: {}", script.display(), e);
                return Ok(ItemReport::failed(&item.name, e.to_string()));
            }
        }

        let job_id = self.scheduler.submit(&self.descriptor(item, &job_name, &script, range))?;
        tracing::info!(
            "Submitted {} ({} tasks) as array {}",
            job_name,
            range.task_count(),
            job_id
        );
        Ok(ItemReport::submitted(&item.name, job_id))
    }

    /// Runs the setup tool inside the item directory. Its stdout is sent to
    /// stderr so stdout carries only job array IDs and the final table.
    fn run_setup(&self, item: &WorkItem) -> Result<(), String> {
        let mut cmd = Command::new(&self.config.setup_tool);
        cmd.arg(&item.path)
            .current_dir(&item.path)
            .stdout(std::io::stderr());
        logging::log_and_print_command(&cmd);

        let status = cmd
            .status()
            .map_err(|e| format!("could not run {}: {}", self.config.setup_tool.display(), e))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("setup tool exited with {}", status))
        }
    }

    fn descriptor(
        &self,
        item: &WorkItem,
        job_name: &str,
        script: &Path,
        range: ArrayRange,
    ) -> JobDescriptor {
        let dir = self.namespace.stage_dir(Stage::Ensemble);
        JobDescriptor::new(job_name, script, &item.path)
            .array(range)
            .logs(
                &log_template(dir, &item.name, "out"),
                &log_template(dir, &item.name, "err"),
            )
            .directives(resolve_for_stage(Stage::Ensemble, &self.config.resources))
    }
}

fn log_template(dir: &Path, item: &str, ext: &str) -> PathBuf {
    dir.join(format!("{}-%A_%a.{}", item, ext))
}

/// The line the driver scrapes when no manifest is available.
fn id_line(id: &JobId) -> String {
    format!("{} {}", contract::JOB_ARRAY_ID_LABEL, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shieldrun_client::parser::extract_job_ids;
    use shieldrun_test_utils::TestContext;

    fn config_for(ctx: &TestContext) -> Config {
        let vars = ctx.env_vars();
        Config::from_lookup(
            |key| vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()),
            &ctx.test_root,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_items_submitted_skipped_and_patched() {
        let ctx = TestContext::new();
        ctx.add_item("A", Some(2));
        ctx.add_item("B", None);
        ctx.add_item("C", Some(1));
        ctx.break_setup_for("C");
        ctx.add_item("D", Some(3));
        ctx.suppress_script_for("D");

        let config = config_for(&ctx);
        let namespace = LogNamespace::create(&config.log_root, "alice").unwrap();
        let scheduler = SlurmScheduler::new(&ctx.sbatch);
        let report = EnsembleSubmitter::new(&config, &namespace, &scheduler)
            .submit_all(&ctx.folder)
            .unwrap();

        assert_eq!(report.submitted(), 1);
        assert_eq!(report.skipped(), 3);
        assert_eq!(report.items[0].outcome, ItemOutcome::Submitted(JobId::from("1001")));
        assert!(matches!(&report.items[1].outcome, ItemOutcome::Skipped { reason } if reason.contains("input.dat")));
        assert!(matches!(&report.items[2].outcome, ItemOutcome::Skipped { reason } if reason.contains("exited")));
        assert!(matches!(&report.items[3].outcome, ItemOutcome::Skipped { reason } if reason.contains("ensemble_job.sh")));

        let calls = ctx.sbatch_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].job_name(), "ens_A");
        assert_eq!(calls[0].flag("array"), Some("1-2"));
        let out = calls[0].flag("output").unwrap();
        assert!(out.ends_with("alice/ensemble/A-%A_%a.out"));

        let script = fs_err::read_to_string(ctx.folder.join("A").join("ensemble_job.sh")).unwrap();
        assert!(!script.contains('\r'));
        assert!(script.starts_with("#!/bin/bash\n#SBATCH --job-name=ens_A\n"));
        assert!(script.contains("export PBS_ARRAYID=\"${SLURM_ARRAY_TASK_ID}\""));
    }

    #[test]
    fn test_descriptor_bytes_and_read_failures() {
        let ctx = TestContext::new();
        ctx.add_item("A", Some(1));
        fs_err::write(ctx.folder.join("A").join(files::DESCRIPTOR), b"TITLE=\xff\xfe\nNRUNS=5\n").unwrap();
        fs_err::create_dir_all(ctx.folder.join("B").join(files::DESCRIPTOR)).unwrap();

        let config = config_for(&ctx);
        let namespace = LogNamespace::create(&config.log_root, "alice").unwrap();
        let scheduler = SlurmScheduler::new(&ctx.sbatch);
        let report = EnsembleSubmitter::new(&config, &namespace, &scheduler)
            .submit_all(&ctx.folder)
            .unwrap();

        assert_eq!(report.submitted(), 1);
        assert_eq!(report.failed(), 1);
        assert!(matches!(&report.items[1].outcome, ItemOutcome::Failed { error } if error.contains("Could not read")));
        assert_eq!(ctx.sbatch_calls()[0].flag("array"), Some("1-5"));
    }

    #[test]
    fn test_rejection_aborts_step() {
        let ctx = TestContext::new();
        ctx.add_item("A", Some(2));
        ctx.reject_submissions_matching("ens_A");

        let config = config_for(&ctx);
        let namespace = LogNamespace::create(&config.log_root, "alice").unwrap();
        let scheduler = SlurmScheduler::new(&ctx.sbatch);
        let err = EnsembleSubmitter::new(&config, &namespace, &scheduler)
            .submit_all(&ctx.folder)
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::Client(ClientError::SubmissionRejected { .. })
        ));
    }

    #[test]
    fn test_id_line_matches_wire_contract() {
        let line = id_line(&JobId::from("77"));
        assert_eq!(extract_job_ids(&line), vec![JobId::from("77")]);
    }
}
