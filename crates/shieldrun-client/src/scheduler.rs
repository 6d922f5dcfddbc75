use crate::descriptor::JobDescriptor;
use crate::error::{ClientError, Result};
use crate::parser::parse_parsable_output;
use shieldrun_core::{logging, model::JobId};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Submission surface of the batch scheduler.
pub trait Scheduler: Send + Sync {
    /// Hands the job to the scheduler and returns its identifier. A refusal
    /// is an error for this submission only; callers decide what it aborts.
    fn submit(&self, descriptor: &JobDescriptor) -> Result<JobId>;
}

pub struct SlurmScheduler {
    sbatch: PathBuf,
}

impl SlurmScheduler {
    pub fn new(sbatch: &Path) -> Self {
        Self {
            sbatch: sbatch.to_path_buf(),
        }
    }
}

impl Scheduler for SlurmScheduler {
    fn submit(&self, descriptor: &JobDescriptor) -> Result<JobId> {
        let mut cmd = Command::new(&self.sbatch);
        cmd.args(descriptor.to_sbatch_args());

        logging::log_and_print_command(&cmd);
        let output = cmd.output().map_err(|source| ClientError::Spawn {
            program: self.sbatch.display().to_string(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ClientError::SubmissionRejected {
                job_name: descriptor.name.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let job_id = parse_parsable_output(&String::from_utf8_lossy(&output.stdout))?;
        tracing::info!("Submitted job '{}' as SLURM ID {}", descriptor.name, job_id);
        Ok(job_id)
    }
}
