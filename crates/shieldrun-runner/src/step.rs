//! Invocation of the stage-1 submission step.
//!
//! The step is an external process (by default this executable's hidden
//! `internal-submit-ensembles` subcommand). Its stdout and stderr share one
//! pipe, so the combined text keeps the order the step wrote it in; every
//! line is teed into a log file under the pipeline directory and handed to
//! the caller as it arrives.

use crate::error::CliError;
use shieldrun_core::{config::Config, config::RunContext, constants::env, logging};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const INTERNAL_SUBCOMMAND: &str = "internal-submit-ensembles";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub env: Vec<(String, String)>,
    pub manifest_path: PathBuf,
    pub tee_path: PathBuf,
}

impl StepRequest {
    /// The configured replacement tool if there is one, else this executable.
    /// The step shares the driver's working directory and receives the
    /// driver's resolved paths.
    pub fn for_run(
        config: &Config,
        ctx: &RunContext,
        manifest_path: PathBuf,
        tee_path: PathBuf,
    ) -> Result<Self, CliError> {
        let (program, mut args) = match &config.submit_tool {
            Some(tool) => (tool.clone(), Vec::new()),
            None => (
                std::env::current_exe()?,
                vec![INTERNAL_SUBCOMMAND.to_string()],
            ),
        };
        args.extend(ctx.positional_args());
        Ok(Self {
            program,
            args,
            workdir: std::env::current_dir()?,
            env: config
                .resolved_env()
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
            manifest_path,
            tee_path,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub combined: String,
}

pub trait StepRunner: Send + Sync {
    fn run(
        &self,
        request: &StepRequest,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<StepOutput, CliError>;
}

pub struct ProcessStepRunner;

impl StepRunner for ProcessStepRunner {
    fn run(
        &self,
        request: &StepRequest,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<StepOutput, CliError> {
        let mut tee = fs_err::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&request.tee_path)?;

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .current_dir(&request.workdir)
            .envs(request.env.iter().map(|(k, v)| (k, v)))
            .env(env::ID_MANIFEST, &request.manifest_path);

        let (reader, writer) = std::io::pipe()?;
        cmd.stdout(writer.try_clone()?).stderr(writer);

        logging::log_and_print_command(&cmd);
        let mut child = cmd.spawn().map_err(|e| {
            CliError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to start '{}': {}", request.program.display(), e),
            ))
        })?;
        // The command still holds the write ends; the pipe only reaches EOF
        // once they are gone.
        drop(cmd);

        let mut combined = String::new();
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            tee.write_all(&buf)?;
            let line = String::from_utf8_lossy(&buf);
            combined.push_str(&line);
            on_line(line.trim_end_matches(['\n', '\r']));
        }
        tee.flush()?;

        let status = child.wait()?;
        tracing::info!(
            "Stage-1 submission step exited with {} ({} bytes of output, tee: {})",
            status,
            combined.len(),
            request.tee_path.display()
        );
        Ok(StepOutput {
            success: status.success(),
            code: status.code(),
            combined,
        })
    }
}

pub fn tee_file_name(timestamp: &str, pid: u32) -> String {
    format!("ensemble_submit_{}_{}.log", timestamp, pid)
}

pub fn manifest_file_name(timestamp: &str, pid: u32) -> String {
    format!("ensemble_ids_{}_{}.json", timestamp, pid)
}

/// Tee and manifest locations for one run, side by side in `pipeline_dir`.
pub fn run_paths(pipeline_dir: &Path) -> (PathBuf, PathBuf) {
    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let pid = std::process::id();
    (
        pipeline_dir.join(tee_file_name(&timestamp, pid)),
        pipeline_dir.join(manifest_file_name(&timestamp, pid)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use shieldrun_test_utils::{harness::write_executable, tempdir};

    fn request(dir: &Path, program: PathBuf) -> StepRequest {
        StepRequest {
            program,
            args: vec!["one".into(), "two words".into()],
            workdir: dir.to_path_buf(),
            env: vec![("SHIELDRUN_LOG_ROOT".into(), "/abs/logs".into())],
            manifest_path: dir.join("ids.json"),
            tee_path: dir.join("tee.log"),
        }
    }

    #[test]
    fn test_output_is_teed_and_streamed() {
        let dir = tempdir();
        let script = dir.path().join("step.sh");
        write_executable(
            &script,
            "#!/bin/sh\necho \"args: $1 / $2\"\necho 'to stderr' >&2\necho \"root=$SHIELDRUN_LOG_ROOT\"\necho \"manifest=$SHIELDRUN_ID_MANIFEST\"\n",
        );

        let mut seen = Vec::new();
        let out = ProcessStepRunner
            .run(&request(dir.path(), script), &mut |l: &str| seen.push(l.to_string()))
            .unwrap();

        assert!(out.success);
        assert_eq!(out.code, Some(0));
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], "args: one / two words");
        assert!(seen.contains(&"to stderr".to_string()));
        assert!(seen.contains(&"root=/abs/logs".to_string()));
        assert!(seen[3].ends_with("ids.json"));

        let teed = fs_err::read_to_string(dir.path().join("tee.log")).unwrap();
        assert_eq!(teed, out.combined);
    }

    #[test]
    fn test_non_zero_exit_is_reported_not_raised() {
        let dir = tempdir();
        let script = dir.path().join("step.sh");
        write_executable(&script, "#!/bin/sh\necho 'Job array ID: 5'\nexit 4\n");

        let out = ProcessStepRunner
            .run(&request(dir.path(), script), &mut |_: &str| {})
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(4));
        assert!(out.combined.contains("Job array ID: 5"));
    }

    #[test]
    fn test_missing_program_is_error() {
        let dir = tempdir();
        let missing = dir.path().join("absent.sh");
        assert!(ProcessStepRunner
            .run(&request(dir.path(), missing), &mut |_: &str| {})
            .is_err());
    }

    #[test]
    fn test_run_paths_share_suffix() {
        let (tee, manifest) = run_paths(Path::new("/logs/u/pipeline"));
        let tee = tee.file_name().unwrap().to_string_lossy().to_string();
        let manifest = manifest.file_name().unwrap().to_string_lossy().to_string();
        assert!(tee.starts_with("ensemble_submit_"));
        assert_eq!(
            tee.trim_start_matches("ensemble_submit_").trim_end_matches(".log"),
            manifest.trim_start_matches("ensemble_ids_").trim_end_matches(".json")
        );
    }
}
