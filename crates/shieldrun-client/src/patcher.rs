//! In-place patching of the per-item job scripts produced by the ensemble
//! setup step.
//!
//! The first line (normally the shebang) stays line 1. Scheduler directives,
//! the array-index mapping, module loads and tool-discovery exports are
//! injected right after it; every other original line follows unchanged.
//! The file is rewritten through a temporary sibling and renamed over the
//! original, so the scheduler never reads a half-written script.

use crate::error::{ClientError, Result};
use shieldrun_core::config::Config;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Array index variable set by SLURM.
pub const NATIVE_INDEX_VAR: &str = "SLURM_ARRAY_TASK_ID";
/// Array index variable the legacy ensemble scripts read.
pub const LEGACY_INDEX_VAR: &str = "PBS_ARRAYID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub original_lines: usize,
    pub injected_lines: usize,
}

#[derive(Debug, Clone)]
pub struct ScriptPatcher {
    modules: Vec<String>,
    exports: Vec<(String, String)>,
}

impl ScriptPatcher {
    pub fn new(tools_dir: &Path, modules: Vec<String>) -> Self {
        let tools = tools_dir.display().to_string();
        let exports = vec![
            ("SHIELDRUN_TOOLS_DIR".to_string(), format!("\"{}\"", tools)),
            ("PATH".to_string(), format!("\"{}:${{PATH}}\"", tools)),
            ("GMX_MAXBACKUP".to_string(), "-1".to_string()),
            (
                "OMP_NUM_THREADS".to_string(),
                "\"${SLURM_CPUS_PER_TASK:-1}\"".to_string(),
            ),
        ];
        Self { modules, exports }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.tools_dir, config.modules.clone())
    }

    pub fn injected_block(&self, job_name: &str) -> Vec<String> {
        let mut block = vec![
            format!("#SBATCH --job-name={}", job_name),
            format!("export {}=\"${{{}}}\"", LEGACY_INDEX_VAR, NATIVE_INDEX_VAR),
        ];
        block.extend(self.modules.iter().map(|m| format!("module load {}", m)));
        block.extend(
            self.exports
                .iter()
                .map(|(key, value)| format!("export {}={}", key, value)),
        );
        block
    }

    /// Returns the patched text for `original`. Carriage returns are removed.
    pub fn render(&self, original: &str, job_name: &str) -> Option<(String, PatchReport)> {
        let normalized = original.replace('\r', "");
        let mut lines = normalized.lines();
        let first = lines.next()?;
        let rest: Vec<&str> = lines.collect();
        let block = self.injected_block(job_name);

        let mut out = String::with_capacity(normalized.len() + 256);
        out.push_str(first);
        out.push('\n');
        for line in &block {
            out.push_str(line);
            out.push('\n');
        }
        for line in &rest {
            out.push_str(line);
            out.push('\n');
        }

        Some((
            out,
            PatchReport {
                original_lines: rest.len() + 1,
                injected_lines: block.len(),
            },
        ))
    }

    pub fn patch(&self, script: &Path, job_name: &str) -> Result<PatchReport> {
        let io_err = |source| ClientError::Io {
            path: script.to_path_buf(),
            source,
        };
        let original = fs_err::read_to_string(script).map_err(io_err)?;
        let (patched, report) = self
            .render(&original, job_name)
            .ok_or_else(|| ClientError::EmptyScript(script.to_path_buf()))?;

        let parent = script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut tmp = tempfile::Builder::new()
            .prefix(".patch-")
            .tempfile_in(&parent)
            .map_err(io_err)?;
        tmp.write_all(patched.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o755))
            .map_err(io_err)?;
        tmp.persist(script).map_err(|e| ClientError::PersistFailed {
            path: script.to_path_buf(),
            source: e.error,
        })?;

        tracing::debug!(
            "Patched {} ({} original lines, {} injected)",
            script.display(),
            report.original_lines,
            report.injected_lines
        );
        Ok(report)
    }
}
