use shieldrun_core::constants::{env, files, tools};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

pub const FIRST_FAKE_JOB_ID: u64 = 1001;

const FAKE_SBATCH: &str = r#"#!/bin/sh
state="$(dirname "$0")/../sbatch-state"
if [ -s "$state/reject" ]; then
  pattern=$(cat "$state/reject")
  for arg in "$@"; do
    case "$arg" in
      *"$pattern"*)
        echo "sbatch: error: Batch job submission failed: Invalid account or account/partition combination specified" >&2
        exit 1
        ;;
    esac
  done
fi
n=$(cat "$state/counter" 2>/dev/null || echo 1000)
n=$((n + 1))
echo "$n" > "$state/counter"
printf '%s' "$n" >> "$state/calls.log"
for arg in "$@"; do printf '\t%s' "$arg" >> "$state/calls.log"; done
printf '\n' >> "$state/calls.log"
echo "$n"
"#;

const FAKE_SETUP: &str = r#"#!/bin/sh
item="$1"
if [ -e "$item/setup_fails" ]; then
  echo "setup: cannot build topology for $item" >&2
  exit 3
fi
if [ -e "$item/no_script" ]; then
  exit 0
fi
printf '#!/bin/bash\r\necho "model replica $PBS_ARRAYID"\r\n' > ensemble_job.sh
"#;

const FAKE_TOOL: &str = "#!/bin/sh\nexit 0\n";

/// One recorded `sbatch` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SbatchCall {
    pub id: String,
    pub args: Vec<String>,
}

impl SbatchCall {
    /// Value of a `--flag=value` argument.
    pub fn flag(&self, name: &str) -> Option<&str> {
        let prefix = format!("--{}=", name);
        self.args.iter().find_map(|a| a.strip_prefix(prefix.as_str()))
    }

    pub fn job_name(&self) -> &str {
        self.flag("job-name").unwrap_or_default()
    }
}

pub fn tempdir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("shieldrun-test-")
        .tempdir()
        .expect("Failed to create temp dir")
}

/// A scratch installation: target folder, stage tools, fake `sbatch`, and
/// a log root, all inside one temporary directory.
pub struct TestContext {
    pub _temp_dir: tempfile::TempDir,
    pub test_root: PathBuf,
    pub folder: PathBuf,
    pub tools_dir: PathBuf,
    pub log_root: PathBuf,
    pub output_base: PathBuf,
    pub sbatch: PathBuf,
    pub sbatch_state: PathBuf,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = tempdir();
        let test_root = temp_dir.path().to_path_buf();

        let folder = test_root.join("run");
        let tools_dir = test_root.join("tools");
        let bin_dir = test_root.join("bin");
        let sbatch_state = test_root.join("sbatch-state");
        for dir in [&folder, &tools_dir, &bin_dir, &sbatch_state] {
            fs::create_dir_all(dir).expect("Failed to create test dir");
        }

        let sbatch = bin_dir.join("sbatch");
        write_executable(&sbatch, FAKE_SBATCH);
        write_executable(&tools_dir.join(tools::SETUP), FAKE_SETUP);
        write_executable(&tools_dir.join(tools::AGGREGATE), FAKE_TOOL);
        write_executable(&tools_dir.join(tools::GEF), FAKE_TOOL);

        Self {
            _temp_dir: temp_dir,
            log_root: test_root.join("logs"),
            output_base: test_root.join("results"),
            test_root,
            folder,
            tools_dir,
            sbatch,
            sbatch_state,
        }
    }

    /// Creates a work item; `Some(n)` writes a descriptor with `NRUNS=n`.
    pub fn add_item(&self, name: &str, nruns: Option<u32>) -> PathBuf {
        let dir = self.folder.join(name);
        fs::create_dir_all(&dir).expect("Failed to create work item");
        if let Some(n) = nruns {
            fs::write(
                dir.join(files::DESCRIPTOR),
                format!("MODEL={}\nNRUNS={}\n", name, n),
            )
            .expect("Failed to write descriptor");
        }
        dir
    }

    /// Makes the setup tool fail for this item.
    pub fn break_setup_for(&self, name: &str) {
        fs::write(self.folder.join(name).join("setup_fails"), "")
            .expect("Failed to write marker");
    }

    /// Makes the setup tool exit cleanly without generating a script.
    pub fn suppress_script_for(&self, name: &str) {
        fs::write(self.folder.join(name).join("no_script"), "").expect("Failed to write marker");
    }

    pub fn remove_tool(&self, name: &str) {
        fs::remove_file(self.tools_dir.join(name)).expect("Failed to remove tool");
    }

    /// Environment that points a `shieldrun` process at this context.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        vec![
            (env::SBATCH_BIN.to_string(), display(&self.sbatch)),
            (env::TOOLS_DIR.to_string(), display(&self.tools_dir)),
            (env::LOG_ROOT.to_string(), display(&self.log_root)),
            (env::GEF_OUTPUT_BASE.to_string(), display(&self.output_base)),
        ]
    }

    /// Makes the fake `sbatch` refuse any submission with an argument
    /// containing `pattern`.
    pub fn reject_submissions_matching(&self, pattern: &str) {
        fs::write(self.sbatch_state.join("reject"), pattern).expect("Failed to write reject rule");
    }

    pub fn sbatch_calls(&self) -> Vec<SbatchCall> {
        let Ok(log) = fs::read_to_string(self.sbatch_state.join("calls.log")) else {
            return Vec::new();
        };
        log.lines()
            .filter(|l| !l.is_empty())
            .map(|line| {
                let mut parts = line.split('\t');
                let id = parts.next().unwrap_or_default().to_string();
                SbatchCall {
                    id,
                    args: parts.map(str::to_string).collect(),
                }
            })
            .collect()
    }

    pub fn calls_named(&self, prefix: &str) -> Vec<SbatchCall> {
        self.sbatch_calls()
            .into_iter()
            .filter(|c| c.job_name().starts_with(prefix))
            .collect()
    }
}

pub fn write_executable(path: &Path, body: &str) {
    fs::write(path, body).expect("Failed to write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .expect("Failed to chmod script");
}

fn display(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
