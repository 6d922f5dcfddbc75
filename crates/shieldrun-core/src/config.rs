use crate::constants::{defaults, dirs, env, files, tools};
use crate::errors::ConfigError;
use crate::model::Stage;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Invocation parameters of one pipeline run. Built once, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub folder: PathBuf,
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub log_root: PathBuf,
}

impl RunContext {
    pub fn new(
        folder: &Path,
        user_id: &str,
        email: &str,
        name: &str,
        config: &Config,
    ) -> Result<Self, ConfigError> {
        if !folder.is_dir() {
            return Err(ConfigError::FolderNotFound(folder.to_path_buf()));
        }
        let folder = fs_err::canonicalize(folder).map_err(|source| ConfigError::PathIo {
            path: folder.to_path_buf(),
            source,
        })?;
        validate_user_id(user_id)?;
        Ok(Self {
            folder,
            user_id: user_id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            log_root: config.log_root.clone(),
        })
    }

    /// Positional arguments handed to the stage-1 step and the stage-2 tool.
    pub fn positional_args(&self) -> Vec<String> {
        vec![
            self.folder.to_string_lossy().to_string(),
            self.user_id.clone(),
            self.email.clone(),
            self.name.clone(),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus_per_task: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sbatch_opts: Vec<String>,
}

impl ResourceSpec {
    fn from_lookup<F>(lookup: &F, prefix: &str) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| lookup(&format!("{}_{}", prefix, suffix)).filter(|v| !v.is_empty());
        let cpus_per_task = match get("CPUS") {
            Some(raw) => Some(raw.trim().parse::<u32>().map_err(|_| {
                ConfigError::InvalidValue {
                    key: format!("{}_CPUS", prefix),
                    value: raw.clone(),
                    expected: "a positive integer".to_string(),
                }
            })?),
            None => None,
        };
        Ok(Self {
            partition: get("PARTITION"),
            cpus_per_task,
            mem: get("MEM"),
            time: get("TIME"),
            sbatch_opts: get("SBATCH_OPTS")
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resources {
    pub defaults: ResourceSpec,
    pub stages: BTreeMap<String, ResourceSpec>,
}

impl Resources {
    pub fn for_stage(&self, stage: Stage) -> Option<&ResourceSpec> {
        self.stages.get(&stage.to_string())
    }
}

/// Effective configuration, resolved once at startup and shared by reference.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub log_root: PathBuf,
    pub tools_dir: PathBuf,
    pub setup_tool: PathBuf,
    pub submit_tool: Option<PathBuf>,
    pub aggregate_tool: PathBuf,
    pub gef_tool: PathBuf,
    pub gef_system_type: String,
    pub run_gef: bool,
    pub skip_ensemble: bool,
    pub gef_output_base: PathBuf,
    pub sbatch: PathBuf,
    pub modules: Vec<String>,
    pub resources: Resources,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir()?;
        let exe_dir = crate::env::current_exe_dir();
        Self::from_lookup(|key| std::env::var(key).ok(), &cwd, exe_dir.as_deref())
    }

    pub fn from_lookup<F>(lookup: F, cwd: &Path, exe_dir: Option<&Path>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_root = match get(env::LOG_ROOT).or_else(|| get(env::LOG_ROOT_ALIAS)) {
            Some(raw) => absolutize(&expand_path(env::LOG_ROOT, &raw)?, cwd),
            None => cwd.join(dirs::DEFAULT_LOG_ROOT),
        };

        let tools_dir = match get(env::TOOLS_DIR) {
            Some(raw) => absolutize(&expand_path(env::TOOLS_DIR, &raw)?, cwd),
            None => exe_dir.map(Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf()),
        };

        let tool = |key: &str, default_name: &str| -> Result<PathBuf, ConfigError> {
            match get(key) {
                Some(raw) => resolve_tool(key, &raw, &tools_dir, cwd),
                None => Ok(tools_dir.join(default_name)),
            }
        };

        let submit_tool = match get(env::SUBMIT_TOOL) {
            Some(raw) => Some(resolve_tool(env::SUBMIT_TOOL, &raw, &tools_dir, cwd)?),
            None => None,
        };

        let sbatch = match get(env::SBATCH_BIN) {
            Some(raw) if raw.contains('/') => absolutize(&expand_path(env::SBATCH_BIN, &raw)?, cwd),
            Some(raw) => PathBuf::from(raw),
            None => PathBuf::from(tools::SBATCH),
        };

        let gef_output_base = match get(env::GEF_OUTPUT_BASE) {
            Some(raw) => absolutize(&expand_path(env::GEF_OUTPUT_BASE, &raw)?, cwd),
            None => cwd.join(dirs::DEFAULT_OUTPUT_BASE),
        };

        let modules = match lookup(env::MODULES) {
            Some(raw) => raw.split_whitespace().map(str::to_string).collect(),
            None => defaults::MODULES.iter().map(|m| m.to_string()).collect(),
        };

        let mut stages = BTreeMap::new();
        for stage in Stage::ALL {
            let prefix = format!("{}_{}", env::RESOURCE_PREFIX, stage.env_token());
            let spec = ResourceSpec::from_lookup(&lookup, &prefix)?;
            if spec != ResourceSpec::default() {
                stages.insert(stage.to_string(), spec);
            }
        }

        Ok(Self {
            setup_tool: tool(env::SETUP_TOOL, tools::SETUP)?,
            aggregate_tool: tool(env::AGGREGATE_TOOL, tools::AGGREGATE)?,
            gef_tool: tool(env::GEF_TOOL, tools::GEF)?,
            submit_tool,
            gef_system_type: get(env::GEF_SYSTEM_TYPE)
                .unwrap_or_else(|| defaults::GEF_SYSTEM_TYPE.to_string()),
            run_gef: parse_bool(env::RUN_GEF, get(env::RUN_GEF), true)?,
            skip_ensemble: parse_bool(env::SKIP_ENSEMBLE, get(env::SKIP_ENSEMBLE), false)?,
            gef_output_base,
            sbatch,
            modules,
            resources: Resources {
                defaults: ResourceSpec::from_lookup(&lookup, env::RESOURCE_PREFIX)?,
                stages,
            },
            log_root,
            tools_dir,
        })
    }

    /// Resolved, absolute settings for a child process that builds its own
    /// `Config`, so it lands on the same paths whatever its working directory.
    pub fn resolved_env(&self) -> Vec<(&'static str, String)> {
        let path = |p: &PathBuf| p.to_string_lossy().to_string();
        vec![
            (env::LOG_ROOT, path(&self.log_root)),
            (env::TOOLS_DIR, path(&self.tools_dir)),
            (env::SETUP_TOOL, path(&self.setup_tool)),
            (env::AGGREGATE_TOOL, path(&self.aggregate_tool)),
            (env::GEF_TOOL, path(&self.gef_tool)),
            (env::GEF_OUTPUT_BASE, path(&self.gef_output_base)),
            (env::SBATCH_BIN, path(&self.sbatch)),
        ]
    }

    /// Location of the aligned-structure artifact the GEF stage reads for one
    /// work item. Always derived from configuration, never from a stage-1 run.
    pub fn aligned_artifact_path(&self, user_id: &str, item: &str) -> PathBuf {
        self.gef_output_base
            .join(user_id)
            .join(item)
            .join(files::ALIGNED_ARTIFACT)
    }
}

/// The user id names one directory under the log root.
fn validate_user_id(user_id: &str) -> Result<(), ConfigError> {
    let usable = !user_id.trim().is_empty()
        && user_id != "."
        && user_id != ".."
        && !user_id.contains(['/', '\\', '\0']);
    if usable {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: "user id".to_string(),
            value: user_id.to_string(),
            expected: "a single non-empty path component".to_string(),
        })
    }
}

pub fn parse_bool(key: &str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
            expected: "a boolean (true/false, yes/no, on/off, 1/0)".to_string(),
        }),
    }
}

fn expand_path(key: &str, raw: &str) -> Result<PathBuf, ConfigError> {
    shellexpand::full(raw)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            expected: format!("an expandable path ({})", e),
        })
}

fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Values with a path separator are expanded and taken as paths; bare names
/// are looked up on `PATH`, then under the tools directory.
fn resolve_tool(key: &str, raw: &str, tools_dir: &Path, cwd: &Path) -> Result<PathBuf, ConfigError> {
    if raw.contains('/') || raw.starts_with('~') {
        return Ok(absolutize(&expand_path(key, raw)?, cwd));
    }
    Ok(which::which(raw).unwrap_or_else(|_| tools_dir.join(raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(
            |key| map.get(key).cloned(),
            Path::new("/work"),
            Some(Path::new("/opt/shieldrun/bin")),
        )
    }

    #[test]
    fn test_defaults() {
        let c = config_with(&[]).unwrap();
        assert_eq!(c.log_root, PathBuf::from("/work/logs"));
        assert_eq!(c.tools_dir, PathBuf::from("/opt/shieldrun/bin"));
        assert_eq!(c.aggregate_tool, PathBuf::from("/opt/shieldrun/bin/aggregate.sh"));
        assert_eq!(c.gef_tool, PathBuf::from("/opt/shieldrun/bin/gef_analysis.sh"));
        assert_eq!(c.setup_tool, PathBuf::from("/opt/shieldrun/bin/setup_ensemble.sh"));
        assert!(c.submit_tool.is_none());
        assert_eq!(c.gef_system_type, "auto");
        assert!(c.run_gef);
        assert!(!c.skip_ensemble);
        assert_eq!(c.gef_output_base, PathBuf::from("/work/results"));
        assert_eq!(c.sbatch, PathBuf::from("sbatch"));
        assert_eq!(c.modules, vec!["gromacs"]);
        assert_eq!(c.resources, Resources::default());
    }

    #[test]
    fn test_log_root_alias_precedence() {
        let both = config_with(&[(env::LOG_ROOT, "/a"), (env::LOG_ROOT_ALIAS, "/b")]).unwrap();
        assert_eq!(both.log_root, PathBuf::from("/a"));

        let alias_only = config_with(&[(env::LOG_ROOT_ALIAS, "/b")]).unwrap();
        assert_eq!(alias_only.log_root, PathBuf::from("/b"));

        let relative = config_with(&[(env::LOG_ROOT, "custom")]).unwrap();
        assert_eq!(relative.log_root, PathBuf::from("/work/custom"));
    }

    #[test]
    fn test_empty_value_falls_through() {
        let c = config_with(&[(env::LOG_ROOT, ""), (env::LOG_ROOT_ALIAS, "/b")]).unwrap();
        assert_eq!(c.log_root, PathBuf::from("/b"));
    }

    #[test]
    fn test_tool_overrides_are_independent() {
        let c = config_with(&[(env::GEF_TOOL, "/srv/gef/run.sh")]).unwrap();
        assert_eq!(c.gef_tool, PathBuf::from("/srv/gef/run.sh"));
        assert_eq!(c.aggregate_tool, PathBuf::from("/opt/shieldrun/bin/aggregate.sh"));

        let relative = config_with(&[(env::AGGREGATE_TOOL, "scripts/agg.sh")]).unwrap();
        assert_eq!(relative.aggregate_tool, PathBuf::from("/work/scripts/agg.sh"));
    }

    #[test]
    fn test_bool_switches() {
        let c = config_with(&[(env::RUN_GEF, "no"), (env::SKIP_ENSEMBLE, "TRUE")]).unwrap();
        assert!(!c.run_gef);
        assert!(c.skip_ensemble);

        let err = config_with(&[(env::RUN_GEF, "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == env::RUN_GEF));
    }

    #[test]
    fn test_resources_defaults_and_stage_overrides() {
        let c = config_with(&[
            ("SHIELDRUN_PARTITION", "short"),
            ("SHIELDRUN_MEM", "4G"),
            ("SHIELDRUN_GEF_MEM", "32G"),
            ("SHIELDRUN_GEF_SBATCH_OPTS", "--gres=gpu:1 --exclusive"),
        ])
        .unwrap();
        assert_eq!(c.resources.defaults.partition.as_deref(), Some("short"));
        assert_eq!(c.resources.defaults.mem.as_deref(), Some("4G"));
        let gef = c.resources.for_stage(Stage::Gef).unwrap();
        assert_eq!(gef.mem.as_deref(), Some("32G"));
        assert_eq!(gef.sbatch_opts, vec!["--gres=gpu:1", "--exclusive"]);
        assert!(c.resources.for_stage(Stage::Aggregate).is_none());
    }

    #[test]
    fn test_invalid_cpu_count() {
        let err = config_with(&[("SHIELDRUN_CPUS", "four")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_modules_can_be_cleared() {
        let c = config_with(&[(env::MODULES, "")]).unwrap();
        assert!(c.modules.is_empty());
        let c = config_with(&[(env::MODULES, "gcc/12 openmpi gromacs/2023")]).unwrap();
        assert_eq!(c.modules, vec!["gcc/12", "openmpi", "gromacs/2023"]);
    }

    #[test]
    fn test_user_id_must_stay_inside_log_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(&[]).unwrap();

        let ok = RunContext::new(dir.path(), "alice.b-2", "a@b.c", "A B", &config).unwrap();
        assert_eq!(ok.user_id, "alice.b-2");

        for bad in ["", "  ", ".", "..", "../eve", "a/b", "a\\b"] {
            let err = RunContext::new(dir.path(), bad, "a@b.c", "A B", &config).unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidValue { value, .. } if value == bad),
                "{bad:?} gave {err}"
            );
        }
    }

    #[test]
    fn test_resolved_env_rebuilds_same_config_elsewhere() {
        let driver = config_with(&[(env::SETUP_TOOL, "tools/setup.sh"), (env::LOG_ROOT_ALIAS, "out")]).unwrap();
        let exported: HashMap<String, String> = driver
            .resolved_env()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        for value in exported.values() {
            assert!(value == "sbatch" || Path::new(value).is_absolute(), "{value}");
        }

        let child = Config::from_lookup(|key| exported.get(key).cloned(), Path::new("/data/run1"), None).unwrap();
        assert_eq!(child.log_root, PathBuf::from("/work/out"));
        assert_eq!(child.setup_tool, PathBuf::from("/work/tools/setup.sh"));
        assert_eq!(child.tools_dir, driver.tools_dir);
        assert_eq!(child.gef_output_base, PathBuf::from("/work/results"));
        assert_eq!(child.sbatch, driver.sbatch);
    }

    #[test]
    fn test_aligned_artifact_path() {
        let c = config_with(&[(env::GEF_OUTPUT_BASE, "/scratch/out")]).unwrap();
        assert_eq!(
            c.aligned_artifact_path("alice", "A"),
            PathBuf::from("/scratch/out/alice/A/aligned_structures.pdb")
        );
    }
}
