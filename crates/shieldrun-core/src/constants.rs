pub mod dirs {
    pub const PIPELINE: &str = "pipeline";
    pub const ENSEMBLE: &str = "ensemble";
    pub const AGGREGATE: &str = "aggregate";
    pub const GEF: &str = "gef";
    pub const DEFAULT_LOG_ROOT: &str = "logs";
    pub const DEFAULT_OUTPUT_BASE: &str = "results";
}

pub mod files {
    pub const DESCRIPTOR: &str = "input.dat";
    pub const ENSEMBLE_SCRIPT: &str = "ensemble_job.sh";
    pub const ALIGNED_ARTIFACT: &str = "aligned_structures.pdb";
    pub const ENV_FILE: &str = ".env";
}

/// Wire contract with the stage-1 submission step. Bump the version when
/// either the printed label or the manifest layout changes.
pub mod contract {
    pub const VERSION: u32 = 1;
    pub const JOB_ARRAY_ID_LABEL: &str = "Job array ID:";
    pub const NRUNS_KEY: &str = "NRUNS";
}

pub mod env {
    pub const LOG_ROOT: &str = "SHIELDRUN_LOG_ROOT";
    pub const LOG_ROOT_ALIAS: &str = "LOG_ROOT";
    pub const TOOLS_DIR: &str = "SHIELDRUN_TOOLS_DIR";
    pub const SETUP_TOOL: &str = "ENSEMBLE_SETUP_TOOL";
    pub const SUBMIT_TOOL: &str = "ENSEMBLE_SUBMIT_TOOL";
    pub const AGGREGATE_TOOL: &str = "AGGREGATE_TOOL";
    pub const GEF_TOOL: &str = "GEF_TOOL";
    pub const GEF_SYSTEM_TYPE: &str = "GEF_SYSTEM_TYPE";
    pub const RUN_GEF: &str = "RUN_GEF";
    pub const SKIP_ENSEMBLE: &str = "SKIP_ENSEMBLE";
    pub const GEF_OUTPUT_BASE: &str = "GEF_OUTPUT_BASE";
    pub const SBATCH_BIN: &str = "SBATCH_BIN";
    pub const MODULES: &str = "ENSEMBLE_MODULES";
    pub const RESOURCE_PREFIX: &str = "SHIELDRUN";
    pub const ID_MANIFEST: &str = "SHIELDRUN_ID_MANIFEST";
    pub const LOG_LEVEL: &str = "SHIELDRUN_LOG_LEVEL";
    pub const LOG_TEE: &str = "SHIELDRUN_LOG_TEE";
}

pub mod tools {
    pub const SETUP: &str = "setup_ensemble.sh";
    pub const AGGREGATE: &str = "aggregate.sh";
    pub const GEF: &str = "gef_analysis.sh";
    pub const SBATCH: &str = "sbatch";
}

pub mod defaults {
    pub const GEF_SYSTEM_TYPE: &str = "auto";
    pub const MODULES: &[&str] = &["gromacs"];
    pub const NRUNS: u32 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_constants() {
        assert_eq!(dirs::PIPELINE, "pipeline");
        assert_eq!(dirs::GEF, "gef");
    }

    #[test]
    fn test_contract_label() {
        assert_eq!(contract::JOB_ARRAY_ID_LABEL, "Job array ID:");
        assert_eq!(contract::VERSION, 1);
    }
}
