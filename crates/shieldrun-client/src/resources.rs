use shieldrun_core::{
    config::{ResourceSpec, Resources},
    model::Stage,
};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SbatchDirectives {
    pub partition: Option<String>,
    pub cpus_per_task: Option<u32>,
    pub mem: Option<String>,
    pub time: Option<String>,
    pub sbatch_opts: Vec<String>,
}

impl SbatchDirectives {
    pub fn to_args(&self) -> Vec<String> {
        let mut opts = Vec::new();
        if let Some(p) = &self.partition {
            opts.push(format!("--partition={}", p));
        }
        if let Some(c) = self.cpus_per_task {
            opts.push(format!("--cpus-per-task={}", c));
        }
        if let Some(m) = &self.mem {
            opts.push(format!("--mem={}", m));
        }
        if let Some(t) = &self.time {
            opts.push(format!("--time={}", t));
        }
        opts.extend(self.sbatch_opts.clone());
        opts
    }

    pub fn is_empty(&self) -> bool {
        self == &SbatchDirectives::default()
    }
}

fn merge_spec(current: &mut SbatchDirectives, spec: &ResourceSpec) {
    if let Some(val) = &spec.partition {
        current.partition = Some(val.clone());
    }
    if let Some(val) = spec.cpus_per_task {
        current.cpus_per_task = Some(val);
    }
    if let Some(val) = &spec.mem {
        current.mem = Some(val.clone());
    }
    if let Some(val) = &spec.time {
        current.time = Some(val.clone());
    }
    if !spec.sbatch_opts.is_empty() {
        current.sbatch_opts = spec.sbatch_opts.clone();
    }
}

/// Defaults first, then the stage's own overrides on top.
pub fn resolve_for_stage(stage: Stage, resources: &Resources) -> SbatchDirectives {
    let mut current = SbatchDirectives::default();
    merge_spec(&mut current, &resources.defaults);
    if let Some(spec) = resources.for_stage(stage) {
        merge_spec(&mut current, spec);
    }
    tracing::debug!(
        "Resolved sbatch directives for stage '{}': {:?}",
        stage,
        current
    );
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn test_resources() -> Resources {
        let mut stages = BTreeMap::new();
        stages.insert(
            Stage::Gef.to_string(),
            ResourceSpec {
                mem: Some("32G".into()),
                cpus_per_task: Some(8),
                sbatch_opts: vec!["--gres=gpu:1".into()],
                ..Default::default()
            },
        );
        Resources {
            defaults: ResourceSpec {
                partition: Some("default".into()),
                cpus_per_task: Some(1),
                mem: Some("1G".into()),
                time: Some("02:00:00".into()),
                sbatch_opts: vec![],
            },
            stages,
        }
    }

    #[test]
    fn test_defaults_apply_to_every_stage() {
        let d = resolve_for_stage(Stage::Aggregate, &test_resources());
        assert_eq!(d.partition.as_deref(), Some("default"));
        assert_eq!(d.mem.as_deref(), Some("1G"));
        assert!(d.sbatch_opts.is_empty());
    }

    #[test]
    fn test_stage_override_layers_on_defaults() {
        let d = resolve_for_stage(Stage::Gef, &test_resources());
        assert_eq!(d.mem.as_deref(), Some("32G"));
        assert_eq!(d.cpus_per_task, Some(8));
        assert_eq!(d.partition.as_deref(), Some("default"));
        assert_eq!(d.time.as_deref(), Some("02:00:00"));
        assert_eq!(d.sbatch_opts, vec!["--gres=gpu:1"]);
    }

    #[test]
    fn test_to_args_order() {
        let d = resolve_for_stage(Stage::Gef, &test_resources());
        assert_eq!(
            d.to_args(),
            vec![
                "--partition=default",
                "--cpus-per-task=8",
                "--mem=32G",
                "--time=02:00:00",
                "--gres=gpu:1",
            ]
        );
    }

    #[test]
    fn test_no_resources_means_no_args() {
        let d = resolve_for_stage(Stage::Ensemble, &Resources::default());
        assert!(d.is_empty());
        assert!(d.to_args().is_empty());
    }
}
