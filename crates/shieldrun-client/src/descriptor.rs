use crate::resources::SbatchDirectives;
use shieldrun_core::model::{ArrayRange, Dependency};
use std::path::{Path, PathBuf};

/// Everything the scheduler needs to accept one job. Only the returned
/// identifier outlives the submission.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescriptor {
    pub name: String,
    pub script: PathBuf,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub output: String,
    pub error: String,
    pub array: Option<ArrayRange>,
    pub dependency: Option<Dependency>,
    pub export_env: bool,
    pub directives: SbatchDirectives,
}

impl JobDescriptor {
    /// A plain job: no array, no dependency, environment exported.
    pub fn new(name: impl Into<String>, script: &Path, workdir: &Path) -> Self {
        Self {
            name: name.into(),
            script: script.to_path_buf(),
            args: Vec::new(),
            workdir: workdir.to_path_buf(),
            output: String::new(),
            error: String::new(),
            array: None,
            dependency: None,
            export_env: true,
            directives: SbatchDirectives::default(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Output and error path templates; `%j`, `%A` and `%a` are expanded by
    /// the scheduler.
    pub fn logs(mut self, output: &Path, error: &Path) -> Self {
        self.output = output.to_string_lossy().to_string();
        self.error = error.to_string_lossy().to_string();
        self
    }

    pub fn array(mut self, range: ArrayRange) -> Self {
        self.array = Some(range);
        self
    }

    pub fn dependency(mut self, dependency: Option<Dependency>) -> Self {
        self.dependency = dependency;
        self
    }

    pub fn export_env(mut self, export: bool) -> Self {
        self.export_env = export;
        self
    }

    pub fn directives(mut self, directives: SbatchDirectives) -> Self {
        self.directives = directives;
        self
    }

    /// sbatch command-line arguments, in submission order.
    pub fn to_sbatch_args(&self) -> Vec<String> {
        let mut args = vec![
            "--parsable".to_string(),
            format!("--job-name={}", self.name),
            format!("--chdir={}", self.workdir.display()),
        ];
        if !self.output.is_empty() {
            args.push(format!("--output={}", self.output));
        }
        if !self.error.is_empty() {
            args.push(format!("--error={}", self.error));
        }
        if let Some(range) = &self.array {
            args.push(format!("--array={}", range));
        }
        if let Some(dep) = &self.dependency {
            args.push(format!("--dependency={}", dep));
        }
        args.push(if self.export_env {
            "--export=ALL".to_string()
        } else {
            "--export=NONE".to_string()
        });
        args.extend(self.directives.to_args());
        args.push(self.script.to_string_lossy().to_string());
        args.extend(self.args.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shieldrun_core::model::JobId;

    #[test]
    fn test_plain_submission_args() {
        let desc = JobDescriptor::new("aggregate", Path::new("/tools/aggregate.sh"), Path::new("/data/run"))
            .args(["/data/run", "alice"])
            .logs(
                Path::new("/logs/alice/aggregate/aggregate-%j.out"),
                Path::new("/logs/alice/aggregate/aggregate-%j.err"),
            );
        assert_eq!(
            desc.to_sbatch_args(),
            vec![
                "--parsable",
                "--job-name=aggregate",
                "--chdir=/data/run",
                "--output=/logs/alice/aggregate/aggregate-%j.out",
                "--error=/logs/alice/aggregate/aggregate-%j.err",
                "--export=ALL",
                "/tools/aggregate.sh",
                "/data/run",
                "alice",
            ]
        );
    }

    #[test]
    fn test_array_and_dependency_args() {
        let desc = JobDescriptor::new("ens_A", Path::new("/data/run/A/ensemble_job.sh"), Path::new("/data/run/A"))
            .array(ArrayRange::one_to(2))
            .dependency(Dependency::after_any(&[JobId::from("7"), JobId::from("9")]));
        let args = desc.to_sbatch_args();
        assert!(args.contains(&"--array=1-2".to_string()));
        assert!(args.contains(&"--dependency=afterany:7:9".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--output")));
    }

    #[test]
    fn test_directives_precede_script() {
        let desc = JobDescriptor::new("gef_A", Path::new("/t/gef.sh"), Path::new("/w"))
            .export_env(false)
            .directives(SbatchDirectives {
                mem: Some("8G".into()),
                ..Default::default()
            });
        let args = desc.to_sbatch_args();
        let mem = args.iter().position(|a| a == "--mem=8G").unwrap();
        let script = args.iter().position(|a| a == "/t/gef.sh").unwrap();
        assert!(mem < script);
        assert!(args.contains(&"--export=NONE".to_string()));
    }
}
