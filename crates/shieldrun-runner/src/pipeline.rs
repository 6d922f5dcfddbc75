//! The three-stage driver.
//!
//! `Init -> Stage1Submitted -> Stage2Submitted -> Stage3Submitted -> Done`,
//! with `Init -> Stage2Submitted` when the ensemble stage is skipped. Each
//! transition produces one typed outcome; only stage 1 and stage 2 can abort
//! the run.

use crate::error::CliError;
use crate::report::{FanoutReport, ItemReport};
use crate::step::{StepRequest, StepRunner};
use shieldrun_client::{
    manifest::IdManifest, parser, resources::resolve_for_stage, JobDescriptor, Scheduler,
};
use shieldrun_core::{
    config::{Config, RunContext},
    errors::ConfigError,
    model::{Dependency, JobId, Stage},
    namespace::LogNamespace,
    workitem::{self, WorkItem},
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Stage1Submitted,
    Stage2Submitted,
    Stage3Submitted,
    Done,
}

impl PipelineState {
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Init, Stage1Submitted)
                | (Init, Stage2Submitted)
                | (Stage1Submitted, Stage2Submitted)
                | (Stage2Submitted, Stage3Submitted)
                | (Stage3Submitted, Done)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    Manifest,
    OutputScrape,
}

impl fmt::Display for IdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdSource::Manifest => write!(f, "ID manifest"),
            IdSource::OutputScrape => write!(f, "submission output"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage1Outcome {
    Submitted { ids: Vec<JobId>, source: IdSource },
    NoIdentifiers,
    Bypassed,
}

impl Stage1Outcome {
    /// Dependency for the aggregation job: `afterany` over every discovered
    /// array, or none at all.
    pub fn dependency(&self) -> Option<Dependency> {
        match self {
            Stage1Outcome::Submitted { ids, .. } => Dependency::after_any(ids),
            Stage1Outcome::NoIdentifiers | Stage1Outcome::Bypassed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GefSkipReason {
    Disabled,
    ToolNotFound(PathBuf),
}

impl fmt::Display for GefSkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GefSkipReason::Disabled => write!(f, "GEF skipped — disabled by RUN_GEF"),
            GefSkipReason::ToolNotFound(_) => write!(f, "GEF skipped — tool not found"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage3Outcome {
    Submitted(FanoutReport),
    Skipped(GefSkipReason),
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub namespace: LogNamespace,
    pub session_log: Option<PathBuf>,
    pub stage1_log: Option<PathBuf>,
    pub stage1: Stage1Outcome,
    pub aggregate_id: JobId,
    pub aggregate_dependency: Option<Dependency>,
    pub stage3: Stage3Outcome,
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StageStarted(Stage),
    ShortcutTaken,
    StepOutput(String),
    IdsDiscovered { ids: Vec<JobId>, source: IdSource },
    Warning(String),
    JobSubmitted { stage: Stage, job_id: JobId },
    FanoutStarted { total: usize },
    ItemFinished(ItemReport),
    StageSkipped { stage: Stage, reason: String },
}

pub struct Pipeline<'a> {
    config: Arc<Config>,
    ctx: &'a RunContext,
    namespace: &'a LogNamespace,
    scheduler: &'a dyn Scheduler,
    step: &'a dyn StepRunner,
    events: Option<Sender<PipelineEvent>>,
    session_log: Option<PathBuf>,
    state: PipelineState,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: Arc<Config>,
        ctx: &'a RunContext,
        namespace: &'a LogNamespace,
        scheduler: &'a dyn Scheduler,
        step: &'a dyn StepRunner,
    ) -> Self {
        Self {
            config,
            ctx,
            namespace,
            scheduler,
            step,
            events: None,
            session_log: None,
            state: PipelineState::Init,
        }
    }

    pub fn with_events(mut self, events: Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_session_log(mut self, path: Option<PathBuf>) -> Self {
        self.session_log = path;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn warn(&self, message: String) {
        tracing::warn!("{}", message);
        self.emit(PipelineEvent::Warning(message));
    }

    fn advance(&mut self, next: PipelineState) -> Result<(), CliError> {
        if !self.state.can_advance_to(next) {
            return Err(CliError::Config(ConfigError::General(format!(
                "Invalid pipeline transition {:?} -> {:?}",
                self.state, next
            ))));
        }
        tracing::debug!("Pipeline state {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }

    pub fn run(mut self) -> Result<RunSummary, CliError> {
        let gef_skip = self.check_tools()?;

        let (stage1, stage1_log) = if self.config.skip_ensemble {
            tracing::info!("SKIP_ENSEMBLE is set; submitting aggregation directly");
            self.emit(PipelineEvent::ShortcutTaken);
            self.emit(PipelineEvent::StageSkipped {
                stage: Stage::Ensemble,
                reason: "SKIP_ENSEMBLE is set".to_string(),
            });
            (Stage1Outcome::Bypassed, None)
        } else {
            let (outcome, log) = self.submit_ensembles()?;
            self.advance(PipelineState::Stage1Submitted)?;
            (outcome, Some(log))
        };

        let aggregate_dependency = stage1.dependency();
        let aggregate_id = self.submit_aggregate(aggregate_dependency.clone())?;
        self.advance(PipelineState::Stage2Submitted)?;

        let stage3 = match gef_skip {
            Some(reason) => {
                tracing::warn!("Stage 3 skipped: {}", reason);
                self.emit(PipelineEvent::StageSkipped {
                    stage: Stage::Gef,
                    reason: reason.to_string(),
                });
                Stage3Outcome::Skipped(reason)
            }
            None => Stage3Outcome::Submitted(self.submit_gef_fanout(&aggregate_id)?),
        };
        self.advance(PipelineState::Stage3Submitted)?;
        self.advance(PipelineState::Done)?;

        Ok(RunSummary {
            namespace: self.namespace.clone(),
            session_log: self.session_log.clone(),
            stage1_log,
            stage1,
            aggregate_id,
            aggregate_dependency,
            stage3,
        })
    }

    /// Fails on a missing aggregation or ensemble tool; a missing GEF tool
    /// only disables stage 3.
    fn check_tools(&self) -> Result<Option<GefSkipReason>, CliError> {
        let require = |tool: &str, path: &Path| -> Result<(), CliError> {
            if path.is_file() {
                Ok(())
            } else {
                Err(ConfigError::ToolNotFound {
                    tool: tool.to_string(),
                    path: path.to_path_buf(),
                }
                .into())
            }
        };

        require("aggregation", &self.config.aggregate_tool)?;
        if !self.config.skip_ensemble {
            match &self.config.submit_tool {
                Some(tool) => require("ensemble submission", tool)?,
                None => require("ensemble setup", &self.config.setup_tool)?,
            }
        }

        if !self.config.run_gef {
            return Ok(Some(GefSkipReason::Disabled));
        }
        if !self.config.gef_tool.is_file() {
            self.warn(format!(
                "GEF tool not found at {}; stage 3 will be skipped",
                self.config.gef_tool.display()
            ));
            return Ok(Some(GefSkipReason::ToolNotFound(self.config.gef_tool.clone())));
        }
        Ok(None)
    }

    fn submit_ensembles(&self) -> Result<(Stage1Outcome, PathBuf), CliError> {
        self.emit(PipelineEvent::StageStarted(Stage::Ensemble));

        let (tee_path, manifest_path) = crate::step::run_paths(&self.namespace.pipeline_dir);
        let request = StepRequest::for_run(&self.config, self.ctx, manifest_path, tee_path)?;
        let output = self.step.run(&request, &mut |line: &str| {
            self.emit(PipelineEvent::StepOutput(line.to_string()))
        })?;

        if !output.success {
            let code = output
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(CliError::StageFailed {
                stage: Stage::Ensemble,
                message: format!("submission step exited with {}", code),
                log_path: Some(request.tee_path),
            });
        }

        let outcome = self.discover_ids(&request.manifest_path, &output.combined);
        Ok((outcome, request.tee_path))
    }

    /// Manifest first; the `Job array ID:` lines in the step output otherwise.
    fn discover_ids(&self, manifest_path: &Path, combined: &str) -> Stage1Outcome {
        let (ids, source) = match IdManifest::read(manifest_path) {
            Ok(Some(manifest)) => (manifest.job_ids, IdSource::Manifest),
            Ok(None) => (parser::extract_job_ids(combined), IdSource::OutputScrape),
            Err(e) => {
                self.warn(format!("Ignoring unreadable ID manifest: {}", e));
                (parser::extract_job_ids(combined), IdSource::OutputScrape)
            }
        };
        let ids = parser::dedup_preserving_order(ids);

        if ids.is_empty() {
            self.warn(
                "No ensemble job IDs detected; aggregation will be submitted without a dependency"
                    .to_string(),
            );
            return Stage1Outcome::NoIdentifiers;
        }
        tracing::info!("Discovered {} ensemble job IDs via {}", ids.len(), source);
        self.emit(PipelineEvent::IdsDiscovered {
            ids: ids.clone(),
            source,
        });
        Stage1Outcome::Submitted { ids, source }
    }

    fn submit_aggregate(&self, dependency: Option<Dependency>) -> Result<JobId, CliError> {
        self.emit(PipelineEvent::StageStarted(Stage::Aggregate));
        let dir = self.namespace.stage_dir(Stage::Aggregate);
        let desc = JobDescriptor::new("aggregate", &self.config.aggregate_tool, &self.ctx.folder)
            .args(self.ctx.positional_args())
            .logs(
                &dir.join("aggregate-%j.out"),
                &dir.join("aggregate-%j.err"),
            )
            .dependency(dependency)
            .directives(resolve_for_stage(Stage::Aggregate, &self.config.resources));

        let job_id = self
            .scheduler
            .submit(&desc)
            .map_err(|e| CliError::StageFailed {
                stage: Stage::Aggregate,
                message: e.to_string(),
                log_path: self.session_log.clone(),
            })?;
        self.emit(PipelineEvent::JobSubmitted {
            stage: Stage::Aggregate,
            job_id: job_id.clone(),
        });
        Ok(job_id)
    }

    /// One GEF job per work item, re-listed from the folder. A refused item is
    /// recorded and the loop moves on.
    fn submit_gef_fanout(&self, aggregate_id: &JobId) -> Result<FanoutReport, CliError> {
        self.emit(PipelineEvent::StageStarted(Stage::Gef));
        let items = workitem::discover(&self.ctx.folder)?;
        self.emit(PipelineEvent::FanoutStarted { total: items.len() });

        let mut report = FanoutReport::default();
        for item in &items {
            let result = match self.scheduler.submit(&self.gef_descriptor(item, aggregate_id)) {
                Ok(job_id) => ItemReport::submitted(&item.name, job_id),
                Err(e) => {
                    tracing::error!("GEF submission for '{}' failed: {}", item.name, e);
                    ItemReport::failed(&item.name, e.to_string())
                }
            };
            self.emit(PipelineEvent::ItemFinished(result.clone()));
            report.push(result);
        }
        tracing::info!("GEF fan-out: {}", report.counts_line());
        Ok(report)
    }

    fn gef_descriptor(&self, item: &WorkItem, aggregate_id: &JobId) -> JobDescriptor {
        let job_name = format!("gef_{}", item.name);
        let dir = self.namespace.stage_dir(Stage::Gef);
        let artifact = self
            .config
            .aligned_artifact_path(&self.ctx.user_id, &item.name);
        JobDescriptor::new(job_name.as_str(), &self.config.gef_tool, &item.path)
            .args([
                item.path.to_string_lossy().to_string(),
                artifact.to_string_lossy().to_string(),
                self.config.gef_system_type.clone(),
            ])
            .logs(
                &dir.join(format!("{}-%j.out", job_name)),
                &dir.join(format!("{}-%j.err", job_name)),
            )
            .dependency(Some(Dependency::after_ok(aggregate_id.clone())))
            .directives(resolve_for_stage(Stage::Gef, &self.config.resources))
    }
}
