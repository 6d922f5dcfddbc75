use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Ensemble,
    Aggregate,
    Gef,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Ensemble, Stage::Aggregate, Stage::Gef];

    /// Upper-case token used in per-stage environment variable names.
    pub fn env_token(&self) -> &'static str {
        match self {
            Stage::Ensemble => "ENSEMBLE",
            Stage::Aggregate => "AGGREGATE",
            Stage::Gef => "GEF",
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Stage::Ensemble => 1,
            Stage::Aggregate => 2,
            Stage::Gef => 3,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Ensemble => write!(f, "ensemble"),
            Stage::Aggregate => write!(f, "aggregate"),
            Stage::Gef => write!(f, "gef"),
        }
    }
}

/// Scheduler-assigned job identifier. For array jobs this is the parent id
/// under which every array index nests.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        JobId(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

impl FromStr for JobId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(JobId(s.to_string()))
    }
}

/// Inclusive array index range, always starting at 1.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct ArrayRange {
    pub start: u32,
    pub end: u32,
}

impl ArrayRange {
    pub fn one_to(count: u32) -> Self {
        Self {
            start: 1,
            end: count.max(1),
        }
    }

    pub fn task_count(&self) -> u32 {
        self.end - self.start + 1
    }
}

impl fmt::Display for ArrayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// Start only after every listed job succeeded.
    AfterOk(Vec<JobId>),
    /// Start once every listed job finished, whatever its exit status.
    AfterAny(Vec<JobId>),
}

impl Dependency {
    pub fn after_ok(id: JobId) -> Self {
        Dependency::AfterOk(vec![id])
    }

    /// `None` when there is nothing to wait for.
    pub fn after_any(ids: &[JobId]) -> Option<Self> {
        if ids.is_empty() {
            None
        } else {
            Some(Dependency::AfterAny(ids.to_vec()))
        }
    }

    pub fn job_ids(&self) -> &[JobId] {
        match self {
            Dependency::AfterOk(ids) | Dependency::AfterAny(ids) => ids,
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, ids) = match self {
            Dependency::AfterOk(ids) => ("afterok", ids),
            Dependency::AfterAny(ids) => ("afterany", ids),
        };
        write!(f, "{}", kind)?;
        for id in ids {
            write!(f, ":{}", id)?;
        }
        Ok(())
    }
}
