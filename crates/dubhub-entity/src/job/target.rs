//! Job targets and worker classes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which population of workers may claim a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobTarget {
    /// Cloud workers only.
    Cloud,
    /// Local PC workers only.
    Pc,
    /// Any worker.
    Any,
}

impl JobTarget {
    /// Return the target as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Pc => "pc",
            Self::Any => "any",
        }
    }

    /// Whether clients may request this target when creating a job.
    ///
    /// `any` is only assigned internally.
    pub fn is_client_selectable(&self) -> bool {
        !matches!(self, Self::Any)
    }
}

impl fmt::Display for JobTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloud" => Ok(Self::Cloud),
            "pc" => Ok(Self::Pc),
            "any" => Ok(Self::Any),
            other => Err(format!("Unknown job target: {other}")),
        }
    }
}

/// The population a worker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerClass {
    /// Cloud-hosted worker (includes the in-process fallback by default).
    Cloud,
    /// Local PC worker.
    Pc,
}

impl WorkerClass {
    /// Targets a worker of this class may claim.
    pub fn allowed_targets(&self) -> Vec<JobTarget> {
        match self {
            Self::Cloud => vec![JobTarget::Cloud, JobTarget::Any],
            Self::Pc => vec![JobTarget::Pc, JobTarget::Any],
        }
    }

    /// Whether a worker of this class may run a job with `target`.
    pub fn can_run(&self, target: JobTarget) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Return the class as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Pc => "pc",
        }
    }
}

impl fmt::Display for WorkerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WorkerClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloud" => Ok(Self::Cloud),
            "pc" => Ok(Self::Pc),
            other => Err(format!("Unknown worker class: {other}")),
        }
    }
}
