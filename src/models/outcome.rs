//! Outcome models

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use super::Reference;
use crate::error::ErrorResponse;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Classify,
    Clone,
    Publish,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Classify => write!(f, "classify"),
            Stage::Clone => write!(f, "clone"),
            Stage::Publish => write!(f, "publish"),
            Stage::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Terminal status of one promotion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success,
    /// The tag already existed and the policy said to skip
    Skipped,
    Failed(ErrorResponse),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// Everything a caller needs to know after a run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionReport {
    pub outcome: Outcome,
    /// Source reference as classified, if classification got that far
    pub source: Option<Reference>,
    /// Reference as published on the destination
    pub destination: Option<Reference>,
    /// True when the destination default branch was created by this run
    pub default_branch_created: bool,
    /// Non-fatal cleanup problems
    pub warnings: Vec<String>,
    pub workdir: PathBuf,
}

impl PromotionReport {
    /// Process exit code: 0 success, 3 skipped, 1 failed
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            Outcome::Success => 0,
            Outcome::Skipped => 3,
            Outcome::Failed(_) => 1,
        }
    }
}
