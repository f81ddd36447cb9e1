//! Publish stage: upload the source commit graph, then publish the reference
//!
//! The destination may or may not have its default branch yet:
//!
//! ```text
//! ResolvingDestination
//!   ├─ default branch exists  → UploadingViaTempBranch   (push to a unique ephemeral branch)
//!   └─ default branch missing → InitializingDefaultBranch (push straight onto it)
//! PublishingReference
//!   ├─ tag already on destination → ConflictPolicyApplied (nothing pushed)
//!   ├─ pushed                     → Done
//!   └─ nothing to push            → re-classify destination → ConflictPolicyApplied
//! ```
//!
//! An existing destination tag is never moved, whatever object it names.

use std::fmt;

use chrono::Utc;
use rand::Rng;

use crate::config::PromoteConfig;
use crate::error::{PromoteError, Result};
use crate::models::{OperationRequest, RefKind, Reference, Stage, TagConflictPolicy};

use super::classifier::RefClassifier;
use super::credentials_service::RemoteSession;
use super::progress::ProgressReporter;
use super::transport::{push_ref, PushAck};
use super::working_copy::WorkingCopy;

/// States of the publish state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    ResolvingDestination,
    UploadingViaTempBranch,
    InitializingDefaultBranch,
    PublishingReference,
    Done,
    ConflictPolicyApplied,
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublishState::ResolvingDestination => "resolving destination",
            PublishState::UploadingViaTempBranch => "uploading via temporary branch",
            PublishState::InitializingDefaultBranch => "initializing default branch",
            PublishState::PublishingReference => "publishing reference",
            PublishState::Done => "done",
            PublishState::ConflictPolicyApplied => "conflict policy applied",
        };
        f.write_str(name)
    }
}

/// Disposable branches created while publishing; Cleanup removes them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EphemeralRefs {
    pub local_branch: Option<String>,
    /// Only set when the temporary-branch upload path ran
    pub remote_branch: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    /// Tag already present and the policy is Skip
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub outcome: PublishOutcome,
    pub destination: Reference,
    pub default_branch_created: bool,
}

/// Unique branch name for one run: prefix, UTC timestamp, random suffix
pub fn ephemeral_branch_name(prefix: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!(
        "{}-{}-{:06x}",
        prefix,
        Utc::now().format("%Y%m%d%H%M%S"),
        suffix
    )
}

/// Full ref name to publish `destination` under
fn destination_refname(destination: &Reference) -> Result<String> {
    destination.full_name().ok_or_else(|| {
        PromoteError::InvalidRequest(format!("{} has no destination ref name", destination))
    })
}

pub struct PublishStage<'a> {
    config: &'a PromoteConfig,
    classifier: RefClassifier,
    progress: &'a dyn ProgressReporter,
}

impl<'a> PublishStage<'a> {
    pub fn new(config: &'a PromoteConfig, progress: &'a dyn ProgressReporter) -> Self {
        Self {
            config,
            classifier: RefClassifier::new(),
            progress,
        }
    }

    fn enter(&self, state: PublishState) {
        tracing::debug!("Publish state -> {}", state);
        self.progress.report(Stage::Publish, &format!("Publish: {}", state));
    }

    /// Run the state machine. `ephemeral` is filled in as branches are
    /// created so Cleanup can remove them even if a later step fails.
    pub fn run(
        &self,
        working_copy: &WorkingCopy,
        source: &Reference,
        request: &OperationRequest,
        session: &RemoteSession<'_>,
        ephemeral: &mut EphemeralRefs,
    ) -> Result<PublishResult> {
        let repo = working_copy.repo();
        let remote_name = self.config.destination_remote.as_str();
        let destination_url = request.destination_url();

        let commit = working_copy.resolve_commit(source)?;
        let local_branch = ephemeral_branch_name(&self.config.ephemeral_prefix);
        working_copy.create_branch(&local_branch, commit)?;
        ephemeral.local_branch = Some(local_branch.clone());
        self.progress.report(
            Stage::Publish,
            &format!("Created local branch {} at {}", local_branch, commit),
        );

        working_copy.ensure_remote(remote_name, destination_url)?;
        let local_src = format!("refs/heads/{}", local_branch);

        self.enter(PublishState::ResolvingDestination);
        let default_branch = self.config.default_branch.as_str();
        let default_exists =
            self.classifier
                .branch_exists(destination_url, default_branch, session)?;

        let default_branch_created = if default_exists {
            self.enter(PublishState::UploadingViaTempBranch);
            let remote_branch = local_branch.clone();
            push_ref(
                repo,
                remote_name,
                &local_src,
                &format!("refs/heads/{}", remote_branch),
                session,
            )?;
            ephemeral.remote_branch = Some(remote_branch.clone());
            self.progress.report(
                Stage::Publish,
                &format!("Uploaded objects via temporary branch {}", remote_branch),
            );
            false
        } else {
            self.enter(PublishState::InitializingDefaultBranch);
            let ack = push_ref(
                repo,
                remote_name,
                &local_src,
                &format!("refs/heads/{}", default_branch),
                session,
            )?;
            self.progress.report(
                Stage::Publish,
                &format!("Initialized default branch {} at {}", default_branch, commit),
            );
            ack == PushAck::Applied
        };

        self.enter(PublishState::PublishingReference);
        let destination = source.renamed(request.destination_ref());
        let src = match source.kind {
            RefKind::Tag => format!("refs/tags/{}", source.name),
            RefKind::Branch => local_src,
            RefKind::Unresolved => {
                return Err(PromoteError::ReferenceNotFound {
                    name: source.name.clone(),
                    url: request.source_url().to_string(),
                })
            }
        };
        let dst = destination_refname(&destination)?;

        if destination.kind == RefKind::Tag {
            let existing = self
                .classifier
                .classify(destination_url, &destination.name, session)?;
            if existing.kind == RefKind::Tag {
                tracing::info!("{} already exists on the destination; not pushing", dst);
                let outcome = self.apply_conflict_policy(&destination, request)?;
                return Ok(PublishResult {
                    outcome,
                    destination,
                    default_branch_created,
                });
            }
        }

        let outcome = match push_ref(repo, remote_name, &src, &dst, session)? {
            PushAck::Applied => {
                self.enter(PublishState::Done);
                self.progress
                    .report(Stage::Publish, &format!("Published {}", destination));
                PublishOutcome::Published
            }
            PushAck::NothingToPush => {
                self.confirm_present(&destination, &dst, request, session)?;
                self.apply_conflict_policy(&destination, request)?
            }
        };

        Ok(PublishResult {
            outcome,
            destination,
            default_branch_created,
        })
    }

    /// The destination reported nothing to push; re-classify to make sure
    /// the name really is there as the expected kind.
    fn confirm_present(
        &self,
        destination: &Reference,
        refname: &str,
        request: &OperationRequest,
        session: &RemoteSession<'_>,
    ) -> Result<()> {
        let url = request.destination_url();
        let confirmed = self.classifier.classify(url, &destination.name, session)?;

        let present = confirmed.kind == destination.kind
            || (destination.kind == RefKind::Branch
                && self.classifier.branch_exists(url, &destination.name, session)?);
        if present {
            Ok(())
        } else {
            Err(PromoteError::PushRejected {
                refname: refname.to_string(),
                message: format!(
                    "destination reported nothing to push but shows the name as {}",
                    confirmed.kind
                ),
            })
        }
    }

    /// The destination already has the name. Tags follow the request's
    /// policy; a branch already at the source commit needs no change.
    fn apply_conflict_policy(
        &self,
        destination: &Reference,
        request: &OperationRequest,
    ) -> Result<PublishOutcome> {
        self.enter(PublishState::ConflictPolicyApplied);
        match destination.kind {
            RefKind::Tag => match request.policy() {
                TagConflictPolicy::Error => Err(PromoteError::ReferenceExists {
                    kind: RefKind::Tag,
                    name: destination.name.clone(),
                }),
                TagConflictPolicy::Skip => {
                    self.progress.report(
                        Stage::Publish,
                        &format!("{} already exists on the destination; skipped", destination),
                    );
                    Ok(PublishOutcome::Skipped)
                }
            },
            _ => {
                self.progress.report(
                    Stage::Publish,
                    &format!("{} is already up to date on the destination", destination),
                );
                Ok(PublishOutcome::Published)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ephemeral_names_are_unique_and_valid() {
        let a = ephemeral_branch_name("promote-tmp");
        let b = ephemeral_branch_name("promote-tmp");
        assert!(a.starts_with("promote-tmp-"));
        assert_ne!(a, b);
        assert!(git2::Branch::name_is_valid(&a).unwrap());
    }

    #[test]
    fn test_destination_refname() {
        assert_eq!(
            destination_refname(&Reference::new("v1", RefKind::Tag)).unwrap(),
            "refs/tags/v1"
        );
        assert_eq!(
            destination_refname(&Reference::new("release", RefKind::Branch)).unwrap(),
            "refs/heads/release"
        );
        let err = destination_refname(&Reference::new("v1", RefKind::Unresolved)).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(
            PublishState::UploadingViaTempBranch.to_string(),
            "uploading via temporary branch"
        );
    }
}
