//! Promotion pipeline: Classify → Clone → Publish → Cleanup

use std::sync::Arc;

use crate::config::PromoteConfig;
use crate::error::{ErrorResponse, PromoteError, Result};
use crate::models::{OperationRequest, Outcome, PromotionReport, Reference, Stage};

use super::cancellation::{CancellationToken, Deadline};
use super::classifier::RefClassifier;
use super::cleanup::cleanup;
use super::clone_stage::clone_reference;
use super::credentials_service::{display_url, RemoteSession};
use super::progress::{ProgressReporter, TracingProgress};
use super::publish_stage::{EphemeralRefs, PublishOutcome, PublishStage};

/// Runs one reference promotion at a time
pub struct Promoter {
    config: PromoteConfig,
    progress: Arc<dyn ProgressReporter>,
    cancellation: CancellationToken,
}

impl Promoter {
    pub fn new(config: PromoteConfig) -> Self {
        Self {
            config,
            progress: Arc::new(TracingProgress),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Token another thread can use to abort in-flight transfers
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn config(&self) -> &PromoteConfig {
        &self.config
    }

    /// Promote the requested reference. Never panics on remote failures;
    /// every failure is reported through [`Outcome::Failed`].
    pub fn promote(&self, request: &OperationRequest) -> PromotionReport {
        tracing::info!(
            "Promoting '{}' from {} to {} as '{}' (on tag conflict: {})",
            request.source_ref(),
            display_url(request.source_url()),
            display_url(request.destination_url()),
            request.destination_ref(),
            request.policy()
        );

        let mut report = PromotionReport {
            outcome: Outcome::Success,
            source: None,
            destination: None,
            default_branch_created: false,
            warnings: Vec::new(),
            workdir: request.workdir().to_path_buf(),
        };

        if let Err(e) = self.run(request, &mut report) {
            tracing::error!("Promotion failed: {}", e);
            report.outcome = Outcome::Failed(ErrorResponse::from(&e));
        }

        match &report.outcome {
            Outcome::Success => self.progress.report(Stage::Publish, "Promotion succeeded"),
            Outcome::Skipped => self.progress.report(Stage::Publish, "Promotion skipped"),
            Outcome::Failed(err) => self.progress.warn(
                err.stage.unwrap_or(Stage::Publish),
                &format!("Promotion failed: {}", err.message),
            ),
        }
        report
    }

    fn run(&self, request: &OperationRequest, report: &mut PromotionReport) -> Result<()> {
        self.config.validate()?;

        let deadline = Deadline::new(self.config.timeout(), self.cancellation.clone());
        let insecure = self.config.insecure_skip_tls;
        if insecure {
            tracing::warn!("TLS certificate validation is disabled for this operation");
        }
        let source_session = RemoteSession::new(request.source_auth(), &deadline, insecure);
        let destination_session =
            RemoteSession::new(request.destination_auth(), &deadline, insecure);

        self.progress.report(
            Stage::Classify,
            &format!("Resolving '{}' on the source", request.source_ref()),
        );
        let source = RefClassifier::new()
            .classify(request.source_url(), request.source_ref(), &source_session)
            .and_then(|reference| require_resolved(reference, request.source_url()))
            .map_err(|e| e.in_stage(Stage::Classify))?;
        report.source = Some(source.clone());
        self.progress.report(Stage::Classify, &format!("Source is {}", source));

        self.progress.report(
            Stage::Clone,
            &format!("Cloning {} into {}", source, request.workdir().display()),
        );
        let working_copy = clone_reference(
            request.source_url(),
            &source,
            request.workdir(),
            self.config.clone_depth,
            &source_session,
        )
        .map_err(|e| e.in_stage(Stage::Clone))?;

        let mut ephemeral = EphemeralRefs::default();
        let published = deadline
            .check()
            .and_then(|()| {
                PublishStage::new(&self.config, self.progress.as_ref()).run(
                    &working_copy,
                    &source,
                    request,
                    &destination_session,
                    &mut ephemeral,
                )
            })
            .map_err(|e| e.in_stage(Stage::Publish));

        // cleanup gets its own budget so an expired deadline does not block it
        let cleanup_deadline = Deadline::new(self.config.timeout(), CancellationToken::new());
        let cleanup_session =
            RemoteSession::new(request.destination_auth(), &cleanup_deadline, insecure);
        report.warnings = cleanup(
            working_copy,
            &ephemeral,
            request.remove_reused_workdir(),
            &self.config,
            &cleanup_session,
            self.progress.as_ref(),
        );

        let published = published?;
        report.default_branch_created = published.default_branch_created;
        report.destination = Some(published.destination);
        report.outcome = match published.outcome {
            PublishOutcome::Published => Outcome::Success,
            PublishOutcome::Skipped => Outcome::Skipped,
        };
        Ok(())
    }
}

fn require_resolved(reference: Reference, url: &str) -> Result<Reference> {
    if reference.is_resolved() {
        Ok(reference)
    } else {
        Err(PromoteError::ReferenceNotFound {
            name: reference.name,
            url: display_url(url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RefKind;

    #[test]
    fn test_require_resolved() {
        let ok = require_resolved(Reference::new("v1", RefKind::Tag), "/src").unwrap();
        assert_eq!(ok.kind, RefKind::Tag);

        let err = require_resolved(Reference::new("v1", RefKind::Unresolved), "/src").unwrap_err();
        assert_eq!(err.code(), "REFERENCE_NOT_FOUND");
    }

    #[test]
    fn test_invalid_config_fails_before_any_remote_call() {
        let config = PromoteConfig {
            clone_depth: Some(0),
            ..PromoteConfig::default()
        };
        let dir = tempfile::TempDir::new().unwrap();
        let request = OperationRequest::builder("/nowhere/src", "v1", "/nowhere/dst")
            .workdir(dir.path().join("wc"))
            .build()
            .unwrap();

        let report = Promoter::new(config).promote(&request);
        assert!(report.outcome.is_failed());
        assert!(report.source.is_none());
        assert!(!dir.path().join("wc").exists());
    }

    #[test]
    fn test_promote_leaves_libgit2_timeouts_alone() {
        let config = PromoteConfig {
            timeout_secs: 7,
            ..PromoteConfig::default()
        };
        let dir = tempfile::TempDir::new().unwrap();
        let request = OperationRequest::builder(
            dir.path().join("missing-src").to_string_lossy(),
            "v1",
            dir.path().join("missing-dst").to_string_lossy(),
        )
        .workdir(dir.path().join("wc"))
        .build()
        .unwrap();

        let report = Promoter::new(config).promote(&request);
        assert!(report.outcome.is_failed());

        let (connect, read) = unsafe {
            (
                git2::opts::get_server_connect_timeout_in_milliseconds().unwrap(),
                git2::opts::get_server_timeout_in_milliseconds().unwrap(),
            )
        };
        assert_ne!(connect, 7000);
        assert_ne!(read, 7000);
    }
}
