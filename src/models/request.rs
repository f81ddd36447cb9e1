//! Operation request models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;

use crate::error::{PromoteError, Result};
use crate::services::credentials_service::{Anonymous, AuthProvider};

/// What to do when the destination already has the tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagConflictPolicy {
    #[default]
    Error,
    Skip,
}

impl FromStr for TagConflictPolicy {
    type Err = PromoteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(TagConflictPolicy::Error),
            "skip" => Ok(TagConflictPolicy::Skip),
            other => Err(PromoteError::InvalidRequest(format!(
                "unknown tag conflict policy '{}' (expected 'error' or 'skip')",
                other
            ))),
        }
    }
}

impl fmt::Display for TagConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagConflictPolicy::Error => write!(f, "error"),
            TagConflictPolicy::Skip => write!(f, "skip"),
        }
    }
}

/// Immutable input for one promotion
#[derive(Clone)]
pub struct OperationRequest {
    source_url: String,
    source_ref: String,
    source_auth: Arc<dyn AuthProvider>,
    destination_url: String,
    destination_ref: String,
    destination_auth: Arc<dyn AuthProvider>,
    workdir: PathBuf,
    policy: TagConflictPolicy,
    remove_reused_workdir: bool,
}

impl OperationRequest {
    pub fn builder(
        source_url: impl Into<String>,
        source_ref: impl Into<String>,
        destination_url: impl Into<String>,
    ) -> OperationRequestBuilder {
        OperationRequestBuilder {
            source_url: source_url.into(),
            source_ref: source_ref.into(),
            destination_url: destination_url.into(),
            destination_ref: None,
            source_auth: None,
            destination_auth: None,
            workdir: None,
            policy: TagConflictPolicy::default(),
            remove_reused_workdir: false,
        }
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn source_ref(&self) -> &str {
        &self.source_ref
    }

    pub fn source_auth(&self) -> &dyn AuthProvider {
        self.source_auth.as_ref()
    }

    pub fn destination_url(&self) -> &str {
        &self.destination_url
    }

    /// Destination name; equals the source name unless overridden
    pub fn destination_ref(&self) -> &str {
        &self.destination_ref
    }

    pub fn destination_auth(&self) -> &dyn AuthProvider {
        self.destination_auth.as_ref()
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn policy(&self) -> TagConflictPolicy {
        self.policy
    }

    pub fn remove_reused_workdir(&self) -> bool {
        self.remove_reused_workdir
    }
}

impl fmt::Debug for OperationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRequest")
            .field("source_url", &self.source_url)
            .field("source_ref", &self.source_ref)
            .field("source_auth", &self.source_auth.kind())
            .field("destination_url", &self.destination_url)
            .field("destination_ref", &self.destination_ref)
            .field("destination_auth", &self.destination_auth.kind())
            .field("workdir", &self.workdir)
            .field("policy", &self.policy)
            .field("remove_reused_workdir", &self.remove_reused_workdir)
            .finish()
    }
}

/// Builder for [`OperationRequest`]
pub struct OperationRequestBuilder {
    source_url: String,
    source_ref: String,
    destination_url: String,
    destination_ref: Option<String>,
    source_auth: Option<Arc<dyn AuthProvider>>,
    destination_auth: Option<Arc<dyn AuthProvider>>,
    workdir: Option<PathBuf>,
    policy: TagConflictPolicy,
    remove_reused_workdir: bool,
}

impl OperationRequestBuilder {
    /// Publish under a different name on the destination
    pub fn destination_ref(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.destination_ref = Some(name);
        }
        self
    }

    pub fn source_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.source_auth = Some(auth);
        self
    }

    pub fn destination_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.destination_auth = Some(auth);
        self
    }

    pub fn workdir(mut self, path: impl Into<PathBuf>) -> Self {
        self.workdir = Some(path.into());
        self
    }

    pub fn policy(mut self, policy: TagConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Also delete a pre-existing working copy that was reused
    pub fn remove_reused_workdir(mut self, remove: bool) -> Self {
        self.remove_reused_workdir = remove;
        self
    }

    pub fn build(self) -> Result<OperationRequest> {
        if self.source_url.trim().is_empty() {
            return Err(PromoteError::InvalidRequest(
                "source URL is required".to_string(),
            ));
        }
        if self.destination_url.trim().is_empty() {
            return Err(PromoteError::InvalidRequest(
                "destination URL is required".to_string(),
            ));
        }
        if self.source_ref.trim().is_empty() {
            return Err(PromoteError::InvalidRequest(
                "source reference name is required".to_string(),
            ));
        }
        for name in std::iter::once(&self.source_ref).chain(self.destination_ref.as_ref()) {
            if !git2::Reference::is_valid_name(&format!("refs/heads/{}", name)) {
                return Err(PromoteError::InvalidRequest(format!(
                    "'{}' is not a valid reference name",
                    name
                )));
            }
        }

        let destination_ref = self
            .destination_ref
            .unwrap_or_else(|| self.source_ref.clone());
        let workdir = self.workdir.unwrap_or_else(default_workdir);

        Ok(OperationRequest {
            source_url: self.source_url,
            source_ref: self.source_ref,
            source_auth: self.source_auth.unwrap_or_else(|| Arc::new(Anonymous)),
            destination_url: self.destination_url,
            destination_ref,
            destination_auth: self.destination_auth.unwrap_or_else(|| Arc::new(Anonymous)),
            workdir,
            policy: self.policy,
            remove_reused_workdir: self.remove_reused_workdir,
        })
    }
}

/// A fresh directory name under the system temp dir
fn default_workdir() -> PathBuf {
    let suffix: u32 = rand::thread_rng().gen_range(0..100_000);
    std::env::temp_dir().join(format!("refpromote-{}", suffix))
}
