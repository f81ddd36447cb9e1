//! Configuration for promotions and the hosting-platform client
//!
//! Settings are passed explicitly into each stage; nothing here is global.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{PromoteError, Result};

const DEFAULT_BRANCH: &str = "main";
const DESTINATION_REMOTE: &str = "target";
const EPHEMERAL_PREFIX: &str = "promote-tmp";
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_PLATFORM_URL: &str = "https://gitlab.com";

/// Settings for the promotion pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromoteConfig {
    /// Branch the destination is expected to have before other refs land
    pub default_branch: String,

    /// Name of the remote entry added to the working copy
    pub destination_remote: String,

    /// Prefix for ephemeral local and remote branch names
    pub ephemeral_prefix: String,

    /// History depth for the source clone; `None` fetches everything
    pub clone_depth: Option<i32>,

    /// Accept any TLS certificate (self-signed internal hosts)
    pub insecure_skip_tls: bool,

    /// Budget for the whole operation in seconds; 0 disables it
    pub timeout_secs: u64,
}

impl Default for PromoteConfig {
    fn default() -> Self {
        Self {
            default_branch: DEFAULT_BRANCH.to_string(),
            destination_remote: DESTINATION_REMOTE.to_string(),
            ephemeral_prefix: EPHEMERAL_PREFIX.to_string(),
            clone_depth: Some(1),
            insecure_skip_tls: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl PromoteConfig {
    /// Load configuration from a JSON file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            PromoteError::InvalidRequest(format!(
                "Failed to parse config {}: {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !git2::Reference::is_valid_name(&format!("refs/heads/{}", self.default_branch)) {
            return Err(PromoteError::InvalidRequest(format!(
                "invalid default branch name '{}'",
                self.default_branch
            )));
        }
        if !git2::Remote::is_valid_name(&self.destination_remote) {
            return Err(PromoteError::InvalidRequest(format!(
                "invalid remote name '{}'",
                self.destination_remote
            )));
        }
        if self.ephemeral_prefix.trim().is_empty() {
            return Err(PromoteError::InvalidRequest(
                "ephemeral branch prefix must not be empty".to_string(),
            ));
        }
        if matches!(self.clone_depth, Some(d) if d < 1) {
            return Err(PromoteError::InvalidRequest(
                "clone depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Operation timeout, if one is configured
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Settings for the hosting-platform API client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformConfig {
    pub base_url: String,
    pub insecure_skip_tls: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PLATFORM_URL.to_string(),
            insecure_skip_tls: false,
        }
    }
}
