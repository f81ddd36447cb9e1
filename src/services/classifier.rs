//! Reference classification against a remote's advertised refs

use crate::error::Result;
use crate::models::{RefKind, Reference, RemoteRef};

use super::credentials_service::{display_url, RemoteSession};
use super::transport;

/// Decide what `name` is from a remote's reference listing.
///
/// A tag match wins over a branch match with the same short name.
pub fn classify_listing(refs: &[RemoteRef], name: &str) -> RefKind {
    let tag = format!("refs/tags/{}", name);
    let peeled_tag = format!("{}^{{}}", tag);
    let branch = format!("refs/heads/{}", name);

    if refs.iter().any(|r| r.name == tag || r.name == peeled_tag) {
        RefKind::Tag
    } else if refs.iter().any(|r| r.name == branch) {
        RefKind::Branch
    } else {
        RefKind::Unresolved
    }
}

/// Stateless classifier; every call queries the remote afresh
#[derive(Debug, Clone, Copy, Default)]
pub struct RefClassifier;

impl RefClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify `name` on the remote at `url`
    pub fn classify(&self, url: &str, name: &str, session: &RemoteSession<'_>) -> Result<Reference> {
        tracing::info!("Fetching reference list from {}", display_url(url));
        let refs = transport::list_remote_refs(url, session)?;
        let kind = classify_listing(&refs, name);

        match kind {
            RefKind::Unresolved => tracing::info!(
                "Reference '{}' is neither a tag nor a branch on {}",
                name,
                display_url(url)
            ),
            kind => tracing::info!(
                "Reference '{}' exists on {} as a {}",
                name,
                display_url(url),
                kind
            ),
        }

        Ok(Reference::new(name, kind))
    }

    /// Whether `refs/heads/<branch>` exists on the remote
    pub fn branch_exists(&self, url: &str, branch: &str, session: &RemoteSession<'_>) -> Result<bool> {
        let full = format!("refs/heads/{}", branch);
        let refs = transport::list_remote_refs(url, session)?;
        Ok(refs.iter().any(|r| r.name == full))
    }
}
