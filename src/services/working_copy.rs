//! Local working copy used to ferry objects between remotes

use std::path::{Path, PathBuf};

use git2::{BranchType, Oid, Repository};

use crate::error::{PromoteError, Result};
use crate::models::{RefKind, Reference};

/// Name of the remote pointing back at the source repository
pub const SOURCE_REMOTE: &str = "origin";

/// A minimal clone of one source reference
pub struct WorkingCopy {
    path: PathBuf,
    repo: Repository,
    reused: bool,
}

impl WorkingCopy {
    /// Initialize a new repository at `path`
    pub fn init(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let repo = Repository::init(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            repo,
            reused: false,
        })
    }

    /// Open a repository that already exists at `path`
    pub fn open_existing(path: &Path) -> Result<Self> {
        let repo = Repository::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            repo,
            reused: true,
        })
    }

    /// Check if a path is a valid git repository
    pub fn is_valid_repo(path: &Path) -> bool {
        Repository::open(path).is_ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// True when the directory held a repository before this run
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    /// Where a fetched source reference lands locally
    pub fn local_ref_name(reference: &Reference) -> Result<String> {
        match reference.kind {
            RefKind::Tag => Ok(format!("refs/tags/{}", reference.name)),
            RefKind::Branch => Ok(format!(
                "refs/remotes/{}/{}",
                SOURCE_REMOTE, reference.name
            )),
            RefKind::Unresolved => Err(PromoteError::ReferenceNotFound {
                name: reference.name.clone(),
                url: SOURCE_REMOTE.to_string(),
            }),
        }
    }

    /// Fetch refspec that materializes only `reference`
    pub fn fetch_refspec(reference: &Reference) -> Result<String> {
        let local = Self::local_ref_name(reference)?;
        let remote = reference
            .full_name()
            .ok_or_else(|| PromoteError::InvalidRequest("unresolved reference".to_string()))?;
        Ok(format!("+{}:{}", remote, local))
    }

    /// Commit the fetched source reference points at (annotated tags peeled)
    pub fn resolve_commit(&self, reference: &Reference) -> Result<Oid> {
        let local = Self::local_ref_name(reference)?;
        let commit = self
            .repo
            .find_reference(&local)
            .map_err(|_| PromoteError::ReferenceNotFound {
                name: reference.name.clone(),
                url: self.path.display().to_string(),
            })?
            .peel_to_commit()?;
        Ok(commit.id())
    }

    /// Point remote `name` at `url`, reusing an existing entry
    pub fn ensure_remote(&self, name: &str, url: &str) -> Result<()> {
        match self.repo.find_remote(name) {
            Ok(remote) => {
                if remote.url() != Some(url) {
                    tracing::info!("Remote '{}' exists; updating its URL", name);
                    self.repo.remote_set_url(name, url)?;
                } else {
                    tracing::info!("Remote '{}' already configured, reusing it", name);
                }
            }
            Err(_) => {
                self.repo.remote(name, url)?;
            }
        }
        Ok(())
    }

    /// Create (or move) local branch `name` at `oid`
    pub fn create_branch(&self, name: &str, oid: Oid) -> Result<()> {
        let commit = self.repo.find_commit(oid)?;
        self.repo.branch(name, &commit, true)?;
        Ok(())
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        let mut branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| PromoteError::InvalidRequest(format!("no local branch '{}'", name)))?;
        branch.delete()?;
        Ok(())
    }

    /// Number of modified or untracked files in the work tree
    pub fn local_changes(&self) -> Result<usize> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true).include_ignored(false);
        Ok(self.repo.statuses(Some(&mut opts))?.len())
    }

    /// Detach HEAD at `oid` and force its tree out over the work tree
    pub fn checkout_detached(&self, oid: Oid) -> Result<()> {
        if self.reused {
            tracing::warn!(
                "Force checkout of {} into reused working copy {}; {} local change(s) will be overwritten",
                oid,
                self.path.display(),
                self.local_changes()?
            );
        }
        self.repo.set_head_detached(oid)?;
        self.repo
            .checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;
        Ok(())
    }
}
