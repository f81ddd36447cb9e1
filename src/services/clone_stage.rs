//! Clone stage: shallow, single-reference materialization of the source

use std::path::Path;

use git2::AutotagOption;

use crate::error::{PromoteError, Result};
use crate::models::Reference;

use super::credentials_service::{display_url, RemoteSession};
use super::transport::{is_local_url, map_transport_error};
use super::working_copy::{WorkingCopy, SOURCE_REMOTE};

/// Materialize `reference` from `url` into `workdir`.
///
/// An existing repository at `workdir` is reused rather than re-cloned, but
/// the requested reference is always fetched into it again.
pub fn clone_reference(
    url: &str,
    reference: &Reference,
    workdir: &Path,
    depth: Option<i32>,
    session: &RemoteSession<'_>,
) -> Result<WorkingCopy> {
    session.deadline().check()?;

    let working_copy = if WorkingCopy::is_valid_repo(workdir) {
        tracing::warn!(
            "{} already holds a repository; reusing it instead of cloning",
            workdir.display()
        );
        WorkingCopy::open_existing(workdir)?
    } else {
        if workdir.exists() && std::fs::read_dir(workdir)?.next().is_some() {
            return Err(PromoteError::InvalidRequest(format!(
                "{} exists, is not empty and is not a git repository",
                workdir.display()
            )));
        }
        tracing::info!(
            "Cloning {} from {} into {}",
            reference,
            display_url(url),
            workdir.display()
        );
        WorkingCopy::init(workdir)?
    };

    match fetch_into(&working_copy, url, reference, depth, session) {
        Ok(()) => Ok(working_copy),
        Err(e) => {
            if !working_copy.is_reused() {
                if let Err(rm) = std::fs::remove_dir_all(workdir) {
                    tracing::warn!(
                        "Failed to remove partial clone at {}: {}",
                        workdir.display(),
                        rm
                    );
                }
            }
            Err(e)
        }
    }
}

fn fetch_into(
    working_copy: &WorkingCopy,
    url: &str,
    reference: &Reference,
    depth: Option<i32>,
    session: &RemoteSession<'_>,
) -> Result<()> {
    working_copy.ensure_remote(SOURCE_REMOTE, url)?;
    let refspec = WorkingCopy::fetch_refspec(reference)?;

    let mut fetch_opts = session.fetch_options();
    fetch_opts.download_tags(AutotagOption::None);
    match depth {
        // the local transport cannot negotiate shallow history
        Some(_) if is_local_url(url) => {
            tracing::debug!("Local source {}; fetching full history", url)
        }
        Some(depth) => {
            fetch_opts.depth(depth);
        }
        None => {}
    }

    let mut remote = working_copy.repo().find_remote(SOURCE_REMOTE)?;
    remote
        .fetch(&[refspec.as_str()], Some(&mut fetch_opts), Some("refpromote: fetch"))
        .map_err(|e| map_transport_error(url, e, session.deadline()))?;

    // the reference may have vanished between classification and fetch
    let commit = working_copy.resolve_commit(reference).map_err(|_| {
        PromoteError::ReferenceNotFound {
            name: reference.name.clone(),
            url: display_url(url),
        }
    })?;
    working_copy.checkout_detached(commit)?;

    tracing::info!(
        "Fetched {} at {} into {}",
        reference,
        commit,
        working_copy.path().display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RefKind;
    use crate::services::cancellation::Deadline;
    use crate::services::credentials_service::Anonymous;
    use crate::test_utils::TestRepo;
    use tempfile::TempDir;

    #[test]
    fn test_clone_tag_only_fetches_that_tag() {
        let source = TestRepo::with_initial_commit();
        let c1 = source.create_commit("release", &[("app.txt", "1")]);
        source.create_tag("v0.0.1");
        source.create_commit("after release", &[("app.txt", "2")]);
        source.create_tag("v0.0.2");

        let dir = TempDir::new().unwrap();
        let workdir = dir.path().join("wc");
        let deadline = Deadline::unbounded();
        let session = RemoteSession::new(&Anonymous, &deadline, false);

        let tag = Reference::new("v0.0.1", RefKind::Tag);
        let wc = clone_reference(&source.path_str(), &tag, &workdir, Some(1), &session).unwrap();

        assert!(!wc.is_reused());
        assert_eq!(wc.resolve_commit(&tag).unwrap(), c1);
        assert!(wc.repo().find_reference("refs/tags/v0.0.2").is_err());
        assert!(workdir.join("app.txt").exists());
    }

    #[test]
    fn test_clone_branch_lands_under_remote_namespace() {
        let source = TestRepo::with_initial_commit();
        source.create_branch("feature");
        let head = source.head_oid();

        let dir = TempDir::new().unwrap();
        let deadline = Deadline::unbounded();
        let session = RemoteSession::new(&Anonymous, &deadline, false);

        let branch = Reference::new("feature", RefKind::Branch);
        let wc = clone_reference(&source.path_str(), &branch, dir.path(), None, &session).unwrap();

        let local = wc
            .repo()
            .find_reference("refs/remotes/origin/feature")
            .unwrap();
        assert_eq!(local.target(), Some(head));
    }

    #[test]
    fn test_reuse_existing_clone_refetches() {
        let source = TestRepo::with_initial_commit();
        source.create_tag("v1");

        let dir = TempDir::new().unwrap();
        let deadline = Deadline::unbounded();
        let session = RemoteSession::new(&Anonymous, &deadline, false);

        let v1 = Reference::new("v1", RefKind::Tag);
        clone_reference(&source.path_str(), &v1, dir.path(), None, &session).unwrap();

        let c2 = source.create_commit("next", &[("b.txt", "b")]);
        source.create_tag("v2");

        let v2 = Reference::new("v2", RefKind::Tag);
        let wc = clone_reference(&source.path_str(), &v2, dir.path(), None, &session).unwrap();
        assert!(wc.is_reused());
        assert_eq!(wc.resolve_commit(&v2).unwrap(), c2);
    }

    #[test]
    fn test_missing_reference_removes_fresh_workdir() {
        let source = TestRepo::with_initial_commit();
        let dir = TempDir::new().unwrap();
        let workdir = dir.path().join("wc");
        let deadline = Deadline::unbounded();
        let session = RemoteSession::new(&Anonymous, &deadline, false);

        let ghost = Reference::new("ghost", RefKind::Tag);
        let result = clone_reference(&source.path_str(), &ghost, &workdir, None, &session);

        assert!(result.is_err());
        assert!(!workdir.exists());
    }

    #[test]
    fn test_non_repo_directory_is_rejected() {
        let source = TestRepo::with_initial_commit();
        source.create_tag("v1");
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("stray.txt"), "x").unwrap();

        let deadline = Deadline::unbounded();
        let session = RemoteSession::new(&Anonymous, &deadline, false);
        let v1 = Reference::new("v1", RefKind::Tag);

        let err = match clone_reference(&source.path_str(), &v1, dir.path(), None, &session) {
            Err(e) => e,
            Ok(_) => panic!("a directory with stray files must not be cloned into"),
        };
        assert_eq!(err.code(), "INVALID_REQUEST");
        assert!(dir.path().join("stray.txt").exists());
    }
}
