//! Remote transport helpers: listing, pushing, and error mapping

use std::cell::RefCell;
use std::path::PathBuf;
use std::time::Duration;

use git2::{Direction, ErrorClass, ErrorCode, Oid, PushOptions, Repository};

use super::cancellation::Deadline;
use super::credentials_service::{display_url, RemoteSession};
use crate::error::{PromoteError, Result};
use crate::models::RemoteRef;

/// Error strings a transport emits for pushes that actually landed.
///
/// go-git reports a successful push as failed when it cannot parse the
/// report-status sideband (go-git/go-git#1600). libgit2 has not been seen
/// doing the same; drop entries here once a transport is verified clean.
const PUSH_ACK_FALSE_NEGATIVES: &[&str] = &["decode report-status: unknown channel unpack ok"];

/// Whether a push error is a known false negative for the acknowledgment
pub fn is_push_ack_false_negative(message: &str) -> bool {
    PUSH_ACK_FALSE_NEGATIVES
        .iter()
        .any(|known| message.contains(known))
}

/// What a push did on the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushAck {
    /// The destination ref was created or moved
    Applied,
    /// The destination already had this object id under the ref
    NothingToPush,
}

/// Set libgit2's process-wide connect and read timeouts.
///
/// Call once at startup, before any remote is opened.
pub fn apply_server_timeouts(timeout: Option<Duration>) -> Result<()> {
    let millis = timeout
        .map(|t| t.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(0);

    // SAFETY: these only store an integer in libgit2's global settings. The
    // caller runs this before any thread has opened a transport.
    unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)?;
        git2::opts::set_server_timeout_in_milliseconds(millis)?;
    }
    Ok(())
}

/// True for plain paths and `file://` URLs, which libgit2 serves locally
pub fn is_local_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.scheme() == "file" || parsed.scheme().len() == 1,
        // scp-like `git@host:path` is remote; anything else is a path
        Err(_) => !(url.contains('@') && url.contains(':')),
    }
}

/// Turn a git2 failure against `url` into the error taxonomy
pub fn map_transport_error(url: &str, err: git2::Error, deadline: &Deadline) -> PromoteError {
    let shown = display_url(url);
    let mapped = match (err.code(), err.class()) {
        (ErrorCode::Auth, _) => PromoteError::AuthenticationRejected(shown),
        (_, ErrorClass::Http) if err.message().contains("401") => {
            PromoteError::AuthenticationRejected(shown)
        }
        (ErrorCode::Certificate, _) => PromoteError::Transport {
            url: shown,
            message: format!("TLS certificate rejected: {}", err.message()),
        },
        _ => PromoteError::Transport {
            url: shown,
            message: err.message().to_string(),
        },
    };
    deadline.explain(mapped)
}

/// Filesystem path libgit2 opens for a local URL
fn local_path(url: &str) -> Option<PathBuf> {
    if !is_local_url(url) {
        return None;
    }
    match url::Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "file" => parsed.to_file_path().ok(),
        _ => Some(PathBuf::from(url)),
    }
}

/// Whether the local repository at `url` has nothing to advertise.
///
/// libgit2's local transport returns a null ref array in that case, which
/// `RemoteConnection::list` must not be called on. HEAD is only advertised
/// for fetches.
fn advertises_nothing(url: &str, direction: Direction) -> bool {
    let Some(repo) = local_path(url).and_then(|path| Repository::open(path).ok()) else {
        return false;
    };
    let has_refs = repo
        .references()
        .map(|mut refs| refs.next().is_some())
        .unwrap_or(true);
    let head_advertised = direction == Direction::Fetch && repo.head().is_ok();
    !has_refs && !head_advertised
}

/// Connect `remote` and collect what it advertises
fn advertised_refs(
    remote: &mut git2::Remote<'_>,
    url: &str,
    direction: Direction,
    session: &RemoteSession<'_>,
) -> Result<Vec<RemoteRef>> {
    let connection = remote
        .connect_auth(direction, Some(session.callbacks()), None)
        .map_err(|e| map_transport_error(url, e, session.deadline()))?;

    if advertises_nothing(url, direction) {
        tracing::debug!("{} has no references", display_url(url));
        return Ok(Vec::new());
    }

    let refs = connection
        .list()
        .map_err(|e| map_transport_error(url, e, session.deadline()))?
        .iter()
        .map(|head| RemoteRef {
            name: head.name().to_string(),
            oid: head.oid(),
        })
        .collect::<Vec<_>>();
    Ok(refs)
}

/// List every reference a remote advertises, peeled tag entries included
pub fn list_remote_refs(url: &str, session: &RemoteSession<'_>) -> Result<Vec<RemoteRef>> {
    session.deadline().check()?;
    tracing::debug!("Listing references on {}", display_url(url));

    let mut remote = git2::Remote::create_detached(url)?;
    let refs = advertised_refs(&mut remote, url, Direction::Fetch, session)?;

    tracing::debug!("{} advertised {} references", display_url(url), refs.len());
    Ok(refs)
}

/// Object id the remote currently holds for `refname`, via a push-direction handshake
fn advertised_oid(
    repo: &Repository,
    remote_name: &str,
    refname: &str,
    session: &RemoteSession<'_>,
) -> Result<Option<Oid>> {
    let mut remote = repo.find_remote(remote_name)?;
    let url = remote.url().unwrap_or_default().to_string();
    let oid = advertised_refs(&mut remote, &url, Direction::Push, session)?
        .into_iter()
        .find(|head| head.name == refname)
        .map(|head| head.oid);
    Ok(oid)
}

/// Push local `src` to remote `dst`.
///
/// Reports [`PushAck::NothingToPush`] without sending anything when the
/// destination already holds the same object id under `dst`.
pub fn push_ref(
    repo: &Repository,
    remote_name: &str,
    src: &str,
    dst: &str,
    session: &RemoteSession<'_>,
) -> Result<PushAck> {
    session.deadline().check()?;

    let local_oid = repo.refname_to_id(src)?;
    if advertised_oid(repo, remote_name, dst, session)? == Some(local_oid) {
        tracing::debug!("{} already at {} on {}", dst, local_oid, remote_name);
        return Ok(PushAck::NothingToPush);
    }

    let refspec = format!("{}:{}", src, dst);
    send_refspec(repo, remote_name, &refspec, dst, session)?;
    Ok(PushAck::Applied)
}

/// Delete a branch on the remote
pub fn delete_remote_branch(
    repo: &Repository,
    remote_name: &str,
    branch: &str,
    session: &RemoteSession<'_>,
) -> Result<()> {
    let dst = format!("refs/heads/{}", branch);
    let refspec = format!(":{}", dst);
    send_refspec(repo, remote_name, &refspec, &dst, session)
}

fn send_refspec(
    repo: &Repository,
    remote_name: &str,
    refspec: &str,
    dst: &str,
    session: &RemoteSession<'_>,
) -> Result<()> {
    let mut remote = repo.find_remote(remote_name)?;
    let url = remote.url().unwrap_or_default().to_string();
    tracing::debug!("Pushing {} to {}", refspec, display_url(&url));

    let rejection: RefCell<Option<String>> = RefCell::new(None);

    let push_result = {
        let mut callbacks = session.callbacks();
        callbacks.push_update_reference(|_refname, status| {
            if let Some(msg) = status {
                *rejection.borrow_mut() = Some(msg.to_string());
            }
            Ok(())
        });

        let mut push_opts = PushOptions::new();
        push_opts.remote_callbacks(callbacks);
        remote.push(&[refspec], Some(&mut push_opts))
    };

    if let Err(e) = push_result {
        if is_push_ack_false_negative(e.message()) {
            tracing::warn!(
                "Push of {} reported '{}' but the transport is known to misreport success; treating as pushed",
                dst,
                e.message()
            );
            return Ok(());
        }
        if e.code() == ErrorCode::NotFastForward {
            return Err(PromoteError::PushRejected {
                refname: dst.to_string(),
                message: e.message().to_string(),
            });
        }
        return Err(map_transport_error(&url, e, session.deadline()));
    }

    if let Some(message) = rejection.into_inner() {
        return Err(PromoteError::PushRejected {
            refname: dst.to_string(),
            message,
        });
    }

    Ok(())
}
