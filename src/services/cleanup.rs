//! Cleanup: best-effort removal of transient local and remote state
//!
//! Nothing here can fail the operation. Problems come back as warnings.

use crate::config::PromoteConfig;
use crate::models::Stage;

use super::credentials_service::RemoteSession;
use super::progress::ProgressReporter;
use super::publish_stage::EphemeralRefs;
use super::transport::delete_remote_branch;
use super::working_copy::WorkingCopy;

/// Remove ephemeral branches and, unless it is a kept reused clone, the working copy
pub fn cleanup(
    working_copy: WorkingCopy,
    ephemeral: &EphemeralRefs,
    remove_reused_workdir: bool,
    config: &PromoteConfig,
    session: &RemoteSession<'_>,
    progress: &dyn ProgressReporter,
) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut warn = |message: String| {
        progress.warn(Stage::Cleanup, &message);
        warnings.push(message);
    };

    if let Some(branch) = &ephemeral.local_branch {
        match working_copy.delete_branch(branch) {
            Ok(()) => progress.report(
                Stage::Cleanup,
                &format!("Deleted local branch {}", branch),
            ),
            Err(e) => warn(format!(
                "Could not delete local branch {}: {}",
                branch, e
            )),
        }
    }

    if let Some(branch) = &ephemeral.remote_branch {
        match delete_remote_branch(
            working_copy.repo(),
            &config.destination_remote,
            branch,
            session,
        ) {
            Ok(()) => progress.report(
                Stage::Cleanup,
                &format!("Deleted temporary remote branch {}", branch),
            ),
            Err(e) => warn(format!(
                "Could not delete temporary remote branch {} (left on the destination): {}",
                branch, e
            )),
        }
    }

    let path = working_copy.path().to_path_buf();
    let remove = !working_copy.is_reused() || remove_reused_workdir;
    // release the repository handle before deleting its directory
    drop(working_copy);

    if remove {
        match std::fs::remove_dir_all(&path) {
            Ok(()) => progress.report(
                Stage::Cleanup,
                &format!("Removed working copy {}", path.display()),
            ),
            Err(e) => warn(format!(
                "Could not remove working copy {}; delete it manually: {}",
                path.display(),
                e
            )),
        }
    } else {
        progress.report(
            Stage::Cleanup,
            &format!("Keeping reused working copy {}", path.display()),
        );
    }

    warnings
}
