//! refpromote - promote a single Git tag or branch between repositories
//!
//! Resolves a reference on a source repository, clones just that reference,
//! and publishes it to a destination under the same or a new name, creating
//! the destination's default branch when the repository is empty.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

#[cfg(test)]
mod test_utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::{PlatformConfig, PromoteConfig};
pub use error::{ErrorResponse, PromoteError, Result};
pub use models::{
    OperationRequest, Outcome, PromotionReport, RefKind, Reference, Stage, TagConflictPolicy,
};
pub use services::Promoter;

/// Install the global tracing subscriber; `RUST_LOG` overrides the default filter
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "refpromote=info,git2=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
