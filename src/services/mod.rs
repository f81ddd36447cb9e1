//! Service layer for refpromote
//!
//! The promotion pipeline stages plus the remote plumbing they share.

pub mod cancellation;
pub mod classifier;
pub mod cleanup;
pub mod clone_stage;
pub mod credentials_service;
pub mod gitlab_service;
pub mod progress;
pub mod promotion;
pub mod publish_stage;
pub mod secret_service;
pub mod transport;
pub mod working_copy;

pub use cancellation::{CancellationToken, Deadline};
pub use classifier::RefClassifier;
pub use credentials_service::{Anonymous, AuthProvider, BasicAuth, RemoteSession};
pub use gitlab_service::GitLabClient;
pub use progress::{ProgressReporter, TracingProgress};
pub use promotion::Promoter;
pub use secret_service::{
    parse_secret_ref, EnvSecretSource, KeyringSecretSource, SecretSource, StaticSecretSource,
};
pub use transport::PushAck;
pub use working_copy::WorkingCopy;
