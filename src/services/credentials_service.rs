//! Git credentials service
//!
//! Auth providers produce transport credentials for one side of a promotion
//! (source or destination). A [`RemoteSession`] turns a provider into git2
//! remote callbacks with progress reporting and deadline checks attached.

use git2::{
    CertificateCheckStatus, Cred, CredentialType, ErrorClass, ErrorCode, FetchOptions,
    RemoteCallbacks,
};

use super::cancellation::Deadline;

/// Username the hosting platform expects alongside a personal access token
pub const TOKEN_USERNAME: &str = "oauth2";

/// Produces credentials for repository operations
pub trait AuthProvider: Send + Sync {
    /// Short label for logs; never the secret itself
    fn kind(&self) -> &'static str;

    /// Produce a credential for the given URL
    fn credential(
        &self,
        url: &str,
        username_from_url: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, git2::Error>;
}

/// No credential; public repositories only
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl AuthProvider for Anonymous {
    fn kind(&self) -> &'static str {
        "anonymous"
    }

    fn credential(
        &self,
        url: &str,
        _username_from_url: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, git2::Error> {
        if allowed.contains(CredentialType::DEFAULT) {
            return Cred::default();
        }
        Err(auth_error(&format!(
            "{} requires authentication but no credential is configured",
            display_url(url)
        )))
    }
}

/// HTTP basic credential: fixed username plus an opaque token
#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    token: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    /// Token auth with the platform's conventional username
    pub fn token(token: impl Into<String>) -> Self {
        Self::new(TOKEN_USERNAME, token)
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("token_len", &self.token.len())
            .finish()
    }
}

impl AuthProvider for BasicAuth {
    fn kind(&self) -> &'static str {
        "basic"
    }

    fn credential(
        &self,
        url: &str,
        _username_from_url: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, git2::Error> {
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            tracing::debug!(
                "Using basic credential for {} (username: {}, token len: {})",
                display_url(url),
                self.username,
                self.token.len()
            );
            return Cred::userpass_plaintext(&self.username, &self.token);
        }
        Err(auth_error(&format!(
            "{} does not accept username/token authentication",
            display_url(url)
        )))
    }
}

fn auth_error(message: &str) -> git2::Error {
    git2::Error::new(ErrorCode::Auth, ErrorClass::Http, message)
}

/// Credential and transport settings for talking to one remote
#[derive(Clone, Copy)]
pub struct RemoteSession<'a> {
    auth: &'a dyn AuthProvider,
    deadline: &'a Deadline,
    insecure_skip_tls: bool,
}

impl<'a> RemoteSession<'a> {
    pub fn new(auth: &'a dyn AuthProvider, deadline: &'a Deadline, insecure_skip_tls: bool) -> Self {
        Self {
            auth,
            deadline,
            insecure_skip_tls,
        }
    }

    pub fn deadline(&self) -> &'a Deadline {
        self.deadline
    }

    /// Remote callbacks with credential, certificate and progress support
    ///
    /// The callbacks may be shorter-lived than the session so callers can
    /// attach closures that borrow local state.
    pub fn callbacks<'cb>(&self) -> RemoteCallbacks<'cb>
    where
        'a: 'cb,
    {
        let auth = self.auth;
        let mut attempts = 0u32;

        let mut callbacks = RemoteCallbacks::new();

        callbacks.credentials(move |url, username_from_url, allowed_types| {
            tracing::debug!(
                "Credential callback: url={}, username={:?}, allowed={:?}, provider={}",
                display_url(url),
                username_from_url,
                allowed_types,
                auth.kind()
            );

            // libgit2 keeps asking while the server answers 401
            attempts += 1;
            if attempts > 1 {
                return Err(auth_error(&format!(
                    "credentials rejected by {}",
                    display_url(url)
                )));
            }
            auth.credential(url, username_from_url, allowed_types)
        });

        if self.insecure_skip_tls {
            callbacks.certificate_check(|_cert, host| {
                tracing::debug!("Skipping TLS certificate validation for {}", host);
                Ok(CertificateCheckStatus::CertificateOk)
            });
        }

        let deadline = self.deadline;
        callbacks.transfer_progress(move |stats| {
            let received = stats.received_objects();
            let total = stats.total_objects();

            if total > 0 {
                let percent = (received as f64 / total as f64) * 100.0;
                tracing::debug!(
                    "Transfer progress: {}/{} objects ({:.1}%), {} bytes",
                    received,
                    total,
                    percent,
                    stats.received_bytes()
                );
            }

            deadline.should_continue()
        });

        callbacks.sideband_progress(move |data| {
            if let Ok(msg) = std::str::from_utf8(data) {
                let msg = msg.trim();
                if !msg.is_empty() {
                    tracing::info!("Remote: {}", msg);
                }
            }
            deadline.should_continue()
        });

        callbacks.push_transfer_progress(|current, total, bytes| {
            if total > 0 {
                let percent = (current as f64 / total as f64) * 100.0;
                tracing::debug!(
                    "Push progress: {}/{} objects ({:.1}%), {} bytes",
                    current,
                    total,
                    percent,
                    bytes
                );
            }
        });

        callbacks
    }

    /// Fetch options with credential and progress callbacks
    pub fn fetch_options<'cb>(&self) -> FetchOptions<'cb>
    where
        'a: 'cb,
    {
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(self.callbacks());
        fetch_opts
    }
}

/// URL safe for logs: any password in the userinfo is masked
pub fn display_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}
