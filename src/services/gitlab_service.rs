//! GitLab API client for project discovery and forking
//!
//! Only what promotion workflows need: list a group's projects, find one by
//! name, fork one into another namespace.

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Serialize;

use crate::config::PlatformConfig;
use crate::error::{PromoteError, Result};
use crate::models::{Project, Visibility};

const GITLAB_API_VERSION: &str = "v4";
const PAGE_SIZE: &str = "100";
const NEXT_PAGE_HEADER: &str = "x-next-page";

fn build_api_url(instance_url: &str, path: &str) -> String {
    let base = instance_url.trim_end_matches('/');
    format!("{}/api/{}/{}", base, GITLAB_API_VERSION, path)
}

fn url_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Page number from `X-Next-Page`; missing or empty means last page
fn next_page(headers: &HeaderMap) -> Option<u32> {
    headers
        .get(NEXT_PAGE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse().ok())
}

fn fork_error(status: StatusCode, project_id: u64, namespace: &str, body: &str) -> PromoteError {
    let message = match status {
        StatusCode::NOT_FOUND => format!(
            "project {} or namespace '{}' not found, or not visible with this token",
            project_id, namespace
        ),
        StatusCode::FORBIDDEN => format!(
            "token is not allowed to fork project {} into '{}'",
            project_id, namespace
        ),
        StatusCode::CONFLICT => format!(
            "a project with the same name or path already exists in '{}'",
            namespace
        ),
        _ => format!("fork of project {} failed with {}: {}", project_id, status, body),
    };
    PromoteError::Api(message)
}

#[derive(Serialize)]
struct ForkRequest<'a> {
    namespace_path: &'a str,
}

pub struct GitLabClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for GitLabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLabClient")
            .field("base_url", &self.base_url)
            .field("token_len", &self.token.len())
            .finish()
    }
}

impl GitLabClient {
    pub fn new(config: &PlatformConfig, token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(PromoteError::InvalidRequest(
                "GitLab token not configured".to_string(),
            ));
        }
        if config.insecure_skip_tls {
            tracing::warn!("TLS certificate validation is disabled for {}", config.base_url);
        }
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure_skip_tls)
            .user_agent(concat!("refpromote/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PromoteError::Api(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token,
        })
    }

    /// All projects in a group and its subgroups, following pagination
    pub async fn list_group_projects(
        &self,
        group: &str,
        visibility: Option<Visibility>,
    ) -> Result<Vec<Project>> {
        let url = build_api_url(
            &self.base_url,
            &format!("groups/{}/projects", url_encode(group)),
        );

        let mut projects = Vec::new();
        let mut page = 1u32;
        loop {
            let page_param = page.to_string();
            let mut query = vec![
                ("per_page", PAGE_SIZE),
                ("page", page_param.as_str()),
                ("include_subgroups", "true"),
            ];
            if let Some(visibility) = visibility {
                query.push(("visibility", visibility.as_str()));
            }

            let response = self
                .client
                .get(&url)
                .header("PRIVATE-TOKEN", &self.token)
                .query(&query)
                .send()
                .await
                .map_err(|e| PromoteError::Api(format!("Failed to list projects: {}", e)))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(PromoteError::Api(format!(
                    "GitLab API error {} listing group '{}': {}",
                    status, group, body
                )));
            }

            let next = next_page(response.headers());
            let batch: Vec<Project> = response.json().await.map_err(|e| {
                PromoteError::Api(format!("Failed to parse project list: {}", e))
            })?;
            tracing::debug!("Group '{}' page {}: {} projects", group, page, batch.len());
            projects.extend(batch);

            match next {
                Some(n) if n > page => page = n,
                _ => break,
            }
        }

        tracing::info!("Found {} projects in group '{}'", projects.len(), group);
        Ok(projects)
    }

    /// Project with the given name or path directly in `group`
    pub async fn find_project_in_group(&self, group: &str, name: &str) -> Result<Option<Project>> {
        let projects = self.list_group_projects(group, None).await?;
        Ok(select_project(projects, group, name))
    }

    pub async fn fork_project(&self, project_id: u64, namespace: &str) -> Result<Project> {
        let url = build_api_url(&self.base_url, &format!("projects/{}/fork", project_id));
        tracing::info!("Forking project {} into '{}'", project_id, namespace);

        let response = self
            .client
            .post(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .json(&ForkRequest {
                namespace_path: namespace,
            })
            .send()
            .await
            .map_err(|e| PromoteError::Api(format!("Failed to fork project: {}", e)))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(fork_error(status, project_id, namespace, &body));
        }

        response
            .json()
            .await
            .map_err(|e| PromoteError::Api(format!("Failed to parse forked project: {}", e)))
    }
}

fn select_project(projects: Vec<Project>, group: &str, name: &str) -> Option<Project> {
    let group = group.trim_matches('/');
    projects.into_iter().find(|p| {
        let in_group = p
            .path_with_namespace
            .rsplit_once('/')
            .map(|(namespace, _)| namespace == group)
            .unwrap_or(false);
        let path = p
            .path_with_namespace
            .rsplit('/')
            .next()
            .unwrap_or_default();
        in_group && (p.name == name || path == name)
    })
}
