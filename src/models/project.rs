//! Hosting-platform project models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PromoteError;

/// Project visibility filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Internal,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Internal => "internal",
        }
    }
}

impl FromStr for Visibility {
    type Err = PromoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "internal" => Ok(Visibility::Internal),
            other => Err(PromoteError::InvalidRequest(format!(
                "invalid visibility '{}'; valid values: public, private, internal",
                other
            ))),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parent of a forked project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkedFrom {
    pub id: u64,
    pub name_with_namespace: String,
}

/// A project as returned by the GitLab v4 API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub name_with_namespace: String,
    pub path_with_namespace: String,
    #[serde(default)]
    pub visibility: Option<String>,
    pub web_url: String,
    #[serde(default)]
    pub http_url_to_repo: Option<String>,
    #[serde(default)]
    pub forked_from_project: Option<ForkedFrom>,
}
