//! Reference models

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a name resolved to on a remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Tag,
    Branch,
    /// Neither a tag nor a branch; the operation cannot proceed
    Unresolved,
}

impl RefKind {
    /// Namespace prefix of the full ref name
    pub fn namespace(&self) -> Option<&'static str> {
        match self {
            RefKind::Tag => Some("refs/tags/"),
            RefKind::Branch => Some("refs/heads/"),
            RefKind::Unresolved => None,
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefKind::Tag => write!(f, "tag"),
            RefKind::Branch => write!(f, "branch"),
            RefKind::Unresolved => write!(f, "unresolved"),
        }
    }
}

/// A named reference and the kind it was classified as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub name: String,
    pub kind: RefKind,
}

impl Reference {
    pub fn new(name: impl Into<String>, kind: RefKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.kind != RefKind::Unresolved
    }

    /// Full ref name (`refs/tags/<name>` or `refs/heads/<name>`)
    pub fn full_name(&self) -> Option<String> {
        self.kind.namespace().map(|ns| format!("{}{}", ns, self.name))
    }

    /// The same kind of reference under another name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: self.kind,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

/// One entry of a remote's advertised reference list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// Full ref name, e.g. `refs/tags/v1.0.0` or `refs/tags/v1.0.0^{}`
    pub name: String,
    pub oid: git2::Oid,
}

impl RemoteRef {
    /// True for the `^{}` entries that carry an annotated tag's target
    pub fn is_peeled(&self) -> bool {
        self.name.ends_with("^{}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name() {
        assert_eq!(
            Reference::new("v0.0.1", RefKind::Tag).full_name().as_deref(),
            Some("refs/tags/v0.0.1")
        );
        assert_eq!(
            Reference::new("release/1.x", RefKind::Branch)
                .full_name()
                .as_deref(),
            Some("refs/heads/release/1.x")
        );
        assert_eq!(Reference::new("x", RefKind::Unresolved).full_name(), None);
    }

    #[test]
    fn test_renamed_keeps_kind() {
        let r = Reference::new("v1", RefKind::Tag).renamed("v1-prod");
        assert_eq!(r.kind, RefKind::Tag);
        assert_eq!(r.name, "v1-prod");
    }
}
