//! Test utilities for creating temporary source and destination repositories

#![cfg(test)]

use std::path::PathBuf;
use tempfile::TempDir;

/// A temporary non-bare repository to promote from
pub struct TestRepo {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestRepo {
    /// Create a new empty git repository
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().to_path_buf();

        let repo = git2::Repository::init(&path).expect("Failed to init repo");
        let mut config = repo.config().expect("Failed to get config");
        config
            .set_str("user.name", "Test User")
            .expect("Failed to set user.name");
        config
            .set_str("user.email", "test@example.com")
            .expect("Failed to set user.email");

        Self { dir, path }
    }

    /// Create a repository with an initial commit
    pub fn with_initial_commit() -> Self {
        let test_repo = Self::new();
        test_repo.create_commit("Initial commit", &[("README.md", "# Test Repo")]);
        test_repo
    }

    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    pub fn repo(&self) -> git2::Repository {
        git2::Repository::open(&self.path).expect("Failed to open repo")
    }

    /// Commit the given files on HEAD
    pub fn create_commit(&self, message: &str, files: &[(&str, &str)]) -> git2::Oid {
        let repo = self.repo();
        let mut index = repo.index().expect("Failed to get index");
        for (name, content) in files {
            let file_path = self.path.join(name);
            if let Some(parent) = file_path.parent() {
                std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
            }
            std::fs::write(&file_path, content).expect("Failed to write file");
            index
                .add_path(std::path::Path::new(name))
                .expect("Failed to stage file");
        }
        index.write().expect("Failed to write index");

        let tree_oid = index.write_tree().expect("Failed to write tree");
        let tree = repo.find_tree(tree_oid).expect("Failed to find tree");
        let sig = repo.signature().expect("Failed to get signature");

        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.as_ref().into_iter().collect();

        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .expect("Failed to create commit")
    }

    /// Create a branch at the current HEAD
    pub fn create_branch(&self, name: &str) -> git2::Oid {
        let repo = self.repo();
        let commit = repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .expect("Failed to get commit");
        repo.branch(name, &commit, false)
            .expect("Failed to create branch");
        commit.id()
    }

    pub fn current_branch(&self) -> String {
        let repo = self.repo();
        let head = repo.head().expect("Failed to get HEAD");
        head.shorthand().unwrap_or("").to_string()
    }

    pub fn head_oid(&self) -> git2::Oid {
        let repo = self.repo();
        let head = repo.head().expect("Failed to get HEAD");
        head.target().expect("Failed to get target")
    }

    /// Create an annotated tag at HEAD
    pub fn create_tag(&self, name: &str) -> git2::Oid {
        let repo = self.repo();
        let commit = repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .expect("Failed to get commit");
        let sig = repo.signature().expect("Failed to get signature");
        repo.tag(name, commit.as_object(), &sig, &format!("Tag {}", name), false)
            .expect("Failed to create tag")
    }

    pub fn create_lightweight_tag(&self, name: &str) {
        let repo = self.repo();
        let commit = repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .expect("Failed to get commit");
        repo.tag_lightweight(name, commit.as_object(), false)
            .expect("Failed to create lightweight tag");
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// A temporary bare repository standing in for a destination remote
pub struct BareRepo {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl BareRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("remote.git");
        git2::Repository::init_bare(&path).expect("Failed to init bare repo");
        Self { dir, path }
    }

    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    pub fn repo(&self) -> git2::Repository {
        git2::Repository::open_bare(&self.path).expect("Failed to open bare repo")
    }

    /// Commit a reference points at, peeling tags
    pub fn commit_of(&self, refname: &str) -> Option<git2::Oid> {
        let repo = self.repo();
        let reference = repo.find_reference(refname).ok()?;
        let commit = reference.peel_to_commit().ok()?;
        Some(commit.id())
    }

    pub fn branch_names(&self) -> Vec<String> {
        let repo = self.repo();
        let branches = repo
            .branches(Some(git2::BranchType::Local))
            .expect("Failed to list branches");
        let mut names: Vec<String> = branches
            .filter_map(|b| b.ok())
            .filter_map(|(b, _)| b.name().ok().flatten().map(str::to_string))
            .collect();
        names.sort();
        names
    }
}

impl Default for BareRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_repo() {
        let repo = TestRepo::new();
        assert!(repo.path.join(".git").exists());
    }

    #[test]
    fn test_create_branch_and_tag() {
        let repo = TestRepo::with_initial_commit();
        let head = repo.create_branch("feature");
        repo.create_tag("v1");
        let git_repo = repo.repo();
        assert!(git_repo
            .find_branch("feature", git2::BranchType::Local)
            .is_ok());
        let tagged = git_repo
            .revparse_single("v1^{commit}")
            .expect("tag should resolve");
        assert_eq!(tagged.id(), head);
    }

    #[test]
    fn test_bare_repo_starts_empty() {
        let bare = BareRepo::new();
        assert!(bare.repo().is_bare());
        assert!(bare.branch_names().is_empty());
        assert_eq!(bare.commit_of("refs/heads/main"), None);
    }
}
