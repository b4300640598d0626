//! git2-backed repository and workspace.

use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    BranchType, DescribeFormatOptions, DescribeOptions, Index, IndexEntry, IndexTime, ResetType,
    Signature, StatusOptions,
};
use tracing::debug;

use super::{Repository, RepositoryError, RepositoryHost};
use crate::types::{CommitRef, ModuleId};

const FALLBACK_NAME: &str = "modship";
const FALLBACK_EMAIL: &str = "modship@localhost";

const FILE_MODE: u32 = 0o100644;
const EXECUTABLE_MODE: u32 = 0o100755;
const GITLINK_MODE: u32 = 0o160000;

/// What committing one path does to an index.
enum PathChange {
    Upsert(IndexEntry),
    Remove(PathBuf),
}

fn apply_change(index: &mut Index, change: &PathChange) -> Result<(), RepositoryError> {
    match change {
        PathChange::Upsert(entry) => index.add(entry),
        PathChange::Remove(path) => index.remove_path(path),
    }
    .map_err(|e| RepositoryError::git("add", e))
}

/// A repository opened with libgit2.
pub struct GitRepository {
    repo: git2::Repository,
    path: PathBuf,
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("path", &self.path)
            .finish()
    }
}

impl GitRepository {
    /// Open the repository rooted exactly at `path` (no upward discovery).
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        let repo = git2::Repository::open(path).map_err(|_| RepositoryError::NotFound {
            path: path.to_path_buf(),
        })?;
        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn head_commit(&self) -> Result<git2::Commit<'_>, RepositoryError> {
        self.repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(|e| RepositoryError::git("head", e))
    }

    /// Index entry for `path` as it is in the working tree. Nested
    /// repositories are recorded as gitlinks at their checked-out commit.
    fn stage_change(&self, staged: &Index, path: &Path) -> Result<PathChange, RepositoryError> {
        let add_err = |e: git2::Error| RepositoryError::git("add", e);
        let workdir = self
            .repo
            .workdir()
            .ok_or_else(|| RepositoryError::git("add", "repository has no working directory"))?;
        let name = path
            .to_str()
            .ok_or_else(|| RepositoryError::git("add", "path is not UTF-8"))?;
        let full = workdir.join(path);

        let (mode, id, file_size) = if full.join(".git").exists() {
            let nested = git2::Repository::open(&full).map_err(add_err)?;
            let head = nested
                .head()
                .and_then(|head| head.peel_to_commit())
                .map_err(add_err)?;
            (GITLINK_MODE, head.id(), 0)
        } else if full.is_file() {
            let id = self.repo.blob_path(&full).map_err(add_err)?;
            let mode = staged
                .get_path(path, 0)
                .map(|entry| entry.mode)
                .filter(|mode| *mode == EXECUTABLE_MODE)
                .unwrap_or(FILE_MODE);
            let size = std::fs::metadata(&full).map(|m| m.len()).unwrap_or(0);
            (mode, id, u32::try_from(size).unwrap_or(u32::MAX))
        } else if !full.exists() {
            return Ok(PathChange::Remove(path.to_path_buf()));
        } else {
            return Err(RepositoryError::git(
                "add",
                format!("{} is a directory, not a file or repository", path.display()),
            ));
        };

        let never = IndexTime::new(0, 0);
        Ok(PathChange::Upsert(IndexEntry {
            ctime: never,
            mtime: never,
            dev: 0,
            ino: 0,
            mode,
            uid: 0,
            gid: 0,
            file_size,
            id,
            flags: 0,
            flags_extended: 0,
            path: name.replace('\\', "/").into_bytes(),
        }))
    }

    fn changed_paths(
        &self,
        from: &git2::Commit<'_>,
        to: &git2::Commit<'_>,
    ) -> Result<Vec<PathBuf>, RepositoryError> {
        let diff_err = |e: git2::Error| RepositoryError::git("diff", e);
        let old = from.tree().map_err(diff_err)?;
        let new = to.tree().map_err(diff_err)?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&old), Some(&new), None)
            .map_err(diff_err)?;
        Ok(diff
            .deltas()
            .filter_map(|delta| delta.new_file().path().or_else(|| delta.old_file().path()))
            .map(Path::to_path_buf)
            .collect())
    }

    fn signature(&self) -> Result<Signature<'static>, RepositoryError> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(_) => Signature::now(FALLBACK_NAME, FALLBACK_EMAIL)
                .map_err(|e| RepositoryError::git("signature", e)),
        }
    }
}

impl Repository for GitRepository {
    fn resolve_ref(&self, name: &str) -> Result<CommitRef, RepositoryError> {
        let commit = self
            .repo
            .revparse_single(name)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|_| RepositoryError::UnresolvedRef {
                name: name.to_string(),
            })?;
        Ok(CommitRef::new(commit.id().to_string()))
    }

    fn current_ref(&self) -> Result<CommitRef, RepositoryError> {
        Ok(CommitRef::new(self.head_commit()?.id().to_string()))
    }

    fn is_clean(&self) -> Result<bool, RepositoryError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .include_ignored(false)
            .recurse_untracked_dirs(false);
        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .map_err(|e| RepositoryError::git("status", e))?;
        Ok(statuses.is_empty())
    }

    fn checkout(&self, reference: &str) -> Result<(), RepositoryError> {
        let mut checkout = CheckoutBuilder::new();
        checkout.force();

        if let Ok(branch) = self.repo.find_branch(reference, BranchType::Local) {
            let refname = branch
                .get()
                .name()
                .ok_or_else(|| RepositoryError::git("checkout", "branch name is not UTF-8"))?
                .to_string();
            self.repo
                .set_head(&refname)
                .map_err(|e| RepositoryError::git("checkout", e))?;
            self.repo
                .checkout_head(Some(&mut checkout))
                .map_err(|e| RepositoryError::git("checkout", e))?;
            debug!(path = %self.path.display(), branch = reference, "checked out branch");
            return Ok(());
        }

        let commit = self
            .repo
            .revparse_single(reference)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|_| RepositoryError::UnresolvedRef {
                name: reference.to_string(),
            })?;
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))
            .map_err(|e| RepositoryError::git("checkout", e))?;
        self.repo
            .set_head_detached(commit.id())
            .map_err(|e| RepositoryError::git("checkout", e))?;
        debug!(path = %self.path.display(), commit = %commit.id(), "detached HEAD");
        Ok(())
    }

    fn commit(&self, paths: &[&Path], message: &str) -> Result<CommitRef, RepositoryError> {
        let parent = self.head_commit().ok();

        // The commit is HEAD's tree plus `paths`. Whatever else is staged stays
        // staged, and the on-disk index is only touched once the commit exists.
        let mut staged = Index::new().map_err(|e| RepositoryError::git("index", e))?;
        if let Some(parent) = &parent {
            let tree = parent
                .tree()
                .map_err(|e| RepositoryError::git("read-tree", e))?;
            staged
                .read_tree(&tree)
                .map_err(|e| RepositoryError::git("read-tree", e))?;
        }

        let mut changes = Vec::with_capacity(paths.len());
        for path in paths {
            let change = self.stage_change(&staged, path)?;
            apply_change(&mut staged, &change)?;
            changes.push(change);
        }

        let tree_id = staged
            .write_tree_to(&self.repo)
            .map_err(|e| RepositoryError::git("write-tree", e))?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(|e| RepositoryError::git("write-tree", e))?;

        let sig = self.signature()?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .map_err(|e| RepositoryError::git("commit", e))?;

        let mut index = self
            .repo
            .index()
            .map_err(|e| RepositoryError::git("index", e))?;
        for change in &changes {
            apply_change(&mut index, change)?;
        }
        index.write().map_err(|e| RepositoryError::git("index", e))?;

        debug!(path = %self.path.display(), commit = %oid, files = changes.len(), "committed");
        Ok(CommitRef::new(oid.to_string()))
    }

    fn undo_last_commit(&self) -> Result<(), RepositoryError> {
        let head = self.head_commit()?;
        if head.parent_count() == 0 {
            return Err(RepositoryError::NothingToUndo);
        }
        let reset_err = |e: git2::Error| RepositoryError::git("reset", e);
        let parent = head.parent(0).map_err(reset_err)?;

        let touched = self.changed_paths(&parent, &head)?;
        self.repo
            .reset(parent.as_object(), ResetType::Soft, None)
            .map_err(reset_err)?;
        // Unstage only what the undone commit recorded.
        if !touched.is_empty() {
            self.repo
                .reset_default(Some(parent.as_object()), touched.iter().map(PathBuf::as_path))
                .map_err(reset_err)?;
        }
        debug!(path = %self.path.display(), undone = %head.id(), "undid last commit");
        Ok(())
    }

    fn tag_exists(&self, name: &str) -> Result<bool, RepositoryError> {
        Ok(self
            .repo
            .find_reference(&format!("refs/tags/{name}"))
            .is_ok())
    }

    fn current_branch(&self) -> Result<Option<String>, RepositoryError> {
        let head = self
            .repo
            .head()
            .map_err(|e| RepositoryError::git("head", e))?;
        if !head.is_branch() {
            return Ok(None);
        }
        Ok(head.shorthand().map(str::to_string))
    }

    fn current_version(&self) -> Result<String, RepositoryError> {
        let mut opts = DescribeOptions::new();
        opts.describe_tags();
        let described = match self.repo.describe(&opts) {
            Ok(describe) => describe,
            Err(_) => return Ok("HEAD".to_string()),
        };
        let mut format = DescribeFormatOptions::new();
        format.abbreviated_size(0);
        described
            .format(Some(&format))
            .map_err(|e| RepositoryError::git("describe", e))
    }

    fn workdir(&self) -> Option<&Path> {
        self.repo.workdir()
    }
}

/// The enclosing repository plus its module repositories on disk.
#[derive(Debug)]
pub struct GitWorkspace {
    root: PathBuf,
    parent: GitRepository,
}

impl GitWorkspace {
    pub fn open(root: &Path) -> Result<Self, RepositoryError> {
        Ok(Self {
            root: root.to_path_buf(),
            parent: GitRepository::open(root)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RepositoryHost for GitWorkspace {
    fn parent(&self) -> &dyn Repository {
        &self.parent
    }

    fn open_module(&self, module: &ModuleId) -> Result<Box<dyn Repository>, RepositoryError> {
        let path = self.root.join(module.as_path());
        if !path.is_dir() {
            return Err(RepositoryError::NotFound { path });
        }
        Ok(Box::new(GitRepository::open(&path)?))
    }
}
