//! End-to-end updates against real repositories on disk.

mod support;

use std::path::Path;

use git2::Oid;
use tempfile::TempDir;

use modship_core::config::ModshipConfig;
use modship_core::context::AppContext;
use modship_core::repo::{GitRepository, Repository};
use modship_core::update::{OutcomeKind, UpdateRequest};

use support::CONTRACT_V1;
use support::git::{branch_name, commit_all, init_repo, tag, write, write_healthy_module};

const MODULE: &str = "services/auth";

struct Workspace {
    temp: TempDir,
    releases: Vec<Oid>,
}

impl Workspace {
    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn module_root(&self) -> std::path::PathBuf {
        self.temp.path().join(MODULE)
    }

    fn parent_head(&self) -> Oid {
        let repo = git2::Repository::open(self.root()).unwrap();
        repo.head().unwrap().target().unwrap()
    }

    fn recorded_module_commit(&self) -> Oid {
        let repo = git2::Repository::open(self.root()).unwrap();
        let tree = repo.head().unwrap().peel_to_tree().unwrap();
        tree.get_path(Path::new(MODULE)).unwrap().id()
    }

    fn staged_module_commit(&self) -> Oid {
        let repo = git2::Repository::open(self.root()).unwrap();
        let index = repo.index().unwrap();
        index.get_path(Path::new(MODULE), 0).unwrap().id
    }

    /// Paths whose index entry differs from HEAD.
    fn staged_paths(&self) -> Vec<String> {
        let repo = git2::Repository::open(self.root()).unwrap();
        let tree = repo.head().unwrap().peel_to_tree().unwrap();
        let diff = repo.diff_tree_to_index(Some(&tree), None, None).unwrap();
        diff.deltas()
            .map(|d| d.new_file().path().unwrap().display().to_string())
            .collect()
    }

    fn module_head(&self) -> Oid {
        let repo = git2::Repository::open(self.module_root()).unwrap();
        repo.head().unwrap().target().unwrap()
    }
}

/// Parent with one module recorded at v1.2.3. The module also has v1.2.4
/// (healthy) and v1.3.0 (leaks a secret).
fn workspace() -> Workspace {
    let temp = TempDir::new().unwrap();
    let parent = init_repo(temp.path());
    write(temp.path(), "README.md", "parent\n");
    commit_all(&parent, "init");

    let module_root = temp.path().join(MODULE);
    let module = init_repo(&module_root);
    write_healthy_module(&module_root, CONTRACT_V1);
    let mut releases = Vec::new();
    for (version, source) in [
        ("v1.2.3", "// 1.2.3\n"),
        ("v1.2.4", "// 1.2.4\n"),
        ("v1.3.0", "const apiKey = \"sk_live_0123456789abcdef\";\n"),
    ] {
        write(&module_root, "src/extra.js", source);
        let oid = commit_all(&module, version);
        tag(&module, version, oid);
        releases.push(oid);
    }

    let module_repo = GitRepository::open(&module_root).unwrap();
    module_repo.checkout("v1.2.3").unwrap();

    let parent_repo = GitRepository::open(temp.path()).unwrap();
    parent_repo
        .commit(&[Path::new(MODULE)], "add services/auth")
        .unwrap();

    Workspace { temp, releases }
}

fn context(ws: &Workspace) -> AppContext {
    AppContext::with_config(ws.root(), ModshipConfig::default())
}

#[test]
fn patch_update_records_new_module_commit() {
    let ws = workspace();
    assert_eq!(ws.recorded_module_commit(), ws.releases[0]);
    let before = ws.parent_head();

    let mut machine = context(&ws).state_machine().unwrap();
    let outcome = machine.update(UpdateRequest::new(MODULE, "v1.2.4", false).unwrap());

    assert!(outcome.is_success(), "{:?}", outcome.reason());
    assert_eq!(ws.module_head(), ws.releases[1]);
    assert_eq!(ws.recorded_module_commit(), ws.releases[1]);

    let repo = git2::Repository::open(ws.root()).unwrap();
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.parent_id(0).unwrap(), before);
    let message = head.message().unwrap();
    assert!(message.starts_with("chore(modules): update services/auth to v1.2.4"));
    assert!(message.contains("Update-Type: patch"));
}

#[test]
fn failing_gate_restores_module_and_parent() {
    let ws = workspace();
    let before = ws.parent_head();

    let mut machine = context(&ws).state_machine().unwrap();
    let outcome = machine.update(UpdateRequest::new(MODULE, "v1.3.0", true).unwrap());

    assert_eq!(outcome.kind(), OutcomeKind::RolledBack, "{:?}", outcome.reason());
    assert_eq!(ws.module_head(), ws.releases[0]);
    assert_eq!(ws.parent_head(), before);
    assert_eq!(ws.recorded_module_commit(), ws.releases[0]);

    let module = GitRepository::open(&ws.module_root()).unwrap();
    assert!(module.is_clean().unwrap());
}

#[test]
fn dirty_module_is_refused() {
    let ws = workspace();
    write(&ws.module_root(), "scratch.txt", "wip");

    let mut machine = context(&ws).state_machine().unwrap();
    let outcome = machine.update(UpdateRequest::new(MODULE, "v1.2.4", false).unwrap());

    assert_eq!(outcome.kind(), OutcomeKind::ValidationFailed);
    assert_eq!(ws.module_head(), ws.releases[0]);
}

#[test]
fn failed_parent_commit_leaves_index_untouched() {
    let ws = workspace();
    let before = ws.parent_head();
    let branch = branch_name(&git2::Repository::open(ws.root()).unwrap());
    let lock = ws.root().join(".git/refs/heads").join(format!("{branch}.lock"));
    std::fs::write(&lock, "").unwrap();

    let mut machine = context(&ws).state_machine().unwrap();
    let outcome = machine.update(UpdateRequest::new(MODULE, "v1.2.4", false).unwrap());
    std::fs::remove_file(&lock).unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::RolledBack, "{:?}", outcome.reason());
    assert_eq!(ws.module_head(), ws.releases[0]);
    assert_eq!(ws.parent_head(), before);
    assert_eq!(ws.staged_module_commit(), ws.releases[0]);
    assert!(ws.staged_paths().is_empty(), "{:?}", ws.staged_paths());
}

#[test]
fn update_commit_excludes_unrelated_staged_changes() {
    let ws = workspace();
    write(ws.root(), "notes.txt", "draft\n");
    {
        let repo = git2::Repository::open(ws.root()).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("notes.txt")).unwrap();
        index.write().unwrap();
    }

    let mut machine = context(&ws).state_machine().unwrap();
    let outcome = machine.update(UpdateRequest::new(MODULE, "v1.2.4", false).unwrap());

    assert!(outcome.is_success(), "{:?}", outcome.reason());
    assert_eq!(ws.recorded_module_commit(), ws.releases[1]);
    assert_eq!(ws.staged_module_commit(), ws.releases[1]);

    let repo = git2::Repository::open(ws.root()).unwrap();
    let tree = repo.head().unwrap().peel_to_tree().unwrap();
    assert!(tree.get_path(Path::new("notes.txt")).is_err());
    assert_eq!(ws.staged_paths(), vec!["notes.txt".to_string()]);
}

#[test]
fn rollback_after_commit_keeps_unrelated_staged_changes() {
    let ws = workspace();
    let before = ws.parent_head();
    let parent = GitRepository::open(ws.root()).unwrap();
    write(ws.root(), "notes.txt", "draft\n");
    {
        let repo = git2::Repository::open(ws.root()).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("notes.txt")).unwrap();
        index.write().unwrap();
    }

    let module = GitRepository::open(&ws.module_root()).unwrap();
    module.checkout("v1.2.4").unwrap();
    parent
        .commit(&[Path::new(MODULE)], "update services/auth")
        .unwrap();
    parent.undo_last_commit().unwrap();

    assert_eq!(ws.parent_head(), before);
    assert_eq!(ws.staged_module_commit(), ws.releases[0]);
    assert_eq!(ws.staged_paths(), vec!["notes.txt".to_string()]);
}
