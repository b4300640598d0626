#![allow(dead_code)]

pub mod git;

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use modship_core::quality::{
    ContractDocument, DeploymentFacts, FactSheet, FactsError, HeuristicContractComparator,
    ModuleFacts, QualityEngine, SecurityFacts, StabilityFacts,
};
use modship_core::repo::{Repository, RepositoryError, RepositoryHost};
use modship_core::types::{CommitRef, ModuleId};
use modship_core::update::{UpdateSettings, UpdateStateMachine};

/// One-shot faults consumed by the next matching operation.
#[derive(Debug, Default)]
pub struct Faults {
    pub fail_next_checkout: bool,
    /// Every checkout of this reference fails.
    pub fail_checkout_of: Option<String>,
    /// The next checkout reports success but leaves HEAD here.
    pub next_checkout_lands_on: Option<String>,
    pub fail_undo: bool,
    pub fail_commit: bool,
    /// Reading HEAD fails.
    pub fail_head: bool,
}

#[derive(Debug, Default)]
pub struct RepoState {
    pub head: String,
    pub branch: Option<String>,
    pub branches: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    /// First-parent chain ending at `head`.
    pub history: Vec<String>,
    pub messages: Vec<String>,
    pub committed_paths: Vec<PathBuf>,
    pub dirty: bool,
    pub checkouts: usize,
    pub faults: Faults,
    next_id: u32,
}

/// In-memory repository. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepo {
    state: Rc<RefCell<RepoState>>,
}

impl MemoryRepo {
    /// A repository on branch `main` at a single root commit.
    pub fn new(root: &str) -> Self {
        let repo = Self::default();
        {
            let mut s = repo.state.borrow_mut();
            s.head = root.to_string();
            s.branch = Some("main".to_string());
            s.branches.insert("main".to_string(), root.to_string());
            s.history.push(root.to_string());
        }
        repo
    }

    pub fn with_tag(self, tag: &str, commit: &str) -> Self {
        self.state
            .borrow_mut()
            .tags
            .insert(tag.to_string(), commit.to_string());
        self
    }

    pub fn state(&self) -> std::cell::Ref<'_, RepoState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> std::cell::RefMut<'_, RepoState> {
        self.state.borrow_mut()
    }

    pub fn head(&self) -> String {
        self.state.borrow().head.clone()
    }

    pub fn commit_count(&self) -> usize {
        self.state.borrow().history.len()
    }

    fn lookup(s: &RepoState, name: &str) -> Option<String> {
        if let Some(commit) = s.tags.get(name).or_else(|| s.branches.get(name)) {
            return Some(commit.clone());
        }
        let known = s.history.contains(&name.to_string())
            || s.tags.values().any(|c| c == name)
            || s.branches.values().any(|c| c == name);
        known.then(|| name.to_string())
    }
}

fn injected(op: &'static str) -> RepositoryError {
    RepositoryError::git(op, "injected failure")
}

impl Repository for MemoryRepo {
    fn resolve_ref(&self, name: &str) -> Result<CommitRef, RepositoryError> {
        Self::lookup(&self.state.borrow(), name)
            .map(CommitRef::new)
            .ok_or_else(|| RepositoryError::UnresolvedRef {
                name: name.to_string(),
            })
    }

    fn current_ref(&self) -> Result<CommitRef, RepositoryError> {
        if self.state.borrow().faults.fail_head {
            return Err(injected("rev-parse"));
        }
        Ok(CommitRef::new(self.head()))
    }

    fn is_clean(&self) -> Result<bool, RepositoryError> {
        Ok(!self.state.borrow().dirty)
    }

    fn checkout(&self, reference: &str) -> Result<(), RepositoryError> {
        let mut s = self.state.borrow_mut();
        s.checkouts += 1;
        if std::mem::take(&mut s.faults.fail_next_checkout)
            || s.faults.fail_checkout_of.as_deref() == Some(reference)
        {
            return Err(injected("checkout"));
        }
        let commit =
            Self::lookup(&s, reference).ok_or_else(|| RepositoryError::UnresolvedRef {
                name: reference.to_string(),
            })?;
        s.branch = s
            .branches
            .contains_key(reference)
            .then(|| reference.to_string());
        s.head = s.faults.next_checkout_lands_on.take().unwrap_or(commit);
        Ok(())
    }

    fn commit(&self, paths: &[&Path], message: &str) -> Result<CommitRef, RepositoryError> {
        let mut s = self.state.borrow_mut();
        if s.faults.fail_commit {
            return Err(injected("commit"));
        }
        s.next_id += 1;
        let id = format!("{}-c{}", s.history[0], s.next_id);
        s.history.push(id.clone());
        s.head = id.clone();
        if let Some(branch) = s.branch.clone() {
            s.branches.insert(branch, id.clone());
        }
        s.messages.push(message.to_string());
        s.committed_paths
            .extend(paths.iter().map(|p| p.to_path_buf()));
        Ok(CommitRef::new(id))
    }

    fn undo_last_commit(&self) -> Result<(), RepositoryError> {
        let mut s = self.state.borrow_mut();
        if s.faults.fail_undo {
            return Err(injected("reset"));
        }
        if s.history.len() < 2 {
            return Err(RepositoryError::NothingToUndo);
        }
        s.history.pop();
        let head = s.history.last().cloned().unwrap_or_default();
        if let Some(branch) = s.branch.clone() {
            s.branches.insert(branch, head.clone());
        }
        s.head = head;
        Ok(())
    }

    fn tag_exists(&self, name: &str) -> Result<bool, RepositoryError> {
        Ok(self.state.borrow().tags.contains_key(name))
    }

    fn current_branch(&self) -> Result<Option<String>, RepositoryError> {
        Ok(self.state.borrow().branch.clone())
    }

    fn current_version(&self) -> Result<String, RepositoryError> {
        let s = self.state.borrow();
        Ok(s.tags
            .iter()
            .find(|(_, commit)| **commit == s.head)
            .map(|(tag, _)| tag.clone())
            .unwrap_or_else(|| "HEAD".to_string()))
    }

    fn workdir(&self) -> Option<&Path> {
        None
    }
}

/// Parent repository plus its modules, all in memory.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    pub parent: MemoryRepo,
    pub modules: Rc<RefCell<HashMap<String, MemoryRepo>>>,
}

impl MemoryHost {
    pub fn new(parent: MemoryRepo) -> Self {
        Self {
            parent,
            modules: Rc::default(),
        }
    }

    pub fn add_module(&self, path: &str, repo: MemoryRepo) {
        self.modules.borrow_mut().insert(path.to_string(), repo);
    }

    pub fn module(&self, path: &str) -> MemoryRepo {
        self.modules.borrow()[path].clone()
    }
}

impl RepositoryHost for MemoryHost {
    fn parent(&self) -> &dyn Repository {
        &self.parent
    }

    fn open_module(&self, module: &ModuleId) -> Result<Box<dyn Repository>, RepositoryError> {
        self.modules
            .borrow()
            .get(module.as_str())
            .map(|repo| Box::new(repo.clone()) as Box<dyn Repository>)
            .ok_or_else(|| RepositoryError::NotFound {
                path: module.as_path().to_path_buf(),
            })
    }
}

/// Facts looked up by the commit a module has checked out.
#[derive(Debug, Clone, Default)]
pub struct StaticFacts {
    sheets: Rc<RefCell<HashMap<String, FactSheet>>>,
    contracts: Rc<RefCell<HashMap<String, Option<String>>>>,
}

impl StaticFacts {
    pub fn set_sheet(&self, commit: &str, sheet: FactSheet) {
        self.sheets.borrow_mut().insert(commit.to_string(), sheet);
    }

    pub fn set_contract(&self, commit: &str, content: Option<&str>) {
        self.contracts
            .borrow_mut()
            .insert(commit.to_string(), content.map(str::to_string));
    }
}

impl ModuleFacts for StaticFacts {
    fn collect(&self, _module: &ModuleId, repo: &dyn Repository) -> Result<FactSheet, FactsError> {
        let head = repo.current_ref()?;
        Ok(self
            .sheets
            .borrow()
            .get(head.as_str())
            .cloned()
            .unwrap_or_else(healthy_sheet))
    }

    fn contract_document(
        &self,
        _module: &ModuleId,
        repo: &dyn Repository,
    ) -> Result<Option<ContractDocument>, FactsError> {
        let head = repo.current_ref()?;
        let content = match self.contracts.borrow().get(head.as_str()) {
            Some(content) => content.clone(),
            None => Some(CONTRACT_V1.to_string()),
        };
        Ok(content.map(|content| ContractDocument {
            path: PathBuf::from("contract.json"),
            content,
        }))
    }
}

pub const CONTRACT_V1: &str =
    r#"{"version": "1.0.0", "paths": {"/users": {"get": {}, "post": {}}, "/health": {"get": {}}}}"#;

/// Drops `POST /users` from [`CONTRACT_V1`].
pub const CONTRACT_V2_BREAKING: &str =
    r#"{"version": "2.0.0", "paths": {"/users": {"get": {}}, "/health": {"get": {}}}}"#;

/// Replaces every operation of [`CONTRACT_V1`] with a new one.
pub const CONTRACT_REPLACED: &str =
    r#"{"version": "1.0.1", "paths": {"/v2/status": {"get": {}}}}"#;

/// A sheet that passes every gate.
pub fn healthy_sheet() -> FactSheet {
    FactSheet {
        security: SecurityFacts {
            security_policy: true,
            safe_ignore_rules: true,
            secrets_example: true,
            no_hardcoded_secrets: true,
            https_enforced: true,
            auth_present: true,
            vulnerability_count: Some(0),
        },
        stability: StabilityFacts {
            stable_tag: true,
            tests_exist: true,
            test_coverage: 85.0,
            build_passes: true,
            error_handling: true,
            rollback_capability: true,
            health_endpoint: true,
        },
        performance: Default::default(),
        deployment: DeploymentFacts {
            package_manifest: true,
            build_script: true,
            start_script: true,
            deployment_config: true,
            env_config: true,
            health_check_script: true,
            production_ready: true,
        },
    }
}

/// A sheet whose security gate fails: secrets in source and open advisories.
pub fn insecure_sheet() -> FactSheet {
    let mut sheet = healthy_sheet();
    sheet.security.no_hardcoded_secrets = false;
    sheet.security.vulnerability_count = Some(4);
    sheet
}

/// Five of seven security checks and six open advisories: 500/7 - 30.
pub fn weak_security_sheet() -> FactSheet {
    let mut sheet = healthy_sheet();
    sheet.security.https_enforced = false;
    sheet.security.vulnerability_count = Some(6);
    sheet
}

/// Parent at `p0` with module `services/auth` on `main` at `a1` (tag v1.2.3),
/// and candidate commits `a2` (v1.2.4), `a3` (v1.3.0), `a4` (v2.0.0).
pub struct Fixture {
    pub host: MemoryHost,
    pub facts: StaticFacts,
}

pub const AUTH: &str = "services/auth";

impl Fixture {
    pub fn new() -> Self {
        let host = MemoryHost::new(MemoryRepo::new("p0"));
        let facts = StaticFacts::default();
        let fixture = Self { host, facts };
        fixture.add_module(AUTH, "a");
        fixture
    }

    /// Add a module whose commits are named `<prefix>1` .. `<prefix>4`.
    pub fn add_module(&self, path: &str, prefix: &str) {
        let c = |n: u32| format!("{prefix}{n}");
        let repo = MemoryRepo::new(&c(1))
            .with_tag("v1.2.3", &c(1))
            .with_tag("v1.2.4", &c(2))
            .with_tag("v1.3.0", &c(3))
            .with_tag("v2.0.0", &c(4));
        self.host.add_module(path, repo);
    }

    pub fn module(&self, path: &str) -> MemoryRepo {
        self.host.module(path)
    }

    pub fn parent(&self) -> &MemoryRepo {
        &self.host.parent
    }

    pub fn machine(&self) -> UpdateStateMachine {
        let quality = QualityEngine::new(
            Box::new(self.facts.clone()),
            Box::new(HeuristicContractComparator),
        );
        UpdateStateMachine::new(Box::new(self.host.clone()), quality, UpdateSettings::default())
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
