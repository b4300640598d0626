//! Filesystem probe that measures a module's checkout.
//!
//! Most facts come from file existence and light text sniffing. Values only a
//! build pipeline can know (build result, build time) are read from a recorded
//! measurements file, `.modship/facts.toml` by default:
//!
//! ```toml
//! build_passed = true
//! build_time_secs = 84.0
//! vulnerability_count = 0
//! test_coverage = 71.5
//! ```
//!
//! Recorded values take precedence over measured ones. Anything neither
//! recorded nor measurable is reported conservatively.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::facts::{
    ContractDocument, DeploymentFacts, FactSheet, FactsError, ModuleFacts, PerformanceFacts,
    SecurityFacts, StabilityFacts,
};
use crate::repo::Repository;
use crate::types::ModuleId;
use crate::version::parse_release;

const MAX_SCANNED_FILE_BYTES: u64 = 1024 * 1024;

const SKIPPED_DIRS: [&str; 9] = [
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "vendor",
    "coverage",
    ".modship",
    "__pycache__",
];

const SOURCE_EXTENSIONS: [&str; 16] = [
    "js", "mjs", "cjs", "ts", "tsx", "jsx", "py", "rs", "go", "java", "kt", "rb", "php", "cs",
    "yml", "yaml",
];

const SECRET_KEYS: [&str; 7] = [
    "password",
    "passwd",
    "secret",
    "api_key",
    "apikey",
    "access_token",
    "private_key",
];

const HTTPS_MARKERS: [&str; 6] = [
    "strict-transport-security",
    "hsts",
    "helmet",
    "https.createserver",
    "force_https",
    "forcehttps",
];

const AUTH_MARKERS: [&str; 6] = [
    "authenticate",
    "authorization",
    "jwt",
    "passport",
    "oauth",
    "bearer",
];

const ERROR_HANDLING_MARKERS: [&str; 5] = [
    "catch",
    "except ",
    "result<",
    "errorhandler",
    "error_handler",
];

const HEALTH_MARKERS: [&str; 2] = ["/health", "healthz"];

/// Where the probe looks for reports and contract documents.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub overlay: PathBuf,
    pub audit_report: PathBuf,
    pub coverage_report: PathBuf,
    pub bundle_dirs: Vec<PathBuf>,
    pub contract_files: Vec<PathBuf>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            overlay: PathBuf::from(".modship/facts.toml"),
            audit_report: PathBuf::from("audit.json"),
            coverage_report: PathBuf::from("coverage/coverage-summary.json"),
            bundle_dirs: vec![PathBuf::from("dist"), PathBuf::from("build")],
            contract_files: vec![
                PathBuf::from("contract.json"),
                PathBuf::from("openapi.json"),
                PathBuf::from("api/contract.json"),
            ],
        }
    }
}

/// Measurements recorded by a build pipeline.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordedFacts {
    build_passed: Option<bool>,
    build_time_secs: Option<f64>,
    vulnerability_count: Option<u32>,
    test_coverage: Option<f64>,
    bundle_size_bytes: Option<u64>,
    dependency_count: Option<usize>,
}

#[derive(Debug, Default)]
struct PackageManifest {
    scripts: Vec<String>,
    dependency_count: usize,
    raw: String,
}

impl PackageManifest {
    fn has_script(&self, name: &str) -> bool {
        self.scripts.iter().any(|s| s == name)
    }
}

/// Text of the module's source files, read once per collection.
struct SourceIndex {
    files: Vec<(PathBuf, String)>,
}

impl SourceIndex {
    fn build(root: &Path) -> Result<Self, FactsError> {
        let mut files = Vec::new();
        collect_sources(root, &mut files)?;
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Self { files })
    }

    fn mentions_any(&self, markers: &[&str]) -> bool {
        self.files.iter().any(|(_, content)| {
            let lower = content.to_ascii_lowercase();
            markers.iter().any(|m| lower.contains(m))
        })
    }

    fn has_test_files(&self) -> bool {
        self.files.iter().any(|(path, _)| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.contains(".test.") || n.contains(".spec.") || n.contains("_test."))
                .unwrap_or(false)
        })
    }

    fn hardcoded_secrets(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|(_, content)| content.lines().any(line_has_secret))
            .map(|(path, _)| path.clone())
            .collect()
    }
}

/// Probes a module's working directory.
#[derive(Debug, Clone, Default)]
pub struct FsFactProbe {
    settings: ProbeSettings,
}

impl FsFactProbe {
    pub fn new(settings: ProbeSettings) -> Self {
        Self { settings }
    }

    fn workdir<'r>(
        &self,
        module: &ModuleId,
        repo: &'r dyn Repository,
    ) -> Result<&'r Path, FactsError> {
        repo.workdir().ok_or_else(|| FactsError::NoWorkdir {
            module: module.clone(),
        })
    }

    fn recorded(&self, root: &Path) -> Result<RecordedFacts, FactsError> {
        let path = root.join(&self.settings.overlay);
        let Some(content) = read_optional(&path)? else {
            return Ok(RecordedFacts::default());
        };
        toml::from_str(&content).map_err(|e| FactsError::Parse {
            path,
            message: e.to_string(),
        })
    }

    fn audited_vulnerabilities(&self, root: &Path) -> Result<Option<u32>, FactsError> {
        let path = root.join(&self.settings.audit_report);
        let Some(doc) = read_json(&path)? else {
            return Ok(None);
        };
        let Some(counts) = doc
            .get("metadata")
            .and_then(|m| m.get("vulnerabilities"))
            .and_then(Value::as_object)
        else {
            return Err(FactsError::Parse {
                path,
                message: "missing metadata.vulnerabilities".to_string(),
            });
        };
        let total = match counts.get("total").and_then(Value::as_u64) {
            Some(total) => total,
            None => counts.values().filter_map(Value::as_u64).sum(),
        };
        Ok(Some(u32::try_from(total).unwrap_or(u32::MAX)))
    }

    fn measured_coverage(&self, root: &Path) -> Result<Option<f64>, FactsError> {
        let path = root.join(&self.settings.coverage_report);
        let Some(doc) = read_json(&path)? else {
            return Ok(None);
        };
        Ok(doc
            .get("total")
            .and_then(|t| t.get("lines"))
            .and_then(|l| l.get("pct"))
            .and_then(Value::as_f64))
    }

    fn bundle_size(&self, root: &Path) -> Result<u64, FactsError> {
        let mut total = 0;
        for dir in &self.settings.bundle_dirs {
            let path = root.join(dir);
            if path.is_dir() {
                total += dir_size(&path)?;
            }
        }
        Ok(total)
    }

    fn stable_tag(&self, repo: &dyn Repository) -> Result<bool, FactsError> {
        let version = repo.current_version()?;
        if parse_release(&version).is_none() || !repo.tag_exists(&version)? {
            return Ok(false);
        }
        Ok(repo.resolve_ref(&version)? == repo.current_ref()?)
    }
}

impl ModuleFacts for FsFactProbe {
    fn collect(&self, module: &ModuleId, repo: &dyn Repository) -> Result<FactSheet, FactsError> {
        let root = self.workdir(module, repo)?;
        let recorded = self.recorded(root)?;
        let sources = SourceIndex::build(root)?;
        let package = read_package_manifest(root)?;

        let exists = |rel: &str| root.join(rel).exists();
        let any_exists = |rels: &[&str]| rels.iter().any(|r| root.join(r).exists());

        let secrets = sources.hardcoded_secrets();
        if !secrets.is_empty() {
            debug!(module = %module, files = ?secrets, "possible hardcoded secrets");
        }

        let vulnerability_count = match recorded.vulnerability_count {
            Some(count) => Some(count),
            None => self.audited_vulnerabilities(root)?,
        };

        let security = SecurityFacts {
            security_policy: any_exists(&["SECURITY.md", ".github/SECURITY.md"]),
            safe_ignore_rules: ignores_env_files(root)?,
            secrets_example: any_exists(&[".env.example", ".env.sample"]),
            no_hardcoded_secrets: secrets.is_empty(),
            https_enforced: sources.mentions_any(&HTTPS_MARKERS),
            auth_present: sources.mentions_any(&AUTH_MARKERS),
            vulnerability_count,
        };

        let test_coverage = match recorded.test_coverage {
            Some(pct) => pct,
            None => self.measured_coverage(root)?.unwrap_or(0.0),
        };

        let stability = StabilityFacts {
            stable_tag: self.stable_tag(repo)?,
            tests_exist: any_exists(&["tests", "test", "__tests__", "spec"])
                || sources.has_test_files(),
            test_coverage,
            build_passes: recorded.build_passed.unwrap_or(false),
            error_handling: sources.mentions_any(&ERROR_HANDLING_MARKERS),
            rollback_capability: any_exists(&["scripts/rollback.sh", "rollback.sh"])
                || package.has_script("rollback"),
            health_endpoint: sources.mentions_any(&HEALTH_MARKERS),
        };

        let bundle_size_bytes = match recorded.bundle_size_bytes {
            Some(size) => size,
            None => self.bundle_size(root)?,
        };

        let performance = PerformanceFacts {
            bundle_size_bytes,
            build_time_secs: recorded.build_time_secs.unwrap_or(0.0),
            dependency_count: recorded
                .dependency_count
                .unwrap_or(package.dependency_count),
        };

        let dockerfile = read_optional(&root.join("Dockerfile"))?.unwrap_or_default();
        let env_example = read_optional(&root.join(".env.example"))?.unwrap_or_default();

        let deployment = DeploymentFacts {
            package_manifest: any_exists(&[
                "package.json",
                "Cargo.toml",
                "pyproject.toml",
                "go.mod",
            ]),
            build_script: package.has_script("build") || any_exists(&["Makefile", "build.sh"]),
            start_script: package.has_script("start") || any_exists(&["Procfile", "start.sh"]),
            deployment_config: any_exists(&[
                "Dockerfile",
                "docker-compose.yml",
                "docker-compose.yaml",
                "k8s",
                "deploy",
            ]),
            env_config: exists(".env.example") || exists("config"),
            health_check_script: any_exists(&["scripts/healthcheck.sh", "healthcheck.sh"])
                || package.has_script("healthcheck")
                || dockerfile.contains("HEALTHCHECK"),
            production_ready: [&dockerfile, &env_example, &package.raw]
                .iter()
                .any(|text| text.to_ascii_lowercase().contains("production")),
        };

        Ok(FactSheet {
            security,
            stability,
            performance,
            deployment,
        })
    }

    fn contract_document(
        &self,
        module: &ModuleId,
        repo: &dyn Repository,
    ) -> Result<Option<ContractDocument>, FactsError> {
        let root = self.workdir(module, repo)?;
        for candidate in &self.settings.contract_files {
            let path = root.join(candidate);
            if let Some(content) = read_optional(&path)? {
                return Ok(Some(ContractDocument {
                    path: candidate.clone(),
                    content,
                }));
            }
        }
        Ok(None)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, FactsError> {
    if !path.is_file() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .map_err(|source| FactsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn read_json(path: &Path) -> Result<Option<Value>, FactsError> {
    let Some(content) = read_optional(path)? else {
        return Ok(None);
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| FactsError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn read_package_manifest(root: &Path) -> Result<PackageManifest, FactsError> {
    let package_json = root.join("package.json");
    if let Some(raw) = read_optional(&package_json)? {
        let doc: Value = serde_json::from_str(&raw).map_err(|e| FactsError::Parse {
            path: package_json.clone(),
            message: e.to_string(),
        })?;
        let scripts = doc
            .get("scripts")
            .and_then(Value::as_object)
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default();
        let dependency_count = ["dependencies", "devDependencies"]
            .iter()
            .filter_map(|key| doc.get(*key).and_then(Value::as_object))
            .map(|deps| deps.len())
            .sum();
        return Ok(PackageManifest {
            scripts,
            dependency_count,
            raw,
        });
    }

    let cargo_toml = root.join("Cargo.toml");
    if let Some(raw) = read_optional(&cargo_toml)? {
        let doc: toml::Table = toml::from_str(&raw).map_err(|e| FactsError::Parse {
            path: cargo_toml.clone(),
            message: e.to_string(),
        })?;
        let dependency_count = ["dependencies", "dev-dependencies"]
            .iter()
            .filter_map(|key| doc.get(*key).and_then(toml::Value::as_table))
            .map(|deps| deps.len())
            .sum();
        return Ok(PackageManifest {
            scripts: Vec::new(),
            dependency_count,
            raw,
        });
    }

    Ok(PackageManifest::default())
}

fn ignores_env_files(root: &Path) -> Result<bool, FactsError> {
    let Some(content) = read_optional(&root.join(".gitignore"))? else {
        return Ok(false);
    };
    Ok(content.lines().map(str::trim).any(|line| {
        matches!(line, ".env" | ".env*" | "*.env" | ".env.*" | "/.env" | ".env.local")
    }))
}

fn line_has_secret(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    if lower.contains("-----begin") && lower.contains("private key") {
        return true;
    }
    let Some(key_at) = SECRET_KEYS.iter().filter_map(|k| lower.find(k)).min() else {
        return false;
    };
    let rest = &line[key_at..];
    let Some(assign_at) = rest.find(['=', ':']) else {
        return false;
    };
    let value = rest[assign_at + 1..].trim_start();
    let Some(quote) = value.chars().next().filter(|c| matches!(*c, '"' | '\'' | '`')) else {
        return false;
    };
    let literal = &value[1..];
    let Some(end) = literal.find(quote) else {
        return false;
    };
    let literal = &literal[..end];
    literal.len() >= 8 && !literal.contains("${") && !literal.starts_with('<')
}

fn collect_sources(dir: &Path, out: &mut Vec<(PathBuf, String)>) -> Result<(), FactsError> {
    let entries = fs::read_dir(dir).map_err(|source| FactsError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| FactsError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let Ok(ty) = entry.file_type() else {
            continue;
        };
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if ty.is_dir() {
            if !SKIPPED_DIRS.contains(&&*name) {
                collect_sources(&path, out)?;
            }
            continue;
        }
        if !ty.is_file() {
            continue;
        }

        let is_source = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SOURCE_EXTENSIONS.contains(&e))
            .unwrap_or(false);
        let too_large = entry
            .metadata()
            .map(|m| m.len() > MAX_SCANNED_FILE_BYTES)
            .unwrap_or(true);
        if !is_source || too_large {
            continue;
        }
        // Binary or non-UTF-8 files are not worth sniffing.
        if let Ok(content) = fs::read_to_string(&path) {
            out.push((path, content));
        }
    }
    Ok(())
}

fn dir_size(dir: &Path) -> Result<u64, FactsError> {
    let entries = fs::read_dir(dir).map_err(|source| FactsError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut total = 0;
    for entry in entries {
        let entry = entry.map_err(|source| FactsError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let ty = entry.file_type().map_err(|source| FactsError::Io {
            path: entry.path(),
            source,
        })?;
        if ty.is_dir() {
            total += dir_size(&entry.path())?;
        } else if ty.is_file() {
            total += entry
                .metadata()
                .map_err(|source| FactsError::Io {
                    path: entry.path(),
                    source,
                })?
                .len();
        }
    }
    Ok(total)
}
