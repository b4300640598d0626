use std::fs;
use std::path::Path;

use git2::{IndexAddOption, Oid, Repository, Signature};

pub fn init_repo(path: &Path) -> Repository {
    let repo = Repository::init(path).unwrap();
    {
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Test").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
    }
    repo
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn commit_all(repo: &Repository, message: &str) -> Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let sig = Signature::now("Test", "test@example.com").unwrap();
    let head = repo.head();

    match head {
        Ok(head) => {
            let parent = repo.find_commit(head.target().unwrap()).unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
                .unwrap()
        }
        Err(_) => repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[])
            .unwrap(),
    }
}

pub fn tag(repo: &Repository, name: &str, oid: Oid) {
    let object = repo.find_object(oid, None).unwrap();
    repo.tag_lightweight(name, &object, false).unwrap();
}

pub fn branch_name(repo: &Repository) -> String {
    repo.head().unwrap().shorthand().unwrap().to_string()
}

pub const HEALTHY_SOURCE: &str = "\
const helmet = require('helmet');
app.use(helmet());
app.use(passport.authenticate('jwt', { session: false }));
app.get('/health', (req, res) => res.send('ok'));
try {
  start();
} catch (err) {
  console.error(err);
}
";

/// Lay out a module tree that passes every quality gate.
pub fn write_healthy_module(root: &Path, contract: &str) {
    write(root, "SECURITY.md", "Report issues to security@example.com\n");
    write(root, ".gitignore", "node_modules\n.env\n");
    write(root, ".env.example", "NODE_ENV=production\nPORT=8080\n");
    write(
        root,
        "package.json",
        r#"{
  "name": "auth",
  "scripts": {
    "build": "tsc",
    "start": "node dist/index.js",
    "rollback": "./scripts/rollback.sh",
    "healthcheck": "curl -f localhost:8080/health"
  },
  "dependencies": { "express": "^4.19.0" }
}
"#,
    );
    write(root, "Dockerfile", "FROM node:20\nCMD [\"npm\", \"start\"]\n");
    write(root, "src/index.js", HEALTHY_SOURCE);
    write(root, "tests/index.test.js", "test('boots', () => {});\n");
    write(
        root,
        ".modship/facts.toml",
        "build_passed = true\nvulnerability_count = 0\ntest_coverage = 82.0\n",
    );
    write(root, "contract.json", contract);
}
