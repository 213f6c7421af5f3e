use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};

use super::{DependencySet, Language};

/// Process-wide sequence making workspace names readable and ordered
static WORKSPACE_SEQ: AtomicU64 = AtomicU64::new(0);

const PROJECT_DIR: &str = "project";
const EXECUTABLE_NAME: &str = "main";

/// An ephemeral directory owned by exactly one request
///
/// The directory and everything built inside it are removed when the value
/// is dropped, whichever way the pipeline exits.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    source: PathBuf,
}

impl Workspace {
    /// Creates a uniquely named directory under `parent` and stages the source in it
    pub fn create(parent: &Path, language: Language, code: &str) -> Result<Self> {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create workspace root {}", parent.display()))?;

        let seq = WORKSPACE_SEQ.fetch_add(1, Ordering::Relaxed);
        let prefix = format!("job-{}-{seq}-", std::process::id());
        let root = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(parent)
            .with_context(|| format!("failed to allocate workspace in {}", parent.display()))?
            .keep();

        // Drop owns the directory from this point on
        let workspace = Self {
            source: root.join(language.source_file_name()),
            root,
        };

        fs::write(&workspace.source, code).with_context(|| {
            format!("failed to write source to {}", workspace.source.display())
        })?;
        log::debug!("Staged {language} source in {}", workspace.root.display());

        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn source_path(&self) -> &Path {
        &self.source
    }

    /// Where a direct compile writes its executable
    pub fn executable_path(&self) -> PathBuf {
        self.root.join(EXECUTABLE_NAME)
    }

    pub fn project_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    /// Lays out a cargo project declaring `deps`, with the staged source as its binary
    pub fn materialize_project(&self, deps: &DependencySet, edition: &str) -> Result<PathBuf> {
        let project = self.project_dir();
        let src_dir = project.join("src");
        fs::create_dir_all(&src_dir)
            .with_context(|| format!("failed to create {}", src_dir.display()))?;

        fs::write(project.join("Cargo.toml"), render_manifest(deps, edition))
            .context("failed to write Cargo.toml")?;
        fs::copy(&self.source, src_dir.join("main.rs"))
            .context("failed to stage source into project")?;

        log::debug!(
            "Materialized cargo project with {} dependencies in {}",
            deps.len(),
            project.display()
        );
        Ok(project)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => log::debug!("Removed workspace {}", self.root.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove workspace {}: {e}", self.root.display()),
        }
    }
}

/// Renders a manifest that pins every dependency to any version
pub fn render_manifest(deps: &DependencySet, edition: &str) -> String {
    let mut manifest = format!(
        "[package]\nname = \"main\"\nversion = \"0.1.0\"\nedition = \"{edition}\"\n\n[dependencies]\n"
    );
    for name in deps.iter() {
        let _ = writeln!(manifest, "{name} = \"*\"");
    }
    manifest
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_workspace_is_staged_and_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(parent.path(), Language::C, "int main(){}").unwrap();
        let root = workspace.path().to_path_buf();

        assert!(root.starts_with(parent.path()));
        assert_eq!(workspace.source_path(), root.join("main.c"));
        assert_eq!(fs::read_to_string(workspace.source_path()).unwrap(), "int main(){}");
        assert_eq!(workspace.executable_path(), root.join("main"));

        drop(workspace);
        assert!(!root.exists());
    }

    #[test]
    fn test_concurrent_workspaces_get_distinct_directories() {
        let parent = tempfile::tempdir().unwrap();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let parent = parent.path().to_path_buf();
                std::thread::spawn(move || {
                    let ws = Workspace::create(&parent, Language::Python, "print(1)").unwrap();
                    let path = ws.path().to_path_buf();
                    (ws, path)
                })
            })
            .collect();

        let mut held = Vec::new();
        let mut paths = std::collections::HashSet::new();
        for handle in handles {
            let (ws, path) = handle.join().unwrap();
            assert!(paths.insert(path));
            held.push(ws);
        }
        assert_eq!(paths.len(), 16);
        drop(held);
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[test]
    fn test_materialized_project_layout() {
        let parent = tempfile::tempdir().unwrap();
        let code = "use rand::Rng;\nfn main() {}\n";
        let workspace = Workspace::create(parent.path(), Language::Rust, code).unwrap();
        let deps = DependencySet::from_iter(["rand", "itertools"]);

        let project = workspace.materialize_project(&deps, "2021").unwrap();

        assert_eq!(project, workspace.path().join("project"));
        assert_eq!(fs::read_to_string(project.join("src/main.rs")).unwrap(), code);
        let manifest = fs::read_to_string(project.join("Cargo.toml")).unwrap();
        assert!(manifest.contains("edition = \"2021\""));
        assert!(manifest.ends_with("[dependencies]\nitertools = \"*\"\nrand = \"*\"\n"));
    }

    #[test]
    fn test_manifest_without_dependencies() {
        assert_eq!(
            render_manifest(&DependencySet::default(), "2024"),
            "[package]\nname = \"main\"\nversion = \"0.1.0\"\nedition = \"2024\"\n\n[dependencies]\n"
        );
    }
}
