use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{Limits, Toolchains};

use super::{DependencySet, Language, Workspace};

/// Separator cargo expects between entries of `CARGO_ENCODED_RUSTFLAGS`
const ENCODED_FLAG_SEPARATOR: &str = "\x1f";

/// A fully resolved child-process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: PathBuf,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    fn new(program: impl Into<String>, current_dir: &Path) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: current_dir.to_path_buf(),
            envs: Vec::new(),
        }
    }

    fn arg(mut self, arg: impl AsRef<Path>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.envs.push((key.to_string(), value.into()));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStrategy {
    /// Hand the source file to an interpreter; nothing to build
    Interpret,
    /// One compiler invocation producing a single executable
    DirectCompile,
    /// Generate a cargo project and let cargo resolve, build and run it
    ProjectBuild,
}

/// What to spawn for the build and run phases of one request
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub strategy: BuildStrategy,
    pub build: Option<BuildStep>,
    pub run: CommandSpec,
}

#[derive(Debug, Clone)]
pub struct BuildStep {
    pub command: CommandSpec,
    pub timeout: Duration,
}

impl Language {
    /// Chooses the build strategy and the exact commands for a staged workspace
    ///
    /// Pure: nothing is written or spawned here. A `ProjectBuild` plan expects
    /// the caller to materialize the project before running the build step.
    pub fn plan(
        self,
        workspace: &Workspace,
        deps: &DependencySet,
        toolchains: &Toolchains,
        limits: &Limits,
        flags: &[String],
    ) -> BuildPlan {
        let root = workspace.path();
        let source = workspace.source_path();
        let executable = workspace.executable_path();

        let direct = |compiler: &str, leading: &[&str]| {
            let build = CommandSpec::new(compiler, root)
                .args(leading.iter().copied())
                .arg(source)
                .arg("-o")
                .arg(&executable)
                .args(flags.iter().cloned());
            BuildPlan {
                strategy: BuildStrategy::DirectCompile,
                build: Some(BuildStep {
                    command: build,
                    timeout: limits.compile_timeout_ms.into(),
                }),
                run: CommandSpec::new(executable.to_string_lossy(), root),
            }
        };

        match self {
            Self::Python => BuildPlan {
                strategy: BuildStrategy::Interpret,
                build: None,
                run: CommandSpec::new(&toolchains.python, root).arg(source),
            },
            Self::C => direct(&toolchains.c, &[]),
            Self::Cpp => direct(&toolchains.cpp, &[]),
            Self::Rust if !deps.requires_project_build() => {
                direct(&toolchains.rustc, &["--edition", toolchains.rust_edition.as_str()])
            }
            Self::Rust => {
                let project = workspace.project_dir();
                let cargo = |subcommand: &str| {
                    let spec = CommandSpec::new(&toolchains.cargo, &project)
                        .args([subcommand, "--quiet"])
                        .env("CARGO_TARGET_DIR", project.join("target").to_string_lossy());
                    if flags.is_empty() {
                        spec
                    } else {
                        spec.env("CARGO_ENCODED_RUSTFLAGS", flags.join(ENCODED_FLAG_SEPARATOR))
                    }
                };
                BuildPlan {
                    strategy: BuildStrategy::ProjectBuild,
                    build: Some(BuildStep {
                        command: cargo("build"),
                        timeout: limits.project_build_timeout_ms.into(),
                    }),
                    run: cargo("run"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn plan_for(
        language: Language,
        code: &str,
        deps: DependencySet,
        flags: &[&str],
    ) -> (tempfile::TempDir, Workspace, BuildPlan) {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(parent.path(), language, code).unwrap();
        let flags: Vec<String> = flags.iter().map(|f| f.to_string()).collect();
        let plan = language.plan(
            &workspace,
            &deps,
            &Toolchains::default(),
            &Limits::default(),
            &flags,
        );
        (parent, workspace, plan)
    }

    #[test]
    fn test_python_is_interpreted_without_build() {
        let (_parent, ws, plan) = plan_for(Language::Python, "print(1)", DependencySet::default(), &["-O2"]);
        assert_eq!(plan.strategy, BuildStrategy::Interpret);
        assert!(plan.build.is_none());
        assert_eq!(plan.run.program, "python3");
        assert_eq!(plan.run.args, vec![ws.source_path().to_string_lossy().into_owned()]);
    }

    #[test]
    fn test_c_compiles_directly_with_flags_last() {
        let (_parent, ws, plan) = plan_for(Language::C, "int main(){}", DependencySet::default(), &["-O2", "-lm"]);
        assert_eq!(plan.strategy, BuildStrategy::DirectCompile);

        let build = plan.build.unwrap();
        assert_eq!(build.timeout, Duration::from_secs(30));
        assert_eq!(build.command.program, "gcc");
        assert_eq!(
            build.command.args,
            vec![
                ws.source_path().to_string_lossy().into_owned(),
                "-o".to_string(),
                ws.executable_path().to_string_lossy().into_owned(),
                "-O2".to_string(),
                "-lm".to_string(),
            ]
        );
        assert_eq!(plan.run.program, ws.executable_path().to_string_lossy());
        assert!(plan.run.args.is_empty());
    }

    #[test]
    fn test_cpp_uses_cpp_compiler() {
        let (_parent, _ws, plan) = plan_for(Language::Cpp, "int main(){}", DependencySet::default(), &[]);
        assert_eq!(plan.build.unwrap().command.program, "g++");
    }

    #[test]
    fn test_rust_without_dependencies_uses_rustc() {
        let (_parent, ws, plan) = plan_for(Language::Rust, "fn main(){}", DependencySet::default(), &["-O"]);
        assert_eq!(plan.strategy, BuildStrategy::DirectCompile);
        let build = plan.build.unwrap();
        assert_eq!(build.command.program, "rustc");
        assert_eq!(&build.command.args[..2], ["--edition", "2021"]);
        assert_eq!(build.command.args[2], ws.source_path().to_string_lossy());
        assert_eq!(build.command.args.last().unwrap(), "-O");
    }

    #[test]
    fn test_rust_with_dependencies_builds_a_project() {
        let deps = DependencySet::from_iter(["rand"]);
        let (_parent, ws, plan) = plan_for(Language::Rust, "use rand::Rng;", deps, &["-C", "opt-level=2"]);
        assert_eq!(plan.strategy, BuildStrategy::ProjectBuild);

        let build = plan.build.unwrap();
        assert_eq!(build.timeout, Duration::from_secs(300));
        assert_eq!(build.command.program, "cargo");
        assert_eq!(build.command.args, vec!["build", "--quiet"]);
        assert_eq!(build.command.current_dir, ws.project_dir());
        assert!(build.command.envs.contains(&(
            "CARGO_ENCODED_RUSTFLAGS".to_string(),
            "-C\x1fopt-level=2".to_string()
        )));

        assert_eq!(plan.run.args, vec!["run", "--quiet"]);
        assert_eq!(plan.run.envs, build.command.envs);
    }

    #[test]
    fn test_project_build_without_flags_leaves_rustflags_alone() {
        let deps = DependencySet::from_iter(["rand"]);
        let (_parent, _ws, plan) = plan_for(Language::Rust, "use rand::Rng;", deps, &[]);
        assert!(plan.run.envs.iter().all(|(k, _)| k != "CARGO_ENCODED_RUSTFLAGS"));
    }
}
