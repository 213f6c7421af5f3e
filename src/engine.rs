mod deps;
mod language;
mod outcome;
mod plan;
mod process;
mod validate;
mod workspace;

pub use deps::{DependencyDetector, DependencySet, HeuristicDetector};
pub use language::Language;
pub use outcome::ExecutionOutcome;
pub use plan::{BuildPlan, BuildStep, BuildStrategy, CommandSpec};
pub use process::{ProcessOutcome, SupervisedChild, run_supervised};
pub use validate::validate;
pub use workspace::{Workspace, render_manifest};

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;

/// Everything that can stop a request short of a completed run
///
/// Build failures and timeouts are not errors; they are ordinary outcomes.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("No source code provided")]
    EmptyInput,
    /// Missing toolchain binaries and filesystem failures alike
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// One submission as handed to the engine
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub language: String,
    pub code: String,
    pub stdin: String,
    /// Appended verbatim to the compiler invocation
    pub options: Vec<String>,
}

/// Compiles and runs submissions with external toolchains
///
/// Holds configuration only. Each call stages its own workspace and spawns
/// its own processes, so one `Engine` can serve any number of requests at
/// once.
pub struct Engine {
    config: EngineConfig,
    workspace_root: PathBuf,
    detector: Box<dyn DependencyDetector>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_detector(config, HeuristicDetector)
    }

    pub fn with_detector(config: EngineConfig, detector: impl DependencyDetector + 'static) -> Self {
        let workspace_root = config.workspace_root();
        Self {
            config,
            workspace_root,
            detector: Box::new(detector),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Runs one request to completion; never fails, see [`ExecutionOutcome`]
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        self.execute_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`Engine::execute`], but `token` aborts whichever phase is active
    pub async fn execute_with_cancel(
        &self,
        request: &ExecutionRequest,
        token: &CancellationToken,
    ) -> ExecutionOutcome {
        match self.run_pipeline(request, token).await {
            Ok(outcome) => outcome,
            Err(e) => {
                match &e {
                    EngineError::Internal(cause) => {
                        log::error!("Internal error while executing {} request: {cause:#}", request.language)
                    }
                    rejected => log::info!("Rejected request: {rejected}"),
                }
                ExecutionOutcome::from(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        request: &ExecutionRequest,
        token: &CancellationToken,
    ) -> Result<ExecutionOutcome, EngineError> {
        let language = validate(&request.language, &request.code)?;

        // Removed when this frame unwinds, on every return path below
        let workspace = Workspace::create(&self.workspace_root, language, &request.code)?;

        let deps = if language.has_package_ecosystem() {
            self.detector.detect(&request.code)
        } else {
            DependencySet::default()
        };

        let toolchains = &self.config.toolchains;
        let plan = language.plan(
            &workspace,
            &deps,
            toolchains,
            &self.config.limits,
            &request.options,
        );
        log::debug!(
            "Planned {:?} for {language} in {}",
            plan.strategy,
            workspace.path().display()
        );

        if plan.strategy == BuildStrategy::ProjectBuild {
            workspace.materialize_project(&deps, &toolchains.rust_edition)?;
        }

        if let Some(step) = &plan.build {
            match run_supervised(&step.command, None, step.timeout, token).await? {
                ProcessOutcome::Exited { status, .. } if status.success() => {
                    log::debug!("Build succeeded in {}", workspace.path().display());
                }
                ProcessOutcome::Exited {
                    status,
                    stdout,
                    stderr,
                } => {
                    log::info!("Build of {language} submission failed: {status}");
                    return Ok(ExecutionOutcome::build_failed(status, stdout, stderr));
                }
                ProcessOutcome::TimedOut { limit } => {
                    return Ok(ExecutionOutcome::build_timed_out(limit));
                }
                ProcessOutcome::Cancelled => return Ok(ExecutionOutcome::cancelled()),
            }
        }

        let run_limit = self.config.limits.run_timeout_ms.into();
        let outcome = match run_supervised(&plan.run, Some(&request.stdin), run_limit, token).await? {
            ProcessOutcome::Exited {
                status,
                stdout,
                stderr,
            } => {
                log::info!("Run of {language} submission finished: {status}");
                ExecutionOutcome::completed(stdout, stderr)
            }
            ProcessOutcome::TimedOut { limit } => ExecutionOutcome::run_timed_out(limit),
            ProcessOutcome::Cancelled => ExecutionOutcome::cancelled(),
        };

        drop(workspace);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysDepends;

    impl DependencyDetector for AlwaysDepends {
        fn detect(&self, _source: &str) -> DependencySet {
            DependencySet::from_iter(["anything"])
        }
    }

    fn engine_in(root: &Path, detector: impl DependencyDetector + 'static) -> Engine {
        let mut config = EngineConfig::default();
        config.workspace_root = Some(root.to_path_buf());
        config.toolchains.cargo = "definitely-not-cargo".to_string();
        Engine::with_detector(config, detector)
    }

    #[tokio::test]
    async fn test_rejection_allocates_nothing() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine_in(root.path(), HeuristicDetector);
        let request = ExecutionRequest {
            language: "fortran".into(),
            code: "program hi".into(),
            stdin: String::new(),
            options: Vec::new(),
        };

        let outcome = engine.execute(&request).await;
        assert!(!outcome.success);
        assert_eq!(outcome.compile_error, "Unsupported language: fortran");
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_detector_is_swappable_and_missing_toolchain_is_internal() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine_in(root.path(), AlwaysDepends);
        let request = ExecutionRequest {
            language: "rust".into(),
            code: "fn main() {}".into(),
            stdin: String::new(),
            options: Vec::new(),
        };

        let outcome = engine.execute(&request).await;
        assert!(!outcome.success);
        assert!(outcome.compile_error.starts_with("Internal error: failed to spawn `definitely-not-cargo`"));
        assert!(outcome.output.is_empty());
        assert!(outcome.runtime_error.is_empty());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
