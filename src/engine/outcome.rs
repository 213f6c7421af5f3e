use std::process::ExitStatus;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::EngineError;

/// The single result shape returned for every request
///
/// `success` only says the pipeline reached the end of the run phase in
/// time; the program's own exit code is not reflected in it, and
/// `runtime_error` may be non-empty on success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub compile_error: String,
    pub output: String,
    pub runtime_error: String,
}

impl ExecutionOutcome {
    /// The program ran to completion within its time limit
    pub fn completed(stdout: String, stderr: String) -> Self {
        Self {
            success: true,
            compile_error: String::new(),
            output: stdout,
            runtime_error: stderr,
        }
    }

    /// The compiler or build tool exited non-zero
    ///
    /// Diagnostics come from stderr verbatim. Toolchains that report on stdout
    /// only, or not at all, still yield a non-empty `compile_error`.
    pub fn build_failed(status: ExitStatus, stdout: String, stderr: String) -> Self {
        let compile_error = if !stderr.is_empty() {
            stderr
        } else if !stdout.is_empty() {
            stdout
        } else {
            format!("Compilation failed ({status})")
        };
        Self {
            success: false,
            compile_error,
            output: String::new(),
            runtime_error: String::new(),
        }
    }

    pub fn build_timed_out(limit: Duration) -> Self {
        Self {
            success: false,
            compile_error: format!("Compilation timed out (limit: {})", describe_limit(limit)),
            output: String::new(),
            runtime_error: String::new(),
        }
    }

    pub fn run_timed_out(limit: Duration) -> Self {
        Self {
            success: false,
            compile_error: String::new(),
            output: String::new(),
            runtime_error: format!(
                "Program execution timed out (limit: {})",
                describe_limit(limit)
            ),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            success: false,
            compile_error: String::new(),
            output: String::new(),
            runtime_error: "Execution cancelled".to_string(),
        }
    }
}

impl From<EngineError> for ExecutionOutcome {
    fn from(err: EngineError) -> Self {
        let compile_error = match &err {
            EngineError::Internal(e) => format!("Internal error: {e:#}"),
            rejected => rejected.to_string(),
        };
        Self {
            success: false,
            compile_error,
            output: String::new(),
            runtime_error: String::new(),
        }
    }
}

/// Renders a limit as whole seconds when possible, milliseconds otherwise
fn describe_limit(limit: Duration) -> String {
    match (limit.as_secs(), limit.subsec_millis()) {
        (1, 0) => "1 second".to_string(),
        (secs, 0) => format!("{secs} seconds"),
        _ => format!("{} ms", limit.as_millis()),
    }
}
