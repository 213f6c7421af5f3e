use std::io;
use std::os::unix::process::CommandExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::CommandSpec;

/// How a supervised child process ended
#[derive(Debug)]
pub enum ProcessOutcome {
    Exited {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    TimedOut {
        limit: Duration,
    },
    Cancelled,
}

/// The process group of a spawned child; every member is killed on drop
///
/// A group id cannot be recycled while any member is still alive, so the
/// final `killpg` never reaches an unrelated group that still matters.
#[derive(Debug)]
struct ProcessGroup {
    pgid: Option<libc::pid_t>,
}

impl ProcessGroup {
    /// One-shot; later calls are no-ops
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            // SAFETY: killpg has no memory-safety preconditions
            let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
            if rc == 0 {
                log::debug!("Sent SIGKILL to process group {pgid}");
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// A child process whose whole group is terminated and reaped when the
/// supervising scope ends, on every path out of it
pub struct SupervisedChild {
    program: String,
    child: Child,
    group: ProcessGroup,
    stdin_writer: Option<JoinHandle<()>>,
    stdout: JoinHandle<io::Result<Vec<u8>>>,
    stderr: JoinHandle<io::Result<Vec<u8>>>,
}

enum Waited {
    Exited(io::Result<ExitStatus>),
    Deadline,
    Cancelled,
}

impl SupervisedChild {
    /// Spawns `spec` in a fresh process group with captured output
    ///
    /// When `input` is given it is fed to the child's stdin from a separate
    /// task, so a child that never reads cannot stall output collection.
    pub fn spawn(spec: &CommandSpec, input: Option<&str>) -> Result<Self> {
        let mut std_command = std::process::Command::new(&spec.program);
        std_command
            .args(&spec.args)
            .current_dir(&spec.current_dir)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .process_group(0);

        let mut command = Command::from(std_command);
        command
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", spec.program))?;
        let group = ProcessGroup {
            pgid: child.id().map(|id| id as libc::pid_t),
        };
        log::debug!("Spawned `{}` as process group {:?}", spec.program, group.pgid);

        let stdin_writer = match (child.stdin.take(), input) {
            (Some(mut pipe), Some(input)) => {
                let input = input.to_owned();
                Some(tokio::spawn(async move {
                    if let Err(e) = pipe.write_all(input.as_bytes()).await {
                        // Exiting without reading stdin is legitimate
                        if e.kind() != io::ErrorKind::BrokenPipe {
                            log::debug!("Failed to feed child stdin: {e}");
                        }
                    }
                }))
            }
            _ => None,
        };

        Ok(Self {
            program: spec.program.clone(),
            stdout: drain(child.stdout.take()),
            stderr: drain(child.stderr.take()),
            child,
            group,
            stdin_writer,
        })
    }

    /// Waits for the child and its output under a wall-clock deadline
    ///
    /// Descendants that keep the output pipes open also count against the
    /// deadline. On expiry or cancellation the group is killed and the child
    /// reaped before returning.
    pub async fn wait(&mut self, limit: Duration, token: &CancellationToken) -> Result<ProcessOutcome> {
        let deadline = Instant::now() + limit;

        let waited = tokio::select! {
            res = tokio::time::timeout_at(deadline, self.child.wait()) => match res {
                Ok(status) => Waited::Exited(status),
                Err(_) => Waited::Deadline,
            },
            _ = token.cancelled() => Waited::Cancelled,
        };

        let status = match waited {
            Waited::Exited(status) => {
                status.with_context(|| format!("failed to wait for `{}`", self.program))?
            }
            Waited::Deadline => return Ok(self.terminate(ProcessOutcome::TimedOut { limit }).await),
            Waited::Cancelled => return Ok(self.terminate(ProcessOutcome::Cancelled).await),
        };

        let (stdout, stderr) = (&mut self.stdout, &mut self.stderr);
        let drained = tokio::select! {
            res = tokio::time::timeout_at(deadline, async move { tokio::join!(stdout, stderr) }) => match res {
                Ok(outputs) => Some(outputs),
                Err(_) => None,
            },
            _ = token.cancelled() => return Ok(self.terminate(ProcessOutcome::Cancelled).await),
        };

        match drained {
            Some((stdout, stderr)) => {
                // Orphans left behind by a finished leader go with its group
                self.group.kill();
                Ok(ProcessOutcome::Exited {
                    status,
                    stdout: decode(stdout).context("failed to read stdout")?,
                    stderr: decode(stderr).context("failed to read stderr")?,
                })
            }
            None => Ok(self.terminate(ProcessOutcome::TimedOut { limit }).await),
        }
    }

    async fn terminate(&mut self, outcome: ProcessOutcome) -> ProcessOutcome {
        self.group.kill();
        if let Err(e) = self.child.kill().await {
            // Already reaped leaders report an error here
            log::debug!("Killing `{}` returned: {e}", self.program);
        }
        for task in [&self.stdout, &self.stderr] {
            task.abort();
        }
        if let Some(writer) = &self.stdin_writer {
            writer.abort();
        }
        log::info!("Terminated `{}`: {outcome:?}", self.program);
        outcome
    }
}

/// Spawns `spec` and waits for it; the whole group is gone when this returns
pub async fn run_supervised(
    spec: &CommandSpec,
    input: Option<&str>,
    limit: Duration,
    token: &CancellationToken,
) -> Result<ProcessOutcome> {
    let mut child = SupervisedChild::spawn(spec, input)?;
    child.wait(limit, token).await
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok(buf)
    })
}

fn decode(joined: Result<io::Result<Vec<u8>>, tokio::task::JoinError>) -> Result<String> {
    let bytes = joined.context("output reader task failed")??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
