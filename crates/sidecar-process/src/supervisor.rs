// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Spawns a command in its own process group and supervises it to completion.

use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sidecar_core::hub::{Replay, OverflowPolicy};
use sidecar_core::{SidecarError, SubscriptionHub};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::PhasePlan;

/// Controls which of the child's standard streams are piped back for
/// line-oriented streaming versus inherited/discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StdioPolicy {
    /// stdout/stderr both inherited from this process (useful for local debugging).
    Inherit,
    /// stdout/stderr both discarded.
    #[default]
    Null,
    /// stdout is piped and streamed line-by-line via [`ProcessSupervisor::stdout_hub`];
    /// stderr is discarded.
    CaptureStdout,
    /// Both streams are piped and streamed.
    CaptureBoth,
}

impl StdioPolicy {
    const fn stdout(self) -> Stdio {
        match self {
            Self::Inherit => Stdio::inherit(),
            Self::Null => Stdio::null(),
            Self::CaptureStdout | Self::CaptureBoth => Stdio::piped(),
        }
    }

    const fn stderr(self) -> Stdio {
        match self {
            Self::Inherit => Stdio::inherit(),
            Self::Null | Self::CaptureStdout => Stdio::null(),
            Self::CaptureBoth => Stdio::piped(),
        }
    }
}

/// The outcome of a supervised process once its completion signal has fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitResult {
    pub exit_code: Option<i32>,
    pub signalled_by: Option<i32>,
}

impl WaitResult {
    fn from_exit_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            Self { exit_code: status.code(), signalled_by: status.signal() }
        }
        #[cfg(not(unix))]
        {
            Self { exit_code: status.code(), signalled_by: None }
        }
    }
}

/// Spawns `command` inside its own process group and exposes an async
/// completion signal plus an escalating-signal shutdown ladder.
pub struct ProcessSupervisor {
    pid: i32,
    pgid: i32,
    completion_rx: watch::Receiver<Option<WaitResult>>,
    stdout_hub: Option<SubscriptionHub<String>>,
    stderr_hub: Option<SubscriptionHub<String>>,
}

fn spawn_line_reader(
    reader: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    hub: SubscriptionHub<String>,
    stream_name: &'static str,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => hub.publish(line),
                Ok(None) => break,
                Err(err) => {
                    warn!(stream = stream_name, error = %err, "error reading child stream");
                    break;
                },
            }
        }
        hub.close();
    });
}

impl ProcessSupervisor {
    /// Starts `command` with `args` inside a new process group.
    ///
    /// # Errors
    /// Returns [`SidecarError::SpawnFailed`] if the OS refuses to start the
    /// child; on success a background waiter task is started that will set
    /// the completion signal when the child exits.
    pub fn start(
        command: &str,
        args: &[String],
        stdio: StdioPolicy,
    ) -> Result<Self, SidecarError> {
        let mut tokio_cmd = build_command(command, args, stdio);

        let mut child: Child = tokio_cmd.spawn().map_err(|err| {
            SidecarError::SpawnFailed(format!("failed to spawn '{command}': {err}"))
        })?;

        let pid = child
            .id()
            .ok_or_else(|| SidecarError::SpawnFailed("child exited before pid was available".to_string()))?
            as i32;
        // process_group(0) makes the child the leader of its own group.
        let pgid = pid;

        let stdout_hub = match stdio {
            StdioPolicy::CaptureStdout | StdioPolicy::CaptureBoth => {
                let hub = SubscriptionHub::new();
                if let Some(stdout) = child.stdout.take() {
                    spawn_line_reader(stdout, hub.clone(), "stdout");
                }
                Some(hub)
            },
            _ => None,
        };
        let stderr_hub = match stdio {
            StdioPolicy::CaptureBoth => {
                let hub = SubscriptionHub::new();
                if let Some(stderr) = child.stderr.take() {
                    spawn_line_reader(stderr, hub.clone(), "stderr");
                }
                Some(hub)
            },
            _ => None,
        };

        let (tx, rx) = watch::channel(None);
        tokio::spawn(async move {
            let wait = child.wait().await;
            let result = match wait {
                Ok(status) => WaitResult::from_exit_status(status),
                Err(err) => {
                    warn!(pid, error = %err, "failed to reap child process");
                    WaitResult { exit_code: None, signalled_by: None }
                },
            };
            debug!(pid, ?result, "supervised process terminated");
            let _ = tx.send(Some(result));
        });

        info!(pid, pgid, command, "spawned supervised process");
        Ok(Self { pid, pgid, completion_rx: rx, stdout_hub, stderr_hub })
    }

    #[must_use]
    pub const fn pid(&self) -> i32 {
        self.pid
    }

    #[must_use]
    pub const fn pgid(&self) -> i32 {
        self.pgid
    }

    /// True iff the completion signal has not fired yet.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.completion_rx.borrow().is_none()
    }

    /// Non-blocking peek at the completion signal: `None` while the child is
    /// still running, `Some` once it has exited.
    #[must_use]
    pub fn completion(&self) -> Option<WaitResult> {
        self.completion_rx.borrow().clone()
    }

    /// Resolves once the completion signal has fired. Safe to call
    /// concurrently from many callers; each gets its own cursor on the
    /// underlying watch channel.
    pub async fn wait_result(&self) -> WaitResult {
        let mut rx = self.completion_rx.clone();
        loop {
            if let Some(result) = rx.borrow().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                // Sender dropped without ever sending: treat as an unknown termination.
                return WaitResult { exit_code: None, signalled_by: None };
            }
        }
    }

    /// Streamed stdout lines, if [`StdioPolicy::CaptureStdout`] or
    /// [`StdioPolicy::CaptureBoth`] was used at spawn time.
    #[must_use]
    pub fn stdout_hub(&self) -> Option<&SubscriptionHub<String>> {
        self.stdout_hub.as_ref()
    }

    #[must_use]
    pub fn stderr_hub(&self) -> Option<&SubscriptionHub<String>> {
        self.stderr_hub.as_ref()
    }

    /// Sends `SIGSTOP` to the whole process group. No-op if already terminated.
    pub fn pause(&self) {
        if self.is_running() {
            self.send_signal(Signal::SIGSTOP);
        }
    }

    /// Sends `SIGCONT` to the whole process group. No-op if already terminated.
    pub fn resume(&self) {
        if self.is_running() {
            self.send_signal(Signal::SIGCONT);
        }
    }

    fn send_signal(&self, signal: Signal) {
        // Negative pid addresses the whole process group.
        match kill(Pid::from_raw(-self.pgid), signal) {
            Ok(()) => debug!(pgid = self.pgid, ?signal, "sent signal to process group"),
            Err(nix::errno::Errno::ESRCH) => {
                debug!(pgid = self.pgid, "process group already gone");
            },
            Err(err) => warn!(pgid = self.pgid, ?signal, error = %err, "failed to send signal"),
        }
    }

    /// Runs `plan` phase by phase until the completion signal fires.
    ///
    /// # Errors
    /// Returns [`SidecarError::ShutdownTimeout`] if every phase in the plan
    /// times out without observing termination.
    pub async fn shutdown(&self, plan: &PhasePlan) -> Result<(), SidecarError> {
        if !self.is_running() {
            return Ok(());
        }

        for phase in plan.phases() {
            if !self.is_running() {
                return Ok(());
            }

            for (i, signal) in phase.signals.iter().enumerate() {
                self.send_signal(*signal);
                if i + 1 < phase.signals.len() {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }

            let outcome = tokio::time::timeout(phase.timeout, self.wait_result()).await;
            if outcome.is_ok() {
                return Ok(());
            }
        }

        Err(SidecarError::ShutdownTimeout(format!(
            "process group {} did not terminate after the full escalation ladder",
            self.pgid
        )))
    }
}

#[cfg(unix)]
fn build_command(command: &str, args: &[String], stdio: StdioPolicy) -> TokioCommand {
    use std::os::unix::process::CommandExt;

    let mut std_cmd = std::process::Command::new(command);
    std_cmd.args(args);
    // A pgid of 0 makes the child the leader of a brand new process group,
    // equal to its own pid. This lets `shutdown` signal the whole group.
    std_cmd.process_group(0);
    std_cmd.stdin(Stdio::null());
    std_cmd.stdout(stdio.stdout());
    std_cmd.stderr(stdio.stderr());
    TokioCommand::from(std_cmd)
}

#[cfg(not(unix))]
fn build_command(command: &str, args: &[String], stdio: StdioPolicy) -> TokioCommand {
    let mut cmd = TokioCommand::new(command);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(stdio.stdout());
    cmd.stderr(stdio.stderr());
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_and_immediate_shutdown() {
        let supervisor =
            ProcessSupervisor::start("sleep", &["5".to_string()], StdioPolicy::Null).unwrap();
        assert!(supervisor.is_running());

        supervisor.shutdown(&PhasePlan::immediate()).await.unwrap();
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn spawn_failed_for_missing_binary() {
        let err = ProcessSupervisor::start(
            "definitely-not-a-real-binary-xyz",
            &[],
            StdioPolicy::Null,
        )
        .unwrap_err();
        assert!(matches!(err, SidecarError::SpawnFailed(_)));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_after_natural_exit() {
        let supervisor =
            ProcessSupervisor::start("true", &[], StdioPolicy::Null).unwrap();
        let result = supervisor.wait_result().await;
        assert_eq!(result.exit_code, Some(0));

        // Second shutdown call on an already-terminated process is a no-op success.
        supervisor.shutdown(&PhasePlan::graceful()).await.unwrap();
    }

    #[tokio::test]
    async fn completion_is_none_while_running_then_reflects_exit_code() {
        let supervisor =
            ProcessSupervisor::start("sleep", &["5".to_string()], StdioPolicy::Null).unwrap();
        assert_eq!(supervisor.completion(), None);

        supervisor.shutdown(&PhasePlan::immediate()).await.unwrap();
        let wait = supervisor.completion().expect("completion signal fired after shutdown");
        assert_ne!(wait.exit_code, Some(0));
    }

    #[tokio::test]
    async fn stdout_capture_streams_lines() {
        let supervisor = ProcessSupervisor::start(
            "sh",
            &["-c".to_string(), "echo one; echo two".to_string()],
            StdioPolicy::CaptureStdout,
        )
        .unwrap();
        let hub = supervisor.stdout_hub().unwrap().clone();
        let sub = hub.subscribe(8, OverflowPolicy::DropOldest, Replay::None).unwrap();

        supervisor.wait_result().await;
        assert_eq!(sub.recv().await, Some("one".to_string()));
        assert_eq!(sub.recv().await, Some("two".to_string()));
    }
}
