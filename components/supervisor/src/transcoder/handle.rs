//! Handle to a running transcoder process.
//!
//! Mirrors the shape of the teacher's `ffmpeg::Restreamer` /
//! `RestreamerKind::run_ffmpeg_`: spawn the binary with piped stderr, drain
//! it on a dedicated task so the scheduler is never blocked, and watch for
//! exit through a channel rather than blocking on `wait()` in the caller.

use std::{ffi::OsStr, os::unix::process::ExitStatusExt as _, process::Stdio, rc::Rc, time::Duration};

use chrono::{DateTime, Utc};
use libc::pid_t;
use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tokio::{
    io::{AsyncBufReadExt as _, BufReader},
    process::{Child, Command},
    sync::watch,
};

use crate::error::SupervisorError;

/// Exit diagnostics captured once a transcoder process has terminated.
#[derive(Clone, Debug, Default)]
pub struct ExitInfo {
    /// Process exit code, or [`None`] if it was killed by a signal.
    pub exit_code: Option<i32>,
    /// Signal the process was terminated by, if any.
    pub signal: Option<i32>,
    /// Tail of captured stderr output (at most ~500 bytes).
    pub stderr_tail: String,
}

#[derive(Debug)]
enum Observed {
    Running,
    Exited(ExitInfo),
}

/// Handle to a running external transcoder process.
///
/// Never blocks the scheduler: stderr is drained on a dedicated cooperative
/// task, and exit is observed through a [`watch`] channel rather than a
/// blocking wait.
#[derive(Debug)]
pub struct Handle {
    pid: u32,
    started_at: DateTime<Utc>,
    observed: watch::Receiver<Observed>,
    kill_tx: watch::Sender<bool>,
}

const STDERR_TAIL_BYTES: usize = 500;

impl Handle {
    /// Spawns `program` with `args`, piping stderr through a classifying
    /// line reader that invokes `on_log_line` for every line observed.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::SpawnFailed`] if the binary cannot be
    /// launched.
    pub fn spawn<I, S>(
        program: impl AsRef<OsStr>,
        args: I,
        on_log_line: impl Fn(&str) + 'static,
    ) -> Result<Self, SupervisorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(program.as_ref());
        let _ = cmd
            .args(args)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child: Child = cmd
            .spawn()
            .map_err(|e| SupervisorError::SpawnFailed(e.to_string()))?;

        let pid = child
            .id()
            .ok_or_else(|| SupervisorError::SpawnFailed("no pid after spawn".into()))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SupervisorError::SpawnFailed("stderr not piped".into()))?;

        let (observed_tx, observed_rx) = watch::channel(Observed::Running);
        let (kill_tx, mut kill_rx) = watch::channel(false);
        // Avoid an instant resolve on the first `changed().await` below.
        let _ = *kill_rx.borrow_and_update();

        let tail = Rc::new(std::cell::RefCell::new(String::new()));
        let tail_for_reader = Rc::clone(&tail);

        let _reader = tokio::task::spawn_local(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                on_log_line(&line);
                let mut buf = tail_for_reader.borrow_mut();
                buf.push_str(&line);
                buf.push('\n');
                if buf.len() > STDERR_TAIL_BYTES {
                    let start = buf.len() - STDERR_TAIL_BYTES;
                    *buf = buf[start..].to_owned();
                }
            }
        });

        let _waiter = tokio::task::spawn_local(async move {
            let kill_task = tokio::task::spawn_local(async move {
                if kill_rx.changed().await.is_ok() && *kill_rx.borrow() {
                    let raw: pid_t = pid as pid_t;
                    let _ = signal::kill(Pid::from_raw(raw), Signal::SIGTERM);
                }
            });

            let status = child.wait().await;
            kill_task.abort();

            let exit_info = match status {
                Ok(status) => ExitInfo {
                    exit_code: status.code(),
                    signal: status.signal(),
                    stderr_tail: tail.borrow().clone(),
                },
                Err(e) => ExitInfo {
                    exit_code: None,
                    signal: None,
                    stderr_tail: format!("failed to wait for process: {e}"),
                },
            };

            let _ = observed_tx.send(Observed::Exited(exit_info));
        });

        Ok(Self {
            pid,
            started_at: Utc::now(),
            observed: observed_rx,
            kill_tx,
        })
    }

    /// OS process id of the transcoder.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// When this handle's process was spawned.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether the process is still running.
    #[must_use]
    pub fn running(&self) -> bool {
        matches!(*self.observed.borrow(), Observed::Running)
    }

    /// Exit diagnostics, once the process has exited.
    #[must_use]
    pub fn exit_info(&self) -> Option<ExitInfo> {
        match &*self.observed.borrow() {
            Observed::Running => None,
            Observed::Exited(info) => Some(info.clone()),
        }
    }

    /// Requests graceful termination, escalating to a forceful kill if the
    /// process has not exited within `grace`. Idempotent: calling `stop` on
    /// an already-exited handle is a no-op wait.
    pub async fn stop(&mut self, grace: Duration) {
        let _ = self.kill_tx.send(true);

        let exited = tokio::time::timeout(grace, self.wait_exited()).await;
        if exited.is_err() {
            let raw: pid_t = self.pid as pid_t;
            let _ = signal::kill(Pid::from_raw(raw), Signal::SIGKILL);
            let _ = self.wait_exited().await;
        }
    }

    async fn wait_exited(&mut self) {
        while self.running() {
            if self.observed.changed().await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod handle_spec {
    use super::*;
    use std::cell::RefCell;

    async fn run_local<F: std::future::Future>(f: F) -> F::Output {
        let local = tokio::task::LocalSet::new();
        local.run_until(f).await
    }

    #[tokio::test]
    async fn spawn_failed_surfaces_typed_error() {
        run_local(async {
            let result = Handle::spawn("/nonexistent/binary-xyz", Vec::<&str>::new(), |_| {});
            assert!(matches!(result, Err(SupervisorError::SpawnFailed(_))));
        })
        .await;
    }

    #[tokio::test]
    async fn observes_exit_and_classifies_log_lines() {
        run_local(async {
            let lines: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
            let lines_for_cb = Rc::clone(&lines);

            let mut handle = Handle::spawn(
                "sh",
                ["-c", "echo hello; echo 'error: boom' 1>&2; exit 7"],
                move |line| lines_for_cb.borrow_mut().push(line.to_owned()),
            )
            .expect("spawn should succeed");

            assert!(handle.pid() > 0);

            handle.wait_exited().await;
            assert!(!handle.running());

            let info = handle.exit_info().expect("exit info available");
            assert_eq!(info.exit_code, Some(7));
            assert!(info.stderr_tail.contains("boom"));
            assert!(lines.borrow().iter().any(|l| l.contains("boom")));
        })
        .await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_after_exit() {
        run_local(async {
            let mut handle =
                Handle::spawn("sh", ["-c", "exit 0"], |_| {}).expect("spawn should succeed");
            handle.wait_exited().await;
            handle.stop(Duration::from_millis(50)).await;
            handle.stop(Duration::from_millis(50)).await;
        })
        .await;
    }
}
