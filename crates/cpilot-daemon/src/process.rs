//! Compose child process management

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use cpilot_core::prelude::*;
use cpilot_core::{ProcessEvent, Project, ProjectId};

use crate::compose::{self, ComposeOp};

/// Manages one `docker compose up` child for one project.
///
/// The `Child` handle is moved into a dedicated `wait_for_exit` background
/// task that calls `child.wait()`, so the real exit code is captured and
/// emitted as `ProcessEvent::Exited { code: Some(N) }` exactly once per
/// spawn, whether the child exits on its own, crashes, or is killed.
///
/// `ComposeProcess` retains a kill channel ([`kill_tx`]) to request a
/// force-kill and an atomic flag ([`exited`]) for synchronous
/// `has_exited()` checks.
pub struct ComposeProcess {
    /// Owning project, for logging and event tagging
    project_id: ProjectId,
    /// Process ID for logging
    pid: Option<u32>,
    /// One-shot sender that tells the wait task to kill the process.
    /// Consumed on first use (or on drop).
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set to `true` by the wait task once the child has exited.
    exited: Arc<AtomicBool>,
}

impl ComposeProcess {
    /// Spawn `docker compose up` for a project.
    ///
    /// Events are sent to `event_tx` for processing by the supervisor's
    /// owner loop.
    pub fn spawn(
        docker_path: &std::path::Path,
        project: &Project,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<Self> {
        let mut command = compose::build_command(docker_path, project, ComposeOp::Up);
        info!(
            "Spawning compose up for {} ({})",
            project.display_name(),
            project.path.display()
        );
        Self::spawn_command(&mut command, project.id, event_tx)
    }

    /// Internal spawn implementation over a prepared command.
    fn spawn_command(
        command: &mut Command,
        project_id: ProjectId,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true) // Critical: cleanup on drop
            .spawn()
            .map_err(|e| Error::spawn(e.to_string()))?;

        let pid = child.id();
        info!("Compose process started with PID: {:?}", pid);

        // Spawn stdout reader task (does not emit Exited — that's the wait task's job)
        let stdout = child.stdout.take().expect("stdout was configured");
        tokio::spawn(Self::stream_reader(stdout, project_id, event_tx.clone(), false));

        // Spawn stderr reader task
        let stderr = child.stderr.take().expect("stderr was configured");
        tokio::spawn(Self::stream_reader(stderr, project_id, event_tx.clone(), true));

        let exited = Arc::new(AtomicBool::new(false));

        // Kill channel: ComposeProcess holds the sender, wait task holds the receiver.
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        // Spawn the dedicated wait task — takes ownership of `child`.
        tokio::spawn(Self::wait_for_exit(
            child,
            project_id,
            kill_rx,
            event_tx,
            Arc::clone(&exited),
        ));

        Ok(Self {
            project_id,
            pid,
            kill_tx: Some(kill_tx),
            exited,
        })
    }

    /// Background task: owns `child`, waits for it to exit, emits
    /// `ProcessEvent::Exited`.
    ///
    /// Two ways the task can end:
    /// 1. The compose process exits naturally — `child.wait()` resolves.
    /// 2. `kill_rx` fires — we kill the child first, then wait for it.
    async fn wait_for_exit(
        mut child: Child,
        project_id: ProjectId,
        kill_rx: oneshot::Receiver<()>,
        event_tx: mpsc::Sender<ProcessEvent>,
        exited: Arc<AtomicBool>,
    ) {
        let code: Option<i32> = tokio::select! {
            // Natural exit path
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        info!("Compose process exited with status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for compose process: {}", e);
                        None
                    }
                }
            }
            // Kill path: kill_tx was sent (by terminate or drop)
            _ = kill_rx => {
                info!("Kill signal received, terminating compose process");
                if let Err(e) = child.kill().await {
                    error!("Failed to kill compose process: {}", e);
                }
                match child.wait().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        error!("Error waiting after kill: {}", e);
                        None
                    }
                }
            }
        };

        // Mark exited before sending the event, so `has_exited()` is already
        // true when the owner observes Exited.
        exited.store(true, Ordering::Release);

        debug!("Sending ProcessEvent::Exited {{ code: {:?} }}", code);
        let _ = event_tx.send(ProcessEvent::Exited { project_id, code }).await;
    }

    /// Read newline-delimited output from one stream and forward non-empty
    /// lines as events, in arrival order.
    async fn stream_reader<R>(
        reader: R,
        project_id: ProjectId,
        tx: mpsc::Sender<ProcessEvent>,
        is_error: bool,
    ) where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if line.is_empty() {
                continue;
            }
            let event = if is_error {
                ProcessEvent::Stderr { project_id, line }
            } else {
                ProcessEvent::Stdout { project_id, line }
            };
            if tx.send(event).await.is_err() {
                debug!("event channel closed, stopping stream reader");
                break;
            }
        }

        debug!("stream reader finished (is_error={})", is_error);
    }

    /// Request termination without waiting for it to complete.
    ///
    /// The wait task kills and reaps the child, then emits the single
    /// `Exited` event. Safe to call more than once.
    pub fn terminate(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            // Ignore send error — the wait task may have already exited naturally.
            let _ = tx.send(());
        }
    }

    /// Check if the process has already exited.
    ///
    /// Non-blocking, backed by an atomic set by the wait task.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Check if the process is still running.
    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    /// Get the process ID
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// The project this process belongs to.
    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }
}

impl Drop for ComposeProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            warn!("ComposeProcess dropped while process may still be running");
            // Signal the wait task so the child is reaped cleanly.
            // kill_on_drop(true) on the Child is the final safety net.
            if let Some(tx) = self.kill_tx.take() {
                let _ = tx.send(());
            }
        }
        debug!("ComposeProcess dropped");
    }
}
