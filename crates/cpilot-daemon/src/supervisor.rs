//! Compose process supervision
//!
//! One supervisor instance owns every piece of mutable state in this crate:
//! the live-handle map and the log store. It is designed to live on a single
//! owner task; reader tasks communicate with it exclusively through the
//! event channel handed out at construction, and the owner folds those
//! events back in via [`ComposeSupervisor::apply_event`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::sync::mpsc;

use cpilot_core::prelude::*;
use cpilot_core::{LogEntry, LogStore, ProcessEvent, Project, ProjectId, DEFAULT_MAX_LOG_LINES};

use crate::compose::{self, ComposeOp};
use crate::process::ComposeProcess;

/// Capacity of the supervisor's event channel
const EVENT_CHANNEL_SIZE: usize = 256;

/// Runtime configuration for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Path to the docker executable
    pub docker_path: PathBuf,

    /// Cap on stored log entries
    pub max_log_lines: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            docker_path: PathBuf::from("/usr/local/bin/docker"),
            max_log_lines: DEFAULT_MAX_LOG_LINES,
        }
    }
}

/// Starts, streams, and stops one compose child per tracked project.
pub struct ComposeSupervisor {
    config: SupervisorConfig,
    handles: HashMap<ProjectId, ComposeProcess>,
    logs: LogStore,
    event_tx: mpsc::Sender<ProcessEvent>,
}

impl ComposeSupervisor {
    /// Create a supervisor and the receiving end of its event channel.
    ///
    /// The owner must keep draining the receiver and feed every event to
    /// [`apply_event`]; log entries and handle removal happen there.
    pub fn new(config: SupervisorConfig) -> (Self, mpsc::Receiver<ProcessEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        (
            Self {
                logs: LogStore::new(config.max_log_lines),
                config,
                handles: HashMap::new(),
                event_tx,
            },
            event_rx,
        )
    }

    /// Update runtime configuration. The log cap applies on the next append.
    pub fn configure(&mut self, config: SupervisorConfig) {
        self.logs.set_max_entries(config.max_log_lines);
        self.config = config;
    }

    /// Start `compose up` for a project.
    ///
    /// Starting an already-running project is not an error: it appends an
    /// error-flagged "Already running" entry and returns.
    pub fn start(&mut self, project: &Project) -> Result<()> {
        if self.handles.contains_key(&project.id) {
            self.append(project.id, "Already running", true);
            return Ok(());
        }

        if let Err(err) = compose::verify_executable(&self.config.docker_path) {
            self.append(project.id, err.to_string(), true);
            return Err(err);
        }

        self.append(project.id, "Starting docker compose...", false);

        match ComposeProcess::spawn(&self.config.docker_path, project, self.event_tx.clone()) {
            Ok(process) => {
                self.handles.insert(project.id, process);
                Ok(())
            }
            Err(err) => {
                self.append(project.id, format!("Failed to start: {err}"), true);
                Err(err)
            }
        }
    }

    /// Stop a project: terminate the live child (if any) and run a
    /// best-effort `compose down`, capturing its output into the log.
    ///
    /// Never fails past its own boundary; a `down` that cannot be spawned is
    /// logged and swallowed.
    pub async fn stop(&mut self, project: &Project) {
        // Terminate first; the handle goes away immediately, the Exited
        // event arrives later through the channel.
        if let Some(mut process) = self.handles.remove(&project.id) {
            process.terminate();
        }

        self.append(project.id, "Stopping containers...", false);

        let output = compose::build_command(&self.config.docker_path, project, ComposeOp::Down)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                for line in stdout.lines().filter(|l| !l.is_empty()) {
                    self.append(project.id, line, false);
                }
                let stderr = String::from_utf8_lossy(&output.stderr);
                for line in stderr.lines().filter(|l| !l.is_empty()) {
                    self.append(project.id, line, true);
                }
                self.append(project.id, "Containers stopped", false);
            }
            Err(e) => {
                warn!("compose down failed for {}: {}", project.display_name(), e);
                self.append(project.id, format!("Failed to stop: {e}"), true);
            }
        }
    }

    /// Whether a live child is registered for this project.
    pub fn is_running(&self, project_id: ProjectId) -> bool {
        self.handles.contains_key(&project_id)
    }

    /// Fold one event from the channel into supervisor state.
    pub fn apply_event(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::Stdout { project_id, line } => {
                self.append(project_id, line, false);
            }
            ProcessEvent::Stderr { project_id, line } => {
                self.append(project_id, line, true);
            }
            ProcessEvent::Exited { project_id, code } => {
                debug!("compose child for {} exited: {:?}", project_id, code);
                self.handles.remove(&project_id);
                self.append(project_id, "Process terminated", false);
            }
        }
    }

    /// The log store, oldest entry first.
    pub fn logs(&self) -> &LogStore {
        &self.logs
    }

    /// Clear entries for one project, or everything when `None`.
    pub fn clear_logs(&mut self, project_id: Option<ProjectId>) {
        self.logs.clear(project_id);
    }

    fn append(&mut self, project_id: ProjectId, message: impl Into<String>, is_error: bool) {
        self.logs
            .append(LogEntry::new(project_id, message, is_error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    /// Write a fake `docker` script that reacts to the compose operation:
    /// `up` emits a line on each stream and lingers, `down` prints a stop
    /// notice and exits.
    #[cfg(unix)]
    fn fake_docker(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("docker");
        std::fs::write(
            &path,
            concat!(
                "#!/bin/sh\n",
                "for last; do :; done\n",
                "if [ \"$last\" = \"down\" ]; then\n",
                "  echo \"Container web Stopped\"\n",
                "  exit 0\n",
                "fi\n",
                "echo \"Attaching to web\"\n",
                "echo \"warn: platform mismatch\" 1>&2\n",
                "sleep 30\n",
            ),
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Fake docker whose `up` exits immediately after printing.
    #[cfg(unix)]
    fn fake_docker_short_lived(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("docker");
        std::fs::write(&path, "#!/bin/sh\necho \"done\"\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn test_project(dir: &Path) -> Project {
        let compose_path = dir.join("docker-compose.yml");
        std::fs::write(&compose_path, "services: {}\n").unwrap();
        Project::new(compose_path).with_label("test")
    }

    fn supervisor_with(docker_path: PathBuf) -> (ComposeSupervisor, mpsc::Receiver<ProcessEvent>) {
        ComposeSupervisor::new(SupervisorConfig {
            docker_path,
            max_log_lines: 1000,
        })
    }

    /// Drain events into the supervisor until the predicate holds or the
    /// deadline passes.
    async fn pump_until(
        supervisor: &mut ComposeSupervisor,
        rx: &mut mpsc::Receiver<ProcessEvent>,
        mut done: impl FnMut(&ComposeSupervisor) -> bool,
    ) -> bool {
        for _ in 0..100 {
            if done(supervisor) {
                return true;
            }
            match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
                Ok(Some(event)) => supervisor.apply_event(event),
                Ok(None) => break,
                Err(_) => continue,
            }
        }
        done(supervisor)
    }

    fn messages(supervisor: &ComposeSupervisor) -> Vec<String> {
        supervisor.logs().iter().map(|e| e.message.clone()).collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_registers_handle_and_streams_output() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_docker(dir.path());
        let project = test_project(dir.path());
        let (mut supervisor, mut rx) = supervisor_with(docker);

        supervisor.start(&project).unwrap();
        assert!(supervisor.is_running(project.id));
        assert_eq!(messages(&supervisor), vec!["Starting docker compose..."]);

        let saw_both_streams = pump_until(&mut supervisor, &mut rx, |s| {
            let has_out = s.logs().iter().any(|e| e.message == "Attaching to web" && !e.is_error);
            let has_err = s
                .logs()
                .iter()
                .any(|e| e.message == "warn: platform mismatch" && e.is_error);
            has_out && has_err
        })
        .await;
        assert!(saw_both_streams);
        assert!(supervisor.is_running(project.id));

        supervisor.stop(&project).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_twice_logs_already_running_without_new_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_docker(dir.path());
        let project = test_project(dir.path());
        let (mut supervisor, _rx) = supervisor_with(docker);

        supervisor.start(&project).unwrap();
        supervisor.start(&project).unwrap();

        let already: Vec<_> = supervisor
            .logs()
            .iter()
            .filter(|e| e.message == "Already running")
            .collect();
        assert_eq!(already.len(), 1);
        assert!(already[0].is_error);

        // Only one "Starting..." entry: the second call performed no spawn.
        let starting = supervisor
            .logs()
            .iter()
            .filter(|e| e.message == "Starting docker compose...")
            .count();
        assert_eq!(starting, 1);

        supervisor.stop(&project).await;
    }

    #[tokio::test]
    async fn test_start_with_missing_docker_fails_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let project = test_project(dir.path());
        let (mut supervisor, _rx) = supervisor_with(PathBuf::from("/nonexistent/docker"));

        let err = supervisor.start(&project).unwrap_err();
        assert!(matches!(err, Error::DockerNotFound { .. }));
        assert!(!supervisor.is_running(project.id));

        let entry = supervisor.logs().latest().unwrap();
        assert!(entry.is_error);
        assert!(entry.message.contains("/nonexistent/docker"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_exit_removes_handle_and_logs_termination() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_docker_short_lived(dir.path());
        let project = test_project(dir.path());
        let (mut supervisor, mut rx) = supervisor_with(docker);

        supervisor.start(&project).unwrap();
        assert!(supervisor.is_running(project.id));

        let terminated = pump_until(&mut supervisor, &mut rx, |s| {
            s.logs().iter().any(|e| e.message == "Process terminated")
        })
        .await;
        assert!(terminated);
        assert!(!supervisor.is_running(project.id));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_runs_down_and_captures_its_output() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_docker(dir.path());
        let project = test_project(dir.path());
        let (mut supervisor, _rx) = supervisor_with(docker);

        supervisor.start(&project).unwrap();
        supervisor.stop(&project).await;

        assert!(!supervisor.is_running(project.id));
        let msgs = messages(&supervisor);
        let stopping = msgs.iter().position(|m| m == "Stopping containers...").unwrap();
        let captured = msgs.iter().position(|m| m == "Container web Stopped").unwrap();
        let stopped = msgs.iter().position(|m| m == "Containers stopped").unwrap();
        assert!(stopping < captured && captured < stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_without_running_process_still_runs_down() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_docker(dir.path());
        let project = test_project(dir.path());
        let (mut supervisor, _rx) = supervisor_with(docker);

        supervisor.stop(&project).await;

        let msgs = messages(&supervisor);
        assert!(msgs.contains(&"Container web Stopped".to_string()));
        assert!(msgs.contains(&"Containers stopped".to_string()));
    }

    #[tokio::test]
    async fn test_stop_is_best_effort_when_down_cannot_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let project = test_project(dir.path());
        let (mut supervisor, _rx) = supervisor_with(PathBuf::from("/nonexistent/docker"));

        // Must not panic or error past its boundary.
        supervisor.stop(&project).await;

        let entry = supervisor.logs().latest().unwrap();
        assert!(entry.is_error);
        assert!(entry.message.starts_with("Failed to stop:"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_configure_updates_log_cap() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_docker(dir.path());
        let project = test_project(dir.path());
        let (mut supervisor, _rx) = supervisor_with(docker.clone());

        supervisor.configure(SupervisorConfig {
            docker_path: docker,
            max_log_lines: 2,
        });

        supervisor.apply_event(ProcessEvent::Stdout {
            project_id: project.id,
            line: "one".into(),
        });
        supervisor.apply_event(ProcessEvent::Stdout {
            project_id: project.id,
            line: "two".into(),
        });
        supervisor.apply_event(ProcessEvent::Stdout {
            project_id: project.id,
            line: "three".into(),
        });
        assert_eq!(messages(&supervisor), vec!["two", "three"]);
    }
}
