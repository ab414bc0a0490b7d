//! Configuration types for Compose Pilot

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use cpilot_core::{Project, ProjectId, DEFAULT_MAX_LOG_LINES};

/// Application settings (config.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Cap on stored log entries
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,

    /// Path to the docker executable
    #[serde(default = "default_docker_path")]
    pub docker_path: PathBuf,

    /// Seconds between automatic service refreshes
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Tracked projects, in display order
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_log_lines: default_max_log_lines(),
            docker_path: default_docker_path(),
            refresh_interval_secs: default_refresh_interval_secs(),
            projects: Vec::new(),
        }
    }
}

fn default_max_log_lines() -> usize {
    DEFAULT_MAX_LOG_LINES
}

fn default_refresh_interval_secs() -> u64 {
    10
}

/// Candidate install locations checked before falling back to PATH lookup.
const DOCKER_PATH_CANDIDATES: &[&str] = &["/opt/homebrew/bin/docker", "/usr/local/bin/docker"];

fn default_docker_path() -> PathBuf {
    for candidate in DOCKER_PATH_CANDIDATES {
        let path = PathBuf::from(candidate);
        if path.is_file() {
            return path;
        }
    }
    which::which("docker").unwrap_or_else(|_| PathBuf::from("/usr/local/bin/docker"))
}

impl Settings {
    /// Track a new project. Returns its id.
    pub fn add_project(&mut self, project: Project) -> ProjectId {
        let id = project.id;
        self.projects.push(project);
        id
    }

    /// Stop tracking a project. Returns the removed project, if any.
    pub fn remove_project(&mut self, id: ProjectId) -> Option<Project> {
        let index = self.projects.iter().position(|p| p.id == id)?;
        Some(self.projects.remove(index))
    }

    /// Find a tracked project by display name (case-insensitive) or by
    /// definition file path.
    pub fn find_project(&self, needle: &str) -> Option<&Project> {
        self.projects
            .iter()
            .find(|p| p.display_name().eq_ignore_ascii_case(needle))
            .or_else(|| {
                self.projects
                    .iter()
                    .find(|p| p.path == PathBuf::from(needle))
            })
    }
}
