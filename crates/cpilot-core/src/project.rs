//! Tracked compose project definitions

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tracked project.
///
/// Persisted in settings, so it must stay stable across restarts.
pub type ProjectId = Uuid;

/// One tracked compose definition file plus its display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Project {
    /// Stable identity; never changes after the project is added
    pub id: ProjectId,

    /// Path to the compose definition file
    pub path: PathBuf,

    /// Optional explicit env-file override. When unset, a `.env` sibling of
    /// the definition file is used if one exists.
    #[serde(default)]
    pub env_file: Option<PathBuf>,

    /// Optional user-assigned display label
    #[serde(default)]
    pub label: Option<String>,

    /// When the project was added
    pub added_at: DateTime<Local>,
}

impl Project {
    /// Create a new tracked project for a definition file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            env_file: None,
            label: None,
            added_at: Local::now(),
        }
    }

    /// Builder-style label assignment.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Builder-style env-file assignment.
    pub fn with_env_file(mut self, env_file: impl Into<PathBuf>) -> Self {
        self.env_file = Some(env_file.into());
        self
    }

    /// Display name: the user label, or the definition file's parent
    /// directory name when no label is set.
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) if !label.is_empty() => label.clone(),
            _ => self
                .compose_dir()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.path.display().to_string()),
        }
    }

    /// The directory containing the definition file. Used as the working
    /// directory for every compose invocation against this project.
    pub fn compose_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_prefers_label() {
        let project = Project::new("/srv/blog/docker-compose.yml").with_label("Blog");
        assert_eq!(project.display_name(), "Blog");
    }

    #[test]
    fn test_display_name_falls_back_to_parent_dir() {
        let project = Project::new("/srv/blog/docker-compose.yml");
        assert_eq!(project.display_name(), "blog");
    }

    #[test]
    fn test_empty_label_falls_back_to_parent_dir() {
        let mut project = Project::new("/srv/blog/docker-compose.yml");
        project.label = Some(String::new());
        assert_eq!(project.display_name(), "blog");
    }

    #[test]
    fn test_compose_dir() {
        let project = Project::new("/srv/blog/docker-compose.yml");
        assert_eq!(project.compose_dir(), Path::new("/srv/blog"));
    }

    #[test]
    fn test_identity_survives_roundtrip() {
        let project = Project::new("/tmp/compose.yml").with_env_file("/tmp/.env.prod");
        let json = serde_json::to_string(&project).unwrap();
        let back: Project = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, project.id);
        assert_eq!(back.env_file, project.env_file);
    }

    #[test]
    fn test_new_projects_get_distinct_ids() {
        let a = Project::new("/tmp/a.yml");
        let b = Project::new("/tmp/a.yml");
        assert_ne!(a.id, b.id);
    }
}
