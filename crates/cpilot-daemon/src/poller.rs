//! Service polling via `docker compose ps` and `config --services`
//!
//! Compose's `ps --format json` output changed shape across versions: newer
//! releases emit a single JSON array, older ones emit one JSON object per
//! line. The poller tries the array form first and falls back to
//! line-delimited decoding, skipping lines that fail to parse.

use std::path::Path;
use std::process::Stdio;

use futures_util::future::join_all;

use cpilot_core::prelude::*;
use cpilot_core::{Project, ProjectId, ServiceRecord};

use crate::compose::{self, ComposeOp};

/// Result of polling every tracked project.
///
/// A failure for one project never discards results from the others.
#[derive(Debug, Default)]
pub struct PollBatch {
    /// Running service records across all polled projects, in project order
    pub records: Vec<ServiceRecord>,

    /// Per-project poll failures
    pub errors: Vec<(ProjectId, Error)>,
}

impl PollBatch {
    /// Human-readable summary of the batch's failures, if any.
    pub fn error_summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let lines: Vec<String> = self
            .errors
            .iter()
            .map(|(id, err)| format!("{id}: {err}"))
            .collect();
        Some(lines.join("\n"))
    }
}

/// Poll one project for its running containers.
///
/// Records are filtered to running state and stamped with the owning
/// project's identity. Fails only when the invocation itself cannot run;
/// malformed records are dropped silently.
pub async fn poll_services(docker_path: &Path, project: &Project) -> Result<Vec<ServiceRecord>> {
    let stdout = run_compose(docker_path, project, ComposeOp::PsJson).await?;

    let records = parse_ps_output(&stdout);
    debug!(
        "polled {} record(s) for {}",
        records.len(),
        project.display_name()
    );

    Ok(records
        .into_iter()
        .filter(ServiceRecord::is_running)
        .map(|record| record.attribute_to(project))
        .collect())
}

/// Poll every project independently and gather the combined outcome.
pub async fn poll_all(docker_path: &Path, projects: &[Project]) -> PollBatch {
    let polls = projects
        .iter()
        .map(|project| poll_services(docker_path, project));
    let results = join_all(polls).await;

    let mut batch = PollBatch::default();
    for (project, result) in projects.iter().zip(results) {
        match result {
            Ok(records) => batch.records.extend(records),
            Err(err) => {
                warn!("poll failed for {}: {}", project.display_name(), err);
                batch.errors.push((project.id, err));
            }
        }
    }
    batch
}

/// List the service names defined by a project (`config --services`).
pub async fn list_service_names(docker_path: &Path, project: &Project) -> Result<Vec<String>> {
    let stdout = run_compose(docker_path, project, ComposeOp::ListServices).await?;
    Ok(stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// List just the names of the project's running services.
pub async fn list_running_service_names(
    docker_path: &Path,
    project: &Project,
) -> Result<Vec<String>> {
    let stdout = run_compose(docker_path, project, ComposeOp::PsJson).await?;
    Ok(parse_ps_output(&stdout)
        .into_iter()
        .filter(ServiceRecord::is_running)
        .map(|record| record.service)
        .collect())
}

async fn run_compose(docker_path: &Path, project: &Project, op: ComposeOp) -> Result<String> {
    let output = compose::build_command(docker_path, project, op)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| Error::poll(format!("failed to run docker compose: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            "compose {:?} exited with {:?}: {}",
            op,
            output.status.code(),
            stderr
        );
    }
    Ok(stdout)
}

/// Decode ps output: a JSON array, or one JSON object per line.
fn parse_ps_output(output: &str) -> Vec<ServiceRecord> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if let Ok(records) = serde_json::from_str::<Vec<ServiceRecord>>(trimmed) {
        return records;
    }

    trimmed
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<ServiceRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("skipping unparseable ps line: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const ARRAY_OUTPUT: &str = r#"[
        {"Service": "web", "State": "running", "Name": "blog-web-1",
         "Publishers": [{"URL": "0.0.0.0", "TargetPort": 80, "PublishedPort": 8080, "Protocol": "tcp"}]},
        {"Service": "db", "State": "exited", "Name": "blog-db-1"}
    ]"#;

    const LINE_OUTPUT: &str = concat!(
        "{\"Service\": \"web\", \"State\": \"running\", \"Name\": \"blog-web-1\"}\n",
        "{\"Service\": \"db\", \"State\": \"running\", \"Name\": \"blog-db-1\"}\n",
    );

    const NOISY_LINE_OUTPUT: &str = concat!(
        "{\"Service\": \"web\", \"State\": \"running\"}\n",
        "time=\"2024-01-01\" level=warning msg=\"a compose warning\"\n",
        "{\"Service\": \"db\", \"State\": \"running\"}\n",
    );

    /// Write a fake `docker` that prints `$PS_OUTPUT` for ps and a fixed
    /// service list for `config --services`.
    #[cfg(unix)]
    fn fake_docker(dir: &Path, ps_output: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("docker");
        let out_path = dir.join("ps-output.json");
        std::fs::write(&out_path, ps_output).unwrap();
        std::fs::write(
            &path,
            format!(
                concat!(
                    "#!/bin/sh\n",
                    "for arg; do\n",
                    "  if [ \"$arg\" = \"--services\" ]; then\n",
                    "    printf 'web\\ndb\\n'\n",
                    "    exit 0\n",
                    "  fi\n",
                    "done\n",
                    "cat {}\n",
                ),
                out_path.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn test_project(dir: &Path, label: &str) -> Project {
        let compose_path = dir.join("docker-compose.yml");
        std::fs::write(&compose_path, "services: {}\n").unwrap();
        Project::new(compose_path).with_label(label)
    }

    #[test]
    fn test_parse_array_output() {
        let records = parse_ps_output(ARRAY_OUTPUT);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].service, "web");
        assert_eq!(records[0].publishers.len(), 1);
    }

    #[test]
    fn test_parse_line_delimited_output() {
        let records = parse_ps_output(LINE_OUTPUT);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].service, "db");
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let records = parse_ps_output(NOISY_LINE_OUTPUT);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_ps_output("").is_empty());
        assert!(parse_ps_output("  \n").is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_poll_filters_to_running_and_stamps_project() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_docker(dir.path(), ARRAY_OUTPUT);
        let project = test_project(dir.path(), "Blog");

        let records = poll_services(&docker, &project).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].service, "web");
        assert_eq!(records[0].project_id, Some(project.id));
        assert_eq!(records[0].project_label.as_deref(), Some("Blog"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_poll_fails_when_invocation_cannot_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let project = test_project(dir.path(), "Blog");

        let err = poll_services(Path::new("/nonexistent/docker"), &project)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Poll { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_poll_all_isolates_failures_per_project() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_docker(dir.path(), LINE_OUTPUT);

        let good = test_project(dir.path(), "Good");
        // A definition whose directory does not exist: the spawn fails on cwd.
        let mut bad = Project::new(dir.path().join("gone/docker-compose.yml"));
        bad.label = Some("Bad".into());

        let batch = poll_all(&docker, &[bad.clone(), good.clone()]).await;

        assert_eq!(batch.records.len(), 2);
        assert!(batch.records.iter().all(|r| r.project_id == Some(good.id)));
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].0, bad.id);
        assert!(batch.error_summary().unwrap().contains(&bad.id.to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_service_names() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_docker(dir.path(), ARRAY_OUTPUT);
        let project = test_project(dir.path(), "Blog");

        let names = list_service_names(&docker, &project).await.unwrap();
        assert_eq!(names, vec!["web", "db"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_running_service_names() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_docker(dir.path(), ARRAY_OUTPUT);
        let project = test_project(dir.path(), "Blog");

        let names = list_running_service_names(&docker, &project).await.unwrap();
        assert_eq!(names, vec!["web"]);
    }
}
