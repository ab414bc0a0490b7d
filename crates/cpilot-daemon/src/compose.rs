//! Compose invocation building
//!
//! Every subprocess this crate launches goes through [`build_command`]:
//! `docker compose -f <definition> [--env-file <env>] <operation>`, run from
//! the definition file's directory with a search path that covers the common
//! install locations even when the app inherits a restricted environment.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use cpilot_core::prelude::*;
use cpilot_core::Project;

/// Directories prepended to the inherited search path so the docker CLI can
/// find its helpers (credential helpers, buildx) when launched from a
/// context with a minimal PATH.
pub const COMMON_BIN_DIRS: &[&str] = &[
    "/usr/local/bin",
    "/usr/bin",
    "/bin",
    "/usr/sbin",
    "/sbin",
    "/opt/homebrew/bin",
];

/// The compose operations this crate issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeOp {
    /// `up` - start the project in the foreground
    Up,
    /// `down` - stop and remove the project's containers
    Down,
    /// `config --services` - list configured service names
    ListServices,
    /// `ps --format json` - list containers as JSON records
    PsJson,
}

impl ComposeOp {
    fn args(&self) -> &'static [&'static str] {
        match self {
            ComposeOp::Up => &["up"],
            ComposeOp::Down => &["down"],
            ComposeOp::ListServices => &["config", "--services"],
            ComposeOp::PsJson => &["ps", "--format", "json"],
        }
    }
}

/// Check that the configured docker path points at an executable file.
pub fn verify_executable(docker_path: &Path) -> Result<()> {
    let Ok(metadata) = std::fs::metadata(docker_path) else {
        return Err(Error::docker_not_found(docker_path));
    };
    if !metadata.is_file() {
        return Err(Error::docker_not_found(docker_path));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(Error::docker_not_found(docker_path));
        }
    }

    Ok(())
}

/// The `--env-file` arguments for a project.
///
/// An explicit env-file path wins; otherwise a `.env` sibling of the
/// definition file is used when it exists (checked only in that case).
pub fn env_file_args(project: &Project) -> Vec<OsString> {
    if let Some(env_file) = &project.env_file {
        if !env_file.as_os_str().is_empty() {
            return vec!["--env-file".into(), env_file.clone().into_os_string()];
        }
    }

    let default_env = project.compose_dir().join(".env");
    if default_env.is_file() {
        return vec!["--env-file".into(), default_env.into_os_string()];
    }

    Vec::new()
}

/// Build the full compose command for one operation against one project.
///
/// The returned command has its arguments, working directory, and search
/// path configured; stdio setup is left to the caller.
pub fn build_command(docker_path: &Path, project: &Project, op: ComposeOp) -> Command {
    let mut command = Command::new(docker_path);
    command.arg("compose").arg("-f").arg(&project.path);
    command.args(env_file_args(project));
    command.args(op.args());
    command.current_dir(project.compose_dir());
    command.env("PATH", augmented_search_path());
    command
}

/// The inherited search path with [`COMMON_BIN_DIRS`] prepended, skipping
/// directories already present.
pub fn augmented_search_path() -> OsString {
    let inherited = std::env::var_os("PATH").unwrap_or_default();
    let mut dirs: Vec<PathBuf> = std::env::split_paths(&inherited).collect();

    for common in COMMON_BIN_DIRS {
        let common = PathBuf::from(common);
        if !dirs.contains(&common) {
            dirs.insert(0, common);
        }
    }

    std::env::join_paths(dirs).unwrap_or(inherited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn command_args(command: &Command) -> Vec<String> {
        command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_up_arguments_without_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let compose_path = dir.path().join("docker-compose.yml");
        std::fs::write(&compose_path, "services: {}\n").unwrap();

        let project = Project::new(&compose_path);
        let command = build_command(Path::new("/usr/local/bin/docker"), &project, ComposeOp::Up);

        assert_eq!(
            command_args(&command),
            vec![
                "compose".to_string(),
                "-f".to_string(),
                compose_path.to_string_lossy().into_owned(),
                "up".to_string(),
            ]
        );
        assert_eq!(command.as_std().get_current_dir(), Some(dir.path()));
    }

    #[test]
    fn test_explicit_env_file_wins_over_default() {
        let dir = tempfile::tempdir().unwrap();
        let compose_path = dir.path().join("docker-compose.yml");
        std::fs::write(&compose_path, "services: {}\n").unwrap();
        std::fs::write(dir.path().join(".env"), "A=1\n").unwrap();

        let project = Project::new(&compose_path).with_env_file("/etc/overrides.env");
        let args = env_file_args(&project);
        assert_eq!(args[0], OsStr::new("--env-file"));
        assert_eq!(args[1], OsStr::new("/etc/overrides.env"));
    }

    #[test]
    fn test_sibling_dot_env_used_when_no_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let compose_path = dir.path().join("docker-compose.yml");
        std::fs::write(&compose_path, "services: {}\n").unwrap();
        std::fs::write(dir.path().join(".env"), "A=1\n").unwrap();

        let project = Project::new(&compose_path);
        let args = env_file_args(&project);
        assert_eq!(args.len(), 2);
        assert_eq!(args[1], dir.path().join(".env").as_os_str());
    }

    #[test]
    fn test_no_env_file_args_when_nothing_configured() {
        let dir = tempfile::tempdir().unwrap();
        let compose_path = dir.path().join("docker-compose.yml");
        std::fs::write(&compose_path, "services: {}\n").unwrap();

        let project = Project::new(&compose_path);
        assert!(env_file_args(&project).is_empty());
    }

    #[test]
    fn test_ps_json_arguments() {
        let project = Project::new("/srv/blog/docker-compose.yml");
        let command = build_command(Path::new("/usr/bin/docker"), &project, ComposeOp::PsJson);
        let args = command_args(&command);
        assert_eq!(args[args.len() - 3..], ["ps", "--format", "json"]);
    }

    #[test]
    fn test_augmented_search_path_has_no_duplicates() {
        let augmented = augmented_search_path();
        let dirs: Vec<PathBuf> = std::env::split_paths(&augmented).collect();
        for common in COMMON_BIN_DIRS {
            let count = dirs.iter().filter(|d| *d == Path::new(common)).count();
            assert_eq!(count, 1, "{common} should appear exactly once");
        }
    }

    #[test]
    fn test_verify_executable_rejects_missing_file() {
        let err = verify_executable(Path::new("/nonexistent/docker")).unwrap_err();
        assert!(matches!(err, Error::DockerNotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_verify_executable_rejects_non_executable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docker");
        std::fs::write(&path, "not a binary").unwrap();
        let err = verify_executable(&path).unwrap_err();
        assert!(matches!(err, Error::DockerNotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_verify_executable_accepts_executable_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docker");
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(verify_executable(&path).is_ok());
    }
}
