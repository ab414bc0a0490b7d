//! Compose Pilot - launch and monitor local docker compose projects
//!
//! This is the binary entry point. All logic lives in the library crates;
//! the CLI is a thin headless shell over them.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use cpilot_app::{load_settings, save_settings, RefreshScheduler, ServiceSnapshot, Settings};
use cpilot_core::prelude::*;
use cpilot_core::{LogStore, ProcessEvent, Project};
use cpilot_daemon::{list_service_names, ComposeSupervisor, SupervisorConfig};

/// Compose Pilot - launch and monitor local docker compose projects
#[derive(Parser, Debug)]
#[command(name = "cpilot")]
#[command(about = "Launch and monitor local docker compose projects", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Manage the tracked project list
    Projects {
        #[command(subcommand)]
        action: ProjectsAction,
    },

    /// Start a project and stream its log until it exits (Ctrl-C stops it)
    Up {
        /// Project label or definition file path
        name: String,
    },

    /// Stop a project's containers
    Down {
        /// Project label or definition file path
        name: String,
    },

    /// List running services across all tracked projects
    Ps {
        /// Keep refreshing on the configured interval
        #[arg(long)]
        watch: bool,
    },

    /// List the services a project defines
    Services {
        /// Project label or definition file path
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum ProjectsAction {
    /// Show every tracked project
    List,

    /// Track a compose definition file
    Add {
        /// Path to the compose definition file
        path: PathBuf,

        /// Display label
        #[arg(long)]
        label: Option<String>,

        /// Explicit env file passed as --env-file
        #[arg(long)]
        env_file: Option<PathBuf>,
    },

    /// Stop tracking a project
    Remove {
        /// Project label or definition file path
        name: String,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    cpilot_core::logging::init()?;

    let args = Args::parse();
    let mut settings = load_settings()?;

    match args.command {
        CliCommand::Projects { action } => run_projects(&mut settings, action)?,
        CliCommand::Up { name } => run_up(&settings, &name).await?,
        CliCommand::Down { name } => run_down(&settings, &name).await?,
        CliCommand::Ps { watch } => run_ps(&settings, watch).await?,
        CliCommand::Services { name } => run_services(&settings, &name).await?,
    }

    Ok(())
}

fn run_projects(settings: &mut Settings, action: ProjectsAction) -> Result<()> {
    match action {
        ProjectsAction::List => {
            if settings.projects.is_empty() {
                println!("No tracked projects. Add one with: cpilot projects add <path>");
                return Ok(());
            }
            for project in &settings.projects {
                let env = project
                    .env_file
                    .as_ref()
                    .map(|p| format!("  (env: {})", p.display()))
                    .unwrap_or_default();
                println!(
                    "{:<24} {}{}",
                    project.display_name(),
                    project.path.display(),
                    env
                );
            }
        }
        ProjectsAction::Add {
            path,
            label,
            env_file,
        } => {
            if !path.is_file() {
                warn!("definition file does not exist yet: {}", path.display());
            }
            let mut project = Project::new(path);
            if let Some(label) = label {
                project = project.with_label(label);
            }
            if let Some(env_file) = env_file {
                project = project.with_env_file(env_file);
            }
            let name = project.display_name();
            settings.add_project(project);
            save_settings(settings)?;
            println!("Tracking {name}");
        }
        ProjectsAction::Remove { name } => {
            let project = find_project(settings, &name)?.clone();
            settings.remove_project(project.id);
            save_settings(settings)?;
            println!("Removed {}", project.display_name());
        }
    }
    Ok(())
}

async fn run_up(settings: &Settings, name: &str) -> Result<()> {
    let project = find_project(settings, name)?.clone();
    let (mut supervisor, mut events) = ComposeSupervisor::new(SupervisorConfig {
        docker_path: settings.docker_path.clone(),
        max_log_lines: settings.max_log_lines,
    });

    let started = supervisor.start(&project);
    let mut printed_through = print_new_entries(supervisor.logs(), 0);
    started?;

    loop {
        tokio::select! {
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else { break };
                let exited = matches!(event, ProcessEvent::Exited { .. });
                supervisor.apply_event(event);
                printed_through = print_new_entries(supervisor.logs(), printed_through);
                if exited {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                supervisor.stop(&project).await;
                print_new_entries(supervisor.logs(), printed_through);
                break;
            }
        }
    }

    Ok(())
}

async fn run_down(settings: &Settings, name: &str) -> Result<()> {
    let project = find_project(settings, name)?.clone();
    let (mut supervisor, _events) = ComposeSupervisor::new(SupervisorConfig {
        docker_path: settings.docker_path.clone(),
        max_log_lines: settings.max_log_lines,
    });

    supervisor.stop(&project).await;
    print_new_entries(supervisor.logs(), 0);
    Ok(())
}

async fn run_ps(settings: &Settings, watch: bool) -> Result<()> {
    if settings.projects.is_empty() {
        println!("No tracked projects. Add one with: cpilot projects add <path>");
        return Ok(());
    }

    let (scheduler, mut snapshots) = RefreshScheduler::new(settings.docker_path.clone());

    if !watch {
        scheduler.request_refresh(settings.projects.clone());
        if let Some(snapshot) = snapshots.recv().await {
            print_snapshot(&snapshot);
        }
        return Ok(());
    }

    let mut interval = tokio::time::interval(Duration::from_secs(settings.refresh_interval_secs));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Dropped when a refresh is already in flight.
                scheduler.request_refresh(settings.projects.clone());
            }
            maybe_snapshot = snapshots.recv() => {
                let Some(snapshot) = maybe_snapshot else { break };
                print_snapshot(&snapshot);
            }
            _ = tokio::signal::ctrl_c() => {
                scheduler.shutdown();
                break;
            }
        }
    }

    Ok(())
}

async fn run_services(settings: &Settings, name: &str) -> Result<()> {
    let project = find_project(settings, name)?;
    let names = list_service_names(&settings.docker_path, project).await?;
    for service in names {
        println!("{service}");
    }
    Ok(())
}

fn find_project<'a>(settings: &'a Settings, name: &str) -> Result<&'a Project> {
    settings
        .find_project(name)
        .ok_or_else(|| Error::unknown_project(name))
}

/// Print log entries newer than `after_id`; returns the new high-water mark.
fn print_new_entries(logs: &LogStore, after_id: u64) -> u64 {
    let mut last = after_id;
    for entry in logs.iter().filter(|e| e.id > after_id) {
        let marker = if entry.is_error { "!" } else { " " };
        println!("{} {} {}", entry.formatted_timestamp(), marker, entry.message);
        last = entry.id;
    }
    last
}

fn print_snapshot(snapshot: &ServiceSnapshot) {
    if let Some(summary) = snapshot.error_summary() {
        eprintln!("{summary}");
    }

    if snapshot.services.is_empty() {
        println!("No running services.");
    } else {
        println!(
            "{:<20} {:<10} {:<32} {}",
            "SERVICE", "STATE", "PORTS", "PROJECT"
        );
        for record in &snapshot.services {
            let ports = if record.publishers.is_empty() {
                record.ports_text.clone()
            } else {
                record
                    .published()
                    .map(|p| {
                        format!(
                            "{}:{}->{}/{}",
                            p.url, p.published_port, p.target_port, p.protocol
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            println!(
                "{:<20} {:<10} {:<32} {}",
                record.service,
                record.state,
                ports,
                record.project_label.as_deref().unwrap_or("-")
            );
        }
    }

    if !snapshot.conflicts.is_empty() {
        println!();
        println!("{} port conflict(s) detected:", snapshot.conflicts.len());
        let mut conflicts: Vec<String> =
            snapshot.conflicts.iter().map(|b| b.to_string()).collect();
        conflicts.sort();
        for binding in conflicts {
            println!("  {binding}");
        }
    }

    println!("Updated {}", snapshot.refreshed_at.format("%H:%M:%S"));
}
