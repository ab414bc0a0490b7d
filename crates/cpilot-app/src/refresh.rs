//! Periodic and on-demand service refresh
//!
//! The scheduler is a two-state machine: Idle or Refreshing. A request
//! while a refresh is in flight is dropped, not queued, so concurrent
//! polls are bounded at one regardless of how fast the timer or the user
//! fires. Completed snapshots are published over a channel to whatever
//! owns the presentation state; after [`RefreshScheduler::shutdown`]
//! nothing further is published, including in-flight results.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, watch};

use cpilot_core::prelude::*;
use cpilot_core::{compute_conflicts, deduplicate, PortBinding, Project, ProjectId, ServiceRecord};
use cpilot_daemon::poller;

/// Capacity of the snapshot channel
const SNAPSHOT_CHANNEL_SIZE: usize = 8;

/// The outcome of one refresh cycle across every tracked project.
#[derive(Debug, Clone)]
pub struct ServiceSnapshot {
    /// Deduplicated running services, in project order
    pub services: Vec<ServiceRecord>,

    /// Host port bindings claimed by more than one container
    pub conflicts: HashSet<PortBinding>,

    /// Per-project poll failures, rendered human-readable
    pub errors: Vec<(ProjectId, String)>,

    /// When the refresh completed
    pub refreshed_at: DateTime<Local>,
}

impl ServiceSnapshot {
    /// Combined error summary, if any project failed.
    pub fn error_summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let lines: Vec<String> = self
            .errors
            .iter()
            .map(|(id, message)| format!("{id}: {message}"))
            .collect();
        Some(lines.join("\n"))
    }
}

/// Drives [`poller::poll_all`] over the tracked projects and publishes
/// analyzed snapshots.
pub struct RefreshScheduler {
    docker_path: PathBuf,
    in_flight: Arc<AtomicBool>,
    snapshot_tx: mpsc::Sender<ServiceSnapshot>,
    shutdown_tx: watch::Sender<bool>,
}

impl RefreshScheduler {
    /// Create a scheduler and the receiving end of its snapshot channel.
    pub fn new(docker_path: PathBuf) -> (Self, mpsc::Receiver<ServiceSnapshot>) {
        let (snapshot_tx, snapshot_rx) = mpsc::channel(SNAPSHOT_CHANNEL_SIZE);
        let (shutdown_tx, _) = watch::channel(false);
        (
            Self {
                docker_path,
                in_flight: Arc::new(AtomicBool::new(false)),
                snapshot_tx,
                shutdown_tx,
            },
            snapshot_rx,
        )
    }

    /// Point the scheduler at a different docker executable. Applies to the
    /// next refresh.
    pub fn set_docker_path(&mut self, docker_path: PathBuf) {
        self.docker_path = docker_path;
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Request a refresh over the given projects.
    ///
    /// Returns `false` when a refresh is already in flight; the request is
    /// dropped, the running refresh is left alone. Timer ticks and explicit
    /// user requests go through the same gate.
    pub fn request_refresh(&self, projects: Vec<Project>) -> bool {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("refresh already in flight, dropping request");
            return false;
        }

        let docker_path = self.docker_path.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let snapshot_tx = self.snapshot_tx.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let batch = poller::poll_all(&docker_path, &projects).await;

            // One container reported by two aliased projects must not
            // self-conflict, so dedup runs before conflict detection.
            let services = deduplicate(batch.records);
            let conflicts = compute_conflicts(&services);

            let snapshot = ServiceSnapshot {
                services,
                conflicts,
                errors: batch
                    .errors
                    .into_iter()
                    .map(|(id, err)| (id, err.to_string()))
                    .collect(),
                refreshed_at: Local::now(),
            };

            // Idle again before publishing: once the snapshot is observable,
            // a follow-up refresh request must go through.
            in_flight.store(false, Ordering::SeqCst);

            if *shutdown_rx.borrow() {
                debug!("refresh finished after shutdown, discarding snapshot");
            } else {
                let _ = snapshot_tx.send(snapshot).await;
            }
        });

        true
    }

    /// Stop publishing. In-flight polls are abandoned to finish on their
    /// own; their results are discarded.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
