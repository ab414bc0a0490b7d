//! Polled service records from `docker compose ps --format json`
//!
//! Field names and optionality vary across compose versions, so every field
//! except the service name is lenient: missing or null values decode to an
//! empty string / empty list instead of failing the record.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::project::{Project, ProjectId};

/// Lifecycle state string compose reports for a running container
pub const STATE_RUNNING: &str = "running";

/// One host port published by a running container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct PortPublisher {
    /// Host address the port is bound to (e.g. "0.0.0.0", "::")
    #[serde(rename = "URL", default)]
    pub url: String,

    /// Port inside the container
    #[serde(rename = "TargetPort", default)]
    pub target_port: u16,

    /// Port on the host; zero when the port is exposed but not published
    #[serde(rename = "PublishedPort", default)]
    pub published_port: u16,

    /// Transport protocol ("tcp", "udp")
    #[serde(rename = "Protocol", default)]
    pub protocol: String,
}

/// A snapshot of one running container belonging to a tracked project.
///
/// Recreated wholesale on every poll cycle; attribution fields are stamped
/// after parsing and never come from the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceRecord {
    /// Compose service name
    #[serde(rename = "Service")]
    pub service: String,

    /// Lifecycle state ("running", "exited", ...)
    #[serde(rename = "State", default)]
    pub state: String,

    /// Human status string ("Up 2 hours")
    #[serde(rename = "Status", default)]
    pub status: String,

    /// Container name; empty when the compose version omits it
    #[serde(rename = "Name", default)]
    pub container_name: String,

    /// Raw port-mapping text, e.g. "0.0.0.0:8080->80/tcp"
    #[serde(rename = "Ports", default)]
    pub ports_text: String,

    /// Structured port publishers; empty when absent
    #[serde(rename = "Publishers", default, deserialize_with = "null_as_empty")]
    pub publishers: Vec<PortPublisher>,

    /// Owning project id, attached post-poll
    #[serde(skip)]
    pub project_id: Option<ProjectId>,

    /// Owning project definition path, attached post-poll
    #[serde(skip)]
    pub project_path: Option<PathBuf>,

    /// Owning project display label, attached post-poll
    #[serde(skip)]
    pub project_label: Option<String>,
}

// Some compose versions emit `"Publishers": null` instead of omitting the key.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<PortPublisher>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<Vec<PortPublisher>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

impl ServiceRecord {
    /// Whether compose reports this container as running.
    pub fn is_running(&self) -> bool {
        self.state == STATE_RUNNING
    }

    /// Stamp the owning project's identity onto this record.
    pub fn attribute_to(mut self, project: &Project) -> Self {
        self.project_id = Some(project.id);
        self.project_path = Some(project.path.clone());
        self.project_label = Some(project.display_name());
        self
    }

    /// Publishers that actually claim a host port.
    pub fn published(&self) -> impl Iterator<Item = &PortPublisher> {
        self.publishers.iter().filter(|p| p.published_port > 0)
    }
}
