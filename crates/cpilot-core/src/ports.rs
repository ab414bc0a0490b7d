//! Port-conflict analysis over polled service records
//!
//! Pure functions: deduplicate a poll batch by container name, then flag
//! host port bindings claimed by more than one distinct container.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::services::ServiceRecord;

/// Conflict-detection key for one published host port.
///
/// Host address is part of the key: `127.0.0.1:8080` and `0.0.0.0:8080`
/// are different bindings and never conflict with each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortBinding {
    pub host: String,
    pub port: u16,
    pub protocol: String,
}

impl fmt::Display for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.protocol)
    }
}

/// Collapse records sharing the same non-empty container name, keeping the
/// first occurrence in input order. Records with an empty container name are
/// never collapsed; compose versions that omit the name give us nothing to
/// key on.
pub fn deduplicate(records: Vec<ServiceRecord>) -> Vec<ServiceRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut result = Vec::with_capacity(records.len());
    for record in records {
        if record.container_name.is_empty() || seen.insert(record.container_name.clone()) {
            result.push(record);
        }
    }
    result
}

/// Compute the set of conflicting host port bindings.
///
/// A binding conflicts when at least two distinct containers claim it.
/// Duplicate publisher entries inside one record, or the same container
/// appearing twice (two projects aliasing one compose project), do not
/// count. Publishers with a zero host port are ignored. When a record has
/// no structured publishers but non-empty raw port text, the text is parsed
/// as a fallback source of bindings.
pub fn compute_conflicts(records: &[ServiceRecord]) -> HashSet<PortBinding> {
    let mut claimants: HashMap<PortBinding, HashSet<String>> = HashMap::new();

    for (index, record) in records.iter().enumerate() {
        // Anonymous containers are assumed distinct from everything else.
        let identity = if record.container_name.is_empty() {
            format!("\u{0}anon-{index}")
        } else {
            record.container_name.clone()
        };

        for binding in record_bindings(record) {
            claimants.entry(binding).or_default().insert(identity.clone());
        }
    }

    claimants
        .into_iter()
        .filter(|(_, owners)| owners.len() > 1)
        .map(|(binding, _)| binding)
        .collect()
}

/// The distinct bindings one record claims.
fn record_bindings(record: &ServiceRecord) -> HashSet<PortBinding> {
    let mut bindings: HashSet<PortBinding> = record
        .publishers
        .iter()
        .filter(|p| p.published_port > 0)
        .map(|p| PortBinding {
            host: p.url.clone(),
            port: p.published_port,
            protocol: p.protocol.clone(),
        })
        .collect();

    if record.publishers.is_empty() && !record.ports_text.is_empty() {
        bindings.extend(parse_ports_text(&record.ports_text));
    }

    bindings
}

/// Parse raw compose port text into bindings.
///
/// Format: comma-separated entries `host[:hostport]->containerport[/protocol]`.
/// Expose-only entries (no host mapping, e.g. `80/tcp`) are skipped.
/// Protocol defaults to "tcp" when absent.
pub fn parse_ports_text(text: &str) -> Vec<PortBinding> {
    text.split(',')
        .filter_map(|entry| parse_port_entry(entry.trim()))
        .collect()
}

fn parse_port_entry(entry: &str) -> Option<PortBinding> {
    let (host_side, container_side) = entry.split_once("->")?;

    // Host side is `host:port`; rsplit so IPv6 hosts like `::` keep their colons.
    let (host, port) = host_side.rsplit_once(':')?;
    let port: u16 = port.trim().parse().ok()?;
    if port == 0 {
        return None;
    }

    let protocol = match container_side.split_once('/') {
        Some((_, proto)) if !proto.is_empty() => proto.trim().to_string(),
        _ => "tcp".to_string(),
    };

    Some(PortBinding {
        host: host.trim().to_string(),
        port,
        protocol,
    })
}
