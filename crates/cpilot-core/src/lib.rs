//! # cpilot-core - Core Domain Types
//!
//! Foundation crate for Compose Pilot. Provides domain types, error
//! handling, event definitions, and the port-conflict analysis that runs
//! over polled service records.
//!
//! This crate has **zero internal dependencies** -- it only depends on
//! external crates (serde, chrono, thiserror, uuid, tracing).
//!
//! ## Public API
//!
//! ### Domain Types
//! - [`Project`] / [`ProjectId`] - A tracked compose definition file
//! - [`LogEntry`] - One captured line of subprocess output
//! - [`LogStore`] - Ordered, size-bounded log buffer across all projects
//! - [`ServiceRecord`] / [`PortPublisher`] - Polled container snapshots
//!
//! ### Events (`events`)
//! - [`ProcessEvent`] - Stdout/stderr/exit events from compose children
//!
//! ### Port Analysis (`ports`)
//! - [`deduplicate()`] - Collapse records by container name
//! - [`compute_conflicts()`] - Host port bindings claimed by >1 container
//! - [`parse_ports_text()`] - Fallback parser for raw compose port text
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use cpilot_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod log;
pub mod logging;
pub mod ports;
pub mod project;
pub mod services;

/// Prelude for common imports used throughout all Compose Pilot crates
pub mod prelude {
    pub use super::error::{Error, Result};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result};
pub use events::ProcessEvent;
pub use log::{LogEntry, LogStore, DEFAULT_MAX_LOG_LINES};
pub use ports::{compute_conflicts, deduplicate, parse_ports_text, PortBinding};
pub use project::{Project, ProjectId};
pub use services::{PortPublisher, ServiceRecord, STATE_RUNNING};
