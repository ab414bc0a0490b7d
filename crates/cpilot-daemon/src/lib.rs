//! # cpilot-daemon - Compose Process Management
//!
//! Manages `docker compose` child processes and polling for Compose Pilot.
//!
//! Depends on [`cpilot_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Process Supervision
//! - [`ComposeSupervisor`] - One `compose up` child per project: start,
//!   stream into the log store, stop with a best-effort `compose down`
//! - [`ComposeProcess`] - A single supervised child with per-stream line
//!   readers and an exactly-once exit event
//!
//! ### Invocation Building (`compose`)
//! - [`build_command()`] - `docker compose -f <file> [--env-file <env>] <op>`
//! - [`verify_executable()`] - Check the configured docker path
//!
//! ### Service Polling (`poller`)
//! - [`poll_services()`] / [`poll_all()`] - Running containers per project,
//!   with per-project failure isolation
//! - [`list_service_names()`] - Configured services (`config --services`)

pub mod compose;
pub mod poller;
pub mod process;
pub mod supervisor;

// Public API re-exports
pub use compose::{augmented_search_path, build_command, env_file_args, verify_executable, ComposeOp, COMMON_BIN_DIRS};
pub use poller::{list_running_service_names, list_service_names, poll_all, poll_services, PollBatch};
pub use process::ComposeProcess;
pub use supervisor::{ComposeSupervisor, SupervisorConfig};
