//! Domain event definitions

use crate::project::ProjectId;

/// Event emitted by a compose child's background tasks.
///
/// One channel carries events for every tracked project, so each event is
/// tagged with its owner. Stdout and stderr are read independently: order
/// is preserved within a stream, not between streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A line of standard output
    Stdout { project_id: ProjectId, line: String },

    /// A line of standard error
    Stderr { project_id: ProjectId, line: String },

    /// The child exited (normal exit, crash, or external kill).
    /// Emitted exactly once per spawn.
    Exited {
        project_id: ProjectId,
        code: Option<i32>,
    },
}

impl ProcessEvent {
    /// The project this event belongs to.
    pub fn project_id(&self) -> ProjectId {
        match self {
            ProcessEvent::Stdout { project_id, .. }
            | ProcessEvent::Stderr { project_id, .. }
            | ProcessEvent::Exited { project_id, .. } => *project_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_project_id_accessor() {
        let id = Uuid::new_v4();
        let events = [
            ProcessEvent::Stdout {
                project_id: id,
                line: "out".into(),
            },
            ProcessEvent::Stderr {
                project_id: id,
                line: "err".into(),
            },
            ProcessEvent::Exited {
                project_id: id,
                code: Some(0),
            },
        ];
        for event in events {
            assert_eq!(event.project_id(), id);
        }
    }
}
