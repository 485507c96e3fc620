//! Command types shared between the queue and the orchestrator.

/// Where a queued command came from. Commands typed into the debug console
/// are reported differently when they cause the inferior to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    /// Issued interactively by the user.
    Console,
    /// Issued programmatically (UI actions, stop hooks, persistence).
    Other,
}

/// One queued unit of work for the debugger subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugCommand {
    pub command: String,
    pub params: String,
    pub source: CommandSource,
}

impl DebugCommand {
    pub fn new(
        command: impl Into<String>,
        params: impl Into<String>,
        source: CommandSource,
    ) -> Self {
        Self {
            command: command.into(),
            params: params.into(),
            source,
        }
    }

    /// Wire form: `<verb> <params>\n`, params omitted when empty.
    pub fn serialize(&self) -> String {
        if self.params.is_empty() {
            format!("{}\n", self.command)
        } else {
            format!("{} {}\n", self.command, self.params)
        }
    }

    /// Human-readable echo used for the command log.
    pub fn display(&self) -> String {
        if self.params.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.params)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_with_params() {
        let cmd = DebugCommand::new("-break-insert", "--source \"a.c\" --line 3", CommandSource::Other);
        assert_eq!(cmd.serialize(), "-break-insert --source \"a.c\" --line 3\n");
    }

    #[test]
    fn serialize_without_params() {
        let cmd = DebugCommand::new("-exec-continue", "", CommandSource::Console);
        assert_eq!(cmd.serialize(), "-exec-continue\n");
    }
}
