//! Operator commands read line by line while the checkpoint runs.

use facelog_types::EventType;

/// One line of operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationCommand {
    /// Run a capture cycle.
    Trigger(EventType),
    /// Sync now instead of waiting for the next interval.
    Sync,
    Status,
    Quit,
}

/// Parses one input line. Case and surrounding whitespace are ignored;
/// blank or unknown lines yield `None`.
pub fn parse_command(line: &str) -> Option<StationCommand> {
    let word = line.trim().to_ascii_lowercase();
    match word.as_str() {
        "sync" => Some(StationCommand::Sync),
        "status" => Some(StationCommand::Status),
        "quit" | "exit" | "q" => Some(StationCommand::Quit),
        other => other.parse().ok().map(StationCommand::Trigger),
    }
}
