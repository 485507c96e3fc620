//! Transport layer for driving a GDB-compatible debugger through its
//! machine-interface (MI) text protocol.
//!
//! The [`reader::Reader`] owns the debugger subprocess and its command queue,
//! turning the line-oriented MI output into the typed [`events::Event`]
//! stream consumed by the orchestrating `debugger` crate.

pub mod escape;
pub mod events;
pub mod parse;
pub mod reader;
pub mod types;

pub use events::{BatchSummary, Event, Frame};
pub use parse::{ParseError, ParseObject, ParseValue};
pub use reader::{Reader, ReaderConfig, ReaderHandle};
pub use types::{CommandSource, DebugCommand};

use thiserror::Error;

/// Reply-completion sentinel: an MI reply is complete once a line that,
/// trimmed, equals this prompt has been received.
pub const GDB_PROMPT: &str = "(gdb)";

/// Arguments used to launch the debugger in machine-interface mode.
pub const MI_ARGS: [&str; 2] = ["--interpret=mi", "--silent"];

/// Failure to bring up the debugger subprocess.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to launch debugger process")]
    Process(#[from] std::io::Error),
    #[error("debugger exited before signalling start")]
    NoStartSignal,
}
