//! Typed events emitted by the session reader.

use std::collections::HashMap;
use std::path::PathBuf;

/// One decoded stack frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub function: String,
    pub file: PathBuf,
    pub line: i64,
    pub level: i64,
    pub address: String,
}

/// Flags and buffered text accumulated while decoding one full MI reply.
/// Delivered with [`Event::BatchFinished`] so the orchestrator can react to
/// the batch as a whole.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub process_exited: bool,
    pub signal_received: bool,
    pub signal_name: String,
    pub signal_meaning: String,
    pub source_newer_than_executable: bool,
    pub update_cpu_info: bool,
    /// Decoded console-stream text, in arrival order.
    pub console_output: Vec<String>,
    /// Every raw line of the reply, annotations included.
    pub full_output: Vec<String>,
}

/// Events flowing from the reader thread to the orchestrator.
///
/// All variants except [`Event::BatchFinished`] are fire-and-forget;
/// `BatchFinished` carries an acknowledgement channel and the reader blocks
/// until it is signalled, so orchestrator state is fully updated before the
/// command queue advances.
#[derive(Debug)]
pub enum Event {
    CommandStarted { command: String },
    CommandFinished,
    /// Writing a command to the subprocess stdin failed.
    WriteFailed,
    /// Subprocess-layer failure; the reader loop has ended.
    ProcessError(String),
    /// A line for the debug console (command echo).
    ConsoleLine(String),
    /// Drop all tracked watch values before processing continues.
    InvalidateAllWatches,
    InferiorContinued,
    InferiorStopped {
        file: PathBuf,
        line: i64,
        func: String,
        /// Stop address as reported by the debugger, e.g. `0x401136`.
        address: String,
        focus: bool,
    },
    /// The debugger acknowledged a breakpoint and assigned it a number.
    BreakpointBound {
        file: PathBuf,
        line: i64,
        number: i64,
    },
    Backtrace(Vec<Frame>),
    /// Local variables formatted as `name = value` lines.
    Locals(Vec<String>),
    /// Result of a single expression evaluation.
    Evaluation(String),
    /// Reply to a watch registration: display index and the raw value text.
    WatchEvaluated {
        index: i64,
        expression: String,
        text: String,
    },
    /// Memory rows formatted as `address byte byte ...` lines.
    Memory(Vec<String>),
    RegisterNames(Vec<String>),
    /// Register index to formatted value; integers are rendered in hex.
    RegisterValues(HashMap<usize, String>),
    Disassembly {
        file: PathBuf,
        func: String,
        lines: Vec<String>,
    },
    BatchFinished {
        summary: BatchSummary,
        ack: oneshot::Sender<()>,
    },
}
