use std::path::PathBuf;

/// Session-level events published to the UI layer.
///
/// State-carrying collections (breakpoints, watches, backtrace, registers)
/// are read through the `Debugger::with_*` accessors; the `*Changed`
/// variants only signal that a read is worthwhile.
#[derive(Debug, Clone)]
pub enum Event {
    CommandStarted { command: String },
    CommandFinished,
    InferiorContinued,
    InferiorStopped {
        file: PathBuf,
        line: i64,
        /// Stop address as reported by the debugger.
        address: String,
        /// Whether the editor should move its caret to the stop location.
        focus: bool,
    },
    BreakpointsChanged,
    WatchesChanged,
    BacktraceChanged,
    RegistersChanged,
    /// The inferior stopped, so any displayed registers or disassembly are
    /// stale; emitted at most once per reply batch.
    CpuInfoOutdated,
    LocalsReady(Vec<String>),
    EvalReady(String),
    MemoryReady(Vec<String>),
    DisassemblyReady {
        file: PathBuf,
        func: String,
        lines: Vec<String>,
    },
    /// A line of raw protocol traffic or a command echo.
    DebugOutput(String),
    /// The executable on disk is older than its sources; the caller should
    /// offer a rebuild before continuing.
    SourceNewerThanExecutable,
    SignalReceived {
        name: String,
        meaning: String,
    },
    WriteFailed,
    ProcessError(String),
    SessionEnded,
}
