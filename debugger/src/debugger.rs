use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    thread,
};

use transport::{CommandSource, DebugCommand, Frame, Reader, ReaderConfig};

use crate::{
    error::StartError,
    event::Event,
    internals::DebuggerInternals,
    types::{Breakpoint, BreakpointList, RegisterSet},
    utils,
    watch::WatchList,
};

/// Session configuration, fixed for the lifetime of a [`Debugger`].
#[derive(Debug, Clone, Default)]
pub struct DebuggerConfig {
    pub debugger_path: Option<PathBuf>,
    /// Surface raw protocol traffic as [`Event::DebugOutput`].
    pub show_command_log: bool,
    /// With the command log on, forward the full annotated output instead
    /// of only the console-stream text.
    pub show_annotations: bool,
}

/// Represents a debugging session.
///
/// All methods are safe to call from any thread; operations that need a
/// live session are no-ops without one, except [`Debugger::start`].
pub struct Debugger {
    internals: Arc<Mutex<DebuggerInternals>>,
    config: DebuggerConfig,
    rx: crossbeam_channel::Receiver<Event>,
}

impl Debugger {
    pub fn new(config: DebuggerConfig) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let internals =
            DebuggerInternals::new(config.show_command_log, config.show_annotations, tx);
        Self {
            internals: Arc::new(Mutex::new(internals)),
            config,
            rx,
        }
    }

    /// Launch the debugger subprocess and wire its events into this
    /// session. Blocks until the subprocess has been observed to start.
    #[tracing::instrument(skip(self))]
    pub fn start(&self) -> Result<(), StartError> {
        if self.internals.lock().unwrap().executing {
            return Err(StartError::SessionAlreadyRunning);
        }
        let path = self
            .config
            .debugger_path
            .clone()
            .ok_or(StartError::NoDebuggerConfigured)?;
        let path = utils::normalise_path(&path).into_owned();
        if !utils::is_portable_path(&path) {
            return Err(StartError::NonPortablePath(path));
        }
        if !path.exists() {
            return Err(StartError::NotFound(path));
        }

        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let reader_config = ReaderConfig {
            debugger_path: path,
            show_command_log: self.config.show_command_log,
            // refresh stack and locals on every stop, ahead of queued work
            stop_hook_commands: vec![
                DebugCommand::new("-stack-list-frames", "", CommandSource::Other),
                DebugCommand::new("-stack-list-variables", "--all-values", CommandSource::Other),
            ],
        };
        let handle = Reader::start(reader_config, event_tx)?;

        {
            let mut internals = self.internals.lock().unwrap();
            if internals.executing {
                // lost a race against a concurrent start
                handle.stop();
                return Err(StartError::SessionAlreadyRunning);
            }
            internals.reader = Some(handle);
            internals.executing = true;
            // replay persisted state into the fresh session
            internals.send_all_breakpoints();
            internals.refresh_watches();
        }

        let background = Arc::clone(&self.internals);
        thread::spawn(move || {
            for event in event_rx {
                background.lock().unwrap().on_event(event);
            }
            tracing::debug!("reader event stream closed");
            background.lock().unwrap().clean_up_reader();
        });
        Ok(())
    }

    /// Request a graceful shutdown of the active session; idempotent.
    pub fn stop(&self) {
        self.internals.lock().unwrap().stop_session();
    }

    pub fn executing(&self) -> bool {
        self.internals.lock().unwrap().executing
    }

    pub fn events(&self) -> crossbeam_channel::Receiver<Event> {
        self.rx.clone()
    }

    // run control

    pub fn run(&self) {
        self.send_exec("-exec-run");
    }

    pub fn continue_inferior(&self) {
        self.send_exec("-exec-continue");
    }

    pub fn step_over(&self) {
        self.send_exec("-exec-next");
    }

    pub fn step_into(&self) {
        self.send_exec("-exec-step");
    }

    pub fn step_out(&self) {
        self.send_exec("-exec-finish");
    }

    fn send_exec(&self, command: &str) {
        let internals = self.internals.lock().unwrap();
        if internals.executing {
            internals.send_command(command, "", CommandSource::Other);
        }
    }

    /// Send a command typed into the debug console verbatim.
    pub fn send_console_command(&self, input: &str) {
        let input = input.trim();
        if input.is_empty() {
            return;
        }
        let (command, params) = input.split_once(' ').unwrap_or((input, ""));
        let internals = self.internals.lock().unwrap();
        if internals.executing {
            internals.send_command(command, params.trim(), CommandSource::Console);
        }
    }

    // breakpoints

    pub fn add_breakpoint(&self, filename: impl Into<PathBuf>, line: i64, condition: &str) {
        self.internals
            .lock()
            .unwrap()
            .add_breakpoint(filename.into(), line, condition.to_string());
    }

    pub fn remove_breakpoint(&self, filename: &Path, line: i64) {
        self.internals.lock().unwrap().remove_breakpoint(filename, line);
    }

    pub fn remove_breakpoints_of_file(&self, filename: &Path) {
        self.internals
            .lock()
            .unwrap()
            .remove_breakpoints_of_file(filename);
    }

    pub fn remove_all_breakpoints(&self) {
        self.internals.lock().unwrap().remove_all_breakpoints();
    }

    pub fn set_breakpoint_condition(&self, filename: &Path, line: i64, condition: &str) {
        self.internals
            .lock()
            .unwrap()
            .set_breakpoint_condition(filename, line, condition);
    }

    pub fn load_breakpoints(&self, breakpoints: Vec<Breakpoint>) {
        let mut internals = self.internals.lock().unwrap();
        for bp in breakpoints {
            internals.add_breakpoint(bp.filename, bp.line, bp.condition);
        }
    }

    /// Source lines were deleted; shift or drop affected breakpoints.
    pub fn on_file_delete_lines(&self, filename: &Path, start_line: i64, count: i64) {
        let mut internals = self.internals.lock().unwrap();
        internals
            .breakpoints
            .on_file_delete_lines(filename, start_line, count);
        internals.emit(Event::BreakpointsChanged);
    }

    /// Source lines were inserted; shift affected breakpoints.
    pub fn on_file_insert_lines(&self, filename: &Path, start_line: i64, count: i64) {
        let mut internals = self.internals.lock().unwrap();
        internals
            .breakpoints
            .on_file_insert_lines(filename, start_line, count);
        internals.emit(Event::BreakpointsChanged);
    }

    // watches

    pub fn add_watch(&self, expression: &str) {
        self.internals.lock().unwrap().add_watch(expression);
    }

    pub fn rename_watch(&self, old: &str, new: &str) {
        self.internals.lock().unwrap().rename_watch(old, new);
    }

    pub fn remove_watch(&self, expression: &str) {
        self.internals.lock().unwrap().remove_watch(expression);
    }

    pub fn remove_all_watches(&self, keep_roots: bool) {
        self.internals.lock().unwrap().remove_all_watches(keep_roots);
    }

    pub fn refresh_watches(&self) {
        self.internals.lock().unwrap().refresh_watches();
    }

    /// One-shot: the next reply batch drops every tracked watch value
    /// before its events are applied.
    pub fn invalidate_all_watches(&self) {
        let internals = self.internals.lock().unwrap();
        if let Some(reader) = &internals.reader {
            reader.invalidate_all_watches();
        }
    }

    // inspection

    pub fn evaluate(&self, expression: &str) {
        let internals = self.internals.lock().unwrap();
        if internals.executing {
            internals.send_command("-data-evaluate-expression", expression, CommandSource::Other);
        }
    }

    pub fn request_registers(&self) {
        let internals = self.internals.lock().unwrap();
        if internals.executing {
            internals.send_command("-data-list-register-names", "", CommandSource::Other);
            internals.send_command("-data-list-register-values", "x", CommandSource::Other);
        }
    }

    pub fn examine_memory(&self, address: &str, rows: i64) {
        let internals = self.internals.lock().unwrap();
        if internals.executing {
            internals.send_command(
                "-data-read-memory",
                &format!("{address} x 1 {rows} 8"),
                CommandSource::Other,
            );
        }
    }

    pub fn request_disassembly(&self) {
        let internals = self.internals.lock().unwrap();
        if internals.executing {
            internals.send_command("disas", "", CommandSource::Other);
        }
    }

    /// True while a command is in flight or queued.
    pub fn command_running(&self) -> bool {
        let internals = self.internals.lock().unwrap();
        internals
            .reader
            .as_ref()
            .map(|r| r.command_running())
            .unwrap_or(false)
    }

    // state accessors

    pub fn with_breakpoints<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&BreakpointList) -> T,
    {
        f(&self.internals.lock().unwrap().breakpoints)
    }

    pub fn with_watches<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&WatchList) -> T,
    {
        f(&self.internals.lock().unwrap().watches)
    }

    pub fn with_backtrace<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&[Frame]) -> T,
    {
        f(&self.internals.lock().unwrap().backtrace)
    }

    pub fn with_registers<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&RegisterSet) -> T,
    {
        f(&self.internals.lock().unwrap().registers)
    }
}
