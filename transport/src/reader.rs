//! The session reader: owns the debugger subprocess, the command queue and
//! the output-buffering loop.
//!
//! Exactly one command is outstanding at a time. A reply is complete only
//! when the accumulated output ends in a newline and contains the ready
//! prompt; partial reads are held across poll iterations because MI replies
//! span many lines before the sentinel appears.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use timeout_readwrite::TimeoutReader;

use crate::escape;
use crate::events::{BatchSummary, Event, Frame};
use crate::parse::{self, ParseObject, ParseValue, ResultClass};
use crate::types::{CommandSource, DebugCommand};
use crate::{SpawnError, GDB_PROMPT, MI_ARGS};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long a stopping session waits for the debugger to honour
/// `-gdb-exit` before it is killed.
const STOP_GRACE: Duration = Duration::from_millis(500);
const SOURCE_NEWER_WARNING: &str = "Source file is more recent than executable";

/// Read-only configuration for one session, fixed at start.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub debugger_path: PathBuf,
    /// Echo dispatched commands to the debug console stream.
    pub show_command_log: bool,
    /// Commands re-issued, ahead of the queue, every time the inferior stops.
    pub stop_hook_commands: Vec<DebugCommand>,
}

/// The primary FIFO queue plus the fixed on-stop command list.
#[derive(Debug, Default)]
struct CommandQueue {
    queue: VecDeque<DebugCommand>,
    stop_hooks: Vec<DebugCommand>,
}

impl CommandQueue {
    fn post(&mut self, cmd: DebugCommand) {
        self.queue.push_back(cmd);
    }

    fn register_stop_hook(&mut self, cmd: DebugCommand) {
        self.stop_hooks.push(cmd);
    }

    /// Push the on-stop commands to the front, preserving their registration
    /// order, so they run before anything already queued.
    fn run_stop_hooks(&mut self) {
        for cmd in self.stop_hooks.iter().rev() {
            self.queue.push_front(cmd.clone());
        }
    }

    fn pop(&mut self) -> Option<DebugCommand> {
        self.queue.pop_front()
    }

    fn clear(&mut self) {
        self.queue.clear();
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Caller-side handle to a running reader. Cloneable; all methods are safe
/// to call from any thread.
#[derive(Clone)]
pub struct ReaderHandle {
    queue: Arc<Mutex<CommandQueue>>,
    stop: Arc<AtomicBool>,
    invalidate_all: Arc<AtomicBool>,
    cmd_running: Arc<AtomicBool>,
}

impl ReaderHandle {
    pub fn post_command(
        &self,
        command: impl Into<String>,
        params: impl Into<String>,
        source: CommandSource,
    ) {
        let mut queue = self.queue.lock().unwrap();
        queue.post(DebugCommand::new(command, params, source));
    }

    pub fn clear_queue(&self) {
        self.queue.lock().unwrap().clear();
    }

    /// True while a command is in flight or still queued.
    pub fn command_running(&self) -> bool {
        self.cmd_running.load(Ordering::SeqCst) || !self.queue.lock().unwrap().is_empty()
    }

    /// Request a graceful shutdown; observed on the next loop iteration.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// One-shot: the next output batch drops all tracked watch values
    /// before normal event emission continues.
    pub fn invalidate_all_watches(&self) {
        self.invalidate_all.store(true, Ordering::SeqCst);
    }
}

/// The reader loop state. Owned by a dedicated thread; see [`Reader::start`].
pub struct Reader {
    config: ReaderConfig,
    events: crossbeam_channel::Sender<Event>,
    queue: Arc<Mutex<CommandQueue>>,
    stop: Arc<AtomicBool>,
    invalidate_all: Arc<AtomicBool>,
    cmd_running: Arc<AtomicBool>,

    current_cmd: Option<DebugCommand>,
    process_exited: bool,
    batch: BatchSummary,

    // most recent stop location, cleared on every resume
    current_file: PathBuf,
    current_line: i64,
    current_func: String,
    current_address: String,
}

impl Reader {
    /// Launch the debugger subprocess and enter the read loop on a
    /// dedicated thread. Blocks until the subprocess has been observed to
    /// start; a launch failure is returned to the caller.
    pub fn start(
        config: ReaderConfig,
        events: crossbeam_channel::Sender<Event>,
    ) -> Result<ReaderHandle, SpawnError> {
        let queue = Arc::new(Mutex::new(CommandQueue::default()));
        {
            let mut locked = queue.lock().unwrap();
            for cmd in &config.stop_hook_commands {
                locked.register_stop_hook(cmd.clone());
            }
        }
        let stop = Arc::new(AtomicBool::new(false));
        let invalidate_all = Arc::new(AtomicBool::new(false));
        let cmd_running = Arc::new(AtomicBool::new(false));

        let handle = ReaderHandle {
            queue: Arc::clone(&queue),
            stop: Arc::clone(&stop),
            invalidate_all: Arc::clone(&invalidate_all),
            cmd_running: Arc::clone(&cmd_running),
        };

        let reader = Reader {
            config,
            events,
            queue,
            stop,
            invalidate_all,
            cmd_running,
            current_cmd: None,
            process_exited: false,
            batch: BatchSummary::default(),
            current_file: PathBuf::new(),
            current_line: -1,
            current_func: String::new(),
            current_address: String::new(),
        };

        let (started_tx, started_rx) = oneshot::channel();
        thread::Builder::new()
            .name("mi-reader".to_string())
            .spawn(move || reader.run(started_tx))
            .map_err(SpawnError::Process)?;

        match started_rx.recv() {
            Ok(Ok(())) => Ok(handle),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SpawnError::NoStartSignal),
        }
    }

    fn run(mut self, started: oneshot::Sender<Result<(), SpawnError>>) {
        let (mut child, mut stdin, output) = match self.spawn_process() {
            Ok(parts) => parts,
            Err(e) => {
                let _ = started.send(Err(e));
                return;
            }
        };
        let _ = started.send(Ok(()));

        let mut output = TimeoutReader::new(output, POLL_INTERVAL);
        let mut buffer: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(%status, "debugger process exited");
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    self.emit(Event::ProcessError(e.to_string()));
                    break;
                }
            }
            if self.stop.load(Ordering::SeqCst) {
                // ask for an orderly exit first; kill only if the grace
                // window runs out
                if let Some(stdin) = stdin.as_mut() {
                    let _ = stdin
                        .write_all(b"-gdb-exit\n")
                        .and_then(|_| stdin.flush());
                }
                drop(stdin.take());
                if !exited_within(&mut child, STOP_GRACE) {
                    let _ = child.kill();
                }
                let _ = child.wait();
                break;
            }

            let read = match output.read(&mut chunk) {
                Ok(n) => n,
                Err(e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    0
                }
                Err(e) => {
                    self.emit(Event::ProcessError(e.to_string()));
                    break;
                }
            };
            if read > 0 {
                buffer.extend_from_slice(&chunk[..read]);
            }

            if read > 0 && buffer.ends_with(b"\n") && output_terminated(&buffer) {
                self.process_debug_output(&buffer);
                buffer.clear();
                self.cmd_running.store(false, Ordering::SeqCst);
                self.run_next_cmd(&mut stdin);
            } else if read == 0 && !self.cmd_running.load(Ordering::SeqCst) {
                self.run_next_cmd(&mut stdin);
            } else if read == 0 {
                thread::sleep(POLL_INTERVAL);
            }
        }
        tracing::debug!("reader loop finished");
    }

    fn spawn_process(&self) -> Result<(Child, Option<ChildStdin>, os_pipe::PipeReader), SpawnError> {
        // merge stdout and stderr into a single readable stream
        let (pipe_reader, pipe_writer) = os_pipe::pipe().map_err(SpawnError::Process)?;
        let stderr_writer = pipe_writer.try_clone().map_err(SpawnError::Process)?;

        let mut command = Command::new(&self.config.debugger_path);
        command
            .args(MI_ARGS)
            .stdin(Stdio::piped())
            .stdout(pipe_writer)
            .stderr(stderr_writer);
        if let Some(dir) = self
            .config
            .debugger_path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
        {
            command.current_dir(dir);
            if let Some(path) = path_with(dir) {
                command.env("PATH", path);
            }
        }

        let mut child = command.spawn().map_err(SpawnError::Process)?;
        let stdin = child.stdin.take();
        tracing::debug!(pid = child.id(), path = %self.config.debugger_path.display(), "debugger started");
        Ok((child, stdin, pipe_reader))
    }

    /// Retire the current command (if any), then send the next queued one.
    fn run_next_cmd(&mut self, stdin: &mut Option<ChildStdin>) {
        if self.current_cmd.take().is_some() {
            self.emit(Event::CommandFinished);
        }
        let next = self.queue.lock().unwrap().pop();
        let Some(cmd) = next else { return };

        self.cmd_running.store(true, Ordering::SeqCst);
        self.emit(Event::CommandStarted {
            command: cmd.display(),
        });

        let wire = cmd.serialize();
        let write_ok = match stdin.as_mut() {
            Some(stdin) => stdin
                .write_all(wire.as_bytes())
                .and_then(|_| stdin.flush())
                .is_ok(),
            None => false,
        };
        if !write_ok {
            self.emit(Event::WriteFailed);
        }
        if self.config.show_command_log {
            self.emit(Event::ConsoleLine(cmd.display()));
        }
        self.current_cmd = Some(cmd);
    }

    /// Decode one full reply: every accumulated line is stripped of its
    /// numeric token and dispatched by its leading sigil. Ends with the
    /// blocking parse-finished hand-off.
    fn process_debug_output(&mut self, output: &[u8]) {
        if self.invalidate_all.swap(false, Ordering::SeqCst) {
            self.emit(Event::InvalidateAllWatches);
        }

        self.batch = BatchSummary::default();

        for line in output.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            self.batch.full_output.push(escape::bytes_to_text(line));
            let line = parse::strip_token(line);
            if line.is_empty() {
                continue;
            }
            match line[0] {
                b'~' => self.process_console_output(line),
                b'^' => self.process_result_record(line),
                b'*' => self.process_exec_async_record(&line[1..]),
                // target output, log output, status, notify
                b'@' | b'&' | b'+' | b'=' => {}
                _ => {}
            }
        }

        self.batch.process_exited = self.process_exited;
        let summary = std::mem::take(&mut self.batch);
        let (ack_tx, ack_rx) = oneshot::channel();
        self.emit(Event::BatchFinished {
            summary,
            ack: ack_tx,
        });
        // suspend until the orchestrator has applied the batch, so the next
        // dispatched command cannot be attributed to the wrong reply
        let _ = ack_rx.recv();
    }

    fn process_console_output(&mut self, line: &[u8]) {
        if line.len() > 3 && line.starts_with(b"~\"") && line.ends_with(b"\"") {
            let decoded = escape::decode_escapes(&line[2..line.len() - 1]);
            let text = escape::bytes_to_text(&decoded);
            if text.contains(SOURCE_NEWER_WARNING) {
                self.batch.source_newer_than_executable = true;
            }
            self.batch.console_output.push(text);
        }
    }

    fn process_result_record(&mut self, line: &[u8]) {
        if line.starts_with(b"^exit") {
            self.process_exited = true;
            return;
        }
        if line.starts_with(b"^error") {
            self.batch
                .console_output
                .push(escape::bytes_to_text(line));
            return;
        }
        if line.starts_with(b"^done") || line.starts_with(b"^running") {
            if let Some(pos) = line.iter().position(|&b| b == b',') {
                self.process_result(&line[pos + 1..]);
            } else if let Some(cmd) = self.current_cmd.as_ref() {
                // literal console requests answer through the console stream
                if !cmd.command.starts_with('-') {
                    match cmd.command.as_str() {
                        "disas" => self.emit_disassembly(),
                        "display" => self.emit_watch_evaluation(),
                        _ => {}
                    }
                }
            }
            return;
        }
        if line.starts_with(b"^connected") {
            // remote target attached; no state change
        }
    }

    fn process_result(&mut self, payload: &[u8]) {
        let obj = match parse::parse_result_payload(payload) {
            Ok(obj) => obj,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed result record");
                return;
            }
        };
        // an exit reason can ride on a plain result record instead of an
        // async stop notification
        match obj.value("reason") {
            "exited" | "exited-normally" => {
                self.process_exited = true;
                return;
            }
            "exited-signalled" => {
                self.process_exited = true;
                self.batch.signal_received = true;
                return;
            }
            _ => {}
        }
        if self.current_cmd.is_none() {
            return;
        }
        let Some(class) = parse::classify_result(&obj) else {
            return;
        };
        match class {
            ResultClass::BreakpointTable | ResultClass::Locals => {}
            ResultClass::Frame => {
                // frame changes (e.g. `-stack-select-frame`) retarget later
                // disassembly requests
                if let Some(frame) = obj.object("frame") {
                    self.current_line = frame.int("line", -1);
                    self.current_file = frame.path("fullname");
                    self.current_func = frame.value("func").to_string();
                    self.current_address = frame.value("addr").to_string();
                }
            }
            ResultClass::Breakpoint => self.handle_breakpoint(obj.object("bkpt")),
            ResultClass::FrameStack => self.handle_stack(obj.array("stack")),
            ResultClass::LocalVariables => self.handle_local_variables(obj.array("variables")),
            ResultClass::Evaluation => {
                let value = obj.value("value").to_string();
                self.emit(Event::Evaluation(value));
            }
            ResultClass::Memory => self.handle_memory(obj.array("memory")),
            ResultClass::RegisterNames => self.handle_register_names(obj.array("register-names")),
            ResultClass::RegisterValues => {
                self.handle_register_values(obj.array("register-values"))
            }
        }
    }

    fn process_exec_async_record(&mut self, line: &[u8]) {
        let (class, values) = match parse::parse_async_record(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed async record");
                return;
            }
        };
        match class.as_str() {
            "running" => {
                self.current_file = PathBuf::new();
                self.current_line = -1;
                self.current_func.clear();
                self.current_address.clear();
                self.emit(Event::InferiorContinued);
            }
            "stopped" => {
                let reason = values.value("reason").to_string();
                match reason.as_str() {
                    // inferior exited, the debugger should terminate too
                    "exited" | "exited-normally" => {
                        self.process_exited = true;
                        return;
                    }
                    "exited-signalled" => {
                        self.process_exited = true;
                        self.batch.signal_received = true;
                        return;
                    }
                    _ => {}
                }
                self.batch.update_cpu_info = true;
                if let Some(frame) = values.object("frame") {
                    self.current_line = frame.int("line", -1);
                    self.current_file = frame.path("fullname");
                    self.current_func = frame.value("func").to_string();
                    self.current_address = frame.value("addr").to_string();
                }
                if reason == "signal-received" {
                    self.batch.signal_received = true;
                    self.batch.signal_name = values.value("signal-name").to_string();
                    self.batch.signal_meaning = values.value("signal-meaning").to_string();
                }
                self.queue.lock().unwrap().run_stop_hooks();
                let focus = !matches!(
                    self.current_cmd.as_ref().map(|c| c.source),
                    Some(CommandSource::Console)
                );
                self.emit(Event::InferiorStopped {
                    file: self.current_file.clone(),
                    line: self.current_line,
                    func: self.current_func.clone(),
                    address: self.current_address.clone(),
                    focus,
                });
            }
            _ => {}
        }
    }

    fn handle_breakpoint(&mut self, bkpt: Option<&ParseObject>) {
        let Some(bkpt) = bkpt else { return };
        self.emit(Event::BreakpointBound {
            file: bkpt.path("fullname"),
            line: bkpt.int("line", 0),
            number: bkpt.int("number", -1),
        });
    }

    fn handle_stack(&mut self, stack: &[ParseValue]) {
        let frames = stack
            .iter()
            .filter_map(ParseValue::as_object)
            .map(|frame| Frame {
                function: frame.value("func").to_string(),
                file: frame.path("fullname"),
                line: frame.int("line", 0),
                level: frame.int("level", 0),
                address: frame.value("addr").to_string(),
            })
            .collect();
        self.emit(Event::Backtrace(frames));
    }

    fn handle_local_variables(&mut self, variables: &[ParseValue]) {
        let locals = variables
            .iter()
            .filter_map(ParseValue::as_object)
            .map(|var| format!("{} = {}", var.value("name"), var.value("value")))
            .collect();
        self.emit(Event::Locals(locals));
    }

    fn handle_memory(&mut self, rows: &[ParseValue]) {
        let memory = rows
            .iter()
            .filter_map(ParseValue::as_object)
            .map(|row| {
                let values: Vec<&str> = row
                    .array("data")
                    .iter()
                    .map(ParseValue::as_str)
                    .collect();
                format!("{} {}", row.value("addr"), values.join(" "))
            })
            .collect();
        self.emit(Event::Memory(memory));
    }

    fn handle_register_names(&mut self, names: &[ParseValue]) {
        let names = names.iter().map(|n| n.as_str().to_string()).collect();
        self.emit(Event::RegisterNames(names));
    }

    fn handle_register_values(&mut self, values: &[ParseValue]) {
        let mut result = std::collections::HashMap::new();
        for value in values.iter().filter_map(ParseValue::as_object) {
            let number = value.int("number", -1);
            if number < 0 {
                continue;
            }
            result.insert(number as usize, format_register_value(value.value("value")));
        }
        self.emit(Event::RegisterValues(result));
    }

    fn emit_disassembly(&self) {
        let mut lines = self.batch.console_output.clone();
        // drop the header lines and the trailing footer
        if lines.len() >= 3 {
            lines.pop();
            lines.remove(0);
            lines.remove(0);
        }
        self.emit(Event::Disassembly {
            file: self.current_file.clone(),
            func: self.current_func.clone(),
            lines,
        });
    }

    /// A `display <expr>` reply is console text `N: expr = <value>`; the
    /// display index binds the watch expression.
    fn emit_watch_evaluation(&self) {
        let text = self.batch.console_output.join("");
        let Some((index, rest)) = text.split_once(':') else {
            return;
        };
        let Ok(index) = index.trim().parse::<i64>() else {
            return;
        };
        let Some((expression, value)) = rest.split_once(" = ") else {
            return;
        };
        self.emit(Event::WatchEvaluated {
            index,
            expression: expression.trim().to_string(),
            text: value.trim().to_string(),
        });
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }
}

fn exited_within(child: &mut Child, grace: Duration) -> bool {
    let deadline = std::time::Instant::now() + grace;
    while std::time::Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(_) => return false,
        }
    }
    false
}

/// A full reply has arrived once some line, trimmed, equals the ready
/// prompt.
fn output_terminated(buffer: &[u8]) -> bool {
    buffer
        .split(|&b| b == b'\n')
        .any(|line| String::from_utf8_lossy(line).trim() == GDB_PROMPT)
}

fn format_register_value(raw: &str) -> String {
    match raw.parse::<i64>() {
        Ok(value) => format!("{value:#x}"),
        Err(_) => raw.to_string(),
    }
}

fn path_with(dir: &Path) -> Option<OsString> {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(verb: &str) -> DebugCommand {
        DebugCommand::new(verb, "", CommandSource::Other)
    }

    #[test]
    fn queue_is_fifo() {
        let mut queue = CommandQueue::default();
        queue.post(cmd("-exec-run"));
        queue.post(cmd("-exec-next"));
        queue.post(cmd("-exec-step"));
        let drained: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|c| c.command)
            .collect();
        assert_eq!(drained, vec!["-exec-run", "-exec-next", "-exec-step"]);
    }

    #[test]
    fn stop_hooks_run_before_queued_commands() {
        let mut queue = CommandQueue::default();
        queue.register_stop_hook(cmd("-stack-list-frames"));
        queue.register_stop_hook(cmd("-stack-list-variables"));
        queue.post(cmd("-data-evaluate-expression"));
        queue.run_stop_hooks();
        let drained: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|c| c.command)
            .collect();
        assert_eq!(
            drained,
            vec![
                "-stack-list-frames",
                "-stack-list-variables",
                "-data-evaluate-expression"
            ]
        );
    }

    #[test]
    fn reply_terminator_is_the_prompt_line() {
        assert!(output_terminated(b"^done\n(gdb) \n"));
        assert!(output_terminated(b"~\"hi\"\n(gdb)\n"));
        assert!(!output_terminated(b"^done\n~\"partial"));
        // the prompt must be a whole line
        assert!(!output_terminated(b"~\"(gdb) says hi\"\n"));
    }

    #[test]
    fn register_values_format_integers_as_hex() {
        assert_eq!(format_register_value("128"), "0x80");
        assert_eq!(format_register_value("0"), "0x0");
        assert_eq!(format_register_value("0x7fff"), "0x7fff");
        assert_eq!(format_register_value("{f = 1.5}"), "{f = 1.5}");
    }
}
