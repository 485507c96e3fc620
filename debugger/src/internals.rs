//! Shared session state and the handlers that mutate it.
//!
//! All mutation happens under the single `Arc<Mutex<DebuggerInternals>>`
//! owned by [`crate::Debugger`]: caller-thread operations lock it directly,
//! and the background pump thread locks it to apply reader events. The
//! reader's blocking batch hand-off therefore cannot interleave with a
//! caller operation.

use std::path::{Path, PathBuf};

use transport::{BatchSummary, CommandSource, Frame, ReaderHandle};

use crate::event::Event;
use crate::types::{Breakpoint, BreakpointList, RegisterSet};
use crate::watch::WatchList;

pub(crate) struct DebuggerInternals {
    pub(crate) show_command_log: bool,
    pub(crate) show_annotations: bool,
    publisher: crossbeam_channel::Sender<Event>,

    pub(crate) reader: Option<ReaderHandle>,
    pub(crate) executing: bool,

    pub(crate) breakpoints: BreakpointList,
    pub(crate) watches: WatchList,
    pub(crate) backtrace: Vec<Frame>,
    pub(crate) registers: RegisterSet,

    /// Disassembly decoded during the current batch, forwarded at most once
    /// per batch from the parse-finished hand-off.
    pending_disassembly: Option<(PathBuf, String, Vec<String>)>,
}

impl DebuggerInternals {
    pub(crate) fn new(
        show_command_log: bool,
        show_annotations: bool,
        publisher: crossbeam_channel::Sender<Event>,
    ) -> Self {
        Self {
            show_command_log,
            show_annotations,
            publisher,
            reader: None,
            executing: false,
            breakpoints: BreakpointList::default(),
            watches: WatchList::default(),
            backtrace: Vec::new(),
            registers: RegisterSet::default(),
            pending_disassembly: None,
        }
    }

    pub(crate) fn emit(&self, event: Event) {
        let _ = self.publisher.send(event);
    }

    pub(crate) fn send_command(&self, command: &str, params: &str, source: CommandSource) {
        match &self.reader {
            Some(reader) => reader.post_command(command, params, source),
            None => tracing::debug!(command, "dropping command, no session"),
        }
    }

    #[tracing::instrument(skip(self, event), level = "trace")]
    pub(crate) fn on_event(&mut self, event: transport::Event) {
        match event {
            transport::Event::CommandStarted { command } => {
                self.emit(Event::CommandStarted { command });
            }
            transport::Event::CommandFinished => self.emit(Event::CommandFinished),
            transport::Event::WriteFailed => self.emit(Event::WriteFailed),
            transport::Event::ProcessError(message) => {
                tracing::error!(%message, "debugger process error");
                self.emit(Event::ProcessError(message));
            }
            transport::Event::ConsoleLine(line) => self.emit(Event::DebugOutput(line)),
            transport::Event::InvalidateAllWatches => {
                let executing = self.executing;
                for watch in self.watches.iter_mut() {
                    watch.invalidate(executing);
                }
                self.emit(Event::WatchesChanged);
            }
            transport::Event::InferiorContinued => self.emit(Event::InferiorContinued),
            transport::Event::InferiorStopped {
                file,
                line,
                func: _,
                address,
                focus,
            } => {
                self.emit(Event::InferiorStopped {
                    file,
                    line,
                    address,
                    focus,
                });
            }
            transport::Event::BreakpointBound { file, line, number } => {
                if self.breakpoints.bind_number(&file, line, number) {
                    self.emit(Event::BreakpointsChanged);
                } else {
                    tracing::debug!(file = %file.display(), line, number, "confirmation for unknown breakpoint");
                }
            }
            transport::Event::Backtrace(frames) => {
                self.backtrace = frames;
                self.emit(Event::BacktraceChanged);
            }
            transport::Event::Locals(variables) => self.emit(Event::LocalsReady(variables)),
            transport::Event::Evaluation(value) => self.emit(Event::EvalReady(value)),
            transport::Event::WatchEvaluated {
                index,
                expression,
                text,
            } => {
                match self.watches.get_mut(&expression) {
                    Some(watch) => {
                        watch.set_gdb_index(index);
                        watch.rebuild(&transport::escape::tokenize(&text));
                        self.emit(Event::WatchesChanged);
                    }
                    None => {
                        tracing::debug!(%expression, "evaluation for unknown watch");
                    }
                }
            }
            transport::Event::Memory(rows) => self.emit(Event::MemoryReady(rows)),
            transport::Event::RegisterNames(names) => {
                self.registers.names = names;
                self.emit(Event::RegistersChanged);
            }
            transport::Event::RegisterValues(values) => {
                self.registers.values = values;
                self.emit(Event::RegistersChanged);
            }
            transport::Event::Disassembly { file, func, lines } => {
                self.pending_disassembly = Some((file, func, lines));
            }
            transport::Event::BatchFinished { summary, ack } => {
                self.sync_finished_parsing(summary);
                // release the reader only once state is fully updated
                let _ = ack.send(());
            }
        }
    }

    /// The per-batch synchronization point with the reader.
    fn sync_finished_parsing(&mut self, summary: BatchSummary) {
        if summary.source_newer_than_executable {
            self.emit(Event::SourceNewerThanExecutable);
        }
        if self.show_command_log {
            let lines = if self.show_annotations {
                summary.full_output
            } else {
                summary.console_output
            };
            for line in lines {
                self.emit(Event::DebugOutput(line));
            }
        }
        if summary.process_exited {
            self.stop_session();
            return;
        }
        if summary.signal_received {
            self.emit(Event::SignalReceived {
                name: summary.signal_name,
                meaning: summary.signal_meaning,
            });
        }
        if summary.update_cpu_info {
            self.emit(Event::CpuInfoOutdated);
        }
        if let Some((file, func, lines)) = self.pending_disassembly.take() {
            self.emit(Event::DisassemblyReady { file, func, lines });
        }
    }

    /// Request reader shutdown and mark the session ended. Idempotent.
    pub(crate) fn stop_session(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.stop();
        }
        self.end_session();
    }

    /// The reader loop has ended on its own (process exit or I/O error).
    pub(crate) fn clean_up_reader(&mut self) {
        self.reader = None;
        self.end_session();
    }

    fn end_session(&mut self) {
        if !self.executing {
            return;
        }
        self.executing = false;
        self.breakpoints.invalidate_numbers();
        for watch in self.watches.iter_mut() {
            watch.invalidate(false);
        }
        self.backtrace.clear();
        self.registers.clear();
        self.pending_disassembly = None;
        self.emit(Event::BreakpointsChanged);
        self.emit(Event::WatchesChanged);
        self.emit(Event::SessionEnded);
    }

    // breakpoints

    pub(crate) fn add_breakpoint(&mut self, filename: PathBuf, line: i64, condition: String) {
        let breakpoint = Breakpoint::new(filename.clone(), line, condition.clone());
        self.breakpoints.add(breakpoint);
        if self.executing {
            self.send_breakpoint_insert(&filename, line, &condition);
        }
        self.emit(Event::BreakpointsChanged);
    }

    fn send_breakpoint_insert(&self, filename: &Path, line: i64, condition: &str) {
        let mut params = String::new();
        if !condition.is_empty() {
            params.push_str("-c ");
            params.push_str(condition);
            params.push(' ');
        }
        params.push_str(&format!(
            "--source \"{}\" --line {}",
            crate::utils::wire_path(filename),
            line
        ));
        self.send_command("-break-insert", &params, CommandSource::Other);
    }

    pub(crate) fn remove_breakpoint(&mut self, filename: &Path, line: i64) {
        if let Some(bp) = self.breakpoints.at(filename, line) {
            if bp.is_bound() && self.executing {
                self.send_command("-break-delete", &bp.number.to_string(), CommandSource::Other);
            }
        }
        if self.breakpoints.remove(filename, line).is_some() {
            self.emit(Event::BreakpointsChanged);
        }
    }

    pub(crate) fn remove_breakpoints_of_file(&mut self, filename: &Path) {
        let locations: Vec<i64> = self
            .breakpoints
            .items()
            .iter()
            .filter(|bp| bp.filename == filename)
            .map(|bp| bp.line)
            .collect();
        for line in locations {
            self.remove_breakpoint(filename, line);
        }
    }

    pub(crate) fn remove_all_breakpoints(&mut self) {
        if self.executing {
            let bound: Vec<i64> = self
                .breakpoints
                .items()
                .iter()
                .filter(|bp| bp.is_bound())
                .map(|bp| bp.number)
                .collect();
            for number in bound {
                self.send_command("-break-delete", &number.to_string(), CommandSource::Other);
            }
        }
        self.breakpoints.clear();
        self.emit(Event::BreakpointsChanged);
    }

    pub(crate) fn set_breakpoint_condition(&mut self, filename: &Path, line: i64, condition: &str) {
        if !self.breakpoints.set_condition(filename, line, condition) {
            return;
        }
        if let Some(bp) = self.breakpoints.at(filename, line) {
            if bp.is_bound() && self.executing {
                // an empty condition clears the previous one
                let params = if condition.is_empty() {
                    bp.number.to_string()
                } else {
                    format!("{} {}", bp.number, condition)
                };
                self.send_command("-break-condition", &params, CommandSource::Other);
            }
        }
        self.emit(Event::BreakpointsChanged);
    }

    /// Replay every stored breakpoint into a fresh session.
    pub(crate) fn send_all_breakpoints(&mut self) {
        if !self.executing {
            return;
        }
        let pending: Vec<(PathBuf, i64, String)> = self
            .breakpoints
            .items()
            .iter()
            .filter(|bp| bp.enabled)
            .map(|bp| (bp.filename.clone(), bp.line, bp.condition.clone()))
            .collect();
        for (filename, line, condition) in pending {
            self.send_breakpoint_insert(&filename, line, &condition);
        }
    }

    // watches

    pub(crate) fn add_watch(&mut self, expression: &str) {
        if expression.is_empty() || !self.watches.add(expression) {
            return;
        }
        if self.executing {
            self.send_command("display", expression, CommandSource::Other);
        }
        self.emit(Event::WatchesChanged);
    }

    pub(crate) fn rename_watch(&mut self, old: &str, new: &str) {
        if old == new || new.is_empty() || self.watches.contains(new) {
            return;
        }
        let Some(index) = self.watches.get(old).map(|w| w.gdb_index()) else {
            return;
        };
        if index >= 0 && self.executing {
            self.send_command("undisplay", &index.to_string(), CommandSource::Other);
        }
        let executing = self.executing;
        if let Some(watch) = self.watches.get_mut(old) {
            watch.invalidate(executing);
            watch.set_expression(new);
        }
        if self.executing {
            self.send_command("display", new, CommandSource::Other);
        }
        self.emit(Event::WatchesChanged);
    }

    pub(crate) fn remove_watch(&mut self, expression: &str) {
        if let Some(watch) = self.watches.get(expression) {
            if watch.is_bound() && self.executing {
                self.send_command(
                    "undisplay",
                    &watch.gdb_index().to_string(),
                    CommandSource::Other,
                );
            }
        }
        if self.watches.remove(expression).is_some() {
            self.emit(Event::WatchesChanged);
        }
    }

    /// Drop all watch values; with `keep_roots` the expressions themselves
    /// survive and wait for re-registration.
    pub(crate) fn remove_all_watches(&mut self, keep_roots: bool) {
        if self.executing {
            let bound: Vec<i64> = self
                .watches
                .items()
                .iter()
                .map(|w| w.gdb_index())
                .filter(|&i| i >= 0)
                .collect();
            for index in bound {
                self.send_command("undisplay", &index.to_string(), CommandSource::Other);
            }
        }
        if keep_roots {
            let executing = self.executing;
            for watch in self.watches.iter_mut() {
                watch.invalidate(executing);
            }
        } else {
            self.watches.clear();
        }
        self.emit(Event::WatchesChanged);
    }

    /// Re-register every watch whose display index is unbound.
    pub(crate) fn refresh_watches(&mut self) {
        if !self.executing {
            return;
        }
        let stale: Vec<String> = self
            .watches
            .items()
            .iter()
            .filter(|w| !w.is_bound())
            .map(|w| w.expression().to_string())
            .collect();
        for expression in stale {
            self.send_command("display", &expression, CommandSource::Other);
        }
    }
}
