//! High level debugging session orchestrator.
//!
//! Owns the breakpoint, watch, backtrace and register state for a session,
//! translates user-level actions into machine-interface commands and reacts
//! to the `transport` event stream to keep that state current.

mod debugger;
mod error;
mod event;
mod internals;
mod types;
pub mod utils;
mod watch;

pub use debugger::{Debugger, DebuggerConfig};
pub use error::StartError;
pub use event::Event;
pub use types::{Breakpoint, BreakpointList, RegisterSet};
pub use watch::{WatchList, WatchNode, WatchVar};
