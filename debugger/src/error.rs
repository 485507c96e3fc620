use std::path::PathBuf;

use thiserror::Error;

/// Failure to bring up a debugging session. These are the only hard-fail
/// paths; the orchestrator is left in the not-executing state.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("a debugging session is already running")]
    SessionAlreadyRunning,
    #[error("no debugger binary configured")]
    NoDebuggerConfigured,
    #[error("debugger path {} contains non-portable characters", .0.display())]
    NonPortablePath(PathBuf),
    #[error("debugger binary {} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error(transparent)]
    Spawn(#[from] transport::SpawnError),
}
