//! Session-level tests against a scripted stand-in for the debugger binary.

#![cfg(unix)]

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

use debugger::{Debugger, DebuggerConfig, Event, StartError};

const FAKE_GDB: &str = r#"#!/bin/sh
printf '(gdb) \n'
while IFS= read -r line; do
  case "$line" in
    "-break-insert "*)
      printf '^done,bkpt={number="1",type="breakpoint",line="3",fullname="/tmp/demo/main.c"}\n'
      printf '(gdb) \n'
      ;;
    "-exec-continue")
      printf '^running\n'
      printf '(gdb) \n'
      printf '*stopped,reason="breakpoint-hit",bkptno="1",frame={addr="0x0000000000401136",func="main",line="3",fullname="/tmp/demo/main.c"}\n'
      printf '(gdb) \n'
      ;;
    "-exec-next")
      printf '^running\n'
      printf '(gdb) \n'
      printf '*stopped,reason="exited-normally"\n'
      printf '(gdb) \n'
      ;;
    "-exec-finish")
      printf '^done,reason="exited-normally"\n'
      printf '(gdb) \n'
      ;;
    "-stack-list-frames")
      printf '^done,stack=[frame={level="0",addr="0x0000000000401136",func="main",line="3",fullname="/tmp/demo/main.c"}]\n'
      printf '(gdb) \n'
      ;;
    "-stack-list-variables"*)
      printf '^done,variables=[{name="x",value="42"}]\n'
      printf '(gdb) \n'
      ;;
    "display "*)
      printf '~"1: x = {a = 1, b = {c = 2}}\\n"\n'
      printf '^done\n'
      printf '(gdb) \n'
      ;;
    *)
      printf '^done\n'
      printf '(gdb) \n'
      ;;
  esac
done
"#;

fn write_fake_gdb(dir: &tempfile::TempDir) -> eyre::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join("fake-gdb");
    std::fs::write(&path, FAKE_GDB).wrap_err("writing fake debugger script")?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .wrap_err("marking script executable")?;
    Ok(path)
}

fn started_session(dir: &tempfile::TempDir) -> eyre::Result<Debugger> {
    let debugger = Debugger::new(DebuggerConfig {
        debugger_path: Some(write_fake_gdb(dir)?),
        show_command_log: false,
        show_annotations: false,
    });
    debugger.start().wrap_err("starting session")?;
    Ok(debugger)
}

fn wait_for<T>(
    rx: &crossbeam_channel::Receiver<Event>,
    mut pred: impl FnMut(&Event) -> Option<T>,
) -> T {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        let remaining = deadline
            .checked_duration_since(std::time::Instant::now())
            .expect("timed out waiting for event");
        let event = rx.recv_timeout(remaining).expect("event channel closed");
        if let Some(value) = pred(&event) {
            return value;
        }
    }
}

#[test]
fn start_requires_a_configured_debugger() {
    let debugger = Debugger::new(DebuggerConfig::default());
    assert!(matches!(
        debugger.start(),
        Err(StartError::NoDebuggerConfigured)
    ));
    assert!(!debugger.executing());
}

#[test]
fn start_rejects_non_portable_paths() {
    let debugger = Debugger::new(DebuggerConfig {
        debugger_path: Some(PathBuf::from("/opt/调试器/gdb")),
        ..Default::default()
    });
    assert!(matches!(
        debugger.start(),
        Err(StartError::NonPortablePath(_))
    ));
}

#[test]
fn start_rejects_missing_binaries() {
    let debugger = Debugger::new(DebuggerConfig {
        debugger_path: Some(PathBuf::from("/nonexistent/gdb")),
        ..Default::default()
    });
    assert!(matches!(debugger.start(), Err(StartError::NotFound(_))));
}

#[test]
fn start_rejects_a_second_session() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let debugger = started_session(&dir)?;

    assert!(matches!(
        debugger.start(),
        Err(StartError::SessionAlreadyRunning)
    ));
    // the live session is untouched
    assert!(debugger.executing());

    debugger.stop();
    Ok(())
}

#[test]
fn stored_breakpoints_bind_on_session_start() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let debugger = Debugger::new(DebuggerConfig {
        debugger_path: Some(write_fake_gdb(&dir)?),
        ..Default::default()
    });
    let rx = debugger.events();

    // registered before any session exists
    debugger.add_breakpoint("/tmp/demo/main.c", 3, "");
    assert!(debugger.with_breakpoints(|bps| {
        !bps.at(Path::new("/tmp/demo/main.c"), 3).unwrap().is_bound()
    }));

    debugger.start()?;

    // replayed on start and confirmed by the debugger
    wait_for(&rx, |event| match event {
        Event::BreakpointsChanged => debugger
            .with_breakpoints(|bps| {
                bps.at(Path::new("/tmp/demo/main.c"), 3)
                    .filter(|bp| bp.number == 1)
                    .map(|_| ())
            }),
        _ => None,
    });

    debugger.stop();
    Ok(())
}

#[test]
fn stop_refreshes_backtrace_and_locals() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let debugger = started_session(&dir)?;
    let rx = debugger.events();

    debugger.continue_inferior();

    let (file, line, address) = wait_for(&rx, |event| match event {
        Event::InferiorStopped {
            file,
            line,
            address,
            ..
        } => Some((file.clone(), *line, address.clone())),
        _ => None,
    });
    assert_eq!(file, PathBuf::from("/tmp/demo/main.c"));
    assert_eq!(line, 3);
    assert_eq!(address, "0x0000000000401136");

    wait_for(&rx, |event| matches!(event, Event::BacktraceChanged).then_some(()));
    let frames = debugger.with_backtrace(|frames| frames.to_vec());
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].function, "main");

    let locals = wait_for(&rx, |event| match event {
        Event::LocalsReady(vars) => Some(vars.clone()),
        _ => None,
    });
    assert_eq!(locals, vec!["x = 42".to_string()]);

    debugger.stop();
    Ok(())
}

#[test]
fn watch_values_rebuild_into_trees() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let debugger = started_session(&dir)?;
    let rx = debugger.events();

    debugger.add_watch("x");
    // duplicate registration is silently ignored
    debugger.add_watch("x");

    wait_for(&rx, |event| match event {
        Event::WatchesChanged => debugger.with_watches(|watches| {
            watches.get("x").filter(|w| w.is_bound()).map(|_| ())
        }),
        _ => None,
    });

    debugger.with_watches(|watches| {
        let watch = watches.get("x").unwrap();
        assert_eq!(watch.gdb_index(), 1);
        assert_eq!(watch.root().value, "{");
        let named: Vec<&str> = watch
            .root()
            .children()
            .iter()
            .map(|&c| watch.node(c).name.as_str())
            .filter(|n| !n.is_empty())
            .collect();
        assert_eq!(named, vec!["a", "b"]);
    });
    assert_eq!(debugger.with_watches(|w| w.items().len()), 1);

    debugger.stop();
    Ok(())
}

#[test]
fn rename_to_existing_watch_is_a_noop() -> eyre::Result<()> {
    let debugger = Debugger::new(DebuggerConfig::default());
    debugger.add_watch("x");
    debugger.add_watch("y");
    debugger.rename_watch("x", "y");
    debugger.with_watches(|watches| {
        assert!(watches.contains("x"));
        assert!(watches.contains("y"));
        assert_eq!(watches.items().len(), 2);
    });
    Ok(())
}

#[test]
fn stops_leave_cpu_info_outdated() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let debugger = started_session(&dir)?;
    let rx = debugger.events();

    debugger.continue_inferior();
    wait_for(&rx, |event| {
        matches!(event, Event::CpuInfoOutdated).then_some(())
    });

    debugger.stop();
    Ok(())
}

#[test]
fn exit_reason_on_a_result_record_ends_the_session() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let debugger = started_session(&dir)?;
    let rx = debugger.events();

    // the fake debugger answers this with ^done,reason="exited-normally"
    debugger.step_out();

    wait_for(&rx, |event| matches!(event, Event::SessionEnded).then_some(()));
    assert!(!debugger.executing());
    Ok(())
}

#[test]
fn inferior_exit_ends_the_session() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let debugger = started_session(&dir)?;
    let rx = debugger.events();

    debugger.add_breakpoint("/tmp/demo/main.c", 3, "");
    debugger.step_over();

    wait_for(&rx, |event| matches!(event, Event::SessionEnded).then_some(()));
    assert!(!debugger.executing());
    // session state is reset but user state survives
    assert!(debugger.with_breakpoints(|bps| {
        !bps.at(Path::new("/tmp/demo/main.c"), 3).unwrap().is_bound()
    }));
    Ok(())
}

// test suite "constructor"
#[ctor::ctor]
fn init() {
    let in_ci = std::env::var("CI")
        .map(|val| val == "true")
        .unwrap_or(false);

    if std::io::stderr().is_terminal() || in_ci {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .json()
            .try_init();
    }

    // error traces
    let _ = color_eyre::install();
}
