/// Subprocess management.  Every child started from here shares our
/// stdin, stdout and stderr, so interaction passes straight through.

use std::io;
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::debug;

use crate::err::*;

fn internal_spawn<S: AsRef<str>>(argv: &[S]) -> io::Result<Child> {
    let (exe, args) = match argv.split_first() {
        Some(split) => split,
        None => return Err(io::Error::new(io::ErrorKind::InvalidInput,
                                          "empty command line")),
    };
    debug!(command = %cmdline(argv), "spawning");

    let mut cmd = Command::new(exe.as_ref());
    cmd.stdin(Stdio::inherit());
    cmd.stdout(Stdio::inherit());
    cmd.stderr(Stdio::inherit());
    cmd.args(args.iter().map(|a| a.as_ref()));
    cmd.spawn()
}

fn program<S: AsRef<str>>(argv: &[S]) -> &str {
    argv.first().map(|s| s.as_ref()).unwrap_or("<empty>")
}

fn cmdline<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(" ")
}

pub fn check_child_status<S: AsRef<str>>(argv: &[S], status: &ExitStatus)
                                         -> Result<(), HLError> {
    if status.success() {
        Ok(())
    } else {
        Err(map_unsuc_child(status, argv))
    }
}

pub fn spawn<S: AsRef<str>>(argv: &[S]) -> Result<Child, HLError> {
    internal_spawn(argv)
        .map_err(|e| map_io_err(e, format!("spawn {}", program(argv))))
}

/// Run a command to completion and hand back its exit status without
/// judging it.
pub fn wait_status<S: AsRef<str>>(argv: &[S]) -> Result<ExitStatus, HLError> {
    let mut child = spawn(argv)?;
    child.wait()
        .map_err(|e| map_io_err(e, format!("wait for {}", program(argv))))
}

/// Run a command to completion; an unsuccessful exit is an error.
pub fn run<S: AsRef<str>>(argv: &[S]) -> Result<(), HLError> {
    let status = wait_status(argv)?;
    check_child_status(argv, &status)
}
