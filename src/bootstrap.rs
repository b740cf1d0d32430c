//! The outer half of a launch.  We re-execute ourselves in `child`
//! mode inside new PID, UTS and mount namespaces and wait for that
//! process to finish.  Nothing on the host is touched before the
//! child is running.

use std::ffi::OsString;
use std::process::ExitStatus;
use std::os::unix::process::ExitStatusExt;

use nix::sys::wait::WaitStatus;

use crate::config::Config;
use crate::err::*;

/// Path to our own executable, as seen by the kernel.
pub const SELF_EXE: &str = "/proc/self/exe";

/// Which side of the process boundary we are on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Invoked by the user; sets up namespaces and waits.
    Bootstrap,
    /// Re-executed inside the namespaces; does the actual launch.
    Contained,
}

impl Mode {
    /// Name of the command-line subcommand that selects this mode.
    pub fn subcommand(self) -> &'static str {
        match self {
            Mode::Bootstrap => "run",
            Mode::Contained => "child",
        }
    }
}

/// The namespaces every contained launcher gets.  Not configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceSet;

#[cfg(target_os = "linux")]
impl NamespaceSet {
    pub fn clone_flags(self) -> nix::sched::CloneFlags {
        use nix::sched::CloneFlags;
        CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWUTS | CloneFlags::CLONE_NEWNS
    }
}

/// Full argv for the re-executed child.
pub fn child_argv(config: &Config, image: &str, command: &[String])
                  -> Vec<OsString> {
    let mut argv = vec![OsString::from(SELF_EXE)];
    argv.extend(config.forward_args());
    argv.push(OsString::from(Mode::Contained.subcommand()));
    argv.push(OsString::from(image));
    if !command.is_empty() {
        argv.push(OsString::from("--"));
        argv.extend(command.iter().map(OsString::from));
    }
    argv
}

/// Translate what waitpid saw into an `ExitStatus`.  Anything other
/// than exit or death by signal has no equivalent.
pub fn exit_status_of(status: WaitStatus) -> Option<ExitStatus> {
    match status {
        WaitStatus::Exited(_, code) => Some(ExitStatus::from_raw((code & 0xff) << 8)),
        WaitStatus::Signaled(_, sig, _) => Some(ExitStatus::from_raw(sig as i32)),
        _ => None,
    }
}

fn check_wait_status(status: WaitStatus, argv: &[OsString]) -> Result<(), HLError> {
    let cmdline: Vec<String> = argv.iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    match exit_status_of(status) {
        Some(ref es) if es.success() => Ok(()),
        Some(ref es) => Err(map_unsuc_child(es, &cmdline)),
        None => Err(HLError::UnsuccessfulChild {
            status: format!("ended with {:?}", status),
            cmdline: cmdline.join(" "),
        }),
    }
}

#[cfg(target_os = "linux")]
pub fn bootstrap(config: &Config, image: &str, command: &[String])
                 -> Result<(), HLError> {
    use std::ffi::{CString, OsStr};
    use std::io::{self, Write};
    use std::os::unix::ffi::OsStrExt;

    use nix::errno::Errno;
    use nix::sched::clone;
    use nix::sys::wait::waitpid;
    use nix::unistd::execv;
    use tracing::{debug, info};

    const CHILD_STACK_SIZE: usize = 1024 * 1024;

    fn to_cstring(arg: &OsStr) -> Result<CString, HLError> {
        CString::new(arg.as_bytes()).map_err(|e| {
            map_io_err(io::Error::new(io::ErrorKind::InvalidInput, e),
                       format!("argument {:?}", arg))
        })
    }

    let argv = child_argv(config, image, command);
    let exe = to_cstring(OsStr::new(SELF_EXE))?;
    let c_argv = argv.iter()
        .map(|a| to_cstring(a))
        .collect::<Result<Vec<CString>, HLError>>()?;
    debug!(argv = ?argv, "re-executing in new namespaces");

    let mut stack = vec![0u8; CHILD_STACK_SIZE];
    let child_main: Box<dyn FnMut() -> isize + '_> = Box::new(|| {
        let Err(e) = execv(&exe, &c_argv);
        let _ = writeln!(io::stderr(), "exec {}: {}", SELF_EXE, e);
        127
    });

    let pid = unsafe {
        clone(child_main, &mut stack, NamespaceSet.clone_flags(),
              Some(libc::SIGCHLD))
    }.map_err(|e| map_nix_err(e, String::from("clone into new namespaces")))?;
    info!(pid = pid.as_raw(), image = image, "started contained launcher");

    let status = loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => continue,
            other => break other,
        }
    }.map_err(|e| map_nix_err(e, format!("wait for {}", pid)))?;
    debug!(status = ?status, "contained launcher finished");

    check_wait_status(status, &argv)
}

#[cfg(not(target_os = "linux"))]
pub fn bootstrap(_config: &Config, _image: &str, _command: &[String])
                 -> Result<(), HLError> {
    Err(HLError::Unsupported { what: "namespace isolation" })
}
