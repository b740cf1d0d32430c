//! Error type and helper functions.

use std::io;
use std::path::{Path, PathBuf};

use std::process::ExitStatus;
use std::os::unix::process::ExitStatusExt;

use nix::sys::signal::Signal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HLError {
    #[error("Child process '{cmdline}' {status}.")]
    UnsuccessfulChild { status: String, cmdline: String },

    #[error("{detail}: {cause}.")]
    IOError           { #[source] cause: io::Error, detail: String },

    #[error("{detail}: {cause}.")]
    NixError          { #[source] cause: nix::Error, detail: String },

    #[error("{what} not found: {}.", .path.display())]
    NotFound          { what: &'static str, path: PathBuf },

    #[error("No command in {}.", .path.display())]
    EmptyCommand      { path: PathBuf },

    #[error("Extracting {}: {cause}.", .archive.display())]
    Extract           { #[source] cause: io::Error, archive: PathBuf },

    #[error("A root switch is already in progress in this process.")]
    RootBusy,

    #[error("Stuck in the container root ({detail}: {cause}).")]
    Stranded          { #[source] cause: nix::Error, detail: String },

    #[error("{what} is not supported on this platform.")]
    Unsupported       { what: &'static str },
}

/// Human-readable description of how a child process ended.
pub fn describe_status(status: &ExitStatus) -> String {
    match status.code() {
        Some(n) => format!("exited unsuccessfully (code {})", n),
        None => match status.signal() {
            Some(n) => {
                // Neither nix nor libc exposes strsignal(), feh.
                // This is better than printing the raw signal number.
                if let Ok(sig) = Signal::try_from(n) {
                    format!("killed by {:?}", sig)
                } else {
                    format!("killed by signal {}", n)
                }
            }
            None => String::from("ended in an unknown state"),
        }
    }
}

pub fn map_unsuc_child<S: AsRef<str>>(status: &ExitStatus, cmdline: &[S]) -> HLError {
    // FIXME: shell-quote as necessary.
    let cmd = cmdline.iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" ");
    HLError::UnsuccessfulChild { status: describe_status(status), cmdline: cmd }
}

pub fn map_io_err(cause: io::Error, detail: String) -> HLError {
    HLError::IOError { cause: cause, detail: detail }
}
pub fn map_nix_err(cause: nix::Error, detail: String) -> HLError {
    HLError::NixError { cause: cause, detail: detail }
}
pub fn map_extract_err(cause: io::Error, archive: &Path) -> HLError {
    HLError::Extract { cause: cause, archive: archive.to_path_buf() }
}
pub fn map_stranded_err(cause: nix::Error, detail: String) -> HLError {
    HLError::Stranded { cause: cause, detail: detail }
}
pub fn not_found(what: &'static str, path: &Path) -> HLError {
    HLError::NotFound { what: what, path: path.to_path_buf() }
}
