//! Scoped temporary directories that serve as a container's root.
//!
//! A `TempRoot` schedules its own removal the moment it is created:
//! dropping it removes the whole tree.  `destroy` does the same thing
//! explicitly, and `abandon` is the only way to keep the directory.

use std::path::{Path, PathBuf};

use tempfile::{Builder, TempDir};
use tracing::{debug, info, warn};

use crate::err::*;

/// Replace every run of characters outside `[A-Za-z0-9 ]` with a
/// single underscore, e.g. `my image!.tar.gz` becomes `my image_tar_gz`.
pub fn normalize_prefix(name: &str) -> String {
    let mut prefix = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == ' ' {
            prefix.push(c);
            in_run = false;
        } else if !in_run {
            prefix.push('_');
            in_run = true;
        }
    }
    prefix
}

#[derive(Debug)]
pub struct TempRoot {
    dir: TempDir,
}

impl TempRoot {
    /// Allocate a fresh root under `base`, named after `name`.
    pub fn create_in(base: &Path, name: &str) -> Result<TempRoot, HLError> {
        let prefix = normalize_prefix(name);
        let dir = Builder::new()
            .prefix(&prefix)
            .tempdir_in(base)
            .map_err(|e| map_io_err(e, format!("create temporary root in {}",
                                               base.display())))?;
        info!(root = %dir.path().display(), "created container root");
        Ok(TempRoot { dir: dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory and everything under it.  Failure is
    /// logged, not returned: by the time this runs the launch is over.
    pub fn destroy(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(root = %path.display(), "removed container root"),
            Err(e) => warn!(root = %path.display(), error = %e,
                            "failed to remove container root"),
        }
    }

    /// Give up ownership without removing anything.  Only for the case
    /// where the process could not get back out of the root.
    pub fn abandon(self) -> PathBuf {
        let path = self.dir.keep();
        warn!(root = %path.display(), "leaving container root in place");
        path
    }
}
