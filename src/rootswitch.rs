//! Moving the process into a container root and back out again.
//!
//! Entering is: remember the current `/`, chdir into the new root,
//! chroot into it, and mount a fresh `/proc` there.  Leaving is the
//! reverse: fchdir back to the remembered `/` and chroot to `.`.
//! The filesystem root belongs to the whole process, so only one
//! switch may be in flight at a time.

use std::path::Path;

use tracing::warn;

use crate::err::*;

pub use self::imp::*;

pub trait RootSwitcher {
    /// Whatever is needed to get back out.  Produced by `enter`,
    /// consumed by `leave`.
    type Saved;

    /// Make `root` the filesystem root.  On error the process is
    /// still (or again) in its original root, except for `Stranded`.
    fn enter(&mut self, root: &Path) -> Result<Self::Saved, HLError>;

    fn leave(&mut self, saved: Self::Saved) -> Result<(), HLError>;
}

/// Pairs `enter` with `leave`.  Call `leave` to find out whether
/// getting back out worked; if the guard is dropped without that,
/// it leaves anyway and logs any failure.
pub struct RootGuard<'a, S: RootSwitcher + ?Sized> {
    switcher: &'a mut S,
    saved: Option<S::Saved>,
}

impl<'a, S: RootSwitcher + ?Sized> RootGuard<'a, S> {
    pub fn enter(switcher: &'a mut S, root: &Path)
                 -> Result<RootGuard<'a, S>, HLError> {
        let saved = switcher.enter(root)?;
        Ok(RootGuard { switcher: switcher, saved: Some(saved) })
    }

    pub fn leave(mut self) -> Result<(), HLError> {
        match self.saved.take() {
            Some(saved) => self.switcher.leave(saved),
            None => Ok(()),
        }
    }
}

impl<'a, S: RootSwitcher + ?Sized> Drop for RootGuard<'a, S> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            if let Err(e) = self.switcher.leave(saved) {
                warn!(error = %e, "could not return to the original root");
            }
        }
    }
}

#[cfg(target_os = "linux")]
mod imp {
    use std::fs::{self, File};
    use std::mem;
    use std::os::unix::io::AsRawFd;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};

    use nix::mount::{mount, umount2, MntFlags, MsFlags};
    use nix::unistd::{chdir, chroot, fchdir};
    use tracing::{debug, warn};

    use super::RootSwitcher;
    use crate::err::*;

    static SWITCH_IN_FLIGHT: AtomicBool = AtomicBool::new(false);

    /// Ownership of the process-wide root.  At most one exists.
    #[derive(Debug)]
    pub struct RootToken(());

    impl RootToken {
        pub fn acquire() -> Result<RootToken, HLError> {
            if SWITCH_IN_FLIGHT.swap(true, Ordering::SeqCst) {
                Err(HLError::RootBusy)
            } else {
                Ok(RootToken(()))
            }
        }
    }

    impl Drop for RootToken {
        fn drop(&mut self) {
            SWITCH_IN_FLIGHT.store(false, Ordering::SeqCst);
        }
    }

    /// An open handle on the root we came from.  One per switch.
    #[derive(Debug)]
    pub struct SavedRoot {
        old_root: File,
        proc_mount: PathBuf,
        token: RootToken,
    }

    /// The real thing: chroot(2) plus a proc mount.  Needs
    /// CAP_SYS_CHROOT and CAP_SYS_ADMIN, and should only be used in a
    /// private mount namespace.
    #[derive(Debug, Default)]
    pub struct ChrootSwitcher;

    /// Any error from here means we are still inside the container
    /// root, and is reported as `Stranded`.
    fn restore(saved: &SavedRoot) -> Result<(), HLError> {
        // The old root has no path from in here; go by descriptor.
        fchdir(saved.old_root.as_raw_fd())
            .map_err(|e| map_stranded_err(e, String::from("fchdir to saved root")))?;
        chroot(".")
            .map_err(|e| map_stranded_err(e, String::from("chroot back to saved root")))
    }

    impl RootSwitcher for ChrootSwitcher {
        type Saved = SavedRoot;

        fn enter(&mut self, root: &Path) -> Result<SavedRoot, HLError> {
            let token = RootToken::acquire()?;

            let root = root.canonicalize()
                .map_err(|e| map_io_err(e, format!("resolve {}", root.display())))?;
            let root = root.as_path();
            let proc_mount = root.join("proc");
            fs::create_dir_all(&proc_mount)
                .map_err(|e| map_io_err(e, format!("create {}",
                                                   proc_mount.display())))?;

            let old_root = File::open("/")
                .map_err(|e| map_io_err(e, String::from("open /")))?;
            let saved = SavedRoot {
                old_root: old_root,
                proc_mount: proc_mount,
                token: token,
            };

            chdir(root)
                .map_err(|e| map_nix_err(e, format!("chdir {}", root.display())))?;

            if let Err(e) = chroot(root) {
                if let Err(undo) = fchdir(saved.old_root.as_raw_fd()) {
                    warn!(error = %undo, "could not return to the original directory");
                }
                return Err(map_nix_err(e, format!("chroot {}", root.display())));
            }
            debug!(root = %root.display(), "changed root");

            let flags = MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC;
            if let Err(e) = mount(Some("proc"), "proc", Some("proc"), flags,
                                  None::<&str>) {
                if let Err(undo) = restore(&saved) {
                    warn!(error = %e, "mount proc failed");
                    // Still inside the container root; refuse further switches.
                    mem::forget(saved.token);
                    return Err(undo);
                }
                return Err(map_nix_err(e, String::from("mount proc")));
            }
            debug!("mounted /proc");

            Ok(saved)
        }

        fn leave(&mut self, saved: SavedRoot) -> Result<(), HLError> {
            if let Err(e) = restore(&saved) {
                // Still inside the container root; refuse further switches.
                mem::forget(saved.token);
                return Err(e);
            }
            debug!("returned to original root");

            if let Err(e) = umount2(saved.proc_mount.as_path(), MntFlags::MNT_DETACH) {
                warn!(mount = %saved.proc_mount.display(), error = %e,
                      "could not detach /proc");
            }
            Ok(())
        }
    }

    /// Stop mount events in this namespace from propagating back to
    /// the parent namespace.
    pub fn privatize_mounts() -> Result<(), HLError> {
        mount(None::<&str>, "/", None::<&str>,
              MsFlags::MS_REC | MsFlags::MS_PRIVATE, None::<&str>)
            .map_err(|e| map_nix_err(e, String::from("make / rprivate")))
    }

}

#[cfg(not(target_os = "linux"))]
mod imp {
    use std::path::Path;

    use super::RootSwitcher;
    use crate::err::*;

    #[derive(Debug)]
    pub struct SavedRoot(());

    /// Stand-in for systems without mount namespaces.  Every attempt
    /// to switch roots fails cleanly.
    #[derive(Debug, Default)]
    pub struct UnsupportedSwitcher;

    pub type ChrootSwitcher = UnsupportedSwitcher;

    impl RootSwitcher for UnsupportedSwitcher {
        type Saved = SavedRoot;

        fn enter(&mut self, _root: &Path) -> Result<SavedRoot, HLError> {
            Err(HLError::Unsupported { what: "changing the filesystem root" })
        }

        fn leave(&mut self, _saved: SavedRoot) -> Result<(), HLError> {
            Ok(())
        }
    }

    pub fn privatize_mounts() -> Result<(), HLError> {
        Err(HLError::Unsupported { what: "private mount namespaces" })
    }
}
