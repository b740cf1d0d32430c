//! The contained half of a launch: runs inside the new namespaces,
//! builds the container root, runs the command in it, and cleans up.

use std::path::PathBuf;
use std::process::ExitStatus;

use tracing::{info, warn};

use crate::err::*;
use crate::image::{materialize, Extractor, ImageRef, LaunchSpec};
use crate::rootswitch::{RootGuard, RootSwitcher};
use crate::subprocess;

/// Runs a resolved command to completion.  Called with the container
/// root already in place.
pub trait CommandRunner {
    fn run(&mut self, spec: &LaunchSpec) -> Result<ExitStatus, HLError>;
}

/// Runs the command as an ordinary child sharing our standard streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct InheritedRunner;

impl CommandRunner for InheritedRunner {
    fn run(&mut self, spec: &LaunchSpec) -> Result<ExitStatus, HLError> {
        subprocess::wait_status(spec.argv())
    }
}

pub struct Launcher<S, E, R> {
    switcher: S,
    extractor: E,
    runner: R,
    tmp_base: PathBuf,
}

impl<S: RootSwitcher, E: Extractor, R: CommandRunner> Launcher<S, E, R> {
    pub fn new(switcher: S, extractor: E, runner: R, tmp_base: PathBuf)
               -> Launcher<S, E, R> {
        Launcher {
            switcher: switcher,
            extractor: extractor,
            runner: runner,
            tmp_base: tmp_base,
        }
    }

    /// Run `explicit` (or the image's default command) inside a fresh
    /// root built from `image`.  Returns the command's exit status,
    /// which may well be unsuccessful; that is not an error here.
    pub fn launch(&mut self, image: &ImageRef, explicit: &[String])
                  -> Result<ExitStatus, HLError> {
        let spec = image.resolve_command(explicit)?;
        let root = materialize(image, &self.extractor, &self.tmp_base)?;

        let outcome = {
            let guard = match RootGuard::enter(&mut self.switcher, root.path()) {
                Ok(guard) => guard,
                Err(e @ HLError::Stranded { .. }) => {
                    root.abandon();
                    return Err(e);
                }
                Err(e) => return Err(e),
            };
            info!(command = %spec, "running");
            let outcome = self.runner.run(&spec);

            if let Err(e) = guard.leave() {
                // Removing the tree from inside it would be wrong.
                root.abandon();
                return Err(e);
            }
            outcome
        };
        root.destroy();

        let status = outcome?;
        if status.success() {
            info!(command = %spec, "command finished");
        } else {
            warn!("{}", map_unsuc_child(&status, spec.argv()));
        }
        Ok(status)
    }
}

/// Entry point for the `child` mode.  By the time this runs we are
/// already in the new namespaces.
pub fn run_contained<S: RootSwitcher, E: Extractor, R: CommandRunner>(
    launcher: &mut Launcher<S, E, R>, image: &ImageRef, explicit: &[String])
    -> Result<(), HLError> {
    info!(image = image.name(), pid = std::process::id(),
          "you are now in a container");
    launcher.launch(image, explicit).map(|_| ())
}
