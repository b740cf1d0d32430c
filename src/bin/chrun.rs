/* Run a command inside a throwaway copy of a filesystem image.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 * http://www.apache.org/licenses/LICENSE-2.0
 * There is NO WARRANTY.
 *
 *     chrun [options] run IMAGE [COMMAND [ARGS...]]
 *     chrun [options] pull IMAGE
 *
 * 'run' unpacks assets/IMAGE.tar.gz into a fresh temporary directory,
 * makes that directory the root filesystem, mounts /proc inside it,
 * and runs COMMAND there with stdin, stdout, and stderr inherited.
 * If no COMMAND is given, the first non-blank line of assets/IMAGE-cmd
 * is used instead.  The command runs in its own PID, UTS, and mount
 * namespaces; it is PID 1's child and cannot see the host's processes
 * or change the host's hostname.  When it exits, the temporary
 * directory is erased.  COMMAND's exit status is reported but is not
 * our exit status: we exit 0 unless setting up or tearing down the
 * container failed.
 *
 * 'pull' runs ./pull.sh IMAGE (see --pull-script), which is expected
 * to leave IMAGE.tar.gz in the assets directory.
 *
 * This works by re-executing /proc/self/exe as "chrun child IMAGE ..."
 * under clone(CLONE_NEWPID|CLONE_NEWUTS|CLONE_NEWNS).  'child' is not
 * meant to be invoked by hand.
 *
 * This program must be run as root (it needs CAP_SYS_ADMIN and
 * CAP_SYS_CHROOT).  There is no network, user, or cgroup isolation;
 * this is not a replacement for full-fledged containers.
 *
 * Namespaces and chroot-with-/proc are Linux-specific.  On other
 * systems 'run' fails with an error saying so.
 */

use std::io;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use chrun::HLError;
use chrun::bootstrap::{bootstrap, Mode};
use chrun::config::Config;
use chrun::image::TarGzExtractor;
use chrun::launcher::{run_contained, InheritedRunner, Launcher};
use chrun::pull::pull;
use chrun::rootswitch::{privatize_mounts, ChrootSwitcher};

#[derive(Parser)]
#[command(name = "chrun", version,
          about = "Run a command in a throwaway root filesystem")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run COMMAND (or the image's default) inside IMAGE
    Run(LaunchArgs),

    /// Fetch IMAGE into the assets directory
    Pull {
        image: String,
    },

    /// Second stage of 'run', already inside the new namespaces
    #[command(hide = true)]
    Child(LaunchArgs),
}

#[derive(Args)]
struct LaunchArgs {
    image: String,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "chrun=debug" } else { "chrun=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
                         .unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn contained(config: &Config, args: &LaunchArgs) -> Result<(), HLError> {
    privatize_mounts()?;
    let mut launcher = Launcher::new(ChrootSwitcher::default(),
                                     TarGzExtractor,
                                     InheritedRunner,
                                     config.tmp_base());
    run_contained(&mut launcher, &config.image(&args.image), &args.command)
}

/// What an invocation asks for.  `run` and `child` are the two halves
/// of one launch.
enum Action<'a> {
    Launch(Mode, &'a LaunchArgs),
    Pull(&'a str),
}

impl Commands {
    fn action(&self) -> Action {
        match *self {
            Commands::Run(ref args) => Action::Launch(Mode::Bootstrap, args),
            Commands::Child(ref args) => Action::Launch(Mode::Contained, args),
            Commands::Pull { ref image } => Action::Pull(image),
        }
    }
}

fn run() -> Result<(), HLError> {
    let cli = Cli::parse();
    init_logging(cli.config.verbose);

    match cli.command.action() {
        Action::Launch(Mode::Bootstrap, args) =>
            bootstrap(&cli.config, &args.image, &args.command),
        Action::Launch(Mode::Contained, args) => contained(&cli.config, args),
        Action::Pull(image) => pull(&cli.config, image),
    }
}

fn main() {
    process::exit(match run() {
        Ok(_) => 0,
        Err(e) => {
            error!("{}", e);
            1
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode_of(argv: &[&str]) -> Option<Mode> {
        match Cli::try_parse_from(argv).unwrap().command.action() {
            Action::Launch(mode, _) => Some(mode),
            Action::Pull(_) => None,
        }
    }

    #[test]
    fn subcommands_select_modes() {
        assert_eq!(mode_of(&["chrun", Mode::Bootstrap.subcommand(), "alpine"]),
                   Some(Mode::Bootstrap));
        assert_eq!(mode_of(&["chrun", Mode::Contained.subcommand(), "alpine",
                             "--", "ls", "-la"]),
                   Some(Mode::Contained));
        assert_eq!(mode_of(&["chrun", "pull", "alpine"]), None);
    }

    #[test]
    fn child_receives_the_command_verbatim() {
        let cli = Cli::try_parse_from(&["chrun", "--assets", "/srv/images",
                                        "child", "alpine", "--", "ls", "-la"])
            .unwrap();
        match cli.command.action() {
            Action::Launch(Mode::Contained, args) => {
                assert_eq!(args.image, "alpine");
                assert_eq!(args.command, vec!["ls", "-la"]);
            }
            _ => panic!("child did not parse as a contained launch"),
        }
        assert_eq!(cli.config.assets, std::path::PathBuf::from("/srv/images"));
    }
}
