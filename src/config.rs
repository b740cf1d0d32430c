//! Options shared by every subcommand.  Each can also come from the
//! environment, and all of them are handed on to the contained child
//! so that both halves of a launch agree.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use clap::Args;

use crate::image::ImageRef;

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct Config {
    /// Directory holding IMAGE.tar.gz and IMAGE-cmd
    #[arg(long, global = true, env = "CHRUN_ASSETS", default_value = "assets")]
    pub assets: PathBuf,

    /// Program invoked by `pull`, with the image name as its argument
    #[arg(long, global = true, env = "CHRUN_PULL_SCRIPT",
          default_value = "./pull.sh")]
    pub pull_script: PathBuf,

    /// Where container roots are created [default: system temp dir]
    #[arg(long, global = true, env = "CHRUN_TMPDIR")]
    pub tmp_dir: Option<PathBuf>,

    /// Log every step
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Config {
    pub fn image(&self, name: &str) -> ImageRef {
        ImageRef::new(self.assets.clone(), name)
    }

    pub fn tmp_base(&self) -> PathBuf {
        self.tmp_dir.clone().unwrap_or_else(env::temp_dir)
    }

    /// These options again, as command-line arguments.
    pub fn forward_args(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("--assets"), self.assets.clone().into_os_string(),
            OsString::from("--pull-script"), self.pull_script.clone().into_os_string(),
        ];
        if let Some(ref dir) = self.tmp_dir {
            args.push(OsString::from("--tmp-dir"));
            args.push(dir.clone().into_os_string());
        }
        if self.verbose {
            args.push(OsString::from("--verbose"));
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        config: Config,
    }

    fn parse(args: &[&str]) -> Config {
        Harness::try_parse_from(std::iter::once("chrun").chain(args.iter().cloned()))
            .unwrap()
            .config
    }

    #[test]
    fn forwarded_args_parse_back_to_the_same_config() {
        let config = Config {
            assets: PathBuf::from("/srv/images"),
            pull_script: PathBuf::from("./pull.sh"),
            tmp_dir: Some(PathBuf::from("/var/tmp")),
            verbose: true,
        };
        let forwarded: Vec<String> = config.forward_args().into_iter()
            .map(|a| a.into_string().unwrap())
            .collect();
        let forwarded: Vec<&str> = forwarded.iter().map(|s| s.as_str()).collect();
        assert_eq!(parse(&forwarded), config);
    }

    #[test]
    fn image_paths_follow_assets_dir() {
        let config = parse(&["--assets", "/srv/images"]);
        let image = config.image("alpine");
        assert_eq!(image.archive_path(), PathBuf::from("/srv/images/alpine.tar.gz"));
        assert_eq!(image.default_command_path(), PathBuf::from("/srv/images/alpine-cmd"));
    }

    #[test]
    fn tmp_base_falls_back_to_system_temp() {
        let config = Config {
            assets: PathBuf::from("assets"),
            pull_script: PathBuf::from("./pull.sh"),
            tmp_dir: None,
            verbose: false,
        };
        assert_eq!(config.tmp_base(), env::temp_dir());
    }
}
