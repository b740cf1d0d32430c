//! Fetching images.  The actual download is somebody else's problem:
//! we run the configured pull script with the image name and let it
//! leave `<assets>/<image>.tar.gz` behind.

use tracing::info;

use crate::config::Config;
use crate::err::*;
use crate::subprocess;

pub fn pull_argv(config: &Config, image: &str) -> Vec<String> {
    vec![config.pull_script.to_string_lossy().into_owned(), image.to_owned()]
}

pub fn pull(config: &Config, image: &str) -> Result<(), HLError> {
    let argv = pull_argv(config, image);
    info!(image = image, script = %argv[0], "pulling image");
    subprocess::run(&argv)?;

    let archive = config.image(image).archive_path();
    if archive.is_file() {
        info!(archive = %archive.display(), "image ready");
    } else {
        info!(archive = %archive.display(),
              "pull script finished, but the archive is not where run expects it");
    }
    Ok(())
}
