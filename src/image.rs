//! Locally stored images and turning them into a container root.
//!
//! An image called `X` is the archive `<assets>/X.tar.gz`, plus an
//! optional `<assets>/X-cmd` holding the command to run when none is
//! given on the command line.  That file's first non-blank line is
//! split on whitespace; shell quoting is not interpreted.

use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info};

use crate::err::*;
use crate::tmproot::TempRoot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    name: String,
    assets: PathBuf,
}

impl ImageRef {
    pub fn new<P: Into<PathBuf>>(assets: P, name: &str) -> ImageRef {
        ImageRef { name: name.to_owned(), assets: assets.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn archive_file_name(&self) -> String {
        format!("{}.tar.gz", self.name)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.assets.join(self.archive_file_name())
    }

    pub fn default_command_path(&self) -> PathBuf {
        self.assets.join(format!("{}-cmd", self.name))
    }

    /// Work out what to run: `explicit`, if it is not empty, otherwise
    /// the image's recorded default command.
    pub fn resolve_command(&self, explicit: &[String])
                           -> Result<LaunchSpec, HLError> {
        if !explicit.is_empty() {
            return Ok(LaunchSpec { argv: explicit.to_vec() });
        }

        let path = self.default_command_path();
        let text = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                not_found("default command file", &path)
            } else {
                map_io_err(e, format!("read {}", path.display()))
            }
        })?;

        // Only the first non-blank line counts.
        let line = text.lines().find(|l| !l.trim().is_empty());
        match line {
            Some(line) => Ok(LaunchSpec {
                argv: line.split_whitespace().map(String::from).collect()
            }),
            None => Err(HLError::EmptyCommand { path: path }),
        }
    }
}

/// The command line to execute inside the container.  Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    argv: Vec<String>,
}

impl LaunchSpec {
    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

/// Unpacks an archive into a directory.  The directory already exists
/// and is empty.
pub trait Extractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), HLError>;
}

/// Gzip-compressed tarballs, the only image format there is.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzExtractor;

impl Extractor for TarGzExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), HLError> {
        debug!(archive = %archive.display(), dest = %dest.display(),
               "extracting");
        let file = File::open(archive)
            .map_err(|e| map_io_err(e, format!("open {}", archive.display())))?;

        let mut tarball = Archive::new(GzDecoder::new(file));
        tarball.set_preserve_permissions(true);
        tarball.set_preserve_mtime(true);
        tarball.unpack(dest)
            .map_err(|e| map_extract_err(e, archive))
    }
}

/// Produce a populated container root for `image` under `tmp_base`.
/// Nothing is created if the archive is missing; if extraction fails
/// the half-populated root is removed on the way out.
pub fn materialize<E: Extractor + ?Sized>(image: &ImageRef, extractor: &E,
                                          tmp_base: &Path)
                                          -> Result<TempRoot, HLError> {
    let archive = image.archive_path();
    if !archive.is_file() {
        return Err(not_found("image archive", &archive));
    }

    let root = TempRoot::create_in(tmp_base, &image.archive_file_name())?;
    extractor.extract(&archive, root.path())?;
    info!(image = image.name(), root = %root.path().display(),
          "image extracted");
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn assets_with(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for &(name, contents) in files {
            fs::write(dir.path().join(name), contents).unwrap();
        }
        dir
    }

    fn write_tarball(path: &Path) {
        let gz = GzEncoder::new(File::create(path).unwrap(), Compression::fast());
        let mut builder = tar::Builder::new(gz);

        let data = b"hello from the image\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "etc/motd", &data[..]).unwrap();

        builder.into_inner().unwrap().finish().unwrap();
    }

    struct FailingExtractor {
        saw_dest: Cell<Option<bool>>,
    }

    impl Extractor for FailingExtractor {
        fn extract(&self, archive: &Path, dest: &Path) -> Result<(), HLError> {
            fs::write(dest.join("partial"), b"half").unwrap();
            self.saw_dest.set(Some(dest.is_dir()));
            Err(map_extract_err(io::Error::new(io::ErrorKind::InvalidData,
                                               "corrupt archive"),
                                archive))
        }
    }

    #[test]
    fn default_command_comes_from_cmd_file() {
        let assets = assets_with(&[("demo-cmd", "serve --port 9")]);
        let image = ImageRef::new(assets.path(), "demo");
        let spec = image.resolve_command(&[]).unwrap();
        assert_eq!(spec.to_string(), "serve --port 9");
        assert_eq!(spec.argv(), &["serve", "--port", "9"]);
    }

    #[test]
    fn explicit_command_wins() {
        let assets = assets_with(&[("demo-cmd", "serve --port 9")]);
        let image = ImageRef::new(assets.path(), "demo");
        let explicit = vec![String::from("/bin/echo"), String::from("a b")];
        let spec = image.resolve_command(&explicit).unwrap();
        assert_eq!(spec.argv(), &explicit[..]);
    }

    #[test]
    fn first_nonblank_line_is_used() {
        let assets = assets_with(&[("multi-cmd",
                                    "\n  redis-server\t--port 6380 \nignored\n")]);
        let image = ImageRef::new(assets.path(), "multi");
        let spec = image.resolve_command(&[]).unwrap();
        assert_eq!(spec.argv(), &["redis-server", "--port", "6380"]);
    }

    #[test]
    fn quotes_in_command_file_are_literal() {
        let assets = assets_with(&[("quoted-cmd", "echo 'a b'\n")]);
        let image = ImageRef::new(assets.path(), "quoted");
        let spec = image.resolve_command(&[]).unwrap();
        assert_eq!(spec.argv(), &["echo", "'a", "b'"]);
    }

    #[test]
    fn blank_command_file_is_an_error() {
        let assets = assets_with(&[("blank-cmd", " \n\t\n")]);
        let image = ImageRef::new(assets.path(), "blank");
        match image.resolve_command(&[]) {
            Err(HLError::EmptyCommand { path }) =>
                assert_eq!(path, assets.path().join("blank-cmd")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_command_file_is_not_found() {
        let assets = assets_with(&[]);
        let image = ImageRef::new(assets.path(), "nocmd");
        match image.resolve_command(&[]) {
            Err(HLError::NotFound { path, .. }) =>
                assert_eq!(path, assets.path().join("nocmd-cmd")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_archive_creates_nothing() {
        let assets = assets_with(&[]);
        let base = tempfile::tempdir().unwrap();
        let image = ImageRef::new(assets.path(), "missing");
        assert_eq!(image.archive_path(), assets.path().join("missing.tar.gz"));

        match materialize(&image, &TarGzExtractor, base.path()) {
            Err(HLError::NotFound { path, .. }) =>
                assert_eq!(path, image.archive_path()),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_extraction_removes_root() {
        let assets = assets_with(&[("broken.tar.gz", "not really gzip")]);
        let base = tempfile::tempdir().unwrap();
        let image = ImageRef::new(assets.path(), "broken");
        let stub = FailingExtractor { saw_dest: Cell::new(None) };

        match materialize(&image, &stub, base.path()) {
            Err(HLError::Extract { .. }) => (),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(stub.saw_dest.get(), Some(true));
        assert_eq!(fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[test]
    fn corrupt_archive_is_an_extraction_error() {
        let assets = assets_with(&[("junk.tar.gz", "definitely not gzip")]);
        let base = tempfile::tempdir().unwrap();
        let image = ImageRef::new(assets.path(), "junk");

        match materialize(&image, &TarGzExtractor, base.path()) {
            Err(HLError::Extract { archive, .. }) =>
                assert_eq!(archive, image.archive_path()),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[test]
    fn tarball_is_unpacked_into_root() {
        let assets = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        write_tarball(&assets.path().join("tiny.tar.gz"));
        let image = ImageRef::new(assets.path(), "tiny");

        let root = materialize(&image, &TarGzExtractor, base.path()).unwrap();
        let motd = fs::read_to_string(root.path().join("etc/motd")).unwrap();
        assert_eq!(motd, "hello from the image\n");
        assert!(root.path().file_name().unwrap()
                .to_str().unwrap().starts_with("tiny_tar_gz"));

        let path = root.path().to_path_buf();
        root.destroy();
        assert!(!path.exists());
    }
}
