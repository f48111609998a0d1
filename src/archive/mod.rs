use std::process::Command;

use crate::{
    error::{RotatorError, RotatorResult},
    storage::Storage,
};

/// Wall-clock stamp baked into archive names.
pub const ARCHIVE_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub fn archive_timestamp() -> String {
    chrono::Local::now().format(ARCHIVE_TIME_FORMAT).to_string()
}

/// Packages a set of files from the watched directory into one compressed
/// archive.
///
/// `members` are basenames relative to `watch_dir`; `archive` is the full
/// target path. Implementations must either produce the archive and return
/// `Ok`, or leave the members untouched and return `Err`.
pub trait Archiver<S: Storage>: Send + Sync {
    fn package(
        &self,
        env: &S,
        watch_dir: &str,
        archive: &str,
        members: &[String],
    ) -> RotatorResult<()>;
}

/// The stock archiver: spawns the system `tar` to build a gzip-compressed
/// tarball. Only meaningful on a disk-backed storage.
#[derive(Clone, Debug)]
pub struct TarArchiver {
    /// Binary to invoke; override to point at a non-PATH tar.
    pub tar_bin: String,
}

impl Default for TarArchiver {
    fn default() -> Self {
        TarArchiver {
            tar_bin: "tar".to_owned(),
        }
    }
}

impl<S: Storage> Archiver<S> for TarArchiver {
    fn package(
        &self,
        _env: &S,
        watch_dir: &str,
        archive: &str,
        members: &[String],
    ) -> RotatorResult<()> {
        let status = map_io_res!(Command::new(&self.tar_bin)
            .arg("-czf")
            .arg(archive)
            .arg("-C")
            .arg(watch_dir)
            .args(members)
            .status())?;
        if !status.success() {
            return Err(RotatorError::Archiver(format!(
                "{} exited with {}",
                self.tar_bin, status
            )));
        }
        Ok(())
    }
}
