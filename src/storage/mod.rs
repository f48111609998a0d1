pub mod file;
pub mod mem;

use std::path::{Path, PathBuf};

use crate::error::RotatorResult;

/// `Storage` is a namespace for files.
///
/// The names are filepath names: they may be / separated or \ separated,
/// depending on the underlying operating system.
///
/// `Storage` should be thread safe
pub trait Storage: Send + Sync {
    type F: File + 'static;

    /// Create a file if it does not exist and truncates exist one.
    fn create<P: AsRef<Path>>(&self, name: P) -> RotatorResult<Self::F>;

    /// Open a file for reading and writing
    fn open<P: AsRef<Path>>(&self, name: P) -> RotatorResult<Self::F>;

    /// Delete the named file
    fn remove<P: AsRef<Path>>(&self, name: P) -> RotatorResult<()>;

    /// Returns true iff the named file exists.
    fn exists<P: AsRef<Path>>(&self, name: P) -> bool;

    /// Rename a file or directory to a new name, replacing the original file if
    /// `new` already exists.
    fn rename<P: AsRef<Path>>(&self, old: P, new: P) -> RotatorResult<()>;

    /// Recursively create a directory and all of its parent components if they
    /// are missing.
    fn mkdir_all<P: AsRef<Path>>(&self, dir: P) -> RotatorResult<()>;

    /// Returns a list of the full-path to each file in given directory
    fn list<P: AsRef<Path>>(&self, dir: P) -> RotatorResult<Vec<PathBuf>>;

    /// Append the whole contents of `src` onto the tail of `dst`, creating
    /// `dst` if it does not exist, and return the number of bytes moved.
    /// `src` is left in place.
    fn concat<P: AsRef<Path>>(&self, src: P, dst: P) -> RotatorResult<u64>;
}

/// A file abstraction for IO operations
pub trait File: Send + Sync {
    fn write(&mut self, buf: &[u8]) -> RotatorResult<usize>;
    fn flush(&mut self) -> RotatorResult<()>;
    fn close(&mut self) -> RotatorResult<()>;
    /// Reads the remaining contents into `buf`, returning how many bytes
    /// were appended.
    fn read_all(&mut self, buf: &mut Vec<u8>) -> RotatorResult<usize>;
    fn len(&self) -> RotatorResult<u64>;
    fn is_empty(&self) -> bool {
        if let Ok(length) = self.len() {
            return length == 0;
        }
        // Err is considered as empty
        false
    }
    /// Locks the file for exclusive usage, failing if the file is currently
    /// locked by another process.
    fn lock(&self) -> RotatorResult<()>;
    fn unlock(&self) -> RotatorResult<()>;
}
