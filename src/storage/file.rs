use std::{
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use fs2::FileExt;

use crate::{
    error::RotatorResult,
    storage::{File, Storage},
};

/// The disk-backed `Storage`.
#[derive(Clone, Default)]
pub struct FileStorage;

impl Storage for FileStorage {
    type F = SysFile;

    fn create<P: AsRef<Path>>(&self, name: P) -> RotatorResult<Self::F> {
        let inner = map_io_res!(fs::OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(true)
            .open(name))?;
        Ok(SysFile { inner })
    }

    fn open<P: AsRef<Path>>(&self, name: P) -> RotatorResult<Self::F> {
        let inner = map_io_res!(fs::OpenOptions::new().write(true).read(true).open(name))?;
        Ok(SysFile { inner })
    }

    fn remove<P: AsRef<Path>>(&self, name: P) -> RotatorResult<()> {
        map_io_res!(fs::remove_file(name))
    }

    fn exists<P: AsRef<Path>>(&self, name: P) -> bool {
        name.as_ref().exists()
    }

    fn rename<P: AsRef<Path>>(&self, old: P, new: P) -> RotatorResult<()> {
        map_io_res!(fs::rename(old, new))
    }

    fn mkdir_all<P: AsRef<Path>>(&self, dir: P) -> RotatorResult<()> {
        map_io_res!(fs::create_dir_all(dir))
    }

    fn list<P: AsRef<Path>>(&self, dir: P) -> RotatorResult<Vec<PathBuf>> {
        let entries = map_io_res!(fs::read_dir(dir))?;
        let mut paths = vec![];
        for entry in entries {
            let entry = map_io_res!(entry)?;
            paths.push(entry.path());
        }
        Ok(paths)
    }

    fn concat<P: AsRef<Path>>(&self, src: P, dst: P) -> RotatorResult<u64> {
        let mut from = map_io_res!(fs::File::open(src))?;
        let mut to = map_io_res!(fs::OpenOptions::new().create(true).append(true).open(dst))?;
        // `io::copy` takes the in-kernel copy path on Linux, so the bytes
        // are not routed through userspace.
        map_io_res!(io::copy(&mut from, &mut to))
    }
}

/// A `File` backed by `std::fs::File`.
pub struct SysFile {
    inner: fs::File,
}

impl File for SysFile {
    fn write(&mut self, buf: &[u8]) -> RotatorResult<usize> {
        map_io_res!(self.inner.write(buf))
    }

    fn flush(&mut self) -> RotatorResult<()> {
        map_io_res!(self.inner.flush())
    }

    fn close(&mut self) -> RotatorResult<()> {
        Ok(())
    }

    fn read_all(&mut self, buf: &mut Vec<u8>) -> RotatorResult<usize> {
        map_io_res!(self.inner.read_to_end(buf))
    }

    fn len(&self) -> RotatorResult<u64> {
        let md = map_io_res!(self.inner.metadata())?;
        Ok(md.len())
    }

    fn lock(&self) -> RotatorResult<()> {
        map_io_res!(self.inner.try_lock_exclusive())
    }

    fn unlock(&self) -> RotatorResult<()> {
        map_io_res!(FileExt::unlock(&self.inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_appends_and_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let env = FileStorage;
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::write(&src, b"tail").unwrap();
        fs::write(&dst, b"head-").unwrap();

        let moved = env.concat(&src, &dst).unwrap();
        assert_eq!(moved, 4);
        assert_eq!(fs::read(&dst).unwrap(), b"head-tail");
        assert!(env.exists(&src));

        // a missing destination is created
        let fresh = dir.path().join("fresh");
        env.concat(&src, &fresh).unwrap();
        assert_eq!(fs::read(&fresh).unwrap(), b"tail");
    }

    #[test]
    fn test_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let env = FileStorage;
        let path = dir.path().join("LOCK");
        let first = env.create(&path).unwrap();
        first.lock().unwrap();
        let second = env.open(&path).unwrap();
        assert!(second.lock().is_err());
        first.unlock().unwrap();
        second.lock().unwrap();
    }
}
