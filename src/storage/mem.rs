use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use crate::{
    error::RotatorResult,
    storage::{File, Storage},
};

type FileNode = Arc<RwLock<Vec<u8>>>;

/// An in-memory `Storage`, mainly used for testing the engine without
/// touching a real filesystem.
#[derive(Clone, Default)]
pub struct MemStorage {
    files: Arc<RwLock<HashMap<String, FileNode>>>,
}

fn key<P: AsRef<Path>>(name: P) -> String {
    name.as_ref().to_string_lossy().into_owned()
}

fn not_found(name: &str) -> crate::error::RotatorError {
    crate::error::RotatorError::IO(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found", name),
    ))
}

impl Storage for MemStorage {
    type F = InmemFile;

    fn create<P: AsRef<Path>>(&self, name: P) -> RotatorResult<Self::F> {
        let node: FileNode = Arc::new(RwLock::new(vec![]));
        self.files
            .write()
            .unwrap()
            .insert(key(name), node.clone());
        Ok(InmemFile { node })
    }

    fn open<P: AsRef<Path>>(&self, name: P) -> RotatorResult<Self::F> {
        let key = key(name);
        let files = self.files.read().unwrap();
        match files.get(&key) {
            Some(node) => Ok(InmemFile { node: node.clone() }),
            None => Err(not_found(&key)),
        }
    }

    fn remove<P: AsRef<Path>>(&self, name: P) -> RotatorResult<()> {
        let key = key(name);
        match self.files.write().unwrap().remove(&key) {
            Some(_) => Ok(()),
            None => Err(not_found(&key)),
        }
    }

    fn exists<P: AsRef<Path>>(&self, name: P) -> bool {
        self.files.read().unwrap().contains_key(&key(name))
    }

    fn rename<P: AsRef<Path>>(&self, old: P, new: P) -> RotatorResult<()> {
        let old = key(old);
        let mut files = self.files.write().unwrap();
        match files.remove(&old) {
            Some(node) => {
                files.insert(key(new), node);
                Ok(())
            }
            None => Err(not_found(&old)),
        }
    }

    fn mkdir_all<P: AsRef<Path>>(&self, _dir: P) -> RotatorResult<()> {
        Ok(())
    }

    fn list<P: AsRef<Path>>(&self, dir: P) -> RotatorResult<Vec<PathBuf>> {
        let prefix = format!("{}/", key(dir).trim_end_matches('/'));
        Ok(self
            .files
            .read()
            .unwrap()
            .keys()
            .filter(|name| name.starts_with(&prefix))
            .map(PathBuf::from)
            .collect())
    }

    fn concat<P: AsRef<Path>>(&self, src: P, dst: P) -> RotatorResult<u64> {
        let src = key(src);
        let tail = {
            let files = self.files.read().unwrap();
            match files.get(&src) {
                Some(node) => node.read().unwrap().clone(),
                None => return Err(not_found(&src)),
            }
        };
        let dst = {
            let mut files = self.files.write().unwrap();
            files
                .entry(key(dst))
                .or_insert_with(|| Arc::new(RwLock::new(vec![])))
                .clone()
        };
        let moved = tail.len() as u64;
        dst.write().unwrap().extend_from_slice(&tail);
        Ok(moved)
    }
}

/// A `File` living entirely in memory. Writes always append.
pub struct InmemFile {
    node: FileNode,
}

impl File for InmemFile {
    fn write(&mut self, buf: &[u8]) -> RotatorResult<usize> {
        self.node.write().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> RotatorResult<()> {
        Ok(())
    }

    fn close(&mut self) -> RotatorResult<()> {
        Ok(())
    }

    fn read_all(&mut self, buf: &mut Vec<u8>) -> RotatorResult<usize> {
        let data = self.node.read().unwrap();
        buf.extend_from_slice(&data);
        Ok(data.len())
    }

    fn len(&self) -> RotatorResult<u64> {
        Ok(self.node.read().unwrap().len() as u64)
    }

    fn lock(&self) -> RotatorResult<()> {
        Ok(())
    }

    fn unlock(&self) -> RotatorResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(env: &MemStorage, name: &str) -> Vec<u8> {
        let mut buf = vec![];
        env.open(name).unwrap().read_all(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_create_open_remove() {
        let env = MemStorage::default();
        assert!(!env.exists("a"));
        env.create("a").unwrap().write(b"hello").unwrap();
        assert!(env.exists("a"));
        assert_eq!(contents(&env, "a"), b"hello");
        // create truncates
        env.create("a").unwrap();
        assert_eq!(contents(&env, "a"), b"");
        env.remove("a").unwrap();
        assert!(!env.exists("a"));
        assert!(env.open("a").is_err());
        assert!(env.remove("a").is_err());
    }

    #[test]
    fn test_rename_replaces_destination() {
        let env = MemStorage::default();
        env.create("a").unwrap().write(b"new").unwrap();
        env.create("b").unwrap().write(b"old").unwrap();
        env.rename("a", "b").unwrap();
        assert!(!env.exists("a"));
        assert_eq!(contents(&env, "b"), b"new");
        assert!(env.rename("missing", "c").is_err());
    }

    #[test]
    fn test_concat() {
        let env = MemStorage::default();
        env.create("src").unwrap().write(b"-tail").unwrap();
        env.create("dst").unwrap().write(b"head").unwrap();
        assert_eq!(env.concat("src", "dst").unwrap(), 5);
        assert_eq!(contents(&env, "dst"), b"head-tail");
        assert!(env.exists("src"));
        // missing destination is created
        env.concat("src", "fresh").unwrap();
        assert_eq!(contents(&env, "fresh"), b"-tail");
        assert!(env.concat("missing", "dst").is_err());
    }

    #[test]
    fn test_list_by_directory() {
        let env = MemStorage::default();
        env.create("dir/a").unwrap();
        env.create("dir/b").unwrap();
        env.create("other/c").unwrap();
        let mut names = env.list("dir").unwrap();
        names.sort();
        assert_eq!(names, vec![PathBuf::from("dir/a"), PathBuf::from("dir/b")]);
    }
}
