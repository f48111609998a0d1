use std::path::Path;

/// Suffix the producer puts on a sealed segment (`<base>.<token>.bak`).
pub const SEALED_SUFFIX: &str = ".bak";

// `<...>.bak.<...>` names belong to external rotation tools, never to us.
const DERIVATIVE_MARK: &str = ".bak.";

/// What a basename appearing in the watched directory means to the rotator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryClass {
    /// A producer-sealed segment of the given registry stream.
    Sealed { stream: usize },
    /// Exactly `<base>.bak`, reserved as an internal staging name.
    SelfStaged,
    /// Contains `.bak.`, an artifact of some other rotation tool.
    Derivative,
    /// Anything else in the directory.
    Unrelated,
}

/// Classify a directory entry basename against the ordered stream registry.
///
/// Matching is by substring containment and the first matching base wins,
/// so registry order is part of the contract. Purely lexical, no
/// filesystem access.
pub fn classify_entry(name: &str, registry: &[String]) -> EntryClass {
    if !name.contains(SEALED_SUFFIX) {
        return EntryClass::Unrelated;
    }
    if name.contains(DERIVATIVE_MARK) {
        return EntryClass::Derivative;
    }
    for base in registry {
        if name == staged_basename(base) {
            return EntryClass::SelfStaged;
        }
    }
    for (stream, base) in registry.iter().enumerate() {
        if name.contains(base.as_str()) {
            return EntryClass::Sealed { stream };
        }
    }
    EntryClass::Unrelated
}

/// The reserved staging name of a stream: `<base>.bak`.
pub fn staged_basename(base: &str) -> String {
    format!("{}{}", base, SEALED_SUFFIX)
}

/// Basename of generation `index` of a stream: `<base>.log.<index>`.
pub fn generation_basename(base: &str, index: usize) -> String {
    format!("{}.log.{}", base, index)
}

/// Full path of generation `index` of a stream.
pub fn generation_filename(watch_dir: &str, base: &str, index: usize) -> String {
    format!("{}/{}", watch_dir, generation_basename(base, index))
}

/// Full path of a stream archive stamped with `stamp`.
pub fn archive_filename(watch_dir: &str, base: &str, stamp: &str) -> String {
    format!("{}/{}.log_{}.tar.gz", watch_dir, base, stamp)
}

/// Full path of a directory entry given its basename.
pub fn entry_path(watch_dir: &str, name: &str) -> String {
    format!("{}/{}", watch_dir, name)
}

/// Path of the rotator instance lock file.
pub fn lock_filename(watch_dir: &str) -> String {
    format!("{}/LOCK", watch_dir)
}

/// Path of the rotator's own info log file.
pub fn info_log_filename(watch_dir: &str) -> String {
    format!("{}/LOG", watch_dir)
}

/// Split a generation path back into `(base, index)`.
///
/// Returns `None` for any name that is not `<base>.log.<index>` with a
/// decimal index.
pub fn parse_generation<P: AsRef<Path>>(path: P) -> Option<(String, usize)> {
    let name = path.as_ref().file_name()?.to_str()?;
    let (stem, index) = name.rsplit_once('.')?;
    let index = index.parse::<usize>().ok()?;
    let base = stem.strip_suffix(".log")?;
    if base.is_empty() {
        return None;
    }
    Some((base.to_owned(), index))
}
