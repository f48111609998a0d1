use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    thread,
    time::{Duration, Instant},
};

use logrotator::{
    archive::{Archiver, TarArchiver},
    options::Options,
    rotator::LogRotator,
    storage::file::FileStorage,
    RotatorResult,
};
use tempfile::TempDir;

fn open_rotator(dir: &TempDir, max_generations: usize) -> LogRotator<FileStorage, TarArchiver> {
    let options = Options {
        max_generations,
        ..Options::default()
    };
    LogRotator::open(
        options,
        dir.path(),
        FileStorage::default(),
        TarArchiver::default(),
    )
    .unwrap()
}

// Drop a sealed segment the way the producer does: write it elsewhere and
// rename it into the watched directory in one step.
fn seal_segment(watch_dir: &Path, name: &str, contents: &[u8]) {
    let staging_dir = watch_dir.join("staging");
    fs::create_dir_all(&staging_dir).unwrap();
    let staging = staging_dir.join(name);
    fs::write(&staging, contents).unwrap();
    fs::rename(&staging, watch_dir.join(name)).unwrap();
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    false
}

fn archives_of(watch_dir: &Path, base: &str) -> Vec<PathBuf> {
    let prefix = format!("{}.log_", base);
    let mut found: Vec<PathBuf> = fs::read_dir(watch_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(&prefix) && n.ends_with(".tar.gz"))
                .unwrap_or(false)
        })
        .collect();
    found.sort();
    found
}

fn tar_members(archive: &Path) -> Vec<String> {
    let out = Command::new("tar")
        .arg("-tzf")
        .arg(archive)
        .output()
        .unwrap();
    assert!(out.status.success(), "tar -tzf failed on {:?}", archive);
    let mut names: Vec<String> = String::from_utf8(out.stdout)
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect();
    names.sort();
    names
}

#[test]
fn basic_ingest_creates_generation_zero() {
    let dir = tempfile::tempdir().unwrap();
    let mut rotator = open_rotator(&dir, 5);

    seal_segment(dir.path(), "ipstrc.100.bak", b"segment one");
    let g0 = dir.path().join("ipstrc.log.0");
    assert!(
        wait_until(Duration::from_secs(10), || g0.exists()),
        "generation 0 never appeared"
    );
    assert_eq!(fs::read(&g0).unwrap(), b"segment one");
    assert!(wait_until(Duration::from_secs(5), || !dir
        .path()
        .join("ipstrc.100.bak")
        .exists()));
    assert!(!dir.path().join("ipstrc.log.1").exists());
    assert!(archives_of(dir.path(), "ipstrc").is_empty());

    rotator.close().unwrap();
}

#[test]
fn terminal_fill_produces_archive() {
    let dir = tempfile::tempdir().unwrap();
    for k in 0..5 {
        fs::write(
            dir.path().join(format!("ipstrc.log.{}", k)),
            format!("gen {}", k),
        )
        .unwrap();
    }
    let mut rotator = open_rotator(&dir, 5);

    seal_segment(dir.path(), "ipstrc.101.bak", b"fresh segment");
    assert!(
        wait_until(Duration::from_secs(10), || !archives_of(
            dir.path(),
            "ipstrc"
        )
        .is_empty()),
        "no archive was produced"
    );
    rotator.wait_compression_idle();

    let found = archives_of(dir.path(), "ipstrc");
    assert_eq!(found.len(), 1);
    assert_eq!(
        tar_members(&found[0]),
        vec![
            "ipstrc.log.1".to_owned(),
            "ipstrc.log.2".to_owned(),
            "ipstrc.log.3".to_owned(),
            "ipstrc.log.4".to_owned(),
            "ipstrc.log.5".to_owned(),
        ]
    );

    // the triggering segment settled into slot 1 and the packaged
    // generations are gone
    let settled = dir.path().join("ipstrc.log.1");
    assert!(wait_until(Duration::from_secs(5), || settled.exists()
        && fs::read(&settled).unwrap() == b"fresh segment"));
    assert!(!dir.path().join("ipstrc.log.0").exists());
    for k in 2..=5 {
        assert!(!dir.path().join(format!("ipstrc.log.{}", k)).exists());
    }

    rotator.close().unwrap();
}

#[test]
fn repeated_triggers_keep_one_archive_per_stream() {
    let dir = tempfile::tempdir().unwrap();
    let mut rotator = open_rotator(&dir, 2);

    let trigger = |base: &str, round: usize| {
        fs::write(dir.path().join(format!("{}.log.0", base)), "g0").unwrap();
        fs::write(dir.path().join(format!("{}.log.1", base)), "g1").unwrap();
        let before = archives_of(dir.path(), base);
        seal_segment(
            dir.path(),
            &format!("{}.{}.bak", base, round),
            format!("{} round {}", base, round).as_bytes(),
        );
        assert!(
            wait_until(Duration::from_secs(10), || {
                let now = archives_of(dir.path(), base);
                !now.is_empty() && now != before
            }),
            "no fresh archive for {} round {}",
            base,
            round
        );
        // let the ring settle before the next round touches it
        rotator.wait_compression_idle();
    };

    trigger("ipstrc", 1);
    trigger("pdtrc", 1);
    let pdtrc_archive = archives_of(dir.path(), "pdtrc");

    // distinct timestamp for the second ipstrc archive
    thread::sleep(Duration::from_millis(1100));
    trigger("ipstrc", 2);
    rotator.wait_compression_idle();

    assert_eq!(archives_of(dir.path(), "ipstrc").len(), 1);
    assert_eq!(archives_of(dir.path(), "pdtrc"), pdtrc_archive);

    rotator.close().unwrap();
}

#[test]
fn foreign_names_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut rotator = open_rotator(&dir, 5);

    seal_segment(dir.path(), "ipstrc.bak", b"staged name");
    seal_segment(dir.path(), "ipstrc.bak.1", b"derivative name");
    seal_segment(dir.path(), "unknown.5.bak", b"unregistered stream");
    thread::sleep(Duration::from_millis(500));

    assert_eq!(fs::read(dir.path().join("ipstrc.bak")).unwrap(), b"staged name");
    assert_eq!(
        fs::read(dir.path().join("ipstrc.bak.1")).unwrap(),
        b"derivative name"
    );
    assert_eq!(
        fs::read(dir.path().join("unknown.5.bak")).unwrap(),
        b"unregistered stream"
    );
    assert!(!dir.path().join("ipstrc.log.0").exists());

    rotator.close().unwrap();
}

// Holds the archiver long enough for a segment to arrive mid-compression.
struct SlowTarArchiver {
    inner: TarArchiver,
    delay: Duration,
}

impl Archiver<FileStorage> for SlowTarArchiver {
    fn package(
        &self,
        env: &FileStorage,
        watch_dir: &str,
        archive: &str,
        members: &[String],
    ) -> RotatorResult<()> {
        thread::sleep(self.delay);
        self.inner.package(env, watch_dir, archive, members)
    }
}

#[test]
fn segment_arriving_mid_compression_is_appended() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ipstrc.log.0"), "g0").unwrap();
    fs::write(dir.path().join("ipstrc.log.1"), "g1").unwrap();
    let archiver = SlowTarArchiver {
        inner: TarArchiver::default(),
        delay: Duration::from_millis(1500),
    };
    let mut rotator = LogRotator::open(
        Options {
            max_generations: 2,
            ..Options::default()
        },
        dir.path(),
        FileStorage::default(),
        archiver,
    )
    .unwrap();

    seal_segment(dir.path(), "ipstrc.10.bak", b"first-");
    // let the compression start, then drop a segment into its window
    thread::sleep(Duration::from_millis(500));
    seal_segment(dir.path(), "ipstrc.11.bak", b"second");

    assert!(
        wait_until(Duration::from_secs(10), || !archives_of(
            dir.path(),
            "ipstrc"
        )
        .is_empty()),
        "no archive was produced"
    );
    rotator.wait_compression_idle();

    // the late segment was appended after the first one's bytes, and the
    // combined generation settled into slot 1
    let settled = dir.path().join("ipstrc.log.1");
    assert!(wait_until(Duration::from_secs(5), || settled.exists()
        && fs::read(&settled).unwrap() == b"first-second"));
    assert!(!dir.path().join("ipstrc.log.0").exists());
    assert_eq!(archives_of(dir.path(), "ipstrc").len(), 1);

    rotator.close().unwrap();
}

#[test]
fn watch_dir_can_only_be_rotated_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut rotator = open_rotator(&dir, 5);
    assert!(LogRotator::open(
        Options::default(),
        dir.path(),
        FileStorage::default(),
        TarArchiver::default(),
    )
    .is_err());
    rotator.close().unwrap();

    // the lock is released on close
    let mut reopened = open_rotator(&dir, 5);
    reopened.close().unwrap();
}

#[test]
fn sealed_segments_present_at_startup_are_ingested() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("pdtrc.77.bak"), "while we were down").unwrap();
    let mut rotator = open_rotator(&dir, 5);

    let g0 = dir.path().join("pdtrc.log.0");
    assert!(
        wait_until(Duration::from_secs(10), || g0.exists()),
        "startup sweep did not ingest the segment"
    );
    assert_eq!(fs::read(&g0).unwrap(), b"while we were down");
    assert!(!dir.path().join("pdtrc.77.bak").exists());

    rotator.close().unwrap();
}

#[test]
fn no_unrelated_file_is_touched() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
    let mut rotator = open_rotator(&dir, 5);

    seal_segment(dir.path(), "inttrc.3.bak", b"payload");
    let g0 = dir.path().join("inttrc.log.0");
    assert!(wait_until(Duration::from_secs(10), || g0.exists()));

    assert_eq!(fs::read(dir.path().join("notes.txt")).unwrap(), b"keep me");
    rotator.close().unwrap();
}
