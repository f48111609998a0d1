use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
    thread,
};

use crossbeam_channel::{Receiver, Sender};

use crate::{
    archive::{archive_timestamp, Archiver},
    error::{RotatorError, RotatorResult},
    manager::filename::{
        archive_filename, classify_entry, entry_path, generation_basename, generation_filename,
        lock_filename, parse_generation, EntryClass,
    },
    options::Options,
    storage::{File, Storage},
    watcher::{DirWatcher, WatchMsg},
};

/// The rotation engine: one handle owning the directory watcher and the two
/// worker threads.
///
/// The rotator worker drains appearance events and maintains each stream's
/// generation ring; the compressor worker packages terminal generations into
/// per-stream archives. Both cooperate through the shared [`RotatorImpl`].
pub struct LogRotator<S: Storage + Clone + 'static, A: Archiver<S> + 'static> {
    pub inner: Arc<RotatorImpl<S, A>>,
    _watcher: DirWatcher,
    shutdown_rotator_thread: (Sender<()>, Receiver<()>),
    shutdown_compressor_thread: (Sender<()>, Receiver<()>),
}

impl<S: Storage + Clone + 'static, A: Archiver<S> + 'static> LogRotator<S, A> {
    /// Start rotating `watch_dir`.
    ///
    /// Acquires the instance lock, registers the directory watch, replays
    /// whatever is already on disk, and spawns both workers; returns once
    /// the workers have entered their loops.
    pub fn open<P: AsRef<Path>>(
        options: Options,
        watch_dir: P,
        storage: S,
        archiver: A,
    ) -> RotatorResult<Self> {
        let Ok(watch_dir) = watch_dir.as_ref().to_owned().into_os_string().into_string() else {
            return Err(RotatorError::InvalidArgument(
                "Invalid watch dir. Expect to use Unicode watch dir.".to_owned(),
            ));
        };
        let watch_dir = match watch_dir.trim_end_matches('/') {
            "" => "/".to_owned(),
            trimmed => trimmed.to_owned(),
        };
        options.validate()?;
        options.initialize(&storage, &watch_dir);
        debug!("Open rotator on: '{:?}'", &watch_dir);

        let mut inner = RotatorImpl::new(options, watch_dir, storage, archiver);
        inner.acquire_dir_lock()?;
        let inner = Arc::new(inner);

        // Watch first, then sweep: an entry landing in between is seen
        // twice, and the second observer finds it gone and skips.
        let watcher = DirWatcher::new(&inner.watch_dir, inner.events.0.clone())?;
        inner.sweep_existing_entries()?;

        let rotator = LogRotator {
            inner,
            _watcher: watcher,
            shutdown_rotator_thread: crossbeam_channel::bounded(1),
            shutdown_compressor_thread: crossbeam_channel::bounded(1),
        };
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(2);
        rotator.process_events(ready_tx.clone());
        rotator.process_compression(ready_tx);
        for _ in 0..2 {
            ready_rx.recv().map_err(RotatorError::RecvError)?;
        }
        info!("rotator started on {}", &rotator.inner.watch_dir);
        Ok(rotator)
    }

    /// Stop both workers, release the instance lock and return once
    /// everything has wound down. Safe to call more than once.
    pub fn close(&mut self) -> RotatorResult<()> {
        if self.inner.is_shutting_down.load(Ordering::Acquire) {
            return Ok(());
        }
        self.inner.is_shutting_down.store(true, Ordering::Relaxed);
        let _ = self.inner.events.0.send(WatchMsg::Shutdown);
        let _ = self.shutdown_rotator_thread.1.recv();
        // Send a signal to avoid blocking forever
        let _ = self.inner.do_compress.0.send(());
        let _ = self.shutdown_compressor_thread.1.recv();
        self.inner.close()?;
        info!("rotator on {} closed", &self.inner.watch_dir);
        Ok(())
    }

    /// Block until no compression is pending or in progress.
    pub fn wait_compression_idle(&self) {
        self.inner.wait_compression_idle();
    }

    // The thread draining appearance events from the watcher: classifies
    // each basename and runs the ingest/rotate step for sealed segments.
    fn process_events(&self, ready: Sender<()>) {
        let inner = self.inner.clone();
        let shutdown = self.shutdown_rotator_thread.0.clone();
        thread::Builder::new()
            .name("rotator".to_owned())
            .spawn(move || {
                let _ = ready.send(());
                while let Ok(msg) = inner.events.1.recv() {
                    if inner.is_shutting_down.load(Ordering::Acquire) {
                        break;
                    }
                    match msg {
                        WatchMsg::Appeared(name) => inner.dispatch_entry(&name),
                        WatchMsg::WatchFailed(reason) => {
                            error!("directory watch failed: {}", reason);
                            break;
                        }
                        WatchMsg::Shutdown => break,
                    }
                }
                shutdown.send(()).unwrap();
                info!("rotator thread shut down");
            })
            .unwrap();
    }

    // The thread waiting on compression wakeups. Archive bookkeeping lives
    // here: the slot of the most recent archive per stream is owned by this
    // thread alone.
    fn process_compression(&self, ready: Sender<()>) {
        let inner = self.inner.clone();
        let shutdown = self.shutdown_compressor_thread.0.clone();
        thread::Builder::new()
            .name("compressor".to_owned())
            .spawn(move || {
                let _ = ready.send(());
                let mut last_archives: Vec<Option<String>> =
                    vec![None; inner.options.streams.len()];
                while let Ok(()) = inner.do_compress.1.recv() {
                    if inner.is_shutting_down.load(Ordering::Acquire) {
                        break;
                    }
                    inner.compress_one(&mut last_archives);
                }
                shutdown.send(()).unwrap();
                info!("compressor thread shut down");
            })
            .unwrap();
    }
}

impl<S: Storage + Clone + 'static, A: Archiver<S> + 'static> Drop for LogRotator<S, A> {
    #[allow(unused_must_use)]
    fn drop(&mut self) {
        if !self.inner.is_shutting_down.load(Ordering::Acquire) {
            let _ = self.close();
        }
    }
}

/// Per-stream rotation state. Mutated only while holding the generation
/// mutex in [`RotatorImpl`].
#[derive(Debug, Default)]
struct StreamState {
    // path captured when the terminal slot was filled
    terminal_path: Option<String>,
    // a terminal generation is awaiting packaging
    pending_compression: bool,
    // the stream gained a generation 0 that must be shifted away once the
    // running compression finishes
    settle_pending: bool,
}

/// Shared state of the two workers.
pub struct RotatorImpl<S: Storage + Clone, A: Archiver<S>> {
    pub env: S,
    pub options: Arc<Options>,
    // The watched directory
    pub watch_dir: String,
    archiver: A,
    dir_lock: Option<S::F>,

    // The generation-namespace lock: every rename/remove/append of a
    // generation file happens under this mutex, and so does every
    // per-stream state change.
    streams: Mutex<Vec<StreamState>>,
    // signal whether a compression finished
    compression_finished_signal: Condvar,
    // taken around every event dispatch; lets the compressor fence the
    // rotator out while it settles freshly appeared generation-0 files
    watcher_gate: Mutex<()>,
    // a compression is in progress; the rotator reads this to choose
    // append-vs-rotate without waiting on the compressor
    zip_active: AtomicBool,
    // Whether the rotator is closing
    is_shutting_down: AtomicBool,

    // appearance events from the watcher (plus the shutdown sentinel)
    events: (Sender<WatchMsg>, Receiver<WatchMsg>),
    // one unit per newly terminal stream
    do_compress: (Sender<()>, Receiver<()>),
}

impl<S: Storage + Clone, A: Archiver<S>> RotatorImpl<S, A> {
    fn new(options: Options, watch_dir: String, storage: S, archiver: A) -> Self {
        let stream_count = options.streams.len();
        let mut streams = Vec::with_capacity(stream_count);
        streams.resize_with(stream_count, StreamState::default);
        RotatorImpl {
            env: storage,
            options: Arc::new(options),
            watch_dir,
            archiver,
            dir_lock: None,
            streams: Mutex::new(streams),
            compression_finished_signal: Condvar::new(),
            watcher_gate: Mutex::new(()),
            zip_active: AtomicBool::new(false),
            is_shutting_down: AtomicBool::new(false),
            events: crossbeam_channel::unbounded(),
            do_compress: crossbeam_channel::unbounded(),
        }
    }

    // Take the exclusive instance lock; a second rotator on the same
    // directory must fail to open.
    fn acquire_dir_lock(&mut self) -> RotatorResult<()> {
        let lock_file = self.env.create(lock_filename(&self.watch_dir))?;
        lock_file.lock()?;
        self.dir_lock = Some(lock_file);
        Ok(())
    }

    // Replay the on-disk state: re-enqueue every present entry as an
    // appearance event (sealed segments that landed while we were down get
    // ingested), and reschedule compression for a terminal generation left
    // behind by an interrupted run.
    fn sweep_existing_entries(&self) -> RotatorResult<()> {
        for path in self.env.list(&self.watch_dir)? {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                let _ = self.events.0.send(WatchMsg::Appeared(name.to_owned()));
            }
        }
        let mut wakeups = 0;
        {
            let mut streams = self.streams.lock().unwrap();
            for (idx, base) in self.options.streams.iter().enumerate() {
                let terminal =
                    generation_filename(&self.watch_dir, base, self.options.max_generations);
                if self.env.exists(&terminal) && !streams[idx].pending_compression {
                    streams[idx].terminal_path = Some(terminal);
                    streams[idx].pending_compression = true;
                    wakeups += 1;
                    info!("recovered terminal generation of {}, rescheduling", base);
                }
            }
        }
        for _ in 0..wakeups {
            let _ = self.do_compress.0.send(());
        }
        Ok(())
    }

    /// Classify one directory-entry basename and, for a sealed segment, run
    /// the ingest/rotate step under the dispatch gate.
    pub fn dispatch_entry(&self, name: &str) {
        match classify_entry(name, &self.options.streams) {
            EntryClass::Sealed { stream } => {
                let _gate = self.watcher_gate.lock().unwrap();
                if let Err(e) = self.rotate_segment(stream, name) {
                    error!("rotating segment {} failed: {}", name, e);
                }
            }
            EntryClass::SelfStaged => debug!("ignoring reserved staging name {}", name),
            EntryClass::Derivative => debug!("ignoring derivative artifact {}", name),
            EntryClass::Unrelated => {}
        }
    }

    // Ingest one sealed segment.
    //
    // With a compression running, the segment is folded into generation 0
    // (appended onto it, or renamed into the empty slot) and the stream is
    // flagged for the post-compression settle; the ring is not shifted.
    // Otherwise the ring is shifted up one slot and the segment renamed
    // into the vacated generation 0; if the shift filled the terminal
    // slot, the compressor gets one wakeup.
    fn rotate_segment(&self, stream: usize, name: &str) -> RotatorResult<()> {
        let seg_path = entry_path(&self.watch_dir, name);
        if !self.env.exists(&seg_path) {
            info!("segment {} already gone, skipping", seg_path);
            return Ok(());
        }
        let base = &self.options.streams[stream];
        let g0 = generation_filename(&self.watch_dir, base, 0);

        if self.zip_active.load(Ordering::Relaxed) {
            let mut streams = self.streams.lock().unwrap();
            if self.env.exists(&g0) {
                let moved = self.env.concat(&seg_path, &g0)?;
                self.env.remove(&seg_path)?;
                debug!("appended {} bytes of {} onto {}", moved, name, g0);
            } else {
                self.env.rename(&seg_path, &g0)?;
                debug!("staged {} as {} while compressing", name, g0);
            }
            streams[stream].settle_pending = true;
            return Ok(());
        }

        let mut streams = self.streams.lock().unwrap();
        let state = &mut streams[stream];
        let was_pending = state.pending_compression;
        let shifted = self.shift_generations(state, base);
        let ingested = if shifted.is_ok() {
            self.env.rename(&seg_path, &g0)
        } else {
            // generation 0 was not vacated; leave the segment in place,
            // the startup sweep of a later run will pick it up
            Ok(())
        };
        let newly_pending = state.pending_compression && !was_pending;
        drop(streams);

        if newly_pending {
            debug!("terminal generation of {} filled", base);
            if self.do_compress.0.send(()).is_err() {
                warn!("compressor is gone, dropping wakeup for {}", base);
            }
        }
        shifted?;
        ingested
    }

    // Move every present generation one slot up, dropping the oldest if the
    // terminal slot is occupied. Runs from the top down so nothing is
    // overwritten. Must be called with the generation mutex held (`state`
    // borrows the guarded vector).
    fn shift_generations(&self, state: &mut StreamState, base: &str) -> RotatorResult<()> {
        let depth = self.options.max_generations;
        let terminal = generation_filename(&self.watch_dir, base, depth);
        if self.env.exists(&terminal) {
            // the oldest generation falls off the ring
            self.env.remove(&terminal)?;
        }
        for k in (0..depth).rev() {
            let from = generation_filename(&self.watch_dir, base, k);
            if !self.env.exists(&from) {
                continue;
            }
            let to = generation_filename(&self.watch_dir, base, k + 1);
            self.env.rename(&from, &to)?;
            if k + 1 == depth {
                state.terminal_path = Some(to);
                state.pending_compression = true;
            }
        }
        Ok(())
    }

    /// Handle one compression wakeup: claim the first pending stream and
    /// package its generations, then settle the rings.
    fn compress_one(&self, last_archives: &mut [Option<String>]) {
        {
            let mut streams = self.streams.lock().unwrap();
            let claimed = match streams.iter().position(|s| s.pending_compression) {
                Some(idx) => idx,
                None => {
                    debug!("compression wakeup with nothing pending");
                    return;
                }
            };
            streams[claimed].pending_compression = false;
            let terminal = match streams[claimed].terminal_path.take() {
                Some(path) => path,
                None => {
                    warn!("pending stream {} lost its terminal path", claimed);
                    return;
                }
            };
            // the triggering segment sits at generation 0 and must be
            // shifted away once we are done
            streams[claimed].settle_pending = true;
            self.zip_active.store(true, Ordering::Release);

            // the whole packaging run stays inside the generation critical
            // section, so no rotation can touch the captured files
            if let Err(e) = self.package_stream(claimed, &terminal, last_archives) {
                error!("packaging {} failed: {}", terminal, e);
            }
        }
        self.settle_after_compress();
    }

    // Package generations 1..=N of the claimed stream into a freshly
    // stamped archive, superseding the stream's previous archive. Called
    // with the generation mutex held.
    fn package_stream(
        &self,
        stream: usize,
        terminal: &str,
        last_archives: &mut [Option<String>],
    ) -> RotatorResult<()> {
        let (base, max_index) = match parse_generation(terminal) {
            Some(parsed) => parsed,
            None => return Err(RotatorError::MalformedName(terminal.to_owned())),
        };
        let archive = archive_filename(&self.watch_dir, &base, &archive_timestamp());
        let mut members = Vec::with_capacity(max_index);
        for k in 1..=max_index {
            if self.env.exists(generation_filename(&self.watch_dir, &base, k)) {
                members.push(generation_basename(&base, k));
            }
        }
        if members.is_empty() {
            info!("no generations of {} left to package", base);
            return Ok(());
        }

        if self.options.delete_prior_archive {
            if let Some(prior) = &last_archives[stream] {
                if self.env.exists(prior) {
                    match self.env.remove(prior) {
                        Ok(()) => debug!("removed prior archive {}", prior),
                        Err(e) => warn!("failed to remove prior archive {}: {}", prior, e),
                    }
                }
            }
        }

        self.archiver
            .package(&self.env, &self.watch_dir, &archive, &members)?;
        last_archives[stream] = Some(archive.clone());

        if self.options.delete_originals {
            for member in &members {
                let path = entry_path(&self.watch_dir, member);
                if let Err(e) = self.env.remove(&path) {
                    warn!("failed to remove packaged generation {}: {}", path, e);
                }
            }
        }
        info!(
            "packaged {} generations of {} into {}",
            members.len(),
            base,
            archive
        );
        Ok(())
    }

    // Shift away the generation-0 files that appeared during the
    // compression (on the compressed stream and on every stream ingested
    // through the append path), then clear the active flag. The dispatch
    // gate is taken first, and only then the generation mutex, the same
    // order the rotator uses.
    fn settle_after_compress(&self) {
        let mut wakeups = 0;
        {
            let _gate = self.watcher_gate.lock().unwrap();
            let mut streams = self.streams.lock().unwrap();
            for (idx, base) in self.options.streams.iter().enumerate() {
                if !streams[idx].settle_pending {
                    continue;
                }
                streams[idx].settle_pending = false;
                if !self
                    .env
                    .exists(generation_filename(&self.watch_dir, base, 0))
                {
                    continue;
                }
                let was_pending = streams[idx].pending_compression;
                if let Err(e) = self.shift_generations(&mut streams[idx], base) {
                    error!("settling {} after compression failed: {}", base, e);
                }
                if streams[idx].pending_compression && !was_pending {
                    wakeups += 1;
                }
            }
            self.zip_active.store(false, Ordering::Release);
            self.compression_finished_signal.notify_all();
        }
        for _ in 0..wakeups {
            if self.do_compress.0.send(()).is_err() {
                break;
            }
        }
    }

    fn wait_compression_idle(&self) {
        let mut streams = self.streams.lock().unwrap();
        while !self.is_shutting_down.load(Ordering::Acquire)
            && (self.zip_active.load(Ordering::Acquire)
                || streams.iter().any(|s| s.pending_compression))
        {
            streams = self.compression_finished_signal.wait(streams).unwrap();
        }
    }

    fn close(&self) -> RotatorResult<()> {
        self.is_shutting_down.store(true, Ordering::Release);
        match &self.dir_lock {
            Some(lock) => lock.unlock(),
            None => Ok(()),
        }
    }
}
