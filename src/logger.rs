use std::{
    fmt::{self, Write as _},
    sync::Mutex,
    thread,
};

use log::{LevelFilter, Log, Metadata, Record};
use slog::{o, Drain, KV};

use crate::{
    manager::filename::info_log_filename,
    storage::{File, Storage},
};

/// Bridges the `log` facade macros used across the engine onto a `slog`
/// pipeline, tagging every record with the worker thread that produced it.
pub struct Logger {
    inner: slog::Logger,
    level: LevelFilter,
}

impl Logger {
    /// Create a logger backend
    ///
    /// If `inner` is not `None`, use `inner` logger
    /// If `inner` is `None`
    ///     - In dev mode, use a std output
    ///     - In release mode, use a file named `LOG` in the watched directory
    pub fn new<S: Storage>(
        inner: Option<slog::Logger>,
        level: LevelFilter,
        storage: &S,
        watch_dir: &str,
    ) -> Self {
        let inner = match inner {
            Some(l) => l,
            None => {
                if cfg!(debug_assertions) {
                    // Use std out
                    let decorator = slog_term::TermDecorator::new().build();
                    let drain = Mutex::new(slog_term::FullFormat::new(decorator).build()).fuse();
                    slog::Logger::root(drain, o!())
                } else {
                    match storage.create(info_log_filename(watch_dir).as_str()) {
                        Ok(file) => {
                            let drain = slog_async::Async::new(FileBasedDrain::new(file))
                                .build()
                                .fuse();
                            slog::Logger::root(drain, o!())
                        }
                        Err(_) => {
                            // The watched dir is not writable yet, so fall back
                            // to the terminal; opening the rotator will surface
                            // the real error.
                            let decorator = slog_term::TermDecorator::new().build();
                            let drain =
                                Mutex::new(slog_term::FullFormat::new(decorator).build()).fuse();
                            slog::Logger::root(drain, o!())
                        }
                    }
                }
            }
        };
        Self { inner, level }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, r: &Record) {
        if !self.enabled(r.metadata()) {
            return;
        }
        // The engine does all its work on named threads, so the thread name
        // identifies which worker a line came from.
        let current = thread::current();
        let worker = current.name().unwrap_or("main");
        match r.metadata().level() {
            log::Level::Error => slog::error!(self.inner, "{}", r.args(); "worker" => worker),
            log::Level::Warn => slog::warn!(self.inner, "{}", r.args(); "worker" => worker),
            log::Level::Info => slog::info!(self.inner, "{}", r.args(); "worker" => worker),
            log::Level::Debug => slog::debug!(self.inner, "{}", r.args(); "worker" => worker),
            log::Level::Trace => slog::trace!(self.inner, "{}", r.args(); "worker" => worker),
        }
    }

    fn flush(&self) {}
}

/// Writes one timestamped line per record through the `File` abstraction,
/// with the record's key-value pairs flattened onto the tail.
struct FileBasedDrain<F: File> {
    inner: Mutex<F>,
}

impl<F: File> FileBasedDrain<F> {
    fn new(f: F) -> Self {
        FileBasedDrain {
            inner: Mutex::new(f),
        }
    }
}

impl<F: File> Drain for FileBasedDrain<F> {
    type Ok = ();
    type Err = slog::Never;

    fn log(
        &self,
        record: &slog::Record,
        values: &slog::OwnedKVList,
    ) -> Result<Self::Ok, Self::Err> {
        let mut line = LineSerializer {
            line: format!(
                "{} {} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level().as_short_str(),
                record.msg()
            ),
        };
        let _ = record.kv().serialize(record, &mut line);
        let _ = values.serialize(record, &mut line);
        line.line.push('\n');
        // Ignore errors here
        let _ = self.inner.lock().unwrap().write(line.line.as_bytes());
        Ok(())
    }
}

struct LineSerializer {
    line: String,
}

impl slog::Serializer for LineSerializer {
    fn emit_arguments(&mut self, key: slog::Key, val: &fmt::Arguments) -> slog::Result {
        let _ = write!(self.line, " {}={}", key, val);
        Ok(())
    }
}
