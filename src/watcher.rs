use std::path::Path;

use crossbeam_channel::Sender;
use notify::{
    event::{ModifyKind, RenameMode},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};

use crate::error::{RotatorError, RotatorResult};

/// What the watcher hands to the rotator worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMsg {
    /// A directory entry appeared (created or moved in); payload is its
    /// basename.
    Appeared(String),
    /// The kernel subscription broke; the rotator worker terminates on this.
    WatchFailed(String),
    /// Shutdown sentinel posted by `close`.
    Shutdown,
}

/// Subscribes to entry-appearance events on a single directory and forwards
/// them, in kernel-delivery order, into the rotator's event channel.
///
/// Dropping the watcher cancels the subscription.
pub struct DirWatcher {
    _inner: RecommendedWatcher,
}

impl DirWatcher {
    pub fn new(watch_dir: &str, events: Sender<WatchMsg>) -> RotatorResult<Self> {
        let mut inner = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for name in appeared_basenames(&event) {
                    if events.send(WatchMsg::Appeared(name)).is_err() {
                        // receiver is gone, nothing left to report to
                        break;
                    }
                }
            }
            Err(e) => {
                let _ = events.send(WatchMsg::WatchFailed(e.to_string()));
            }
        })
        .map_err(RotatorError::Watch)?;
        inner
            .watch(Path::new(watch_dir), RecursiveMode::NonRecursive)
            .map_err(RotatorError::Watch)?;
        info!("watching directory {}", watch_dir);
        Ok(DirWatcher { _inner: inner })
    }
}

// Keep only "an entry appeared here" events: creations and the destination
// side of renames. Everything else (removals, content writes, reads) is
// noise to the rotator.
fn appeared_basenames(event: &Event) -> Vec<String> {
    let paths: Vec<&std::path::PathBuf> = match event.kind {
        EventKind::Create(_) => event.paths.iter().collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.iter().collect(),
        // for a paired rename the second path is the destination
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.iter().skip(1).collect()
        }
        _ => return vec![],
    };
    paths
        .into_iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_owned))
        .collect()
}
