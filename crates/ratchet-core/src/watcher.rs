//! Blocking file-tree watcher.
//!
//! [`watch_for_change`] registers every matching file under the provided
//! directories, then blocks on a single select across three event sources:
//! a qualifying file change, a watcher backend error, and cancellation.
//! First to fire wins. The `notify` handle is scoped to the call and torn
//! down on every exit path.

use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, select};
use notify::{event::ModifyKind, EventKind, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::filter::walk;

/// Event kinds that count as "something changed": creation, removal,
/// data/rename modification. Access and metadata events never trigger a
/// cycle.
fn is_change_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any)
    )
}

/// Block until a watched file changes or the watch is cancelled.
///
/// Returns `true` when a qualifying change was detected, `false` on
/// cancellation or on a watcher backend error. A directory in `dir_list`
/// that cannot be walked only loses its own subtree; the other directories
/// are still watched.
pub fn watch_for_change(
    dir_list: &[PathBuf],
    matcher: impl Fn(&Path) -> bool,
    cancel: &Receiver<()>,
) -> bool {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut watcher = match notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    }) {
        Ok(watcher) => watcher,
        Err(e) => {
            warn!(error = %e, "cannot create filesystem watcher");
            return false;
        }
    };

    // Register individual files, never directories, so that only files
    // selected by the matcher can wake us up.
    let mut watched = 0usize;
    for dir in dir_list {
        debug!(dir = %dir.display(), "watching directory");
        walk(dir, &mut |path| {
            if matcher(path) {
                match watcher.watch(path, RecursiveMode::NonRecursive) {
                    Ok(()) => watched += 1,
                    Err(e) => warn!(file = %path.display(), error = %e, "cannot watch file"),
                }
            }
        });
    }
    debug!(files = watched, "watch armed");

    loop {
        select! {
            recv(rx) -> msg => match msg {
                Ok(Ok(event)) if is_change_kind(&event.kind) => {
                    for path in &event.paths {
                        debug!(file = %path.display(), kind = ?event.kind, "change detected");
                    }
                    return true;
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => {
                    warn!(error = %e, "filesystem watcher error");
                    return false;
                }
                Err(_) => return false,
            },
            recv(cancel) -> _ => {
                debug!("watch cancelled");
                return false;
            }
        }
    }
}
