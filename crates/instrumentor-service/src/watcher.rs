//! Filesystem change notifications.
//!
//! A [`ChangeWatcher`] watches a directory tree through a [`WatchPrimitive`] and re-emits every
//! change notification as a [`ChangeEvent`] to all of its subscribers. It does not filter,
//! debounce or coalesce anything: one notification of the primitive results in exactly one
//! event per subscriber.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use notify::{EventKind, RecursiveMode, Watcher};
use thiserror::Error;

/// A change somewhere below the watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// The path of the file or directory that changed.
    pub changed: PathBuf,
}

/// Errors setting up a filesystem watch.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch {}", path.display())]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Receives the raw change notifications of a [`WatchPrimitive`].
pub type ChangeSink = Arc<dyn Fn(PathBuf) + Send + Sync>;

/// Keeps a watch registered with its [`WatchPrimitive`] alive.
///
/// Dropping the guard stops the watch.
pub struct WatchGuard {
    _handle: Mutex<Box<dyn Send>>,
}

impl WatchGuard {
    pub fn new<T: Send + 'static>(handle: T) -> Self {
        Self {
            _handle: Mutex::new(Box::new(handle)),
        }
    }
}

impl fmt::Debug for WatchGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchGuard").finish_non_exhaustive()
    }
}

/// The mechanism that actually detects changes in a directory tree.
pub trait WatchPrimitive {
    /// Starts watching `root` recursively, calling `sink` for every reported change.
    fn watch(&self, root: &Path, sink: ChangeSink) -> Result<WatchGuard, WatchError>;
}

/// Watches the filesystem using the platform's native notification API.
///
/// Access events are not reported, every other event is reported once for each path it
/// carries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyWatch;

impl WatchPrimitive for NotifyWatch {
    fn watch(&self, root: &Path, sink: ChangeSink) -> Result<WatchGuard, WatchError> {
        let to_watch_error = |source| WatchError::Notify {
            path: root.to_owned(),
            source,
        };

        let mut watcher = notify::recommended_watcher(
            move |result: notify::Result<notify::Event>| match result {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    for path in event.paths {
                        sink(path);
                    }
                }
                Err(error) => {
                    tracing::error!(
                        error = &error as &dyn std::error::Error,
                        "Filesystem watcher error"
                    );
                }
            },
        )
        .map_err(to_watch_error)?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(to_watch_error)?;

        tracing::info!("Watching {} for changes", root.display());
        Ok(WatchGuard::new(watcher))
    }
}

/// A [`WatchPrimitive`] that only reports the changes it is told about.
///
/// Every call to [`trigger`](Self::trigger) is delivered to all active watches started through
/// any clone of this primitive.
#[derive(Clone, Default)]
pub struct ManualWatch {
    watches: Arc<Mutex<ManualWatches>>,
}

#[derive(Default)]
struct ManualWatches {
    next_id: u64,
    active: Vec<(u64, PathBuf, ChangeSink)>,
}

/// Unregisters a manual watch when its [`WatchGuard`] is dropped.
struct ManualWatchHandle {
    id: u64,
    watches: Arc<Mutex<ManualWatches>>,
}

impl Drop for ManualWatchHandle {
    fn drop(&mut self) {
        if let Ok(mut watches) = self.watches.lock() {
            watches.active.retain(|(id, _, _)| *id != self.id);
        }
    }
}

impl ManualWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports a change of `changed` to every active watch.
    pub fn trigger(&self, changed: impl Into<PathBuf>) {
        let changed = changed.into();
        let sinks: Vec<_> = {
            let watches = self.watches.lock().unwrap();
            watches
                .active
                .iter()
                .map(|(_, _, sink)| Arc::clone(sink))
                .collect()
        };
        for sink in sinks {
            sink(changed.clone());
        }
    }

    /// The roots of all active watches.
    pub fn watched_roots(&self) -> Vec<PathBuf> {
        let watches = self.watches.lock().unwrap();
        watches
            .active
            .iter()
            .map(|(_, root, _)| root.clone())
            .collect()
    }
}

impl fmt::Debug for ManualWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualWatch")
            .field("watched_roots", &self.watched_roots())
            .finish()
    }
}

impl WatchPrimitive for ManualWatch {
    fn watch(&self, root: &Path, sink: ChangeSink) -> Result<WatchGuard, WatchError> {
        let mut watches = self.watches.lock().unwrap();
        let id = watches.next_id;
        watches.next_id += 1;
        watches.active.push((id, root.to_owned(), sink));

        Ok(WatchGuard::new(ManualWatchHandle {
            id,
            watches: Arc::clone(&self.watches),
        }))
    }
}

type ChangeHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Watches a directory tree and notifies subscribers about every change below it.
pub struct ChangeWatcher {
    root: PathBuf,
    handlers: Arc<RwLock<Vec<ChangeHandler>>>,
    _guard: WatchGuard,
}

impl ChangeWatcher {
    /// Starts watching `root` using the given primitive.
    pub fn new(
        root: impl Into<PathBuf>,
        primitive: &impl WatchPrimitive,
    ) -> Result<Self, WatchError> {
        let root = root.into();
        let handlers: Arc<RwLock<Vec<ChangeHandler>>> = Default::default();

        let sink: ChangeSink = {
            let handlers = Arc::clone(&handlers);
            Arc::new(move |changed: PathBuf| {
                let event = ChangeEvent { changed };
                tracing::trace!("Change detected at {}", event.changed.display());
                // Handlers are invoked outside of the lock, so they may subscribe others.
                let handlers = handlers.read().unwrap().clone();
                for handler in handlers {
                    handler(&event);
                }
            })
        };
        let guard = primitive.watch(&root, sink)?;

        Ok(Self {
            root,
            handlers,
            _guard: guard,
        })
    }

    /// Subscribes `handler` to all future change events.
    pub fn on_change<F>(&self, handler: F)
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.handlers.write().unwrap().push(Arc::new(handler));
    }

    /// The watched root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.try_read().map(|h| h.len()).unwrap_or_default();
        f.debug_struct("ChangeWatcher")
            .field("root", &self.root)
            .field("handlers", &handlers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_watches_root() {
        let primitive = ManualWatch::new();
        let watcher = ChangeWatcher::new("/some/directory", &primitive).unwrap();

        assert_eq!(watcher.root(), Path::new("/some/directory"));
        assert_eq!(primitive.watched_roots(), [PathBuf::from("/some/directory")]);
    }

    #[test]
    fn test_emits_change_events() {
        let primitive = ManualWatch::new();
        let watcher = ChangeWatcher::new("/some/directory", &primitive).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            watcher.on_change(move |event| seen.lock().unwrap().push(event.clone()));
        }

        primitive.trigger("changed_file");

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            [ChangeEvent {
                changed: PathBuf::from("changed_file")
            }]
        );
    }

    #[test]
    fn test_no_coalescing() {
        let primitive = ManualWatch::new();
        let watcher = ChangeWatcher::new("/root", &primitive).unwrap();

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        for counter in [&first, &second] {
            let counter = Arc::clone(counter);
            watcher.on_change(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        primitive.trigger("/root/a.js");
        primitive.trigger("/root/a.js");
        primitive.trigger("/root/b.js");

        assert_eq!(first.load(Ordering::SeqCst), 3);
        assert_eq!(second.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_stops_emitting_when_dropped() {
        let primitive = ManualWatch::new();
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let watcher = ChangeWatcher::new("/root", &primitive).unwrap();
            let counter = Arc::clone(&counter);
            watcher.on_change(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            primitive.trigger("/root/a.js");
        }

        primitive.trigger("/root/a.js");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(primitive.watched_roots().is_empty());
    }
}
