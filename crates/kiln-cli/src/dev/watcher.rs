//! File system watcher with debouncing for `kiln dev`.
//!
//! Watches the project directory recursively and forwards relevant changes.
//! Bursts of events (editors often write a file several times) are collapsed
//! into one event per path once the burst has been quiet for the debounce
//! window. The watcher only enqueues; it never waits on a build.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::error::WatchError;

/// Kind of file system change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// What the dev loop receives.
#[derive(Debug)]
pub enum WatchEvent {
    Changed { path: PathBuf, kind: ChangeKind },
    /// The event stream failed; the watcher should be restarted
    Error(WatchError),
}

/// Recursive watcher over a project root.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching `root`.
    ///
    /// Must be called from within a tokio runtime; the debouncer runs as a
    /// task and stops when the watcher is dropped.
    pub fn new(
        root: PathBuf,
        ignore_patterns: Vec<String>,
        debounce_ms: u64,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WatchEvent>), WatchError> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::unbounded_channel();

        let filter_root = root.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    let _ = raw_tx.send(WatchEvent::Error(WatchError::Stream(err)));
                    return;
                }
            };

            let kind = match event.kind {
                EventKind::Create(_) => ChangeKind::Created,
                EventKind::Modify(_) => ChangeKind::Modified,
                EventKind::Remove(_) => ChangeKind::Removed,
                _ => return,
            };

            for path in event.paths {
                if should_ignore(&path, &filter_root, &ignore_patterns) {
                    continue;
                }
                let _ = raw_tx.send(WatchEvent::Changed { path, kind });
            }
        })
        .map_err(|source| WatchError::Init {
            path: root.clone(),
            source,
        })?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Init {
                path: root.clone(),
                source,
            })?;

        tokio::spawn(debounce(raw_rx, tx, Duration::from_millis(debounce_ms)));

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Collapse bursts of change events.
///
/// Errors are forwarded immediately. Ends when either side closes.
pub async fn debounce(
    mut raw: mpsc::UnboundedReceiver<WatchEvent>,
    out: mpsc::UnboundedSender<WatchEvent>,
    window: Duration,
) {
    let mut pending: BTreeMap<PathBuf, ChangeKind> = BTreeMap::new();

    loop {
        let next = if pending.is_empty() {
            raw.recv().await
        } else {
            match tokio::time::timeout_at(Instant::now() + window, raw.recv()).await {
                Ok(event) => event,
                Err(_) => {
                    for (path, kind) in std::mem::take(&mut pending) {
                        if out.send(WatchEvent::Changed { path, kind }).is_err() {
                            return;
                        }
                    }
                    continue;
                }
            }
        };

        match next {
            Some(WatchEvent::Changed { path, kind }) => {
                pending.insert(path, kind);
            }
            Some(error @ WatchEvent::Error(_)) => {
                if out.send(error).is_err() {
                    return;
                }
            }
            None => {
                for (path, kind) in pending {
                    let _ = out.send(WatchEvent::Changed { path, kind });
                }
                debug!("watcher stopped");
                return;
            }
        }
    }
}

/// Whether a change at `path` is irrelevant to the build.
///
/// Ignores paths outside `root`, hidden files and directories, and the
/// configured patterns: `*.ext` matches a suffix, anything else matches a
/// whole path component.
pub fn should_ignore(path: &Path, root: &Path, ignore_patterns: &[String]) -> bool {
    let Ok(rel_path) = path.strip_prefix(root) else {
        return true;
    };

    let path_str = rel_path.to_string_lossy();
    for pattern in ignore_patterns {
        if let Some(suffix) = pattern.strip_prefix('*') {
            if path_str.ends_with(suffix) {
                return true;
            }
        } else if rel_path
            .components()
            .any(|c| c.as_os_str() == pattern.as_str())
        {
            return true;
        }
    }

    rel_path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_ignore_node_modules() {
        let root = PathBuf::from("/project");
        let patterns = vec!["node_modules".to_string()];

        let path = PathBuf::from("/project/node_modules/package/index.js");
        assert!(should_ignore(&path, &root, &patterns));

        let path = PathBuf::from("/project/src/index.js");
        assert!(!should_ignore(&path, &root, &patterns));

        // Component match, not substring.
        let path = PathBuf::from("/project/src/node_modules_shim.js");
        assert!(!should_ignore(&path, &root, &patterns));
    }

    #[test]
    fn test_should_ignore_extension() {
        let root = PathBuf::from("/project");
        let patterns = vec!["*.log".to_string()];

        assert!(should_ignore(Path::new("/project/debug.log"), &root, &patterns));
        assert!(!should_ignore(Path::new("/project/src/index.js"), &root, &patterns));
    }

    #[test]
    fn test_should_ignore_hidden_and_outside() {
        let root = PathBuf::from("/project");
        assert!(should_ignore(Path::new("/project/.git/config"), &root, &[]));
        assert!(should_ignore(Path::new("/project/src/.hidden/file.js"), &root, &[]));
        assert!(should_ignore(Path::new("/other/file.js"), &root, &[]));
    }

    #[tokio::test]
    async fn burst_collapses_to_one_event_per_path() {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(debounce(raw_rx, tx, Duration::from_millis(20)));

        for _ in 0..5 {
            raw_tx
                .send(WatchEvent::Changed {
                    path: PathBuf::from("/project/src/a.js"),
                    kind: ChangeKind::Modified,
                })
                .unwrap();
        }
        raw_tx
            .send(WatchEvent::Changed {
                path: PathBuf::from("/project/src/b.js"),
                kind: ChangeKind::Created,
            })
            .unwrap();
        drop(raw_tx);

        let mut paths = Vec::new();
        while let Some(event) = rx.recv().await {
            if let WatchEvent::Changed { path, .. } = event {
                paths.push(path);
            }
        }
        assert_eq!(
            paths,
            vec![PathBuf::from("/project/src/a.js"), PathBuf::from("/project/src/b.js")]
        );
    }
}
