//! Folder-side file watching (§4.3). Wraps `notify` so a watcher can be
//! torn down and replaced whenever `configureBinding` reruns.

use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver};
use tokio::sync::mpsc::UnboundedSender;

pub struct FolderWatcher {
	_inner: RecommendedWatcher,
}

impl FolderWatcher {
	/// Watch `path` (recursively), forwarding a unit signal through `tx`
	/// on every raw filesystem event. Coalescing into the 500 ms debounce
	/// window is the caller's job (`SyncEventQueue`).
	pub fn watch(path: &Path, tx: UnboundedSender<()>) -> Result<Self, notify::Error> {
		let (raw_tx, raw_rx): (_, Receiver<notify::Result<notify::Event>>) = channel();
		let mut watcher = RecommendedWatcher::new(raw_tx, Config::default())?;
		watcher.watch(path, RecursiveMode::Recursive)?;

		std::thread::spawn(move || {
			while let Ok(Ok(_event)) = raw_rx.recv() {
				if tx.send(()).is_err() {
					break;
				}
			}
		});

		Ok(FolderWatcher { _inner: watcher })
	}

	/// Watch a single file non-recursively — used for `.datignore` so
	/// editing it reloads the ignore rule set.
	pub fn watch_file(path: &Path, tx: UnboundedSender<()>) -> Result<Self, notify::Error> {
		let (raw_tx, raw_rx): (_, Receiver<notify::Result<notify::Event>>) = channel();
		let mut watcher = RecommendedWatcher::new(raw_tx, Config::default())?;
		watcher.watch(path, RecursiveMode::NonRecursive)?;

		std::thread::spawn(move || {
			while let Ok(Ok(_event)) = raw_rx.recv() {
				if tx.send(()).is_err() {
					break;
				}
			}
		});

		Ok(FolderWatcher { _inner: watcher })
	}
}

// vim: ts=4
