//! The repository scheduler (C7): a single-threaded cooperative worker loop
//! that wakes on an interval (plus jitter), snapshots the relay and local
//! tree, applies the §4.6 decision table to every path in the merged work
//! set, and backs off on contention or transient relay errors (§4.7).

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::cancel::CancellationToken;
use crate::callback::{SchedulerCallback, SchedulerEvent};
use crate::engine::{Engine, SyncOutcome};
use crate::error::SyncError;
use crate::exclusion::ExclusionEngine;
use crate::identity;
use crate::naming::strip_category_suffix;
use crate::path::LogicalPath;
use crate::relay::RelayAdapter;
use crate::strategies::AccessPolicy;

/// Configuration a scheduler needs beyond what `Engine` already holds.
pub struct SchedulerConfig {
	pub scan_interval: Duration,
	pub scan_jitter: Duration,
	pub backoff_initial: Duration,
	pub backoff_max: Duration,
	pub access: AccessPolicy,
}

/// Drives repeated scans of one repository until cancelled. Holds no state
/// across scans beyond what `Engine`'s index already persists — restarting a
/// worker after a crash resumes correctly from the durable index (§4.5).
pub struct Scheduler<'a, A: RelayAdapter> {
	engine: Engine<'a, A>,
	repo_root: std::path::PathBuf,
	exclusion: ExclusionEngine,
	config: SchedulerConfig,
	callback: &'a dyn SchedulerCallback,
}

impl<'a, A: RelayAdapter> Scheduler<'a, A> {
	pub fn new(
		engine: Engine<'a, A>,
		repo_root: impl Into<std::path::PathBuf>,
		exclusion: ExclusionEngine,
		config: SchedulerConfig,
		callback: &'a dyn SchedulerCallback,
	) -> Self {
		Self { engine, repo_root: repo_root.into(), exclusion, config, callback }
	}

	/// Run scans forever until `cancel` fires. Never returns an error for a
	/// single path's or a single scan's failure (§7: "one path's failure
	/// never aborts a scan"); only returns early if cancelled mid-sleep.
	pub async fn run(&self, cancel: &CancellationToken) {
		let mut backoff = self.config.backoff_initial;

		loop {
			if cancel.is_cancelled() {
				return;
			}

			match self.scan_once(cancel).await {
				Ok(changed) => {
					backoff = self.config.backoff_initial;
					self.callback.on_event(SchedulerEvent::ScanCompleted { changed });
					if let Err(e) = identity::renew(self.engine.relay, &self.engine.pseudonym).await {
						tracing::warn!(error = %e, "failed to renew identity marker");
					}
				}
				Err(e) if e.is_fatal() => {
					tracing::error!(error = %e, "fatal scheduler error, stopping repository worker");
					return;
				}
				Err(e) => {
					tracing::warn!(error = %e, "scan failed, backing off");
					self.callback
						.on_event(SchedulerEvent::BackingOff { delay_secs: backoff.as_secs() });
					if !cancel.sleep(backoff).await {
						return;
					}
					backoff = (backoff * 2).min(self.config.backoff_max);
					continue;
				}
			}

			let jitter = rand::thread_rng().gen_range(0..=self.config.scan_jitter.as_millis() as u64);
			let wait = self.config.scan_interval + Duration::from_millis(jitter);
			if !cancel.sleep(wait).await {
				return;
			}
		}
	}

	/// One full scan: snapshot, merge, shuffle, apply. Returns the number of
	/// paths pushed or pulled.
	async fn scan_once(&self, cancel: &CancellationToken) -> Result<usize, SyncError> {
		self.callback.on_event(SchedulerEvent::ScanStarted);
		cancel.check()?;

		let work_set = self.build_work_set().await?;
		let mut shuffled: Vec<LogicalPath> = work_set.into_iter().collect();
		shuffled.shuffle(&mut rand::thread_rng());

		let mut changed = 0usize;
		for path in shuffled {
			cancel.check()?;

			match self.engine.sync_path(&path, &self.repo_root, self.config.access).await {
				Ok(outcome) => {
					self.callback.on_event(SchedulerEvent::PathCompleted { path: path.clone() });
					if matches!(outcome, SyncOutcome::Pushed { .. } | SyncOutcome::Pulled { .. }) {
						changed += 1;
					}
				}
				Err(e) if e.is_fatal() => return Err(e),
				Err(e) => {
					// A single path's failure never aborts the scan (§7). Retryable
					// errors (relay hiccups, lock contention) are expected to clear
					// on a later scan; anything else is worth a louder log line
					// since retrying alone won't fix it.
					if e.is_retryable() {
						tracing::debug!(path = %path, error = %e, "path sync deferred, will retry next scan");
					} else {
						tracing::warn!(path = %path, error = %e, "path sync failed, not retryable");
					}
					self.callback
						.on_event(SchedulerEvent::PathFailed { path: path.clone(), message: e.to_string() });
				}
			}
		}

		Ok(changed)
	}

	/// Union of every path the local tree knows about, every path the index
	/// remembers, and every path with a placeholder on the relay, with
	/// excluded paths dropped before they ever reach the decision table.
	async fn build_work_set(&self) -> Result<HashSet<LogicalPath>, SyncError> {
		let mut paths = HashSet::new();

		for entry in walk_local_tree(&self.repo_root) {
			if self.exclusion.should_exclude(&entry, None) {
				continue;
			}
			if let Ok(p) = LogicalPath::new(&entry) {
				paths.insert(p);
			}
		}

		for known in self.engine.index.all_paths()? {
			let candidate = std::path::Path::new(&known);
			if self.exclusion.should_exclude(candidate, None) {
				continue;
			}
			if let Ok(p) = LogicalPath::new(candidate) {
				paths.insert(p);
			}
		}

		for entry in self.engine.relay.list("").await? {
			if let Some(logical) = strip_category_suffix(&entry.name) {
				let candidate = std::path::Path::new(logical);
				if self.exclusion.should_exclude(candidate, None) {
					continue;
				}
				if let Ok(p) = LogicalPath::new(candidate) {
					paths.insert(p);
				}
			}
		}

		Ok(paths)
	}
}

/// Recursively list every regular file under `root`, relative to `root`.
/// Exclusion filtering is applied afterward in `build_work_set`, not here,
/// so a single `ExclusionEngine` instance also covers index- and
/// relay-sourced paths that never touch the local tree.
fn walk_local_tree(root: &Path) -> Vec<std::path::PathBuf> {
	let mut out = Vec::new();
	let mut stack = vec![root.to_path_buf()];
	while let Some(dir) = stack.pop() {
		let entries = match std::fs::read_dir(&dir) {
			Ok(e) => e,
			Err(_) => continue,
		};
		for entry in entries.flatten() {
			let path = entry.path();
			if path.is_dir() {
				stack.push(path);
			} else if let Ok(relative) = path.strip_prefix(root) {
				out.push(relative.to_path_buf());
			}
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::conflict::ConflictResolver;
	use crate::exclusion::ExcludeConfig;
	use crate::identity::Pseudonym;
	use crate::index::Index;
	use crate::relay::memory::MemoryRelay;
	use crate::strategies::ConflictStrategy;
	use tempfile::TempDir;

	struct NullCb;
	impl SchedulerCallback for NullCb {
		fn on_event(&self, _event: SchedulerEvent) {}
	}

	fn no_exclusions(repo: &Path) -> ExclusionEngine {
		ExclusionEngine::new(&ExcludeConfig::default(), repo).unwrap()
	}

	fn engine<'a>(relay: &'a MemoryRelay, index: &'a Index) -> Engine<'a, MemoryRelay> {
		Engine {
			relay,
			index,
			pseudonym: Pseudonym::new("alice"),
			key: None,
			compress: false,
			retention: crate::strategies::PlaceholderRetention::RetainHistory,
			resolver: ConflictResolver::new(ConflictStrategy::NewerWins),
			lock_ttl_secs: 300,
			lock_settle: Duration::ZERO,
			max_name_len: 255,
		}
	}

	#[tokio::test]
	async fn test_scan_once_pushes_new_local_file() {
		let relay = MemoryRelay::new();
		let index = Index::open(&TempDir::new().unwrap().keep().join("idx.redb")).unwrap();
		let repo = TempDir::new().unwrap();
		std::fs::write(repo.path().join("new.txt"), b"content").unwrap();

		let cb = NullCb;
		let sched = Scheduler::new(
			engine(&relay, &index),
			repo.path(),
			no_exclusions(repo.path()),
			SchedulerConfig {
				scan_interval: Duration::from_secs(30),
				scan_jitter: Duration::from_secs(1),
				backoff_initial: Duration::from_millis(10),
				backoff_max: Duration::from_secs(1),
				access: AccessPolicy::full(),
			},
			&cb,
		);

		let cancel = CancellationToken::new();
		let changed = sched.scan_once(&cancel).await.unwrap();
		assert_eq!(changed, 1);
		assert!(relay.exists("new.txt.placeholder").await.unwrap());
	}

	#[tokio::test]
	async fn test_scan_once_is_idempotent_on_second_pass() {
		let relay = MemoryRelay::new();
		let index = Index::open(&TempDir::new().unwrap().keep().join("idx.redb")).unwrap();
		let repo = TempDir::new().unwrap();
		std::fs::write(repo.path().join("stable.txt"), b"content").unwrap();

		let cb = NullCb;
		let sched = Scheduler::new(
			engine(&relay, &index),
			repo.path(),
			no_exclusions(repo.path()),
			SchedulerConfig {
				scan_interval: Duration::from_secs(30),
				scan_jitter: Duration::from_secs(1),
				backoff_initial: Duration::from_millis(10),
				backoff_max: Duration::from_secs(1),
				access: AccessPolicy::full(),
			},
			&cb,
		);

		let cancel = CancellationToken::new();
		sched.scan_once(&cancel).await.unwrap();
		let changed = sched.scan_once(&cancel).await.unwrap();
		assert_eq!(changed, 0);
	}

	#[tokio::test]
	async fn test_run_stops_promptly_on_cancellation() {
		let relay = MemoryRelay::new();
		let index = Index::open(&TempDir::new().unwrap().keep().join("idx.redb")).unwrap();
		let repo = TempDir::new().unwrap();

		let cb = NullCb;
		let sched = Scheduler::new(
			engine(&relay, &index),
			repo.path(),
			no_exclusions(repo.path()),
			SchedulerConfig {
				scan_interval: Duration::from_secs(30),
				scan_jitter: Duration::from_secs(1),
				backoff_initial: Duration::from_millis(10),
				backoff_max: Duration::from_secs(1),
				access: AccessPolicy::full(),
			},
			&cb,
		);

		let cancel = CancellationToken::new();
		cancel.cancel();
		sched.run(&cancel).await;
	}
}

// vim: ts=4
