//! Property-style integration tests, one per testable property named in the
//! design notes: mutual exclusion, integrity, monotonic versions, idempotent
//! push, deletion propagation, conflict strategy, cancellation, and index
//! rebuild convergence. Each uses `MemoryRelay` for deterministic multi-client
//! simulation rather than real filesystem timing.

use std::time::Duration;

use escale::cancel::CancellationToken;
use escale::conflict::ConflictResolver;
use escale::engine::{Engine, SyncOutcome};
use escale::identity::Pseudonym;
use escale::index::{Index, IndexEntry};
use escale::maintenance;
use escale::path::LogicalPath;
use escale::relay::memory::MemoryRelay;
use escale::relay::RelayAdapter;
use escale::scheduler::{Scheduler, SchedulerConfig};
use escale::strategies::{AccessPolicy, ConflictStrategy, PlaceholderRetention};
use escale::SyncError;
use tempfile::TempDir;

fn engine<'a>(
	relay: &'a MemoryRelay,
	index: &'a Index,
	who: &str,
	strategy: ConflictStrategy,
) -> Engine<'a, MemoryRelay> {
	Engine {
		relay,
		index,
		pseudonym: Pseudonym::new(who),
		key: None,
		compress: false,
		retention: PlaceholderRetention::RetainHistory,
		resolver: ConflictResolver::new(strategy),
		lock_ttl_secs: 300,
		lock_settle: Duration::ZERO,
		max_name_len: 255,
	}
}

fn open_index() -> Index {
	Index::open(&TempDir::new().unwrap().keep().join("idx.redb")).unwrap()
}

/// P1: concurrent writers to the same path never leave the relay holding a
/// payload whose digest disagrees with its own placeholder, regardless of
/// who wins the lock race.
#[tokio::test]
async fn p1_concurrent_writers_never_leave_payload_placeholder_mismatch() {
	let relay = MemoryRelay::new();
	let index_a = open_index();
	let index_b = open_index();
	let repo_a = TempDir::new().unwrap();
	let repo_b = TempDir::new().unwrap();
	let path = LogicalPath::new("contended.txt").unwrap();

	std::fs::write(path.resolve(repo_a.path()), b"alice's version").unwrap();
	std::fs::write(path.resolve(repo_b.path()), b"bob's version").unwrap();

	let engine_a = engine(&relay, &index_a, "alice", ConflictStrategy::NewerWins);
	let engine_b = engine(&relay, &index_b, "bob", ConflictStrategy::NewerWins);

	let (result_a, result_b) = tokio::join!(
		engine_a.sync_path(&path, repo_a.path(), AccessPolicy::full()),
		engine_b.sync_path(&path, repo_b.path(), AccessPolicy::full()),
	);

	// At least one side must make progress; a transient `Busy` on the loser
	// is an acceptable outcome of best-effort mutual exclusion (§9).
	assert!(result_a.is_ok() || result_b.is_ok());

	let placeholder_name = "contended.txt.placeholder";
	if relay.exists(placeholder_name).await.unwrap() {
		let body = relay.get(placeholder_name).await.unwrap();
		let placeholder = escale::placeholder::Placeholder::parse(&body).unwrap();
		if !placeholder.is_tombstone() {
			let payload = relay.get("contended.txt").await.unwrap();
			let digest = escale::framing::plaintext_digest(&payload);
			assert_eq!(Some(digest), placeholder.digest);
		}
	}
}

/// P2: a pulled payload is byte-identical to what was pushed, and its digest
/// matches the placeholder's recorded digest, even for binary content.
#[tokio::test]
async fn p2_pull_reproduces_exact_bytes_pushed() {
	let relay = MemoryRelay::new();
	let index_a = open_index();
	let index_b = open_index();
	let repo_a = TempDir::new().unwrap();
	let repo_b = TempDir::new().unwrap();
	let path = LogicalPath::new("binary.dat").unwrap();

	let content: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
	std::fs::write(path.resolve(repo_a.path()), &content).unwrap();

	let engine_a = engine(&relay, &index_a, "alice", ConflictStrategy::NewerWins);
	engine_a.sync_path(&path, repo_a.path(), AccessPolicy::full()).await.unwrap();

	let engine_b = engine(&relay, &index_b, "bob", ConflictStrategy::NewerWins);
	engine_b.sync_path(&path, repo_b.path(), AccessPolicy::full()).await.unwrap();

	let pulled = std::fs::read(path.resolve(repo_b.path())).unwrap();
	assert_eq!(pulled, content);
}

/// P3: repeated pushes of distinct content from one client strictly
/// increment the placeholder version.
#[tokio::test]
async fn p3_versions_increase_monotonically() {
	let relay = MemoryRelay::new();
	let index = open_index();
	let repo = TempDir::new().unwrap();
	let path = LogicalPath::new("log.txt").unwrap();
	let eng = engine(&relay, &index, "alice", ConflictStrategy::NewerWins);

	let mut versions = Vec::new();
	for i in 0..4 {
		std::fs::write(path.resolve(repo.path()), format!("revision {}", i)).unwrap();
		match eng.sync_path(&path, repo.path(), AccessPolicy::full()).await.unwrap() {
			SyncOutcome::Pushed { version } => versions.push(version),
			other => panic!("expected a push, got {:?}", other),
		}
	}

	assert_eq!(versions, vec![1, 2, 3, 4]);
}

/// P4: re-syncing a path whose content has not changed since the last push
/// is a no-op, not a new placeholder version.
#[tokio::test]
async fn p4_unmodified_resync_is_idempotent() {
	let relay = MemoryRelay::new();
	let index = open_index();
	let repo = TempDir::new().unwrap();
	let path = LogicalPath::new("steady.txt").unwrap();
	std::fs::write(path.resolve(repo.path()), b"never changes").unwrap();

	let eng = engine(&relay, &index, "alice", ConflictStrategy::NewerWins);
	let first = eng.sync_path(&path, repo.path(), AccessPolicy::full()).await.unwrap();
	assert!(matches!(first, SyncOutcome::Pushed { version: 1 }));

	for _ in 0..3 {
		let outcome = eng.sync_path(&path, repo.path(), AccessPolicy::full()).await.unwrap();
		assert_eq!(outcome, SyncOutcome::Skipped);
	}
}

/// P5: a deletion on one client eventually removes the file everywhere it
/// was previously synced, and the path stays converged (absent/skip) for a
/// client that observes the tombstone after the fact.
#[tokio::test]
async fn p5_deletion_propagates_and_stays_converged() {
	let relay = MemoryRelay::new();
	let index_a = open_index();
	let index_b = open_index();
	let repo_a = TempDir::new().unwrap();
	let repo_b = TempDir::new().unwrap();
	let path = LogicalPath::new("ephemeral.txt").unwrap();

	std::fs::write(path.resolve(repo_a.path()), b"short lived").unwrap();
	let engine_a = engine(&relay, &index_a, "alice", ConflictStrategy::NewerWins);
	engine_a.sync_path(&path, repo_a.path(), AccessPolicy::full()).await.unwrap();

	let engine_b = engine(&relay, &index_b, "bob", ConflictStrategy::NewerWins);
	engine_b.sync_path(&path, repo_b.path(), AccessPolicy::full()).await.unwrap();
	assert!(path.resolve(repo_b.path()).exists());

	std::fs::remove_file(path.resolve(repo_a.path())).unwrap();
	let outcome = engine_a.sync_path(&path, repo_a.path(), AccessPolicy::full()).await.unwrap();
	assert!(matches!(outcome, SyncOutcome::Pushed { .. }));

	let outcome = engine_b.sync_path(&path, repo_b.path(), AccessPolicy::full()).await.unwrap();
	assert_eq!(outcome, SyncOutcome::DeletedLocally);
	assert!(!path.resolve(repo_b.path()).exists());

	// Re-scanning afterward is stable: both sides are absent, the tombstone
	// is already consumed, nothing further happens.
	let outcome = engine_b.sync_path(&path, repo_b.path(), AccessPolicy::full()).await.unwrap();
	assert_eq!(outcome, SyncOutcome::Skipped);
}

/// P6: the repository's fixed conflict strategy governs every conflict,
/// exercised for `NewerWins` (both directions) and `Reject`.
#[tokio::test]
async fn p6_conflict_strategy_is_honored() {
	// NewerWins: an old remote placeholder loses to a freshly written local
	// file (whose real mtime is always far later than a hardcoded old
	// timestamp).
	{
		let relay = MemoryRelay::new();
		let index = open_index();
		let repo = TempDir::new().unwrap();
		let path = LogicalPath::new("doc.txt").unwrap();
		std::fs::write(path.resolve(repo.path()), b"local edit").unwrap();

		let remote_payload = escale::framing::frame(b"remote edit", None, false).unwrap();
		relay.put("doc.txt", &remote_payload).await.unwrap();
		let placeholder = escale::placeholder::Placeholder::new(
			Pseudonym::new("carol"),
			1,
			escale::framing::plaintext_digest(b"remote edit"),
			"100".to_string(),
		);
		relay.put("doc.txt.placeholder", &placeholder.serialize()).await.unwrap();

		let eng = engine(&relay, &index, "alice", ConflictStrategy::NewerWins);
		let outcome = eng.sync_path(&path, repo.path(), AccessPolicy::full()).await.unwrap();
		assert!(matches!(outcome, SyncOutcome::Pushed { .. }));
		assert_eq!(std::fs::read(path.resolve(repo.path())).unwrap(), b"local edit");
	}

	// NewerWins: a remote placeholder stamped far in the future beats the
	// local edit; the loser is preserved as a sidecar, not discarded.
	{
		let relay = MemoryRelay::new();
		let index = open_index();
		let repo = TempDir::new().unwrap();
		let path = LogicalPath::new("doc.txt").unwrap();
		std::fs::write(path.resolve(repo.path()), b"local edit").unwrap();

		let remote_payload = escale::framing::frame(b"remote edit", None, false).unwrap();
		relay.put("doc.txt", &remote_payload).await.unwrap();
		let placeholder = escale::placeholder::Placeholder::new(
			Pseudonym::new("carol"),
			1,
			escale::framing::plaintext_digest(b"remote edit"),
			"9999999999".to_string(),
		);
		relay.put("doc.txt.placeholder", &placeholder.serialize()).await.unwrap();

		let eng = engine(&relay, &index, "alice", ConflictStrategy::NewerWins);
		let outcome = eng.sync_path(&path, repo.path(), AccessPolicy::full()).await.unwrap();
		assert!(matches!(outcome, SyncOutcome::ConflictSidecar { .. }));
		assert_eq!(std::fs::read(path.resolve(repo.path())).unwrap(), b"remote edit");
		let sidecars: Vec<_> = std::fs::read_dir(repo.path())
			.unwrap()
			.filter_map(|e| e.ok())
			.filter(|e| e.file_name().to_string_lossy().contains("conflict"))
			.collect();
		assert_eq!(sidecars.len(), 1);
	}

	// Reject: neither side is touched, the caller sees an error.
	{
		let relay = MemoryRelay::new();
		let index = open_index();
		let repo = TempDir::new().unwrap();
		let path = LogicalPath::new("doc.txt").unwrap();
		std::fs::write(path.resolve(repo.path()), b"local edit").unwrap();

		let remote_payload = escale::framing::frame(b"remote edit", None, false).unwrap();
		relay.put("doc.txt", &remote_payload).await.unwrap();
		let placeholder = escale::placeholder::Placeholder::new(
			Pseudonym::new("carol"),
			1,
			escale::framing::plaintext_digest(b"remote edit"),
			"100".to_string(),
		);
		relay.put("doc.txt.placeholder", &placeholder.serialize()).await.unwrap();

		let eng = engine(&relay, &index, "alice", ConflictStrategy::Reject);
		let result = eng.sync_path(&path, repo.path(), AccessPolicy::full()).await;
		assert!(matches!(result, Err(SyncError::Conflict(_))));
		assert_eq!(std::fs::read(path.resolve(repo.path())).unwrap(), b"local edit");
	}
}

/// P7: cancelling a scheduler mid-sleep returns `run()` promptly instead of
/// waiting out the full scan interval.
#[tokio::test]
async fn p7_cancellation_stops_the_scheduler_promptly() {
	let relay = MemoryRelay::new();
	let index = open_index();
	let repo = TempDir::new().unwrap();

	struct NullCb;
	impl escale::callback::SchedulerCallback for NullCb {
		fn on_event(&self, _event: escale::callback::SchedulerEvent) {}
	}
	let cb = NullCb;

	let eng = engine(&relay, &index, "alice", ConflictStrategy::NewerWins);
	let exclusion = escale::exclusion::ExclusionEngine::new(
		&escale::exclusion::ExcludeConfig::default(),
		repo.path(),
	)
	.unwrap();
	let sched = Scheduler::new(
		eng,
		repo.path(),
		exclusion,
		SchedulerConfig {
			scan_interval: Duration::from_secs(3600),
			scan_jitter: Duration::from_secs(1),
			backoff_initial: Duration::from_millis(10),
			backoff_max: Duration::from_secs(1),
			access: AccessPolicy::full(),
		},
		&cb,
	);

	let cancel = CancellationToken::new();
	let canceller = cancel.clone();
	let run = std::pin::pin!(sched.run(&cancel));
	let delayed_cancel = async move {
		tokio::time::sleep(Duration::from_millis(20)).await;
		canceller.cancel();
	};

	let result = tokio::time::timeout(Duration::from_secs(5), async {
		tokio::join!(run, delayed_cancel);
	})
	.await;
	assert!(result.is_ok(), "scheduler did not stop promptly after cancellation");
}

/// P8: rebuilding the index (dropping every entry, or selectively
/// revalidating against on-disk content) converges to the same state a fresh
/// scan would produce.
#[tokio::test]
async fn p8_index_rebuild_converges_like_a_fresh_scan() {
	let relay = MemoryRelay::new();
	let index = open_index();
	let repo = TempDir::new().unwrap();
	let path = LogicalPath::new("stable.txt").unwrap();
	std::fs::write(path.resolve(repo.path()), b"steady content").unwrap();

	let eng = engine(&relay, &index, "alice", ConflictStrategy::NewerWins);
	let first = eng.sync_path(&path, repo.path(), AccessPolicy::full()).await.unwrap();
	assert!(matches!(first, SyncOutcome::Pushed { version: 1 }));

	// Drop the index entirely and re-derive it from a scan: content hasn't
	// changed, so the placeholder must not churn to version 2.
	index.clear().unwrap();
	let outcome = eng.sync_path(&path, repo.path(), AccessPolicy::full()).await.unwrap();
	assert!(matches!(outcome, SyncOutcome::Pushed { version: 1 }));

	// A targeted revalidation pass drops only entries whose on-disk hash
	// disagrees with the index; untouched files survive it.
	let dropped = maintenance::reindex(&index, repo.path(), true, 1_700_000_000).await.unwrap();
	assert_eq!(dropped, 0);
	assert!(index.get("stable.txt").unwrap().is_some());

	let entry = IndexEntry { last_local_hash: Some("stale".to_string()), ..Default::default() };
	index.set("moved.txt", &entry).unwrap();
	let dropped = maintenance::reindex(&index, repo.path(), true, 1_700_000_100).await.unwrap();
	assert_eq!(dropped, 1);
	assert!(index.get("moved.txt").unwrap().is_none());
}
