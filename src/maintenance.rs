//! Maintenance operations (C8): schema migration, backup/restore of the
//! relay's blob namespace, gated-access request/grant signalling, and
//! passphrase rotation (§4.8).

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use crate::error::SyncError;
use crate::framing::{self, PayloadKey};
use crate::identity::Pseudonym;
use crate::index::Index;
use crate::lock::RelayLock;
use crate::message::{Message, MessageKind};
use crate::naming::{strip_category_suffix, Category, RelayName};
use crate::path::LogicalPath;
use crate::relay::RelayAdapter;
use crate::strategies::AccessPolicy;

/// How a relay-to-relay [`migrate`] handles in-flight clients (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateMode {
	/// Assume no client is active against the source relay; copy blobs
	/// without taking any locks.
	Fast,
	/// Acquire each distinct path's lock on the source relay before copying
	/// its blobs, so a client mid-push or mid-pull is not raced.
	Safe,
}

/// Copy every blob from `source` to `dest`, preserving names (§4.8
/// "Migrate"). The `RelayAdapter` contract has no operation to set an
/// arbitrary mtime, so the destination's mtime for each blob is whatever
/// its own `put` assigns — on `LocalRelay` that is wall-clock time of the
/// copy, which is adequate since mtime is only ever compared relatively
/// against index/placeholder timestamps produced after the migration. In
/// `safe` mode, every distinct logical path present on the source is
/// locked before any of its blobs are copied, and released once the whole
/// migration completes; `fast` mode skips the lock dance entirely.
pub async fn migrate<S: RelayAdapter, D: RelayAdapter>(
	source: &S,
	dest: &D,
	mode: MigrateMode,
	holder: &Pseudonym,
	lock_ttl_secs: u64,
	lock_settle: Duration,
	max_name_len: usize,
) -> Result<usize, SyncError> {
	let entries = source.list("").await?;

	let mut held_locks = Vec::new();
	if mode == MigrateMode::Safe {
		let mut locked_paths = std::collections::HashSet::new();
		for entry in &entries {
			let Some(logical) = strip_category_suffix(&entry.name) else { continue };
			let Ok(path) = LogicalPath::new(logical) else { continue };
			if locked_paths.insert(path.clone()) {
				held_locks
					.push(RelayLock::acquire(source, &path, holder, lock_ttl_secs, lock_settle, max_name_len).await?);
			}
		}
	}

	let mut migrated = 0usize;
	for entry in &entries {
		let data = source.get(&entry.name).await?;
		dest.put(&entry.name, &data).await?;
		migrated += 1;
	}

	for lock in held_locks {
		lock.release(source).await?;
	}

	Ok(migrated)
}

/// Re-validate a repository's local index against the files actually on
/// disk, dropping any entry whose hash no longer matches so the next scan
/// re-derives it from scratch (§8 P8: an index rebuild converges to the
/// same state as a fresh scan). `revalidate = false` just records the scan
/// timestamp without touching any entry.
pub async fn reindex(
	index: &Index,
	repo_root: &Path,
	revalidate: bool,
	at_secs: u64,
) -> Result<usize, SyncError> {
	let mut dropped = 0usize;

	if revalidate {
		for logical in index.all_paths()? {
			let path = match LogicalPath::new(&logical) {
				Ok(p) => p,
				Err(_) => continue,
			};
			let absolute = path.resolve(repo_root);
			let Some(entry) = index.get(&logical)? else { continue };

			let on_disk_hash = std::fs::read(&absolute).ok().map(|bytes| framing::plaintext_digest(&bytes));
			if on_disk_hash != entry.last_local_hash {
				index.remove(&logical)?;
				dropped += 1;
			}
		}
	}

	index.record_full_scan(at_secs)?;
	Ok(dropped)
}

/// Archive every blob currently on the relay into a tar stream, optionally
/// zstd-compressed (the corpus carries `zstd`, not `flate2`/gzip, so the
/// archive's second layer follows the payload codec already in use).
pub async fn backup<A: RelayAdapter>(
	relay: &A,
	dest: &Path,
	compress: bool,
) -> Result<usize, SyncError> {
	let entries = relay.list("").await?;
	let mut builder = tar::Builder::new(Vec::new());

	for entry in &entries {
		let data = relay.get(&entry.name).await?;
		let mut header = tar::Header::new_gnu();
		header.set_size(data.len() as u64);
		header.set_mode(0o644);
		header.set_mtime(entry.mtime.unwrap_or(0));
		header.set_cksum();
		builder
			.append_data(&mut header, &entry.name, data.as_slice())
			.map_err(|e| local_io(dest, e))?;
	}

	let archive_bytes = builder.into_inner().map_err(|e| local_io(dest, e))?;
	let final_bytes = if compress {
		zstd::encode_all(archive_bytes.as_slice(), 0)
			.map_err(|e| SyncError::Other { message: format!("backup compression failed: {}", e) })?
	} else {
		archive_bytes
	};

	std::fs::write(dest, &final_bytes).map_err(|e| local_io(dest, e))?;
	Ok(entries.len())
}

/// Restore every blob from a backup archive written by [`backup`] back onto
/// the relay, overwriting whatever is currently there.
pub async fn restore<A: RelayAdapter>(
	relay: &A,
	src: &Path,
	compressed: bool,
) -> Result<usize, SyncError> {
	let raw = std::fs::read(src).map_err(|e| local_io(src, e))?;
	let archive_bytes = if compressed {
		zstd::decode_all(raw.as_slice())
			.map_err(|e| SyncError::Other { message: format!("restore decompression failed: {}", e) })?
	} else {
		raw
	};

	let mut archive = tar::Archive::new(archive_bytes.as_slice());
	let mut restored = 0usize;
	for file in archive.entries().map_err(|e| local_io(src, e))? {
		let mut file = file.map_err(|e| local_io(src, e))?;
		let name = file.path().map_err(|e| local_io(src, e))?.to_string_lossy().into_owned();
		let mut data = Vec::new();
		file.read_to_end(&mut data).map_err(|e| local_io(src, e))?;
		relay.put(&name, &data).await?;
		restored += 1;
	}
	Ok(restored)
}

fn local_io(path: &Path, source: std::io::Error) -> SyncError {
	SyncError::LocalIo { path: path.display().to_string(), source }
}

/// Post an access request for a gated (`r?`/`w?`) path, addressed to the
/// path's current owner (§4.3 message protocol, §9 open question).
pub async fn request_access<A: RelayAdapter>(
	relay: &A,
	path: &LogicalPath,
	requester: &Pseudonym,
	owner: &Pseudonym,
	max_name_len: usize,
) -> Result<(), SyncError> {
	let message = Message::new(requester, MessageKind::AccessRequest);
	let name = Message::relay_name(path, owner, max_name_len);
	relay.put(name.as_str(), &message.serialize()?).await?;
	Ok(())
}

/// Grant a previously requested access, as the path's owner.
pub async fn grant_access<A: RelayAdapter>(
	relay: &A,
	path: &LogicalPath,
	owner: &Pseudonym,
	requester: &Pseudonym,
	max_name_len: usize,
) -> Result<(), SyncError> {
	let message = Message::new(owner, MessageKind::AccessGrant);
	let name = Message::relay_name(path, requester, max_name_len);
	relay.put(name.as_str(), &message.serialize()?).await?;
	Ok(())
}

/// Whether `requester` currently holds a valid grant for a gated path: a
/// grant message addressed to them exists and is younger than the current
/// placeholder (§9: resolves the "what makes a grant valid" open question).
pub async fn has_valid_grant<A: RelayAdapter>(
	relay: &A,
	path: &LogicalPath,
	requester: &Pseudonym,
	max_name_len: usize,
) -> Result<bool, SyncError> {
	let message_name = Message::relay_name(path, requester, max_name_len);
	if !relay.exists(message_name.as_str()).await? {
		return Ok(false);
	}

	let body = relay.get(message_name.as_str()).await?;
	let message = Message::parse(&body)?;
	if message.kind != MessageKind::AccessGrant {
		return Ok(false);
	}

	let placeholder_name = RelayName::new(path, Category::Placeholder, max_name_len);
	let grant_mtime = relay.mtime(message_name.as_str()).await?.unwrap_or(0);
	let placeholder_mtime = relay.mtime(placeholder_name.as_str()).await?.unwrap_or(0);
	Ok(grant_mtime >= placeholder_mtime)
}

/// Broadcast an access-policy change to a known set of peers.
pub async fn advertise_access_change<A: RelayAdapter>(
	relay: &A,
	path: &LogicalPath,
	owner: &Pseudonym,
	new_policy: AccessPolicy,
	peers: &[Pseudonym],
	max_name_len: usize,
) -> Result<(), SyncError> {
	let message =
		Message::new(owner, MessageKind::AccessChanged { policy: new_policy.to_string_pair() });
	let body = message.serialize()?;
	for peer in peers {
		let name = Message::relay_name(path, peer, max_name_len);
		relay.put(name.as_str(), &body).await?;
	}
	Ok(())
}

/// Re-encrypt every payload under a new key without changing its plaintext
/// digest or placeholder version (§4.4: passphrase rotation).
pub async fn rotate_passphrase<A: RelayAdapter>(
	relay: &A,
	paths: &[LogicalPath],
	old_key: Option<&PayloadKey>,
	new_key: &PayloadKey,
	compress: bool,
	max_name_len: usize,
) -> Result<usize, SyncError> {
	let mut rotated = 0usize;
	for path in paths {
		let payload_name = RelayName::new(path, Category::Payload, max_name_len);
		if !relay.exists(payload_name.as_str()).await? {
			continue;
		}

		let framed = relay.get(payload_name.as_str()).await?;
		let plaintext = framing::unframe(&framed, old_key)?;
		let expected_digest = framing::plaintext_digest(&plaintext);

		let placeholder_name = RelayName::new(path, Category::Placeholder, max_name_len);
		if relay.exists(placeholder_name.as_str()).await? {
			let body = relay.get(placeholder_name.as_str()).await?;
			let placeholder = crate::placeholder::Placeholder::parse(&body)?;
			if placeholder.digest.as_deref() != Some(expected_digest.as_str()) {
				return Err(SyncError::Integrity {
					path: path.to_string(),
					message: "digest changed during passphrase rotation".to_string(),
				});
			}
		}

		let reframed = framing::frame(&plaintext, Some(new_key), compress)?;
		relay.put(payload_name.as_str(), &reframed).await?;
		rotated += 1;
	}
	Ok(rotated)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::relay::memory::MemoryRelay;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_backup_then_restore_roundtrip() {
		let relay = MemoryRelay::new();
		relay.put("a.txt", b"hello").await.unwrap();
		relay.put("a.txt.placeholder", b"sender=x\nversion=1\ndigest=abc\ntimestamp=1\nflags=\n")
			.await
			.unwrap();

		let dir = TempDir::new().unwrap();
		let archive_path = dir.path().join("backup.tar.zst");
		let count = backup(&relay, &archive_path, true).await.unwrap();
		assert_eq!(count, 2);

		let fresh = MemoryRelay::new();
		let restored = restore(&fresh, &archive_path, true).await.unwrap();
		assert_eq!(restored, 2);
		assert_eq!(fresh.get("a.txt").await.unwrap(), b"hello");
	}

	#[tokio::test]
	async fn test_access_request_and_grant_cycle() {
		let relay = MemoryRelay::new();
		let path = LogicalPath::new("secret.txt").unwrap();
		let owner = Pseudonym::new("alice");
		let bob = Pseudonym::new("bob");

		request_access(&relay, &path, &bob, &owner, 255).await.unwrap();
		assert!(!has_valid_grant(&relay, &path, &bob, 255).await.unwrap());

		grant_access(&relay, &path, &owner, &bob, 255).await.unwrap();
		assert!(has_valid_grant(&relay, &path, &bob, 255).await.unwrap());
	}

	#[tokio::test]
	async fn test_rotate_passphrase_preserves_plaintext() {
		let relay = MemoryRelay::new();
		let path = LogicalPath::new("doc.txt").unwrap();
		let old_key = PayloadKey::derive("old", &PayloadKey::generate_salt()).unwrap();
		let new_key = PayloadKey::derive("new", &PayloadKey::generate_salt()).unwrap();

		let plaintext = b"rotate me";
		let framed = framing::frame(plaintext, Some(&old_key), false).unwrap();
		let payload_name = RelayName::new(&path, Category::Payload, 255);
		relay.put(payload_name.as_str(), &framed).await.unwrap();

		let rotated = rotate_passphrase(&relay, &[path.clone()], Some(&old_key), &new_key, false, 255)
			.await
			.unwrap();
		assert_eq!(rotated, 1);

		let reframed = relay.get(payload_name.as_str()).await.unwrap();
		let restored = framing::unframe(&reframed, Some(&new_key)).unwrap();
		assert_eq!(restored, plaintext);
	}

	#[tokio::test]
	async fn test_reindex_drops_stale_entries_when_revalidating() {
		let tmp = TempDir::new().unwrap();
		let index = Index::open(&tmp.path().join("idx.redb")).unwrap();
		let repo = TempDir::new().unwrap();

		let mut entry = crate::index::IndexEntry::default();
		entry.last_local_hash = Some("stale-hash".to_string());
		index.set("a.txt", &entry).unwrap();
		std::fs::write(repo.path().join("a.txt"), b"actual content").unwrap();

		let dropped = reindex(&index, repo.path(), true, 1_700_000_000).await.unwrap();
		assert_eq!(dropped, 1);
		assert!(index.get("a.txt").unwrap().is_none());
	}

	#[tokio::test]
	async fn test_reindex_fast_leaves_entries_untouched() {
		let tmp = TempDir::new().unwrap();
		let index = Index::open(&tmp.path().join("idx.redb")).unwrap();
		let repo = TempDir::new().unwrap();

		let mut entry = crate::index::IndexEntry::default();
		entry.last_local_hash = Some("stale-hash".to_string());
		index.set("a.txt", &entry).unwrap();
		std::fs::write(repo.path().join("a.txt"), b"actual content").unwrap();

		let dropped = reindex(&index, repo.path(), false, 1_700_000_000).await.unwrap();
		assert_eq!(dropped, 0);
		assert!(index.get("a.txt").unwrap().is_some());
	}

	#[tokio::test]
	async fn test_migrate_fast_copies_every_blob() {
		let source = MemoryRelay::new();
		source.put("a.txt", b"hello").await.unwrap();
		source.put("a.txt.placeholder", b"sender=x\nversion=1\ndigest=abc\ntimestamp=1\nflags=\n")
			.await
			.unwrap();

		let dest = MemoryRelay::new();
		let holder = Pseudonym::new("alice");
		let migrated =
			migrate(&source, &dest, MigrateMode::Fast, &holder, 300, Duration::ZERO, 255).await.unwrap();

		assert_eq!(migrated, 2);
		assert_eq!(dest.get("a.txt").await.unwrap(), b"hello");
		assert!(dest.exists("a.txt.placeholder").await.unwrap());
	}

	#[tokio::test]
	async fn test_migrate_safe_locks_and_releases_each_path() {
		let source = MemoryRelay::new();
		source.put("a.txt", b"hello").await.unwrap();
		source.put("b.txt", b"world").await.unwrap();

		let dest = MemoryRelay::new();
		let holder = Pseudonym::new("alice");
		let migrated =
			migrate(&source, &dest, MigrateMode::Safe, &holder, 300, Duration::ZERO, 255).await.unwrap();

		assert_eq!(migrated, 2);
		assert_eq!(dest.get("b.txt").await.unwrap(), b"world");
		// Locks taken during the migration must be released afterward.
		assert!(!source.exists("a.txt.lock").await.unwrap());
		assert!(!source.exists("b.txt.lock").await.unwrap());
	}
}

// vim: ts=4
