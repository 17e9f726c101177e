//! The synchronization engine (C6): per-path state comparison, the §4.6
//! decision table, and the push/pull/deletion sequences that apply a
//! decision against the relay.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::conflict::{Conflict, ConflictResolutionError, ConflictResolver, VersionInfo, Winner};
use crate::error::{ConflictError, SyncError};
use crate::framing::{self, PayloadKey};
use crate::identity::Pseudonym;
use crate::index::{Index, IndexEntry};
use crate::lock::RelayLock;
use crate::naming::{Category, RelayName};
use crate::path::LogicalPath;
use crate::placeholder::Placeholder;
use crate::relay::RelayAdapter;
use crate::strategies::{AccessMode, ConflictStrategy, PlaceholderRetention};

/// What the local filesystem shows for a path relative to the index's last
/// recorded observation (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
	Absent,
	Unchanged,
	Modified,
	New,
}

/// What the relay's placeholder shows for a path relative to our own last
/// push/pull (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
	Absent,
	PresentNew,
	PresentSame,
	Consumed,
}

/// The action the decision table selects for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
	Skip,
	Pull,
	Push,
	/// Advertise a local deletion by pushing a tombstone placeholder.
	PushTombstone,
	Conflict,
}

impl std::fmt::Display for Decision {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			Decision::Skip => "skip",
			Decision::Pull => "pull",
			Decision::Push => "push",
			Decision::PushTombstone => "push-tombstone",
			Decision::Conflict => "conflict",
		};
		write!(f, "{}", s)
	}
}

/// What was actually done after applying a [`Decision`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
	Skipped,
	Pulled { version: u64 },
	Pushed { version: u64 },
	DeletedLocally,
	ConflictSidecar { path: LogicalPath },
}

/// What `scan_local_file` observed about a path on disk.
#[derive(Debug, Clone)]
struct LocalFileInfo {
	mtime: u64,
	size: u64,
	hash: String,
	contents: Vec<u8>,
}

fn scan_local_file(absolute_path: &Path) -> Result<Option<LocalFileInfo>, SyncError> {
	let contents = match std::fs::read(absolute_path) {
		Ok(bytes) => bytes,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
		Err(e) => {
			return Err(SyncError::LocalIo { path: absolute_path.display().to_string(), source: e })
		}
	};
	let metadata = std::fs::metadata(absolute_path)
		.map_err(|e| SyncError::LocalIo { path: absolute_path.display().to_string(), source: e })?;
	let mtime = metadata
		.modified()
		.ok()
		.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
		.map(|d| d.as_secs())
		.unwrap_or(0);
	let hash = framing::plaintext_digest(&contents);
	Ok(Some(LocalFileInfo { mtime, size: contents.len() as u64, hash, contents }))
}

/// Compare the local file against the index's last-known observation
/// (§4.6: "by comparing the local file's mtime+size+hash to the index").
fn compute_local_state(entry: Option<&IndexEntry>, local: Option<&LocalFileInfo>) -> LocalState {
	match (entry.and_then(|e| e.last_local_hash.as_deref()), local) {
		(_, None) => LocalState::Absent,
		(None, Some(_)) => LocalState::New,
		(Some(known_hash), Some(local)) if known_hash == local.hash => LocalState::Unchanged,
		(Some(_), Some(_)) => LocalState::Modified,
	}
}

/// Compare the relay placeholder against our own last push/pull record
/// (§4.6: "by examining the placeholder and payload presence").
fn compute_remote_state(
	entry: Option<&IndexEntry>,
	placeholder: Option<&Placeholder>,
	pseudonym: &Pseudonym,
) -> RemoteState {
	let placeholder = match placeholder {
		None => return RemoteState::Absent,
		Some(p) => p,
	};

	if placeholder.sender.is_none() {
		return RemoteState::Consumed;
	}

	let last_pushed = entry.and_then(|e| e.last_pushed_version);
	let is_our_current_version = placeholder.sender.as_ref() == Some(pseudonym)
		&& last_pushed == Some(placeholder.version);

	if is_our_current_version {
		RemoteState::PresentSame
	} else {
		RemoteState::PresentNew
	}
}

/// Whether the index shows us as the client that consumed the last pulled
/// version, entitling us to push the next one onto a consumed placeholder
/// (§4.6: "push if index says we are the owner of that version").
fn owns_consumed_version(entry: Option<&IndexEntry>, placeholder: Option<&Placeholder>) -> bool {
	match (entry.and_then(|e| e.last_pulled_version), placeholder) {
		(Some(pulled), Some(p)) => pulled == p.version,
		_ => false,
	}
}

/// The §4.6 decision table. The abridged table in the design only lists 9 of
/// the 16 cells; the remainder are filled in here by the same reasoning
/// (prefer push when we hold the only known change, conflict when both
/// sides changed, skip when nothing is actionable).
pub fn decide(
	local: LocalState,
	remote: RemoteState,
	can_read: bool,
	can_write: bool,
	owns_version: bool,
) -> Decision {
	use LocalState as L;
	use RemoteState as R;

	match (local, remote) {
		(L::Absent, R::Absent) => Decision::Skip,
		(L::Absent, R::PresentNew) => {
			if can_read {
				Decision::Pull
			} else {
				Decision::Skip
			}
		}
		(L::Absent, R::PresentSame) => {
			if can_write {
				Decision::PushTombstone
			} else {
				Decision::Skip
			}
		}
		(L::Absent, R::Consumed) => Decision::Skip,

		(L::Unchanged, R::Absent) => Decision::Skip,
		(L::Unchanged, R::PresentNew) => {
			if can_read {
				Decision::Pull
			} else {
				Decision::Skip
			}
		}
		(L::Unchanged, R::PresentSame) => Decision::Skip,
		(L::Unchanged, R::Consumed) => {
			if owns_version && can_write {
				Decision::Push
			} else {
				Decision::Skip
			}
		}

		(L::Modified, R::Absent) => {
			if can_write {
				Decision::Push
			} else {
				Decision::Skip
			}
		}
		(L::Modified, R::PresentNew) => Decision::Conflict,
		(L::Modified, R::PresentSame) => {
			if can_write {
				Decision::Push
			} else {
				Decision::Skip
			}
		}
		(L::Modified, R::Consumed) => {
			if !can_write {
				Decision::Skip
			} else if owns_version {
				Decision::Push
			} else {
				Decision::Conflict
			}
		}

		(L::New, R::Absent) => {
			if can_write {
				Decision::Push
			} else {
				Decision::Skip
			}
		}
		(L::New, R::PresentNew) => Decision::Conflict,
		(L::New, R::PresentSame) => {
			if can_write {
				Decision::Push
			} else {
				Decision::Skip
			}
		}
		(L::New, R::Consumed) => {
			if can_write {
				Decision::Push
			} else {
				Decision::Skip
			}
		}
	}
}

fn now_secs() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn timestamp_str() -> String {
	now_secs().to_string()
}

/// Ties together every per-path primitive (naming, lock, framing,
/// placeholder, index, conflict resolution) into the push/pull/tombstone
/// sequences from §4.6.
pub struct Engine<'a, A: RelayAdapter> {
	pub relay: &'a A,
	pub index: &'a Index,
	pub pseudonym: Pseudonym,
	pub key: Option<PayloadKey>,
	pub compress: bool,
	pub retention: PlaceholderRetention,
	pub resolver: ConflictResolver,
	pub lock_ttl_secs: u64,
	pub lock_settle: Duration,
	pub max_name_len: usize,
}

impl<'a, A: RelayAdapter> Engine<'a, A> {
	async fn read_placeholder(&self, path: &LogicalPath) -> Result<Option<Placeholder>, SyncError> {
		let name = RelayName::new(path, Category::Placeholder, self.max_name_len);
		if !self.relay.exists(name.as_str()).await? {
			return Ok(None);
		}
		let body = self.relay.get(name.as_str()).await?;
		Ok(Some(Placeholder::parse(&body)?))
	}

	/// Fetch a path's payload blob, decrypt/decompress it, and verify its
	/// digest against `placeholder.digest` before returning the plaintext.
	async fn fetch_verified_payload(
		&self,
		path: &LogicalPath,
		placeholder: &Placeholder,
	) -> Result<Vec<u8>, SyncError> {
		let payload_name = RelayName::new(path, Category::Payload, self.max_name_len);
		let framed = self.relay.get(payload_name.as_str()).await?;
		let plaintext = framing::unframe(&framed, self.key.as_ref())?;

		let digest = framing::plaintext_digest(&plaintext);
		let expected = placeholder.digest.clone().unwrap_or_default();
		if digest != expected {
			return Err(SyncError::Integrity {
				path: path.to_string(),
				message: format!("expected digest {}, got {}", expected, digest),
			});
		}
		Ok(plaintext)
	}

	async fn acquire_lock(&self, path: &LogicalPath) -> Result<RelayLock, SyncError> {
		RelayLock::acquire(
			self.relay,
			path,
			&self.pseudonym,
			self.lock_ttl_secs,
			self.lock_settle,
			self.max_name_len,
		)
		.await
	}

	/// Determine and apply the decision for a single path (§4.6 end to end).
	pub async fn sync_path(
		&self,
		path: &LogicalPath,
		repo_root: &Path,
		access: crate::strategies::AccessPolicy,
	) -> Result<SyncOutcome, SyncError> {
		let absolute = path.resolve(repo_root);
		let local = scan_local_file(&absolute)?;
		let entry = self.index.get(path.as_str())?;
		let placeholder = self.read_placeholder(path).await?;

		let local_state = compute_local_state(entry.as_ref(), local.as_ref());
		let remote_state = compute_remote_state(entry.as_ref(), placeholder.as_ref(), &self.pseudonym);
		let owns_version = owns_consumed_version(entry.as_ref(), placeholder.as_ref());

		let can_read = matches!(access.read, AccessMode::Allowed);
		let can_write = matches!(access.write, AccessMode::Allowed);

		let decision = decide(local_state, remote_state, can_read, can_write, owns_version);

		match decision {
			Decision::Skip => Ok(SyncOutcome::Skipped),
			Decision::Pull => self.pull(path, &absolute, entry, placeholder).await,
			Decision::Push => self.push(path, &absolute, entry, placeholder, local).await,
			Decision::PushTombstone => self.push_tombstone(path, entry, placeholder).await,
			Decision::Conflict => {
				self.resolve_conflict(path, &absolute, entry, placeholder, local).await
			}
		}
	}

	/// Push sequence (§4.6): digest idempotence check, frame-and-install
	/// payload, write placeholder, release lock, update index.
	async fn push(
		&self,
		path: &LogicalPath,
		absolute: &Path,
		entry: Option<IndexEntry>,
		placeholder: Option<Placeholder>,
		local: Option<LocalFileInfo>,
	) -> Result<SyncOutcome, SyncError> {
		let local = local.ok_or_else(|| SyncError::LocalIo {
			path: absolute.display().to_string(),
			source: std::io::Error::new(std::io::ErrorKind::NotFound, "file vanished before push"),
		})?;

		if let Some(ref ph) = placeholder {
			if ph.digest.as_deref() == Some(local.hash.as_str()) {
				return Ok(SyncOutcome::Skipped);
			}
		}

		let lock = self.acquire_lock(path).await?;

		// The adapter's `put` is itself atomic with respect to concurrent
		// readers (§4.1), so installing the payload is a single call; no
		// engine-level temp blob is needed on top of that.
		let framed = framing::frame(&local.contents, self.key.as_ref(), self.compress)?;
		let payload_name = RelayName::new(path, Category::Payload, self.max_name_len);
		self.relay.put(payload_name.as_str(), &framed).await?;

		let next_version = placeholder.as_ref().map(|p| p.version + 1).unwrap_or(1);
		let new_placeholder =
			Placeholder::new(self.pseudonym.clone(), next_version, local.hash.clone(), timestamp_str());
		let placeholder_name = RelayName::new(path, Category::Placeholder, self.max_name_len);
		self.relay.put(placeholder_name.as_str(), &new_placeholder.serialize()).await?;

		lock.release(self.relay).await?;

		let mut new_entry = entry.unwrap_or_default();
		new_entry.last_local_mtime = Some(local.mtime);
		new_entry.last_local_hash = Some(local.hash);
		new_entry.last_pushed_version = Some(next_version);
		self.index.set(path.as_str(), &new_entry)?;

		Ok(SyncOutcome::Pushed { version: next_version })
	}

	/// Advertise a local deletion with a tombstone placeholder (§4.6:
	/// "Deletion propagation").
	async fn push_tombstone(
		&self,
		path: &LogicalPath,
		entry: Option<IndexEntry>,
		placeholder: Option<Placeholder>,
	) -> Result<SyncOutcome, SyncError> {
		let lock = self.acquire_lock(path).await?;

		let next_version = placeholder.as_ref().map(|p| p.version + 1).unwrap_or(1);
		let tombstone = Placeholder::tombstone(self.pseudonym.clone(), next_version, timestamp_str());
		let placeholder_name = RelayName::new(path, Category::Placeholder, self.max_name_len);
		self.relay.put(placeholder_name.as_str(), &tombstone.serialize()).await?;

		let payload_name = RelayName::new(path, Category::Payload, self.max_name_len);
		self.relay.delete(payload_name.as_str()).await?;

		lock.release(self.relay).await?;

		let mut new_entry = entry.unwrap_or_default();
		new_entry.last_local_mtime = None;
		new_entry.last_local_hash = None;
		new_entry.last_pushed_version = Some(next_version);
		self.index.set(path.as_str(), &new_entry)?;

		Ok(SyncOutcome::Pushed { version: next_version })
	}

	/// Pull sequence (§4.6): get-and-verify payload, write-temp-fsync-rename
	/// locally, consume the placeholder, release lock, update index.
	async fn pull(
		&self,
		path: &LogicalPath,
		absolute: &Path,
		entry: Option<IndexEntry>,
		placeholder: Option<Placeholder>,
	) -> Result<SyncOutcome, SyncError> {
		let placeholder = placeholder.ok_or(SyncError::Integrity {
			path: path.to_string(),
			message: "placeholder disappeared before pull".to_string(),
		})?;

		let lock = self.acquire_lock(path).await?;

		// A tombstone carries no payload: the other side deleted the file.
		if placeholder.is_tombstone() {
			let locally_unchanged = entry
				.as_ref()
				.and_then(|e| e.last_pulled_hash.as_deref())
				== entry.as_ref().and_then(|e| e.last_local_hash.as_deref());
			if !locally_unchanged {
				lock.release(self.relay).await?;
				return Err(SyncError::Conflict(ConflictError::StrategyFailed {
					message: format!("{}: deleted remotely but modified locally", path),
				}));
			}

			let _ = std::fs::remove_file(absolute);
			self.finish_pull(path, entry, &placeholder).await?;
			lock.release(self.relay).await?;
			return Ok(SyncOutcome::DeletedLocally);
		}

		let plaintext = self.fetch_verified_payload(path, &placeholder).await?;

		if let Some(parent) = absolute.parent() {
			std::fs::create_dir_all(parent)
				.map_err(|e| SyncError::LocalIo { path: path.to_string(), source: e })?;
		}
		let mut tmp_name = absolute.as_os_str().to_os_string();
		tmp_name.push(format!(".tmp.{}", uuid::Uuid::new_v4()));
		let tmp_path = std::path::PathBuf::from(tmp_name);
		{
			use std::io::Write;
			let mut file = std::fs::File::create(&tmp_path)
				.map_err(|e| SyncError::LocalIo { path: path.to_string(), source: e })?;
			file.write_all(&plaintext)
				.map_err(|e| SyncError::LocalIo { path: path.to_string(), source: e })?;
			file.sync_all().map_err(|e| SyncError::LocalIo { path: path.to_string(), source: e })?;
		}
		std::fs::rename(&tmp_path, absolute)
			.map_err(|e| SyncError::LocalIo { path: path.to_string(), source: e })?;

		self.finish_pull(path, entry, &placeholder).await?;
		lock.release(self.relay).await?;

		Ok(SyncOutcome::Pulled { version: placeholder.version })
	}

	async fn finish_pull(
		&self,
		path: &LogicalPath,
		entry: Option<IndexEntry>,
		placeholder: &Placeholder,
	) -> Result<(), SyncError> {
		let placeholder_name = RelayName::new(path, Category::Placeholder, self.max_name_len);
		let payload_name = RelayName::new(path, Category::Payload, self.max_name_len);

		match self.retention {
			PlaceholderRetention::OneShot => {
				self.relay.delete(placeholder_name.as_str()).await?;
				self.relay.delete(payload_name.as_str()).await?;
			}
			PlaceholderRetention::RetainHistory => {
				let consumed = Placeholder::consumed(
					placeholder.version,
					placeholder.digest.clone().unwrap_or_default(),
					timestamp_str(),
				);
				self.relay.put(placeholder_name.as_str(), &consumed.serialize()).await?;
				// A consumed placeholder (sender=None) must have no payload blob
				// behind it (I2); only the placeholder itself is retained as history.
				self.relay.delete(payload_name.as_str()).await?;
			}
		}

		let mut new_entry = entry.unwrap_or_default();
		new_entry.last_pulled_version = Some(placeholder.version);
		new_entry.last_pulled_hash = placeholder.digest.clone();
		new_entry.last_local_hash = placeholder.digest.clone();
		self.index.set(path.as_str(), &new_entry)?;
		Ok(())
	}

	/// Apply the repository's fixed [`ConflictStrategy`] to a two-sided
	/// conflict (§4.6).
	async fn resolve_conflict(
		&self,
		path: &LogicalPath,
		absolute: &Path,
		entry: Option<IndexEntry>,
		placeholder: Option<Placeholder>,
		local: Option<LocalFileInfo>,
	) -> Result<SyncOutcome, SyncError> {
		let local = local.ok_or_else(|| SyncError::Integrity {
			path: path.to_string(),
			message: "conflict decided but local file vanished".to_string(),
		})?;
		let placeholder = placeholder.ok_or_else(|| SyncError::Integrity {
			path: path.to_string(),
			message: "conflict decided but placeholder vanished".to_string(),
		})?;

		let local_version = VersionInfo {
			mtime: local.mtime,
			size: local.size,
			digest: local.hash.clone(),
		};
		let remote_version = VersionInfo {
			mtime: placeholder_mtime(&placeholder),
			size: 0,
			digest: placeholder.digest.clone().unwrap_or_default(),
		};
		let conflict = Conflict::new(path.clone(), local_version, remote_version);

		match self.resolver.resolve(&conflict) {
			Ok(Winner::Local) => {
				self.push(path, absolute, entry, Some(placeholder), Some(local)).await
			}
			Ok(Winner::Remote) if self.resolver.strategy() == ConflictStrategy::PullFirst => {
				// Pull-first always prefers the remote, but the local file is
				// preserved on disk; only the pulled remote lands in the sidecar.
				let remote_contents = self.fetch_verified_payload(path, &placeholder).await?;
				let sidecar_name = format!(
					"{}.conflict-{}-{}",
					path.as_str(),
					now_secs(),
					self.pseudonym.as_str()
				);
				if let Some(parent) = absolute.parent() {
					let _ = std::fs::create_dir_all(parent);
				}
				std::fs::write(absolute.with_file_name(sidecar_name.clone()), &remote_contents)
					.map_err(|e| SyncError::LocalIo { path: path.to_string(), source: e })?;
				Ok(SyncOutcome::ConflictSidecar { path: path.clone() })
			}
			Ok(Winner::Remote) => {
				let sidecar_name = format!(
					"{}.conflict-{}-{}",
					path.as_str(),
					now_secs(),
					self.pseudonym.as_str()
				);
				if let Some(parent) = absolute.parent() {
					let _ = std::fs::create_dir_all(parent);
				}
				std::fs::write(absolute.with_file_name(sidecar_name.clone()), &local.contents)
					.map_err(|e| SyncError::LocalIo { path: path.to_string(), source: e })?;
				self.pull(path, absolute, entry, Some(placeholder)).await?;
				Ok(SyncOutcome::ConflictSidecar { path: path.clone() })
			}
			Err(ConflictResolutionError::Rejected) => {
				Err(SyncError::Conflict(ConflictError::Rejected { path: path.to_string() }))
			}
		}
	}
}

fn placeholder_mtime(placeholder: &Placeholder) -> u64 {
	placeholder.timestamp.parse().unwrap_or(0)
}


// vim: ts=4
