//! The relay lock protocol (C3): best-effort mutual exclusion over a path,
//! implemented as nonce-confirm plus a settling interval (§4.3). This is a
//! liveness mechanism, not a safety one (§9) — the sync engine must still
//! detect and recover from races.

use std::time::Duration;

use tokio::time::sleep;
use uuid::Uuid;

use crate::error::SyncError;
use crate::identity::Pseudonym;
use crate::naming::{Category, RelayName};
use crate::path::LogicalPath;
use crate::relay::RelayAdapter;
use crate::validation::is_within_ttl;

/// A lock held for the lifetime of this value; release it with
/// [`RelayLock::release`], or rely on a best-effort release via `Drop`
/// logging a warning if it was not released explicitly (the async `delete`
/// cannot run from a synchronous `Drop`).
pub struct RelayLock {
	name: String,
	released: bool,
}

impl RelayLock {
	/// Attempt to acquire the lock for `path` on behalf of `holder`. Follows
	/// the four-step sequence from §4.3 exactly: check-stale, put-nonce,
	/// settle, confirm.
	pub async fn acquire<A: RelayAdapter>(
		adapter: &A,
		path: &LogicalPath,
		holder: &Pseudonym,
		ttl_secs: u64,
		settle: Duration,
		max_name_len: usize,
	) -> Result<Self, SyncError> {
		let name = RelayName::new(path, Category::Lock, max_name_len).as_str().to_string();

		if adapter.exists(&name).await? {
			if let Some(mtime) = adapter.mtime(&name).await? {
				if is_within_ttl(mtime, ttl_secs) {
					let body = adapter.get(&name).await?;
					let current_holder = String::from_utf8_lossy(&body);
					if current_holder.lines().next() != Some(holder.as_str()) {
						return Err(SyncError::Busy { path: path.to_string() });
					}
				}
			}
			// stale or our own: fall through and reclaim
		}

		let nonce = Uuid::new_v4().to_string();
		let body = format!("{}\n{}\n", holder.as_str(), nonce);
		adapter.put(&name, body.as_bytes()).await?;

		sleep(settle).await;

		let confirmed = adapter.get(&name).await?;
		let confirmed = String::from_utf8_lossy(&confirmed);
		let won = confirmed.lines().nth(1) == Some(nonce.as_str());

		if !won {
			return Err(SyncError::Busy { path: path.to_string() });
		}

		Ok(RelayLock { name, released: false })
	}

	pub async fn release<A: RelayAdapter>(mut self, adapter: &A) -> Result<(), SyncError> {
		adapter.delete(&self.name).await?;
		self.released = true;
		Ok(())
	}
}

impl Drop for RelayLock {
	fn drop(&mut self) {
		if !self.released {
			tracing::warn!(lock = %self.name, "relay lock dropped without explicit release");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::relay::memory::MemoryRelay;

	fn path(s: &str) -> LogicalPath {
		LogicalPath::new(s).unwrap()
	}

	#[tokio::test]
	async fn test_acquire_and_release() {
		let relay = MemoryRelay::new();
		let p = path("a.txt");
		let lock = RelayLock::acquire(&relay, &p, &Pseudonym::new("alice"), 300, Duration::ZERO, 255)
			.await
			.unwrap();
		lock.release(&relay).await.unwrap();
		assert!(!relay.exists("a.txt.lock").await.unwrap());
	}

	#[tokio::test]
	async fn test_second_holder_is_busy() {
		let relay = MemoryRelay::new();
		let p = path("a.txt");
		let _lock =
			RelayLock::acquire(&relay, &p, &Pseudonym::new("alice"), 300, Duration::ZERO, 255)
				.await
				.unwrap();
		let result =
			RelayLock::acquire(&relay, &p, &Pseudonym::new("bob"), 300, Duration::ZERO, 255).await;
		assert!(matches!(result, Err(SyncError::Busy { .. })));
	}

	#[tokio::test]
	async fn test_stale_lock_is_reclaimed() {
		let relay = MemoryRelay::new();
		let p = path("a.txt");
		let _lock =
			RelayLock::acquire(&relay, &p, &Pseudonym::new("alice"), 300, Duration::ZERO, 255)
				.await
				.unwrap();
		relay.backdate("a.txt.lock", 10_000);
		let lock =
			RelayLock::acquire(&relay, &p, &Pseudonym::new("bob"), 300, Duration::ZERO, 255).await;
		assert!(lock.is_ok());
	}
}

// vim: ts=4
