//! The relay adapter contract (C1) — a uniform capability interface over an
//! arbitrary blob store, modeled as a trait rather than an inheritance
//! hierarchy per the design notes (§9).

pub mod local;
pub mod memory;

use async_trait::async_trait;

use crate::error::RelayError;

/// One entry returned from a `list` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEntry {
	pub name: String,
	pub size: u64,
	pub mtime: Option<u64>,
}

/// Uniform operations over a relay backend. All operations are fallible with
/// explicit error kinds (`RelayError::Transient`/`Permanent`); implementors
/// are responsible for emulating atomic `put` (via put-then-rename of a
/// `.tmp.<nonce>` name) if the backend lacks it natively.
#[async_trait]
pub trait RelayAdapter: Send + Sync {
	/// List every blob whose name starts with `prefix`.
	async fn list(&self, prefix: &str) -> Result<Vec<RelayEntry>, RelayError>;

	async fn get(&self, name: &str) -> Result<Vec<u8>, RelayError>;

	/// Store `data` under `name`, atomically with respect to concurrent
	/// `list`/`get` callers: the name must never be observable with partial
	/// content.
	async fn put(&self, name: &str, data: &[u8]) -> Result<(), RelayError>;

	/// Idempotent: deleting a name that does not exist is not an error.
	async fn delete(&self, name: &str) -> Result<(), RelayError>;

	async fn exists(&self, name: &str) -> Result<bool, RelayError>;

	async fn size(&self, name: &str) -> Result<u64, RelayError>;

	/// Unix timestamp in seconds, if the backend tracks it.
	async fn mtime(&self, name: &str) -> Result<Option<u64>, RelayError>;

	/// Update mtime without rewriting content, if supported; otherwise
	/// falls back to re-putting the existing bytes.
	async fn touch(&self, name: &str) -> Result<(), RelayError> {
		let data = self.get(name).await?;
		self.put(name, &data).await
	}
}


// vim: ts=4
