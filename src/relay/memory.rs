//! An in-process, `Mutex`-guarded blob map used by the test suite to
//! simulate two or more clients contending for the same relay without
//! filesystem timing noise, and to inject latency/failure for property
//! tests (P1, P7).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::RelayError;
use crate::relay::{RelayAdapter, RelayEntry};

struct Blob {
	data: Vec<u8>,
	mtime: u64,
}

pub struct MemoryRelay {
	blobs: Mutex<HashMap<String, Blob>>,
	fail_next: Mutex<Option<String>>,
}

fn now() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

impl MemoryRelay {
	pub fn new() -> Self {
		Self { blobs: Mutex::new(HashMap::new()), fail_next: Mutex::new(None) }
	}

	/// Make the next operation on `name` fail with a transient error, to
	/// exercise back-off paths deterministically.
	pub fn fail_next_call_on(&self, name: &str) {
		*self.fail_next.lock().unwrap() = Some(name.to_string());
	}

	fn check_injected_failure(&self, name: &str, op: &str) -> Result<(), RelayError> {
		let mut guard = self.fail_next.lock().unwrap();
		if guard.as_deref() == Some(name) {
			*guard = None;
			return Err(RelayError::transient(op, std::io::Error::other("injected failure")));
		}
		Ok(())
	}

	/// Shift a blob's recorded mtime `secs_ago` seconds into the past, used
	/// to simulate stale locks/markers in tests without sleeping.
	pub fn backdate(&self, name: &str, secs_ago: u64) {
		if let Some(blob) = self.blobs.lock().unwrap().get_mut(name) {
			blob.mtime = blob.mtime.saturating_sub(secs_ago);
		}
	}
}

impl Default for MemoryRelay {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl RelayAdapter for MemoryRelay {
	async fn list(&self, prefix: &str) -> Result<Vec<RelayEntry>, RelayError> {
		let blobs = self.blobs.lock().unwrap();
		Ok(blobs
			.iter()
			.filter(|(name, _)| name.starts_with(prefix))
			.map(|(name, blob)| RelayEntry {
				name: name.clone(),
				size: blob.data.len() as u64,
				mtime: Some(blob.mtime),
			})
			.collect())
	}

	async fn get(&self, name: &str) -> Result<Vec<u8>, RelayError> {
		self.check_injected_failure(name, "get")?;
		let blobs = self.blobs.lock().unwrap();
		blobs.get(name).map(|b| b.data.clone()).ok_or_else(|| RelayError::NotFound {
			name: name.to_string(),
		})
	}

	async fn put(&self, name: &str, data: &[u8]) -> Result<(), RelayError> {
		self.check_injected_failure(name, "put")?;
		let mut blobs = self.blobs.lock().unwrap();
		blobs.insert(name.to_string(), Blob { data: data.to_vec(), mtime: now() });
		Ok(())
	}

	async fn delete(&self, name: &str) -> Result<(), RelayError> {
		self.blobs.lock().unwrap().remove(name);
		Ok(())
	}

	async fn exists(&self, name: &str) -> Result<bool, RelayError> {
		Ok(self.blobs.lock().unwrap().contains_key(name))
	}

	async fn size(&self, name: &str) -> Result<u64, RelayError> {
		self.blobs
			.lock()
			.unwrap()
			.get(name)
			.map(|b| b.data.len() as u64)
			.ok_or_else(|| RelayError::NotFound { name: name.to_string() })
	}

	async fn mtime(&self, name: &str) -> Result<Option<u64>, RelayError> {
		Ok(self.blobs.lock().unwrap().get(name).map(|b| b.mtime))
	}

	async fn touch(&self, name: &str) -> Result<(), RelayError> {
		let mut blobs = self.blobs.lock().unwrap();
		match blobs.get_mut(name) {
			Some(blob) => {
				blob.mtime = now();
				Ok(())
			}
			None => Err(RelayError::NotFound { name: name.to_string() }),
		}
	}
}


// vim: ts=4
