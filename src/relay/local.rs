//! Treats a local directory as the relay: single-machine operation, and a
//! stand-in for any POSIX-mounted backend (e.g. SFTP-over-FUSE). Emulates
//! atomic `put` via put-then-rename of a `.tmp.<nonce>` name, as required by
//! the adapter contract (§4.1).

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use crate::error::RelayError;
use crate::relay::{RelayAdapter, RelayEntry};

pub struct LocalRelay {
	root: PathBuf,
}

impl LocalRelay {
	pub async fn open(root: impl AsRef<Path>) -> Result<Self, RelayError> {
		let root = root.as_ref().to_path_buf();
		fs::create_dir_all(&root)
			.await
			.map_err(|e| RelayError::permanent("open relay root", e))?;
		Ok(Self { root })
	}

	fn resolve(&self, name: &str) -> PathBuf {
		self.root.join(name)
	}
}

fn mtime_secs(metadata: &std::fs::Metadata) -> Option<u64> {
	metadata.modified().ok().and_then(|t| t.duration_since(UNIX_EPOCH).ok()).map(|d| d.as_secs())
}

#[async_trait]
impl RelayAdapter for LocalRelay {
	async fn list(&self, prefix: &str) -> Result<Vec<RelayEntry>, RelayError> {
		let mut out = Vec::new();
		let mut stack = vec![self.root.clone()];
		while let Some(dir) = stack.pop() {
			let mut entries = fs::read_dir(&dir)
				.await
				.map_err(|e| RelayError::transient("list", e))?;
			while let Some(entry) =
				entries.next_entry().await.map_err(|e| RelayError::transient("list", e))?
			{
				let path = entry.path();
				let relative = path.strip_prefix(&self.root).unwrap();
				let name = relative.to_string_lossy().replace('\\', "/");
				let metadata =
					entry.metadata().await.map_err(|e| RelayError::transient("list", e))?;
				if metadata.is_dir() {
					stack.push(path);
					continue;
				}
				if name.contains(".tmp.") {
					continue;
				}
				if name.starts_with(prefix) {
					out.push(RelayEntry { name, size: metadata.len(), mtime: mtime_secs(&metadata) });
				}
			}
		}
		Ok(out)
	}

	async fn get(&self, name: &str) -> Result<Vec<u8>, RelayError> {
		fs::read(self.resolve(name)).await.map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				RelayError::NotFound { name: name.to_string() }
			} else {
				RelayError::transient("get", e)
			}
		})
	}

	async fn put(&self, name: &str, data: &[u8]) -> Result<(), RelayError> {
		let dest = self.resolve(name);
		if let Some(parent) = dest.parent() {
			fs::create_dir_all(parent).await.map_err(|e| RelayError::transient("put", e))?;
		}
		let mut tmp_name = dest.into_os_string();
		tmp_name.push(format!(".tmp.{}", Uuid::new_v4()));
		let tmp = PathBuf::from(tmp_name);
		let dest = self.resolve(name);
		fs::write(&tmp, data).await.map_err(|e| RelayError::transient("put", e))?;
		fs::rename(&tmp, &dest).await.map_err(|e| RelayError::transient("put", e))?;
		Ok(())
	}

	async fn delete(&self, name: &str) -> Result<(), RelayError> {
		match fs::remove_file(self.resolve(name)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(RelayError::transient("delete", e)),
		}
	}

	async fn exists(&self, name: &str) -> Result<bool, RelayError> {
		Ok(fs::metadata(self.resolve(name)).await.is_ok())
	}

	async fn size(&self, name: &str) -> Result<u64, RelayError> {
		let metadata = fs::metadata(self.resolve(name))
			.await
			.map_err(|e| RelayError::transient("size", e))?;
		Ok(metadata.len())
	}

	async fn mtime(&self, name: &str) -> Result<Option<u64>, RelayError> {
		match fs::metadata(self.resolve(name)).await {
			Ok(metadata) => Ok(mtime_secs(&metadata)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(RelayError::transient("mtime", e)),
		}
	}

	async fn touch(&self, name: &str) -> Result<(), RelayError> {
		let now = SystemTime::now();
		let path = self.resolve(name);
		let file = std::fs::File::options()
			.write(true)
			.open(&path)
			.map_err(|e| RelayError::transient("touch", e))?;
		file.set_modified(now).map_err(|e| RelayError::transient("touch", e))?;
		Ok(())
	}
}


// vim: ts=4
