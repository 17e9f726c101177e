//! File locking mechanism for sync state management

use std::error::Error;
use std::path;

/// File locking mechanism to prevent concurrent sync operations. Cleaned up
/// on drop, which runs once `Scheduler::run` returns after cancellation —
/// the same `CancellationToken` wired to Ctrl-C that stops the scheduler
/// loop, so there is no separate signal handler racing it.
pub struct FileLock {
	path: path::PathBuf,
}

impl FileLock {
	/// Acquire an exclusive lock on the repository's local state directory,
	/// preventing two daemons from driving the same repository (§6).
	pub fn acquire(state_dir: &path::Path) -> Result<Self, Box<dyn Error>> {
		let lock_path = state_dir.join(".escale-lock");

		if lock_path.exists() {
			return Err(format!(
				"repository already in use (lock file exists at {}). \
                 If this is stale, delete the lock file manually.",
				lock_path.display()
			)
			.into());
		}

		let pid = std::process::id();
		std::fs::write(&lock_path, pid.to_string())?;

		Ok(FileLock { path: lock_path })
	}
}

impl Drop for FileLock {
	fn drop(&mut self) {
		let _ = std::fs::remove_file(&self.path);
	}
}


// vim: ts=4
