//! A hierarchical cancellation token, checked at every suspension point in
//! the scheduler and engine (§4.7, §9: "cancellation must be checked before
//! every relay call, every local I/O operation, and every sleep").
//!
//! No crate in the corpus pulls in `tokio-util`, so this is built directly
//! on `tokio::sync::Notify` the way the teacher's signal handling builds its
//! own shutdown coordination on primitive sync types rather than reaching
//! for a cancellation crate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::error::SyncError;

struct Inner {
	cancelled: AtomicBool,
	notify: Notify,
}

/// A cancellation token. Cloning shares the same underlying flag; calling
/// [`CancellationToken::child`] creates a token that is cancelled whenever
/// its parent is, but can also be cancelled independently (e.g. to stop one
/// repository's worker without touching the others).
#[derive(Clone)]
pub struct CancellationToken {
	inner: Arc<Inner>,
	parent: Option<Arc<CancellationToken>>,
}

impl CancellationToken {
	pub fn new() -> Self {
		Self { inner: Arc::new(Inner { cancelled: AtomicBool::new(false), notify: Notify::new() }), parent: None }
	}

	/// A token scoped to one repository worker, cancelled either by its own
	/// `cancel()` or by the parent's.
	pub fn child(&self) -> Self {
		Self {
			inner: Arc::new(Inner { cancelled: AtomicBool::new(false), notify: Notify::new() }),
			parent: Some(Arc::new(self.clone())),
		}
	}

	pub fn cancel(&self) {
		self.inner.cancelled.store(true, Ordering::SeqCst);
		self.inner.notify.notify_waiters();
	}

	pub fn is_cancelled(&self) -> bool {
		self.inner.cancelled.load(Ordering::SeqCst)
			|| self.parent.as_ref().is_some_and(|p| p.is_cancelled())
	}

	/// Check the token, returning `Err(SyncError::Cancelled)` if set. Meant
	/// to be called immediately before and after every relay call, local I/O
	/// operation, and sleep.
	pub fn check(&self) -> Result<(), SyncError> {
		if self.is_cancelled() {
			Err(SyncError::Cancelled)
		} else {
			Ok(())
		}
	}

	/// Sleep for `duration`, waking early if cancelled; returns whether the
	/// sleep completed (`true`) or was interrupted by cancellation (`false`).
	pub async fn sleep(&self, duration: std::time::Duration) -> bool {
		tokio::select! {
			_ = tokio::time::sleep(duration) => true,
			_ = self.inner.notify.notified() => false,
		}
	}
}

impl Default for CancellationToken {
	fn default() -> Self {
		Self::new()
	}
}


// vim: ts=4
