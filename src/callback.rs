//! Scheduler/engine observability events (§9: "Observability"), mirroring
//! the teacher's progress-callback pattern so a CLI, a test harness, or a
//! future TUI can watch a scan without the engine depending on any
//! particular presentation.

use crate::path::LogicalPath;

/// One observable moment in a repository worker's lifecycle.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
	/// A scan of the local tree and relay namespace has started.
	ScanStarted,

	/// `path` was examined and `decision` chosen from the §4.6 table.
	PathDecided { path: LogicalPath, decision: String },

	/// `path` finished applying its decision successfully.
	PathCompleted { path: LogicalPath },

	/// `path` failed; the scan continues with the next path (§7: "one
	/// path's failure never aborts a scan").
	PathFailed { path: LogicalPath, message: String },

	/// The full scan finished; `changed` counts paths pushed or pulled.
	ScanCompleted { changed: usize },

	/// The worker is backing off before its next retry.
	BackingOff { delay_secs: u64 },
}

/// Implemented by anything that wants to observe a scheduler's progress.
/// The default no-op implementation lets call sites that don't care about
/// observability omit a callback entirely.
pub trait SchedulerCallback: Send + Sync {
	fn on_event(&self, event: SchedulerEvent);
}

/// A callback that discards every event; the default when the caller has
/// no observer configured.
pub struct NullCallback;

impl SchedulerCallback for NullCallback {
	fn on_event(&self, _event: SchedulerEvent) {}
}

/// Forwards every event through `tracing`, at a level matched to severity.
pub struct TracingCallback;

impl SchedulerCallback for TracingCallback {
	fn on_event(&self, event: SchedulerEvent) {
		match event {
			SchedulerEvent::ScanStarted => tracing::debug!("scan started"),
			SchedulerEvent::PathDecided { path, decision } => {
				tracing::debug!(%path, %decision, "path decided")
			}
			SchedulerEvent::PathCompleted { path } => tracing::debug!(%path, "path completed"),
			SchedulerEvent::PathFailed { path, message } => {
				tracing::warn!(%path, %message, "path failed")
			}
			SchedulerEvent::ScanCompleted { changed } => {
				tracing::info!(changed, "scan completed")
			}
			SchedulerEvent::BackingOff { delay_secs } => {
				tracing::debug!(delay_secs, "backing off")
			}
		}
	}
}


// vim: ts=4
