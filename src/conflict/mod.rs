//! Conflict detection and resolution (C6, §4.6).
//!
//! Escale conflicts are always two-sided: this client's local version
//! against the relay's current placeholder. There is no n-way node list to
//! pick a winner from; resolution decides local-wins or remote-wins for a
//! single path.

use std::fmt;

pub mod resolver;

pub use resolver::ConflictResolver;

use crate::path::LogicalPath;

/// One side of a conflict: either the local working copy or the remote
/// placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
	pub mtime: u64,
	pub size: u64,
	pub digest: String,
}

/// A detected local-vs-remote conflict for a single path (§4.6: "new vs
/// present_new" or "modified vs present_new").
#[derive(Debug, Clone)]
pub struct Conflict {
	pub path: LogicalPath,
	pub local: VersionInfo,
	pub remote: VersionInfo,
}

/// Which side the resolver picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
	Local,
	Remote,
}

impl Conflict {
	pub fn new(path: LogicalPath, local: VersionInfo, remote: VersionInfo) -> Self {
		Self { path, local, remote }
	}
}

#[derive(Debug)]
pub enum ConflictResolutionError {
	/// The "reject" strategy: leave both sides untouched.
	Rejected,
}

impl fmt::Display for ConflictResolutionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConflictResolutionError::Rejected => write!(f, "conflict rejected, left for next scan"),
		}
	}
}

impl std::error::Error for ConflictResolutionError {}


// vim: ts=4
