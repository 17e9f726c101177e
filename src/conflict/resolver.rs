//! Conflict resolution logic, adapted from an n-way "pick a winning node"
//! resolver down to escale's two-sided local-vs-remote choice (§4.6).

use super::{Conflict, ConflictResolutionError, Winner};
use crate::strategies::ConflictStrategy;

pub struct ConflictResolver {
	strategy: ConflictStrategy,
}

impl ConflictResolver {
	pub fn new(strategy: ConflictStrategy) -> Self {
		ConflictResolver { strategy }
	}

	/// Resolve `conflict` using the repository's fixed strategy (§4.6: "the
	/// choice is recorded at repository creation and is an invariant across
	/// the repository's lifetime" — there is no per-call override).
	pub fn resolve(&self, conflict: &Conflict) -> Result<Winner, ConflictResolutionError> {
		match self.strategy {
			ConflictStrategy::NewerWins => {
				if conflict.local.mtime >= conflict.remote.mtime {
					Ok(Winner::Local)
				} else {
					Ok(Winner::Remote)
				}
			}
			ConflictStrategy::PullFirst => Ok(Winner::Remote),
			ConflictStrategy::Reject => Err(ConflictResolutionError::Rejected),
		}
	}

	pub fn strategy(&self) -> ConflictStrategy {
		self.strategy
	}

	pub fn strategy_description(strategy: ConflictStrategy) -> &'static str {
		match strategy {
			ConflictStrategy::NewerWins => "later mtime wins, loser kept as a conflict sidecar",
			ConflictStrategy::PullFirst => "remote always pulled into a sidecar, local file left untouched",
			ConflictStrategy::Reject => "both sides left untouched, surfaced as an error",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::conflict::VersionInfo;
	use crate::path::LogicalPath;

	fn conflict(local_mtime: u64, remote_mtime: u64) -> Conflict {
		let path = LogicalPath::new("notes.md").unwrap();
		Conflict::new(
			path,
			VersionInfo { mtime: local_mtime, size: 1, digest: "a".to_string() },
			VersionInfo { mtime: remote_mtime, size: 1, digest: "b".to_string() },
		)
	}

	#[test]
	fn test_newer_wins_picks_local_when_later() {
		let resolver = ConflictResolver::new(ConflictStrategy::NewerWins);
		assert_eq!(resolver.resolve(&conflict(200, 100)).unwrap(), Winner::Local);
	}

	#[test]
	fn test_newer_wins_picks_remote_when_later() {
		let resolver = ConflictResolver::new(ConflictStrategy::NewerWins);
		assert_eq!(resolver.resolve(&conflict(100, 200)).unwrap(), Winner::Remote);
	}

	#[test]
	fn test_newer_wins_ties_favor_local() {
		let resolver = ConflictResolver::new(ConflictStrategy::NewerWins);
		assert_eq!(resolver.resolve(&conflict(100, 100)).unwrap(), Winner::Local);
	}

	#[test]
	fn test_pull_first_always_remote() {
		let resolver = ConflictResolver::new(ConflictStrategy::PullFirst);
		assert_eq!(resolver.resolve(&conflict(999, 1)).unwrap(), Winner::Remote);
	}

	#[test]
	fn test_reject_errors() {
		let resolver = ConflictResolver::new(ConflictStrategy::Reject);
		assert!(resolver.resolve(&conflict(1, 2)).is_err());
	}
}

// vim: ts=4
