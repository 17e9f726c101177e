//! Strategy enums controlling conflict resolution, access, and placeholder
//! retention, each with a `FromStr`/`Display` pair so they round-trip through
//! config files and CLI flags the same way.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the engine resolves a local-vs-remote conflict (§4.6).
///
/// Fixed per-repository at creation time; the engine never chooses a
/// strategy per path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
	/// The version with the later timestamp wins; the loser is written
	/// alongside as a `.conflict-<timestamp>` sidecar instead of being
	/// discarded.
	NewerWins,
	/// The remote version always wins: it is pulled into a `.conflict-
	/// <timestamp>` sidecar, and the local file is left untouched on disk.
	PullFirst,
	/// Leave both versions untouched and surface a `ConflictError`.
	Reject,
}

impl FromStr for ConflictStrategy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"newer-wins" | "newer_wins" | "newest" => Ok(ConflictStrategy::NewerWins),
			"pull-first" | "pull_first" | "pull" => Ok(ConflictStrategy::PullFirst),
			"reject" | "fail" => Ok(ConflictStrategy::Reject),
			_ => Err(format!("unknown conflict strategy: {}", s)),
		}
	}
}

impl fmt::Display for ConflictStrategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ConflictStrategy::NewerWins => "newer-wins",
			ConflictStrategy::PullFirst => "pull-first",
			ConflictStrategy::Reject => "reject",
		};
		write!(f, "{}", s)
	}
}

/// Per-path read/write access modifiers (§6).
///
/// `r`/`w` are granted unconditionally, `r-`/`w-` are permanently denied,
/// and `r?`/`w?` are gated behind an explicit grant `Message` younger than
/// the current placeholder (§9 open question).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
	Allowed,
	Denied,
	Gated,
}

impl AccessMode {
	pub fn to_suffix(self, read: bool) -> &'static str {
		match (read, self) {
			(true, AccessMode::Allowed) => "r",
			(true, AccessMode::Denied) => "r-",
			(true, AccessMode::Gated) => "r?",
			(false, AccessMode::Allowed) => "w",
			(false, AccessMode::Denied) => "w-",
			(false, AccessMode::Gated) => "w?",
		}
	}
}

impl FromStr for AccessMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"r" | "w" => Ok(AccessMode::Allowed),
			"r-" | "w-" => Ok(AccessMode::Denied),
			"r?" | "w?" => Ok(AccessMode::Gated),
			_ => Err(format!("unknown access modifier: {}", s)),
		}
	}
}

impl fmt::Display for AccessMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AccessMode::Allowed => write!(f, "allowed"),
			AccessMode::Denied => write!(f, "denied"),
			AccessMode::Gated => write!(f, "gated"),
		}
	}
}

/// Combined read+write access for a repository, as recorded in `Config`
/// and advertised via `maintenance::access`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
	pub read: AccessMode,
	pub write: AccessMode,
}

impl AccessPolicy {
	pub fn new(read: AccessMode, write: AccessMode) -> Self {
		Self { read, write }
	}

	pub fn full() -> Self {
		Self::new(AccessMode::Allowed, AccessMode::Allowed)
	}

	pub fn to_string_pair(self) -> String {
		format!("{}{}", self.read.to_suffix(true), self.write.to_suffix(false))
	}
}

impl Default for AccessPolicy {
	fn default() -> Self {
		Self::full()
	}
}

/// Whether a pulled placeholder is consumed and discarded, or retained for
/// history (§3: Placeholder lifecycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaceholderRetention {
	OneShot,
	RetainHistory,
}

impl FromStr for PlaceholderRetention {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"one-shot" | "one_shot" | "oneshot" => Ok(PlaceholderRetention::OneShot),
			"retain-history" | "retain_history" | "history" => {
				Ok(PlaceholderRetention::RetainHistory)
			}
			_ => Err(format!("unknown placeholder retention mode: {}", s)),
		}
	}
}

impl fmt::Display for PlaceholderRetention {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			PlaceholderRetention::OneShot => "one-shot",
			PlaceholderRetention::RetainHistory => "retain-history",
		};
		write!(f, "{}", s)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_conflict_strategy_roundtrip() {
		for s in [ConflictStrategy::NewerWins, ConflictStrategy::PullFirst, ConflictStrategy::Reject]
		{
			assert_eq!(ConflictStrategy::from_str(&s.to_string()).unwrap(), s);
		}
	}

	#[test]
	fn test_conflict_strategy_unknown() {
		assert!(ConflictStrategy::from_str("bogus").is_err());
	}

	#[test]
	fn test_access_mode_suffixes() {
		assert_eq!(AccessMode::Allowed.to_suffix(true), "r");
		assert_eq!(AccessMode::Denied.to_suffix(true), "r-");
		assert_eq!(AccessMode::Gated.to_suffix(true), "r?");
		assert_eq!(AccessMode::Allowed.to_suffix(false), "w");
	}

	#[test]
	fn test_access_mode_from_str() {
		assert_eq!(AccessMode::from_str("r?").unwrap(), AccessMode::Gated);
		assert!(AccessMode::from_str("x").is_err());
	}

	#[test]
	fn test_access_policy_string_pair() {
		let p = AccessPolicy::new(AccessMode::Allowed, AccessMode::Gated);
		assert_eq!(p.to_string_pair(), "rw?");
	}

	#[test]
	fn test_placeholder_retention_roundtrip() {
		for r in [PlaceholderRetention::OneShot, PlaceholderRetention::RetainHistory] {
			assert_eq!(PlaceholderRetention::from_str(&r.to_string()).unwrap(), r);
		}
	}
}

// vim: ts=4
