//! Small validation helpers shared across config loading and lock staleness
//! checks. Adapted from the teacher's `validation` module, slimmed to what
//! escale actually needs.

use std::error::Error;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
	ConfigError(String),
	PathError(String),
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ValidationError::ConfigError(msg) => write!(f, "config validation error: {}", msg),
			ValidationError::PathError(msg) => write!(f, "path validation error: {}", msg),
		}
	}
}

impl Error for ValidationError {}

/// Validate a timeout, in seconds, used for relay adapter or lock settling.
pub fn validate_timeout_secs(timeout_secs: u32) -> Result<(), ValidationError> {
	if timeout_secs == 0 {
		return Err(ValidationError::ConfigError("timeout must be greater than 0".to_string()));
	}
	if timeout_secs > 3600 {
		return Err(ValidationError::ConfigError(format!(
			"timeout too large: {} seconds (max 3600)",
			timeout_secs
		)));
	}
	Ok(())
}

/// Whether a blob created `created_at_secs` seconds after the Unix epoch is
/// still within `ttl_secs` of now — the liveness check behind lock-staleness
/// reaping (§4.3) and the identity marker probe (§4.9).
pub fn is_within_ttl(created_at_secs: u64, ttl_secs: u64) -> bool {
	let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
	now.saturating_sub(created_at_secs) < ttl_secs
}


// vim: ts=4
