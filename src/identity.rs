//! Client pseudonym allocation and the duplicate-pseudonym guard (§4.9, §9
//! open question).

use crate::error::SyncError;
use crate::relay::RelayAdapter;
use crate::validation::is_within_ttl;

/// Opaque client identifier used as lock holder id, placeholder sender id,
/// and message recipient id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pseudonym(String);

impl Pseudonym {
	pub fn new(value: impl Into<String>) -> Self {
		Pseudonym(value.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Display for Pseudonym {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

fn marker_name(pseudonym: &Pseudonym) -> String {
	format!(".identity.{}", pseudonym.as_str())
}

/// Probe the relay for an existing identity marker. Returns `Ok(())` if the
/// pseudonym is free to claim (no marker, or a marker older than
/// `lock_ttl_secs`), refusing to start otherwise.
pub async fn claim<A: RelayAdapter>(
	adapter: &A,
	pseudonym: &Pseudonym,
	lock_ttl_secs: u64,
) -> Result<(), SyncError> {
	let name = marker_name(pseudonym);

	if adapter.exists(&name).await? {
		if let Some(mtime) = adapter.mtime(&name).await? {
			if is_within_ttl(mtime, lock_ttl_secs) {
				return Err(SyncError::Config {
					message: format!(
						"pseudonym {} appears to be in active use elsewhere",
						pseudonym
					),
				});
			}
		}
	}

	adapter.put(&name, pseudonym.as_str().as_bytes()).await?;
	Ok(())
}

/// Refresh the marker's mtime so a long-running client keeps its claim
/// alive; called once per scheduler wake.
pub async fn renew<A: RelayAdapter>(adapter: &A, pseudonym: &Pseudonym) -> Result<(), SyncError> {
	let name = marker_name(pseudonym);
	adapter.touch(&name).await?;
	Ok(())
}


// vim: ts=4
