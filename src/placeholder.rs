//! The placeholder blob: textual key=value header recording the latest
//! sender, version, and digest for a logical path (§6).

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{FramingError, SyncError};
use crate::identity::Pseudonym;
use crate::naming::{escape, unescape};

/// A placeholder read from or about to be written to the relay.
///
/// `digest.is_none()` marks a tombstone (§4.6 deletion propagation) or a
/// consumed placeholder with no sender, depending on `sender`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
	pub sender: Option<Pseudonym>,
	pub version: u64,
	pub digest: Option<String>,
	pub timestamp: String,
	pub flags: Vec<String>,
}

impl Placeholder {
	pub fn new(sender: Pseudonym, version: u64, digest: String, timestamp: String) -> Self {
		Self { sender: Some(sender), version, digest: Some(digest), timestamp, flags: Vec::new() }
	}

	/// A tombstone: advertises a deletion, carries no payload or digest.
	pub fn tombstone(sender: Pseudonym, version: u64, timestamp: String) -> Self {
		Self { sender: Some(sender), version, digest: None, timestamp, flags: Vec::new() }
	}

	/// The "consumed" state written by a reader after a retain-history pull
	/// (§4.3: "rewrites it with sender=<none>").
	pub fn consumed(version: u64, digest: String, timestamp: String) -> Self {
		Self { sender: None, version, digest: Some(digest), timestamp, flags: Vec::new() }
	}

	pub fn is_tombstone(&self) -> bool {
		self.digest.is_none()
	}

	pub fn serialize(&self) -> Vec<u8> {
		let mut out = String::new();
		out.push_str(&format!("sender={}\n", escape(self.sender.as_ref().map(|s| s.as_str()).unwrap_or(""))));
		out.push_str(&format!("version={}\n", self.version));
		out.push_str(&format!("digest={}\n", escape(self.digest.as_deref().unwrap_or(""))));
		out.push_str(&format!("timestamp={}\n", escape(&self.timestamp)));
		out.push_str(&format!("flags={}\n", escape(&self.flags.join(","))));
		out.into_bytes()
	}

	/// Parse a placeholder body, ignoring unknown keys (§6: "Parsers MUST
	/// ignore unknown keys").
	pub fn parse(body: &[u8]) -> Result<Self, SyncError> {
		let text = std::str::from_utf8(body).map_err(|_| {
			SyncError::Framing(FramingError::InvalidHeader {
				message: "placeholder body is not valid UTF-8".to_string(),
			})
		})?;

		let mut fields: BTreeMap<String, String> = BTreeMap::new();
		for line in text.lines() {
			if let Some((key, value)) = line.split_once('=') {
				fields.insert(key.trim().to_string(), unescape(value.trim()));
			}
		}

		let version = fields
			.get("version")
			.ok_or_else(|| invalid("missing version"))?
			.parse::<u64>()
			.map_err(|_| invalid("version is not a decimal integer"))?;

		let sender = fields.get("sender").filter(|s| !s.is_empty()).map(Pseudonym::new);
		let digest = fields.get("digest").filter(|s| !s.is_empty()).cloned();
		let timestamp = fields.get("timestamp").cloned().unwrap_or_default();
		let flags = fields
			.get("flags")
			.map(|f| f.split(',').filter(|s| !s.is_empty()).map(String::from).collect())
			.unwrap_or_default();

		Ok(Self { sender, version, digest, timestamp, flags })
	}
}

impl fmt::Display for Placeholder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"v{} sender={} digest={}",
			self.version,
			self.sender.as_ref().map(|s| s.as_str()).unwrap_or("<none>"),
			self.digest.as_deref().unwrap_or("<tombstone>")
		)
	}
}

fn invalid(message: &str) -> SyncError {
	SyncError::Framing(FramingError::InvalidHeader { message: message.to_string() })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_roundtrip_normal_placeholder() {
		let p = Placeholder::new(
			Pseudonym::new("alice"),
			3,
			"deadbeef".to_string(),
			"2026-08-01T00:00:00Z".to_string(),
		);
		let parsed = Placeholder::parse(&p.serialize()).unwrap();
		assert_eq!(parsed, p);
	}

	#[test]
	fn test_tombstone_has_no_digest() {
		let p = Placeholder::tombstone(Pseudonym::new("alice"), 4, "ts".to_string());
		assert!(p.is_tombstone());
		let parsed = Placeholder::parse(&p.serialize()).unwrap();
		assert!(parsed.is_tombstone());
	}

	#[test]
	fn test_consumed_has_no_sender() {
		let p = Placeholder::consumed(2, "abc".to_string(), "ts".to_string());
		let parsed = Placeholder::parse(&p.serialize()).unwrap();
		assert!(parsed.sender.is_none());
	}

	#[test]
	fn test_parse_ignores_unknown_keys() {
		let body = b"sender=alice\nversion=1\ndigest=abc\ntimestamp=ts\nflags=\nbogus=123\n";
		let p = Placeholder::parse(body).unwrap();
		assert_eq!(p.version, 1);
	}

	#[test]
	fn test_parse_rejects_missing_version() {
		let body = b"sender=alice\ndigest=abc\n";
		assert!(Placeholder::parse(body).is_err());
	}
}

// vim: ts=4
