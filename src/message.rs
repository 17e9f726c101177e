//! Addressed message blobs: the C8/access-control signalling primitive
//! (§4.3 "Message protocol"). Messages are idempotent in payload; repeated
//! delivery is harmless.

use serde::{Deserialize, Serialize};

use crate::error::{FramingError, SyncError};
use crate::identity::Pseudonym;
use crate::naming::{Category, RelayName};
use crate::path::LogicalPath;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
	/// Sent by a peer blocked on a gated (`r?`/`w?`) path, asking the owner
	/// to grant access.
	AccessRequest,
	/// Sent by the owner in response to an `AccessRequest`; its presence,
	/// newer than the current placeholder, is the grant itself (§9).
	AccessGrant,
	/// Used by maintenance operations to advertise an access-policy change
	/// to affected peers (§4.8).
	AccessChanged { policy: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
	pub from: String,
	pub kind: MessageKind,
}

impl Message {
	pub fn new(from: &Pseudonym, kind: MessageKind) -> Self {
		Self { from: from.as_str().to_string(), kind }
	}

	pub fn relay_name(path: &LogicalPath, recipient: &Pseudonym, max_name_len: usize) -> RelayName {
		RelayName::new(
			path,
			Category::Message { recipient: recipient.as_str().to_string() },
			max_name_len,
		)
	}

	pub fn serialize(&self) -> Result<Vec<u8>, SyncError> {
		serde_json::to_vec(self).map_err(|e| {
			SyncError::Framing(FramingError::InvalidHeader { message: e.to_string() })
		})
	}

	pub fn parse(body: &[u8]) -> Result<Self, SyncError> {
		serde_json::from_slice(body).map_err(|e| {
			SyncError::Framing(FramingError::InvalidHeader { message: e.to_string() })
		})
	}
}


// vim: ts=4
