//! Unified error taxonomy for Escale synchronization operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::exclusion::ExclusionError;

/// Helper to reduce `Box::new()` boilerplate when wrapping nested errors into
/// `Box<dyn Error + Send + Sync>` for error variant fields.
#[inline]
pub fn boxed_error<E: Error + Send + Sync + 'static>(e: E) -> Box<dyn Error + Send + Sync> {
	Box::new(e)
}

/// Top-level error type returned by the synchronization engine and scheduler
///
/// Mirrors the taxonomy in the design: fatal startup errors, retryable relay
/// errors, expected contention (`Busy`), and per-path failures that must
/// never abort a whole scan.
#[derive(Debug)]
pub enum SyncError {
	/// Static, fatal misconfiguration detected at startup
	Config { message: String },

	/// License not accepted (fatal, exit before doing any I/O)
	LicenseNotAccepted,

	/// Relay error, nested (transient or permanent; see `RelayError`)
	Relay(RelayError),

	/// Lock held by another client, or our own acquisition lost the race
	Busy { path: String },

	/// Payload failed MAC or digest verification after a pull
	Integrity { path: String, message: String },

	/// Conflict detected and not automatically resolvable under the
	/// configured strategy
	Conflict(ConflictError),

	/// Local filesystem error; the offending path is skipped, the scan
	/// continues
	LocalIo { path: String, source: io::Error },

	/// The durable index is corrupted or unreadable
	Index(IndexError),

	/// Payload framing/encryption error
	Framing(FramingError),

	/// Operation was cancelled via a `CancellationToken`
	Cancelled,

	/// Generic error message, used sparingly at integration seams
	Other { message: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Config { message } => write!(f, "configuration error: {}", message),
			SyncError::LicenseNotAccepted => write!(f, "license not accepted"),
			SyncError::Relay(e) => write!(f, "relay error: {}", e),
			SyncError::Busy { path } => write!(f, "{}: locked by another client", path),
			SyncError::Integrity { path, message } => {
				write!(f, "{}: integrity check failed: {}", path, message)
			}
			SyncError::Conflict(e) => write!(f, "conflict: {}", e),
			SyncError::LocalIo { path, source } => write!(f, "{}: {}", path, source),
			SyncError::Index(e) => write!(f, "index error: {}", e),
			SyncError::Framing(e) => write!(f, "framing error: {}", e),
			SyncError::Cancelled => write!(f, "operation cancelled"),
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {}

impl From<RelayError> for SyncError {
	fn from(e: RelayError) -> Self {
		SyncError::Relay(e)
	}
}

impl From<ConflictError> for SyncError {
	fn from(e: ConflictError) -> Self {
		SyncError::Conflict(e)
	}
}

impl From<IndexError> for SyncError {
	fn from(e: IndexError) -> Self {
		SyncError::Index(e)
	}
}

impl From<FramingError> for SyncError {
	fn from(e: FramingError) -> Self {
		SyncError::Framing(e)
	}
}

impl From<ExclusionError> for SyncError {
	fn from(e: ExclusionError) -> Self {
		SyncError::Other { message: e.to_string() }
	}
}

/// Whether an error should pause the owning repository worker (permanent) or
/// be retried with back-off (transient), per the design's propagation rule:
/// a path failure never aborts the scan, a repository failure never aborts
/// the process.
impl SyncError {
	pub fn is_retryable(&self) -> bool {
		match self {
			SyncError::Relay(e) => e.is_retryable(),
			SyncError::Busy { .. } => true,
			_ => false,
		}
	}

	pub fn is_fatal(&self) -> bool {
		matches!(self, SyncError::Config { .. } | SyncError::LicenseNotAccepted)
	}
}

/// Relay adapter errors (C1)
#[derive(Debug)]
pub enum RelayError {
	/// Timeout, connection reset, 5xx-equivalent — retried with back-off
	Transient { operation: String, source: Box<dyn Error + Send + Sync> },

	/// Auth failure, not-found where required, protocol violation on the
	/// backend side — surfaced, repository worker pauses
	Permanent { operation: String, source: Box<dyn Error + Send + Sync> },

	/// Adapter call exceeded its deadline
	Timeout { operation: String },

	/// Requested blob does not exist
	NotFound { name: String },
}

impl fmt::Display for RelayError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RelayError::Transient { operation, source } => {
				write!(f, "{} failed (transient): {}", operation, source)
			}
			RelayError::Permanent { operation, source } => {
				write!(f, "{} failed: {}", operation, source)
			}
			RelayError::Timeout { operation } => write!(f, "{} timed out", operation),
			RelayError::NotFound { name } => write!(f, "{} not found on relay", name),
		}
	}
}

impl Error for RelayError {}

impl RelayError {
	pub fn is_retryable(&self) -> bool {
		matches!(self, RelayError::Transient { .. } | RelayError::Timeout { .. })
	}

	pub fn transient(operation: impl Into<String>, source: io::Error) -> Self {
		RelayError::Transient { operation: operation.into(), source: boxed_error(source) }
	}

	pub fn permanent(operation: impl Into<String>, source: io::Error) -> Self {
		RelayError::Permanent { operation: operation.into(), source: boxed_error(source) }
	}
}

/// Conflict resolution errors (C6)
#[derive(Debug)]
pub enum ConflictError {
	/// Strategy is "reject": both copies persist untouched
	Rejected { path: String },

	/// A configured strategy could not be applied (e.g. missing mtime)
	StrategyFailed { message: String },
}

impl fmt::Display for ConflictError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConflictError::Rejected { path } => write!(f, "{}: left for next scan", path),
			ConflictError::StrategyFailed { message } => write!(f, "{}", message),
		}
	}
}

impl Error for ConflictError {}

/// Local durable index errors (C5)
#[derive(Debug)]
pub enum IndexError {
	LoadFailed { source: Box<dyn Error + Send + Sync> },
	SaveFailed { source: Box<dyn Error + Send + Sync> },
	Corrupted { message: String },
}

impl fmt::Display for IndexError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			IndexError::LoadFailed { source } => write!(f, "failed to load index: {}", source),
			IndexError::SaveFailed { source } => write!(f, "failed to save index: {}", source),
			IndexError::Corrupted { message } => write!(f, "index corrupted: {}", message),
		}
	}
}

impl Error for IndexError {}

/// Payload framing / encryption errors (C4)
#[derive(Debug)]
pub enum FramingError {
	UnknownMagic,
	UnsupportedVersion { version: u8 },
	DecryptionFailed,
	CompressionFailed { message: String },
	DigestMismatch { expected: String, actual: String },
	InvalidHeader { message: String },
}

impl fmt::Display for FramingError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FramingError::UnknownMagic => write!(f, "unrecognized payload magic"),
			FramingError::UnsupportedVersion { version } => {
				write!(f, "unsupported frame version {}", version)
			}
			FramingError::DecryptionFailed => write!(f, "decryption or MAC verification failed"),
			FramingError::CompressionFailed { message } => {
				write!(f, "compression error: {}", message)
			}
			FramingError::DigestMismatch { expected, actual } => {
				write!(f, "digest mismatch: expected {}, got {}", expected, actual)
			}
			FramingError::InvalidHeader { message } => write!(f, "invalid frame header: {}", message),
		}
	}
}

impl Error for FramingError {}

// vim: ts=4
