#![allow(dead_code)]

//! Unified configuration for a single escale repository.
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (`Config::default()`)
//! 2. Config file (`<state_dir>/config.toml`)
//! 3. Environment variables (`ESCALE_*` prefix)
//! 4. CLI flags (highest priority)

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::strategies::{AccessPolicy, ConflictStrategy, PlaceholderRetention};
use crate::validation;

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

/// Per-repository configuration — everything named in §6's "Configuration"
/// interface plus the ambient fields needed to actually run (state
/// directory, exclusion patterns, retry/back-off tuning).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
	// ========================================================================
	// REPOSITORY IDENTITY
	// ========================================================================
	/// Local working tree this repository synchronizes.
	pub repository_path: PathBuf,

	/// URI of the relay backend (`file://`, or a backend-specific scheme for
	/// adapters outside this crate's scope).
	pub relay_uri: String,

	/// Opaque client identifier (§3: "Client identity").
	pub pseudonym: String,

	/// Directory holding the durable index, lockfile, and conflict
	/// sidecars for this repository.
	pub state_dir: PathBuf,

	// ========================================================================
	// EXCLUSION
	// ========================================================================
	/// Glob patterns to exclude from sync (e.g. `*.tmp`, `node_modules/`).
	pub exclude_patterns: Vec<String>,

	/// Glob patterns that override exclusions.
	pub include_patterns: Vec<String>,

	/// Honor `.gitignore`/`.syncignore` and similar files.
	pub respect_ignore_files: bool,

	/// Additional ignore file names to check beyond gitignore/syncignore.
	pub custom_ignore_files: Vec<String>,

	// ========================================================================
	// SYNCHRONIZATION BEHAVIOR
	// ========================================================================
	/// How local-vs-remote conflicts are resolved; fixed for the lifetime of
	/// the repository (§4.6).
	pub conflict_strategy: ConflictStrategy,

	/// One-shot vs retain-history placeholder consumption (§3, §9).
	pub placeholder_retention: PlaceholderRetention,

	/// Default access policy applied to newly observed paths.
	pub default_access: AccessPolicy,

	/// Interval between scheduler wake-ups.
	#[serde(with = "duration_secs")]
	pub scan_interval: Duration,

	/// Random jitter added to `scan_interval` to desynchronize clients.
	#[serde(with = "duration_secs")]
	pub scan_jitter: Duration,

	/// How long a relay lock is considered valid before being treated as
	/// stale and reclaimable (§4.3).
	pub lock_ttl_secs: u64,

	/// How long to wait after writing a lock before re-reading it to
	/// confirm acquisition (§4.3: "settling interval").
	#[serde(with = "duration_secs")]
	pub lock_settle_interval: Duration,

	/// Maximum relay blob name length before falling back to a bucketed,
	/// hashed name (§4.2).
	pub max_relay_name_len: usize,

	// ========================================================================
	// ENCRYPTION & COMPRESSION
	// ========================================================================
	/// Passphrase used to derive the payload encryption key; `None` disables
	/// authenticated encryption (payloads are still digest-checked).
	pub passphrase: Option<String>,

	/// Per-repository salt for Argon2id key derivation, generated once at
	/// repository creation and stored verbatim thereafter.
	pub kdf_salt: String,

	/// Whether payloads are zstd-compressed before encryption.
	pub compress: bool,

	// ========================================================================
	// RETRY & BACK-OFF
	// ========================================================================
	/// Initial back-off delay on `Busy`/transient relay errors.
	#[serde(with = "duration_secs")]
	pub backoff_initial: Duration,

	/// Maximum back-off delay; doubles each retry up to this ceiling.
	#[serde(with = "duration_secs")]
	pub backoff_max: Duration,

	/// Per-adapter-call timeout.
	#[serde(with = "duration_secs")]
	pub relay_timeout: Duration,

	// ========================================================================
	// SAFETY
	// ========================================================================
	/// Refuse to start until this is `true` (§7: `LicenseNotAccepted`).
	pub license_accepted: bool,

	/// Plan changes without applying them.
	pub dry_run: bool,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			repository_path: PathBuf::from("."),
			relay_uri: String::new(),
			pseudonym: String::new(),
			state_dir: PathBuf::from(".escale"),

			exclude_patterns: Vec::new(),
			include_patterns: Vec::new(),
			respect_ignore_files: true,
			custom_ignore_files: Vec::new(),

			conflict_strategy: ConflictStrategy::NewerWins,
			placeholder_retention: PlaceholderRetention::RetainHistory,
			default_access: AccessPolicy::full(),
			scan_interval: Duration::from_secs(30),
			scan_jitter: Duration::from_secs(5),
			lock_ttl_secs: 300,
			lock_settle_interval: Duration::from_millis(500),
			max_relay_name_len: 255,

			passphrase: None,
			kdf_salt: String::new(),
			compress: true,

			backoff_initial: Duration::from_secs(1),
			backoff_max: Duration::from_secs(60),
			relay_timeout: Duration::from_secs(30),

			license_accepted: false,
			dry_run: false,
		}
	}
}

impl Config {
	/// Load layered configuration: defaults, then an optional TOML file,
	/// then `ESCALE_*` environment variable overrides.
	pub fn load(config_path: Option<&std::path::Path>) -> Result<Self, SyncError> {
		let mut config = Config::default();

		if let Some(path) = config_path {
			if path.exists() {
				let text = std::fs::read_to_string(path).map_err(|e| SyncError::Config {
					message: format!("failed to read {}: {}", path.display(), e),
				})?;
				config = toml::from_str(&text)
					.map_err(|e| SyncError::Config { message: format!("invalid config file: {}", e) })?;
			}
		}

		config.apply_env_overrides();
		config.validate()?;
		Ok(config)
	}

	fn apply_env_overrides(&mut self) {
		if let Ok(v) = std::env::var("ESCALE_RELAY_URI") {
			self.relay_uri = v;
		}
		if let Ok(v) = std::env::var("ESCALE_PSEUDONYM") {
			self.pseudonym = v;
		}
		if let Ok(v) = std::env::var("ESCALE_PASSPHRASE") {
			self.passphrase = Some(v);
		}
		if let Ok(v) = std::env::var("ESCALE_LICENSE_ACCEPTED") {
			self.license_accepted = v == "1" || v.eq_ignore_ascii_case("true");
		}
	}

	pub fn validate(&self) -> Result<(), SyncError> {
		if self.relay_uri.is_empty() {
			return Err(SyncError::Config { message: "relay-uri must be set".to_string() });
		}
		if self.pseudonym.is_empty() {
			return Err(SyncError::Config { message: "pseudonym must be set".to_string() });
		}
		if self.passphrase.is_some() && self.kdf_salt.is_empty() {
			return Err(SyncError::Config {
				message: "kdf-salt must be set when a passphrase is configured".to_string(),
			});
		}
		validation::validate_timeout_secs(self.relay_timeout.as_secs() as u32)
			.map_err(|e| SyncError::Config { message: e.to_string() })?;
		Ok(())
	}
}

mod duration_secs {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_u64(d.as_secs())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		let secs = u64::deserialize(d)?;
		Ok(Duration::from_secs(secs))
	}
}


// vim: ts=4
