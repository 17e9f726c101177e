//! The local durable index (C5): a per-repository cache, not authoritative,
//! mapping `LogicalPath` to last-known local/remote state, plus a small set
//! of global counters (§3, §4.5).
//!
//! Backed by `redb`, the same embedded-database pattern the teacher's file
//! cache used, with records encoded via `bincode`.

use std::path::Path;

use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, SyncError};
use crate::strategies::AccessMode;

/// What the engine last knew about a `LogicalPath`, used to compute
/// `local_state`/`remote_state` in the decision table (§4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
	pub last_local_mtime: Option<u64>,
	pub last_local_hash: Option<String>,
	pub last_pushed_version: Option<u64>,
	pub last_pulled_version: Option<u64>,
	pub last_pulled_hash: Option<String>,
	pub read_access: AccessMode,
	pub write_access: AccessMode,
}

impl Default for IndexEntry {
	fn default() -> Self {
		Self {
			last_local_mtime: None,
			last_local_hash: None,
			last_pushed_version: None,
			last_pulled_version: None,
			last_pulled_hash: None,
			read_access: AccessMode::Allowed,
			write_access: AccessMode::Allowed,
		}
	}
}

const ENTRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");
const COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

const SCHEMA_VERSION: u64 = 1;
const KEY_SCHEMA_VERSION: &str = "schema_version";
const KEY_LAST_FULL_SCAN: &str = "last_full_scan_time";

/// A repository's durable index, one `redb` database per repository.
pub struct Index {
	db: redb::Database,
}

impl Index {
	pub fn open(db_path: &Path) -> Result<Self, IndexError> {
		let db = redb::Database::create(db_path)
			.map_err(|e| IndexError::LoadFailed { source: Box::new(e) })?;

		let write_txn =
			db.begin_write().map_err(|e| IndexError::LoadFailed { source: Box::new(e) })?;
		{
			let _ = write_txn
				.open_table(ENTRIES_TABLE)
				.map_err(|e| IndexError::LoadFailed { source: Box::new(e) })?;
			let mut counters = write_txn
				.open_table(COUNTERS_TABLE)
				.map_err(|e| IndexError::LoadFailed { source: Box::new(e) })?;
			if counters
				.get(KEY_SCHEMA_VERSION)
				.map_err(|e| IndexError::LoadFailed { source: Box::new(e) })?
				.is_none()
			{
				counters
					.insert(KEY_SCHEMA_VERSION, SCHEMA_VERSION)
					.map_err(|e| IndexError::SaveFailed { source: Box::new(e) })?;
			}
		}
		write_txn.commit().map_err(|e| IndexError::SaveFailed { source: Box::new(e) })?;

		Ok(Index { db })
	}

	pub fn get(&self, logical_path: &str) -> Result<Option<IndexEntry>, IndexError> {
		let read_txn =
			self.db.begin_read().map_err(|e| IndexError::LoadFailed { source: Box::new(e) })?;
		let table = read_txn
			.open_table(ENTRIES_TABLE)
			.map_err(|e| IndexError::LoadFailed { source: Box::new(e) })?;

		match table.get(logical_path).map_err(|e| IndexError::LoadFailed { source: Box::new(e) })? {
			Some(value) => {
				let entry: IndexEntry = bincode::deserialize(value.value())
					.map_err(|_| IndexError::Corrupted { message: logical_path.to_string() })?;
				Ok(Some(entry))
			}
			None => Ok(None),
		}
	}

	pub fn set(&self, logical_path: &str, entry: &IndexEntry) -> Result<(), IndexError> {
		let bytes = bincode::serialize(entry).map_err(|e| IndexError::SaveFailed {
			source: Box::new(std::io::Error::other(e.to_string())),
		})?;

		let write_txn =
			self.db.begin_write().map_err(|e| IndexError::SaveFailed { source: Box::new(e) })?;
		{
			let mut table = write_txn
				.open_table(ENTRIES_TABLE)
				.map_err(|e| IndexError::SaveFailed { source: Box::new(e) })?;
			table
				.insert(logical_path, bytes.as_slice())
				.map_err(|e| IndexError::SaveFailed { source: Box::new(e) })?;
		}
		write_txn.commit().map_err(|e| IndexError::SaveFailed { source: Box::new(e) })?;
		Ok(())
	}

	pub fn remove(&self, logical_path: &str) -> Result<(), IndexError> {
		let write_txn =
			self.db.begin_write().map_err(|e| IndexError::SaveFailed { source: Box::new(e) })?;
		{
			let mut table = write_txn
				.open_table(ENTRIES_TABLE)
				.map_err(|e| IndexError::SaveFailed { source: Box::new(e) })?;
			table.remove(logical_path).map_err(|e| IndexError::SaveFailed { source: Box::new(e) })?;
		}
		write_txn.commit().map_err(|e| IndexError::SaveFailed { source: Box::new(e) })?;
		Ok(())
	}

	/// All known logical paths, used by the scheduler to build its work set
	/// alongside the relay snapshot.
	pub fn all_paths(&self) -> Result<Vec<String>, IndexError> {
		let read_txn =
			self.db.begin_read().map_err(|e| IndexError::LoadFailed { source: Box::new(e) })?;
		let table = read_txn
			.open_table(ENTRIES_TABLE)
			.map_err(|e| IndexError::LoadFailed { source: Box::new(e) })?;
		let mut out = Vec::new();
		for item in table.iter().map_err(|e| IndexError::LoadFailed { source: Box::new(e) })? {
			let (key, _) = item.map_err(|e| IndexError::LoadFailed { source: Box::new(e) })?;
			out.push(key.value().to_string());
		}
		Ok(out)
	}

	pub fn last_full_scan_time(&self) -> Result<Option<u64>, IndexError> {
		let read_txn =
			self.db.begin_read().map_err(|e| IndexError::LoadFailed { source: Box::new(e) })?;
		let table = read_txn
			.open_table(COUNTERS_TABLE)
			.map_err(|e| IndexError::LoadFailed { source: Box::new(e) })?;
		Ok(table.get(KEY_LAST_FULL_SCAN).map_err(|e| IndexError::LoadFailed { source: Box::new(e) })?.map(|v| v.value()))
	}

	pub fn record_full_scan(&self, at_secs: u64) -> Result<(), IndexError> {
		let write_txn =
			self.db.begin_write().map_err(|e| IndexError::SaveFailed { source: Box::new(e) })?;
		{
			let mut counters = write_txn
				.open_table(COUNTERS_TABLE)
				.map_err(|e| IndexError::SaveFailed { source: Box::new(e) })?;
			counters
				.insert(KEY_LAST_FULL_SCAN, at_secs)
				.map_err(|e| IndexError::SaveFailed { source: Box::new(e) })?;
		}
		write_txn.commit().map_err(|e| IndexError::SaveFailed { source: Box::new(e) })?;
		Ok(())
	}

	/// Drop every entry, forcing the next scan to rebuild the index from
	/// scratch (P8: index rebuild is a no-op on steady-state content).
	pub fn clear(&self) -> Result<(), SyncError> {
		let paths = self.all_paths().map_err(SyncError::Index)?;
		for path in paths {
			self.remove(&path).map_err(SyncError::Index)?;
		}
		Ok(())
	}
}


// vim: ts=4
