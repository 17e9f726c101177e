//! File property filters (size, age, type)

use super::ExclusionError;
use std::fs::Metadata;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Filter files based on size, age, and type
pub struct FileFilter {
	size: Option<SizeFilter>,
	age: Option<AgeFilter>,
	types: Option<TypeFilter>,
}

impl FileFilter {
	/// Create a new file filter
	pub fn new(
		min_size: Option<u64>,
		max_size: Option<u64>,
		min_age: Option<Duration>,
		max_age: Option<Duration>,
		filter_types: Option<&str>,
	) -> Result<Self, ExclusionError> {
		let size = if min_size.is_some() || max_size.is_some() {
			Some(SizeFilter::new(min_size, max_size)?)
		} else {
			None
		};

		let age = if min_age.is_some() || max_age.is_some() {
			Some(AgeFilter::new(min_age, max_age)?)
		} else {
			None
		};

		let types = if let Some(types_str) = filter_types {
			Some(TypeFilter::new(types_str)?)
		} else {
			None
		};

		Ok(Self { size, age, types })
	}

	/// Check if a file matches all configured filters
	///
	/// Returns true if the file passes all filters (should be included).
	/// Returns false if the file fails any filter (should be excluded).
	pub fn matches(&self, path: &Path, metadata: &Metadata) -> bool {
		// Check size filter
		if let Some(ref size_filter) = self.size {
			if !size_filter.matches(metadata) {
				return false;
			}
		}

		// Check age filter
		if let Some(ref age_filter) = self.age {
			if !age_filter.matches(metadata) {
				return false;
			}
		}

		// Check type filter
		if let Some(ref type_filter) = self.types {
			if !type_filter.matches(path, metadata) {
				return false;
			}
		}

		true
	}
}

/// Filter files by size
#[derive(Debug, Clone)]
pub struct SizeFilter {
	min_size: Option<u64>,
	max_size: Option<u64>,
}

impl SizeFilter {
	/// Create a new size filter
	pub fn new(min_size: Option<u64>, max_size: Option<u64>) -> Result<Self, ExclusionError> {
		if let (Some(min), Some(max)) = (min_size, max_size) {
			if min > max {
				return Err(ExclusionError::InvalidFilter(
					"min_size cannot be greater than max_size".to_string(),
				));
			}
		}

		Ok(Self { min_size, max_size })
	}

	/// Check if a file matches the size filter
	pub fn matches(&self, metadata: &Metadata) -> bool {
		let size = metadata.len();

		if let Some(min) = self.min_size {
			if size < min {
				return false;
			}
		}

		if let Some(max) = self.max_size {
			if size > max {
				return false;
			}
		}

		true
	}

	/// Parse a size string (e.g., "10K", "5M", "1G")
	pub fn parse_size(s: &str) -> Result<u64, ExclusionError> {
		let s = s.trim().to_uppercase();

		let (num_str, multiplier) = if s.ends_with('K') {
			(&s[..s.len() - 1], 1024u64)
		} else if s.ends_with('M') {
			(&s[..s.len() - 1], 1024 * 1024)
		} else if s.ends_with('G') {
			(&s[..s.len() - 1], 1024 * 1024 * 1024)
		} else if s.ends_with('T') {
			(&s[..s.len() - 1], 1024 * 1024 * 1024 * 1024)
		} else {
			(s.as_str(), 1)
		};

		let num: u64 = num_str
			.parse()
			.map_err(|_| ExclusionError::InvalidFilter(format!("Invalid size: {}", s)))?;

		Ok(num * multiplier)
	}
}

/// Filter files by age (modification time)
#[derive(Debug, Clone)]
pub struct AgeFilter {
	min_age: Option<Duration>,
	max_age: Option<Duration>,
}

impl AgeFilter {
	/// Create a new age filter
	pub fn new(
		min_age: Option<Duration>,
		max_age: Option<Duration>,
	) -> Result<Self, ExclusionError> {
		if let (Some(min), Some(max)) = (min_age, max_age) {
			if min > max {
				return Err(ExclusionError::InvalidFilter(
					"min_age cannot be greater than max_age".to_string(),
				));
			}
		}

		Ok(Self { min_age, max_age })
	}

	/// Check if a file matches the age filter
	pub fn matches(&self, metadata: &Metadata) -> bool {
		let modified = match metadata.modified() {
			Ok(time) => time,
			Err(_) => return true, // If we can't get mtime, don't filter it out
		};

		let now = SystemTime::now();
		let age = match now.duration_since(modified) {
			Ok(duration) => duration,
			Err(_) => return true, // File is in the future? Don't filter it out
		};

		if let Some(min) = self.min_age {
			if age < min {
				return false;
			}
		}

		if let Some(max) = self.max_age {
			if age > max {
				return false;
			}
		}

		true
	}

	/// Parse a duration string (e.g., "7d", "2h", "30m", "90s")
	pub fn parse_duration(s: &str) -> Result<Duration, ExclusionError> {
		let s = s.trim().to_lowercase();

		let (num_str, multiplier) = if s.ends_with('d') {
			(&s[..s.len() - 1], 24 * 60 * 60)
		} else if s.ends_with('h') {
			(&s[..s.len() - 1], 60 * 60)
		} else if s.ends_with('m') {
			(&s[..s.len() - 1], 60)
		} else if s.ends_with('s') {
			(&s[..s.len() - 1], 1)
		} else if s.ends_with("ms") {
			return Err(ExclusionError::InvalidFilter(
				"Milliseconds not supported for age filter".to_string(),
			));
		} else {
			// Default to seconds if no unit specified
			(s.as_str(), 1)
		};

		let num: u64 = num_str
			.parse()
			.map_err(|_| ExclusionError::InvalidFilter(format!("Invalid duration: {}", s)))?;

		Ok(Duration::from_secs(num * multiplier))
	}
}

/// Filter files by type (file, dir, symlink)
#[derive(Debug, Clone)]
pub struct TypeFilter {
	allow_files: bool,
	allow_dirs: bool,
	allow_symlinks: bool,
}

impl TypeFilter {
	/// Create a new type filter from a comma-separated string
	///
	/// Examples: "file", "dir", "file,symlink"
	pub fn new(types: &str) -> Result<Self, ExclusionError> {
		let mut allow_files = false;
		let mut allow_dirs = false;
		let mut allow_symlinks = false;

		for t in types.split(',').map(|s| s.trim().to_lowercase()) {
			match t.as_str() {
				"file" | "files" | "f" => allow_files = true,
				"dir" | "directory" | "directories" | "d" => allow_dirs = true,
				"symlink" | "link" | "l" => allow_symlinks = true,
				_ => {
					return Err(ExclusionError::InvalidFilter(format!(
						"Invalid file type: {}. Valid types: file, dir, symlink",
						t
					)))
				}
			}
		}

		if !allow_files && !allow_dirs && !allow_symlinks {
			return Err(ExclusionError::InvalidFilter(
				"At least one file type must be specified".to_string(),
			));
		}

		Ok(Self { allow_files, allow_dirs, allow_symlinks })
	}

	/// Check if a file matches the type filter
	pub fn matches(&self, _path: &Path, metadata: &Metadata) -> bool {
		let file_type = metadata.file_type();

		if file_type.is_file() {
			self.allow_files
		} else if file_type.is_dir() {
			self.allow_dirs
		} else if file_type.is_symlink() {
			self.allow_symlinks
		} else {
			// Unknown file type - allow by default
			true
		}
	}
}
