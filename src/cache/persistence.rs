//! Persistence adapters invoked with the serialized cache state.

// std
use std::{
	fs::{self, File},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{_prelude::*, error::CacheError};

/// Storage boundary for the serialized cache.
///
/// Implementations receive the whole state on every flush; `load` runs once while the
/// service bundle initializes.
pub trait CachePersistence
where
	Self: Send + Sync,
{
	/// Returns previously written bytes, or `None` when nothing was stored.
	fn load(&self) -> Result<Option<Vec<u8>>, CacheError>;

	/// Replaces the stored bytes.
	fn write(&self, bytes: &[u8]) -> Result<(), CacheError>;
}

/// Discards writes; the cache stays purely in memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPersistence;
impl CachePersistence for NoopPersistence {
	fn load(&self) -> Result<Option<Vec<u8>>, CacheError> {
		Ok(None)
	}

	fn write(&self, _: &[u8]) -> Result<(), CacheError> {
		Ok(())
	}
}

/// Keeps the last written state in memory and counts writes.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
	state: Mutex<Option<Vec<u8>>>,
	writes: Mutex<usize>,
}
impl MemoryPersistence {
	/// Starts from previously serialized bytes.
	pub fn with_state(bytes: Vec<u8>) -> Self {
		Self { state: Mutex::new(Some(bytes)), writes: Mutex::new(0) }
	}

	/// Last written bytes.
	pub fn state(&self) -> Option<Vec<u8>> {
		self.state.lock().clone()
	}

	/// Number of writes observed.
	pub fn write_count(&self) -> usize {
		*self.writes.lock()
	}
}
impl CachePersistence for MemoryPersistence {
	fn load(&self) -> Result<Option<Vec<u8>>, CacheError> {
		Ok(self.state())
	}

	fn write(&self, bytes: &[u8]) -> Result<(), CacheError> {
		*self.state.lock() = Some(bytes.to_vec());
		*self.writes.lock() += 1;

		Ok(())
	}
}

/// Writes the cache to a JSON file, replacing it atomically through a temporary sibling.
#[derive(Clone, Debug)]
pub struct FilePersistence {
	path: PathBuf,
}
impl FilePersistence {
	/// Targets `path`, creating its parent directory when needed.
	pub fn new(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		Ok(Self { path })
	}

	/// Target file.
	pub fn path(&self) -> &Path {
		&self.path
	}
}
impl CachePersistence for FilePersistence {
	fn load(&self) -> Result<Option<Vec<u8>>, CacheError> {
		match fs::read(&self.path) {
			Ok(bytes) if bytes.is_empty() => Ok(None),
			Ok(bytes) => Ok(Some(bytes)),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
			Err(e) => Err(CacheError::Backend {
				message: format!("Failed to read {}: {e}", self.path.display()),
			}),
		}
	}

	fn write(&self, bytes: &[u8]) -> Result<(), CacheError> {
		ensure_parent_exists(&self.path)?;

		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| CacheError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(bytes).map_err(|e| CacheError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| CacheError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| CacheError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}

fn ensure_parent_exists(path: &Path) -> Result<(), CacheError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| CacheError::Backend {
			message: format!("Failed to create cache directory {}: {e}", parent.display()),
		})?;
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;

	fn temp_path() -> PathBuf {
		let unique = format!(
			"oauth2_token_cache_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[test]
	fn file_round_trip() {
		let path = temp_path();
		let persistence = FilePersistence::new(&path).expect("File persistence should open.");

		assert_eq!(persistence.load().expect("Missing file should load as empty."), None);

		persistence.write(b"{\"AccessToken\":{}}").expect("Write should succeed.");

		assert_eq!(
			persistence.load().expect("Load should succeed.").as_deref(),
			Some(&b"{\"AccessToken\":{}}"[..])
		);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary cache file {}: {e}", path.display())
		});
	}

	#[test]
	fn memory_counts_writes() {
		let persistence = MemoryPersistence::default();

		persistence.write(b"a").expect("Write should succeed.");
		persistence.write(b"b").expect("Write should succeed.");

		assert_eq!(persistence.write_count(), 2);
		assert_eq!(persistence.state().as_deref(), Some(&b"b"[..]));
	}
}
