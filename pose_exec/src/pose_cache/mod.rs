//! # Pose Cache
//!
//! Durable storage of the single latest robot pose. The cache owns one plain text file holding a
//! [`PoseRecord`], which is replaced in full on every save.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod record;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace, warn};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

#[cfg(unix)]
use std::os::unix::fs::DirBuilderExt;

// Internal
pub use record::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Permissions given to a newly created cache directory (before the umask is applied).
#[cfg(unix)]
pub const CACHE_DIR_MODE: u32 = 0o777;

/// Default name of the record file within the cache directory.
pub const DEFAULT_FILE_NAME: &str = "pose.txt";

/// Suffix of the scratch file a record is written to before replacing the cached one.
const SCRATCH_SUFFIX: &str = ".tmp";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Handle to the on-disk pose record.
#[derive(Debug, Clone)]
pub struct PoseCache {
    cache_dir: PathBuf,
    file_path: PathBuf,
    scratch_path: PathBuf,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while accessing the pose cache.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Could not create the cache directory {0:?}: {1}")]
    CreateFailed(PathBuf, io::Error),

    #[error("Could not write the pose record to {0:?}: {1}")]
    WriteFailed(PathBuf, io::Error),

    #[error("Could not read the pose record from {0:?}: {1}")]
    ReadFailed(PathBuf, io::Error),

    #[error("Could not parse the pose record in {0:?}: {1}")]
    ParseFailed(PathBuf, RecordParseError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PoseCache {
    /// Create a new cache handle for the file `file_name` in `cache_dir`.
    ///
    /// Nothing is touched on disk until [`PoseCache::ensure_storage_ready`] or
    /// [`PoseCache::save`] is called.
    pub fn new<P: AsRef<Path>>(cache_dir: P, file_name: &str) -> Self {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        let file_path = cache_dir.join(file_name);
        let scratch_path = cache_dir.join(format!("{}{}", file_name, SCRATCH_SUFFIX));

        Self {
            cache_dir,
            file_path,
            scratch_path,
        }
    }

    /// Path to the record file.
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Make sure the cache directory exists, creating it if needed.
    ///
    /// Calling this on an existing directory does nothing.
    pub fn ensure_storage_ready(&self) -> Result<(), StorageError> {
        if self.cache_dir.is_dir() {
            info!("Cache directory {:?} already exists", self.cache_dir);
            return Ok(());
        }

        // Something other than a directory is in the way
        if self.cache_dir.exists() {
            return Err(StorageError::CreateFailed(
                self.cache_dir.clone(),
                io::Error::new(io::ErrorKind::AlreadyExists, "path exists but is not a directory"),
            ));
        }

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(CACHE_DIR_MODE);

        builder
            .create(&self.cache_dir)
            .map_err(|e| StorageError::CreateFailed(self.cache_dir.clone(), e))?;

        info!("Cache directory {:?} created", self.cache_dir);

        Ok(())
    }

    /// Return whether a record has been persisted.
    pub fn exists(&self) -> bool {
        self.file_path.is_file()
    }

    /// Replace the persisted record with `record`.
    ///
    /// The record is written to a scratch file which is then renamed over the record file, so the
    /// file never holds part of one record or leftovers of a previous one.
    pub fn save(&self, record: PoseRecord) -> Result<(), StorageError> {
        let result = self.write_scratch(&record)
            .and_then(|_| fs::rename(&self.scratch_path, &self.file_path));

        match result {
            Ok(_) => {
                trace!("Saved pose record {} to {:?}", record, self.file_path);
                Ok(())
            }
            Err(e) => {
                // Best effort, the scratch file may not exist
                fs::remove_file(&self.scratch_path).ok();
                Err(StorageError::WriteFailed(self.file_path.clone(), e))
            }
        }
    }

    /// Read the persisted record.
    pub fn load(&self) -> Result<PoseRecord, StorageError> {
        let contents = fs::read_to_string(&self.file_path)
            .map_err(|e| StorageError::ReadFailed(self.file_path.clone(), e))?;

        let record = contents
            .parse::<PoseRecord>()
            .map_err(|e| StorageError::ParseFailed(self.file_path.clone(), e))?;

        debug!("Loaded pose record {} from {:?}", record, self.file_path);

        Ok(record)
    }

    /// Read the persisted record if there is a usable one.
    ///
    /// A missing record, or one which can't be read, is logged and treated as no record at all.
    pub fn load_if_present(&self) -> Option<PoseRecord> {
        if !self.exists() {
            info!("No saved robot pose at {:?}", self.file_path);
            return None;
        }

        info!("Saved robot pose file exists at {:?}", self.file_path);

        match self.load() {
            Ok(r) => Some(r),
            Err(e) => {
                warn!("Ignoring the saved robot pose: {}", e);
                None
            }
        }
    }

    fn write_scratch(&self, record: &PoseRecord) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&self.scratch_path)?;

        file.write_all(record.to_string().as_bytes())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NUM_TEST_DIRS: AtomicUsize = AtomicUsize::new(0);

    /// Get a fresh, not yet existing, directory path under the system temp directory.
    pub(crate) fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "pose_cache_{}_{}_{}",
            name,
            std::process::id(),
            NUM_TEST_DIRS.fetch_add(1, Ordering::Relaxed)
        ));
        fs::remove_dir_all(&dir).ok();
        dir
    }

    fn ready_cache(name: &str) -> PoseCache {
        let cache = PoseCache::new(test_dir(name).join("cache"), DEFAULT_FILE_NAME);
        cache.ensure_storage_ready().unwrap();
        cache
    }

    #[test]
    fn test_cold_start() {
        let cache = PoseCache::new(test_dir("cold"), DEFAULT_FILE_NAME);

        assert!(!cache.exists());
        assert!(matches!(cache.load(), Err(StorageError::ReadFailed(_, _))));
    }

    #[test]
    fn test_ensure_storage_ready_idempotent() {
        let dir = test_dir("bootstrap").join("nested").join("cache");
        let cache = PoseCache::new(&dir, DEFAULT_FILE_NAME);

        cache.ensure_storage_ready().unwrap();
        assert!(dir.is_dir());

        cache.ensure_storage_ready().unwrap();
        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_ensure_storage_ready_blocked_by_file() {
        let root = test_dir("blocked");
        fs::create_dir_all(&root).unwrap();
        let blocker = root.join("cache");
        fs::write(&blocker, "not a directory").unwrap();

        let cache = PoseCache::new(&blocker, DEFAULT_FILE_NAME);

        assert!(matches!(
            cache.ensure_storage_ready(),
            Err(StorageError::CreateFailed(_, _))
        ));
    }

    #[test]
    fn test_save_load() {
        let cache = ready_cache("save_load");
        let rec = PoseRecord::new(1.234567891, -9.87654321, 0.38268343236509, 0.923879532511287);

        cache.save(rec).unwrap();

        assert!(cache.exists());
        assert_eq!(cache.load().unwrap(), rec);
    }

    #[test]
    fn test_save_overwrites() {
        let cache = ready_cache("overwrite");

        cache.save(PoseRecord::new(-123.456789, 98765.4321, -0.70710678, 0.70710678)).unwrap();
        cache.save(PoseRecord::new(1.0, 2.0, 0.0, 1.0)).unwrap();

        assert_eq!(fs::read_to_string(cache.path()).unwrap(), "1 2 0 1");
        assert_eq!(cache.load().unwrap(), PoseRecord::new(1.0, 2.0, 0.0, 1.0));

        // Only the record file is left behind
        assert_eq!(fs::read_dir(cache.path().parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_save_without_directory() {
        let cache = PoseCache::new(test_dir("no_dir"), DEFAULT_FILE_NAME);

        assert!(matches!(
            cache.save(PoseRecord::new(1.0, 2.0, 0.0, 1.0)),
            Err(StorageError::WriteFailed(_, _))
        ));
        assert!(!cache.exists());
    }

    #[test]
    fn test_load_malformed() {
        let cache = ready_cache("malformed");

        fs::write(cache.path(), "1.0 2.0 0.0").unwrap();
        assert!(matches!(
            cache.load(),
            Err(StorageError::ParseFailed(_, RecordParseError::TooFewValues(3)))
        ));

        fs::write(cache.path(), "").unwrap();
        assert!(matches!(
            cache.load(),
            Err(StorageError::ParseFailed(_, RecordParseError::TooFewValues(0)))
        ));

        fs::write(cache.path(), "1.0 2.0 zero 1.0").unwrap();
        assert!(matches!(
            cache.load(),
            Err(StorageError::ParseFailed(_, RecordParseError::InvalidNumber("orient_z", _)))
        ));
    }

    #[test]
    fn test_load_if_present() {
        let cache = ready_cache("load_if_present");
        assert_eq!(cache.load_if_present(), None);

        fs::write(cache.path(), "1 2 x 4").unwrap();
        assert_eq!(cache.load_if_present(), None);

        cache.save(PoseRecord::new(1.0, 2.0, 0.0, 1.0)).unwrap();
        assert_eq!(cache.load_if_present(), Some(PoseRecord::new(1.0, 2.0, 0.0, 1.0)));
    }
}
