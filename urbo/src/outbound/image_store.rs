//! Capability-scoped snapshot image storage.
//!
//! Images live as flat files in one directory opened through
//! `cap_std::fs::Dir`, so no operation can reach outside it. Writes go to a
//! hidden temporary file that is synced and renamed into place. After every
//! write the directory is trimmed to its byte budget, evicting the oldest
//! files by modification time. Leased files and the file just written are
//! never evicted.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use cap_std::{ambient_authority, fs::Dir};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ports::{ImageLease, ImageStore, ImageStoreError};

const TEMP_PREFIX: char = '.';

type LeaseCounts = Arc<Mutex<HashMap<String, usize>>>;

fn lock_leases(leases: &Mutex<HashMap<String, usize>>) -> MutexGuard<'_, HashMap<String, usize>> {
    match leases.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn io_error(context: &str, file_name: &str, err: &io::Error) -> ImageStoreError {
    ImageStoreError::io(format!("{context} {file_name}: {err}"))
}

/// Image store backed by one directory.
pub struct CapStdImageStore {
    dir: Dir,
    max_bytes: u64,
    leases: LeaseCounts,
}

impl CapStdImageStore {
    /// Open (creating if needed) the image directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageStoreError::Io`] when the directory cannot be created
    /// or opened.
    pub fn open(path: &Path, max_bytes: u64) -> Result<Self, ImageStoreError> {
        Dir::create_ambient_dir_all(path, ambient_authority())
            .map_err(|err| io_error("create", &path.display().to_string(), &err))?;
        let dir = Dir::open_ambient_dir(path, ambient_authority())
            .map_err(|err| io_error("open", &path.display().to_string(), &err))?;
        Ok(Self {
            dir,
            max_bytes,
            leases: Arc::default(),
        })
    }

    /// Configured byte budget.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn write_durably(&self, file_name: &str, bytes: &[u8]) -> Result<(), ImageStoreError> {
        let temp_name = format!("{TEMP_PREFIX}{file_name}.tmp");
        let mut file = self
            .dir
            .create(&temp_name)
            .map_err(|err| io_error("create", &temp_name, &err))?;
        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|err| io_error("write", &temp_name, &err))?;
        drop(file);
        self.dir
            .rename(&temp_name, &self.dir, file_name)
            .map_err(|err| io_error("rename", file_name, &err))
    }

    /// Evict oldest files until the directory fits the budget.
    ///
    /// Callers hold the lease lock so no lease can start mid-eviction.
    fn enforce_retention(
        &self,
        leases: &HashMap<String, usize>,
        keep: &str,
    ) -> Result<(), ImageStoreError> {
        let mut images = self.list_images()?;
        let mut total: u64 = images.iter().map(|image| image.len).sum();
        if total <= self.max_bytes {
            return Ok(());
        }
        images.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));
        for image in images {
            if total <= self.max_bytes {
                break;
            }
            if image.name == keep || leases.contains_key(&image.name) {
                continue;
            }
            match self.dir.remove_file(&image.name) {
                Ok(()) => {
                    total = total.saturating_sub(image.len);
                    debug!(file_name = %image.name, bytes = image.len, "image evicted");
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    total = total.saturating_sub(image.len);
                }
                Err(err) => warn!(file_name = %image.name, error = %err, "image eviction failed"),
            }
        }
        if total > self.max_bytes {
            debug!(total, max_bytes = self.max_bytes, "image budget exceeded by pinned files");
        }
        Ok(())
    }

    fn list_images(&self) -> Result<Vec<StoredImage>, ImageStoreError> {
        let entries = self
            .dir
            .entries()
            .map_err(|err| io_error("list", ".", &err))?;
        let mut images = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_error("list", ".", &err))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            let metadata = entry
                .metadata()
                .map_err(|err| io_error("stat", &name, &err))?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .map(|time| time.into_std())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            images.push(StoredImage {
                name,
                len: metadata.len(),
                modified,
            });
        }
        Ok(images)
    }
}

struct StoredImage {
    name: String,
    len: u64,
    modified: SystemTime,
}

struct LeasePin {
    leases: LeaseCounts,
    file_name: String,
}

impl Drop for LeasePin {
    fn drop(&mut self) {
        let mut leases = lock_leases(&self.leases);
        if let Some(count) = leases.get_mut(&self.file_name) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                leases.remove(&self.file_name);
            }
        }
    }
}

fn validate_name(file_name: &str) -> Result<(), ImageStoreError> {
    let valid = !file_name.is_empty()
        && !file_name.starts_with(TEMP_PREFIX)
        && !file_name.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(ImageStoreError::invalid_name(file_name))
    }
}

impl ImageStore for CapStdImageStore {
    fn generate_file_name(&self) -> String {
        format!("{}.jpg", Uuid::new_v4())
    }

    fn write(&self, file_name: &str, bytes: &[u8]) -> Result<(), ImageStoreError> {
        validate_name(file_name)?;
        let leases = lock_leases(&self.leases);
        self.write_durably(file_name, bytes)?;
        debug!(file_name, bytes = bytes.len(), "image stored");
        self.enforce_retention(&leases, file_name)
    }

    fn lease(&self, file_name: &str) -> Result<ImageLease, ImageStoreError> {
        validate_name(file_name)?;
        let mut leases = lock_leases(&self.leases);
        let bytes = self.dir.read(file_name).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                ImageStoreError::not_found(file_name)
            } else {
                io_error("read", file_name, &err)
            }
        })?;
        *leases.entry(file_name.to_owned()).or_insert(0) += 1;
        let pin = LeasePin {
            leases: Arc::clone(&self.leases),
            file_name: file_name.to_owned(),
        };
        Ok(ImageLease::new(file_name, bytes, pin))
    }

    fn remove(&self, file_name: &str) -> Result<bool, ImageStoreError> {
        validate_name(file_name)?;
        let leases = lock_leases(&self.leases);
        if leases.contains_key(file_name) {
            debug!(file_name, "leased image kept");
            return Ok(false);
        }
        match self.dir.remove_file(file_name) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_error("remove", file_name, &err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::cap_fs::{age_file, path_exists, read_file};
    use rstest::rstest;
    use std::time::Duration;
    use tempfile::TempDir;

    fn store(max_bytes: u64) -> (TempDir, CapStdImageStore) {
        let root = tempfile::tempdir().expect("temp dir");
        let store = CapStdImageStore::open(&root.path().join("images"), max_bytes)
            .expect("store opens");
        (root, store)
    }

    fn image_path(root: &TempDir, name: &str) -> std::path::PathBuf {
        root.path().join("images").join(name)
    }

    fn write_aged(root: &TempDir, store: &CapStdImageStore, name: &str, bytes: &[u8], age_secs: u64) {
        store.write(name, bytes).expect("write succeeds");
        age_file(&image_path(root, name), Duration::from_secs(age_secs)).expect("age file");
    }

    #[rstest]
    fn written_image_can_be_leased_and_read() {
        let (root, store) = store(1024);

        store.write("a.jpg", b"jpeg-bytes").expect("write succeeds");
        let lease = store.lease("a.jpg").expect("lease succeeds");

        assert_eq!(lease.file_name(), "a.jpg");
        assert_eq!(lease.read(), b"jpeg-bytes");
        assert_eq!(
            read_file(&image_path(&root, "a.jpg")).expect("file on disk"),
            b"jpeg-bytes"
        );
        assert!(!path_exists(&image_path(&root, ".a.jpg.tmp")));
    }

    #[rstest]
    fn leasing_missing_image_is_not_found() {
        let (_root, store) = store(1024);

        let error = store.lease("missing.jpg").expect_err("nothing to lease");

        assert!(matches!(error, ImageStoreError::NotFound { .. }));
    }

    #[rstest]
    #[case("")]
    #[case("../escape.jpg")]
    #[case("nested/a.jpg")]
    #[case(".hidden.jpg")]
    #[case("back\\slash.jpg")]
    fn invalid_names_are_rejected(#[case] name: &str) {
        let (_root, store) = store(1024);

        let error = store.write(name, b"x").expect_err("name rejected");

        assert!(matches!(error, ImageStoreError::InvalidName { .. }));
    }

    #[rstest]
    fn leased_image_survives_remove_until_released() {
        let (root, store) = store(1024);
        store.write("a.jpg", b"abc").expect("write succeeds");

        let lease = store.lease("a.jpg").expect("lease succeeds");
        assert!(!store.remove("a.jpg").expect("remove call succeeds"));
        assert!(path_exists(&image_path(&root, "a.jpg")));

        drop(lease);
        assert!(store.remove("a.jpg").expect("remove call succeeds"));
        assert!(!path_exists(&image_path(&root, "a.jpg")));
        assert!(!store.remove("a.jpg").expect("already gone"));
    }

    #[rstest]
    fn retention_evicts_oldest_first() {
        let (root, store) = store(10);
        write_aged(&root, &store, "old.jpg", b"1111", 30);
        write_aged(&root, &store, "mid.jpg", b"2222", 20);

        store.write("new.jpg", b"3333").expect("write succeeds");

        assert!(!path_exists(&image_path(&root, "old.jpg")));
        assert!(path_exists(&image_path(&root, "mid.jpg")));
        assert!(path_exists(&image_path(&root, "new.jpg")));
    }

    #[rstest]
    fn retention_skips_leased_images() {
        let (root, store) = store(10);
        write_aged(&root, &store, "old.jpg", b"1111", 30);
        write_aged(&root, &store, "mid.jpg", b"2222", 20);
        let _lease = store.lease("old.jpg").expect("lease succeeds");

        store.write("new.jpg", b"3333").expect("write succeeds");

        assert!(path_exists(&image_path(&root, "old.jpg")));
        assert!(!path_exists(&image_path(&root, "mid.jpg")));
        assert!(path_exists(&image_path(&root, "new.jpg")));
    }

    #[rstest]
    fn retention_never_evicts_the_image_just_written() {
        let (root, store) = store(3);

        store.write("big.jpg", b"larger than budget").expect("write succeeds");

        assert!(path_exists(&image_path(&root, "big.jpg")));
    }

    #[rstest]
    fn generated_names_are_unique_valid_jpegs() {
        let (_root, store) = store(1024);

        let first = store.generate_file_name();
        let second = store.generate_file_name();

        assert_ne!(first, second);
        assert!(first.ends_with(".jpg"));
        assert!(validate_name(&first).is_ok());
    }
}
