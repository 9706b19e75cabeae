use crate::error::StoreError;
use crate::skywatch::record::Collection;
use crate::skywatch::store::{
    IndexStore, Precondition, Receipt, Snapshot, SourceRef, Version, decode_collection,
    encode_collection,
};
use fs2::FileExt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tempfile::NamedTempFile;

const SOURCE_EXTENSIONS: &[&str] = &["json", "json5"];

/// A local directory laid out like an object-store bucket: keys are relative
/// paths under `root`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(key.trim_start_matches('/'));
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if key.trim().is_empty() || escapes {
            return Err(StoreError::io(
                key,
                std::io::Error::new(ErrorKind::InvalidInput, "key escapes the store root"),
            ));
        }
        Ok(self.root.join(rel))
    }

    fn read_optional(path: &Path, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::io(key, err)),
        }
    }

    fn lock_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        path.with_file_name(name)
    }

    fn collect_sources(&self, dir: &Path, out: &mut Vec<SourceRef>) -> Result<(), StoreError> {
        let location = dir.display().to_string();
        let entries = fs::read_dir(dir).map_err(|err| StoreError::io(&location, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::io(&location, err))?;
            let path = entry.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if hidden {
                continue;
            }
            if path.is_dir() {
                self.collect_sources(&path, out)?;
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !SOURCE_EXTENSIONS.contains(&ext) {
                continue;
            }

            let meta = entry
                .metadata()
                .map_err(|err| StoreError::io(path.display().to_string(), err))?;
            let observed_at_epoch_secs = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let Ok(rel) = path.strip_prefix(&self.root) else {
                continue;
            };
            let reference = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(SourceRef {
                reference,
                observed_at_epoch_secs,
            });
        }
        Ok(())
    }
}

impl IndexStore for FsStore {
    fn describe(&self) -> String {
        format!("fs:{}", self.root.display())
    }

    fn fetch_current(&self, index_path: &str) -> Result<Option<Snapshot>, StoreError> {
        let path = self.resolve(index_path)?;
        let Some(bytes) = Self::read_optional(&path, index_path)? else {
            return Ok(None);
        };
        let collection = decode_collection(index_path, &bytes)?;
        Ok(Some(Snapshot {
            collection,
            version: Version::of_bytes(&bytes),
        }))
    }

    fn persist(
        &self,
        index_path: &str,
        collection: &Collection,
        precondition: &Precondition,
    ) -> Result<Receipt, StoreError> {
        let path = self.resolve(index_path)?;
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).map_err(|err| StoreError::io(index_path, err))?;

        let lock_file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(Self::lock_path(&path))
            .map_err(|err| StoreError::io(index_path, err))?;
        lock_file
            .lock_exclusive()
            .map_err(|err| StoreError::io(index_path, err))?;

        // Compare and swap under the lock; the rename keeps readers from
        // ever observing a half-written document.
        let stored = Self::read_optional(&path, index_path)?.map(|b| Version::of_bytes(&b));
        if !precondition.admits(stored.as_ref()) {
            let _ = FileExt::unlock(&lock_file);
            return Err(StoreError::Conflict {
                location: index_path.to_string(),
            });
        }

        let data = encode_collection(collection)?;
        let mut tmp =
            NamedTempFile::new_in(&parent).map_err(|err| StoreError::io(index_path, err))?;
        tmp.write_all(&data)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|err| StoreError::io(index_path, err))?;
        tmp.persist(&path)
            .map_err(|err| StoreError::io(index_path, err.error))?;
        let _ = FileExt::unlock(&lock_file);

        Ok(Receipt {
            location: path.display().to_string(),
            version: Version::of_bytes(&data),
        })
    }

    fn list_sources(&self, prefix: &str) -> Result<Vec<SourceRef>, StoreError> {
        let dir = self.resolve(prefix)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        self.collect_sources(&dir, &mut out)?;
        out.sort_by(|a, b| a.reference.cmp(&b.reference));
        Ok(out)
    }

    fn fetch_source(&self, reference: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(reference)?;
        fs::read(&path).map_err(|err| StoreError::io(reference, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skywatch::record::RecordKind;
    use tempfile::tempdir;

    fn sample(title: &str) -> Collection {
        let mut c = Collection::empty("news", RecordKind::News);
        c.updated_at = Some(title.to_string());
        c
    }

    #[test]
    fn absent_document_reads_as_none() {
        let tmp = tempdir().expect("tempdir");
        let store = FsStore::new(tmp.path());
        assert!(
            store
                .fetch_current("indexes/news.json")
                .expect("fetch")
                .is_none()
        );
    }

    #[test]
    fn persist_then_fetch_returns_same_version() {
        let tmp = tempdir().expect("tempdir");
        let store = FsStore::new(tmp.path());
        let receipt = store
            .persist("indexes/news.json", &sample("a"), &Precondition::Absent)
            .expect("persist");
        let snap = store
            .fetch_current("indexes/news.json")
            .expect("fetch")
            .expect("present");
        assert_eq!(snap.version, receipt.version);
        assert_eq!(snap.collection, sample("a"));
    }

    #[test]
    fn stale_precondition_is_a_conflict() {
        let tmp = tempdir().expect("tempdir");
        let store = FsStore::new(tmp.path());
        store
            .persist("indexes/news.json", &sample("a"), &Precondition::Absent)
            .expect("first");
        let snap = store
            .fetch_current("indexes/news.json")
            .expect("fetch")
            .expect("present");
        store
            .persist(
                "indexes/news.json",
                &sample("b"),
                &Precondition::Matches(snap.version.clone()),
            )
            .expect("second");

        let err = store
            .persist(
                "indexes/news.json",
                &sample("c"),
                &Precondition::Matches(snap.version),
            )
            .expect_err("stale");
        assert!(matches!(err, StoreError::Conflict { .. }));
        let err = store
            .persist("indexes/news.json", &sample("d"), &Precondition::Absent)
            .expect_err("exists");
        assert!(matches!(err, StoreError::Conflict { .. }));

        let kept = store
            .fetch_current("indexes/news.json")
            .expect("fetch")
            .expect("present");
        assert_eq!(kept.collection, sample("b"));
    }

    #[test]
    fn corrupt_document_is_an_error_not_empty() {
        let tmp = tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("indexes")).expect("mkdir");
        fs::write(tmp.path().join("indexes/news.json"), "{truncated").expect("write");
        let store = FsStore::new(tmp.path());
        let err = store.fetch_current("indexes/news.json").expect_err("corrupt");
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn keys_cannot_escape_root() {
        let tmp = tempdir().expect("tempdir");
        let store = FsStore::new(tmp.path());
        assert!(store.fetch_source("../etc/passwd").is_err());
        assert!(store.fetch_current("").is_err());
    }

    #[test]
    fn list_sources_walks_prefix_and_filters_extensions() {
        let tmp = tempdir().expect("tempdir");
        let dir = tmp.path().join("news/2025");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("b.json"), "{}").expect("b");
        fs::write(tmp.path().join("news/a.json5"), "{}").expect("a");
        fs::write(tmp.path().join("news/notes.txt"), "skip").expect("txt");
        fs::write(tmp.path().join("news/.hidden.json"), "{}").expect("hidden");

        let store = FsStore::new(tmp.path());
        let refs: Vec<String> = store
            .list_sources("news")
            .expect("list")
            .into_iter()
            .map(|s| s.reference)
            .collect();
        assert_eq!(refs, ["news/2025/b.json", "news/a.json5"]);
        assert!(store.list_sources("missing").expect("empty").is_empty());
    }
}
