//! In-process store for tests, with hooks to simulate a racing writer and an
//! unreachable backend.

use crate::error::StoreError;
use crate::skywatch::record::Collection;
use crate::skywatch::store::{
    IndexStore, Precondition, Receipt, Snapshot, SourceRef, Version, decode_collection,
    encode_collection,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};

#[derive(Default)]
pub struct MemoryStore {
    docs: RefCell<BTreeMap<String, Vec<u8>>>,
    observed: RefCell<BTreeMap<String, u64>>,
    racing_writes: RefCell<VecDeque<(String, Collection)>>,
    pub fail_reads: Cell<bool>,
    pub fail_writes: Cell<bool>,
    pub persist_calls: Cell<u32>,
}

impl MemoryStore {
    pub fn put_raw(&self, key: &str, bytes: &[u8], observed_at: u64) {
        self.docs.borrow_mut().insert(key.to_string(), bytes.to_vec());
        self.observed.borrow_mut().insert(key.to_string(), observed_at);
    }

    pub fn put_collection(&self, key: &str, collection: &Collection) {
        let bytes = encode_collection(collection).expect("encode");
        self.put_raw(key, &bytes, 0);
    }

    /// Land `collection` at `key` right before the next persist to `key`, as
    /// if another writer had won the race.
    pub fn race_next_persist(&self, key: &str, collection: Collection) {
        self.racing_writes
            .borrow_mut()
            .push_back((key.to_string(), collection));
    }

    pub fn collection(&self, key: &str) -> Option<Collection> {
        self.docs
            .borrow()
            .get(key)
            .map(|b| decode_collection(key, b).expect("decode"))
    }

    fn unreachable(key: &str) -> StoreError {
        StoreError::Unreachable {
            location: key.to_string(),
            message: "simulated outage".to_string(),
        }
    }
}

impl IndexStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn fetch_current(&self, index_path: &str) -> Result<Option<Snapshot>, StoreError> {
        if self.fail_reads.get() {
            return Err(Self::unreachable(index_path));
        }
        let docs = self.docs.borrow();
        let Some(bytes) = docs.get(index_path) else {
            return Ok(None);
        };
        Ok(Some(Snapshot {
            collection: decode_collection(index_path, bytes)?,
            version: Version::of_bytes(bytes),
        }))
    }

    fn persist(
        &self,
        index_path: &str,
        collection: &Collection,
        precondition: &Precondition,
    ) -> Result<Receipt, StoreError> {
        self.persist_calls.set(self.persist_calls.get() + 1);
        if self.fail_writes.get() {
            return Err(Self::unreachable(index_path));
        }

        let racing = {
            let mut queue = self.racing_writes.borrow_mut();
            match queue.front() {
                Some((key, _)) if key == index_path => queue.pop_front(),
                _ => None,
            }
        };
        if let Some((key, winner)) = racing {
            self.put_collection(&key, &winner);
        }

        let stored = self
            .docs
            .borrow()
            .get(index_path)
            .map(|b| Version::of_bytes(b));
        if !precondition.admits(stored.as_ref()) {
            return Err(StoreError::Conflict {
                location: index_path.to_string(),
            });
        }

        let data = encode_collection(collection)?;
        let version = Version::of_bytes(&data);
        self.put_raw(index_path, &data, 0);
        Ok(Receipt {
            location: format!("memory:{index_path}"),
            version,
        })
    }

    fn list_sources(&self, prefix: &str) -> Result<Vec<SourceRef>, StoreError> {
        if self.fail_reads.get() {
            return Err(Self::unreachable(prefix));
        }
        let observed = self.observed.borrow();
        Ok(self
            .docs
            .borrow()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .map(|k| SourceRef {
                reference: k.clone(),
                observed_at_epoch_secs: observed.get(k).copied().unwrap_or(0),
            })
            .collect())
    }

    fn fetch_source(&self, reference: &str) -> Result<Vec<u8>, StoreError> {
        if self.fail_reads.get() {
            return Err(Self::unreachable(reference));
        }
        self.docs
            .borrow()
            .get(reference)
            .cloned()
            .ok_or_else(|| StoreError::Status {
                status: 404,
                location: reference.to_string(),
            })
    }
}
