//! Pure collection transforms: no I/O, no clock.
//!
//! Every function takes the current collection by reference and returns the
//! next one, so the service layer can re-run a mutation against a fresher
//! snapshot after a write conflict.

use crate::error::ValidationError;
use crate::skywatch::normalize::{NormalizeLimits, normalize};
use crate::skywatch::policy::OrderingPolicy;
use crate::skywatch::record::{Collection, RawSource, Record};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct SkippedSource {
    pub reference: String,
    pub error: ValidationError,
}

#[derive(Debug, Clone)]
pub struct RebuildOutcome {
    pub collection: Collection,
    pub skipped: Vec<SkippedSource>,
    pub superseded: usize,
}

/// Insert `record`, or replace the record sharing its key. Optional payload
/// fields the incoming record leaves empty are carried over from the one it
/// replaces.
pub fn upsert(current: &Collection, mut record: Record, policy: &OrderingPolicy) -> Collection {
    let key = policy.key_of(&record).to_string();
    let mut items = Vec::with_capacity(current.len() + 1);
    let mut merged = false;
    for existing in &current.items {
        if policy.key_of(existing) != key {
            items.push(existing.clone());
            continue;
        }
        if !merged {
            record.payload.merge_missing_from(&existing.payload);
            merged = true;
        }
    }
    items.push(record);
    policy.arrange(&mut items);
    current.with_items(items)
}

/// Drop every record with `key`. The survivors are re-arranged, so a stored
/// document that drifted out of order or past the cap comes back valid.
pub fn remove(current: &Collection, key: &str, policy: &OrderingPolicy) -> Collection {
    let mut items: Vec<Record> = current
        .items
        .iter()
        .filter(|r| policy.key_of(r) != key)
        .cloned()
        .collect();
    policy.arrange(&mut items);
    current.with_items(items)
}

pub fn remove_by_id(current: &Collection, id: &str, policy: &OrderingPolicy) -> Collection {
    let mut items: Vec<Record> = current
        .items
        .iter()
        .filter(|r| r.id != id)
        .cloned()
        .collect();
    policy.arrange(&mut items);
    current.with_items(items)
}

/// Rebuild a collection from raw source documents, ignoring whatever index
/// was persisted before. Per key the source with the latest `observed_at`
/// wins; on equal timestamps the one listed later wins.
pub fn rebuild(
    name: &str,
    sources: Vec<RawSource>,
    policy: &OrderingPolicy,
    limits: NormalizeLimits,
) -> RebuildOutcome {
    let mut by_key: BTreeMap<String, (u64, Record)> = BTreeMap::new();
    let mut skipped = Vec::new();
    let mut superseded = 0usize;

    for source in sources {
        let record = match normalize(&source.input, policy.kind, limits) {
            Ok(record) => record,
            Err(error) => {
                skipped.push(SkippedSource {
                    reference: source.reference,
                    error,
                });
                continue;
            }
        };

        let key = policy.key_of(&record).to_string();
        match by_key.get(&key) {
            Some((seen_at, _)) if *seen_at > source.observed_at_epoch_secs => {
                superseded += 1;
            }
            Some(_) => {
                superseded += 1;
                by_key.insert(key, (source.observed_at_epoch_secs, record));
            }
            None => {
                by_key.insert(key, (source.observed_at_epoch_secs, record));
            }
        }
    }

    let mut items: Vec<Record> = by_key.into_values().map(|(_, record)| record).collect();
    policy.arrange(&mut items);

    let mut collection = Collection::empty(name, policy.kind);
    collection.items = items;
    RebuildOutcome {
        collection,
        skipped,
        superseded,
    }
}
