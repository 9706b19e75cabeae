//! Request-scoped read-modify-write driver.
//!
//! Each operation reads the collection fresh, applies a pure transform from
//! [`reconcile`], and writes it back under a version precondition. A
//! precondition failure means another writer landed in between: the
//! operation re-reads and re-applies, up to `max_conflict_retries` times.

use crate::error::{ReconcileError, StoreError, ValidationError, ValidationReason};
use crate::skywatch::config::{CollectionConfig, ReconcileConfig};
use crate::skywatch::normalize::{NormalizeLimits, normalize};
use crate::skywatch::policy::OrderingPolicy;
use crate::skywatch::reconcile::{self, SkippedSource};
use crate::skywatch::record::{Collection, RawInput, RawSource, Record, RecordKind};
use crate::skywatch::store::{IndexStore, Precondition, Receipt, Snapshot};
use crate::skywatch::util::now_rfc3339;
use crate::skywatch::warn::{self, WarnEvent};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub record: Record,
    pub size: usize,
    pub created: bool,
    /// False when the record ranked below the size cap and was dropped.
    pub retained: bool,
    pub attempts: u32,
    pub receipt: Option<Receipt>,
}

#[derive(Debug, Clone)]
pub struct RemoveOutcome {
    pub removed: usize,
    pub size: usize,
    pub attempts: u32,
    pub receipt: Option<Receipt>,
}

#[derive(Debug, Clone)]
pub struct RebuildReport {
    pub scanned: usize,
    pub indexed: usize,
    pub superseded: usize,
    pub skipped: Vec<SkippedSource>,
    pub receipt: Option<Receipt>,
}

/// How a delete request names its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveTarget<'a> {
    Key(&'a str),
    Id(&'a str),
    /// Try the natural key first, then fall back to the id.
    KeyOrId(&'a str),
}

enum Step<T> {
    Write(Collection, T),
    Skip(T),
}

pub struct IndexService<'a, S: IndexStore + ?Sized> {
    store: &'a S,
    name: &'a str,
    collection: &'a CollectionConfig,
    settings: &'a ReconcileConfig,
}

impl<'a, S: IndexStore + ?Sized> IndexService<'a, S> {
    pub fn new(
        store: &'a S,
        name: &'a str,
        collection: &'a CollectionConfig,
        settings: &'a ReconcileConfig,
    ) -> Self {
        Self {
            store,
            name,
            collection,
            settings,
        }
    }

    fn policy(&self) -> OrderingPolicy {
        self.collection.policy()
    }

    fn limits(&self) -> NormalizeLimits {
        self.settings.limits()
    }

    fn empty(&self) -> Collection {
        Collection::empty(self.name, self.collection.kind)
    }

    /// Current collection, or an empty one when the store has no document.
    /// Read failures propagate: they must never be mistaken for "empty".
    pub fn list(&self) -> Result<Collection, ReconcileError> {
        Ok(self
            .store
            .fetch_current(&self.collection.index_path)?
            .map(|s| s.collection)
            .unwrap_or_else(|| self.empty()))
    }

    pub fn validate(&self, raw: &RawInput) -> Result<Record, ReconcileError> {
        Ok(normalize(raw, self.collection.kind, self.limits())?)
    }

    fn run<T>(
        &self,
        action: &str,
        mut step: impl FnMut(&Collection) -> Result<Step<T>, ReconcileError>,
    ) -> Result<(T, u32, Option<Receipt>), ReconcileError> {
        let max_attempts = self.settings.max_conflict_retries.saturating_add(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let snapshot: Option<Snapshot> =
                self.store.fetch_current(&self.collection.index_path)?;
            let precondition = Precondition::from_snapshot(snapshot.as_ref());
            let current = snapshot
                .map(|s| s.collection)
                .unwrap_or_else(|| self.empty());

            let (mut next, value) = match step(&current)? {
                Step::Skip(value) => return Ok((value, attempt, None)),
                Step::Write(next, value) => (next, value),
            };
            next.updated_at = Some(now_rfc3339());

            match self
                .store
                .persist(&self.collection.index_path, &next, &precondition)
            {
                Ok(receipt) => return Ok((value, attempt, Some(receipt))),
                Err(StoreError::Conflict { location }) => {
                    let exhausted = attempt >= max_attempts;
                    warn::emit(WarnEvent {
                        code: "E003_CONFLICT",
                        stage: "persist",
                        action,
                        collection: self.name,
                        reference: &location,
                        retry: if exhausted { "give-up" } else { "reread-and-reapply" },
                        reason: "version-precondition-failed",
                        err: &format!("attempt {attempt} of {max_attempts}"),
                    });
                    if exhausted {
                        return Err(ReconcileError::ConflictRetriesExhausted {
                            collection: self.name.to_string(),
                            attempts: attempt,
                        });
                    }
                    let delay = self.settings.retry_backoff_ms.saturating_mul(u64::from(attempt));
                    thread::sleep(Duration::from_millis(delay));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Create or edit one record. When `raw.id` names an existing record the
    /// call is an edit: fields the caller leaves out keep their stored values,
    /// and a changed key replaces the old entry rather than duplicating it.
    pub fn upsert(&self, raw: &RawInput) -> Result<UpsertOutcome, ReconcileError> {
        let policy = self.policy();
        let limits = self.limits();
        let kind = self.collection.kind;

        let edit_id = raw
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let ((record, size, created, retained), attempts, receipt) =
            self.run("upsert", |current| {
                let (base, previous_key) = match edit_id.and_then(|id| current.find_by_id(id)) {
                    Some(existing) => (
                        existing.to_raw().overlay(raw.clone()),
                        Some(existing.key.clone()),
                    ),
                    None => (raw.clone(), None),
                };
                let record = normalize(&base, kind, limits)?;
                let key = policy.key_of(&record).to_string();
                let created = previous_key.is_none() && current.find_by_key(&key).is_none();

                let mut working = current.clone();
                if let Some(old_key) = previous_key.filter(|old| *old != key) {
                    working = reconcile::remove(&working, &old_key, &policy);
                }
                let next = reconcile::upsert(&working, record.clone(), &policy);
                let size = next.len();
                match next.find_by_key(&key).cloned() {
                    Some(stored) => Ok(Step::Write(next, (stored, size, created, true))),
                    // Ranked below the cap and nothing else changed.
                    None if next.items == current.items => {
                        Ok(Step::Skip((record, size, created, false)))
                    }
                    None => Ok(Step::Write(next, (record, size, created, false))),
                }
            })?;

        Ok(UpsertOutcome {
            record,
            size,
            created,
            retained,
            attempts,
            receipt,
        })
    }

    pub fn remove(&self, target: RemoveTarget<'_>) -> Result<RemoveOutcome, ReconcileError> {
        let policy = self.policy();
        let ((removed, size), attempts, receipt) = self.run("remove", |current| {
            let by_key = |key: &str| {
                current
                    .items
                    .iter()
                    .filter(|r| policy.key_of(r) == key)
                    .count()
            };
            let by_id = |id: &str| current.items.iter().filter(|r| r.id == id).count();
            let (next, removed) = match target {
                RemoveTarget::Key(key) => (reconcile::remove(current, key, &policy), by_key(key)),
                RemoveTarget::Id(id) => (reconcile::remove_by_id(current, id, &policy), by_id(id)),
                RemoveTarget::KeyOrId(value) if by_key(value) > 0 => {
                    (reconcile::remove(current, value, &policy), by_key(value))
                }
                RemoveTarget::KeyOrId(value) => {
                    (reconcile::remove_by_id(current, value, &policy), by_id(value))
                }
            };
            let size = next.len();
            // Nothing matched and the stored document was already valid.
            if next.items == current.items {
                return Ok(Step::Skip((removed, size)));
            }
            Ok(Step::Write(next, (removed, size)))
        })?;

        Ok(RemoveOutcome {
            removed,
            size,
            attempts,
            receipt,
        })
    }

    /// Rebuild the index from every source document under the collection's
    /// prefix. The previous index is not read; the result replaces it
    /// unconditionally. Nothing is written unless every listed source could
    /// be fetched.
    pub fn rebuild(&self, dry_run: bool) -> Result<RebuildReport, ReconcileError> {
        let refs = self.store.list_sources(&self.collection.source_prefix)?;
        let scanned = refs.len();

        let mut sources = Vec::with_capacity(refs.len());
        let mut unreadable = Vec::new();
        for source_ref in refs {
            let bytes = self.store.fetch_source(&source_ref.reference)?;
            match parse_source(&source_ref.reference, &bytes, self.collection.kind) {
                Ok(input) => sources.push(RawSource {
                    reference: source_ref.reference,
                    observed_at_epoch_secs: source_ref.observed_at_epoch_secs,
                    input,
                }),
                Err(error) => unreadable.push(SkippedSource {
                    reference: source_ref.reference,
                    error,
                }),
            }
        }

        let outcome = reconcile::rebuild(self.name, sources, &self.policy(), self.limits());
        let mut skipped = unreadable;
        skipped.extend(outcome.skipped);
        for item in &skipped {
            warn::emit(WarnEvent {
                code: "E001_VALIDATION",
                stage: "rebuild",
                action: "normalize-source",
                collection: self.name,
                reference: &item.reference,
                retry: "fix-source-and-rebuild",
                reason: "source-skipped",
                err: &item.error.to_string(),
            });
        }

        let indexed = outcome.collection.len();
        let receipt = if dry_run {
            None
        } else {
            let mut next = outcome.collection;
            next.updated_at = Some(now_rfc3339());
            Some(
                self.store
                    .persist(&self.collection.index_path, &next, &Precondition::Any)?,
            )
        };

        Ok(RebuildReport {
            scanned,
            indexed,
            superseded: outcome.superseded,
            skipped,
            receipt,
        })
    }
}

/// Decode one raw source document. JSON5 is accepted so hand-edited sources
/// may carry comments. A report source without a slug takes it from a
/// `YYYY-MM` file name.
pub fn parse_source(
    reference: &str,
    bytes: &[u8],
    kind: RecordKind,
) -> Result<RawInput, ValidationError> {
    let text = String::from_utf8_lossy(bytes);
    let mut input: RawInput = json5::from_str(&text).map_err(|err| {
        ValidationError::new("document", ValidationReason::Unparseable(err.to_string()))
    })?;

    if kind == RecordKind::Report && input.slug.is_none() && input.date.is_none() {
        let stem = reference
            .rsplit('/')
            .next()
            .and_then(|name| name.split('.').next())
            .unwrap_or_default();
        if !stem.is_empty() {
            input.slug = Some(stem.to_string());
        }
    }
    Ok(input)
}
