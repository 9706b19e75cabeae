use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const COLLECTION_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    News,
    Report,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "news" => Ok(Self::News),
            "report" | "reports" => Ok(Self::Report),
            other => Err(format!("unknown record kind `{other}`; use `news` or `report`")),
        }
    }
}

/// Kind-specific fields. The reconciler never looks inside beyond merging
/// optional values on edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    News {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    Report {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        meta: BTreeMap<String, Value>,
    },
}

impl Payload {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::News { .. } => RecordKind::News,
            Self::Report { .. } => RecordKind::Report,
        }
    }

    /// Fill optional fields this payload leaves empty from `previous`.
    pub fn merge_missing_from(&mut self, previous: &Payload) {
        match (self, previous) {
            (
                Self::News { image, summary, .. },
                Self::News {
                    image: prev_image,
                    summary: prev_summary,
                    ..
                },
            ) => {
                if image.is_none() {
                    image.clone_from(prev_image);
                }
                if summary.is_none() {
                    summary.clone_from(prev_summary);
                }
            }
            (
                Self::Report {
                    file,
                    summary,
                    meta,
                },
                Self::Report {
                    file: prev_file,
                    summary: prev_summary,
                    meta: prev_meta,
                },
            ) => {
                if file.is_none() {
                    file.clone_from(prev_file);
                }
                if summary.is_none() {
                    summary.clone_from(prev_summary);
                }
                for (k, v) in prev_meta {
                    meta.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub key: String,
    pub date: String,
    pub title: String,
    pub payload: Payload,
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        self.payload.kind()
    }

    /// Raw form of this record, used as the base layer of a partial edit.
    pub fn to_raw(&self) -> RawInput {
        let mut raw = RawInput {
            id: Some(self.id.clone()),
            title: Some(self.title.clone()),
            ..RawInput::default()
        };
        match &self.payload {
            Payload::News {
                url,
                image,
                summary,
            } => {
                raw.date = Some(self.date.clone());
                raw.url = Some(url.clone());
                raw.image = image.clone();
                raw.summary = summary.clone();
            }
            Payload::Report {
                file,
                summary,
                meta,
            } => {
                raw.slug = Some(self.date.clone());
                raw.file = file.clone();
                raw.summary = summary.clone();
                if !meta.is_empty() {
                    raw.meta = Some(meta.clone());
                }
            }
        }
        raw
    }
}

/// Untrusted record as it arrives from an editor, a CLI flag set or a source
/// document. Every field is optional; the normalizer decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<BTreeMap<String, Value>>,
}

impl RawInput {
    /// Layer `patch` on top of `self`: fields the patch carries win.
    pub fn overlay(mut self, patch: RawInput) -> RawInput {
        fn take(slot: &mut Option<String>, incoming: Option<String>) {
            if incoming.is_some() {
                *slot = incoming;
            }
        }
        take(&mut self.id, patch.id);
        take(&mut self.title, patch.title);
        take(&mut self.date, patch.date);
        take(&mut self.slug, patch.slug);
        take(&mut self.url, patch.url);
        take(&mut self.image, patch.image);
        take(&mut self.summary, patch.summary);
        take(&mut self.file, patch.file);
        if let Some(patch_meta) = patch.meta {
            let meta = self.meta.get_or_insert_with(BTreeMap::new);
            meta.extend(patch_meta);
        }
        self
    }
}

/// One raw source document as discovered by a rebuild.
#[derive(Debug, Clone)]
pub struct RawSource {
    pub reference: String,
    pub observed_at_epoch_secs: u64,
    pub input: RawInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub schema_version: u32,
    pub name: String,
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub items: Vec<Record>,
}

impl Collection {
    pub fn empty(name: &str, kind: RecordKind) -> Self {
        Self {
            schema_version: COLLECTION_SCHEMA_VERSION,
            name: name.to_string(),
            kind,
            updated_at: None,
            items: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Record> {
        self.items.iter().find(|r| r.id == id)
    }

    pub fn find_by_key(&self, key: &str) -> Option<&Record> {
        self.items.iter().find(|r| r.key == key)
    }

    pub fn with_items(&self, items: Vec<Record>) -> Self {
        Self {
            schema_version: self.schema_version,
            name: self.name.clone(),
            kind: self.kind,
            updated_at: self.updated_at.clone(),
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn news_record_serializes_with_tagged_payload() {
        let record = Record {
            id: "abc".into(),
            key: "https://x".into(),
            date: "2025-01-01".into(),
            title: "A".into(),
            payload: Payload::News {
                url: "https://x".into(),
                image: None,
                summary: Some("short".into()),
            },
        };
        let value = serde_json::to_value(&record).expect("to_value");
        assert_eq!(
            value,
            json!({
                "id": "abc",
                "key": "https://x",
                "date": "2025-01-01",
                "title": "A",
                "payload": {"kind": "news", "url": "https://x", "summary": "short"}
            })
        );
    }

    #[test]
    fn overlay_keeps_base_fields_the_patch_omits() {
        let base = RawInput {
            title: Some("old".into()),
            url: Some("https://x".into()),
            summary: Some("kept".into()),
            ..RawInput::default()
        };
        let patch = RawInput {
            title: Some("new".into()),
            ..RawInput::default()
        };
        let merged = base.overlay(patch);
        assert_eq!(merged.title.as_deref(), Some("new"));
        assert_eq!(merged.summary.as_deref(), Some("kept"));
        assert_eq!(merged.url.as_deref(), Some("https://x"));
    }

    #[test]
    fn report_payload_merge_fills_missing_meta_keys() {
        let mut next = Payload::Report {
            file: None,
            summary: Some("fresh".into()),
            meta: BTreeMap::from([("count".to_string(), json!(3))]),
        };
        let prev = Payload::Report {
            file: Some("reports/2025-01.md".into()),
            summary: Some("stale".into()),
            meta: BTreeMap::from([
                ("count".to_string(), json!(1)),
                ("region".to_string(), json!("NW")),
            ]),
        };
        next.merge_missing_from(&prev);
        let Payload::Report {
            file,
            summary,
            meta,
        } = next
        else {
            panic!("kind changed");
        };
        assert_eq!(file.as_deref(), Some("reports/2025-01.md"));
        assert_eq!(summary.as_deref(), Some("fresh"));
        assert_eq!(meta.get("count"), Some(&json!(3)));
        assert_eq!(meta.get("region"), Some(&json!("NW")));
    }

    #[test]
    fn record_kind_parses_plural_alias() {
        assert_eq!("reports".parse::<RecordKind>(), Ok(RecordKind::Report));
        assert!("weather".parse::<RecordKind>().is_err());
    }
}
