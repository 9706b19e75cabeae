use crate::error::StoreError;
use crate::skywatch::record::Collection;
use crate::skywatch::store::{
    IndexStore, Precondition, Receipt, Snapshot, SourceRef, Version, decode_collection,
    encode_collection,
};
use chrono::DateTime;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_TYPE, ETAG, HeaderName, IF_MATCH, IF_NONE_MATCH};
use serde_json::Value;
use std::time::Duration;

pub const REQUEST_TIMEOUT_SECS: u64 = 20;

/// Bucket behind an S3/R2-style REST gateway: `GET`/`PUT {base}/{key}` with
/// ETag preconditions, and `GET {base}?prefix=..` for listings.
#[derive(Debug, Clone)]
pub struct HttpStore {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl HttpStore {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| StoreError::Unreachable {
                location: base_url.to_string(),
                message: err.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn send(&self, req: RequestBuilder, location: &str) -> Result<Response, StoreError> {
        self.authorized(req)
            .send()
            .map_err(|err| StoreError::Unreachable {
                location: location.to_string(),
                message: err.to_string(),
            })
    }

    /// `None` on 404; otherwise the ETag, if any, and the body.
    fn fetch_body(&self, key: &str) -> Result<Option<(Option<Version>, Vec<u8>)>, StoreError> {
        let response = self.send(self.client.get(self.url_for(key)), key)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                location: key.to_string(),
            });
        }
        let tag = etag(&response);
        Ok(Some((tag, Self::body(response, key)?)))
    }

    fn body(response: Response, location: &str) -> Result<Vec<u8>, StoreError> {
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|err| StoreError::Unreachable {
                location: location.to_string(),
                message: err.to_string(),
            })
    }
}

fn etag(response: &Response) -> Option<Version> {
    response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(|v| Version(v.to_string()))
}

/// How a precondition travels with a `PUT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteGuard {
    Header(HeaderName, String),
    /// The version is a content hash the server cannot evaluate; re-read and
    /// compare bodies before writing.
    VerifyBody(Version),
    Unconditional,
}

pub fn write_guard(precondition: &Precondition) -> WriteGuard {
    match precondition {
        Precondition::Absent => WriteGuard::Header(IF_NONE_MATCH, "*".to_string()),
        Precondition::Matches(version) if version.is_content_hash() => {
            WriteGuard::VerifyBody(version.clone())
        }
        Precondition::Matches(version) => {
            WriteGuard::Header(IF_MATCH, version.as_str().to_string())
        }
        Precondition::Any => WriteGuard::Unconditional,
    }
}

/// Map a write status onto the store taxonomy; `Ok(())` for success.
pub fn classify_write_status(status: u16, location: &str) -> Result<(), StoreError> {
    match status {
        200..=299 => Ok(()),
        409 | 412 => Err(StoreError::Conflict {
            location: location.to_string(),
        }),
        _ => Err(StoreError::Status {
            status,
            location: location.to_string(),
        }),
    }
}

fn observed_at(item: &Value) -> u64 {
    if let Some(secs) = item
        .get("uploaded_at_epoch_secs")
        .and_then(Value::as_u64)
    {
        return secs;
    }
    item.get("uploaded")
        .or_else(|| item.get("last_modified"))
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.timestamp().max(0) as u64)
        .unwrap_or(0)
}

/// Accepts either a bare array or `{"objects": [...]}`; entries without a
/// key are ignored.
pub fn parse_listing(root: &Value) -> Vec<SourceRef> {
    let items = root
        .as_array()
        .or_else(|| root.get("objects").and_then(Value::as_array))
        .cloned()
        .unwrap_or_default();

    let mut out: Vec<SourceRef> = items
        .iter()
        .filter_map(|item| {
            let reference = item.get("key").and_then(Value::as_str)?.trim();
            if reference.is_empty() {
                return None;
            }
            Some(SourceRef {
                reference: reference.to_string(),
                observed_at_epoch_secs: observed_at(item),
            })
        })
        .collect();
    out.sort_by(|a, b| a.reference.cmp(&b.reference));
    out
}

impl IndexStore for HttpStore {
    fn describe(&self) -> String {
        format!("http:{}", self.base_url)
    }

    fn fetch_current(&self, index_path: &str) -> Result<Option<Snapshot>, StoreError> {
        let Some((tag, bytes)) = self.fetch_body(index_path)? else {
            return Ok(None);
        };
        let collection = decode_collection(index_path, &bytes)?;
        Ok(Some(Snapshot {
            collection,
            version: tag.unwrap_or_else(|| Version::of_bytes(&bytes)),
        }))
    }

    fn persist(
        &self,
        index_path: &str,
        collection: &Collection,
        precondition: &Precondition,
    ) -> Result<Receipt, StoreError> {
        let data = encode_collection(collection)?;
        let mut req = self
            .client
            .put(self.url_for(index_path))
            .header(CONTENT_TYPE, "application/json")
            .body(data.clone());
        match write_guard(precondition) {
            WriteGuard::Header(name, value) => req = req.header(name, value),
            WriteGuard::VerifyBody(expected) => {
                // Best effort: a writer landing between this read and the
                // PUT is not detected.
                let stored = self
                    .fetch_body(index_path)?
                    .map(|(_, bytes)| Version::of_bytes(&bytes));
                if stored.as_ref() != Some(&expected) {
                    return Err(StoreError::Conflict {
                        location: index_path.to_string(),
                    });
                }
            }
            WriteGuard::Unconditional => {}
        }

        let response = self.send(req, index_path)?;
        classify_write_status(response.status().as_u16(), index_path)?;
        Ok(Receipt {
            location: self.url_for(index_path),
            version: etag(&response).unwrap_or_else(|| Version::of_bytes(&data)),
        })
    }

    fn list_sources(&self, prefix: &str) -> Result<Vec<SourceRef>, StoreError> {
        let req = self
            .client
            .get(&self.base_url)
            .query(&[("prefix", prefix)]);
        let response = self.send(req, prefix)?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                location: prefix.to_string(),
            });
        }
        let bytes = Self::body(response, prefix)?;
        let root: Value = serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            location: prefix.to_string(),
            source,
        })?;
        Ok(parse_listing(&root))
    }

    fn fetch_source(&self, reference: &str) -> Result<Vec<u8>, StoreError> {
        let response = self.send(self.client.get(self.url_for(reference)), reference)?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                location: reference.to_string(),
            });
        }
        Self::body(response, reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn precondition_failures_are_conflicts() {
        assert!(classify_write_status(200, "k").is_ok());
        assert!(matches!(
            classify_write_status(412, "k"),
            Err(StoreError::Conflict { .. })
        ));
        assert!(matches!(
            classify_write_status(503, "k"),
            Err(StoreError::Status { status: 503, .. })
        ));
    }

    #[test]
    fn listing_accepts_both_shapes() {
        let bare = json!([
            {"key": "news/b.json", "uploaded": "2025-01-02T00:00:00Z"},
            {"key": "news/a.json", "uploaded_at_epoch_secs": 5},
            {"size": 10}
        ]);
        let refs = parse_listing(&bare);
        assert_eq!(
            refs,
            vec![
                SourceRef {
                    reference: "news/a.json".into(),
                    observed_at_epoch_secs: 5
                },
                SourceRef {
                    reference: "news/b.json".into(),
                    observed_at_epoch_secs: 1_735_776_000
                },
            ]
        );

        let wrapped = json!({"objects": [{"key": "reports/2025-01.json"}]});
        let refs = parse_listing(&wrapped);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].observed_at_epoch_secs, 0);
    }

    #[test]
    fn content_hash_versions_are_not_sent_as_if_match() {
        let hashed = Version::of_bytes(b"{}");
        assert_eq!(
            write_guard(&Precondition::Matches(hashed.clone())),
            WriteGuard::VerifyBody(hashed)
        );
        assert_eq!(
            write_guard(&Precondition::Matches(Version("\"abc\"".into()))),
            WriteGuard::Header(IF_MATCH, "\"abc\"".into())
        );
        assert_eq!(
            write_guard(&Precondition::Absent),
            WriteGuard::Header(IF_NONE_MATCH, "*".into())
        );
        assert_eq!(write_guard(&Precondition::Any), WriteGuard::Unconditional);
    }

    #[test]
    fn url_joins_without_double_slashes() {
        let store = HttpStore::new("https://bucket.example/", None).expect("client");
        assert_eq!(
            store.url_for("/indexes/news.json"),
            "https://bucket.example/indexes/news.json"
        );
    }
}
