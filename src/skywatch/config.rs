use crate::skywatch::normalize::{DEFAULT_SUMMARY_MAX_CHARS, NormalizeLimits};
use crate::skywatch::paths::SkywatchPaths;
use crate::skywatch::policy::OrderingPolicy;
use crate::skywatch::record::RecordKind;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "fs".to_string(),
            url: None,
            token: None,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    pub max_conflict_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    pub summary_max_chars: usize,
}

fn default_retry_backoff_ms() -> u64 {
    50
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            retry_backoff_ms: default_retry_backoff_ms(),
            summary_max_chars: DEFAULT_SUMMARY_MAX_CHARS,
        }
    }
}

impl ReconcileConfig {
    pub fn limits(&self) -> NormalizeLimits {
        NormalizeLimits {
            summary_max_chars: self.summary_max_chars,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub kind: RecordKind,
    pub max_size: usize,
    pub index_path: String,
    pub source_prefix: String,
}

impl CollectionConfig {
    pub fn policy(&self) -> OrderingPolicy {
        OrderingPolicy::new(self.kind, self.max_size)
    }
}

fn default_collections() -> BTreeMap<String, CollectionConfig> {
    BTreeMap::from([
        (
            "news".to_string(),
            CollectionConfig {
                kind: RecordKind::News,
                max_size: 500,
                index_path: "indexes/news.json".to_string(),
                source_prefix: "news/".to_string(),
            },
        ),
        (
            "reports".to_string(),
            CollectionConfig {
                kind: RecordKind::Report,
                max_size: 600,
                index_path: "indexes/reports.json".to_string(),
                source_prefix: "reports/".to_string(),
            },
        ),
    ])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkywatchConfig {
    pub store: StoreConfig,
    pub reconcile: ReconcileConfig,
    pub collections: BTreeMap<String, CollectionConfig>,
}

impl Default for SkywatchConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            reconcile: ReconcileConfig::default(),
            collections: default_collections(),
        }
    }
}

impl SkywatchConfig {
    pub fn collection(&self, name: &str) -> Option<&CollectionConfig> {
        self.collections.get(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSkywatchConfig {
    store: Option<StoreConfig>,
    reconcile: Option<ReconcileConfig>,
    #[serde(default)]
    collections: BTreeMap<String, CollectionConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_opt_string(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

pub fn validate(cfg: &SkywatchConfig) -> Result<()> {
    match cfg.store.backend.as_str() {
        "fs" => {}
        "http" => {
            let url = cfg.store.url.as_deref().unwrap_or_default().trim();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow!(
                    "invalid store url: http backend needs SKYWATCH_STORE_URL starting with http:// or https://"
                ));
            }
        }
        other => {
            return Err(anyhow!(
                "invalid store backend `{other}`: use `fs` or `http`"
            ));
        }
    }
    if cfg.reconcile.summary_max_chars == 0 {
        return Err(anyhow!("invalid summary max chars: must be >= 1"));
    }
    if cfg.collections.is_empty() {
        return Err(anyhow!("no collections configured"));
    }
    for (name, collection) in &cfg.collections {
        if collection.max_size == 0 {
            return Err(anyhow!("invalid max size for collection `{name}`: must be >= 1"));
        }
        if collection.index_path.trim().is_empty() {
            return Err(anyhow!("collection `{name}` has an empty index path"));
        }
        if collection.source_prefix.trim().is_empty() {
            return Err(anyhow!("collection `{name}` has an empty source prefix"));
        }
        if collection.index_path.starts_with(collection.source_prefix.as_str()) {
            return Err(anyhow!(
                "collection `{name}` stores its index inside its own source prefix"
            ));
        }
    }
    Ok(())
}

fn merge_file_config(base: &mut SkywatchConfig, raw: &str, path: &Path) -> Result<()> {
    let parsed: PartialSkywatchConfig = toml::from_str(raw)
        .map_err(|err| anyhow!("failed to parse skywatch config {}: {err}", path.display()))?;
    if let Some(store) = parsed.store {
        base.store = store;
    }
    if let Some(reconcile) = parsed.reconcile {
        base.reconcile = reconcile;
    }
    base.collections.extend(parsed.collections);
    Ok(())
}

fn apply_env_overrides(cfg: &mut SkywatchConfig) {
    cfg.store.backend = env_or_string("SKYWATCH_STORE_BACKEND", &cfg.store.backend);
    cfg.store.url = env_opt_string("SKYWATCH_STORE_URL", cfg.store.url.take());
    cfg.store.token = env_opt_string("SKYWATCH_STORE_TOKEN", cfg.store.token.take());
    cfg.reconcile.max_conflict_retries = env_or_u64(
        "SKYWATCH_MAX_CONFLICT_RETRIES",
        u64::from(cfg.reconcile.max_conflict_retries),
    )
    .min(u64::from(u32::MAX)) as u32;
    cfg.reconcile.retry_backoff_ms =
        env_or_u64("SKYWATCH_RETRY_BACKOFF_MS", cfg.reconcile.retry_backoff_ms);
    cfg.reconcile.summary_max_chars = env_or_usize(
        "SKYWATCH_SUMMARY_MAX_CHARS",
        cfg.reconcile.summary_max_chars,
    );
    if let Some(news) = cfg.collections.get_mut("news") {
        news.max_size = env_or_usize("SKYWATCH_NEWS_MAX_SIZE", news.max_size);
    }
    if let Some(reports) = cfg.collections.get_mut("reports") {
        reports.max_size = env_or_usize("SKYWATCH_REPORTS_MAX_SIZE", reports.max_size);
    }
}

pub fn load_config(paths: &SkywatchPaths) -> Result<SkywatchConfig> {
    let mut cfg = SkywatchConfig::default();
    if paths.config_path.exists() {
        let raw = fs::read_to_string(&paths.config_path)?;
        merge_file_config(&mut cfg, &raw, &paths.config_path)?;
    }
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}
