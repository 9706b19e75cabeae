pub mod index_list;
pub mod index_rebuild;
pub mod index_remove;
pub mod index_upsert;
pub mod index_validate;
pub mod status;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::ReconcileError;
use crate::skywatch::audit;
use crate::skywatch::config::{CollectionConfig, SkywatchConfig, load_config};
use crate::skywatch::paths::{SkywatchPaths, resolve_paths};
use crate::skywatch::record::RawInput;
use crate::skywatch::store::{self, IndexStore};
use crate::skywatch::warn::{self, WarnEvent};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
            data: None,
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn attach(&mut self, data: impl Serialize) -> Result<()> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(())
    }
}

/// Everything a collection command needs, resolved once per invocation.
pub struct IndexContext {
    pub paths: SkywatchPaths,
    pub config: SkywatchConfig,
    pub store: Box<dyn IndexStore>,
}

impl IndexContext {
    pub fn load() -> Result<Self> {
        let paths = resolve_paths()?;
        let config = load_config(&paths)?;
        let store = store::open(&config.store, &paths).context("failed to open index store")?;
        Ok(Self {
            paths,
            config,
            store,
        })
    }

    pub fn collection(&self, name: &str) -> Result<&CollectionConfig, ReconcileError> {
        self.config
            .collection(name)
            .ok_or_else(|| ReconcileError::UnknownCollection(name.to_string()))
    }

    /// Record a failed operation in the report, the warning stream and the
    /// audit log.
    pub fn fail(&self, report: &mut CommandReport, collection: &str, err: &ReconcileError) {
        let code = err.code().as_str();
        if !matches!(err, ReconcileError::Validation(_)) {
            warn::emit(WarnEvent {
                code,
                stage: &report.command,
                action: "operation",
                collection,
                reference: "",
                retry: "caller",
                reason: "operation-failed",
                err: &err.to_string(),
            });
        }
        self.audit(&report.command, "failed", collection, &format!("{code} {err}"));
        report.issue(format!("{code}: {err}"));
    }

    pub fn audit(&self, phase: &str, status: &str, collection: &str, message: &str) {
        if let Err(err) = audit::append_event(&self.paths, phase, status, collection, message) {
            eprintln!("skywatch audit warning: {err:#}");
        }
    }
}

/// Read a raw record from a JSON or JSON5 file, or stdin for `-`.
pub fn read_raw_input(path: &Path) -> Result<RawInput> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read record from stdin")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };
    json5::from_str(&text).with_context(|| format!("failed to parse record {}", path.display()))
}
