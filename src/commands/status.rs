use anyhow::Result;
use std::env;

use crate::commands::{CommandReport, IndexContext};
use crate::env_loader::unknown_env_keys;
use crate::skywatch::service::IndexService;

pub fn run() -> Result<CommandReport> {
    let ctx = IndexContext::load()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build={}", env!("BUILD_UUID")));
    report.detail(format!("home={}", ctx.paths.home.display()));
    report.detail(format!("store_dir={}", ctx.paths.store_dir.display()));
    report.detail(format!("logs_dir={}", ctx.paths.logs_dir.display()));
    report.detail(format!("config_path={}", ctx.paths.config_path.display()));
    report.detail(format!(
        "config_file_present={}",
        ctx.paths.config_path.exists()
    ));
    report.detail(format!("store={}", ctx.store.describe()));
    report.detail(format!(
        "max_conflict_retries={}",
        ctx.config.reconcile.max_conflict_retries
    ));
    report.detail(format!(
        "summary_max_chars={}",
        ctx.config.reconcile.summary_max_chars
    ));

    for (name, collection) in &ctx.config.collections {
        let service = IndexService::new(
            ctx.store.as_ref(),
            name,
            collection,
            &ctx.config.reconcile,
        );
        match service.list() {
            Ok(current) => report.detail(format!(
                "collection.{name} kind={} size={}/{} index={} sources={}",
                collection.kind,
                current.len(),
                collection.max_size,
                collection.index_path,
                collection.source_prefix
            )),
            Err(err) => report.issue(format!(
                "collection.{name} unreadable: {}: {err}",
                err.code().as_str()
            )),
        }
    }

    for key in unknown_env_keys(env::vars().map(|(k, _)| k)) {
        report.issue(format!("unrecognised environment variable {key}"));
    }

    Ok(report)
}
