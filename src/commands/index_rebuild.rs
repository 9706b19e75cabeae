use anyhow::Result;

use crate::commands::{CommandReport, IndexContext};
use crate::skywatch::service::IndexService;

#[derive(Debug, Clone)]
pub struct RebuildOptions {
    pub collection: String,
    pub dry_run: bool,
    pub confirmed: bool,
}

pub fn run(opts: &RebuildOptions) -> Result<CommandReport> {
    let ctx = IndexContext::load()?;
    let mut report = CommandReport::new("rebuild");
    report.detail(format!("collection={}", opts.collection));

    let collection = match ctx.collection(&opts.collection) {
        Ok(c) => c,
        Err(err) => {
            report.issue(format!("{}: {err}", err.code().as_str()));
            return Ok(report);
        }
    };
    report.detail(format!("source_prefix={}", collection.source_prefix));
    report.detail(format!("index_path={}", collection.index_path));

    if !opts.dry_run && !opts.confirmed {
        report.issue(
            "rebuild replaces the whole index; pass --yes to confirm or --dry-run to preview",
        );
        return Ok(report);
    }

    let service = IndexService::new(
        ctx.store.as_ref(),
        &opts.collection,
        collection,
        &ctx.config.reconcile,
    );

    match service.rebuild(opts.dry_run) {
        Ok(out) => {
            report.detail(format!("scanned={}", out.scanned));
            report.detail(format!("indexed={}", out.indexed));
            report.detail(format!("superseded={}", out.superseded));
            report.detail(format!("skipped={}", out.skipped.len()));
            for item in &out.skipped {
                report.detail(format!("skipped {}: {}", item.reference, item.error));
            }
            match &out.receipt {
                Some(receipt) => report.detail(format!("location={}", receipt.location)),
                None => report.detail("dry-run: index not written".to_string()),
            }
            if !opts.dry_run {
                ctx.audit(
                    "rebuild",
                    "ok",
                    &opts.collection,
                    &format!(
                        "scanned={} indexed={} skipped={}",
                        out.scanned,
                        out.indexed,
                        out.skipped.len()
                    ),
                );
            }
        }
        Err(err) => ctx.fail(&mut report, &opts.collection, &err),
    }
    Ok(report)
}
