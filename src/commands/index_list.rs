use anyhow::Result;

use crate::commands::{CommandReport, IndexContext};
use crate::skywatch::service::IndexService;

#[derive(Debug, Clone)]
pub struct ListOptions {
    pub collection: String,
}

pub fn run(opts: &ListOptions) -> Result<CommandReport> {
    let ctx = IndexContext::load()?;
    let mut report = CommandReport::new("list");
    report.detail(format!("collection={}", opts.collection));

    let collection = match ctx.collection(&opts.collection) {
        Ok(c) => c,
        Err(err) => {
            report.issue(format!("{}: {err}", err.code().as_str()));
            return Ok(report);
        }
    };
    let service = IndexService::new(
        ctx.store.as_ref(),
        &opts.collection,
        collection,
        &ctx.config.reconcile,
    );

    match service.list() {
        Ok(current) => {
            report.detail(format!("size={}", current.len()));
            report.attach(&current)?;
        }
        Err(err) => ctx.fail(&mut report, &opts.collection, &err),
    }
    Ok(report)
}
