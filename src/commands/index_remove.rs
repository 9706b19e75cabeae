use anyhow::Result;

use crate::commands::{CommandReport, IndexContext};
use crate::skywatch::service::{IndexService, RemoveTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveBy {
    Key,
    Id,
    Either,
}

#[derive(Debug, Clone)]
pub struct RemoveOptions {
    pub collection: String,
    pub target: String,
    pub by: RemoveBy,
}

pub fn run(opts: &RemoveOptions) -> Result<CommandReport> {
    let ctx = IndexContext::load()?;
    let mut report = CommandReport::new("remove");
    report.detail(format!("collection={}", opts.collection));
    report.detail(format!("target={}", opts.target));

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

    let target = match opts.by {
        RemoveBy::Key => RemoveTarget::Key(&opts.target),
        RemoveBy::Id => RemoveTarget::Id(&opts.target),
        RemoveBy::Either => RemoveTarget::KeyOrId(&opts.target),
    };

    match service.remove(target) {
        Ok(out) => {
            report.detail(format!("removed={}", out.removed));
            report.detail(format!("size={}", out.size));
            if out.removed == 0 {
                report.detail("no matching record; index left untouched".to_string());
            }
            ctx.audit(
                "remove",
                if out.removed == 0 { "noop" } else { "removed" },
                &opts.collection,
                &format!("target={} removed={}", opts.target, out.removed),
            );
        }
        Err(err) => ctx.fail(&mut report, &opts.collection, &err),
    }
    Ok(report)
}
