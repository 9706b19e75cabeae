use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, IndexContext, read_raw_input};
use crate::skywatch::record::RawInput;
use crate::skywatch::service::IndexService;

#[derive(Debug, Clone)]
pub struct UpsertOptions {
    pub collection: String,
    pub input: Option<PathBuf>,
    /// Flag-supplied fields; they win over the input file.
    pub fields: RawInput,
}

pub fn run(opts: &UpsertOptions) -> Result<CommandReport> {
    let ctx = IndexContext::load()?;
    let mut report = CommandReport::new("upsert");
    report.detail(format!("collection={}", opts.collection));

    let raw = match &opts.input {
        Some(path) => read_raw_input(path)?.overlay(opts.fields.clone()),
        None => opts.fields.clone(),
    };

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

    match service.upsert(&raw) {
        Ok(out) => {
            report.detail(format!("id={}", out.record.id));
            report.detail(format!("key={}", out.record.key));
            report.detail(format!("created={}", out.created));
            report.detail(format!("size={}", out.size));
            report.detail(format!("attempts={}", out.attempts));
            if let Some(receipt) = &out.receipt {
                report.detail(format!("location={}", receipt.location));
            }
            if !out.retained {
                report.detail(format!(
                    "record ranks below the cap of {}; not retained",
                    collection.max_size
                ));
            }
            ctx.audit(
                "upsert",
                if out.created { "created" } else { "updated" },
                &opts.collection,
                &format!("key={} size={}", out.record.key, out.size),
            );
            report.attach(&out.record)?;
        }
        Err(err) => ctx.fail(&mut report, &opts.collection, &err),
    }
    Ok(report)
}
