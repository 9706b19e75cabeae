use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, IndexContext, read_raw_input};
use crate::skywatch::record::RawInput;
use crate::skywatch::service::IndexService;

#[derive(Debug, Clone)]
pub struct ValidateOptions {
    pub collection: String,
    pub input: Option<PathBuf>,
    pub fields: RawInput,
}

pub fn run(opts: &ValidateOptions) -> Result<CommandReport> {
    let ctx = IndexContext::load()?;
    let mut report = CommandReport::new("validate");
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

    match service.validate(&raw) {
        Ok(record) => {
            report.detail(format!("id={}", record.id));
            report.detail(format!("key={}", record.key));
            report.attach(&record)?;
        }
        Err(err) => report.issue(format!("{}: {err}", err.code().as_str())),
    }
    Ok(report)
}
