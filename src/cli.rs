use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::commands::index_remove::RemoveBy;
use crate::commands::{
    CommandReport, index_list, index_rebuild, index_remove, index_upsert, index_validate, status,
};
use crate::skywatch::record::RawInput;

#[derive(Debug, Parser)]
#[command(
    name = "skywatch",
    version,
    about = "Reconcile the site's news and sighting-report indexes"
)]
struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a collection as stored.
    List { collection: String },
    /// Create a record, or edit one when --id names an existing record.
    Upsert(RecordArgs),
    /// Delete a record by natural key or id.
    Remove {
        collection: String,
        target: String,
        #[arg(long, value_enum, default_value_t = RemoveByArg::Either)]
        by: RemoveByArg,
    },
    /// Rebuild a collection from its raw source documents.
    Rebuild {
        collection: String,
        #[arg(long)]
        dry_run: bool,
        /// Confirm the existing index may be replaced.
        #[arg(long)]
        yes: bool,
    },
    /// Normalize a record without writing anything.
    Validate(RecordArgs),
    /// Show resolved paths, configuration and collection sizes.
    Status,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RemoveByArg {
    Key,
    Id,
    Either,
}

impl From<RemoveByArg> for RemoveBy {
    fn from(value: RemoveByArg) -> Self {
        match value {
            RemoveByArg::Key => Self::Key,
            RemoveByArg::Id => Self::Id,
            RemoveByArg::Either => Self::Either,
        }
    }
}

#[derive(Debug, Args)]
struct RecordArgs {
    collection: String,
    /// JSON or JSON5 record file; `-` reads stdin. Flags override its fields.
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    date: Option<String>,
    #[arg(long)]
    slug: Option<String>,
    #[arg(long)]
    url: Option<String>,
    #[arg(long)]
    image: Option<String>,
    #[arg(long)]
    summary: Option<String>,
    #[arg(long)]
    file: Option<String>,
}

impl RecordArgs {
    fn fields(&self) -> RawInput {
        RawInput {
            id: self.id.clone(),
            title: self.title.clone(),
            date: self.date.clone(),
            slug: self.slug.clone(),
            url: self.url.clone(),
            image: self.image.clone(),
            summary: self.summary.clone(),
            file: self.file.clone(),
            meta: None,
        }
    }
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}: {}", report.command, if report.ok { "ok" } else { "failed" });
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  issue: {issue}");
    }
    if let Some(data) = &report.data {
        println!("{}", serde_json::to_string_pretty(data)?);
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let report = match &cli.command {
        Command::List { collection } => index_list::run(&index_list::ListOptions {
            collection: collection.clone(),
        })?,
        Command::Upsert(args) => index_upsert::run(&index_upsert::UpsertOptions {
            collection: args.collection.clone(),
            input: args.input.clone(),
            fields: args.fields(),
        })?,
        Command::Remove {
            collection,
            target,
            by,
        } => index_remove::run(&index_remove::RemoveOptions {
            collection: collection.clone(),
            target: target.clone(),
            by: (*by).into(),
        })?,
        Command::Rebuild {
            collection,
            dry_run,
            yes,
        } => index_rebuild::run(&index_rebuild::RebuildOptions {
            collection: collection.clone(),
            dry_run: *dry_run,
            confirmed: *yes,
        })?,
        Command::Validate(args) => index_validate::run(&index_validate::ValidateOptions {
            collection: args.collection.clone(),
            input: args.input.clone(),
            fields: args.fields(),
        })?,
        Command::Status => status::run()?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        anyhow::bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}
