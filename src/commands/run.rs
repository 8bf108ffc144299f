use super::{build_engine, emit, options};
use crate::Context;
use crate::cli::{ConnectionArgs, OutputFormat, RunArgs};
use crate::document::{self, BatchEntry};
use crate::ui;
use anyhow::{Result, bail};
use declarative::{BatchSummary, ReconcileOptions, ReconcileRequest};

/// Turn batch entries into requests sharing the command-line options.
pub fn requests(entries: Vec<BatchEntry>, check_mode: bool, options: &ReconcileOptions) -> Vec<ReconcileRequest> {
    entries
        .into_iter()
        .map(|entry| {
            entry
                .into_request()
                .check_mode(check_mode)
                .with_options(options.clone())
        })
        .collect()
}

pub fn run(ctx: &Context, connection: &ConnectionArgs, args: RunArgs) -> Result<()> {
    let entries = document::read_batch(&args.file)?;
    if entries.is_empty() {
        ui::warn(&format!("No resources in {}", args.file));
        return Ok(());
    }
    let engine = build_engine(connection)?;
    let text = args.reconcile.format == OutputFormat::Text;
    if text && !ctx.quiet {
        ui::header(&format!("Reconciling {} resources", entries.len()));
        if args.reconcile.check {
            ui::info("Check mode - no changes will be made");
        }
        ui::kv("Jobs", &args.jobs.to_string());
        println!();
    }

    let requests = requests(entries, args.reconcile.check, &options(&args.reconcile));
    let reports = engine.reconcile_many(requests, args.jobs);
    emit(ctx, &reports, &args.reconcile)?;

    let summary = BatchSummary::from_reports(&reports);
    if text {
        ui::summary(&summary, args.reconcile.check);
    }
    if !summary.is_success() {
        bail!("{} of {} reconciliations failed", summary.failed, summary.total());
    }
    Ok(())
}
