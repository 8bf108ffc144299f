use super::{build_engine, emit, options};
use crate::Context;
use crate::cli::{ApplyArgs, ConnectionArgs};
use crate::document;
use anyhow::{Result, bail};
use declarative::{Document, ReconcileRequest};

/// Assemble the desired document from `--file`, `--json` and `--set`.
pub fn desired_document(args: &ApplyArgs) -> Result<Document> {
    let mut doc = match (&args.file, &args.json) {
        (Some(path), _) => document::read_document(path)?,
        (None, Some(json)) => document::parse_document(json, false)?,
        (None, None) => Document::new(),
    };
    document::apply_assignments(&mut doc, &args.set)?;
    Ok(doc)
}

pub fn run(ctx: &Context, connection: &ConnectionArgs, args: ApplyArgs) -> Result<()> {
    let desired = desired_document(&args)?;
    let engine = build_engine(connection)?;
    let request = ReconcileRequest::new(args.kind.clone(), args.state.into(), desired)
        .check_mode(args.reconcile.check)
        .with_options(options(&args.reconcile));

    let report = engine.reconcile(request);
    emit(ctx, std::slice::from_ref(&report), &args.reconcile)?;

    if report.failed {
        bail!("{} failed", args.kind);
    }
    Ok(())
}
