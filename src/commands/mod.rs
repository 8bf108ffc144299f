//! Command implementations

pub mod apply;
pub mod kinds;
pub mod run;

use crate::Context;
use crate::catalog;
use crate::cli::{ConnectionArgs, OutputFormat, ReconcileArgs};
use crate::config::AppConfig;
use crate::ui;
use anyhow::{Context as AnyhowContext, Result};
use catalystkit::CatalystClient;
use declarative::{Engine, LogCrateSink, PollerConfig, ReconcileOptions, ReconcileReport, Registry};
use std::sync::Arc;
use std::time::Duration;

/// Built-in descriptors plus those named in the config and on the command line.
pub fn load_registry(config: &AppConfig) -> Result<Registry> {
    let mut extra = Vec::new();
    for path in config.descriptor_paths() {
        let loaded = catalog::load_descriptors(&path)?;
        log::info!("loaded {} descriptor(s) from {}", loaded.len(), path.display());
        extra.extend(loaded);
    }
    catalog::registry(extra).context("Invalid resource descriptors")
}

/// Connect to the controller and build a reconciliation engine.
pub fn build_engine(args: &ConnectionArgs) -> Result<Engine> {
    let config = AppConfig::load(args.config.as_deref())?.with_overrides(args);
    let registry = load_registry(&config)?;
    let client = CatalystClient::new(config.connection.clone())
        .context("Cannot connect to Catalyst Center")?;
    log::debug!("target controller {}", client.config().base_url());

    Ok(Engine::new(Arc::new(client), Arc::new(registry))
        .with_sink(Arc::new(LogCrateSink))
        .with_poller_config(config.poller.apply(PollerConfig::default())))
}

/// Per-call options from the command line.
pub fn options(args: &ReconcileArgs) -> ReconcileOptions {
    let mut options = ReconcileOptions::default();
    if let Some(secs) = args.timeout {
        options = options.with_timeout(Duration::from_secs(secs));
    }
    for field in &args.force_rotate {
        options = options.rotate(field.clone());
    }
    options
}

/// Print reports in the requested format.
pub fn emit(ctx: &Context, reports: &[ReconcileReport], args: &ReconcileArgs) -> Result<()> {
    match args.format {
        OutputFormat::Json => {
            let json = if let [single] = reports {
                serde_json::to_string_pretty(single)?
            } else {
                serde_json::to_string_pretty(reports)?
            };
            println!("{json}");
        }
        OutputFormat::Text => {
            for report in reports {
                if ctx.quiet && !report.changed && !report.failed {
                    continue;
                }
                ui::report(report, args.diff || ctx.verbose > 0);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_args() {
        let args = ReconcileArgs {
            timeout: Some(90),
            force_rotate: vec!["password".into()],
            ..ReconcileArgs::default()
        };
        let options = options(&args);
        assert_eq!(options.timeout, Some(Duration::from_secs(90)));
        assert!(options.force_rotate.contains("password"));
    }

    #[test]
    fn test_registry_without_extra_files() {
        let registry = load_registry(&AppConfig::default()).unwrap();
        assert!(registry.contains("image_golden_tag"));
    }
}
