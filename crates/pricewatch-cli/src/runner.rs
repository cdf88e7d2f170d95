//! Command execution: one extraction run, init and config.

use chrono::Utc;
use console::style;
use pricewatch::{
    CsvSink, Engine, ExtractedRecord, RunConfig, RunReport, SessionFactory, StorageSink,
};
use std::fs;
use std::io::Write;
use tracing::warn;

use crate::commands::{ConfigArgs, InitArgs, RunArgs};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// What a successful run wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Rows appended to the sink
    pub records: usize,
}

/// Run once against sessions from `factory`, appending to `sink`.
///
/// Success appends the whole batch in one call, even when it is empty.
/// Failure appends nothing unless `heartbeat_on_failure` is set, in which
/// case a single heartbeat row is appended before the error is returned.
pub async fn run_with_factory<F, S>(
    config: &CliConfig,
    run_config: &RunConfig,
    factory: &F,
    sink: &mut S,
    heartbeat_on_failure: bool,
) -> CliResult<RunSummary>
where
    F: SessionFactory,
    S: StorageSink + ?Sized,
{
    let engine = Engine::from_config(run_config)?;

    match engine.run_in_session(factory).await {
        Ok(report) => {
            sink.append(report.batch.records())?;
            print_success(config, &report);
            Ok(RunSummary {
                records: report.batch.len(),
            })
        }
        Err(failure) => {
            if heartbeat_on_failure {
                if let Err(e) = sink.append(&[ExtractedRecord::heartbeat(Utc::now())]) {
                    warn!(error = %e, "heartbeat row not written");
                }
            }
            if let Some(path) = failure
                .diagnostic
                .as_ref()
                .and_then(|saved| saved.primary_path())
            {
                eprintln!("Diagnostics saved to {}", path.display());
            }
            Err(failure.into())
        }
    }
}

fn print_success(config: &CliConfig, report: &RunReport) {
    if config.verbosity.is_quiet() {
        return;
    }
    if report.batch.is_empty() {
        println!(
            "{} no result items found; nothing recorded",
            style("Empty:").yellow().bold()
        );
        return;
    }
    println!(
        "{} {} records in {:.1}s",
        style("Recorded").green().bold(),
        report.batch.len(),
        report.elapsed.as_secs_f64()
    );
    if config.verbosity.is_verbose() {
        for record in &report.batch {
            println!("  {:<32} {}", record.brand, record.price);
        }
    }
}

/// `pricewatch run`
pub fn execute_run(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let run_config = args.overrides.resolve()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let mut sink = CsvSink::new(&run_config.output);

    runtime.block_on(async {
        let factory = session_factory(&run_config)?;
        run_with_factory(
            config,
            &run_config,
            &factory,
            &mut sink,
            args.heartbeat_on_failure,
        )
        .await
    })?;
    Ok(())
}

#[cfg(feature = "browser")]
fn session_factory(run_config: &RunConfig) -> CliResult<pricewatch::ChromiumSessionFactory> {
    Ok(pricewatch::ChromiumSessionFactory::new(
        run_config.browser.clone(),
    ))
}

#[cfg(not(feature = "browser"))]
fn session_factory(_run_config: &RunConfig) -> CliResult<pricewatch::mock::MockSessionFactory> {
    Err(CliError::config(
        "built without browser support. Rebuild with --features browser",
    ))
}

/// `pricewatch init`
pub fn execute_init(config: &CliConfig, args: &InitArgs) -> CliResult<()> {
    if args.path.exists() && !args.force {
        return Err(CliError::invalid_argument(format!(
            "{} already exists (use --force to overwrite)",
            args.path.display()
        )));
    }
    if let Some(parent) = args.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&args.path, RunConfig::template()?)?;

    if !config.verbosity.is_quiet() {
        println!("{} {}", style("Wrote").green().bold(), args.path.display());
    }
    Ok(())
}

/// `pricewatch config`
pub fn execute_config(args: &ConfigArgs) -> CliResult<()> {
    let yaml = args.overrides.resolve()?.to_yaml()?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(yaml.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
