use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use census::{ExporterRegistry, JsonLinesExporter, ReplaySummary, StatsHandle, StatsService};
use census_config::{Config, OverridableConfig};
use clap::ArgMatches;

use crate::cliapp::make_app;
use crate::setup;

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = make_app();
    let matches = app.get_matches();

    let config_path = matches
        .get_one::<PathBuf>("config")
        .ok_or_else(|| anyhow!("missing config path"))?;

    let mut config = Config::from_path(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    match matches.subcommand() {
        Some(("run", matches)) => {
            config.apply_override(extract_config_args(matches))?;
            setup::check_config(&config)?;
            census_log::init(config.logging());
            run(config, matches)
        }
        Some(("config", matches)) => manage_config(&config, matches),
        _ => unreachable!(),
    }
}

/// Extracts config overrides from the command line arguments.
fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    OverridableConfig {
        log_level: matches.get_one("log_level").cloned(),
        reporting_period_ms: matches.get_one("reporting_period_ms").cloned(),
    }
}

fn manage_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", _)) => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(config.to_yaml_string()?.as_bytes())?;
            Ok(())
        }
        _ => unreachable!(),
    }
}

/// Replays the input and exports the configured views until the input is exhausted.
pub fn run(config: Config, matches: &ArgMatches) -> Result<()> {
    setup::dump_spawn_infos(&config);

    if matches.get_flag("dry_run") {
        census_log::info!("config is valid, exiting");
        return Ok(());
    }

    let input = matches
        .get_one::<PathBuf>("input")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("-"));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .thread_name("census")
        .enable_all()
        .build()
        .context("failed to start the runtime")?;

    let summary = runtime.block_on(run_async(config, input))?;
    census_log::info!(
        "recorded {} measurements, skipped {}",
        summary.recorded,
        summary.skipped
    );

    Ok(())
}

async fn run_async(config: Config, input: PathBuf) -> Result<ReplaySummary> {
    let exporters = Arc::new(ExporterRegistry::new());
    exporters.register(Arc::new(JsonLinesExporter::stdout()));

    let service = StatsService::new(config.stats()).with_exporters(exporters);
    let stats = StatsHandle::start(service);

    let measures = config.measures().to_vec();
    for measure in &measures {
        stats.register_measure(measure.clone()).await?;
    }
    stats.register_views(config.views().iter().cloned()).await?;
    census_log::info!("registered {} views", config.views().len());

    let handle = stats.clone();
    let summary = tokio::task::spawn_blocking(move || replay_input(&input, &handle, &measures))
        .await
        .context("replay task panicked")??;

    stats.stop().await?;
    Ok(summary)
}

fn replay_input(
    input: &Path,
    stats: &StatsHandle,
    measures: &[census::Measure],
) -> Result<ReplaySummary> {
    if input == Path::new("-") {
        census_log::debug!("reading measurements from stdin");
        return Ok(census::replay(io::stdin().lock(), stats, measures)?);
    }

    let file = File::open(input)
        .with_context(|| format!("failed to open input {}", input.display()))?;
    census::replay(BufReader::new(file), stats, measures)
        .with_context(|| format!("failed to read input {}", input.display()))
}
