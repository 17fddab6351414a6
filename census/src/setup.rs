use anyhow::Result;
use census_config::Config;
use census_stats::View;
use census_tags::canonical_keys;

/// Validates that the configured views can be registered together.
///
/// A view may be listed more than once as long as every entry has the same definition.
pub fn check_config(config: &Config) -> Result<()> {
    let views = config.views();
    for (index, view) in views.iter().enumerate() {
        let name = effective_name(view);
        let conflict = views[..index]
            .iter()
            .any(|other| effective_name(other) == name && !same_definition(view, other));

        if conflict {
            anyhow::bail!("view `{name}` is configured more than once with different definitions");
        }
    }

    Ok(())
}

fn same_definition(view: &View, other: &View) -> bool {
    view.measure.name() == other.measure.name()
        && view.aggregation == other.aggregation
        && canonical_keys(view.tag_keys.iter().cloned())
            == canonical_keys(other.tag_keys.iter().cloned())
}

fn effective_name(view: &View) -> &str {
    if view.name.is_empty() {
        view.measure.name()
    } else {
        &view.name
    }
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        census_log::info!("launching census without config folder");
    } else {
        census_log::info!(
            "launching census from config folder {}",
            config.path().display()
        );
    }
    census_log::info!("  log level: {}", config.logging().level);
    census_log::info!(
        "  reporting period: {}ms",
        config.stats().reporting_period().as_millis()
    );
    census_log::info!("  measures: {}", config.measures().len());
    census_log::info!("  views: {}", config.views().len());
}
