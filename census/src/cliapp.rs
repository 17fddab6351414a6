//! Definition of the command line app.

use clap::builder::ValueParser;
use clap::{Arg, ArgAction, Command};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Census aggregates measurements into views and exports them.";

pub fn make_app() -> Command {
    Command::new("census")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .propagate_version(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .env("CENSUS_CONFIG")
                .default_value(".census")
                .value_parser(ValueParser::path_buf())
                .help("The path to the config folder."),
        )
        .subcommand(
            Command::new("run")
                .about("Replay measurements and export the configured views")
                .after_help(
                    "This registers all views from the config file, records every \
                     measurement read from the input and exports the views as JSON lines \
                     to stdout.  Views are exported in every reporting period and once more \
                     after the input has been read completely.",
                )
                .arg(
                    Arg::new("input")
                        .value_name("FILE")
                        .long("input")
                        .short('i')
                        .default_value("-")
                        .value_parser(ValueParser::path_buf())
                        .help("A file with one JSON measurement per line, or - for stdin."),
                )
                .arg(
                    Arg::new("log_level")
                        .value_name("LEVEL")
                        .long("log-level")
                        .env("CENSUS_LOG_LEVEL")
                        .help("The log level, overriding the config file."),
                )
                .arg(
                    Arg::new("reporting_period_ms")
                        .value_name("MILLIS")
                        .long("reporting-period-ms")
                        .env("CENSUS_REPORTING_PERIOD_MS")
                        .help("The export interval in milliseconds, overriding the config file."),
                )
                .arg(
                    Arg::new("dry_run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Only validate the config without reading input."),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the census config")
                .subcommand_required(true)
                .subcommand(
                    Command::new("show")
                        .about("Show the effective config")
                        .after_help(
                            "This dumps the loaded config as YAML, including defaults for \
                             all omitted values.",
                        ),
                ),
        )
}
