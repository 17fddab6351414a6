//! The Census command line tool.
//!
//! `census run` loads measures and views from a config folder, replays measurements from a file
//! or stdin and writes view snapshots to stdout as JSON lines:
//!
//! ```text
//! census --config ./config run --input measurements.jsonl
//! ```

mod cli;
mod cliapp;
mod setup;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            census_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
