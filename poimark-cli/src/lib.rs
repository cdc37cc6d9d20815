//! Command-line front end for the poimark engine.
//!
//! Every subcommand opens the SQLite store named by `--database` (default
//! `poimark.db`), resolves the acting user from `--user` and forwards one
//! action through the dispatcher. Results are printed as pretty JSON.
//! Options layer CLI flags over `POIMARK_CMDS_<COMMAND>_<FIELD>` environment
//! variables and configuration files.
#![forbid(unsafe_code)]

use std::io::Write;

use clap::{Parser, Subcommand};

mod actions;
mod error;
mod import;

pub use error::CliError;

use actions::{
    BookmarkArgs, BookmarksArgs, MoveBookmarkArgs, RateArgs, RatingsArgs, SearchArgs,
    UnbookmarkArgs, UnrateArgs,
};
use import::ImportArgs;

pub(crate) const ARG_DATABASE: &str = "database";
pub(crate) const ARG_USER: &str = "user";
pub(crate) const ARG_DATASET: &str = "dataset";
pub(crate) const ARG_POI: &str = "poi";
pub(crate) const ARG_SCORE: &str = "score";
pub(crate) const ARG_BEFORE: &str = "before";
pub(crate) const ARG_LON: &str = "lon";
pub(crate) const ARG_LAT: &str = "lat";
pub(crate) const ARG_RADIUS: &str = "radius";
pub(crate) const ARG_REGION: &str = "region";
pub(crate) const ARG_CATEGORY: &str = "category";
pub(crate) const ENV_DATASET: &str = "POIMARK_CMDS_IMPORT_DATASET";
pub(crate) const ENV_SEARCH_LON: &str = "POIMARK_CMDS_SEARCH_LON";
pub(crate) const ENV_SEARCH_LAT: &str = "POIMARK_CMDS_SEARCH_LAT";
pub(crate) const ENV_SEARCH_RADIUS: &str = "POIMARK_CMDS_SEARCH_RADIUS";
pub(crate) const ENV_RATE_POI: &str = "POIMARK_CMDS_RATE_POI";
pub(crate) const ENV_RATE_SCORE: &str = "POIMARK_CMDS_RATE_SCORE";
pub(crate) const ENV_UNRATE_POI: &str = "POIMARK_CMDS_UNRATE_POI";
pub(crate) const ENV_BOOKMARK_POI: &str = "POIMARK_CMDS_BOOKMARK_POI";
pub(crate) const ENV_UNBOOKMARK_POI: &str = "POIMARK_CMDS_UNBOOKMARK_POI";
pub(crate) const ENV_MOVE_BOOKMARK_POI: &str = "POIMARK_CMDS_MOVE_BOOKMARK_POI";

/// Database used when no layer names one.
pub const DEFAULT_DATABASE: &str = "poimark.db";

/// Run the poimark CLI with the current process arguments and environment,
/// writing results to standard output.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    run_command(cli.command, &mut stdout)
}

fn run_command(command: Command, writer: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::Import(args) => import::run_import_with(args.into_config()?, writer),
        Command::Search(args) => actions::run_action_with(args.into_config()?, writer),
        Command::Rate(args) => actions::run_action_with(args.into_config()?, writer),
        Command::Unrate(args) => actions::run_action_with(args.into_config()?, writer),
        Command::Bookmark(args) => actions::run_action_with(args.into_config()?, writer),
        Command::Unbookmark(args) => actions::run_action_with(args.into_config()?, writer),
        Command::MoveBookmark(args) => actions::run_action_with(args.into_config()?, writer),
        Command::Bookmarks(args) => actions::run_action_with(args.into_config()?, writer),
        Command::Ratings(args) => actions::run_action_with(args.into_config()?, writer),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "poimark",
    about = "Search, rate and bookmark points of interest",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load users, regions and POIs from a JSON dataset.
    Import(ImportArgs),
    /// Search POIs around a point and/or inside regions.
    Search(SearchArgs),
    /// Rate a POI on the 0-10 scale.
    Rate(RateArgs),
    /// Remove your rating of a POI.
    Unrate(UnrateArgs),
    /// Append a POI to your bookmark list.
    Bookmark(BookmarkArgs),
    /// Remove a POI from your bookmark list.
    Unbookmark(UnbookmarkArgs),
    /// Reorder your bookmark list.
    MoveBookmark(MoveBookmarkArgs),
    /// List your bookmarks in order.
    Bookmarks(BookmarksArgs),
    /// List your ratings.
    Ratings(RatingsArgs),
}

#[cfg(test)]
mod tests;
