//! Store-backed subcommands that forward one action through the dispatcher.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use geo::Coord;
use log::debug;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use poimark_core::{
    Action, BookmarkPoiAction, CategoryId, Dispatcher, MovePoiBookmarkAction, PoiId,
    RatePoiAction, RegionId, SearchAction, SearchQuery, SqliteStore, UnbookmarkPoiAction,
    UnratePoiAction, UserId,
};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_BEFORE, ARG_CATEGORY, ARG_DATABASE, ARG_LAT, ARG_LON, ARG_POI, ARG_RADIUS, ARG_REGION,
    ARG_SCORE, ARG_USER, CliError, DEFAULT_DATABASE, ENV_BOOKMARK_POI, ENV_MOVE_BOOKMARK_POI,
    ENV_RATE_POI, ENV_RATE_SCORE, ENV_SEARCH_LAT, ENV_SEARCH_LON, ENV_SEARCH_RADIUS,
    ENV_UNBOOKMARK_POI, ENV_UNRATE_POI,
};

/// Resolved configuration shared by every store-backed subcommand.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ActionConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) user: Option<UserId>,
    pub(crate) action: Action,
}

impl ActionConfig {
    fn new(database: Option<Utf8PathBuf>, user: Option<u64>, action: impl Into<Action>) -> Self {
        Self {
            database: database.unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATABASE)),
            user: user.map(UserId),
            action: action.into(),
        }
    }
}

fn require<T>(value: Option<T>, field: &'static str, env: &'static str) -> Result<T, CliError> {
    value.ok_or(CliError::MissingArgument { field, env })
}

/// CLI arguments for the `search` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "search",
    long_about = "Search visible POIs. Give --lon, --lat and --radius (metres) \
                 for a circle search ranked by distance, one or more --region \
                 ids for a containment search, or both. Anonymous searches \
                 may not use --bookmarked or --rated.",
    about = "Search points of interest"
)]
#[ortho_config(prefix = "POIMARK")]
pub(crate) struct SearchArgs {
    /// SQLite database to query.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Acting user id.
    #[arg(long = ARG_USER, value_name = "id")]
    #[serde(default)]
    pub(crate) user: Option<u64>,
    /// Longitude of the search centre.
    #[arg(long = ARG_LON, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lon: Option<f64>,
    /// Latitude of the search centre.
    #[arg(long = ARG_LAT, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lat: Option<f64>,
    /// Search radius in metres.
    #[arg(long = ARG_RADIUS, value_name = "metres", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) radius: Option<f64>,
    /// Restrict results to these regions.
    #[arg(long = ARG_REGION, value_name = "id", value_delimiter = ',')]
    #[serde(default)]
    pub(crate) regions: Vec<u64>,
    /// Restrict results to POIs in any of these categories.
    #[arg(long = ARG_CATEGORY, value_name = "id", value_delimiter = ',')]
    #[serde(default)]
    pub(crate) categories: Vec<u64>,
    /// Keep only POIs the user bookmarked.
    #[arg(long)]
    #[serde(default)]
    pub(crate) bookmarked: bool,
    /// Keep only POIs the user rated.
    #[arg(long)]
    #[serde(default)]
    pub(crate) rated: bool,
}

impl SearchArgs {
    pub(crate) fn into_config(self) -> Result<ActionConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ActionConfig::try_from(merged)
    }
}

impl TryFrom<SearchArgs> for ActionConfig {
    type Error = CliError;

    fn try_from(args: SearchArgs) -> Result<Self, Self::Error> {
        let mut query = if args.lon.is_some() || args.lat.is_some() || args.radius.is_some() {
            let x = require(args.lon, ARG_LON, ENV_SEARCH_LON)?;
            let y = require(args.lat, ARG_LAT, ENV_SEARCH_LAT)?;
            let radius = require(args.radius, ARG_RADIUS, ENV_SEARCH_RADIUS)?;
            SearchQuery::around(Coord { x, y }, radius)
        } else {
            SearchQuery::default()
        };
        if !args.regions.is_empty() {
            query = query.with_regions(args.regions.into_iter().map(RegionId));
        }
        query = query.with_categories(args.categories.into_iter().map(CategoryId));
        query.bookmarked_only = args.bookmarked;
        query.rated_only = args.rated;
        Ok(Self::new(args.database, args.user, SearchAction { query }))
    }
}

/// CLI arguments for the `rate` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "rate",
    about = "Rate a POI; scores outside 0-10 are clamped"
)]
#[ortho_config(prefix = "POIMARK")]
pub(crate) struct RateArgs {
    /// POI to rate.
    #[arg(value_name = "poi")]
    #[serde(default)]
    pub(crate) poi: Option<u64>,
    /// Score; clamped to the 0-10 range.
    #[arg(value_name = "score", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) score: Option<i64>,
    /// SQLite database to update.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Acting user id.
    #[arg(long = ARG_USER, value_name = "id")]
    #[serde(default)]
    pub(crate) user: Option<u64>,
}

impl RateArgs {
    pub(crate) fn into_config(self) -> Result<ActionConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ActionConfig::try_from(merged)
    }
}

impl TryFrom<RateArgs> for ActionConfig {
    type Error = CliError;

    fn try_from(args: RateArgs) -> Result<Self, Self::Error> {
        let poi = require(args.poi, ARG_POI, ENV_RATE_POI)?;
        let score = require(args.score, ARG_SCORE, ENV_RATE_SCORE)?;
        Ok(Self::new(
            args.database,
            args.user,
            RatePoiAction {
                poi: PoiId(poi),
                score,
            },
        ))
    }
}

/// CLI arguments for the `unrate` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(name = "unrate", about = "Remove your rating of a POI")]
#[ortho_config(prefix = "POIMARK")]
pub(crate) struct UnrateArgs {
    /// POI to unrate.
    #[arg(value_name = "poi")]
    #[serde(default)]
    pub(crate) poi: Option<u64>,
    /// SQLite database to update.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Acting user id.
    #[arg(long = ARG_USER, value_name = "id")]
    #[serde(default)]
    pub(crate) user: Option<u64>,
}

impl UnrateArgs {
    pub(crate) fn into_config(self) -> Result<ActionConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ActionConfig::try_from(merged)
    }
}

impl TryFrom<UnrateArgs> for ActionConfig {
    type Error = CliError;

    fn try_from(args: UnrateArgs) -> Result<Self, Self::Error> {
        let poi = PoiId(require(args.poi, ARG_POI, ENV_UNRATE_POI)?);
        Ok(Self::new(args.database, args.user, UnratePoiAction { poi }))
    }
}

/// CLI arguments for the `bookmark` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(name = "bookmark", about = "Append a POI to your bookmarks")]
#[ortho_config(prefix = "POIMARK")]
pub(crate) struct BookmarkArgs {
    /// POI to bookmark.
    #[arg(value_name = "poi")]
    #[serde(default)]
    pub(crate) poi: Option<u64>,
    /// SQLite database to update.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Acting user id.
    #[arg(long = ARG_USER, value_name = "id")]
    #[serde(default)]
    pub(crate) user: Option<u64>,
}

impl BookmarkArgs {
    pub(crate) fn into_config(self) -> Result<ActionConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ActionConfig::try_from(merged)
    }
}

impl TryFrom<BookmarkArgs> for ActionConfig {
    type Error = CliError;

    fn try_from(args: BookmarkArgs) -> Result<Self, Self::Error> {
        let poi = PoiId(require(args.poi, ARG_POI, ENV_BOOKMARK_POI)?);
        Ok(Self::new(args.database, args.user, BookmarkPoiAction { poi }))
    }
}

/// CLI arguments for the `unbookmark` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(name = "unbookmark", about = "Remove a POI from your bookmarks")]
#[ortho_config(prefix = "POIMARK")]
pub(crate) struct UnbookmarkArgs {
    /// POI to drop from the list.
    #[arg(value_name = "poi")]
    #[serde(default)]
    pub(crate) poi: Option<u64>,
    /// SQLite database to update.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Acting user id.
    #[arg(long = ARG_USER, value_name = "id")]
    #[serde(default)]
    pub(crate) user: Option<u64>,
}

impl UnbookmarkArgs {
    pub(crate) fn into_config(self) -> Result<ActionConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ActionConfig::try_from(merged)
    }
}

impl TryFrom<UnbookmarkArgs> for ActionConfig {
    type Error = CliError;

    fn try_from(args: UnbookmarkArgs) -> Result<Self, Self::Error> {
        let poi = PoiId(require(args.poi, ARG_POI, ENV_UNBOOKMARK_POI)?);
        Ok(Self::new(args.database, args.user, UnbookmarkPoiAction { poi }))
    }
}

/// CLI arguments for the `move-bookmark` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "move-bookmark",
    long_about = "Move the bookmark for a POI so it sits directly before the \
                 bookmark named by --before, or at the end of the list when \
                 --before is omitted.",
    about = "Reorder a bookmark"
)]
#[ortho_config(prefix = "POIMARK")]
pub(crate) struct MoveBookmarkArgs {
    /// Bookmarked POI to move.
    #[arg(value_name = "poi")]
    #[serde(default)]
    pub(crate) poi: Option<u64>,
    /// Bookmarked POI to land in front of.
    #[arg(long = ARG_BEFORE, value_name = "poi")]
    #[serde(default)]
    pub(crate) before: Option<u64>,
    /// SQLite database to update.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Acting user id.
    #[arg(long = ARG_USER, value_name = "id")]
    #[serde(default)]
    pub(crate) user: Option<u64>,
}

impl MoveBookmarkArgs {
    pub(crate) fn into_config(self) -> Result<ActionConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ActionConfig::try_from(merged)
    }
}

impl TryFrom<MoveBookmarkArgs> for ActionConfig {
    type Error = CliError;

    fn try_from(args: MoveBookmarkArgs) -> Result<Self, Self::Error> {
        let poi = require(args.poi, ARG_POI, ENV_MOVE_BOOKMARK_POI)?;
        Ok(Self::new(
            args.database,
            args.user,
            MovePoiBookmarkAction {
                poi: PoiId(poi),
                before: args.before.map(PoiId),
            },
        ))
    }
}

/// CLI arguments for the `bookmarks` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(name = "bookmarks", about = "List your bookmarks in order")]
#[ortho_config(prefix = "POIMARK")]
pub(crate) struct BookmarksArgs {
    /// SQLite database to read.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Acting user id.
    #[arg(long = ARG_USER, value_name = "id")]
    #[serde(default)]
    pub(crate) user: Option<u64>,
}

impl BookmarksArgs {
    pub(crate) fn into_config(self) -> Result<ActionConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        Ok(ActionConfig::from(merged))
    }
}

impl From<BookmarksArgs> for ActionConfig {
    fn from(args: BookmarksArgs) -> Self {
        Self::new(args.database, args.user, Action::ListBookmarks)
    }
}

/// CLI arguments for the `ratings` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(name = "ratings", about = "List your ratings")]
#[ortho_config(prefix = "POIMARK")]
pub(crate) struct RatingsArgs {
    /// SQLite database to read.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Acting user id.
    #[arg(long = ARG_USER, value_name = "id")]
    #[serde(default)]
    pub(crate) user: Option<u64>,
}

impl RatingsArgs {
    pub(crate) fn into_config(self) -> Result<ActionConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        Ok(ActionConfig::from(merged))
    }
}

impl From<RatingsArgs> for ActionConfig {
    fn from(args: RatingsArgs) -> Self {
        Self::new(args.database, args.user, Action::ListRatings)
    }
}

/// Open the store, resolve the caller and dispatch the configured action.
pub(crate) fn run_action_with(
    config: ActionConfig,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let store = SqliteStore::open(config.database.as_std_path())?;
    let caller = match config.user {
        Some(id) => Some(store.user(id)?.ok_or(CliError::UnknownUser(id.get()))?),
        None => None,
    };
    let regions = store.region_catalog()?;
    debug!("dispatching {:?} for {:?}", config.action, config.user);
    let outcome = Dispatcher::new(&store, &regions).dispatch(caller.as_ref(), config.action)?;
    write_json(writer, &outcome)
}

pub(crate) fn write_json<T>(writer: &mut dyn Write, value: &T) -> Result<(), CliError>
where
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_string_pretty(value).map_err(CliError::SerialiseOutput)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn search_config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<ActionConfig, CliError> {
    let merged = SearchArgs::merge_from_layers(layers).map_err(CliError::from)?;
    ActionConfig::try_from(merged)
}

#[cfg(test)]
pub(crate) fn rate_config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<ActionConfig, CliError> {
    let merged = RateArgs::merge_from_layers(layers).map_err(CliError::from)?;
    ActionConfig::try_from(merged)
}
