//! Import command: load a JSON dataset into the SQLite store.

use std::{fs::File, io::BufReader, io::Write};

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use poimark_core::{PointOfInterest, Region, SqliteStore, User};
use serde::{Deserialize, Serialize};

use crate::{ARG_DATABASE, ARG_DATASET, CliError, DEFAULT_DATABASE, ENV_DATASET};

/// CLI arguments for the `import` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "import",
    long_about = "Load users, regions and points of interest from a JSON \
                 document with `users`, `regions` and `pois` arrays. Users \
                 and POIs replace stored rows with the same id; regions \
                 must be new.",
    about = "Import a JSON dataset"
)]
#[ortho_config(prefix = "POIMARK")]
pub(crate) struct ImportArgs {
    /// Path to the JSON dataset.
    #[arg(value_name = "path")]
    #[serde(default)]
    pub(crate) dataset: Option<Utf8PathBuf>,
    /// SQLite database to write.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
}

impl ImportArgs {
    pub(crate) fn into_config(self) -> Result<ImportConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ImportConfig::try_from(merged)
    }
}

/// Resolved `import` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImportConfig {
    pub(crate) dataset: Utf8PathBuf,
    pub(crate) database: Utf8PathBuf,
}

impl TryFrom<ImportArgs> for ImportConfig {
    type Error = CliError;

    fn try_from(args: ImportArgs) -> Result<Self, Self::Error> {
        let dataset = args.dataset.ok_or(CliError::MissingArgument {
            field: ARG_DATASET,
            env: ENV_DATASET,
        })?;
        let database = args
            .database
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATABASE));
        Ok(Self { dataset, database })
    }
}

/// Rows read from a dataset file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub(crate) struct Dataset {
    #[serde(default)]
    pub(crate) users: Vec<User>,
    #[serde(default)]
    pub(crate) regions: Vec<Region>,
    #[serde(default)]
    pub(crate) pois: Vec<PointOfInterest>,
}

/// Counts reported after an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct ImportSummary {
    pub(crate) users: usize,
    pub(crate) regions: usize,
    pub(crate) pois: usize,
}

pub(crate) fn run_import_with(
    config: ImportConfig,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let dataset = load_dataset(&config.dataset)?;
    let store = SqliteStore::open(config.database.as_std_path())?;
    let summary = import_dataset(&store, dataset)?;
    info!(
        "imported {} users, {} regions and {} POIs into {}",
        summary.users, summary.regions, summary.pois, config.database
    );
    crate::actions::write_json(writer, &summary)
}

/// Loads a JSON-encoded [`Dataset`] from disk.
pub(crate) fn load_dataset(path: &Utf8Path) -> Result<Dataset, CliError> {
    let file = File::open(path).map_err(|source| CliError::OpenDataset {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| CliError::ParseDataset {
        path: path.to_path_buf(),
        source,
    })
}

/// Validates every row, then stores them. Nothing is written when any row
/// fails. Countries are inserted before provinces so parents resolve
/// regardless of file order.
pub(crate) fn import_dataset(
    store: &SqliteStore,
    dataset: Dataset,
) -> Result<ImportSummary, CliError> {
    let Dataset {
        users,
        mut regions,
        pois,
    } = dataset;
    regions.sort_by_key(|region| region.parent().is_some());
    validate_dataset(store, &users, &regions, &pois)?;

    for user in &users {
        store.insert_user(user)?;
    }
    for region in &regions {
        store.insert_region(region)?;
    }
    for poi in &pois {
        store.insert_poi(poi)?;
    }

    Ok(ImportSummary {
        users: users.len(),
        regions: regions.len(),
        pois: pois.len(),
    })
}

fn validate_dataset(
    store: &SqliteStore,
    users: &[User],
    regions: &[Region],
    pois: &[PointOfInterest],
) -> Result<(), CliError> {
    for user in users {
        User::new(user.id, user.username.clone()).map_err(|source| CliError::InvalidUser {
            id: user.id.get(),
            source,
        })?;
    }

    let mut catalog = store.region_catalog()?;
    for region in regions {
        catalog
            .insert(region.clone())
            .map_err(|source| CliError::InvalidRegion {
                id: region.id.get(),
                source,
            })?;
    }

    for poi in pois {
        PointOfInterest::new(poi.id, poi.name.clone(), poi.location).map_err(|source| {
            CliError::InvalidPoi {
                id: poi.id.get(),
                source,
            }
        })?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<ImportConfig, CliError> {
    let merged = ImportArgs::merge_from_layers(layers).map_err(CliError::from)?;
    ImportConfig::try_from(merged)
}
