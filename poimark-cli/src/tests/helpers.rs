//! Test helpers for building throwaway databases and datasets.

use camino::Utf8PathBuf;
use poimark_core::test_support::{sample_pois, sample_regions, sample_users};
use serde_json::Value;
use tempfile::TempDir;

use crate::actions::{ActionConfig, run_action_with};
use crate::import::{Dataset, ImportConfig, run_import_with};

/// A temporary directory holding a dataset file and a database path.
pub(super) struct Workspace {
    _dir: TempDir,
    pub(super) root: Utf8PathBuf,
    pub(super) dataset: Utf8PathBuf,
    pub(super) database: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        let dataset = root.join("dataset.json");
        let database = root.join("poimark.db");
        Self {
            _dir: dir,
            root,
            dataset,
            database,
        }
    }

    /// Write the sample users, regions and POIs as the dataset file.
    pub(super) fn with_sample_dataset() -> Self {
        let workspace = Self::new();
        let mut regions = sample_regions();
        // Provinces first, so the import has to reorder them.
        regions.reverse();
        let dataset = Dataset {
            users: sample_users().expect("sample users"),
            regions,
            pois: sample_pois(),
        };
        workspace.write_dataset(&dataset);
        workspace
    }

    pub(super) fn write_dataset(&self, dataset: &Dataset) {
        let payload = serde_json::to_vec_pretty(dataset).expect("encode dataset");
        std::fs::write(&self.dataset, payload).expect("write dataset");
    }

    pub(super) fn import(&self) -> Value {
        let config = ImportConfig {
            dataset: self.dataset.clone(),
            database: self.database.clone(),
        };
        let mut output = Vec::new();
        run_import_with(config, &mut output).expect("import succeeds");
        serde_json::from_slice(&output).expect("import output is JSON")
    }

    pub(super) fn run(&self, config: ActionConfig) -> Result<Value, crate::CliError> {
        let mut output = Vec::new();
        run_action_with(config, &mut output)?;
        Ok(serde_json::from_slice(&output).expect("action output is JSON"))
    }

    /// Pin a parsed configuration to this workspace's database.
    pub(super) fn target(&self, mut config: ActionConfig) -> ActionConfig {
        config.database = self.database.clone();
        config
    }
}

/// Ids of the POIs in a `results` outcome.
pub(super) fn result_ids(outcome: &Value) -> Vec<u64> {
    outcome["pois"]
        .as_array()
        .expect("results carry a pois array")
        .iter()
        .map(|hit| hit["poi"]["id"].as_u64().expect("numeric id"))
        .collect()
}

/// POI ids of a `bookmarks` outcome in list order.
pub(super) fn bookmarked_ids(outcome: &Value) -> Vec<u64> {
    outcome["bookmarks"]
        .as_array()
        .expect("bookmarks array")
        .iter()
        .map(|bookmark| bookmark["poi"].as_u64().expect("numeric id"))
        .collect()
}
