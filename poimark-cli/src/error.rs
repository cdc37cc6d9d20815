//! Error types emitted by the poimark CLI.

use std::sync::Arc;

use camino::Utf8PathBuf;
use poimark_core::{ActionError, PointOfInterestError, RegionError, SqliteStoreError, UserError};
use thiserror::Error;

/// Errors emitted by the poimark CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Name of the missing option.
        field: &'static str,
        /// Environment variable that could supply it.
        env: &'static str,
    },
    /// `--user` names an account the database does not hold.
    #[error("unknown user {0}")]
    UnknownUser(u64),
    /// Opening the dataset file failed.
    #[error("failed to open dataset at {path:?}: {source}")]
    OpenDataset {
        /// Dataset location.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Dataset JSON could not be decoded.
    #[error("failed to parse dataset JSON at {path:?}: {source}")]
    ParseDataset {
        /// Dataset location.
        path: Utf8PathBuf,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// A dataset user failed validation.
    #[error("dataset user {id} is invalid: {source}")]
    InvalidUser {
        /// Identifier of the user.
        id: u64,
        /// Validation failure.
        #[source]
        source: UserError,
    },
    /// A dataset POI failed validation.
    #[error("dataset POI {id} is invalid: {source}")]
    InvalidPoi {
        /// Identifier of the POI.
        id: u64,
        /// Validation failure.
        #[source]
        source: PointOfInterestError,
    },
    /// A dataset region does not fit the stored hierarchy.
    #[error("dataset region {id} is invalid: {source}")]
    InvalidRegion {
        /// Identifier of the region.
        id: u64,
        /// Hierarchy failure.
        #[source]
        source: RegionError,
    },
    /// The SQLite store failed.
    #[error(transparent)]
    Store(Box<SqliteStoreError>),
    /// The dispatcher rejected the action.
    #[error(transparent)]
    Action(#[from] ActionError),
    /// Serialising the command output failed.
    #[error("failed to serialise output: {0}")]
    SerialiseOutput(#[source] serde_json::Error),
    /// Writing the command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}

impl From<SqliteStoreError> for CliError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Store(Box::new(error))
    }
}

impl From<poimark_core::StoreError> for CliError {
    fn from(error: poimark_core::StoreError) -> Self {
        SqliteStoreError::from(error).into()
    }
}
