use std::path::PathBuf;

use thiserror::Error;

/// The primary error type that can be produced by the data explorer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error {0}: {1}")]
    Io(String, std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("unsupported configuration file type: {0}")]
    UnsupportedConfigFile(PathBuf),
    #[error("invalid storage key \"{0}\": keys may only contain ASCII letters, digits, '-', '_' and '.'")]
    InvalidStorageKey(String),
    #[error("failed to load project stored under \"{0}\": {1}")]
    ProjectLoad(String, Box<Error>),
    #[error("no project stored under \"{0}\"")]
    NoSuchProject(String),
    #[error("project has no script \"{0}\"")]
    NoSuchScript(String),
    #[error("project has no dataset \"{0}\"")]
    NoSuchDataset(String),
    #[error("failed to generate a unique project ID after widening the ID space {0} times")]
    IdSpaceExhausted(u32),
    #[error("bundle is missing its manifest file \"{0}\"")]
    MissingManifest(String),
    #[error("bundle manifest must be a JSON object")]
    InvalidManifest,
    #[error("bundle has no file for declared script path \"{0}\"")]
    MissingScriptFile(String),
    #[error("bundle path \"{0}\" is used more than once")]
    DuplicateBundlePath(String),
    #[error("invalid remote source URL \"{0}\": {1}")]
    InvalidSourceUrl(String, String),
    #[error("unsupported dataset backend: {0}")]
    UnsupportedBackend(String),
    #[error("dataset backed by a remote source must be fetched before it can be loaded: {0}")]
    DatasetNotMaterialized(String),
    #[error("project has no source dataset to load")]
    NoSourceDataset,
    #[error("remote operations require authentication")]
    NotAuthenticated,
    #[error("remote resource not found: {0}")]
    RemoteNotFound(String),
    #[error("remote {0} failed: {1}")]
    Remote(String, String),
}
