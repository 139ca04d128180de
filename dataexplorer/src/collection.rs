//! Loading the set of locally stored projects.

use std::sync::Arc;

use log::{debug, warn};

use crate::project::{ProjectSnapshot, PROJECT_ID_PREFIX};
use crate::storage::KeyValueStore;
use crate::{Error, Project};

/// A stored project that could not be loaded.
#[derive(Debug)]
pub struct LoadFailure {
    pub key: String,
    pub error: Error,
}

/// All of the projects held in a local store.
#[derive(Debug, Default)]
pub struct ProjectCollection {
    projects: Vec<Project>,
}

impl ProjectCollection {
    /// Load every project in the given store.
    ///
    /// Only keys starting with the project ID prefix are considered. Entries
    /// that fail to load are reported individually and skipped, without
    /// affecting the loading of any other entry.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<(Self, Vec<LoadFailure>), Error> {
        let mut collection = Self::default();
        let mut failures = Vec::new();
        for key in store.keys()? {
            if !key.starts_with(PROJECT_ID_PREFIX) {
                continue;
            }
            match load_one(store.clone(), &key) {
                Ok(project) => collection.push(project),
                Err(e) => {
                    warn!("Failed to load project {}: {}", key, e);
                    failures.push(LoadFailure {
                        error: Error::ProjectLoad(key.clone(), Box::new(e)),
                        key,
                    });
                }
            }
        }
        debug!(
            "Loaded {} project(s) from local storage, {} failure(s)",
            collection.len(),
            failures.len()
        );
        Ok((collection, failures))
    }

    pub fn push(&mut self, project: Project) {
        self.projects.push(project);
    }

    pub fn get(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Project> {
        self.projects.iter()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

/// Load the project stored under the given key. A stored project without an
/// ID takes the key as its ID.
pub fn load_one(store: Arc<dyn KeyValueStore>, key: &str) -> Result<Project, Error> {
    let json = store
        .get(key)?
        .ok_or_else(|| Error::NoSuchProject(key.to_string()))?;
    let mut snapshot = serde_json::from_str::<ProjectSnapshot>(&json)?;
    if snapshot.id.is_none() {
        debug!("Project stored under {} has no ID, using its key", key);
        snapshot.id = Some(key.to_string());
    }
    Project::create(store, Some(snapshot))
}
