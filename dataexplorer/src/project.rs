//! Projects bring together everything a user works with: scripts, datasets
//! and views, plus some descriptive metadata.

use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::package::{self, Bundle};
use crate::remote::RemoteBundleStore;
use crate::storage::KeyValueStore;
use crate::{Dataset, DateTime, Error, RemoteSourceRef, Script, ViewDescriptor};

/// All locally stored project IDs start with this prefix.
pub const PROJECT_ID_PREFIX: &str = "dataexplorer-";

// Candidate IDs are first drawn from [0, ID_SPACE). Every time
// MAX_DRAWS_PER_SPACE candidates in a row collide, the space is widened by
// ID_SPACE_GROWTH, at most MAX_SPACE_WIDENINGS times.
const ID_SPACE: u64 = 1_000_000;
const ID_SPACE_GROWTH: u64 = 1_000;
const MAX_DRAWS_PER_SPACE: u32 = 32;
const MAX_SPACE_WIDENINGS: u32 = 4;

/// Whether a project is still being worked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectState {
    #[default]
    Active,
    Archived,
}

/// The plain attribute set of a project, as persisted locally and as written
/// to a bundle's manifest.
///
/// Any attribute missing during deserialization takes its default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub readme: String,
    #[serde(default = "default_manifest_version")]
    pub manifest_version: u32,
    #[serde(default)]
    pub state: ProjectState,
    #[serde(default)]
    pub created: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime>,
    #[serde(default = "default_scripts")]
    pub scripts: Vec<Script>,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
    #[serde(default = "ViewDescriptor::defaults")]
    pub views: Vec<ViewDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gist_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gist_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

fn default_name() -> String {
    "No name".to_string()
}

fn default_manifest_version() -> u32 {
    1
}

fn default_scripts() -> Vec<Script> {
    vec![Script::default_main()]
}

impl Default for ProjectSnapshot {
    fn default() -> Self {
        Self {
            id: None,
            name: default_name(),
            readme: String::new(),
            manifest_version: default_manifest_version(),
            state: ProjectState::default(),
            created: DateTime::now(),
            last_modified: None,
            scripts: default_scripts(),
            datasets: Vec::new(),
            views: ViewDescriptor::defaults(),
            gist_id: None,
            gist_url: None,
            extra: Map::new(),
        }
    }
}

/// The outcome of publishing a project to a remote bundle store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Published {
    /// The project was published for the first time.
    Created { id: String, url: String },
    /// An existing remote bundle was updated.
    Updated { id: String },
    /// Nothing was published because the caller is not authenticated.
    Skipped,
}

/// A user's unit of work.
///
/// Every mutation made through a project's methods is immediately persisted
/// to the local store it was created with.
pub struct Project {
    id: String,
    name: String,
    readme: String,
    manifest_version: u32,
    state: ProjectState,
    created: DateTime,
    last_modified: Option<DateTime>,
    scripts: Vec<Script>,
    datasets: Vec<Dataset>,
    views: Vec<ViewDescriptor>,
    gist_id: Option<String>,
    gist_url: Option<String>,
    extra: Map<String, JsonValue>,
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("scripts", &self.scripts.len())
            .field("datasets", &self.datasets.len())
            .field("gist_id", &self.gist_id)
            .finish_non_exhaustive()
    }
}

impl Project {
    /// Construct a project from the given initial attributes (or from
    /// defaults if none are supplied), generating a fresh ID if the
    /// attributes do not carry one.
    ///
    /// Construction itself does not persist the project.
    pub fn create(
        store: Arc<dyn KeyValueStore>,
        init: Option<ProjectSnapshot>,
    ) -> Result<Self, Error> {
        let init = init.unwrap_or_default();
        let id = match init.id {
            Some(id) => id,
            None => generate_project_id(store.as_ref())?,
        };
        trace!("Constructed project {}", id);
        Ok(Self {
            id,
            name: init.name,
            readme: init.readme,
            manifest_version: init.manifest_version,
            state: init.state,
            created: init.created,
            last_modified: init.last_modified,
            scripts: init.scripts,
            datasets: init.datasets,
            views: init.views,
            gist_id: init.gist_id,
            gist_url: init.gist_url,
            extra: init.extra,
            store,
        })
    }

    /// Construct a project from its JSON attribute representation.
    pub fn from_json<S: AsRef<str>>(store: Arc<dyn KeyValueStore>, json: S) -> Result<Self, Error> {
        let snapshot = serde_json::from_str::<ProjectSnapshot>(json.as_ref())?;
        Self::create(store, Some(snapshot))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn readme(&self) -> &str {
        &self.readme
    }

    pub fn manifest_version(&self) -> u32 {
        self.manifest_version
    }

    pub fn state(&self) -> ProjectState {
        self.state
    }

    pub fn created(&self) -> DateTime {
        self.created
    }

    pub fn last_modified(&self) -> Option<DateTime> {
        self.last_modified
    }

    pub fn scripts(&self) -> &[Script] {
        &self.scripts
    }

    pub fn script(&self, id: &str) -> Option<&Script> {
        self.scripts.iter().find(|s| s.id == id)
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    pub fn dataset(&self, id: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.id.as_deref() == Some(id))
    }

    pub fn views(&self) -> &[ViewDescriptor] {
        &self.views
    }

    /// The ID of the remote bundle this project was published to, if any.
    pub fn gist_id(&self) -> Option<&str> {
        self.gist_id.as_deref()
    }

    pub fn gist_url(&self) -> Option<&str> {
        self.gist_url.as_deref()
    }

    pub fn set_name<S: AsRef<str>>(&mut self, name: S) -> Result<(), Error> {
        self.name = name.as_ref().to_string();
        self.notify_changed()
    }

    pub fn set_readme<S: AsRef<str>>(&mut self, readme: S) -> Result<(), Error> {
        self.readme = readme.as_ref().to_string();
        self.notify_changed()
    }

    pub fn set_state(&mut self, state: ProjectState) -> Result<(), Error> {
        self.state = state;
        self.notify_changed()
    }

    pub fn add_script(&mut self, script: Script) -> Result<(), Error> {
        self.scripts.push(script);
        self.notify_changed()
    }

    /// Remove the script with the given ID, returning it if it existed.
    pub fn remove_script(&mut self, id: &str) -> Result<Option<Script>, Error> {
        let removed = self
            .scripts
            .iter()
            .position(|s| s.id == id)
            .map(|idx| self.scripts.remove(idx));
        self.notify_changed()?;
        Ok(removed)
    }

    pub fn set_script_content<S: AsRef<str>>(&mut self, id: &str, content: S) -> Result<(), Error> {
        let script = self
            .scripts
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NoSuchScript(id.to_string()))?;
        script.set_content(content);
        self.notify_changed()
    }

    pub fn add_dataset(&mut self, dataset: Dataset) -> Result<(), Error> {
        self.datasets.push(dataset);
        self.notify_changed()
    }

    /// Remove the dataset with the given ID, returning it if it existed.
    pub fn remove_dataset(&mut self, id: &str) -> Result<Option<Dataset>, Error> {
        let removed = self
            .datasets
            .iter()
            .position(|d| d.id.as_deref() == Some(id))
            .map(|idx| self.datasets.remove(idx));
        self.notify_changed()?;
        Ok(removed)
    }

    /// Parse the raw content of the dataset with the given ID. Loading only
    /// materializes the dataset's records and does not count as a change.
    pub fn load_dataset(&mut self, id: &str) -> Result<(), Error> {
        self.datasets
            .iter_mut()
            .find(|d| d.id.as_deref() == Some(id))
            .ok_or_else(|| Error::NoSuchDataset(id.to_string()))?
            .load()
    }

    /// The project's full attribute set.
    pub fn to_snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            id: Some(self.id.clone()),
            name: self.name.clone(),
            readme: self.readme.clone(),
            manifest_version: self.manifest_version,
            state: self.state,
            created: self.created,
            last_modified: self.last_modified,
            scripts: self.scripts.clone(),
            datasets: self.datasets.clone(),
            views: self.views.clone(),
            gist_id: self.gist_id.clone(),
            gist_url: self.gist_url.clone(),
            extra: self.extra.clone(),
        }
    }

    /// Write the project's attributes to the local store under its ID,
    /// stamping a fresh modification time.
    ///
    /// If the write fails, the modification time is left as it was.
    pub fn persist(&mut self) -> Result<(), Error> {
        let previous = self.last_modified.replace(DateTime::now());
        let written = serde_json::to_string(&self.to_snapshot())
            .map_err(Error::from)
            .and_then(|json| self.store.set(&self.id, &json));
        if let Err(e) = written {
            self.last_modified = previous;
            return Err(e);
        }
        debug!("Saved project {} to local storage", self.id);
        Ok(())
    }

    // Called exactly once by every mutation.
    fn notify_changed(&mut self) -> Result<(), Error> {
        self.persist()
    }

    /// Serialize the project into a bundle and write it to the given remote
    /// store.
    ///
    /// A project that has never been published is created remotely, after
    /// which the remote bundle's ID and URL are recorded on the project and
    /// the project is persisted locally. Subsequent calls update that remote
    /// bundle. On failure, including a failed local save after the remote
    /// bundle was created, the project is left untouched.
    pub async fn publish(&mut self, remote: &RemoteBundleStore) -> Result<Published, Error> {
        if !remote.is_authenticated() {
            debug!("Not authenticated, skipping publish of project {}", self.id);
            return Ok(Published::Skipped);
        }
        let mut bundle = package::serialize(self)?;
        match self.gist_id.clone() {
            Some(gist_id) => {
                if let Err(e) = remote.update_bundle(&gist_id, &bundle).await {
                    report_publish_failure("update", &self.id, &bundle, &e);
                    return Err(e);
                }
                info!("Saved project {} to remote bundle {}", self.id, gist_id);
                Ok(Published::Updated { id: gist_id })
            }
            None => {
                bundle.public = Some(remote.is_public());
                let created = match remote.create_bundle(&bundle).await {
                    Ok(created) => created,
                    Err(e) => {
                        report_publish_failure("initial save", &self.id, &bundle, &e);
                        return Err(e);
                    }
                };
                info!(
                    "Published project {} as remote bundle {}",
                    self.id, created.id
                );
                // Recording the remote identity is bookkeeping, not a user
                // change, so it bypasses notify_changed.
                let previous_id = self.gist_id.replace(created.id.clone());
                let previous_url = self.gist_url.replace(created.url.clone());
                if let Err(e) = self.persist() {
                    error!(
                        "Project {} was published as {} but could not be saved locally: {}",
                        self.id, created.id, e
                    );
                    self.gist_id = previous_id;
                    self.gist_url = previous_url;
                    return Err(e);
                }
                Ok(Published::Created {
                    id: created.id,
                    url: created.url,
                })
            }
        }
    }

    /// Load the project's first dataset.
    ///
    /// If the dataset refers to a file in a remote repository, the file is
    /// fetched first and the dataset switched over to hold that content
    /// inline. A failed fetch aborts the load and leaves the dataset as it
    /// was.
    pub async fn load_source_dataset(&mut self, remote: &RemoteBundleStore) -> Result<(), Error> {
        let dataset = self.datasets.first().ok_or(Error::NoSourceDataset)?;
        if dataset.is_remote() {
            let url = dataset.url.clone().ok_or_else(|| {
                Error::InvalidSourceUrl(String::new(), "remote dataset has no URL".to_string())
            })?;
            let source = RemoteSourceRef::parse(&url)?;
            let raw = remote
                .read_file(&source.owner, &source.repo, &source.branch, &source.path)
                .await
                .map_err(|e| {
                    warn!("Failed to fetch source dataset from {}: {}", source, e);
                    e
                })?;
            debug!("Fetched {} bytes from {}", raw.len(), source);
            self.datasets[0].materialize(raw);
            self.notify_changed()?;
        }
        self.datasets[0].load()
    }
}

fn report_publish_failure(action: &str, project_id: &str, bundle: &Bundle, e: &Error) {
    error!(
        "Remote {} of project {} failed: {}",
        action, project_id, e
    );
    match serde_json::to_string(bundle) {
        Ok(payload) => debug!("Failed payload: {}", payload),
        Err(se) => debug!("Failed payload could not be rendered: {}", se),
    }
}

/// Generate a project ID that is not yet used as a key in the given store.
pub fn generate_project_id(store: &dyn KeyValueStore) -> Result<String, Error> {
    let mut rng = rand::rng();
    generate_id_with(
        |candidate| store.contains_key(candidate),
        |space| rng.random_range(0..space),
    )
}

fn generate_id_with<E, D>(mut exists: E, mut draw: D) -> Result<String, Error>
where
    E: FnMut(&str) -> Result<bool, Error>,
    D: FnMut(u64) -> u64,
{
    let mut space = ID_SPACE;
    for widening in 0..=MAX_SPACE_WIDENINGS {
        for _ in 0..MAX_DRAWS_PER_SPACE {
            let candidate = format!("{}{}", PROJECT_ID_PREFIX, draw(space));
            if !exists(&candidate)? {
                return Ok(candidate);
            }
            trace!("Project ID {} is already taken", candidate);
        }
        if widening < MAX_SPACE_WIDENINGS {
            space = space.saturating_mul(ID_SPACE_GROWTH);
            warn!(
                "{} consecutive project ID collisions, widening ID space to {}",
                MAX_DRAWS_PER_SPACE, space
            );
        }
    }
    Err(Error::IdSpaceExhausted(MAX_SPACE_WIDENINGS))
}
