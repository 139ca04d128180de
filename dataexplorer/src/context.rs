//! The application layer tying local project storage to a remote store.

use std::sync::Arc;

use log::{debug, info};

use crate::collection::{load_one, LoadFailure};
use crate::package::{self, Bundle};
use crate::project::{ProjectSnapshot, Published};
use crate::remote::{FsRemote, RemoteBundleStore};
use crate::storage::{FileStore, KeyValueStore};
use crate::{Config, Error, Project, ProjectCollection};

/// Execution context for working with projects: the local store projects are
/// persisted to and the remote store they are published to.
pub struct Context {
    store: Arc<dyn KeyValueStore>,
    remote: RemoteBundleStore,
}

impl Context {
    /// Build a context backed by the file system locations in the given
    /// configuration.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let store = FileStore::open(&config.storage_dir)?;
        debug!("Using local storage at {}", store.dir().display());
        let remote = FsRemote::open(&config.remote_dir)?;
        debug!("Using remote store at {}", config.remote_dir.display());
        Ok(Self::with_stores(
            Arc::new(store),
            RemoteBundleStore::new(Arc::new(remote), config.credentials())
                .with_public(config.public),
        ))
    }

    pub fn with_stores(store: Arc<dyn KeyValueStore>, remote: RemoteBundleStore) -> Self {
        Self { store, remote }
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        self.store.clone()
    }

    pub fn remote(&self) -> &RemoteBundleStore {
        &self.remote
    }

    /// Create and persist a new project with the given name.
    pub fn create_project<S: AsRef<str>>(&self, name: S) -> Result<Project, Error> {
        let mut project = Project::create(
            self.store.clone(),
            Some(ProjectSnapshot {
                name: name.as_ref().to_string(),
                ..Default::default()
            }),
        )?;
        project.persist()?;
        info!("Created project {}", project.id());
        Ok(project)
    }

    /// All locally stored projects, along with any that failed to load.
    pub fn projects(&self) -> Result<(ProjectCollection, Vec<LoadFailure>), Error> {
        ProjectCollection::load(self.store.clone())
    }

    pub fn project(&self, id: &str) -> Result<Project, Error> {
        load_one(self.store.clone(), id)
    }

    pub fn export(&self, id: &str) -> Result<Bundle, Error> {
        package::serialize(&self.project(id)?)
    }

    pub async fn publish(&self, id: &str) -> Result<Published, Error> {
        self.project(id)?.publish(&self.remote).await
    }

    /// Fetch a published bundle and store the project it contains locally.
    pub async fn import(&self, bundle_id: &str) -> Result<Project, Error> {
        let bundle = self.remote.fetch_bundle(bundle_id).await?;
        let mut project = package::deserialize(&bundle, self.store.clone())?;
        project.persist()?;
        info!("Imported bundle {} as project {}", bundle_id, project.id());
        Ok(project)
    }

    /// Load the given project's source dataset.
    pub async fn load_source_dataset(&self, id: &str) -> Result<Project, Error> {
        let mut project = self.project(id)?;
        project.load_source_dataset(&self.remote).await?;
        Ok(project)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::remote::{Credentials, MemoryRemote};
    use crate::storage::MemoryStore;
    use crate::Dataset;

    fn context(remote: &Arc<MemoryRemote>) -> Context {
        Context::with_stores(
            Arc::new(MemoryStore::new()),
            RemoteBundleStore::new(remote.clone(), Credentials::with_token("t")),
        )
    }

    #[tokio::test]
    async fn publish_then_import_elsewhere() {
        let remote = Arc::new(MemoryRemote::new());
        let ctx = context(&remote);
        let mut project = ctx.create_project("shared").unwrap();
        project
            .add_dataset(Dataset::inline_csv("d", "a,b\n1,2\n").with_path("d.csv"))
            .unwrap();
        project.set_script_content("main.js", "plot(d)").unwrap();

        let gist_id = match ctx.publish(project.id()).await.unwrap() {
            Published::Created { id, .. } => id,
            other => panic!("expected a created bundle, got {:?}", other),
        };
        // The recorded remote ID was persisted locally.
        assert_eq!(
            ctx.project(project.id()).unwrap().gist_id(),
            Some(gist_id.as_str())
        );

        let other = context(&remote);
        let imported = other.import(&gist_id).await.unwrap();
        assert_eq!(imported.id(), project.id());
        assert_eq!(imported.name(), "shared");
        assert_eq!(imported.script("main.js").unwrap().content, "plot(d)");
        assert_eq!(imported.dataset("d").unwrap().data.as_deref(), Some("a,b\n1,2\n"));
        assert_eq!(other.projects().unwrap().0.len(), 1);
    }

    #[tokio::test]
    async fn export_and_load() {
        let remote = Arc::new(MemoryRemote::new());
        let ctx = context(&remote);
        let mut project = ctx.create_project("local").unwrap();
        project
            .add_dataset(Dataset::inline_csv("d", "x\n1\n2\n"))
            .unwrap();

        let bundle = ctx.export(project.id()).unwrap();
        assert_eq!(bundle.description.as_deref(), Some("local"));

        let loaded = ctx.load_source_dataset(project.id()).await.unwrap();
        assert_eq!(loaded.datasets()[0].store().unwrap().records.len(), 2);
        assert!(matches!(ctx.project("dataexplorer-none"), Err(Error::NoSuchProject(_))));
    }
}
