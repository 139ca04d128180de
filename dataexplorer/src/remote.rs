//! Remote storage for published bundles and for files in remote
//! repositories.
//!
//! [`RemoteBackend`] and [`Repository`] describe the external service (a
//! gist-like bundle store plus git-like repositories). [`RemoteBundleStore`]
//! wraps a backend with the caller's credentials and caches the most recently
//! used repository handle.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, trace};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::fs::{ensure_path_exists, maybe_read_to_string, write_file};
use crate::hash::sha256;
use crate::package::Bundle;
use crate::{DateTime, Error};

/// Where [`RemoteBundleStore::save_dataset`] writes dataset content within a
/// repository.
pub const DATASET_FILE_PATH: &str = "data/data.csv";

const BUNDLE_ID_LEN: usize = 20;

/// The identity of a bundle stored remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBundle {
    pub id: String,
    pub url: String,
}

/// The caller's credentials for the remote service. Holding a token is what
/// it means to be authenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl Credentials {
    pub fn with_token<S: AsRef<str>>(token: S) -> Self {
        Self {
            token: Some(token.as_ref().to_string()),
            username: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// A handle to a single remote repository.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Read the raw content of the file at `path` on the given branch.
    async fn read(&self, branch: &str, path: &str) -> Result<String, Error>;

    /// Write (create or replace) the file at `path` on the given branch.
    async fn write(&self, branch: &str, path: &str, content: &str, message: &str)
        -> Result<(), Error>;
}

/// The external service that stores bundles and hosts repositories.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn create_gist(&self, bundle: &Bundle) -> Result<RemoteBundle, Error>;

    async fn update_gist(&self, id: &str, bundle: &Bundle) -> Result<(), Error>;

    async fn get_gist(&self, id: &str) -> Result<Bundle, Error>;

    /// Construct a handle to the given repository. Handles may be costly to
    /// construct, so callers should reuse them.
    fn repository(&self, owner: &str, repo: &str) -> Arc<dyn Repository>;
}

struct CachedRepository {
    owner: String,
    repo: String,
    handle: Arc<dyn Repository>,
}

/// Remembers the handle of the most recently used repository.
#[derive(Default)]
pub struct RepositoryCache {
    current: Mutex<Option<CachedRepository>>,
}

impl RepositoryCache {
    /// Return the cached handle if it belongs to the given owner and
    /// repository. Otherwise construct a new one with `make`, replacing
    /// whatever was cached.
    pub fn get_or_insert_with<F>(&self, owner: &str, repo: &str, make: F) -> Arc<dyn Repository>
    where
        F: FnOnce() -> Arc<dyn Repository>,
    {
        let mut current = self.current.lock();
        if let Some(cached) = current.as_ref() {
            if cached.owner == owner && cached.repo == repo {
                return cached.handle.clone();
            }
        }
        trace!("Constructing repository handle for {}/{}", owner, repo);
        let handle = make();
        *current = Some(CachedRepository {
            owner: owner.to_string(),
            repo: repo.to_string(),
            handle: handle.clone(),
        });
        handle
    }

    pub fn invalidate(&self) {
        *self.current.lock() = None;
    }
}

/// Publishes and retrieves bundles, and reads and writes repository files,
/// on behalf of a (possibly authenticated) caller.
pub struct RemoteBundleStore {
    backend: Arc<dyn RemoteBackend>,
    credentials: RwLock<Credentials>,
    public: bool,
    repos: RepositoryCache,
}

impl RemoteBundleStore {
    pub fn new(backend: Arc<dyn RemoteBackend>, credentials: Credentials) -> Self {
        Self {
            backend,
            credentials: RwLock::new(credentials),
            public: false,
            repos: RepositoryCache::default(),
        }
    }

    /// Whether newly created bundles should be publicly visible.
    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.read().is_authenticated()
    }

    pub fn username(&self) -> Option<String> {
        self.credentials.read().username.clone()
    }

    /// Forget the caller's credentials, along with any repository handle
    /// constructed while they were held.
    pub fn logout(&self) {
        *self.credentials.write() = Credentials::default();
        self.repos.invalidate();
        debug!("Logged out of remote store");
    }

    fn ensure_authenticated(&self) -> Result<(), Error> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }

    pub async fn create_bundle(&self, bundle: &Bundle) -> Result<RemoteBundle, Error> {
        self.ensure_authenticated()?;
        self.backend.create_gist(bundle).await
    }

    pub async fn update_bundle(&self, id: &str, bundle: &Bundle) -> Result<(), Error> {
        self.ensure_authenticated()?;
        self.backend.update_gist(id, bundle).await
    }

    /// Retrieve a previously published bundle.
    pub async fn fetch_bundle(&self, id: &str) -> Result<Bundle, Error> {
        self.backend.get_gist(id).await
    }

    fn repository(&self, owner: &str, repo: &str) -> Arc<dyn Repository> {
        self.repos
            .get_or_insert_with(owner, repo, || self.backend.repository(owner, repo))
    }

    pub async fn read_file(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<String, Error> {
        self.repository(owner, repo).read(branch, path).await
    }

    pub async fn write_file(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<(), Error> {
        self.ensure_authenticated()?;
        self.repository(owner, repo)
            .write(branch, path, content, message)
            .await
    }

    /// Commit dataset content to the conventional dataset location of a
    /// repository.
    pub async fn save_dataset(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        data: &str,
        message: &str,
    ) -> Result<(), Error> {
        self.write_file(owner, repo, branch, DATASET_FILE_PATH, data, message)
            .await
    }
}

fn new_bundle_id(salt: &str, bundle: &Bundle) -> Result<String, Error> {
    let body = serde_json::to_string(bundle)?;
    let mut id = sha256(format!("{}:{}", salt, body));
    id.truncate(BUNDLE_ID_LEN);
    Ok(id)
}

type FileKey = (String, String, String, String);

#[derive(Default)]
struct MemoryState {
    gists: Mutex<BTreeMap<String, Bundle>>,
    // (owner, repo, branch, path) -> content
    files: Mutex<BTreeMap<FileKey, String>>,
    reads: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryState {
    fn check_failing(&self, action: &str) -> Result<(), Error> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::Remote(
                action.to_string(),
                "remote store unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// An in-process remote backend.
///
/// Useful for tests and offline work. It can be told to fail all writes, and
/// keeps count of the repository handles it constructs and the reads made
/// through them.
#[derive(Default)]
pub struct MemoryRemote {
    state: Arc<MemoryState>,
    sequence: AtomicU64,
    handles_created: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a file in a repository, bypassing authentication.
    pub fn put_file(&self, owner: &str, repo: &str, branch: &str, path: &str, content: &str) {
        self.state.files.lock().insert(
            (
                owner.to_string(),
                repo.to_string(),
                branch.to_string(),
                path.to_string(),
            ),
            content.to_string(),
        );
    }

    pub fn file(&self, owner: &str, repo: &str, branch: &str, path: &str) -> Option<String> {
        self.state
            .files
            .lock()
            .get(&(
                owner.to_string(),
                repo.to_string(),
                branch.to_string(),
                path.to_string(),
            ))
            .cloned()
    }

    pub fn gist(&self, id: &str) -> Option<Bundle> {
        self.state.gists.lock().get(id).cloned()
    }

    pub fn gist_count(&self) -> usize {
        self.state.gists.lock().len()
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn repository_handles_created(&self) -> usize {
        self.handles_created.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteBackend for MemoryRemote {
    async fn create_gist(&self, bundle: &Bundle) -> Result<RemoteBundle, Error> {
        self.state.check_failing("create gist")?;
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let id = new_bundle_id(&seq.to_string(), bundle)?;
        self.state.gists.lock().insert(id.clone(), bundle.clone());
        Ok(RemoteBundle {
            url: format!("memory://gists/{}", id),
            id,
        })
    }

    async fn update_gist(&self, id: &str, bundle: &Bundle) -> Result<(), Error> {
        self.state.check_failing("update gist")?;
        match self.state.gists.lock().get_mut(id) {
            Some(existing) => {
                *existing = bundle.clone();
                Ok(())
            }
            None => Err(Error::RemoteNotFound(format!("gist {}", id))),
        }
    }

    async fn get_gist(&self, id: &str) -> Result<Bundle, Error> {
        self.gist(id)
            .ok_or_else(|| Error::RemoteNotFound(format!("gist {}", id)))
    }

    fn repository(&self, owner: &str, repo: &str) -> Arc<dyn Repository> {
        self.handles_created.fetch_add(1, Ordering::SeqCst);
        Arc::new(MemoryRepository {
            owner: owner.to_string(),
            repo: repo.to_string(),
            state: self.state.clone(),
        })
    }
}

struct MemoryRepository {
    owner: String,
    repo: String,
    state: Arc<MemoryState>,
}

impl MemoryRepository {
    fn key(&self, branch: &str, path: &str) -> FileKey {
        (
            self.owner.clone(),
            self.repo.clone(),
            branch.to_string(),
            path.to_string(),
        )
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn read(&self, branch: &str, path: &str) -> Result<String, Error> {
        self.state.reads.fetch_add(1, Ordering::SeqCst);
        self.state
            .files
            .lock()
            .get(&self.key(branch, path))
            .cloned()
            .ok_or_else(|| {
                Error::RemoteNotFound(format!(
                    "{}/{}@{}:{}",
                    self.owner, self.repo, branch, path
                ))
            })
    }

    async fn write(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<(), Error> {
        self.state.check_failing("write file")?;
        trace!(
            "Committing {}/{}@{}:{} ({})",
            self.owner,
            self.repo,
            branch,
            path,
            message
        );
        self.state
            .files
            .lock()
            .insert(self.key(branch, path), content.to_string());
        Ok(())
    }
}

/// A remote backend that keeps everything in a local directory:
///
/// ```text
/// <root>/gists/<id>.json
/// <root>/repos/<owner>/<repo>/<branch>/<path>
/// ```
#[derive(Debug, Clone)]
pub struct FsRemote {
    root: PathBuf,
}

impl FsRemote {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        ensure_path_exists(root.join("gists"))?;
        ensure_path_exists(root.join("repos"))?;
        Ok(Self { root })
    }

    fn gist_path(&self, id: &str) -> Result<PathBuf, Error> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::RemoteNotFound(format!("gist {}", id)));
        }
        Ok(self.root.join("gists").join(format!("{}.json", id)))
    }

    fn write_gist(&self, path: &Path, bundle: &Bundle) -> Result<(), Error> {
        write_file(path, serde_json::to_string_pretty(bundle)?)
    }
}

#[async_trait]
impl RemoteBackend for FsRemote {
    async fn create_gist(&self, bundle: &Bundle) -> Result<RemoteBundle, Error> {
        let id = new_bundle_id(&DateTime::now().to_string(), bundle)?;
        let path = self.gist_path(&id)?;
        self.write_gist(&path, bundle)?;
        debug!("Stored bundle {} at {}", id, path.display());
        Ok(RemoteBundle {
            url: format!("file://{}", path.display()),
            id,
        })
    }

    async fn update_gist(&self, id: &str, bundle: &Bundle) -> Result<(), Error> {
        let path = self.gist_path(id)?;
        if !path.is_file() {
            return Err(Error::RemoteNotFound(format!("gist {}", id)));
        }
        self.write_gist(&path, bundle)
    }

    async fn get_gist(&self, id: &str) -> Result<Bundle, Error> {
        let content = maybe_read_to_string(self.gist_path(id)?)?
            .ok_or_else(|| Error::RemoteNotFound(format!("gist {}", id)))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn repository(&self, owner: &str, repo: &str) -> Arc<dyn Repository> {
        Arc::new(FsRepository {
            owner: owner.to_string(),
            repo: repo.to_string(),
            root: self.root.join("repos"),
        })
    }
}

struct FsRepository {
    owner: String,
    repo: String,
    root: PathBuf,
}

impl FsRepository {
    fn name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    // Owner, repository and branch must each be a single plain segment, and
    // the file path may only consist of plain segments.
    fn file_path(&self, branch: &str, path: &str) -> Result<PathBuf, Error> {
        let safe = is_single_segment(&self.owner)
            && is_single_segment(&self.repo)
            && is_single_segment(branch)
            && !path.is_empty()
            && Path::new(path)
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::RemoteNotFound(format!(
                "{}@{}:{}",
                self.name(),
                branch,
                path
            )));
        }
        Ok(self
            .root
            .join(&self.owner)
            .join(&self.repo)
            .join(branch)
            .join(path))
    }
}

fn is_single_segment(s: &str) -> bool {
    let mut components = Path::new(s).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[async_trait]
impl Repository for FsRepository {
    async fn read(&self, branch: &str, path: &str) -> Result<String, Error> {
        maybe_read_to_string(self.file_path(branch, path)?)?
            .ok_or_else(|| Error::RemoteNotFound(format!("{}@{}:{}", self.name(), branch, path)))
    }

    async fn write(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<(), Error> {
        let file = self.file_path(branch, path)?;
        write_file(&file, content)?;
        debug!("Committed {}@{}:{} ({})", self.name(), branch, path, message);
        Ok(())
    }
}
