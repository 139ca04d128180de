//! Configuration-related functionality.

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::fs::maybe_read_to_string;
use crate::remote::Credentials;
use crate::Error;

/// Overrides the configured token, if set.
pub const TOKEN_ENV_VAR: &str = "DATAEXPLORER_TOKEN";

/// Data explorer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding locally stored projects.
    pub storage_dir: PathBuf,
    /// Root directory of the file system-backed remote store.
    pub remote_dir: PathBuf,
    /// Access token for the remote store. Without one, nothing can be
    /// published.
    pub token: Option<String>,
    pub username: Option<String>,
    /// Whether bundles are publicly visible when first published.
    pub public: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(".dataexplorer/storage"),
            remote_dir: PathBuf::from(".dataexplorer/remote"),
            token: None,
            username: None,
            public: false,
        }
    }
}

impl Config {
    /// Load configuration from the given JSON or YAML file, picking the format
    /// from the file's extension. A missing file yields the default
    /// configuration.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        let content = match maybe_read_to_string(path)? {
            Some(content) => content,
            None => {
                debug!(
                    "No such configuration file, using defaults: {}",
                    path.display()
                );
                return Ok(Self::default());
            }
        };
        let config = match ext {
            "json" => serde_json::from_str(&content)?,
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            _ => return Err(Error::UnsupportedConfigFile(path.to_path_buf())),
        };
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from the environment.
    pub fn with_env(mut self) -> Self {
        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.is_empty() {
                self.token = Some(token);
            }
        }
        self
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            token: self.token.clone(),
            username: self.username.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "dataexplorer-config-{}",
            crate::hash::sha256(format!("{}{:?}", name, std::time::SystemTime::now()))
        ));
        let path = dir.join(name);
        crate::fs::write_file(&path, content).unwrap();
        path
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from_file("/definitely/not/here.yml").unwrap();
        assert_eq!(config, Config::default());
        assert!(!config.credentials().is_authenticated());
    }

    #[test]
    fn loads_yaml_with_partial_fields() {
        let path = temp_file("config.yml", "token: abc\npublic: true\n");
        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.token.as_deref(), Some("abc"));
        assert!(config.public);
        assert_eq!(config.storage_dir, Config::default().storage_dir);
        assert!(config.credentials().is_authenticated());
    }

    #[test]
    fn loads_json() {
        let path = temp_file("config.json", r#"{"storage_dir": "/tmp/projects"}"#);
        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/projects"));
    }

    #[test]
    fn rejects_unknown_extension() {
        let path = temp_file("config.ini", "token = abc");
        assert!(matches!(
            Config::load_from_file(&path),
            Err(Error::UnsupportedConfigFile(_))
        ));
    }
}
