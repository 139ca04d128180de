//! Scripts are small, named code fragments belonging to a project.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::DateTime;

/// The language assumed for scripts that do not specify one.
pub const DEFAULT_LANGUAGE: &str = "javascript";

/// A named code fragment. Its ID doubles as its file name when the owning
/// project is serialized into a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub id: String,
    #[serde(default)]
    pub created: DateTime,
    #[serde(default)]
    pub last_modified: DateTime,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    // Any other attributes are carried along untouched.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl Script {
    pub fn new<I: AsRef<str>, C: AsRef<str>>(id: I, content: C) -> Self {
        let now = DateTime::now();
        Self {
            id: id.as_ref().to_string(),
            created: now,
            last_modified: now,
            language: default_language(),
            content: content.as_ref().to_string(),
            path: None,
            extra: Map::new(),
        }
    }

    /// The script every new project starts out with.
    pub fn default_main() -> Self {
        Self::new("main.js", r#"print("hello world")"#)
    }

    /// Replace the script's content and stamp its modification time.
    pub fn set_content<C: AsRef<str>>(&mut self, content: C) {
        self.content = content.as_ref().to_string();
        self.last_modified = DateTime::now();
    }
}
