//! View descriptors.

use serde::{Deserialize, Serialize};

/// Describes one of the fixed ways in which a project's data can be viewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDescriptor {
    pub id: String,
    pub label: String,
    /// The name of the renderer responsible for drawing this view.
    #[serde(rename = "type")]
    pub renderer: String,
}

impl ViewDescriptor {
    pub fn new<I, L, R>(id: I, label: L, renderer: R) -> Self
    where
        I: AsRef<str>,
        L: AsRef<str>,
        R: AsRef<str>,
    {
        Self {
            id: id.as_ref().to_string(),
            label: label.as_ref().to_string(),
            renderer: renderer.as_ref().to_string(),
        }
    }

    /// The views every new project starts out with: a grid, a graph and a
    /// map.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("grid", "Grid", "SlickGrid"),
            Self::new("graph", "Graph", "Graph"),
            Self::new("map", "Map", "Map"),
        ]
    }
}
