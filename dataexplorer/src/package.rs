//! Conversion between projects and flat file bundles ("data packages").
//!
//! A bundle holds one manifest file, `datapackage.json`, describing the
//! project's structure, plus one file per script, one per dataset and a
//! `README.md`. The bundle layout follows the
//! [Data Package](http://www.dataprotocols.org/en/latest/data-packages.html)
//! convention of listing datasets under the manifest's `files` attribute:
//!
//! ```text
//! {
//!   "description": "My project - first sentence of the readme",
//!   "files": {
//!     "datapackage.json": { "content": "{ ... }" },
//!     "README.md": { "content": "..." },
//!     "main.js": { "content": "..." },
//!     "data.csv": { "content": "..." }
//!   }
//! }
//! ```
//!
//! Remote bundle stores reject files with empty content, so empty readmes and
//! scripts are written out as placeholder text, and datasets that render
//! empty are left out of the bundle altogether. The manifest flags every
//! placeholder it wrote (`readme_placeholder` at the top level, `placeholder`
//! on a script record), so that only flagged files are read back as empty.

use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::project::ProjectSnapshot;
use crate::storage::KeyValueStore;
use crate::{Error, Project};

/// The reserved name of the manifest file.
pub const MANIFEST_FILE: &str = "datapackage.json";
/// The reserved name of the readme file.
pub const README_FILE: &str = "README.md";

const EMPTY_README: &str = "README is empty";
const EMPTY_SCRIPT: &str = "// empty script";

const README_PLACEHOLDER_FLAG: &str = "readme_placeholder";
const SCRIPT_PLACEHOLDER_FLAG: &str = "placeholder";

/// A single file within a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleFile {
    pub content: String,
}

impl BundleFile {
    pub fn new<S: AsRef<str>>(content: S) -> Self {
        Self {
            content: content.as_ref().to_string(),
        }
    }
}

/// A flat mapping of file names to file contents, plus some metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
    #[serde(default)]
    pub files: IndexMap<String, BundleFile>,
}

impl Bundle {
    /// The content of the file with the given name, if present.
    pub fn file(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(|f| f.content.as_str())
    }
}

/// Convert the given project into a bundle.
///
/// The project itself is never modified. Script content and dataset content
/// are moved out of the manifest into their own files, named after each
/// script's ID and each dataset's `path` respectively. Datasets without a
/// `path` keep any inline data in the manifest.
pub fn serialize(project: &Project) -> Result<Bundle, Error> {
    let snapshot = project.to_snapshot();
    let mut data = into_object(serde_json::to_value(&snapshot)?)?;

    let mut description = snapshot.name.clone();
    if !snapshot.readme.is_empty() {
        description.push_str(" - ");
        description.push_str(snapshot.readme.split('.').next().unwrap_or_default());
    }

    let mut files = IndexMap::new();
    files.insert(
        README_FILE.to_string(),
        BundleFile::new(non_empty(&snapshot.readme, EMPTY_README)),
    );
    data.remove("readme");
    if snapshot.readme.is_empty() {
        data.insert(README_PLACEHOLDER_FLAG.to_string(), JsonValue::Bool(true));
    }

    // Data packages list their datasets under "files".
    if let Some(datasets) = data.remove("datasets") {
        data.insert("files".to_string(), datasets);
    }

    if let Some(JsonValue::Array(scripts)) = data.get_mut("scripts") {
        for (record, script) in scripts.iter_mut().zip(&snapshot.scripts) {
            if let JsonValue::Object(record) = record {
                record.insert("path".to_string(), JsonValue::String(script.id.clone()));
                record.remove("content");
                if script.content.is_empty() {
                    record.insert(SCRIPT_PLACEHOLDER_FLAG.to_string(), JsonValue::Bool(true));
                }
            }
            insert_file(
                &mut files,
                &script.id,
                non_empty(&script.content, EMPTY_SCRIPT),
            )?;
        }
    }

    // Manifest records and live datasets are matched up by position.
    if let Some(JsonValue::Array(records)) = data.get_mut("files") {
        for (record, dataset) in records.iter_mut().zip(project.datasets()) {
            let record = match record {
                JsonValue::Object(record) => record,
                _ => continue,
            };
            let path = match record.get("path").and_then(JsonValue::as_str) {
                Some(path) => path.to_string(),
                None => continue,
            };
            let content = dataset.rendered_content()?;
            if content.is_empty() {
                debug!("Dataset at {} rendered empty, leaving it out of the bundle", path);
            } else {
                insert_file(&mut files, &path, &content)?;
            }
            record.remove("data");
        }
    }

    let manifest = serde_json::to_string_pretty(&JsonValue::Object(data))?;
    let mut bundle_files = IndexMap::with_capacity(files.len() + 1);
    bundle_files.insert(MANIFEST_FILE.to_string(), BundleFile::new(manifest));
    bundle_files.extend(files);
    debug!(
        "Serialized project {} into {} file(s)",
        project.id(),
        bundle_files.len()
    );
    Ok(Bundle {
        description: Some(description),
        public: None,
        files: bundle_files,
    })
}

/// Reconstruct a project from a bundle.
///
/// Every script declaring a `path` must have a matching file in the bundle.
/// A dataset whose file is missing (because it rendered empty) gets empty
/// data. Any attribute missing from the manifest takes its default value.
pub fn deserialize(bundle: &Bundle, store: Arc<dyn KeyValueStore>) -> Result<Project, Error> {
    let manifest = bundle
        .file(MANIFEST_FILE)
        .ok_or_else(|| Error::MissingManifest(MANIFEST_FILE.to_string()))?;
    let mut dp = into_object(serde_json::from_str(manifest)?)?;

    // Older manifests list datasets under "datasets" directly.
    if dp.contains_key("files") && !dp.contains_key("datasets") {
        if let Some(files) = dp.remove("files") {
            dp.insert("datasets".to_string(), files);
        }
    }

    let readme_placeholder = take_flag(&mut dp, README_PLACEHOLDER_FLAG);
    if let Some(readme) = bundle.file(README_FILE) {
        let readme = if readme_placeholder { "" } else { readme };
        dp.insert("readme".to_string(), JsonValue::String(readme.to_string()));
    }

    if let Some(JsonValue::Array(scripts)) = dp.get_mut("scripts") {
        for script in scripts.iter_mut().filter_map(JsonValue::as_object_mut) {
            let placeholder = take_flag(script, SCRIPT_PLACEHOLDER_FLAG);
            let path = match script.get("path").and_then(JsonValue::as_str) {
                Some(path) => path.to_string(),
                None => continue,
            };
            let content = bundle
                .file(&path)
                .ok_or_else(|| Error::MissingScriptFile(path.clone()))?;
            let content = if placeholder { "" } else { content };
            script.insert("content".to_string(), JsonValue::String(content.to_string()));
        }
    }

    if let Some(JsonValue::Array(datasets)) = dp.get_mut("datasets") {
        for dataset in datasets.iter_mut().filter_map(JsonValue::as_object_mut) {
            let path = match dataset.get("path").and_then(JsonValue::as_str) {
                Some(path) => path.to_string(),
                None => continue,
            };
            let data = bundle.file(&path).unwrap_or_default();
            dataset.insert("data".to_string(), JsonValue::String(data.to_string()));
        }
    }

    let snapshot = serde_json::from_value::<ProjectSnapshot>(JsonValue::Object(dp))?;
    Project::create(store, Some(snapshot))
}

fn into_object(value: JsonValue) -> Result<Map<String, JsonValue>, Error> {
    match value {
        JsonValue::Object(obj) => Ok(obj),
        _ => Err(Error::InvalidManifest),
    }
}

fn insert_file(
    files: &mut IndexMap<String, BundleFile>,
    path: &str,
    content: &str,
) -> Result<(), Error> {
    if path == MANIFEST_FILE || files.contains_key(path) {
        return Err(Error::DuplicateBundlePath(path.to_string()));
    }
    files.insert(path.to_string(), BundleFile::new(content));
    Ok(())
}

fn non_empty<'a>(content: &'a str, placeholder: &'a str) -> &'a str {
    if content.is_empty() {
        placeholder
    } else {
        content
    }
}

fn take_flag(obj: &mut Map<String, JsonValue>, flag: &str) -> bool {
    matches!(obj.remove(flag), Some(JsonValue::Bool(true)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::{Dataset, Script};

    const CSV_DATA: &str = "Date,Yield\n2012,1.8\n";

    fn store() -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStore::new())
    }

    fn project_with(snapshot: ProjectSnapshot) -> Project {
        Project::create(store(), Some(snapshot)).unwrap()
    }

    fn manifest_of(bundle: &Bundle) -> JsonValue {
        serde_json::from_str(bundle.file(MANIFEST_FILE).unwrap()).unwrap()
    }

    fn loaded_test_project() -> Project {
        let mut project = project_with(ProjectSnapshot {
            name: "test it".to_string(),
            datasets: vec![Dataset::inline_csv("xyz", CSV_DATA).with_path("data.csv")],
            ..Default::default()
        });
        project.load_dataset("xyz").unwrap();
        project
    }

    #[test]
    fn serialize_then_deserialize() {
        let project = loaded_test_project();
        let mut out = serialize(&project).unwrap();

        assert_eq!(
            out.files.keys().map(String::as_str).collect::<Vec<_>>(),
            vec![MANIFEST_FILE, README_FILE, "main.js", "data.csv"]
        );
        let dp = manifest_of(&out);
        assert!(dp["scripts"][0].get("content").is_none());
        assert_eq!(dp["scripts"][0]["path"], "main.js");
        assert_eq!(out.file("main.js").unwrap(), r#"print("hello world")"#);
        assert_eq!(out.file("data.csv").unwrap(), CSV_DATA);
        assert!(dp.get("datasets").is_none());
        assert!(dp.get("readme").is_none());
        assert!(dp["files"][0].get("data").is_none());
        assert_eq!(dp["files"][0]["path"], "data.csv");
        assert_eq!(out.description.as_deref(), Some("test it"));

        let new_script_content = r#"request("...")"#;
        out.files.get_mut("main.js").unwrap().content = new_script_content.to_string();

        let restored = deserialize(&out, store()).unwrap();
        assert_eq!(restored.id(), project.id());
        assert_eq!(restored.name(), project.name());
        assert_eq!(restored.scripts()[0].content, new_script_content);
        assert_eq!(restored.datasets()[0].data.as_deref(), Some(CSV_DATA));
    }

    #[test]
    fn serialize_leaves_project_untouched() {
        let project = loaded_test_project();
        let before = serde_json::to_value(project.to_snapshot()).unwrap();
        let _ = serialize(&project).unwrap();
        assert_eq!(serde_json::to_value(project.to_snapshot()).unwrap(), before);
        assert!(project.datasets()[0].is_loaded());
    }

    #[test]
    fn round_trip_preserves_contents() {
        let mut project = project_with(ProjectSnapshot {
            name: "round trip".to_string(),
            readme: "Explores yields. Data from somewhere.".to_string(),
            scripts: vec![
                Script::new("main.js", "print(1)"),
                Script::new("empty.js", ""),
            ],
            datasets: vec![
                Dataset::inline_csv("a", "x,y\n1,2\n3,\n").with_path("a.csv"),
                Dataset::inline_csv("b", "k\nv\n").with_path("b.csv"),
            ],
            ..Default::default()
        });
        project.load_dataset("a").unwrap();
        project.load_dataset("b").unwrap();

        let bundle = serialize(&project).unwrap();
        assert_eq!(
            bundle.description.as_deref(),
            Some("round trip - Explores yields")
        );
        assert_eq!(bundle.file("empty.js").unwrap(), "// empty script");

        let mut restored = deserialize(&bundle, store()).unwrap();
        assert_eq!(restored.name(), "round trip");
        assert_eq!(restored.readme(), project.readme());
        let contents = |p: &Project| {
            p.scripts()
                .iter()
                .map(|s| (s.id.clone(), s.content.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(contents(&restored), contents(&project));

        restored.load_dataset("a").unwrap();
        restored.load_dataset("b").unwrap();
        for (before, after) in project.datasets().iter().zip(restored.datasets()) {
            assert_eq!(before.id, after.id);
            assert_eq!(before.store(), after.store());
        }
    }

    #[test]
    fn empty_readme_uses_placeholder() {
        let project = project_with(ProjectSnapshot::default());
        let bundle = serialize(&project).unwrap();
        assert_eq!(bundle.file(README_FILE).unwrap(), "README is empty");
        assert_eq!(bundle.description.as_deref(), Some("No name"));
        assert_eq!(manifest_of(&bundle)[README_PLACEHOLDER_FLAG], true);
        assert_eq!(deserialize(&bundle, store()).unwrap().readme(), "");
    }

    #[test]
    fn placeholder_text_as_real_content_survives() {
        let project = project_with(ProjectSnapshot {
            readme: EMPTY_README.to_string(),
            scripts: vec![
                Script::new("main.js", EMPTY_SCRIPT),
                Script::new("blank.js", ""),
            ],
            ..Default::default()
        });
        let bundle = serialize(&project).unwrap();
        let dp = manifest_of(&bundle);
        assert!(dp.get(README_PLACEHOLDER_FLAG).is_none());
        assert!(dp["scripts"][0].get(SCRIPT_PLACEHOLDER_FLAG).is_none());
        assert_eq!(dp["scripts"][1][SCRIPT_PLACEHOLDER_FLAG], true);
        assert_eq!(bundle.file("main.js"), bundle.file("blank.js"));

        let restored = deserialize(&bundle, store()).unwrap();
        assert_eq!(restored.readme(), EMPTY_README);
        assert_eq!(restored.script("main.js").unwrap().content, EMPTY_SCRIPT);
        assert_eq!(restored.script("blank.js").unwrap().content, "");
        // Flags do not leak into the restored project's attributes.
        assert!(restored.to_snapshot().extra.is_empty());
        assert!(restored.script("blank.js").unwrap().extra.is_empty());
    }

    #[test]
    fn unflagged_placeholder_text_is_kept_verbatim() {
        let mut bundle = Bundle::default();
        bundle.files.insert(
            MANIFEST_FILE.to_string(),
            BundleFile::new(r#"{"scripts": [{"id": "a.js", "path": "a.js"}]}"#),
        );
        bundle
            .files
            .insert(README_FILE.to_string(), BundleFile::new(EMPTY_README));
        bundle
            .files
            .insert("a.js".to_string(), BundleFile::new(EMPTY_SCRIPT));
        let restored = deserialize(&bundle, store()).unwrap();
        assert_eq!(restored.readme(), EMPTY_README);
        assert_eq!(restored.script("a.js").unwrap().content, EMPTY_SCRIPT);
    }

    #[test]
    fn every_file_has_content() {
        let project = project_with(ProjectSnapshot {
            scripts: vec![Script::new("a.js", ""), Script::new("b.js", "")],
            datasets: vec![Dataset::inline_csv("d", "").with_path("d.csv")],
            ..Default::default()
        });
        let bundle = serialize(&project).unwrap();
        assert!(bundle.files.values().all(|f| !f.content.is_empty()));
    }

    #[test]
    fn empty_dataset_is_omitted_and_stripped() {
        let mut project = project_with(ProjectSnapshot {
            datasets: vec![Dataset::inline_csv("empty", "").with_path("empty.csv")],
            ..Default::default()
        });
        project.load_dataset("empty").unwrap();
        let bundle = serialize(&project).unwrap();
        assert!(bundle.file("empty.csv").is_none());
        let dp = manifest_of(&bundle);
        assert!(dp["files"][0].get("data").is_none());
        assert_eq!(dp["files"][0]["path"], "empty.csv");

        let restored = deserialize(&bundle, store()).unwrap();
        assert_eq!(restored.datasets()[0].data.as_deref(), Some(""));
    }

    #[test]
    fn unloaded_inline_dataset_keeps_its_content() {
        let project = project_with(ProjectSnapshot {
            datasets: vec![Dataset::inline_csv("raw", CSV_DATA).with_path("raw.csv")],
            ..Default::default()
        });
        let bundle = serialize(&project).unwrap();
        assert_eq!(bundle.file("raw.csv").unwrap(), CSV_DATA);
    }

    #[test]
    fn dataset_without_path_stays_inline() {
        let project = project_with(ProjectSnapshot {
            datasets: vec![Dataset::inline_csv("inline", CSV_DATA)],
            ..Default::default()
        });
        let bundle = serialize(&project).unwrap();
        assert_eq!(bundle.files.len(), 3);
        let dp = manifest_of(&bundle);
        assert_eq!(dp["files"][0]["data"], CSV_DATA);

        let restored = deserialize(&bundle, store()).unwrap();
        assert_eq!(restored.datasets()[0].data.as_deref(), Some(CSV_DATA));
    }

    #[test]
    fn colliding_paths_are_rejected() {
        let project = project_with(ProjectSnapshot {
            scripts: vec![Script::new("data.csv", "1")],
            datasets: vec![Dataset::inline_csv("d", CSV_DATA).with_path("data.csv")],
            ..Default::default()
        });
        assert!(matches!(
            serialize(&project),
            Err(Error::DuplicateBundlePath(p)) if p == "data.csv"
        ));

        let project = project_with(ProjectSnapshot {
            datasets: vec![Dataset::inline_csv("d", CSV_DATA).with_path(MANIFEST_FILE)],
            ..Default::default()
        });
        assert!(matches!(
            serialize(&project),
            Err(Error::DuplicateBundlePath(_))
        ));
    }

    fn bundle_with_manifest(manifest: JsonValue, files: &[(&str, &str)]) -> Bundle {
        let mut bundle = Bundle::default();
        bundle.files.insert(
            MANIFEST_FILE.to_string(),
            BundleFile::new(manifest.to_string()),
        );
        for (name, content) in files {
            bundle
                .files
                .insert(name.to_string(), BundleFile::new(content));
        }
        bundle
    }

    #[test]
    fn missing_readme_leaves_default() {
        let bundle = bundle_with_manifest(serde_json::json!({"name": "n"}), &[]);
        let project = deserialize(&bundle, store()).unwrap();
        assert_eq!(project.readme(), "");
        assert_eq!(project.name(), "n");
        // Missing attributes take their defaults.
        assert_eq!(project.scripts().len(), 1);
        assert_eq!(project.views().len(), 3);
        assert!(project.id().starts_with("dataexplorer-"));
    }

    #[test]
    fn legacy_datasets_attribute_is_accepted() {
        let bundle = bundle_with_manifest(
            serde_json::json!({
                "id": "dataexplorer-42",
                "datasets": [{"id": "old", "path": "old.csv"}],
            }),
            &[("old.csv", "a\n1\n")],
        );
        let project = deserialize(&bundle, store()).unwrap();
        assert_eq!(project.id(), "dataexplorer-42");
        assert_eq!(project.dataset("old").unwrap().data.as_deref(), Some("a\n1\n"));
    }

    #[test]
    fn missing_script_file_is_an_error() {
        let bundle = bundle_with_manifest(
            serde_json::json!({"scripts": [{"id": "gone.js", "path": "gone.js"}]}),
            &[],
        );
        assert!(matches!(
            deserialize(&bundle, store()),
            Err(Error::MissingScriptFile(p)) if p == "gone.js"
        ));
    }

    #[test]
    fn malformed_bundles_are_rejected() {
        assert!(matches!(
            deserialize(&Bundle::default(), store()),
            Err(Error::MissingManifest(_))
        ));
        let bundle = bundle_with_manifest(serde_json::json!([1, 2, 3]), &[]);
        assert!(matches!(
            deserialize(&bundle, store()),
            Err(Error::InvalidManifest)
        ));
        let mut bundle = Bundle::default();
        bundle
            .files
            .insert(MANIFEST_FILE.to_string(), BundleFile::new("{not json"));
        assert!(matches!(deserialize(&bundle, store()), Err(Error::Json(_))));
    }

    #[test]
    fn bundle_wire_format() {
        let bundle = Bundle {
            description: Some("d".to_string()),
            public: Some(false),
            files: IndexMap::from([("a.js".to_string(), BundleFile::new("1"))]),
        };
        assert_eq!(
            serde_json::to_value(&bundle).unwrap(),
            serde_json::json!({
                "description": "d",
                "public": false,
                "files": {"a.js": {"content": "1"}},
            })
        );
    }
}
