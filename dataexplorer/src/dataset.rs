//! Dataset handles and their tabular contents.

use std::collections::BTreeMap;
use std::io;

use csv::{ReaderBuilder, Writer};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::Error;

/// The type assigned to every field parsed from delimited text.
pub const DEFAULT_FIELD_TYPE: &str = "string";

/// The strategy by which a dataset's raw content is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Backend {
    /// Delimited text held inline in the dataset's `data` attribute.
    Csv,
    /// A file in a remote repository, referenced by the dataset's `url`.
    Github,
    /// Any other backend. Kept so that it survives persistence, but such
    /// datasets cannot be loaded.
    Other(String),
}

impl From<String> for Backend {
    fn from(s: String) -> Self {
        match s.as_str() {
            "csv" => Self::Csv,
            "github" => Self::Github,
            _ => Self::Other(s),
        }
    }
}

impl From<Backend> for String {
    fn from(b: Backend) -> Self {
        match b {
            Backend::Csv => "csv".to_string(),
            Backend::Github => "github".to_string(),
            Backend::Other(s) => s,
        }
    }
}

/// A column of a loaded dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub label: String,
    pub is_derived: bool,
    pub format: Option<String>,
}

impl Field {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        let id = id.as_ref().to_string();
        Self {
            label: id.clone(),
            id,
            field_type: DEFAULT_FIELD_TYPE.to_string(),
            is_derived: false,
            format: None,
        }
    }
}

/// A single row, mapping field IDs to values.
pub type Record = BTreeMap<String, String>;

/// The materialized, tabular form of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabularStore {
    pub fields: Vec<Field>,
    pub records: Vec<Record>,
}

impl TabularStore {
    /// Parse delimited text whose first row names the fields.
    ///
    /// Rows with more cells than there are fields have their surplus cells
    /// dropped; rows with fewer cells leave the remaining fields unset.
    pub fn from_csv<S: AsRef<str>>(text: S) -> Result<Self, Error> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_ref().as_bytes());
        let fields = reader
            .headers()?
            .iter()
            .map(Field::new)
            .collect::<Vec<Field>>();
        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            records.push(
                fields
                    .iter()
                    .zip(row.iter())
                    .map(|(field, value)| (field.id.clone(), value.to_string()))
                    .collect::<Record>(),
            );
        }
        Ok(Self { fields, records })
    }

    /// Render the store as delimited text: a header row of field IDs followed
    /// by one row per record, in record order. Values missing from a record
    /// are rendered empty. A store without fields renders as an empty string.
    pub fn to_csv(&self) -> Result<String, Error> {
        if self.fields.is_empty() {
            return Ok(String::new());
        }
        let mut wtr = Writer::from_writer(vec![]);
        wtr.write_record(self.fields.iter().map(|f| f.id.as_str()))?;
        for record in &self.records {
            wtr.write_record(
                self.fields
                    .iter()
                    .map(|f| record.get(&f.id).map(String::as_str).unwrap_or("")),
            )?;
        }
        let data = wtr.into_inner().map_err(|e| Error::Csv(e.into_error().into()))?;
        String::from_utf8(data).map_err(|e| {
            Error::Io(
                "rendering CSV".to_string(),
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        })
    }
}

/// A reference to a tabular dataset.
///
/// A dataset starts out unloaded, holding only its raw attributes. Calling
/// [`Dataset::load`] materializes its fields and records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    /// Where to fetch raw content from for remote backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// The file name this dataset maps to inside a serialized bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Raw content, used before the dataset is loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
    #[serde(skip)]
    store: Option<TabularStore>,
}

impl Dataset {
    /// A dataset whose content is the given inline delimited text.
    pub fn inline_csv<I: AsRef<str>, D: AsRef<str>>(id: I, data: D) -> Self {
        Self {
            id: Some(id.as_ref().to_string()),
            backend: Some(Backend::Csv),
            data: Some(data.as_ref().to_string()),
            ..Default::default()
        }
    }

    /// A dataset whose content must be fetched from the given remote
    /// repository URL.
    pub fn remote<I: AsRef<str>, U: AsRef<str>>(id: I, url: U) -> Self {
        Self {
            id: Some(id.as_ref().to_string()),
            backend: Some(Backend::Github),
            url: Some(url.as_ref().to_string()),
            ..Default::default()
        }
    }

    pub fn with_path<P: AsRef<str>>(mut self, path: P) -> Self {
        self.path = Some(path.as_ref().to_string());
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.store.is_some()
    }

    /// The dataset's fields and records, if it has been loaded.
    pub fn store(&self) -> Option<&TabularStore> {
        self.store.as_ref()
    }

    pub fn is_remote(&self) -> bool {
        self.backend == Some(Backend::Github)
    }

    /// Replace a remote dataset's backend with inline content fetched from
    /// its source.
    pub fn materialize<S: AsRef<str>>(&mut self, raw: S) {
        self.data = Some(raw.as_ref().to_string());
        self.backend = Some(Backend::Csv);
        self.store = None;
    }

    /// Parse the dataset's raw content into fields and records. Only the first
    /// call does any work.
    pub fn load(&mut self) -> Result<(), Error> {
        if self.store.is_some() {
            return Ok(());
        }
        let store = match &self.backend {
            None | Some(Backend::Csv) => {
                TabularStore::from_csv(self.data.as_deref().unwrap_or_default())?
            }
            Some(Backend::Github) => {
                return Err(Error::DatasetNotMaterialized(
                    self.url.clone().unwrap_or_else(|| self.label()),
                ))
            }
            Some(Backend::Other(name)) => return Err(Error::UnsupportedBackend(name.clone())),
        };
        debug!(
            "Loaded dataset {} with {} field(s) and {} record(s)",
            self.label(),
            store.fields.len(),
            store.records.len()
        );
        self.store = Some(store);
        Ok(())
    }

    /// The dataset's content as delimited text.
    ///
    /// A loaded dataset is rendered from its records. An unloaded dataset
    /// with inline content renders that content verbatim, and otherwise
    /// renders empty.
    pub fn rendered_content(&self) -> Result<String, Error> {
        match &self.store {
            Some(store) => store.to_csv(),
            None => Ok(match &self.backend {
                None | Some(Backend::Csv) => self.data.clone().unwrap_or_default(),
                _ => String::new(),
            }),
        }
    }

    fn label(&self) -> String {
        self.id.clone().unwrap_or_else(|| "<unnamed>".to_string())
    }
}
