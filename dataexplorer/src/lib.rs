//! The data explorer lets users bundle a dataset, a handful of small scripts
//! and a fixed set of views into a project.
//!
//! Projects are persisted to a local key/value store on every change and can
//! be published to a remote bundle store as a flat "data package": one
//! manifest file plus one file per script and per dataset. This crate
//! provides the project model, the package serializer and the storage
//! abstractions. For the command line interface, see the `dataexplorer-cli`
//! crate.

mod collection;
mod config;
mod context;
mod dataset;
mod datetime;
mod error;
mod fs;
mod hash;
pub mod package;
mod project;
pub mod remote;
mod script;
mod source;
pub mod storage;
mod view;

pub use collection::{load_one, LoadFailure, ProjectCollection};
pub use config::{Config, TOKEN_ENV_VAR};
pub use context::Context;
pub use dataset::{Backend, Dataset, Field, Record, TabularStore};
pub use datetime::DateTime;
pub use error::Error;
pub use package::{Bundle, BundleFile};
pub use project::{
    generate_project_id, Project, ProjectSnapshot, ProjectState, Published, PROJECT_ID_PREFIX,
};
pub use remote::{Credentials, RemoteBundleStore};
pub use script::Script;
pub use source::RemoteSourceRef;
pub use view::ViewDescriptor;
