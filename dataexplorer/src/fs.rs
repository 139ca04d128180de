//! File system-related utilities.

use std::fs;
use std::path::Path;

use log::debug;

use crate::Error;

/// Read the file at the given path into a string. If it does not exist,
/// returns `Ok(None)`.
pub fn maybe_read_to_string<P: AsRef<Path>>(path: P) -> Result<Option<String>, Error> {
    let path = path.as_ref();
    if !path.is_file() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .map_err(|e| Error::Io(format!("reading {}", path.display()), e))
}

/// Write the given content to a file, creating any missing parent
/// directories.
pub fn write_file<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, content: C) -> Result<(), Error> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        ensure_path_exists(parent)?;
    }
    fs::write(path, content).map_err(|e| Error::Io(format!("writing {}", path.display()), e))
}

/// Create the given directory (and its parents) if it does not yet exist.
pub fn ensure_path_exists<P: AsRef<Path>>(path: P) -> Result<(), Error> {
    let path = path.as_ref();
    if !path.is_dir() {
        fs::create_dir_all(path)
            .map_err(|e| Error::Io(format!("creating {}", path.display()), e))?;
        debug!("Created path: {}", path.display());
    }
    Ok(())
}
