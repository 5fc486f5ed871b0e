//! On-disk layout of the relay's YAML files.
//!
//! # Storage layout
//!
//! ```text
//! ~/.relay/
//!   config.yaml    (SyncSettings, mode 0600, holds the shared sync token)
//!   schema.yaml    (SchemaRegistry)
//!   catalog.yaml   (platforms + sync configurations, mode 0600)
//! ```
//!
//! # API pattern
//!
//! Every loader/saver has two forms:
//! - `fn_at(home: &Path, …)`: explicit home, used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{io_err, CoreError};

pub const CONFIG_FILE: &str = "config.yaml";
pub const SCHEMA_FILE: &str = "schema.yaml";
pub const CATALOG_FILE: &str = "catalog.yaml";

/// `<home>/.relay/`
pub fn relay_root(home: &Path) -> PathBuf {
    home.join(".relay")
}

/// `<home>/.relay/config.yaml`; pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    relay_root(home).join(CONFIG_FILE)
}

/// `<home>/.relay/schema.yaml`; pure, no I/O.
pub fn schema_path_at(home: &Path) -> PathBuf {
    relay_root(home).join(SCHEMA_FILE)
}

/// `<home>/.relay/catalog.yaml`; pure, no I/O.
pub fn catalog_path_at(home: &Path) -> PathBuf {
    relay_root(home).join(CATALOG_FILE)
}

pub fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}

/// Read and parse a YAML file.
///
/// Returns `CoreError::NotFound` if absent, `CoreError::Parse` (with path) if malformed.
pub(crate) fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, CoreError> {
    if !path.exists() {
        return Err(CoreError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|source| CoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Atomically write `value` as YAML.
///
/// Write flow: serialize → `.tmp` sibling → `chmod 0600` → `rename`.
pub(crate) fn save_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            set_dir_permissions(dir)?;
        }
    }
    let tmp = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(value)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}
