//! Configuration loading for Cadence
//!
//! All Cadence files (credentials, sync settings, the job file and the
//! SQLite cache) live in one directory: `$CADENCE_CONFIG_DIR` when set,
//! otherwise `~/.config/cadence/`.
//!
//! Call [`init`] at application startup to bootstrap the directory.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Name of the config directory under the platform config root
const APP_DIR: &str = "cadence";

/// Environment variable that relocates the whole config directory
pub const CONFIG_DIR_ENV: &str = "CADENCE_CONFIG_DIR";

/// Create the config directory if needed and return it
pub fn init() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

/// The Cadence config directory
pub fn config_dir() -> Option<PathBuf> {
    resolve_config_dir(std::env::var_os(CONFIG_DIR_ENV), dirs::config_dir())
}

fn resolve_config_dir(overridden: Option<OsString>, platform: Option<PathBuf>) -> Option<PathBuf> {
    match overridden {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => platform.map(|p| p.join(APP_DIR)),
    }
}

/// Path of a file inside the config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Check if a file exists in the config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Load and parse a JSON file from the config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load a JSON file from the config directory, or `T::default()` when absent
///
/// A file that exists but does not parse is still an error.
pub fn load_json_or_default<T: DeserializeOwned + Default>(filename: &str) -> Result<T> {
    match config_path(filename) {
        Some(path) => load_json_file_or_default(&path),
        None => Ok(T::default()),
    }
}

fn load_json_file_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if path.exists() {
        load_json_file(path)
    } else {
        Ok(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Deserialize)]
    #[serde(default)]
    struct Settings {
        page_size: u32,
    }

    #[test]
    fn test_config_dir_defaults_under_platform_root() {
        let dir = resolve_config_dir(None, Some(PathBuf::from("/home/dev/.config")));
        assert_eq!(dir, Some(PathBuf::from("/home/dev/.config/cadence")));
    }

    #[test]
    fn test_config_dir_override() {
        let dir = resolve_config_dir(
            Some(OsString::from("/srv/cadence")),
            Some(PathBuf::from("/home/dev/.config")),
        );
        assert_eq!(dir, Some(PathBuf::from("/srv/cadence")));

        // An empty override is ignored
        let dir = resolve_config_dir(Some(OsString::new()), Some(PathBuf::from("/etc")));
        assert_eq!(dir, Some(PathBuf::from("/etc/cadence")));

        assert_eq!(resolve_config_dir(None, None), None);
    }

    #[test]
    fn test_config_path() {
        if let Some(path) = config_path("sync-settings.json") {
            assert!(path.ends_with("sync-settings.json"));
        }
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings: Settings = load_json_file_or_default(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_present_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync-settings.json");
        std::fs::write(&path, r#"{ "page_size": 50 }"#).unwrap();

        let settings: Settings = load_json_file_or_default(&path).unwrap();
        assert_eq!(settings.page_size, 50);
    }

    #[test]
    fn test_load_json_file_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_json_file_or_default::<Settings>(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }
}
