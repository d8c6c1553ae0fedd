use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "NANOLAB_PSA_CONFIG";
pub const DATA_DIR_ENV: &str = "NANOLAB_PSA_DATA_DIR";
const CONFIG_FILE: &str = "nanolab_psa.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub font_dir: PathBuf,
    pub font_family: String,
    pub min_rows: usize,
    pub max_rows: usize,
    pub default_rows: usize,
    pub autosave: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::temp_dir(),
            font_dir: Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("font")
                .join("fonts")
                .join("Frozen Fonts")
                .join("Monaspace Xenon"),
            font_family: "MonaspaceXenonFrozen".to_string(),
            min_rows: 3,
            max_rows: 50,
            default_rows: 5,
            autosave: true,
        }
    }
}

impl AppConfig {
    /// Loads `$NANOLAB_PSA_CONFIG` or `./nanolab_psa.json`, falling back to
    /// defaults, then applies the data-dir override.
    pub fn load() -> Self {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        let mut config = Self::from_file(&path);
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        config.sanitize();
        config
    }

    fn from_file(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let parsed = std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|text| Self::from_json(&text));
        match parsed {
            Ok(config) => {
                info!(path = %path.display(), "loaded configuration");
                config
            }
            Err(err) => {
                warn!(path = %path.display(), "ignoring configuration file: {err:#}");
                Self::default()
            }
        }
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Keeps the editor row policy consistent.
    pub fn sanitize(&mut self) {
        self.min_rows = self.min_rows.max(1);
        self.max_rows = self.max_rows.max(self.min_rows);
        self.default_rows = self.default_rows.clamp(self.min_rows, self.max_rows);
    }

    pub fn results_path(&self) -> PathBuf {
        self.data_dir.join("psa_results.json")
    }

    pub fn notes_path(&self) -> PathBuf {
        self.data_dir.join("lab_notes.json")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AppConfig::from_json(r#"{ "max_rows": 20, "autosave": false }"#).unwrap();
        assert_eq!(config.max_rows, 20);
        assert!(!config.autosave);
        assert_eq!(config.min_rows, 3);
        assert_eq!(config.font_family, "MonaspaceXenonFrozen");
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(AppConfig::from_json("max_rows = 20").is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::from_file(&dir.path().join("absent.json"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_sanitize_row_policy() {
        let mut config = AppConfig {
            min_rows: 0,
            max_rows: 2,
            default_rows: 10,
            ..AppConfig::default()
        };
        config.sanitize();
        assert_eq!((config.min_rows, config.max_rows, config.default_rows), (1, 2, 2));
    }

    #[test]
    fn test_store_paths_live_in_data_dir() {
        let config = AppConfig {
            data_dir: PathBuf::from("/srv/lab"),
            ..AppConfig::default()
        };
        assert_eq!(config.results_path(), PathBuf::from("/srv/lab/psa_results.json"));
        assert_eq!(config.backup_dir(), PathBuf::from("/srv/lab/backups"));
        assert_eq!(config.images_dir(), PathBuf::from("/srv/lab/images"));
    }
}
