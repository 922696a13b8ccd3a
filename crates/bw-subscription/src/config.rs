//! Engine configuration, stored as JSON.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::EASYLIST_URL;
use crate::error::ConfigError;

pub const CUSTOM_LIST_FILE: &str = "customlist.txt";
const ADBLOCK_DIR: &str = "adblock";
const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// One configured remote list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub title: String,
    pub url: String,
    /// Cache file; derived from the title when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root of the cache directory; lists live in `<data_dir>/adblock`
    pub data_dir: PathBuf,
    pub custom_list_path: Option<PathBuf>,
    /// Global switch; a disabled engine blocks and hides nothing
    pub enabled: bool,
    /// Drop the third-party section of EasyList when saving it
    pub limited_easy_list: bool,
    pub disabled_rules: Vec<String>,
    pub subscriptions: Vec<SubscriptionConfig>,
    pub update_interval_days: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            custom_list_path: None,
            enabled: true,
            limited_easy_list: false,
            disabled_rules: Vec::new(),
            subscriptions: vec![SubscriptionConfig {
                title: "EasyList".to_string(),
                url: EASYLIST_URL.to_string(),
                path: None,
            }],
            update_interval_days: 5,
            request_timeout_secs: 30,
            user_agent: concat!("Blockwise/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl EngineConfig {
    /// Config rooted at `data_dir`, with defaults for everything else.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)
    }

    /// Age after which a cached list is refreshed.
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_days.saturating_mul(SECS_PER_DAY))
    }

    pub fn adblock_dir(&self) -> PathBuf {
        self.data_dir.join(ADBLOCK_DIR)
    }

    pub fn resolved_custom_list_path(&self) -> PathBuf {
        self.custom_list_path
            .clone()
            .unwrap_or_else(|| self.adblock_dir().join(CUSTOM_LIST_FILE))
    }

    pub fn resolved_subscription_path(&self, subscription: &SubscriptionConfig) -> PathBuf {
        subscription
            .path
            .clone()
            .unwrap_or_else(|| self.adblock_dir().join(file_name_for_title(&subscription.title)))
    }
}

/// Cache file name for a list title: lowercased, with characters that are
/// awkward in file names replaced.
pub fn file_name_for_title(title: &str) -> String {
    let stem: String = title
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = if stem.is_empty() { "subscription".to_string() } else { stem };
    format!("{stem}.txt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.enabled);
        assert!(!config.limited_easy_list);
        assert_eq!(config.subscriptions.len(), 1);
        assert_eq!(config.subscriptions[0].url, EASYLIST_URL);
        assert_eq!(
            config.resolved_custom_list_path(),
            PathBuf::from("./adblock/customlist.txt")
        );
        assert_eq!(
            config.resolved_subscription_path(&config.subscriptions[0]),
            PathBuf::from("./adblock/easylist.txt")
        );
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "limited_easy_list": true, "disabled_rules": ["||a.com^"] }"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert!(config.limited_easy_list);
        assert_eq!(config.disabled_rules, vec!["||a.com^".to_string()]);
        assert_eq!(config.update_interval_days, 5);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = EngineConfig::with_data_dir(dir.path());
        config.subscriptions.push(SubscriptionConfig {
            title: "EasyPrivacy".into(),
            url: "https://easylist-downloads.adblockplus.org/easyprivacy.txt".into(),
            path: Some(dir.path().join("privacy.txt")),
        });

        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_update_interval_saturates() {
        let mut config = EngineConfig::default();
        assert_eq!(config.update_interval(), Duration::from_secs(5 * 24 * 60 * 60));

        config.update_interval_days = u64::MAX;
        assert_eq!(config.update_interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(EngineConfig::load(&path), Err(ConfigError::Json { .. })));
    }

    #[test]
    fn test_file_name_for_title() {
        assert_eq!(file_name_for_title("EasyList"), "easylist.txt");
        assert_eq!(file_name_for_title("Peter Lowe's list"), "peter_lowe_s_list.txt");
        assert_eq!(file_name_for_title("  "), "subscription.txt");
    }
}
