use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Unsupported config version '{0}'")]
    UnsupportedVersion(String),
}

// ===== CONFIG TYPES =====

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    pub app: AppSection,
    pub storage: StorageSection,
    pub ui: UiSection,
    pub loading: LoadingSection,
}

impl ViewerConfig {
    /// Parse a TOML config. Missing sections take their defaults; an unknown
    /// version that cannot be migrated is rejected.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: ViewerConfig = toml::from_str(content)?;
        match config.app.get_migration_strategy() {
            MigrationStrategy::None => {}
            MigrationStrategy::Upgrade(_) => {
                config.app.version = AppSection::CURRENT_VERSION.to_string();
            }
            MigrationStrategy::Recreate => {
                return Err(ConfigError::UnsupportedVersion(config.app.version));
            }
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Repair values that would break the viewer, returning a warning per fix.
    pub fn validate_and_fix(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.storage.prefix.trim().is_empty() {
            warnings.push("Empty storage prefix replaced with default".to_string());
            self.storage.prefix = StorageSection::default().prefix;
        }
        if self.ui.group_colors.is_empty() {
            warnings.push("Empty group color palette replaced with default".to_string());
            self.ui.group_colors = UiSection::default().group_colors;
        }
        if self.ui.default_error_message.trim().is_empty() {
            warnings.push("Empty default error message replaced with default".to_string());
            self.ui.default_error_message = UiSection::default().default_error_message;
        }
        warnings
    }
}

// AppSection carries the config format version so that stored configs can be migrated
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppSection {
    pub version: String,
}

impl AppSection {
    /// Current configuration format version
    pub const CURRENT_VERSION: &'static str = "1.0.0";

    pub fn get_migration_strategy(&self) -> MigrationStrategy {
        match self.version.as_str() {
            "1.0.0" => MigrationStrategy::None,
            "0.9.0" => MigrationStrategy::Upgrade("0.9.0 -> 1.0.0".to_string()),
            _ => MigrationStrategy::Recreate,
        }
    }
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationStrategy {
    None,
    Upgrade(String),
    Recreate,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StorageSection {
    /// Prefix of every key written to the client-side store
    pub prefix: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            prefix: "OTG".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct UiSection {
    pub wait_message: String,
    pub default_error_message: String,
    pub group_colors: Vec<String>,
}

impl Default for UiSection {
    fn default() -> Self {
        Self {
            wait_message: "Please wait...".to_string(),
            default_error_message: "There was a server-side error.".to_string(),
            group_colors: ["#97BDBD", "#C46868", "#8FBF8F", "#D6B66B", "#9D8FC4", "#C48FB4"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct LoadingSection {
    /// Ignore the completion of a load that has been superseded by a newer one.
    /// When off, the last completing response wins.
    pub discard_stale_responses: bool,
}
