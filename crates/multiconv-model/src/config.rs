//! Configuration file support for multiconv
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/multiconv/config.toml`
//! - macOS: `~/Library/Application Support/multiconv/config.toml`
//! - Windows: `%APPDATA%\multiconv\config.toml`

use crate::error::{ConversionError, Result};
use crate::metadata::MetadataSettings;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Smallest and largest layer count of an MPC keygroup.
pub const MPC_LAYER_LIMITS: [usize; 2] = [4, 8];

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Metadata guessing
    pub metadata: MetadataSettings,
    /// Output behaviour
    pub destination: DestinationOptions,
}

/// Options that control how writers produce their output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationOptions {
    /// Add numbered files next to existing ones instead of failing
    pub add_new_files: bool,
    /// Maximum layers per MPC keygroup (4 or 8)
    pub mpc_layer_limit: usize,
    /// Write smpl/inst chunks into copied WAV files
    pub write_wav_metadata: bool,
}

impl Default for DestinationOptions {
    fn default() -> Self {
        Self {
            add_new_files: false,
            mpc_layer_limit: 4,
            write_wav_metadata: true,
        }
    }
}

impl DestinationOptions {
    /// The configured MPC layer limit, snapped to a supported value.
    pub fn effective_mpc_layer_limit(&self) -> usize {
        if self.mpc_layer_limit >= MPC_LAYER_LIMITS[1] {
            MPC_LAYER_LIMITS[1]
        } else {
            MPC_LAYER_LIMITS[0]
        }
    }
}

impl ConverterConfig {
    /// Load configuration from the default config file location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Err(ConversionError::Config(format!("Config file not found at {:?}", path)))
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ConverterConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration or return default if not found
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Save configuration to the default config file location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "multiconv") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Err(ConversionError::Config("Could not determine config directory".to_string()))
        }
    }

    /// Create a default config file with comments
    pub fn create_default_config_file() -> Result<PathBuf> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, DEFAULT_CONFIG)?;
        Ok(path)
    }
}

const DEFAULT_CONFIG: &str = r#"# multiconv configuration file

[metadata]
# Name instruments after their folder instead of their file
prefer_folder_name = false

# Creator names to look for in folder and file names
creator_tags = []

# Creator used when a source carries no creator information
default_creator_name = "Unknown"

[destination]
# Add numbered files instead of failing when the output already exists
add_new_files = false

# Layers per MPC keygroup: 4 or 8
mpc_layer_limit = 4

# Write smpl/inst chunks into copied WAV files
write_wav_metadata = true
"#;
