//! Daemon configuration management

use anyhow::{Context, Result, anyhow};
use driver::{DeviceFilter, DeviceTable};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub daemon: DaemonSettings,
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    /// Run with sd-notify lifecycle and compact log output
    pub service_mode: bool,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Device id patterns the driver claims (VID:PID format, e.g.
    /// "0x5655:0x4144"; either side may be "*")
    pub filters: Vec<String>,
    /// First minor number of the linker window
    #[serde(default = "UsbSettings::default_minor_base")]
    pub minor_base: u8,
    /// Number of minor slots in the window
    #[serde(default = "UsbSettings::default_max_linkers")]
    pub max_linkers: u8,
}

impl UsbSettings {
    fn default_minor_base() -> u8 {
        driver::FLASH_ADVANCE_MINOR_BASE
    }

    fn default_max_linkers() -> u8 {
        driver::MAX_LINKERS
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonSettings {
                service_mode: false,
                log_level: "info".to_string(),
            },
            usb: UsbSettings {
                // The linker enumerates as 0x4144 only after its controller
                // firmware has been uploaded by an external loader; the bare
                // controller shows up as 0x5655:0x4149 and is not usable here
                filters: vec!["0x5655:0x4144".to_string()],
                minor_base: UsbSettings::default_minor_base(),
                max_linkers: UsbSettings::default_max_linkers(),
            },
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the specified path, or search the standard
    /// locations when none is given.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/falink/falinkd.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: DaemonConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found.
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("falink").join("falinkd.toml")
        } else {
            PathBuf::from(".config/falink/falinkd.toml")
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.daemon.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.daemon.log_level,
                valid_levels.join(", ")
            ));
        }

        for filter in &self.usb.filters {
            DeviceFilter::parse(filter).map_err(|e| anyhow!(e))?;
        }

        if self.usb.max_linkers == 0 {
            return Err(anyhow!("max_linkers must be at least 1"));
        }
        if self.usb.minor_base as u16 + self.usb.max_linkers as u16 > 256 {
            return Err(anyhow!(
                "minor window {}..{} does not fit the minor number space",
                self.usb.minor_base,
                self.usb.minor_base as u16 + self.usb.max_linkers as u16
            ));
        }

        Ok(())
    }

    /// Build the driver id table from the configured filter patterns.
    pub fn device_table(&self) -> Result<DeviceTable> {
        let entries = self
            .usb
            .filters
            .iter()
            .map(|pattern| DeviceFilter::parse(pattern).map_err(|e| anyhow!(e)))
            .collect::<Result<Vec<_>>>()?;
        Ok(DeviceTable::new(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driver::{FLASH_ADVANCE_PRODUCT_ID, VISOLY_VENDOR_ID};

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.daemon.log_level, "info");
        assert!(!config.daemon.service_mode);
        assert_eq!(config.usb.filters, vec!["0x5655:0x4144".to_string()]);
        assert_eq!(config.usb.minor_base, 192);
        assert_eq!(config.usb.max_linkers, 16);
    }

    #[test]
    fn test_default_table_claims_the_linker() {
        let table = DaemonConfig::default().device_table().unwrap();
        assert!(table.matches(VISOLY_VENDOR_ID, FLASH_ADVANCE_PRODUCT_ID));
        assert!(!table.matches(0x1d6b, 0x0002));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = DaemonConfig::default();
        assert!(config.validate().is_ok());

        config.daemon.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.daemon.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_filters() {
        let mut config = DaemonConfig::default();

        config.usb.filters = vec!["0x5655:*".to_string()];
        assert!(config.validate().is_ok());

        config.usb.filters = vec!["5655:4144".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_minor_window() {
        let mut config = DaemonConfig::default();

        config.usb.max_linkers = 0;
        assert!(config.validate().is_err());

        config.usb.minor_base = 250;
        config.usb.max_linkers = 16;
        assert!(config.validate().is_err());

        config.usb.minor_base = 240;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = DaemonConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: DaemonConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.daemon.log_level, parsed.daemon.log_level);
        assert_eq!(config.usb.filters, parsed.usb.filters);
        assert_eq!(config.usb.minor_base, parsed.usb.minor_base);
    }
}
