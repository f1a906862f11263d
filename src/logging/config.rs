//! Logging configuration system
//!
//! Per-component log levels, output destinations and file format.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub global_level: String,

    /// Enable console output
    pub console_output: bool,

    /// Directory for JSON log files (None = no file logging)
    pub log_directory: Option<PathBuf>,

    /// Include file location in logs
    pub include_file_location: bool,

    /// Level for the feature / matching / estimation internals
    pub alignment_level: String,

    /// Level for the batch driver and collaborators
    pub batch_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            global_level: "info".to_string(),
            console_output: true,
            log_directory: None,
            include_file_location: false,
            alignment_level: "info".to_string(),
            batch_level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Create a development configuration with verbose logging
    pub fn development() -> Self {
        Self {
            global_level: "debug".to_string(),
            console_output: true,
            log_directory: Some(PathBuf::from("logs")),
            include_file_location: true,
            alignment_level: "trace".to_string(),
            batch_level: "debug".to_string(),
        }
    }

    /// Validate the configuration and provide helpful error messages
    pub fn validate(&self) -> Result<(), String> {
        for (name, level) in [
            ("global_level", &self.global_level),
            ("alignment_level", &self.alignment_level),
            ("batch_level", &self.batch_level),
        ] {
            if !VALID_LEVELS.contains(&level.as_str()) {
                return Err(format!(
                    "Invalid {}: {}. Must be one of: {:?}",
                    name, level, VALID_LEVELS
                ));
            }
        }

        Ok(())
    }

    /// Get the effective log level for a specific component
    pub fn get_component_level(&self, component: &str) -> &str {
        match component {
            "algorithms" | "alignment" | "utils" => &self.alignment_level,
            "pipeline" | "batch" | "data" => &self.batch_level,
            _ => &self.global_level,
        }
    }

    /// `EnvFilter` directives for this crate: global level plus per-module overrides.
    pub fn filter_directives(&self, crate_name: &str) -> String {
        let mut directives = vec![format!("{}={}", crate_name, self.global_level)];
        for module in ["algorithms", "utils", "pipeline", "data"] {
            directives.push(format!(
                "{}::{}={}",
                crate_name,
                module,
                self.get_component_level(module)
            ));
        }
        directives.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.global_level, "info");
        assert!(config.console_output);
        assert!(config.log_directory.is_none());
        assert!(!config.include_file_location);
    }

    #[test]
    fn test_config_validation() {
        let mut config = LoggingConfig::default();
        assert!(config.validate().is_ok());

        config.global_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.global_level = "debug".to_string();
        config.alignment_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_component_level_selection() {
        let config = LoggingConfig::development();
        assert_eq!(config.get_component_level("algorithms"), "trace");
        assert_eq!(config.get_component_level("pipeline"), "debug");
        assert_eq!(config.get_component_level("unknown"), "debug");
    }

    #[test]
    fn test_filter_directives() {
        let config = LoggingConfig::development();
        let directives = config.filter_directives("photo_align");
        assert!(directives.starts_with("photo_align=debug"));
        assert!(directives.contains("photo_align::algorithms=trace"));
        assert!(directives.contains("photo_align::pipeline=debug"));
    }
}
