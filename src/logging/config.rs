//! Logging configuration
//!
//! Per-component log levels and output destinations for the stitcher.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub global_level: String,

    /// Enable console output
    pub console_output: bool,

    /// Directory for JSON log files (None = no file logging)
    pub log_directory: Option<PathBuf>,

    /// Include file location in console logs
    pub include_file_location: bool,

    /// Level for pairwise registration and phase correlation
    pub registration_level: String,

    /// Level for graph building, optimization and propagation
    pub graph_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            global_level: "info".to_string(),
            console_output: true,
            log_directory: None,
            include_file_location: false,
            registration_level: "info".to_string(),
            graph_level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Verbose logging with file output under `logs/`
    pub fn development() -> Self {
        Self {
            global_level: "debug".to_string(),
            console_output: true,
            log_directory: Some(PathBuf::from("logs")),
            include_file_location: true,
            registration_level: "trace".to_string(),
            graph_level: "debug".to_string(),
        }
    }

    /// Warnings only, JSON files, no console
    pub fn production() -> Self {
        Self {
            global_level: "warn".to_string(),
            console_output: false,
            log_directory: Some(PathBuf::from("/var/log/tile-stitcher")),
            include_file_location: false,
            registration_level: "info".to_string(),
            graph_level: "info".to_string(),
        }
    }

    /// Map a `-v` count onto the global level
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        let level = match verbose {
            0 => return self,
            1 => "debug",
            _ => "trace",
        };
        self.global_level = level.to_string();
        self.registration_level = level.to_string();
        self.graph_level = level.to_string();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, level) in [
            ("global_level", &self.global_level),
            ("registration_level", &self.registration_level),
            ("graph_level", &self.graph_level),
        ] {
            if !VALID_LEVELS.contains(&level.as_str()) {
                return Err(format!(
                    "Invalid {}: {}. Must be one of: {:?}",
                    name, level, VALID_LEVELS
                ));
            }
        }

        if let Some(ref log_dir) = self.log_directory {
            if let Some(parent) = log_dir.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(format!("Log directory parent does not exist: {:?}", parent));
                }
            }
        }

        Ok(())
    }

    /// Effective log level for a component
    pub fn get_component_level(&self, component: &str) -> &str {
        match component {
            "registration" | "algorithms" => &self.registration_level,
            "graph" => &self.graph_level,
            _ => &self.global_level,
        }
    }
}
