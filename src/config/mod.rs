pub mod file;
pub mod subsystems;

use serde::{Serialize, Deserialize};
use std::path::Path;
use std::fs;
use crate::error::Result;
use log::{warn, trace};

pub trait FromIni {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WifiMapConfig {
    // File paths
    pub files: file::FileConfig,

    // Subsystem configs
    pub matcher: subsystems::MatcherConfig,
    pub storage: subsystems::StorageConfig,
    pub logging: subsystems::LoggingConfig,
}

impl WifiMapConfig {
    pub fn validate(&self) -> Result<()> {
        self.files.validate()?;
        self.matcher.validate()?;
        self.storage.validate()?;
        Ok(())
    }

    pub fn from_ini<P: AsRef<Path>>(path: P) -> Result<Self> {
        let absolute_path = std::fs::canonicalize(&path)
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        trace!("Loading configuration from: {:?}", absolute_path);

        let content = fs::read_to_string(&path)?;
        Self::from_ini_str(&content)
    }

    pub fn from_ini_str(content: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut current_section = String::new();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                current_section = line[1..line.len()-1].trim().to_string();
                trace!("  Line {}: Found section: [{}]", line_num + 1, current_section);
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                // Delegate to appropriate subsystem config
                let handled = match current_section.as_str() {
                    "file" => config.files.from_ini_section(&current_section, key, value),
                    "matcher" => config.matcher.from_ini_section(&current_section, key, value),
                    "storage" => config.storage.from_ini_section(&current_section, key, value),
                    "logging" => config.logging.from_ini_section(&current_section, key, value),
                    _ => None,
                };

                match handled {
                    Some(Err(e)) => warn!("Error processing config key {}={}: {}", key, value, e),
                    Some(Ok(())) => {}
                    None => warn!("Unrecognized config key: {}={} in section [{}]", key, value, current_section),
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn describe(&self) -> String {
        format!(
            "{}\n{}\n{}",
            self.files.describe(),
            self.matcher.describe(),
            self.storage.describe()
        )
    }
}
