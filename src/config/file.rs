// src/config/file.rs

use serde::{Serialize, Deserialize};
use std::path::PathBuf;
use crate::error::Result;
use super::FromIni;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub export_dir: PathBuf,
    pub log_file: Option<PathBuf>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("data/exports"),
            log_file: None,
        }
    }
}

impl FromIni for FileConfig {
    fn from_ini_section(&mut self, _section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        match key {
            "export_dir" => {
                self.export_dir = PathBuf::from(value.trim_matches('"'));
                Some(Ok(()))
            },
            "log_file" => {
                let value = value.trim_matches('"');
                self.log_file = if value.is_empty() { None } else { Some(PathBuf::from(value)) };
                Some(Ok(()))
            },
            _ => None,
        }
    }
}

impl FileConfig {
    pub fn validate(&self) -> Result<()> {
        if self.export_dir.as_os_str().is_empty() {
            return Err(crate::error::Error::config("export_dir must not be empty"));
        }
        Ok(())
    }

    /// Default destination for a JSON export
    pub fn default_export_path(&self) -> PathBuf {
        self.export_dir.join("wifi_map_data.json")
    }

    pub fn describe(&self) -> String {
        format!(
            "File Configuration:\n\
             - Export Directory: {:?}\n\
             - Log File: {:?}",
            self.export_dir,
            self.log_file
        )
    }
}
