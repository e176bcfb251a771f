// src/config/subsystems/matcher.rs

use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use crate::config::FromIni;

pub const DEFAULT_PROXIMITY_RADIUS_M: f64 = 30.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Samples closer than this to an existing anchor join that cluster
    pub proximity_radius_m: f64,
    /// Prefilter candidates through an R-tree over cluster anchors
    pub use_spatial_index: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            proximity_radius_m: DEFAULT_PROXIMITY_RADIUS_M,
            use_spatial_index: true,
        }
    }
}

impl FromIni for MatcherConfig {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        if section_name != "matcher" {
            return None;
        }

        match key {
            "proximity_radius_m" => {
                match value.parse::<f64>() {
                    Ok(radius) if radius.is_finite() && radius > 0.0 => {
                        self.proximity_radius_m = radius;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid proximity_radius_m (must be a positive number): {}", value)
                    ))),
                }
            },
            "use_spatial_index" => {
                match value.parse() {
                    Ok(flag) => {
                        self.use_spatial_index = flag;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid use_spatial_index value (must be true/false): {}", value)
                    ))),
                }
            },
            _ => None,
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.proximity_radius_m.is_finite() || self.proximity_radius_m <= 0.0 {
            return Err(Error::Config(format!(
                "proximity_radius_m must be a positive number, got {}",
                self.proximity_radius_m
            )));
        }
        Ok(())
    }

    pub fn describe(&self) -> String {
        format!(
            "Matcher Configuration:\n\
             - Proximity Radius: {} m\n\
             - Spatial Index: {}",
            self.proximity_radius_m,
            self.use_spatial_index
        )
    }
}
