//! Guidance configuration file support.
//!
//! Every section and field is optional in the TOML file; missing values
//! fall back to the defaults of the standard prostate template.

use anyhow::{Context, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::geometry::TemplateGeometry;
use crate::needle::NeedleModel;
use crate::targets::NeedleType;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GuidanceConfig {
    #[serde(default)]
    pub template: TemplateGeometry,
    #[serde(default)]
    pub needle: NeedleModel,
    #[serde(default)]
    pub ice_ball: IceBallSettings,
    #[serde(default)]
    pub table: TableSettings,
}

/// Ice-ball radii (x, y, z) in mm per needle type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceBallSettings {
    #[serde(default = "default_ice_rod")]
    pub ice_rod: [f64; 3],
    #[serde(default = "default_ice_seed")]
    pub ice_seed: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSettings {
    /// Absolute depth difference (mm) under which a planning depth counts as matching.
    #[serde(default = "default_depth_tolerance")]
    pub depth_tolerance: f64,
}

fn default_ice_rod() -> [f64; 3] {
    [12.5, 12.5, 20.0]
}

fn default_ice_seed() -> [f64; 3] {
    [10.0, 10.0, 16.0]
}

fn default_depth_tolerance() -> f64 {
    0.5
}

impl Default for IceBallSettings {
    fn default() -> Self {
        Self {
            ice_rod: default_ice_rod(),
            ice_seed: default_ice_seed(),
        }
    }
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            depth_tolerance: default_depth_tolerance(),
        }
    }
}

impl IceBallSettings {
    /// Radius vector of the affected zone for a needle type. Unknown needles have no zone.
    pub fn radii(&self, needle_type: NeedleType) -> Vector3<f64> {
        match needle_type {
            NeedleType::IceRod => Vector3::from(self.ice_rod),
            NeedleType::IceSeed => Vector3::from(self.ice_seed),
            NeedleType::Unspecified => Vector3::zeros(),
        }
    }
}

impl GuidanceConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: GuidanceConfig =
            toml::from_str(content).context("failed to parse guidance config")?;
        config
            .template
            .validate()
            .context("invalid [template] section")?;
        Ok(config)
    }

    /// Load the configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file {:?}", path.as_ref()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("failed to load config file {:?}", path.as_ref()))?;
        log::info!("Loaded guidance config from {:?}", path.as_ref());
        Ok(config)
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = GuidanceConfig::from_toml_str("").unwrap();
        assert_eq!(config, GuidanceConfig::default());
        assert_eq!(config.template.rows, 13);
        assert_relative_eq!(config.table.depth_tolerance, 0.5);
    }

    #[test]
    fn test_partial_template_section() {
        let toml = r#"
            [template]
            rows = 7
            columns = 7
            max_depth = 120.0

            [ice_ball]
            ice_rod = [15.0, 15.0, 22.5]
        "#;
        let config = GuidanceConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.template.rows, 7);
        assert_eq!(config.template.columns, 7);
        assert_relative_eq!(config.template.spacing, 5.0);
        assert_relative_eq!(config.template.max_depth, 120.0);
        assert_eq!(config.ice_ball.ice_rod, [15.0, 15.0, 22.5]);
        assert_eq!(config.ice_ball.ice_seed, default_ice_seed());
    }

    #[test]
    fn test_invalid_template_rejected() {
        let toml = r#"
            [template]
            spacing = -1.0
        "#;
        assert!(GuidanceConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_unspecified_needle_has_no_zone() {
        let settings = IceBallSettings::default();
        assert_eq!(settings.radii(NeedleType::Unspecified), Vector3::zeros());
        assert_relative_eq!(settings.radii(NeedleType::IceSeed).z, 16.0);
    }
}
