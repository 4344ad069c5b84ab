// Scan configuration
use crate::disk::GeometryOverride;
use crate::error::{PartHuntError, Result};
use crate::geometry::DiskGeometry;
use crate::partition::SectorAddress;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Distance between candidate sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Increment {
    #[default]
    Sector,
    Head,
    Cylinder,
    Sectors(u64),
}

impl Increment {
    pub fn sectors(self, geometry: &DiskGeometry) -> u64 {
        let n = match self {
            Increment::Sector => 1,
            Increment::Head => geometry.sectors_per_track,
            Increment::Cylinder => geometry.sectors_per_cylinder(),
            Increment::Sectors(n) => n,
        };
        n.max(1)
    }
}

impl FromStr for Increment {
    type Err = PartHuntError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "s" => Ok(Increment::Sector),
            "h" => Ok(Increment::Head),
            "c" => Ok(Increment::Cylinder),
            _ => match s.parse::<u64>() {
                Ok(n) if n > 0 => Ok(Increment::Sectors(n)),
                _ => Err(PartHuntError::Configuration(format!(
                    "increment must be 's', 'h', 'c' or a positive number, not '{}'",
                    s
                ))),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightOverride {
    pub module: String,
    pub weight: f32,
}

impl FromStr for WeightOverride {
    type Err = PartHuntError;

    /// Parses `name,weight`.
    fn from_str(s: &str) -> Result<Self> {
        let (module, weight) = s
            .split_once(',')
            .ok_or_else(|| PartHuntError::Configuration(format!("expected name,weight, got '{}'", s)))?;
        let weight = weight
            .trim()
            .parse::<f32>()
            .map_err(|e| PartHuntError::Configuration(format!("bad weight in '{}': {}", s, e)))?;
        Ok(Self {
            module: module.trim().to_string(),
            weight,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub increment: Increment,
    /// First sector to probe; sectors-per-track when unset.
    pub start: Option<SectorAddress>,
    /// Last sector to probe.
    pub max_sector: Option<SectorAddress>,
    pub fast: bool,
    pub test_extended: bool,
    pub skip_errors: bool,
    pub interactive: bool,
    /// Only report the existing tables, do not scan.
    pub dont_guess: bool,
    pub weights: Vec<WeightOverride>,
    pub geometry: Option<GeometryOverride>,
    pub sector_size: Option<u64>,
    pub query_geometry: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            increment: Increment::Sector,
            start: None,
            max_sector: None,
            fast: true,
            test_extended: true,
            skip_errors: true,
            interactive: false,
            dont_guess: false,
            weights: Vec::new(),
            geometry: None,
            sector_size: None,
            query_geometry: true,
        }
    }
}

impl ScanConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PartHuntError::Configuration(format!("{}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(size) = self.sector_size {
            if size < 512 || size % 512 != 0 {
                return Err(PartHuntError::Configuration(format!(
                    "sector size {} is not a multiple of 512",
                    size
                )));
            }
        }
        if let Some(g) = &self.geometry {
            if g.cylinders == 0 || g.heads == 0 || g.sectors_per_track == 0 {
                return Err(PartHuntError::Configuration("geometry values must be non-zero".to_string()));
            }
        }
        if let (Some(start), Some(max)) = (self.start, self.max_sector) {
            if start > max {
                return Err(PartHuntError::Configuration(format!(
                    "start sector {} is beyond the last sector {}",
                    start, max
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_increment() {
        assert_eq!("s".parse::<Increment>().unwrap(), Increment::Sector);
        assert_eq!("h".parse::<Increment>().unwrap(), Increment::Head);
        assert_eq!("c".parse::<Increment>().unwrap(), Increment::Cylinder);
        assert_eq!("16".parse::<Increment>().unwrap(), Increment::Sectors(16));
        assert!("0".parse::<Increment>().is_err());
        assert!("x".parse::<Increment>().is_err());
    }

    #[test]
    fn test_increment_sectors() {
        let g = DiskGeometry::new(100, 16, 63, 100 * 16 * 63);
        assert_eq!(Increment::Sector.sectors(&g), 1);
        assert_eq!(Increment::Head.sectors(&g), 63);
        assert_eq!(Increment::Cylinder.sectors(&g), 1008);
        assert_eq!(Increment::Sectors(8).sectors(&g), 8);
    }

    #[test]
    fn test_parse_weight() {
        let w: WeightOverride = "ext2,0.6".parse().unwrap();
        assert_eq!(w.module, "ext2");
        assert_eq!(w.weight, 0.6);
        assert!("ext2".parse::<WeightOverride>().is_err());
        assert!("ext2,abc".parse::<WeightOverride>().is_err());
    }

    #[test]
    fn test_json_config_defaults() {
        let config: ScanConfig = serde_json::from_str(r#"{"increment": "head", "fast": false}"#).unwrap();
        assert_eq!(config.increment, Increment::Head);
        assert!(!config.fast);
        assert!(config.test_extended);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ScanConfig {
            sector_size: Some(1000),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ScanConfig {
            start: Some(100),
            max_sector: Some(10),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
