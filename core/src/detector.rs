// Detector contract shared by built-in and runtime-loaded modules
use crate::disk::Disk;
use crate::error::Result;
use crate::geometry::DiskGeometry;
use crate::partition::{PartitionEntry, SectorAddress};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Discrete confidence levels a probe may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    No,
    Perhaps,
    Yes,
    Certain,
}

impl Confidence {
    pub fn value(self) -> f32 {
        match self {
            Confidence::No => 0.0,
            Confidence::Perhaps => 0.5,
            Confidence::Yes => 0.8,
            Confidence::Certain => 1.0,
        }
    }
}

/// Score at or above which a weighted guess is a candidate.
pub const GUESS_THRESHOLD: f32 = 0.5;

/// Positions at which a detector may match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    None,
    Head,
    Cylinder,
    Modulus(u64),
}

impl Alignment {
    pub fn admits(self, sector: SectorAddress, geometry: &DiskGeometry) -> bool {
        match self {
            Alignment::None => true,
            Alignment::Head => geometry.is_head_boundary(sector),
            Alignment::Cylinder => geometry.is_cylinder_boundary(sector),
            Alignment::Modulus(0) => true,
            Alignment::Modulus(m) => sector % m == 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// The format's own first sector looks like a partition table.
    #[serde(default)]
    pub resembles_sector0_table: bool,
    /// Cannot live inside an extended partition.
    #[serde(default)]
    pub excluded_inside_extended: bool,
    #[serde(default)]
    pub alignment: Alignment,
}

/// A probe result: confidence plus the partition it describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Guess {
    pub confidence: Confidence,
    pub entry: PartitionEntry,
}

impl Guess {
    pub fn no() -> Self {
        Self::default()
    }

    pub fn new(confidence: Confidence, partition_type: u8, start: SectorAddress, size: u64) -> Self {
        Self {
            confidence,
            entry: PartitionEntry::new(partition_type, start, size),
        }
    }
}

/// Where a registered module came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorSource {
    Builtin,
    Loaded(PathBuf),
}

impl fmt::Display for DetectorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorSource::Builtin => write!(f, "builtin"),
            DetectorSource::Loaded(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Signature detector plugged into the scanner.
///
/// `init` runs once before scanning and returns the number of bytes the
/// probe window must hold. `probe` sees that window read at `sector` and
/// may read elsewhere on the disk; the scanner restores the read cursor
/// afterwards. `term` runs once after scanning.
pub trait Detector: Send {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn init(&mut self, disk: &Disk) -> Result<usize>;

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess>;

    fn term(&mut self, _disk: &Disk) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_levels() {
        assert_eq!(Confidence::No.value(), 0.0);
        assert_eq!(Confidence::Perhaps.value(), 0.5);
        assert_eq!(Confidence::Yes.value(), 0.8);
        assert_eq!(Confidence::Certain.value(), 1.0);
        assert!(Confidence::Yes > Confidence::Perhaps);
    }

    #[test]
    fn test_alignment() {
        let g = DiskGeometry::new(100, 16, 63, 100 * 16 * 63);
        assert!(Alignment::None.admits(7, &g));
        assert!(Alignment::Head.admits(63, &g));
        assert!(!Alignment::Head.admits(64, &g));
        assert!(Alignment::Cylinder.admits(1008, &g));
        assert!(Alignment::Modulus(8).admits(64, &g));
        assert!(!Alignment::Modulus(8).admits(63, &g));
    }
}
