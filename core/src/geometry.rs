// Disk geometry and legacy CHS arithmetic
use crate::error::Result;
use crate::partition::{Chs, SectorAddress};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskGeometry {
    pub cylinders: u64,
    pub heads: u64,
    pub sectors_per_track: u64,
    pub total_sectors: u64,
}

impl DiskGeometry {
    pub fn new(cylinders: u64, heads: u64, sectors_per_track: u64, total_sectors: u64) -> Self {
        Self {
            cylinders,
            heads,
            sectors_per_track,
            total_sectors,
        }
    }

    /// Geometry for a plain image of `total_sectors` sectors, derived
    /// from the last addressable sector.
    pub fn synthesize(total_sectors: u64) -> Self {
        let lba = total_sectors.saturating_sub(1);
        Self {
            cylinders: lba / (255 * 63),
            heads: (lba / 63) % 255,
            sectors_per_track: lba % 63 + 1,
            total_sectors,
        }
    }

    /// Classic CHS cannot describe this disk.
    pub fn is_lba(&self) -> bool {
        self.heads > 16 || self.sectors_per_track > 63
    }

    pub fn sectors_per_cylinder(&self) -> u64 {
        self.heads * self.sectors_per_track
    }

    pub fn is_head_boundary(&self, sector: SectorAddress) -> bool {
        self.sectors_per_track == 0 || sector % self.sectors_per_track == 0
    }

    pub fn is_cylinder_boundary(&self, sector: SectorAddress) -> bool {
        let spc = self.sectors_per_cylinder();
        spc == 0 || sector % spc == 0
    }

    /// Encode an absolute sector as a DOS CHS triple, saturating at
    /// cylinder 1023.
    pub fn dos_chs(&self, sector: SectorAddress) -> Chs {
        let (h, s) = (self.heads, self.sectors_per_track);
        if h == 0 || s == 0 {
            return Chs::default();
        }
        if sector > 1023 * h * s {
            return Chs {
                head: (h - 1) as u8,
                sector: (s & 0x3F) as u8 | ((1023 >> 2) & 0xC0) as u8,
                cylinder: (1023 & 0xFF) as u8,
            };
        }
        let mut n = sector;
        let sect = n % s + 1;
        n /= s;
        let head = n % h;
        n /= h;
        Chs {
            head: head as u8,
            sector: (sect & 0x3F) as u8 | ((n >> 2) & 0xC0) as u8,
            cylinder: (n & 0xFF) as u8,
        }
    }
}

/// Source of device geometry and table-reread notification.
pub trait GeometryProvider {
    /// Geometry of the opened device. `sector_size` is the size in use.
    fn geometry(&self, path: &Path, file: &File, sector_size: u64) -> Result<DiskGeometry>;

    /// Logical sector size reported by the OS, if any.
    fn sector_size(&self, _file: &File) -> Option<u64> {
        None
    }

    /// Ask the OS to re-read the partition table. Best-effort.
    fn notify_table_changed(&self, _path: &Path, _file: &File) {}
}

/// Provider that always synthesizes geometry from the file length.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageGeometry;

impl GeometryProvider for ImageGeometry {
    fn geometry(&self, _path: &Path, file: &File, sector_size: u64) -> Result<DiskGeometry> {
        let len = file.metadata()?.len();
        Ok(DiskGeometry::synthesize(len / sector_size.max(1)))
    }
}
