// Solaris x86 VTOC detector
use crate::fields::{le_u16, le_u32};
use parthunt_core::{Capabilities, Confidence, Detector, Disk, Guess, Result, SectorAddress};

const VTOC_OFFSET: usize = 512;
const VTOC_SANE: u32 = 0x600D_DEEE;
const VTOC_VERSION: u32 = 1;
const SLICES_OFFSET: usize = 72;
const SLICE_SIZE: usize = 12;
const NUM_SLICES: usize = 8;
const TAG_ROOT: u16 = 0x02;
const TAG_BACKUP: u16 = 0x05;
const FLAG_UNMOUNTABLE: u16 = 0x01;
const FLAG_READ_ONLY: u16 = 0x10;
const WINDOW_SIZE: usize = VTOC_OFFSET + SLICES_OFFSET + NUM_SLICES * SLICE_SIZE + 160;

#[derive(Debug, Clone, Copy)]
struct Slice {
    tag: u16,
    flag: u16,
    start: u64,
    size: u64,
}

impl Slice {
    fn parse(raw: &[u8]) -> Option<Self> {
        Some(Self {
            tag: le_u16(raw, 0)?,
            flag: le_u16(raw, 2)?,
            start: le_u32(raw, 4)? as u64,
            size: le_u32(raw, 8)? as u64,
        })
    }

    fn has_known_flags(&self) -> bool {
        matches!(self.flag, 0 | FLAG_UNMOUNTABLE | FLAG_READ_ONLY)
    }
}

/// The backup slice covering the whole Solaris partition, as (start, size).
fn inspect(window: &[u8], sector_size: u64, sector: SectorAddress, total_sectors: u64) -> Option<(u64, u64)> {
    let vtoc = window.get(VTOC_OFFSET..)?;
    if le_u32(vtoc, 12)? != VTOC_SANE || le_u32(vtoc, 16)? != VTOC_VERSION {
        return None;
    }

    let mut root = None;
    let mut backup = None;
    for i in 0..NUM_SLICES {
        let slice = Slice::parse(vtoc.get(SLICES_OFFSET + i * SLICE_SIZE..)?)?;
        match slice.tag {
            TAG_ROOT => root = Some(slice),
            TAG_BACKUP => backup = Some(slice),
            _ => {}
        }
    }
    let (root, backup) = (root?, backup?);

    let fits = |s: &Slice| sector + s.start + s.size <= total_sectors;
    let sane = le_u16(vtoc, 28)? as u64 == sector_size
        && fits(&backup)
        && fits(&root)
        && root.start >= backup.start
        && root.size <= backup.size
        && backup.has_known_flags()
        && root.has_known_flags();
    sane.then_some((sector + backup.start, backup.size))
}

pub struct SolarisVtocDetector;

impl Detector for SolarisVtocDetector {
    fn name(&self) -> &str {
        "s86dl"
    }

    fn description(&self) -> &str {
        "Solaris/x86 disklabel"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            excluded_inside_extended: true,
            ..Capabilities::default()
        }
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(WINDOW_SIZE)
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        Ok(match inspect(window, disk.sector_size(), sector, disk.total_sectors()) {
            Some((start, size)) => Guess::new(Confidence::Yes, 0x82, start, size),
            None => Guess::no(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{put_le16, put_le32};

    fn put_slice(w: &mut [u8], index: usize, tag: u16, flag: u16, start: u32, size: u32) {
        let s = VTOC_OFFSET + SLICES_OFFSET + index * SLICE_SIZE;
        put_le16(w, s, tag);
        put_le16(w, s + 2, flag);
        put_le32(w, s + 4, start);
        put_le32(w, s + 8, size);
    }

    fn window() -> Vec<u8> {
        let mut w = vec![0u8; WINDOW_SIZE];
        put_le32(&mut w, VTOC_OFFSET + 12, VTOC_SANE);
        put_le32(&mut w, VTOC_OFFSET + 16, VTOC_VERSION);
        put_le16(&mut w, VTOC_OFFSET + 28, 512);
        put_slice(&mut w, 0, TAG_ROOT, 0, 100, 5000);
        put_slice(&mut w, 1, 0x03, 0, 5100, 1000);
        put_slice(&mut w, 2, TAG_BACKUP, FLAG_UNMOUNTABLE, 0, 8000);
        w
    }

    #[test]
    fn test_backup_slice_becomes_partition() {
        assert_eq!(inspect(&window(), 512, 1000, 100_000), Some((1000, 8000)));
    }

    #[test]
    fn test_slices_must_fit_on_disk() {
        assert_eq!(inspect(&window(), 512, 1000, 8999), None);
    }

    #[test]
    fn test_requires_root_and_backup() {
        let mut w = window();
        put_slice(&mut w, 0, 0x04, 0, 100, 5000);
        assert_eq!(inspect(&w, 512, 1000, 100_000), None);

        let mut w = window();
        put_slice(&mut w, 2, TAG_BACKUP, 0x02, 0, 8000);
        assert_eq!(inspect(&w, 512, 1000, 100_000), None);

        assert_eq!(inspect(&window(), 1024, 1000, 100_000), None);
    }
}
