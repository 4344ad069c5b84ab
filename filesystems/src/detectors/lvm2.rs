// LVM2 physical volume label detector
use crate::fields::{has_bytes, le_u32, le_u64};
use parthunt_core::{Confidence, Detector, Disk, Guess, Result, SectorAddress};

/// The label lives in the second 512-byte sector of the volume.
const LABEL_OFFSET: usize = 512;
const LABEL_ID: &[u8] = b"LABELONE";
const LVM2_TYPE: &[u8] = b"LVM2 001";
const PV_UUID_LEN: usize = 32;

/// Physical volume size in bytes.
fn inspect(window: &[u8]) -> Option<u64> {
    let label = window.get(LABEL_OFFSET..)?;
    if !has_bytes(label, 0, LABEL_ID) || !has_bytes(label, 24, LVM2_TYPE) {
        return None;
    }
    let pv_header = le_u32(label, 20)? as usize;
    le_u64(label, pv_header.checked_add(PV_UUID_LEN)?)
}

pub struct Lvm2Detector;

impl Detector for Lvm2Detector {
    fn name(&self) -> &str {
        "lvm2"
    }

    fn description(&self) -> &str {
        "Linux LVM2 physical volume"
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(2 * LABEL_OFFSET)
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        let Some(bytes) = inspect(window) else {
            return Ok(Guess::no());
        };
        let size = bytes / disk.sector_size();
        if size > disk.total_sectors().saturating_sub(sector) {
            return Ok(Guess::no());
        }
        Ok(Guess::new(Confidence::Yes, 0x8E, sector, size))
    }
}
