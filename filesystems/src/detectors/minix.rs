// Minix v1/v2 filesystem detector
use crate::fields::{le_u16, le_u32};
use parthunt_core::{Confidence, Detector, Disk, Guess, Result, SectorAddress};

const BLOCK_SIZE: usize = 1024;
/// On-disk superblock length; the rest of its block must be zero.
const SUPERBLOCK_LEN: usize = 24;
const VALID_FS: u16 = 1;
const ERROR_FS: u16 = 2;

/// (partition type, size in bytes)
fn inspect(window: &[u8]) -> Option<(u8, u64)> {
    let sb = window.get(BLOCK_SIZE..2 * BLOCK_SIZE)?;
    let v2 = match le_u16(sb, 16)? {
        0x137F | 0x138F => false,
        0x2468 | 0x2478 => true,
        _ => return None,
    };
    if !matches!(le_u16(sb, 18)?, VALID_FS | ERROR_FS) {
        return None;
    }
    if sb[SUPERBLOCK_LEN..].iter().any(|&b| b != 0) {
        return None;
    }

    let zones = if v2 { le_u32(sb, 20)? as u64 } else { le_u16(sb, 2)? as u64 };
    let log_zone_size = le_u16(sb, 10)? as u32;
    let bytes = zones.checked_shl(log_zone_size)?.checked_mul(BLOCK_SIZE as u64)?;
    Some((if v2 { 0x81 } else { 0x80 }, bytes))
}

pub struct MinixDetector;

impl Detector for MinixDetector {
    fn name(&self) -> &str {
        "minix"
    }

    fn description(&self) -> &str {
        "Minix filesystem"
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(2 * BLOCK_SIZE)
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        Ok(match inspect(window) {
            Some((partition_type, bytes)) => {
                Guess::new(Confidence::Yes, partition_type, sector, bytes / disk.sector_size())
            }
            None => Guess::no(),
        })
    }
}
