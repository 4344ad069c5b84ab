// OS/2 HPFS detector
use crate::fields::{has_bytes, le_u16, le_u32, u8_at};
use parthunt_core::{Confidence, Detector, Disk, Guess, Result, SectorAddress};

const OS2_SECTOR_SIZE: u64 = 512;
const SUPERBLOCK_SECTOR: u64 = 16;
const SUPERBLOCK_MAGIC: u32 = 0xF995_E849;

fn is_boot_block(window: &[u8]) -> bool {
    u8_at(window, 0x26) == Some(0x28)
        && has_bytes(window, 0x36, b"HPFS    ")
        && le_u16(window, 510) == Some(0xAA55)
        && le_u16(window, 11) == Some(OS2_SECTOR_SIZE as u16)
}

pub struct HpfsDetector;

impl Detector for HpfsDetector {
    fn name(&self) -> &str {
        "hpfs"
    }

    fn description(&self) -> &str {
        "OS/2 HPFS filesystem"
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(OS2_SECTOR_SIZE as usize)
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        if !is_boot_block(window) {
            return Ok(Guess::no());
        }

        let mut superblock = vec![0u8; OS2_SECTOR_SIZE as usize];
        let offset = sector * disk.sector_size() + SUPERBLOCK_SECTOR * OS2_SECTOR_SIZE;
        if disk.read_at(offset, &mut superblock)? < superblock.len() {
            return Ok(Guess::no());
        }
        if le_u32(&superblock, 0) != Some(SUPERBLOCK_MAGIC) {
            return Ok(Guess::no());
        }
        let n_sectors = le_u32(&superblock, 16).unwrap_or(0) as u64;
        let size = n_sectors * OS2_SECTOR_SIZE / disk.sector_size();
        Ok(Guess::new(Confidence::Yes, 0x07, sector, size))
    }
}
