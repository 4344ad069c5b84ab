// FAT12/16/32 boot sector detector
use crate::fields::{has_bytes, le_u16, le_u32, u8_at};
use parthunt_core::{Alignment, Capabilities, Confidence, Detector, Disk, Guess, Result, SectorAddress};

const BOOT_SECTOR_SIZE: usize = 512;
const EXTENDED_BOOT_SIGNATURE: u8 = 0x29;
/// Volumes at or above 32 MiB get the "big" FAT type codes.
const BIG_FAT_KIB: u64 = 32 * 1024;

/// Classify a FAT boot sector; `None` when the window does not hold one.
fn inspect(window: &[u8], sector_size: u64, lba: bool) -> Option<(u8, u64)> {
    if u8_at(window, 0)? != 0xEB || u8_at(window, 2)? != 0x90 {
        return None;
    }
    if !matches!(u8_at(window, 21)?, 0xF8 | 0xFC) {
        return None;
    }
    if le_u16(window, 510)? != 0xAA55 {
        return None;
    }
    if le_u16(window, 11)? as u64 != sector_size {
        return None;
    }

    let small = le_u16(window, 19)? as u64;
    let sectors = if small != 0 { small } else { le_u32(window, 32)? as u64 };
    if sectors == 0 {
        return None;
    }

    let fat12 = has_bytes(window, 0x39, b"12");
    let fat32 = le_u16(window, 22)? == 0;
    if fat12 && fat32 {
        return None;
    }
    let has_ext_signature = u8_at(window, 0x26)? == EXTENDED_BOOT_SIGNATURE;
    if fat32 == has_ext_signature {
        return None;
    }

    let kib = sectors * sector_size / 1024;
    let partition_type = if kib >= BIG_FAT_KIB {
        match (fat32, lba) {
            (true, true) => 0x0C,
            (true, false) => 0x0B,
            (false, _) => 0x06,
        }
    } else if fat12 {
        0x01
    } else {
        0x04
    };
    Some((partition_type, sectors))
}

pub struct FatDetector;

impl Detector for FatDetector {
    fn name(&self) -> &str {
        "fat"
    }

    fn description(&self) -> &str {
        "MS-DOS FAT12/16/32 filesystem"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            alignment: Alignment::Head,
            ..Capabilities::default()
        }
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(BOOT_SECTOR_SIZE)
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        Ok(match inspect(window, disk.sector_size(), disk.is_lba()) {
            Some((partition_type, size)) => Guess::new(Confidence::Yes, partition_type, sector, size),
            None => Guess::no(),
        })
    }
}
