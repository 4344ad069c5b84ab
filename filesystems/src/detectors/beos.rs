// BeOS BFS detector
use crate::fields::{le_i64, le_u32};
use parthunt_core::{Confidence, Detector, Disk, Guess, Result, SectorAddress};

const SUPERBLOCK_OFFSET: usize = 512;
const MAGIC1: u32 = 0x4246_5331;
const MAGIC2: u32 = 0xDD12_1031;
const MAGIC3: u32 = 0x15B6_830E;
const CLEAN: u32 = 0x434C_454E;
const DIRTY: u32 = 0x4449_5254;

/// Filesystem size in bytes.
fn inspect(window: &[u8]) -> Option<u64> {
    let sb = window.get(SUPERBLOCK_OFFSET..)?;
    if le_u32(sb, 32)? != MAGIC1 || le_u32(sb, 68)? != MAGIC2 || le_u32(sb, 112)? != MAGIC3 {
        return None;
    }

    let block_size = le_u32(sb, 40)?;
    let block_shift = le_u32(sb, 44)?;
    let num_blocks = le_i64(sb, 48)?;
    let used_blocks = le_i64(sb, 56)?;

    let sane = matches!(block_size, 1024 | 2048 | 4096 | 8192)
        && 1u32.checked_shl(block_shift) == Some(block_size)
        && num_blocks >= used_blocks
        && matches!(le_u32(sb, 84)?, CLEAN | DIRTY);
    if !sane {
        return None;
    }
    u64::try_from(num_blocks).ok()?.checked_mul(block_size as u64)
}

pub struct BeosDetector;

impl Detector for BeosDetector {
    fn name(&self) -> &str {
        "beos"
    }

    fn description(&self) -> &str {
        "BeOS BFS filesystem"
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(2 * SUPERBLOCK_OFFSET)
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        Ok(match inspect(window) {
            Some(bytes) => Guess::new(Confidence::Yes, 0xEB, sector, bytes / disk.sector_size()),
            None => Guess::no(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{put_le32, put_le64};

    fn window() -> Vec<u8> {
        let mut w = vec![0u8; 1024];
        let sb = SUPERBLOCK_OFFSET;
        put_le32(&mut w, sb + 32, MAGIC1);
        put_le32(&mut w, sb + 40, 2048);
        put_le32(&mut w, sb + 44, 11);
        put_le64(&mut w, sb + 48, 5000);
        put_le64(&mut w, sb + 56, 1200);
        put_le32(&mut w, sb + 68, MAGIC2);
        put_le32(&mut w, sb + 84, CLEAN);
        put_le32(&mut w, sb + 112, MAGIC3);
        w
    }

    #[test]
    fn test_detects_bfs() {
        assert_eq!(inspect(&window()), Some(5000 * 2048));
    }

    #[test]
    fn test_rejects_inconsistent_superblock() {
        let mut w = window();
        put_le32(&mut w, SUPERBLOCK_OFFSET + 44, 10);
        assert_eq!(inspect(&w), None);

        let mut w = window();
        put_le64(&mut w, SUPERBLOCK_OFFSET + 56, 5001);
        assert_eq!(inspect(&w), None);

        let mut w = window();
        put_le32(&mut w, SUPERBLOCK_OFFSET + 84, 0);
        assert_eq!(inspect(&w), None);

        let mut w = window();
        put_le32(&mut w, SUPERBLOCK_OFFSET + 112, 0);
        assert_eq!(inspect(&w), None);
    }
}
