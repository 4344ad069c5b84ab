// SGI XFS detector (big-endian superblock)
use crate::fields::{be_u16, be_u32, be_u64, has_bytes, u8_at};
use parthunt_core::{Confidence, Detector, Disk, Guess, Result, SectorAddress};

const SUPERBLOCK_LEN: usize = 512;
const XFS_MAGIC: &[u8] = b"XFSB";
const MIN_BLOCK_SIZE: u32 = 512;
const MAX_BLOCK_SIZE: u32 = 65536;
const MIN_INODE_SIZE: u16 = 256;
const MAX_INODE_SIZE: u16 = 2048;

/// Data section size in bytes, excluding an internal log.
fn inspect(sb: &[u8]) -> Option<u64> {
    if !has_bytes(sb, 0, XFS_MAGIC) {
        return None;
    }
    let block_size = be_u32(sb, 4)?;
    if !block_size.is_power_of_two() || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
        return None;
    }
    if u8_at(sb, 127)? > 100 || be_u16(sb, 102)? == 0 {
        return None;
    }
    let inode_size = be_u16(sb, 104)?;
    if !(MIN_INODE_SIZE..=MAX_INODE_SIZE).contains(&inode_size) {
        return None;
    }
    let block_log = u8_at(sb, 120)? as u32;
    if 1u32.checked_shl(block_log) != Some(block_size) {
        return None;
    }

    let log_blocks = if be_u64(sb, 48)? != 0 { be_u32(sb, 96)? as u64 } else { 0 };
    let data_blocks = be_u64(sb, 8)?.checked_sub(log_blocks)?;
    data_blocks.checked_mul(block_size as u64)
}

pub struct XfsDetector;

impl Detector for XfsDetector {
    fn name(&self) -> &str {
        "xfs"
    }

    fn description(&self) -> &str {
        "XFS filesystem"
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(SUPERBLOCK_LEN)
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        Ok(match inspect(window) {
            Some(bytes) => Guess::new(Confidence::Yes, 0x83, sector, bytes / disk.sector_size()),
            None => Guess::no(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{put_be16, put_be32, put_be64};

    fn superblock() -> Vec<u8> {
        let mut sb = vec![0u8; 512];
        sb[0..4].copy_from_slice(XFS_MAGIC);
        put_be32(&mut sb, 4, 4096);
        put_be64(&mut sb, 8, 10000);
        put_be64(&mut sb, 48, 5000);
        put_be32(&mut sb, 96, 1000);
        put_be16(&mut sb, 102, 512);
        put_be16(&mut sb, 104, 256);
        sb[120] = 12;
        sb[127] = 25;
        sb
    }

    #[test]
    fn test_internal_log_is_excluded() {
        assert_eq!(inspect(&superblock()), Some(9000 * 4096));

        let mut sb = superblock();
        put_be64(&mut sb, 48, 0);
        assert_eq!(inspect(&sb), Some(10000 * 4096));
    }

    #[test]
    fn test_rejects_inconsistent_block_size() {
        let mut sb = superblock();
        sb[120] = 11;
        assert_eq!(inspect(&sb), None);

        let mut sb = superblock();
        put_be32(&mut sb, 4, 3000);
        assert_eq!(inspect(&sb), None);

        let mut sb = superblock();
        put_be16(&mut sb, 104, 128);
        assert_eq!(inspect(&sb), None);

        let mut sb = superblock();
        sb[127] = 101;
        assert_eq!(inspect(&sb), None);
    }
}
