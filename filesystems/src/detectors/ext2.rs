// ext2/ext3/ext4 superblock detector
use crate::fields::{le_i16, le_u16, le_u32};
use parthunt_core::{Confidence, Detector, Disk, Guess, Result, SectorAddress};

const SUPERBLOCK_OFFSET: usize = 1024;
const SUPERBLOCK_SIZE: usize = 1024;
const EXT2_MAGIC: u16 = 0xEF53;
const STATE_VALID: u16 = 0x0001;
const STATE_ERROR: u16 = 0x0002;

#[derive(Debug, Clone, Copy)]
struct Ext2Superblock {
    inodes: u32,
    blocks: u32,
    free_blocks: u32,
    free_inodes: u32,
    first_data_block: u32,
    log_block_size: u32,
    blocks_per_group: u32,
    mount_count: u16,
    max_mount_count: i16,
    magic: u16,
    state: u16,
    errors: u16,
}

impl Ext2Superblock {
    fn parse(raw: &[u8]) -> Option<Self> {
        Some(Self {
            inodes: le_u32(raw, 0)?,
            blocks: le_u32(raw, 4)?,
            free_blocks: le_u32(raw, 12)?,
            free_inodes: le_u32(raw, 16)?,
            first_data_block: le_u32(raw, 20)?,
            log_block_size: le_u32(raw, 24)?,
            blocks_per_group: le_u32(raw, 32)?,
            mount_count: le_u16(raw, 52)?,
            max_mount_count: le_i16(raw, 54)?,
            magic: le_u16(raw, 56)?,
            state: le_u16(raw, 58)?,
            errors: le_u16(raw, 60)?,
        })
    }

    fn block_size(&self) -> Option<u64> {
        match self.log_block_size {
            0..=2 => Some(1024 << self.log_block_size),
            _ => None,
        }
    }

    /// Field plausibility, independent of where the superblock was found.
    fn is_plausible(&self) -> bool {
        self.magic == EXT2_MAGIC
            && self.blocks != 0
            && self.free_blocks < self.blocks
            && self.free_inodes < self.inodes
            && self.errors <= 3
            && self.state & !(STATE_VALID | STATE_ERROR) == 0
            && self.block_size().is_some()
            && (self.mount_count as i32) <= self.max_mount_count as i32 + 20
    }
}

pub struct Ext2Detector;

impl Detector for Ext2Detector {
    fn name(&self) -> &str {
        "ext2"
    }

    fn description(&self) -> &str {
        "Linux ext2/ext3/ext4 filesystem"
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(SUPERBLOCK_OFFSET + SUPERBLOCK_SIZE)
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        let sb = match window.get(SUPERBLOCK_OFFSET..).and_then(Ext2Superblock::parse) {
            Some(sb) if sb.is_plausible() => sb,
            _ => return Ok(Guess::no()),
        };
        let block_size = sb.block_size().unwrap_or(1024);
        let ssize = disk.sector_size();
        let size = sb.blocks as u64 * block_size / ssize;
        if sector + size > disk.total_sectors() {
            return Ok(Guess::no());
        }

        // The first backup superblock sits at the start of block group 1
        let spare_offset =
            sector * ssize + (sb.blocks_per_group as u64 + sb.first_data_block as u64) * block_size;
        let mut spare = vec![0u8; SUPERBLOCK_SIZE];
        if disk.read_at(spare_offset, &mut spare)? < SUPERBLOCK_SIZE {
            return Ok(Guess::no());
        }
        match Ext2Superblock::parse(&spare) {
            Some(backup) if backup.magic == EXT2_MAGIC && backup.log_block_size == sb.log_block_size => {
                Ok(Guess::new(Confidence::Yes, 0x83, sector, size))
            }
            _ => Ok(Guess::no()),
        }
    }
}

/// Write a minimal ext2 superblock into `buf` at `offset`.
#[cfg(test)]
pub(crate) fn write_superblock(buf: &mut [u8], offset: usize, blocks: u32, log_block_size: u32, blocks_per_group: u32) {
    use crate::test_helpers::{put_le16, put_le32};
    put_le32(buf, offset, 1024);
    put_le32(buf, offset + 4, blocks);
    put_le32(buf, offset + 12, blocks / 2);
    put_le32(buf, offset + 16, 1000);
    put_le32(buf, offset + 20, if log_block_size == 0 { 1 } else { 0 });
    put_le32(buf, offset + 24, log_block_size);
    put_le32(buf, offset + 32, blocks_per_group);
    put_le16(buf, offset + 52, 3);
    put_le16(buf, offset + 54, 20);
    put_le16(buf, offset + 56, EXT2_MAGIC);
    put_le16(buf, offset + 58, STATE_VALID);
    put_le16(buf, offset + 60, 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{blank_image, memory_disk, put_le16};

    const START: usize = 64;

    /// 1 KiB blocks, 8 blocks per group, 16 blocks in total.
    fn image_with_ext2(with_spare: bool) -> Vec<u8> {
        let mut image = blank_image(256);
        write_superblock(&mut image, START * 512 + 1024, 16, 0, 8);
        if with_spare {
            // group 1 starts at block 8 + 1
            write_superblock(&mut image, START * 512 + 9 * 1024, 16, 0, 8);
        }
        image
    }

    fn probe(image: Vec<u8>) -> Guess {
        let window = image[START * 512..START * 512 + 2048].to_vec();
        let mut disk = memory_disk(image);
        Ext2Detector.probe(&mut disk, &window, START as u64).unwrap()
    }

    #[test]
    fn test_detects_ext2_with_spare_superblock() {
        let guess = probe(image_with_ext2(true));
        assert_eq!(guess.confidence, Confidence::Yes);
        assert_eq!(guess.entry.partition_type, 0x83);
        assert_eq!(guess.entry.start, START as u64);
        assert_eq!(guess.entry.size, 32);
    }

    #[test]
    fn test_missing_spare_superblock() {
        assert_eq!(probe(image_with_ext2(false)).confidence, Confidence::No);
    }

    #[test]
    fn test_rejects_bad_fields() {
        let mut image = image_with_ext2(true);
        // free blocks >= blocks
        put_le16(&mut image, START * 512 + 1024 + 12, 16);
        assert_eq!(probe(image).confidence, Confidence::No);

        let mut image = image_with_ext2(true);
        // unknown state bits
        put_le16(&mut image, START * 512 + 1024 + 58, 0x10);
        assert_eq!(probe(image).confidence, Confidence::No);
    }

    #[test]
    fn test_rejects_filesystem_past_end_of_disk() {
        let mut image = image_with_ext2(true);
        crate::test_helpers::put_le32(&mut image, START * 512 + 1024 + 4, 10_000);
        assert_eq!(probe(image).confidence, Confidence::No);
    }
}
