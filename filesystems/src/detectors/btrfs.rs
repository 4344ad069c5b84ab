// Btrfs detector
use crate::fields::{bytes_at, has_bytes, le_u64};
use parthunt_core::{Confidence, Detector, Disk, Guess, Result, SectorAddress};

const PRIMARY_SUPERBLOCK: usize = 0x10000;
const SUPERBLOCK_LEN: usize = 4096;
/// First superblock mirror, relative to the filesystem start.
const MIRROR_OFFSET: u64 = 64 * 1024 * 1024;
const BTRFS_MAGIC: &[u8] = b"_BHRfS_M";
const FSID_OFFSET: usize = 32;
const FSID_LEN: usize = 16;
const MAGIC_OFFSET: usize = 64;
const DEV_TOTAL_BYTES_OFFSET: usize = 201 + 8;
const DEV_FSID_OFFSET: usize = 201 + 82;

/// Device size in bytes and the filesystem id.
fn inspect(sb: &[u8]) -> Option<(u64, &[u8])> {
    if !has_bytes(sb, MAGIC_OFFSET, BTRFS_MAGIC) {
        return None;
    }
    let fsid = bytes_at(sb, FSID_OFFSET, FSID_LEN)?;
    if bytes_at(sb, DEV_FSID_OFFSET, FSID_LEN)? != fsid {
        return None;
    }
    Some((le_u64(sb, DEV_TOTAL_BYTES_OFFSET)?, fsid))
}

pub struct BtrfsDetector;

impl Detector for BtrfsDetector {
    fn name(&self) -> &str {
        "btrfs"
    }

    fn description(&self) -> &str {
        "Btrfs filesystem"
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(PRIMARY_SUPERBLOCK + SUPERBLOCK_LEN)
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        let Some((total_bytes, fsid)) = window.get(PRIMARY_SUPERBLOCK..).and_then(inspect) else {
            return Ok(Guess::no());
        };

        if total_bytes > MIRROR_OFFSET {
            let mut mirror = vec![0u8; SUPERBLOCK_LEN];
            disk.read_at(sector * disk.sector_size() + MIRROR_OFFSET, &mut mirror)?;
            let matches = has_bytes(&mirror, MAGIC_OFFSET, BTRFS_MAGIC)
                && bytes_at(&mirror, FSID_OFFSET, FSID_LEN) == Some(fsid);
            if !matches {
                log::info!("btrfs: superblock mirror mismatch at sector {}", sector);
                return Ok(Guess::no());
            }
        }
        Ok(Guess::new(Confidence::Yes, 0x83, sector, total_bytes / disk.sector_size()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{blank_image, memory_disk, put_le64};

    fn superblock(total_bytes: u64) -> Vec<u8> {
        let mut sb = vec![0u8; SUPERBLOCK_LEN];
        sb[FSID_OFFSET..FSID_OFFSET + FSID_LEN].copy_from_slice(&[0x5A; FSID_LEN]);
        sb[DEV_FSID_OFFSET..DEV_FSID_OFFSET + FSID_LEN].copy_from_slice(&[0x5A; FSID_LEN]);
        sb[MAGIC_OFFSET..MAGIC_OFFSET + 8].copy_from_slice(BTRFS_MAGIC);
        put_le64(&mut sb, DEV_TOTAL_BYTES_OFFSET, total_bytes);
        sb
    }

    #[test]
    fn test_small_filesystem_needs_no_mirror() {
        let mut window = vec![0u8; PRIMARY_SUPERBLOCK];
        window.extend(superblock(1024 * 1024));
        let mut disk = memory_disk(blank_image(8));
        let guess = BtrfsDetector.probe(&mut disk, &window, 0).unwrap();
        assert_eq!(guess.confidence, Confidence::Yes);
        assert_eq!(guess.entry.size, 2048);
    }

    #[test]
    fn test_fsid_mismatch() {
        let mut sb = superblock(1024 * 1024);
        sb[DEV_FSID_OFFSET] = 0;
        assert!(inspect(&sb).is_none());
    }

    #[test]
    fn test_large_filesystem_checks_mirror() {
        let total = MIRROR_OFFSET + 1024 * 1024;
        let mut window = vec![0u8; PRIMARY_SUPERBLOCK];
        window.extend(superblock(total));

        let mut image = vec![0u8; (MIRROR_OFFSET as usize) + SUPERBLOCK_LEN];
        let mut disk = memory_disk(image.clone());
        assert_eq!(BtrfsDetector.probe(&mut disk, &window, 0).unwrap().confidence, Confidence::No);

        image[MIRROR_OFFSET as usize..].copy_from_slice(&superblock(total));
        let mut disk = memory_disk(image);
        assert_eq!(BtrfsDetector.probe(&mut disk, &window, 0).unwrap().confidence, Confidence::Yes);
    }
}
