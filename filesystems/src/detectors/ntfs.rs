// NTFS boot sector detector
use crate::fields::{has_bytes, i8_at, le_u16, le_u32, le_u64, u8_at};
use parthunt_core::{Capabilities, Confidence, Detector, Disk, Guess, Result, SectorAddress};

const BOOT_SECTOR_SIZE: usize = 512;
const NTFS_OEM_ID: &[u8] = b"NTFS";

/// Filesystem size in sectors, not counting a trailing backup boot sector.
fn inspect(window: &[u8], sector_size: u64) -> Option<u64> {
    if !has_bytes(window, 3, NTFS_OEM_ID) {
        return None;
    }
    if le_u32(window, 0x40)? > 256 || le_u32(window, 0x44)? > 256 {
        return None;
    }

    let bytes_per_sector = le_u16(window, 0x0B)? as u64;
    let cluster_factor = u8_at(window, 0x0D)? as u64;
    if cluster_factor == 0 {
        return None;
    }
    let mft_clusters_per_record = i8_at(window, 0x40)?;
    if mft_clusters_per_record < 0 && mft_clusters_per_record != -10 {
        return None;
    }

    let fs_sectors = le_u64(window, 0x28)?;
    let bytes = (fs_sectors / cluster_factor).checked_mul(bytes_per_sector * cluster_factor)?;
    let size = bytes / sector_size;
    (size > 0).then_some(size)
}

pub struct NtfsDetector;

impl Detector for NtfsDetector {
    fn name(&self) -> &str {
        "ntfs"
    }

    fn description(&self) -> &str {
        "Windows NT/2000/XP NTFS filesystem"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            resembles_sector0_table: true,
            ..Capabilities::default()
        }
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(BOOT_SECTOR_SIZE)
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        let Some(mut size) = inspect(window, disk.sector_size()) else {
            return Ok(Guess::no());
        };
        if sector.checked_add(size).map_or(true, |end| end > disk.total_sectors()) {
            return Ok(Guess::no());
        }

        // NT4 keeps a copy of the boot sector just past the volume; it belongs to it
        let mut backup = vec![0u8; BOOT_SECTOR_SIZE];
        let offset = (sector + size) * disk.sector_size();
        if disk.read_at(offset, &mut backup)? == BOOT_SECTOR_SIZE && backup[..] == window[..BOOT_SECTOR_SIZE] {
            size += 1;
        }
        Ok(Guess::new(Confidence::Yes, 0x07, sector, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{blank_image, memory_disk, put_le16, put_le32, put_le64};

    fn boot_sector(fs_sectors: u64) -> Vec<u8> {
        let mut bs = vec![0u8; 512];
        bs[0] = 0xEB;
        bs[1] = 0x52;
        bs[2] = 0x90;
        bs[3..11].copy_from_slice(b"NTFS    ");
        put_le16(&mut bs, 0x0B, 512);
        bs[0x0D] = 8;
        put_le64(&mut bs, 0x28, fs_sectors);
        put_le32(&mut bs, 0x40, 0xF6);
        put_le32(&mut bs, 0x44, 1);
        put_le16(&mut bs, 510, 0xAA55);
        bs
    }

    #[test]
    fn test_size_rounds_to_whole_clusters() {
        assert_eq!(inspect(&boot_sector(1023), 512), Some(1016));
    }

    #[test]
    fn test_rejects_bad_record_sizes() {
        let mut bs = boot_sector(1024);
        put_le32(&mut bs, 0x40, 0xF0);
        assert_eq!(inspect(&bs, 512), None);

        let mut bs = boot_sector(1024);
        put_le32(&mut bs, 0x44, 0x1000);
        assert_eq!(inspect(&bs, 512), None);

        let mut bs = boot_sector(1024);
        bs[0x0D] = 0;
        assert_eq!(inspect(&bs, 512), None);
    }

    #[test]
    fn test_huge_sector_count_rejected() {
        assert_eq!(inspect(&boot_sector(u64::MAX), 512), None);

        // Fits in u64 but not on the disk
        let bs = boot_sector(1 << 40);
        let mut image = blank_image(64);
        image[..512].copy_from_slice(&bs);
        let mut disk = memory_disk(image);
        let guess = NtfsDetector.probe(&mut disk, &bs, 0).unwrap();
        assert_eq!(guess.confidence, Confidence::No);
    }

    #[test]
    fn test_backup_boot_sector_is_counted() {
        let bs = boot_sector(64);
        let mut image = blank_image(256);
        image[32 * 512..33 * 512].copy_from_slice(&bs);
        image[96 * 512..97 * 512].copy_from_slice(&bs);
        let mut disk = memory_disk(image);

        let guess = NtfsDetector.probe(&mut disk, &bs, 32).unwrap();
        assert_eq!(guess.confidence, Confidence::Yes);
        assert_eq!(guess.entry.partition_type, 0x07);
        assert_eq!(guess.entry.size, 65);

        let mut image = blank_image(256);
        image[32 * 512..33 * 512].copy_from_slice(&bs);
        let mut disk = memory_disk(image);
        assert_eq!(NtfsDetector.probe(&mut disk, &bs, 32).unwrap().entry.size, 64);
    }
}
