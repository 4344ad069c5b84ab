// BSD disklabel detector
use crate::fields::{le_u16, le_u32};
use parthunt_core::{Capabilities, Confidence, Detector, Disk, Guess, Result, SectorAddress};

const DISK_MAGIC: u32 = 0x8256_4557;
const MAGIC2_OFFSET: usize = 132;
const CHECKSUM_OFFSET: usize = 136;
const NPARTITIONS_OFFSET: usize = 138;
const PARTITIONS_OFFSET: usize = 148;
const PARTITION_SIZE: usize = 16;
const MAX_PARTITIONS: usize = 16;
/// Partition 'c' spans the whole slice.
const RAW_PART: usize = 2;
const WINDOW_SIZE: usize = 8192;

/// XOR of the little-endian words of the label with its checksum field zeroed.
fn label_checksum(label: &[u8]) -> u16 {
    label
        .chunks_exact(2)
        .enumerate()
        .filter(|(i, _)| i * 2 != CHECKSUM_OFFSET)
        .fold(0, |sum, (_, word)| sum ^ u16::from_le_bytes([word[0], word[1]]))
}

/// (offset, size) of the raw partition of a label found at `sector`.
fn inspect(window: &[u8], sector_size: usize, sector: SectorAddress) -> Option<(u64, u64)> {
    let label = window.get(sector_size..)?;
    if le_u32(label, 0)? != DISK_MAGIC || le_u32(label, MAGIC2_OFFSET)? != DISK_MAGIC {
        return None;
    }
    let npartitions = le_u16(label, NPARTITIONS_OFFSET)? as usize;
    if npartitions <= RAW_PART || npartitions > MAX_PARTITIONS {
        return None;
    }

    let label = label.get(..PARTITIONS_OFFSET + npartitions * PARTITION_SIZE)?;
    if label_checksum(label) != le_u16(label, CHECKSUM_OFFSET)? {
        return None;
    }

    let raw = PARTITIONS_OFFSET + RAW_PART * PARTITION_SIZE;
    let size = le_u32(label, raw)? as u64;
    let offset = le_u32(label, raw + 4)? as u64;
    (offset == sector).then_some((offset, size))
}

pub struct BsdDisklabelDetector;

impl Detector for BsdDisklabelDetector {
    fn name(&self) -> &str {
        "bsddl"
    }

    fn description(&self) -> &str {
        "*BSD disklabel"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            resembles_sector0_table: true,
            excluded_inside_extended: true,
            ..Capabilities::default()
        }
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(WINDOW_SIZE)
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        Ok(match inspect(window, disk.sector_size() as usize, sector) {
            Some((offset, size)) => Guess::new(Confidence::Yes, 0xA5, offset, size),
            None => Guess::no(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{put_le16, put_le32};

    fn window(slice_start: u32) -> Vec<u8> {
        let mut w = vec![0u8; WINDOW_SIZE];
        let label = 512;
        put_le32(&mut w, label, DISK_MAGIC);
        put_le32(&mut w, label + MAGIC2_OFFSET, DISK_MAGIC);
        put_le16(&mut w, label + NPARTITIONS_OFFSET, 8);
        for (i, (size, offset)) in [(1000, slice_start), (500, slice_start + 1000), (4000, slice_start)]
            .iter()
            .enumerate()
        {
            let p = label + PARTITIONS_OFFSET + i * PARTITION_SIZE;
            put_le32(&mut w, p, *size);
            put_le32(&mut w, p + 4, *offset);
        }
        let sum = label_checksum(&w[label..label + PARTITIONS_OFFSET + 8 * PARTITION_SIZE]);
        put_le16(&mut w, label + CHECKSUM_OFFSET, sum);
        w
    }

    #[test]
    fn test_detects_label_at_slice_start() {
        assert_eq!(inspect(&window(63), 512, 63), Some((63, 4000)));
    }

    #[test]
    fn test_raw_partition_must_start_here() {
        assert_eq!(inspect(&window(63), 512, 64), None);
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut w = window(63);
        w[512 + PARTITIONS_OFFSET + 3] ^= 0x40;
        assert_eq!(inspect(&w, 512, 63), None);
    }
}
