// ReiserFS 3.5/3.6 detector
use crate::fields::{bytes_at, le_u16, le_u32};
use parthunt_core::{Confidence, Detector, Disk, Guess, Result, SectorAddress};

const SUPERBLOCK_OFFSET: usize = 64 * 1024;
const SUPERBLOCK_LEN: usize = 76;
const MAGIC_LEN: usize = 12;
const MAGICS: [&[u8]; 2] = [b"ReIsErFs", b"ReIsEr2Fs"];
const MIN_BLOCKS: u32 = 100;

/// Magic compared as a NUL-terminated string within its 12-byte field.
fn has_magic(field: &[u8]) -> bool {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    MAGICS.iter().any(|magic| &field[..end] == *magic)
}

/// Filesystem size in bytes.
fn inspect(window: &[u8]) -> Option<u64> {
    let sb = window.get(SUPERBLOCK_OFFSET..SUPERBLOCK_OFFSET + SUPERBLOCK_LEN)?;
    if !has_magic(bytes_at(sb, 52, MAGIC_LEN)?) {
        return None;
    }

    let block_count = le_u32(sb, 0)?;
    let free_blocks = le_u32(sb, 4)?;
    let block_size = le_u16(sb, 44)?;
    let oid_max = le_u16(sb, 46)?;
    let oid_cur = le_u16(sb, 48)?;
    let state = le_u16(sb, 50)?;

    let sane = block_count >= free_blocks
        && block_count >= MIN_BLOCKS
        && matches!(state, 1 | 2)
        && oid_max % 2 == 0
        && oid_max >= oid_cur
        && matches!(block_size, 4096 | 8192);
    sane.then_some(block_count as u64 * block_size as u64)
}

pub struct ReiserfsDetector;

impl Detector for ReiserfsDetector {
    fn name(&self) -> &str {
        "reiserfs"
    }

    fn description(&self) -> &str {
        "ReiserFS filesystem"
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(SUPERBLOCK_OFFSET + SUPERBLOCK_LEN)
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        Ok(match inspect(window) {
            Some(bytes) => Guess::new(Confidence::Yes, 0x83, sector, bytes / disk.sector_size()),
            None => Guess::no(),
        })
    }
}
