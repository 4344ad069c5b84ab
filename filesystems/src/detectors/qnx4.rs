// QNX4 filesystem detector
use crate::fields::{has_bytes, le_u32, u8_at};
use parthunt_core::{Capabilities, Confidence, Detector, Disk, Guess, Result, SectorAddress};

const BLOCK_SIZE: u64 = 512;
const BOOT_SIGNATURE: &[u8] = b"QNX4FS";
const BITMAP_NAME: &[u8] = b".bitmap";
const DIR_ENTRY_SIZE: usize = 64;
const ENTRIES_PER_BLOCK: usize = 8;
/// Upper bound on root directory blocks read per probe.
const MAX_ROOT_BLOCKS: u32 = 64;

/// Root directory extent (first block, zero-based; block count) from the
/// superblock's root inode.
fn root_extent(window: &[u8]) -> Option<(u64, u32)> {
    if !has_bytes(window, 4, BOOT_SIGNATURE) {
        return None;
    }
    let root = window.get(BLOCK_SIZE as usize..)?;
    if u8_at(root, 0)? != b'/' {
        return None;
    }
    let first = (le_u32(root, 20)? as u64).checked_sub(1)?;
    Some((first, le_u32(root, 24)?))
}

/// Size of the `.bitmap` file if this directory block lists it.
fn bitmap_size(block: &[u8]) -> Option<u32> {
    block
        .chunks_exact(DIR_ENTRY_SIZE)
        .take(ENTRIES_PER_BLOCK)
        .filter(|entry| entry.starts_with(BITMAP_NAME))
        .filter_map(|entry| le_u32(entry, 16))
        .last()
}

pub struct Qnx4Detector;

impl Detector for Qnx4Detector {
    fn name(&self) -> &str {
        "qnx4"
    }

    fn description(&self) -> &str {
        "QNX 4.x filesystem"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            excluded_inside_extended: true,
            ..Capabilities::default()
        }
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(2 * BLOCK_SIZE as usize)
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        let Some((first, blocks)) = root_extent(window) else {
            return Ok(Guess::no());
        };

        let base = sector * disk.sector_size();
        let mut block = vec![0u8; BLOCK_SIZE as usize];
        let mut bitmap = None;
        for j in 0..blocks.min(MAX_ROOT_BLOCKS) as u64 {
            if disk.read_at(base + (first + j) * BLOCK_SIZE, &mut block)? < block.len() {
                break;
            }
            if let Some(size) = bitmap_size(&block) {
                bitmap = Some(size);
            }
        }

        // Each bitmap byte covers eight blocks; the first six bits are reserved
        let blocks_total = bitmap.and_then(|size| (size as u64 * 8).checked_sub(6));
        Ok(match blocks_total {
            Some(total) => Guess::new(Confidence::Yes, 0x4F, sector, total * BLOCK_SIZE / disk.sector_size()),
            None => Guess::no(),
        })
    }
}
