// Linux swap space detector
use crate::fields::{has_bytes, le_u32, u8_at};
use parthunt_core::{Confidence, Detector, Disk, Guess, Result, SectorAddress};

const SIGNATURE_LEN: usize = 10;
/// Page sizes of the platforms that run Linux, smallest first.
const PAGE_SIZES: [usize; 2] = [4096, 8192];
/// mkswap refuses anything smaller.
const MIN_PAGES: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwapVersion {
    /// Old-style swap with a page bitmap, "SWAP-SPACE".
    V0,
    /// "SWAPSPACE2" with a header holding the last page.
    V1,
}

fn find_signature(window: &[u8]) -> Option<(SwapVersion, usize)> {
    [(SwapVersion::V0, &b"SWAP-SPACE"[..]), (SwapVersion::V1, &b"SWAPSPACE2"[..])]
        .iter()
        .find_map(|(version, sig)| {
            PAGE_SIZES
                .iter()
                .find(|&&page| has_bytes(window, page - SIGNATURE_LEN, sig))
                .map(|&page| (*version, page))
        })
}

/// Number of usable pages, read from the v0 bitmap.
fn bitmap_pages(window: &[u8], page_size: usize) -> Option<u64> {
    let bitmap = window.get(..page_size - SIGNATURE_LEN)?;
    let last = bitmap.iter().rposition(|&b| b != 0)?;
    Some(last as u64 * 8 + bitmap[last].trailing_ones() as u64)
}

/// Swap area size in bytes.
fn inspect(window: &[u8]) -> Option<u64> {
    let (version, page_size) = find_signature(window)?;
    let pages = match version {
        SwapVersion::V0 => {
            if u8_at(window, 0)? != 0xFE {
                return None;
            }
            bitmap_pages(window, page_size)?
        }
        SwapVersion::V1 => {
            if le_u32(window, 1024)? != 1 {
                return None;
            }
            le_u32(window, 1028)? as u64 + 1
        }
    };
    (pages >= MIN_PAGES).then_some(pages * page_size as u64)
}

pub struct SwapDetector;

impl Detector for SwapDetector {
    fn name(&self) -> &str {
        "lswap"
    }

    fn description(&self) -> &str {
        "Linux swap"
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(PAGE_SIZES[PAGE_SIZES.len() - 1])
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        Ok(match inspect(window) {
            Some(bytes) => Guess::new(Confidence::Yes, 0x82, sector, bytes / disk.sector_size()),
            None => Guess::no(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::put_le32;

    #[test]
    fn test_v1_swap() {
        let mut window = vec![0u8; 8192];
        put_le32(&mut window, 1024, 1);
        put_le32(&mut window, 1028, 255);
        window[4096 - 10..4096].copy_from_slice(b"SWAPSPACE2");
        assert_eq!(inspect(&window), Some(256 * 4096));
    }

    #[test]
    fn test_v1_swap_with_8k_pages() {
        let mut window = vec![0u8; 8192];
        put_le32(&mut window, 1024, 1);
        put_le32(&mut window, 1028, 99);
        window[8192 - 10..].copy_from_slice(b"SWAPSPACE2");
        assert_eq!(inspect(&window), Some(100 * 8192));
    }

    #[test]
    fn test_v0_swap_counts_bitmap() {
        let mut window = vec![0u8; 8192];
        window[0] = 0xFE;
        window[1] = 0xFF;
        window[2] = 0x07;
        window[4096 - 10..4096].copy_from_slice(b"SWAP-SPACE");
        // pages 1..=18 usable: last nonzero byte 2 holds three ones
        assert_eq!(inspect(&window), Some(19 * 4096));

        window[0] = 0xFC;
        assert_eq!(inspect(&window), None);
    }

    #[test]
    fn test_too_small_or_wrong_version() {
        let mut window = vec![0u8; 8192];
        put_le32(&mut window, 1024, 1);
        put_le32(&mut window, 1028, 5);
        window[4096 - 10..4096].copy_from_slice(b"SWAPSPACE2");
        assert_eq!(inspect(&window), None);

        put_le32(&mut window, 1028, 500);
        put_le32(&mut window, 1024, 2);
        assert_eq!(inspect(&window), None);
    }
}
