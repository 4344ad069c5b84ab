// LVM1 ("HM" volume manager) physical volume detector
use crate::fields::{c_str_len, has_bytes, le_u16, le_u32};
use parthunt_core::{Confidence, Detector, Disk, Guess, Result, SectorAddress};

const PV_DISK_SIZE: usize = 1024;
const LVM_ID: &[u8] = b"HM";
const NAME_LEN: usize = 128;
/// 1 TiB in 512-byte sectors.
const MAX_PV_SECTORS: u32 = 1024 * 1024 * 1024 * 2;
const MAX_LV: u32 = 256;
const MIN_PE_SIZE: u32 = 8 * 2;
const MAX_PE_SIZE: u32 = 16 * 1024 * 1024 * 2;
const PV_ACTIVE: u32 = 0x01;
const PV_ALLOCATABLE: u32 = 0x02;
/// On-disk physical extent map entry: lv_num + le_num.
const DISK_PE_SIZE: u32 = 4;

/// Physical volume size in 512-byte sectors.
fn inspect(pv: &[u8]) -> Option<u64> {
    if !has_bytes(pv, 0, LVM_ID) || !matches!(le_u16(pv, 2)?, 1 | 2) {
        return None;
    }

    let pe_on_disk_size = le_u32(pv, 40)?;
    let pv_status = le_u32(pv, 436)?;
    let pv_allocatable = le_u32(pv, 440)?;
    let pv_size = le_u32(pv, 444)?;
    let lv_cur = le_u32(pv, 448)?;
    let pe_size = le_u32(pv, 452)?;
    let pe_total = le_u32(pv, 456)?;
    let pe_allocated = le_u32(pv, 460)?;

    let sane = pv_size <= MAX_PV_SECTORS
        && matches!(pv_status, 0 | PV_ACTIVE)
        && matches!(pv_allocatable, 0 | PV_ALLOCATABLE)
        && lv_cur <= MAX_LV
        && c_str_len(pv, 172, NAME_LEN)? <= NAME_LEN / 2
        && pe_size % MIN_PE_SIZE == 0
        && (MIN_PE_SIZE..=MAX_PE_SIZE).contains(&pe_size)
        && pe_total <= pe_on_disk_size / DISK_PE_SIZE
        && pe_allocated <= pe_total;
    sane.then_some(pv_size as u64)
}

pub struct LvmDetector;

impl Detector for LvmDetector {
    fn name(&self) -> &str {
        "hmlvm"
    }

    fn description(&self) -> &str {
        "Linux LVM physical volume"
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(PV_DISK_SIZE)
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        Ok(match inspect(window) {
            Some(sectors) => Guess::new(Confidence::Yes, 0xFE, sector, sectors * 512 / disk.sector_size()),
            None => Guess::no(),
        })
    }
}
