use log::{debug, info, warn};
use nix::libc::{c_int, c_ulong};
use parthunt_core::{DiskGeometry, GeometryProvider, PartHuntError, Result};
use std::fs::{self, File};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Layout of `struct hd_geometry` from <linux/hdreg.h>.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct HdGeometry {
    pub heads: u8,
    pub sectors: u8,
    pub cylinders: u16,
    pub start: c_ulong,
}

const HDIO_GETGEO: u32 = 0x0301;
const BLKSSZGET: u32 = 0x1268;

nix::ioctl_read_bad!(hdio_getgeo, HDIO_GETGEO, HdGeometry);
nix::ioctl_read!(blkgetsize64, 0x12, 114, u64);
nix::ioctl_read_bad!(blksszget, BLKSSZGET, c_int);
nix::ioctl_none!(blkrrpart, 0x12, 95);

/// Geometry from the block layer for devices, synthesized for image files.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxGeometry;

impl LinuxGeometry {
    fn is_block_device(file: &File) -> bool {
        file.metadata().map(|m| m.file_type().is_block_device()).unwrap_or(false)
    }

    fn device_bytes(path: &Path, file: &File) -> Result<u64> {
        let mut bytes: u64 = 0;
        // SAFETY: the fd is open for the lifetime of `file` and `bytes` is a valid u64
        match unsafe { blkgetsize64(file.as_raw_fd(), &mut bytes) } {
            Ok(_) => Ok(bytes),
            Err(e) => {
                debug!("BLKGETSIZE64 on {} failed: {}, trying sysfs", path.display(), e);
                sysfs_sectors(path).map(|sectors| sectors * 512)
            }
        }
    }

    fn chs(file: &File) -> Option<HdGeometry> {
        let mut geo = HdGeometry::default();
        // SAFETY: `geo` has the kernel's hd_geometry layout
        match unsafe { hdio_getgeo(file.as_raw_fd(), &mut geo) } {
            Ok(_) if geo.heads != 0 && geo.sectors != 0 => Some(geo),
            Ok(_) => None,
            Err(e) => {
                debug!("HDIO_GETGEO failed: {}", e);
                None
            }
        }
    }
}

/// Size of a block device in 512-byte units from /sys/class/block.
fn sysfs_sectors(path: &Path) -> Result<u64> {
    let canonical = fs::canonicalize(path)?;
    let name = canonical
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PartHuntError::Geometry(format!("{}: no device name", path.display())))?;
    let size_path = format!("/sys/class/block/{}/size", name);
    let content = fs::read_to_string(&size_path)
        .map_err(|e| PartHuntError::Geometry(format!("{}: {}", size_path, e)))?;
    content
        .trim()
        .parse::<u64>()
        .map_err(|e| PartHuntError::Geometry(format!("{}: {}", size_path, e)))
}

impl GeometryProvider for LinuxGeometry {
    fn geometry(&self, path: &Path, file: &File, sector_size: u64) -> Result<DiskGeometry> {
        if !Self::is_block_device(file) {
            let len = file.metadata()?.len();
            return Ok(DiskGeometry::synthesize(len / sector_size.max(1)));
        }

        let total = Self::device_bytes(path, file)? / sector_size.max(1);
        match Self::chs(file) {
            Some(geo) => {
                let heads = geo.heads as u64;
                let sectors = geo.sectors as u64;
                Ok(DiskGeometry::new(total / (heads * sectors), heads, sectors, total))
            }
            None => {
                info!("{}: no CHS geometry from the kernel, synthesizing", path.display());
                Ok(DiskGeometry::synthesize(total))
            }
        }
    }

    fn sector_size(&self, file: &File) -> Option<u64> {
        if !Self::is_block_device(file) {
            return None;
        }
        let mut size: c_int = 0;
        // SAFETY: BLKSSZGET writes a single int
        match unsafe { blksszget(file.as_raw_fd(), &mut size) } {
            Ok(_) if size > 0 => Some(size as u64),
            _ => None,
        }
    }

    fn notify_table_changed(&self, path: &Path, file: &File) {
        if !Self::is_block_device(file) {
            return;
        }
        if let Err(e) = file.sync_all() {
            warn!("sync of {} failed: {}", path.display(), e);
        }
        // SAFETY: BLKRRPART takes no argument
        match unsafe { blkrrpart(file.as_raw_fd()) } {
            Ok(_) => info!("kernel re-read the partition table of {}", path.display()),
            Err(e) => warn!(
                "could not make the kernel re-read {} ({}); a reboot may be needed",
                path.display(),
                e
            ),
        }
    }
}
