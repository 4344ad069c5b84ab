// Disk handle: device reader, sector size, geometry and the tables read at startup
use crate::error::{PartHuntError, Result};
use crate::extended::{read_extended_chain, ExtendedChain};
use crate::geometry::{DiskGeometry, GeometryProvider, ImageGeometry};
use crate::partition::{PrimaryPartitionTable, SectorAddress, SECTOR_SIZE_MIN};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Largest sector size tried when probing.
pub const SECTOR_SIZE_MAX: u64 = 16384;

/// Anything a disk can be read from.
pub trait DiskIo: Read + Seek + Send {}

impl<T: Read + Seek + Send> DiskIo for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryOverride {
    pub cylinders: u64,
    pub heads: u64,
    pub sectors_per_track: u64,
}

impl GeometryOverride {
    pub fn to_geometry(&self) -> DiskGeometry {
        DiskGeometry::new(
            self.cylinders,
            self.heads,
            self.sectors_per_track,
            self.cylinders * self.heads * self.sectors_per_track,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiskOptions {
    pub sector_size: Option<u64>,
    pub geometry: Option<GeometryOverride>,
    /// Ask the OS for the geometry instead of deriving it from the size.
    pub query_geometry: bool,
}

/// Result of a block read that the scanner has to classify.
#[derive(Debug)]
pub enum ReadOutcome {
    Full,
    Short(usize),
    Eof,
    Failed(io::Error),
}

pub struct Disk {
    path: PathBuf,
    io: Box<dyn DiskIo>,
    sector_size: u64,
    geometry: DiskGeometry,
    sector0: Vec<u8>,
    primary: PrimaryPartitionTable,
    chain: ExtendedChain,
}

impl std::fmt::Debug for Disk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disk")
            .field("path", &self.path)
            .field("sector_size", &self.sector_size)
            .field("geometry", &self.geometry)
            .finish()
    }
}

impl Disk {
    /// Open a device or image read-only and read its current tables.
    pub fn open(path: &Path, options: &DiskOptions, provider: &dyn GeometryProvider) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| PartHuntError::DeviceOpen(format!("{}: {}", path.display(), e)))?;

        let reported = options.query_geometry.then(|| provider.sector_size(&file)).flatten();
        let sector_size = match options.sector_size.or(reported) {
            Some(size) => size,
            None => probe_sector_size(&mut file)?,
        };
        if sector_size < SECTOR_SIZE_MIN as u64 || sector_size % SECTOR_SIZE_MIN as u64 != 0 {
            return Err(PartHuntError::SectorSize(format!(
                "{} is not a multiple of {}",
                sector_size, SECTOR_SIZE_MIN
            )));
        }

        let geometry = match options.geometry {
            Some(chs) => chs.to_geometry(),
            None if options.query_geometry => provider.geometry(path, &file, sector_size)?,
            None => ImageGeometry.geometry(path, &file, sector_size)?,
        };
        info!(
            "{}: {} sectors of {} bytes, geometry {}/{}/{}",
            path.display(),
            geometry.total_sectors,
            sector_size,
            geometry.cylinders,
            geometry.heads,
            geometry.sectors_per_track
        );

        Self::with_reader(path.to_path_buf(), Box::new(file), sector_size, geometry)
    }

    /// Build a handle over any seekable source.
    pub fn from_reader<R: DiskIo + 'static>(reader: R, sector_size: u64, geometry: DiskGeometry) -> Result<Self> {
        Self::with_reader(PathBuf::from("<memory>"), Box::new(reader), sector_size, geometry)
    }

    fn with_reader(path: PathBuf, io: Box<dyn DiskIo>, sector_size: u64, geometry: DiskGeometry) -> Result<Self> {
        if geometry.total_sectors == 0 {
            return Err(PartHuntError::Geometry(format!("{}: zero sectors", path.display())));
        }
        let mut disk = Self {
            path,
            io,
            sector_size,
            geometry,
            sector0: Vec::new(),
            primary: PrimaryPartitionTable::default(),
            chain: ExtendedChain::default(),
        };

        disk.sector0 = disk.read_sector(0)?;
        disk.primary = PrimaryPartitionTable::parse(&disk.sector0)?;
        if !disk.primary.has_signature() {
            warn!("{}: no valid partition table on sector 0", disk.path.display());
        } else {
            disk.chain = read_extended_chain(&mut disk);
        }
        Ok(disk)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sector_size(&self) -> u64 {
        self.sector_size
    }

    pub fn total_sectors(&self) -> u64 {
        self.geometry.total_sectors
    }

    pub fn geometry(&self) -> &DiskGeometry {
        &self.geometry
    }

    pub fn is_lba(&self) -> bool {
        self.geometry.is_lba()
    }

    /// Raw sector 0 as read at startup.
    pub fn sector0(&self) -> &[u8] {
        &self.sector0
    }

    pub fn primary_table(&self) -> &PrimaryPartitionTable {
        &self.primary
    }

    pub fn extended_chain(&self) -> &ExtendedChain {
        &self.chain
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.io.stream_position()
    }

    pub fn set_position(&mut self, pos: u64) -> io::Result<()> {
        self.io.seek(SeekFrom::Start(pos)).map(|_| ())
    }

    /// Read into `buf` at byte offset `offset`, retrying interrupted and
    /// partial reads. Returns the number of bytes read, which is less than
    /// `buf.len()` only at end of data.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.io.seek(SeekFrom::Start(offset))?;
        read_full(&mut self.io, buf)
    }

    /// Like `read_at` but a short read is an error.
    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.read_at(offset, buf)?;
        if n < buf.len() {
            return Err(PartHuntError::Read(format!(
                "short read at byte {}: {} of {} bytes",
                offset,
                n,
                buf.len()
            )));
        }
        Ok(())
    }

    pub fn read_sector(&mut self, sector: SectorAddress) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.sector_size as usize];
        self.read_exact_at(sector * self.sector_size, &mut buf)?;
        Ok(buf)
    }

    /// Read a scan window starting at `sector`.
    pub fn read_window(&mut self, sector: SectorAddress, buf: &mut [u8]) -> ReadOutcome {
        match self.read_at(sector * self.sector_size, buf) {
            Ok(n) if n == buf.len() => ReadOutcome::Full,
            Ok(0) => ReadOutcome::Eof,
            Ok(n) => ReadOutcome::Short(n),
            Err(e) => ReadOutcome::Failed(e),
        }
    }
}

fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        match reader.read(&mut buf[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}

/// Find the smallest power-of-two sector size that can be read whole
/// from the start of the device.
fn probe_sector_size<R: Read + Seek>(reader: &mut R) -> Result<u64> {
    let mut size = SECTOR_SIZE_MIN as u64;
    while size <= SECTOR_SIZE_MAX {
        let mut buf = vec![0u8; size as usize];
        reader.seek(SeekFrom::Start(0))?;
        match read_full(reader, &mut buf) {
            Ok(n) if n == buf.len() => {
                debug!("sector size probe: {} bytes", size);
                return Ok(size);
            }
            Ok(_) => break,
            Err(e) => debug!("sector size probe at {} bytes failed: {}", size, e),
        }
        size *= 2;
    }
    Err(PartHuntError::SectorSize("no readable sector size between 512 and 16384 bytes".to_string()))
}

/// Save the raw sector 0 to a backup file.
pub fn backup_sector0(disk: &Disk, backup: &Path) -> Result<()> {
    let mut file = File::create(backup)
        .map_err(|e| PartHuntError::Write(format!("{}: {}", backup.display(), e)))?;
    file.write_all(disk.sector0())
        .and_then(|_| file.sync_all())
        .map_err(|e| PartHuntError::Write(format!("{}: {}", backup.display(), e)))?;
    info!("saved sector 0 of {} to {}", disk.path().display(), backup.display());
    Ok(())
}

/// Write a partition table to sector 0 of `target`, creating it when it
/// does not exist. Returns the opened file so the caller can request a
/// table reread on it.
pub fn write_primary_table(target: &Path, table: &PrimaryPartitionTable) -> Result<File> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(target)
        .map_err(|e| PartHuntError::Write(format!("{}: {}", target.display(), e)))?;
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.write_all(&table.to_bytes()))
        .and_then(|_| file.sync_all())
        .map_err(|e| PartHuntError::Write(format!("{}: {}", target.display(), e)))?;
    info!("partition table written to {}", target.display());
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn image(sectors: usize) -> Vec<u8> {
        vec![0u8; sectors * 512]
    }

    #[test]
    fn test_from_reader_without_signature() {
        let disk = Disk::from_reader(Cursor::new(image(64)), 512, DiskGeometry::synthesize(64)).unwrap();
        assert!(!disk.primary_table().has_signature());
        assert!(disk.extended_chain().links.is_empty());
        assert_eq!(disk.total_sectors(), 64);
    }

    #[test]
    fn test_zero_sized_disk_rejected() {
        let result = Disk::from_reader(Cursor::new(image(1)), 512, DiskGeometry::default());
        assert!(matches!(result, Err(PartHuntError::Geometry(_))));
    }

    #[test]
    fn test_read_window_outcomes() {
        let mut disk = Disk::from_reader(Cursor::new(image(8)), 512, DiskGeometry::synthesize(8)).unwrap();
        let mut buf = vec![0u8; 1024];
        assert!(matches!(disk.read_window(0, &mut buf), ReadOutcome::Full));
        assert!(matches!(disk.read_window(7, &mut buf), ReadOutcome::Short(512)));
        assert!(matches!(disk.read_window(8, &mut buf), ReadOutcome::Eof));
    }

    #[test]
    fn test_probe_sector_size() {
        let mut cursor = Cursor::new(image(4));
        assert_eq!(probe_sector_size(&mut cursor).unwrap(), 512);

        let mut tiny = Cursor::new(vec![0u8; 100]);
        assert!(probe_sector_size(&mut tiny).is_err());
    }

    #[test]
    fn test_write_and_backup_table() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        temp.as_file().set_len(64 * 512).unwrap();

        let mut table = PrimaryPartitionTable::default();
        table.entries[0] = crate::partition::PartitionEntry::new(0x83, 63, 1000);
        table.signature = crate::partition::TABLE_SIGNATURE;
        write_primary_table(temp.path(), &table).unwrap();

        let options = DiskOptions::default();
        let disk = Disk::open(temp.path(), &options, &ImageGeometry).unwrap();
        assert_eq!(disk.primary_table(), &table);

        let backup = tempfile::NamedTempFile::new().unwrap();
        backup_sector0(&disk, backup.path()).unwrap();
        assert_eq!(std::fs::read(backup.path()).unwrap(), table.to_bytes().to_vec());
    }
}
