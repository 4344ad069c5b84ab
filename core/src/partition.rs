// PC partition table layout, entry predicates and type names
use crate::error::{PartHuntError, Result};
use crate::geometry::DiskGeometry;
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

/// Absolute sector index on the device.
pub type SectorAddress = u64;

pub const SECTOR_SIZE_MIN: usize = 512;
pub const BOOT_CODE_SIZE: usize = 446;
pub const PARTITION_ENTRY_SIZE: usize = 16;
pub const PARTITION_SLOTS: usize = 4;
pub const TABLE_SIGNATURE: u16 = 0xAA55;
pub const ACTIVE_FLAG: u8 = 0x80;

const_assert_eq!(BOOT_CODE_SIZE + PARTITION_SLOTS * PARTITION_ENTRY_SIZE + 2, SECTOR_SIZE_MIN);

/// Raw legacy CHS triple as stored on disk (head, sector with cylinder
/// high bits, cylinder low byte).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chs {
    pub head: u8,
    pub sector: u8,
    pub cylinder: u8,
}

impl Chs {
    /// Decode to (cylinder, head, sector).
    pub fn decode(&self) -> (u32, u32, u32) {
        let cylinder = ((self.sector as u32 & 0xC0) << 2) | self.cylinder as u32;
        (cylinder, self.head as u32, self.sector as u32 & 0x3F)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub flag: u8,
    pub start_chs: Chs,
    pub partition_type: u8,
    pub end_chs: Chs,
    pub start: SectorAddress,
    pub size: u64,
}

impl PartitionEntry {
    pub fn new(partition_type: u8, start: SectorAddress, size: u64) -> Self {
        Self {
            partition_type,
            start,
            size,
            ..Default::default()
        }
    }

    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < PARTITION_ENTRY_SIZE {
            return Err(PartHuntError::InvalidInput(format!(
                "partition entry needs {} bytes, got {}",
                PARTITION_ENTRY_SIZE,
                raw.len()
            )));
        }
        Ok(Self {
            flag: raw[0],
            start_chs: Chs { head: raw[1], sector: raw[2], cylinder: raw[3] },
            partition_type: raw[4],
            end_chs: Chs { head: raw[5], sector: raw[6], cylinder: raw[7] },
            start: LittleEndian::read_u32(&raw[8..12]) as u64,
            size: LittleEndian::read_u32(&raw[12..16]) as u64,
        })
    }

    pub fn to_bytes(&self) -> [u8; PARTITION_ENTRY_SIZE] {
        let mut raw = [0u8; PARTITION_ENTRY_SIZE];
        raw[0] = self.flag;
        raw[1] = self.start_chs.head;
        raw[2] = self.start_chs.sector;
        raw[3] = self.start_chs.cylinder;
        raw[4] = self.partition_type;
        raw[5] = self.end_chs.head;
        raw[6] = self.end_chs.sector;
        raw[7] = self.end_chs.cylinder;
        LittleEndian::write_u32(&mut raw[8..12], u32::try_from(self.start).unwrap_or(u32::MAX));
        LittleEndian::write_u32(&mut raw[12..16], u32::try_from(self.size).unwrap_or(u32::MAX));
        raw
    }

    pub fn is_empty(&self) -> bool {
        self.partition_type == 0 && self.start == 0 && self.size == 0
    }

    pub fn end(&self) -> SectorAddress {
        self.start + self.size
    }

    pub fn is_active(&self) -> bool {
        self.flag == ACTIVE_FLAG
    }

    /// Extended-type entry that actually points somewhere.
    pub fn is_extended(&self) -> bool {
        self.size != 0 && matches!(self.partition_type, 0x05 | 0x0F | 0x85)
    }

    /// Non-extended entry whose type is a known, non-empty partition type.
    pub fn is_real(&self) -> bool {
        !self.is_extended() && self.partition_type != 0 && partition_type_name(self.partition_type).is_some()
    }

    /// Bounds and flag sanity against the device size.
    pub fn is_sane(&self, total_sectors: u64) -> bool {
        self.sanity_problem(total_sectors).is_none()
    }

    pub fn sanity_problem(&self, total_sectors: u64) -> Option<&'static str> {
        if self.start >= total_sectors {
            Some("partition start beyond end of disk")
        } else if self.size > total_sectors {
            Some("partition size exceeds disk size")
        } else if self.start + self.size > total_sectors {
            Some("partition end beyond end of disk")
        } else if self.flag != 0 && self.flag != ACTIVE_FLAG {
            Some("strange partition boot flag")
        } else {
            None
        }
    }

    /// Recompute the legacy CHS fields from the disk geometry.
    pub fn fill_chs(&mut self, geometry: &DiskGeometry) {
        self.start_chs = geometry.dos_chs(self.start);
        let last = if self.size > 0 { self.start + self.size - 1 } else { self.start };
        self.end_chs = geometry.dos_chs(last);
    }

    pub fn type_name(&self) -> &'static str {
        partition_type_name(self.partition_type).unwrap_or("unknown")
    }
}

/// Whether a logical partition of type `b` is plausible under a link
/// entry declaring type `a`.
pub fn is_same_partition_type(a: u8, b: u8) -> bool {
    const CLASSES: [&[u8]; 5] = [
        &[0x01, 0x11],
        &[0x06, 0x0E, 0x16],
        &[0x05, 0x0F],
        &[0x0B, 0x0C],
        &[0x8E, 0xFE],
    ];
    match CLASSES.iter().find(|class| class.contains(&a)) {
        Some(class) => class.contains(&b),
        None => a == b,
    }
}

pub fn count_extended(entries: &[PartitionEntry]) -> usize {
    entries.iter().filter(|e| e.is_extended()).count()
}

pub fn count_real(entries: &[PartitionEntry]) -> usize {
    entries.iter().filter(|e| e.is_real()).count()
}

/// Sector 0 layout: boot code, four slots and the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryPartitionTable {
    pub boot_code: [u8; BOOT_CODE_SIZE],
    pub entries: [PartitionEntry; PARTITION_SLOTS],
    pub signature: u16,
}

impl Default for PrimaryPartitionTable {
    fn default() -> Self {
        Self {
            boot_code: [0u8; BOOT_CODE_SIZE],
            entries: [PartitionEntry::default(); PARTITION_SLOTS],
            signature: 0,
        }
    }
}

impl PrimaryPartitionTable {
    pub fn parse(sector: &[u8]) -> Result<Self> {
        if sector.len() < SECTOR_SIZE_MIN {
            return Err(PartHuntError::InvalidInput(format!(
                "partition table sector needs {} bytes, got {}",
                SECTOR_SIZE_MIN,
                sector.len()
            )));
        }
        let mut table = Self::default();
        table.boot_code.copy_from_slice(&sector[..BOOT_CODE_SIZE]);
        for (i, entry) in table.entries.iter_mut().enumerate() {
            let offset = BOOT_CODE_SIZE + i * PARTITION_ENTRY_SIZE;
            *entry = PartitionEntry::parse(&sector[offset..offset + PARTITION_ENTRY_SIZE])?;
        }
        table.signature = LittleEndian::read_u16(&sector[510..512]);
        Ok(table)
    }

    pub fn to_bytes(&self) -> [u8; SECTOR_SIZE_MIN] {
        let mut sector = [0u8; SECTOR_SIZE_MIN];
        sector[..BOOT_CODE_SIZE].copy_from_slice(&self.boot_code);
        for (i, entry) in self.entries.iter().enumerate() {
            let offset = BOOT_CODE_SIZE + i * PARTITION_ENTRY_SIZE;
            sector[offset..offset + PARTITION_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
        }
        LittleEndian::write_u16(&mut sector[510..512], self.signature);
        sector
    }

    pub fn has_signature(&self) -> bool {
        self.signature == TABLE_SIGNATURE
    }

    /// Test used for extended boot records found while scanning and
    /// while walking the chain: signature present, every slot sane,
    /// exactly one real entry and at most one extended entry.
    pub fn is_extended_table(&self, total_sectors: u64) -> bool {
        self.has_signature()
            && self.entries.iter().all(|e| e.is_sane(total_sectors))
            && count_real(&self.entries) == 1
            && count_extended(&self.entries) <= 1
    }

    pub fn first_extended(&self) -> Option<&PartitionEntry> {
        self.entries.iter().find(|e| e.is_extended())
    }

    pub fn first_real(&self) -> Option<&PartitionEntry> {
        self.entries.iter().find(|e| e.is_real())
    }
}

/// Compare two tables slot-set-wise, ignoring the boot flag. Returns the
/// number of entries of `current` with no counterpart in `guessed`.
pub fn compare_tables(current: &PrimaryPartitionTable, guessed: &PrimaryPartitionTable) -> usize {
    let same = |a: &PartitionEntry, b: &PartitionEntry| {
        a.partition_type == b.partition_type && a.start == b.start && a.size == b.size
    };
    let mut used = [false; PARTITION_SLOTS];
    let mut mismatches = 0;
    for entry in &current.entries {
        let found = guessed
            .entries
            .iter()
            .enumerate()
            .find(|(i, g)| !used[*i] && same(entry, g));
        match found {
            Some((i, _)) => used[i] = true,
            None => mismatches += 1,
        }
    }
    mismatches
}

pub fn partition_type_name(partition_type: u8) -> Option<&'static str> {
    let name = match partition_type {
        0x00 => "unused",
        0x01 => "Primary DOS with 12 bit FAT",
        0x02 => "XENIX / filesystem",
        0x03 => "XENIX /usr filesystem",
        0x04 => "Primary DOS with 16 bit FAT (<= 32MB)",
        0x05 => "Extended DOS",
        0x06 => "Primary 'big' DOS (> 32MB)",
        0x07 => "OS/2 HPFS, NTFS, QNX or Advanced UNIX",
        0x08 => "AIX filesystem",
        0x09 => "AIX boot partition or Coherent",
        0x0A => "OS/2 Boot Manager or OPUS",
        0x0B => "DOS or Windows 95 with 32 bit FAT",
        0x0C => "DOS or Windows 95 with 32 bit FAT, LBA",
        0x0E => "Primary 'big' DOS (> 32MB, LBA)",
        0x0F => "Extended DOS, LBA",
        0x10 => "OPUS",
        0x11 => "Hidden DOS with 12 bit FAT",
        0x12 => "Compaq Diagnostics",
        0x14 => "Hidden DOS with 16 bit FAT (<= 32MB)",
        0x16 => "Hidden 'big' DOS (> 32MB)",
        0x17 => "OS/2 Boot Manager HPFS",
        0x18 => "AST special Windows swap file",
        0x24 => "NEC MS-DOS 3.x",
        0x3C => "PowerQuest PartitionMagic recovery partition",
        0x40 => "VENIX 286",
        0x4D => "QNX4.x",
        0x4E => "QNX4.x 2nd part",
        0x4F => "QNX4.x 3rd part",
        0x50 | 0x51 => "DM",
        0x52 => "CP/M or Microport SysV/AT",
        0x55 => "EZ Drive",
        0x56 => "GB",
        0x61 | 0xF1 | 0xF4 => "SpeedStor",
        0x63 => "ISC UNIX, other System V/386, GNU HURD or Mach",
        0x64 => "Novell Netware 2.xx",
        0x65 => "Novell Netware 3.xx",
        0x70 => "DiskSecure Multi-Boot",
        0x75 => "PCIX",
        0x80 => "Minix V1",
        0x81 => "Minix V2/Linux",
        0x82 => "Linux swap or Solaris/x86",
        0x83 => "Linux ext2 filesystem",
        0x85 => "Extended Linux",
        0x86 => "FAT16 volume/stripe set",
        0x8E => "Linux LVM physical volume",
        0x93 => "Amoeba filesystem",
        0x94 => "Amoeba bad block table",
        0xA5 => "FreeBSD/NetBSD/386BSD",
        0xA6 => "OpenBSD",
        0xA7 => "NEXTSTEP",
        0xB7 => "BSDI BSD/386 filesystem",
        0xB8 => "BSDI BSD/386 swap",
        0xC7 => "Syrinx",
        0xDB => "Concurrent CPM or C.DOS or CTOS",
        0xE1 => "SpeedStor 12-bit FAT extended",
        0xE3 => "Speed",
        0xE4 => "SpeedStor 16-bit FAT",
        0xEB => "BeOS fs",
        0xF2 => "DOS 3.3+ Secondary",
        0xFD => "Linux raid autodetect",
        0xFE => "LANstep",
        0xFF => "BBT (Bad Blocks Table)",
        _ => return None,
    };
    Some(name)
}
