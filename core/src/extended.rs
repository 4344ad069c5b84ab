// Extended partition chain reader
use crate::disk::Disk;
use crate::partition::{PartitionEntry, PrimaryPartitionTable, SectorAddress};
use log::{error, warn};
use std::fmt;

/// Upper bound on chain length; guards against links pointing backwards.
pub const MAX_EXTENDED_LINKS: usize = 128;

/// One extended boot record in the chain.
#[derive(Debug, Clone)]
pub struct ExtendedLink {
    pub sector: SectorAddress,
    pub raw: Vec<u8>,
    pub table: PrimaryPartitionTable,
}

impl ExtendedLink {
    /// Next link's offset relative to the chain anchor, if any.
    pub fn next_offset(&self) -> Option<u64> {
        self.table.first_extended().map(|e| e.start)
    }

    /// The logical partition in absolute sectors.
    pub fn logical(&self) -> Option<PartitionEntry> {
        self.table.first_real().map(|e| PartitionEntry {
            start: self.sector + e.start,
            ..*e
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    MultipleExtended,
    IllegalOffset { offset: u64, size: u64 },
    Unreadable { sector: SectorAddress, reason: String },
    InvalidTable { sector: SectorAddress },
    TooManyLinks,
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::MultipleExtended => write!(f, "more than one extended partition, walking the first"),
            ChainError::IllegalOffset { offset, size } => {
                write!(f, "illegal offset {} in extended partition of {} sectors", offset, size)
            }
            ChainError::Unreadable { sector, reason } => {
                write!(f, "cannot read extended table at sector {}: {}", sector, reason)
            }
            ChainError::InvalidTable { sector } => write!(f, "invalid extended table at sector {}", sector),
            ChainError::TooManyLinks => write!(f, "more than {} extended links, giving up", MAX_EXTENDED_LINKS),
        }
    }
}

/// The chain as read from disk. `error` is set when the walk stopped
/// early; the links collected before that point are kept. A primary
/// table with several extended entries only has the first one walked.
#[derive(Debug, Clone, Default)]
pub struct ExtendedChain {
    pub anchor: Option<PartitionEntry>,
    pub links: Vec<ExtendedLink>,
    pub error: Option<ChainError>,
}

impl ExtendedChain {
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Walk the extended chain anchored at the primary table's extended entry.
pub fn read_extended_chain(disk: &mut Disk) -> ExtendedChain {
    let primary = disk.primary_table().clone();
    let mut chain = ExtendedChain::default();

    let extended: Vec<&PartitionEntry> = primary.entries.iter().filter(|e| e.is_extended()).collect();
    let Some(&&anchor) = extended.first() else {
        return chain;
    };
    if extended.len() > 1 {
        warn!("{}", ChainError::MultipleExtended);
    }
    chain.anchor = Some(anchor);

    let total = disk.total_sectors();
    let mut offset = 0u64;
    loop {
        if chain.links.len() >= MAX_EXTENDED_LINKS {
            chain.error = Some(ChainError::TooManyLinks);
            break;
        }
        if offset > anchor.size {
            chain.error = Some(ChainError::IllegalOffset { offset, size: anchor.size });
            break;
        }

        let sector = anchor.start + offset;
        let raw = match disk.read_sector(sector) {
            Ok(raw) => raw,
            Err(e) => {
                chain.error = Some(ChainError::Unreadable { sector, reason: e.to_string() });
                break;
            }
        };
        let table = match PrimaryPartitionTable::parse(&raw) {
            Ok(table) if table.is_extended_table(total) => table,
            _ => {
                chain.error = Some(ChainError::InvalidTable { sector });
                break;
            }
        };

        let link = ExtendedLink { sector, raw, table };
        let next = link.next_offset();
        chain.links.push(link);
        match next {
            Some(next) => offset = next,
            None => break,
        }
    }

    match &chain.error {
        Some(e) => error!("{}", e),
        None if extended.len() > 1 => chain.error = Some(ChainError::MultipleExtended),
        None => {}
    }
    chain
}
