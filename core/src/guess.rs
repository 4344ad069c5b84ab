// Scan hits and the confirmation hook consulted before recording them
use crate::partition::{PartitionEntry, PrimaryPartitionTable, SectorAddress, PARTITION_SLOTS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessPayload {
    /// A detector's guess.
    Single { module: String, entry: PartitionEntry },
    /// Snapshot of the four raw entries of an extended boot record.
    Link([PartitionEntry; PARTITION_SLOTS]),
}

/// Classification set by the consistency checker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuessFlags {
    pub primary: bool,
    pub logical: bool,
    pub invalid: bool,
    pub orphaned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessRecord {
    pub sector: SectorAddress,
    pub payload: GuessPayload,
    pub flags: GuessFlags,
}

impl GuessRecord {
    pub fn single(sector: SectorAddress, module: impl Into<String>, entry: PartitionEntry) -> Self {
        Self {
            sector,
            payload: GuessPayload::Single { module: module.into(), entry },
            flags: GuessFlags::default(),
        }
    }

    pub fn link(sector: SectorAddress, table: &PrimaryPartitionTable) -> Self {
        Self {
            sector,
            payload: GuessPayload::Link(table.entries),
            flags: GuessFlags::default(),
        }
    }

    pub fn is_extended_link(&self) -> bool {
        matches!(self.payload, GuessPayload::Link(_))
    }

    /// The guessed partition of a single record.
    pub fn entry(&self) -> Option<&PartitionEntry> {
        match &self.payload {
            GuessPayload::Single { entry, .. } => Some(entry),
            GuessPayload::Link(_) => None,
        }
    }

    pub fn module(&self) -> Option<&str> {
        match &self.payload {
            GuessPayload::Single { module, .. } => Some(module),
            GuessPayload::Link(_) => None,
        }
    }

    pub fn link_entries(&self) -> Option<&[PartitionEntry; PARTITION_SLOTS]> {
        match &self.payload {
            GuessPayload::Link(entries) => Some(entries),
            GuessPayload::Single { .. } => None,
        }
    }

    /// The link's logical partition entry, relative to the link sector.
    pub fn real_entry(&self) -> Option<&PartitionEntry> {
        self.link_entries()?.iter().find(|e| e.is_real())
    }

    /// The link's pointer to the next link, relative to the chain anchor.
    pub fn extended_entry(&self) -> Option<&PartitionEntry> {
        self.link_entries()?.iter().find(|e| e.is_extended())
    }
}

/// Asked before a hit is recorded. Returning false rejects it.
pub trait GuessConfirmer {
    fn confirm_extended(&mut self, sector: SectorAddress, table: &PrimaryPartitionTable) -> bool;

    fn confirm_guess(&mut self, module: &str, sector: SectorAddress, entry: &PartitionEntry) -> bool;
}

/// Non-interactive runs accept everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl GuessConfirmer for AcceptAll {
    fn confirm_extended(&mut self, _sector: SectorAddress, _table: &PrimaryPartitionTable) -> bool {
        true
    }

    fn confirm_guess(&mut self, _module: &str, _sector: SectorAddress, _entry: &PartitionEntry) -> bool {
        true
    }
}
