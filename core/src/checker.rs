// Consistency checker: turns the raw guess list into a primary table
use crate::disk::Disk;
use crate::guess::GuessRecord;
use crate::partition::{
    is_same_partition_type, PartitionEntry, PrimaryPartitionTable, SectorAddress, PARTITION_SLOTS,
    TABLE_SIGNATURE,
};
use log::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    pub table: PrimaryPartitionTable,
    /// Guesses dropped for overlapping an earlier one.
    pub discarded: usize,
    /// Problems left in the assembled table; zero means it can be written.
    pub inconsistencies: usize,
    pub warnings: Vec<String>,
}

impl CheckOutcome {
    pub fn is_consistent(&self) -> bool {
        self.inconsistencies == 0
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Classify `records` in place and assemble the guessed primary table.
pub fn check_guesses(disk: &Disk, records: &mut Vec<GuessRecord>) -> CheckOutcome {
    let mut outcome = CheckOutcome {
        table: PrimaryPartitionTable {
            boot_code: disk.primary_table().boot_code,
            ..Default::default()
        },
        ..Default::default()
    };
    let total = disk.total_sectors();

    outcome.discarded = prune_overlaps(records);
    if outcome.discarded > 0 {
        info!("{} overlapping guess(es) discarded", outcome.discarded);
    }
    classify(records, total, &mut outcome);
    mark_orphans(records);
    assemble(disk, records, &mut outcome);
    outcome
}

/// Drop single guesses starting before the end of the last kept one.
fn prune_overlaps(records: &mut Vec<GuessRecord>) -> usize {
    let mut end: SectorAddress = 0;
    let mut discarded = 0;
    records.retain(|record| {
        let entry = match record.entry() {
            Some(entry) if !record.flags.invalid => entry,
            _ => return true,
        };
        if entry.start < end {
            info!(
                "discarding guess at sector {} ({}), overlaps previous partition ending at {}",
                record.sector,
                entry.type_name(),
                end
            );
            discarded += 1;
            false
        } else {
            end = entry.end();
            true
        }
    });
    discarded
}

/// True when some link is directly followed by a partition, so an
/// extended region will open and take one primary slot.
fn opens_region(records: &[GuessRecord]) -> bool {
    let valid: Vec<&GuessRecord> = records.iter().filter(|r| !r.flags.invalid).collect();
    valid
        .windows(2)
        .any(|pair| pair[0].is_extended_link() && !pair[1].is_extended_link())
}

fn classify(records: &mut [GuessRecord], total: u64, outcome: &mut CheckOutcome) {
    let max_primary = if opens_region(records) {
        PARTITION_SLOTS - 1
    } else {
        PARTITION_SLOTS
    };
    let mut in_region = false;
    let mut regions = 0;
    let mut primaries = 0;

    let mut i = 0;
    while i < records.len() {
        if records[i].flags.invalid {
            i += 1;
            continue;
        }
        let sector = records[i].sector;

        if records[i].is_extended_link() {
            if i + 1 == records.len() {
                records[i].flags.invalid = true;
                outcome.warn(format!("extended table at sector {} is not followed by a partition", sector));
                break;
            }
            if !in_region {
                in_region = true;
                regions += 1;
                if regions > 1 {
                    records[i].flags.invalid = true;
                    outcome.warn(format!("more than one extended partition, ignoring table at sector {}", sector));
                    i += 1;
                    continue;
                }
            }
            if records[i].extended_entry().is_none() {
                in_region = false;
            }
            if records[i + 1].is_extended_link() {
                records[i].flags.invalid = true;
                outcome.warn(format!("extended table at sector {} has no logical partition", sector));
                i += 1;
                continue;
            }

            let declared = records[i].real_entry().copied();
            let logical = &mut records[i + 1];
            logical.flags.logical = true;
            let matches = match (declared, logical.entry()) {
                (Some(declared), Some(found)) => {
                    is_same_partition_type(declared.partition_type, found.partition_type)
                        && declared.size >= found.size
                        && found.is_sane(total)
                }
                _ => false,
            };
            if !matches {
                logical.flags.invalid = true;
                outcome.warn(format!(
                    "logical partition at sector {} does not match the extended table at sector {}",
                    logical.sector, sector
                ));
            }
            i += 2;
            continue;
        }

        let entry = records[i].entry().copied().unwrap_or_default();
        if in_region {
            records[i].flags.invalid = true;
            in_region = false;
            outcome.warn(format!("partition at sector {} inside extended space has no table", sector));
        } else if primaries >= max_primary {
            records[i].flags.invalid = true;
            outcome.warn(format!("too many primary partitions, ignoring sector {}", sector));
        } else if let Some(problem) = entry.sanity_problem(total) {
            records[i].flags.invalid = true;
            outcome.warn(format!("{} ({} at sector {})", problem, entry.type_name(), sector));
        } else {
            records[i].flags.primary = true;
            primaries += 1;
        }
        i += 1;
    }
}

/// Flag logical partitions whose link is not where the previous link
/// said it would be.
fn mark_orphans(records: &mut [GuessRecord]) {
    let mut anchor: Option<SectorAddress> = None;
    let mut previous: Option<PartitionEntry> = None;

    for i in 0..records.len() {
        if records[i].flags.invalid || !records[i].is_extended_link() {
            continue;
        }
        let sector = records[i].sector;
        let base = *anchor.get_or_insert(sector);
        let has_real = records[i].real_entry().is_some();

        if let Some(previous) = previous.filter(|_| has_real) {
            if sector != base + previous.start {
                if let Some(logical) = records.get_mut(i + 1).filter(|r| r.flags.logical) {
                    logical.flags.orphaned = true;
                    info!("orphaned logical partition at sector {}", logical.sector);
                }
            }
        }
        if let Some(next) = records[i].extended_entry() {
            previous = Some(*next);
        }
    }
}

/// Extended entry spanning from the first valid link to the end of the
/// last valid link's logical partition.
fn synthesized_extended(disk: &Disk, records: &[GuessRecord]) -> Option<PartitionEntry> {
    let mut links = records.iter().filter(|r| r.is_extended_link() && !r.flags.invalid);
    let first = links.next()?;
    let last = links.last().unwrap_or(first);
    let tail = last.real_entry().map_or(1, |e| e.start + e.size);
    let partition_type = if disk.is_lba() { 0x0F } else { 0x05 };
    Some(PartitionEntry::new(partition_type, first.sector, last.sector - first.sector + tail))
}

fn assemble(disk: &Disk, records: &[GuessRecord], outcome: &mut CheckOutcome) {
    let geometry = disk.geometry();
    let total = disk.total_sectors();
    let mut extended = synthesized_extended(disk, records);
    let mut slots = Vec::with_capacity(PARTITION_SLOTS);

    for record in records.iter().filter(|r| !r.flags.invalid) {
        if slots.len() == PARTITION_SLOTS {
            break;
        }
        if record.is_extended_link() {
            if let Some(entry) = extended.take() {
                slots.push(entry);
            }
        } else if record.flags.primary {
            if let Some(entry) = record.entry() {
                slots.push(*entry);
            }
        }
    }

    for (slot, entry) in outcome.table.entries.iter_mut().zip(slots) {
        *slot = entry;
        slot.fill_chs(geometry);
    }

    let problems = table_problems(&outcome.table, total);
    let inconsistencies = problems.len();
    for problem in problems {
        outcome.warn(problem);
    }

    outcome.inconsistencies = inconsistencies;
    if inconsistencies == 0 {
        outcome.table.signature = TABLE_SIGNATURE;
    }
}

/// Overlap and bounds problems among the used entries of `table`, in
/// slot order. An empty list means the table can be written.
pub fn table_problems(table: &PrimaryPartitionTable, total_sectors: u64) -> Vec<String> {
    let mut problems = Vec::new();
    let mut previous: Option<&PartitionEntry> = None;
    for entry in table.entries.iter().filter(|e| e.partition_type != 0) {
        if let Some(prev) = previous {
            if prev.end() > entry.start {
                problems.push(format!(
                    "partition at sector {} overlaps the one ending at {}",
                    entry.start,
                    prev.end()
                ));
            }
        }
        if let Some(problem) = entry.sanity_problem(total_sectors) {
            problems.push(format!("{} ({} at sector {})", problem, entry.type_name(), entry.start));
        }
        previous = Some(entry);
    }
    problems
}
