// Human-readable reports for tables, chains and guesses
use crate::checker::CheckOutcome;
use crate::extended::ExtendedChain;
use crate::guess::GuessRecord;
use crate::partition::{PartitionEntry, PrimaryPartitionTable};
use std::fmt::Write;

fn megabytes(sectors: u64, sector_size: u64) -> u64 {
    sectors * sector_size / (1024 * 1024)
}

/// One entry, two lines: type and extent, then CHS (and raw hex when verbose).
pub fn entry_report(index: usize, entry: &PartitionEntry, sector_size: u64, verbose: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  Partition({}): type 0x{:02X} ({}){}",
        index + 1,
        entry.partition_type,
        entry.type_name(),
        if entry.is_active() { ", active" } else { "" }
    );
    let _ = writeln!(
        out,
        "    size: {}mb #s({}) s({}-{})",
        megabytes(entry.size, sector_size),
        entry.size,
        entry.start,
        (entry.start + entry.size).saturating_sub(1)
    );
    if verbose {
        let (c1, h1, s1) = entry.start_chs.decode();
        let (c2, h2, s2) = entry.end_chs.decode();
        let _ = writeln!(out, "    chs: ({}/{}/{})-({}/{}/{})", c1, h1, s1, c2, h2, s2);
        let _ = writeln!(out, "    hex: {}", hex::encode(entry.to_bytes()));
    }
    out
}

pub fn table_report(title: &str, table: &PrimaryPartitionTable, sector_size: u64, verbose: bool) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "{}", title);
    let _ = writeln!(report, "{}", "=".repeat(title.len()));
    if !table.has_signature() {
        let _ = writeln!(report, "  (no 0xAA55 signature)");
    }
    for (i, entry) in table.entries.iter().enumerate() {
        if entry.is_empty() {
            if verbose {
                let _ = writeln!(report, "  Partition({}): unused", i + 1);
            }
            continue;
        }
        report.push_str(&entry_report(i, entry, sector_size, verbose));
    }
    report
}

pub fn chain_report(chain: &ExtendedChain, sector_size: u64, verbose: bool) -> String {
    let mut report = String::new();
    for link in &chain.links {
        let _ = writeln!(report, "Extended table at sector {}:", link.sector);
        for (i, entry) in link.table.entries.iter().enumerate().filter(|(_, e)| !e.is_empty()) {
            report.push_str(&entry_report(i, entry, sector_size, verbose));
        }
    }
    if let Some(error) = &chain.error {
        let _ = writeln!(report, "Extended chain error: {}", error);
    }
    report
}

pub fn guess_report(records: &[GuessRecord], sector_size: u64) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "Guessed partitions:");
    for record in records {
        let mut flags = Vec::new();
        if record.flags.primary {
            flags.push("primary");
        }
        if record.flags.logical {
            flags.push("logical");
        }
        if record.flags.orphaned {
            flags.push("orphaned");
        }
        if record.flags.invalid {
            flags.push("invalid");
        }
        let flags = if flags.is_empty() { String::new() } else { format!(" [{}]", flags.join(", ")) };

        match record.entry() {
            Some(entry) => {
                let _ = writeln!(
                    report,
                    "  sector {}: {} by {}, {}mb s({}-{}){}",
                    record.sector,
                    entry.type_name(),
                    record.module().unwrap_or("?"),
                    megabytes(entry.size, sector_size),
                    entry.start,
                    (entry.start + entry.size).saturating_sub(1),
                    flags
                );
            }
            None => {
                let _ = writeln!(report, "  sector {}: extended partition table{}", record.sector, flags);
            }
        }
    }
    report
}

pub fn outcome_report(outcome: &CheckOutcome, sector_size: u64, verbose: bool) -> String {
    let mut report = table_report("Guessed primary partition table", &outcome.table, sector_size, verbose);
    let _ = writeln!(report);
    let _ = writeln!(report, "Overlapping guesses discarded: {}", outcome.discarded);
    let _ = writeln!(report, "Inconsistencies: {}", outcome.inconsistencies);
    if outcome.is_consistent() {
        let _ = writeln!(report, "The guessed table is consistent.");
    }
    report
}
