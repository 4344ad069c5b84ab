// Interactive prompts on stdin/stdout
use parthunt_core::report::{entry_report, table_report};
use parthunt_core::{DiskGeometry, GuessConfirmer, PartitionEntry, PrimaryPartitionTable, SectorAddress};
use std::io::{self, BufRead, Write};

/// Ask a yes/no question. End of input counts as "no".
pub fn yes_no<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> bool {
    loop {
        let _ = write!(output, "{} (y/n) ", question);
        let _ = output.flush();
        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return false,
            Ok(_) => {}
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return true,
            "n" | "no" => return false,
            _ => continue,
        }
    }
}

/// Ask for a number in `min..=max`; "q" or end of input gives `None`.
pub fn number_or_quit<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
    min: usize,
    max: usize,
) -> Option<usize> {
    loop {
        let _ = write!(output, "{} ({}-{}, q to quit) ", question, min, max);
        let _ = output.flush();
        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
        let answer = line.trim();
        if answer.eq_ignore_ascii_case("q") {
            return None;
        }
        if let Ok(n) = answer.parse::<usize>() {
            if (min..=max).contains(&n) {
                return Some(n);
            }
        }
    }
}

/// Parse a number the way strtoul with base 0 would for 0x and decimal input.
fn parse_value(text: &str) -> Option<u64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Hand-edit start, size and type of one entry until the user quits.
pub fn edit_entry<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    entry: &mut PartitionEntry,
    geometry: &DiskGeometry,
) {
    loop {
        let _ = writeln!(output, "\nValues are not checked until the table is written.");
        let _ = writeln!(output, "1 - start sector: {}", entry.start);
        let _ = writeln!(output, "2 - size in sectors: {}", entry.size);
        let _ = writeln!(output, "3 - type: 0x{:02X} ({})", entry.partition_type, entry.type_name());
        let Some(item) = number_or_quit(input, output, "Edit which value", 1, 3) else {
            return;
        };

        let _ = write!(output, "Enter value for {}: ", item);
        let _ = output.flush();
        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let Some(value) = parse_value(&line) else {
            let _ = writeln!(output, "'{}' is not a number", line.trim());
            continue;
        };
        match item {
            1 => entry.start = value,
            2 => entry.size = value,
            _ => entry.partition_type = (value & 0xFF) as u8,
        }
        entry.fill_chs(geometry);
    }
}

/// Offer to hand-edit the guessed table before it is written.
pub fn edit_table<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    table: &mut PrimaryPartitionTable,
    geometry: &DiskGeometry,
    sector_size: u64,
) {
    if !yes_no(input, output, "Edit this table") {
        return;
    }
    while let Some(n) = number_or_quit(input, output, "Edit which partition", 1, 4) {
        edit_entry(input, output, &mut table.entries[n - 1], geometry);
        let _ = write!(output, "{}", table_report("Edited primary partition table", table, sector_size, false));
    }
}

/// Confirms every extended table and every guess on the terminal.
pub struct Confirm<R, W> {
    input: R,
    output: W,
    sector_size: u64,
}

impl Confirm<io::StdinLock<'static>, io::Stdout> {
    pub fn stdin(sector_size: u64) -> Self {
        Self::new(io::stdin().lock(), io::stdout(), sector_size)
    }
}

impl<R: BufRead, W: Write> Confirm<R, W> {
    pub fn new(input: R, output: W, sector_size: u64) -> Self {
        Self {
            input,
            output,
            sector_size,
        }
    }
}

impl<R: BufRead, W: Write> GuessConfirmer for Confirm<R, W> {
    fn confirm_extended(&mut self, sector: SectorAddress, table: &PrimaryPartitionTable) -> bool {
        let _ = writeln!(self.output, "Possible extended partition table at sector {}:", sector);
        for (i, entry) in table.entries.iter().enumerate().filter(|(_, e)| !e.is_empty()) {
            let _ = write!(self.output, "{}", entry_report(i, entry, self.sector_size, false));
        }
        yes_no(&mut self.input, &mut self.output, "Accept this extended table?")
    }

    fn confirm_guess(&mut self, module: &str, sector: SectorAddress, entry: &PartitionEntry) -> bool {
        let _ = writeln!(self.output, "{} found a partition at sector {}:", module, sector);
        let _ = write!(self.output, "{}", entry_report(0, entry, self.sector_size, false));
        yes_no(&mut self.input, &mut self.output, "Accept this guess?")
    }
}
