// Sector scanner: probes every candidate position and collects guesses
use crate::context::RunContext;
use crate::detector::GUESS_THRESHOLD;
use crate::disk::ReadOutcome;
use crate::error::{PartHuntError, Result};
use crate::guess::{GuessConfirmer, GuessRecord};
use crate::partition::{count_extended, PartitionEntry, PrimaryPartitionTable, SectorAddress};
use log::{debug, info, warn};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Scanning,
    InExtendedRegion,
    EndOfScan,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub records: Vec<GuessRecord>,
    /// Candidate positions whose window was read.
    pub sectors_probed: u64,
    /// Recovered read errors and short reads.
    pub read_errors: u64,
}

/// Best candidate of one guess round.
#[derive(Debug, Clone)]
struct Candidate {
    index: usize,
    module: String,
    score: f32,
    entry: PartitionEntry,
    resembles_sector0_table: bool,
}

pub struct Scanner<'a> {
    ctx: &'a mut RunContext,
    confirmer: &'a mut dyn GuessConfirmer,
    state: ScanState,
    end_of_chain: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(ctx: &'a mut RunContext, confirmer: &'a mut dyn GuessConfirmer) -> Self {
        Self {
            ctx,
            confirmer,
            state: ScanState::Scanning,
            end_of_chain: false,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Initialize the modules, scan the device and terminate the modules.
    pub fn run(&mut self) -> Result<ScanOutcome> {
        let block_size = self.init_modules()?;
        let result = self.scan(block_size);
        self.term_modules();
        self.state = ScanState::EndOfScan;
        result
    }

    /// Returns the scan window size: the largest module window rounded
    /// up to whole sectors.
    fn init_modules(&mut self) -> Result<usize> {
        let RunContext { disk, registry, .. } = &mut *self.ctx;
        let sector_size = disk.sector_size() as usize;
        let mut block_size = sector_size;

        for module in registry.modules_mut() {
            match module.detector.init(disk) {
                Ok(size) => {
                    module.disabled = false;
                    block_size = block_size.max(size);
                }
                Err(e) => {
                    warn!("{}: init failed, excluded from this run: {}", module.name(), e);
                    module.disabled = true;
                }
            }
        }

        if registry.modules().iter().all(|m| m.disabled) {
            return Err(PartHuntError::Configuration("no usable detector modules".to_string()));
        }
        Ok(block_size.div_ceil(sector_size) * sector_size)
    }

    fn term_modules(&mut self) {
        let RunContext { disk, registry, .. } = &mut *self.ctx;
        for module in registry.modules_mut().iter_mut().filter(|m| !m.disabled) {
            module.detector.term(disk);
        }
    }

    fn scan(&mut self, block_size: usize) -> Result<ScanOutcome> {
        let geometry = *self.ctx.disk.geometry();
        let total = geometry.total_sectors;
        let sector_size = self.ctx.disk.sector_size();
        let window_sectors = block_size as u64 / sector_size;
        let increment = self.ctx.config.increment.sectors(&geometry);
        let on_boundary = |sector: SectorAddress| {
            if increment == 1 {
                geometry.is_head_boundary(sector)
            } else {
                geometry.is_cylinder_boundary(sector)
            }
        };

        let mut outcome = ScanOutcome::default();
        let mut window = vec![0u8; block_size];
        let mut sector = self.ctx.config.start.unwrap_or(geometry.sectors_per_track);
        self.state = ScanState::Scanning;
        self.end_of_chain = false;

        info!(
            "scanning {} from sector {} in steps of {} sector(s), window {} bytes",
            self.ctx.disk.path().display(),
            sector,
            increment,
            block_size
        );

        while sector < total {
            if matches!(self.ctx.config.max_sector, Some(max) if sector > max) {
                break;
            }

            match self.ctx.disk.read_window(sector, &mut window) {
                ReadOutcome::Full => {}
                ReadOutcome::Eof => break,
                ReadOutcome::Short(n) => {
                    if sector + window_sectors + 1 >= total {
                        debug!("short read at sector {} near end of device", sector);
                        break;
                    }
                    outcome.read_errors += 1;
                    let resync = (sector * sector_size + n as u64) / sector_size;
                    warn!(
                        "short read at sector {} ({} of {} bytes), resuming at sector {}",
                        sector,
                        n,
                        block_size,
                        resync.max(sector + 1)
                    );
                    sector = resync.max(sector + 1);
                    continue;
                }
                ReadOutcome::Failed(e) => {
                    if self.ctx.config.skip_errors && is_skippable(&e) {
                        outcome.read_errors += 1;
                        warn!("read error at sector {}: {}, skipping {} sector(s)", sector, e, increment);
                        sector += increment;
                        continue;
                    }
                    return Err(PartHuntError::Read(format!("sector {}: {}", sector, e)));
                }
            }
            outcome.sectors_probed += 1;

            let skip_to = self.examine(sector, &window, on_boundary(sector), &mut outcome.records)?;
            sector += match skip_to {
                Some(size) if self.ctx.config.fast => size.div_ceil(increment) * increment,
                _ => increment,
            };
        }

        Ok(outcome)
    }

    /// Run the guess rounds for one position. Returns the size to
    /// fast-forward by when a guess was recorded.
    fn examine(
        &mut self,
        sector: SectorAddress,
        window: &[u8],
        on_boundary: bool,
        records: &mut Vec<GuessRecord>,
    ) -> Result<Option<u64>> {
        self.ctx.registry.reset_skips();
        let total = self.ctx.disk.total_sectors();

        loop {
            let best = self.best_guess(sector, window)?;
            let mut pending = best.as_ref().map_or(0, |b| b.entry.size);
            let mut have_link = false;

            if self.ctx.config.test_extended
                && on_boundary
                && !best.as_ref().is_some_and(|b| b.resembles_sector0_table)
            {
                if let Some(table) = extended_table_at(window, total) {
                    if self.state != ScanState::InExtendedRegion {
                        info!("possible extended partition at sector {}", sector);
                    }
                    if self.confirmer.confirm_extended(sector, &table) {
                        if self.state != ScanState::InExtendedRegion {
                            self.state = ScanState::InExtendedRegion;
                            self.end_of_chain = false;
                            pending = 0;
                        }
                        if count_extended(&table.entries) == 0 {
                            self.end_of_chain = true;
                        }
                        records.push(GuessRecord::link(sector, &table));
                        have_link = true;
                    } else if let Some(b) = &best {
                        self.ctx.registry.modules_mut()[b.index].skip = true;
                        continue;
                    }
                }
            }

            if !have_link && pending > 0 {
                if let Some(b) = &best {
                    info!(
                        "Possible partition({}), size({} MB), offset({} MB)",
                        b.entry.type_name(),
                        b.entry.size * self.ctx.disk.sector_size() / (1024 * 1024),
                        b.entry.start * self.ctx.disk.sector_size() / (1024 * 1024)
                    );
                    if !self.confirmer.confirm_guess(&b.module, sector, &b.entry) {
                        self.ctx.registry.modules_mut()[b.index].skip = true;
                        continue;
                    }
                    records.push(GuessRecord::single(sector, b.module.clone(), b.entry));
                    if self.end_of_chain {
                        self.state = ScanState::Scanning;
                        self.end_of_chain = false;
                    }
                }
            }

            return Ok((pending > 0).then_some(pending));
        }
    }

    /// Probe every eligible module at `sector`; highest weighted score
    /// wins, earlier modules win ties.
    fn best_guess(&mut self, sector: SectorAddress, window: &[u8]) -> Result<Option<Candidate>> {
        let in_extended = self.state == ScanState::InExtendedRegion;
        let RunContext { disk, registry, .. } = &mut *self.ctx;
        let geometry = *disk.geometry();
        let mut best: Option<Candidate> = None;

        for (index, module) in registry.modules_mut().iter_mut().enumerate() {
            if module.disabled || module.skip {
                continue;
            }
            let caps = module.detector.capabilities();
            if (caps.excluded_inside_extended && in_extended) || !caps.alignment.admits(sector, &geometry) {
                continue;
            }

            let cursor = disk.position()?;
            let guess = match module.detector.probe(disk, window, sector) {
                Ok(guess) => guess,
                Err(e) => {
                    debug!("{}: probe at sector {} failed: {}", module.name(), sector, e);
                    Default::default()
                }
            };
            disk.set_position(cursor)?;

            let score = guess.confidence.value() * module.weight;
            if score < GUESS_THRESHOLD {
                continue;
            }
            let end = guess.entry.start.checked_add(guess.entry.size);
            if end.map_or(true, |end| end > geometry.total_sectors) {
                debug!(
                    "{}: guess at sector {} with {} sectors runs past the end of the disk, ignored",
                    module.name(),
                    sector,
                    guess.entry.size
                );
                continue;
            }
            debug!("{}: {:?} at sector {} (score {:.2})", module.name(), guess.confidence, sector, score);
            if best.as_ref().map_or(true, |b| score > b.score) {
                let mut entry = guess.entry;
                entry.fill_chs(&geometry);
                best = Some(Candidate {
                    index,
                    module: module.name().to_string(),
                    score,
                    entry,
                    resembles_sector0_table: caps.resembles_sector0_table,
                });
            }
        }
        Ok(best)
    }
}

fn extended_table_at(window: &[u8], total_sectors: u64) -> Option<PrimaryPartitionTable> {
    PrimaryPartitionTable::parse(window)
        .ok()
        .filter(|t| t.is_extended_table(total_sectors))
}

/// Device-level errors the scan may step over.
fn is_skippable(e: &io::Error) -> bool {
    #[cfg(unix)]
    {
        matches!(e.raw_os_error(), Some(libc::EIO) | Some(libc::EBUSY))
    }
    #[cfg(not(unix))]
    {
        let _ = e;
        false
    }
}
