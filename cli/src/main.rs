mod prompt;

use anyhow::{bail, Context};
use clap::{ArgAction, Parser};
use log::{info, warn, LevelFilter};
use parthunt_core::disk::{backup_sector0, write_primary_table};
use parthunt_core::report::{chain_report, guess_report, outcome_report, table_report};
use parthunt_core::{
    check_guesses, compare_tables, table_problems, AcceptAll, Disk, DiskOptions, GeometryOverride, GeometryProvider,
    GuessConfirmer, Increment, ModuleRegistry, RunContext, ScanConfig, Scanner, SectorAddress, WeightOverride,
};
use parthunt_filesystems::{describe_modules, register_builtin_detectors, register_signature_file};
use parthunt_platform::PlatformGeometry;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "parthunt", version)]
#[command(about = "Guess lost PC partition tables by scanning a disk for filesystems", long_about = None)]
struct Cli {
    /// Disk or image to scan
    #[arg(required_unless_present = "list_modules")]
    device: Option<PathBuf>,

    /// Save sector 0 to this file before writing a new table
    #[arg(short = 'b', long)]
    backup: Option<PathBuf>,

    /// Disk geometry as cylinders,heads,sectors
    #[arg(short = 'C', long, value_parser = parse_chs)]
    geometry: Option<GeometryOverride>,

    /// Only check whether the guessed table matches the current one
    #[arg(short = 'c', long)]
    check: bool,

    /// Print the current tables and do not scan
    #[arg(short = 'd', long = "dont-guess")]
    dont_guess: bool,

    /// Do not look for extended partition tables
    #[arg(short = 'E', long = "no-extended")]
    no_extended: bool,

    /// Stop the scan on read errors
    #[arg(short = 'e', long = "stop-on-errors")]
    stop_on_errors: bool,

    /// Probe every candidate, also inside guessed partitions
    #[arg(short = 'f', long)]
    full: bool,

    /// Do not ask the OS for the disk geometry
    #[arg(short = 'g', long = "no-os-geometry")]
    no_os_geometry: bool,

    /// Confirm every guess
    #[arg(short = 'i', long)]
    interactive: bool,

    /// Last sector to probe
    #[arg(short = 'K', long = "last-sector")]
    last_sector: Option<SectorAddress>,

    /// Number of sectors to skip before the first probe
    #[arg(short = 'k', long = "skip")]
    skip: Option<SectorAddress>,

    /// List the detector modules and exit
    #[arg(short = 'L', long = "list-modules")]
    list_modules: bool,

    /// Also write all output to this file
    #[arg(short = 'l', long)]
    logfile: Option<PathBuf>,

    /// Scan increment: s(ector), h(ead), c(ylinder) or a sector count
    #[arg(short = 'n', long)]
    increment: Option<Increment>,

    /// No output on the terminal
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Sector size in bytes
    #[arg(short = 's', long = "sector-size")]
    sector_size: Option<u64>,

    /// More output; repeat for debug details
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    /// Write the guessed table to this device or file
    #[arg(short = 'W', long = "write")]
    write_device: Option<PathBuf>,

    /// Module weight as name,weight; may be repeated
    #[arg(short = 'w', long = "weight")]
    weights: Vec<WeightOverride>,

    /// Load scan settings from a JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Load extra signature detectors from a JSON file
    #[arg(long)]
    signatures: Option<PathBuf>,
}

impl Cli {
    /// Resolve the flags that switch each other off.
    fn normalize(&mut self) {
        if self.dont_guess {
            self.check = false;
        }
        if self.check {
            self.quiet = true;
            self.write_device = None;
        }
        if self.quiet {
            self.interactive = false;
        }
    }

    fn scan_config(&self) -> anyhow::Result<ScanConfig> {
        let mut config = match &self.config {
            Some(path) => ScanConfig::from_json_file(path)?,
            None => ScanConfig::default(),
        };
        if let Some(increment) = self.increment {
            config.increment = increment;
        }
        if self.skip.is_some() {
            config.start = self.skip;
        }
        if self.last_sector.is_some() {
            config.max_sector = self.last_sector;
        }
        if self.geometry.is_some() {
            config.geometry = self.geometry;
        }
        if self.sector_size.is_some() {
            config.sector_size = self.sector_size;
        }
        config.fast &= !self.full;
        config.test_extended &= !self.no_extended;
        config.skip_errors &= !self.stop_on_errors;
        config.query_geometry &= !self.no_os_geometry;
        config.interactive = (config.interactive || self.interactive) && !self.quiet;
        config.dont_guess |= self.dont_guess;
        config.weights.extend(self.weights.iter().cloned());
        config.validate()?;
        Ok(config)
    }
}

fn parse_chs(s: &str) -> Result<GeometryOverride, String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<u64>().map_err(|e| format!("'{}': {}", v, e)))
        .collect::<Result<Vec<_>, _>>()?;
    match values[..] {
        [cylinders, heads, sectors_per_track] => Ok(GeometryOverride {
            cylinders,
            heads,
            sectors_per_track,
        }),
        _ => Err(format!("expected cylinders,heads,sectors, got '{}'", s)),
    }
}

/// Reports go to the terminal unless quiet, and to the log file if any.
struct Output {
    quiet: bool,
    logfile: Option<File>,
}

impl Output {
    fn print(&mut self, text: &str) {
        if !self.quiet {
            print!("{}", text);
        }
        if let Some(file) = self.logfile.as_mut() {
            let _ = file.write_all(text.as_bytes());
        }
    }
}

/// Hex dump of the raw master boot block, 16 bytes per line.
fn boot_block_dump(sector0: &[u8]) -> String {
    let mut dump = String::from("Master boot block:\n");
    for (i, line) in sector0.chunks(16).enumerate() {
        dump.push_str(&format!("{:04X}: {}\n", i * 16, hex::encode(line)));
    }
    dump.push('\n');
    dump
}

fn init_logging(cli: &Cli, logfile: Option<&File>) -> anyhow::Result<()> {
    let level = match cli.verbose {
        _ if cli.quiet && logfile.is_none() => LevelFilter::Error,
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp(None).parse_default_env();
    if let Some(file) = logfile {
        builder.target(env_logger::Target::Pipe(Box::new(file.try_clone()?)));
    }
    builder.init();
    Ok(())
}

fn build_registry(cli: &Cli) -> anyhow::Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    register_builtin_detectors(&mut registry)?;
    if let Some(path) = &cli.signatures {
        let count = register_signature_file(&mut registry, path)
            .with_context(|| format!("loading signatures from {}", path.display()))?;
        info!("loaded {} signature detectors from {}", count, path.display());
    }
    Ok(registry)
}

fn main() -> anyhow::Result<ExitCode> {
    let mut cli = Cli::parse();
    cli.normalize();

    let logfile = match &cli.logfile {
        Some(path) => Some(File::create(path).with_context(|| format!("creating {}", path.display()))?),
        None => None,
    };
    init_logging(&cli, logfile.as_ref())?;
    let mut out = Output {
        quiet: cli.quiet,
        logfile,
    };

    let config = cli.scan_config()?;
    let mut registry = build_registry(&cli)?;

    if cli.list_modules {
        for weight in &config.weights {
            registry.set_weight(&weight.module, weight.weight)?;
        }
        for line in describe_modules(&registry) {
            println!("{}", line);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let Some(device) = cli.device.clone() else {
        bail!("no device given");
    };
    let options = DiskOptions {
        sector_size: config.sector_size,
        geometry: config.geometry,
        query_geometry: config.query_geometry,
    };
    let disk = Disk::open(&device, &options, &PlatformGeometry)
        .with_context(|| format!("opening {}", device.display()))?;
    let sector_size = disk.sector_size();
    let verbose = cli.verbose > 0;

    let geometry = disk.geometry();
    out.print(&format!(
        "\nBegin scan of {}: {} sectors of {} bytes, geometry {}/{}/{}{}\n\n",
        device.display(),
        disk.total_sectors(),
        sector_size,
        geometry.cylinders,
        geometry.heads,
        geometry.sectors_per_track,
        if disk.is_lba() { " (LBA)" } else { "" }
    ));

    if cli.verbose > 2 {
        out.print(&boot_block_dump(disk.sector0()));
    }
    if !cli.check {
        out.print(&table_report("Primary partition table", disk.primary_table(), sector_size, verbose));
        out.print(&chain_report(disk.extended_chain(), sector_size, verbose));
    }
    if config.dont_guess {
        return Ok(ExitCode::SUCCESS);
    }

    let interactive = config.interactive;
    let mut ctx = RunContext::new(config, disk, registry)?;
    let mut confirmer: Box<dyn GuessConfirmer> = if interactive {
        Box::new(prompt::Confirm::stdin(sector_size))
    } else {
        Box::new(AcceptAll)
    };
    let mut scan = Scanner::new(&mut ctx, confirmer.as_mut())
        .run()
        .with_context(|| format!("scanning {}", device.display()))?;
    // releases the stdin lock held by the interactive confirmer
    drop(confirmer);
    if scan.read_errors > 0 {
        warn!("{} read errors during the scan", scan.read_errors);
    }

    let check = check_guesses(&ctx.disk, &mut scan.records);
    out.print(&format!("\nEnd scan, {} sectors probed.\n\n", scan.sectors_probed));
    out.print(&guess_report(&scan.records, sector_size));
    out.print(&outcome_report(&check, sector_size, verbose));

    if cli.check {
        let status = if check.inconsistencies > 0 {
            check.inconsistencies
        } else {
            compare_tables(ctx.disk.primary_table(), &check.table)
        };
        return Ok(ExitCode::from(status.min(u8::MAX as usize) as u8));
    }

    if let Some(target) = &cli.write_device {
        if !check.is_consistent() {
            bail!("the guessed table is inconsistent, not writing it to {}", target.display());
        }
        let mut table = check.table.clone();
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut terminal = io::stdout();

        prompt::edit_table(&mut input, &mut terminal, &mut table, ctx.disk.geometry(), sector_size);
        let problems = table_problems(&table, ctx.disk.total_sectors());
        if !problems.is_empty() {
            for problem in &problems {
                warn!("{}", problem);
            }
            bail!("the edited table is inconsistent, not writing it to {}", target.display());
        }

        if let Some(n) = prompt::number_or_quit(&mut input, &mut terminal, "Activate which partition", 1, 4) {
            if table.entries[n - 1].is_empty() {
                warn!("partition {} is unused, none marked active", n);
            } else {
                for (i, entry) in table.entries.iter_mut().enumerate() {
                    entry.flag = if i == n - 1 { 0x80 } else { 0 };
                }
            }
        }

        if !prompt::yes_no(&mut input, &mut terminal, "Write this partition table") {
            out.print("Partition table not written\n");
            return Ok(ExitCode::SUCCESS);
        }
        if let Some(backup) = &cli.backup {
            backup_sector0(&ctx.disk, backup).with_context(|| format!("backing up to {}", backup.display()))?;
        }
        let file = write_primary_table(target, &table).with_context(|| format!("writing {}", target.display()))?;
        PlatformGeometry.notify_table_changed(target, &file);
    }

    Ok(ExitCode::SUCCESS)
}
