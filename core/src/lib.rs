pub mod checker;
pub mod config;
pub mod context;
pub mod detector;
pub mod disk;
pub mod error;
pub mod extended;
pub mod geometry;
pub mod guess;
pub mod partition;
pub mod registry;
pub mod report;
pub mod scanner;

pub use checker::{check_guesses, table_problems, CheckOutcome};
pub use config::{Increment, ScanConfig, WeightOverride};
pub use context::RunContext;
pub use detector::{Alignment, Capabilities, Confidence, Detector, DetectorSource, Guess};
pub use disk::{Disk, DiskOptions, GeometryOverride};
pub use error::{PartHuntError, Result};
pub use extended::{ChainError, ExtendedChain, ExtendedLink};
pub use geometry::{DiskGeometry, GeometryProvider, ImageGeometry};
pub use guess::{AcceptAll, GuessConfirmer, GuessFlags, GuessPayload, GuessRecord};
pub use partition::{compare_tables, partition_type_name, PartitionEntry, PrimaryPartitionTable, SectorAddress};
pub use registry::{ModuleRegistry, RegisteredModule};
pub use scanner::{ScanOutcome, ScanState, Scanner};
