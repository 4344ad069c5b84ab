// Built-in filesystem and volume detectors
// One module per on-disk format; each recognizes the format at a probe sector

pub mod beos;
pub mod bsd_disklabel;
pub mod btrfs;
pub mod ext2;
pub mod fat;
pub mod hpfs;
pub mod lvm;
pub mod lvm2;
pub mod minix;
pub mod ntfs;
pub mod qnx4;
pub mod reiserfs;
pub mod solaris;
pub mod swap;
pub mod xfs;

pub use beos::BeosDetector;
pub use bsd_disklabel::BsdDisklabelDetector;
pub use btrfs::BtrfsDetector;
pub use ext2::Ext2Detector;
pub use fat::FatDetector;
pub use hpfs::HpfsDetector;
pub use lvm::LvmDetector;
pub use lvm2::Lvm2Detector;
pub use minix::MinixDetector;
pub use ntfs::NtfsDetector;
pub use qnx4::Qnx4Detector;
pub use reiserfs::ReiserfsDetector;
pub use solaris::SolarisVtocDetector;
pub use swap::SwapDetector;
pub use xfs::XfsDetector;
