// Partition content detectors
pub mod detectors;
pub mod fields;
pub mod registration;
pub mod signature;

#[cfg(test)]
pub mod test_helpers;

pub use detectors::*;
pub use registration::{builtin_detectors, describe_modules, register_builtin_detectors, register_signature_file};
pub use signature::{load_signature_detectors, parse_signature_detectors, SignatureDefinition, SignatureDetector};
