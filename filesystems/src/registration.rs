use crate::detectors::*;
use crate::signature::load_signature_detectors;
use parthunt_core::{Detector, DetectorSource, ModuleRegistry, PartHuntError};
use std::path::Path;

/// All built-in detectors in their default evaluation order. Formats whose
/// first sectors could be mistaken for another format's come first.
pub fn builtin_detectors() -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(BsdDisklabelDetector),
        Box::new(SwapDetector),
        Box::new(Qnx4Detector),
        Box::new(ReiserfsDetector),
        Box::new(NtfsDetector),
        Box::new(HpfsDetector),
        Box::new(MinixDetector),
        Box::new(BeosDetector),
        Box::new(Ext2Detector),
        Box::new(FatDetector),
        Box::new(SolarisVtocDetector),
        Box::new(LvmDetector),
        Box::new(XfsDetector),
        Box::new(BtrfsDetector),
        Box::new(Lvm2Detector),
    ]
}

/// Register every built-in detector
pub fn register_builtin_detectors(registry: &mut ModuleRegistry) -> Result<(), PartHuntError> {
    for detector in builtin_detectors() {
        registry.register(detector, DetectorSource::Builtin)?;
    }
    log::debug!("Registered {} built-in detectors", registry.len());
    Ok(())
}

/// Register the signature detectors defined in `path`, after the built-ins.
pub fn register_signature_file(registry: &mut ModuleRegistry, path: &Path) -> Result<usize, PartHuntError> {
    let detectors = load_signature_detectors(path)?;
    let count = detectors.len();
    for detector in detectors {
        registry.register(Box::new(detector), DetectorSource::Loaded(path.to_path_buf()))?;
    }
    log::info!("Loaded {} detector(s) from {}", count, path.display());
    Ok(count)
}

/// One line per module: name, weight, origin and description.
pub fn describe_modules(registry: &ModuleRegistry) -> Vec<String> {
    registry
        .modules()
        .iter()
        .map(|m| {
            format!(
                "{:<10} {:.2}  {:<8} {}",
                m.name(),
                m.weight,
                m.source.to_string(),
                m.detector.description()
            )
        })
        .collect()
}
