use crate::config::ScanConfig;
use crate::disk::Disk;
use crate::error::Result;
use crate::registry::ModuleRegistry;

/// Everything one run needs, threaded through the scanner and checker.
pub struct RunContext {
    pub config: ScanConfig,
    pub disk: Disk,
    pub registry: ModuleRegistry,
}

impl RunContext {
    /// Validates the configuration and applies its weight overrides.
    pub fn new(config: ScanConfig, disk: Disk, mut registry: ModuleRegistry) -> Result<Self> {
        config.validate()?;
        for w in &config.weights {
            registry.set_weight(&w.module, w.weight)?;
        }
        Ok(Self { config, disk, registry })
    }
}
