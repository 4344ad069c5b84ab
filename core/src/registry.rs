use crate::detector::{Detector, DetectorSource};
use crate::error::{PartHuntError, Result};

pub const DEFAULT_WEIGHT: f32 = 1.0;

pub struct RegisteredModule {
    pub detector: Box<dyn Detector>,
    pub source: DetectorSource,
    pub weight: f32,
    /// Excluded for the rest of this run (init failed).
    pub disabled: bool,
    /// Skipped for the current scan round.
    pub skip: bool,
}

impl RegisteredModule {
    pub fn name(&self) -> &str {
        self.detector.name()
    }
}

/// Detector modules in evaluation order.
pub struct ModuleRegistry {
    modules: Vec<RegisteredModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self { modules: Vec::new() }
    }

    pub fn register(&mut self, detector: Box<dyn Detector>, source: DetectorSource) -> Result<()> {
        if self.lookup(detector.name()).is_some() {
            return Err(PartHuntError::Configuration(format!(
                "detector '{}' is already registered",
                detector.name()
            )));
        }
        self.modules.push(RegisteredModule {
            detector,
            source,
            weight: DEFAULT_WEIGHT,
            disabled: false,
            skip: false,
        });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&RegisteredModule> {
        self.modules.iter().find(|m| m.name() == name)
    }

    /// Change a module's weight and move it to the front of the order.
    pub fn set_weight(&mut self, name: &str, weight: f32) -> Result<()> {
        if !(weight > 0.0 && weight <= 1.0) {
            return Err(PartHuntError::Configuration(format!(
                "weight {} for '{}' must be in (0, 1]",
                weight, name
            )));
        }
        let index = self
            .modules
            .iter()
            .position(|m| m.name() == name)
            .ok_or_else(|| PartHuntError::Configuration(format!("unknown detector '{}'", name)))?;
        let mut module = self.modules.remove(index);
        module.weight = weight;
        self.modules.insert(0, module);
        Ok(())
    }

    pub fn reset_skips(&mut self) {
        for module in &mut self.modules {
            module.skip = false;
        }
    }

    pub fn list_modules(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn modules(&self) -> &[RegisteredModule] {
        &self.modules
    }

    pub fn modules_mut(&mut self) -> &mut [RegisteredModule] {
        &mut self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Guess;
    use crate::disk::Disk;
    use crate::partition::SectorAddress;

    struct Named(&'static str);

    impl Detector for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test detector"
        }
        fn init(&mut self, _disk: &Disk) -> Result<usize> {
            Ok(512)
        }
        fn probe(&mut self, _disk: &mut Disk, _window: &[u8], _sector: SectorAddress) -> Result<Guess> {
            Ok(Guess::no())
        }
    }

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        for name in ["a", "b", "c"] {
            registry.register(Box::new(Named(name)), DetectorSource::Builtin).unwrap();
        }
        registry
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = registry();
        assert!(registry.register(Box::new(Named("b")), DetectorSource::Builtin).is_err());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_set_weight_moves_to_front() {
        let mut registry = registry();
        registry.set_weight("c", 0.7).unwrap();
        assert_eq!(registry.list_modules(), vec!["c", "a", "b"]);
        assert_eq!(registry.lookup("c").map(|m| m.weight), Some(0.7));
        assert_eq!(registry.lookup("a").map(|m| m.weight), Some(DEFAULT_WEIGHT));
    }

    #[test]
    fn test_set_weight_errors() {
        let mut registry = registry();
        assert!(registry.set_weight("missing", 0.5).is_err());
        assert!(registry.set_weight("a", 0.0).is_err());
        assert!(registry.set_weight("a", 1.5).is_err());
    }

    #[test]
    fn test_reset_skips() {
        let mut registry = registry();
        registry.modules_mut()[1].skip = true;
        registry.reset_skips();
        assert!(registry.modules().iter().all(|m| !m.skip));
    }
}
