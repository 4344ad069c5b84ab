// Declarative signature detectors loaded from JSON at run time
use crate::fields::{bytes_at, has_bytes};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use parthunt_core::{
    Capabilities, Confidence, Detector, Disk, Guess, PartHuntError, Result, SectorAddress,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Where the filesystem size is stored and how to scale it to bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeField {
    pub offset: usize,
    /// Field width in bytes: 1, 2, 4 or 8.
    pub width: usize,
    #[serde(default)]
    pub endian: Endian,
    /// Bytes per unit of the stored value.
    #[serde(default = "default_unit")]
    pub unit: u64,
}

/// Largest window a signature may ask for; the built-in detectors stay well below it.
pub const MAX_SIGNATURE_WINDOW: usize = 128 * 1024;

fn default_unit() -> u64 {
    1
}

fn default_confidence() -> Confidence {
    Confidence::Yes
}

/// One entry of a signature file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub magic_offset: usize,
    /// Hex-encoded magic bytes.
    pub magic: String,
    pub partition_type: u8,
    pub size: SizeField,
    #[serde(default = "default_confidence")]
    pub confidence: Confidence,
    #[serde(default)]
    pub capabilities: Capabilities,
}

impl SizeField {
    fn read(&self, window: &[u8]) -> Option<u64> {
        let raw = bytes_at(window, self.offset, self.width)?;
        Some(match (self.width, self.endian) {
            (1, _) => raw[0] as u64,
            (2, Endian::Little) => LittleEndian::read_u16(raw) as u64,
            (2, Endian::Big) => BigEndian::read_u16(raw) as u64,
            (4, Endian::Little) => LittleEndian::read_u32(raw) as u64,
            (4, Endian::Big) => BigEndian::read_u32(raw) as u64,
            (8, Endian::Little) => LittleEndian::read_u64(raw),
            (8, Endian::Big) => BigEndian::read_u64(raw),
            _ => return None,
        })
    }
}

/// Matches a magic byte string and reads the size from a fixed field.
pub struct SignatureDetector {
    definition: SignatureDefinition,
    magic: Vec<u8>,
}

impl SignatureDetector {
    pub fn from_definition(definition: SignatureDefinition) -> Result<Self> {
        let invalid = |reason: String| PartHuntError::detector(definition.name.clone(), reason);
        let magic = hex::decode(&definition.magic).map_err(|e| invalid(format!("bad magic: {}", e)))?;
        if magic.is_empty() {
            return Err(invalid("magic must not be empty".to_string()));
        }
        if !matches!(definition.size.width, 1 | 2 | 4 | 8) {
            return Err(invalid(format!("unsupported size width {}", definition.size.width)));
        }
        if definition.size.unit == 0 {
            return Err(invalid("size unit must be non-zero".to_string()));
        }
        let detector = Self { definition, magic };
        match detector.window_end() {
            Some(end) if end <= MAX_SIGNATURE_WINDOW => Ok(detector),
            _ => Err(PartHuntError::detector(
                detector.definition.name.clone(),
                format!("magic and size field must lie within the first {} bytes", MAX_SIGNATURE_WINDOW),
            )),
        }
    }

    fn window_end(&self) -> Option<usize> {
        let magic_end = self.definition.magic_offset.checked_add(self.magic.len())?;
        let size_end = self.definition.size.offset.checked_add(self.definition.size.width)?;
        Some(magic_end.max(size_end))
    }

    pub fn window_size(&self) -> usize {
        self.window_end().unwrap_or(MAX_SIGNATURE_WINDOW)
    }

    /// Size in bytes when the magic matches.
    fn inspect(&self, window: &[u8]) -> Option<u64> {
        if !has_bytes(window, self.definition.magic_offset, &self.magic) {
            return None;
        }
        let bytes = self.definition.size.read(window)?.checked_mul(self.definition.size.unit)?;
        (bytes > 0).then_some(bytes)
    }
}

impl Detector for SignatureDetector {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    fn capabilities(&self) -> Capabilities {
        self.definition.capabilities
    }

    fn init(&mut self, _disk: &Disk) -> Result<usize> {
        Ok(self.window_size())
    }

    fn probe(&mut self, disk: &mut Disk, window: &[u8], sector: SectorAddress) -> Result<Guess> {
        Ok(match self.inspect(window) {
            Some(bytes) => Guess::new(
                self.definition.confidence,
                self.definition.partition_type,
                sector,
                bytes / disk.sector_size(),
            ),
            None => Guess::no(),
        })
    }
}

/// Parse a JSON array of signature definitions.
pub fn parse_signature_detectors(json: &str) -> Result<Vec<SignatureDetector>> {
    let definitions: Vec<SignatureDefinition> = serde_json::from_str(json)?;
    definitions.into_iter().map(SignatureDetector::from_definition).collect()
}

pub fn load_signature_detectors(path: &Path) -> Result<Vec<SignatureDetector>> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        PartHuntError::Configuration(format!("cannot read signature file {}: {}", path.display(), e))
    })?;
    let detectors = parse_signature_detectors(&json)?;
    log::debug!("Loaded {} signature detectors from {}", detectors.len(), path.display());
    Ok(detectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{blank_image, memory_disk, put_be32};
    use parthunt_core::Alignment;

    const SQUASHFS: &str = r#"[
        {
            "name": "squashfs",
            "description": "SquashFS image",
            "magic_offset": 0,
            "magic": "68737173",
            "partition_type": 131,
            "size": { "offset": 40, "width": 8 },
            "capabilities": { "alignment": "head" }
        }
    ]"#;

    #[test]
    fn test_parse_defaults() {
        let detectors = parse_signature_detectors(SQUASHFS).unwrap();
        assert_eq!(detectors.len(), 1);
        let d = &detectors[0];
        assert_eq!(d.name(), "squashfs");
        assert_eq!(d.magic, b"hsqs");
        assert_eq!(d.definition.confidence, Confidence::Yes);
        assert_eq!(d.definition.size.endian, Endian::Little);
        assert_eq!(d.capabilities().alignment, Alignment::Head);
        assert!(!d.capabilities().excluded_inside_extended);
        assert_eq!(d.window_size(), 48);
    }

    #[test]
    fn test_probe_reads_size_field() {
        let mut detectors = parse_signature_detectors(SQUASHFS).unwrap();
        let mut window = vec![0u8; 48];
        window[..4].copy_from_slice(b"hsqs");
        window[40..48].copy_from_slice(&(1024u64 * 1024).to_le_bytes());

        let mut disk = memory_disk(blank_image(16));
        let guess = detectors[0].probe(&mut disk, &window, 63).unwrap();
        assert_eq!(guess.confidence, Confidence::Yes);
        assert_eq!(guess.entry.partition_type, 0x83);
        assert_eq!(guess.entry.start, 63);
        assert_eq!(guess.entry.size, 2048);

        window[0] = b'x';
        assert_eq!(detectors[0].probe(&mut disk, &window, 63).unwrap().confidence, Confidence::No);
    }

    #[test]
    fn test_big_endian_with_unit() {
        let json = r#"[{"name": "blocks", "magic_offset": 8, "magic": "cafe",
            "partition_type": 7, "size": {"offset": 0, "width": 4, "endian": "big", "unit": 4096},
            "confidence": "perhaps"}]"#;
        let detectors = parse_signature_detectors(json).unwrap();
        let mut window = vec![0u8; 10];
        put_be32(&mut window, 0, 3);
        window[8] = 0xCA;
        window[9] = 0xFE;
        assert_eq!(detectors[0].inspect(&window), Some(3 * 4096));
        assert_eq!(detectors[0].definition.confidence, Confidence::Perhaps);
    }

    #[test]
    fn test_rejects_bad_definitions() {
        let bad_hex = r#"[{"name": "x", "magic_offset": 0, "magic": "zz",
            "partition_type": 1, "size": {"offset": 0, "width": 4}}]"#;
        assert!(parse_signature_detectors(bad_hex).is_err());

        let bad_width = r#"[{"name": "x", "magic_offset": 0, "magic": "aa",
            "partition_type": 1, "size": {"offset": 0, "width": 3}}]"#;
        assert!(parse_signature_detectors(bad_width).is_err());

        assert!(parse_signature_detectors("{}").is_err());
    }

    #[test]
    fn test_rejects_offsets_past_window_limit() {
        let far_magic = r#"[{"name": "far", "magic_offset": 4294967296, "magic": "aa",
            "partition_type": 1, "size": {"offset": 0, "width": 4}}]"#;
        assert!(parse_signature_detectors(far_magic).is_err());

        let far_size = format!(
            r#"[{{"name": "far", "magic_offset": 0, "magic": "aa",
            "partition_type": 1, "size": {{"offset": {}, "width": 8}}}}]"#,
            MAX_SIGNATURE_WINDOW - 4
        );
        assert!(parse_signature_detectors(&far_size).is_err());

        let overflow = format!(
            r#"[{{"name": "wrap", "magic_offset": {}, "magic": "aabb",
            "partition_type": 1, "size": {{"offset": 0, "width": 4}}}}]"#,
            usize::MAX
        );
        assert!(parse_signature_detectors(&overflow).is_err());

        let at_limit = format!(
            r#"[{{"name": "edge", "magic_offset": 0, "magic": "aa",
            "partition_type": 1, "size": {{"offset": {}, "width": 8}}}}]"#,
            MAX_SIGNATURE_WINDOW - 8
        );
        let detectors = parse_signature_detectors(&at_limit).unwrap();
        assert_eq!(detectors[0].window_size(), MAX_SIGNATURE_WINDOW);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.json");
        std::fs::write(&path, SQUASHFS).unwrap();
        assert_eq!(load_signature_detectors(&path).unwrap().len(), 1);
        assert!(load_signature_detectors(&dir.path().join("missing.json")).is_err());
    }
}
