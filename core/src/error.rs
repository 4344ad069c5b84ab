use thiserror::Error;

#[derive(Debug, Error)]
pub enum PartHuntError {
    #[error("Cannot open device: {0}")]
    DeviceOpen(String),

    #[error("Cannot determine sector size: {0}")]
    SectorSize(String),

    #[error("Geometry unavailable: {0}")]
    Geometry(String),

    #[error("Read error: {0}")]
    Read(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Detector {name} failed: {reason}")]
    Detector { name: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PartHuntError>;

impl PartHuntError {
    pub fn detector(name: impl Into<String>, reason: impl Into<String>) -> Self {
        PartHuntError::Detector {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
