use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown shape type: {0}")]
    UnknownShape(String),

    #[error("invalid {channel} range for '{label}'")]
    InvalidRange { label: String, channel: &'static str },

    #[error("duplicate label: {0}")]
    DuplicateLabel(String),

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("recorder is not responding")]
    RecorderDead,
}
