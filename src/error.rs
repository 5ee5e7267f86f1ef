use thiserror::Error;

pub type StyleResult<T> = Result<T, StyleError>;

#[derive(Debug, Error)]
pub enum StyleError {
    /// A value outside one of the closed enumerations reached the core.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown preset '{0}'")]
    UnknownPreset(String),

    /// The persona/preset catalog failed validation while loading.
    #[error("style catalog error: {0}")]
    Catalog(String),

    #[error("entropy source unavailable: {0}")]
    Entropy(String),

    /// Connection failure or a non-success status from the generation service.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered, but not with a usable image list.
    #[error("decode error: {0}")]
    Decode(String),
}

impl StyleError {
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            StyleError::UnknownPreset(_) | StyleError::InvalidArgument(_)
        )
    }
}

impl From<serde_json::Error> for StyleError {
    fn from(err: serde_json::Error) -> Self {
        StyleError::Decode(err.to_string())
    }
}

impl From<serde_yaml::Error> for StyleError {
    fn from(err: serde_yaml::Error) -> Self {
        StyleError::Catalog(err.to_string())
    }
}
