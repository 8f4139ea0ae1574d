use thiserror::Error;

#[derive(Error, Debug)]
pub enum KioskError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Api(#[from] crate::hardware::ApiError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type KioskResult<T> = Result<T, KioskError>;
