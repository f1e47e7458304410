use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Backend reported failure: {0}")]
    Backend(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Volume buffer of {actual} bytes does not match dimensions {dims:?}")]
    InvalidDimensions {
        dims: (usize, usize, usize),
        actual: usize,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ImagingError>;
