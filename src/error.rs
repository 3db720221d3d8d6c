//! Client error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("layout error: {0}")]
    Layout(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0}")]
    Binding(String),

    #[error("initialization failed: {0}")]
    Init(String),

    #[error("renderer error: {0}")]
    Gpu(String),
}

impl From<ron::error::SpannedError> for ClientError {
    fn from(e: ron::error::SpannedError) -> Self {
        ClientError::Config(e.to_string())
    }
}

impl From<ron::Error> for ClientError {
    fn from(e: ron::Error) -> Self {
        ClientError::Config(e.to_string())
    }
}

impl From<kdl::KdlError> for ClientError {
    fn from(e: kdl::KdlError) -> Self {
        ClientError::Layout(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
