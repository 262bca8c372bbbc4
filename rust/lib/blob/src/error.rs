use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("unknown storage type: {0}")]
    UnknownType(String),
}
