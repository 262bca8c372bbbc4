use thiserror::Error;

#[derive(Error, Debug)]
pub enum KVError {
    #[error("storage error: {0}")]
    Storage(String),

    /// A stored value is not the JSON the caller asked for.
    #[error("decode {key}: {message}")]
    Decode { key: String, message: String },

    #[error("encode {key}: {message}")]
    Encode { key: String, message: String },
}
