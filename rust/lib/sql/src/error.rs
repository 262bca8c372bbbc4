use thiserror::Error;

#[derive(Error, Debug)]
pub enum SQLError {
    #[error("query error: {0}")]
    Query(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("unknown adapter: {0}")]
    UnknownAdapter(String),

    #[error("raw connection error: {0}")]
    Raw(String),
}
