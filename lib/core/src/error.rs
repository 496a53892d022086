use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Index out of range: {index} (capacity {capacity})")]
    OutOfRange { index: usize, capacity: usize },

    #[error("Similarity ({0}, {1}) is not populated")]
    Unpopulated(usize, usize),

    #[error("Invalid similarity value: {0}")]
    InvalidValue(f64),

    #[error("Capacity mismatch: expected {expected}, got {actual}")]
    CapacityMismatch { expected: usize, actual: usize },

    #[error("Empty dataset list")]
    EmptyDatasets,

    #[error("Missing required option: {0}")]
    MissingOption(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown estimator type: {0}")]
    UnknownEstimator(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Parse error in {path:?} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Script timed out after {0:?}")]
    ScriptTimeout(std::time::Duration),

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Node {0} already merged or not known")]
    NotMergeable(usize),
}
