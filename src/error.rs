use thiserror::Error;

/// Every way a caramel build, query, or (de)serialization can fail.
///
/// Matches the taxonomy in the design doc: input errors are the caller's
/// fault and never retryable; `KeyCollision` is data pathology and is not
/// retryable either (re-seeding the master hasher can't undo a true 128-bit
/// collision); `SolverExhausted`/`FilterExhausted` are local-recovery
/// failures that already exhausted their own retries; `Deserialization` lets
/// a type-tag dispatcher move on to the next candidate type.
#[derive(Debug, Error)]
pub enum CaramelError {
    #[error("keys must be non-empty")]
    EmptyInput,

    #[error("keys and values must have the same length (got {keys} keys, {values} values)")]
    LengthMismatch { keys: usize, values: usize },

    #[error("unsupported value type for automatic backend inference")]
    UnsupportedValueType,

    #[error("128-bit hash collision between input keys at indices {0} and {1}")]
    KeyCollision(usize, usize),

    #[error("bucket {bucket} did not converge after {attempts} seed retries")]
    SolverExhausted { bucket: usize, attempts: u32 },

    #[error("prefilter construction did not converge after {attempts} seed retries")]
    FilterExhausted { attempts: u32 },

    #[error("bit index {index} out of range for a bitstring of length {len}")]
    InvalidOffset { index: usize, len: usize },

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[cfg(feature = "serde")]
    #[error("bincode error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CaramelError>;
