use crate::location::Location;

/// Unified error type for the loda core.
///
/// `NotExpressible` deliberately has no variant here: per the formula
/// generator's contract it is a normal outcome, never an error, and is
/// represented as `Option::None` / `bool` at the call site.
#[derive(Debug, thiserror::Error)]
pub enum LodaError {
    #[error("parse error at {location}: {message}")]
    ParseError { message: String, location: Location },

    #[error("unsupported operand: {0}")]
    UnsupportedOperand(String),

    #[error("cycles exceeded: ran for more than {limit} cycles")]
    CyclesExceeded { limit: u64 },

    #[error("memory exceeded: cell index {index} is beyond the ceiling of {limit}")]
    MemoryExceeded { index: u64, limit: u64 },

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("internal error (this indicates a bug): {0}")]
    Internal(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type LodaResult<T> = Result<T, LodaError>;
