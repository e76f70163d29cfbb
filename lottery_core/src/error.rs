use thiserror::Error;

/// Failures surfaced by the commitment and encoding core.
///
/// None of these are retried internally. A failure while building an
/// instruction means the instruction is never produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LotteryError {
    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("Value does not match schema: {0}")]
    SchemaMismatch(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No valid bump found for seed tag {seed_tag}")]
    DerivationExhausted { seed_tag: &'static str },

    #[error("Invalid prize weights: {0}")]
    InvalidWeights(String),

    #[error("Invalid pool amount: {0}")]
    InvalidPool(String),

    #[error("Draw cycle cannot move from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, LotteryError>;
