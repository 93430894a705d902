use thiserror::Error;

/// Failures raised inside the pipeline. None of them leave [`crate::sanitize`];
/// the pipeline recovers from each one locally.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("malformed markup at byte {position}: {message}")]
    Malformed { position: u64, message: String },
    #[error("element nesting exceeds {0} levels")]
    DepthExceeded(usize),
    #[error("invalid rule pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl FilterError {
    pub(crate) fn malformed(position: u64, message: impl ToString) -> Self {
        FilterError::Malformed {
            position,
            message: message.to_string(),
        }
    }
}

pub type FilterResult<T> = Result<T, FilterError>;
