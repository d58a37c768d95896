use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("invalid controller interval {0:?}: must be a positive duration")]
    InvalidInterval(String),
}
