use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("shape mismatch in {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("ADC of event {event} in repetition {rep} differs between signal and sequence")]
    AdcMaskMismatch { event: usize, rep: usize },
    #[error("trajectory is not Cartesian: {0}")]
    NonCartesian(String),
    #[error("sequence contains no events")]
    EmptySequence,
    #[error("pulseq file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    /// pulseq-rs errors are only guaranteed to be `Debug`, so they are kept as text
    #[error("failed to parse pulseq sequence: {0}")]
    Pulseq(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn check_shape(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            what,
            expected,
            found,
        })
    }
}
