use std::fmt::Debug;
use thiserror::Error;

/// Everything that can go wrong when building or querying a model.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum HmmError {
    /// A state or observation is missing from a table or from the initial distribution.
    #[error("unknown label: {label}")]
    UnknownLabel { label: String },

    #[error("malformed distribution: {reason}")]
    MalformedDistribution { reason: String },

    #[error("length mismatch: {states} states but {observations} observations")]
    LengthMismatch { states: usize, observations: usize },

    #[error("the sequence of observations is empty")]
    EmptySequence,

    #[error("the training corpus is empty")]
    EmptyCorpus,

    /// Every state has probability zero at `time`, so the observations cannot have been
    /// produced by the model.
    #[error("observations are impossible under the model (zero probability at time {time})")]
    ImpossibleObservations { time: usize },
}

impl HmmError {
    pub(crate) fn unknown_label<L: Debug>(label: &L) -> Self {
        Self::UnknownLabel {
            label: format!("{:?}", label),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedDistribution {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HmmError>;
