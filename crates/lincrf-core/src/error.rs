use thiserror::Error;

/// Errors that can occur during CRF scoring and decoding.
#[derive(Debug, Error)]
pub enum CrfError {
    /// A label name is not part of the tag registry.
    #[error("unknown label: {label:?}")]
    UnknownLabel {
        /// The label that could not be resolved.
        label: String,
    },

    /// A tag id is outside `0..num_labels`.
    #[error("unknown tag id: {0}")]
    UnknownTagId(usize),

    /// A corpus label collides with one of the reserved START/STOP names.
    #[error("label {label:?} is reserved")]
    ReservedLabel {
        /// The offending label.
        label: String,
    },

    /// The gold sequence and the emission sequence differ in length.
    #[error("gold sequence has {gold} labels but there are {emissions} emission rows")]
    LengthMismatch {
        /// Number of gold labels.
        gold: usize,
        /// Number of emission rows.
        emissions: usize,
    },

    /// An emission row has neither the full nor the real-label width.
    #[error("emission row {position} has width {actual}, expected {expected}")]
    WidthMismatch {
        /// Position of the offending row.
        position: usize,
        /// Accepted widths, rendered for display.
        expected: String,
        /// Actual width.
        actual: usize,
    },

    /// The transition matrix is not `num_labels x num_labels`.
    #[error("transition matrix must be {expected}x{expected}, got {actual}")]
    TransitionShape {
        /// Expected side length.
        expected: usize,
        /// Description of the actual shape.
        actual: String,
    },

    /// The Viterbi trace did not terminate at START.
    #[error("backpointer trace ended at tag {found}, expected START ({start})")]
    BrokenBackpointer {
        /// Tag id the trace ended on.
        found: usize,
        /// The START id.
        start: usize,
    },

    /// The emission source failed to produce scores.
    #[error("emission source error: {0}")]
    Emission(String),
}

/// Result type alias for CRF operations.
pub type Result<T> = std::result::Result<T, CrfError>;
