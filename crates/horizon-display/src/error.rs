//! Error types for the projection engine.

use thiserror::Error;

/// Errors produced by projection operations.
///
/// Lookup failures are not errors: index translation and search methods
/// answer `None` when the referenced element is not represented in the view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisplayError {
    /// A structural mutation was attempted directly on the projection.
    ///
    /// Projections are read-only views; all structural change must originate
    /// from the source collection.
    #[error("the projection is read-only; mutate the source collection instead")]
    ReadOnly,

    /// An identity-based lookup was requested but no identity extractor is
    /// configured for this projection.
    #[error("no identity extractor is configured for this projection")]
    MissingIdExtractor,

    /// A cursor or positional operation referenced a position outside the
    /// valid range.
    #[error("position {0} is out of bounds")]
    IndexOutOfBounds(isize),
}

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, DisplayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            DisplayError::ReadOnly.to_string(),
            "the projection is read-only; mutate the source collection instead"
        );
        assert_eq!(
            DisplayError::IndexOutOfBounds(7).to_string(),
            "position 7 is out of bounds"
        );
    }
}
