//! Error types for schedule and device parsing in bellcast-types.

use thiserror::Error;

/// Errors that can occur when parsing or validating schedule data.
///
/// This error type is platform-agnostic and does not include
/// transport errors (those belong in bellcast-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A time of day was not in `HH:MM:SS` form.
    #[error("Invalid time '{0}': expected HH:MM:SS")]
    InvalidTime(String),

    /// A calendar date was not in `YYYY-MM-DD` form.
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    /// An interval tag outside the fixed set of nine.
    #[error("Unknown interval category '{0}'")]
    UnknownInterval(String),

    /// A transport tag that is neither low-energy nor classic serial.
    #[error("Unknown transport kind '{0}'")]
    UnknownTransport(String),

    /// A non-recurring schedule entry has no date.
    #[error("Schedule '{id}' is not recurring but has no date")]
    MissingDate {
        /// The offending entry id.
        id: String,
    },
}

/// Result type alias using bellcast-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
